// Directory-backed record store: one file per object, appends serialized by an exclusive file lock.
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;
use libc::{EACCES, EPERM};
use memmap2::Mmap;
use tracing::debug;

use crate::core::backend::{Catalog, TableOptions, TransferBackend};
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{Handle, RecordType, Status};

const MAGIC: [u8; 4] = *b"PKRC";
const VERSION: u32 = 1;
const ENDIANNESS_LE: u8 = 1;
const FLAG_COMPRESSION: u16 = 1;
pub const HEADER_SIZE: usize = 64;
pub const FILE_EXTENSION: &str = "rec";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectKind {
    Table = 1,
    Dataset = 2,
}

impl ObjectKind {
    fn from_u8(value: u8) -> Result<Self, Status> {
        match value {
            1 => Ok(ObjectKind::Table),
            2 => Ok(ObjectKind::Dataset),
            _ => Err(Status::CORRUPT),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileHeader {
    pub kind: ObjectKind,
    pub record_size: u64,
    /// Appended records for a table, fixed extent for a dataset.
    pub records: u64,
    pub chunk_size: u64,
    pub compression: Option<u32>,
}

impl FileHeader {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
        buf[8] = ENDIANNESS_LE;
        buf[9] = self.kind as u8;
        let flags = if self.compression.is_some() {
            FLAG_COMPRESSION
        } else {
            0
        };
        buf[10..12].copy_from_slice(&flags.to_le_bytes());
        buf[12..16].copy_from_slice(&self.compression.unwrap_or(0).to_le_bytes());
        write_u64(&mut buf, 16, self.record_size);
        write_u64(&mut buf, 24, self.records);
        write_u64(&mut buf, 32, self.chunk_size);
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self, Status> {
        if buf.len() < HEADER_SIZE || buf[0..4] != MAGIC {
            return Err(Status::CORRUPT);
        }
        let version = u32::from_le_bytes(read_4(buf, 4));
        if version != VERSION || buf[8] != ENDIANNESS_LE {
            return Err(Status::CORRUPT);
        }
        let kind = ObjectKind::from_u8(buf[9])?;
        let flags = u16::from_le_bytes([buf[10], buf[11]]);
        let level = u32::from_le_bytes(read_4(buf, 12));
        Ok(Self {
            kind,
            record_size: read_u64(buf, 16),
            records: read_u64(buf, 24),
            chunk_size: read_u64(buf, 32),
            compression: (flags & FLAG_COMPRESSION != 0).then_some(level),
        })
    }

    fn validate(&self, actual_len: u64) -> Result<(), Status> {
        if self.record_size == 0 {
            return Err(Status::CORRUPT);
        }
        let data_len = self
            .records
            .checked_mul(self.record_size)
            .and_then(|len| len.checked_add(HEADER_SIZE as u64))
            .ok_or(Status::CORRUPT)?;
        if data_len > actual_len {
            return Err(Status::CORRUPT);
        }
        Ok(())
    }

    fn record_type(&self) -> RecordType {
        RecordType::fixed(self.record_size as usize)
    }

    fn data_offset(&self, record: u64) -> u64 {
        HEADER_SIZE as u64 + record * self.record_size
    }
}

fn read_4(buf: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    out
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(out)
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

struct OpenFile {
    file: File,
    kind: ObjectKind,
    cursor: u64,
}

#[derive(Default)]
struct State {
    next_id: i64,
    open: HashMap<Handle, OpenFile>,
}

impl State {
    fn entry(&mut self, handle: Handle, kind: ObjectKind) -> Result<&mut OpenFile, Status> {
        let entry = self.open.get_mut(&handle).ok_or(Status::INVALID_HANDLE)?;
        if entry.kind != kind {
            return Err(Status::TYPE_MISMATCH);
        }
        Ok(entry)
    }
}

/// Record store keeping each table or dataset in `<dir>/<name>.rec`.
pub struct FileBackend {
    dir: PathBuf,
    state: Mutex<State>,
}

impl FileBackend {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&dir).with_source(err))?;
        Ok(Self {
            dir,
            state: Mutex::new(State::default()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn object_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{FILE_EXTENSION}"))
    }

    /// Current on-disk header of an open object.
    pub fn header(&self, handle: Handle) -> Result<FileHeader, Status> {
        let state = self.lock()?;
        let entry = state.open.get(&handle).ok_or(Status::INVALID_HANDLE)?;
        read_header(&entry.file)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, Status> {
        self.state.lock().map_err(|_| Status::FAILURE)
    }

    fn register(&self, file: File, kind: ObjectKind) -> Result<Handle, Status> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let handle = Handle::new(state.next_id);
        state.open.insert(
            handle,
            OpenFile {
                file,
                kind,
                cursor: 0,
            },
        );
        Ok(handle)
    }

    fn create(&self, name: &str, header: FileHeader) -> Result<Handle, Status> {
        validate_name(name)?;
        let path = self.object_path(name);
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                io::ErrorKind::AlreadyExists => Status::EXISTS,
                _ => io_status(&err),
            })?;
        let len = header.data_offset(header.records);
        file.set_len(len).map_err(|err| io_status(&err))?;
        write_header(&mut file, &header)?;
        debug!(path = %path.display(), kind = ?header.kind, "created record file");
        self.register(file, header.kind)
    }

    fn open_object(&self, name: &str, kind: ObjectKind) -> Result<Handle, Status> {
        validate_name(name)?;
        let path = self.object_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| io_status(&err))?;
        let actual_len = file.metadata().map_err(|err| io_status(&err))?.len();
        let header = read_header(&file)?;
        header.validate(actual_len)?;
        if header.kind != kind {
            return Err(Status::TYPE_MISMATCH);
        }
        self.register(file, kind)
    }
}

fn validate_name(name: &str) -> Result<(), Status> {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(Status::UNSUPPORTED);
    }
    Ok(())
}

/// Serializes appends across processes for as long as it is held.
struct AppendLock<'a> {
    file: &'a File,
}

impl<'a> AppendLock<'a> {
    fn acquire(file: &'a File) -> Result<Self, Status> {
        file.lock_exclusive().map_err(|err| io_status(&err))?;
        Ok(Self { file })
    }
}

impl<'a> Drop for AppendLock<'a> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}

fn io_status(err: &io::Error) -> Status {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return Status::PERMISSION;
    }
    match err.kind() {
        io::ErrorKind::NotFound => Status::NOT_FOUND,
        io::ErrorKind::WouldBlock => Status::BUSY,
        io::ErrorKind::PermissionDenied => Status::PERMISSION,
        _ => Status::IO,
    }
}

fn read_header(mut file: &File) -> Result<FileHeader, Status> {
    let mut buf = [0u8; HEADER_SIZE];
    file.seek(SeekFrom::Start(0))
        .map_err(|err| io_status(&err))?;
    file.read_exact(&mut buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => Status::CORRUPT,
        _ => io_status(&err),
    })?;
    FileHeader::decode(&buf)
}

fn write_header(mut file: &File, header: &FileHeader) -> Result<(), Status> {
    write_at(file, 0, &header.encode())?;
    file.flush().map_err(|err| io_status(&err))
}

fn write_at(mut file: &File, offset: u64, bytes: &[u8]) -> Result<(), Status> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|err| io_status(&err))?;
    file.write_all(bytes).map_err(|err| io_status(&err))
}

/// Copies `len` bytes at `offset` out of a fresh mapping of `file`.
///
/// # Safety
///
/// `buf` must be valid for writes of `len` bytes.
unsafe fn copy_out(file: &File, offset: u64, len: usize, buf: *mut u8) -> Result<(), Status> {
    if len == 0 {
        return Ok(());
    }
    // SAFETY: the mapping is read-only and dropped before returning; writers
    // only ever extend the file past the records a header already covers.
    let map = unsafe { Mmap::map(file) }.map_err(|err| io_status(&err))?;
    let start = usize::try_from(offset).map_err(|_| Status::OUT_OF_RANGE)?;
    let end = start.checked_add(len).ok_or(Status::OUT_OF_RANGE)?;
    if end > map.len() {
        return Err(Status::CORRUPT);
    }
    // SAFETY: the source range was bounds-checked; `buf` is the caller's.
    unsafe { std::ptr::copy_nonoverlapping(map[start..end].as_ptr(), buf, len) };
    Ok(())
}

impl TransferBackend for FileBackend {
    unsafe fn append(&self, handle: Handle, count: usize, buf: *const u8) -> Result<(), Status> {
        let mut state = self.lock()?;
        let entry = state.entry(handle, ObjectKind::Table)?;
        let _lock = AppendLock::acquire(&entry.file)?;
        let mut header = read_header(&entry.file)?;
        let len = count * header.record_size as usize;
        // SAFETY: the caller guarantees `buf` covers `count` records.
        let bytes = unsafe { std::slice::from_raw_parts(buf, len) };
        write_at(&entry.file, header.data_offset(header.records), bytes)?;
        header.records += count as u64;
        write_header(&entry.file, &header)
    }

    unsafe fn read_at(
        &self,
        handle: Handle,
        start: u64,
        count: usize,
        buf: *mut u8,
    ) -> Result<(), Status> {
        let mut state = self.lock()?;
        let entry = state.entry(handle, ObjectKind::Table)?;
        let header = read_header(&entry.file)?;
        let end = start
            .checked_add(count as u64)
            .ok_or(Status::OUT_OF_RANGE)?;
        if end > header.records {
            return Err(Status::OUT_OF_RANGE);
        }
        let len = count * header.record_size as usize;
        // SAFETY: forwarded caller contract.
        unsafe { copy_out(&entry.file, header.data_offset(start), len, buf) }
    }

    unsafe fn read_next(&self, handle: Handle, count: usize, buf: *mut u8) -> Result<(), Status> {
        let cursor = self.lock()?.entry(handle, ObjectKind::Table)?.cursor;
        // SAFETY: forwarded caller contract.
        unsafe { self.read_at(handle, cursor, count, buf)? };
        self.lock()?.entry(handle, ObjectKind::Table)?.cursor = cursor + count as u64;
        Ok(())
    }

    unsafe fn write(
        &self,
        handle: Handle,
        mem_type: &RecordType,
        buf: *const u8,
    ) -> Result<(), Status> {
        let mut state = self.lock()?;
        let entry = state.entry(handle, ObjectKind::Dataset)?;
        let header = read_header(&entry.file)?;
        if header.record_type() != *mem_type {
            return Err(Status::TYPE_MISMATCH);
        }
        let len = (header.records * header.record_size) as usize;
        // SAFETY: the caller guarantees `buf` covers the full extent.
        let bytes = unsafe { std::slice::from_raw_parts(buf, len) };
        write_at(&entry.file, header.data_offset(0), bytes)?;
        (&entry.file).flush().map_err(|err| io_status(&err))
    }

    unsafe fn read(
        &self,
        handle: Handle,
        mem_type: &RecordType,
        buf: *mut u8,
    ) -> Result<(), Status> {
        let mut state = self.lock()?;
        let entry = state.entry(handle, ObjectKind::Dataset)?;
        let header = read_header(&entry.file)?;
        if header.record_type() != *mem_type {
            return Err(Status::TYPE_MISMATCH);
        }
        let len = (header.records * header.record_size) as usize;
        // SAFETY: forwarded caller contract.
        unsafe { copy_out(&entry.file, header.data_offset(0), len, buf) }
    }

    fn read_strings(&self, _handle: Handle, _dst: &mut [String]) -> Result<(), Status> {
        Err(Status::UNSUPPORTED)
    }

    fn write_strings(&self, _handle: Handle, _src: &[String]) -> Result<(), Status> {
        Err(Status::UNSUPPORTED)
    }

    fn count(&self, handle: Handle) -> Result<u64, Status> {
        Ok(self.header(handle)?.records)
    }

    fn extent(&self, handle: Handle) -> Result<u64, Status> {
        Ok(self.header(handle)?.records)
    }

    fn reset_cursor(&self, handle: Handle) -> Result<(), Status> {
        self.set_cursor(handle, 0)
    }

    fn set_cursor(&self, handle: Handle, offset: u64) -> Result<(), Status> {
        let mut state = self.lock()?;
        let entry = state.entry(handle, ObjectKind::Table)?;
        if offset > read_header(&entry.file)?.records {
            return Err(Status::OUT_OF_RANGE);
        }
        entry.cursor = offset;
        Ok(())
    }

    fn close(&self, handle: Handle) -> Result<(), Status> {
        let entry = self
            .lock()?
            .open
            .remove(&handle)
            .ok_or(Status::INVALID_HANDLE)?;
        entry.file.sync_data().map_err(|err| io_status(&err))
    }

    fn is_valid(&self, handle: Handle) -> bool {
        self.lock()
            .map(|state| state.open.contains_key(&handle))
            .unwrap_or(false)
    }

    fn type_of(&self, handle: Handle) -> Result<RecordType, Status> {
        Ok(self.header(handle)?.record_type())
    }
}

impl Catalog for FileBackend {
    fn create_table(
        &self,
        name: &str,
        record_type: &RecordType,
        options: TableOptions,
    ) -> Result<Handle, Status> {
        if record_type.size() == 0 || record_type.is_variable_length_string() {
            return Err(Status::UNSUPPORTED);
        }
        self.create(
            name,
            FileHeader {
                kind: ObjectKind::Table,
                record_size: record_type.size() as u64,
                records: 0,
                chunk_size: options.chunk_size as u64,
                compression: options.compression,
            },
        )
    }

    fn open_table(&self, name: &str) -> Result<Handle, Status> {
        self.open_object(name, ObjectKind::Table)
    }

    fn create_dataset(
        &self,
        name: &str,
        record_type: &RecordType,
        extent: u64,
    ) -> Result<Handle, Status> {
        if record_type.size() == 0 || record_type.is_variable_length_string() {
            return Err(Status::UNSUPPORTED);
        }
        extent
            .checked_mul(record_type.size() as u64)
            .ok_or(Status::OUT_OF_RANGE)?;
        self.create(
            name,
            FileHeader {
                kind: ObjectKind::Dataset,
                record_size: record_type.size() as u64,
                records: extent,
                chunk_size: 0,
                compression: None,
            },
        )
    }

    fn open_dataset(&self, name: &str) -> Result<Handle, Status> {
        self.open_object(name, ObjectKind::Dataset)
    }
}
