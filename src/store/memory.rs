// In-process record store; every object lives in a byte vector behind one mutex.
use std::collections::HashMap;
use std::ptr;
use std::sync::{Mutex, MutexGuard};

use crate::core::backend::{Catalog, TableOptions, TransferBackend};
use crate::core::record::{Handle, RecordType, Status};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ObjectKind {
    Table,
    Dataset,
}

#[derive(Debug)]
struct Object {
    kind: ObjectKind,
    record_type: RecordType,
    options: Option<TableOptions>,
    bytes: Vec<u8>,
    strings: Vec<String>,
    extent: u64,
}

impl Object {
    fn records(&self) -> u64 {
        match self.kind {
            ObjectKind::Table => (self.bytes.len() / self.record_type.size()) as u64,
            ObjectKind::Dataset => self.extent,
        }
    }
}

#[derive(Debug)]
struct OpenEntry {
    name: String,
    cursor: u64,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    objects: HashMap<String, Object>,
    open: HashMap<Handle, OpenEntry>,
}

impl State {
    fn register(&mut self, name: &str) -> Handle {
        self.next_id += 1;
        let handle = Handle::new(self.next_id);
        self.open.insert(
            handle,
            OpenEntry {
                name: name.to_string(),
                cursor: 0,
            },
        );
        handle
    }

    fn object(
        &mut self,
        handle: Handle,
        kind: ObjectKind,
    ) -> Result<(&mut OpenEntry, &mut Object), Status> {
        let entry = self.open.get_mut(&handle).ok_or(Status::INVALID_HANDLE)?;
        let object = self
            .objects
            .get_mut(&entry.name)
            .ok_or(Status::INVALID_HANDLE)?;
        if object.kind != kind {
            return Err(Status::TYPE_MISMATCH);
        }
        Ok((entry, object))
    }

    fn any_object(&self, handle: Handle) -> Result<&Object, Status> {
        let entry = self.open.get(&handle).ok_or(Status::INVALID_HANDLE)?;
        self.objects.get(&entry.name).ok_or(Status::INVALID_HANDLE)
    }
}

/// Reference backend keeping tables and datasets in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options a table was created with.
    pub fn table_options(&self, name: &str) -> Option<TableOptions> {
        self.lock().ok()?.objects.get(name)?.options
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.lock().map(|state| state.open.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, Status> {
        self.state.lock().map_err(|_| Status::FAILURE)
    }

    fn create(&self, name: &str, object: Object) -> Result<Handle, Status> {
        let mut state = self.lock()?;
        if state.objects.contains_key(name) {
            return Err(Status::EXISTS);
        }
        state.objects.insert(name.to_string(), object);
        Ok(state.register(name))
    }

    fn open(&self, name: &str, kind: ObjectKind) -> Result<Handle, Status> {
        let mut state = self.lock()?;
        match state.objects.get(name) {
            Some(object) if object.kind == kind => Ok(state.register(name)),
            Some(_) => Err(Status::TYPE_MISMATCH),
            None => Err(Status::NOT_FOUND),
        }
    }
}

fn check_mem_type(stored: &RecordType, mem_type: &RecordType) -> Result<(), Status> {
    if stored != mem_type {
        return Err(Status::TYPE_MISMATCH);
    }
    Ok(())
}

impl TransferBackend for MemoryBackend {
    unsafe fn append(&self, handle: Handle, count: usize, buf: *const u8) -> Result<(), Status> {
        let mut state = self.lock()?;
        let (_, object) = state.object(handle, ObjectKind::Table)?;
        let len = count * object.record_type.size();
        // SAFETY: the caller guarantees `buf` covers `len` bytes.
        let src = unsafe { std::slice::from_raw_parts(buf, len) };
        object.bytes.extend_from_slice(src);
        Ok(())
    }

    unsafe fn read_at(
        &self,
        handle: Handle,
        start: u64,
        count: usize,
        buf: *mut u8,
    ) -> Result<(), Status> {
        let mut state = self.lock()?;
        let (_, object) = state.object(handle, ObjectKind::Table)?;
        let size = object.record_type.size();
        let end = start
            .checked_add(count as u64)
            .ok_or(Status::OUT_OF_RANGE)?;
        if end > object.records() {
            return Err(Status::OUT_OF_RANGE);
        }
        let offset = start as usize * size;
        // SAFETY: the range was bounds-checked above and the caller guarantees
        // `buf` covers `count * size` bytes.
        unsafe { ptr::copy_nonoverlapping(object.bytes[offset..].as_ptr(), buf, count * size) };
        Ok(())
    }

    unsafe fn read_next(&self, handle: Handle, count: usize, buf: *mut u8) -> Result<(), Status> {
        let cursor = {
            let mut state = self.lock()?;
            let (entry, _) = state.object(handle, ObjectKind::Table)?;
            entry.cursor
        };
        // SAFETY: forwarded caller contract.
        unsafe { self.read_at(handle, cursor, count, buf)? };
        let mut state = self.lock()?;
        let (entry, _) = state.object(handle, ObjectKind::Table)?;
        entry.cursor = cursor + count as u64;
        Ok(())
    }

    unsafe fn write(
        &self,
        handle: Handle,
        mem_type: &RecordType,
        buf: *const u8,
    ) -> Result<(), Status> {
        let mut state = self.lock()?;
        let (_, object) = state.object(handle, ObjectKind::Dataset)?;
        check_mem_type(&object.record_type, mem_type)?;
        let len = object.bytes.len();
        // SAFETY: the caller guarantees `buf` covers the full extent.
        unsafe { ptr::copy_nonoverlapping(buf, object.bytes.as_mut_ptr(), len) };
        Ok(())
    }

    unsafe fn read(
        &self,
        handle: Handle,
        mem_type: &RecordType,
        buf: *mut u8,
    ) -> Result<(), Status> {
        let mut state = self.lock()?;
        let (_, object) = state.object(handle, ObjectKind::Dataset)?;
        check_mem_type(&object.record_type, mem_type)?;
        // SAFETY: the caller guarantees `buf` covers the full extent.
        unsafe { ptr::copy_nonoverlapping(object.bytes.as_ptr(), buf, object.bytes.len()) };
        Ok(())
    }

    fn read_strings(&self, handle: Handle, dst: &mut [String]) -> Result<(), Status> {
        let mut state = self.lock()?;
        let (_, object) = state.object(handle, ObjectKind::Dataset)?;
        if !object.record_type.is_variable_length_string() {
            return Err(Status::TYPE_MISMATCH);
        }
        // Slots past the extent come back empty, as on the fixed-width path.
        for (index, slot) in dst.iter_mut().enumerate() {
            match object.strings.get(index) {
                Some(value) => slot.clone_from(value),
                None => slot.clear(),
            }
        }
        Ok(())
    }

    fn write_strings(&self, handle: Handle, src: &[String]) -> Result<(), Status> {
        let mut state = self.lock()?;
        let (_, object) = state.object(handle, ObjectKind::Dataset)?;
        if !object.record_type.is_variable_length_string() {
            return Err(Status::TYPE_MISMATCH);
        }
        for (slot, value) in object.strings.iter_mut().zip(src) {
            slot.clone_from(value);
        }
        Ok(())
    }

    fn count(&self, handle: Handle) -> Result<u64, Status> {
        Ok(self.lock()?.any_object(handle)?.records())
    }

    fn extent(&self, handle: Handle) -> Result<u64, Status> {
        Ok(self.lock()?.any_object(handle)?.records())
    }

    fn reset_cursor(&self, handle: Handle) -> Result<(), Status> {
        self.set_cursor(handle, 0)
    }

    fn set_cursor(&self, handle: Handle, offset: u64) -> Result<(), Status> {
        let mut state = self.lock()?;
        let (entry, object) = state.object(handle, ObjectKind::Table)?;
        if offset > object.records() {
            return Err(Status::OUT_OF_RANGE);
        }
        entry.cursor = offset;
        Ok(())
    }

    fn close(&self, handle: Handle) -> Result<(), Status> {
        let mut state = self.lock()?;
        state
            .open
            .remove(&handle)
            .map(|_| ())
            .ok_or(Status::INVALID_HANDLE)
    }

    fn is_valid(&self, handle: Handle) -> bool {
        self.lock()
            .map(|state| state.open.contains_key(&handle))
            .unwrap_or(false)
    }

    fn type_of(&self, handle: Handle) -> Result<RecordType, Status> {
        Ok(self.lock()?.any_object(handle)?.record_type)
    }
}

impl Catalog for MemoryBackend {
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
            Object {
                kind: ObjectKind::Table,
                record_type: *record_type,
                options: Some(options),
                bytes: Vec::new(),
                strings: Vec::new(),
                extent: 0,
            },
        )
    }

    fn open_table(&self, name: &str) -> Result<Handle, Status> {
        self.open(name, ObjectKind::Table)
    }

    fn create_dataset(
        &self,
        name: &str,
        record_type: &RecordType,
        extent: u64,
    ) -> Result<Handle, Status> {
        if record_type.size() == 0 {
            return Err(Status::UNSUPPORTED);
        }
        let slots = usize::try_from(extent).map_err(|_| Status::OUT_OF_RANGE)?;
        let (bytes, strings) = if record_type.is_variable_length_string() {
            (Vec::new(), vec![String::new(); slots])
        } else {
            let len = slots
                .checked_mul(record_type.size())
                .ok_or(Status::OUT_OF_RANGE)?;
            (vec![0u8; len], Vec::new())
        };
        self.create(
            name,
            Object {
                kind: ObjectKind::Dataset,
                record_type: *record_type,
                options: None,
                bytes,
                strings,
                extent,
            },
        )
    }

    fn open_dataset(&self, name: &str) -> Result<Handle, Status> {
        self.open(name, ObjectKind::Dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryBackend;
    use crate::core::backend::{Catalog, TableOptions, TransferBackend};
    use crate::core::record::{RecordType, Status};

    #[test]
    fn names_are_unique_per_backend() {
        let backend = MemoryBackend::new();
        let rt = RecordType::fixed(4);
        let handle = backend
            .create_table("t", &rt, TableOptions::default())
            .expect("create");
        assert_eq!(
            backend.create_table("t", &rt, TableOptions::default()),
            Err(Status::EXISTS)
        );
        assert_eq!(backend.open_dataset("t"), Err(Status::TYPE_MISMATCH));
        assert_eq!(backend.open_table("missing"), Err(Status::NOT_FOUND));
        backend.close(handle).expect("close");
    }

    #[test]
    fn handles_are_independent_cursors() {
        let backend = MemoryBackend::new();
        let rt = RecordType::fixed(1);
        let a = backend
            .create_table("t", &rt, TableOptions::new(16).with_compression(6))
            .expect("create");
        let b = backend.open_table("t").expect("open");
        unsafe { backend.append(a, 3, b"xyz".as_ptr()).expect("append") };

        let mut out = [0u8; 2];
        unsafe { backend.read_next(a, 2, out.as_mut_ptr()).expect("next a") };
        assert_eq!(&out, b"xy");
        unsafe { backend.read_next(b, 2, out.as_mut_ptr()).expect("next b") };
        assert_eq!(&out, b"xy");
        assert_eq!(
            unsafe { backend.read_next(a, 2, out.as_mut_ptr()) },
            Err(Status::OUT_OF_RANGE)
        );

        assert_eq!(backend.table_options("t").and_then(|o| o.compression), Some(6));
        assert_eq!(backend.open_handles(), 2);
        backend.close(a).expect("close a");
        backend.close(b).expect("close b");
        assert_eq!(backend.close(b), Err(Status::INVALID_HANDLE));
        assert!(!backend.is_valid(a));
    }

    #[test]
    fn dataset_rejects_mismatched_memory_type() {
        let backend = MemoryBackend::new();
        let handle = backend
            .create_dataset("d", &RecordType::fixed(8), 2)
            .expect("create");
        let mut out = [0u8; 16];
        assert_eq!(
            unsafe { backend.read(handle, &RecordType::fixed(4), out.as_mut_ptr()) },
            Err(Status::TYPE_MISMATCH)
        );
        backend.close(handle).expect("close");
    }
}
