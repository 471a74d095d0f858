//! Purpose: Boundary contracts the marshaling core needs from a record store.
//! Exports: `TransferBackend`, `Catalog`, `TableOptions`.
//! Role: Everything past this trait (namespaces, storage, encoding) belongs to the backend.
//! Invariants: Backends report failures as `Status`; the core maps them via `Error::from_status`.
//! Invariants: Raw-pointer transfers are `unsafe`: callers size buffers from `RecordType::size`.
use crate::core::record::{Handle, RecordType, Status};

pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Creation-time settings for a packet table, passed to the backend untouched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TableOptions {
    pub chunk_size: usize,
    /// Backend-defined compression level; `None` disables compression.
    pub compression: Option<u32>,
}

impl TableOptions {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            compression: None,
        }
    }

    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = Some(level);
        self
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

/// Raw record transfers against an open table or dataset handle.
///
/// Implementations must be safe to share across threads; callers serialize
/// use of any single handle.
pub trait TransferBackend: Send + Sync {
    /// Appends `count` records read from `buf` to the end of a table.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for reads of `count * record_size` bytes.
    unsafe fn append(&self, handle: Handle, count: usize, buf: *const u8) -> Result<(), Status>;

    /// Reads `count` records starting at absolute offset `start`.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for writes of `count * record_size` bytes.
    unsafe fn read_at(
        &self,
        handle: Handle,
        start: u64,
        count: usize,
        buf: *mut u8,
    ) -> Result<(), Status>;

    /// Reads `count` records at the table cursor and advances it.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for writes of `count * record_size` bytes.
    unsafe fn read_next(&self, handle: Handle, count: usize, buf: *mut u8) -> Result<(), Status>;

    /// Replaces a dataset's full extent with the records at `buf`.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for reads of `extent * mem_type.size()` bytes.
    unsafe fn write(
        &self,
        handle: Handle,
        mem_type: &RecordType,
        buf: *const u8,
    ) -> Result<(), Status>;

    /// Reads a dataset's full extent into `buf`.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for writes of `extent * mem_type.size()` bytes.
    unsafe fn read(&self, handle: Handle, mem_type: &RecordType, buf: *mut u8)
    -> Result<(), Status>;

    /// Reads variable-length strings; the backend owns the per-string allocation.
    fn read_strings(&self, handle: Handle, dst: &mut [String]) -> Result<(), Status>;

    fn write_strings(&self, handle: Handle, src: &[String]) -> Result<(), Status>;

    /// Number of records stored in a table.
    fn count(&self, handle: Handle) -> Result<u64, Status>;

    /// Number of records a dataset holds.
    fn extent(&self, handle: Handle) -> Result<u64, Status>;

    fn reset_cursor(&self, handle: Handle) -> Result<(), Status>;

    fn set_cursor(&self, handle: Handle, offset: u64) -> Result<(), Status>;

    fn close(&self, handle: Handle) -> Result<(), Status>;

    fn is_valid(&self, handle: Handle) -> bool;

    fn type_of(&self, handle: Handle) -> Result<RecordType, Status>;
}

/// Name-addressed creation and lookup of tables and datasets.
pub trait Catalog: TransferBackend {
    fn create_table(
        &self,
        name: &str,
        record_type: &RecordType,
        options: TableOptions,
    ) -> Result<Handle, Status>;

    fn open_table(&self, name: &str) -> Result<Handle, Status>;

    fn create_dataset(
        &self,
        name: &str,
        record_type: &RecordType,
        extent: u64,
    ) -> Result<Handle, Status>;

    fn open_dataset(&self, name: &str) -> Result<Handle, Status>;
}
