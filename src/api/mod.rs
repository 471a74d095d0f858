//! Purpose: Define the stable public Rust API boundary for packrec.
//! Exports: Tables, datasets, record descriptors, value traits, backends, and errors.
//! Role: Public, additive-only surface for callers and the CLI.
//! Invariants: Everything a caller needs is re-exported here; internal paths may move.

pub use crate::core::backend::{Catalog, DEFAULT_CHUNK_SIZE, TableOptions, TransferBackend};
pub use crate::core::dataset::Dataset;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::record::{Handle, RecordType, Status};
pub use crate::core::strings::{self, decode_fixed, encode_fixed};
pub use crate::core::table::PacketTable;
pub use crate::core::view::{
    Plain, RecordSink, RecordSource, Scalar, ShapeKind, Sink, Source, ValueView, ValueViewMut,
    ensure_capacity,
};
pub use crate::store::file::{FileBackend, FileHeader, ObjectKind};
pub use crate::store::memory::MemoryBackend;
