// Concrete backends: an in-memory reference store and a directory of record files.
pub mod file;
pub mod memory;
