//! Purpose: Random-access dataset transferred whole per read/write call.
//! Exports: `Dataset`.
//! Role: Routes fixed-width text reads through the string codec; everything else moves directly.
//! Invariants: Buffers must cover the stored extent before the backend is called.
//! Invariants: Writes never post-process text; the source bytes go to the backend as-is.
use std::sync::Arc;

use tracing::debug;

use crate::core::backend::{Catalog, TransferBackend};
use crate::core::error::{Error, ErrorKind};
use crate::core::handle::{OwnedHandle, run_scoped};
use crate::core::record::{Handle, RecordType};
use crate::core::strings;
use crate::core::view::{RecordSink, RecordSource, Sink, Source, ensure_capacity};

pub struct Dataset<B: TransferBackend + ?Sized> {
    inner: OwnedHandle<B>,
}

impl<B: Catalog + ?Sized> Dataset<B> {
    pub fn create(
        backend: Arc<B>,
        name: &str,
        record_type: &RecordType,
        extent: u64,
    ) -> Result<Self, Error> {
        let handle = backend
            .create_dataset(name, record_type, extent)
            .map_err(|status| Error::from_status("create dataset", status))?;
        debug!(name, handle = handle.id(), extent, "created dataset");
        Ok(Self::from_handle(backend, handle))
    }

    pub fn open(backend: Arc<B>, name: &str) -> Result<Self, Error> {
        let handle = backend
            .open_dataset(name)
            .map_err(|status| Error::from_status("open dataset", status))?;
        debug!(name, handle = handle.id(), "opened dataset");
        Ok(Self::from_handle(backend, handle))
    }
}

impl<B: TransferBackend + ?Sized> Dataset<B> {
    pub fn from_handle(backend: Arc<B>, handle: Handle) -> Self {
        Self {
            inner: OwnedHandle::new(backend, handle, "dataset"),
        }
    }

    pub fn handle(&self) -> Option<Handle> {
        self.inner.handle()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.inner.close()
    }

    /// Runs `f` and closes the dataset afterwards, whether or not `f` failed.
    pub fn scoped<R>(mut self, f: impl FnOnce(&mut Self) -> Result<R, Error>) -> Result<R, Error> {
        run_scoped(&mut self, f, Self::close)
    }

    /// Stored element layout.
    pub fn record_type(&self) -> Result<RecordType, Error> {
        let handle = self.inner.live()?;
        self.inner
            .backend()
            .type_of(handle)
            .map_err(|status| Error::from_status("get type", status))
    }

    /// Number of records the dataset holds.
    pub fn extent(&self) -> Result<usize, Error> {
        let handle = self.inner.live()?;
        let extent = self
            .inner
            .backend()
            .extent(handle)
            .map_err(|status| Error::from_status("get extent", status))?;
        usize::try_from(extent).map_err(|_| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("extent {extent} does not fit in memory"))
        })
    }

    /// Reads the full dataset into `dst`, interpreted with `record_type`.
    pub fn read<D: RecordSink + ?Sized>(
        &self,
        dst: &mut D,
        record_type: &RecordType,
    ) -> Result<(), Error> {
        let extent = self.extent()?;
        let handle = self.inner.live()?;
        let backend = self.inner.backend();
        let bytes = match dst.sink() {
            Sink::Strings(slots) => {
                ensure_capacity(slots.len(), extent)?;
                if record_type.is_variable_length_string() {
                    return backend
                        .read_strings(handle, slots)
                        .map_err(|status| Error::from_status("read", status));
                }
                return strings::read_fixed(slots, record_type.size(), |scratch| {
                    // SAFETY: scratch holds `slots.len() * size` bytes and
                    // `slots.len() >= extent`.
                    unsafe { backend.read(handle, record_type, scratch.as_mut_ptr()) }
                        .map_err(|status| Error::from_status("read", status))
                });
            }
            Sink::Records(view) => {
                if record_type.is_variable_length_string() {
                    return Err(variable_string_error());
                }
                let bytes = view.prepare(extent, record_type)?;
                // SAFETY: `prepare` checked the destination covers the extent.
                unsafe { backend.read(handle, record_type, view.addr()) }
                    .map_err(|status| Error::from_status("read", status))?;
                bytes
            }
        };
        // SAFETY: the backend wrote `bytes` bytes at the start of the view.
        unsafe { dst.commit(bytes) }
    }

    /// Writes the full dataset from `src`, interpreted with `record_type`.
    pub fn write<S: RecordSource + ?Sized>(
        &mut self,
        src: &S,
        record_type: &RecordType,
    ) -> Result<(), Error> {
        let extent = self.extent()?;
        let handle = self.inner.live()?;
        let backend = self.inner.backend();
        match src.source() {
            Source::Strings(values) => {
                if !record_type.is_variable_length_string() {
                    return Err(Error::new(ErrorKind::LayoutMismatch)
                        .with_message("fixed-width text must be written as packed bytes")
                        .with_hint("Pack the strings with `strings::encode_fixed` first."));
                }
                ensure_capacity(values.len(), extent)?;
                backend
                    .write_strings(handle, values)
                    .map_err(|status| Error::from_status("write", status))
            }
            Source::Records(view) => {
                if record_type.is_variable_length_string() {
                    return Err(variable_string_error());
                }
                ensure_capacity(view.records(record_type)?, extent)?;
                // SAFETY: the source covers at least `extent` records.
                unsafe { backend.write(handle, record_type, view.addr()) }
                    .map_err(|status| Error::from_status("write", status))
            }
        }
    }
}

fn variable_string_error() -> Error {
    Error::new(ErrorKind::UnsupportedShape)
        .with_message("variable-length strings transfer through a String sequence")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Dataset;
    use crate::core::error::ErrorKind;
    use crate::core::record::RecordType;
    use crate::core::strings::encode_fixed;
    use crate::store::memory::MemoryBackend;

    #[test]
    fn fixed_string_round_trip() {
        let backend = Arc::new(MemoryBackend::new());
        let string_type = RecordType::fixed_string(4);
        let mut ds = Dataset::create(backend, "names", &string_type, 2).expect("create");
        let packed = encode_fixed(&["abc", "de"], 4).expect("encode");
        ds.write(&packed, &string_type).expect("write");

        let mut names = vec![String::new(); 2];
        ds.read(&mut names, &string_type).expect("read");
        assert_eq!(names, ["abc", "de"]);
        ds.close().expect("close");
    }

    #[test]
    fn full_width_string_keeps_every_byte() {
        let backend = Arc::new(MemoryBackend::new());
        let string_type = RecordType::fixed_string(4);
        let mut ds = Dataset::create(backend, "codes", &string_type, 1).expect("create");
        ds.write("abcd", &string_type).expect("write");

        let mut codes = [String::new()];
        ds.read(&mut codes, &string_type).expect("read");
        assert_eq!(codes, ["abcd".to_string()]);
        ds.close().expect("close");
    }

    #[test]
    fn host_strings_are_not_written_raw() {
        let backend = Arc::new(MemoryBackend::new());
        let string_type = RecordType::fixed_string(4);
        let mut ds = Dataset::create(backend, "raw", &string_type, 1).expect("create");
        let err = ds
            .write(&vec!["abc".to_string()], &string_type)
            .expect_err("not packed");
        assert_eq!(err.kind(), ErrorKind::LayoutMismatch);
        ds.close().expect("close");
    }

    #[test]
    fn variable_strings_use_the_backend_path() {
        let backend = Arc::new(MemoryBackend::new());
        let vlen = RecordType::variable_string();
        let mut ds = Dataset::create(backend, "notes", &vlen, 2).expect("create");
        let notes = vec!["a much longer note".to_string(), "".to_string()];
        ds.write(&notes, &vlen).expect("write");

        let mut out = vec![String::new(); 2];
        ds.read(&mut out, &vlen).expect("read");
        assert_eq!(out, notes);

        let mut wide = vec![String::from("stale"); 3];
        ds.read(&mut wide, &vlen).expect("read into extra slots");
        assert_eq!(wide, ["a much longer note", "", ""]);

        let mut raw = [0u8; 16];
        let err = ds.read(&mut raw, &vlen).expect_err("raw");
        assert_eq!(err.kind(), ErrorKind::UnsupportedShape);
        ds.close().expect("close");
    }

    #[test]
    fn extra_string_slots_are_cleared_on_both_paths() {
        let backend = Arc::new(MemoryBackend::new());
        let fixed = RecordType::fixed_string(2);
        let mut ds = Dataset::create(backend, "pairs", &fixed, 1).expect("create");
        ds.write("ok", &fixed).expect("write");

        let mut slots = vec![String::from("old"); 2];
        ds.read(&mut slots, &fixed).expect("read");
        assert_eq!(slots, ["ok", ""]);
        ds.close().expect("close");
    }

    #[test]
    fn destination_must_cover_extent() {
        let backend = Arc::new(MemoryBackend::new());
        let mut ds = Dataset::create(backend, "vals", &RecordType::of::<f64>(), 3).expect("create");
        ds.write(&[1.0f64, 2.0, 3.0], &RecordType::of::<f64>()).expect("write");

        let mut short = [0f64; 2];
        let err = ds.read(&mut short, &RecordType::of::<f64>()).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::InsufficientCapacity);

        let mut out: Vec<f64> = Vec::with_capacity(3);
        ds.read(&mut out, &RecordType::of::<f64>()).expect("read");
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
        ds.close().expect("close");
    }
}
