//! Purpose: Append-only, cursor-addressable packet table over a transfer backend.
//! Exports: `PacketTable`.
//! Role: Couples value views and capacity checks to table-level backend calls.
//! Invariants: Records replay in append order; `next` after `create_index` starts at record 0.
//! Invariants: Capacity and layout are validated before the backend sees a pointer.
//! Invariants: Every operation except `close`/`is_valid` fails on a closed table.
use std::sync::Arc;

use tracing::debug;

use crate::core::backend::{Catalog, TableOptions, TransferBackend};
use crate::core::error::{Error, ErrorKind};
use crate::core::handle::{OwnedHandle, run_scoped};
use crate::core::record::{Handle, RecordType};
use crate::core::view::{RecordSink, RecordSource, Sink, Source, ensure_capacity};

pub struct PacketTable<B: TransferBackend + ?Sized> {
    inner: OwnedHandle<B>,
}

impl<B: Catalog + ?Sized> PacketTable<B> {
    pub fn create(
        backend: Arc<B>,
        name: &str,
        record_type: &RecordType,
        options: TableOptions,
    ) -> Result<Self, Error> {
        let handle = backend
            .create_table(name, record_type, options)
            .map_err(|status| Error::from_status("create table", status))?;
        debug!(name, handle = handle.id(), size = record_type.size(), "created packet table");
        Ok(Self::from_handle(backend, handle))
    }

    pub fn open(backend: Arc<B>, name: &str) -> Result<Self, Error> {
        let handle = backend
            .open_table(name)
            .map_err(|status| Error::from_status("open table", status))?;
        debug!(name, handle = handle.id(), "opened packet table");
        Ok(Self::from_handle(backend, handle))
    }
}

impl<B: TransferBackend + ?Sized> PacketTable<B> {
    /// Takes ownership of an already-open table handle.
    pub fn from_handle(backend: Arc<B>, handle: Handle) -> Self {
        Self {
            inner: OwnedHandle::new(backend, handle, "packet_table"),
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

    /// Runs `f` and closes the table afterwards, whether or not `f` failed.
    pub fn scoped<R>(mut self, f: impl FnOnce(&mut Self) -> Result<R, Error>) -> Result<R, Error> {
        run_scoped(&mut self, f, Self::close)
    }

    pub fn record_type(&self) -> Result<RecordType, Error> {
        let handle = self.inner.live()?;
        self.inner
            .backend()
            .type_of(handle)
            .map_err(|status| Error::from_status("get type", status))
    }

    /// Appends every record `value` exposes and returns how many were appended.
    pub fn append<S: RecordSource + ?Sized>(&mut self, value: &S) -> Result<usize, Error> {
        let record_type = self.record_type()?;
        let handle = self.inner.live()?;
        let view = match value.source() {
            Source::Records(view) => view,
            Source::Strings(_) => return Err(string_sequence_error()),
        };
        let count = view.records(&record_type)?;
        if count == 0 {
            return Ok(0);
        }
        // SAFETY: the view covers `count * record_type.size()` initialized bytes
        // borrowed from `value` for the duration of this call.
        unsafe { self.inner.backend().append(handle, count, view.addr()) }
            .map_err(|status| Error::from_status("append", status))?;
        Ok(count)
    }

    /// Reads `nrecords` records starting at absolute offset `start`; the cursor is untouched.
    pub fn read_packets<D: RecordSink + ?Sized>(
        &self,
        start: u64,
        nrecords: usize,
        dst: &mut D,
    ) -> Result<(), Error> {
        let record_type = self.record_type()?;
        let handle = self.inner.live()?;
        let (addr, bytes) = match dst.sink() {
            Sink::Records(view) => (view.addr(), view.prepare(nrecords, &record_type)?),
            Sink::Strings(_) => return Err(string_sequence_error()),
        };
        if nrecords == 0 {
            return Ok(());
        }
        // SAFETY: `prepare` checked the destination holds `nrecords` records.
        unsafe { self.inner.backend().read_at(handle, start, nrecords, addr) }
            .map_err(|status| Error::from_status("read packets", status))?;
        // SAFETY: the backend wrote `bytes` bytes at the start of the view.
        unsafe { dst.commit(bytes) }
    }

    /// Fills the destination's full capacity from the cursor and advances it.
    pub fn next<D: RecordSink + ?Sized>(&mut self, dst: &mut D) -> Result<usize, Error> {
        let record_type = self.record_type()?;
        let handle = self.inner.live()?;
        let (addr, nrecords, bytes) = match dst.sink() {
            Sink::Records(view) => {
                let nrecords = view.capacity(&record_type)?;
                ensure_capacity(nrecords, 1)?;
                (view.addr(), nrecords, view.prepare(nrecords, &record_type)?)
            }
            Sink::Strings(_) => return Err(string_sequence_error()),
        };
        // SAFETY: `nrecords` is the destination's own capacity in records.
        unsafe { self.inner.backend().read_next(handle, nrecords, addr) }
            .map_err(|status| Error::from_status("get next", status))?;
        // SAFETY: the backend wrote `bytes` bytes at the start of the view.
        unsafe { dst.commit(bytes)? };
        Ok(nrecords)
    }

    pub fn num_packets(&self) -> Result<u64, Error> {
        let handle = self.inner.live()?;
        self.inner
            .backend()
            .count(handle)
            .map_err(|status| Error::from_status("get num packets", status))
    }

    /// Rewinds the cursor to the first record.
    pub fn create_index(&mut self) -> Result<(), Error> {
        let handle = self.inner.live()?;
        self.inner
            .backend()
            .reset_cursor(handle)
            .map_err(|status| Error::from_status("create index", status))
    }

    pub fn set_index(&mut self, index: u64) -> Result<(), Error> {
        let handle = self.inner.live()?;
        self.inner
            .backend()
            .set_cursor(handle, index)
            .map_err(|status| Error::from_status("set index", status))
    }
}

fn string_sequence_error() -> Error {
    Error::new(ErrorKind::UnsupportedShape)
        .with_message("packet tables transfer packed records, not string sequences")
        .with_hint("Encode fixed-width text with `strings::encode_fixed`, or use a dataset.")
}
