// Owned backend handle with explicit close and a logging drop safety net.
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::core::backend::TransferBackend;
use crate::core::error::Error;
use crate::core::record::Handle;

/// A live backend handle plus the backend that issued it.
///
/// `None` means closed; the numeric id is never inspected for validity.
pub(crate) struct OwnedHandle<B: TransferBackend + ?Sized> {
    backend: Arc<B>,
    handle: Option<Handle>,
    label: &'static str,
}

impl<B: TransferBackend + ?Sized> OwnedHandle<B> {
    pub(crate) fn new(backend: Arc<B>, handle: Handle, label: &'static str) -> Self {
        Self {
            backend,
            handle: Some(handle),
            label,
        }
    }

    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn handle(&self) -> Option<Handle> {
        self.handle
    }

    pub(crate) fn live(&self) -> Result<Handle, Error> {
        self.handle.ok_or_else(Error::invalid_handle)
    }

    pub(crate) fn is_valid(&self) -> bool {
        match self.handle {
            Some(handle) => self.backend.is_valid(handle),
            None => false,
        }
    }

    /// Releases the handle. The handle is considered closed even when the
    /// backend reports a failure, so a second close is always a no-op.
    pub(crate) fn close(&mut self) -> Result<(), Error> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        debug!(kind = self.label, handle = handle.id(), "close");
        self.backend
            .close(handle)
            .map_err(|status| Error::from_status("close", status))
    }
}

/// Runs `f` against an open value, then closes it on every exit path.
///
/// The error from `f` wins over a close failure.
pub(crate) fn run_scoped<T, R>(
    value: &mut T,
    f: impl FnOnce(&mut T) -> Result<R, Error>,
    close: impl FnOnce(&mut T) -> Result<(), Error>,
) -> Result<R, Error> {
    let result = f(value);
    let closed = close(value);
    let value = result?;
    closed?;
    Ok(value)
}

impl<B: TransferBackend + ?Sized> Drop for OwnedHandle<B> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        warn!(
            kind = self.label,
            handle = handle.id(),
            "handle dropped without close; releasing"
        );
        if let Err(status) = self.backend.close(handle) {
            error!(
                kind = self.label,
                handle = handle.id(),
                status = status.code(),
                "failed to release leaked handle"
            );
        }
    }
}
