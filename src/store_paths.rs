//! Purpose: Resolve the store directory and validate object names for the CLI.
//! Exports: `resolve_store_dir`, `default_store_dir`, `validate_object_name`.
//! Invariants: `--dir` beats `PACKREC_DIR`, which beats `~/.packrec/store`.
//! Invariants: Object names must not contain path separators.

use std::path::PathBuf;

pub(crate) const STORE_DIR_ENV: &str = "PACKREC_DIR";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ObjectNameError {
    Empty,
    ContainsPathSeparator,
}

pub(crate) fn default_store_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".packrec").join("store")
}

pub(crate) fn resolve_store_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os(STORE_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(default_store_dir)
}

pub(crate) fn validate_object_name(name: &str) -> Result<(), ObjectNameError> {
    if name.is_empty() {
        return Err(ObjectNameError::Empty);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(ObjectNameError::ContainsPathSeparator);
    }
    Ok(())
}
