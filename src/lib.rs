//! Purpose: Record marshaling library shared by the `packrec` CLI and tests.
//! Exports: `api` (stable surface), `core` (views, codec, tables, datasets), `store` (backends).
//! Role: Moves host values into and out of fixed-layout record buffers held by a backend.
//! Invariants: All raw-pointer handling is confined to `core::view` and backend implementations.
//! Invariants: Handles close explicitly; drop only reports and releases leaks.
pub mod api;
pub mod core;
pub mod store;
