// Core modules implementing value views, string codec, tables, datasets, and errors.
pub mod backend;
pub mod dataset;
pub mod error;
mod handle;
pub mod record;
pub mod strings;
pub mod table;
pub mod view;
