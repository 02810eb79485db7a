//! Tool implementations, grouped by concern.

mod files;
mod upload;
