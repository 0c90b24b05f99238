//! Small text helpers shared by the sync engine and the download index.
//!
//! - **Item names**: strip the parent title that backends prepend to chapter names
//! - **File names**: make item and entry names safe to use as directory names
//! - **Ordering**: sort item names with embedded numbers by value

mod text;

pub use text::{natural_cmp, sanitize_file_name, sanitize_item_name};
