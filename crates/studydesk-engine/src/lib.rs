pub mod editing;
pub mod export;
pub mod io;
pub mod markdown;
pub mod markup;
pub mod sanitize;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use editing::*;
pub use export::{ExportFile, NoteFormat, export, write_export};
pub use io::{FileStore, MemoryStore, NoteKey, NoteStore, StoreError};
pub use markdown::{default_markdown, from_markdown, to_markdown};
pub use sanitize::{ALLOWED_TAGS, sanitize};
