use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::editing::document::Document;
use crate::io::StoreError;
use crate::markdown::{default_markdown, from_markdown, to_markdown};
use crate::sanitize::sanitize;

/// Encoding of a note, on disk and in exports. Html notes hold sanitized
/// markup, Markdown notes raw Markdown; neither is read as the other.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum NoteFormat {
    #[default]
    Html,
    Markdown,
}

impl NoteFormat {
    pub const ALL: [NoteFormat; 2] = [NoteFormat::Html, NoteFormat::Markdown];

    pub fn extension(self) -> &'static str {
        match self {
            NoteFormat::Html => "html",
            NoteFormat::Markdown => "md",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension() == extension)
    }

    pub fn mime(self) -> &'static str {
        match self {
            NoteFormat::Html => "text/html",
            NoteFormat::Markdown => "text/markdown",
        }
    }

    /// The stored form of `doc`.
    pub fn encode(self, doc: &Document) -> String {
        match self {
            NoteFormat::Html => sanitize(&doc.to_markup()),
            NoteFormat::Markdown => to_markdown(doc),
        }
    }

    pub fn decode(self, content: &str) -> Document {
        match self {
            NoteFormat::Html => Document::from_markup(content),
            NoteFormat::Markdown => from_markdown(content),
        }
    }

    /// A note that was never saved: its subtopic as the title heading.
    pub fn seed(self, subtopic: &str) -> Document {
        match self {
            NoteFormat::Html => Document::new_titled(subtopic),
            NoteFormat::Markdown => from_markdown(&default_markdown(subtopic)),
        }
    }
}

/// A note rendered as a downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub mime: &'static str,
    pub contents: String,
}

/// Renders `doc` for download, named after the subtopic.
pub fn export(doc: &Document, subtopic: &str, format: NoteFormat) -> ExportFile {
    let contents = format.encode(doc);
    ExportFile {
        file_name: format!("{}.{}", file_stem(subtopic), format.extension()),
        mime: format.mime(),
        contents,
    }
}

/// Writes an export into `dir`, creating it if needed.
pub fn write_export(dir: &Path, file: &ExportFile) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(dir).map_err(StoreError::Io)?;
    let path = dir.join(&file.file_name);
    fs::write(&path, &file.contents).map_err(StoreError::Io)?;
    Ok(path)
}

fn file_stem(subtopic: &str) -> String {
    let stem: String = subtopic
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "notes".to_string()
    } else {
        stem
    }
}
