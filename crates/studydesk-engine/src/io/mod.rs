use relative_path::RelativePathBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::export::NoteFormat;

/// Identifies one note: the subtopic it belongs to, within its topic and
/// subject, and the encoding it is stored in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteKey {
    pub subject: String,
    pub topic: String,
    pub subtopic: String,
    #[serde(default)]
    pub format: NoteFormat,
}

impl NoteKey {
    pub fn new(
        subject: impl Into<String>,
        topic: impl Into<String>,
        subtopic: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            topic: topic.into(),
            subtopic: subtopic.into(),
            format: NoteFormat::Html,
        }
    }

    pub fn with_format(mut self, format: NoteFormat) -> Self {
        self.format = format;
        self
    }

    /// Flat storage key, `subject/topic/subtopic`. Components containing `/`
    /// can collide with other keys.
    pub fn storage_key(&self) -> String {
        format!("{}/{}/{}", self.subject, self.topic, self.subtopic)
    }

    /// Parses `subject/topic/subtopic`; everything after the second `/`
    /// belongs to the subtopic. A trailing `.md` makes a Markdown note.
    pub fn parse(key: &str) -> Option<Self> {
        let (key, format) = match key.strip_suffix(".md") {
            Some(stem) => (stem, NoteFormat::Markdown),
            None => (key, NoteFormat::Html),
        };
        let mut parts = key.splitn(3, '/');
        Some(Self::new(parts.next()?, parts.next()?, parts.next()?).with_format(format))
    }

    fn components(&self) -> [&str; 3] {
        [&self.subject, &self.topic, &self.subtopic]
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())?;
        if self.format == NoteFormat::Markdown {
            write!(f, ".md")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage unavailable")]
    Unavailable,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid notes directory: {0}")]
    InvalidNotesDir(String),
    #[error("Invalid note key: {0}")]
    InvalidKey(String),
}

/// Where notes are persisted. Both operations are synchronous.
pub trait NoteStore {
    /// Stored content for `key`, or `None` if nothing was saved under it.
    fn load(&self, key: &NoteKey) -> Result<Option<String>, StoreError>;

    fn save(&mut self, key: &NoteKey, content: &str) -> Result<(), StoreError>;

    /// Every stored key, sorted.
    fn keys(&self) -> Result<Vec<NoteKey>, StoreError>;
}

/// Notes held in memory, one entry per key and format.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    notes: BTreeMap<NoteKey, String>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every operation fails with [`StoreError::Unavailable`].
    pub fn unavailable() -> Self {
        Self {
            notes: BTreeMap::new(),
            unavailable: true,
        }
    }

    /// Raw stored value, bypassing availability.
    pub fn get(&self, key: &NoteKey) -> Option<&str> {
        self.notes.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl NoteStore for MemoryStore {
    fn load(&self, key: &NoteKey) -> Result<Option<String>, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable);
        }
        Ok(self.notes.get(key).cloned())
    }

    fn save(&mut self, key: &NoteKey, content: &str) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable);
        }
        self.notes.insert(key.clone(), content.to_string());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<NoteKey>, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable);
        }
        Ok(self.notes.keys().cloned().collect())
    }
}

/// Notes stored as `subject/topic/subtopic.html` (or `.md` for Markdown
/// notes) under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        validate_notes_dir(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a note relative to the root.
    pub fn relative_path(key: &NoteKey) -> Result<RelativePathBuf, StoreError> {
        for component in key.components() {
            if component.is_empty()
                || component == "."
                || component == ".."
                || component.contains(['/', '\\'])
            {
                return Err(StoreError::InvalidKey(key.to_string()));
            }
        }
        Ok(RelativePathBuf::from(key.subject.as_str())
            .join(key.topic.as_str())
            .join(format!("{}.{}", key.subtopic, key.format.extension())))
    }
}

impl NoteStore for FileStore {
    fn load(&self, key: &NoteKey) -> Result<Option<String>, StoreError> {
        let path = Self::relative_path(key)?.to_path(&self.root);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path).map(Some).map_err(StoreError::Io)
    }

    fn save(&mut self, key: &NoteKey, content: &str) -> Result<(), StoreError> {
        let path = Self::relative_path(key)?.to_path(&self.root);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }

        fs::write(&path, content).map_err(StoreError::Io)
    }

    fn keys(&self) -> Result<Vec<NoteKey>, StoreError> {
        validate_notes_dir(&self.root)?;

        let mut files = Vec::new();
        scan_directory_recursive(&self.root, &mut files)?;

        let mut keys: Vec<NoteKey> = files
            .iter()
            .filter_map(|file| key_for_file(&self.root, file))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Recovers the key of a note file; files not exactly two directories below
/// the root are not notes.
fn key_for_file(root: &Path, file: &Path) -> Option<NoteKey> {
    let relative = file.strip_prefix(root).ok()?;
    let mut parts = relative.iter().map(|p| p.to_str());
    let subject = parts.next()??;
    let topic = parts.next()??;
    let file_name = parts.next()??;
    if parts.next().is_some() {
        return None;
    }
    let (subtopic, extension) = file_name.rsplit_once('.').filter(|(stem, _)| !stem.is_empty())?;
    let format = NoteFormat::from_extension(extension)?;
    Some(NoteKey::new(subject, topic, subtopic).with_format(format))
}

fn scan_directory_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(StoreError::Io)?;

    for entry in entries {
        let entry = entry.map_err(StoreError::Io)?;
        let path = entry.path();

        if path.is_dir() {
            scan_directory_recursive(&path, files)?;
        } else if let Some(ext) = path.extension().and_then(|ext| ext.to_str())
            && NoteFormat::from_extension(ext).is_some()
        {
            files.push(path);
        }
    }

    Ok(())
}

pub fn validate_notes_dir(path: &Path) -> Result<(), StoreError> {
    if !path.exists() || !path.is_dir() {
        return Err(StoreError::InvalidNotesDir(
            "Directory does not exist".to_string(),
        ));
    }

    Ok(())
}
