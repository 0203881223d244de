//! The open note: document, last-known content and save state.
//!
//! Every change flows through [`Editor::apply_input`] (surface edits) or
//! [`Editor::execute`] (commands). Both compare the canonical markup of the
//! result with the last-known content, and only a difference marks the note
//! dirty. Saving is explicit; closing a dirty editor drops its changes.
//!
//! Notes are read and written in the format named by their key: sanitized
//! markup for Html notes, Markdown for Markdown notes. The comparison above
//! always uses canonical markup.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::editing::commands::{Cmd, CommandError};
use crate::editing::document::Document;
use crate::editing::selection::{EditSurface, Selection, SelectionSnapshot, capture, restore};
use crate::export::{ExportFile, NoteFormat, export};
use crate::io::{NoteKey, NoteStore};
use crate::sanitize::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditState {
    Clean,
    Dirty,
}

/// What an input or command did to the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditOutcome {
    /// The canonical content is byte-identical to before.
    Unchanged,
    Changed { version: u64 },
    /// An editing policy refused the change.
    Suppressed,
}

#[derive(Debug)]
pub struct Editor {
    key: NoteKey,
    document: Document,
    content: String,
    saved: Option<String>,
    state: EditState,
    pending_restore: Option<SelectionSnapshot>,
}

impl Editor {
    /// Opens the note stored under `key`, decoded in the key's format. A
    /// missing note, or one the store cannot read, starts as a single heading
    /// holding the subtopic.
    pub fn open(store: &dyn NoteStore, key: NoteKey) -> Self {
        let loaded = match store.load(&key) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to load {key}, starting empty: {e}");
                None
            }
        };

        let document = match &loaded {
            Some(content) => key.format.decode(content),
            None => {
                debug!("No stored note for {key}, seeding title");
                key.format.seed(&key.subtopic)
            }
        };
        let content = document.to_markup();

        Self {
            key,
            document,
            content,
            saved: loaded,
            state: EditState::Clean,
            pending_restore: None,
        }
    }

    /// Runs one surface edit cycle: capture the selection, sanitize what the
    /// surface now holds, compare, and on a difference update the document,
    /// rebuild the surface and schedule the selection restore.
    pub fn apply_input(&mut self, surface: &mut impl EditSurface) -> EditOutcome {
        let snapshot = capture(surface);
        let raw = surface.markup();
        let canonical = Document::from_markup(&sanitize(&raw)).to_markup();

        if canonical == self.content {
            if raw != canonical {
                debug!("Input for {} normalized away, rebuilding surface", self.key);
                surface.render(self.document.render_tree());
                self.pending_restore = snapshot;
            }
            return EditOutcome::Unchanged;
        }

        let changed = self.document.replace_markup(&canonical);
        self.content = self.document.to_markup();
        self.state = EditState::Dirty;
        surface.render(self.document.render_tree());
        self.pending_restore = snapshot;

        debug!(
            "Input changed {} block(s) of {}, version {}",
            changed.len(),
            self.key,
            self.document.version()
        );
        EditOutcome::Changed {
            version: self.document.version(),
        }
    }

    /// Applies a command at the model selection. Call [`Editor::render`]
    /// afterwards to show the result.
    pub fn execute(&mut self, cmd: Cmd) -> Result<EditOutcome, CommandError> {
        let name = cmd.name();
        let patch = self.document.apply(cmd)?;
        if patch.suppressed {
            debug!("{name} suppressed on {}", self.key);
            return Ok(EditOutcome::Suppressed);
        }

        let markup = self.document.to_markup();
        if markup == self.content {
            return Ok(EditOutcome::Unchanged);
        }
        self.content = markup;
        self.state = EditState::Dirty;
        Ok(EditOutcome::Changed {
            version: patch.version,
        })
    }

    /// Rebuilds the surface from the document and schedules the model
    /// selection to be restored on it.
    pub fn render(&mut self, surface: &mut impl EditSurface) {
        let (nodes, map) = self.document.render();
        let selection = *self.document.selection();
        self.pending_restore = map
            .point_for(selection.anchor)
            .zip(map.point_for(selection.focus))
            .map(|(anchor, focus)| SelectionSnapshot::new(anchor, focus));
        surface.render(nodes);
    }

    /// Restores the selection scheduled by the last rebuild. `None` when
    /// nothing was scheduled, otherwise whether the recorded points still
    /// resolved.
    pub fn restore_pending(&mut self, surface: &mut impl EditSurface) -> Option<bool> {
        let snapshot = self.pending_restore.take()?;
        let restored = restore(surface, &snapshot);
        self.sync_selection(surface);
        Some(restored)
    }

    /// Copies the surface selection into the model. Returns `false` when the
    /// surface has no selection or it does not map onto a block.
    pub fn sync_selection(&mut self, surface: &impl EditSurface) -> bool {
        let Some(snapshot) = surface.selection() else {
            return false;
        };
        match (
            self.document.locate(&snapshot.anchor),
            self.document.locate(&snapshot.focus),
        ) {
            (Some(anchor), Some(focus)) => {
                self.document.set_selection(Selection::new(anchor, focus));
                true
            }
            _ => false,
        }
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.document.set_selection(selection);
    }

    /// Persists [`Editor::stored_content`]. Storage failures are logged and
    /// the editor is considered clean either way.
    pub fn save(&mut self, store: &mut dyn NoteStore) {
        let content = self.stored_content();
        match store.save(&self.key, &content) {
            Ok(()) => {
                info!("Saved {}", self.key);
                self.saved = Some(content);
            }
            Err(e) => warn!("Failed to save {}: {e}", self.key),
        }
        self.state = EditState::Clean;
    }

    /// Closes the editor without saving.
    pub fn close(self) {
        if self.state == EditState::Dirty {
            info!("Discarding unsaved changes to {}", self.key);
        }
    }

    pub fn export(&self, format: NoteFormat) -> ExportFile {
        export(&self.document, &self.key.subtopic, format)
    }

    pub fn key(&self) -> &NoteKey {
        &self.key
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Last-known canonical markup.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The note in its stored format, as [`Editor::save`] would write it.
    pub fn stored_content(&self) -> String {
        self.key.format.encode(&self.document)
    }

    /// What the store last returned or accepted for this note.
    pub fn saved_content(&self) -> Option<&str> {
        self.saved.as_deref()
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state == EditState::Dirty
    }
}
