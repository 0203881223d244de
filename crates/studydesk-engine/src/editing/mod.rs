/*!
 * # Editing Core
 *
 * The note editor is a structured document model with a sanitize, serialize
 * and selection-preservation cycle around it.
 *
 * ## Architecture Overview
 *
 * ### 1. Single Source of Truth: the Block Model
 * - A [`Document`] is a non-empty sequence of typed [`Block`]s with inline
 *   style ranges addressed by UTF-16 offsets
 * - The persisted form is sanitized markup flattened from the blocks, and it
 *   is always a fixed point of the sanitizer
 *
 * ### 2. Surface Edits
 * - The host surface is edited directly; [`Editor::apply_input`] reads it
 *   back, sanitizes, compares with the last-known content and only then
 *   updates the model and marks the note dirty
 * - The surface is rebuilt from the model after every accepted edit
 *
 * ### 3. Command-Based Editing
 * - Formatting and text primitives are [`Cmd`]s applied at the model
 *   selection, each returning a [`Patch`]
 *
 * ### 4. Selection Across Rebuilds
 * - Selections are captured as structural paths before the rebuild and
 *   restored afterwards, falling back to the end of the document
 *
 * ## Module Structure
 *
 * - **`document`**: blocks, projection from markup and flattening back to it
 * - **`commands`**: `Cmd` enum and how each command edits the blocks
 * - **`selection`**: surface points, the `EditSurface` seam, capture/restore
 * - **`session`**: the `Editor` with its clean/dirty state and persistence
 * - **`patch`**: edit result metadata
 * - **`text`**: UTF-16 offset helpers
 *
 * ## Usage Pattern
 *
 * ```rust
 * use studydesk_engine::editing::*;
 * use studydesk_engine::io::{MemoryStore, NoteKey};
 *
 * let mut store = MemoryStore::new();
 * let mut editor = Editor::open(&store, NoteKey::new("Humanities", "Maps", "Geography"));
 *
 * let selection = editor.document().find("graph").unwrap();
 * editor.set_selection(selection);
 * editor.execute(Cmd::ToggleBold).unwrap();
 * assert_eq!(editor.content(), "<h1>Geo<strong>graph</strong>y</h1>");
 *
 * editor.save(&mut store);
 * assert!(!editor.is_dirty());
 * ```
 */

pub mod commands;
pub mod document;
pub mod patch;
pub mod selection;
pub mod session;
pub mod text;

pub use commands::{Cmd, CommandError, ImagePayload, ImageRejection, MAX_IMAGE_BYTES};
pub use document::{Block, BlockId, BlockKind, Document, ListKind, StyleKind, StyleRange};
pub use patch::Patch;
pub use selection::{
    DocPosition, EditSurface, MemorySurface, NodePoint, RenderMap, Segment, Selection,
    SelectionSnapshot, capture, end_of_document, restore,
};
pub use session::{EditOutcome, EditState, Editor};
