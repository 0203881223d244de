use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;

use crate::editing::document::{Block, BlockId, BlockKind, Document, ListKind, StyleKind};
use crate::editing::selection::{DocPosition, Selection};
use crate::editing::text::{byte_to_utf16, next_boundary, prev_boundary, utf16_len, utf16_to_byte};
use crate::editing::Patch;
use crate::sanitize::is_image_media_type;

/// Images must be strictly smaller than this many bytes.
pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// Edit commands, applied at the document's current selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    ToggleBold,
    ToggleItalic,
    SetHeading { level: u8 },
    SetParagraph,
    ToggleList { kind: ListKind },
    InsertImage { image: ImagePayload },
    InsertText { text: String },
    /// Soft break inside the current block.
    InsertLineBreak,
    SplitBlock,
    DeleteBackward,
    DeleteForward,
}

impl Cmd {
    pub fn name(&self) -> &'static str {
        match self {
            Cmd::ToggleBold => "toggle-bold",
            Cmd::ToggleItalic => "toggle-italic",
            Cmd::SetHeading { .. } => "set-heading",
            Cmd::SetParagraph => "set-paragraph",
            Cmd::ToggleList { .. } => "toggle-list",
            Cmd::InsertImage { .. } => "insert-image",
            Cmd::InsertText { .. } => "insert-text",
            Cmd::InsertLineBreak => "insert-line-break",
            Cmd::SplitBlock => "split-block",
            Cmd::DeleteBackward => "delete-backward",
            Cmd::DeleteForward => "delete-forward",
        }
    }
}

/// An image the user picked, before it is embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Declared media type, e.g. `image/png`.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn validate(&self) -> Result<(), ImageRejection> {
        if !is_image_media_type(&self.media_type) {
            return Err(ImageRejection::NotAnImage(self.media_type.clone()));
        }
        if self.bytes.len() >= MAX_IMAGE_BYTES {
            return Err(ImageRejection::TooLarge {
                size: self.bytes.len(),
                limit: MAX_IMAGE_BYTES,
            });
        }
        Ok(())
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.media_type.trim().to_ascii_lowercase(),
            STANDARD.encode(&self.bytes)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageRejection {
    #[error("not an image: {0:?}")]
    NotAnImage(String),
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid heading level: {0}")]
    InvalidHeadingLevel(u8),
    #[error("Invalid or too large image. Max 2MB. ({0})")]
    ImageRejected(#[from] ImageRejection),
    #[error("Selection does not point into the document")]
    NoSelection,
}

struct Outcome {
    changed: Vec<BlockId>,
    selection: Selection,
    suppressed: bool,
}

impl Outcome {
    fn changed(changed: Vec<BlockId>, selection: Selection) -> Self {
        Self {
            changed,
            selection,
            suppressed: false,
        }
    }

    fn unchanged(selection: Selection) -> Self {
        Self::changed(Vec::new(), selection)
    }

    fn suppressed(selection: Selection) -> Self {
        Self {
            changed: Vec::new(),
            selection,
            suppressed: true,
        }
    }
}

pub(crate) fn apply(doc: &mut Document, cmd: Cmd) -> Result<Patch, CommandError> {
    let (start, end) = doc.ordered(&doc.selection).ok_or(CommandError::NoSelection)?;
    let name = cmd.name();
    debug!("applying {} at {:?}..{:?}", name, start, end);

    let outcome = match cmd {
        Cmd::ToggleBold => toggle_style(doc, StyleKind::Bold, start, end),
        Cmd::ToggleItalic => toggle_style(doc, StyleKind::Italic, start, end),
        Cmd::SetHeading { level } => {
            let kind = BlockKind::heading(level).ok_or(CommandError::InvalidHeadingLevel(level))?;
            set_kind(doc, kind, start, end)
        }
        Cmd::SetParagraph => set_kind(doc, BlockKind::Paragraph, start, end),
        Cmd::ToggleList { kind } => toggle_list(doc, kind, start, end),
        Cmd::InsertImage { image } => {
            image.validate()?;
            insert_image(doc, &image.to_data_uri(), start, end)
        }
        Cmd::InsertText { text } => insert_text(doc, &text, start, end),
        Cmd::InsertLineBreak => insert_text(doc, "\n", start, end),
        Cmd::SplitBlock => split_block(doc, start, end),
        Cmd::DeleteBackward => delete_backward(doc, start, end),
        Cmd::DeleteForward => delete_forward(doc, start, end),
    };

    let mut changed: Vec<BlockId> = Vec::with_capacity(outcome.changed.len());
    for id in outcome.changed {
        if !changed.contains(&id) {
            changed.push(id);
        }
    }
    if !changed.is_empty() {
        doc.version += 1;
    }
    if outcome.suppressed {
        debug!("{} suppressed", name);
    }
    doc.ensure_not_empty();
    doc.set_selection(outcome.selection);

    Ok(Patch {
        changed,
        new_selection: doc.selection,
        version: doc.version,
        suppressed: outcome.suppressed,
    })
}

fn position(doc: &Document, pos: DocPosition) -> (usize, usize) {
    doc.resolve(pos).unwrap_or((0, 0))
}

/// Text-block spans covered by `start..end`, as (block index, from, to).
fn text_spans(doc: &Document, start: DocPosition, end: DocPosition) -> Vec<(usize, usize, usize)> {
    let (si, so) = position(doc, start);
    let (ei, eo) = position(doc, end);
    (si..=ei)
        .filter(|&i| doc.blocks[i].kind.is_text())
        .map(|i| {
            let from = if i == si { so } else { 0 };
            let to = if i == ei { eo } else { doc.blocks[i].len() };
            (i, from, to)
        })
        .filter(|&(_, from, to)| from < to)
        .collect()
}

/// Indices of the text blocks the selection touches, including the caret's
/// block when collapsed.
fn touched_text_blocks(doc: &Document, start: DocPosition, end: DocPosition) -> Vec<usize> {
    let (si, _) = position(doc, start);
    let (ei, _) = position(doc, end);
    (si..=ei).filter(|&i| doc.blocks[i].kind.is_text()).collect()
}

fn toggle_style(doc: &mut Document, kind: StyleKind, start: DocPosition, end: DocPosition) -> Outcome {
    let selection = doc.selection;
    let spans = text_spans(doc, start, end);
    if spans.is_empty() {
        return Outcome::unchanged(selection);
    }

    let remove = spans
        .iter()
        .all(|&(i, from, to)| doc.blocks[i].has_style(kind, from, to));
    let mut changed = Vec::with_capacity(spans.len());
    for (i, from, to) in spans {
        let block = &mut doc.blocks[i];
        if remove {
            block.remove_style(kind, from, to);
        } else {
            block.add_style(kind, from, to);
        }
        changed.push(block.id);
    }
    Outcome::changed(changed, selection)
}

fn set_kind(doc: &mut Document, kind: BlockKind, start: DocPosition, end: DocPosition) -> Outcome {
    let selection = doc.selection;
    let mut changed = Vec::new();
    for i in touched_text_blocks(doc, start, end) {
        let block = &mut doc.blocks[i];
        if block.kind != kind {
            block.set_kind(kind);
            changed.push(block.id);
        }
    }
    Outcome::changed(changed, selection)
}

fn toggle_list(doc: &mut Document, list: ListKind, start: DocPosition, end: DocPosition) -> Outcome {
    let touched = touched_text_blocks(doc, start, end);
    let item = list.item_kind();
    let all_items = !touched.is_empty() && touched.iter().all(|&i| doc.blocks[i].kind == item);
    let target = if all_items { BlockKind::Paragraph } else { item };
    set_kind(doc, target, start, end)
}

/// Whether deleting `from..to` of block `index` would empty the only block
/// of a document whose single block is a heading.
fn protects_title(doc: &Document, index: usize, from: usize, to: usize) -> bool {
    let block = &doc.blocks[index];
    doc.blocks.len() == 1 && block.kind.is_heading() && from == 0 && to >= block.len() && !block.is_empty()
}

/// Position to put the caret at after the block at `index` was removed.
fn caret_near(doc: &Document, index: usize) -> DocPosition {
    match doc.blocks.get(index) {
        Some(block) => DocPosition::new(block.id, 0),
        None => doc.end_position(),
    }
}

/// Deletes the selected content. Covered image blocks are removed; when both
/// ends are text blocks the remainder of the last is merged into the first.
fn delete_span(doc: &mut Document, start: DocPosition, end: DocPosition) -> (DocPosition, Vec<BlockId>) {
    let (si, so) = position(doc, start);
    let (ei, eo) = position(doc, end);
    let mut changed = Vec::new();
    if (si, so) == (ei, eo) {
        return (DocPosition::new(doc.blocks[si].id, so), changed);
    }

    if si == ei {
        let block = &mut doc.blocks[si];
        let id = block.id;
        changed.push(id);
        if block.kind.is_text() {
            block.delete_range(so, eo);
            return (DocPosition::new(id, so), changed);
        }
        doc.blocks.remove(si);
        doc.ensure_not_empty();
        return (caret_near(doc, si), changed);
    }

    let first_id = doc.blocks[si].id;
    let last_id = doc.blocks[ei].id;
    let first_text = doc.blocks[si].kind.is_text();
    let last_text = doc.blocks[ei].kind.is_text();
    changed.push(first_id);
    changed.push(last_id);

    if first_text {
        let len = doc.blocks[si].len();
        doc.blocks[si].delete_range(so, len);
    }
    if last_text {
        doc.blocks[ei].delete_range(0, eo);
    }
    let merge = first_text && last_text;
    if merge {
        let (text, styles) = (doc.blocks[ei].text.clone(), doc.blocks[ei].styles.clone());
        doc.blocks[si].append(&text, &styles);
    }
    let remove_first = !first_text && so == 0;
    let remove_last = merge || (!last_text && eo == 1);

    let mut index = 0;
    doc.blocks.retain(|block| {
        let i = index;
        index += 1;
        let keep = !(i > si && i < ei) && !(i == si && remove_first) && !(i == ei && remove_last);
        if !keep {
            changed.push(block.id);
        }
        keep
    });
    doc.ensure_not_empty();

    let caret = if !remove_first {
        DocPosition::new(first_id, so)
    } else if !remove_last {
        DocPosition::new(last_id, 0)
    } else {
        caret_near(doc, si)
    };
    (caret, changed)
}

fn insert_text(doc: &mut Document, text: &str, start: DocPosition, end: DocPosition) -> Outcome {
    if text.is_empty() && start == end {
        return Outcome::unchanged(doc.selection);
    }
    let (caret, mut changed) = delete_span(doc, start, end);
    if text.is_empty() {
        return Outcome::changed(changed, Selection::caret(caret));
    }

    let (index, offset) = position(doc, caret);
    if doc.blocks[index].kind.is_text() {
        let block = &mut doc.blocks[index];
        let at = byte_to_utf16(&block.text, utf16_to_byte(&block.text, offset));
        block.insert_text(at, text);
        changed.push(block.id);
        let caret = DocPosition::new(block.id, at + utf16_len(text));
        return Outcome::changed(changed, Selection::caret(caret));
    }

    // typing next to an image starts a paragraph on that side
    let id = doc.alloc_id();
    let at = if offset == 0 { index } else { index + 1 };
    doc.blocks
        .insert(at, Block::text_block(id, BlockKind::Paragraph, text));
    changed.push(id);
    Outcome::changed(changed, Selection::caret(DocPosition::new(id, utf16_len(text))))
}

fn insert_image(doc: &mut Document, data_uri: &str, start: DocPosition, end: DocPosition) -> Outcome {
    let (caret, mut changed) = delete_span(doc, start, end);
    let (index, offset) = position(doc, caret);
    let id = doc.alloc_id();
    let image = Block::image_block(id, data_uri);
    changed.push(id);

    let block = &doc.blocks[index];
    let after_image = DocPosition::new(id, 1);
    if !block.kind.is_text() {
        let at = if offset == 0 { index } else { index + 1 };
        doc.blocks.insert(at, image);
        return Outcome::changed(changed, Selection::caret(after_image));
    }

    let len = block.len();
    if offset == 0 && len > 0 {
        let caret = DocPosition::new(block.id, 0);
        doc.blocks.insert(index, image);
        return Outcome::changed(changed, Selection::caret(caret));
    }
    if offset >= len {
        doc.blocks.insert(index + 1, image);
        return Outcome::changed(changed, Selection::caret(after_image));
    }

    let kind = block.kind;
    let tail_id = doc.alloc_id();
    let (text, styles) = doc.blocks[index].split_off(offset);
    let mut tail = Block::text_block(tail_id, kind, "");
    tail.append(&text, &styles);
    changed.push(doc.blocks[index].id);
    changed.push(tail_id);
    doc.blocks.insert(index + 1, image);
    doc.blocks.insert(index + 2, tail);
    Outcome::changed(changed, Selection::caret(DocPosition::new(tail_id, 0)))
}

fn split_block(doc: &mut Document, start: DocPosition, end: DocPosition) -> Outcome {
    let (caret, mut changed) = delete_span(doc, start, end);
    let (index, offset) = position(doc, caret);
    let block = &doc.blocks[index];
    let kind = block.kind;
    let id = block.id;
    let len = block.len();

    if !kind.is_text() {
        let para = doc.alloc_id();
        let at = if offset == 0 { index } else { index + 1 };
        doc.blocks
            .insert(at, Block::text_block(para, BlockKind::Paragraph, ""));
        changed.push(para);
        return Outcome::changed(changed, Selection::caret(DocPosition::new(para, 0)));
    }

    // an empty list item leaves the list
    if len == 0 && kind.list_kind().is_some() {
        doc.blocks[index].set_kind(BlockKind::Paragraph);
        changed.push(id);
        return Outcome::changed(changed, Selection::caret(caret));
    }

    let next_kind = if kind.is_heading() {
        BlockKind::Paragraph
    } else {
        kind
    };
    let new_id = doc.alloc_id();
    changed.push(new_id);

    if offset == 0 && len > 0 {
        doc.blocks
            .insert(index, Block::text_block(new_id, next_kind, ""));
        return Outcome::changed(changed, Selection::caret(DocPosition::new(id, 0)));
    }

    let (text, styles) = doc.blocks[index].split_off(offset);
    let mut tail = Block::text_block(new_id, next_kind, "");
    tail.append(&text, &styles);
    changed.push(id);
    doc.blocks.insert(index + 1, tail);
    Outcome::changed(changed, Selection::caret(DocPosition::new(new_id, 0)))
}

fn delete_selection(doc: &mut Document, start: DocPosition, end: DocPosition) -> Outcome {
    let (si, so) = position(doc, start);
    let (ei, eo) = position(doc, end);
    if si == ei && protects_title(doc, si, so, eo) {
        return Outcome::suppressed(doc.selection);
    }
    let (caret, changed) = delete_span(doc, start, end);
    Outcome::changed(changed, Selection::caret(caret))
}

fn delete_backward(doc: &mut Document, start: DocPosition, end: DocPosition) -> Outcome {
    if start != end {
        return delete_selection(doc, start, end);
    }
    let (index, offset) = position(doc, start);
    let block = &doc.blocks[index];
    let id = block.id;

    if block.kind.is_text() && offset > 0 {
        let from = prev_boundary(&block.text, offset);
        if protects_title(doc, index, from, offset) {
            return Outcome::suppressed(doc.selection);
        }
        doc.blocks[index].delete_range(from, offset);
        return Outcome::changed(vec![id], Selection::caret(DocPosition::new(id, from)));
    }

    if !block.kind.is_text() && offset == 1 {
        doc.blocks.remove(index);
        doc.ensure_not_empty();
        let caret = match index.checked_sub(1).and_then(|prev| doc.blocks.get(prev)) {
            Some(prev) => DocPosition::new(prev.id, prev.len()),
            None => caret_near(doc, index),
        };
        return Outcome::changed(vec![id], Selection::caret(caret));
    }

    let Some(prev_index) = index.checked_sub(1) else {
        return Outcome::unchanged(doc.selection);
    };
    let prev = &doc.blocks[prev_index];
    let prev_id = prev.id;
    let prev_len = prev.len();
    match (prev.kind.is_text(), block.kind.is_text()) {
        (false, _) => {
            doc.blocks.remove(prev_index);
            Outcome::changed(vec![prev_id], Selection::caret(DocPosition::new(id, 0)))
        }
        (true, true) => {
            let current = doc.blocks.remove(index);
            doc.blocks[prev_index].append(&current.text, &current.styles);
            Outcome::changed(
                vec![prev_id, id],
                Selection::caret(DocPosition::new(prev_id, prev_len)),
            )
        }
        (true, false) => Outcome::unchanged(Selection::caret(DocPosition::new(prev_id, prev_len))),
    }
}

fn delete_forward(doc: &mut Document, start: DocPosition, end: DocPosition) -> Outcome {
    if start != end {
        return delete_selection(doc, start, end);
    }
    let (index, offset) = position(doc, start);
    let block = &doc.blocks[index];
    let id = block.id;
    let len = block.len();

    if block.kind.is_text() && offset < len {
        let to = next_boundary(&block.text, offset);
        if protects_title(doc, index, offset, to) {
            return Outcome::suppressed(doc.selection);
        }
        doc.blocks[index].delete_range(offset, to);
        return Outcome::changed(vec![id], Selection::caret(DocPosition::new(id, offset)));
    }

    if !block.kind.is_text() && offset == 0 {
        doc.blocks.remove(index);
        doc.ensure_not_empty();
        let caret = caret_near(doc, index);
        return Outcome::changed(vec![id], Selection::caret(caret));
    }

    let Some(next) = doc.blocks.get(index + 1) else {
        return Outcome::unchanged(doc.selection);
    };
    let next_id = next.id;
    match (block.kind.is_text(), next.kind.is_text()) {
        (_, false) => {
            doc.blocks.remove(index + 1);
            Outcome::changed(vec![next_id], Selection::caret(DocPosition::new(id, offset)))
        }
        (true, true) => {
            let next = doc.blocks.remove(index + 1);
            doc.blocks[index].append(&next.text, &next.styles);
            Outcome::changed(vec![id, next_id], Selection::caret(DocPosition::new(id, offset)))
        }
        (false, true) => Outcome::unchanged(Selection::caret(DocPosition::new(next_id, 0))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G'];

    fn doc_with_selection(markup: &str, needle: &str) -> Document {
        let mut doc = Document::from_markup(markup);
        let selection = doc.find(needle).unwrap();
        doc.set_selection(selection);
        doc
    }

    fn caret_at(doc: &mut Document, block: usize, offset: usize) {
        let id = doc.blocks()[block].id();
        doc.set_selection(Selection::caret(DocPosition::new(id, offset)));
    }

    #[test]
    fn test_toggle_bold_adds_then_removes() {
        // Given a heading with "graph" selected
        let mut doc = doc_with_selection("<h1>Geography</h1>", "graph");

        // When bold is toggled
        let patch = doc.apply(Cmd::ToggleBold).unwrap();

        // Then the selection is wrapped in strong
        assert_eq!(doc.to_markup(), "<h1>Geo<strong>graph</strong>y</h1>");
        assert_eq!(patch.changed, vec![doc.blocks()[0].id()]);
        assert_eq!(patch.version, 1);

        // And toggling again removes it
        doc.apply(Cmd::ToggleBold).unwrap();
        assert_eq!(doc.to_markup(), "<h1>Geography</h1>");
    }

    #[test]
    fn test_toggle_bold_partially_bold_selection_adds() {
        let mut doc = doc_with_selection("<p>ab<strong>cd</strong>ef</p>", "bcde");
        doc.apply(Cmd::ToggleBold).unwrap();
        assert_eq!(doc.to_markup(), "<p>a<strong>bcde</strong>f</p>");
    }

    #[test]
    fn test_toggle_italic_across_blocks() {
        let mut doc = Document::from_markup("<p>one</p><p>two</p>");
        let first = doc.blocks()[0].id();
        let second = doc.blocks()[1].id();
        doc.set_selection(Selection::new(DocPosition::new(second, 1), DocPosition::new(first, 1)));

        doc.apply(Cmd::ToggleItalic).unwrap();

        assert_eq!(doc.to_markup(), "<p>o<em>ne</em></p><p><em>t</em>wo</p>");
    }

    #[test]
    fn test_toggle_style_with_collapsed_selection_is_noop() {
        let mut doc = Document::from_markup("<p>text</p>");
        caret_at(&mut doc, 0, 2);
        let patch = doc.apply(Cmd::ToggleBold).unwrap();
        assert!(patch.is_noop());
        assert_eq!(patch.version, 0);
    }

    #[rstest]
    #[case(1, "<h1>x</h1>")]
    #[case(2, "<h2>x</h2>")]
    #[case(3, "<h3>x</h3>")]
    fn test_set_heading(#[case] level: u8, #[case] expected: &str) {
        let mut doc = Document::from_markup("<p>x</p>");
        caret_at(&mut doc, 0, 0);
        doc.apply(Cmd::SetHeading { level }).unwrap();
        assert_eq!(doc.to_markup(), expected);
    }

    #[rstest]
    #[case(0)]
    #[case(4)]
    fn test_set_heading_rejects_unknown_level(#[case] level: u8) {
        let mut doc = Document::from_markup("<p>x</p>");
        let err = doc.apply(Cmd::SetHeading { level }).unwrap_err();
        assert_eq!(err, CommandError::InvalidHeadingLevel(level));
        assert_eq!(doc.to_markup(), "<p>x</p>");
    }

    #[test]
    fn test_set_paragraph_touches_every_selected_block() {
        let mut doc = Document::from_markup("<h1>a</h1><h2>b</h2><h3>c</h3>");
        let first = doc.blocks()[0].id();
        let second = doc.blocks()[1].id();
        doc.set_selection(Selection::new(DocPosition::new(first, 0), DocPosition::new(second, 1)));

        doc.apply(Cmd::SetParagraph).unwrap();

        assert_eq!(doc.to_markup(), "<p>a</p><p>b</p><h3>c</h3>");
    }

    #[test]
    fn test_toggle_list_on_and_off() {
        let mut doc = Document::from_markup("<p>a</p><p>b</p>");
        let first = doc.blocks()[0].id();
        let second = doc.blocks()[1].id();
        doc.set_selection(Selection::new(DocPosition::new(first, 0), DocPosition::new(second, 0)));

        doc.apply(Cmd::ToggleList { kind: ListKind::Numbered }).unwrap();
        assert_eq!(doc.to_markup(), "<ol><li>a</li><li>b</li></ol>");

        doc.apply(Cmd::ToggleList { kind: ListKind::Bullet }).unwrap();
        assert_eq!(doc.to_markup(), "<ul><li>a</li><li>b</li></ul>");

        doc.apply(Cmd::ToggleList { kind: ListKind::Bullet }).unwrap();
        assert_eq!(doc.to_markup(), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_insert_text_extends_style_at_range_end() {
        let mut doc = Document::from_markup("<p><strong>bo</strong></p>");
        caret_at(&mut doc, 0, 2);

        let patch = doc.apply(Cmd::InsertText { text: "ld".to_string() }).unwrap();

        assert_eq!(doc.to_markup(), "<p><strong>bold</strong></p>");
        assert_eq!(patch.new_selection.focus.offset, 4);
    }

    #[test]
    fn test_insert_text_replaces_selection() {
        let mut doc = doc_with_selection("<p>hello world</p>", "world");
        doc.apply(Cmd::InsertText { text: "there".to_string() }).unwrap();
        assert_eq!(doc.to_markup(), "<p>hello there</p>");
    }

    #[test]
    fn test_insert_line_break_is_soft() {
        let mut doc = Document::from_markup("<p>ab</p>");
        caret_at(&mut doc, 0, 1);
        doc.apply(Cmd::InsertLineBreak).unwrap();
        assert_eq!(doc.blocks().len(), 1);
        assert_eq!(doc.blocks()[0].text(), "a\nb");
    }

    #[test]
    fn test_split_block_heading_continues_as_paragraph() {
        let mut doc = Document::from_markup("<h1>Title</h1>");
        caret_at(&mut doc, 0, 5);
        doc.apply(Cmd::SplitBlock).unwrap();
        doc.apply(Cmd::InsertText { text: "body".to_string() }).unwrap();
        assert_eq!(doc.to_markup(), "<h1>Title</h1><p>body</p>");
    }

    #[test]
    fn test_split_block_in_middle_keeps_styles() {
        let mut doc = Document::from_markup("<ul><li>a<em>bc</em>d</li></ul>");
        caret_at(&mut doc, 0, 2);
        doc.apply(Cmd::SplitBlock).unwrap();
        assert_eq!(doc.to_markup(), "<ul><li>a<em>b</em></li><li><em>c</em>d</li></ul>");
    }

    #[test]
    fn test_split_empty_list_item_leaves_list() {
        let mut doc = Document::from_markup("<ul><li>a</li><li></li></ul>");
        caret_at(&mut doc, 1, 0);
        doc.apply(Cmd::SplitBlock).unwrap();
        assert_eq!(doc.to_markup(), "<ul><li>a</li></ul><p></p>");
    }

    #[test]
    fn test_title_protection_suppresses_last_character_delete() {
        // Given a document holding only a one-character heading
        let mut doc = Document::from_markup("<h1>G</h1>");
        caret_at(&mut doc, 0, 1);

        // When deleting backward
        let patch = doc.apply(Cmd::DeleteBackward).unwrap();

        // Then nothing changes
        assert!(patch.suppressed);
        assert!(patch.is_noop());
        assert_eq!(doc.to_markup(), "<h1>G</h1>");

        caret_at(&mut doc, 0, 0);
        assert!(doc.apply(Cmd::DeleteForward).unwrap().suppressed);
        assert_eq!(doc.to_markup(), "<h1>G</h1>");
    }

    #[test]
    fn test_title_protection_suppresses_selecting_whole_title() {
        let mut doc = doc_with_selection("<h1>Geo</h1>", "Geo");
        assert!(doc.apply(Cmd::DeleteBackward).unwrap().suppressed);
        assert_eq!(doc.to_markup(), "<h1>Geo</h1>");
    }

    #[test]
    fn test_title_protection_allows_partial_delete() {
        let mut doc = Document::from_markup("<h1>Geo</h1>");
        caret_at(&mut doc, 0, 3);
        let patch = doc.apply(Cmd::DeleteBackward).unwrap();
        assert!(!patch.suppressed);
        assert_eq!(doc.to_markup(), "<h1>Ge</h1>");
    }

    #[test]
    fn test_heading_with_other_blocks_can_be_emptied() {
        let mut doc = Document::from_markup("<h1>G</h1><p>x</p>");
        caret_at(&mut doc, 0, 1);
        doc.apply(Cmd::DeleteBackward).unwrap();
        assert_eq!(doc.to_markup(), "<h1></h1><p>x</p>");
    }

    #[test]
    fn test_delete_backward_steps_over_surrogate_pairs() {
        let mut doc = Document::from_markup("<p>a🦀</p>");
        caret_at(&mut doc, 0, 3);
        doc.apply(Cmd::DeleteBackward).unwrap();
        assert_eq!(doc.blocks()[0].text(), "a");
    }

    #[test]
    fn test_delete_backward_at_block_start_merges() {
        let mut doc = Document::from_markup("<p>ab</p><p><strong>cd</strong></p>");
        caret_at(&mut doc, 1, 0);

        let patch = doc.apply(Cmd::DeleteBackward).unwrap();

        assert_eq!(doc.to_markup(), "<p>ab<strong>cd</strong></p>");
        assert_eq!(patch.new_selection.focus, DocPosition::new(doc.blocks()[0].id(), 2));
    }

    #[test]
    fn test_delete_forward_at_block_end_merges() {
        let mut doc = Document::from_markup("<h2>ab</h2><ul><li>cd</li></ul>");
        caret_at(&mut doc, 0, 2);
        doc.apply(Cmd::DeleteForward).unwrap();
        assert_eq!(doc.to_markup(), "<h2>abcd</h2>");
    }

    #[test]
    fn test_delete_at_document_edges_is_noop() {
        let mut doc = Document::from_markup("<p>ab</p>");
        caret_at(&mut doc, 0, 0);
        assert!(doc.apply(Cmd::DeleteBackward).unwrap().is_noop());
        caret_at(&mut doc, 0, 2);
        assert!(doc.apply(Cmd::DeleteForward).unwrap().is_noop());
    }

    #[test]
    fn test_delete_selection_across_blocks() {
        let mut doc = Document::from_markup("<p>abc</p><p>mid</p><p>xyz</p>");
        let first = doc.blocks()[0].id();
        let last = doc.blocks()[2].id();
        doc.set_selection(Selection::new(DocPosition::new(first, 1), DocPosition::new(last, 2)));

        let patch = doc.apply(Cmd::DeleteBackward).unwrap();

        assert_eq!(doc.to_markup(), "<p>az</p>");
        assert_eq!(patch.new_selection.focus, DocPosition::new(first, 1));
    }

    #[test]
    fn test_insert_image_splits_block() {
        // Given a caret in the middle of a paragraph
        let mut doc = Document::from_markup("<p>beforeafter</p>");
        caret_at(&mut doc, 0, 6);

        // When a small png is inserted
        let image = ImagePayload::new("image/png", PNG.to_vec());
        doc.apply(Cmd::InsertImage { image }).unwrap();

        // Then the paragraph is split around an embedded image
        assert_eq!(
            doc.to_markup(),
            r#"<p>before</p><img src="data:image/png;base64,iVBORw=="><p>after</p>"#
        );
        assert_eq!(doc.selection().focus, DocPosition::new(doc.blocks()[2].id(), 0));
    }

    #[test]
    fn test_insert_image_at_end_of_block() {
        let mut doc = Document::from_markup("<h1>T</h1>");
        caret_at(&mut doc, 0, 1);
        let image = ImagePayload::new("image/gif", b"GIF8".to_vec());

        doc.apply(Cmd::InsertImage { image }).unwrap();

        assert_eq!(
            doc.to_markup(),
            r#"<h1>T</h1><img src="data:image/gif;base64,R0lGOA==">"#
        );
        assert_eq!(doc.selection().focus, DocPosition::new(doc.blocks()[1].id(), 1));
    }

    #[rstest]
    #[case::not_an_image(ImagePayload::new("text/plain", b"hello".to_vec()))]
    #[case::exactly_at_limit(ImagePayload::new("image/png", vec![0; MAX_IMAGE_BYTES]))]
    #[case::over_limit(ImagePayload::new("image/jpeg", vec![0; MAX_IMAGE_BYTES + 1]))]
    fn test_insert_image_rejections_leave_document_unchanged(#[case] image: ImagePayload) {
        let mut doc = Document::from_markup("<h1>Geography</h1>");
        let err = doc.apply(Cmd::InsertImage { image }).unwrap_err();
        assert!(matches!(err, CommandError::ImageRejected(_)));
        assert_eq!(doc.to_markup(), "<h1>Geography</h1>");
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_image_just_below_limit_is_accepted() {
        let image = ImagePayload::new("image/png", vec![0; MAX_IMAGE_BYTES - 1]);
        assert_eq!(image.validate(), Ok(()));
    }

    #[test]
    fn test_delete_backward_after_image_removes_it() {
        let mut doc = Document::from_markup("<p>a</p>");
        caret_at(&mut doc, 0, 1);
        doc.apply(Cmd::InsertImage {
            image: ImagePayload::new("image/png", PNG.to_vec()),
        })
        .unwrap();

        doc.apply(Cmd::DeleteBackward).unwrap();

        assert_eq!(doc.to_markup(), "<p>a</p>");
        assert_eq!(doc.selection().focus, DocPosition::new(doc.blocks()[0].id(), 1));
    }

    #[test]
    fn test_typing_after_image_starts_paragraph() {
        let mut doc = Document::from_markup("<p>a</p>");
        caret_at(&mut doc, 0, 1);
        doc.apply(Cmd::InsertImage {
            image: ImagePayload::new("image/png", PNG.to_vec()),
        })
        .unwrap();

        doc.apply(Cmd::InsertText { text: "b".to_string() }).unwrap();

        assert_eq!(doc.blocks().len(), 3);
        assert_eq!(doc.blocks()[2].text(), "b");
    }

    #[test]
    fn test_stale_selection_is_replaced_by_document_end() {
        let mut doc = Document::from_markup("<p>a</p>");
        doc.set_selection(Selection::caret(DocPosition::new(BlockId(999), 0)));
        assert_eq!(doc.selection().focus, doc.end_position());
        assert!(doc.apply(Cmd::InsertText { text: "b".to_string() }).is_ok());
        assert_eq!(doc.blocks()[0].text(), "ab");
    }
}
