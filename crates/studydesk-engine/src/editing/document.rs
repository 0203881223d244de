use serde::{Deserialize, Serialize};

use crate::editing::selection::{DocPosition, NodePoint, RenderMap, Segment, Selection};
use crate::editing::text::{byte_to_utf16, next_boundary, prev_boundary, utf16_len, utf16_to_byte};
use crate::editing::{Cmd, CommandError, Patch};
use crate::markup::{Element, Node, parse_fragment, to_html};
use crate::sanitize::sanitize_nodes;

/// Stable block identifier, unique within a document and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletItem,
    NumberedItem,
    Quote,
    Code,
    Image,
}

impl BlockKind {
    /// Heading kind for `level` 1..=3.
    pub fn heading(level: u8) -> Option<Self> {
        match level {
            1 => Some(BlockKind::Heading1),
            2 => Some(BlockKind::Heading2),
            3 => Some(BlockKind::Heading3),
            _ => None,
        }
    }

    pub fn heading_level(self) -> Option<u8> {
        match self {
            BlockKind::Heading1 => Some(1),
            BlockKind::Heading2 => Some(2),
            BlockKind::Heading3 => Some(3),
            _ => None,
        }
    }

    pub fn is_heading(self) -> bool {
        self.heading_level().is_some()
    }

    pub fn is_text(self) -> bool {
        self != BlockKind::Image
    }

    pub fn list_kind(self) -> Option<ListKind> {
        match self {
            BlockKind::BulletItem => Some(ListKind::Bullet),
            BlockKind::NumberedItem => Some(ListKind::Numbered),
            _ => None,
        }
    }

    /// Element the block is flattened to. Quote and code blocks have no
    /// allow-listed container and flatten to paragraphs.
    pub(crate) fn tag(self) -> &'static str {
        match self {
            BlockKind::Heading1 => "h1",
            BlockKind::Heading2 => "h2",
            BlockKind::Heading3 => "h3",
            BlockKind::Paragraph | BlockKind::Quote | BlockKind::Code => "p",
            BlockKind::BulletItem | BlockKind::NumberedItem => "li",
            BlockKind::Image => "img",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKind {
    Bullet,
    Numbered,
}

impl ListKind {
    pub fn item_kind(self) -> BlockKind {
        match self {
            ListKind::Bullet => BlockKind::BulletItem,
            ListKind::Numbered => BlockKind::NumberedItem,
        }
    }

    pub(crate) fn tag(self) -> &'static str {
        match self {
            ListKind::Bullet => "ul",
            ListKind::Numbered => "ol",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StyleKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
}

/// A styled span of block text, in UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRange {
    pub kind: StyleKind,
    pub start: usize,
    pub end: usize,
}

impl StyleRange {
    pub fn new(kind: StyleKind, start: usize, end: usize) -> Self {
        Self { kind, start, end }
    }
}

/// One block of the document.
///
/// Style ranges are kept normalized: in bounds, non-empty, and for each kind
/// sorted with overlapping or touching ranges merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) kind: BlockKind,
    pub(crate) text: String,
    pub(crate) styles: Vec<StyleRange>,
    pub(crate) image: Option<String>,
}

impl Block {
    pub(crate) fn text_block(id: BlockId, kind: BlockKind, text: &str) -> Self {
        Self {
            id,
            kind,
            text: text.to_string(),
            styles: Vec::new(),
            image: None,
        }
    }

    pub(crate) fn image_block(id: BlockId, data_uri: &str) -> Self {
        Self {
            id,
            kind: BlockKind::Image,
            text: String::new(),
            styles: Vec::new(),
            image: Some(data_uri.to_string()),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn styles(&self) -> &[StyleRange] {
        &self.styles
    }

    /// Data URI of an image block.
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Largest caret offset in the block. An image block has two caret
    /// positions, before (0) and after (1).
    pub fn len(&self) -> usize {
        if self.kind == BlockKind::Image {
            1
        } else {
            utf16_len(&self.text)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind != BlockKind::Image && self.text.is_empty()
    }

    /// Whether the whole of `start..end` carries `kind`.
    pub fn has_style(&self, kind: StyleKind, start: usize, end: usize) -> bool {
        start < end
            && self
                .styles
                .iter()
                .any(|r| r.kind == kind && r.start <= start && r.end >= end)
    }

    pub(crate) fn set_kind(&mut self, kind: BlockKind) {
        self.kind = kind;
    }

    /// Appends text carrying every style in `styles`.
    pub(crate) fn push_styled(&mut self, text: &str, styles: &[StyleKind]) {
        let start = utf16_len(&self.text);
        self.text.push_str(text);
        let end = start + utf16_len(text);
        if start < end {
            for kind in styles {
                self.styles.push(StyleRange::new(*kind, start, end));
            }
        }
    }

    /// Inserts `text` at UTF-16 offset `at`. A range the insertion lands
    /// inside or at the end of grows; ranges after it shift.
    pub(crate) fn insert_text(&mut self, at: usize, text: &str) {
        let byte = utf16_to_byte(&self.text, at);
        let at = byte_to_utf16(&self.text, byte);
        self.text.insert_str(byte, text);
        let n = utf16_len(text);
        for range in &mut self.styles {
            if at <= range.start {
                range.start += n;
                range.end += n;
            } else if at <= range.end {
                range.end += n;
            }
        }
    }

    /// Deletes UTF-16 range `start..end`, shrinking style ranges and dropping
    /// those left empty.
    pub(crate) fn delete_range(&mut self, start: usize, end: usize) {
        let start_byte = utf16_to_byte(&self.text, start);
        let end_byte = utf16_to_byte(&self.text, end.max(start));
        if start_byte >= end_byte {
            return;
        }
        let start = byte_to_utf16(&self.text, start_byte);
        let end = byte_to_utf16(&self.text, end_byte);
        self.text.replace_range(start_byte..end_byte, "");

        let removed = end - start;
        let map = |x: usize| {
            if x <= start {
                x
            } else if x >= end {
                x - removed
            } else {
                start
            }
        };
        for range in &mut self.styles {
            range.start = map(range.start);
            range.end = map(range.end);
        }
        self.normalize();
    }

    pub(crate) fn add_style(&mut self, kind: StyleKind, start: usize, end: usize) {
        self.styles.push(StyleRange::new(kind, start, end));
        self.normalize();
    }

    pub(crate) fn remove_style(&mut self, kind: StyleKind, start: usize, end: usize) {
        let mut kept = Vec::with_capacity(self.styles.len() + 1);
        for range in self.styles.drain(..) {
            if range.kind != kind || range.end <= start || range.start >= end {
                kept.push(range);
                continue;
            }
            if range.start < start {
                kept.push(StyleRange::new(kind, range.start, start));
            }
            if range.end > end {
                kept.push(StyleRange::new(kind, end, range.end));
            }
        }
        self.styles = kept;
        self.normalize();
    }

    /// Splits the block at UTF-16 offset `at`, returning the tail's text and
    /// styles rebased to zero.
    pub(crate) fn split_off(&mut self, at: usize) -> (String, Vec<StyleRange>) {
        let byte = utf16_to_byte(&self.text, at);
        let at = byte_to_utf16(&self.text, byte);
        let tail = self.text.split_off(byte);

        let mut tail_styles = Vec::new();
        for range in &mut self.styles {
            if range.end > at {
                tail_styles.push(StyleRange::new(
                    range.kind,
                    range.start.max(at) - at,
                    range.end - at,
                ));
                range.end = at;
            }
        }
        self.normalize();
        (tail, tail_styles)
    }

    /// Appends another block's text and styles.
    pub(crate) fn append(&mut self, text: &str, styles: &[StyleRange]) {
        let offset = utf16_len(&self.text);
        self.text.push_str(text);
        for range in styles {
            self.styles
                .push(StyleRange::new(range.kind, range.start + offset, range.end + offset));
        }
        self.normalize();
    }

    pub(crate) fn normalize(&mut self) {
        let len = utf16_len(&self.text);
        let mut ranges: Vec<StyleRange> = self
            .styles
            .drain(..)
            .map(|mut r| {
                r.end = r.end.min(len);
                r.start = r.start.min(r.end);
                r
            })
            .filter(|r| r.start < r.end)
            .collect();
        ranges.sort_by_key(|r| (r.kind, r.start, r.end));

        let mut merged: Vec<StyleRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if last.kind == range.kind && range.start <= last.end => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }
        self.styles = merged;
    }
}

/// The editable note: an ordered, never empty sequence of blocks plus the
/// model selection.
///
/// The block sequence is the source of truth. The surface shows
/// [`Document::render_tree`], and the persisted form is
/// [`Document::to_markup`], which is always a fixed point of the sanitizer.
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) blocks: Vec<Block>,
    pub(crate) selection: Selection,
    pub(crate) next_id: u64,
    pub(crate) version: u64,
}

impl Document {
    /// A document holding a single heading-1 block.
    pub fn new_titled(title: &str) -> Self {
        Self::from_blocks(vec![Block::text_block(
            BlockId(0),
            BlockKind::Heading1,
            title,
        )])
    }

    /// Builds a document from arbitrary markup. The markup is sanitized
    /// first; markup with no content yields one empty paragraph.
    pub fn from_markup(markup: &str) -> Self {
        Self::from_blocks(project(&sanitize_nodes(parse_fragment(markup))))
    }

    /// Takes ownership of drafted blocks, assigning fresh ids.
    pub(crate) fn from_blocks(drafts: Vec<Block>) -> Self {
        let mut doc = Self {
            blocks: Vec::with_capacity(drafts.len().max(1)),
            selection: Selection::caret(DocPosition::new(BlockId(0), 0)),
            next_id: 1,
            version: 0,
        };
        for mut block in drafts {
            block.id = doc.alloc_id();
            doc.blocks.push(block);
        }
        doc.ensure_not_empty();
        doc.selection = Selection::caret(doc.end_position());
        doc
    }

    pub(crate) fn alloc_id(&mut self) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn ensure_not_empty(&mut self) {
        if self.blocks.is_empty() {
            let id = self.alloc_id();
            self.blocks
                .push(Block::text_block(id, BlockKind::Paragraph, ""));
        }
    }

    /// Replaces the content with the projection of `markup`, keeping the id
    /// of every block whose index and kind are unchanged. Returns the ids of
    /// blocks that are new or differ.
    pub fn replace_markup(&mut self, markup: &str) -> Vec<BlockId> {
        let drafts = project(&sanitize_nodes(parse_fragment(markup)));
        let old = std::mem::take(&mut self.blocks);
        let mut changed = Vec::new();

        for (index, mut block) in drafts.into_iter().enumerate() {
            match old.get(index) {
                Some(prev) if prev.kind == block.kind => {
                    block.id = prev.id;
                    if *prev != block {
                        changed.push(block.id);
                    }
                }
                _ => {
                    block.id = self.alloc_id();
                    changed.push(block.id);
                }
            }
            self.blocks.push(block);
        }
        self.ensure_not_empty();
        self.version += 1;
        self.clamp_selection();
        changed
    }

    /// Sanitized markup for the whole document.
    pub fn to_markup(&self) -> String {
        to_html(&self.render_tree())
    }

    /// The node tree the editing surface shows.
    pub fn render_tree(&self) -> Vec<Node> {
        self.render().0
    }

    /// The surface node tree together with the map from blocks to the nodes
    /// that display them.
    pub fn render(&self) -> (Vec<Node>, RenderMap) {
        let mut nodes: Vec<Node> = Vec::new();
        let mut map = RenderMap::default();
        let mut i = 0;

        while let Some(block) = self.blocks.get(i) {
            if let Some(list) = block.kind.list_kind() {
                let list_index = nodes.len();
                let mut items = Vec::new();
                while let Some(item) = self
                    .blocks
                    .get(i)
                    .filter(|b| b.kind.list_kind() == Some(list))
                {
                    let path = vec![list_index, items.len()];
                    let (children, segments) = inline_nodes(item, &path);
                    map.push_text(item.id, path, item.len(), segments);
                    items.push(Node::element("li", children));
                    i += 1;
                }
                nodes.push(Node::element(list.tag(), items));
                continue;
            }

            let path = vec![nodes.len()];
            match &block.image {
                Some(src) => {
                    map.push_image(block.id, path);
                    nodes.push(Node::Element(Element::new("img").with_attr("src", src)));
                }
                None => {
                    let (children, segments) = inline_nodes(block, &path);
                    map.push_text(block.id, path, block.len(), segments);
                    nodes.push(Node::element(block.kind.tag(), children));
                }
            }
            i += 1;
        }

        (nodes, map)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_index(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Sets the model selection. Positions that do not name a block are
    /// replaced by the end of the document.
    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
        self.clamp_selection();
    }

    pub fn start_position(&self) -> DocPosition {
        match self.blocks.first() {
            Some(block) => DocPosition::new(block.id, 0),
            None => DocPosition::new(BlockId(0), 0),
        }
    }

    pub fn end_position(&self) -> DocPosition {
        match self.blocks.last() {
            Some(block) => DocPosition::new(block.id, block.len()),
            None => DocPosition::new(BlockId(0), 0),
        }
    }

    /// Block index and clamped offset of a position.
    pub(crate) fn resolve(&self, pos: DocPosition) -> Option<(usize, usize)> {
        let index = self.block_index(pos.block)?;
        Some((index, pos.offset.min(self.blocks[index].len())))
    }

    /// Selection endpoints in document order.
    pub fn ordered(&self, selection: &Selection) -> Option<(DocPosition, DocPosition)> {
        let anchor = self.resolve(selection.anchor)?;
        let focus = self.resolve(selection.focus)?;
        let (start, end) = if anchor <= focus {
            (anchor, focus)
        } else {
            (focus, anchor)
        };
        Some((
            DocPosition::new(self.blocks[start.0].id, start.1),
            DocPosition::new(self.blocks[end.0].id, end.1),
        ))
    }

    fn clamp_selection(&mut self) {
        let end = self.end_position();
        let clamp = |doc: &Self, pos: DocPosition| match doc.resolve(pos) {
            Some((index, offset)) => DocPosition::new(doc.blocks[index].id, offset),
            None => end,
        };
        self.selection = Selection::new(
            clamp(self, self.selection.anchor),
            clamp(self, self.selection.focus),
        );
    }

    /// Selection spanning the first occurrence of `needle` inside one block.
    pub fn find(&self, needle: &str) -> Option<Selection> {
        if needle.is_empty() {
            return None;
        }
        self.blocks.iter().find_map(|block| {
            let byte = block.text.find(needle)?;
            let start = byte_to_utf16(&block.text, byte);
            let end = start + utf16_len(needle);
            Some(Selection::new(
                DocPosition::new(block.id, start),
                DocPosition::new(block.id, end),
            ))
        })
    }

    /// One character before `pos`, crossing to the end of the previous block
    /// from offset zero.
    pub fn position_before(&self, pos: DocPosition) -> DocPosition {
        let Some((index, offset)) = self.resolve(pos) else {
            return self.end_position();
        };
        let block = &self.blocks[index];
        if offset > 0 {
            return DocPosition::new(block.id, prev_boundary(&block.text, offset));
        }
        match index.checked_sub(1).map(|prev| &self.blocks[prev]) {
            Some(prev) => DocPosition::new(prev.id, prev.len()),
            None => DocPosition::new(block.id, 0),
        }
    }

    /// One character after `pos`, crossing to the start of the next block
    /// from the end of a block.
    pub fn position_after(&self, pos: DocPosition) -> DocPosition {
        let Some((index, offset)) = self.resolve(pos) else {
            return self.end_position();
        };
        let block = &self.blocks[index];
        if offset < block.len() {
            let next = match block.image {
                Some(_) => 1,
                None => next_boundary(&block.text, offset),
            };
            return DocPosition::new(block.id, next);
        }
        match self.blocks.get(index + 1) {
            Some(next) => DocPosition::new(next.id, 0),
            None => DocPosition::new(block.id, offset),
        }
    }

    /// The same offset in the previous block, clamped to its length.
    pub fn position_above(&self, pos: DocPosition) -> DocPosition {
        match self.resolve(pos) {
            Some((0, _)) => self.start_position(),
            Some((index, offset)) => self.clamped(index - 1, offset),
            None => self.end_position(),
        }
    }

    /// The same offset in the next block, clamped to its length.
    pub fn position_below(&self, pos: DocPosition) -> DocPosition {
        match self.resolve(pos) {
            Some((index, offset)) if index + 1 < self.blocks.len() => self.clamped(index + 1, offset),
            _ => self.end_position(),
        }
    }

    fn clamped(&self, index: usize, offset: usize) -> DocPosition {
        let block = &self.blocks[index];
        let offset = match block.image {
            Some(_) => offset.min(1),
            None => utf16_len(&block.text[..utf16_to_byte(&block.text, offset)]),
        };
        DocPosition::new(block.id, offset)
    }

    /// Maps a surface point in [`Document::render_tree`] to a model position.
    pub fn locate(&self, point: &NodePoint) -> Option<DocPosition> {
        self.render().1.locate(point)
    }

    /// Maps a model position to a point in [`Document::render_tree`].
    pub fn point_for(&self, pos: DocPosition) -> Option<NodePoint> {
        self.render().1.point_for(pos)
    }

    /// Applies a command at the current selection.
    pub fn apply(&mut self, cmd: Cmd) -> Result<Patch, CommandError> {
        crate::editing::commands::apply(self, cmd)
    }
}

/// Builds the inline children of a text block and the segment table that
/// maps UTF-16 offsets to the text nodes holding them.
fn inline_nodes(block: &Block, path: &[usize]) -> (Vec<Node>, Vec<Segment>) {
    let len = block.len();
    let mut cuts = vec![0, len];
    for range in &block.styles {
        if matches!(range.kind, StyleKind::Bold | StyleKind::Italic) {
            cuts.push(range.start);
            cuts.push(range.end);
        }
    }
    cuts.sort_unstable();
    cuts.dedup();

    let mut runs: Vec<(usize, usize, bool, bool)> = Vec::new();
    for window in cuts.windows(2) {
        let (start, end) = (window[0], window[1]);
        if start >= end {
            continue;
        }
        let bold = block.has_style(StyleKind::Bold, start, end);
        let italic = block.has_style(StyleKind::Italic, start, end);
        match runs.last_mut() {
            Some(last) if last.1 == start && last.2 == bold && last.3 == italic => last.1 = end,
            _ => runs.push((start, end, bold, italic)),
        }
    }

    let mut nodes = Vec::with_capacity(runs.len());
    let mut segments = Vec::with_capacity(runs.len());
    for (child, (start, end, bold, italic)) in runs.into_iter().enumerate() {
        let text = &block.text[utf16_to_byte(&block.text, start)..utf16_to_byte(&block.text, end)];
        let mut node_path = path.to_vec();
        node_path.push(child);

        let mut node = Node::text(text);
        if italic {
            node = Node::element("em", vec![node]);
            node_path.push(0);
        }
        if bold {
            node = Node::element("strong", vec![node]);
            node_path.push(0);
        }
        nodes.push(node);
        segments.push(Segment {
            start,
            end,
            child,
            node: node_path,
        });
    }
    (nodes, segments)
}

/// Projects a sanitized fragment onto blocks. Ids are left unassigned.
pub(crate) fn project(nodes: &[Node]) -> Vec<Block> {
    let mut projector = Projector::default();
    projector.walk(nodes, &mut Vec::new());
    projector.close();
    projector.blocks
}

#[derive(Default)]
struct Projector {
    blocks: Vec<Block>,
    open: Option<Block>,
    /// The open block came from its own element rather than loose content.
    explicit: bool,
    /// Kind to continue with when content follows a nested block.
    resume: Option<BlockKind>,
    lists: Vec<ListKind>,
}

impl Projector {
    fn walk(&mut self, nodes: &[Node], styles: &mut Vec<StyleKind>) {
        for node in nodes {
            match node {
                Node::Text(text) => self.push_text(text, styles),
                Node::Element(el) => self.element(el, styles),
            }
        }
    }

    fn element(&mut self, el: &Element, styles: &mut Vec<StyleKind>) {
        let kind = match el.tag.as_str() {
            "strong" | "em" => {
                styles.push(if el.tag == "strong" {
                    StyleKind::Bold
                } else {
                    StyleKind::Italic
                });
                self.walk(&el.children, styles);
                styles.pop();
                return;
            }
            "ul" | "ol" => {
                let resume = self.split();
                self.lists.push(if el.tag == "ul" {
                    ListKind::Bullet
                } else {
                    ListKind::Numbered
                });
                self.walk(&el.children, styles);
                self.lists.pop();
                self.split();
                self.resume = resume;
                return;
            }
            "img" => {
                let resume = self.split();
                if let Some(src) = el.attr("src") {
                    self.blocks.push(Block::image_block(BlockId(0), src));
                }
                self.resume = resume;
                return;
            }
            "h1" => BlockKind::Heading1,
            "h2" => BlockKind::Heading2,
            "h3" => BlockKind::Heading3,
            "p" => BlockKind::Paragraph,
            "li" => self
                .lists
                .last()
                .copied()
                .unwrap_or(ListKind::Bullet)
                .item_kind(),
            _ => {
                self.walk(&el.children, styles);
                return;
            }
        };

        let resume = self.split();
        self.open = Some(Block::text_block(BlockId(0), kind, ""));
        self.explicit = true;
        self.walk(&el.children, styles);
        self.close();
        self.resume = resume;
    }

    fn push_text(&mut self, text: &str, styles: &[StyleKind]) {
        if self.open.is_none() {
            if text.trim().is_empty() {
                return;
            }
            let kind = self.resume.take().unwrap_or(BlockKind::Paragraph);
            self.open = Some(Block::text_block(BlockId(0), kind, ""));
        }
        if let Some(block) = self.open.as_mut() {
            block.push_styled(text, styles);
        }
    }

    /// Ends the open block because a nested block starts inside it. Returns
    /// the kind content after the nested block continues with.
    fn split(&mut self) -> Option<BlockKind> {
        let resume = self.open.as_ref().map(Block::kind).or(self.resume);
        if let Some(block) = self.open.take()
            && !block.text.is_empty()
        {
            self.finish(block);
        }
        self.explicit = false;
        self.resume = None;
        resume
    }

    fn close(&mut self) {
        if let Some(block) = self.open.take()
            && (self.explicit || !block.text.is_empty())
        {
            self.finish(block);
        }
        self.explicit = false;
        self.resume = None;
    }

    fn finish(&mut self, mut block: Block) {
        block.normalize();
        self.blocks.push(block);
    }
}
