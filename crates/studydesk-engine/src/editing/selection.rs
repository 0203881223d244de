//! Selection tracking across surface rebuilds.
//!
//! The editing surface is rebuilt from the document after every accepted
//! edit, which destroys the host's notion of where the caret was. Before the
//! rebuild the selection is captured as structural paths (child indices from
//! the surface root) and afterwards the same paths are looked up in the new
//! tree. When a path no longer resolves, the caret goes to the end of the
//! document. Restoring never fails and never blocks editing.
//!
//! [`RenderMap`] is the other half: it translates between surface points in
//! the document's own render tree and model positions.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::editing::document::{BlockId, Document};
use crate::editing::text::{byte_to_utf16, utf16_len, utf16_to_byte};
use crate::markup::{Node, children_at_mut, is_void, node_at, parse_fragment, to_html};

/// A point in the surface tree with DOM range semantics: `offset` counts
/// UTF-16 units when `path` names a text node and children otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePoint {
    pub path: Vec<usize>,
    pub offset: usize,
}

impl NodePoint {
    pub fn new(path: Vec<usize>, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    pub anchor: NodePoint,
    pub focus: NodePoint,
}

impl SelectionSnapshot {
    pub fn new(anchor: NodePoint, focus: NodePoint) -> Self {
        Self { anchor, focus }
    }

    pub fn caret(point: NodePoint) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// A caret position in model coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocPosition {
    pub block: BlockId,
    /// UTF-16 offset into the block's text.
    pub offset: usize,
}

impl DocPosition {
    pub fn new(block: BlockId, offset: usize) -> Self {
        Self { block, offset }
    }
}

/// Model selection. The anchor stays put while the focus moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: DocPosition,
    pub focus: DocPosition,
}

impl Selection {
    pub fn new(anchor: DocPosition, focus: DocPosition) -> Self {
        Self { anchor, focus }
    }

    pub fn caret(pos: DocPosition) -> Self {
        Self {
            anchor: pos,
            focus: pos,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// The endpoint that comes first in `doc`.
    pub fn start(&self, doc: &Document) -> Option<DocPosition> {
        doc.ordered(self).map(|(start, _)| start)
    }

    /// The endpoint that comes last in `doc`.
    pub fn end(&self, doc: &Document) -> Option<DocPosition> {
        doc.ordered(self).map(|(_, end)| end)
    }
}

/// The host's editable surface.
///
/// The surface owns a node tree the user mutates directly and a selection in
/// that tree. The editor reads both after each input and replaces the tree
/// with its canonical rendering.
pub trait EditSurface {
    fn has_focus(&self) -> bool;

    /// The current selection, if any.
    fn selection(&self) -> Option<SelectionSnapshot>;

    fn set_selection(&mut self, selection: SelectionSnapshot);

    fn nodes(&self) -> &[Node];

    /// Replaces the whole surface tree.
    fn render(&mut self, nodes: Vec<Node>);

    fn markup(&self) -> String {
        to_html(self.nodes())
    }
}

/// An in-memory surface.
#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    nodes: Vec<Node>,
    selection: Option<SelectionSnapshot>,
    focused: bool,
    renders: usize,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    /// Replaces the tree as a user edit would, without sanitizing.
    pub fn set_markup(&mut self, markup: &str) {
        self.nodes = parse_fragment(markup);
    }

    /// Inserts `markup` at the caret without sanitizing, as a host paste
    /// does, and puts the caret after it. A range pastes at its focus.
    /// Returns `false` when there is no caret or it does not resolve.
    pub fn paste(&mut self, markup: &str) -> bool {
        let Some(caret) = self.selection.as_ref().map(|s| s.focus.clone()) else {
            return false;
        };
        match insert_fragment(&mut self.nodes, &caret, parse_fragment(markup)) {
            Some(end) => {
                self.selection = Some(SelectionSnapshot::caret(end));
                true
            }
            None => false,
        }
    }

    pub fn select(&mut self, anchor: NodePoint, focus: NodePoint) {
        self.selection = Some(SelectionSnapshot::new(anchor, focus));
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Number of full rebuilds so far.
    pub fn render_count(&self) -> usize {
        self.renders
    }
}

impl EditSurface for MemorySurface {
    fn has_focus(&self) -> bool {
        self.focused
    }

    fn selection(&self) -> Option<SelectionSnapshot> {
        self.selection.clone()
    }

    fn set_selection(&mut self, selection: SelectionSnapshot) {
        self.selection = Some(selection);
    }

    fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn render(&mut self, nodes: Vec<Node>) {
        self.nodes = nodes;
        self.renders += 1;
    }
}

/// Splices `fragment` into the tree at `point`, splitting the text node the
/// point is inside. Returns the point just after the inserted nodes.
fn insert_fragment(nodes: &mut Vec<Node>, point: &NodePoint, fragment: Vec<Node>) -> Option<NodePoint> {
    if !resolves(nodes, point) {
        return None;
    }
    if fragment.is_empty() {
        return Some(point.clone());
    }

    let split = match node_at(nodes, &point.path) {
        Some(Node::Text(text)) => {
            let byte = utf16_to_byte(text, point.offset);
            Some((
                text[..byte].to_string(),
                text[byte..].to_string(),
                byte_to_utf16(text, byte),
            ))
        }
        Some(Node::Element(el)) if is_void(&el.tag) => return None,
        _ => None,
    };

    let Some((before, after, offset)) = split else {
        let children = children_at_mut(nodes, &point.path)?;
        let index = point.offset.min(children.len());
        let end = index + fragment.len();
        children.splice(index..index, fragment);
        return Some(NodePoint::new(point.path.clone(), end));
    };

    let (index, parent) = point.path.split_last()?;
    let children = children_at_mut(nodes, parent)?;

    if let [Node::Text(pasted)] = fragment.as_slice() {
        children[*index] = Node::text(format!("{before}{pasted}{after}"));
        return Some(NodePoint::new(
            point.path.clone(),
            offset + utf16_len(pasted),
        ));
    }

    let mut spliced = Vec::with_capacity(fragment.len() + 2);
    if !before.is_empty() {
        spliced.push(Node::text(before));
    }
    let end = index + spliced.len() + fragment.len();
    spliced.extend(fragment);
    if !after.is_empty() {
        spliced.push(Node::text(after));
    }
    children.splice(*index..=*index, spliced);
    Some(NodePoint::new(parent.to_vec(), end))
}

/// Records the surface selection. `None` when the surface is unfocused, has
/// no selection, or reports points outside its own tree.
pub fn capture(surface: &impl EditSurface) -> Option<SelectionSnapshot> {
    if !surface.has_focus() {
        return None;
    }
    let snapshot = surface.selection()?;
    let nodes = surface.nodes();
    (resolves(nodes, &snapshot.anchor) && resolves(nodes, &snapshot.focus)).then_some(snapshot)
}

/// Re-establishes `snapshot` on the surface. When either point no longer
/// resolves the caret is put at the end of the document and `false` is
/// returned.
pub fn restore(surface: &mut impl EditSurface, snapshot: &SelectionSnapshot) -> bool {
    let nodes = surface.nodes();
    if resolves(nodes, &snapshot.anchor) && resolves(nodes, &snapshot.focus) {
        surface.set_selection(snapshot.clone());
        return true;
    }
    let end = end_of_document(nodes);
    warn!(
        "selection {:?} no longer resolves, caret moved to {:?}",
        snapshot, end
    );
    surface.set_selection(SelectionSnapshot::caret(end));
    false
}

/// Whether `point` names an existing node and an offset inside it.
pub fn resolves(nodes: &[Node], point: &NodePoint) -> bool {
    if point.path.is_empty() {
        return point.offset <= nodes.len();
    }
    node_at(nodes, &point.path).is_some_and(|node| point.offset <= node.offset_len())
}

/// The last caret position in the tree: the end of the last text node, or
/// the position after a trailing void element, or inside a trailing empty
/// element.
pub fn end_of_document(nodes: &[Node]) -> NodePoint {
    let mut path = Vec::new();
    let mut children = nodes;
    loop {
        let Some(last) = children.last() else {
            return NodePoint::new(path, 0);
        };
        let index = children.len() - 1;
        match last {
            Node::Text(text) => {
                path.push(index);
                return NodePoint::new(path, utf16_len(text));
            }
            Node::Element(el) if is_void(&el.tag) => {
                return NodePoint::new(path, children.len());
            }
            Node::Element(el) => {
                path.push(index);
                children = &el.children;
            }
        }
    }
}

/// A run of block text displayed by one text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    /// Index of the run's outermost node among the block element's children.
    pub child: usize,
    /// Path of the text node.
    pub node: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BlockEntry {
    block: BlockId,
    path: Vec<usize>,
    image: bool,
    len: usize,
    segments: Vec<Segment>,
}

/// Where each block lives in a rendered tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderMap {
    entries: Vec<BlockEntry>,
}

impl RenderMap {
    pub(crate) fn push_text(&mut self, block: BlockId, path: Vec<usize>, len: usize, segments: Vec<Segment>) {
        self.entries.push(BlockEntry {
            block,
            path,
            image: false,
            len,
            segments,
        });
    }

    pub(crate) fn push_image(&mut self, block: BlockId, path: Vec<usize>) {
        self.entries.push(BlockEntry {
            block,
            path,
            image: true,
            len: 1,
            segments: Vec::new(),
        });
    }

    /// Model position of a surface point.
    pub fn locate(&self, point: &NodePoint) -> Option<DocPosition> {
        let entry = self
            .entries
            .iter()
            .filter(|e| point.path.starts_with(&e.path))
            .max_by_key(|e| e.path.len());

        let Some(entry) = entry else {
            return self.locate_between(point);
        };
        if entry.image {
            return Some(DocPosition::new(entry.block, 0));
        }

        let rest = &point.path[entry.path.len()..];
        let offset = match rest.first() {
            None => entry
                .segments
                .iter()
                .find(|s| s.child == point.offset)
                .map_or(entry.len, |s| s.start),
            Some(child) => {
                let seg = entry.segments.iter().find(|s| s.child == *child)?;
                if point.path == seg.node {
                    seg.start + point.offset.min(seg.end - seg.start)
                } else if point.offset == 0 {
                    seg.start
                } else {
                    seg.end
                }
            }
        };
        Some(DocPosition::new(entry.block, offset))
    }

    /// A point between blocks: the root, or a list container.
    fn locate_between(&self, point: &NodePoint) -> Option<DocPosition> {
        let mut target = point.path.clone();
        target.push(point.offset);

        let after = self.entries.iter().find(|e| e.path >= target);
        let before = self.entries.iter().rev().find(|e| e.path < target);
        match (point.offset, after, before) {
            (0, Some(e), _) | (_, Some(e), None) => Some(DocPosition::new(e.block, 0)),
            (_, _, Some(e)) => Some(DocPosition::new(e.block, e.len)),
            (_, None, None) => None,
        }
    }

    /// Surface point of a model position.
    pub fn point_for(&self, pos: DocPosition) -> Option<NodePoint> {
        let entry = self.entries.iter().find(|e| e.block == pos.block)?;
        if entry.image {
            let (index, parent) = entry.path.split_last()?;
            return Some(NodePoint::new(parent.to_vec(), index + pos.offset.min(1)));
        }

        let offset = pos.offset.min(entry.len);
        match entry.segments.iter().find(|s| offset <= s.end) {
            Some(seg) => Some(NodePoint::new(seg.node.clone(), offset - seg.start)),
            None => Some(NodePoint::new(entry.path.clone(), 0)),
        }
    }
}
