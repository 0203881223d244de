use crate::editing::text::utf16_len;

/// Elements that never have children or a closing tag.
pub const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// A node in a parsed markup fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with a lower-cased tag name, attributes in source order, and
/// children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    /// First value of the named attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn element(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element(Element::new(tag).with_children(children))
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.as_element().map(|el| el.tag.as_str())
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(el) => &el.children,
            Node::Text(_) => &[],
        }
    }

    /// Largest valid offset inside this node: UTF-16 length for text, child
    /// count for elements.
    pub fn offset_len(&self) -> usize {
        match self {
            Node::Text(text) => utf16_len(text),
            Node::Element(el) => el.children.len(),
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(std::slice::from_ref(self), &mut out);
        out
    }
}

/// Concatenated text of all text nodes, in document order.
pub fn text_content(nodes: &[Node]) -> String {
    let mut out = String::new();
    collect_text(nodes, &mut out);
    out
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

/// Follows a child-index path from the fragment root. The empty path names
/// the root itself, which is not a node, so it resolves to `None`.
pub fn node_at<'a>(nodes: &'a [Node], path: &[usize]) -> Option<&'a Node> {
    let (first, rest) = path.split_first()?;
    let mut node = nodes.get(*first)?;
    for index in rest {
        node = node.children().get(*index)?;
    }
    Some(node)
}

/// Mutable children of the container at `path`; the empty path is the root.
pub fn children_at_mut<'a>(nodes: &'a mut Vec<Node>, path: &[usize]) -> Option<&'a mut Vec<Node>> {
    let mut children = nodes;
    for index in path {
        children = match children.get_mut(*index)? {
            Node::Element(el) => &mut el.children,
            Node::Text(_) => return None,
        };
    }
    Some(children)
}

/// Every element tag in the fragment, depth first.
pub fn tags(nodes: &[Node]) -> Vec<&str> {
    let mut out = Vec::new();
    collect_tags(nodes, &mut out);
    out
}

fn collect_tags<'a>(nodes: &'a [Node], out: &mut Vec<&'a str>) {
    for node in nodes {
        if let Node::Element(el) = node {
            out.push(el.tag.as_str());
            collect_tags(&el.children, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Node> {
        vec![
            Node::element("h1", vec![Node::text("Title")]),
            Node::element(
                "ul",
                vec![Node::element(
                    "li",
                    vec![
                        Node::text("a "),
                        Node::element("strong", vec![Node::text("b")]),
                    ],
                )],
            ),
        ]
    }

    #[test]
    fn node_at_follows_child_indices() {
        let nodes = sample();
        assert_eq!(node_at(&nodes, &[0, 0]), Some(&Node::text("Title")));
        assert_eq!(node_at(&nodes, &[1, 0, 1]).and_then(Node::tag), Some("strong"));
        assert_eq!(node_at(&nodes, &[1, 0, 1, 0]), Some(&Node::text("b")));
    }

    #[test]
    fn node_at_rejects_missing_or_root_paths() {
        let nodes = sample();
        assert_eq!(node_at(&nodes, &[]), None);
        assert_eq!(node_at(&nodes, &[2]), None);
        assert_eq!(node_at(&nodes, &[0, 0, 0]), None);
    }

    #[test]
    fn children_at_mut_reaches_containers_only() {
        let mut nodes = sample();
        assert_eq!(children_at_mut(&mut nodes, &[]).map(|c| c.len()), Some(2));
        assert_eq!(children_at_mut(&mut nodes, &[1, 0]).map(|c| c.len()), Some(2));
        assert!(children_at_mut(&mut nodes, &[0, 0]).is_none());

        children_at_mut(&mut nodes, &[0]).unwrap().push(Node::text("!"));
        assert_eq!(text_content(&nodes[..1]), "Title!");
    }

    #[test]
    fn offset_len_counts_utf16_units_for_text() {
        assert_eq!(Node::text("héllo").offset_len(), 5);
        assert_eq!(Node::text("🦀").offset_len(), 2);
        assert_eq!(sample()[1].offset_len(), 1);
    }

    #[test]
    fn text_content_concatenates_in_order() {
        assert_eq!(text_content(&sample()), "Titlea b");
    }

    #[test]
    fn tags_lists_every_element() {
        assert_eq!(tags(&sample()), vec!["h1", "ul", "li", "strong"]);
    }

    #[test]
    fn attr_returns_first_match() {
        let img = Element::new("img")
            .with_attr("src", "data:image/png;base64,AA==")
            .with_attr("src", "ignored");
        assert_eq!(img.attr("src"), Some("data:image/png;base64,AA=="));
        assert_eq!(img.attr("alt"), None);
    }
}
