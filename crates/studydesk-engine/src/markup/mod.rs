//! Markup fragments: a small node tree, a permissive parser, and a
//! serializer whose output the parser reads back to the same tree.

pub mod cursor;
pub mod node;
pub mod parser;

pub use node::{Element, Node, children_at_mut, is_void, node_at, tags, text_content};
pub use parser::parse_fragment;

/// Serializes a node tree to markup.
///
/// Text is entity-escaped, attributes are always double quoted, and void
/// elements get no closing tag.
pub fn to_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_nodes(nodes, &mut out);
    out
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(&html_escape::encode_text(text)),
            Node::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if is_void(&el.tag) {
                    continue;
                }
                write_nodes(&el.children, out);
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}
