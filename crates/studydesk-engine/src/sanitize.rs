//! Allow-list sanitizer.
//!
//! Sanitizing walks the parsed tree once. Elements outside [`ALLOWED_TAGS`]
//! are unwrapped: their children take their place in the parent, so no text
//! is lost. Allowed elements are rebuilt with only the attributes the editor
//! understands. The output parses back to the tree it was serialized from,
//! which makes `sanitize` idempotent.

use std::sync::OnceLock;

use regex::Regex;

use crate::markup::{Element, Node, parse_fragment, to_html};

/// The only elements that survive sanitizing.
pub const ALLOWED_TAGS: [&str; 10] = ["h1", "h2", "h3", "p", "ul", "ol", "li", "strong", "em", "img"];

pub fn is_allowed_tag(tag: &str) -> bool {
    ALLOWED_TAGS.contains(&tag)
}

/// Sanitizes a markup string.
pub fn sanitize(markup: &str) -> String {
    to_html(&sanitize_nodes(parse_fragment(markup)))
}

/// Sanitizes an already parsed fragment.
pub fn sanitize_nodes(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        sanitize_into(node, &mut out);
    }
    out
}

fn sanitize_into(node: Node, out: &mut Vec<Node>) {
    match node {
        Node::Text(text) => push_text(out, text),
        Node::Element(el) if el.tag == "img" => {
            if let Some(img) = clean_image(&el) {
                out.push(Node::Element(img));
            }
        }
        Node::Element(el) if is_allowed_tag(&el.tag) => {
            let children = sanitize_nodes(el.children);
            out.push(Node::Element(Element {
                tag: el.tag,
                attrs: Vec::new(),
                children,
            }));
        }
        Node::Element(el) => {
            for child in el.children {
                sanitize_into(child, out);
            }
        }
    }
}

/// Appends text, merging with a preceding text node.
fn push_text(out: &mut Vec<Node>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(prev)) = out.last_mut() {
        prev.push_str(&text);
    } else {
        out.push(Node::Text(text));
    }
}

/// Rebuilds an `img` with `src` then `alt`. Images whose source is not an
/// embedded image payload are dropped.
fn clean_image(el: &Element) -> Option<Element> {
    let src = el.attr("src").filter(|src| is_image_data_uri(src))?;
    let mut img = Element::new("img").with_attr("src", src);
    if let Some(alt) = el.attr("alt") {
        img = img.with_attr("alt", alt);
    }
    Some(img)
}

/// Whether `src` is a base64 `data:image/...` URI. The scheme, media type
/// and `;base64` marker match in any case.
pub fn is_image_data_uri(src: &str) -> bool {
    static DATA_URI_REGEX: OnceLock<Regex> = OnceLock::new();
    let data_uri_regex = DATA_URI_REGEX.get_or_init(|| {
        Regex::new(r"^(?i:data:image/[a-z0-9][a-z0-9.+-]*;base64),[A-Za-z0-9+/]*={0,2}$")
            .expect("Invalid data URI regex")
    });
    data_uri_regex.is_match(src)
}

/// Whether a declared media type names an image (`image/<subtype>`).
pub(crate) fn is_image_media_type(media_type: &str) -> bool {
    static MEDIA_TYPE_REGEX: OnceLock<Regex> = OnceLock::new();
    let media_type_regex = MEDIA_TYPE_REGEX
        .get_or_init(|| Regex::new(r"^image/[a-z0-9][a-z0-9.+-]*$").expect("Invalid media type regex"));
    media_type_regex.is_match(&media_type.trim().to_ascii_lowercase())
}
