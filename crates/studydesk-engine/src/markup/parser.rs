//! Permissive markup parser.
//!
//! The parser never fails. Anything it cannot make sense of is treated as
//! absent: comments, doctypes and processing instructions are skipped, a
//! close tag without a matching open element is ignored, an unterminated tag
//! at end of input is dropped, and elements still open at end of input are
//! closed. A `<` that does not start a tag is ordinary text.
//!
//! Tree construction implements the two implied-end-tag rules that decide
//! how stored and pasted content nests: block-level start tags close an open
//! `p`, and `li` closes an open `li` within the same list.

use super::cursor::Cursor;
use super::node::{Element, Node, is_void};

/// Elements whose content is not document text; they are dropped together
/// with everything inside them.
const RAW_CONTENT: [&str; 6] = ["script", "style", "template", "noscript", "iframe", "object"];

/// Start tags that implicitly close an open paragraph.
const CLOSES_PARAGRAPH: [&str; 33] = [
    "address",
    "article",
    "aside",
    "blockquote",
    "details",
    "div",
    "dl",
    "dd",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "menu",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "table",
    "ul",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
}

/// Parses a markup fragment into a node tree.
pub fn parse_fragment(markup: &str) -> Vec<Node> {
    let mut builder = TreeBuilder::default();
    for token in Tokenizer::new(markup) {
        builder.push(token);
    }
    builder.finish()
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

fn decode(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}

struct Tokenizer<'a> {
    cur: Cursor<'a>,
}

impl<'a> Tokenizer<'a> {
    fn new(markup: &'a str) -> Self {
        Self {
            cur: Cursor::new(markup),
        }
    }

    /// Reads a start tag; the cursor sits on its `<`. Returns `None` when the
    /// tag runs off the end of input.
    fn start_tag(&mut self) -> Option<Token> {
        self.cur.bump();
        let name = self.cur.eat_while(is_name_byte).to_ascii_lowercase();
        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut self_closing = false;

        loop {
            self.cur.skip_whitespace();
            match self.cur.peek()? {
                b'>' => {
                    self.cur.bump();
                    break;
                }
                b'/' => {
                    self.cur.bump();
                    if self.cur.peek() == Some(b'>') {
                        self.cur.bump();
                        self_closing = true;
                        break;
                    }
                }
                _ => {
                    let attr_name = self
                        .cur
                        .eat_while(|b| !b.is_ascii_whitespace() && b != b'/' && b != b'>' && b != b'=')
                        .to_ascii_lowercase();
                    if attr_name.is_empty() {
                        // stray `=`
                        self.cur.bump();
                        continue;
                    }
                    self.cur.skip_whitespace();
                    let value = if self.cur.peek() == Some(b'=') {
                        self.cur.bump();
                        self.cur.skip_whitespace();
                        match self.cur.peek() {
                            Some(b'"') => {
                                self.cur.bump();
                                self.cur.skip_past("\"")
                            }
                            Some(b'\'') => {
                                self.cur.bump();
                                self.cur.skip_past("'")
                            }
                            _ => self.cur.eat_while(|b| !b.is_ascii_whitespace() && b != b'>'),
                        }
                    } else {
                        ""
                    };
                    if !attrs.iter().any(|(n, _)| *n == attr_name) {
                        attrs.push((attr_name, decode(value)));
                    }
                }
            }
        }

        Some(Token::Start {
            name,
            attrs,
            self_closing,
        })
    }

    /// Skips everything up to and including the matching close tag of a
    /// raw-content element.
    fn skip_raw_content(&mut self, name: &str) {
        loop {
            self.cur.skip_past("</");
            if self.cur.starts_with_ignore_case(name.as_bytes()) {
                self.cur.skip_past(">");
                return;
            }
            if self.cur.eof() {
                return;
            }
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if self.cur.eof() {
                return None;
            }

            if self.cur.peek() != Some(b'<') {
                let raw = self.cur.eat_while(|b| b != b'<');
                return Some(Token::Text(decode(raw)));
            }

            match self.cur.peek_at(1) {
                Some(b'!') => {
                    if self.cur.starts_with(b"<!--") {
                        self.cur.bump_n(4);
                        self.cur.skip_past("-->");
                    } else {
                        self.cur.skip_past(">");
                    }
                }
                Some(b'?') => {
                    self.cur.skip_past(">");
                }
                Some(b'/') => {
                    self.cur.bump_n(2);
                    if self.cur.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
                        let name = self.cur.eat_while(is_name_byte).to_ascii_lowercase();
                        self.cur.skip_past(">");
                        return Some(Token::End { name });
                    }
                    // `</>` and `</ ...>` carry nothing
                    self.cur.skip_past(">");
                }
                Some(b) if b.is_ascii_alphabetic() => {
                    let token = self.start_tag()?;
                    if let Token::Start {
                        name, self_closing, ..
                    } = &token
                        && !self_closing
                        && RAW_CONTENT.contains(&name.as_str())
                    {
                        let name = name.clone();
                        self.skip_raw_content(&name);
                        continue;
                    }
                    return Some(token);
                }
                _ => {
                    self.cur.bump();
                    return Some(Token::Text("<".to_string()));
                }
            }
        }
    }
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<Node>,
    open: Vec<Element>,
}

impl TreeBuilder {
    fn current(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(el) => &mut el.children,
            None => &mut self.root,
        }
    }

    fn push(&mut self, token: Token) {
        match token {
            Token::Text(text) => self.push_text(text),
            Token::Start {
                name,
                attrs,
                self_closing,
            } => self.start(name, attrs, self_closing),
            Token::End { name } => self.end(&name),
        }
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let children = self.current();
        if let Some(Node::Text(prev)) = children.last_mut() {
            prev.push_str(&text);
        } else {
            children.push(Node::Text(text));
        }
    }

    fn start(&mut self, name: String, attrs: Vec<(String, String)>, self_closing: bool) {
        if CLOSES_PARAGRAPH.contains(&name.as_str()) {
            self.end("p");
        }
        if name == "li" {
            self.close_list_item();
        }

        let element = Element {
            tag: name,
            attrs,
            children: Vec::new(),
        };
        if self_closing || is_void(&element.tag) {
            self.current().push(Node::Element(element));
        } else {
            self.open.push(element);
        }
    }

    fn end(&mut self, name: &str) {
        if let Some(index) = self.open.iter().rposition(|el| el.tag == name) {
            self.pop_to(index);
        }
    }

    fn close_list_item(&mut self) {
        for index in (0..self.open.len()).rev() {
            match self.open[index].tag.as_str() {
                "li" => {
                    self.pop_to(index);
                    return;
                }
                "ul" | "ol" => return,
                _ => {}
            }
        }
    }

    /// Closes every open element from the top of the stack down to and
    /// including `index`.
    fn pop_to(&mut self, index: usize) {
        while self.open.len() > index {
            if let Some(element) = self.open.pop() {
                self.current().push(Node::Element(element));
            }
        }
    }

    fn finish(mut self) -> Vec<Node> {
        self.pop_to(0);
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::to_html;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn el(tag: &str, children: Vec<Node>) -> Node {
        Node::element(tag, children)
    }

    fn text(s: &str) -> Node {
        Node::text(s)
    }

    #[test]
    fn parses_nested_elements() {
        let nodes = parse_fragment("<h1>Title</h1><p>a <strong>b</strong></p>");
        assert_eq!(
            nodes,
            vec![
                el("h1", vec![text("Title")]),
                el("p", vec![text("a "), el("strong", vec![text("b")])]),
            ]
        );
    }

    #[test]
    fn tag_names_are_lowercased() {
        let nodes = parse_fragment("<P>x</P>");
        assert_eq!(nodes, vec![el("p", vec![text("x")])]);
    }

    #[test]
    fn unclosed_elements_close_at_end_of_input() {
        let nodes = parse_fragment("<p><em>open");
        assert_eq!(nodes, vec![el("p", vec![el("em", vec![text("open")])])]);
    }

    #[test]
    fn stray_close_tags_are_ignored() {
        let nodes = parse_fragment("a</div>b</p>");
        assert_eq!(nodes, vec![text("ab")]);
    }

    #[test]
    fn close_tag_closes_intervening_elements() {
        let nodes = parse_fragment("<div><span>x</div>y");
        assert_eq!(
            nodes,
            vec![el("div", vec![el("span", vec![text("x")])]), text("y")]
        );
    }

    #[test]
    fn block_start_closes_open_paragraph() {
        let nodes = parse_fragment("<p>one<p>two<h2>three</h2>");
        assert_eq!(
            nodes,
            vec![
                el("p", vec![text("one")]),
                el("p", vec![text("two")]),
                el("h2", vec![text("three")]),
            ]
        );
    }

    #[test]
    fn list_item_closes_previous_item_in_same_list() {
        let nodes = parse_fragment("<ul><li>a<li>b<ul><li>c</ul></ul>");
        assert_eq!(
            nodes,
            vec![el(
                "ul",
                vec![
                    el("li", vec![text("a")]),
                    el("li", vec![text("b"), el("ul", vec![el("li", vec![text("c")])])]),
                ]
            )]
        );
    }

    #[test]
    fn void_and_self_closing_elements_take_no_children() {
        let nodes = parse_fragment("a<br>b<img src=x />c<span/>d");
        assert_eq!(
            nodes,
            vec![
                text("a"),
                el("br", vec![]),
                text("b"),
                Node::Element(Element::new("img").with_attr("src", "x")),
                text("c"),
                el("span", vec![]),
                text("d"),
            ]
        );
    }

    #[rstest]
    #[case::double_quoted(r#"<img src="a b" alt="x">"#, "a b")]
    #[case::single_quoted("<img src='a b' alt=x>", "a b")]
    #[case::unquoted("<img src=ab alt=x>", "ab")]
    #[case::entity_decoded(r#"<img src="a&amp;b">"#, "a&b")]
    fn attribute_values(#[case] markup: &str, #[case] expected: &str) {
        let nodes = parse_fragment(markup);
        let src = nodes[0].as_element().and_then(|el| el.attr("src"));
        assert_eq!(src, Some(expected));
    }

    #[test]
    fn duplicate_attributes_keep_first() {
        let nodes = parse_fragment(r#"<img src="first" src="second">"#);
        assert_eq!(nodes[0].as_element().and_then(|el| el.attr("src")), Some("first"));
    }

    #[test]
    fn comments_and_doctypes_are_dropped() {
        let nodes = parse_fragment("<!DOCTYPE html><!-- hidden -->a<?xml x?>b");
        assert_eq!(nodes, vec![text("ab")]);
    }

    #[test]
    fn unterminated_comment_swallows_rest() {
        let nodes = parse_fragment("a<!-- never closed <p>b</p>");
        assert_eq!(nodes, vec![text("a")]);
    }

    #[test]
    fn raw_content_elements_are_dropped_with_content() {
        let nodes = parse_fragment("a<script>if (x < y) { alert('</p>') }</SCRIPT>b<style>p{}</style>c");
        assert_eq!(nodes, vec![text("abc")]);
    }

    #[test]
    fn lone_angle_bracket_is_text() {
        let nodes = parse_fragment("1 < 2 and 3 <> 4");
        assert_eq!(nodes, vec![text("1 < 2 and 3 <> 4")]);
    }

    #[test]
    fn unterminated_tag_at_end_is_dropped() {
        let nodes = parse_fragment("text<p class=\"x");
        assert_eq!(nodes, vec![text("text")]);
    }

    #[test]
    fn entities_are_decoded_in_text() {
        let nodes = parse_fragment("a &amp; b &lt;c&gt; &nbsp;");
        assert_eq!(nodes, vec![text("a & b <c> \u{a0}")]);
    }

    #[test]
    fn unicode_text_survives() {
        let nodes = parse_fragment("<p>Hello 世界! 🦀</p>");
        assert_eq!(nodes, vec![el("p", vec![text("Hello 世界! 🦀")])]);
    }

    #[test]
    fn parse_of_serialized_tree_is_identity() {
        let nodes = vec![
            el("h1", vec![text("a < b & c")]),
            el("ul", vec![el("li", vec![el("em", vec![text("x\ny")])])]),
            Node::Element(Element::new("img").with_attr("src", "data:image/png;base64,AA==")),
        ];
        assert_eq!(parse_fragment(&to_html(&nodes)), nodes);
    }

    #[test]
    fn empty_input_yields_empty_fragment() {
        assert!(parse_fragment("").is_empty());
    }
}
