//! Markdown import and export of documents.
//!
//! Markdown is a serialization of the block model, not an alternative model:
//! constructs with no block counterpart (tables, rules, raw HTML, links) lose
//! their structure and keep only their text.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use crate::editing::document::{Block, BlockId, BlockKind, Document, ListKind, StyleKind};
use crate::editing::text::{utf16_len, utf16_to_byte};
use crate::sanitize::is_image_data_uri;

/// Styles that have a Markdown marker, in nesting order.
const MARKED_STYLES: [StyleKind; 3] = [StyleKind::Bold, StyleKind::Italic, StyleKind::Strikethrough];

/// Seed content for a new Markdown note.
pub fn default_markdown(subtopic: &str) -> String {
    format!("# {subtopic}\n\n")
}

/// Parses Markdown into a document.
pub fn from_markdown(content: &str) -> Document {
    let parser = Parser::new_ext(content, Options::ENABLE_STRIKETHROUGH);
    let mut processor = MarkdownProcessor::default();

    for event in parser {
        processor.process_event(event);
    }

    Document::from_blocks(processor.finalize())
}

#[derive(Default)]
struct MarkdownProcessor {
    blocks: Vec<Block>,
    current: Option<Block>,
    styles: Vec<StyleKind>,
    lists: Vec<ListKind>,
    quote_depth: usize,
    in_code_block: bool,
    /// Alt text of an image is not content.
    in_image: bool,
}

impl MarkdownProcessor {
    fn process_event(&mut self, event: Event) {
        if self.in_image {
            if let Event::End(TagEnd::Image) = event {
                self.in_image = false;
            }
            return;
        }

        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.close();
                let level = (level as u8).min(3);
                self.open(BlockKind::heading(level).unwrap_or(BlockKind::Heading3));
            }
            Event::End(TagEnd::Heading(_)) | Event::End(TagEnd::Paragraph) => self.close(),
            Event::Start(Tag::List(first_item)) => {
                self.close();
                self.lists.push(match first_item {
                    Some(_) => ListKind::Numbered,
                    None => ListKind::Bullet,
                });
            }
            Event::End(TagEnd::List(_)) => {
                self.close();
                self.lists.pop();
            }
            Event::Start(Tag::Item) => {
                self.close();
                self.open(self.paragraph_kind());
            }
            Event::End(TagEnd::Item) => self.close(),
            Event::Start(Tag::BlockQuote(_)) => {
                self.close();
                self.quote_depth += 1;
            }
            Event::End(TagEnd::BlockQuote(_)) => {
                self.close();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            Event::Start(Tag::CodeBlock(_)) => {
                self.close();
                self.open(BlockKind::Code);
                self.in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                self.in_code_block = false;
                if let Some(block) = self.current.as_mut()
                    && block.text.ends_with('\n')
                {
                    let len = block.len();
                    block.delete_range(len - 1, len);
                }
                self.close();
            }
            Event::Start(Tag::Strong) => self.styles.push(StyleKind::Bold),
            Event::End(TagEnd::Strong) => self.end_style(StyleKind::Bold),
            Event::Start(Tag::Emphasis) => self.styles.push(StyleKind::Italic),
            Event::End(TagEnd::Emphasis) => self.end_style(StyleKind::Italic),
            Event::Start(Tag::Strikethrough) => self.styles.push(StyleKind::Strikethrough),
            Event::End(TagEnd::Strikethrough) => self.end_style(StyleKind::Strikethrough),
            Event::Start(Tag::Image { dest_url, .. }) => {
                let resume = self.current.as_ref().map(Block::kind);
                self.close();
                if is_image_data_uri(&dest_url) {
                    self.blocks.push(Block::image_block(BlockId(0), &dest_url));
                }
                if let Some(kind) = resume.filter(|kind| kind.list_kind().is_some()) {
                    self.open(kind);
                }
                self.in_image = true;
            }
            Event::Text(text) | Event::Code(text) => self.push_text(&text),
            Event::SoftBreak | Event::HardBreak => self.push_text("\n"),
            Event::Rule => self.close(),
            _ => {}
        }
    }

    fn paragraph_kind(&self) -> BlockKind {
        match self.lists.last() {
            Some(list) => list.item_kind(),
            None if self.quote_depth > 0 => BlockKind::Quote,
            None => BlockKind::Paragraph,
        }
    }

    fn open(&mut self, kind: BlockKind) {
        self.current = Some(Block::text_block(BlockId(0), kind, ""));
    }

    fn push_text(&mut self, text: &str) {
        if self.current.is_none() {
            self.open(self.paragraph_kind());
        }
        if let Some(block) = self.current.as_mut() {
            block.push_styled(text, &self.styles);
        }
    }

    fn end_style(&mut self, kind: StyleKind) {
        if let Some(pos) = self.styles.iter().rposition(|k| *k == kind) {
            self.styles.remove(pos);
        }
    }

    fn close(&mut self) {
        if let Some(mut block) = self.current.take() {
            block.normalize();
            self.blocks.push(block);
        }
    }

    fn finalize(mut self) -> Vec<Block> {
        self.close();
        self.blocks
    }
}

/// Renders a document as Markdown. Underline has no Markdown form and is
/// dropped.
pub fn to_markdown(doc: &Document) -> String {
    let mut out = String::new();
    let mut previous: Option<BlockKind> = None;
    let mut number = 0;

    for block in doc.blocks() {
        let list = block.kind().list_kind();
        match previous {
            Some(prev) if list.is_some() && prev.list_kind() == list => out.push('\n'),
            Some(_) => out.push_str("\n\n"),
            None => {}
        }
        number = match (list, previous.and_then(BlockKind::list_kind)) {
            (Some(ListKind::Numbered), Some(ListKind::Numbered)) => number + 1,
            _ => 1,
        };
        out.push_str(&block_markdown(block, number));
        previous = Some(block.kind());
    }

    out.push('\n');
    out
}

fn block_markdown(block: &Block, number: usize) -> String {
    if let Some(uri) = block.image() {
        return format!("![]({uri})");
    }

    match block.kind() {
        BlockKind::Heading1 | BlockKind::Heading2 | BlockKind::Heading3 => {
            let level = block.kind().heading_level().unwrap_or(1) as usize;
            format!("{} {}", "#".repeat(level), inline_markdown(block).replace('\n', " "))
        }
        BlockKind::BulletItem => prefix_lines("- ", "  ", &inline_markdown(block)),
        BlockKind::NumberedItem => {
            let marker = format!("{number}. ");
            let indent = " ".repeat(marker.len());
            prefix_lines(&marker, &indent, &inline_markdown(block))
        }
        BlockKind::Quote => prefix_lines("> ", "> ", &inline_markdown(block)),
        BlockKind::Code => format!("```\n{}\n```", block.text()),
        BlockKind::Paragraph | BlockKind::Image => inline_markdown(block),
    }
}

fn prefix_lines(first: &str, rest: &str, text: &str) -> String {
    let mut out = String::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(if i == 0 { first } else { rest });
        out.push_str(line);
    }
    out
}

/// Block text with style markers. Markers are kept properly nested: when a
/// style ends while an inner one continues, the inner one is closed and
/// reopened.
fn inline_markdown(block: &Block) -> String {
    let text = block.text();
    let mut cuts = vec![0, utf16_len(text)];
    for range in block.styles() {
        if MARKED_STYLES.contains(&range.kind) {
            cuts.push(range.start);
            cuts.push(range.end);
        }
    }
    cuts.sort_unstable();
    cuts.dedup();

    let mut out = String::new();
    let mut open: Vec<StyleKind> = Vec::new();
    for window in cuts.windows(2) {
        let (start, end) = (window[0], window[1]);
        if start >= end {
            continue;
        }
        let wanted: Vec<StyleKind> = MARKED_STYLES
            .into_iter()
            .filter(|kind| block.has_style(*kind, start, end))
            .collect();

        if let Some(pos) = open.iter().position(|kind| !wanted.contains(kind)) {
            for kind in open.drain(pos..).rev() {
                out.push_str(marker(kind));
            }
        }
        for kind in wanted {
            if !open.contains(&kind) {
                out.push_str(marker(kind));
                open.push(kind);
            }
        }
        escape_into(&text[utf16_to_byte(text, start)..utf16_to_byte(text, end)], &mut out);
    }
    for kind in open.into_iter().rev() {
        out.push_str(marker(kind));
    }
    out
}

fn marker(kind: StyleKind) -> &'static str {
    match kind {
        StyleKind::Bold => "**",
        StyleKind::Italic => "_",
        StyleKind::Strikethrough => "~~",
        StyleKind::Underline => "",
    }
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        if matches!(ch, '\\' | '*' | '_' | '~' | '`' | '[' | ']') {
            out.push('\\');
        }
        out.push(ch);
    }
}
