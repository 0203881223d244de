use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use studydesk_engine::{Block, BlockKind, Document, StyleKind};

/// Terminal lines for a document, with inline styles, the selection and the
/// caret drawn over `base`.
pub fn document_lines(doc: &Document, base: Style) -> Vec<Line<'static>> {
    let selection = *doc.selection();
    let range = doc.ordered(&selection);
    let caret = selection.is_collapsed().then_some(selection.focus);

    let mut lines = Vec::new();
    let mut number = 0;
    for (index, block) in doc.blocks().iter().enumerate() {
        number = match block.kind() {
            BlockKind::NumberedItem => number + 1,
            _ => 0,
        };

        let selected = range.and_then(|(start, end)| {
            let si = doc.block_index(start.block)?;
            let ei = doc.block_index(end.block)?;
            if index < si || index > ei {
                return None;
            }
            let from = if index == si { start.offset } else { 0 };
            let to = if index == ei { end.offset } else { block.len() };
            Some((from, to))
        });
        let caret = caret
            .filter(|pos| pos.block == block.id())
            .map(|pos| pos.offset);

        lines.extend(block_lines(block, number, base, selected, caret));
        if block.kind().list_kind().is_none() {
            lines.push(Line::default());
        }
    }
    lines
}

fn prefix(kind: BlockKind, number: usize) -> String {
    match kind {
        BlockKind::Heading1 => "# ".to_string(),
        BlockKind::Heading2 => "## ".to_string(),
        BlockKind::Heading3 => "### ".to_string(),
        BlockKind::BulletItem => "• ".to_string(),
        BlockKind::NumberedItem => format!("{number}. "),
        BlockKind::Quote => "│ ".to_string(),
        BlockKind::Code => "    ".to_string(),
        BlockKind::Paragraph | BlockKind::Image => String::new(),
    }
}

fn block_lines(
    block: &Block,
    number: usize,
    base: Style,
    selected: Option<(usize, usize)>,
    caret: Option<usize>,
) -> Vec<Line<'static>> {
    let base = match block.kind() {
        kind if kind.is_heading() => base.add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        BlockKind::Quote | BlockKind::Code => base.add_modifier(Modifier::DIM),
        _ => base,
    };

    if block.image().is_some() {
        let marked = caret.is_some() || selected.is_some_and(|(from, to)| from < to);
        let style = if marked {
            base.add_modifier(Modifier::REVERSED)
        } else {
            base
        };
        return vec![Line::from(Span::styled("[image]", style))];
    }

    let lead = prefix(block.kind(), number);
    let indent = " ".repeat(lead.chars().count());
    let mut builder = LineBuilder::new(base, lead);
    let mut offset = 0;

    for ch in block.text().chars() {
        let width = ch.len_utf16();
        let mut style = base;
        for (kind, modifier) in [
            (StyleKind::Bold, Modifier::BOLD),
            (StyleKind::Italic, Modifier::ITALIC),
            (StyleKind::Underline, Modifier::UNDERLINED),
            (StyleKind::Strikethrough, Modifier::CROSSED_OUT),
        ] {
            if block.has_style(kind, offset, offset + width) {
                style = style.add_modifier(modifier);
            }
        }
        let in_selection = selected.is_some_and(|(from, to)| from <= offset && offset < to);
        if in_selection || caret == Some(offset) {
            style = style.add_modifier(Modifier::REVERSED);
        }

        if ch == '\n' {
            if caret == Some(offset) {
                builder.push(' ', style);
            }
            builder.break_line(indent.clone());
        } else {
            builder.push(ch, style);
        }
        offset += width;
    }
    if caret == Some(offset) {
        builder.push(' ', base.add_modifier(Modifier::REVERSED));
    }
    builder.finish()
}

/// Groups characters of equal style into spans.
struct LineBuilder {
    base: Style,
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    run: String,
    run_style: Style,
}

impl LineBuilder {
    fn new(base: Style, lead: String) -> Self {
        let mut builder = Self {
            base,
            lines: Vec::new(),
            spans: Vec::new(),
            run: String::new(),
            run_style: base,
        };
        builder.start(lead);
        builder
    }

    fn start(&mut self, lead: String) {
        if !lead.is_empty() {
            self.spans.push(Span::styled(lead, self.base));
        }
    }

    fn push(&mut self, ch: char, style: Style) {
        if style != self.run_style {
            self.flush();
            self.run_style = style;
        }
        self.run.push(ch);
    }

    fn flush(&mut self) {
        if !self.run.is_empty() {
            let run = std::mem::take(&mut self.run);
            self.spans.push(Span::styled(run, self.run_style));
        }
    }

    fn break_line(&mut self, indent: String) {
        self.flush();
        self.lines.push(Line::from(std::mem::take(&mut self.spans)));
        self.start(indent);
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        self.lines.push(Line::from(self.spans));
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studydesk_engine::{DocPosition, Selection};

    fn contents(line: &Line) -> Vec<String> {
        line.spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn test_styled_runs_become_spans() {
        let mut doc = Document::from_markup("<p>a <strong>b</strong>c</p>");
        let id = doc.blocks()[0].id();
        doc.set_selection(Selection::caret(DocPosition::new(id, 0)));

        let lines = document_lines(&doc, Style::default());

        assert_eq!(contents(&lines[0]), vec!["a", " ", "b", "c"]);
        assert!(lines[0].spans[0].style.add_modifier.contains(Modifier::REVERSED));
        assert!(lines[0].spans[2].style.add_modifier.contains(Modifier::BOLD));
        assert!(!lines[0].spans[3].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_list_prefixes_and_caret_at_end() {
        let doc = Document::from_markup("<ol><li>one</li><li>two</li></ol>");

        let lines = document_lines(&doc, Style::default());

        assert_eq!(contents(&lines[0]), vec!["1. ", "one"]);
        assert_eq!(contents(&lines[1]), vec!["2. ", "two", " "]);
    }

    #[test]
    fn test_soft_break_indents_continuation() {
        let mut doc = Document::from_markup("<ul><li>a</li></ul>");
        let id = doc.blocks()[0].id();
        doc.set_selection(Selection::caret(DocPosition::new(id, 1)));
        doc.apply(studydesk_engine::Cmd::InsertLineBreak).unwrap();
        doc.apply(studydesk_engine::Cmd::InsertText { text: "b".to_string() })
            .unwrap();

        let lines = document_lines(&doc, Style::default());

        assert_eq!(contents(&lines[0]), vec!["• ", "a"]);
        assert_eq!(contents(&lines[1]), vec!["  ", "b", " "]);
    }
}
