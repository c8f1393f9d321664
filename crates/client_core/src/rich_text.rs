//! Restricted rich text for backend-authored prose.
//!
//! Markdown is parsed with pulldown-cmark but only bold, lists and links
//! survive. Everything else (headings, emphasis, code, images, raw HTML)
//! is flattened into plain text and never interpreted.

use pulldown_cmark::{Event, Parser as MdParser, Tag, TagEnd};

const ALLOWED_LINK_SCHEMES: &[&str] = &["http://", "https://", "mailto:"];
const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub link: Option<String>,
}

impl Span {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
            link: None,
        }
    }

    fn same_style(&self, other: &Span) -> bool {
        self.bold == other.bold && self.link == other.link
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub depth: usize,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<Span>),
    List {
        start: Option<u64>,
        items: Vec<ListItem>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RichText {
    pub blocks: Vec<Block>,
}

impl RichText {
    pub fn parse(source: &str) -> Self {
        let mut builder = Builder::default();
        for event in MdParser::new(source) {
            builder.handle(event);
        }
        builder.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Text without styling: bullets as `-`, links as `text (url)`.
    pub fn to_plain(&self) -> String {
        self.render(false)
    }

    /// Same layout as [`RichText::to_plain`], bold spans wrapped in ANSI bold.
    pub fn to_ansi(&self) -> String {
        self.render(true)
    }

    fn render(&self, ansi: bool) -> String {
        let mut out = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            match block {
                Block::Paragraph(spans) => out.push(render_spans(spans, ansi)),
                Block::List { start, items } => {
                    let mut lines = Vec::with_capacity(items.len());
                    let mut number = start.unwrap_or(1);
                    for item in items {
                        let indent = "  ".repeat(item.depth);
                        let marker = match start {
                            Some(_) if item.depth == 0 => {
                                let marker = format!("{number}.");
                                number += 1;
                                marker
                            }
                            _ => "-".to_string(),
                        };
                        lines.push(format!("{indent}{marker} {}", render_spans(&item.spans, ansi)));
                    }
                    out.push(lines.join("\n"));
                }
            }
        }
        out.join("\n\n")
    }
}

fn render_spans(spans: &[Span], ansi: bool) -> String {
    let mut out = String::new();
    for span in spans {
        let text = match &span.link {
            Some(url) if url != &span.text => format!("{} ({url})", span.text),
            _ => span.text.clone(),
        };
        if ansi && span.bold {
            out.push_str(ANSI_BOLD);
            out.push_str(&text);
            out.push_str(ANSI_RESET);
        } else {
            out.push_str(&text);
        }
    }
    out
}

/// Drops C0/C1 control characters (ESC, BEL, CSI...) apart from newline and
/// tab, so backend text cannot drive the terminal.
pub fn strip_controls(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

fn allowed_link(url: &str) -> Option<String> {
    let lower = url.trim().to_ascii_lowercase();
    ALLOWED_LINK_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme))
        .then(|| strip_controls(url.trim()))
}

#[derive(Default)]
struct Builder {
    blocks: Vec<Block>,
    paragraph: Vec<Span>,
    list: Option<(Option<u64>, Vec<ListItem>)>,
    list_depth: usize,
    open_items: Vec<usize>,
    bold_depth: usize,
    links: Vec<Option<String>>,
}

impl Builder {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::List(start)) => {
                if self.list_depth == 0 {
                    self.flush_paragraph();
                    self.list = Some((start, Vec::new()));
                }
                self.list_depth += 1;
            }
            Event::End(TagEnd::List(_)) => {
                self.list_depth = self.list_depth.saturating_sub(1);
                if self.list_depth == 0 {
                    if let Some((start, items)) = self.list.take() {
                        if !items.is_empty() {
                            self.blocks.push(Block::List { start, items });
                        }
                    }
                }
            }
            Event::Start(Tag::Item) => {
                if let Some((_, items)) = self.list.as_mut() {
                    items.push(ListItem {
                        depth: self.list_depth.saturating_sub(1),
                        spans: Vec::new(),
                    });
                    self.open_items.push(items.len() - 1);
                }
            }
            Event::End(TagEnd::Item) => {
                self.open_items.pop();
            }
            Event::Start(Tag::Strong) => self.bold_depth += 1,
            Event::End(TagEnd::Strong) => self.bold_depth = self.bold_depth.saturating_sub(1),
            Event::Start(Tag::Link { dest_url, .. }) => self.links.push(allowed_link(&dest_url)),
            Event::End(TagEnd::Link) => {
                self.links.pop();
            }
            Event::Start(Tag::Paragraph) | Event::Start(Tag::Heading { .. }) => {
                self.separate_within_item();
            }
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::CodeBlock)
            | Event::End(TagEnd::HtmlBlock) => {
                if self.open_items.is_empty() {
                    self.flush_paragraph();
                }
            }
            Event::Text(text)
            | Event::Code(text)
            | Event::Html(text)
            | Event::InlineHtml(text)
            | Event::InlineMath(text)
            | Event::DisplayMath(text)
            | Event::FootnoteReference(text) => self.push_text(&text),
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.push_text("\n"),
            _ => {}
        }
    }

    fn separate_within_item(&mut self) {
        if let Some(spans) = self.current_item_spans() {
            if !spans.is_empty() {
                spans.push(Span::plain(" "));
            }
        }
    }

    fn current_item_spans(&mut self) -> Option<&mut Vec<Span>> {
        let index = *self.open_items.last()?;
        self.list
            .as_mut()
            .and_then(|(_, items)| items.get_mut(index))
            .map(|item| &mut item.spans)
    }

    fn push_text(&mut self, text: &str) {
        let text = strip_controls(text);
        if text.is_empty() {
            return;
        }
        let span = Span {
            text,
            bold: self.bold_depth > 0,
            link: self.links.last().cloned().flatten(),
        };
        let target = if self.open_items.is_empty() {
            &mut self.paragraph
        } else {
            match self.current_item_spans() {
                Some(spans) => spans,
                None => return,
            }
        };
        match target.last_mut() {
            Some(last) if last.same_style(&span) => last.text.push_str(&span.text),
            _ => target.push(span),
        }
    }

    fn flush_paragraph(&mut self) {
        let spans = std::mem::take(&mut self.paragraph);
        if spans.iter().any(|span| !span.text.trim().is_empty()) {
            self.blocks.push(Block::Paragraph(spans));
        }
    }

    fn finish(mut self) -> RichText {
        self.flush_paragraph();
        if let Some((start, items)) = self.list.take() {
            if !items.is_empty() {
                self.blocks.push(Block::List { start, items });
            }
        }
        RichText {
            blocks: self.blocks,
        }
    }
}
