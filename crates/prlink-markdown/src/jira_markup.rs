use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};

use crate::parser_options;

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Bulleted,
    Numbered,
}

impl ListKind {
    fn marker(self) -> char {
        match self {
            Self::Bulleted => '*',
            Self::Numbered => '#',
        }
    }
}

#[derive(Default)]
struct JiraWriter {
    out: String,
    lists: Vec<ListKind>,
    links: Vec<(String, usize)>,
    image_depth: usize,
    in_code_block: bool,
    in_table_head: bool,
    table_depth: usize,
    suppress_separator: bool,
}

/// Converts a markdown document into Jira wiki markup.
///
/// Covers headings, emphasis, inline code, fenced code, links, images,
/// nested lists, block quotes, rules, and tables. Raw HTML is passed through.
pub fn markdown_to_jira(markdown: &str) -> String {
    let mut writer = JiraWriter::default();
    for event in Parser::new_ext(markdown, parser_options()) {
        writer.handle(event);
    }
    writer.out.trim_end_matches('\n').to_string()
}

impl JiraWriter {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.image_depth == 0 {
                    self.out.push_str(&text);
                }
            }
            Event::Code(code) => {
                if self.image_depth == 0 {
                    self.out.push_str("{{");
                    self.out.push_str(&code);
                    self.out.push_str("}}");
                }
            }
            Event::Html(html) | Event::InlineHtml(html) => self.out.push_str(&html),
            Event::SoftBreak | Event::HardBreak => {
                if self.image_depth == 0 {
                    self.out.push('\n');
                }
            }
            Event::Rule => {
                self.separate_block();
                self.out.push_str("----\n");
            }
            Event::TaskListMarker(checked) => {
                self.out.push_str(if checked { "[x] " } else { "[ ] " });
            }
            Event::FootnoteReference(label) => {
                self.out.push_str("[^");
                self.out.push_str(&label);
                self.out.push(']');
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.separate_block(),
            Tag::Heading { level, .. } => {
                self.separate_block();
                self.out.push_str(&format!("h{}. ", heading_number(level)));
            }
            Tag::BlockQuote(_) => {
                self.separate_block();
                self.out.push_str("{quote}\n");
                self.suppress_separator = true;
            }
            Tag::CodeBlock(kind) => {
                self.separate_block();
                self.in_code_block = true;
                match kind {
                    CodeBlockKind::Fenced(lang) if !lang.trim().is_empty() => {
                        let lang = lang.split_whitespace().next().unwrap_or_default();
                        self.out.push_str(&format!("{{code:{lang}}}\n"));
                    }
                    _ => self.out.push_str("{code}\n"),
                }
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.separate_block();
                }
                self.lists.push(if start.is_some() {
                    ListKind::Numbered
                } else {
                    ListKind::Bulleted
                });
            }
            Tag::Item => {
                self.ensure_line_start();
                let marker = self
                    .lists
                    .iter()
                    .map(|kind| kind.marker())
                    .collect::<String>();
                self.out.push_str(&marker);
                self.out.push(' ');
            }
            Tag::Emphasis => self.push_inline("_"),
            Tag::Strong => self.push_inline("*"),
            Tag::Strikethrough => self.push_inline("-"),
            Tag::Link { dest_url, .. } => {
                if self.image_depth == 0 {
                    self.links.push((dest_url.into_string(), self.out.len()));
                    self.out.push('[');
                }
            }
            Tag::Image { dest_url, .. } => {
                if self.image_depth == 0 {
                    self.out.push('!');
                    self.out.push_str(&dest_url);
                    self.out.push('!');
                }
                self.image_depth = self.image_depth.saturating_add(1);
            }
            Tag::Table(_) => {
                self.separate_block();
                self.table_depth = self.table_depth.saturating_add(1);
            }
            Tag::TableHead => self.in_table_head = true,
            Tag::TableCell => {
                self.out
                    .push_str(if self.in_table_head { "||" } else { "|" });
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) => self.ensure_line_start(),
            TagEnd::BlockQuote(_) => {
                self.trim_trailing_newlines();
                self.out.push_str("\n{quote}\n");
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.ensure_line_start();
                self.out.push_str("{code}\n");
            }
            TagEnd::List(_) => {
                self.lists.pop();
                self.ensure_line_start();
            }
            TagEnd::Item => self.ensure_line_start(),
            TagEnd::Emphasis => self.push_inline("_"),
            TagEnd::Strong => self.push_inline("*"),
            TagEnd::Strikethrough => self.push_inline("-"),
            TagEnd::Link => {
                if self.image_depth > 0 {
                    return;
                }
                let Some((dest, start)) = self.links.pop() else {
                    return;
                };
                let label = self.out.get(start + 1..).unwrap_or_default().to_string();
                self.out.truncate(start);
                if label.is_empty() || label == dest {
                    self.out.push_str(&format!("[{dest}]"));
                } else {
                    self.out.push_str(&format!("[{label}|{dest}]"));
                }
            }
            TagEnd::Image => self.image_depth = self.image_depth.saturating_sub(1),
            TagEnd::Table => {
                self.table_depth = self.table_depth.saturating_sub(1);
                self.ensure_line_start();
            }
            TagEnd::TableHead => {
                self.out.push_str("||\n");
                self.in_table_head = false;
            }
            TagEnd::TableRow => self.out.push_str("|\n"),
            _ => {}
        }
    }

    fn push_inline(&mut self, marker: &str) {
        if self.image_depth == 0 && !self.in_code_block {
            self.out.push_str(marker);
        }
    }

    fn ensure_line_start(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn trim_trailing_newlines(&mut self) {
        while self.out.ends_with('\n') {
            self.out.pop();
        }
    }

    fn separate_block(&mut self) {
        if self.suppress_separator {
            self.suppress_separator = false;
            return;
        }
        if self.out.is_empty() || !self.lists.is_empty() || self.table_depth > 0 {
            return;
        }
        while !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }
}

fn heading_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
