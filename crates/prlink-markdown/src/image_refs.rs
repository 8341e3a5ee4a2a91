use std::collections::HashMap;
use std::ops::Range;

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

use crate::parser_options;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One markdown image occurrence, located by its byte span in the source document.
pub struct ImageReference {
    pub alt_text: String,
    pub source_url: String,
    /// Exact source text consumed by the image, e.g. `![alt](url "title")`.
    pub raw_match_text: String,
    /// Source text of the alt label with its original escapes and inline markup.
    pub raw_alt: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Replacement of `len` bytes at `start` in an immutable source string.
pub struct TextEdit {
    pub start: usize,
    pub len: usize,
    pub replacement: String,
}

struct OpenImage {
    start: usize,
    end: usize,
    source_url: String,
    alt_text: String,
    alt_span: Option<Range<usize>>,
}

/// Returns every image reference in document order. Repeated references are kept.
pub fn extract_image_references(markdown: &str) -> Vec<ImageReference> {
    let mut open: Vec<OpenImage> = Vec::new();
    let mut found = Vec::new();
    for (event, range) in Parser::new_ext(markdown, parser_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::Image { dest_url, .. }) => {
                note_alt_span(&mut open, &range);
                open.push(OpenImage {
                    start: range.start,
                    end: range.end,
                    source_url: dest_url.into_string(),
                    alt_text: String::new(),
                    alt_span: None,
                });
            }
            Event::End(TagEnd::Image) => {
                let Some(image) = open.pop() else {
                    continue;
                };
                note_alt_span(&mut open, &(image.start..image.end));
                let raw_alt = image
                    .alt_span
                    .and_then(|span| markdown.get(span))
                    .unwrap_or_default()
                    .to_string();
                let raw_match_text = markdown
                    .get(image.start..image.end)
                    .unwrap_or_default()
                    .to_string();
                found.push(ImageReference {
                    alt_text: image.alt_text,
                    source_url: image.source_url,
                    raw_match_text,
                    raw_alt,
                    span: image.start..image.end,
                });
            }
            Event::Text(text) | Event::Code(text) => {
                for image in open.iter_mut() {
                    image.alt_text.push_str(&text);
                }
                note_alt_span(&mut open, &range);
            }
            Event::SoftBreak | Event::HardBreak => {
                for image in open.iter_mut() {
                    image.alt_text.push(' ');
                }
                note_alt_span(&mut open, &range);
            }
            _ => {
                if !open.is_empty() {
                    note_alt_span(&mut open, &range);
                }
            }
        }
    }
    // Nested images close before their parents.
    found.sort_by_key(|image| image.span.start);
    found
}

fn note_alt_span(open: &mut [OpenImage], range: &Range<usize>) {
    for image in open.iter_mut() {
        if range.start < image.start || range.end > image.end {
            continue;
        }
        image.alt_span = Some(match image.alt_span.take() {
            Some(existing) => existing.start.min(range.start)..existing.end.max(range.end),
            None => range.clone(),
        });
    }
}

/// Renders a markdown image pointing at `destination`.
pub fn render_markdown_image(raw_alt: &str, destination: &str) -> String {
    let needs_brackets = destination
        .chars()
        .any(|ch| ch.is_whitespace() || matches!(ch, '(' | ')' | '<' | '>'));
    if needs_brackets {
        format!("![{raw_alt}](<{destination}>)")
    } else {
        format!("![{raw_alt}]({destination})")
    }
}

/// Computes one edit per image whose URL has an entry in `url_to_filename`.
pub fn plan_image_rewrites(
    markdown: &str,
    url_to_filename: &HashMap<String, String>,
) -> Vec<TextEdit> {
    extract_image_references(markdown)
        .into_iter()
        .filter_map(|image| {
            let filename = url_to_filename.get(&image.source_url)?;
            Some(TextEdit {
                start: image.span.start,
                len: image.span.len(),
                replacement: render_markdown_image(&image.raw_alt, filename),
            })
        })
        .collect()
}

/// Applies edits from the last offset to the first so that earlier
/// replacements never shift spans that are still pending. Edits overlapping an
/// earlier-starting edit are dropped.
pub fn apply_text_edits(source: &str, edits: &[TextEdit]) -> String {
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by_key(|edit| edit.start);
    let mut accepted: Vec<&TextEdit> = Vec::with_capacity(ordered.len());
    let mut covered_until = 0_usize;
    for edit in ordered {
        let end = edit.start.saturating_add(edit.len);
        if edit.start < covered_until || end > source.len() {
            continue;
        }
        if !source.is_char_boundary(edit.start) || !source.is_char_boundary(end) {
            continue;
        }
        covered_until = end;
        accepted.push(edit);
    }

    let mut output = source.to_string();
    for edit in accepted.into_iter().rev() {
        output.replace_range(edit.start..edit.start + edit.len, &edit.replacement);
    }
    output
}

/// Rewrites image destinations using `url_to_filename`; unmapped images stay verbatim.
pub fn rewrite_image_references(
    markdown: &str,
    url_to_filename: &HashMap<String, String>,
) -> String {
    if url_to_filename.is_empty() {
        return markdown.to_string();
    }
    let edits = plan_image_rewrites(markdown, url_to_filename);
    apply_text_edits(markdown, &edits)
}
