//! Markdown renderer with a fixed, page-wide option set.

use std::sync::OnceLock;

use pulldown_cmark::{
    html, CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream,
};
use regex::Regex;
use serde::Deserialize;

use crate::autolink::find_links;
use crate::unescape::escape_html;

/// Options controlling Markdown output.
///
/// The defaults are the option set every `data-markup="md"` element is
/// rendered with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarkdownOptions {
    /// Pass raw HTML in the source through to the output
    pub html: bool,

    /// Self-close void tags (`<br />`, `<hr />`)
    pub xhtml_out: bool,

    /// Turn newlines inside paragraphs into line breaks
    pub breaks: bool,

    /// CSS class prefix for fenced code block languages
    pub lang_prefix: String,

    /// Turn URL-like text into links
    pub linkify: bool,

    /// Smart quotes, dashes and symbol replacements
    pub typographer: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            html: true,
            xhtml_out: true,
            breaks: true,
            lang_prefix: "language-".to_string(),
            linkify: true,
            typographer: true,
        }
    }
}

/// Renders Markdown source to HTML.
#[derive(Debug, Clone, Default)]
pub struct MarkdownRenderer {
    options: MarkdownOptions,
}

impl MarkdownRenderer {
    /// Create a renderer with the given options.
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }

    /// Options this renderer was built with.
    pub fn options(&self) -> &MarkdownOptions {
        &self.options
    }

    /// Render Markdown source to an HTML string.
    pub fn render(&self, source: &str) -> String {
        let mut parser_options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
        if self.options.typographer {
            parser_options |= Options::ENABLE_SMART_PUNCTUATION;
        }

        let parser = TextMergeStream::new(Parser::new_ext(source, parser_options));

        let mut events: Vec<Event<'_>> = Vec::new();
        let mut in_code_block = false;
        let mut link_depth = 0usize;
        let mut html_link_depth = 0usize;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    in_code_block = true;
                    events.push(Event::Html(self.code_block_open(&kind).into()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    events.push(Event::Html("</code></pre>\n".into()));
                }
                Event::Start(Tag::Link { .. }) => {
                    link_depth += 1;
                    events.push(event);
                }
                Event::End(TagEnd::Link) => {
                    link_depth = link_depth.saturating_sub(1);
                    events.push(event);
                }
                Event::InlineHtml(raw) if self.options.html => {
                    if is_link_open(&raw) {
                        html_link_depth += 1;
                    } else if is_link_close(&raw) {
                        html_link_depth = html_link_depth.saturating_sub(1);
                    }
                    events.push(Event::InlineHtml(raw));
                }
                Event::Text(text) if !in_code_block => {
                    let in_link = link_depth > 0 || html_link_depth > 0;
                    self.push_text(text, in_link, &mut events);
                }
                Event::SoftBreak if self.options.breaks => {
                    events.push(self.line_break());
                }
                Event::HardBreak => {
                    events.push(self.line_break());
                }
                Event::Rule if !self.options.xhtml_out => {
                    events.push(Event::Html("<hr>\n".into()));
                }
                Event::Html(raw) | Event::InlineHtml(raw) if !self.options.html => {
                    events.push(Event::Text(raw));
                }
                other => events.push(other),
            }
        }

        let mut output = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut output, events.into_iter());
        output
    }

    fn code_block_open(&self, kind: &CodeBlockKind<'_>) -> String {
        let lang = match kind {
            CodeBlockKind::Fenced(info) => info.split_whitespace().next().unwrap_or(""),
            CodeBlockKind::Indented => "",
        };

        if lang.is_empty() {
            "<pre><code>".to_string()
        } else {
            format!(
                "<pre><code class=\"{}{}\">",
                escape_html(&self.options.lang_prefix),
                escape_html(lang)
            )
        }
    }

    fn line_break(&self) -> Event<'static> {
        if self.options.xhtml_out {
            Event::HardBreak
        } else {
            Event::InlineHtml("<br>\n".into())
        }
    }

    fn push_text<'a>(&self, text: CowStr<'a>, in_link: bool, events: &mut Vec<Event<'a>>) {
        let text: CowStr<'a> = if self.options.typographer {
            match replace_symbols(&text) {
                Some(replaced) => replaced.into(),
                None => text,
            }
        } else {
            text
        };

        if !self.options.linkify || in_link {
            events.push(Event::Text(text));
            return;
        }

        let links = find_links(&text);
        if links.is_empty() {
            events.push(Event::Text(text));
            return;
        }

        let mut cursor = 0;
        for link in links {
            if link.range.start > cursor {
                events.push(Event::Text(text[cursor..link.range.start].to_string().into()));
            }
            events.push(Event::Start(Tag::Link {
                link_type: LinkType::Autolink,
                dest_url: link.href.into(),
                title: CowStr::Borrowed(""),
                id: CowStr::Borrowed(""),
            }));
            events.push(Event::Text(text[link.range.clone()].to_string().into()));
            events.push(Event::End(TagEnd::Link));
            cursor = link.range.end;
        }
        if cursor < text.len() {
            events.push(Event::Text(text[cursor..].to_string().into()));
        }
    }
}

/// Whether a raw inline HTML tag opens an anchor.
fn is_link_open(raw: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^<a[>\s]").expect("link open pattern is valid"))
        .is_match(raw)
}

/// Whether a raw inline HTML tag closes an anchor.
fn is_link_close(raw: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^</a\s*>").expect("link close pattern is valid"))
        .is_match(raw)
}

fn symbol_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\((?:c|r|tm)\)|\+-").expect("symbol pattern is valid"))
}

/// Apply typographic symbol replacements. Returns `None` when nothing changed.
fn replace_symbols(text: &str) -> Option<String> {
    let pattern = symbol_pattern();
    if !pattern.is_match(text) {
        return None;
    }

    let replaced = pattern.replace_all(text, |caps: &regex::Captures<'_>| {
        match caps[0].to_ascii_lowercase().as_str() {
            "(c)" => "©",
            "(r)" => "®",
            "(tm)" => "™",
            _ => "±",
        }
    });
    Some(replaced.into_owned())
}
