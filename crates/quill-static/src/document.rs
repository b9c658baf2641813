//! Tolerant HTML scanning.
//!
//! Only as much HTML is understood as is needed to find elements and their
//! byte spans. Pages are never re-serialized, so everything outside the
//! spans that get edited is written back exactly as it was read.

use std::ops::Range;
use std::sync::OnceLock;

use quill_markup::decode_entities;
use regex::Regex;

/// Elements that never have content or an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is not markup and runs up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title", "iframe"];

fn tag_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<([a-zA-Z][a-zA-Z0-9:_-]*)").expect("valid tag name regex"))
}

fn end_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^</([a-zA-Z][a-zA-Z0-9:_-]*)[^>]*>").expect("valid end tag regex")
    })
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+)))?"#)
            .expect("valid attribute regex")
    })
}

/// An attribute of a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lowercased attribute name
    pub name: String,

    /// Value with character references decoded, `None` for bare attributes
    pub value: Option<String>,

    /// Byte span of the whole attribute in the page
    pub span: Range<usize>,
}

/// An element located in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name
    pub tag: String,

    /// Attributes in source order
    pub attrs: Vec<Attribute>,

    /// Byte span of the start tag
    pub start_tag: Range<usize>,

    /// Byte span between the start and end tags.
    /// `None` when the element was never closed or cannot have content.
    pub inner: Option<Range<usize>>,

    /// Byte span from the start of the start tag to the end of the end tag
    pub outer: Option<Range<usize>>,
}

impl Element {
    /// Value of an attribute. Bare attributes read as the empty string.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    /// Value of the `data-markup` attribute.
    pub fn markup(&self) -> Option<&str> {
        self.attr("data-markup")
    }
}

/// What follows an element in its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sibling<'a> {
    /// The next element sibling
    Element(&'a Element),
    /// Non-blank text comes before any element
    Text(Range<usize>),
    /// The parent closes or the page ends
    None,
}

struct StartTag {
    name: String,
    attrs: Vec<Attribute>,
    end: usize,
    self_closing: bool,
}

/// Find every element in `html`, in document order.
///
/// Comments, doctypes and processing instructions are skipped. The content of
/// raw-text elements such as `script` and `iframe` is not scanned. An end tag
/// closes the nearest open element with the same name, along with anything
/// opened after it. Stray end tags are ignored.
pub fn scan_elements(html: &str) -> Vec<Element> {
    let mut elements: Vec<Element> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut pos = 0;

    while let Some(found) = html[pos..].find('<') {
        let lt = pos + found;
        let rest = &html[lt..];

        if rest.starts_with("<!--") {
            pos = rest[4..]
                .find("-->")
                .map_or(html.len(), |i| lt + 4 + i + 3);
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            pos = rest.find('>').map_or(html.len(), |i| lt + i + 1);
        } else if rest.starts_with("</") {
            match end_tag_regex().captures(rest) {
                Some(caps) => {
                    let end = lt + caps[0].len();
                    let tag = caps[1].to_ascii_lowercase();
                    close_element(&mut elements, &mut open, &tag, lt, end);
                    pos = end;
                }
                None => pos = lt + 2,
            }
        } else if let Some(tag) = parse_start_tag(html, lt) {
            let index = elements.len();
            pos = tag.end;

            let is_void = VOID_ELEMENTS.contains(&tag.name.as_str());
            let is_raw = RAW_TEXT_ELEMENTS.contains(&tag.name.as_str());
            let mut element = Element {
                tag: tag.name,
                attrs: tag.attrs,
                start_tag: lt..tag.end,
                inner: None,
                outer: None,
            };

            if is_void {
                element.outer = Some(lt..tag.end);
            } else if tag.self_closing {
                element.inner = Some(tag.end..tag.end);
                element.outer = Some(lt..tag.end);
            } else if is_raw {
                match find_end_tag(html, tag.end, &element.tag) {
                    Some(close) => {
                        element.inner = Some(tag.end..close.start);
                        element.outer = Some(lt..close.end);
                        pos = close.end;
                    }
                    None => pos = html.len(),
                }
            } else {
                open.push(index);
            }

            elements.push(element);
        } else {
            pos = lt + 1;
        }
    }

    elements
}

fn close_element(
    elements: &mut [Element],
    open: &mut Vec<usize>,
    tag: &str,
    end_start: usize,
    end: usize,
) {
    let Some(depth) = open.iter().rposition(|&i| elements[i].tag == tag) else {
        return;
    };

    // Elements opened inside the closed one end where it ends.
    for &index in &open[depth + 1..] {
        let element = &mut elements[index];
        element.inner = Some(element.start_tag.end..end_start);
        element.outer = Some(element.start_tag.start..end_start);
    }

    let element = &mut elements[open[depth]];
    element.inner = Some(element.start_tag.end..end_start);
    element.outer = Some(element.start_tag.start..end);
    open.truncate(depth);
}

fn parse_start_tag(html: &str, start: usize) -> Option<StartTag> {
    let name = tag_name_regex().captures(&html[start..])?;
    let mut pos = start + name[0].len();
    let name = name[1].to_ascii_lowercase();
    let mut attrs = Vec::new();

    loop {
        let rest = &html[pos..];
        let after = rest.trim_start();
        let at = pos + (rest.len() - after.len());

        if after.starts_with("/>") {
            return Some(StartTag {
                name,
                attrs,
                end: at + 2,
                self_closing: true,
            });
        }
        if after.starts_with('>') {
            return Some(StartTag {
                name,
                attrs,
                end: at + 1,
                self_closing: false,
            });
        }

        match attribute_regex().captures(after) {
            Some(caps) => {
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map(|v| decode_entities(v.as_str()).into_owned());
                let len = caps[0].len();
                attrs.push(Attribute {
                    name: caps[1].to_ascii_lowercase(),
                    value,
                    span: at..at + len,
                });
                pos = at + len;
            }
            None => {
                // Unterminated tag, or a stray quote or slash between attributes.
                let c = after.chars().next()?;
                pos = at + c.len_utf8();
            }
        }
    }
}

/// Span of the end tag closing a raw-text element, searched from `from`.
fn find_end_tag(html: &str, from: usize, tag: &str) -> Option<Range<usize>> {
    let needle = format!("</{}", tag);
    let lowered = html[from..].to_ascii_lowercase();
    let mut search = 0;

    while let Some(found) = lowered[search..].find(&needle) {
        let start = search + found;
        let after = lowered[start + needle.len()..].chars().next();
        if matches!(after, None | Some('>' | '/')) || after.is_some_and(char::is_whitespace) {
            let end = lowered[start..]
                .find('>')
                .map_or(lowered.len(), |i| start + i + 1);
            return Some(from + start..from + end);
        }
        search = start + needle.len();
    }

    None
}

/// Find what follows the element ending at `offset`.
///
/// Whitespace and comments are skipped. `elements` must be the result of
/// [`scan_elements`] for the same `html`.
pub fn next_element_sibling<'a>(html: &str, elements: &'a [Element], offset: usize) -> Sibling<'a> {
    let mut pos = offset;

    loop {
        let rest = &html[pos..];
        let trimmed = rest.trim_start();
        pos += rest.len() - trimmed.len();

        if trimmed.is_empty() || trimmed.starts_with("</") {
            return Sibling::None;
        }

        if trimmed.starts_with("<!--") {
            pos = trimmed[4..]
                .find("-->")
                .map_or(html.len(), |i| pos + 4 + i + 3);
            continue;
        }

        if trimmed.starts_with('<') {
            if let Ok(index) = elements.binary_search_by_key(&pos, |e| e.start_tag.start) {
                return Sibling::Element(&elements[index]);
            }
        }

        let skip = usize::from(trimmed.starts_with('<'));
        let end = trimmed[skip..]
            .find('<')
            .map_or(html.len(), |i| pos + skip + i);
        return Sibling::Text(pos..end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn find<'a>(elements: &'a [Element], tag: &str) -> &'a Element {
        elements.iter().find(|e| e.tag == tag).unwrap()
    }

    #[test]
    fn finds_elements_with_spans() {
        let html = r#"<div data-markup="md"># Hi</div>"#;
        let elements = scan_elements(html);

        assert_eq!(elements.len(), 1);
        let div = &elements[0];
        assert_eq!(div.tag, "div");
        assert_eq!(div.markup(), Some("md"));
        assert_eq!(&html[div.inner.clone().unwrap()], "# Hi");
        assert_eq!(div.outer, Some(0..html.len()));
        assert_eq!(&html[div.start_tag.clone()], r#"<div data-markup="md">"#);
    }

    #[test]
    fn parses_attribute_forms() {
        let html = r#"<IFRAME Class=frame hidden title='a > b' srcdoc="&lt;p&gt;"></iframe>"#;
        let elements = scan_elements(html);
        let frame = &elements[0];

        assert_eq!(frame.tag, "iframe");
        assert_eq!(frame.attr("class"), Some("frame"));
        assert_eq!(frame.attr("hidden"), Some(""));
        assert_eq!(frame.attr("title"), Some("a > b"));
        assert_eq!(frame.attr("srcdoc"), Some("<p>"));
        assert_eq!(&html[frame.attrs[3].span.clone()], r#"srcdoc="&lt;p&gt;""#);
    }

    #[test]
    fn nests_and_closes_elements() {
        let html = "<section><div><p>one</div></section>";
        let elements = scan_elements(html);

        let p = find(&elements, "p");
        assert_eq!(&html[p.inner.clone().unwrap()], "one");
        let div = find(&elements, "div");
        assert_eq!(&html[div.inner.clone().unwrap()], "<p>one");
        let section = find(&elements, "section");
        assert_eq!(section.outer, Some(0..html.len()));
    }

    #[test]
    fn leaves_unclosed_elements_without_spans() {
        let elements = scan_elements("<div data-markup=\"md\">text</span>");
        assert_eq!(elements[0].inner, None);
        assert_eq!(elements[0].outer, None);
    }

    #[test]
    fn skips_comments_and_raw_text() {
        let html = "<!DOCTYPE html><!-- <div> --><script>if (a<b) { '<div>' }</script><br><p>x</p>";
        let elements = scan_elements(html);
        let tags: Vec<&str> = elements.iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["script", "br", "p"]);

        let script = find(&elements, "script");
        assert_eq!(
            &html[script.inner.clone().unwrap()],
            "if (a<b) { '<div>' }"
        );
        assert_eq!(find(&elements, "br").inner, None);
    }

    #[test]
    fn ignores_text_that_is_not_a_tag() {
        let elements = scan_elements("<p>a < b and 1<2</p>");
        assert_eq!(elements.len(), 1);
        assert!(elements[0].inner.is_some());
    }

    #[test]
    fn finds_next_element_sibling() {
        let html = "<div>a</div>\n  <!-- frame -->\n<iframe></iframe>";
        let elements = scan_elements(html);
        let div = find(&elements, "div");

        match next_element_sibling(html, &elements, div.outer.clone().unwrap().end) {
            Sibling::Element(element) => assert_eq!(element.tag, "iframe"),
            other => panic!("expected an element, got {:?}", other),
        }
    }

    #[test]
    fn reports_text_or_nothing_after_element() {
        let html = "<main><div>a</div> text <iframe></iframe><div>b</div></main>";
        let elements = scan_elements(html);
        let divs: Vec<&Element> = elements.iter().filter(|e| e.tag == "div").collect();

        let first_end = divs[0].outer.clone().unwrap().end;
        match next_element_sibling(html, &elements, first_end) {
            Sibling::Text(range) => assert_eq!(&html[range], "text "),
            other => panic!("expected text, got {:?}", other),
        }

        let second_end = divs[1].outer.clone().unwrap().end;
        assert_eq!(next_element_sibling(html, &elements, second_end), Sibling::None);
    }
}
