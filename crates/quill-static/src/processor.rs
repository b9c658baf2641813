//! Rendering of marked elements within a page.
//!
//! A page goes through two sweeps. The Markdown sweep renders every
//! `data-markup="md"` element in place. The LaTeX sweep then renders every
//! `div[data-markup="tex"]` into the iframe that follows it, removes the
//! source element and adds a script that keeps the iframe sized to its
//! content. A failing element gets the error message as its content and never
//! stops the rest of the page.

use std::fmt;
use std::ops::Range;

use quill_markup::{escape_html, unescape_markup, MarkdownOptions, MarkdownRenderer};
use quill_tex::{GeneratorOptions, HtmlGenerator, TexGenerator, TexOutput};

use crate::document::{next_element_sibling, scan_elements, Element, Sibling};
use crate::templates::{FrameContext, FrameTemplates, ResizeContext};

/// Error shown when a LaTeX element is not followed by its frame.
pub const MISSING_FRAME_MESSAGE: &str =
    "next sibling of div[data-markup=\"tex\"] must be an iframe";

const UNCLOSED_MESSAGE: &str = "element has no end tag";

/// Configuration for page processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Options for `md` elements
    pub markdown: MarkdownOptions,

    /// Options for `tex` elements
    pub tex: GeneratorOptions,

    /// Delay between a frame loading and its first resize
    pub settle_delay_ms: u64,

    /// Delay between a frame resize event and the next measurement
    pub resize_debounce_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            markdown: MarkdownOptions::default(),
            tex: GeneratorOptions::default(),
            settle_delay_ms: 10,
            resize_debounce_ms: 50,
        }
    }
}

/// Markup language named by a `data-markup` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    Markdown,
    Tex,
}

impl Markup {
    /// The `data-markup` value selecting this language.
    pub fn attribute_value(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Tex => "tex",
        }
    }

    fn selects(self, element: &Element) -> bool {
        element.markup() == Some(self.attribute_value())
            && (self == Self::Markdown || element.tag == "div")
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute_value())
    }
}

/// What happened to one marked element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementOutcome {
    /// Rendered and written back
    Rendered,
    /// Rendering failed and the message replaced the element's content
    Failed(String),
    /// Left untouched
    Skipped(String),
}

/// Outcome for one marked element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementReport {
    pub markup: Markup,
    /// 1-based line of the element's start tag, as seen by its sweep
    pub line: usize,
    pub outcome: ElementOutcome,
}

/// Outcomes for every marked element of a page, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub elements: Vec<ElementReport>,
}

impl RenderReport {
    /// Number of elements rendered successfully.
    pub fn rendered(&self) -> usize {
        self.count(|o| matches!(o, ElementOutcome::Rendered))
    }

    /// Number of elements whose rendering failed.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ElementOutcome::Failed(_)))
    }

    /// Number of elements left untouched.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ElementOutcome::Skipped(_)))
    }

    /// True when every element rendered.
    pub fn is_clean(&self) -> bool {
        self.rendered() == self.elements.len()
    }

    fn count(&self, f: impl Fn(&ElementOutcome) -> bool) -> usize {
        self.elements.iter().filter(|e| f(&e.outcome)).count()
    }

    fn record(&mut self, markup: Markup, line: usize, outcome: ElementOutcome) {
        self.elements.push(ElementReport {
            markup,
            line,
            outcome,
        });
    }
}

/// A processed page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Page HTML with every marked element rendered
    pub html: String,

    /// Per-element outcomes
    pub report: RenderReport,
}

/// Errors that can occur while processing a page.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to render template: {0}")]
    TemplateError(String),
}

/// A replacement of one byte span of the page.
#[derive(Debug)]
struct Edit {
    range: Range<usize>,
    text: String,
}

/// Renders the marked elements of HTML pages.
pub struct PageProcessor {
    config: ProcessorConfig,
    markdown: MarkdownRenderer,
    generator: Box<dyn TexGenerator>,
    templates: FrameTemplates,
}

impl PageProcessor {
    /// Create a processor using the built-in LaTeX generator.
    pub fn new(config: ProcessorConfig) -> Self {
        let generator = Box::new(HtmlGenerator::new(config.tex.clone()));
        Self::with_generator(config, generator)
    }

    /// Create a processor with a custom LaTeX generator.
    pub fn with_generator(config: ProcessorConfig, generator: Box<dyn TexGenerator>) -> Self {
        Self {
            markdown: MarkdownRenderer::new(config.markdown.clone()),
            generator,
            templates: FrameTemplates::new(),
            config,
        }
    }

    /// The configuration this processor was built with.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Render every marked element of `html`.
    pub fn process(&self, html: &str) -> Result<RenderedPage, ProcessError> {
        let mut report = RenderReport::default();

        let html = self.markdown_sweep(html, &mut report);
        let html = self.tex_sweep(&html, &mut report)?;

        tracing::debug!(
            rendered = report.rendered(),
            failed = report.failed(),
            skipped = report.skipped(),
            "processed page"
        );

        Ok(RenderedPage { html, report })
    }

    fn markdown_sweep(&self, html: &str, report: &mut RenderReport) -> String {
        let elements = scan_elements(html);
        let mut edits = Vec::new();

        for element in outermost(&elements, Markup::Markdown) {
            let line = line_of(html, element.start_tag.start);

            let Some(inner) = element.inner.clone() else {
                skip(report, Markup::Markdown, element, line);
                continue;
            };

            let source = unescape_markup(&html[inner.clone()]);
            edits.push(Edit {
                range: inner,
                text: self.markdown.render(&source),
            });

            tracing::debug!(line, tag = %element.tag, "rendered md element");
            report.record(Markup::Markdown, line, ElementOutcome::Rendered);
        }

        apply_edits(html, edits)
    }

    fn tex_sweep(&self, html: &str, report: &mut RenderReport) -> Result<String, ProcessError> {
        let elements = scan_elements(html);
        let mut edits = Vec::new();

        for element in outermost(&elements, Markup::Tex) {
            let line = line_of(html, element.start_tag.start);

            let (Some(inner), Some(outer)) = (element.inner.clone(), element.outer.clone()) else {
                skip(report, Markup::Tex, element, line);
                continue;
            };

            let frame = match next_element_sibling(html, &elements, outer.end) {
                Sibling::Element(frame) if frame.tag == "iframe" => frame,
                _ => {
                    fail(&mut edits, report, inner, line, MISSING_FRAME_MESSAGE.to_string());
                    continue;
                }
            };

            let output = match self.generator.generate(&unescape_markup(&html[inner.clone()])) {
                Ok(output) => output,
                Err(e) => {
                    fail(&mut edits, report, inner, line, e.to_string());
                    continue;
                }
            };

            let frame_tag = self.frame_start_tag(html, frame, &output)?;
            let hook = self
                .templates
                .render_resize_hook(&ResizeContext {
                    settle_delay_ms: self.config.settle_delay_ms,
                    resize_debounce_ms: self.config.resize_debounce_ms,
                })
                .map_err(|e| ProcessError::TemplateError(e.to_string()))?;
            let hook_at = frame
                .outer
                .as_ref()
                .map_or(frame.start_tag.end, |o| o.end);

            edits.push(Edit {
                range: outer,
                text: String::new(),
            });
            edits.push(Edit {
                range: frame.start_tag.clone(),
                text: frame_tag,
            });
            edits.push(Edit {
                range: hook_at..hook_at,
                text: hook,
            });

            tracing::debug!(line, generator = self.generator.name(), "rendered tex element");
            report.record(Markup::Tex, line, ElementOutcome::Rendered);
        }

        Ok(apply_edits(html, edits))
    }

    /// Rebuild a frame's start tag with the generated output in its `srcdoc`.
    fn frame_start_tag(
        &self,
        html: &str,
        frame: &Element,
        output: &TexOutput,
    ) -> Result<String, ProcessError> {
        let body = format!("{}{}", output.styles_and_scripts, output.fragment);
        let existing = frame.attrs.iter().find(|a| a.name == "srcdoc");

        let document = match existing {
            Some(attr) => append_to_body(attr.value.as_deref().unwrap_or(""), &body),
            None => self
                .templates
                .render_frame(&FrameContext {
                    title: output.title.clone(),
                    body,
                })
                .map_err(|e| ProcessError::TemplateError(e.to_string()))?,
        };

        let mut tag = String::new();
        let mut cursor = frame.start_tag.start;
        if let Some(attr) = existing {
            tag.push_str(html[cursor..attr.span.start].trim_end());
            cursor = attr.span.end;
        }

        let rest = &html[cursor..frame.start_tag.end];
        let close = if rest.ends_with("/>") {
            rest.len() - 2
        } else {
            rest.len() - 1
        };
        tag.push_str(rest[..close].trim_end());
        tag.push_str(" srcdoc=\"");
        tag.push_str(&escape_html(&document));
        tag.push('"');
        tag.push_str(&rest[close..]);

        Ok(tag)
    }
}

/// Marked elements that are not nested inside another marked element of
/// the same kind. The outer element renders the nested one as content.
fn outermost(elements: &[Element], markup: Markup) -> Vec<&Element> {
    let mut selected = Vec::new();
    let mut covered_until = 0;

    for element in elements.iter().filter(|e| markup.selects(e)) {
        if element.start_tag.start < covered_until {
            tracing::debug!(markup = %markup, "skipping nested element");
            continue;
        }
        if let Some(outer) = &element.outer {
            covered_until = outer.end;
        }
        selected.push(element);
    }

    selected
}

fn skip(report: &mut RenderReport, markup: Markup, element: &Element, line: usize) {
    tracing::warn!(
        line,
        tag = %element.tag,
        "skipping {} element: {}",
        markup,
        UNCLOSED_MESSAGE
    );
    report.record(markup, line, ElementOutcome::Skipped(UNCLOSED_MESSAGE.to_string()));
}

fn fail(
    edits: &mut Vec<Edit>,
    report: &mut RenderReport,
    inner: Range<usize>,
    line: usize,
    message: String,
) {
    tracing::warn!(line, "tex element failed: {}", message);
    edits.push(Edit {
        range: inner,
        text: escape_html(&message),
    });
    report.record(Markup::Tex, line, ElementOutcome::Failed(message));
}

/// Insert `content` at the end of an HTML document's body.
fn append_to_body(document: &str, content: &str) -> String {
    match document.to_ascii_lowercase().rfind("</body") {
        Some(at) => format!("{}{}{}", &document[..at], content, &document[at..]),
        None => format!("{}{}", document, content),
    }
}

/// Apply non-overlapping edits, last first so earlier offsets stay valid.
/// At equal offsets a replacement runs before an insertion.
fn apply_edits(html: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| {
        b.range
            .start
            .cmp(&a.range.start)
            .then(b.range.end.cmp(&a.range.end))
    });

    let mut out = html.to_string();
    for edit in edits {
        out.replace_range(edit.range, &edit.text);
    }
    out
}

fn line_of(html: &str, offset: usize) -> usize {
    html[..offset].matches('\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_tex::TexError;

    /// Generator echoing its input, failing on `fail`.
    struct EchoGenerator;

    impl TexGenerator for EchoGenerator {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn generate(&self, source: &str) -> Result<TexOutput, TexError> {
            if source.contains("fail") {
                return Err(TexError::UnknownMacro {
                    name: "fail".to_string(),
                    line: 1,
                });
            }
            Ok(TexOutput {
                fragment: format!("<p>{}</p>", source),
                styles_and_scripts: "<style>s</style>".to_string(),
                title: None,
            })
        }
    }

    fn echo_processor() -> PageProcessor {
        PageProcessor::with_generator(ProcessorConfig::default(), Box::new(EchoGenerator))
    }

    fn srcdoc(html: &str) -> String {
        scan_elements(html)
            .into_iter()
            .find(|e| e.tag == "iframe")
            .and_then(|e| e.attr("srcdoc").map(str::to_string))
            .unwrap()
    }

    #[test]
    fn renders_markdown_in_place() {
        let page = PageProcessor::new(ProcessorConfig::default())
            .process("<body>\n<div data-markup=\"md\" class=\"x\"># Title\n\n*hi*</div>\n</body>")
            .unwrap();

        assert_eq!(
            page.html,
            "<body>\n<div data-markup=\"md\" class=\"x\"><h1>Title</h1>\n<p><em>hi</em></p>\n</div>\n</body>"
        );
        assert_eq!(page.report.rendered(), 1);
        assert!(page.report.is_clean());
    }

    #[test]
    fn unescapes_markdown_before_rendering() {
        let processor = PageProcessor::new(ProcessorConfig::default());
        let page = processor
            .process("<section data-markup=\"md\">a &lt;b&gt; %26 `x &amp; y`</section>")
            .unwrap();

        let expected = MarkdownRenderer::default().render("a <b> & `x & y`");
        assert_eq!(
            page.html,
            format!("<section data-markup=\"md\">{}</section>", expected)
        );
    }

    #[test]
    fn preserves_bytes_outside_marked_elements() {
        let html = "<!DOCTYPE html>\n<HTML><p  class=a>keep &amp; this</p><div data-markup=\"md\">x</div><!-- c --></HTML>";
        let page = echo_processor().process(html).unwrap();

        assert!(page
            .html
            .starts_with("<!DOCTYPE html>\n<HTML><p  class=a>keep &amp; this</p><div data-markup=\"md\">"));
        assert!(page.html.ends_with("</div><!-- c --></HTML>"));
    }

    #[test]
    fn ignores_other_markup_values() {
        let html = "<div data-markup=\"rst\">*a*</div><span data-markup=\"tex\">x</span>";
        let page = echo_processor().process(html).unwrap();

        assert_eq!(page.html, html);
        assert!(page.report.elements.is_empty());
    }

    #[test]
    fn moves_tex_output_into_frame() {
        let html = "<main>\n<div data-markup=\"tex\">x &lt; y</div>\n<iframe class=\"doc\"></iframe>\n</main>";
        let page = echo_processor().process(html).unwrap();

        assert!(!page.html.contains("data-markup"));
        assert!(page.html.starts_with("<main>\n\n<iframe class=\"doc\" srcdoc=\""));
        assert!(page.html.contains("</iframe><script>"));
        assert!(page.html.ends_with("</script>\n</main>"));

        let document = srcdoc(&page.html);
        assert!(document.contains("<body>\n<style>s</style><p>x < y</p>\n</body>"));
        assert_eq!(page.report.rendered(), 1);
    }

    #[test]
    fn appends_to_existing_srcdoc_body() {
        let html = "<div data-markup=\"tex\">a</div><iframe srcdoc=\"&lt;body&gt;&lt;h1&gt;Hi&lt;/h1&gt;&lt;/body&gt;\" width=\"300\"></iframe>";
        let page = echo_processor().process(html).unwrap();

        assert!(page.html.starts_with("<iframe width=\"300\" srcdoc=\""));
        assert_eq!(
            srcdoc(&page.html),
            "<body><h1>Hi</h1><style>s</style><p>a</p></body>"
        );
    }

    #[test]
    fn requires_frame_after_tex_element() {
        let html = "<div data-markup=\"tex\">a</div>\n<p>not a frame</p><iframe></iframe>";
        let page = echo_processor().process(html).unwrap();

        assert_eq!(
            page.html,
            "<div data-markup=\"tex\">next sibling of div[data-markup=&quot;tex&quot;] must be an iframe</div>\n<p>not a frame</p><iframe></iframe>"
        );
        assert_eq!(
            page.report.elements[0].outcome,
            ElementOutcome::Failed(MISSING_FRAME_MESSAGE.to_string())
        );
    }

    #[test]
    fn text_between_element_and_frame_is_an_error() {
        let page = echo_processor()
            .process("<div data-markup=\"tex\">a</div> stray <iframe></iframe>")
            .unwrap();

        assert_eq!(page.report.failed(), 1);
        assert!(!page.html.contains("srcdoc"));
    }

    #[test]
    fn failure_does_not_stop_later_elements() {
        let html = "<div data-markup=\"tex\">fail</div><iframe></iframe>\n<div data-markup=\"tex\">ok</div><iframe></iframe>";
        let page = echo_processor().process(html).unwrap();

        assert!(page
            .html
            .starts_with("<div data-markup=\"tex\">undefined control sequence \\fail on line 1</div><iframe></iframe>\n<iframe srcdoc="));
        assert_eq!(page.report.failed(), 1);
        assert_eq!(page.report.rendered(), 1);
        assert!(!page.report.is_clean());
    }

    #[test]
    fn renders_frames_side_by_side() {
        let html = "<div data-markup=\"tex\">one</div><iframe></iframe><div data-markup=\"tex\">two</div><iframe></iframe>";
        let page = echo_processor().process(html).unwrap();

        assert_eq!(page.report.rendered(), 2);
        assert_eq!(page.html.matches("<script>").count(), 2);
        assert!(!page.html.contains("data-markup"));
    }

    #[test]
    fn runs_markdown_sweep_before_tex_sweep() {
        let html = "<div data-markup=\"md\">intro</div><div data-markup=\"tex\">body</div><iframe></iframe>";
        let page = echo_processor().process(html).unwrap();

        assert_eq!(
            page.report
                .elements
                .iter()
                .map(|e| e.markup)
                .collect::<Vec<_>>(),
            vec![Markup::Markdown, Markup::Tex]
        );
        assert!(page.html.starts_with("<div data-markup=\"md\"><p>intro</p>\n</div><iframe"));
    }

    #[test]
    fn skips_unclosed_and_nested_elements() {
        let page = echo_processor()
            .process("<div data-markup=\"md\">a <span data-markup=\"md\">b</span></div><div data-markup=\"md\">open")
            .unwrap();

        assert_eq!(page.report.rendered(), 1);
        assert_eq!(
            page.report.elements[1].outcome,
            ElementOutcome::Skipped(UNCLOSED_MESSAGE.to_string())
        );
        assert!(page.html.ends_with("<div data-markup=\"md\">open"));
    }

    #[test]
    fn uses_configured_timings() {
        let processor = PageProcessor::with_generator(
            ProcessorConfig {
                settle_delay_ms: 25,
                resize_debounce_ms: 120,
                ..Default::default()
            },
            Box::new(EchoGenerator),
        );
        let page = processor
            .process("<div data-markup=\"tex\">a</div><iframe></iframe>")
            .unwrap();

        assert!(page.html.contains("schedule(25);"));
        assert!(page.html.contains("schedule(120);"));
    }

    #[test]
    fn renders_latex_with_builtin_generator() {
        let page = PageProcessor::new(ProcessorConfig::default())
            .process("<div data-markup=\"tex\">\\section{Intro}\nSome $x^2$ text.</div><iframe></iframe>")
            .unwrap();

        let document = srcdoc(&page.html);
        assert!(document.contains("<div class=\"quill-tex\">"));
        assert!(document.contains("<span class=\"section-number\">1</span>Intro"));
        assert!(document.contains("katex"));
        assert!(page.report.is_clean());
    }

    #[test]
    fn applies_edits_back_to_front() {
        let edits = vec![
            Edit {
                range: 0..1,
                text: "A".to_string(),
            },
            Edit {
                range: 3..3,
                text: "!".to_string(),
            },
            Edit {
                range: 2..3,
                text: String::new(),
            },
        ];

        assert_eq!(apply_edits("abc", edits), "Ab!");
    }
}
