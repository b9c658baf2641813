//! Built-in LaTeX document generator.
//!
//! Walks the token stream once, writing HTML as it goes. Paragraphs open
//! lazily on the first piece of inline content and close on blank lines or
//! block-level constructs. Font declarations (`\bfseries`, `\em`, ...) are
//! tracked on a stack so their spans can be closed and reopened around
//! paragraph boundaries.

use std::collections::HashMap;

use chrono::Utc;

use quill_markup::escape_html;

use crate::lexer::{Lexer, Token};
use crate::math::render_math;
use crate::styles::styles_and_scripts;
use crate::traits::{GeneratorOptions, TexError, TexGenerator, TexOutput};

/// Marker delimiting unresolved cross references in the output buffer.
const REF_MARK: char = '\u{1}';

/// Generator producing HTML for an article-style LaTeX document.
#[derive(Debug, Clone, Default)]
pub struct HtmlGenerator {
    options: GeneratorOptions,
}

impl HtmlGenerator {
    /// Create a generator with the given options.
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }

    /// Options this generator was built with.
    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }
}

impl TexGenerator for HtmlGenerator {
    fn name(&self) -> &'static str {
        "html"
    }

    fn generate(&self, source: &str) -> Result<TexOutput, TexError> {
        let mut doc = Document::new(source);
        doc.run()?;

        let title = doc.title.as_deref().map(strip_tags);
        let fragment = doc.finish(self.options.hyphenate);

        tracing::debug!(bytes = fragment.len(), "generated LaTeX fragment");

        Ok(TexOutput {
            fragment,
            styles_and_scripts: styles_and_scripts(&self.options),
            title,
        })
    }
}

/// Where a nested parse stops.
#[derive(Debug, Clone, Copy)]
enum Stop<'s> {
    Eof,
    Group { line: usize },
    Env { name: &'s str, line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Itemize,
    Enumerate,
    Description,
}

impl ListKind {
    fn open_tag(self) -> &'static str {
        match self {
            Self::Itemize => "<ul class=\"itemize\">\n",
            Self::Enumerate => "<ol class=\"enumerate\">\n",
            Self::Description => "<dl class=\"description\">\n",
        }
    }

    fn close_tag(self) -> &'static str {
        match self {
            Self::Itemize => "</ul>\n",
            Self::Enumerate => "</ol>\n",
            Self::Description => "</dl>\n",
        }
    }

    fn item_close(self) -> &'static str {
        match self {
            Self::Description => "</dd>\n",
            _ => "</li>\n",
        }
    }
}

#[derive(Debug)]
struct ListState {
    kind: ListKind,
    item_open: bool,
}

/// The value and anchor a `\label` attaches to.
#[derive(Debug, Clone)]
struct Target {
    number: String,
    anchor: String,
}

/// Generation state for one document.
struct Document<'s> {
    lexer: Lexer<'s>,
    out: String,
    para_open: bool,
    noindent_next: bool,
    inline_depth: usize,
    declarations: Vec<&'static str>,
    lists: Vec<ListState>,
    in_preamble: bool,
    document_seen: bool,
    sections: [usize; 3],
    equations: usize,
    footnotes: Vec<String>,
    current_target: Option<Target>,
    labels: HashMap<String, Target>,
    title: Option<String>,
    author: Option<String>,
    date: Option<String>,
}

fn misplaced(message: impl Into<String>, line: usize) -> TexError {
    TexError::Misplaced {
        message: message.into(),
        line,
    }
}

impl<'s> Document<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            lexer: Lexer::new(source),
            out: String::with_capacity(source.len() * 2),
            para_open: false,
            noindent_next: false,
            inline_depth: 0,
            declarations: Vec::new(),
            lists: Vec::new(),
            in_preamble: false,
            document_seen: false,
            sections: [0; 3],
            equations: 0,
            footnotes: Vec::new(),
            current_target: None,
            labels: HashMap::new(),
            title: None,
            author: None,
            date: None,
        }
    }

    fn run(&mut self) -> Result<(), TexError> {
        self.parse_until(Stop::Eof)?;
        if self.in_preamble {
            return Err(misplaced("missing \\begin{document}", self.lexer.line()));
        }
        Ok(())
    }

    /// Close the body and wrap it together with collected footnotes.
    fn finish(mut self, hyphenate: bool) -> String {
        self.close_para();
        let body = self.resolve_references(&self.out);

        let mut html = format!(
            "<div class=\"quill-tex{}\">\n",
            if hyphenate { " hyphenate" } else { "" }
        );
        html.push_str(&body);

        if !self.footnotes.is_empty() {
            html.push_str("<div class=\"footnotes\">\n<ol>\n");
            for (i, note) in self.footnotes.iter().enumerate() {
                let n = i + 1;
                html.push_str(&format!(
                    "<li id=\"fn-{n}\"><p>{} <a href=\"#fnref-{n}\" class=\"footnote-back\">↩</a></p></li>\n",
                    self.resolve_references(note.trim())
                ));
            }
            html.push_str("</ol>\n</div>\n");
        }

        html.push_str("</div>\n");
        html
    }

    /// Replace reference markers in `text` with links to their targets.
    fn resolve_references(&self, text: &str) -> String {
        let mut resolved = String::with_capacity(text.len());
        let mut parts = text.split(REF_MARK);

        if let Some(first) = parts.next() {
            resolved.push_str(first);
        }

        // Markers come in pairs: odd parts are `kind:key`, even parts are text.
        while let Some(reference) = parts.next() {
            let (kind, key) = reference.split_once(':').unwrap_or(("ref", reference));
            let link = match self.labels.get(key) {
                Some(target) => format!(
                    "<a href=\"#{}\" class=\"ref\">{}</a>",
                    target.anchor, target.number
                ),
                None => "??".to_string(),
            };
            if kind == "eqref" {
                resolved.push_str(&format!("({})", link));
            } else {
                resolved.push_str(&link);
            }
            if let Some(text) = parts.next() {
                resolved.push_str(text);
            }
        }

        resolved
    }

    fn in_flow(&self) -> bool {
        self.para_open || self.inline_depth > 0
    }

    fn open_para(&mut self) {
        if self.noindent_next {
            self.out.push_str("<p class=\"noindent\">");
            self.noindent_next = false;
        } else {
            self.out.push_str("<p>");
        }
        for class in &self.declarations {
            self.out.push_str(&format!("<span class=\"{}\">", class));
        }
        self.para_open = true;
    }

    fn close_para(&mut self) {
        if !self.para_open {
            return;
        }
        let trimmed = self.out.trim_end_matches(' ').len();
        self.out.truncate(trimmed);
        for _ in &self.declarations {
            self.out.push_str("</span>");
        }
        self.out.push_str("</p>\n");
        self.para_open = false;
    }

    /// Prepare for inline content, opening a paragraph when needed.
    fn begin_inline(&mut self, line: usize) -> Result<(), TexError> {
        if self.inline_depth > 0 || self.para_open {
            return Ok(());
        }
        if self.in_preamble {
            return Err(misplaced("text before \\begin{document}", line));
        }
        if let Some(list) = self.lists.last() {
            if !list.item_open {
                return Err(misplaced("something's wrong, perhaps a missing \\item", line));
            }
        }
        self.open_para();
        Ok(())
    }

    /// Prepare for block-level content, closing any open paragraph.
    fn begin_block(&mut self, what: &str, line: usize) -> Result<(), TexError> {
        if self.inline_depth > 0 {
            return Err(misplaced(format!("{} is not allowed inside an argument", what), line));
        }
        if self.in_preamble {
            return Err(misplaced(format!("{} before \\begin{{document}}", what), line));
        }
        self.close_para();
        Ok(())
    }

    fn parse_until(&mut self, stop: Stop<'s>) -> Result<(), TexError> {
        let scope = self.declarations.len();

        loop {
            let Some(tok) = self.lexer.next_token() else {
                match stop {
                    Stop::Eof => break,
                    Stop::Group { line } => {
                        return Err(TexError::Unterminated {
                            what: "group".to_string(),
                            line,
                        })
                    }
                    Stop::Env { name, line } => {
                        return Err(TexError::Unterminated {
                            what: format!("environment {}", name),
                            line,
                        })
                    }
                }
            };
            let line = tok.line;

            match tok.token {
                Token::EndGroup => match stop {
                    Stop::Group { .. } => break,
                    _ => return Err(misplaced("too many }'s", line)),
                },
                Token::BeginGroup => self.parse_until(Stop::Group { line })?,
                Token::Command("end") => {
                    let found = self.env_name("end", line)?;
                    match stop {
                        Stop::Env { name, .. } if name == found => break,
                        Stop::Env { name, .. } => {
                            return Err(TexError::MismatchedEnd {
                                expected: name.to_string(),
                                found: found.to_string(),
                                line,
                            })
                        }
                        _ => {
                            return Err(TexError::UnexpectedEnd {
                                name: found.to_string(),
                                line,
                            })
                        }
                    }
                }
                Token::Command(name) => self.command(name, line)?,
                Token::Symbol(symbol) => self.symbol(symbol, line)?,
                Token::MathShift => self.inline_math("$", line)?,
                Token::DisplayMathShift => self.display_math("$$", line)?,
                Token::Alignment => {
                    return Err(misplaced("misplaced alignment tab character &", line))
                }
                Token::Parameter => {
                    return Err(misplaced("macro parameter character # outside a definition", line))
                }
                Token::Superscript | Token::Subscript => {
                    return Err(misplaced("missing $ inserted", line))
                }
                Token::Tilde => {
                    self.begin_inline(line)?;
                    self.out.push_str("&nbsp;");
                }
                Token::Text(text) => {
                    self.begin_inline(line)?;
                    self.out.push_str(&typeset(text));
                }
                Token::Space => {
                    if self.in_flow() && !self.out.ends_with(' ') {
                        self.out.push(' ');
                    }
                }
                Token::ParBreak => {
                    if self.inline_depth > 0 {
                        if !self.out.ends_with(' ') {
                            self.out.push(' ');
                        }
                    } else {
                        self.close_para();
                    }
                }
            }
        }

        self.end_scope(scope);
        Ok(())
    }

    fn end_scope(&mut self, scope: usize) {
        if self.declarations.len() > scope && self.in_flow() {
            for _ in scope..self.declarations.len() {
                self.out.push_str("</span>");
            }
        }
        self.declarations.truncate(scope);
    }

    /// Run `f` writing into a fresh buffer and return what it wrote.
    fn capture(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), TexError>,
    ) -> Result<String, TexError> {
        let saved_out = std::mem::take(&mut self.out);
        let saved_declarations = std::mem::take(&mut self.declarations);
        self.inline_depth += 1;

        let result = f(self);

        self.inline_depth -= 1;
        self.declarations = saved_declarations;
        let captured = std::mem::replace(&mut self.out, saved_out);
        result.map(|()| captured)
    }

    /// Render a mandatory `{...}` argument as inline HTML.
    fn capture_arg(&mut self, command: &str, line: usize) -> Result<String, TexError> {
        if self.lexer.peek_after_blanks() != Some('{') {
            return Err(TexError::MissingArgument {
                command: command.to_string(),
                line,
            });
        }
        let open = self.lexer.next_token().map(|t| t.line).unwrap_or(line);
        self.capture(|doc| doc.parse_until(Stop::Group { line: open }))
    }

    /// Render a piece of source taken out of a raw argument as inline HTML.
    fn capture_source(&mut self, source: &'s str, line: usize) -> Result<String, TexError> {
        let outer = std::mem::replace(&mut self.lexer, Lexer::with_line(source, line));
        let result = self.capture(|doc| doc.parse_until(Stop::Eof));
        self.lexer = outer;
        result
    }

    /// Read a mandatory `{...}` argument verbatim.
    fn raw_arg(&mut self, command: &str, line: usize) -> Result<&'s str, TexError> {
        if self.lexer.peek_after_blanks() != Some('{') {
            return Err(TexError::MissingArgument {
                command: command.to_string(),
                line,
            });
        }
        self.lexer
            .raw_balanced('{', '}')
            .ok_or_else(|| TexError::Unterminated {
                what: format!("argument of \\{}", command),
                line,
            })
    }

    fn env_name(&mut self, command: &str, line: usize) -> Result<&'s str, TexError> {
        Ok(self.raw_arg(command, line)?.trim())
    }

    fn command(&mut self, name: &'s str, line: usize) -> Result<(), TexError> {
        match name {
            "documentclass" => {
                if self.document_seen || !self.out.is_empty() {
                    return Err(misplaced("\\documentclass outside the preamble", line));
                }
                self.lexer.raw_optional();
                self.raw_arg(name, line)?;
                self.in_preamble = true;
            }
            "usepackage" => {
                self.lexer.raw_optional();
                let packages = self.raw_arg(name, line)?;
                tracing::trace!(packages, "ignoring \\usepackage");
            }
            "title" => self.title = Some(self.capture_arg(name, line)?.trim().to_string()),
            "author" => self.author = Some(self.capture_arg(name, line)?.trim().to_string()),
            "date" => self.date = Some(self.capture_arg(name, line)?.trim().to_string()),
            "and" => {
                self.begin_inline(line)?;
                let trimmed = self.out.trim_end().len();
                self.out.truncate(trimmed);
                self.out.push_str(", ");
            }
            "maketitle" => self.make_title(line)?,
            "today" => {
                self.begin_inline(line)?;
                self.out.push_str(&today());
            }
            "section" | "subsection" | "subsubsection" | "paragraph" => {
                self.heading(name, line)?
            }
            "textbf" => self.styled_arg(name, "<strong>", "</strong>", line)?,
            "emph" => self.styled_arg(name, "<em>", "</em>", line)?,
            "textit" => self.styled_arg(name, "<span class=\"it\">", "</span>", line)?,
            "texttt" => self.styled_arg(name, "<span class=\"tt\">", "</span>", line)?,
            "textsf" => self.styled_arg(name, "<span class=\"sf\">", "</span>", line)?,
            "textsc" => self.styled_arg(name, "<span class=\"sc\">", "</span>", line)?,
            "textup" => self.styled_arg(name, "<span class=\"up\">", "</span>", line)?,
            "textmd" => self.styled_arg(name, "<span class=\"md\">", "</span>", line)?,
            "textrm" => self.styled_arg(name, "<span class=\"rm\">", "</span>", line)?,
            "underline" => {
                self.styled_arg(name, "<span class=\"underline\">", "</span>", line)?
            }
            "bfseries" | "bf" => self.declaration("bf"),
            "itshape" | "it" | "em" => self.declaration("it"),
            "ttfamily" | "tt" => self.declaration("tt"),
            "sffamily" | "sf" => self.declaration("sf"),
            "scshape" | "sc" => self.declaration("sc"),
            "upshape" => self.declaration("up"),
            "mdseries" => self.declaration("md"),
            "rmfamily" | "rm" => self.declaration("rm"),
            "normalfont" | "centering" | "raggedright" | "raggedleft" | "indent" | "sloppy"
            | "fussy" | "hfill" | "relax" | "protect" => {}
            "noindent" => {
                if !self.para_open {
                    self.noindent_next = true;
                }
            }
            "par" | "newpage" | "clearpage" | "smallskip" | "medskip" | "bigskip" => {
                if self.inline_depth == 0 {
                    self.close_para();
                }
            }
            "newline" => {
                self.begin_inline(line)?;
                self.out.push_str("<br>");
            }
            "item" => self.item(line)?,
            "begin" => self.begin_environment(line)?,
            "footnote" => self.footnote(line)?,
            "href" => {
                self.begin_inline(line)?;
                let url = unescape_url(self.raw_arg(name, line)?);
                let text = self.capture_arg(name, line)?;
                self.out
                    .push_str(&format!("<a href=\"{}\">{}</a>", escape_html(&url), text));
            }
            "url" => {
                self.begin_inline(line)?;
                let url = unescape_url(self.raw_arg(name, line)?);
                let escaped = escape_html(&url);
                self.out.push_str(&format!(
                    "<a href=\"{}\" class=\"url\"><span class=\"tt\">{}</span></a>",
                    escaped, escaped
                ));
            }
            "label" => {
                let key = self.raw_arg(name, line)?.trim().to_string();
                if let Some(target) = self.current_target.clone() {
                    self.labels.insert(key, target);
                }
            }
            "ref" | "eqref" => {
                self.begin_inline(line)?;
                let key = self.raw_arg(name, line)?.trim();
                self.out
                    .push_str(&format!("{REF_MARK}{name}:{key}{REF_MARK}"));
            }
            "LaTeX" => {
                self.begin_inline(line)?;
                self.out.push_str(
                    "<span class=\"latex-logo\">L<span class=\"a\">a</span>T<span class=\"e\">e</span>X</span>",
                );
            }
            "TeX" => {
                self.begin_inline(line)?;
                self.out
                    .push_str("<span class=\"tex-logo\">T<span class=\"e\">e</span>X</span>");
            }
            _ => match symbol_macro(name) {
                Some(text) => {
                    self.begin_inline(line)?;
                    self.out.push_str(&escape_html(text));
                }
                None => {
                    return Err(TexError::UnknownMacro {
                        name: name.to_string(),
                        line,
                    })
                }
            },
        }
        Ok(())
    }

    fn symbol(&mut self, symbol: char, line: usize) -> Result<(), TexError> {
        match symbol {
            '\\' => {
                if !self.in_flow() {
                    return Err(misplaced("there's no line here to end", line));
                }
                self.lexer.eat_char('*');
                self.lexer.raw_optional();
                self.out.push_str("<br>");
            }
            '%' | '$' | '&' | '#' | '_' | '{' | '}' => {
                self.begin_inline(line)?;
                self.out.push_str(&escape_html(&symbol.to_string()));
            }
            ' ' | '\n' | '\t' => {
                self.begin_inline(line)?;
                self.out.push(' ');
            }
            ',' => {
                self.begin_inline(line)?;
                self.out.push('\u{2009}');
            }
            '-' => {
                self.begin_inline(line)?;
                self.out.push('\u{ad}');
            }
            '/' | '@' | '!' => {}
            '(' => self.inline_math("\\)", line)?,
            '[' => self.display_math("\\]", line)?,
            ')' | ']' => return Err(misplaced(format!("unexpected \\{}", symbol), line)),
            '\'' | '`' | '^' | '"' | '~' | '=' | '.' => self.accent(symbol, line)?,
            _ => {
                return Err(TexError::UnknownMacro {
                    name: symbol.to_string(),
                    line,
                })
            }
        }
        Ok(())
    }

    fn accent(&mut self, mark: char, line: usize) -> Result<(), TexError> {
        let combining = match mark {
            '\'' => '\u{301}',
            '`' => '\u{300}',
            '^' => '\u{302}',
            '"' => '\u{308}',
            '~' => '\u{303}',
            '=' => '\u{304}',
            _ => '\u{307}',
        };
        let base = self
            .lexer
            .raw_char_arg()
            .ok_or_else(|| TexError::MissingArgument {
                command: mark.to_string(),
                line,
            })?;

        self.begin_inline(line)?;
        self.out.push_str(&escape_html(&base.to_string()));
        self.out.push(combining);
        Ok(())
    }

    fn styled_arg(
        &mut self,
        command: &str,
        open: &str,
        close: &str,
        line: usize,
    ) -> Result<(), TexError> {
        self.begin_inline(line)?;
        let inner = self.capture_arg(command, line)?;
        self.out.push_str(open);
        self.out.push_str(&inner);
        self.out.push_str(close);
        Ok(())
    }

    fn declaration(&mut self, class: &'static str) {
        if self.in_flow() {
            self.out.push_str(&format!("<span class=\"{}\">", class));
        }
        self.declarations.push(class);
    }

    fn make_title(&mut self, line: usize) -> Result<(), TexError> {
        self.begin_block("\\maketitle", line)?;
        let title = self
            .title
            .clone()
            .ok_or_else(|| misplaced("no \\title given", line))?;

        self.out.push_str("<div class=\"titlepage\">\n");
        self.out
            .push_str(&format!("<h1 class=\"title\">{}</h1>\n", title));
        if let Some(author) = &self.author {
            self.out
                .push_str(&format!("<div class=\"author\">{}</div>\n", author));
        }
        let date = self.date.clone().unwrap_or_else(today);
        if !date.is_empty() {
            self.out
                .push_str(&format!("<div class=\"date\">{}</div>\n", date));
        }
        self.out.push_str("</div>\n");
        self.noindent_next = true;
        Ok(())
    }

    fn heading(&mut self, name: &str, line: usize) -> Result<(), TexError> {
        let level = match name {
            "section" => 0,
            "subsection" => 1,
            "subsubsection" => 2,
            _ => 3,
        };
        let starred = self.lexer.eat_char('*');
        self.begin_block(&format!("\\{}", name), line)?;
        let title = self.capture_arg(name, line)?;
        let title = title.trim();
        let tag = level + 2;

        if level < 3 && !starred {
            self.sections[level] += 1;
            for deeper in &mut self.sections[level + 1..] {
                *deeper = 0;
            }
            let number = self.sections[..=level]
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(".");
            let anchor = format!("sec-{}", number.replace('.', "-"));

            self.out.push_str(&format!(
                "<h{tag} id=\"{anchor}\" class=\"{name}\"><span class=\"section-number\">{number}</span>{title}</h{tag}>\n"
            ));
            self.current_target = Some(Target { number, anchor });
        } else {
            self.out
                .push_str(&format!("<h{tag} class=\"{name}\">{title}</h{tag}>\n"));
        }
        self.noindent_next = level < 3;
        Ok(())
    }

    fn item(&mut self, line: usize) -> Result<(), TexError> {
        if self.inline_depth > 0 {
            return Err(misplaced("\\item is not allowed inside an argument", line));
        }
        let label = self.lexer.raw_optional();
        let (kind, item_open) = match self.lists.last() {
            Some(list) => (list.kind, list.item_open),
            None => return Err(misplaced("\\item outside a list", line)),
        };

        self.close_para();
        if item_open {
            self.out.push_str(kind.item_close());
        }

        let label = match label {
            Some(label) => Some(self.capture_source(label, line)?),
            None => None,
        };
        match (kind, label) {
            (ListKind::Description, label) => {
                self.out.push_str(&format!(
                    "<dt>{}</dt>\n<dd>",
                    label.unwrap_or_default().trim()
                ));
            }
            (_, Some(label)) => {
                self.out.push_str(&format!(
                    "<li class=\"labeled\"><span class=\"item-label\">{}</span>",
                    label.trim()
                ));
            }
            (_, None) => self.out.push_str("<li>"),
        }

        if let Some(list) = self.lists.last_mut() {
            list.item_open = true;
        }
        Ok(())
    }

    fn footnote(&mut self, line: usize) -> Result<(), TexError> {
        self.begin_inline(line)?;
        let note = self.capture_arg("footnote", line)?;
        self.footnotes.push(note);
        let n = self.footnotes.len();
        self.out.push_str(&format!(
            "<sup class=\"footnote-mark\"><a href=\"#fn-{n}\" id=\"fnref-{n}\">{n}</a></sup>"
        ));
        Ok(())
    }

    fn begin_environment(&mut self, line: usize) -> Result<(), TexError> {
        let name = self.env_name("begin", line)?;

        match name {
            "document" => {
                if self.document_seen {
                    return Err(misplaced("\\begin{document} used twice", line));
                }
                self.in_preamble = false;
                self.document_seen = true;
                self.parse_until(Stop::Env { name, line })?;
                self.close_para();
                // Anything after \end{document} is not part of the output.
                self.lexer.finish();
            }
            "itemize" => self.list(name, ListKind::Itemize, line)?,
            "enumerate" => self.list(name, ListKind::Enumerate, line)?,
            "description" => self.list(name, ListKind::Description, line)?,
            "quote" | "quotation" => {
                let open = format!("<blockquote class=\"{}\">\n", name);
                self.block_env(name, &open, "</blockquote>\n", line)?
            }
            "abstract" => self.block_env(
                name,
                "<div class=\"abstract\">\n<p class=\"abstract-title\">Abstract</p>\n",
                "</div>\n",
                line,
            )?,
            "center" | "flushleft" | "flushright" => {
                let open = format!("<div class=\"{}\">\n", name);
                self.block_env(name, &open, "</div>\n", line)?
            }
            "verbatim" => self.verbatim(line)?,
            "equation" | "equation*" | "displaymath" | "align*" => {
                self.math_environment(name, line)?
            }
            _ => {
                return Err(TexError::UnknownEnvironment {
                    name: name.to_string(),
                    line,
                })
            }
        }
        Ok(())
    }

    fn block_env(
        &mut self,
        name: &'s str,
        open: &str,
        close: &str,
        line: usize,
    ) -> Result<(), TexError> {
        self.begin_block(&format!("\\begin{{{}}}", name), line)?;
        self.out.push_str(open);
        self.parse_until(Stop::Env { name, line })?;
        self.close_para();
        self.out.push_str(close);
        Ok(())
    }

    fn list(&mut self, name: &'s str, kind: ListKind, line: usize) -> Result<(), TexError> {
        self.begin_block(&format!("\\begin{{{}}}", name), line)?;
        self.out.push_str(kind.open_tag());
        self.lists.push(ListState {
            kind,
            item_open: false,
        });

        self.parse_until(Stop::Env { name, line })?;

        self.close_para();
        if let Some(list) = self.lists.pop() {
            if list.item_open {
                self.out.push_str(kind.item_close());
            }
        }
        self.out.push_str(kind.close_tag());
        Ok(())
    }

    fn verbatim(&mut self, line: usize) -> Result<(), TexError> {
        self.begin_block("\\begin{verbatim}", line)?;
        let raw = self
            .lexer
            .raw_until("\\end{verbatim}")
            .ok_or_else(|| TexError::Unterminated {
                what: "environment verbatim".to_string(),
                line,
            })?;
        let raw = raw
            .strip_prefix("\r\n")
            .or_else(|| raw.strip_prefix('\n'))
            .unwrap_or(raw);

        self.out.push_str(&format!(
            "<pre class=\"verbatim\">{}</pre>\n",
            escape_html(raw)
        ));
        Ok(())
    }

    fn math_environment(&mut self, name: &str, line: usize) -> Result<(), TexError> {
        self.begin_block(&format!("\\begin{{{}}}", name), line)?;
        let terminator = format!("\\end{{{}}}", name);
        let raw = self
            .lexer
            .raw_until(&terminator)
            .ok_or_else(|| TexError::Unterminated {
                what: format!("environment {}", name),
                line,
            })?;

        let (math, label) = take_label(raw);
        let math = if name == "align*" {
            format!("\\begin{{aligned}}{}\\end{{aligned}}", math)
        } else {
            math
        };
        let html = render_math(&math, true).map_err(|message| TexError::Math { message, line })?;

        if name == "equation" {
            self.equations += 1;
            let number = self.equations.to_string();
            let anchor = format!("eq-{}", number);
            self.out.push_str(&format!(
                "<div class=\"equation\" id=\"{anchor}\">{html}<span class=\"equation-number\">({number})</span></div>\n"
            ));
            let target = Target { number, anchor };
            if let Some(key) = label {
                self.labels.insert(key, target.clone());
            }
            self.current_target = Some(target);
        } else {
            self.out
                .push_str(&format!("<div class=\"equation\">{}</div>\n", html));
        }
        self.noindent_next = true;
        Ok(())
    }

    fn inline_math(&mut self, terminator: &str, line: usize) -> Result<(), TexError> {
        self.begin_inline(line)?;
        let source = self
            .lexer
            .raw_until(terminator)
            .ok_or_else(|| TexError::Unterminated {
                what: "inline math".to_string(),
                line,
            })?;
        let html = render_math(source, false).map_err(|message| TexError::Math { message, line })?;
        self.out.push_str(&html);
        Ok(())
    }

    fn display_math(&mut self, terminator: &str, line: usize) -> Result<(), TexError> {
        let source = self
            .lexer
            .raw_until(terminator)
            .ok_or_else(|| TexError::Unterminated {
                what: "display math".to_string(),
                line,
            })?;
        let html = render_math(source, true).map_err(|message| TexError::Math { message, line })?;

        if self.inline_depth > 0 {
            self.out.push_str(&html);
        } else {
            self.begin_block("display math", line)?;
            self.out
                .push_str(&format!("<div class=\"equation\">{}</div>\n", html));
            self.noindent_next = true;
        }
        Ok(())
    }
}

/// Text-mode ligatures and escaping for a run of ordinary characters.
fn typeset(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '-' => {
                if chars.next_if_eq(&'-').is_some() {
                    if chars.next_if_eq(&'-').is_some() {
                        out.push('—');
                    } else {
                        out.push('–');
                    }
                } else {
                    out.push('-');
                }
            }
            '`' => {
                if chars.next_if_eq(&'`').is_some() {
                    out.push('“');
                } else {
                    out.push('‘');
                }
            }
            '\'' => {
                if chars.next_if_eq(&'\'').is_some() {
                    out.push('”');
                } else {
                    out.push('’');
                }
            }
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }

    out
}

/// Text produced by argument-less symbol macros.
fn symbol_macro(name: &str) -> Option<&'static str> {
    let text = match name {
        "ldots" | "dots" | "textellipsis" => "…",
        "textbackslash" => "\\",
        "textasciitilde" => "~",
        "textasciicircum" => "^",
        "textbar" => "|",
        "textless" => "<",
        "textgreater" => ">",
        "textendash" => "–",
        "textemdash" => "—",
        "textquoteleft" => "‘",
        "textquoteright" => "’",
        "textquotedblleft" => "“",
        "textquotedblright" => "”",
        "textdegree" => "°",
        "S" => "§",
        "P" => "¶",
        "copyright" => "©",
        "textregistered" => "®",
        "texttrademark" => "™",
        "dag" => "†",
        "ddag" => "‡",
        "pounds" => "£",
        "euro" => "€",
        "quad" => "\u{2003}",
        "qquad" => "\u{2003}\u{2003}",
        "ss" => "ß",
        "ae" => "æ",
        "AE" => "Æ",
        "oe" => "œ",
        "OE" => "Œ",
        "aa" => "å",
        "AA" => "Å",
        "o" => "ø",
        "O" => "Ø",
        "l" => "ł",
        "L" => "Ł",
        "i" => "ı",
        "j" => "ȷ",
        "slash" => "/",
        _ => return None,
    };
    Some(text)
}

/// Remove a `\label{...}` from math source, returning its key.
fn take_label(math: &str) -> (String, Option<String>) {
    let Some(start) = math.find("\\label{") else {
        return (math.to_string(), None);
    };
    let key_start = start + "\\label{".len();
    let Some(key_len) = math[key_start..].find('}') else {
        return (math.to_string(), None);
    };

    let key = math[key_start..key_start + key_len].trim().to_string();
    let mut rest = String::with_capacity(math.len());
    rest.push_str(&math[..start]);
    rest.push_str(&math[key_start + key_len + 1..]);
    (rest, Some(key))
}

/// Drop the backslash from escaped URL characters such as `\#` and `\%`.
fn unescape_url(raw: &str) -> String {
    let mut url = String::with_capacity(raw.len());
    let mut chars = raw.trim().chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                url.push(escaped);
            }
        } else {
            url.push(c);
        }
    }
    url
}

/// Plain text of an HTML snippet.
fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", "\u{a0}")
}

/// Today's date (UTC) the way `\today` prints it.
fn today() -> String {
    Utc::now().format("%B %-d, %Y").to_string()
}
