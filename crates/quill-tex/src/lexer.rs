//! LaTeX tokenizer.
//!
//! Produces TeX-style tokens on demand. Arguments that must be taken
//! verbatim (URLs, environment names, math, `verbatim` bodies) are read
//! straight from the source through the `raw_*` methods instead.

/// A LaTeX token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Control word such as `\section`
    Command(&'a str),
    /// Control symbol such as `\%` or `\\`
    Symbol(char),
    /// `{`
    BeginGroup,
    /// `}`
    EndGroup,
    /// `$`
    MathShift,
    /// `$$`
    DisplayMathShift,
    /// `&`
    Alignment,
    /// `#`
    Parameter,
    /// `^`
    Superscript,
    /// `_`
    Subscript,
    /// `~`
    Tilde,
    /// Run of ordinary characters. `[`, `]` and `*` always come alone.
    Text(&'a str),
    /// Whitespace containing at most one newline
    Space,
    /// Whitespace containing a blank line
    ParBreak,
}

/// A token with its source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spanned<'a> {
    pub token: Token<'a>,
    /// Byte offset of the token start
    pub start: usize,
    /// 1-based line of the token start
    pub line: usize,
}

/// On-demand LaTeX tokenizer.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
}

fn is_special(c: char) -> bool {
    matches!(
        c,
        '\\' | '{' | '}' | '$' | '&' | '#' | '^' | '_' | '~' | '%' | '[' | ']' | '*'
    )
}

impl<'a> Lexer<'a> {
    /// Create a lexer positioned at the start of `source`.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
        }
    }

    /// Create a lexer whose line count starts at `line`.
    pub fn with_line(source: &'a str, line: usize) -> Self {
        Self {
            source,
            pos: 0,
            line,
        }
    }

    /// Current byte offset.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Current 1-based line.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Move back to a previously observed position.
    pub fn seek(&mut self, pos: usize, line: usize) {
        self.pos = pos;
        self.line = line;
    }

    /// Jump to the end of the input.
    pub fn finish(&mut self) {
        self.advance_to(self.source.len());
    }

    /// Consume `c` if it is the very next character.
    pub fn eat_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.advance_to(self.pos + c.len_utf8());
            true
        } else {
            false
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance_to(&mut self, pos: usize) {
        self.line += self.source[self.pos..pos].matches('\n').count();
        self.pos = pos;
    }

    /// Read the next token, skipping comments.
    pub fn next_token(&mut self) -> Option<Spanned<'a>> {
        loop {
            let c = self.peek_char()?;
            let start = self.pos;
            let line = self.line;

            let token = match c {
                '%' => {
                    self.skip_comment();
                    continue;
                }
                '\\' => self.control_sequence(),
                '{' => self.single(Token::BeginGroup),
                '}' => self.single(Token::EndGroup),
                '$' => {
                    if self.rest().starts_with("$$") {
                        self.pos += 2;
                        Token::DisplayMathShift
                    } else {
                        self.single(Token::MathShift)
                    }
                }
                '&' => self.single(Token::Alignment),
                '#' => self.single(Token::Parameter),
                '^' => self.single(Token::Superscript),
                '_' => self.single(Token::Subscript),
                '~' => self.single(Token::Tilde),
                '[' | ']' | '*' => {
                    self.pos += 1;
                    Token::Text(&self.source[start..self.pos])
                }
                c if c.is_whitespace() => self.whitespace(),
                _ => {
                    let len = self
                        .rest()
                        .find(|ch: char| is_special(ch) || ch.is_whitespace())
                        .unwrap_or(self.rest().len());
                    self.pos += len;
                    Token::Text(&self.source[start..self.pos])
                }
            };

            return Some(Spanned { token, start, line });
        }
    }

    fn single(&mut self, token: Token<'a>) -> Token<'a> {
        self.pos += 1;
        token
    }

    fn skip_comment(&mut self) {
        match self.rest().find('\n') {
            Some(newline) => {
                self.advance_to(self.pos + newline + 1);
                let indent = self
                    .rest()
                    .find(|c: char| c != ' ' && c != '\t')
                    .unwrap_or(self.rest().len());
                self.pos += indent;
            }
            None => self.pos = self.source.len(),
        }
    }

    fn control_sequence(&mut self) -> Token<'a> {
        let name_start = self.pos + 1;
        let after = &self.source[name_start..];

        let letters = after
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(after.len());

        if letters > 0 {
            self.pos = name_start + letters;
            self.skip_blanks();
            return Token::Command(&self.source[name_start..name_start + letters]);
        }

        match after.chars().next() {
            Some(symbol) => {
                self.advance_to(name_start + symbol.len_utf8());
                Token::Symbol(symbol)
            }
            None => {
                self.pos = self.source.len();
                Token::Text("\\")
            }
        }
    }

    fn whitespace(&mut self) -> Token<'a> {
        let len = self
            .rest()
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(self.rest().len());
        let newlines = self.rest()[..len].matches('\n').count();
        self.advance_to(self.pos + len);

        if newlines >= 2 {
            Token::ParBreak
        } else {
            Token::Space
        }
    }

    /// Skip spaces, tabs and a single line end, stopping before a blank line.
    pub fn skip_blanks(&mut self) {
        let spaces = self
            .rest()
            .find(|c: char| c != ' ' && c != '\t')
            .unwrap_or(self.rest().len());
        self.pos += spaces;

        if self.rest().starts_with('\n') || self.rest().starts_with("\r\n") {
            let newline = if self.rest().starts_with('\n') { 1 } else { 2 };
            let next_line = &self.rest()[newline..];
            let indent = next_line
                .find(|c: char| c != ' ' && c != '\t')
                .unwrap_or(next_line.len());
            let after_indent = &next_line[indent..];
            let blank = after_indent.starts_with('\n') || after_indent.starts_with('\r');
            if !blank {
                self.advance_to(self.pos + newline + indent);
            }
        }
    }

    /// Skip blanks and report the next character without consuming it.
    pub fn peek_after_blanks(&mut self) -> Option<char> {
        self.skip_blanks();
        self.peek_char()
    }

    /// Read a balanced `open`..`close` group verbatim and return its inner
    /// text. Returns `None` (without moving) if the group is not closed or
    /// does not start here.
    pub fn raw_balanced(&mut self, open: char, close: char) -> Option<&'a str> {
        if self.peek_char() != Some(open) {
            return None;
        }

        let inner_start = self.pos + open.len_utf8();
        let mut depth = 0usize;
        let mut chars = self.source[inner_start..].char_indices();

        while let Some((i, c)) = chars.next() {
            if c == '\\' {
                chars.next();
            } else if c == open {
                depth += 1;
            } else if c == close {
                if depth == 0 {
                    let inner_end = inner_start + i;
                    self.advance_to(inner_end + close.len_utf8());
                    return Some(&self.source[inner_start..inner_end]);
                }
                depth -= 1;
            }
        }

        None
    }

    /// Read an optional `[...]` argument after blanks, if present.
    pub fn raw_optional(&mut self) -> Option<&'a str> {
        if self.peek_after_blanks() == Some('[') {
            self.raw_balanced('[', ']')
        } else {
            None
        }
    }

    /// Read verbatim text up to `terminator`, consuming the terminator.
    /// Escaped characters are skipped while searching. Returns `None`
    /// (without moving) if the terminator never appears.
    pub fn raw_until(&mut self, terminator: &str) -> Option<&'a str> {
        let rest = self.rest();
        let mut chars = rest.char_indices();

        while let Some((i, c)) = chars.next() {
            if rest[i..].starts_with(terminator) {
                let start = self.pos;
                self.advance_to(start + i + terminator.len());
                return Some(&self.source[start..start + i]);
            }
            if c == '\\' {
                chars.next();
            }
        }

        None
    }

    /// Read the single-character argument of an accent command, either
    /// bare (`\'e`) or braced (`\'{e}`, `\'{\i}`).
    pub fn raw_char_arg(&mut self) -> Option<char> {
        if self.peek_char() == Some('{') {
            let inner = self.raw_balanced('{', '}')?.trim();
            return match inner {
                "\\i" => Some('ı'),
                "\\j" => Some('ȷ'),
                _ => {
                    let mut chars = inner.chars();
                    let c = chars.next()?;
                    chars.next().is_none().then_some(c)
                }
            };
        }

        let c = self.peek_char().filter(|c| c.is_alphabetic())?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(source);
        std::iter::from_fn(|| lexer.next_token().map(|s| s.token)).collect()
    }

    #[test]
    fn tokenizes_commands_and_groups() {
        assert_eq!(
            tokens(r"\textbf{bold} text"),
            vec![
                Token::Command("textbf"),
                Token::BeginGroup,
                Token::Text("bold"),
                Token::EndGroup,
                Token::Space,
                Token::Text("text"),
            ]
        );
    }

    #[test]
    fn skips_blanks_after_control_words() {
        assert_eq!(
            tokens("\\LaTeX   rocks"),
            vec![Token::Command("LaTeX"), Token::Text("rocks")]
        );
        assert_eq!(
            tokens("\\par\n\nnext"),
            vec![Token::Command("par"), Token::ParBreak, Token::Text("next")]
        );
    }

    #[test]
    fn distinguishes_spaces_and_paragraph_breaks() {
        assert_eq!(
            tokens("a\nb\n\n c"),
            vec![
                Token::Text("a"),
                Token::Space,
                Token::Text("b"),
                Token::ParBreak,
                Token::Text("c"),
            ]
        );
    }

    #[test]
    fn drops_comments_with_their_line_end() {
        assert_eq!(
            tokens("a% comment\n   b"),
            vec![Token::Text("a"), Token::Text("b")]
        );
    }

    #[test]
    fn recognizes_specials() {
        assert_eq!(
            tokens(r"$$~\%&#^_*[x]"),
            vec![
                Token::DisplayMathShift,
                Token::Tilde,
                Token::Symbol('%'),
                Token::Alignment,
                Token::Parameter,
                Token::Superscript,
                Token::Subscript,
                Token::Text("*"),
                Token::Text("["),
                Token::Text("x"),
                Token::Text("]"),
            ]
        );
    }

    #[test]
    fn tracks_lines() {
        let mut lexer = Lexer::new("a\nb\n\\c");
        let lines: Vec<usize> = std::iter::from_fn(|| lexer.next_token().map(|s| s.line)).collect();
        assert_eq!(lines, vec![1, 1, 2, 2, 3]);
    }

    #[test]
    fn reads_raw_arguments() {
        let mut lexer = Lexer::new("{a{b}c} [opt] rest$");
        assert_eq!(lexer.raw_balanced('{', '}'), Some("a{b}c"));
        assert_eq!(lexer.raw_optional(), Some("opt"));
        assert_eq!(lexer.raw_until("$"), Some(" rest"));
        assert_eq!(lexer.next_token(), None);
    }

    #[test]
    fn raw_until_skips_escapes() {
        let mut lexer = Lexer::new(r"a \$ b$ c");
        assert_eq!(lexer.raw_until("$"), Some(r"a \$ b"));
        assert_eq!(lexer.raw_until("\\end{x}"), None);
        assert_eq!(lexer.offset(), 7);
    }

    #[test]
    fn reads_accent_arguments() {
        assert_eq!(Lexer::new("e").raw_char_arg(), Some('e'));
        assert_eq!(Lexer::new("{o}").raw_char_arg(), Some('o'));
        assert_eq!(Lexer::new(r"{\i}").raw_char_arg(), Some('ı'));
        assert_eq!(Lexer::new("{ab}").raw_char_arg(), None);
    }
}
