//! Detection of URL-like text for automatic linking.

use std::ops::Range;

use linkify::{LinkFinder, LinkKind};

/// A link candidate found in plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMatch {
    /// Byte range of the matched text
    pub range: Range<usize>,
    /// Link target with a scheme added where the text had none
    pub href: String,
}

/// Find URL-like substrings in `text`.
///
/// Recognises URLs with a scheme, scheme-less domains such as `www.` hosts
/// and bare e-mail addresses. Trailing sentence punctuation and unbalanced
/// closing parentheses are not part of the link.
pub fn find_links(text: &str) -> Vec<LinkMatch> {
    let mut finder = LinkFinder::new();
    finder.url_must_have_scheme(false);

    finder
        .links(text)
        .map(|link| {
            let matched = link.as_str();
            let href = match link.kind() {
                LinkKind::Email => format!("mailto:{}", matched),
                _ if matched.contains("://") => matched.to_string(),
                _ => format!("http://{}", matched),
            };

            LinkMatch {
                range: link.start()..link.end(),
                href,
            }
        })
        .collect()
}
