//! Decoding of element content read straight from HTML source.
//!
//! Authors escape markup inside marked elements so the browser leaves it
//! alone. Before rendering, content goes through percent-unescaping (the
//! `%XX` / `%uXXXX` forms) and then HTML character reference decoding.

use std::borrow::Cow;

/// Named character references understood by [`decode_entities`].
const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("copy", '©'),
    ("reg", '®'),
    ("trade", '™'),
    ("hellip", '…'),
    ("ndash", '–'),
    ("mdash", '—'),
    ("lsquo", '‘'),
    ("rsquo", '’'),
    ("ldquo", '“'),
    ("rdquo", '”'),
    ("laquo", '«'),
    ("raquo", '»'),
    ("times", '×'),
    ("divide", '÷'),
    ("deg", '°'),
    ("middot", '·'),
    ("bull", '•'),
    ("plusmn", '±'),
];

/// Longest entity body we bother scanning for a terminating `;`.
const MAX_ENTITY_LEN: usize = 10;

/// Decode content of a marked element into the markup source it carries.
pub fn unescape_markup(raw: &str) -> String {
    let percent = percent_unescape(raw);
    decode_entities(&percent).into_owned()
}

/// Decode `%XX` and `%uXXXX` escapes.
///
/// `%XX` maps to the code point `U+00XX`. `%uXXXX` maps to a UTF-16 code
/// unit; surrogate pairs written as two consecutive escapes are combined.
/// Malformed sequences and lone surrogates are kept verbatim.
pub fn percent_unescape(input: &str) -> Cow<'_, str> {
    if !input.contains('%') {
        return Cow::Borrowed(input);
    }

    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            let ch = input[i..].chars().next().unwrap_or_default();
            out.push(ch);
            i += ch.len_utf8();
            continue;
        }

        if let Some(unit) = parse_unicode_escape(bytes, i) {
            if (0xD800..0xDC00).contains(&unit) {
                if let Some(low) = parse_unicode_escape(bytes, i + 6) {
                    if (0xDC00..0xE000).contains(&low) {
                        let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                        if let Some(ch) = char::from_u32(code) {
                            out.push(ch);
                            i += 12;
                            continue;
                        }
                    }
                }
            } else if let Some(ch) = char::from_u32(unit) {
                out.push(ch);
                i += 6;
                continue;
            }
        } else if let Some(byte) = parse_hex(bytes, i + 1, 2) {
            out.push(char::from(byte as u8));
            i += 3;
            continue;
        }

        out.push('%');
        i += 1;
    }

    Cow::Owned(out)
}

fn parse_unicode_escape(bytes: &[u8], at: usize) -> Option<u32> {
    if bytes.get(at) != Some(&b'%') || bytes.get(at + 1) != Some(&b'u') {
        return None;
    }
    parse_hex(bytes, at + 2, 4)
}

fn parse_hex(bytes: &[u8], start: usize, len: usize) -> Option<u32> {
    let digits = bytes.get(start..start + len)?;
    digits.iter().try_fold(0u32, |acc, b| {
        let digit = (*b as char).to_digit(16)?;
        Some(acc * 16 + digit)
    })
}

/// Decode HTML character references.
///
/// Handles the common named references plus decimal and hexadecimal numeric
/// references. References must be terminated by `;`; anything unrecognised
/// is kept as written.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];

        match decode_reference(tail) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Decode one reference body following `&`. Returns the character and the
/// number of bytes consumed including the trailing `;`.
fn decode_reference(tail: &str) -> Option<(char, usize)> {
    let end = tail
        .char_indices()
        .take(MAX_ENTITY_LEN + 1)
        .find(|(_, c)| *c == ';')
        .map(|(i, _)| i)?;
    let body = &tail[..end];

    let ch = if let Some(numeric) = body.strip_prefix('#') {
        let code = match numeric.strip_prefix(|c| c == 'x' || c == 'X') {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        if code == 0 {
            return None;
        }
        char::from_u32(code)?
    } else {
        NAMED_ENTITIES
            .iter()
            .find(|(name, _)| *name == body)
            .map(|(_, ch)| *ch)?
    };

    Some((ch, end + 1))
}

/// Escape text for inclusion in HTML content or a double-quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
