//! Tokenizer for the `#TAG:param:param;` layout shared by StepMania files.

use crate::parse::{Location, ParseError};

/// A tag with its raw parameters. Parameters still contain comments and escapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    /// The tag name as written, without the leading `#`.
    pub name: &'a str,
    /// Raw parameters, subslices of the source.
    pub params: Vec<&'a str>,
    /// Byte offset of the leading `#`.
    pub start: usize,
    /// Byte offset after the terminating `;`, or of the next tag when it was missing.
    pub end: usize,
}

impl<'a> Tag<'a> {
    /// Location of the whole tag.
    pub fn location(&self, source: &str) -> Location {
        Location::span(source, self.start, self.end)
    }

    /// The unescaped value with all parameters joined back by `:`, since header values may
    /// contain colons.
    pub fn joined_value(&self) -> String {
        unescape(&self.params.join(":"))
    }
}

/// Returns whether the `#` at `index` is the first thing on its line, and not on the first line.
fn starts_line(source: &str, index: usize) -> bool {
    let before = source.get(..index).unwrap_or_default();
    before
        .rfind('\n')
        .and_then(|newline| before.get(newline + 1..))
        .is_some_and(|indent| indent.trim().is_empty())
}

/// Byte index of the next line feed at or after `index`, or the end of the source.
fn line_end(source: &str, index: usize) -> usize {
    source
        .get(index..)
        .and_then(|rest| rest.find('\n'))
        .map_or(source.len(), |i| index + i)
}

/// Splits the source into tags.
///
/// # Errors
///
/// - [`ParseError::MalformedHeader`] for a tag without a name or without `:`.
/// - [`ParseError::Truncated`] when the input ends inside a tag.
pub fn tokenize(source: &str) -> Result<Vec<Tag<'_>>, ParseError> {
    let mut tags = vec![];
    let bytes = source.as_bytes();
    let mut index = 0;
    while let Some(&byte) = bytes.get(index) {
        if byte == b'#' {
            let tag = tokenize_tag(source, index)?;
            index = tag.end;
            tags.push(tag);
        } else if bytes.get(index..index + 2) == Some(b"//".as_slice()) {
            index = line_end(source, index);
        } else {
            index += 1;
        }
    }
    Ok(tags)
}

/// Reads one tag starting at the `#` at `start`.
fn tokenize_tag(source: &str, start: usize) -> Result<Tag<'_>, ParseError> {
    let bytes = source.as_bytes();
    let malformed = |end: usize| ParseError::MalformedHeader {
        at: Location::span(source, start, end),
        expected: "`#NAME:value;`".to_owned(),
        found: source.get(start..end).unwrap_or_default().trim().to_owned(),
    };
    let mut params = vec![];
    let mut name = None;
    let mut segment_start = start + 1;
    let mut index = start + 1;
    loop {
        let Some(&byte) = bytes.get(index) else {
            return Err(ParseError::Truncated {
                at: Location::span(source, start, bytes.len()),
                expected: "`;` to close the tag".to_owned(),
            });
        };
        let end = match byte {
            b'\\' => {
                index += 2;
                continue;
            }
            b'/' if bytes.get(index + 1) == Some(&b'/') => {
                index = line_end(source, index);
                continue;
            }
            b':' => {
                let segment = source.get(segment_start..index).unwrap_or_default();
                if name.is_some() {
                    params.push(segment);
                } else if segment.trim().is_empty() {
                    return Err(malformed(index + 1));
                } else {
                    name = Some(segment.trim());
                }
                index += 1;
                segment_start = index;
                continue;
            }
            b';' => index + 1,
            b'#' if starts_line(source, index) => index,
            _ => {
                index += 1;
                continue;
            }
        };
        let Some(name) = name else {
            return Err(malformed(end));
        };
        params.push(source.get(segment_start..index).unwrap_or_default());
        return Ok(Tag {
            name,
            params,
            start,
            end,
        });
    }
}

/// Resolves escapes and removes comments from a raw parameter, trimming the result.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out.trim().to_owned()
}

/// Escapes a value so [`unescape`] gives it back.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev = None;
    for c in value.chars() {
        match c {
            '\\' | ':' | ';' | '#' => {
                out.push('\\');
                out.push(c);
            }
            '/' if prev == Some('/') => out.push_str("\\/"),
            _ => out.push(c),
        }
        prev = Some(c);
    }
    out
}
