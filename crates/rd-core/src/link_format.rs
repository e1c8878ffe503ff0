//! CoRE Link Format (RFC 6690) codec.
//!
//! ```text
//! Link       = link-value-list
//! link-value = "<" URI-Reference ">" *( ";" link-param )
//! link-param = parmname [ "=" ( ptoken / quoted-string ) ]
//! ```
//!
//! Decoding is lenient about what follows the last complete link: once the
//! remaining input no longer starts with `<` the decoder stops and returns
//! what it has. Anything malformed *inside* a link that has already started
//! is a [`FormatError`].

use std::fmt;

use crate::uri::{UriError, UriRef};

/// One advertised resource: a target URI and its ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceLink {
    pub href: String,
    /// Each name appears at most once. A flag parameter (`;obs`) has an
    /// empty value.
    pub params: Vec<(String, String)>,
}

impl ResourceLink {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            params: Vec::new(),
        }
    }

    /// Builder form of [`set_param`](Self::set_param).
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_param(name, value);
        self
    }

    /// Set a parameter. An existing parameter keeps its position and takes
    /// the new value.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decode link-format text into resource links.
pub fn decode(text: &str) -> Result<Vec<ResourceLink>, FormatError> {
    let mut parser = Parser { input: text, pos: 0 };
    let mut links = Vec::new();

    loop {
        parser.skip_whitespace();
        if parser.peek() != Some('<') {
            // End of input, or trailing bytes that do not start a link.
            break;
        }
        links.push(parser.link()?);

        parser.skip_whitespace();
        match parser.peek() {
            None => break,
            Some(',') => parser.bump(),
            Some(ch) => {
                return Err(FormatError::UnexpectedChar {
                    ch,
                    offset: parser.pos,
                })
            }
        }
    }

    Ok(links)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.bump();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let input = self.input;
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &input[start..self.pos]
    }

    fn link(&mut self) -> Result<ResourceLink, FormatError> {
        let open = self.pos;
        self.bump(); // '<'

        let target = self.take_while(|c| c != '>' && c != '<');
        if self.peek() != Some('>') {
            return Err(FormatError::UnterminatedTarget { offset: open });
        }
        self.bump();

        let uri = UriRef::parse(target).map_err(|source| FormatError::InvalidTarget {
            offset: open + 1,
            source,
        })?;
        let mut link = ResourceLink::new(uri.to_string());

        while self.peek() == Some(';') {
            self.bump();
            let (name, value) = self.param()?;
            link.set_param(name, value);
        }

        Ok(link)
    }

    fn param(&mut self) -> Result<(String, String), FormatError> {
        let offset = self.pos;
        let name = self.take_while(is_attr_char);
        if name.is_empty() {
            return Err(FormatError::MissingParamName { offset });
        }

        if self.peek() != Some('=') {
            return Ok((name.to_string(), String::new()));
        }
        self.bump();

        let value = if self.peek() == Some('"') {
            self.quoted_string()?
        } else {
            let token = self.take_while(is_ptoken_char);
            if token.is_empty() {
                return Err(FormatError::MissingParamValue {
                    name: name.to_string(),
                    offset: self.pos,
                });
            }
            token.to_string()
        };

        Ok((name.to_string(), value))
    }

    /// RFC 2616 quoted-string. A backslash makes the next character literal.
    fn quoted_string(&mut self) -> Result<String, FormatError> {
        let open = self.pos;
        self.bump(); // '"'

        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(FormatError::UnterminatedQuote { offset: open }),
                Some('"') => {
                    self.bump();
                    return Ok(value);
                }
                Some('\\') => {
                    self.bump();
                    match self.peek() {
                        Some(c) => {
                            value.push(c);
                            self.bump();
                        }
                        None => return Err(FormatError::UnterminatedQuote { offset: open }),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
    }
}

/// RFC 5987 attr-char.
fn is_attr_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '&' | '+' | '-' | '.' | '^' | '_' | '`' | '|' | '~'
        )
}

/// RFC 6690 ptokenchar.
fn is_ptoken_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '('
                | ')'
                | '*'
                | '+'
                | '-'
                | '.'
                | '/'
                | ':'
                | '<'
                | '='
                | '>'
                | '?'
                | '@'
                | '['
                | ']'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encode resource links as link-format text.
pub fn encode(links: &[ResourceLink]) -> String {
    links
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for ResourceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.href)?;
        for (name, value) in &self.params {
            if value.is_empty() {
                write!(f, ";{}", name)?;
            } else if value.chars().all(is_ptoken_char) {
                write!(f, ";{}={}", name, value)?;
            } else {
                write!(f, ";{}=\"", name)?;
                for c in value.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                f.write_str("\"")?;
            }
        }
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("link target starting at offset {offset} is not terminated by '>'")]
    UnterminatedTarget { offset: usize },

    #[error("invalid link target at offset {offset}: {source}")]
    InvalidTarget { offset: usize, source: UriError },

    #[error("missing parameter name at offset {offset}")]
    MissingParamName { offset: usize },

    #[error("parameter {name:?} has '=' but no value (offset {offset})")]
    MissingParamValue { name: String, offset: usize },

    #[error("quoted string starting at offset {offset} is not terminated")]
    UnterminatedQuote { offset: usize },

    #[error("unexpected {ch:?} at offset {offset}, expected ',' or end of input")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("payload is not valid UTF-8")]
    NotUtf8,
}
