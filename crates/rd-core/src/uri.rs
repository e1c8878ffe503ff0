//! URI references (RFC 3986).
//!
//! Used for the `<...>` targets of link-format links and for the `con`
//! registration parameter. Parsing splits a reference into its components
//! and recomposition (§5.3) puts them back together, lower-casing scheme and
//! host on the way so the textual form is stable.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// A parsed URI reference. Either absolute (has a scheme) or relative.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UriRef {
    pub scheme: Option<String>,
    pub authority: Option<Authority>,
    /// Possibly empty. Starts with `/` whenever an authority is present.
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

/// `[ userinfo "@" ] host [ ":" port ]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    pub userinfo: Option<String>,
    /// Registered name, IPv4 address, or bracketed IP literal (`[::1]`).
    pub host: String,
    pub port: Option<u16>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

impl UriRef {
    /// Parse a URI reference.
    pub fn parse(input: &str) -> Result<Self, UriError> {
        if input.is_empty() {
            return Err(UriError::Empty);
        }
        check_chars(input)?;

        let (scheme, rest) = split_scheme(input)?;

        let (authority, rest) = match rest.strip_prefix("//") {
            Some(after) => {
                let end = after.find(['/', '?', '#']).unwrap_or(after.len());
                (Some(parse_authority(&after[..end])?), &after[end..])
            }
            None => (None, rest),
        };

        let (rest, fragment) = match rest.split_once('#') {
            Some((r, f)) => (r, Some(f.to_string())),
            None => (rest, None),
        };
        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (rest, None),
        };

        Ok(Self {
            scheme,
            authority,
            path: path.to_string(),
            query,
            fragment,
        })
    }

    /// `coap://<ip>:<port>` for a transport sender address.
    pub fn from_socket_addr(scheme: &str, addr: SocketAddr) -> Self {
        let host = match addr.ip() {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        };
        Self {
            scheme: Some(scheme.to_ascii_lowercase()),
            authority: Some(Authority {
                userinfo: None,
                host,
                port: Some(addr.port()),
            }),
            path: String::new(),
            query: None,
            fragment: None,
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.scheme.is_some()
    }

    /// Host with IP-literal brackets removed, if there is an authority.
    pub fn host(&self) -> Option<&str> {
        self.authority.as_ref().map(|a| {
            a.host
                .strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .unwrap_or(&a.host)
        })
    }

    pub fn port(&self) -> Option<u16> {
        self.authority.as_ref().and_then(|a| a.port)
    }
}

impl std::str::FromStr for UriRef {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn check_chars(input: &str) -> Result<(), UriError> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'%' => {
                let valid = bytes.len() > i + 2
                    && bytes[i + 1].is_ascii_hexdigit()
                    && bytes[i + 2].is_ascii_hexdigit();
                if !valid {
                    return Err(UriError::BadPercentEncoding(i));
                }
                i += 3;
                continue;
            }
            0x00..=0x20 | 0x7f | b'"' | b'<' | b'>' | b'\\' | b'^' | b'`' | b'{' | b'|'
            | b'}' => {
                return Err(UriError::InvalidChar(b as char, i));
            }
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

fn split_scheme(input: &str) -> Result<(Option<String>, &str), UriError> {
    let Some(colon) = input.find(':') else {
        return Ok((None, input));
    };
    let candidate = &input[..colon];
    // A colon after the first '/', '?' or '#' belongs to the path, query or
    // fragment, not to a scheme.
    if candidate.contains(['/', '?', '#']) {
        return Ok((None, input));
    }
    let mut chars = candidate.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return Err(UriError::InvalidScheme(candidate.to_string()));
    }
    Ok((Some(candidate.to_ascii_lowercase()), &input[colon + 1..]))
}

fn parse_authority(raw: &str) -> Result<Authority, UriError> {
    let (userinfo, hostport) = match raw.rfind('@') {
        Some(at) => (Some(raw[..at].to_string()), &raw[at + 1..]),
        None => (None, raw),
    };

    let (host, port) = if hostport.starts_with('[') {
        let close = hostport
            .find(']')
            .ok_or_else(|| UriError::InvalidHost(hostport.to_string()))?;
        let literal = &hostport[1..close];
        if literal.is_empty()
            || !literal
                .chars()
                .all(|c| c.is_ascii_hexdigit() || matches!(c, ':' | '.'))
        {
            return Err(UriError::InvalidHost(hostport.to_string()));
        }
        let rest = &hostport[close + 1..];
        let port = match rest {
            "" => None,
            _ => Some(
                rest.strip_prefix(':')
                    .ok_or_else(|| UriError::InvalidHost(hostport.to_string()))?,
            ),
        };
        (hostport[..=close].to_ascii_lowercase(), port)
    } else {
        match hostport.split_once(':') {
            Some((h, p)) => (h.to_ascii_lowercase(), Some(p)),
            None => (hostport.to_ascii_lowercase(), None),
        }
    };

    let port = match port {
        None | Some("") => None,
        Some(p) => Some(
            p.parse::<u16>()
                .map_err(|_| UriError::InvalidPort(p.to_string()))?,
        ),
    };

    Ok(Authority {
        userinfo,
        host,
        port,
    })
}

// ── Recomposition ─────────────────────────────────────────────────────────────

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(userinfo) = &self.userinfo {
            write!(f, "{}@", userinfo)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

impl fmt::Display for UriRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}:", scheme)?;
        }
        if let Some(authority) = &self.authority {
            write!(f, "//{}", authority)?;
        }
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UriError {
    #[error("empty URI reference")]
    Empty,

    #[error("character {0:?} at offset {1} is not allowed in a URI")]
    InvalidChar(char, usize),

    #[error("malformed percent-encoding at offset {0}")]
    BadPercentEncoding(usize),

    #[error("invalid scheme {0:?}")]
    InvalidScheme(String),

    #[error("invalid host {0:?}")]
    InvalidHost(String),

    #[error("invalid port {0:?}")]
    InvalidPort(String),
}
