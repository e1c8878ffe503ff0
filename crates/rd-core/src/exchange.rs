//! Transport-neutral request and response types.
//!
//! The router only ever sees [`IncomingRequest`] and produces
//! [`OutgoingResponse`]. Conversion to and from CoAP messages lives here so
//! the UDP listener, the discovery probe and the tests share one mapping.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::coap::{option, Code, Message, MessageType};
use crate::link_format::{self, FormatError, ResourceLink};
use crate::link_json::{self, LinkJsonError};

// ── Method ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Fetch,
    Patch,
    IPatch,
}

impl Method {
    pub fn from_code(code: Code) -> Option<Self> {
        match code {
            Code::GET => Some(Method::Get),
            Code::POST => Some(Method::Post),
            Code::PUT => Some(Method::Put),
            Code::DELETE => Some(Method::Delete),
            Code::FETCH => Some(Method::Fetch),
            Code::PATCH => Some(Method::Patch),
            Code::IPATCH => Some(Method::IPatch),
            _ => None,
        }
    }

    pub fn code(self) -> Code {
        match self {
            Method::Get => Code::GET,
            Method::Post => Code::POST,
            Method::Put => Code::PUT,
            Method::Delete => Code::DELETE,
            Method::Fetch => Code::FETCH,
            Method::Patch => Code::PATCH,
            Method::IPatch => Code::IPATCH,
        }
    }
}

// ── Content formats ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    /// `application/link-format`
    LinkFormat,
    /// `application/link-format+json`
    LinkFormatJson,
    /// `application/link-format+cbor`
    LinkFormatCbor,
    Other(u16),
}

impl ContentFormat {
    pub fn from_number(number: u16) -> Self {
        match number {
            40 => ContentFormat::LinkFormat,
            504 => ContentFormat::LinkFormatJson,
            505 => ContentFormat::LinkFormatCbor,
            n => ContentFormat::Other(n),
        }
    }

    pub fn number(self) -> u16 {
        match self {
            ContentFormat::LinkFormat => 40,
            ContentFormat::LinkFormatJson => 504,
            ContentFormat::LinkFormatCbor => 505,
            ContentFormat::Other(n) => n,
        }
    }
}

/// Decode a links payload. A missing content format is read as link-format.
pub fn decode_links(
    format: Option<ContentFormat>,
    payload: &[u8],
) -> Result<Vec<ResourceLink>, PayloadError> {
    match format.unwrap_or(ContentFormat::LinkFormat) {
        ContentFormat::LinkFormat => {
            let text = std::str::from_utf8(payload).map_err(|_| FormatError::NotUtf8)?;
            Ok(link_format::decode(text)?)
        }
        ContentFormat::LinkFormatJson => Ok(link_json::decode(payload)?),
        other => Err(PayloadError::Unsupported(other)),
    }
}

/// Encode links in the requested format (link-format when unspecified).
pub fn encode_links(
    format: Option<ContentFormat>,
    links: &[ResourceLink],
) -> Result<(ContentFormat, Bytes), PayloadError> {
    match format.unwrap_or(ContentFormat::LinkFormat) {
        ContentFormat::LinkFormat => Ok((
            ContentFormat::LinkFormat,
            Bytes::from(link_format::encode(links)),
        )),
        ContentFormat::LinkFormatJson => Ok((
            ContentFormat::LinkFormatJson,
            Bytes::from(link_json::encode(links)),
        )),
        other => Err(PayloadError::Unsupported(other)),
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Created,
    Deleted,
    Changed,
    Content,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    UnsupportedFormat,
    InternalError,
}

impl Status {
    pub fn code(self) -> Code {
        match self {
            Status::Created => Code::CREATED,
            Status::Deleted => Code::DELETED,
            Status::Changed => Code::CHANGED,
            Status::Content => Code::CONTENT,
            Status::BadRequest => Code::BAD_REQUEST,
            Status::NotFound => Code::NOT_FOUND,
            Status::MethodNotAllowed => Code::METHOD_NOT_ALLOWED,
            Status::UnsupportedFormat => Code::UNSUPPORTED_CONTENT_FORMAT,
            Status::InternalError => Code::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn from_code(code: Code) -> Option<Self> {
        [
            Status::Created,
            Status::Deleted,
            Status::Changed,
            Status::Content,
            Status::BadRequest,
            Status::NotFound,
            Status::MethodNotAllowed,
            Status::UnsupportedFormat,
            Status::InternalError,
        ]
        .into_iter()
        .find(|s| s.code() == code)
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub method: Method,
    /// Uri-Path segments joined with `/`, without a leading slash.
    pub path: String,
    /// Uri-Query options split at the first `=`. A bare name has an empty value.
    pub query: Vec<(String, String)>,
    pub content_format: Option<ContentFormat>,
    pub accept: Option<ContentFormat>,
    pub sender: SocketAddr,
    pub payload: Bytes,
}

impl IncomingRequest {
    pub fn new(method: Method, path: impl Into<String>, sender: SocketAddr) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            content_format: None,
            accept: None,
            sender,
            payload: Bytes::new(),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_payload(mut self, format: ContentFormat, payload: impl Into<Bytes>) -> Self {
        self.content_format = Some(format);
        self.payload = payload.into();
        self
    }

    pub fn from_message(msg: &Message, sender: SocketAddr) -> Result<Self, RequestError> {
        let method = Method::from_code(msg.code).ok_or(RequestError::NotARequest(msg.code))?;

        let segments = msg
            .option_values(option::URI_PATH)
            .map(|v| utf8_option("Uri-Path", v))
            .collect::<Result<Vec<_>, _>>()?;

        let mut query = Vec::new();
        for value in msg.option_values(option::URI_QUERY) {
            let text = utf8_option("Uri-Query", value)?;
            match text.split_once('=') {
                Some((name, value)) => query.push((name.to_string(), value.to_string())),
                None => query.push((text, String::new())),
            }
        }

        Ok(Self {
            method,
            path: segments.join("/"),
            query,
            content_format: content_format_option(msg, option::CONTENT_FORMAT)?,
            accept: content_format_option(msg, option::ACCEPT)?,
            sender,
            payload: Bytes::copy_from_slice(&msg.payload),
        })
    }

    /// Build the CoAP message a client would send for this request.
    pub fn to_message(&self, mtype: MessageType, message_id: u16, token: &[u8]) -> Message {
        let mut msg = Message::new(mtype, self.method.code(), message_id);
        msg.token = token.to_vec();
        msg.add_uri_path(&self.path);
        for (name, value) in &self.query {
            let text = if value.is_empty() {
                name.clone()
            } else {
                format!("{}={}", name, value)
            };
            msg.add_option(option::URI_QUERY, text.into_bytes());
        }
        if let Some(cf) = self.content_format {
            msg.add_uint_option(option::CONTENT_FORMAT, u32::from(cf.number()));
        }
        if let Some(cf) = self.accept {
            msg.add_uint_option(option::ACCEPT, u32::from(cf.number()));
        }
        msg.payload = self.payload.to_vec();
        msg
    }

    /// Path segments, ignoring empty ones.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }
}

fn utf8_option(name: &'static str, value: &[u8]) -> Result<String, RequestError> {
    String::from_utf8(value.to_vec()).map_err(|_| RequestError::InvalidOption(name))
}

fn content_format_option(msg: &Message, number: u16) -> Result<Option<ContentFormat>, RequestError> {
    match msg.option(number) {
        None => Ok(None),
        Some(_) => {
            let n = msg
                .uint_option(number)
                .and_then(|n| u16::try_from(n).ok())
                .ok_or(RequestError::InvalidOption("Content-Format"))?;
            Ok(Some(ContentFormat::from_number(n)))
        }
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOption {
    /// One Location-Path segment.
    LocationPath(String),
    ContentFormat(ContentFormat),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub status: Status,
    pub options: Vec<ResponseOption>,
    pub body: Bytes,
}

impl OutgoingResponse {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            options: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Location-Path options for `path` (`rd/4521` → `rd`, `4521`).
    pub fn with_location(mut self, path: &str) -> Self {
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            self.options
                .push(ResponseOption::LocationPath(segment.to_string()));
        }
        self
    }

    pub fn with_body(mut self, format: ContentFormat, body: impl Into<Bytes>) -> Self {
        self.options.push(ResponseOption::ContentFormat(format));
        self.body = body.into();
        self
    }

    /// Diagnostic text for an error response.
    pub fn with_diagnostic(mut self, text: impl Into<String>) -> Self {
        self.body = Bytes::from(text.into());
        self
    }

    pub fn location_path(&self) -> String {
        self.options
            .iter()
            .filter_map(|o| match o {
                ResponseOption::LocationPath(s) => Some(s.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn content_format(&self) -> Option<ContentFormat> {
        self.options.iter().find_map(|o| match o {
            ResponseOption::ContentFormat(cf) => Some(*cf),
            _ => None,
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Encode as a response to a request with `token`.
    pub fn to_message(&self, mtype: MessageType, message_id: u16, token: &[u8]) -> Message {
        let mut msg = Message::new(mtype, self.status.code(), message_id);
        msg.token = token.to_vec();
        for opt in &self.options {
            match opt {
                ResponseOption::LocationPath(segment) => {
                    msg.add_option(option::LOCATION_PATH, segment.as_bytes().to_vec())
                }
                ResponseOption::ContentFormat(cf) => {
                    msg.add_uint_option(option::CONTENT_FORMAT, u32::from(cf.number()))
                }
            }
        }
        msg.payload = self.body.to_vec();
        msg
    }

    pub fn from_message(msg: &Message) -> Result<Self, RequestError> {
        let status = Status::from_code(msg.code).ok_or(RequestError::UnknownStatus(msg.code))?;
        let mut response = Self::new(status);
        for segment in msg.option_values(option::LOCATION_PATH) {
            response.options.push(ResponseOption::LocationPath(utf8_option(
                "Location-Path",
                segment,
            )?));
        }
        if let Some(cf) = content_format_option(msg, option::CONTENT_FORMAT)? {
            response.options.push(ResponseOption::ContentFormat(cf));
        }
        response.body = Bytes::copy_from_slice(&msg.payload);
        Ok(response)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("code {0} is not a request method")]
    NotARequest(Code),

    #[error("code {0} is not a known response status")]
    UnknownStatus(Code),

    #[error("malformed {0} option")]
    InvalidOption(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Json(#[from] LinkJsonError),

    #[error("unsupported content format {}", .0.number())]
    Unsupported(ContentFormat),
}
