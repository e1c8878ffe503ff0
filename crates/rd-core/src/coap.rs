//! CoAP message framing (RFC 7252 §3).
//!
//! ```text
//!  0                   1                   2                   3
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```
//!
//! Only the datagram encoding is covered. Retransmission state lives with
//! the caller; blockwise transfer and observe are not interpreted.

use std::fmt;

// ── Message type ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Confirmable = 0,
    NonConfirmable = 1,
    Acknowledgement = 2,
    Reset = 3,
}

impl From<u8> for MessageType {
    /// Only the low two bits are significant.
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }
}

// ── Code ──────────────────────────────────────────────────────────────────────

/// Request method or response code, `class.detail` packed as `ccc ddddd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Code = Code::new(0, 0);

    pub const GET: Code = Code::new(0, 1);
    pub const POST: Code = Code::new(0, 2);
    pub const PUT: Code = Code::new(0, 3);
    pub const DELETE: Code = Code::new(0, 4);
    pub const FETCH: Code = Code::new(0, 5);
    pub const PATCH: Code = Code::new(0, 6);
    pub const IPATCH: Code = Code::new(0, 7);

    pub const CREATED: Code = Code::new(2, 1);
    pub const DELETED: Code = Code::new(2, 2);
    pub const VALID: Code = Code::new(2, 3);
    pub const CHANGED: Code = Code::new(2, 4);
    pub const CONTENT: Code = Code::new(2, 5);

    pub const BAD_REQUEST: Code = Code::new(4, 0);
    pub const NOT_FOUND: Code = Code::new(4, 4);
    pub const METHOD_NOT_ALLOWED: Code = Code::new(4, 5);
    pub const UNSUPPORTED_CONTENT_FORMAT: Code = Code::new(4, 15);

    pub const INTERNAL_SERVER_ERROR: Code = Code::new(5, 0);

    pub const fn new(class: u8, detail: u8) -> Self {
        Code((class << 5) | (detail & 0x1f))
    }

    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    pub const fn detail(self) -> u8 {
        self.0 & 0x1f
    }

    pub const fn is_request(self) -> bool {
        self.class() == 0 && self.detail() != 0
    }

    pub const fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Option numbers used by the directory.
pub mod option {
    pub const URI_HOST: u16 = 3;
    pub const OBSERVE: u16 = 6;
    pub const URI_PORT: u16 = 7;
    pub const LOCATION_PATH: u16 = 8;
    pub const URI_PATH: u16 = 11;
    pub const CONTENT_FORMAT: u16 = 12;
    pub const MAX_AGE: u16 = 14;
    pub const URI_QUERY: u16 = 15;
    pub const ACCEPT: u16 = 17;
    pub const LOCATION_QUERY: u16 = 20;
    pub const BLOCK2: u16 = 23;
    pub const BLOCK1: u16 = 27;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

// ── Constants ─────────────────────────────────────────────────────────────────

pub const VERSION: u8 = 1;

pub const PAYLOAD_MARKER: u8 = 0xff;

pub const DEFAULT_PORT: u16 = 5683;

pub const MAX_TOKEN_LEN: usize = 8;

/// Transmission parameters (RFC 7252 §4.8).
pub const ACK_TIMEOUT_MS: u64 = 2000;
pub const ACK_RANDOM_FACTOR: f64 = 1.5;
pub const MAX_RETRANSMIT: u32 = 4;
pub const EXCHANGE_LIFETIME_SECS: u64 = 247;

/// Largest datagram the directory reads or writes.
pub const MAX_DATAGRAM: usize = 1152;

// ── Message ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub mtype: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Vec<u8>,
    /// Kept in insertion order; sorted by number on encode.
    pub options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(mtype: MessageType, code: Code, message_id: u16) -> Self {
        Self {
            mtype,
            code,
            message_id,
            token: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Empty ACK, used to acknowledge a confirmable separate response.
    pub fn empty_ack(message_id: u16) -> Self {
        Self::new(MessageType::Acknowledgement, Code::EMPTY, message_id)
    }

    pub fn reset(message_id: u16) -> Self {
        Self::new(MessageType::Reset, Code::EMPTY, message_id)
    }

    pub fn add_option(&mut self, number: u16, value: impl Into<Vec<u8>>) {
        self.options.push(CoapOption {
            number,
            value: value.into(),
        });
    }

    /// Add a uint option using the shortest encoding (zero is zero bytes).
    pub fn add_uint_option(&mut self, number: u16, value: u32) {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        self.add_option(number, bytes[skip..].to_vec());
    }

    /// Split `path` on `/` into Uri-Path options. Empty segments are skipped.
    pub fn add_uri_path(&mut self, path: &str) {
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            self.add_option(option::URI_PATH, segment.as_bytes().to_vec());
        }
    }

    pub fn option_values(&self, number: u16) -> impl Iterator<Item = &[u8]> + '_ {
        self.options
            .iter()
            .filter(move |o| o.number == number)
            .map(|o| o.value.as_slice())
    }

    pub fn option(&self, number: u16) -> Option<&[u8]> {
        self.option_values(number).next()
    }

    pub fn uint_option(&self, number: u16) -> Option<u32> {
        let value = self.option(number)?;
        if value.len() > 4 {
            return None;
        }
        Some(value.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
    }

    /// Read only the fixed header. Used to answer unparseable confirmable
    /// messages with a Reset.
    pub fn peek_header(buf: &[u8]) -> Option<(MessageType, Code, u16)> {
        if buf.len() < 4 || buf[0] >> 6 != VERSION {
            return None;
        }
        Some((
            MessageType::from(buf[0] >> 4),
            Code(buf[1]),
            u16::from_be_bytes([buf[2], buf[3]]),
        ))
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CoapError> {
        if buf.len() < 4 {
            return Err(CoapError::Truncated);
        }
        let version = buf[0] >> 6;
        if version != VERSION {
            return Err(CoapError::UnknownVersion(version));
        }
        let mtype = MessageType::from(buf[0] >> 4);
        let tkl = usize::from(buf[0] & 0x0f);
        if tkl > MAX_TOKEN_LEN {
            return Err(CoapError::InvalidTokenLength(tkl));
        }
        let code = Code(buf[1]);
        let message_id = u16::from_be_bytes([buf[2], buf[3]]);

        if code == Code::EMPTY && (tkl != 0 || buf.len() != 4) {
            return Err(CoapError::NonEmptyEmptyMessage);
        }

        let mut pos = 4;
        let token = buf
            .get(pos..pos + tkl)
            .ok_or(CoapError::Truncated)?
            .to_vec();
        pos += tkl;

        let mut options = Vec::new();
        let mut payload = Vec::new();
        let mut number: u16 = 0;

        while pos < buf.len() {
            let head = buf[pos];
            pos += 1;
            if head == PAYLOAD_MARKER {
                if pos == buf.len() {
                    return Err(CoapError::EmptyPayloadAfterMarker);
                }
                payload = buf[pos..].to_vec();
                break;
            }

            let delta = read_extended(buf, &mut pos, head >> 4)?;
            let length = read_extended(buf, &mut pos, head & 0x0f)?;

            number = u16::try_from(u32::from(number) + delta)
                .map_err(|_| CoapError::OptionNumberOverflow)?;
            let end = pos + length as usize;
            let value = buf.get(pos..end).ok_or(CoapError::Truncated)?.to_vec();
            pos = end;

            options.push(CoapOption { number, value });
        }

        Ok(Self {
            mtype,
            code,
            message_id,
            token,
            options,
            payload,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoapError> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(CoapError::InvalidTokenLength(self.token.len()));
        }

        let mut out = Vec::with_capacity(4 + self.token.len() + self.payload.len() + 32);
        out.push((VERSION << 6) | ((self.mtype as u8) << 4) | self.token.len() as u8);
        out.push(self.code.0);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token);

        let mut sorted: Vec<&CoapOption> = self.options.iter().collect();
        sorted.sort_by_key(|o| o.number);

        let mut previous: u16 = 0;
        for opt in sorted {
            let delta = u32::from(opt.number - previous);
            let length = u32::try_from(opt.value.len())
                .ok()
                .filter(|l| *l <= 0xffff + 269)
                .ok_or(CoapError::OptionTooLong(opt.value.len()))?;

            let (delta_nibble, delta_ext) = extended_parts(delta);
            let (length_nibble, length_ext) = extended_parts(length);
            out.push((delta_nibble << 4) | length_nibble);
            out.extend_from_slice(&delta_ext);
            out.extend_from_slice(&length_ext);
            out.extend_from_slice(&opt.value);
            previous = opt.number;
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }

        Ok(out)
    }
}

fn read_extended(buf: &[u8], pos: &mut usize, nibble: u8) -> Result<u32, CoapError> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => {
            let b = *buf.get(*pos).ok_or(CoapError::Truncated)?;
            *pos += 1;
            Ok(u32::from(b) + 13)
        }
        14 => {
            let bytes = buf.get(*pos..*pos + 2).ok_or(CoapError::Truncated)?;
            *pos += 2;
            Ok(u32::from(u16::from_be_bytes([bytes[0], bytes[1]])) + 269)
        }
        _ => Err(CoapError::ReservedOptionNibble),
    }
}

fn extended_parts(value: u32) -> (u8, Vec<u8>) {
    match value {
        0..=12 => (value as u8, Vec::new()),
        13..=268 => (13, vec![(value - 13) as u8]),
        _ => (14, ((value - 269) as u16).to_be_bytes().to_vec()),
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting a CoAP datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoapError {
    #[error("datagram truncated")]
    Truncated,

    #[error("unknown CoAP version {0}")]
    UnknownVersion(u8),

    #[error("token length {0} exceeds {}", MAX_TOKEN_LEN)]
    InvalidTokenLength(usize),

    #[error("empty message carries token, options or payload")]
    NonEmptyEmptyMessage,

    #[error("payload marker followed by zero-length payload")]
    EmptyPayloadAfterMarker,

    #[error("reserved option nibble 15")]
    ReservedOptionNibble,

    #[error("option number overflows 16 bits")]
    OptionNumberOverflow,

    #[error("option value of {0} bytes is too long")]
    OptionTooLong(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
