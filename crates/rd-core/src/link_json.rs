//! `application/link-format+json`: the same links as a JSON array.
//!
//! ```json
//! [{"href":"/sensors/temp","rt":"temperature","if":"sensor"}]
//! ```
//!
//! Non-string values are accepted on input: numbers keep their textual
//! form, `true` becomes a flag parameter, `false` and `null` are dropped.

use serde_json::{Map, Value};

use crate::link_format::ResourceLink;
use crate::uri::{UriError, UriRef};

pub fn decode(payload: &[u8]) -> Result<Vec<ResourceLink>, LinkJsonError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let doc: Value = serde_json::from_slice(payload)?;
    let items = doc
        .as_array()
        .ok_or_else(|| LinkJsonError::Shape("top-level value must be an array"))?;

    items.iter().map(decode_link).collect()
}

fn decode_link(item: &Value) -> Result<ResourceLink, LinkJsonError> {
    let object = item
        .as_object()
        .ok_or_else(|| LinkJsonError::Shape("each link must be an object"))?;
    let href = object
        .get("href")
        .and_then(Value::as_str)
        .ok_or_else(|| LinkJsonError::Shape("link without string \"href\""))?;
    let uri = UriRef::parse(href)?;

    let mut link = ResourceLink::new(uri.to_string());
    for (name, value) in object.iter().filter(|(k, _)| k.as_str() != "href") {
        match value {
            Value::String(s) => link.set_param(name.as_str(), s.as_str()),
            Value::Number(n) => link.set_param(name.as_str(), n.to_string()),
            Value::Bool(true) => link.set_param(name.as_str(), ""),
            Value::Bool(false) | Value::Null => {}
            Value::Array(_) | Value::Object(_) => {
                return Err(LinkJsonError::NonScalar(name.clone()))
            }
        }
    }
    Ok(link)
}

pub fn encode(links: &[ResourceLink]) -> String {
    let array: Vec<Value> = links
        .iter()
        .map(|link| {
            let mut object = Map::new();
            object.insert("href".into(), Value::String(link.href.clone()));
            for (name, value) in &link.params {
                let value = if value.is_empty() {
                    Value::Bool(true)
                } else {
                    Value::String(value.clone())
                };
                object.insert(name.clone(), value);
            }
            Value::Object(object)
        })
        .collect();
    Value::Array(array).to_string()
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum LinkJsonError {
    #[error("invalid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("{0}")]
    Shape(&'static str),

    #[error("parameter {0:?} must be a scalar")]
    NonScalar(String),

    #[error("invalid link target: {0}")]
    Target(#[from] UriError),
}
