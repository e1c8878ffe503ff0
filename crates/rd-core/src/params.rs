//! Registration parameters and their validation.
//!
//! Parameters arrive as query options (`ep=node1`, `lt=3600`, ...). Each one
//! is checked on its own; the first failure rejects the whole request.

use crate::uri::UriRef;

/// Longest accepted `ep`, `d` or `et` value, in characters.
pub const MAX_NAME_LEN: usize = 63;

pub const MIN_LIFETIME: u64 = 60;
pub const MAX_LIFETIME: u64 = 4_294_967_295;
pub const DEFAULT_LIFETIME: u32 = 86_400;

/// `ep`, `d` and `et`: 1 to 63 characters.
pub fn validate_name(value: &str) -> bool {
    let len = value.chars().count();
    (1..=MAX_NAME_LEN).contains(&len)
}

/// `lt`: seconds in [60, 4294967295].
pub fn validate_lifetime(lt: u64) -> bool {
    (MIN_LIFETIME..=MAX_LIFETIME).contains(&lt)
}

/// `con`: anything that parses as a URI reference.
pub fn validate_context(con: &str) -> bool {
    UriRef::parse(con).is_ok()
}

/// The parameters carried by a registration or update request.
///
/// Absent values stay `None`; defaults are the registry's business.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationParams {
    pub ep: Option<String>,
    pub d: Option<String>,
    pub et: Option<String>,
    pub lt: Option<u32>,
    pub con: Option<UriRef>,
    /// Any other `name=value` pair, kept as an endpoint attribute.
    pub extra: Vec<(String, String)>,
}

impl RegistrationParams {
    /// Validate query pairs. A repeated name keeps its last value.
    pub fn from_query(query: &[(String, String)]) -> Result<Self, ValidationError> {
        let mut params = Self::default();

        for (name, value) in query {
            match name.as_str() {
                "ep" => params.ep = Some(checked_name("ep", value)?),
                "d" => params.d = Some(checked_name("d", value)?),
                "et" => params.et = Some(checked_name("et", value)?),
                "lt" => params.lt = Some(checked_lifetime(value)?),
                // `base` is the name later RD drafts use for `con`.
                "con" | "base" => params.con = Some(checked_context(name, value)?),
                _ => match params.extra.iter_mut().find(|(n, _)| n == name) {
                    Some(slot) => slot.1 = value.clone(),
                    None => params.extra.push((name.clone(), value.clone())),
                },
            }
        }

        Ok(params)
    }

    /// Whether any parameter at all was supplied.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn checked_name(parameter: &str, value: &str) -> Result<String, ValidationError> {
    if validate_name(value) {
        Ok(value.to_string())
    } else {
        Err(ValidationError::new(
            parameter,
            format!("must be 1 to {} characters", MAX_NAME_LEN),
        ))
    }
}

fn checked_lifetime(value: &str) -> Result<u32, ValidationError> {
    let lt: u64 = value
        .parse()
        .map_err(|_| ValidationError::new("lt", "not an unsigned integer"))?;
    if !validate_lifetime(lt) {
        return Err(ValidationError::new(
            "lt",
            format!("must be between {} and {}", MIN_LIFETIME, MAX_LIFETIME),
        ));
    }
    u32::try_from(lt).map_err(|_| ValidationError::new("lt", "out of range"))
}

fn checked_context(parameter: &str, value: &str) -> Result<UriRef, ValidationError> {
    UriRef::parse(value).map_err(|e| ValidationError::new(parameter, e.to_string()))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid registration parameter {parameter:?}: {reason}")]
pub struct ValidationError {
    pub parameter: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn lifetime_bounds() {
        assert!(!validate_lifetime(59));
        assert!(validate_lifetime(60));
        assert!(validate_lifetime(4_294_967_295));
        assert!(!validate_lifetime(4_294_967_296));
    }

    #[test]
    fn name_length_bounds() {
        assert!(validate_name(&"a".repeat(63)));
        assert!(!validate_name(&"a".repeat(64)));
        assert!(!validate_name(""));
        // characters, not bytes
        assert!(validate_name(&"é".repeat(63)));
    }

    #[test]
    fn context_must_parse() {
        assert!(validate_context("coap://[2001:db8::1]:5683"));
        assert!(validate_context("/relative"));
        assert!(!validate_context("coap://host:notaport"));
        assert!(!validate_context(""));
    }

    #[test]
    fn from_query_collects_known_and_extra() {
        let params = RegistrationParams::from_query(&query(&[
            ("ep", "node1"),
            ("d", "local"),
            ("lt", "3600"),
            ("con", "coap://192.0.2.1:61616"),
            ("et", "oic.d.sensor"),
            ("proxy", "on"),
        ]))
        .unwrap();
        assert_eq!(params.ep.as_deref(), Some("node1"));
        assert_eq!(params.d.as_deref(), Some("local"));
        assert_eq!(params.lt, Some(3600));
        assert_eq!(params.et.as_deref(), Some("oic.d.sensor"));
        assert_eq!(
            params.con.unwrap().to_string(),
            "coap://192.0.2.1:61616"
        );
        assert_eq!(params.extra, vec![("proxy".to_string(), "on".to_string())]);
    }

    #[test]
    fn from_query_rejects_first_bad_param() {
        let err = RegistrationParams::from_query(&query(&[("ep", "a"), ("lt", "59")])).unwrap_err();
        assert_eq!(err.parameter, "lt");

        let err = RegistrationParams::from_query(&query(&[("lt", "soon")])).unwrap_err();
        assert_eq!(err.parameter, "lt");

        let long = "x".repeat(64);
        let err = RegistrationParams::from_query(&query(&[("ep", &long)])).unwrap_err();
        assert_eq!(err.parameter, "ep");

        let err = RegistrationParams::from_query(&query(&[("base", "a b")])).unwrap_err();
        assert_eq!(err.parameter, "base");
    }

    #[test]
    fn repeated_param_keeps_last() {
        let params =
            RegistrationParams::from_query(&query(&[("ep", "a"), ("ep", "b")])).unwrap();
        assert_eq!(params.ep.as_deref(), Some("b"));
        assert!(!params.is_empty());
        assert!(RegistrationParams::from_query(&[]).unwrap().is_empty());
    }
}
