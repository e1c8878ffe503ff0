//! Lookup filters and pagination.
//!
//! A filter is `name=value` from the lookup query. Values are compared as
//! text:
//!
//! - `value` matches exactly,
//! - `prefix*` matches any value starting with `prefix` (`*` alone matches
//!   any value),
//! - an empty value only requires the attribute to be present.
//!
//! Space-separated attribute values (`rt="temp-c hum"`) match when any one
//! of their words does. `page` and `count` are reserved for pagination.

use rd_core::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Endpoint,
    Resource,
    Domain,
}

impl LookupKind {
    /// From the last path segment under `rd-lookup/`.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "ep" => Some(LookupKind::Endpoint),
            "res" => Some(LookupKind::Resource),
            "d" => Some(LookupKind::Domain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Present,
    Exact(String),
    Prefix(String),
}

impl Pattern {
    fn parse(value: &str) -> Self {
        if value.is_empty() {
            Pattern::Present
        } else if let Some(prefix) = value.strip_suffix('*') {
            Pattern::Prefix(prefix.to_string())
        } else {
            Pattern::Exact(value.to_string())
        }
    }

    fn matches(&self, value: &str) -> bool {
        let mut candidates = std::iter::once(value).chain(value.split_whitespace());
        match self {
            Pattern::Present => true,
            Pattern::Exact(expected) => candidates.any(|v| v == expected.as_str()),
            Pattern::Prefix(prefix) => candidates.any(|v| v.starts_with(prefix.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pattern: Pattern,
}

impl Filter {
    pub fn new(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            pattern: Pattern::parse(value),
        }
    }

    /// `None` means the attribute is absent, which never matches.
    pub fn matches(&self, value: Option<&str>) -> bool {
        value.is_some_and(|v| self.pattern.matches(v))
    }
}

/// A parsed lookup query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupQuery {
    pub filters: Vec<Filter>,
    /// Zero-based page index. Only meaningful together with `count`.
    pub page: Option<usize>,
    pub count: Option<usize>,
}

impl LookupQuery {
    pub fn from_query(query: &[(String, String)]) -> Result<Self, ValidationError> {
        let mut parsed = Self::default();
        for (name, value) in query {
            match name.as_str() {
                "page" => parsed.page = Some(parse_count("page", value)?),
                "count" => parsed.count = Some(parse_count("count", value)?),
                _ => parsed.filters.push(Filter::new(name.as_str(), value)),
            }
        }
        Ok(parsed)
    }

    pub fn filter(mut self, name: &str, value: &str) -> Self {
        self.filters.push(Filter::new(name, value));
        self
    }

    /// True when every filter is satisfied by `attribute`.
    pub fn matches<F>(&self, attribute: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        self.filters
            .iter()
            .all(|f| f.matches(attribute(&f.name).as_deref()))
    }

    /// Apply `page`/`count` to an already ordered result set.
    pub fn paginate<T>(&self, results: Vec<T>) -> Vec<T> {
        match self.count {
            None => results,
            Some(count) => {
                let skip = self.page.unwrap_or(0).saturating_mul(count);
                results.into_iter().skip(skip).take(count).collect()
            }
        }
    }
}

fn parse_count(parameter: &str, value: &str) -> Result<usize, ValidationError> {
    value
        .parse()
        .map_err(|_| ValidationError::new(parameter, "not an unsigned integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(pairs: &[(&str, &str)]) -> LookupQuery {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();
        LookupQuery::from_query(&pairs).unwrap()
    }

    #[test]
    fn exact_prefix_and_presence() {
        assert!(Filter::new("rt", "temperature").matches(Some("temperature")));
        assert!(!Filter::new("rt", "temperature").matches(Some("temperature-c")));
        assert!(Filter::new("rt", "temp*").matches(Some("temperature-c")));
        assert!(Filter::new("rt", "*").matches(Some("anything")));
        assert!(Filter::new("obs", "").matches(Some("")));
        assert!(!Filter::new("obs", "").matches(None));
        assert!(!Filter::new("rt", "*").matches(None));
    }

    #[test]
    fn multi_valued_attributes_match_any_word() {
        let f = Filter::new("rt", "hum");
        assert!(f.matches(Some("temp hum")));
        assert!(!f.matches(Some("temp humidity")));
        assert!(Filter::new("rt", "hum*").matches(Some("temp humidity")));
        assert!(Filter::new("rt", "temp hum").matches(Some("temp hum")));
    }

    #[test]
    fn all_filters_must_hold() {
        let query = q(&[("d", "local"), ("et", "sensor*")]);
        let attrs = |name: &str| match name {
            "d" => Some("local".to_string()),
            "et" => Some("sensor.temp".to_string()),
            _ => None,
        };
        assert!(query.matches(attrs));
        let query = query.filter("ep", "x");
        assert!(!query.matches(attrs));
        assert!(LookupQuery::default().matches(|_| None));
    }

    #[test]
    fn pagination() {
        let query = q(&[("page", "1"), ("count", "2")]);
        assert!(query.filters.is_empty());
        assert_eq!(query.paginate(vec![1, 2, 3, 4, 5]), vec![3, 4]);
        assert_eq!(q(&[("count", "2")]).paginate(vec![1, 2, 3]), vec![1, 2]);
        assert_eq!(q(&[("page", "9"), ("count", "2")]).paginate(vec![1, 2, 3]), Vec::<i32>::new());
        assert_eq!(q(&[("page", "3")]).paginate(vec![1, 2]), vec![1, 2]);

        let bad = LookupQuery::from_query(&[("count".into(), "-1".into())]).unwrap_err();
        assert_eq!(bad.parameter, "count");
    }

    #[test]
    fn kind_from_segment() {
        assert_eq!(LookupKind::from_segment("ep"), Some(LookupKind::Endpoint));
        assert_eq!(LookupKind::from_segment("res"), Some(LookupKind::Resource));
        assert_eq!(LookupKind::from_segment("d"), Some(LookupKind::Domain));
        assert_eq!(LookupKind::from_segment("gp"), None);
    }
}
