//! Filter query language over the traffic log.
//!
//! # Responsibilities
//! - Parse `field:value` / `field:opvalue` queries into typed filters
//! - Normalize values per field (method casing, time/size suffixes)
//! - Evaluate the conjunction of all clauses against a log entry
//!
//! # Design Decisions
//! - String comparisons are case-insensitive substring matches under `=`;
//!   ordering operators on strings always fail
//! - Every predicate fails closed when the side it inspects is missing
//! - `format_query` is the parser's inverse so the UI can re-edit an
//!   active filter

use std::fmt;

use thiserror::Error;

use crate::traffic::log::LogEntry;

/// Field a filter clause inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Method,
    Path,
    Status,
    /// Response `Content-Type`; accepted spellings `type`, `content-type`,
    /// `contenttype`.
    Type,
    /// Exchange duration in milliseconds.
    Time,
    /// Response body size in bytes.
    Size,
}

impl FilterField {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "method" => Some(Self::Method),
            "path" => Some(Self::Path),
            "status" => Some(Self::Status),
            "type" | "content-type" | "contenttype" => Some(Self::Type),
            "time" => Some(Self::Time),
            "size" => Some(Self::Size),
            _ => None,
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Method => "method",
            Self::Path => "path",
            Self::Status => "status",
            Self::Type => "type",
            Self::Time => "time",
            Self::Size => "size",
        };
        f.write_str(name)
    }
}

/// Comparison operator; `=` when none is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterOp {
    #[default]
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        };
        f.write_str(op)
    }
}

/// One parsed clause. `value` is pre-normalized: methods upper-cased,
/// time/size suffixes reduced to plain integer strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid filter format: {0} (expected field:value)")]
    MissingColon(String),
    #[error("unknown filter field: {0}")]
    UnknownField(String),
    #[error("invalid time value: {0}")]
    InvalidTime(String),
    #[error("invalid size value: {0}")]
    InvalidSize(String),
    #[error("invalid status value: {0}")]
    InvalidStatus(String),
}

/// Parse a whitespace-separated query like `method:GET status:>=400 time:>1s`
/// into a filter list. An empty query parses to no filters.
pub fn parse_query(query: &str) -> Result<Vec<Filter>, FilterError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let mut filters = Vec::new();

    for part in query.split_whitespace() {
        let Some((raw_field, raw_value)) = part.split_once(':') else {
            return Err(FilterError::MissingColon(part.to_string()));
        };

        let field_name = raw_field.trim().to_ascii_lowercase();
        let field = FilterField::parse(&field_name)
            .ok_or_else(|| FilterError::UnknownField(field_name.clone()))?;

        let (op, raw_value) = split_operator(raw_value.trim());

        let value = match field {
            FilterField::Time => parse_time_value(raw_value)
                .ok_or_else(|| FilterError::InvalidTime(raw_value.to_string()))?
                .to_string(),
            FilterField::Size => parse_size_value(raw_value)
                .ok_or_else(|| FilterError::InvalidSize(raw_value.to_string()))?
                .to_string(),
            FilterField::Status => {
                raw_value
                    .parse::<i64>()
                    .map_err(|_| FilterError::InvalidStatus(raw_value.to_string()))?;
                raw_value.to_string()
            }
            FilterField::Method => raw_value.to_ascii_uppercase(),
            FilterField::Path | FilterField::Type => raw_value.to_string(),
        };

        filters.push(Filter { field, op, value });
    }

    Ok(filters)
}

/// Render filters back into query text that re-parses to the same list.
pub fn format_query(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(|f| match f.op {
            FilterOp::Eq => format!("{}:{}", f.field, f.value),
            op => format!("{}:{}{}", f.field, op, f.value),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when the entry satisfies every clause.
pub fn matches_all(entry: &LogEntry, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(entry, f))
}

/// Evaluate one clause. Missing request/response sides fail closed.
pub fn matches(entry: &LogEntry, filter: &Filter) -> bool {
    match filter.field {
        FilterField::Method => entry
            .request
            .as_ref()
            .is_some_and(|req| compare_string(&req.method, filter.op, &filter.value)),
        FilterField::Path => entry
            .request
            .as_ref()
            .is_some_and(|req| compare_string(&req.path, filter.op, &filter.value)),
        FilterField::Status => entry
            .response
            .as_ref()
            .is_some_and(|res| compare_int(res.status_code as i64, filter.op, &filter.value)),
        FilterField::Type => entry
            .response
            .as_ref()
            .and_then(|res| res.content_type())
            .is_some_and(|ct| compare_string(ct, filter.op, &filter.value)),
        FilterField::Time => compare_int(entry.duration_ms, filter.op, &filter.value),
        FilterField::Size => entry
            .response
            .as_ref()
            .is_some_and(|res| compare_int(res.body.len() as i64, filter.op, &filter.value)),
    }
}

fn split_operator(value: &str) -> (FilterOp, &str) {
    if let Some(rest) = value.strip_prefix(">=") {
        (FilterOp::Ge, rest.trim())
    } else if let Some(rest) = value.strip_prefix("<=") {
        (FilterOp::Le, rest.trim())
    } else if let Some(rest) = value.strip_prefix('>') {
        (FilterOp::Gt, rest.trim())
    } else if let Some(rest) = value.strip_prefix('<') {
        (FilterOp::Lt, rest.trim())
    } else {
        (FilterOp::Eq, value)
    }
}

fn compare_string(actual: &str, op: FilterOp, expected: &str) -> bool {
    match op {
        FilterOp::Eq => actual.to_ascii_lowercase().contains(&expected.to_ascii_lowercase()),
        _ => false,
    }
}

fn compare_int(actual: i64, op: FilterOp, expected: &str) -> bool {
    let Ok(expected) = expected.parse::<i64>() else {
        return false;
    };

    match op {
        FilterOp::Eq => actual == expected,
        FilterOp::Gt => actual > expected,
        FilterOp::Lt => actual < expected,
        FilterOp::Ge => actual >= expected,
        FilterOp::Le => actual <= expected,
    }
}

/// `10ms` and bare numbers are milliseconds; `2s` scales by 1000.
fn parse_time_value(value: &str) -> Option<i64> {
    let value = value.trim().to_ascii_lowercase();

    if let Some(num) = value.strip_suffix("ms") {
        return num.trim().parse().ok();
    }
    if let Some(num) = value.strip_suffix('s') {
        return num.trim().parse::<i64>().ok().map(|n| n * 1000);
    }
    value.parse().ok()
}

/// `b`/`kb`/`mb`/`gb` suffixes with float multipliers; bare numbers are bytes.
fn parse_size_value(value: &str) -> Option<i64> {
    let value = value.trim().to_ascii_lowercase();

    for (suffix, multiplier) in [
        ("gb", 1024.0 * 1024.0 * 1024.0),
        ("mb", 1024.0 * 1024.0),
        ("kb", 1024.0),
    ] {
        if let Some(num) = value.strip_suffix(suffix) {
            let parsed: f64 = num.trim().parse().ok()?;
            return Some((parsed * multiplier) as i64);
        }
    }
    if let Some(num) = value.strip_suffix('b') {
        return num.trim().parse().ok();
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::log::{LoggedRequest, LoggedResponse};
    use std::collections::HashMap;

    fn entry(method: &str, path: &str, status: i32, body_len: usize, duration: i64) -> LogEntry {
        LogEntry {
            request_id: "t".to_string(),
            request: Some(LoggedRequest {
                method: method.to_string(),
                path: path.to_string(),
                headers: HashMap::new(),
                body: Vec::new(),
                timestamp: 0,
            }),
            response: Some(LoggedResponse {
                status_code: status,
                headers: HashMap::from([(
                    "Content-Type".to_string(),
                    "application/json".to_string(),
                )]),
                body: vec![0u8; body_len],
                timestamp: duration,
            }),
            duration_ms: duration,
        }
    }

    #[test]
    fn test_parse_basic_clauses() {
        let filters = parse_query("method:get path:/api status:>=200").unwrap();
        assert_eq!(
            filters,
            vec![
                Filter { field: FilterField::Method, op: FilterOp::Eq, value: "GET".into() },
                Filter { field: FilterField::Path, op: FilterOp::Eq, value: "/api".into() },
                Filter { field: FilterField::Status, op: FilterOp::Ge, value: "200".into() },
            ]
        );
    }

    #[test]
    fn test_parse_empty_query() {
        assert_eq!(parse_query("").unwrap(), Vec::new());
        assert_eq!(parse_query("   ").unwrap(), Vec::new());
    }

    #[test]
    fn test_content_type_aliases_normalize() {
        for q in ["type:json", "content-type:json", "contenttype:json"] {
            let filters = parse_query(q).unwrap();
            assert_eq!(filters[0].field, FilterField::Type);
        }
    }

    #[test]
    fn test_time_suffixes() {
        assert_eq!(parse_query("time:250").unwrap()[0].value, "250");
        assert_eq!(parse_query("time:250ms").unwrap()[0].value, "250");
        assert_eq!(parse_query("time:>1s").unwrap()[0].value, "1000");
        assert_eq!(parse_query("time:>1s").unwrap()[0].op, FilterOp::Gt);
    }

    #[test]
    fn test_size_suffixes() {
        assert_eq!(parse_query("size:100").unwrap()[0].value, "100");
        assert_eq!(parse_query("size:100b").unwrap()[0].value, "100");
        assert_eq!(parse_query("size:2kb").unwrap()[0].value, "2048");
        assert_eq!(parse_query("size:1.5kb").unwrap()[0].value, "1536");
        assert_eq!(parse_query("size:<1mb").unwrap()[0].value, "1048576");
        assert_eq!(parse_query("size:1gb").unwrap()[0].value, "1073741824");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_query("noseparator"),
            Err(FilterError::MissingColon("noseparator".into()))
        );
        assert_eq!(parse_query("bogus:1"), Err(FilterError::UnknownField("bogus".into())));
        assert_eq!(parse_query("time:fast"), Err(FilterError::InvalidTime("fast".into())));
        assert_eq!(parse_query("size:big"), Err(FilterError::InvalidSize("big".into())));
        assert_eq!(parse_query("status:ok"), Err(FilterError::InvalidStatus("ok".into())));
    }

    #[test]
    fn test_format_round_trips() {
        let queries = [
            "method:GET path:/api status:>=200",
            "time:>1000 size:<=2048",
            "type:json",
        ];
        for q in queries {
            let filters = parse_query(q).unwrap();
            let formatted = format_query(&filters);
            assert_eq!(parse_query(&formatted).unwrap(), filters);
        }
    }

    #[test]
    fn test_string_match_is_substring_and_case_insensitive() {
        let e = entry("POST", "/api/items", 200, 2, 10);
        assert!(matches(&e, &parse_query("method:post").unwrap()[0]));
        assert!(matches(&e, &parse_query("path:items").unwrap()[0]));
        assert!(matches(&e, &parse_query("type:JSON").unwrap()[0]));
        // Ordering operators never match strings.
        assert!(!matches(&e, &parse_query("path:>a").unwrap()[0]));
    }

    #[test]
    fn test_missing_sides_fail_closed() {
        let mut e = entry("GET", "/x", 200, 0, 5);
        e.response = None;
        assert!(!matches(&e, &parse_query("status:200").unwrap()[0]));
        assert!(!matches(&e, &parse_query("type:json").unwrap()[0]));
        assert!(!matches(&e, &parse_query("size:0").unwrap()[0]));

        e.request = None;
        assert!(!matches(&e, &parse_query("method:GET").unwrap()[0]));
        assert!(!matches(&e, &parse_query("path:/x").unwrap()[0]));
    }

    #[test]
    fn test_conjunction_selects_expected_entries() {
        // method:POST status:>=400 time:>1s over three exchanges.
        let a = entry("POST", "/x", 500, 10, 1500);
        let b = entry("GET", "/y", 200, 10, 50);
        let c = entry("POST", "/z", 404, 10, 2000);

        let filters = parse_query("method:POST status:>=400 time:>1s").unwrap();
        assert!(matches_all(&a, &filters));
        assert!(!matches_all(&b, &filters));
        assert!(matches_all(&c, &filters));
    }
}
