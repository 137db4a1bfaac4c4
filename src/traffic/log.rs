//! Request/response store backing the inspector surfaces.
//!
//! # Responsibilities
//! - Record each proxied request and its eventual response, keyed by the
//!   server-assigned request id
//! - Compute per-exchange duration
//! - Serve value-copied snapshots so readers never iterate under the lock
//!
//! # Design Decisions
//! - One mutex over a plain map; every operation is O(1) except snapshots
//! - Newest-first ordering is derived on read, not maintained on write
//! - A response with no matching request is dropped silently: the request
//!   side either never logged (early failure) or the entry was cleared

use std::collections::HashMap;
use std::sync::Mutex;

use crate::codec::{self, Request, Response};
use crate::traffic::filter::{self, Filter, FilterError};

/// Request half of a captured exchange.
#[derive(Debug, Clone)]
pub struct LoggedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub timestamp: i64,
}

/// Response half of a captured exchange.
#[derive(Debug, Clone)]
pub struct LoggedResponse {
    pub status_code: i32,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub timestamp: i64,
}

impl LoggedResponse {
    /// Case-insensitive header lookup; header names arrive lowercased from
    /// the HTTP client but canonical-case from hand-built frames.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }
}

/// One captured exchange. `response` is `None` while the request is in
/// flight (or if the upstream call never completed).
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub request_id: String,
    pub request: Option<LoggedRequest>,
    pub response: Option<LoggedResponse>,
    pub duration_ms: i64,
}

/// Mutex-guarded in-memory traffic log.
#[derive(Debug, Default)]
pub struct TrafficLog {
    entries: Mutex<HashMap<String, LogEntry>>,
}

impl TrafficLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outbound request under its id.
    pub fn log_request(&self, request: &Request) {
        let entry = LogEntry {
            request_id: request.id.clone(),
            request: Some(LoggedRequest {
                method: request.method.clone(),
                path: request.path.clone(),
                headers: request.headers.clone(),
                body: request.body.clone(),
                timestamp: codec::now_millis(),
            }),
            response: None,
            duration_ms: 0,
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(request.id.clone(), entry);
    }

    /// Attach a response to its request and compute the exchange duration.
    /// Responses with no matching request are dropped.
    pub fn log_response(&self, response: &Response) {
        let now = codec::now_millis();

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get_mut(&response.id) else {
            tracing::debug!(request_id = %response.id, "no request entry for response, dropping");
            return;
        };

        let request_ts = entry.request.as_ref().map(|r| r.timestamp).unwrap_or(now);
        entry.duration_ms = now - request_ts;
        entry.response = Some(LoggedResponse {
            status_code: response.status_code,
            headers: response.headers.clone(),
            body: response.body.clone(),
            timestamp: now,
        });
    }

    /// Snapshot of every entry, newest request first.
    pub fn get_logs(&self) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut logs: Vec<LogEntry> = entries.values().cloned().collect();
        drop(entries);

        logs.sort_by(|a, b| {
            let a_ts = a.request.as_ref().map(|r| r.timestamp).unwrap_or(0);
            let b_ts = b.request.as_ref().map(|r| r.timestamp).unwrap_or(0);
            b_ts.cmp(&a_ts)
        });
        logs
    }

    pub fn get_log_by_id(&self, request_id: &str) -> Option<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(request_id).cloned()
    }

    /// Parse `query` and return the entries matching every clause, newest
    /// first. An empty query matches everything.
    pub fn get_filtered_logs(&self, query: &str) -> Result<Vec<LogEntry>, FilterError> {
        let filters = filter::parse_query(query)?;
        Ok(self.filtered(&filters))
    }

    /// Evaluate pre-parsed filters against a fresh snapshot.
    pub fn filtered(&self, filters: &[Filter]) -> Vec<LogEntry> {
        let mut logs = self.get_logs();
        if !filters.is_empty() {
            logs.retain(|entry| filter::matches_all(entry, filters));
        }
        logs
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, method: &str, path: &str) -> Request {
        Request {
            id: id.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            ..Request::default()
        }
    }

    fn response(id: &str, status: i32, body: &[u8]) -> Response {
        Response {
            id: id.to_string(),
            status_code: status,
            body: body.to_vec(),
            ..Response::default()
        }
    }

    #[test]
    fn test_request_then_response_completes_entry() {
        let log = TrafficLog::new();
        log.log_request(&request("r1", "GET", "/ping"));
        log.log_response(&response("r1", 200, b"pong"));

        let entry = log.get_log_by_id("r1").unwrap();
        assert_eq!(entry.request.as_ref().unwrap().method, "GET");
        assert_eq!(entry.response.as_ref().unwrap().status_code, 200);
        assert!(entry.duration_ms >= 0);
    }

    #[test]
    fn test_unmatched_response_is_dropped() {
        let log = TrafficLog::new();
        log.log_response(&response("ghost", 200, b""));
        assert!(log.is_empty());
        assert!(log.get_log_by_id("ghost").is_none());
    }

    #[test]
    fn test_get_logs_is_newest_first() {
        let log = TrafficLog::new();
        log.log_request(&request("a", "GET", "/first"));
        log.log_request(&request("b", "GET", "/second"));
        log.log_request(&request("c", "GET", "/third"));

        // Force distinct, known timestamps.
        {
            let mut entries = log.entries.lock().unwrap();
            entries.get_mut("a").unwrap().request.as_mut().unwrap().timestamp = 100;
            entries.get_mut("b").unwrap().request.as_mut().unwrap().timestamp = 300;
            entries.get_mut("c").unwrap().request.as_mut().unwrap().timestamp = 200;
        }

        let ids: Vec<String> = log.get_logs().into_iter().map(|l| l.request_id).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn test_filtered_logs_apply_conjunction() {
        let log = TrafficLog::new();
        log.log_request(&request("x", "POST", "/x"));
        log.log_response(&response("x", 500, b"err"));
        log.log_request(&request("y", "GET", "/y"));
        log.log_response(&response("y", 200, b"ok"));

        let hits = log.get_filtered_logs("method:POST status:>=400").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].request_id, "x");

        let all = log.get_filtered_logs("").unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_filtered_logs_surface_parse_errors() {
        let log = TrafficLog::new();
        assert!(log.get_filtered_logs("bogus:1").is_err());
    }

    #[test]
    fn test_case_insensitive_header_lookup() {
        let res = LoggedResponse {
            status_code: 200,
            headers: HashMap::from([("content-type".to_string(), "text/html".to_string())]),
            body: Vec::new(),
            timestamp: 0,
        };
        assert_eq!(res.content_type(), Some("text/html"));
    }
}
