use crate::headers::normalize_headers;
use http::{HeaderMap, Request, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Discriminator of a report record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    /// Emitted once the response of an exchange has been received
    #[default]
    #[serde(rename = "REQUEST_END")]
    RequestEnd,
}

/// One observed request/response exchange, as the collector expects it.
///
/// Header maps hold a single value per name (see
/// [`normalize_headers`](crate::normalize_headers)). Header names are
/// lower-case, as stored by [`http::HeaderMap`]: a `Hello: World` response
/// header is reported as `{"hello": "World"}`. Bodies are not captured; both
/// body fields are always empty when built by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLog {
    pub protocol: String,
    pub path: String,
    pub hostname: String,
    pub method: String,
    /// Epoch milliseconds taken right before the request was handed over
    pub started_at: u64,
    /// Epoch milliseconds taken right after the wrapped transport returned
    pub ended_at: u64,
    #[serde(rename = "type")]
    pub kind: RecordType,
    pub status_code: u16,
    pub url: String,
    pub request_headers: BTreeMap<String, String>,
    pub request_body: String,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: String,
}

impl ReportLog {
    /// Assemble a record from a captured request and the received response.
    pub(crate) fn from_exchange(
        request: RequestSnapshot,
        status: StatusCode,
        response_headers: &HeaderMap,
        timing: Timing,
    ) -> Self {
        Self {
            protocol: request.protocol,
            path: request.path,
            hostname: request.hostname,
            method: request.method,
            started_at: timing.started_at,
            ended_at: timing.ended_at,
            kind: RecordType::RequestEnd,
            status_code: status.as_u16(),
            url: request.url,
            request_headers: request.headers,
            request_body: String::new(),
            response_headers: normalize_headers(response_headers),
            response_body: String::new(),
        }
    }
}

/// Request data captured before the request is moved into the wrapped service.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    protocol: String,
    path: String,
    hostname: String,
    method: String,
    url: String,
    headers: BTreeMap<String, String>,
}

impl RequestSnapshot {
    pub fn capture<B>(request: &Request<B>) -> Self {
        let uri = request.uri();
        let hostname = uri
            .host()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
            .unwrap_or_default();

        Self {
            protocol: uri.scheme_str().unwrap_or_default().to_owned(),
            path: uri.path().to_owned(),
            hostname: hostname.to_owned(),
            method: request.method().as_str().to_owned(),
            url: uri.to_string(),
            headers: normalize_headers(request.headers()),
        }
    }
}

/// Start and end of an exchange in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub started_at: u64,
    pub ended_at: u64,
}

/// Wall-clock start paired with a monotonic clock.
///
/// The end timestamp is derived from the monotonic elapsed time, so
/// `ended_at >= started_at` holds even if the system clock steps back.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    wall: SystemTime,
    monotonic: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            wall: SystemTime::now(),
            monotonic: Instant::now(),
        }
    }

    pub fn stop(&self) -> Timing {
        let started_at = epoch_millis(self.wall);
        Timing {
            started_at,
            ended_at: started_at.saturating_add(millis(self.monotonic.elapsed())),
        }
    }
}

fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, millis)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
