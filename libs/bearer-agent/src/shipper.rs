use crate::config::{
    AGENT_TYPE, AGENT_VERSION, DEFAULT_USER_AGENT, LOG_LEVEL_ALL, RUNTIME_TYPE, RUNTIME_VERSION,
};
use crate::error::AgentError;
use crate::logger::Logger;
use crate::record::ReportLog;
use crate::secret::SecretKey;
use crate::transport::Transport;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{HeaderValue, Method, Request, StatusCode, Uri};
use http_body_util::Full;
use serde::Serialize;
use tokio::sync::mpsc;
use tower::{Service, ServiceExt};

/// Upper bound on records drained into one envelope by the background task
const MAX_BACKGROUND_BATCH: usize = 64;

/// Envelope sent to the logs endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogsRequest<'a> {
    secret_key: &'a str,
    runtime: RuntimeInfo,
    agent: AgentInfo,
    logs: &'a [ReportLog],
}

#[derive(Serialize)]
struct RuntimeInfo {
    #[serde(rename = "type")]
    kind: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct AgentInfo {
    #[serde(rename = "type")]
    kind: &'static str,
    version: &'static str,
    log_level: &'static str,
}

/// Delivers batches of [`ReportLog`]s to the logs endpoint.
#[derive(Clone)]
pub struct LogShipper {
    transport: Transport,
    url: Uri,
    secret_key: SecretKey,
}

impl LogShipper {
    pub fn new(transport: Transport, url: Uri, secret_key: SecretKey) -> Self {
        Self {
            transport,
            url,
            secret_key,
        }
    }

    /// Send `records` to the logs endpoint in a single envelope.
    ///
    /// An empty batch succeeds without touching the network. Only HTTP 200
    /// counts as delivered; the response body is ignored. Nothing is retried.
    pub async fn ship(&self, records: &[ReportLog]) -> Result<(), AgentError> {
        if records.is_empty() {
            return Ok(());
        }

        let payload = serde_json::to_vec(&LogsRequest {
            secret_key: self.secret_key.expose(),
            runtime: RuntimeInfo {
                kind: RUNTIME_TYPE,
                version: RUNTIME_VERSION,
            },
            agent: AgentInfo {
                kind: AGENT_TYPE,
                version: AGENT_VERSION,
                log_level: LOG_LEVEL_ALL,
            },
            logs: records,
        })?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT))
            .body(Full::new(Bytes::from(payload)))?;

        let mut transport = self.transport.clone();
        let response = transport.ready().await?.call(request).await?;

        match response.status() {
            StatusCode::OK => {
                tracing::debug!(count = records.len(), "report records shipped");
                Ok(())
            }
            status => Err(AgentError::UnexpectedStatus(status)),
        }
    }
}

/// Route from the interceptor to the shipper.
#[derive(Clone)]
pub enum Delivery {
    /// Ship on the caller's task before its response is returned
    Inline(LogShipper),
    /// Hand off to the background drain task
    Background(mpsc::Sender<ReportLog>),
}

impl Delivery {
    /// Spawn the drain task on the current Tokio runtime.
    ///
    /// The task exits once every sender, i.e. every agent clone, is dropped.
    pub fn background(
        shipper: LogShipper,
        capacity: usize,
        logger: Logger,
    ) -> Result<Self, AgentError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| AgentError::NoRuntime)?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        handle.spawn(drain(rx, shipper, logger));
        Ok(Self::Background(tx))
    }

    /// Deliver one record; failures are logged, never returned.
    pub async fn deliver(&self, record: ReportLog, logger: &Logger) {
        match self {
            Self::Inline(shipper) => {
                if let Err(err) = shipper.ship(std::slice::from_ref(&record)).await {
                    logger.in_scope(|| {
                        tracing::warn!(error = %err, "failed to ship report records");
                    });
                }
            }
            Self::Background(tx) => {
                if let Err(err) = tx.try_send(record) {
                    logger.in_scope(|| {
                        tracing::warn!(error = %err, "report record dropped");
                    });
                }
            }
        }
    }
}

async fn drain(mut rx: mpsc::Receiver<ReportLog>, shipper: LogShipper, logger: Logger) {
    let mut batch = Vec::with_capacity(MAX_BACKGROUND_BATCH);

    while rx.recv_many(&mut batch, MAX_BACKGROUND_BATCH).await > 0 {
        if let Err(err) = shipper.ship(&batch).await {
            logger.in_scope(|| {
                tracing::warn!(error = %err, count = batch.len(), "failed to ship report records");
            });
        }
        batch.clear();
    }

    logger.in_scope(|| tracing::debug!("report delivery queue closed"));
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::record::RecordType;
    use crate::transport::into_transport;
    use http::Response;
    use http_body_util::BodyExt;
    use std::collections::BTreeMap;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Captured = Arc<Mutex<Vec<Request<Full<Bytes>>>>>;

    fn fake_collector(status: StatusCode) -> (Transport, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let service = tower::service_fn(move |req: Request<Full<Bytes>>| {
            sink.lock().unwrap().push(req);
            async move {
                Ok::<_, Infallible>(
                    Response::builder()
                        .status(status)
                        .body(Full::new(Bytes::from_static(b"{}")))
                        .unwrap(),
                )
            }
        });
        (into_transport(service), captured)
    }

    fn shipper(transport: Transport) -> LogShipper {
        LogShipper::new(
            transport,
            Uri::from_static("https://agent.bearer.sh/logs"),
            SecretKey::new("sk_test"),
        )
    }

    fn sample_record(path: &str) -> ReportLog {
        ReportLog {
            protocol: "https".to_owned(),
            path: path.to_owned(),
            hostname: "api.example.com".to_owned(),
            method: "GET".to_owned(),
            started_at: 1_000,
            ended_at: 1_080,
            kind: RecordType::RequestEnd,
            status_code: 200,
            url: format!("https://api.example.com{path}"),
            request_headers: BTreeMap::from([("accept".to_owned(), "application/json".to_owned())]),
            request_body: String::new(),
            response_headers: BTreeMap::from([(
                "content-type".to_owned(),
                "application/json".to_owned(),
            )]),
            response_body: String::new(),
        }
    }

    async fn body_json(request: Request<Full<Bytes>>) -> serde_json::Value {
        let bytes = request.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_call() {
        let (transport, captured) = fake_collector(StatusCode::OK);
        shipper(transport).ship(&[]).await.unwrap();
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ship_posts_envelope() {
        let (transport, captured) = fake_collector(StatusCode::OK);
        let record = sample_record("/sample");

        shipper(transport).ship(&[record.clone()]).await.unwrap();

        let request = captured.lock().unwrap().pop().unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri(), "https://agent.bearer.sh/logs");
        assert_eq!(request.headers()[ACCEPT], "application/json");
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert!(request.headers().get(http::header::AUTHORIZATION).is_none());

        let body = body_json(request).await;
        assert_eq!(body["secretKey"], "sk_test");
        assert_eq!(body["runtime"]["type"], "rust");
        assert_eq!(body["runtime"]["version"], RUNTIME_VERSION);
        assert_eq!(body["agent"]["type"], "bearer-rust");
        assert_eq!(body["agent"]["version"], AGENT_VERSION);
        assert_eq!(body["agent"]["log_level"], "ALL");
        assert_eq!(body["logs"], serde_json::json!([record]));
    }

    #[tokio::test]
    async fn test_ship_keeps_record_order() {
        let (transport, captured) = fake_collector(StatusCode::OK);
        let records = [sample_record("/first"), sample_record("/second")];

        shipper(transport).ship(&records).await.unwrap();

        let request = captured.lock().unwrap().pop().unwrap();
        let body = body_json(request).await;
        assert_eq!(body["logs"][0]["path"], "/first");
        assert_eq!(body["logs"][1]["path"], "/second");
    }

    #[tokio::test]
    async fn test_non_200_is_delivery_error() {
        for status in [StatusCode::CREATED, StatusCode::UNAUTHORIZED, StatusCode::BAD_GATEWAY] {
            let (transport, _) = fake_collector(status);
            let result = shipper(transport).ship(&[sample_record("/sample")]).await;
            match result {
                Err(AgentError::UnexpectedStatus(got)) => assert_eq!(got, status),
                other => panic!("Expected UnexpectedStatus, got: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_returned() {
        let failing = tower::service_fn(|_req: Request<Full<Bytes>>| async {
            Err::<Response<Full<Bytes>>, _>(std::io::Error::other("connection refused"))
        });

        let result = shipper(into_transport(failing))
            .ship(&[sample_record("/sample")])
            .await;
        assert!(matches!(result, Err(AgentError::Transport(_))));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_inline_delivery_logs_failure() {
        let (transport, captured) = fake_collector(StatusCode::INTERNAL_SERVER_ERROR);
        let delivery = Delivery::Inline(shipper(transport));

        delivery
            .deliver(sample_record("/sample"), &Logger::default())
            .await;

        assert_eq!(captured.lock().unwrap().len(), 1);
        assert!(logs_contain("failed to ship report records"));
        assert!(logs_contain("500"));
    }

    #[tokio::test]
    async fn test_background_delivery_ships_queued_records() {
        let (transport, captured) = fake_collector(StatusCode::OK);
        let delivery = Delivery::background(shipper(transport), 8, Logger::default()).unwrap();

        delivery
            .deliver(sample_record("/queued"), &Logger::default())
            .await;

        for _ in 0..100 {
            if !captured.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let request = captured.lock().unwrap().pop().unwrap();
        let body = body_json(request).await;
        assert_eq!(body["logs"][0]["path"], "/queued");
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_background_delivery_drops_when_queue_is_full() {
        // Collector that never answers keeps the drain task busy
        let stalled = tower::service_fn(|_req: Request<Full<Bytes>>| {
            std::future::pending::<Result<Response<Full<Bytes>>, Infallible>>()
        });
        let delivery =
            Delivery::background(shipper(into_transport(stalled)), 1, Logger::default()).unwrap();

        for path in ["/first", "/second", "/third"] {
            delivery.deliver(sample_record(path), &Logger::default()).await;
        }

        assert!(logs_contain("report record dropped"));
    }

    #[test]
    fn test_background_delivery_requires_runtime() {
        let (transport, _) = fake_collector(StatusCode::OK);
        let result = Delivery::background(shipper(transport), 8, Logger::default());
        assert!(matches!(result, Err(AgentError::NoRuntime)));
    }
}
