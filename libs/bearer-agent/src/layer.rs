use crate::agent::Agent;
use crate::record::{ReportLog, RequestSnapshot, Stopwatch};
use http::{Request, Response};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that reports every exchange passing through the wrapped service
///
/// Created by [`Agent::layer`]. The wrapped service keeps its request,
/// response and error types; reporting problems are logged and never turn a
/// successful response into an error.
#[derive(Clone)]
pub struct AgentLayer {
    agent: Agent,
}

impl AgentLayer {
    /// Create a layer reporting through `agent`
    #[must_use]
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }
}

impl<S> Layer<S> for AgentLayer {
    type Service = AgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AgentService::new(inner, self.agent.clone())
    }
}

/// Service that times the wrapped call and ships a [`ReportLog`] for it
///
/// With reporting disabled the call is forwarded untouched. With reporting
/// enabled:
///
/// 1. request data is captured and the clock started;
/// 2. the request is handed to the inner service unchanged;
/// 3. an inner error is returned as is, with nothing reported;
/// 4. on a response, a record is built and delivered, then the response is
///    returned untouched (status, headers and unread body).
#[derive(Clone)]
pub struct AgentService<S> {
    inner: S,
    agent: Agent,
}

impl<S> AgentService<S> {
    /// Wrap `inner` so its exchanges are reported through `agent`
    #[must_use]
    pub fn new(inner: S, agent: Agent) -> Self {
        Self { inner, agent }
    }

    /// The wrapped service
    #[must_use]
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Unwrap into the wrapped service
    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }
}

type ReportingFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

pin_project! {
    /// Response future of [`AgentService`]
    #[project = ResponseFutureProj]
    pub enum ResponseFuture<F, T, E> {
        Passthrough {
            #[pin]
            future: F,
        },
        Reporting {
            future: ReportingFuture<T, E>,
        },
    }
}

impl<F, T, E> Future for ResponseFuture<F, T, E>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Passthrough { future } => future.poll(cx),
            ResponseFutureProj::Reporting { future } => future.as_mut().poll(cx),
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AgentService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, S::Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if !self.agent.is_enabled() {
            tracing::trace!("reporting disabled; passing request through");
            return ResponseFuture::Passthrough {
                future: self.inner.call(req),
            };
        }

        let snapshot = RequestSnapshot::capture(&req);
        let agent = self.agent.clone();

        let stopwatch = Stopwatch::start();
        let future = self.inner.call(req);

        ResponseFuture::Reporting {
            future: Box::pin(async move {
                let result = future.await;
                let timing = stopwatch.stop();

                // No response, nothing to describe
                let response = result?;

                let record = ReportLog::from_exchange(
                    snapshot,
                    response.status(),
                    response.headers(),
                    timing,
                );
                agent.report(record).await;

                Ok(response)
            }),
        }
    }
}
