use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
};
use std::{
    future::{ready, Future, Ready},
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use crate::init_metrics::{REQUEST_END, REQUEST_START, REQUEST_TIMINGS};

/// Counts and times every request by route pattern and outcome
///
/// A request whose handler is dropped before producing a response, such as on a client
/// disconnect, is recorded as `canceled`.
pub(crate) struct Metrics;
pub(crate) struct MetricsMiddleware<S> {
    inner: S,
}

struct RequestGuard {
    start: Instant,
    path: String,
    status: Option<StatusCode>,
}

impl RequestGuard {
    fn new(path: Option<String>) -> Self {
        let path = path.unwrap_or_else(|| String::from("unmatched"));

        metrics::counter!(REQUEST_START, "path" => path.clone()).increment(1);

        RequestGuard {
            start: Instant::now(),
            path,
            status: None,
        }
    }
}

fn outcome(status: Option<StatusCode>) -> &'static str {
    match status {
        None => "canceled",
        Some(StatusCode::REQUEST_TIMEOUT) => "deadline",
        Some(status) if status.is_server_error() => "server_error",
        Some(status) if status.is_client_error() => "client_error",
        Some(_) => "ok",
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let path = std::mem::take(&mut self.path);
        let outcome = outcome(self.status);
        let status = self
            .status
            .map(|status| status.as_u16().to_string())
            .unwrap_or_else(|| String::from("none"));

        metrics::counter!(
            REQUEST_END,
            "path" => path.clone(),
            "status" => status,
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!(REQUEST_TIMINGS, "path" => path, "outcome" => outcome)
            .record(self.start.elapsed().as_secs_f64());
    }
}

pin_project_lite::pin_project! {
    pub(crate) struct MetricsFuture<F> {
        guard: Option<RequestGuard>,

        #[pin]
        inner: F,
    }
}

impl<S, B> Transform<S, ServiceRequest> for Metrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>>,
    S::Future: 'static,
    S::Error: Into<actix_web::Error>,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = MetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddleware { inner: service }))
    }
}

impl<S, B> Service<ServiceRequest> for MetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>>,
    S::Future: 'static,
    S::Error: Into<actix_web::Error>,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = MetricsFuture<S::Future>;

    fn poll_ready(&self, cx: &mut core::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        MetricsFuture {
            guard: Some(RequestGuard::new(req.match_pattern())),
            inner: self.inner.call(req),
        }
    }
}

impl<F, B, E> Future for MetricsFuture<F>
where
    F: Future<Output = Result<ServiceResponse<B>, E>>,
    E: Into<actix_web::Error>,
{
    type Output = Result<ServiceResponse<B>, actix_web::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let res: Self::Output = std::task::ready!(this.inner.poll(cx)).map_err(Into::into);

        if let Some(mut guard) = this.guard.take() {
            guard.status = Some(match &res {
                Ok(response) => response.status(),
                Err(e) => e.as_response_error().status_code(),
            });
        }

        Poll::Ready(res)
    }
}
