use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use tokio::time::Sleep;

#[derive(Debug, thiserror::Error)]
#[error("Deadline exceeded")]
pub(crate) struct DeadlineExceeded;

pub(crate) trait WithTimeout: Future + Sized {
    fn with_timeout(self, duration: Duration) -> tokio::time::Timeout<Self> {
        tokio::time::timeout(duration, self)
    }

    /// Bound the future by an optional instant
    ///
    /// The wrapped future is dropped together with the returned one, so once the deadline has
    /// fired and the result is consumed, everything the future owned is already released.
    fn with_deadline(self, deadline: Option<tokio::time::Instant>) -> DeadlineFuture<Self> {
        DeadlineFuture {
            future: self,
            sleep: deadline.map(tokio::time::sleep_until),
        }
    }
}

pub(crate) trait WithMetrics: Future + Sized {
    /// Record how long the future ran under `name`, labeled by its outcome
    fn with_metrics(self, name: &'static str) -> MetricsFuture<Self> {
        MetricsFuture {
            future: self,
            metrics: Metrics {
                name,
                start: Instant::now(),
                outcome: None,
            },
        }
    }
}

impl<F> WithTimeout for F where F: Future {}
impl<F> WithMetrics for F where F: Future {}

pin_project_lite::pin_project! {
    pub(crate) struct DeadlineFuture<F> {
        #[pin]
        future: F,

        #[pin]
        sleep: Option<Sleep>,
    }
}

impl<F> Future for DeadlineFuture<F>
where
    F: Future,
{
    type Output = Result<F::Output, DeadlineExceeded>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if let Poll::Ready(out) = this.future.poll(cx) {
            return Poll::Ready(Ok(out));
        }

        match this.sleep.as_pin_mut() {
            Some(sleep) => sleep.poll(cx).map(|()| Err(DeadlineExceeded)),
            None => Poll::Pending,
        }
    }
}

pin_project_lite::pin_project! {
    pub(crate) struct MetricsFuture<F> {
        #[pin]
        future: F,

        metrics: Metrics,
    }
}

struct Metrics {
    name: &'static str,
    start: Instant,
    outcome: Option<&'static str>,
}

impl<F, T, E> Future for MetricsFuture<F>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let out = std::task::ready!(this.future.poll(cx));

        this.metrics.outcome = Some(if out.is_ok() { "ok" } else { "error" });

        Poll::Ready(out)
    }
}

impl Drop for Metrics {
    fn drop(&mut self) {
        let outcome = self.outcome.unwrap_or("canceled");

        metrics::histogram!(self.name, "outcome" => outcome)
            .record(self.start.elapsed().as_secs_f64());
    }
}
