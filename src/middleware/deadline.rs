use actix_web::{
    HttpMessage,
    dev::{Service, ServiceRequest, Transform},
    http::{header::HeaderMap, StatusCode},
    HttpResponse, ResponseError,
};
use std::{
    cell::Cell,
    future::{ready, Future, Ready},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::{Instant, Sleep};

use crate::{error_code::ErrorCode, future::DeadlineExceeded};

const DEADLINE_HEADER: &str = "X-Request-Deadline";

/// How long a handler that claimed the deadline may run past it to release its resources
const CLAIM_GRACE: Duration = Duration::from_secs(5);

/// Answers with 408 once the `X-Request-Deadline` passes
///
/// The deadline is also published to handlers as a [`RequestDeadline`]. A handler that spawns
/// work the middleware can't reach, like the multipart upload tasks, claims it and enforces it
/// from the inside so cleanup finishes before the response goes out.
pub(crate) struct Deadline;
pub(crate) struct DeadlineMiddleware<S> {
    inner: S,
}

/// The instant a request must be answered by
#[derive(Clone, Debug)]
pub(crate) struct RequestDeadline {
    at: Instant,
    claimed: Rc<Cell<bool>>,
}

impl RequestDeadline {
    /// Take over enforcing the deadline, returning when it passes
    pub(crate) fn claim(&self) -> Instant {
        self.claimed.set(true);
        self.at
    }

    fn is_claimed(&self) -> bool {
        self.claimed.get()
    }
}

#[derive(Debug, thiserror::Error)]
enum ParseDeadlineError {
    #[error("Invalid header string")]
    HeaderString,

    #[error("Invalid deadline format")]
    HeaderFormat,

    #[error("Invalid deadline timestamp")]
    Timestamp,
}

pin_project_lite::pin_project! {
    pub(crate) struct DeadlineFuture<F> {
        #[pin]
        inner: F,

        #[pin]
        sleep: Option<Sleep>,

        deadline: Option<RequestDeadline>,

        extended: bool,

        error: Option<ParseDeadlineError>,
    }
}

// unix timestamp in nanoseconds
fn parse_deadline(headers: &HeaderMap) -> Result<Option<Instant>, ParseDeadlineError> {
    let Some(value) = headers.get(DEADLINE_HEADER) else {
        return Ok(None);
    };

    let nanos: i128 = value
        .to_str()
        .map_err(|_| ParseDeadlineError::HeaderString)?
        .parse()
        .map_err(|_| ParseDeadlineError::HeaderFormat)?;

    let deadline = time::OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|_| ParseDeadlineError::Timestamp)?;

    let remaining: Duration = (deadline - time::OffsetDateTime::now_utc())
        .try_into()
        .unwrap_or(Duration::ZERO);

    Ok(Some(Instant::now() + remaining))
}

impl<S> Transform<S, ServiceRequest> for Deadline
where
    S: Service<ServiceRequest>,
    S::Future: 'static,
    actix_web::Error: From<S::Error>,
{
    type Response = S::Response;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = DeadlineMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(DeadlineMiddleware { inner: service }))
    }
}

impl<S> Service<ServiceRequest> for DeadlineMiddleware<S>
where
    S: Service<ServiceRequest>,
    S::Future: 'static,
    actix_web::Error: From<S::Error>,
{
    type Response = S::Response;
    type Error = actix_web::Error;
    type Future = DeadlineFuture<S::Future>;

    fn poll_ready(&self, cx: &mut core::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map(|res| res.map_err(actix_web::Error::from))
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let (deadline, error) = match parse_deadline(req.headers()) {
            Ok(Some(at)) => {
                let deadline = RequestDeadline {
                    at,
                    claimed: Rc::new(Cell::new(false)),
                };

                req.extensions_mut().insert(deadline.clone());

                (Some(deadline), None)
            }
            Ok(None) => (None, None),
            Err(e) => (None, Some(e)),
        };

        DeadlineFuture {
            sleep: deadline.as_ref().map(|d| tokio::time::sleep_until(d.at)),
            inner: self.inner.call(req),
            deadline,
            extended: false,
            error,
        }
    }
}

impl ResponseError for DeadlineExceeded {
    fn status_code(&self) -> StatusCode {
        StatusCode::REQUEST_TIMEOUT
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "msg": self.to_string(),
            "code": ErrorCode::REQUEST_TIMEOUT,
        }))
    }
}

impl ResponseError for ParseDeadlineError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "msg": self.to_string(),
            "code": ErrorCode::PARSE_DEADLINE,
        }))
    }
}

impl<F, R, E> Future for DeadlineFuture<F>
where
    F: Future<Output = Result<R, E>>,
    actix_web::Error: From<E>,
{
    type Output = Result<R, actix_web::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        if let Some(error) = this.error.take() {
            return Poll::Ready(Err(error.into()));
        }

        if let Poll::Ready(res) = this.inner.poll(cx) {
            return Poll::Ready(res.map_err(actix_web::Error::from));
        }

        let Some(mut sleep) = this.sleep.as_mut().as_pin_mut() else {
            return Poll::Pending;
        };

        loop {
            std::task::ready!(sleep.as_mut().poll(cx));

            match this.deadline {
                Some(deadline) if deadline.is_claimed() && !*this.extended => {
                    tracing::debug!("Request deadline passed, waiting on the handler's cleanup");

                    *this.extended = true;
                    sleep.as_mut().reset(deadline.at + CLAIM_GRACE);
                }
                _ => {
                    tracing::debug!("Request deadline exceeded, dropping handler");

                    return Poll::Ready(Err(DeadlineExceeded.into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, web, App, HttpMessage, HttpRequest, HttpResponse};
    use std::time::Duration;

    use super::{Deadline, RequestDeadline};
    use crate::testing::deadline_in;

    async fn slow() -> HttpResponse {
        actix_rt::time::sleep(Duration::from_secs(5)).await;
        HttpResponse::Ok().finish()
    }

    async fn fast() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    // runs briefly past the deadline, as a handler releasing its resources would
    async fn claims(req: HttpRequest) -> HttpResponse {
        let deadline = req
            .extensions()
            .get::<RequestDeadline>()
            .map(RequestDeadline::claim);

        let Some(at) = deadline else {
            return HttpResponse::BadRequest().finish();
        };

        tokio::time::sleep_until(at + Duration::from_millis(100)).await;

        HttpResponse::Accepted().finish()
    }

    #[actix_rt::test]
    async fn requests_within_deadline_pass() {
        let app = test::init_service(
            App::new()
                .wrap(Deadline)
                .route("/fast", web::get().to(fast)),
        )
        .await;

        let req = test::TestRequest::get().uri("/fast").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/fast")
            .insert_header(("X-Request-Deadline", deadline_in(Duration::from_secs(30))))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_rt::test]
    async fn slow_handler_is_cut_off() {
        let app = test::init_service(
            App::new()
                .wrap(Deadline)
                .route("/slow", web::get().to(slow)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/slow")
            .insert_header(("X-Request-Deadline", deadline_in(Duration::from_millis(50))))
            .to_request();

        let Err(err) = test::try_call_service(&app, req).await else {
            panic!("Handler should have been cut off");
        };

        assert_eq!(
            err.as_response_error().status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
    }

    #[actix_rt::test]
    async fn claimed_deadline_lets_the_handler_finish() {
        let app = test::init_service(
            App::new()
                .wrap(Deadline)
                .route("/claims", web::get().to(claims)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/claims")
            .insert_header(("X-Request-Deadline", deadline_in(Duration::from_millis(50))))
            .to_request();

        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }

    #[actix_rt::test]
    async fn passed_deadline_fires_immediately() {
        let app = test::init_service(
            App::new()
                .wrap(Deadline)
                .route("/slow", web::get().to(slow)),
        )
        .await;

        let past = (time::OffsetDateTime::now_utc() - Duration::from_secs(1))
            .unix_timestamp_nanos()
            .to_string();

        let req = test::TestRequest::get()
            .uri("/slow")
            .insert_header(("X-Request-Deadline", past))
            .to_request();

        let Err(err) = test::try_call_service(&app, req).await else {
            panic!("Handler should have been cut off");
        };

        assert_eq!(
            err.as_response_error().status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
    }

    #[actix_rt::test]
    async fn malformed_deadline_is_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(Deadline)
                .route("/fast", web::get().to(fast)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/fast")
            .insert_header(("X-Request-Deadline", "soon"))
            .to_request();

        let Err(err) = test::try_call_service(&app, req).await else {
            panic!("Malformed deadline should be rejected");
        };

        assert_eq!(err.as_response_error().status_code(), StatusCode::BAD_REQUEST);
    }
}
