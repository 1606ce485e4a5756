use actix_web::{
    dev::{Service, ServiceRequest, Transform},
    http::StatusCode,
    HttpResponse, ResponseError,
};
use std::{
    future::{ready, Future, Ready},
    pin::Pin,
    task::{Context, Poll},
};

use crate::error_code::ErrorCode;

/// Guards a scope behind the `X-Api-Token` header when an API key is configured
///
/// Without a configured key every request passes through.
pub(crate) struct Internal(pub(crate) Option<String>);
pub(crate) struct InternalMiddleware<S>(Option<String>, S);
#[derive(Clone, Debug, thiserror::Error)]
#[error("Invalid API Key")]
pub(crate) struct ApiError;

pin_project_lite::pin_project! {
    #[project = InternalFutureProj]
    #[project_replace = InternalFutureProjReplace]
    pub(crate) enum InternalFuture<F> {
        Internal {
            #[pin]
            future: F,
        },
        Error {
            error: Option<ApiError>,
        },
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "msg": self.to_string(),
            "code": ErrorCode::INVALID_API_TOKEN,
        }))
    }
}

impl<S> Transform<S, ServiceRequest> for Internal
where
    S: Service<ServiceRequest, Error = actix_web::Error>,
    S::Future: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type InitError = ();
    type Transform = InternalMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(InternalMiddleware(self.0.clone(), service)))
    }
}

impl<S> Service<ServiceRequest> for InternalMiddleware<S>
where
    S: Service<ServiceRequest, Error = actix_web::Error>,
    S::Future: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = InternalFuture<S::Future>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.1.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(api_key) = &self.0 else {
            return InternalFuture::Internal {
                future: self.1.call(req),
            };
        };

        let authorized = req
            .headers()
            .get("x-api-token")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|header| header == api_key);

        if authorized {
            InternalFuture::Internal {
                future: self.1.call(req),
            }
        } else {
            tracing::debug!("Rejecting request without valid api token");

            InternalFuture::Error {
                error: Some(ApiError),
            }
        }
    }
}

impl<F, T, E> Future for InternalFuture<F>
where
    F: Future<Output = Result<T, E>>,
    E: From<ApiError>,
{
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.as_mut().project() {
            InternalFutureProj::Internal { future } => future.poll(cx),
            InternalFutureProj::Error { error } => {
                Poll::Ready(Err(error.take().expect("Polled after completion").into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Internal;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_rt::test]
    async fn open_without_api_key() {
        let app = test::init_service(
            App::new().service(
                web::scope("/api")
                    .wrap(Internal(None))
                    .route("/ping", web::get().to(ok)),
            ),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/ping").to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_rt::test]
    async fn requires_matching_token() {
        let app = test::init_service(
            App::new().service(
                web::scope("/api")
                    .wrap(Internal(Some(String::from("secret"))))
                    .route("/ping", web::get().to(ok)),
            ),
        )
        .await;

        let missing = test::TestRequest::get().uri("/api/ping").to_request();
        let Err(err) = test::try_call_service(&app, missing).await else {
            panic!("Accepted request without token");
        };
        assert_eq!(
            err.as_response_error().status_code(),
            StatusCode::UNAUTHORIZED
        );

        let wrong = test::TestRequest::get()
            .uri("/api/ping")
            .insert_header(("X-Api-Token", "nope"))
            .to_request();
        let Err(err) = test::try_call_service(&app, wrong).await else {
            panic!("Accepted request with wrong token");
        };
        assert_eq!(
            err.as_response_error().status_code(),
            StatusCode::UNAUTHORIZED
        );

        let right = test::TestRequest::get()
            .uri("/api/ping")
            .insert_header(("X-Api-Token", "secret"))
            .to_request();
        let res = test::call_service(&app, right).await;
        assert_eq!(res.status(), StatusCode::OK);
    }
}
