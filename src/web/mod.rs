//! HTTP control plane
//!
//! The Axum application: the `/api/v1` record endpoints, a trivial landing
//! page and the Prometheus metrics endpoint. Errors are rendered in the text
//! protocol of the API: `; <code>: <message>`, continuation lines indented.

pub mod records;

pub use records::RecordsState;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::dns::sqlite::SqliteResolver;
use crate::error::Error;
use crate::metrics::Metrics;

/// An error answered in the API's text protocol.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn render(&self) -> String {
        let mut lines = self.message.lines();
        let mut body = format!("; {}: {}\n", self.status.as_u16(), lines.next().unwrap_or(""));
        for line in lines {
            body.push_str(&format!(";      {}\n", line));
        }
        body
    }
}

/// The bare message of an error, without the taxonomy prefix; aggregates
/// become one line each.
fn bare_message(err: &Error) -> String {
    match err {
        Error::Internal(m) | Error::External(m) | Error::Argument(m) => m.clone(),
        Error::NoSuchRecord(id) => format!("no such record: {}", id),
        Error::Set(set) => set
            .0
            .iter()
            .map(bare_message)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Argument(_) | Error::Set(_) => StatusCode::BAD_REQUEST,
            Error::NoSuchRecord(_) => StatusCode::NOT_FOUND,
            Error::Internal(_) | Error::External(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, bare_message(&err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.render(),
        )
            .into_response()
    }
}

/// A 200 text payload response.
pub(crate) fn text_response(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn index() -> Html<&'static str> {
    Html(concat!(
        "<!DOCTYPE html>\n",
        "<html><head><title>Landns</title></head>\n",
        "<body><h1>Landns</h1>\n",
        "<p>DNS server for home network.</p>\n",
        "<ul><li><a href=\"/api/v1\">records</a></li>",
        "<li><a href=\"/metrics\">metrics</a></li></ul>\n",
        "</body></html>\n",
    ))
}

#[derive(Clone)]
struct MetricsState {
    metrics: Arc<Metrics>,
}

async fn render_metrics(State(state): State<MetricsState>) -> Response {
    text_response(state.metrics.render())
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not found")
}

pub(crate) async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

/// Build the full control plane application.
pub fn router(store: Arc<SqliteResolver>, metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/", get(index))
        .nest("/api/v1", records::records_router(RecordsState { store }))
        .merge(
            Router::new()
                .route("/metrics", get(render_metrics))
                .with_state(MetricsState { metrics }),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_renders_text_protocol() {
        let err = ApiError::new(StatusCode::BAD_REQUEST, "line 1: invalid format: x");
        assert_eq!(err.render(), "; 400: line 1: invalid format: x\n");

        let err = ApiError::new(
            StatusCode::BAD_REQUEST,
            "line 1: invalid format: x\nline 2: invalid format: y",
        );
        assert_eq!(
            err.render(),
            "; 400: line 1: invalid format: x\n;      line 2: invalid format: y\n"
        );
    }

    #[test]
    fn test_error_mapping() {
        let err: ApiError = Error::NoSuchRecord(7).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "no such record: 7");

        let err: ApiError = Error::Argument("bad input".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "bad input");

        let err: ApiError = Error::Internal("boom".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
