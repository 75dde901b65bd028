use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::Span;

/// Attach request details to the span opened by the sentry layer.
pub async fn enrich_current_span_middleware(req: Request<Body>, next: Next) -> Response {
    let span = Span::current();
    span.record("http.method", req.method().as_str());
    span.record("http.uri", req.uri().path());
    if let Some(query) = req.uri().query() {
        span.record("http.query", query);
    }
    if let Some(requester) = req.headers().get("x-user-id").and_then(|h| h.to_str().ok()) {
        span.record("user.id", requester);
    }

    next.run(req).await
}

pub async fn strip_trailing_slash(req: Request<Body>, next: Next) -> Response {
    let uri = req.uri();
    let path = uri.path();

    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => {
            let target = match uri.query() {
                Some(query) => format!("{stripped}?{query}"),
                None => stripped.to_string(),
            };
            Redirect::permanent(&target).into_response()
        }
        _ => next.run(req).await,
    }
}
