use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

/// JSON-only API: nothing may be loaded or framed
const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; frame-ancestors 'none'";

/// Headers added to every response
#[derive(Clone, Debug)]
pub struct SecurityHeaders {
    /// Precomputed `Strict-Transport-Security` value, when HSTS is enabled
    hsts: Option<HeaderValue>,
}

impl SecurityHeaders {
    pub fn new(enable_hsts: bool, hsts_max_age: u64) -> Self {
        let hsts = enable_hsts
            .then(|| format!("max-age={}; includeSubDomains", hsts_max_age))
            .and_then(|v| HeaderValue::from_str(&v).ok());
        Self { hsts }
    }
}

pub async fn security_headers(
    State(config): State<SecurityHeaders>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );
    if let Some(hsts) = config.hsts {
        headers.insert(header::STRICT_TRANSPORT_SECURITY, hsts);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn headers_for(config: SecurityHeaders) -> axum::http::HeaderMap {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(config, security_headers));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.headers().clone()
    }

    #[tokio::test]
    async fn test_headers_without_hsts() {
        let headers = headers_for(SecurityHeaders::new(false, 0)).await;
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["content-security-policy"], CONTENT_SECURITY_POLICY);
        assert!(headers.get("strict-transport-security").is_none());
    }

    #[tokio::test]
    async fn test_hsts_when_enabled() {
        let headers = headers_for(SecurityHeaders::new(true, 31_536_000)).await;
        assert_eq!(
            headers["strict-transport-security"],
            "max-age=31536000; includeSubDomains"
        );
    }
}
