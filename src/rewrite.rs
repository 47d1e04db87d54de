//! Rewriting inbound requests into requests for the matched upstream.

use http::{HeaderValue, Request, Uri, header::HOST};
use tracing::debug;

use crate::upstream::Upstream;

/// X-Forwarded-For header, removed from every forwarded request.
///
/// Client supplied values are not trusted and no replacement is written, so the
/// upstream never learns the client address from this proxy.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Produces the request sent to `service` from an inbound request.
///
/// The inbound request is consumed. The result carries an absolute-form URI built from
/// the target scheme and authority, the inbound path with the gateway prefix removed,
/// and the inbound query. `Host` is replaced with the target authority and
/// `X-Forwarded-For` is dropped. Method, remaining headers and body pass through.
/// The outbound version is always HTTP/1.1.
pub fn rewrite<B>(service: &Upstream, inbound: Request<B>) -> Result<Request<B>, http::Error> {
    let (parts, body) = inbound.into_parts();

    let path = forwarded_path(service, parts.uri.path());
    let path_and_query = match parts.uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };

    let uri = Uri::builder()
        .scheme(service.scheme().clone())
        .authority(service.authority().clone())
        .path_and_query(path_and_query)
        .build()?;

    let mut headers = parts.headers;
    headers.remove(X_FORWARDED_FOR);
    headers.insert(HOST, HeaderValue::from_str(service.authority().as_str())?);

    debug!(
        "Forwarding request: {}{} -> {}{}",
        parts
            .uri
            .authority()
            .map(|a| a.as_str())
            .unwrap_or_default(),
        parts.uri.path(),
        service.authority(),
        uri.path()
    );

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(uri)
        .body(body)?;
    *outbound.headers_mut() = headers;
    Ok(outbound)
}

/// Path sent upstream for an inbound `path` routed to `service`.
///
/// The gateway prefix is removed as a literal string. An empty remainder becomes `/`
/// (or the bare target base path), and a remainder without a leading slash is joined to
/// the base path with one.
pub fn forwarded_path(service: &Upstream, path: &str) -> String {
    let remainder = path
        .strip_prefix(service.gateway_prefix.as_str())
        .unwrap_or(path);
    let base = service.base_path();

    if remainder.is_empty() {
        if base.is_empty() {
            "/".to_owned()
        } else {
            base.to_owned()
        }
    } else if remainder.starts_with('/') {
        format!("{base}{remainder}")
    } else {
        format!("{base}/{remainder}")
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, Version};

    use super::*;
    use crate::upstream::UpstreamService;

    fn upstream(prefix: &str, target: &str) -> Upstream {
        Upstream::try_from_service(UpstreamService::new("service1", prefix, target)).unwrap()
    }

    fn inbound(uri: &str) -> http::request::Builder {
        Request::builder().uri(uri).header(HOST, "localhost:8000")
    }

    #[test]
    fn strips_prefix_and_targets_upstream() {
        let service = upstream("/service1", "http://localhost:8002");
        let request = inbound("/service1/ping").body(()).unwrap();

        let outbound = rewrite(&service, request).unwrap();
        assert_eq!(outbound.uri(), "http://localhost:8002/ping");
        assert_eq!(outbound.uri().scheme_str(), Some("http"));
        assert_eq!(outbound.headers()[HOST], "localhost:8002");
    }

    #[test]
    fn exact_prefix_becomes_root() {
        let service = upstream("/service1", "http://localhost:8002");
        let outbound = rewrite(&service, inbound("/service1").body(()).unwrap()).unwrap();
        assert_eq!(outbound.uri().path(), "/");
        assert_eq!(forwarded_path(&service, "/service1"), "/");
    }

    #[test]
    fn keeps_query_string() {
        let service = upstream("/service1", "http://localhost:8002");
        let outbound =
            rewrite(&service, inbound("/service1/search?q=rust&page=2").body(()).unwrap())
                .unwrap();
        assert_eq!(outbound.uri().path(), "/search");
        assert_eq!(outbound.uri().query(), Some("q=rust&page=2"));
    }

    #[test]
    fn removes_every_forwarded_for_value() {
        let service = upstream("/service1", "http://localhost:8002");
        let request = inbound("/service1/ping")
            .header(X_FORWARDED_FOR, "10.0.0.1")
            .header(X_FORWARDED_FOR, "10.0.0.2")
            .header("X-Request-Id", "abc")
            .body(())
            .unwrap();

        let outbound = rewrite(&service, request).unwrap();
        assert!(!outbound.headers().contains_key(X_FORWARDED_FOR));
        assert_eq!(outbound.headers()["x-request-id"], "abc");
    }

    #[test]
    fn passes_method_headers_and_body_through() {
        let service = upstream("/service1", "http://localhost:8002");
        let request = Request::builder()
            .method(Method::POST)
            .version(Version::HTTP_2)
            .uri("/service1/items")
            .header("Content-Type", "application/json")
            .header("Authorization", "Bearer token")
            .body("{\"id\":1}")
            .unwrap();

        let outbound = rewrite(&service, request).unwrap();
        assert_eq!(outbound.method(), Method::POST);
        assert_eq!(outbound.version(), Version::HTTP_11);
        assert_eq!(outbound.headers()["content-type"], "application/json");
        assert_eq!(outbound.headers()["authorization"], "Bearer token");
        assert_eq!(*outbound.body(), "{\"id\":1}");
    }

    #[test]
    fn joins_target_base_path() {
        let service = upstream("/api", "http://localhost:8002/v1/");
        assert_eq!(forwarded_path(&service, "/api/users"), "/v1/users");
        assert_eq!(forwarded_path(&service, "/api"), "/v1");
        assert_eq!(forwarded_path(&service, "/apiusers"), "/v1/users");
    }

    #[test]
    fn remainder_without_slash_gets_one() {
        let service = upstream("/service1", "http://localhost:8002");
        assert_eq!(forwarded_path(&service, "/service1extra"), "/extra");
    }

    #[test]
    fn rewriting_is_deterministic() {
        let service = upstream("/service1", "http://localhost:8002");
        let build = || {
            inbound("/service1/ping?x=1")
                .header(X_FORWARDED_FOR, "1.2.3.4")
                .header("Accept", "text/plain")
                .body(())
                .unwrap()
        };

        let first = rewrite(&service, build()).unwrap();
        let second = rewrite(&service, build()).unwrap();
        assert_eq!(first.uri(), second.uri());
        assert_eq!(first.headers(), second.headers());
    }
}
