//! # Redirect Handler
//!
//! Every inbound request, whatever its method or path, is answered with a
//! redirect to the next broker chosen by the round-robin router. The broker's
//! plain or TLS endpoint is used depending on how the client reached us; the
//! client's path and query string are carried over untouched.

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::core::error::{DiscoveryError, DiscoveryResult};
use crate::core::types::{InstanceEndpoint, RequestScheme};
use crate::load_balancing::RoundRobinRouter;
use crate::observability::metrics;

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Shared state of the redirect surface
#[derive(Clone)]
pub struct RedirectState {
    pub router: Arc<RoundRobinRouter>,
    /// Every request arrives through a TLS terminator
    pub tls_fronted: bool,
    pub redirect_status: StatusCode,
}

/// Work out whether the client used an encrypted scheme
///
/// Precedence: TLS-fronted listener, first value of `X-Forwarded-Proto`,
/// scheme of an absolute request URI. Anything else is plain.
pub fn request_scheme(uri: &Uri, headers: &HeaderMap, tls_fronted: bool) -> RequestScheme {
    if tls_fronted {
        return RequestScheme::Encrypted;
    }

    let forwarded = headers
        .get(X_FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim);

    forwarded
        .or_else(|| uri.scheme_str())
        .map(RequestScheme::from_scheme_str)
        .unwrap_or(RequestScheme::Plain)
}

/// Build the redirect location for `endpoint`
///
/// Scheme, host and port come from the endpoint URL matching `scheme`; the
/// port falls back to the scheme default when the URL omits it. `path` and
/// `query` are appended verbatim.
pub fn build_redirect_location(
    scheme: RequestScheme,
    path: &str,
    query: Option<&str>,
    endpoint: &InstanceEndpoint,
) -> DiscoveryResult<String> {
    let raw = endpoint.url_for(scheme).ok_or_else(|| {
        unavailable(endpoint, "<none>", format!("instance advertises no {} endpoint", scheme))
    })?;

    let url = Url::parse(raw).map_err(|e| unavailable(endpoint, raw, e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| unavailable(endpoint, raw, "endpoint URL has no host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| unavailable(endpoint, raw, "endpoint URL has no port"))?;

    let mut location = format!("{}://{}:{}{}", url.scheme(), host, port, path);
    if let Some(query) = query {
        location.push('?');
        location.push_str(query);
    }
    Ok(location)
}

fn unavailable<R: Into<String>>(endpoint: &InstanceEndpoint, raw: &str, reason: R) -> DiscoveryError {
    let reason = reason.into();
    warn!(
        instance_id = %endpoint.id,
        web_service_url = %endpoint.web_service_url,
        web_service_url_tls = ?endpoint.web_service_url_tls,
        reason = %reason,
        "Malformed broker endpoint"
    );
    DiscoveryError::backend_unavailable(raw, reason)
}

/// Select a broker and redirect the request to it
pub fn redirect(state: &RedirectState, uri: &Uri, headers: &HeaderMap) -> DiscoveryResult<Response> {
    let instance = state.router.select_instance()?;
    let scheme = request_scheme(uri, headers, state.tls_fronted);
    let location = build_redirect_location(scheme, uri.path(), uri.query(), &instance)?;

    let value = HeaderValue::from_str(&location)
        .map_err(|e| DiscoveryError::backend_unavailable(location.clone(), e.to_string()))?;

    debug!(instance_id = %instance.id, %location, "Redirecting");
    metrics::record_redirect(&instance.id);

    Ok((state.redirect_status, [(header::LOCATION, value)]).into_response())
}

/// Axum fallback handler: any method, any path
pub async fn redirect_handler(
    State(state): State<RedirectState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match redirect(&state, &uri, &headers) {
        Ok(response) => response,
        Err(error) => {
            warn!(%method, path = %uri.path(), error = %error, "Redirect failed");
            metrics::record_redirect_failure(&error);
            error.into_response()
        }
    }
}
