//! Request routing dispatch module
//!
//! Entry point for HTTP request processing, responsible for method validation,
//! mount matching, and dispatching to the static server.

use hyper::header::{HeaderMap, HeaderValue};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response};
use percent_encoding::percent_decode_str;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{AppState, Mount};
use crate::handler::static_files;
use crate::http::conditional::Conditions;
use crate::http::{self, ResponseBody};
use crate::logger::{self, AccessLogEntry};

/// Request context encapsulating information needed for request processing
#[derive(Debug, Default)]
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub is_head: bool,
    pub if_modified_since: Option<String>,
    pub if_unmodified_since: Option<String>,
    pub if_range: Option<String>,
    pub range_header: Option<String>,
}

impl<'a> RequestContext<'a> {
    fn from_headers(path: &'a str, is_head: bool, headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
        };
        Self {
            path,
            is_head,
            if_modified_since: header("if-modified-since"),
            if_unmodified_since: header("if-unmodified-since"),
            if_range: header("if-range"),
            range_header: header("range"),
        }
    }

    pub fn conditions(&self) -> Conditions<'_> {
        Conditions {
            if_modified_since: self.if_modified_since.as_deref(),
            if_unmodified_since: self.if_unmodified_since.as_deref(),
            if_range: self.if_range.as_deref(),
        }
    }
}

/// Main entry point for HTTP request handling
///
/// Request bodies are never read, so any body type is accepted and dropped.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    remote_addr: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible>
where
    B: Send,
{
    let started = Instant::now();
    let (parts, _) = req.into_parts();

    let mut response = match check_http_method(&parts.method) {
        Some(resp) => resp,
        None => {
            let is_head = parts.method == Method::HEAD;
            let ctx = RequestContext::from_headers(parts.uri.path(), is_head, &parts.headers);
            route_request(&ctx, &state).await
        }
    };

    if let Ok(value) = HeaderValue::from_str(&state.config.http.server_name) {
        response.headers_mut().insert(hyper::header::SERVER, value);
    }

    if state.access_log_enabled() {
        log_access(&parts, &response, &state, remote_addr, started);
    }
    Ok(response)
}

/// Check HTTP method and return appropriate response for non-GET/HEAD methods
fn check_http_method(method: &Method) -> Option<Response<ResponseBody>> {
    match *method {
        Method::GET | Method::HEAD => None,
        Method::OPTIONS => Some(http::build_options_response()),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

/// Route request to the longest matching mount
async fn route_request(ctx: &RequestContext<'_>, state: &AppState) -> Response<ResponseBody> {
    let Some((mount, rest)) = match_mount(&state.mounts, ctx.path) else {
        return http::build_404_response();
    };

    let relative = match percent_decode_str(rest).decode_utf8() {
        Ok(decoded) => decoded,
        Err(_) => {
            logger::log_debug(&format!("Undecodable request path: {}", ctx.path));
            return http::build_404_response();
        }
    };

    let prefix = Some(mount.prefix.as_str());
    let outcome = match &mount.module {
        Some(module) => {
            state
                .server
                .serve_module(&state.modules, module, prefix, &relative)
                .await
        }
        None => state.server.serve(prefix, &relative).await,
    };

    static_files::render(outcome, ctx, mount.content_type.as_deref()).await
}

/// Find the first mount owning `path` and the remainder below it
///
/// A mount only owns whole path segments: `/static` matches `/static` and
/// `/static/app.js` but not `/statics`.
fn match_mount<'m, 'p>(mounts: &'m [Mount], path: &'p str) -> Option<(&'m Mount, &'p str)> {
    mounts.iter().find_map(|mount| {
        let base = mount.path.trim_end_matches('/');
        let rest = path.strip_prefix(base)?;
        if rest.is_empty() {
            Some((mount, rest))
        } else {
            rest.strip_prefix('/').map(|rest| (mount, rest))
        }
    })
}

fn log_access(
    req: &Parts,
    response: &Response<ResponseBody>,
    state: &AppState,
    remote_addr: SocketAddr,
    started: Instant,
) {
    let header = |name: &str| {
        req.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        remote_addr.ip().to_string(),
        req.method.to_string(),
        req.uri.path().to_string(),
    );
    entry.query = req.uri.query().map(ToString::to_string);
    entry.http_version = format!("{:?}", req.version)
        .trim_start_matches("HTTP/")
        .to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    entry.referer = header("referer");
    entry.user_agent = header("user-agent");
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

    logger::log_access(&entry, &state.config.logging.access_log_format);
}
