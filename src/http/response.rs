//! HTTP response building module
//!
//! Provides builders for the status code responses of the static server.
//! Error bodies are fixed strings; details only ever go to the error log.

use super::body::{empty, full, ResponseBody};
use hyper::Response;

/// Build 304 Not Modified response
pub fn build_304_response(last_modified: Option<&str>) -> Response<ResponseBody> {
    let mut builder = Response::builder().status(304);
    if let Some(last_modified) = last_modified {
        builder = builder.header("Last-Modified", last_modified);
    }
    builder.body(empty()).unwrap_or_else(|e| {
        log_build_error("304", &e);
        Response::new(empty())
    })
}

/// Build 403 Forbidden response
pub fn build_403_response(message: &str) -> Response<ResponseBody> {
    build_text_response(403, format!("403 Forbidden: {message}"))
}

/// Build 404 Not Found response
pub fn build_404_response() -> Response<ResponseBody> {
    build_text_response(404, "404 Not Found".to_string())
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<ResponseBody> {
    Response::builder()
        .status(405)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Allow", "GET, HEAD, OPTIONS")
        .body(full("405 Method Not Allowed"))
        .unwrap_or_else(|e| {
            log_build_error("405", &e);
            Response::new(full("405 Method Not Allowed"))
        })
}

/// Build OPTIONS response
pub fn build_options_response() -> Response<ResponseBody> {
    Response::builder()
        .status(204)
        .header("Allow", "GET, HEAD, OPTIONS")
        .body(empty())
        .unwrap_or_else(|e| {
            log_build_error("OPTIONS", &e);
            Response::new(empty())
        })
}

/// Build 412 Precondition Failed response
pub fn build_412_response() -> Response<ResponseBody> {
    build_text_response(412, "412 Precondition Failed".to_string())
}

/// Build 416 Range Not Satisfiable response
pub fn build_416_response(file_size: u64) -> Response<ResponseBody> {
    Response::builder()
        .status(416)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Content-Range", format!("bytes */{file_size}"))
        .body(full("416 Range Not Satisfiable"))
        .unwrap_or_else(|e| {
            log_build_error("416", &e);
            Response::new(full("416 Range Not Satisfiable"))
        })
}

/// Build generic 500 Internal Server Error response
pub fn build_500_response() -> Response<ResponseBody> {
    build_text_response(500, "500 Internal Server Error".to_string())
}

fn build_text_response(status: u16, message: String) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Content-Length", message.len())
        .body(full(message))
        .unwrap_or_else(|e| {
            log_build_error(&status.to_string(), &e);
            Response::new(empty())
        })
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
