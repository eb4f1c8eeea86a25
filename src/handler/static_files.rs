//! Static file response module
//!
//! Renders a `ServeOutcome` into an HTTP response. Seekable streams get
//! conditional GET and byte-range handling; sequential streams are copied
//! through with a plain 200.

use chrono::{DateTime, Utc};
use hyper::Response;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use crate::handler::router::RequestContext;
use crate::http::body::{empty, ReaderBody};
use crate::http::conditional::{self, format_http_date, Precondition};
use crate::http::range::RangeParseResult;
use crate::http::{self, mime, ResponseBody};
use crate::logger;
use crate::serve::{SeekableRead, ServeOutcome, StaticBinary, StaticStream};

/// Render the outcome of a serve call
///
/// `content_type` overrides the type inferred from the file name. Internal
/// errors were logged when they were classified; the client only sees a
/// generic 500.
pub async fn render(
    outcome: ServeOutcome,
    ctx: &RequestContext<'_>,
    content_type: Option<&str>,
) -> Response<ResponseBody> {
    match outcome {
        ServeOutcome::Ok(binary) => transfer(binary, ctx, content_type).await,
        ServeOutcome::NotFound(_) => http::build_404_response(),
        ServeOutcome::Forbidden(message) => http::build_403_response(message),
        ServeOutcome::InternalError(_) => http::build_500_response(),
    }
}

/// Write a static binary using the strategy matching its stream
pub async fn transfer(
    binary: StaticBinary,
    ctx: &RequestContext<'_>,
    content_type: Option<&str>,
) -> Response<ResponseBody> {
    let StaticBinary {
        stream,
        name,
        length,
        mod_time,
    } = binary;
    let content_type = content_type.unwrap_or_else(|| mime::content_type_by_filename(&name));

    match stream {
        StaticStream::Seekable(reader) => {
            match transfer_seekable(reader, length, mod_time, content_type, ctx).await {
                Ok(response) => response,
                Err(e) => {
                    logger::log_error(&format!("Failed to prepare '{name}' for transfer: {e}"));
                    http::build_500_response()
                }
            }
        }
        StaticStream::Sequential(reader) => transfer_sequential(reader, length, content_type, ctx),
    }
}

/// Conditional, range-aware transfer
async fn transfer_seekable(
    mut reader: Box<dyn SeekableRead>,
    length: Option<u64>,
    mod_time: DateTime<Utc>,
    content_type: &str,
    ctx: &RequestContext<'_>,
) -> io::Result<Response<ResponseBody>> {
    let size = match length {
        Some(len) => len,
        None => reader.seek(SeekFrom::End(0)).await?,
    };

    // The Unix epoch is what a missing timestamp looks like; treat it as unknown
    let last_modified = (mod_time.timestamp() > 0).then_some(mod_time);
    let last_modified_header = last_modified.map(format_http_date);

    let range_allowed = match conditional::evaluate(&ctx.conditions(), last_modified) {
        Precondition::NotModified => {
            return Ok(http::build_304_response(last_modified_header.as_deref()));
        }
        Precondition::Failed => return Ok(http::build_412_response()),
        Precondition::Proceed { range_allowed } => range_allowed,
    };

    let range_header = ctx.range_header.as_deref().filter(|_| range_allowed);
    let range = match http::parse_range_header(range_header, size) {
        RangeParseResult::Valid(range) => Some(range),
        RangeParseResult::NotSatisfiable => return Ok(http::build_416_response(size)),
        RangeParseResult::None => None,
    };
    let (start, send_len) = range.map_or((0, size), |r| (r.start, r.length()));

    let mut builder = Response::builder()
        .status(if range.is_some() { 206 } else { 200 })
        .header("Content-Type", content_type)
        .header("Content-Length", send_len)
        .header("Accept-Ranges", "bytes");
    if let Some(value) = &last_modified_header {
        builder = builder.header("Last-Modified", value);
    }
    if let Some(range) = range {
        builder = builder.header("Content-Range", range.content_range(size));
    }

    let body = if ctx.is_head {
        empty()
    } else {
        reader.seek(SeekFrom::Start(start)).await?;
        ReaderBody::new(reader.take(send_len), Some(send_len)).into_response_body()
    };

    Ok(builder.body(body).unwrap_or_else(|e| {
        logger::log_error(&format!("Failed to build static file response: {e}"));
        http::build_500_response()
    }))
}

/// Unconditional full copy
fn transfer_sequential(
    reader: Pin<Box<dyn AsyncRead + Send>>,
    length: Option<u64>,
    content_type: &str,
    ctx: &RequestContext<'_>,
) -> Response<ResponseBody> {
    let mut builder = Response::builder()
        .status(200)
        .header("Content-Type", content_type);
    if let Some(len) = length {
        builder = builder.header("Content-Length", len);
    }

    let body = if ctx.is_head {
        empty()
    } else {
        ReaderBody::new(reader, length).into_response_body()
    };

    builder.body(body).unwrap_or_else(|e| {
        logger::log_error(&format!("Failed to build stream response: {e}"));
        http::build_500_response()
    })
}
