// Connection module
// Accepts a single TCP connection and serves HTTP/1.1 on it

use http_body_util::BodyExt;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Accept a connection, enforcing the connection limit.
///
/// The counter is incremented before the limit check so concurrent accepts
/// cannot both slip under the limit.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
) {
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    handle_connection(
        stream,
        peer_addr,
        Arc::clone(state),
        Arc::clone(conn_counter),
    );
}

/// How often an open connection checks its activity
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);

/// Progress of one connection, shared between the service and its watchdog
struct Activity {
    opened: Instant,
    last_ms: AtomicU64,
    in_flight: AtomicUsize,
}

impl Activity {
    fn new() -> Self {
        Self {
            opened: Instant::now(),
            last_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.opened.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_ms.store(elapsed, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.opened.elapsed().saturating_sub(last)
    }

    fn busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

/// Marks a request in flight until its response body is dropped
struct InFlight(Arc<Activity>);

impl InFlight {
    fn start(activity: &Arc<Activity>) -> Self {
        activity.in_flight.fetch_add(1, Ordering::SeqCst);
        activity.touch();
        Self(Arc::clone(activity))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serve a connection in a spawned task
///
/// Request heads must arrive within `read_timeout`. An idle connection is
/// closed after `keep_alive_timeout`; a response whose client accepts no data
/// for `write_timeout` is abandoned. Streaming itself has no deadline. The
/// counter is decremented when the task ends.
fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    conn_counter: Arc<AtomicUsize>,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let performance = &state.config.performance;
        let keep_alive = Duration::from_secs(performance.keep_alive_timeout);
        let write_timeout = Duration::from_secs(performance.write_timeout);

        let mut builder = http1::Builder::new();
        builder.timer(TokioTimer::new()).keep_alive(!keep_alive.is_zero());
        if performance.read_timeout > 0 {
            builder.header_read_timeout(Duration::from_secs(performance.read_timeout));
        }

        let activity = Arc::new(Activity::new());
        let service_state = Arc::clone(&state);
        let service_activity = Arc::clone(&activity);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let guard = InFlight::start(&service_activity);
                let state = Arc::clone(&service_state);
                async move {
                    let response = handler::handle_request(req, state, peer_addr).await?;
                    Ok::<_, Infallible>(response.map(|body| {
                        body.map_frame(move |frame| {
                            guard.0.touch();
                            frame
                        })
                        .boxed_unsync()
                    }))
                }
            }),
        );
        tokio::pin!(conn);

        let mut closing = false;
        let result = loop {
            tokio::select! {
                result = conn.as_mut() => break Some(result),
                () = tokio::time::sleep(WATCHDOG_INTERVAL) => {
                    let idle = activity.idle_for();
                    if activity.busy() {
                        if !write_timeout.is_zero() && idle >= write_timeout {
                            logger::log_warning(&format!(
                                "Client {peer_addr} accepted no data for {} seconds, dropping connection",
                                idle.as_secs()
                            ));
                            break None;
                        }
                    } else if !closing && !keep_alive.is_zero() && idle >= keep_alive {
                        logger::log_debug(&format!("Closing idle connection from {peer_addr}"));
                        conn.as_mut().graceful_shutdown();
                        closing = true;
                    }
                }
            }
        };

        if let Some(Err(err)) = result {
            logger::log_connection_error(&err);
        }
        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}
