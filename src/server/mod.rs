// Server module entry point
// Accept loop, connection handling and graceful shutdown

pub mod connection;
pub mod listener;
pub mod signal;

pub use listener::create_listener;
pub use signal::shutdown_signal;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::config::AppState;
use crate::logger;
use connection::accept_connection;

/// Poll interval while waiting for open connections to finish
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Accept connections until `shutdown` resolves, then drain.
///
/// After shutdown no new connections are accepted. Open connections get up to
/// the configured write timeout to finish before the loop returns.
pub async fn run(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
    let active_connections = Arc::new(AtomicUsize::new(0));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections);
                    }
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }
            () = &mut shutdown => {
                logger::log_server_stop();
                break;
            }
        }
    }
    drop(listener);

    let deadline = tokio::time::Instant::now()
        + Duration::from_secs(state.config.performance.write_timeout);
    loop {
        let remaining = active_connections.load(Ordering::SeqCst);
        if remaining == 0 {
            logger::log_info("All connections closed");
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            logger::log_warning(&format!(
                "Shutdown deadline reached with {remaining} connection(s) still open"
            ));
            break;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Mount};
    use http_body_util::{BodyExt, Empty};
    use hyper::body::Bytes;
    use hyper::Request;
    use hyper_util::rt::TokioIo;
    use std::path::Path;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    struct TestServer {
        addr: std::net::SocketAddr,
        stop: oneshot::Sender<()>,
        handle: JoinHandle<std::io::Result<()>>,
    }

    impl TestServer {
        async fn stop(self) {
            self.stop.send(()).unwrap();
            self.handle.await.unwrap().unwrap();
        }
    }

    fn start(root: &Path, tune: impl FnOnce(&mut Config)) -> TestServer {
        let mut config = Config::load_from("__missing_config_file__").unwrap();
        config.logging.access_log = false;
        config.static_files.root_directory = root.display().to_string();
        config.static_files.mounts = vec![Mount {
            path: "/public/".to_string(),
            prefix: "public".to_string(),
            module: None,
            content_type: None,
        }];
        tune(&mut config);
        let state = Arc::new(AppState::new(&config).unwrap());

        let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(run(listener, state, async {
            let _ = stop_rx.await;
        }));
        TestServer { addr, stop, handle }
    }

    fn header_len(response: &[u8]) -> usize {
        response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|pos| pos + 4)
            .unwrap()
    }

    #[tokio::test]
    async fn test_serves_over_tcp_and_shuts_down() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("public")).unwrap();
        std::fs::write(root.path().join("public/hello.txt"), "hello").unwrap();
        let server = start(root.path(), |_| {});

        let stream = TcpStream::connect(server.addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        let client = tokio::spawn(conn);

        let req = Request::get("/public/hello.txt")
            .header("Host", server.addr.to_string())
            .body(Empty::<Bytes>::new())
            .unwrap();
        let response = sender.send_request(req).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["Content-Type"], "text/plain; charset=utf-8");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");

        drop(sender);
        let _ = client.await;
        server.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_download_outlives_timeouts() {
        const SIZE: usize = 48 << 20;
        const CHUNK: usize = 1 << 20;

        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("public")).unwrap();
        std::fs::write(root.path().join("public/big.bin"), vec![7u8; SIZE]).unwrap();
        let server = start(root.path(), |config| {
            config.performance.read_timeout = 1;
            config.performance.write_timeout = 1;
            config.performance.keep_alive_timeout = 1;
        });

        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        stream
            .write_all(b"GET /public/big.bin HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        // Read about 1 MiB every 40 ms until the server closes
        let started = std::time::Instant::now();
        let mut head = Vec::new();
        let mut total = 0;
        let mut buf = vec![0u8; CHUNK];
        'download: loop {
            let mut chunk = 0;
            while chunk < CHUNK {
                let n = stream.read(&mut buf[chunk..]).await.unwrap();
                if n == 0 {
                    total += chunk;
                    break 'download;
                }
                if head.len() < 4096 {
                    head.extend_from_slice(&buf[chunk..chunk + n]);
                }
                chunk += n;
            }
            total += chunk;
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        assert!(started.elapsed() > Duration::from_secs(1));
        assert!(head.starts_with(b"HTTP/1.1 200"));
        assert_eq!(total - header_len(&head), SIZE);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_idle_keep_alive_connection_is_closed() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("public")).unwrap();
        std::fs::write(root.path().join("public/hello.txt"), "hello").unwrap();
        let server = start(root.path(), |config| {
            config.performance.keep_alive_timeout = 1;
        });

        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        stream
            .write_all(b"GET /public/hello.txt HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        while response.windows(4).all(|w| w != b"\r\n\r\n")
            || response.len() < header_len(&response) + 5
        {
            let n = stream.read(&mut buf).await.unwrap();
            assert_ne!(n, 0, "connection closed before the response was complete");
            response.extend_from_slice(&buf[..n]);
        }
        assert!(response.ends_with(b"hello"));

        // Nothing else is sent; the server hangs up once the connection idles
        let closed = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed, 0);
        server.stop().await;
    }
}
