//! Client helper for talking to the tickclock daemon.
//!
//! The daemon owns the ledgers. Every command is one request over the unix
//! socket; read-only requests are retried once, mutating ones never are.

use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tickclock_core::StorageConfig;
use tickclock_daemon_protocol::{Action, Request, Response, MAX_REQUEST_BYTES};
use ulid::Ulid;

const SOCKET_ENV: &str = "TICKCLOCK_DAEMON_SOCKET";
const READ_TIMEOUT_MS: u64 = 5_000;
const WRITE_TIMEOUT_MS: u64 = 600;
const RETRY_DELAY_MS: u64 = 50;

pub struct DaemonClient {
    socket: PathBuf,
}

impl DaemonClient {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            socket: socket_path()?,
        })
    }

    #[cfg(test)]
    pub fn with_socket(socket: PathBuf) -> Self {
        Self { socket }
    }

    /// Sends one action and returns the response data, turning daemon
    /// errors into `code: message` strings.
    pub fn call(&self, action: Action, params: Option<Value>) -> Result<Value, String> {
        let request = Request::new(action, Some(make_request_id()), params);
        let response = if action.is_mutating() {
            self.send_request(&request)?
        } else {
            self.send_with_retry(&request)?
        };

        if response.ok {
            Ok(response.data.unwrap_or(Value::Null))
        } else {
            Err(response
                .error
                .map(|err| format!("{}: {}", err.code, err.message))
                .unwrap_or_else(|| "Unknown daemon error".to_string()))
        }
    }

    fn send_with_retry(&self, request: &Request) -> Result<Response, String> {
        match self.send_request(request) {
            Ok(response) => Ok(response),
            Err(err) => {
                tracing::warn!(error = %err, action = ?request.action, "Failed to reach daemon");
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                self.send_request(request).map_err(|retry_err| {
                    tracing::warn!(
                        error = %retry_err,
                        action = ?request.action,
                        "Retry failed reaching daemon"
                    );
                    retry_err
                })
            }
        }
    }

    fn send_request(&self, request: &Request) -> Result<Response, String> {
        let mut stream = UnixStream::connect(&self.socket).map_err(|err| {
            format!(
                "Failed to connect to daemon socket {}: {}",
                self.socket.display(),
                err
            )
        })?;
        let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
        let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

        serde_json::to_writer(&mut stream, request)
            .map_err(|err| format!("Failed to write request: {}", err))?;
        stream
            .write_all(b"\n")
            .map_err(|err| format!("Failed to flush request: {}", err))?;
        stream.flush().ok();

        read_response(&mut stream)
    }
}

fn socket_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    StorageConfig::from_env()
        .map(|storage| storage.socket_file())
        .map_err(String::from)
}

fn read_response(stream: &mut UnixStream) -> Result<Response, String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err("Response exceeded maximum size".to_string());
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err("Timed out waiting for daemon response".to_string());
            }
            Err(err) => return Err(format!("Failed to read response: {}", err)),
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err("Daemon response was empty".to_string());
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| format!("Failed to parse response JSON: {}", err))
}

fn make_request_id() -> String {
    format!("cli-{}", Ulid::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn read_request(stream: &mut UnixStream) -> Option<Request> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    if buffer.contains(&b'\n') {
                        break;
                    }
                }
                Err(_) => return None,
            }
        }
        let newline_index = buffer.iter().position(|b| *b == b'\n')?;
        serde_json::from_slice(&buffer[..newline_index]).ok()
    }

    /// Serves `responses` in order, one per connection, and counts attempts.
    fn serve(
        responses: Vec<Option<Response>>,
    ) -> (tempfile::TempDir, PathBuf, Arc<AtomicUsize>, std::thread::JoinHandle<()>) {
        let dir = tempfile::Builder::new()
            .prefix("tickclock-cli")
            .tempdir_in("/tmp")
            .unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        listener.set_nonblocking(true).unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);
        let server = std::thread::spawn(move || {
            let start = Instant::now();
            let mut pending = responses.into_iter();
            while start.elapsed() < Duration::from_secs(5) {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        stream.set_nonblocking(false).unwrap();
                        attempts_clone.fetch_add(1, Ordering::SeqCst);
                        let request = read_request(&mut stream);
                        match pending.next() {
                            Some(Some(mut response)) => {
                                response.id = request.and_then(|request| request.id);
                                let mut payload = serde_json::to_vec(&response).unwrap();
                                payload.push(b'\n');
                                let _ = stream.write_all(&payload);
                            }
                            // Drop the connection without answering.
                            Some(None) => {}
                            None => break,
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
                if attempts_clone.load(Ordering::SeqCst) >= 2 {
                    break;
                }
            }
        });
        (dir, socket_path, attempts, server)
    }

    #[test]
    fn read_only_call_retries_after_lost_response() {
        let (_dir, socket, attempts, server) = serve(vec![
            None,
            Some(Response::ok(None, serde_json::json!({"status": "ok"}))),
        ]);

        let client = DaemonClient::with_socket(socket);
        let data = client.call(Action::GetHealth, None).unwrap();
        server.join().unwrap();

        assert_eq!(data["status"], "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn mutating_call_is_not_retried() {
        let (_dir, socket, attempts, server) = serve(vec![
            None,
            Some(Response::success(None, true)),
        ]);

        let client = DaemonClient::with_socket(socket);
        let result = client.call(
            Action::AddTimeManually,
            Some(serde_json::json!({"itemId": "T1", "seconds": 60})),
        );
        assert!(result.is_err());

        // Let the server loop time out on its own.
        drop(client);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        drop(server);
    }

    #[test]
    fn daemon_error_is_reported_with_its_code() {
        let (_dir, socket, _attempts, server) = serve(vec![Some(Response::error(
            None,
            "scan_error",
            "board snapshot is not valid JSON",
        ))]);

        let client = DaemonClient::with_socket(socket);
        let err = client.call(Action::RefreshTimers, None).unwrap_err();
        drop(server);

        assert_eq!(err, "scan_error: board snapshot is not valid JSON");
    }

    #[test]
    fn missing_socket_is_an_error() {
        let client = DaemonClient::with_socket(PathBuf::from("/tmp/tickclock-missing/daemon.sock"));
        let err = client.call(Action::GetHealth, None).unwrap_err();
        assert!(err.contains("Failed to connect"));
    }
}
