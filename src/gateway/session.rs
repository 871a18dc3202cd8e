//! Single-owner session actor for the gateway admin interface.
//!
//! The admin protocol has no request/response correlation, so exactly one
//! command may be outstanding per session. One actor task owns the TCP
//! connection; callers queue requests over an mpsc channel and the actor
//! services them strictly in order. A hung or slow gateway therefore delays
//! only this queue, never unrelated reads of cached local state.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::telemetry::metrics;

use super::{CommandChannel, GatewayError};

/// Prompt string marking the end of a command's response
pub const SENTINEL: &str = "jcli : ";

const AUTH_PROMPT: &str = "Authentication required.";
const PASSWORD_PROMPT: &str = "Password:";
const WELCOME_MARKER: &str = "Welcome to Jasmin";

/// Queue depth for pending commands
const REQUEST_QUEUE_CAPACITY: usize = 64;

enum Request {
    Execute {
        command: String,
        reply: oneshot::Sender<Result<String, GatewayError>>,
    },
    IsConnected {
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable handle to the session actor.
#[derive(Clone)]
pub struct JcliHandle {
    tx: mpsc::Sender<Request>,
}

#[async_trait]
impl CommandChannel for JcliHandle {
    async fn execute(&self, command: &str) -> Result<String, GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Execute {
                command: command.to_string(),
                reply,
            })
            .await
            .map_err(|_| GatewayError::ChannelClosed)?;
        rx.await.map_err(|_| GatewayError::ChannelClosed)?
    }

    async fn is_connected(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Request::IsConnected { reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

/// The session actor. Owns the one persistent connection.
pub struct JcliSession {
    config: GatewayConfig,
    conn: Option<Conn>,
}

impl JcliSession {
    /// Spawn the actor and return a handle to it.
    ///
    /// The session connects lazily on the first command; the actor stops
    /// when every handle has been dropped.
    pub fn spawn(config: GatewayConfig) -> JcliHandle {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let session = Self { config, conn: None };
        tokio::spawn(session.run(rx));
        JcliHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        while let Some(request) = rx.recv().await {
            match request {
                Request::Execute { command, reply } => {
                    let result = self.execute(&command).await;
                    let outcome = match &result {
                        Ok(_) => "ok",
                        Err(GatewayError::Timeout { .. }) => "timeout",
                        Err(_) => "error",
                    };
                    metrics::gateway_commands_total()
                        .with_label_values(&[outcome])
                        .inc();
                    let _ = reply.send(result);
                }
                Request::IsConnected { reply } => {
                    let _ = reply.send(self.conn.is_some());
                }
            }
        }
        self.disconnect();
        debug!("gateway session actor stopped");
    }

    /// Execute one command, reconnecting transparently once.
    async fn execute(&mut self, command: &str) -> Result<String, GatewayError> {
        if self.conn.is_none() {
            self.connect().await?;
        }

        match self.send_command(command).await {
            Ok(response) => Ok(response),
            Err(err) => {
                // The channel is presumed desynchronized: discard it and
                // retry the command once on a fresh session.
                warn!(command, error = %err, "command failed, reconnecting");
                self.disconnect();
                metrics::gateway_reconnects_total().inc();
                self.connect().await?;
                self.send_command(command).await.inspect_err(|_| {
                    self.disconnect();
                })
            }
        }
    }

    fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            metrics::gateway_connected().set(0);
        }
    }

    /// Establish the session: TCP connect, then the login handshake
    /// (auth prompt, username, password prompt, password, welcome banner).
    async fn connect(&mut self) -> Result<(), GatewayError> {
        let address = format!("{}:{}", self.config.host, self.config.telnet_port);

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| GatewayError::Connection(format!("connect to {address} timed out")))?
            .map_err(|e| GatewayError::Connection(format!("connect to {address}: {e}")))?;

        let mut conn = Conn::new(stream);
        let login_timeout = self.config.connect_timeout;

        conn.read_until(AUTH_PROMPT, login_timeout)
            .await
            .map_err(|e| e.into_auth("authentication prompt not observed"))?;
        conn.write_line(&self.config.username)
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;
        conn.read_until(PASSWORD_PROMPT, login_timeout)
            .await
            .map_err(|e| e.into_auth("password prompt not observed"))?;
        conn.write_line(&self.config.password)
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        let banner = conn
            .read_until(SENTINEL, login_timeout)
            .await
            .map_err(|e| e.into_auth("welcome banner not observed"))?;

        if !banner.contains(WELCOME_MARKER) {
            return Err(GatewayError::Authentication(
                "login rejected (no welcome banner)".to_string(),
            ));
        }

        info!(address = %address, "gateway session established");
        metrics::gateway_connected().set(1);
        self.conn = Some(conn);
        Ok(())
    }

    /// Send one command line and read until the prompt sentinel.
    async fn send_command(&mut self, command: &str) -> Result<String, GatewayError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| GatewayError::Connection("not connected".to_string()))?;

        conn.write_line(command)
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        match conn.read_until(SENTINEL, self.config.response_timeout).await {
            Ok(raw) => Ok(strip_sentinel(&raw)),
            Err(ReadError::Timeout) => Err(GatewayError::Timeout {
                command: command.to_string(),
            }),
            Err(ReadError::Io(e)) => Err(GatewayError::Connection(e.to_string())),
        }
    }
}

/// Remove the trailing prompt sentinel from a raw response block.
fn strip_sentinel(raw: &str) -> String {
    raw.strip_suffix(SENTINEL).unwrap_or(raw).trim().to_string()
}

enum ReadError {
    Timeout,
    Io(std::io::Error),
}

impl ReadError {
    fn into_auth(self, context: &str) -> GatewayError {
        match self {
            ReadError::Timeout => GatewayError::Authentication(context.to_string()),
            ReadError::Io(e) => GatewayError::Connection(format!("{context}: {e}")),
        }
    }
}

/// Buffered connection with read-until-marker support.
///
/// Bytes past a found marker are retained for the next read, so a response
/// that arrives together with the next prompt is not lost.
struct Conn {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl Conn {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await
    }

    async fn read_until(&mut self, marker: &str, limit: Duration) -> Result<String, ReadError> {
        let deadline = Instant::now() + limit;
        let marker_bytes = marker.as_bytes();

        loop {
            if let Some(pos) = find_subsequence(&self.buffer, marker_bytes) {
                let end = pos + marker_bytes.len();
                let chunk: Vec<u8> = self.buffer.drain(..end).collect();
                return Ok(String::from_utf8_lossy(&chunk).into_owned());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ReadError::Timeout);
            }

            let mut buf = [0u8; 4096];
            let n = timeout(remaining, self.stream.read(&mut buf))
                .await
                .map_err(|_| ReadError::Timeout)?
                .map_err(ReadError::Io)?;

            if n == 0 {
                return Err(ReadError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "gateway closed the connection",
                )));
            }

            self.buffer.extend_from_slice(&buf[..n]);
        }
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    /// Fake gateway behavior per connection
    #[derive(Clone, Copy, PartialEq)]
    enum Script {
        /// Normal login, canned responses
        Normal,
        /// Login succeeds but without the welcome banner
        RejectLogin,
        /// Normal login, but the first command gets no response (then the
        /// connection behaves normally for later connections)
        HangFirstCommand,
    }

    /// Scripted jcli server. Returns the address and a connection counter.
    async fn spawn_fake_gateway(script: Script) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let nth = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(stream, script, nth));
            }
        });

        (address, connections)
    }

    async fn serve_connection(stream: TcpStream, script: Script, nth: usize) {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"Authentication required.\n").await.unwrap();
        let _username = lines.next_line().await.unwrap();
        writer.write_all(b"Password:").await.unwrap();
        let _password = lines.next_line().await.unwrap();

        if script == Script::RejectLogin {
            writer
                .write_all(b"Incorrect password.\njcli : ")
                .await
                .unwrap();
            return;
        }

        writer
            .write_all(b"Welcome to Jasmin 0.10 console\njcli : ")
            .await
            .unwrap();

        let mut first_command = true;
        while let Ok(Some(line)) = lines.next_line().await {
            if script == Script::HangFirstCommand && nth == 0 && first_command {
                // Swallow the command, never send the sentinel
                first_command = false;
                continue;
            }
            first_command = false;

            let response: &[u8] = match line.trim() {
                "smppccm -l" => b"#Connector id  Status   Session    Details\nconn1 started BOUND_TRX 10.0.0.1:2775\njcli : ",
                "stats --all" => b"total_messages_sent: 42\njcli : ",
                _ => b"Unknown command\njcli : ",
            };
            writer.write_all(response).await.unwrap();
        }
    }

    fn config(address: SocketAddr, response_timeout: Duration) -> GatewayConfig {
        GatewayConfig {
            host: address.ip().to_string(),
            telnet_port: address.port(),
            http_port: 0,
            username: "jcliadmin".into(),
            password: "jclipwd".into(),
            connect_timeout: Duration::from_secs(2),
            response_timeout,
            http_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_login_and_execute() {
        let (address, _) = spawn_fake_gateway(Script::Normal).await;
        let handle = JcliSession::spawn(config(address, Duration::from_secs(2)));

        let response = handle.execute("smppccm -l").await.unwrap();
        assert!(response.contains("conn1"));
        // Sentinel is stripped from the returned block
        assert!(!response.contains(SENTINEL));
        assert!(handle.is_connected().await);
    }

    #[tokio::test]
    async fn test_rejected_login_is_authentication_error() {
        let (address, _) = spawn_fake_gateway(Script::RejectLogin).await;
        let handle = JcliSession::spawn(config(address, Duration::from_secs(2)));

        let err = handle.execute("stats --all").await.unwrap_err();
        assert!(matches!(err, GatewayError::Authentication(_)));
        assert!(!handle.is_connected().await);
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_connection_error() {
        // Reserve a port and close the listener so nothing is listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let handle = JcliSession::spawn(config(address, Duration::from_millis(200)));
        let err = handle.execute("stats --all").await.unwrap_err();
        assert!(matches!(err, GatewayError::Connection(_)));
    }

    #[tokio::test]
    async fn test_missing_sentinel_triggers_reconnect_and_retry() {
        let (address, connections) = spawn_fake_gateway(Script::HangFirstCommand).await;
        let handle = JcliSession::spawn(config(address, Duration::from_millis(200)));

        // First attempt times out waiting for the sentinel; the session
        // reconnects and the retry succeeds on the fresh connection.
        let response = handle.execute("stats --all").await.unwrap();
        assert!(response.contains("total_messages_sent"));
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_commands_serialize_in_order() {
        let (address, connections) = spawn_fake_gateway(Script::Normal).await;
        let handle = JcliSession::spawn(config(address, Duration::from_secs(2)));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.execute("stats --all").await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        // All commands shared the single session
        assert_eq!(connections.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_strip_sentinel() {
        assert_eq!(strip_sentinel("line1\nline2\njcli : "), "line1\nline2");
        assert_eq!(strip_sentinel("no sentinel"), "no sentinel");
    }

    #[test]
    fn test_find_subsequence() {
        assert_eq!(find_subsequence(b"abc jcli : ", b"jcli : "), Some(4));
        assert_eq!(find_subsequence(b"abc", b"jcli : "), None);
        assert_eq!(find_subsequence(b"", b"x"), None);
    }
}
