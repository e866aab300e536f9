use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BeanstalkError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out")]
    Timeout,
    #[error("protocol error: unexpected reply '{0}'")]
    Protocol(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Client for a single beanstalkd server.
///
/// Holds one TCP connection behind a mutex: workers issue requests
/// concurrently, but wire round-trips are serialized here, which is what
/// bounds the load the exporter can put on the server. A failed round-trip
/// drops the connection; the next request redials.
pub struct BeanstalkdClient {
    address: String,
    timeout: Option<Duration>,
    conn: Mutex<Option<BufStream<TcpStream>>>,
}

impl BeanstalkdClient {
    /// `timeout` bounds each connect and each request/response round-trip.
    /// `None` leaves calls unbounded.
    pub fn new(address: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            address: address.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Names of all tubes currently known to the server.
    pub async fn list_tubes(&self) -> Result<Vec<String>, BeanstalkError> {
        let body = self.request("list-tubes\r\n").await?;
        Ok(parse_list(&body))
    }

    /// Server-wide statistics as raw `field -> value` strings.
    pub async fn stats(&self) -> Result<HashMap<String, String>, BeanstalkError> {
        let body = self.request("stats\r\n").await?;
        Ok(parse_dict(&body))
    }

    /// Per-tube statistics. `NOT_FOUND` (tube vanished since listing) maps
    /// to `BeanstalkError::NotFound`.
    pub async fn stats_tube(&self, tube: &str) -> Result<HashMap<String, String>, BeanstalkError> {
        let command = format!("stats-tube {}\r\n", tube);
        let body = self.request(&command).await?;
        Ok(parse_dict(&body))
    }

    async fn request(&self, command: &str) -> Result<String, BeanstalkError> {
        let mut guard = self.conn.lock().await;

        let round_trip = Self::round_trip(&self.address, &mut guard, command);
        let result = match self.timeout {
            Some(d) => match tokio::time::timeout(d, round_trip).await {
                Ok(res) => res,
                Err(_) => Err(BeanstalkError::Timeout),
            },
            None => round_trip.await,
        };

        // Drop the connection on wire-level failures so the next request
        // redials instead of reading a desynchronized stream. NOT_FOUND is
        // a complete reply; the connection stays usable.
        if matches!(
            result,
            Err(BeanstalkError::Io(_) | BeanstalkError::Timeout | BeanstalkError::Protocol(_))
        ) {
            *guard = None;
        }
        result
    }

    async fn round_trip(
        address: &str,
        conn: &mut Option<BufStream<TcpStream>>,
        command: &str,
    ) -> Result<String, BeanstalkError> {
        let stream = match conn.take() {
            Some(stream) => conn.insert(stream),
            None => {
                debug!("Connecting to beanstalkd at {}", address);
                let stream = TcpStream::connect(address).await?;
                conn.insert(BufStream::new(stream))
            }
        };

        stream.write_all(command.as_bytes()).await?;
        stream.flush().await?;

        let mut status = String::new();
        let n = stream.read_line(&mut status).await?;
        if n == 0 {
            return Err(BeanstalkError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }
        let status = status.trim_end();

        if let Some(len) = status.strip_prefix("OK ") {
            let len: usize = len
                .parse()
                .map_err(|_| BeanstalkError::Protocol(status.to_string()))?;
            let mut body = vec![0u8; len + 2];
            stream.read_exact(&mut body).await?;
            body.truncate(len);
            String::from_utf8(body).map_err(|_| BeanstalkError::Protocol(status.to_string()))
        } else if status == "NOT_FOUND" {
            Err(BeanstalkError::NotFound(command.trim_end().to_string()))
        } else {
            Err(BeanstalkError::Protocol(status.to_string()))
        }
    }
}

/// Parse a YAML list body (`- name` per line) from `list-tubes`.
fn parse_list(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("- "))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Parse a YAML dict body (`key: value` per line) from `stats`/`stats-tube`.
fn parse_dict(body: &str) -> HashMap<String, String> {
    body.lines()
        .filter(|line| !line.starts_with("---"))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}
