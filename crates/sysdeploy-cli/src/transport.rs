//! Socket transport shared by the bus connection and transaction peers.
//!
//! Both speak newline-delimited JSON over a stream socket. [`Connection`]
//! hides whether that socket is TCP or Unix so the protocol code above it
//! stays transport agnostic.

use std::io::{self, BufRead, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sysdeploy_config::SocketEndpoint;
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const EMPTY_LINE_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub(crate) enum TransportError {
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve { endpoint: String, source: io::Error },
    #[error("failed to connect to {endpoint}: {source}")]
    Connect { endpoint: String, source: io::Error },
    #[cfg(not(unix))]
    #[error("platform does not support Unix sockets: {0}")]
    UnsupportedUnixTransport(String),
    #[error("failed to serialise message: {0}")]
    Serialise(serde_json::Error),
    #[error("failed to send message: {0}")]
    Send(io::Error),
    #[error("failed to read message: {0}")]
    Receive(io::Error),
    #[error("failed to parse message {line:?}: {source}")]
    Parse {
        line: String,
        source: serde_json::Error,
    },
    #[error("received {EMPTY_LINE_LIMIT} consecutive empty lines")]
    EmptyLines,
}

impl TransportError {
    /// Returns `true` when a read gave up because its timeout elapsed.
    pub(crate) fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Receive(source)
                if matches!(source.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

#[derive(Debug)]
pub(crate) enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    /// Closes both directions, waking any thread blocked reading a clone.
    pub(crate) fn shutdown(&self) {
        let result = match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        if let Err(error) = result
            && error.kind() != io::ErrorKind::NotConnected
        {
            tracing::debug!(target: "sysdeploy::transport", %error, "socket shutdown failed");
        }
    }

    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

pub(crate) fn connect(endpoint: &SocketEndpoint) -> Result<Connection, TransportError> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let endpoint_display = endpoint.to_string();
            let address =
                resolve_tcp_address(host, *port).map_err(|error| TransportError::Resolve {
                    endpoint: endpoint_display.clone(),
                    source: error,
                })?;

            TcpStream::connect_timeout(&address, CONNECTION_TIMEOUT)
                .map(Connection::Tcp)
                .map_err(|source| TransportError::Connect {
                    endpoint: endpoint_display,
                    source,
                })
        }
        SocketEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                connect_unix(path.as_str()).map_err(|source| TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })
            }

            #[cfg(not(unix))]
            {
                let _ = path;
                Err(TransportError::UnsupportedUnixTransport(
                    endpoint.to_string(),
                ))
            }
        }
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str) -> io::Result<Connection> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, CONNECTION_TIMEOUT)?;
    let stream = UnixStream::from(std::os::fd::OwnedFd::from(socket));
    Ok(Connection::Unix(stream))
}

/// Writes `message` as one JSON line and flushes.
pub(crate) fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), TransportError>
where
    W: Write,
    T: Serialize,
{
    let mut payload = serde_json::to_vec(message).map_err(TransportError::Serialise)?;
    payload.push(b'\n');
    writer.write_all(&payload).map_err(TransportError::Send)?;
    writer.flush().map_err(TransportError::Send)
}

/// Reads the next JSON line, skipping blank keep-alive lines.
///
/// Returns `Ok(None)` once the peer closes the stream.
pub(crate) fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, TransportError>
where
    R: BufRead,
    T: DeserializeOwned,
{
    let mut line = String::new();
    let mut consecutive_empty_lines = 0;
    loop {
        line.clear();
        if reader.read_line(&mut line).map_err(TransportError::Receive)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            consecutive_empty_lines += 1;
            if consecutive_empty_lines >= EMPTY_LINE_LIMIT {
                return Err(TransportError::EmptyLines);
            }
            continue;
        }
        return serde_json::from_str(trimmed)
            .map(Some)
            .map_err(|source| TransportError::Parse {
                line: trimmed.to_owned(),
                source,
            });
    }
}
