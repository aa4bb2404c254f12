//! Outbound transport: dialing, writing, and the out-of-band breaker used
//! to interrupt a blocked write at close.

use crate::config::{ForwarderConfig, Protocol};
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, UdpSocket};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("tls: {0}")]
    Tls(String),

    #[error("bad target {0:?}: expected host:port")]
    BadTarget(String),

    #[error("unix socket {0:?} does not exist")]
    NoSocket(String),
}

/// One live connection owned by the worker thread.
#[derive(Debug)]
pub enum Conn {
    Tcp(TcpStream),
    Tls(Box<native_tls::TlsStream<TcpStream>>),
    Udp(UdpSocket),
    #[cfg(unix)]
    Unix(UnixStream),
}

/// A cloned raw stream the closer can shut down to break a blocked write.
pub enum Breaker {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Breaker {
    pub fn shutdown(&self) {
        match self {
            Breaker::Tcp(s) => {
                let _ = s.shutdown(Shutdown::Both);
            }
            #[cfg(unix)]
            Breaker::Unix(s) => {
                let _ = s.shutdown(Shutdown::Both);
            }
        }
    }
}

impl Conn {
    pub fn dial(cfg: &ForwarderConfig) -> Result<Conn, DialError> {
        match cfg.protocol {
            Protocol::Tcp => Ok(Conn::Tcp(TcpStream::connect(&cfg.target)?)),
            Protocol::Udp => {
                let sock = UdpSocket::bind("0.0.0.0:0")?;
                sock.connect(&cfg.target)?;
                Ok(Conn::Udp(sock))
            }
            Protocol::Tls => {
                let host = cfg
                    .target
                    .rsplit_once(':')
                    .map(|(h, _)| h)
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| DialError::BadTarget(cfg.target.clone()))?;
                let connector = native_tls::TlsConnector::builder()
                    .danger_accept_invalid_certs(cfg.insecure_skip_tls_verify)
                    .build()
                    .map_err(|e| DialError::Tls(e.to_string()))?;
                let tcp = TcpStream::connect(&cfg.target)?;
                let tls = connector
                    .connect(host, tcp)
                    .map_err(|e| DialError::Tls(e.to_string()))?;
                Ok(Conn::Tls(Box::new(tls)))
            }
            Protocol::Unix => dial_unix(&cfg.target),
        }
    }

    /// Raw-stream clone for interrupting writes; datagram transports need
    /// none, they never block meaningfully.
    pub fn breaker(&self) -> Option<Breaker> {
        match self {
            Conn::Tcp(s) => s.try_clone().ok().map(Breaker::Tcp),
            Conn::Tls(s) => s.get_ref().try_clone().ok().map(Breaker::Tcp),
            Conn::Udp(_) => None,
            #[cfg(unix)]
            Conn::Unix(s) => s.try_clone().ok().map(Breaker::Unix),
        }
    }
}

#[cfg(unix)]
fn dial_unix(target: &str) -> Result<Conn, DialError> {
    if !std::path::Path::new(target).exists() {
        return Err(DialError::NoSocket(target.to_string()));
    }
    Ok(Conn::Unix(UnixStream::connect(target)?))
}

#[cfg(not(unix))]
fn dial_unix(target: &str) -> Result<Conn, DialError> {
    Err(DialError::NoSocket(target.to_string()))
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Conn::Tcp(s) => s.write(buf),
            Conn::Tls(s) => s.write(buf),
            Conn::Udp(s) => s.send(buf),
            #[cfg(unix)]
            Conn::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Conn::Tcp(s) => s.flush(),
            Conn::Tls(s) => s.flush(),
            Conn::Udp(_) => Ok(()),
            #[cfg(unix)]
            Conn::Unix(s) => s.flush(),
        }
    }
}
