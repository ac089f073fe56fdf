//! Errors.

use std::io;
use std::net::SocketAddr;

/// Top-level error type threaded through `Result` return values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Spool(#[from] SpoolError),
    #[error(transparent)]
    Datastore(#[from] DatastoreError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not open config file '{path}': {source}")]
    Open { path: String, source: io::Error },
    #[error("invalid value for key '{key}': {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("missing required key '{0}'")]
    MissingKey(String),
}

/// Verdict returned by the frame codec's `validate` step (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    BadHeader,
    BadControlCode,
    BadCrc,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("short datagram: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },
    #[error("bad frame header {0:#06x}")]
    BadHeader(u16),
    #[error("bad control code {0:#06x}")]
    BadControlCode(u16),
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    BadCrc { expected: u16, actual: u16 },
}

#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),
    #[error("client '{0}' was not found in the configuration table")]
    ClientNotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("accept failed: {0}")]
    Accept(io::Error),
    #[error("client '{name}' is already online")]
    DuplicateOnline { name: String },
    #[error("send to {addr} failed: {source}")]
    Send { addr: SocketAddr, source: io::Error },
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("unable to resolve server host '{0}'")]
    UnresolvedHost(String),
    #[error("registration with the server failed: {0}")]
    Register(io::Error),
    #[error("gpsd stream closed unexpectedly: {0}")]
    GpsdClosed(io::Error),
}
