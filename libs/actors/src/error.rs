//! Runtime Error Types
//!
//! [`CellError`] is what kernel operations return. Routing failures on a
//! first send come back to the caller as [`CellError::NoRoute`]; failures
//! further along the path travel back to the original sender as a
//! [`RemoteError`] payload and resurface through [`CellError::from_remote`].

use cell_codec::CodecError;
use cell_types::{RemoteError, RemoteErrorKind, Uoid};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CellError {
    /// No route leads to the destination
    #[error("No route to {target} for {uoid} (path {path}): {reason}")]
    NoRoute {
        uoid: Uoid,
        target: String,
        path: String,
        reason: String,
    },

    /// Payload encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Duplicate route: {route}")]
    DuplicateRoute { route: String },

    #[error("Route not found: {route}")]
    RouteNotFound { route: String },

    /// Request expired without an answer
    #[error("Request {uoid} timed out after {timeout_ms}ms")]
    Timeout { uoid: Uoid, timeout_ms: u64 },

    /// A cell handler failed while processing a message
    #[error("Cell {cell} failed: {message}")]
    ActorPanic { cell: String, message: String },

    #[error("Cell not found: {0}")]
    CellNotFound(String),

    #[error("Cell already exists: {0}")]
    DuplicateCell(String),

    /// Operation not allowed in the cell's lifecycle state
    #[error("Cell {cell} cannot {operation} while {state}")]
    InvalidState {
        cell: String,
        operation: &'static str,
        state: String,
    },

    #[error("Cell {cell} failed to start: {message}")]
    StartupFailed { cell: String, message: String },

    #[error("No cell factory registered for type {0}")]
    UnknownCellType(String),

    /// Error reported by another cell or domain
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    #[error("Worker pool {0} is shut down")]
    PoolClosed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CellError {
    pub fn no_route(uoid: Uoid, target: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        CellError::NoRoute {
            uoid,
            target: target.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Error for an error payload received in a reply
    pub fn from_remote(error: RemoteError) -> Self {
        CellError::Remote(error)
    }

    /// Kind of the remote error, if this error came from a reply
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            CellError::Remote(remote) => Some(remote.kind),
            _ => None,
        }
    }

    /// Payload to send back when this error ends a request
    pub fn to_remote(&self) -> RemoteError {
        let kind = match self {
            CellError::NoRoute { .. } => RemoteErrorKind::NoRoute,
            CellError::Codec(e) => e.remote_kind(),
            CellError::Timeout { .. } => RemoteErrorKind::Timeout,
            CellError::ActorPanic { .. } => RemoteErrorKind::ActorPanic,
            CellError::Remote(remote) => return remote.clone(),
            _ => RemoteErrorKind::Application,
        };
        RemoteError::new(kind, self.to_string())
    }

    /// True for local and remote routing failures
    pub fn is_no_route(&self) -> bool {
        match self {
            CellError::NoRoute { .. } => true,
            CellError::Remote(remote) => remote.kind == RemoteErrorKind::NoRoute,
            _ => false,
        }
    }

    /// Error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            CellError::NoRoute { .. } => "routing",
            CellError::Codec(_) => "codec",
            CellError::DuplicateRoute { .. } | CellError::RouteNotFound { .. } => "route_table",
            CellError::Timeout { .. } => "timeout",
            CellError::ActorPanic { .. } => "actor",
            CellError::CellNotFound(_) | CellError::DuplicateCell(_) | CellError::UnknownCellType(_) => "registry",
            CellError::InvalidState { .. } | CellError::StartupFailed { .. } => "lifecycle",
            CellError::Remote(_) => "remote",
            CellError::PoolClosed(_) => "executor",
            CellError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, CellError>;
