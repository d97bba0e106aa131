//! Error types for the livertp library.

/// Errors that can occur while setting up or running a stream.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Setup**: [`InvalidConfig`](Self::InvalidConfig): rejected
///   [`StreamConfig`](crate::StreamConfig) values.
/// - **Transport**: [`Io`](Self::Io): socket/network failures.
/// - **Source**: [`Source`](Self::Source): a non-terminal read failure
///   from the [`ByteSource`](crate::ByteSource). The pipeline logs and
///   retries these.
/// - **Server**: [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum LiveRtpError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transient read failure from the byte source (not end-of-stream).
    #[error("source read failed: {0}")]
    Source(#[source] std::io::Error),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// [`SdpServer::start`](crate::SdpServer::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Convenience alias for `Result<T, LiveRtpError>`.
pub type Result<T> = std::result::Result<T, LiveRtpError>;
