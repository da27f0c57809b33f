use std::io;

use crate::snapshot::OutboundPoint;

/// An error raised by a [`Transport`] for a single point.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The point could not be written.
    #[error("failed to send metric")]
    Io(#[from] io::Error),
    /// The transport refused the point.
    #[error("metric rejected: {0}")]
    Rejected(String),
}

/// Delivers outbound points to a telemetry backend.
///
/// `send` is called once per point. Failures are logged by the caller and never retried.
pub trait Transport: Send + Sync {
    /// Sends a single point.
    fn send(&self, point: &OutboundPoint) -> Result<(), TransportError>;

    /// Flushes points buffered by the transport.
    ///
    /// Called once at the end of every publish cycle.
    fn flush(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
