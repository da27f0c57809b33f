use std::io;
use std::net::{ToSocketAddrs, UdpSocket};

use cadence::{BufferedUdpMetricSink, MetricError, MetricSink, UdpMetricSink};
use statful_metrics::{OutboundPoint, Tags, Transport, TransportError};

use crate::config::ClientConfig;
use crate::line::encode_line;

/// An error raised while setting up the [`StatfulClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configured host did not resolve to any address.
    #[error("could not resolve statful host '{0}'")]
    UnresolvedHost(String),
    /// The local UDP socket could not be created.
    #[error("failed to bind local UDP socket")]
    Socket(#[source] io::Error),
    /// The metric sink could not be created.
    #[error("failed to create metric sink")]
    Sink(#[from] MetricError),
}

/// A [`Transport`] sending points to Statful in its line protocol.
pub struct StatfulClient {
    prefix: String,
    default_tags: Tags,
    sink: Box<dyn MetricSink + Send + Sync>,
}

impl StatfulClient {
    /// Creates a client sending to the host in the configuration over UDP.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let addr = config
            .host
            .to_socket_addrs()
            .map_err(|_| ClientError::UnresolvedHost(config.host.clone()))?
            .next()
            .ok_or_else(|| ClientError::UnresolvedHost(config.host.clone()))?;

        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).map_err(ClientError::Socket)?;
        socket.set_nonblocking(true).map_err(ClientError::Socket)?;

        let sink: Box<dyn MetricSink + Send + Sync> = if config.buffered {
            Box::new(BufferedUdpMetricSink::from(addr, socket)?)
        } else {
            Box::new(UdpMetricSink::from(addr, socket)?)
        };

        statful_log::info!("reporting metrics to statful at {addr}");
        Ok(Self::with_boxed_sink(config, sink))
    }

    /// Creates a client writing to an existing sink.
    pub fn from_sink<S>(config: &ClientConfig, sink: S) -> Self
    where
        S: MetricSink + Send + Sync + 'static,
    {
        Self::with_boxed_sink(config, Box::new(sink))
    }

    fn with_boxed_sink(config: &ClientConfig, sink: Box<dyn MetricSink + Send + Sync>) -> Self {
        Self {
            prefix: config.prefix.clone(),
            default_tags: config.default_tags.clone(),
            sink,
        }
    }

    /// Returns the namespace prepended to every metric.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Transport for StatfulClient {
    fn send(&self, point: &OutboundPoint) -> Result<(), TransportError> {
        let line = encode_line(&self.prefix, &self.default_tags, point);
        self.sink.emit(&line)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), TransportError> {
        self.sink.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for StatfulClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatfulClient")
            .field("prefix", &self.prefix)
            .field("default_tags", &self.default_tags)
            .finish_non_exhaustive()
    }
}
