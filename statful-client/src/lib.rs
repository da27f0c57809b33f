//! Client for the Statful line protocol.
//!
//! [`StatfulClient`] implements the [`Transport`](statful_metrics::Transport) of the exporter. Every
//! point becomes one line of the form:
//!
//! ```text
//! application.timer.http.latency,env=prod,uri=/api 55 1700000000 avg,10
//! ```
//!
//! Lines are written to a [`cadence::MetricSink`], by default a buffered UDP sink. Tests use
//! [`cadence::SpyMetricSink`] through [`StatfulClient::from_sink`].
#![warn(missing_docs)]

mod client;
mod config;
mod line;

pub use self::client::*;
pub use self::config::*;
pub use self::line::encode_line;
