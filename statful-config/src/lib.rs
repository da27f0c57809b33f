//! Configuration for the Statful metrics exporter.
//!
//! The configuration is read from `config.yml` in a configuration folder:
//!
//! ```yaml
//! logging:
//!   level: info
//! metrics:
//!   step: 10
//!   tags:
//!     jvm: env=prod;region=eu-west-1
//!   alias:
//!     jvm.memory: memory
//!   accept: []
//!   percentiles: [0.9, 0.95, 0.99]
//! client:
//!   host: 127.0.0.1:2013
//!   prefix: application
//!   default_tags:
//!     app: billing
//!   buffered: true
//! ```
//!
//! All sections and keys are optional.
#![warn(missing_docs)]

mod config;

pub use self::config::*;
