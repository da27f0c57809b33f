//! The Statful exporter binary.
//!
//! Publishes metrics to Statful on a fixed step and lets operators inspect how relabeling rules
//! apply to a metric:
//!
//! ```text
//! statful --config /etc/statful config show
//! statful --config /etc/statful relabel jvm.memory.used --tag area=heap
//! statful --config /etc/statful run
//! ```

mod cli;
mod cliapp;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            statful_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
