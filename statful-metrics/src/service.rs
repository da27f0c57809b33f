//! The step timer driving flush, relabel, translation and delivery.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::ExporterConfig;
use crate::aggregator::Aggregator;
use crate::relabel::Relabeler;
use crate::rules::RuleError;
use crate::snapshot::Translator;
use crate::time::UnixTimestamp;
use crate::transport::Transport;

/// Outcome of a single publish cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PublishReport {
    /// Points accepted by the transport.
    pub sent: usize,
    /// Points the transport failed to deliver.
    pub failed: usize,
    /// Metrics dropped by the accept filter.
    pub skipped: usize,
}

/// Publishes the state of an [`Aggregator`] through a [`Transport`] once every step.
pub struct PublishService<T> {
    aggregator: Arc<Aggregator>,
    relabeler: Relabeler,
    translator: Translator,
    transport: T,
    step: Duration,
}

impl<T: Transport + 'static> PublishService<T> {
    /// Creates a new publish service.
    ///
    /// Fails if the relabeling rules in the configuration cannot be parsed.
    pub fn new(
        config: &ExporterConfig,
        aggregator: Arc<Aggregator>,
        transport: T,
    ) -> Result<Self, RuleError> {
        Ok(Self {
            aggregator,
            relabeler: Relabeler::from_config(config)?,
            translator: Translator::new(&config.percentiles),
            transport,
            step: config.step(),
        })
    }

    /// Runs one publish cycle.
    ///
    /// Flushes the aggregator, then relabels, translates and sends every metric. A failing point
    /// is logged and does not affect the remaining points.
    pub fn publish(&self) -> PublishReport {
        let mut report = PublishReport::default();
        if self.aggregator.is_empty() {
            statful_log::trace!("no metrics reported yet");
            return report;
        }

        let timestamp = UnixTimestamp::now();

        for (identity, snapshot) in self.aggregator.flush_and_reset() {
            if !self.relabeler.accepts(&identity) {
                statful_log::trace!(metric = identity.name.as_str(), "metric not accepted");
                report.skipped += 1;
                continue;
            }

            let relabeled = self.relabeler.relabel(&identity);
            for point in self.translator.translate(&relabeled, &snapshot, timestamp) {
                match self.transport.send(&point) {
                    Ok(()) => report.sent += 1,
                    Err(error) => {
                        report.failed += 1;
                        statful_log::error!(
                            error = &error as &dyn Error,
                            metric = point.name.as_str(),
                            "failed to send metric"
                        );
                    }
                }
            }
        }

        if let Err(error) = self.transport.flush() {
            statful_log::error!(
                error = &error as &dyn Error,
                "failed to flush metrics transport"
            );
        }

        statful_log::debug!(
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "published metrics"
        );

        report
    }

    /// Starts publishing in the background, once every step.
    ///
    /// The first cycle runs one full step after starting. Cycles run on the blocking thread pool,
    /// since transports may block. A cycle that takes longer than the step delays the next one,
    /// cycles never overlap. Dropping the returned handle stops the timer as well.
    pub fn start(self) -> PublishHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let step = self.step;
        let service = Arc::new(self);

        let join_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + step, step);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            statful_log::info!("publishing metrics every {}s", step.as_secs());

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let service = Arc::clone(&service);
                        let cycle = tokio::task::spawn_blocking(move || service.publish());
                        if let Err(error) = cycle.await {
                            statful_log::error!(
                                error = &error as &dyn Error,
                                "publish cycle terminated abnormally"
                            );
                        }
                    }
                }
            }

            statful_log::info!("stopped publishing metrics");
        });

        PublishHandle {
            shutdown_tx,
            join_handle,
        }
    }
}

/// Controls a running [`PublishService`].
#[derive(Debug)]
pub struct PublishHandle {
    shutdown_tx: watch::Sender<bool>,
    join_handle: JoinHandle<()>,
}

impl PublishHandle {
    /// Stops the publish timer.
    ///
    /// Waits for a cycle in progress to complete. Does not publish the pending window.
    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        if let Err(error) = self.join_handle.await {
            statful_log::error!(
                error = &error as &dyn Error,
                "publish task terminated abnormally"
            );
        }
    }
}
