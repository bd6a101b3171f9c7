//! Main application orchestration.
//!
//! Coordinates:
//! - Reading events from the configured source
//! - Routing each event to its pair's worker, starting workers on demand
//! - Writing signals as JSON lines
//! - Periodic and final session summaries

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use pulse_analytics::UnifiedMMSignal;
use pulse_core::PairKey;
use pulse_feed::{open_source, EventSource, FeedError, MarketEvent};
use pulse_telemetry::{Metrics, SessionReporter};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::worker::PairWorker;

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Events routed to a worker.
    pub events: u64,
    /// Lines or events dropped before reaching a worker.
    pub rejected: u64,
    /// Signals written.
    pub signals: u64,
    /// Workers started.
    pub pairs: usize,
}

struct WorkerHandle {
    events: mpsc::Sender<MarketEvent>,
    task: JoinHandle<u64>,
}

type DynWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Output path that selects standard output.
const STDOUT_PATH: &str = "-";

/// Main application.
pub struct Application {
    config: AppConfig,
    workers: HashMap<PairKey, WorkerHandle>,
    reporter: SessionReporter,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        info!(
            source = %config.source,
            input = %config.input,
            output = %config.output,
            pairs = config.pairs.len(),
            auto_register = config.auto_register_pairs,
            "Application configured"
        );
        Ok(Self {
            config,
            workers: HashMap::new(),
            reporter: SessionReporter::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run against the configured input and output until the input ends or
    /// ctrl-c is received.
    pub async fn run(mut self) -> AppResult<RunSummary> {
        let source = open_source(self.config.source, Path::new(&self.config.input)).await?;

        let sink: DynWriter = if self.config.output == STDOUT_PATH {
            Box::new(tokio::io::stdout())
        } else {
            info!(path = %self.config.output, "Writing signals to file");
            Box::new(tokio::fs::File::create(&self.config.output).await?)
        };

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        };

        self.run_stream(source, sink, shutdown).await
    }

    /// Drive `source` to completion, writing signals to `sink`.
    ///
    /// Stops early when `shutdown` resolves. Workers drain their queues
    /// before the summary is returned.
    pub async fn run_stream<S, W, F>(
        &mut self,
        mut source: S,
        sink: W,
        shutdown: F,
    ) -> AppResult<RunSummary>
    where
        S: EventSource,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let (signal_tx, signal_rx) = mpsc::channel(self.config.channel_capacity);
        let writer = tokio::spawn(write_signals(signal_rx, sink));

        for key in self.config.pairs.iter().map(|p| p.key()).collect::<Vec<_>>() {
            self.spawn_worker(key, &signal_tx)?;
        }

        let period = Duration::from_secs(self.config.summary_interval_secs);
        let mut summary_interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        tokio::pin!(shutdown);

        info!("Entering main event loop");
        let mut summary = RunSummary::default();
        let mut fatal = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                _ = summary_interval.tick() => {
                    info!("Outputting periodic session summary");
                    self.reporter.output_summary();
                }

                next = source.next_event() => match next {
                    Ok(Some(event)) => {
                        match self.route(event, &signal_tx).await {
                            Ok(true) => summary.events += 1,
                            Ok(false) => summary.rejected += 1,
                            Err(e) => {
                                fatal = Some(e);
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        info!("Input exhausted");
                        break;
                    }
                    Err(FeedError::Io(e)) => {
                        error!(error = %e, "Input read failed");
                        fatal = Some(AppError::Io(e));
                        break;
                    }
                    Err(e) => {
                        summary.rejected += 1;
                        Metrics::input_rejected("line", rejection_reason(&e));
                    }
                },
            }
        }

        drop(signal_tx);
        summary.pairs = self.workers.len();
        for (key, handle) in self.workers.drain() {
            drop(handle.events);
            match handle.task.await {
                Ok(emitted) => summary.signals += emitted,
                Err(e) => error!(pair = %key, error = %e, "Worker task failed"),
            }
        }

        let written = writer
            .await
            .map_err(|e| AppError::Task(format!("signal writer: {e}")))??;
        debug!(written, "Signal writer finished");

        info!(
            events = summary.events,
            rejected = summary.rejected,
            signals = summary.signals,
            pairs = summary.pairs,
            "Shutting down"
        );
        info!("Final session summary:");
        self.reporter.output_summary();

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Forward an event to its worker. `Ok(false)` when the pair is unknown
    /// and auto-registration is off.
    async fn route(
        &mut self,
        event: MarketEvent,
        signal_tx: &mpsc::Sender<UnifiedMMSignal>,
    ) -> AppResult<bool> {
        let key = event.key().clone();
        if !self.workers.contains_key(&key) {
            if self.config.pair(&key).is_none() && !self.config.auto_register_pairs {
                warn!(pair = %key, kind = event.kind(), "Event for unconfigured pair dropped");
                Metrics::input_rejected(event.kind(), "unknown_pair");
                return Ok(false);
            }
            self.spawn_worker(key.clone(), signal_tx)?;
        }

        let Some(handle) = self.workers.get(&key) else {
            return Ok(false);
        };
        if handle.events.send(event).await.is_err() {
            return Err(AppError::Task(format!("worker for {key} stopped")));
        }
        Ok(true)
    }

    fn spawn_worker(
        &mut self,
        key: PairKey,
        signal_tx: &mpsc::Sender<UnifiedMMSignal>,
    ) -> AppResult<()> {
        let initial_inventory = self
            .config
            .pair(&key)
            .map(|p| p.initial_inventory)
            .unwrap_or(0.0);
        let analytics = self.config.analytics_for(&key).clone();
        let worker = PairWorker::new(key.clone(), analytics, initial_inventory)?;

        info!(
            pair = %key,
            initial_inventory,
            configured = self.config.pair(&key).is_some(),
            "Starting pair worker"
        );
        self.reporter.add_pair(worker.label().to_string());

        let (events_tx, events_rx) = mpsc::channel(self.config.channel_capacity);
        let task = tokio::spawn(worker.run(events_rx, signal_tx.clone()));
        self.workers.insert(
            key,
            WorkerHandle {
                events: events_tx,
                task,
            },
        );
        Ok(())
    }
}

/// Write each signal as one JSON line. Returns the number written.
async fn write_signals<W>(mut signals: mpsc::Receiver<UnifiedMMSignal>, mut sink: W) -> AppResult<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(signal) = signals.recv().await {
        let mut line = serde_json::to_vec(&signal)?;
        line.push(b'\n');
        sink.write_all(&line).await?;
        written += 1;
    }
    sink.flush().await?;
    sink.shutdown().await?;
    Ok(written)
}

fn rejection_reason(error: &FeedError) -> &'static str {
    match error {
        FeedError::ParseError(_) => "parse_error",
        FeedError::InvalidData(_) => "invalid_data",
        FeedError::MissingField(_) => "missing_field",
        FeedError::Json(_) => "invalid_json",
        FeedError::SourceNotConfigured(_) => "source_not_configured",
        FeedError::Io(_) => "io",
    }
}
