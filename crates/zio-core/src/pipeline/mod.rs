//! Pipeline coordinator
//!
//! The Pipeline wires one input source, a pool of processor workers and one
//! or more output sinks together:
//!
//! ```text
//! ┌─────────────┐  WorkItem  ┌───────────┐  String  ┌─────────────┐
//! │ InputSource │──────────▶ │ Processor │────────▶ │ OutputSink  │
//! └─────────────┘  channel   │  workers  │ channel  │  (1..M)     │
//!        │                   └───────────┘          └─────────────┘
//!        │                                                 │
//!        └──────────────── CompletionSignal ◀──────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. Create with [`Pipeline::new()`], keep [`Pipeline::cancellation_token()`]
//!    if the caller needs to stop it (e.g. on SIGINT)
//! 2. Start with [`Pipeline::run()`], which consumes the pipeline
//! 3. The source closes the work channel when exhausted; workers exit and
//!    drop their result senders; sinks drain and return
//! 4. `run()` returns once every participant has released the completion
//!    signal
//!
//! ## Failure handling
//!
//! A participant returning an error does not stop the process. Depending on
//! the [`FailurePolicy`], the coordinator either cancels every other
//! participant (`Abort`) or lets them drain what is already queued (`Drain`).
//! Either way the first error is returned after all participants have
//! stopped. Once cancelled, participants get `shutdown_timeout` to stop
//! before their tasks are aborted.

use crate::channel::{ItemReceiver, ItemSender, item_channel};
use crate::completion::CompletionSignal;
use crate::config::{FailurePolicy, GlobalConfig, InputMode};
use crate::error::{Error, Result};
use crate::item::WorkItem;
use crate::traits::{InputSource, OutputSink};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Turns work items into result lines
///
/// This is where the host's resolution logic plugs in. Returning `None`
/// drops the item without emitting a result.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Process one work item
    async fn process(&self, item: WorkItem) -> Option<String>;
}

/// Processor that emits every item as its own presentation line
pub struct PassthroughProcessor;

#[async_trait]
impl Processor for PassthroughProcessor {
    async fn process(&self, item: WorkItem) -> Option<String> {
        Some(item.to_string())
    }
}

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Input interpretation handed to the source
    pub input_mode: InputMode,
    /// Capacity of both channels (`None` = unbounded)
    pub channel_capacity: Option<usize>,
    /// Number of processor workers
    pub workers: usize,
    /// Grace period for participants after cancellation
    pub shutdown_timeout: Duration,
    /// Reaction to a failing participant
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&GlobalConfig::default())
    }
}

impl From<&GlobalConfig> for PipelineConfig {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            input_mode: config.input_mode,
            channel_capacity: config.channel_capacity,
            workers: config.workers.max(1),
            shutdown_timeout: config.shutdown_timeout(),
            failure_policy: config.failure_policy,
        }
    }
}

/// Counters collected over one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Work items taken off the work channel by workers
    pub items_processed: u64,
    /// Result lines handed to the sinks
    pub results_emitted: u64,
    /// Completion signal releases (one per source and sink)
    pub participants_released: usize,
}

/// Task roles, for logging
#[derive(Debug, Clone, Copy)]
enum Participant {
    Source(&'static str),
    Worker(usize),
    Sink(&'static str, usize),
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Participant::Source(name) => write!(f, "input handler '{}'", name),
            Participant::Worker(id) => write!(f, "worker #{}", id),
            Participant::Sink(name, id) => write!(f, "output handler '{}' #{}", name, id),
        }
    }
}

/// Pipeline coordinator
pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a new pipeline
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the pipeline when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the pipeline to completion
    ///
    /// # Parameters
    ///
    /// - `source`: Initialized input source
    /// - `sinks`: Initialized output sinks (at least one)
    /// - `processor`: Work item processor shared by all workers
    ///
    /// # Returns
    ///
    /// - `Ok(PipelineReport)`: Every participant finished cleanly
    /// - `Err(Error)`: The first participant failure, or
    ///   [`Error::ShutdownTimeout`] if participants ignored cancellation
    pub async fn run(
        self,
        source: Box<dyn InputSource>,
        sinks: Vec<Box<dyn OutputSink>>,
        processor: Arc<dyn Processor>,
    ) -> Result<PipelineReport> {
        if sinks.is_empty() {
            return Err(Error::config("At least one output handler is required"));
        }

        let (work_tx, work_rx) = item_channel::<WorkItem>(self.config.channel_capacity);
        let (result_tx, result_rx) = item_channel::<String>(self.config.channel_capacity);

        let signal = CompletionSignal::new();
        let source_guard = signal.participant()?;
        let sink_guards = sinks
            .iter()
            .map(|_| signal.participant())
            .collect::<Result<Vec<_>>>()?;
        signal.seal();

        let processed = Arc::new(AtomicU64::new(0));
        let emitted = Arc::new(AtomicU64::new(0));
        let mut tasks = JoinSet::new();

        info!(
            "Starting pipeline: input '{}', {} worker(s), {} output(s)",
            source.name(),
            self.config.workers,
            sinks.len()
        );

        let participant = Participant::Source(source.name());
        let mode = self.config.input_mode;
        let cancel = self.cancel.clone();
        tasks.spawn(async move {
            let result = source.feed(work_tx, source_guard, mode, cancel).await;
            (participant, result)
        });

        for id in 0..self.config.workers {
            let worker = Worker {
                work: work_rx.clone(),
                results: result_tx.clone(),
                processor: Arc::clone(&processor),
                processed: Arc::clone(&processed),
                emitted: Arc::clone(&emitted),
                cancel: self.cancel.clone(),
            };
            tasks.spawn(async move { (Participant::Worker(id), worker.run().await) });
        }
        // Only workers may keep these ends alive, or closure never propagates.
        drop(work_rx);
        drop(result_tx);

        for (id, (sink, guard)) in sinks.into_iter().zip(sink_guards).enumerate() {
            let participant = Participant::Sink(sink.name(), id);
            let results = result_rx.clone();
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let result = sink.write_results(results, guard, cancel).await;
                (participant, result)
            });
        }
        drop(result_rx);

        let first_error = self.supervise(&mut tasks).await?;

        signal.wait().await;
        let report = PipelineReport {
            items_processed: processed.load(Ordering::SeqCst),
            results_emitted: emitted.load(Ordering::SeqCst),
            participants_released: signal.released(),
        };
        info!(
            "Pipeline finished: {} item(s) processed, {} result(s) emitted",
            report.items_processed, report.results_emitted
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Join every task, applying the failure policy and shutdown timeout
    ///
    /// Returns the first participant error, if any. Fails with
    /// [`Error::ShutdownTimeout`] when tasks had to be aborted.
    async fn supervise(
        &self,
        tasks: &mut JoinSet<(Participant, Result<()>)>,
    ) -> Result<Option<Error>> {
        let timeout = self.config.shutdown_timeout;
        let mut deadline: Option<Instant> = None;
        let mut first_error = None;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await
                {
                    Ok(next) => next,
                    Err(_) => {
                        error!(
                            "{} participant(s) still running {:?} after cancellation, aborting",
                            tasks.len(),
                            timeout
                        );
                        tasks.abort_all();
                        while tasks.join_next().await.is_some() {}
                        return Err(Error::ShutdownTimeout(timeout));
                    }
                },
                None => tokio::select! {
                    next = tasks.join_next() => next,
                    () = self.cancel.cancelled() => {
                        info!("Pipeline cancelled, waiting up to {:?} for participants", timeout);
                        deadline = Some(Instant::now() + timeout);
                        continue;
                    }
                },
            };

            let Some(joined) = next else {
                break;
            };

            let failure = match joined {
                Ok((participant, Ok(()))) => {
                    debug!("{} finished", participant);
                    continue;
                }
                Ok((participant, Err(e))) => {
                    if first_error.is_some() {
                        warn!("{} failed after an earlier failure: {}", participant, e);
                    } else {
                        error!("{} failed: {}", participant, e);
                    }
                    e
                }
                Err(join_err) => {
                    error!("Pipeline task did not complete: {}", join_err);
                    Error::Other(format!("pipeline task did not complete: {}", join_err))
                }
            };

            if first_error.is_none() {
                first_error = Some(failure);
                if self.config.failure_policy == FailurePolicy::Abort {
                    info!("Failure policy is abort, cancelling remaining participants");
                    self.cancel.cancel();
                }
            }
        }

        Ok(first_error)
    }
}

/// One processor task between the work and result channels
struct Worker {
    work: ItemReceiver<WorkItem>,
    results: ItemSender<String>,
    processor: Arc<dyn Processor>,
    processed: Arc<AtomicU64>,
    emitted: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) -> Result<()> {
        loop {
            let item = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                item = self.work.recv() => item,
            };
            let Some(item) = item else {
                return Ok(());
            };
            self.processed.fetch_add(1, Ordering::SeqCst);

            let Some(line) = self.processor.process(item).await else {
                continue;
            };
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                sent = self.results.send(line) => sent?,
            }
            self.emitted.fetch_add(1, Ordering::SeqCst);
        }
    }
}
