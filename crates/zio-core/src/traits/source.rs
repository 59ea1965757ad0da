// # Input Source Trait
//
// Defines the interface for producing work items from an origin.
//
// ## Implementations
//
// - File / standard input: `zio-file` crate
// - AMQP 0-9-1 queue: `zio-amqp` crate
//
// ## Usage
//
// ```rust,ignore
// use zio_core::{item_channel, CancellationToken, CompletionSignal, InputMode};
//
// let source = registry.create_source("file", &config).await?;
// let (tx, rx) = item_channel(None);
// let signal = CompletionSignal::new();
// let guard = signal.participant()?;
// signal.seal();
//
// tokio::spawn(source.feed(tx, guard, InputMode::Lines, CancellationToken::new()));
// while let Some(item) = rx.recv().await {
//     println!("{}", item);
// }
// ```

use crate::channel::ItemSender;
use crate::completion::CompletionGuard;
use crate::config::{GlobalConfig, InputMode};
use crate::item::WorkItem;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Trait for input source implementations
///
/// A source is created once by its [`SourceFactory`] and then consumed by a
/// single call to [`InputSource::feed`]. Taking `self: Box<Self>` makes a
/// second call impossible.
///
/// # Contract
///
/// ## Required Behaviour
/// - ✅ Send every unit read from the origin to `out`, in origin order
/// - ✅ Return when the origin is exhausted, `cancel` fires, or an error occurs
/// - ✅ Drop `out` on return (the one and only close of the work channel)
/// - ✅ Release `completion` exactly once, on every return path
/// - ✅ Release any origin resources (files, broker connections) before returning
///
/// ## Forbidden Behaviour
/// - ❌ Abort the process on I/O failure (return an `Error` instead)
/// - ❌ Retry or reconnect (left to an external supervisor)
/// - ❌ Keep `out` alive in a detached task after returning
/// - ❌ Block on anything without also racing `cancel`
///
/// Dropping the guard is sufficient to release it, so implementations
/// usually bind it for the duration of the call and call
/// [`CompletionGuard::done`] at the end.
#[async_trait]
pub trait InputSource: Send {
    /// Feed the work channel until the origin is exhausted
    ///
    /// # Parameters
    ///
    /// - `out`: Sending half of the work channel, owned by this source
    /// - `completion`: This source's slot in the coordinator's completion signal
    /// - `mode`: How the origin is interpreted (lines or zone file)
    /// - `cancel`: Stops the feed at the next blocking point
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Origin exhausted or cancelled; all read items were sent
    /// - `Err(Error)`: Stream failure; items sent before the failure stay queued
    async fn feed(
        self: Box<Self>,
        out: ItemSender<WorkItem>,
        completion: CompletionGuard,
        mode: InputMode,
        cancel: CancellationToken,
    ) -> Result<(), crate::Error>;

    /// Handler name (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// Helper trait for constructing input sources from configuration
///
/// `create` is the initialization step: implementations that need a live
/// connection (the queue source) establish it here so that configuration
/// and connection failures surface before any item is promised to a worker.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    /// Create an InputSource instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Global configuration
    ///
    /// # Returns
    ///
    /// A boxed InputSource trait object
    async fn create(&self, config: &GlobalConfig) -> Result<Box<dyn InputSource>, crate::Error>;
}
