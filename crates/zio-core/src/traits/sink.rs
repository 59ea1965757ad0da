// # Output Sink Trait
//
// Defines the interface for writing result lines to a destination.
//
// ## Implementations
//
// - File / standard output: `zio-file` crate

use crate::channel::ItemReceiver;
use crate::completion::CompletionGuard;
use crate::config::GlobalConfig;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Trait for output sink implementations
///
/// A sink drains result lines until the result channel is closed and empty,
/// writing each one followed by a newline. Several sinks may share one
/// receiver; each line then goes to exactly one of them.
///
/// Like sources, sinks are consumed by their single call and must release
/// `completion` exactly once, on every return path.
#[async_trait]
pub trait OutputSink: Send {
    /// Write every result until the channel closes
    ///
    /// # Parameters
    ///
    /// - `results`: Reading half of the result channel
    /// - `completion`: This sink's slot in the coordinator's completion signal
    /// - `cancel`: Stops draining at the next receive
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Channel drained (or cancelled) and output flushed
    /// - `Err(Error)`: Destination failure
    async fn write_results(
        self: Box<Self>,
        results: ItemReceiver<String>,
        completion: CompletionGuard,
        cancel: CancellationToken,
    ) -> Result<(), crate::Error>;

    /// Handler name (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// Helper trait for constructing output sinks from configuration
#[async_trait]
pub trait SinkFactory: Send + Sync {
    /// Create an OutputSink instance from configuration
    async fn create(&self, config: &GlobalConfig) -> Result<Box<dyn OutputSink>, crate::Error>;
}
