// # zio-core
//
// Core library for the zio input/output handlers.
//
// ## Architecture Overview
//
// This library defines the streaming handoff contract between an external
// origin/destination and the internal work queues of a resolution pipeline:
// - **InputSource**: Trait for producing work items into a channel
// - **OutputSink**: Trait for draining result lines into a destination
// - **HandlerRegistry**: Explicit name-to-factory registry for handlers
// - **CompletionSignal**: Latch released exactly once per participant
// - **Pipeline**: Coordinator wiring one source, workers and sinks together
//
// ## Design Principles
//
// 1. **Exactly-once lifecycle**: handlers are created once and consumed by
//    `feed` / `write_results`, so they cannot be driven twice
// 2. **Channel ownership**: a source owns its sender; dropping it is the one
//    and only close event
// 3. **Typed failures**: handlers return `Error` instead of aborting, the
//    coordinator decides whether to abort or drain
// 4. **Cancellation**: every blocking point races a `CancellationToken`

pub mod channel;
pub mod completion;
pub mod config;
pub mod error;
pub mod item;
pub mod pipeline;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use channel::{ItemReceiver, ItemSender, item_channel};
pub use completion::{CompletionGuard, CompletionSignal};
pub use config::{FailurePolicy, GlobalConfig, InputMode};
pub use error::{Error, Result};
pub use item::{WorkItem, ZoneRecord};
pub use pipeline::{PassthroughProcessor, Pipeline, PipelineConfig, PipelineReport, Processor};
pub use registry::HandlerRegistry;
pub use traits::{InputSource, OutputSink, SinkFactory, SourceFactory};
pub use tokio_util::sync::CancellationToken;
