//! Core traits for the zio handlers
//!
//! This module defines the abstract interfaces that all handlers must follow.
//!
//! - [`InputSource`]: Produce work items into the work channel
//! - [`OutputSink`]: Drain result lines into a destination

pub mod sink;
pub mod source;

pub use sink::{OutputSink, SinkFactory};
pub use source::{InputSource, SourceFactory};
