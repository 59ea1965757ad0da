//! Handler registry
//!
//! The registry maps handler names to factories so the coordinator can pick
//! input and output handlers from configuration, without hardcoded if-else
//! chains and without process-wide mutable state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zio_core::{GlobalConfig, HandlerRegistry};
//!
//! // Created by the coordinator and passed around by reference
//! let registry = HandlerRegistry::new();
//!
//! // Adapter crates register themselves explicitly
//! zio_file::register(&registry);
//! zio_amqp::register(&registry);
//!
//! // Create handlers from config
//! let config = GlobalConfig::default();
//! let source = registry.create_source(&config.input_handler, &config).await?;
//! let sink = registry.create_sink(&config.output_handler, &config).await?;
//! ```
//!
//! ## Registration
//!
//! Adapter crates expose a `register` function:
//!
//! ```rust,ignore
//! // In the zio-file crate
//! pub fn register(registry: &HandlerRegistry) {
//!     registry.register_source("file", Box::new(FileSourceFactory));
//!     registry.register_sink("file", Box::new(FileSinkFactory));
//! }
//! ```

use crate::config::GlobalConfig;
use crate::error::{Error, Result};
use crate::traits::{InputSource, OutputSink, SinkFactory, SourceFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Registry of input and output handler factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. Factories are reference counted so that the
/// lock is never held across the asynchronous `create` call.
#[derive(Default)]
pub struct HandlerRegistry {
    /// Registered input source factories
    sources: RwLock<HashMap<String, Arc<dyn SourceFactory>>>,

    /// Registered output sink factories
    sinks: RwLock<HashMap<String, Arc<dyn SinkFactory>>>,
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an input source factory
    ///
    /// Registering a name twice replaces the earlier factory.
    ///
    /// # Parameters
    ///
    /// - `name`: Handler name (e.g., "file", "amqp")
    /// - `factory`: Factory object for creating source instances
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn SourceFactory>) {
        let name = name.into();
        debug!("Registering input handler: {}", name);
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(name, Arc::from(factory));
    }

    /// Register an output sink factory
    ///
    /// # Parameters
    ///
    /// - `name`: Handler name (e.g., "file")
    /// - `factory`: Factory object for creating sink instances
    pub fn register_sink(&self, name: impl Into<String>, factory: Box<dyn SinkFactory>) {
        let name = name.into();
        debug!("Registering output handler: {}", name);
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        sinks.insert(name, Arc::from(factory));
    }

    /// Create and initialize an input source
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn InputSource>)`: Initialized source, ready to feed
    /// - `Err(Error)`: Unknown handler name, or initialization failed
    pub async fn create_source(
        &self,
        name: &str,
        config: &GlobalConfig,
    ) -> Result<Box<dyn InputSource>> {
        let factory = {
            let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
            sources
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnknownHandler {
                    kind: "input",
                    name: name.to_string(),
                })?
        };

        factory.create(config).await
    }

    /// Create and initialize an output sink
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn OutputSink>)`: Initialized sink, ready to write
    /// - `Err(Error)`: Unknown handler name, or initialization failed
    pub async fn create_sink(&self, name: &str, config: &GlobalConfig) -> Result<Box<dyn OutputSink>> {
        let factory = {
            let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
            sinks
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnknownHandler {
                    kind: "output",
                    name: name.to_string(),
                })?
        };

        factory.create(config).await
    }

    /// List all registered input handler names
    pub fn list_sources(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// List all registered output handler names
    pub fn list_sinks(&self) -> Vec<String> {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = sinks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if an input handler is registered
    pub fn has_source(&self, name: &str) -> bool {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }

    /// Check if an output handler is registered
    pub fn has_sink(&self, name: &str) -> bool {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        sinks.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ItemSender;
    use crate::completion::CompletionGuard;
    use crate::config::InputMode;
    use crate::item::WorkItem;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct EmptySource;

    #[async_trait]
    impl InputSource for EmptySource {
        async fn feed(
            self: Box<Self>,
            _out: ItemSender<WorkItem>,
            completion: CompletionGuard,
            _mode: InputMode,
            _cancel: CancellationToken,
        ) -> Result<()> {
            completion.done();
            Ok(())
        }

        fn name(&self) -> &'static str {
            "empty"
        }
    }

    struct EmptySourceFactory;

    #[async_trait]
    impl SourceFactory for EmptySourceFactory {
        async fn create(&self, _config: &GlobalConfig) -> Result<Box<dyn InputSource>> {
            Ok(Box::new(EmptySource))
        }
    }

    struct FailingSinkFactory;

    #[async_trait]
    impl SinkFactory for FailingSinkFactory {
        async fn create(&self, _config: &GlobalConfig) -> Result<Box<dyn OutputSink>> {
            Err(Error::config("sink not configured"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = HandlerRegistry::new();

        // Initially empty
        assert!(!registry.has_source("empty"));
        assert!(registry.list_sources().is_empty());

        // Register
        registry.register_source("empty", Box::new(EmptySourceFactory));
        registry.register_sink("failing", Box::new(FailingSinkFactory));

        // Now present
        assert!(registry.has_source("empty"));
        assert!(registry.has_sink("failing"));
        assert!(!registry.has_sink("empty"));
        assert_eq!(registry.list_sources(), vec!["empty".to_string()]);
        assert_eq!(registry.list_sinks(), vec!["failing".to_string()]);
    }

    #[tokio::test]
    async fn test_create_known_and_unknown_handlers() {
        let registry = HandlerRegistry::new();
        registry.register_source("empty", Box::new(EmptySourceFactory));
        registry.register_sink("failing", Box::new(FailingSinkFactory));
        let config = GlobalConfig::default();

        let source = registry.create_source("empty", &config).await.unwrap();
        assert_eq!(source.name(), "empty");

        let unknown = registry.create_source("kafka", &config).await;
        assert!(matches!(
            unknown,
            Err(Error::UnknownHandler { kind: "input", .. })
        ));

        let failing = registry.create_sink("failing", &config).await;
        assert!(matches!(failing, Err(Error::Config(_))));
    }
}
