// # Queue Input Handler
//
// This crate provides an input handler consuming a durable AMQP 0-9-1 queue
// (RabbitMQ).
//
// ## Delivery guarantees
//
// - ✅ At-least-once: a delivery is acknowledged only after every token of
//   its body is in the work channel
// - ✅ Bounded in-flight work: prefetch fixed at 300 unacknowledged deliveries
// - ✅ Bounded queue: declared durable with `x-max-length` from the config
// - ✅ Setup failures (config, TLS material, connect, declare) are reported by
//   the factory, before any item is fed
// - ❌ NO reconnection (a lost connection ends the feed)
// - ❌ NO output side (the queue is input-only)
//
// ## Configuration
//
// `input_handler_config` must point at a YAML file; see [`config`] for the
// keys.
//
// ## Registration
//
// Registered as "amqp", with "rabbitmq" as an alias.

pub mod broker;
pub mod config;
mod source;

pub use broker::{AmqpDeliveryStream, Delivery, DeliveryStream, SessionState};
pub use config::BrokerConfig;
pub use source::{AmqpSource, session_close_timeout};

use async_trait::async_trait;
use tracing::info;
use zio_core::{Error, GlobalConfig, HandlerRegistry, InputSource, Result, SourceFactory};

/// Name the queue source is registered under
pub const HANDLER_NAME: &str = "amqp";

/// Alias kept for configurations naming the broker
pub const HANDLER_ALIAS: &str = "rabbitmq";

/// Factory for [`AmqpSource`]
///
/// Loads the broker configuration and opens the session; the returned source
/// is already consuming.
pub struct AmqpSourceFactory;

#[async_trait]
impl SourceFactory for AmqpSourceFactory {
    async fn create(&self, config: &GlobalConfig) -> Result<Box<dyn InputSource>> {
        let path = config.input_handler_config.as_deref().ok_or_else(|| {
            Error::config("the queue input handler requires input_handler_config")
        })?;
        let broker = BrokerConfig::load(path)?;
        info!(
            "Opening queue {} on {} (tls: {})",
            broker.queue, broker.address, broker.tls
        );

        let stream = AmqpDeliveryStream::open(&broker).await?;
        Ok(Box::new(AmqpSource::new(
            Box::new(stream),
            config.shutdown_timeout(),
        )))
    }
}

/// Register the queue handler with a registry
pub fn register(registry: &HandlerRegistry) {
    registry.register_source(HANDLER_NAME, Box::new(AmqpSourceFactory));
    registry.register_source(HANDLER_ALIAS, Box::new(AmqpSourceFactory));
}
