//! Broker session
//!
//! Owns the AMQP connection and channel behind the [`DeliveryStream`] trait,
//! so the feed loop in [`crate::source`] never talks to the client library
//! directly.
//!
//! ## Session lifecycle
//!
//! ```text
//! Unconfigured → Connected → Declared → Consuming → Draining → Closed
//! ```
//!
//! Every transition is logged. [`AmqpDeliveryStream::open`] walks the first
//! four states; [`DeliveryStream::shutdown`] walks the last two.

use crate::config::BrokerConfig;
use amqprs::channel::{
    BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, BasicQosArguments, Channel,
    ConsumerMessage, QueueDeclareArguments,
};
use amqprs::connection::{Connection, OpenConnectionArguments};
use amqprs::tls::TlsAdaptor;
use amqprs::{FieldTable, FieldValue};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use zio_core::{Error, Result};

/// Unacknowledged deliveries the broker may push ahead of the consumer
pub const PREFETCH_COUNT: u16 = 300;

/// Handler name used in broker errors
const HANDLER: &str = "amqp";

/// Where a broker session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Connected,
    Declared,
    Consuming,
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unconfigured => "unconfigured",
            SessionState::Connected => "connected",
            SessionState::Declared => "declared",
            SessionState::Consuming => "consuming",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One message taken off the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker delivery tag, used to acknowledge
    pub tag: u64,
    /// Raw message body
    pub body: Vec<u8>,
}

/// Source of queue deliveries
///
/// # Contract
///
/// - `next()` returns `None` once the broker stops delivering
/// - `ack()` acknowledges exactly one delivery (never "multiple")
/// - `shutdown()` may be called in any state and only once has effect
#[async_trait]
pub trait DeliveryStream: Send {
    /// Wait for the next delivery
    async fn next(&mut self) -> Option<Delivery>;

    /// Acknowledge a single delivery
    async fn ack(&mut self, tag: u64) -> Result<()>;

    /// Stop consuming and close the session within `timeout`
    async fn shutdown(&mut self, timeout: Duration) -> Result<()>;

    /// Current session state
    fn state(&self) -> SessionState;
}

/// Delivery stream backed by a live broker connection
pub struct AmqpDeliveryStream {
    connection: Option<Connection>,
    channel: Option<Channel>,
    consumer_tag: String,
    deliveries: UnboundedReceiverStream<ConsumerMessage>,
    queue: String,
    state: SessionState,
}

impl AmqpDeliveryStream {
    /// Connect, declare the queue, set QoS and start consuming
    ///
    /// Any failure here is reported before a single item is fed, with the
    /// partially opened session closed again.
    pub async fn open(config: &BrokerConfig) -> Result<Self> {
        let (host, port) = config.host_port()?;
        let mut state = SessionState::Unconfigured;

        let mut args =
            OpenConnectionArguments::new(&host, port, &config.username, &config.password);
        if config.tls {
            let files = config.tls_files()?;
            let adaptor = TlsAdaptor::with_client_auth(
                Some(files.ca_cert.as_path()),
                files.client_cert.as_path(),
                files.client_key.as_path(),
                files.server_name.clone(),
            )
            .map_err(|e| Error::config(format!("unable to load TLS material: {}", e)))?;
            args.tls_adaptor(adaptor);
        }

        let connection = Connection::open(&args).await.map_err(|e| {
            Error::handler(
                HANDLER,
                format!("unable to connect to {}:{}: {}", host, port, e),
            )
        })?;
        transition(&mut state, SessionState::Connected, &config.queue);

        let channel = match connection.open_channel(None).await {
            Ok(channel) => channel,
            Err(e) => {
                close_quietly(None, Some(connection)).await;
                return Err(Error::handler(
                    HANDLER,
                    format!("unable to open channel: {}", e),
                ));
            }
        };

        let consumer = match declare_and_consume(&channel, config).await {
            Ok(consumer) => consumer,
            Err(e) => {
                close_quietly(Some(channel), Some(connection)).await;
                return Err(e);
            }
        };
        transition(&mut state, SessionState::Declared, &config.queue);

        let (consumer_tag, rx) = consumer;
        transition(&mut state, SessionState::Consuming, &config.queue);
        info!(
            "Consuming from queue {} on {}:{} (prefetch {})",
            config.queue, host, port, PREFETCH_COUNT
        );

        Ok(Self {
            connection: Some(connection),
            channel: Some(channel),
            consumer_tag,
            deliveries: UnboundedReceiverStream::new(rx),
            queue: config.queue.clone(),
            state,
        })
    }

    async fn close(&mut self) -> Result<()> {
        let mut first_error = None;

        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel
                .basic_cancel(BasicCancelArguments::new(&self.consumer_tag))
                .await
            {
                warn!("Cancelling consumer {} failed: {}", self.consumer_tag, e);
            }
            if let Err(e) = channel.close().await {
                first_error.get_or_insert(format!("closing channel: {}", e));
            }
        }
        if let Some(connection) = self.connection.take()
            && let Err(e) = connection.close().await
        {
            first_error.get_or_insert(format!("closing connection: {}", e));
        }

        match first_error {
            Some(message) => Err(Error::handler(HANDLER, message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeliveryStream for AmqpDeliveryStream {
    async fn next(&mut self) -> Option<Delivery> {
        while let Some(message) = self.deliveries.next().await {
            let Some(deliver) = message.deliver else {
                warn!("Dropping consumer message without delivery frame");
                continue;
            };
            return Some(Delivery {
                tag: deliver.delivery_tag(),
                body: message.content.unwrap_or_default(),
            });
        }
        None
    }

    async fn ack(&mut self, tag: u64) -> Result<()> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| Error::handler(HANDLER, "acknowledge on a closed session"))?;
        channel
            .basic_ack(BasicAckArguments::new(tag, false))
            .await
            .map_err(|e| Error::handler(HANDLER, format!("unable to ack delivery {}: {}", tag, e)))
    }

    async fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let queue = self.queue.clone();
        transition(&mut self.state, SessionState::Draining, &queue);

        let closed = match tokio::time::timeout(timeout, self.close()).await {
            Ok(result) => result,
            Err(_) => Err(Error::handler(
                HANDLER,
                format!("session did not close within {:?}", timeout),
            )),
        };
        transition(&mut self.state, SessionState::Closed, &queue);
        closed
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

/// Declare the bounded durable queue, set QoS and register the consumer
async fn declare_and_consume(
    channel: &Channel,
    config: &BrokerConfig,
) -> Result<(String, tokio::sync::mpsc::UnboundedReceiver<ConsumerMessage>)> {
    let mut queue_args = FieldTable::new();
    queue_args.insert(
        "x-max-length"
            .try_into()
            .map_err(|_| Error::handler(HANDLER, "invalid queue argument name"))?,
        FieldValue::l(config.queue_size),
    );

    let declare = QueueDeclareArguments::new(&config.queue)
        .durable(true)
        .auto_delete(false)
        .exclusive(false)
        .arguments(queue_args)
        .finish();
    channel.queue_declare(declare).await.map_err(|e| {
        Error::handler(
            HANDLER,
            format!("unable to declare queue {}: {}", config.queue, e),
        )
    })?;

    channel
        .basic_qos(BasicQosArguments::new(0, PREFETCH_COUNT, false))
        .await
        .map_err(|e| Error::handler(HANDLER, format!("unable to set QoS: {}", e)))?;

    let consume = BasicConsumeArguments::new(&config.queue, "")
        .manual_ack(true)
        .exclusive(false)
        .finish();
    channel.basic_consume_rx(consume).await.map_err(|e| {
        Error::handler(
            HANDLER,
            format!("unable to consume from {}: {}", config.queue, e),
        )
    })
}

async fn close_quietly(channel: Option<Channel>, connection: Option<Connection>) {
    if let Some(channel) = channel
        && let Err(e) = channel.close().await
    {
        debug!("Closing channel after failed setup: {}", e);
    }
    if let Some(connection) = connection
        && let Err(e) = connection.close().await
    {
        debug!("Closing connection after failed setup: {}", e);
    }
}

fn transition(state: &mut SessionState, next: SessionState, queue: &str) {
    info!("Queue session {}: {} -> {}", queue, state, next);
    *state = next;
}
