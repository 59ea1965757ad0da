//! Queue input source
//!
//! Each delivery body is split on whitespace and every token becomes one
//! plain work item. A delivery is acknowledged only after all of its tokens
//! are in the work channel, so a crash or shutdown mid-delivery leaves it on
//! the broker for redelivery (at-least-once).

use crate::broker::DeliveryStream;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use zio_core::{
    CancellationToken, CompletionGuard, InputMode, InputSource, ItemSender, Result, WorkItem,
};

/// Input source consuming a durable queue
pub struct AmqpSource {
    stream: Box<dyn DeliveryStream>,
    shutdown_timeout: Duration,
}

impl AmqpSource {
    /// Wrap an opened delivery stream
    ///
    /// `shutdown_timeout` is the pipeline's grace period; closing the
    /// session only gets part of it (see [`session_close_timeout`]).
    pub fn new(stream: Box<dyn DeliveryStream>, shutdown_timeout: Duration) -> Self {
        Self {
            stream,
            shutdown_timeout,
        }
    }
}

/// Time allowed for closing the broker session
///
/// Half of the pipeline grace period, so a stuck close still leaves the
/// source time to release its completion slot before the pipeline aborts it.
pub fn session_close_timeout(grace: Duration) -> Duration {
    grace / 2
}

#[async_trait]
impl InputSource for AmqpSource {
    async fn feed(
        self: Box<Self>,
        out: ItemSender<WorkItem>,
        completion: CompletionGuard,
        mode: InputMode,
        cancel: CancellationToken,
    ) -> Result<()> {
        let AmqpSource {
            mut stream,
            shutdown_timeout,
        } = *self;

        if mode == InputMode::ZoneFile {
            warn!("Zone-file mode does not apply to queue input, feeding plain tokens");
        }

        let fed = pump(stream.as_mut(), &out, &cancel).await;
        drop(out);
        let closed = stream.shutdown(session_close_timeout(shutdown_timeout)).await;
        debug!("Queue session {}", stream.state());
        completion.done();

        match (fed, closed) {
            (Ok(stats), Ok(())) => {
                info!(
                    "Queue input finished: {} delivery(ies) acknowledged, {} item(s) fed",
                    stats.acked, stats.items
                );
                Ok(())
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!("Closing queue session after failure: {}", close_err);
                }
                error!("Queue input failed: {}", e);
                Err(e)
            }
            (Ok(_), Err(e)) => {
                error!("Closing queue session failed: {}", e);
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        crate::HANDLER_NAME
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PumpStats {
    pub acked: u64,
    pub items: u64,
}

/// Move deliveries into the work channel until the stream ends or cancellation
///
/// A delivery interrupted by cancellation or by a failed send is left
/// unacknowledged.
pub(crate) async fn pump(
    stream: &mut dyn DeliveryStream,
    out: &ItemSender<WorkItem>,
    cancel: &CancellationToken,
) -> Result<PumpStats> {
    let mut stats = PumpStats::default();

    loop {
        let delivery = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(stats),
            delivery = stream.next() => delivery,
        };
        let Some(delivery) = delivery else {
            debug!("Delivery stream ended");
            return Ok(stats);
        };

        let body = String::from_utf8_lossy(&delivery.body);
        for token in body.split_whitespace() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Delivery {} left unacknowledged on cancellation", delivery.tag);
                    return Ok(stats);
                }
                sent = out.send(WorkItem::Plain(token.to_string())) => sent?,
            }
            stats.items += 1;
        }

        stream.ack(delivery.tag).await?;
        stats.acked += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Delivery, SessionState};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use zio_core::{CompletionSignal, Error, ItemReceiver, item_channel};

    /// What the mock broker observed, in order
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Enqueued(String),
        Acked(u64),
        Shutdown(Duration),
    }

    /// Broker double that replays fixed deliveries
    ///
    /// On ack it first records every item already sitting in the work
    /// channel, so the event log shows whether items were enqueued before
    /// their delivery was acknowledged.
    struct MockStream {
        deliveries: VecDeque<Delivery>,
        observed: Option<ItemReceiver<WorkItem>>,
        events: Arc<Mutex<Vec<Event>>>,
        hang_when_empty: bool,
        state: SessionState,
    }

    impl MockStream {
        fn new(bodies: &[&str]) -> Self {
            Self {
                deliveries: bodies
                    .iter()
                    .enumerate()
                    .map(|(n, body)| Delivery {
                        tag: n as u64 + 1,
                        body: body.as_bytes().to_vec(),
                    })
                    .collect(),
                observed: None,
                events: Arc::new(Mutex::new(Vec::new())),
                hang_when_empty: false,
                state: SessionState::Consuming,
            }
        }

        fn observing(mut self, rx: ItemReceiver<WorkItem>) -> Self {
            self.observed = Some(rx);
            self
        }

        fn hanging(mut self) -> Self {
            self.hang_when_empty = true;
            self
        }

        fn events(&self) -> Arc<Mutex<Vec<Event>>> {
            Arc::clone(&self.events)
        }
    }

    #[async_trait]
    impl DeliveryStream for MockStream {
        async fn next(&mut self) -> Option<Delivery> {
            match self.deliveries.pop_front() {
                Some(delivery) => Some(delivery),
                None if self.hang_when_empty => std::future::pending().await,
                None => None,
            }
        }

        async fn ack(&mut self, tag: u64) -> Result<()> {
            let mut events = self.events.lock().unwrap();
            if let Some(rx) = &self.observed {
                while let Some(item) = rx.try_recv() {
                    events.push(Event::Enqueued(item.to_string()));
                }
            }
            events.push(Event::Acked(tag));
            Ok(())
        }

        async fn shutdown(&mut self, timeout: Duration) -> Result<()> {
            self.events.lock().unwrap().push(Event::Shutdown(timeout));
            self.state = SessionState::Closed;
            Ok(())
        }

        fn state(&self) -> SessionState {
            self.state
        }
    }

    fn acked(events: &[Event]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::Acked(tag) => Some(*tag),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn tokens_are_enqueued_before_ack() {
        let (tx, rx) = item_channel(None);
        let mut stream = MockStream::new(&["x.com y.com"]).observing(rx.clone());
        let events = stream.events();

        let stats = pump(&mut stream, &tx, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats, PumpStats { acked: 1, items: 2 });
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                Event::Enqueued("x.com".to_string()),
                Event::Enqueued("y.com".to_string()),
                Event::Acked(1),
            ]
        );
    }

    #[tokio::test]
    async fn whitespace_runs_and_newlines_split_tokens() {
        let (tx, rx) = item_channel(None);
        let mut stream = MockStream::new(&["  a.com\n\tb.com   c.com\r\n", "d.com"]);

        pump(&mut stream, &tx, &CancellationToken::new())
            .await
            .unwrap();
        drop(tx);

        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item.to_string());
        }
        assert_eq!(items, vec!["a.com", "b.com", "c.com", "d.com"]);
    }

    #[tokio::test]
    async fn empty_body_is_acked_without_items() {
        let (tx, rx) = item_channel(None);
        let mut stream = MockStream::new(&["", "   "]);
        let events = stream.events();

        let stats = pump(&mut stream, &tx, &CancellationToken::new())
            .await
            .unwrap();
        drop(tx);

        assert_eq!(stats, PumpStats { acked: 2, items: 0 });
        assert_eq!(acked(&events.lock().unwrap()), vec![1, 2]);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn cancellation_mid_delivery_leaves_it_unacked() {
        // Capacity 1: the second token blocks until cancellation fires
        let (tx, rx) = item_channel(Some(1));
        let mut stream = MockStream::new(&["first.com", "a.com b.com"]);
        let events = stream.events();
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                // Take first.com, leave a.com in the channel
                let first = rx.recv().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
                first
            })
        };

        let stats = pump(&mut stream, &tx, &cancel).await.unwrap();
        let first = canceller.await.unwrap();

        assert_eq!(first, Some(WorkItem::from("first.com")));
        assert_eq!(stats.acked, 1);
        assert_eq!(acked(&events.lock().unwrap()), vec![1]);
    }

    #[tokio::test]
    async fn interrupted_delivery_is_fully_fed_after_redelivery() {
        let body = "a.com b.com c.com";

        // First session: receivers vanish after one token
        let (tx, rx) = item_channel(Some(1));
        let mut first = MockStream::new(&[body]);
        let first_events = first.events();
        let reader = tokio::spawn(async move {
            let item = rx.recv().await;
            drop(rx);
            item
        });
        let interrupted = pump(&mut first, &tx, &CancellationToken::new()).await;
        let mut seen: Vec<String> = reader.await.unwrap().into_iter().map(|i| i.to_string()).collect();
        assert!(interrupted.is_err());
        assert!(acked(&first_events.lock().unwrap()).is_empty());

        // Broker redelivers the unacknowledged message to the next session
        let (tx, rx) = item_channel(None);
        let mut second = MockStream::new(&[body]);
        let second_events = second.events();
        pump(&mut second, &tx, &CancellationToken::new())
            .await
            .unwrap();
        drop(tx);
        while let Some(item) = rx.recv().await {
            seen.push(item.to_string());
        }

        for token in body.split_whitespace() {
            assert!(seen.iter().any(|s| s == token), "{} never fed", token);
        }
        assert_eq!(acked(&second_events.lock().unwrap()), vec![1]);
    }

    #[tokio::test]
    async fn closed_channel_fails_without_ack() {
        let (tx, rx) = item_channel(None);
        drop(rx);
        let mut stream = MockStream::new(&["x.com"]);
        let events = stream.events();

        let result = pump(&mut stream, &tx, &CancellationToken::new()).await;

        assert!(matches!(result, Err(Error::ChannelClosed)));
        assert!(acked(&events.lock().unwrap()).is_empty());
    }

    #[tokio::test]
    async fn feed_closes_session_and_releases_completion() {
        let (tx, rx) = item_channel(None);
        let stream = MockStream::new(&["x.com y.com"]);
        let events = stream.events();
        let source = Box::new(AmqpSource::new(Box::new(stream), Duration::from_secs(1)));

        let signal = CompletionSignal::new();
        let guard = signal.participant().unwrap();
        signal.seal();

        source
            .feed(tx, guard, InputMode::Lines, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(WorkItem::from("x.com")));
        assert_eq!(rx.recv().await, Some(WorkItem::from("y.com")));
        assert_eq!(rx.recv().await, None);
        assert_eq!(signal.released(), 1);
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&Event::Shutdown(Duration::from_millis(500)))
        );
    }

    #[tokio::test]
    async fn cancelled_feed_on_idle_queue_shuts_down() {
        let (tx, rx) = item_channel(None);
        let stream = MockStream::new(&[]).hanging();
        let events = stream.events();
        let source = Box::new(AmqpSource::new(Box::new(stream), Duration::from_secs(1)));
        let cancel = CancellationToken::new();

        let signal = CompletionSignal::new();
        let guard = signal.participant().unwrap();
        signal.seal();

        let task = tokio::spawn(source.feed(tx, guard, InputMode::ZoneFile, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(rx.recv().await, None);
        assert_eq!(signal.released(), 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec![Event::Shutdown(Duration::from_millis(500))]
        );
    }

    #[tokio::test]
    async fn session_close_leaves_part_of_the_grace_period() {
        let (tx, _rx) = item_channel(None);
        let stream = MockStream::new(&[]);
        let events = stream.events();
        let grace = Duration::from_secs(10);
        let source = Box::new(AmqpSource::new(Box::new(stream), grace));

        let signal = CompletionSignal::new();
        let guard = signal.participant().unwrap();
        signal.seal();

        source
            .feed(tx, guard, InputMode::Lines, CancellationToken::new())
            .await
            .unwrap();

        let close = match events.lock().unwrap().last() {
            Some(Event::Shutdown(timeout)) => *timeout,
            other => panic!("expected session shutdown, got {:?}", other),
        };
        assert_eq!(close, Duration::from_secs(5));
        assert!(close < grace);
    }
}
