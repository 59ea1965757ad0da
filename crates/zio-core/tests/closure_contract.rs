//! Architectural Contract Test: Channel Closure
//!
//! This test verifies the handoff between a source and its readers.
//!
//! Constraints verified:
//! - Items arrive in the order the source produced them
//! - The work channel closes exactly once, when the source returns
//! - Readers drain buffered items before observing closure
//! - The source's completion slot is released when it returns

mod common;

use common::*;
use std::sync::Arc;
use zio_core::{
    CancellationToken, CompletionSignal, FailurePolicy, InputMode, InputSource,
    PassthroughProcessor, Pipeline, WorkItem, item_channel,
};

#[tokio::test]
async fn source_preserves_order_then_closes() {
    let source: Box<dyn InputSource> = Box::new(VecSource::new(["a.com", "b.com"]));
    let (tx, rx) = item_channel(None);
    let signal = CompletionSignal::new();
    let guard = signal.participant().unwrap();
    signal.seal();

    source
        .feed(tx, guard, InputMode::Lines, CancellationToken::new())
        .await
        .expect("feed succeeds");

    // Closed by the source, but everything it sent is still readable
    assert_eq!(rx.recv().await, Some(WorkItem::from("a.com")));
    assert_eq!(rx.recv().await, Some(WorkItem::from("b.com")));
    assert_eq!(rx.recv().await, None);
    assert_eq!(signal.released(), 1);
}

#[tokio::test]
async fn closure_is_final() {
    let source: Box<dyn InputSource> = Box::new(VecSource::new(domains(10)));
    let (tx, rx) = item_channel(Some(2));
    let signal = CompletionSignal::new();
    let guard = signal.participant().unwrap();
    signal.seal();

    let feeder = tokio::spawn(source.feed(tx, guard, InputMode::Lines, CancellationToken::new()));

    let mut received = Vec::new();
    while let Some(item) = rx.recv().await {
        received.push(item.to_string());
    }
    feeder.await.unwrap().unwrap();

    assert_eq!(received, domains(10));
    // Once closed, the channel stays closed
    for _ in 0..3 {
        assert_eq!(rx.recv().await, None);
    }
}

#[tokio::test]
async fn single_worker_pipeline_preserves_input_order() {
    let sink = MemorySink::new();
    let lines = sink.lines();

    let pipeline = Pipeline::new(test_config(1, FailurePolicy::Abort));
    let report = pipeline
        .run(
            Box::new(VecSource::new(domains(200))),
            vec![Box::new(sink)],
            Arc::new(PassthroughProcessor),
        )
        .await
        .expect("pipeline succeeds");

    assert_eq!(report.items_processed, 200);
    assert_eq!(report.results_emitted, 200);
    assert_eq!(*lines.lock().unwrap(), domains(200));
}

#[tokio::test]
async fn many_workers_deliver_every_item_once() {
    let sink = MemorySink::new();
    let lines = sink.lines();

    let pipeline = Pipeline::new(test_config(8, FailurePolicy::Abort));
    pipeline
        .run(
            Box::new(VecSource::new(domains(500))),
            vec![Box::new(sink)],
            Arc::new(PassthroughProcessor),
        )
        .await
        .expect("pipeline succeeds");

    let mut written = lines.lock().unwrap().clone();
    written.sort();
    let mut expected = domains(500);
    expected.sort();
    assert_eq!(written, expected);
}
