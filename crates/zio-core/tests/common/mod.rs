//! Test doubles and common utilities for pipeline contract tests
//!
//! This module provides minimal sources and sinks that exercise the
//! handoff contract without touching files or brokers.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zio_core::error::{Error, Result};
use zio_core::{
    CancellationToken, CompletionGuard, FailurePolicy, InputMode, InputSource, ItemReceiver,
    ItemSender, OutputSink, PipelineConfig, WorkItem,
};

/// A source that feeds a fixed list of items, then optionally fails
pub struct VecSource {
    items: Vec<WorkItem>,
    fail_with: Option<String>,
    sent: Arc<AtomicUsize>,
}

impl VecSource {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<WorkItem>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
            fail_with: None,
            sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail with a source error after every item has been sent
    pub fn failing_after(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Counter of items sent so far
    pub fn sent_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.sent)
    }
}

#[async_trait]
impl InputSource for VecSource {
    async fn feed(
        self: Box<Self>,
        out: ItemSender<WorkItem>,
        completion: CompletionGuard,
        _mode: InputMode,
        cancel: CancellationToken,
    ) -> Result<()> {
        let VecSource {
            items,
            fail_with,
            sent,
        } = *self;

        for item in items {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = out.send(item) => result?,
            }
            sent.fetch_add(1, Ordering::SeqCst);
        }
        drop(out);
        completion.done();

        match fail_with {
            Some(message) => Err(Error::source(message)),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "vec"
    }
}

/// A source that never produces anything and waits for cancellation
pub struct StalledSource;

#[async_trait]
impl InputSource for StalledSource {
    async fn feed(
        self: Box<Self>,
        _out: ItemSender<WorkItem>,
        _completion: CompletionGuard,
        _mode: InputMode,
        cancel: CancellationToken,
    ) -> Result<()> {
        cancel.cancelled().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stalled"
    }
}

/// A source that ignores cancellation entirely (misbehaving handler)
pub struct DeafSource;

#[async_trait]
impl InputSource for DeafSource {
    async fn feed(
        self: Box<Self>,
        _out: ItemSender<WorkItem>,
        _completion: CompletionGuard,
        _mode: InputMode,
        _cancel: CancellationToken,
    ) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "deaf"
    }
}

/// A sink that records every line in memory
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            fail_after: None,
        }
    }

    /// Fail once `count` lines have been written
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Shared handle on the recorded lines
    pub fn lines(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.lines)
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn write_results(
        self: Box<Self>,
        results: ItemReceiver<String>,
        completion: CompletionGuard,
        cancel: CancellationToken,
    ) -> Result<()> {
        let _completion = completion;
        loop {
            let written = self.lines.lock().unwrap().len();
            if self.fail_after.is_some_and(|limit| written >= limit) {
                return Err(Error::sink("destination full"));
            }

            let line = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                line = results.recv() => line,
            };
            match line {
                Some(line) => self.lines.lock().unwrap().push(line),
                None => return Ok(()),
            }
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Pipeline configuration suitable for tests
pub fn test_config(workers: usize, policy: FailurePolicy) -> PipelineConfig {
    PipelineConfig {
        input_mode: InputMode::Lines,
        channel_capacity: None,
        workers,
        shutdown_timeout: Duration::from_millis(500),
        failure_policy: policy,
    }
}

/// Domain names `d0.com`, `d1.com`, ...
pub fn domains(count: usize) -> Vec<String> {
    (0..count).map(|n| format!("d{}.com", n)).collect()
}
