//! Minimal embedding example for zio-core
//!
//! This example drives a pipeline from a host application: a custom
//! in-memory source, a custom processor and the stock file sink writing to
//! stdout. The pipeline lifecycle is fully managed by the application.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use zio_core::{
    CancellationToken, CompletionGuard, HandlerRegistry, InputMode, InputSource, ItemSender,
    Pipeline, PipelineConfig, Processor, Result, WorkItem,
};

/// Custom source feeding a fixed list of domains
struct EmbeddedSource {
    domains: Vec<String>,
}

#[async_trait]
impl InputSource for EmbeddedSource {
    async fn feed(
        self: Box<Self>,
        out: ItemSender<WorkItem>,
        completion: CompletionGuard,
        _mode: InputMode,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut result = Ok(());
        for domain in self.domains {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                sent = out.send(WorkItem::Plain(domain)) => {
                    if let Err(e) = sent {
                        result = Err(e);
                        break;
                    }
                }
            }
        }
        drop(out);
        completion.done();
        result
    }

    fn name(&self) -> &'static str {
        "embedded"
    }
}

/// Custom processor standing in for real resolution
struct EmbeddedResolver {
    lookups: AtomicUsize,
}

#[async_trait]
impl Processor for EmbeddedResolver {
    async fn process(&self, item: WorkItem) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let name = item.name().trim_end_matches('.');
        if name.is_empty() {
            return None;
        }
        Some(format!("{} resolved", name))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    println!("=== Embedded zio-core Example ===\n");

    // Registry with the stock file handlers, stdout as output
    let registry = HandlerRegistry::new();
    zio_file::register(&registry);
    let config = zio_core::GlobalConfig::default();
    let sink = registry.create_sink("file", &config).await?;

    let source = Box::new(EmbeddedSource {
        domains: vec![
            "example.com".to_string(),
            "example.net.".to_string(),
            "".to_string(),
            "example.org".to_string(),
        ],
    });
    let resolver = Arc::new(EmbeddedResolver {
        lookups: AtomicUsize::new(0),
    });

    let pipeline = Pipeline::new(PipelineConfig {
        workers: 2,
        channel_capacity: Some(8),
        ..PipelineConfig::default()
    });

    // Application-owned stop handle; not used here, the input simply ends
    let _stop = pipeline.cancellation_token();

    let report = pipeline
        .run(source, vec![sink], Arc::clone(&resolver) as Arc<dyn Processor>)
        .await?;

    println!("\n=== Embedding Successful ===");
    println!("Items processed: {}", report.items_processed);
    println!("Results written: {}", report.results_emitted);
    println!("Resolver lookups: {}", resolver.lookups.load(Ordering::SeqCst));
    println!("Completion releases: {}", report.participants_released);

    Ok(())
}
