//! File / standard output sink

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info};
use zio_core::config::is_stdio;
use zio_core::{CancellationToken, CompletionGuard, Error, ItemReceiver, OutputSink, Result};

/// Writes result lines to a file or to standard output
///
/// Files are opened in append mode and created if missing; each result is
/// written as one line terminated by `\n`.
pub struct FileSink {
    /// Output path; empty or "-" selects standard output
    path: String,
}

impl FileSink {
    /// Create a sink for `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Whether this sink writes standard output
    pub fn writes_stdout(&self) -> bool {
        is_stdio(&self.path)
    }

    fn display_name(&self) -> &str {
        if self.writes_stdout() { "<stdout>" } else { &self.path }
    }

    async fn open(&self) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
        if self.writes_stdout() {
            return Ok(Box::new(tokio::io::stdout()));
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                Error::Io(io::Error::new(
                    e.kind(),
                    format!("unable to open output file {}: {}", self.path, e),
                ))
            })?;
        Ok(Box::new(file))
    }
}

#[async_trait]
impl OutputSink for FileSink {
    async fn write_results(
        self: Box<Self>,
        results: ItemReceiver<String>,
        completion: CompletionGuard,
        cancel: CancellationToken,
    ) -> Result<()> {
        let name = self.display_name().to_string();

        let result = match self.open().await {
            Ok(writer) => write_lines(BufWriter::new(writer), &name, &results, &cancel).await,
            Err(e) => Err(e),
        };
        completion.done();

        match result {
            Ok(count) => {
                info!("Wrote {} result(s) to {}", count, name);
                Ok(())
            }
            Err(e) => {
                error!("Output to {} failed: {}", name, e);
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        crate::HANDLER_NAME
    }
}

/// Drain `results` into `writer`, one line per result
///
/// Lines already waiting in the channel are written back to back; the
/// writer is flushed whenever the channel runs empty, when it closes and on
/// cancellation. Results therefore show up while the run is still going.
pub(crate) async fn write_lines<W>(
    mut writer: W,
    name: &str,
    results: &ItemReceiver<String>,
    cancel: &CancellationToken,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let map_err = |e: io::Error| {
        Error::Io(io::Error::new(
            e.kind(),
            format!("output unable to write {}: {}", name, e),
        ))
    };
    let mut count = 0;

    loop {
        if cancel.is_cancelled() {
            debug!("Writing {} cancelled after {} line(s)", name, count);
            break;
        }

        let line = match results.try_recv() {
            Some(line) => line,
            None => {
                writer.flush().await.map_err(map_err)?;
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!("Writing {} cancelled after {} line(s)", name, count);
                        break;
                    }
                    line = results.recv() => line,
                };
                match next {
                    Some(line) => line,
                    None => break,
                }
            }
        };

        writer.write_all(line.as_bytes()).await.map_err(map_err)?;
        writer.write_all(b"\n").await.map_err(map_err)?;
        count += 1;
    }

    writer.flush().await.map_err(map_err)?;
    Ok(count)
}
