//! File / standard input source

use crate::zone::{EntrySplitter, ZoneParser};
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::SplitStream;
use tracing::{debug, error, info, warn};
use zio_core::config::is_stdio;
use zio_core::{
    CancellationToken, CompletionGuard, Error, InputMode, InputSource, ItemSender, Result,
    WorkItem,
};

/// Reads work items from a file or from standard input
///
/// Input order is preserved exactly, in both line and zone-file mode.
pub struct FileSource {
    /// Input path; empty or "-" selects standard input
    path: String,
}

impl FileSource {
    /// Create a source for `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Whether this source reads standard input
    pub fn reads_stdin(&self) -> bool {
        is_stdio(&self.path)
    }

    /// Name used in log and error messages
    fn display_name(&self) -> &str {
        if self.reads_stdin() { "<stdin>" } else { &self.path }
    }

    async fn open(&self) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
        if self.reads_stdin() {
            return Ok(Box::new(tokio::io::stdin()));
        }

        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("unable to open input file {}: {}", self.path, e),
            ))
        })?;
        Ok(Box::new(file))
    }
}

#[async_trait]
impl InputSource for FileSource {
    async fn feed(
        self: Box<Self>,
        out: ItemSender<WorkItem>,
        completion: CompletionGuard,
        mode: InputMode,
        cancel: CancellationToken,
    ) -> Result<()> {
        let name = self.display_name().to_string();
        info!("Reading {:?} input from {}", mode, name);

        let result = match self.open().await {
            Ok(reader) => {
                let reader = BufReader::new(reader);
                match mode {
                    InputMode::Lines => feed_lines(reader, &name, &out, &cancel).await,
                    InputMode::ZoneFile => feed_zone(reader, &name, &out, &cancel).await,
                }
            }
            Err(e) => Err(e),
        };

        // Close the work channel before releasing the slot.
        drop(out);
        completion.done();

        match result {
            Ok(count) => {
                info!("Finished reading {}: {} item(s)", name, count);
                Ok(())
            }
            Err(e) => {
                error!("Input from {} failed: {}", name, e);
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        crate::HANDLER_NAME
    }
}

/// Send one plain work item per line
///
/// Lines end at `\n` or `\r\n`; the terminator is stripped. Bytes that are
/// not valid UTF-8 are replaced, the line is still sent. A read error ends
/// the feed with an error (end of input does not).
pub(crate) async fn feed_lines<R>(
    reader: R,
    name: &str,
    out: &ItemSender<WorkItem>,
    cancel: &CancellationToken,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = SplitStream::new(reader.split(b'\n'));
    let mut count = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Reading {} cancelled after {} line(s)", name, count);
                break;
            }
            next = lines.next() => next,
        };

        let mut raw = match next {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => return Err(read_error(name, e)),
            None => break,
        };
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                warn!("Invalid UTF-8 in line {} of {}", count + 1, name);
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = out.send(WorkItem::Plain(line)) => sent?,
        }
        count += 1;
    }

    Ok(count)
}

/// Send one zone work item per record of a zone file
///
/// Records are parsed and sent as soon as their entry is complete, so a
/// pipe or terminal yields records before end of input.
pub(crate) async fn feed_zone<R>(
    mut reader: R,
    name: &str,
    out: &ItemSender<WorkItem>,
    cancel: &CancellationToken,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut splitter = EntrySplitter::default();
    let mut parser = ZoneParser::new(name);
    let mut line = Vec::new();
    let mut count = 0;

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Reading {} cancelled after {} record(s)", name, count);
                return Ok(count);
            }
            read = reader.read_until(b'\n', &mut line) => read.map_err(|e| read_error(name, e))?,
        };

        let entry = if read == 0 {
            splitter.finish()
        } else {
            splitter.push_line(&line)
        };

        if let Some(entry) = entry {
            for record in parser.push_entry(&entry)? {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(count),
                    sent = out.send(WorkItem::Zone(record)) => sent?,
                }
                count += 1;
            }
        }

        if read == 0 {
            break;
        }
    }

    debug!("Parsed {} record(s) from {}", parser.finish(), name);
    Ok(count)
}

fn read_error(name: &str, e: io::Error) -> Error {
    Error::Io(io::Error::new(
        e.kind(),
        format!("input unable to read {}: {}", name, e),
    ))
}
