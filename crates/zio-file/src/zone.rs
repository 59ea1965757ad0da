//! Zone-file parsing
//!
//! Zone text is handed to the parser one complete entry at a time, so a
//! record is available as soon as its last line has been read. An entry is
//! one line, or several lines joined by parentheses.
//!
//! Directives that pull in other files (`$INCLUDE`) are skipped with a
//! warning; the source only ever reads the one stream it was given.

use domain::base::Name;
use domain::zonefile::inplace::{Entry, Zonefile};
use std::mem;
use tracing::warn;
use zio_core::{Error, Result, ZoneRecord};

/// Groups raw input lines into complete zone-file entries
///
/// Tracks parentheses outside quoted strings and comments. Quotes and
/// comments never span lines.
#[derive(Debug, Default)]
pub struct EntrySplitter {
    pending: Vec<u8>,
    depth: usize,
}

impl EntrySplitter {
    /// Add one line (with or without its `\n`)
    ///
    /// Returns the completed entry, newline-terminated, once parentheses
    /// are balanced again.
    pub fn push_line(&mut self, line: &[u8]) -> Option<Vec<u8>> {
        let mut in_quote = false;
        let mut escaped = false;
        for &byte in line {
            if escaped {
                escaped = false;
                continue;
            }
            match byte {
                b'\\' => escaped = true,
                b'"' => in_quote = !in_quote,
                b';' if !in_quote => break,
                b'(' if !in_quote => self.depth += 1,
                b')' if !in_quote => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
        }

        self.pending.extend_from_slice(line);
        if self.depth > 0 {
            return None;
        }
        self.take()
    }

    /// Flush what is left at end of input
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.depth = 0;
        self.take()
    }

    fn take(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            return None;
        }
        if self.pending.last() != Some(&b'\n') {
            self.pending.push(b'\n');
        }
        Some(mem::take(&mut self.pending))
    }
}

/// Incremental zone-file parser
///
/// Scanned text is dropped from the buffer, so memory follows the size of
/// one entry rather than the whole input. `$ORIGIN`, `$TTL` and owner
/// inheritance carry over between entries.
/// Names are resolved against the root origin unless the data sets
/// `$ORIGIN` itself.
pub struct ZoneParser {
    zonefile: Zonefile,
    source_name: String,
    records: u64,
    skipped: usize,
}

impl ZoneParser {
    /// Create a parser; `source_name` only appears in errors and logs
    pub fn new(source_name: impl Into<String>) -> Self {
        let mut zonefile = Zonefile::new();
        zonefile.set_origin(Name::root_bytes());
        Self {
            zonefile,
            source_name: source_name.into(),
            records: 0,
            skipped: 0,
        }
    }

    /// Parse one complete entry from [`EntrySplitter`]
    pub fn push_entry(&mut self, entry: &[u8]) -> Result<Vec<ZoneRecord>> {
        self.zonefile.extend_from_slice(entry);

        let mut records = Vec::new();
        loop {
            let next = self.zonefile.next_entry().map_err(|e| {
                Error::source(format!(
                    "invalid zone data in {} after {} record(s): {}",
                    self.source_name,
                    self.records + records.len() as u64,
                    e
                ))
            })?;

            match next {
                Some(Entry::Record(record)) => records.push(ZoneRecord {
                    owner: record.owner().to_string(),
                    ttl: record.ttl().as_secs(),
                    class: record.class().to_string(),
                    rtype: record.rtype().to_string(),
                    data: record.data().to_string(),
                }),
                Some(_) => self.skipped += 1,
                None => break,
            }
        }

        self.records += records.len() as u64;
        Ok(records)
    }

    /// End of input; returns the number of records parsed
    pub fn finish(self) -> u64 {
        if self.skipped > 0 {
            warn!(
                "Skipped {} $INCLUDE directive(s) in {}",
                self.skipped, self.source_name
            );
        }
        self.records
    }
}
