//! Work item model
//!
//! A work item is what a source hands to the resolution workers: either a bare
//! domain name, or a structured record parsed from DNS zone-file syntax.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single record taken from a zone file
///
/// All fields are kept in their zone-file presentation form so that the
/// record can be written back out verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    /// Owner name (absolute, as rendered by the zone parser)
    pub owner: String,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Record class mnemonic (e.g. "IN")
    pub class: String,
    /// Record type mnemonic (e.g. "A", "NS")
    pub rtype: String,
    /// Record data in presentation format
    pub data: String,
}

impl fmt::Display for ZoneRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.owner, self.ttl, self.class, self.rtype, self.data
        )
    }
}

/// Unit of work produced by an input source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItem {
    /// A bare domain name (one input line or one queue token)
    Plain(String),
    /// A structured zone-file record
    Zone(ZoneRecord),
}

impl WorkItem {
    /// The domain name this item is about
    pub fn name(&self) -> &str {
        match self {
            WorkItem::Plain(name) => name,
            WorkItem::Zone(record) => &record.owner,
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Plain(name) => f.write_str(name),
            WorkItem::Zone(record) => record.fmt(f),
        }
    }
}

impl From<String> for WorkItem {
    fn from(name: String) -> Self {
        WorkItem::Plain(name)
    }
}

impl From<&str> for WorkItem {
    fn from(name: &str) -> Self {
        WorkItem::Plain(name.to_string())
    }
}

impl From<ZoneRecord> for WorkItem {
    fn from(record: ZoneRecord) -> Self {
        WorkItem::Zone(record)
    }
}
