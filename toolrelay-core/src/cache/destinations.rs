use arc_swap::ArcSwap;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::tabular::{self, PayloadShape, TabularRecord};

/// A named place a tool can post to or read from, e.g. a chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub id: String,
    pub name: Option<String>,
    /// Every column of the source row, including id and name.
    pub fields: TabularRecord,
}

impl Destination {
    /// Build a destination from a decoded row. The id comes from a column
    /// named `id` (any case), falling back to the first column.
    pub fn from_record(record: TabularRecord) -> Option<Self> {
        let id = lookup(&record, "id")
            .or_else(|| record.first().map(|(_, value)| value.as_str()))
            .filter(|id| !id.is_empty())?
            .to_string();
        let name = lookup(&record, "name")
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Some(Self {
            id,
            name,
            fields: record,
        })
    }

    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

fn lookup<'a>(record: &'a TabularRecord, column: &str) -> Option<&'a str> {
    record
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(column))
        .map(|(_, value)| value.as_str())
}

/// Destinations keyed by id, in listing order.
pub type DestinationSet = IndexMap<String, Destination>;

/// Result of feeding a payload to [`DestinationCache::apply_payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationUpdate {
    /// Empty payload; cache untouched.
    Unchanged,
    /// Payload was not a table; logged and dropped, cache untouched.
    Discarded,
    /// Cache replaced with this many destinations.
    Replaced(usize),
}

/// Read-mostly cache of known destinations.
///
/// Readers take an [`Arc`] snapshot; refreshes swap in a whole new set so a
/// reader never sees old and new rows mixed.
pub struct DestinationCache {
    header_prefix: String,
    current: ArcSwap<DestinationSet>,
}

impl DestinationCache {
    pub fn new(header_prefix: impl Into<String>) -> Self {
        Self {
            header_prefix: header_prefix.into(),
            current: ArcSwap::from_pointee(DestinationSet::new()),
        }
    }

    pub fn snapshot(&self) -> Arc<DestinationSet> {
        self.current.load_full()
    }

    pub fn get(&self, id: &str) -> Option<Destination> {
        self.current.load().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.current.load().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Replace the whole set. Later duplicates of an id win.
    pub fn replace(&self, destinations: impl IntoIterator<Item = Destination>) -> usize {
        let set: DestinationSet = destinations
            .into_iter()
            .map(|destination| (destination.id.clone(), destination))
            .collect();
        let count = set.len();
        self.current.store(Arc::new(set));
        count
    }

    /// Decode a listing payload and, if it is tabular, replace the cache.
    pub fn apply_payload(&self, text: &str) -> DestinationUpdate {
        match tabular::detect_shape(text, &self.header_prefix) {
            PayloadShape::Empty => {
                debug!("empty destination payload; keeping cached destinations");
                DestinationUpdate::Unchanged
            }
            PayloadShape::Unrecognized => {
                warn!(
                    preview = %preview(text),
                    "destination payload is not tabular; ignoring"
                );
                DestinationUpdate::Discarded
            }
            PayloadShape::Tabular => {
                let Some(table) = tabular::decode(text) else {
                    return DestinationUpdate::Unchanged;
                };
                let total_rows = table.rows.len();
                let destinations: Vec<Destination> = table
                    .rows
                    .into_iter()
                    .filter_map(Destination::from_record)
                    .collect();
                if destinations.len() < total_rows {
                    debug!(
                        skipped = total_rows - destinations.len(),
                        "skipped destination rows without an id"
                    );
                }
                DestinationUpdate::Replaced(self.replace(destinations))
            }
        }
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 80;
    let trimmed = text.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", trimmed.get(..cut).unwrap_or(trimmed)),
        None => trimmed.to_string(),
    }
}
