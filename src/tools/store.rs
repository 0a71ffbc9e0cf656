//! Accumulated capability results for one analysis run.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::tools::builtin::header::HeaderReport;
use crate::tools::builtin::link::LinkReport;
use crate::tools::capability::{CapabilityOutput, HEADER_ANALYSIS};

/// Capability name → last result, in first-call order.
///
/// Writes are last-write-wins per name, so merging the same result twice
/// leaves the store unchanged. Per-URL link reports follow the same rule,
/// keyed by URL, for the final link summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResultStore {
    entries: Vec<(String, Value)>,
    link_reports: Vec<LinkReport>,
}

impl ToolResultStore {
    /// An empty store with no seeded defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded so that scoring before any capability ran is safe.
    pub fn with_defaults() -> Self {
        let mut store = Self::new();
        let header = serde_json::to_value(HeaderReport::default()).unwrap_or(Value::Null);
        store.insert(HEADER_ANALYSIS, header);
        store
    }

    /// Insert or replace the result for `name`, keeping its original position.
    pub fn insert(&mut self, name: impl Into<String>, result: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = result,
            None => self.entries.push((name, result)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge a dispatched capability's output under its name.
    pub fn merge(&mut self, name: &str, output: CapabilityOutput) {
        self.insert(name, output.value);
        self.record_links(output.links);
    }

    /// Remember per-URL link reports. A URL seen before keeps its position
    /// and takes the newer report.
    pub fn record_links(&mut self, reports: impl IntoIterator<Item = LinkReport>) {
        for report in reports {
            match self.link_reports.iter_mut().find(|r| r.url == report.url) {
                Some(slot) => *slot = report,
                None => self.link_reports.push(report),
            }
        }
    }

    /// One report per URL, in first-seen order.
    pub fn link_reports(&self) -> &[LinkReport] {
        &self.link_reports
    }

    /// Snapshot without the named entry.
    pub fn without(&self, name: &str) -> Self {
        let mut copy = self.clone();
        copy.remove(name);
        copy
    }
}

impl Serialize for ToolResultStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
