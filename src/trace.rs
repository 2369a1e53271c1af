//! Change log: which fact or rule produced each committed bound.
//!
//! Entries are append-only and ordered by commit, which within one timestep
//! follows the declared fact and rule order.

use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::label::Label;

/// What caused a trace entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum TraceSource {
    /// A fact (or graph attribute) assertion, with its trace name.
    Fact(String),
    /// A rule conclusion, with the rule name.
    Rule(String),
    /// A contradiction reset the label to unknown.
    Inconsistency(String),
}

impl TraceSource {
    pub fn name(&self) -> &str {
        match self {
            Self::Fact(n) | Self::Rule(n) | Self::Inconsistency(n) => n,
        }
    }
}

/// One atom that justified a rule conclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceAtom {
    pub entity: String,
    pub label: Label,
    pub bound: Interval,
}

/// A committed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestep: usize,
    /// Pass within the timestep (0 unless `again` repeats grounding).
    pub pass: usize,
    pub entity: String,
    pub label: Label,
    /// Bound before the change, `None` if the label was absent.
    pub previous: Option<Interval>,
    /// Bound after the change.
    pub bound: Interval,
    pub source: TraceSource,
    /// Empty unless atom tracing is on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub atoms: Vec<TraceAtom>,
}

impl TraceEntry {
    pub fn is_inconsistency(&self) -> bool {
        matches!(self.source, TraceSource::Inconsistency(_))
    }
}

/// Ordered trace entries for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceLog {
    entries: Vec<TraceEntry>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TraceEntry) {
        tracing::trace!(
            t = entry.timestep,
            entity = %entry.entity,
            label = %entry.label,
            bound = %entry.bound,
            source = entry.source.name(),
            "trace"
        );
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Entries committed at timestep `t`.
    pub fn at(&self, t: usize) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter().filter(move |e| e.timestep == t)
    }

    /// Entries touching `entity`/`label`.
    pub fn for_atom<'a>(
        &'a self,
        entity: &'a str,
        label: &'a Label,
    ) -> impl Iterator<Item = &'a TraceEntry> {
        self.entries
            .iter()
            .filter(move |e| e.entity == entity && &e.label == label)
    }

    pub fn inconsistencies(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter().filter(|e| e.is_inconsistency())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(t: usize, entity: &str, source: TraceSource) -> TraceEntry {
        TraceEntry {
            timestep: t,
            pass: 0,
            entity: entity.into(),
            label: Label::new("p"),
            previous: None,
            bound: Interval::TRUE,
            source,
            atoms: Vec::new(),
        }
    }

    #[test]
    fn filters_by_timestep_and_atom() {
        let mut log = TraceLog::new();
        log.push(entry(0, "A", TraceSource::Fact("seed".into())));
        log.push(entry(1, "B", TraceSource::Rule("r".into())));
        log.push(entry(1, "A", TraceSource::Inconsistency("r".into())));

        assert_eq!(log.at(1).count(), 2);
        assert_eq!(log.for_atom("A", &Label::new("p")).count(), 2);
        assert_eq!(log.inconsistencies().count(), 1);
    }

    #[test]
    fn json_export_names_sources() {
        let mut log = TraceLog::new();
        log.push(entry(0, "A", TraceSource::Rule("spread".into())));
        let json = log.to_json().unwrap();
        assert!(json.contains("\"kind\": \"rule\""));
        assert!(json.contains("\"name\": \"spread\""));
        assert!(!json.contains("atoms"));
    }
}
