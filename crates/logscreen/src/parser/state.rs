//! State — per-parse accumulator and phase tracking.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use super::grammar::Grammar;
use super::model::{ErrorCode, ParseResult, PolicyViolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for a start marker.
    Scanning,
    /// Inside the section with this index.
    Section(usize),
    Completed,
    Failed(ErrorCode),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed(_))
    }
}

/// Exclusively owned by one parse.
#[derive(Debug)]
pub struct ParseState {
    phase: Phase,
    /// Section that was open when the parse terminated.
    open_section: Option<usize>,
    completed_sections: Vec<String>,
    fields: BTreeMap<String, String>,
    multi_values: BTreeMap<String, Vec<String>>,
    wip_fields: BTreeMap<String, String>,
    wip_multi_values: BTreeMap<String, Vec<String>>,
    hit_counts: BTreeMap<String, u64>,
    categories: BTreeMap<String, BTreeSet<String>>,
    pub bytes_read: u64,
    pub lines_read: u64,
    violation: Option<PolicyViolation>,
    started: Instant,
}

impl ParseState {
    pub fn new(initial: Phase) -> Self {
        Self {
            phase: initial,
            open_section: match initial {
                Phase::Section(idx) => Some(idx),
                _ => None,
            },
            completed_sections: Vec::new(),
            fields: BTreeMap::new(),
            multi_values: BTreeMap::new(),
            wip_fields: BTreeMap::new(),
            wip_multi_values: BTreeMap::new(),
            hit_counts: BTreeMap::new(),
            categories: BTreeMap::new(),
            bytes_read: 0,
            lines_read: 0,
            violation: None,
            started: Instant::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn enter_section(&mut self, idx: usize) {
        self.phase = Phase::Section(idx);
        self.open_section = Some(idx);
    }

    /// Record one captured value into the open section.
    pub fn record(&mut self, field: &str, value: String, multi: bool) {
        *self.hit_counts.entry(field.to_string()).or_insert(0) += 1;

        if multi {
            let values = self.wip_multi_values.entry(field.to_string()).or_default();
            if !values.contains(&value) {
                values.push(value);
            }
        } else {
            self.wip_fields.insert(field.to_string(), value);
        }
    }

    pub fn record_category(&mut self, category: &str, field: &str, name: String) {
        *self.hit_counts.entry(field.to_string()).or_insert(0) += 1;
        self.categories.entry(category.to_string()).or_default().insert(name);
    }

    /// Latest value of a single-valued field, open section first.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.wip_fields
            .get(field)
            .or_else(|| self.fields.get(field))
            .map(String::as_str)
    }

    /// Move the open section's values into the completed set.
    pub fn complete_section(&mut self, name: &str) {
        self.fields.append(&mut self.wip_fields);
        for (field, values) in std::mem::take(&mut self.wip_multi_values) {
            let merged = self.multi_values.entry(field).or_default();
            for value in values {
                if !merged.contains(&value) {
                    merged.push(value);
                }
            }
        }
        self.completed_sections.push(name.to_string());
        self.open_section = None;
    }

    pub fn complete(&mut self) {
        self.phase = Phase::Completed;
    }

    /// First terminal error wins.
    pub fn fail(&mut self, code: ErrorCode) {
        if !self.phase.is_terminal() {
            self.phase = Phase::Failed(code);
        }
    }

    pub fn set_violation(&mut self, violation: PolicyViolation) {
        self.violation = Some(violation);
    }

    /// Freeze into a result. Work in progress of an unfinished section is dropped.
    pub fn into_result(self, grammar: &Grammar, bytes_total: Option<u64>) -> ParseResult {
        let error = match self.phase {
            Phase::Failed(code) => code,
            _ => ErrorCode::None,
        };
        let incomplete_section = self
            .open_section
            .and_then(|idx| grammar.section(idx))
            .map(|s| s.name.clone());

        ParseResult {
            handler: None,
            error,
            completed_sections: self.completed_sections,
            incomplete_section,
            fields: self.fields,
            multi_values: self.multi_values,
            hit_counts: self.hit_counts,
            categories: self.categories,
            bytes_read: self.bytes_read,
            bytes_total,
            lines_read: self.lines_read,
            elapsed: self.started.elapsed(),
            violation: self.violation,
        }
    }
}
