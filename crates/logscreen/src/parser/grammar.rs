//! Grammar — ordered sections with field extractors and end triggers.

use std::collections::HashSet;

use regex::{Regex, RegexSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("Invalid pattern '{label}' in section '{section}': {source}")]
    InvalidRegex {
        section: String,
        label: String,
        #[source]
        source: regex::Error,
    },
    #[error("Grammar has no sections")]
    EmptyGrammar,
}

/// What an extractor does with its captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorKind {
    /// Every non-empty named group becomes a field.
    Field,
    /// `value_group` is added to the category named by the current value of
    /// `key_field`.
    Category { key_field: String, value_group: String },
}

#[derive(Debug)]
pub struct Extractor {
    pub label: String,
    pub kind: ExtractorKind,
    regex: Regex,
    group_names: Vec<String>,
}

impl Extractor {
    /// Non-empty, trimmed named captures of `line`, in group order.
    pub fn captures(&self, line: &str) -> Option<Vec<(&str, String)>> {
        let caps = self.regex.captures(line)?;
        let values: Vec<(&str, String)> = self
            .group_names
            .iter()
            .filter_map(|name| {
                let value = caps.name(name)?.as_str().trim();
                (!value.is_empty()).then(|| (name.as_str(), value.to_string()))
            })
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values)
        }
    }
}

#[derive(Debug)]
pub struct Section {
    pub name: String,
    extractors: Vec<Extractor>,
    /// Lowercased.
    end_triggers: Vec<String>,
    prefilter: RegexSet,
}

impl Section {
    pub fn extractors(&self) -> &[Extractor] {
        &self.extractors
    }

    pub fn end_triggers(&self) -> &[String] {
        &self.end_triggers
    }

    /// Case-insensitive substring test against the end triggers.
    pub fn is_end(&self, line: &str) -> bool {
        self.end_triggers.iter().any(|t| contains_ignore_case(line, t))
    }

    /// Extractors whose pattern matches `line`, in declaration order.
    pub fn candidates<'a>(&'a self, line: &str) -> impl Iterator<Item = &'a Extractor> + 'a {
        self.prefilter
            .matches(line)
            .into_iter()
            .map(move |idx| &self.extractors[idx])
    }
}

/// Immutable section table shared by every parse.
#[derive(Debug)]
pub struct Grammar {
    sections: Vec<Section>,
    start_markers: Vec<String>,
    multi_value_fields: HashSet<String>,
}

impl Grammar {
    pub fn builder() -> GrammarBuilder {
        GrammarBuilder::default()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, idx: usize) -> Option<&Section> {
        self.sections.get(idx)
    }

    pub fn has_start_markers(&self) -> bool {
        !self.start_markers.is_empty()
    }

    pub fn is_start(&self, line: &str) -> bool {
        self.start_markers.iter().any(|m| line.contains(m.as_str()))
    }

    pub fn is_multi_value(&self, field: &str) -> bool {
        self.multi_value_fields.contains(field)
    }
}

struct PendingExtractor {
    label: String,
    pattern: String,
    kind: ExtractorKind,
}

/// Section under construction.
pub struct SectionBuilder {
    name: String,
    extractors: Vec<PendingExtractor>,
    end_triggers: Vec<String>,
}

impl SectionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extractors: Vec::new(),
            end_triggers: Vec::new(),
        }
    }

    pub fn field(mut self, label: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.extractors.push(PendingExtractor {
            label: label.into(),
            pattern: pattern.into(),
            kind: ExtractorKind::Field,
        });
        self
    }

    pub fn category(
        mut self,
        label: impl Into<String>,
        pattern: impl Into<String>,
        key_field: impl Into<String>,
        value_group: impl Into<String>,
    ) -> Self {
        self.extractors.push(PendingExtractor {
            label: label.into(),
            pattern: pattern.into(),
            kind: ExtractorKind::Category {
                key_field: key_field.into(),
                value_group: value_group.into(),
            },
        });
        self
    }

    pub fn end_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.end_triggers.push(trigger.into());
        self
    }

    fn build(self) -> Result<Section, GrammarError> {
        let name = self.name;
        let invalid = |label: &str, source: regex::Error| GrammarError::InvalidRegex {
            section: name.clone(),
            label: label.to_string(),
            source,
        };

        let mut extractors = Vec::with_capacity(self.extractors.len());
        for pending in &self.extractors {
            let regex = Regex::new(&pending.pattern).map_err(|e| invalid(&pending.label, e))?;
            let group_names = regex.capture_names().flatten().map(str::to_string).collect();
            extractors.push(Extractor {
                label: pending.label.clone(),
                kind: pending.kind.clone(),
                regex,
                group_names,
            });
        }

        let prefilter = RegexSet::new(self.extractors.iter().map(|p| p.pattern.as_str()))
            .map_err(|e| invalid("<prefilter>", e))?;

        Ok(Section {
            name,
            extractors,
            end_triggers: self
                .end_triggers
                .into_iter()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            prefilter,
        })
    }
}

#[derive(Default)]
pub struct GrammarBuilder {
    sections: Vec<SectionBuilder>,
    start_markers: Vec<String>,
    multi_value_fields: HashSet<String>,
}

impl GrammarBuilder {
    pub fn section(mut self, section: SectionBuilder) -> Self {
        self.sections.push(section);
        self
    }

    /// Lines before the first start marker are ignored.
    pub fn start_marker(mut self, marker: impl Into<String>) -> Self {
        self.start_markers.push(marker.into());
        self
    }

    /// Fields that accumulate every distinct value instead of keeping one.
    pub fn multi_value<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.multi_value_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<Grammar, GrammarError> {
        if self.sections.is_empty() {
            return Err(GrammarError::EmptyGrammar);
        }

        let sections = self
            .sections
            .into_iter()
            .map(SectionBuilder::build)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Grammar {
            sections,
            start_markers: self.start_markers,
            multi_value_fields: self.multi_value_fields,
        })
    }
}

/// `needle` must already be lowercase.
pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if haystack.is_ascii() {
        let needle = needle.as_bytes();
        return haystack
            .as_bytes()
            .windows(needle.len())
            .any(|w| w.eq_ignore_ascii_case(needle));
    }
    haystack.to_lowercase().contains(needle)
}
