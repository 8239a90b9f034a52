//! Machine — line-by-line section state machine and its async driver.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::grammar::{ExtractorKind, Grammar};
use super::lines::{LineSplitter, RawLine};
use super::model::{ErrorCode, ParseResult, PolicyViolation};
use super::state::{ParseState, Phase};
use crate::conf::AnalyzerConfig;
use crate::filter::ContentFilter;
use crate::source::PipeReader;

/// Bounds applied to a single parse.
#[derive(Debug, Clone, Copy)]
pub struct ParserLimits {
    pub log_size_limit: u64,
    pub max_line_bytes: usize,
    pub context_excerpt_chars: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self::from(&AnalyzerConfig::default())
    }
}

impl From<&AnalyzerConfig> for ParserLimits {
    fn from(config: &AnalyzerConfig) -> Self {
        Self {
            log_size_limit: config.log_size_limit,
            max_line_bytes: config.max_line_bytes,
            context_excerpt_chars: config.context_excerpt_chars,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Synchronous core: consumes decoded lines and owns the parse state.
pub struct LineMachine<'a> {
    grammar: &'a Grammar,
    filter: &'a ContentFilter,
    limits: ParserLimits,
    state: ParseState,
    /// End of the previous cut piece, prepended for the content filter only.
    filter_tail: String,
}

impl<'a> LineMachine<'a> {
    pub fn new(grammar: &'a Grammar, filter: &'a ContentFilter, limits: ParserLimits) -> Self {
        let initial = if grammar.has_start_markers() {
            Phase::Scanning
        } else {
            Phase::Section(0)
        };
        Self {
            grammar,
            filter,
            limits,
            state: ParseState::new(initial),
            filter_tail: String::new(),
        }
    }

    pub fn feed(&mut self, line: &RawLine) -> Flow {
        if self.state.phase().is_terminal() {
            return Flow::Stop;
        }

        let next = self.state.bytes_read + line.consumed;
        if next > self.limits.log_size_limit {
            warn!(
                "Log exceeds size limit of {} bytes after {} bytes",
                self.limits.log_size_limit, self.state.bytes_read
            );
            self.state.fail(ErrorCode::SizeLimit);
            return Flow::Stop;
        }
        self.state.bytes_read = next;
        self.state.lines_read += 1;

        // A term may straddle the cut between two pieces of an over-long line
        let scanned: Cow<'_, str> = if self.filter_tail.is_empty() {
            Cow::Borrowed(line.text.as_str())
        } else {
            let mut joined = std::mem::take(&mut self.filter_tail);
            joined.push_str(&line.text);
            Cow::Owned(joined)
        };
        if line.cut {
            self.filter_tail = tail_chars(&scanned, self.filter.max_term_chars().saturating_sub(1));
        }

        if let Some(hit) = self.filter.find_first_hit(&scanned) {
            warn!("Banned term #{} found on line {}", hit.term.id, self.state.lines_read);
            self.state.set_violation(PolicyViolation {
                term_id: hit.term.id,
                term: hit.term.text,
                context: excerpt(&scanned, hit.span, self.limits.context_excerpt_chars),
                line: self.state.lines_read,
            });
            self.state.fail(ErrorCode::PolicyViolation);
            return Flow::Stop;
        }

        let idx = match self.state.phase() {
            Phase::Scanning if self.grammar.is_start(&line.text) => {
                debug!("Start marker found on line {}", self.state.lines_read);
                self.state.enter_section(0);
                0
            }
            Phase::Section(idx) => idx,
            _ => return Flow::Continue,
        };

        let Some(section) = self.grammar.section(idx) else {
            self.state.complete();
            return Flow::Stop;
        };

        if section.is_end(&line.text) {
            self.state.complete_section(&section.name);
            let next_idx = idx + 1;
            if next_idx < self.grammar.sections().len() {
                debug!("Section '{}' complete, entering section #{}", section.name, next_idx);
                self.state.enter_section(next_idx);
                return Flow::Continue;
            }
            debug!("Final section '{}' complete", section.name);
            self.state.complete();
            return Flow::Stop;
        }

        for extractor in section.candidates(&line.text) {
            let Some(values) = extractor.captures(&line.text) else {
                continue;
            };

            match &extractor.kind {
                ExtractorKind::Field => {
                    for (field, value) in values {
                        let multi = self.grammar.is_multi_value(field);
                        self.state.record(field, value, multi);
                    }
                    break;
                }
                ExtractorKind::Category { key_field, value_group } => {
                    let Some(key) = self.state.value(key_field).map(str::to_string) else {
                        continue;
                    };
                    let Some((_, name)) = values.into_iter().find(|(g, _)| *g == value_group.as_str()) else {
                        continue;
                    };
                    self.state.record_category(&key, value_group, name);
                    break;
                }
            }
        }

        Flow::Continue
    }

    /// Terminate early with `code` unless already terminal.
    pub fn abort(&mut self, code: ErrorCode) {
        self.state.fail(code);
    }

    pub fn finish(self, bytes_total: Option<u64>) -> ParseResult {
        self.state.into_result(self.grammar, bytes_total)
    }
}

/// Last `n` chars of `text`.
fn tail_chars(text: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let start = text.char_indices().rev().nth(n - 1).map_or(0, |(i, _)| i);
    text[start..].to_string()
}

/// Excerpt of at most `max_chars` characters, centred on the match when its
/// position is known.
fn excerpt(text: &str, span: Option<Range<usize>>, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let start = match span {
        Some(span) if span.end <= text.len() => {
            let match_start = text[..span.start].chars().count();
            let match_len = text[span].chars().count();
            let slack = max_chars.saturating_sub(match_len) / 2;
            match_start.saturating_sub(slack).min(total - max_chars)
        }
        _ => 0,
    };

    text.chars().skip(start).take(max_chars).collect()
}

/// Drives a [`LineMachine`] from a pipe.
pub struct LogParser {
    grammar: Arc<Grammar>,
    filter: Arc<ContentFilter>,
    limits: ParserLimits,
}

impl LogParser {
    pub fn new(grammar: Arc<Grammar>, filter: Arc<ContentFilter>, limits: ParserLimits) -> Self {
        Self { grammar, filter, limits }
    }

    /// Consume the pipe until the grammar completes, a terminal error occurs,
    /// the producer finishes or `cancel` fires. The pipe is closed on return
    /// so the producer stops.
    pub async fn parse(
        &self,
        mut reader: PipeReader,
        cancel: &CancellationToken,
        bytes_total: Option<u64>,
    ) -> ParseResult {
        let mut machine = LineMachine::new(&self.grammar, &self.filter, self.limits);
        let mut splitter = LineSplitter::new(self.limits.max_line_bytes);
        let mut lines = Vec::new();

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    machine.abort(ErrorCode::Cancelled);
                    break;
                }
                item = reader.next_chunk() => item,
            };

            match item {
                Some(Ok(chunk)) => {
                    splitter.push(&chunk, &mut lines);
                    if feed_all(&mut machine, &mut lines) == Flow::Stop {
                        break;
                    }
                }
                Some(Err(e)) if e.is_cancelled() => {
                    machine.abort(ErrorCode::Cancelled);
                    break;
                }
                Some(Err(e)) => {
                    warn!("Source failed mid-stream: {}", e);
                    machine.abort(ErrorCode::UnknownError);
                    break;
                }
                None => {
                    if let Some(last) = splitter.finish() {
                        machine.feed(&last);
                    }
                    break;
                }
            }
        }

        reader.close();
        machine.finish(bytes_total)
    }

    /// Parse an in-memory buffer.
    pub fn parse_bytes(&self, data: &[u8]) -> ParseResult {
        let mut machine = LineMachine::new(&self.grammar, &self.filter, self.limits);
        let mut splitter = LineSplitter::new(self.limits.max_line_bytes);
        let mut lines = Vec::new();

        splitter.push(data, &mut lines);
        if feed_all(&mut machine, &mut lines) == Flow::Continue {
            if let Some(last) = splitter.finish() {
                machine.feed(&last);
            }
        }
        machine.finish(Some(data.len() as u64))
    }
}

fn feed_all(machine: &mut LineMachine<'_>, lines: &mut Vec<RawLine>) -> Flow {
    for line in lines.drain(..) {
        if machine.feed(&line) == Flow::Stop {
            return Flow::Stop;
        }
    }
    Flow::Continue
}
