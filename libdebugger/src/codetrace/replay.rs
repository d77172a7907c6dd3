use std::{fmt::Display, str::FromStr};

use libppcisa::{Address, Register};
use log::debug;
use thiserror::Error;

use super::{output::TraceLog, tracked::TrackedSet, CodeTrace, Direction, HitFilter, HitType};
use crate::config::{clamp_results_limit, DEFAULT_RESULTS_LIMIT};

const MEMORY_TARGET_DIGITS: usize = 8;
const MAX_REGISTER_TARGET_LEN: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("Memory address input error: '{0}'")]
    BadAddress(String),

    #[error("Target register or memory input error: '{0}'")]
    Unrecognized(String),
}

/// What a replay starts out following.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceTarget {
    Register(Register),
    /// A word of memory, tracked as its four bytes.
    Memory(Address),
}

impl TraceTarget {
    pub fn tracked(&self) -> TrackedSet {
        match *self {
            Self::Register(register) => TrackedSet::new().with_register(register),
            Self::Memory(address) => TrackedSet::new().with_memory_word(address),
        }
    }
}

impl FromStr for TraceTarget {
    type Err = TargetParseError;

    /// Exactly eight characters is a hex address, anything shorter than five a
    /// register name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.len() == MEMORY_TARGET_DIGITS {
            return Address::from_str_radix(s, 16)
                .map(Self::Memory)
                .map_err(|_| TargetParseError::BadAddress(s.to_string()));
        }

        if s.len() <= MAX_REGISTER_TARGET_LEN {
            if let Some(register) = Register::parse(s) {
                return Ok(Self::Register(register));
            }
        }

        Err(TargetParseError::Unrecognized(s.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Bad range bound '{0}'")]
pub struct RangeBoundParseError(String);

/// One end of the replayed part of a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    /// 1-based position in the log.
    Index(usize),
    /// First occurrence when starting, last occurrence when ending.
    Address(Address),
}

impl FromStr for RangeBound {
    type Err = RangeBoundParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let error = || RangeBoundParseError(s.to_string());

        match s.strip_prefix('#') {
            Some(index) => index.parse().map(Self::Index).map_err(|_| error()),
            None => {
                let hex = s.strip_prefix("0x").unwrap_or(s);
                Address::from_str_radix(hex, 16)
                    .map(Self::Address)
                    .map_err(|_| error())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    BadStart,
    BadEnd,
    EndBeforeStart,
    PathTruncated,
    ResultsLimitReached,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::BadStart => "Input error with starting address.",
            Self::BadEnd => "Input error with ending address.",
            Self::EndBeforeStart => "Custom range places the end before the start. Ignoring.",
            Self::PathTruncated => "Output exceeds results limit. Not all lines will be shown.",
            Self::ResultsLimitReached => "Max table size reached.",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceQuery {
    /// `None` lists the code path without following anything.
    pub target: Option<TraceTarget>,
    pub direction: Direction,
    pub start: Option<RangeBound>,
    pub end: Option<RangeBound>,
    pub filter: HitFilter,
    pub results_limit: usize,
}

impl Default for TraceQuery {
    fn default() -> Self {
        Self {
            target: None,
            direction: Direction::Forward,
            start: None,
            end: None,
            filter: HitFilter::all(),
            results_limit: DEFAULT_RESULTS_LIMIT,
        }
    }
}

impl TraceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: TraceTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn backward(mut self) -> Self {
        self.direction = Direction::Backward;
        self
    }

    pub fn with_range(mut self, start: Option<RangeBound>, end: Option<RangeBound>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_filter(mut self, filter: HitFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_results_limit(mut self, limit: usize) -> Self {
        self.results_limit = clamp_results_limit(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceResult {
    /// 0-based position in the log.
    pub index: usize,
    pub hit: HitType,
    pub registers: Vec<Register>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceReport {
    pub results: Vec<TraceResult>,
    pub diagnostics: Vec<Diagnostic>,
    pub recorded: usize,
}

impl TraceLog {
    fn resolve(&self, bound: RangeBound, last: bool) -> Option<usize> {
        match bound {
            RangeBound::Index(index) if index <= self.len() => Some(index.saturating_sub(1)),
            RangeBound::Index(_) => None,
            RangeBound::Address(address) if last => self.find_last(address),
            RangeBound::Address(address) => self.find_first(address),
        }
    }

    /// Runs the log through a fresh classifier and collects the hits `query`
    /// asks for. Problems with the query are reported, not raised.
    pub fn replay(&self, query: &TraceQuery) -> TraceReport {
        let mut report = TraceReport {
            recorded: self.len(),
            ..Default::default()
        };

        if self.is_empty() {
            return report;
        }

        let last = self.len() - 1;

        let start = match query.start {
            Some(bound) => self.resolve(bound, false).unwrap_or_else(|| {
                report.diagnostics.push(Diagnostic::BadStart);
                0
            }),
            None => 0,
        };

        let end = match query.end {
            Some(bound) => {
                let end = self.resolve(bound, true).unwrap_or_else(|| {
                    report.diagnostics.push(Diagnostic::BadEnd);
                    0
                });

                if end <= start {
                    report.diagnostics.push(Diagnostic::EndBeforeStart);
                    last
                } else {
                    end
                }
            }
            None => last,
        };

        let limit = clamp_results_limit(query.results_limit);
        let indices: Box<dyn Iterator<Item = usize>> = match query.direction {
            Direction::Forward => Box::new(start..=end),
            Direction::Backward => Box::new((start..=end).rev()),
        };

        let Some(target) = query.target else {
            if end - start + 1 > limit {
                report.diagnostics.push(Diagnostic::PathTruncated);
            }

            report.results = indices
                .take(limit)
                .map(|index| TraceResult {
                    index,
                    hit: HitType::Active,
                    registers: Vec::new(),
                })
                .collect();

            return report;
        };

        let mut code_trace = CodeTrace::with_tracked(target.tracked());
        let mut first_hit = true;

        for index in indices {
            let (hit, registers) =
                code_trace.classify_with_registers(&self[index], first_hit, query.direction);

            if hit == HitType::Stop {
                break;
            }

            if !hit.is_hit() {
                continue;
            }

            first_hit = false;

            if query.filter.reports(hit) {
                report.results.push(TraceResult {
                    index,
                    hit,
                    registers,
                });

                if report.results.len() >= limit {
                    report.diagnostics.push(Diagnostic::ResultsLimitReached);
                    break;
                }
            }
        }

        debug!(
            "Replayed {}..={} of {} logged instructions, {} hits",
            start,
            end,
            self.len(),
            report.results.len()
        );

        report
    }
}
