use std::{fmt::Display, time::Instant};

use libppcisa::Address;
use log::{debug, info, warn};

use super::{
    output::{TraceLog, TraceOutput},
    session::{Session, SessionError},
    tracked::TrackedSet,
    CodeTrace, Direction, HitType,
};
use crate::{
    config::TraceConfig,
    system::{Cpu, CpuThreadGuard, Disassembler},
};

/// When auto-stepping hands control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoStop {
    /// On any load, store or use of the value.
    #[default]
    Always,
    /// When the value is read.
    Used,
    /// When the value is changed.
    Changed,
}

impl AutoStop {
    pub fn threshold(&self) -> HitType {
        match self {
            Self::Always => HitType::LoadStore,
            Self::Used => HitType::Passive,
            Self::Changed => HitType::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every tracked register and byte was overwritten.
    TargetLost,
    TimedOut,
    Hit(HitType),
}

impl Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetLost => f.write_str("Target value was overwritten"),
            Self::TimedOut => f.write_str("Auto-stepping timed out"),
            Self::Hit(hit) => write!(f, "Value tracked to current instruction ({})", hit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoStepResults {
    pub count: usize,
    pub stop: StopReason,
    pub last_hit: HitType,
    pub tracked: TrackedSet,
}

impl AutoStepResults {
    pub fn timed_out(&self) -> bool {
        self.stop == StopReason::TimedOut
    }

    pub fn target_lost(&self) -> bool {
        self.stop == StopReason::TargetLost
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordResults {
    /// A timed out recording may not start at a real entry point, so backtraces
    /// over it are unreliable.
    pub timed_out: bool,
    pub recorded: usize,
    pub capacity: usize,
    /// How often the log was thrown away because execution looped back to its start.
    pub restarts: usize,
}

impl RecordResults {
    pub fn truncated(&self) -> bool {
        self.recorded >= self.capacity
    }
}

/// Owns the recorded log and the auto-step state between calls.
#[derive(Debug, Clone)]
pub struct Tracer {
    config: TraceConfig,
    session: Session,
    log: TraceLog,
    code_trace: CodeTrace,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(TraceConfig::default())
    }
}

impl Tracer {
    pub fn new(config: TraceConfig) -> Self {
        Self {
            log: TraceLog::new(config.log_capacity),
            config,
            session: Session::Idle,
            code_trace: CodeTrace::new(),
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    pub fn log(&self) -> &TraceLog {
        &self.log
    }

    pub fn tracked(&self) -> &TrackedSet {
        self.code_trace.tracked()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn clear_all(&mut self) {
        self.log.clear();
        self.code_trace = CodeTrace::new();
    }

    /// Tracks the left-most register of the instruction at the pc. Branches and
    /// other instructions without one give `None`.
    pub fn current_target<S>(guard: &CpuThreadGuard<'_, S>) -> Option<TrackedSet>
    where
        S: Cpu + Disassembler + ?Sized,
    {
        let output = TraceOutput::capture(guard.system());
        let target = output.attributes()?.target?;

        Some(TrackedSet::new().with_register(target))
    }

    /// Steps until `stop_address`, the time limit, or a full log. The log is
    /// replaced, and restarted whenever `clear_on_loop` is set and execution
    /// returns to where it began.
    pub fn record_trace<S>(
        &mut self,
        guard: &mut CpuThreadGuard<'_, S>,
        stop_address: Option<Address>,
        clear_on_loop: bool,
    ) -> Result<RecordResults, SessionError>
    where
        S: Cpu + Disassembler + ?Sized,
    {
        if !guard.system().is_stepping() {
            return Err(SessionError::NotStepping);
        }

        self.session.begin()?;
        let results = self.record(guard, stop_address, clear_on_loop);
        self.session.end();

        if results.timed_out {
            warn!("Record trace ran out of time; backtraces won't be correct");
        }
        info!(
            "Recorded {} instructions ({} restarts)",
            results.recorded, results.restarts
        );

        Ok(results)
    }

    /// Steps the CPU and follows the tracked values forward until `stop` is met,
    /// they are all lost, or the timeout runs out. `None` continues the previous
    /// session with what it was tracking when it stopped. Executed instructions
    /// are logged only if the log was empty to begin with.
    pub fn auto_step<S>(
        &mut self,
        guard: &mut CpuThreadGuard<'_, S>,
        initial: Option<TrackedSet>,
        stop: AutoStop,
    ) -> Result<AutoStepResults, SessionError>
    where
        S: Cpu + Disassembler + ?Sized,
    {
        if !guard.system().is_stepping() {
            return Err(SessionError::NotStepping);
        }

        self.session.begin()?;

        let first_hit = initial.is_some();
        if let Some(initial) = initial {
            self.code_trace = CodeTrace::with_tracked(initial);
        }

        let results = self.step_until(guard, first_hit, stop);
        self.session.end();

        debug!(
            "Auto-step ran {} instructions and stopped: {}",
            results.count, results.stop
        );

        Ok(results)
    }

    fn record<S>(
        &mut self,
        guard: &mut CpuThreadGuard<'_, S>,
        stop_address: Option<Address>,
        clear_on_loop: bool,
    ) -> RecordResults
    where
        S: Cpu + Disassembler + ?Sized,
    {
        let system = guard.system_mut();
        let started = Instant::now();
        let loop_start = system.pc();

        self.log.clear();
        self.log.reserve();

        let mut restarts = 0;
        let mut timed_out = false;

        loop {
            if started.elapsed() >= self.config.record_time_limit {
                timed_out = true;
                break;
            }

            if !self.log.push(TraceOutput::capture(&*system)) {
                break;
            }

            system.single_step();
            let pc = system.pc();

            if stop_address == Some(pc) {
                break;
            }

            if clear_on_loop && pc == loop_start {
                self.log.clear();
                restarts += 1;
            }
        }

        RecordResults {
            timed_out,
            recorded: self.log.len(),
            capacity: self.log.capacity(),
            restarts,
        }
    }

    fn step_until<S>(
        &mut self,
        guard: &mut CpuThreadGuard<'_, S>,
        mut first_hit: bool,
        stop: AutoStop,
    ) -> AutoStepResults
    where
        S: Cpu + Disassembler + ?Sized,
    {
        let system = guard.system_mut();
        let started = Instant::now();
        let log_trace = self.log.is_empty();

        let mut count = 0;
        let mut last_hit = HitType::Skip;

        let reason = loop {
            if self.code_trace.tracked().is_empty() {
                break StopReason::TargetLost;
            }

            if started.elapsed() >= self.config.auto_step_timeout {
                break StopReason::TimedOut;
            }

            let output = TraceOutput::capture(&*system);
            system.single_step();
            count += 1;

            let hit = self.code_trace.classify(&output, first_hit, Direction::Forward);
            first_hit = false;

            if log_trace {
                self.log.push(output);
            }

            if hit.is_hit() {
                last_hit = hit;
            }

            if self.code_trace.tracked().is_empty() {
                break StopReason::TargetLost;
            }

            if hit.is_hit() && hit >= stop.threshold() {
                break StopReason::Hit(hit);
            }
        };

        AutoStepResults {
            count,
            stop: reason,
            last_hit,
            tracked: self.code_trace.tracked().clone(),
        }
    }
}
