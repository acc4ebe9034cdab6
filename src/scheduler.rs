//! Playback engine.
//!
//! Walks a [`Sequence`] against a [`Timer`], firing each instruction at its
//! scheduled time and applying the [`ControlDirective`] its handler returns.
//!
//! Timing model:
//! - each instruction's gap is added to a running `scheduled` deadline;
//! - a `Delay` payload is added after the delay executes;
//! - a `Jump` rebases `scheduled` to the landing time, dropping any timing
//!   debt so backward loops do not fire a burst of overdue instructions;
//! - a file transfer starts a fresh run over the loaded sequence and never
//!   returns to the original one. Relative targets in the loaded sequence
//!   resolve against the directory it was loaded from.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::code::{ControlDirective, Instruction, InstructionKind, Sequence};
use crate::error::{EventExecutionError, PlaybackError};
use crate::exec_context::{CancelToken, ExecutionContext, SequenceLoader};
use crate::interpreter::{Environment, HandlerError, execute_instruction};
use crate::timer::{Timer, WaitOutcome};

/// Playback tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    /// Multiplier on playback rate; 2.0 halves every gap and delay.
    pub speed: f64,
    /// Keep every timing sample in the report.
    pub capture_timing: bool,
    /// Lateness above this is logged as a warning.
    pub lateness_warning: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            capture_timing: false,
            lateness_warning: Duration::from_millis(5),
        }
    }
}

/// How a run ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran off the end of the sequence.
    Completed,
    /// Reached an `Exit`.
    Stopped,
    Cancelled,
}

/// Deadline and actual firing time of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSample {
    pub index: usize,
    pub scheduled: Instant,
    pub actual: Instant,
}

impl TimingSample {
    pub fn lateness(&self) -> Duration {
        self.actual.saturating_duration_since(self.scheduled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub outcome: Outcome,
    /// Instructions dispatched, across all transferred runs.
    pub executed: usize,
    /// File transfers taken.
    pub transfers: usize,
    /// Empty unless timing capture is enabled.
    pub samples: Vec<TimingSample>,
    pub max_lateness: Duration,
}

impl PlaybackReport {
    fn new() -> Self {
        Self {
            outcome: Outcome::Completed,
            executed: 0,
            transfers: 0,
            samples: Vec::new(),
            max_lateness: Duration::ZERO,
        }
    }

    /// Mean lateness over the captured samples.
    pub fn mean_lateness(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().map(TimingSample::lateness).sum();
        Some(total / self.samples.len() as u32)
    }
}

/// How a single run over one sequence ended.
enum RunEnd {
    Finished(Outcome),
    Transfer { sequence: Sequence, path: PathBuf },
}

pub struct Scheduler<'a, T: Timer> {
    timer: T,
    env: Environment<'a>,
    options: PlaybackOptions,
    cancel: CancelToken,
}

impl<'a, T: Timer> Scheduler<'a, T> {
    pub fn new(timer: T, env: Environment<'a>, mut options: PlaybackOptions) -> Self {
        if !(options.speed.is_finite() && options.speed > 0.0) {
            tracing::warn!("ignoring invalid playback speed {}", options.speed);
            options.speed = 1.0;
        }
        Self {
            timer,
            env,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally created token, e.g. one shared with a signal handler.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn environment_mut(&mut self) -> &mut Environment<'a> {
        &mut self.env
    }

    /// Play `sequence` to the end, following file transfers.
    ///
    /// Cancellation is reported as [`Outcome::Cancelled`], not as an error.
    pub fn play(
        &mut self,
        sequence: &Sequence,
        loader: Option<&dyn SequenceLoader>,
    ) -> Result<PlaybackReport, PlaybackError> {
        let mut report = PlaybackReport::new();
        let mut transferred: Option<Sequence> = None;
        let mut origin: Option<PathBuf> = None;
        tracing::info!("playback started ({} instructions)", sequence.len());

        loop {
            let current = transferred.as_ref().unwrap_or(sequence);
            match self.run(current, loader, origin.as_deref(), &mut report)? {
                RunEnd::Finished(outcome) => {
                    report.outcome = outcome;
                    break;
                }
                RunEnd::Transfer { sequence, path } => {
                    report.transfers += 1;
                    origin = path.parent().map(Path::to_path_buf);
                    transferred = Some(sequence);
                }
            }
        }

        tracing::info!(
            "playback finished: {:?} after {} instructions, {} transfers, max lateness {:?}",
            report.outcome,
            report.executed,
            report.transfers,
            report.max_lateness
        );
        Ok(report)
    }

    fn run(
        &mut self,
        sequence: &Sequence,
        loader: Option<&dyn SequenceLoader>,
        origin: Option<&Path>,
        report: &mut PlaybackReport,
    ) -> Result<RunEnd, PlaybackError> {
        let mut ctx = ExecutionContext::new(sequence, loader, self.cancel.clone());
        if let Some(dir) = origin {
            ctx = ctx.with_origin(dir);
        }
        let mut scheduled = self.timer.now();

        loop {
            if ctx.is_cancelled() {
                return Ok(RunEnd::Finished(Outcome::Cancelled));
            }
            let Some(instr) = ctx.current() else {
                return Ok(RunEnd::Finished(Outcome::Completed));
            };
            let index = ctx.index();

            scheduled = self
                .offset(scheduled, instr.time_since_previous_ms)
                .ok_or_else(|| delay_error(index, instr, instr.time_since_previous_ms))?;
            if self.timer.wait_until(scheduled, &self.cancel) == WaitOutcome::Cancelled {
                return Ok(RunEnd::Finished(Outcome::Cancelled));
            }
            self.record(report, index, scheduled);

            tracing::debug!("[{}] {}", index, instr);
            let directive = execute_instruction(&ctx, instr, &mut self.env)
                .map_err(|err| playback_error(index, instr, err))?;
            report.executed += 1;

            match directive {
                ControlDirective::Continue => {
                    let payload_ms = match instr.kind {
                        InstructionKind::Delay { duration_ms } => duration_ms,
                        _ => 0.0,
                    };
                    let fired = scheduled;
                    scheduled = self
                        .offset(scheduled, payload_ms)
                        .ok_or_else(|| delay_error(index, instr, payload_ms))?;
                    if !ctx.advance() {
                        // A trailing delay still paces the end of the run.
                        if scheduled > fired
                            && self.timer.wait_until(scheduled, &self.cancel)
                                == WaitOutcome::Cancelled
                        {
                            return Ok(RunEnd::Finished(Outcome::Cancelled));
                        }
                        return Ok(RunEnd::Finished(Outcome::Completed));
                    }
                }
                ControlDirective::Jump(target) => {
                    ctx.jump_to(target)
                        .map_err(|source| PlaybackError::FlowControl {
                            index,
                            instruction: instr.to_string(),
                            source,
                        })?;
                    scheduled = self.timer.now();
                }
                ControlDirective::Break => return Ok(RunEnd::Finished(Outcome::Stopped)),
                ControlDirective::JumpToFile(path) => {
                    let next = ctx
                        .load_external(&path)
                        .map_err(|source| PlaybackError::FlowControl {
                            index,
                            instruction: instr.to_string(),
                            source,
                        })?;
                    let path = ctx.resolve_external(&path);
                    tracing::info!(
                        "transferring to {} ({} instructions)",
                        path.display(),
                        next.len()
                    );
                    return Ok(RunEnd::Transfer {
                        sequence: next,
                        path,
                    });
                }
            }
        }
    }

    /// `from` plus `ms` scaled by the speed multiplier, or `None`
    /// when the result cannot be represented.
    fn offset(&self, from: Instant, ms: f64) -> Option<Instant> {
        if ms.is_nan() || ms <= 0.0 {
            return Some(from);
        }
        let wait = Duration::try_from_secs_f64(ms / 1000.0 / self.options.speed).ok()?;
        from.checked_add(wait)
    }

    fn record(&self, report: &mut PlaybackReport, index: usize, scheduled: Instant) {
        let sample = TimingSample {
            index,
            scheduled,
            actual: self.timer.now(),
        };
        let lateness = sample.lateness();
        tracing::trace!("[{}] fired {:?} late", index, lateness);
        if lateness > self.options.lateness_warning {
            tracing::warn!("instruction {} fired {:?} late", index, lateness);
        }
        report.max_lateness = report.max_lateness.max(lateness);
        if self.options.capture_timing {
            report.samples.push(sample);
        }
    }
}

fn delay_error(index: usize, instr: &Instruction, ms: f64) -> PlaybackError {
    PlaybackError::EventExecution {
        index,
        instruction: instr.to_string(),
        source: EventExecutionError::DelayOutOfRange(ms),
    }
}

fn playback_error(index: usize, instr: &Instruction, err: HandlerError) -> PlaybackError {
    let instruction = instr.to_string();
    match err {
        HandlerError::Flow(source) => PlaybackError::FlowControl {
            index,
            instruction,
            source,
        },
        HandlerError::Execution(source) => PlaybackError::EventExecution {
            index,
            instruction,
            source,
        },
    }
}
