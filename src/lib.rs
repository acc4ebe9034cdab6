//! Input-macro compiler and precision playback scheduler.
//!
//! Scripts are compiled into a flat [`Sequence`] of timed instructions, which
//! a [`Scheduler`] replays against a [`timer::Timer`], driving mouse and
//! keyboard output through a [`simulator::Simulator`].
//!
//! # Example
//!
//! ```rust
//! use keytape::code::{Color, KeyCode};
//! use keytape::evaluator::{MemoryClipboard, ScriptEngine};
//! use keytape::interpreter::Environment;
//! use keytape::simulator::{DryRunSimulator, FixedProbe};
//! use keytape::timer::PrecisionTimer;
//! use keytape::{Outcome, PlaybackOptions, Scheduler, compile};
//!
//! let sequence = compile("Key(Down, A)\nDelay(5)\nKey(Up, A)").unwrap();
//!
//! let mut sim = DryRunSimulator::default();
//! let probe = FixedProbe(Color::rgb(0, 0, 0));
//! let mut engine = ScriptEngine::new();
//! let mut clipboard = MemoryClipboard::default();
//! let env = Environment {
//!     simulator: &mut sim,
//!     probe: &probe,
//!     evaluator: &mut engine,
//!     clipboard: &mut clipboard,
//! };
//!
//! let report = Scheduler::new(PrecisionTimer::default(), env, PlaybackOptions::default())
//!     .play(&sequence, None)
//!     .unwrap();
//!
//! assert_eq!(report.outcome, Outcome::Completed);
//! assert_eq!(report.executed, 3);
//! assert!(!sim.is_key_held(KeyCode(0x41)));
//! ```

pub mod code;
pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod exec_context;
pub mod interpreter;
pub mod keys;
pub mod lexer;
pub mod persist;
pub mod scheduler;
pub mod simulator;
pub mod timer;

pub use code::{ControlDirective, Instruction, InstructionKind, Sequence};
pub use compiler::compile;
pub use error::{CompileError, EventExecutionError, FlowControlError, PersistError, PlaybackError};
pub use exec_context::{CancelToken, ExecutionContext, SequenceLoader};
pub use scheduler::{Outcome, PlaybackOptions, PlaybackReport, Scheduler};
