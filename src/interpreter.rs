//! Per-instruction handlers.
//!
//! Each handler performs the instruction's side effect against the bound
//! [`Environment`] and returns a [`ControlDirective`] telling the scheduler
//! where to go next. Handlers never touch the program counter or the clock.

use thiserror::Error;

use crate::code::*;
use crate::error::{EventExecutionError, FlowControlError};
use crate::evaluator::{Bindings, Clipboard, EvalError, Evaluator, Value};
use crate::exec_context::ExecutionContext;
use crate::simulator::{PixelProbe, Simulator, SimulatorError};

/// Collaborators the handlers drive. Shared by nested runs.
pub struct Environment<'a> {
    pub simulator: &'a mut dyn Simulator,
    pub probe: &'a dyn PixelProbe,
    pub evaluator: &'a mut dyn Evaluator,
    pub clipboard: &'a mut dyn Clipboard,
}

impl Environment<'_> {
    /// Release every held key and mouse button.
    pub fn release_all(&mut self) -> Result<(), SimulatorError> {
        self.simulator.release_all_keys()?;
        self.simulator.release_all_mouse()
    }

    fn evaluate(&mut self, expr: &str) -> Result<Value, EvalError> {
        let mut bindings = Bindings {
            simulator: &mut *self.simulator,
            clipboard: &mut *self.clipboard,
        };
        self.evaluator.evaluate(expr, &mut bindings)
    }
}

/// Handler failure, before the scheduler attaches the instruction position.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Flow(#[from] FlowControlError),
    #[error(transparent)]
    Execution(#[from] EventExecutionError),
}

impl From<SimulatorError> for HandlerError {
    fn from(err: SimulatorError) -> Self {
        HandlerError::Execution(err.into())
    }
}

/// Execute a single instruction.
pub fn execute_instruction(
    ctx: &ExecutionContext,
    instr: &Instruction,
    env: &mut Environment,
) -> Result<ControlDirective, HandlerError> {
    match &instr.kind {
        InstructionKind::Label { .. } | InstructionKind::Delay { .. } => {
            Ok(ControlDirective::Continue)
        }
        InstructionKind::Mouse {
            action,
            x,
            y,
            wheel_delta,
        } => {
            execute_mouse(&mut *env.simulator, *action, *x, *y, *wheel_delta)?;
            Ok(ControlDirective::Continue)
        }
        InstructionKind::Key { action, key } => {
            match action {
                KeyAction::Down => env.simulator.key_down(*key)?,
                KeyAction::Up => env.simulator.key_up(*key)?,
            }
            Ok(ControlDirective::Continue)
        }
        InstructionKind::Script { lines } => {
            execute_script(env, lines)?;
            Ok(ControlDirective::Continue)
        }
        InstructionKind::Jump {
            target_name,
            target_index,
        } => execute_jump(ctx, target_name.as_deref(), *target_index),
        InstructionKind::Branch {
            condition,
            true_target,
            false_target,
        } => execute_branch(ctx, env, condition, true_target, false_target),
        InstructionKind::Break => Ok(ControlDirective::Break),
    }
}

fn execute_mouse(
    sim: &mut dyn Simulator,
    action: MouseAction,
    x: i32,
    y: i32,
    wheel_delta: i32,
) -> Result<(), SimulatorError> {
    match action {
        MouseAction::Move => sim.mouse_move(x, y),
        MouseAction::MoveTo => sim.mouse_move_to(x, y),
        MouseAction::Wheel => sim.mouse_wheel(wheel_delta),
        MouseAction::LeftDown => sim.mouse_down(MouseButton::Left),
        MouseAction::LeftUp => sim.mouse_up(MouseButton::Left),
        MouseAction::RightDown => sim.mouse_down(MouseButton::Right),
        MouseAction::RightUp => sim.mouse_up(MouseButton::Right),
        MouseAction::MiddleDown => sim.mouse_down(MouseButton::Middle),
        MouseAction::MiddleUp => sim.mouse_up(MouseButton::Middle),
    }
}

/// Run each non-blank, non-comment line in order. Lines are numbered from 1
/// within the block, counting the skipped ones.
fn execute_script(env: &mut Environment, lines: &[String]) -> Result<(), EventExecutionError> {
    for (number, line) in lines.iter().enumerate() {
        let text = line.trim();
        if text.is_empty() || text.starts_with("//") {
            continue;
        }
        env.evaluate(text)
            .map_err(|source| EventExecutionError::Script {
                line: number + 1,
                source,
            })?;
    }
    Ok(())
}

/// A name wins over an index when both are present.
fn execute_jump(
    ctx: &ExecutionContext,
    target_name: Option<&str>,
    target_index: Option<usize>,
) -> Result<ControlDirective, HandlerError> {
    match (non_blank(target_name), target_index) {
        (Some(name), _) => resolve(ctx, name),
        (None, Some(index)) => Ok(ControlDirective::Jump(index)),
        (None, None) => Err(FlowControlError::MissingTarget.into()),
    }
}

fn execute_branch(
    ctx: &ExecutionContext,
    env: &mut Environment,
    condition: &Condition,
    true_target: &BranchTarget,
    false_target: &BranchTarget,
) -> Result<ControlDirective, HandlerError> {
    let taken = match condition {
        Condition::Pixel {
            x,
            y,
            color,
            tolerance,
        } => env.probe.read_pixel_color(*x, *y).matches(color, *tolerance),
        Condition::Expression { source } => env
            .evaluate(source)
            .map_err(EventExecutionError::Condition)?
            .truthy(),
    };
    tracing::debug!("branch condition {} is {}", condition, taken);

    let target = if taken { true_target } else { false_target };
    if let Some(path) = &target.file {
        return Ok(ControlDirective::JumpToFile(path.clone()));
    }
    match non_blank(target.name.as_deref()) {
        Some(name) => resolve(ctx, name),
        // An unconfigured false target falls through to the next instruction.
        None if !taken => Ok(ControlDirective::Continue),
        None => Err(FlowControlError::MissingTarget.into()),
    }
}

fn resolve(ctx: &ExecutionContext, name: &str) -> Result<ControlDirective, HandlerError> {
    ctx.find_by_name(name)
        .map(ControlDirective::Jump)
        .ok_or_else(|| FlowControlError::UnresolvedLabel(name.to_string()).into())
}

fn non_blank(name: Option<&str>) -> Option<&str> {
    name.filter(|n| !n.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{MemoryClipboard, ScriptEngine};
    use crate::exec_context::CancelToken;
    use crate::simulator::{FixedProbe, MockSimulator, SimCall};
    use std::path::PathBuf;

    struct Fixture {
        sim: MockSimulator,
        probe: FixedProbe,
        engine: ScriptEngine,
        clip: MemoryClipboard,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                sim: MockSimulator::new(),
                probe: FixedProbe(Color::rgb(10, 20, 30)),
                engine: ScriptEngine::new(),
                clip: MemoryClipboard::default(),
            }
        }

        fn env(&mut self) -> Environment<'_> {
            Environment {
                simulator: &mut self.sim,
                probe: &self.probe,
                evaluator: &mut self.engine,
                clipboard: &mut self.clip,
            }
        }
    }

    fn run_single(
        fx: &mut Fixture,
        seq: &Sequence,
        index: usize,
    ) -> Result<ControlDirective, HandlerError> {
        let ctx = ExecutionContext::new(seq, None, CancelToken::new());
        let instr = &seq.instructions()[index];
        execute_instruction(&ctx, instr, &mut fx.env())
    }

    fn label(name: &str) -> Instruction {
        Instruction::new(InstructionKind::Label {
            name: name.to_string(),
        })
    }

    fn branch(condition: Condition, on_true: BranchTarget, on_false: BranchTarget) -> Instruction {
        Instruction::new(InstructionKind::Branch {
            condition,
            true_target: on_true,
            false_target: on_false,
        })
    }

    fn custom(source: &str) -> Condition {
        Condition::Expression {
            source: source.to_string(),
        }
    }

    #[test]
    fn test_label_and_delay_continue() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![
            label("a"),
            Instruction::new(InstructionKind::Delay { duration_ms: 50.0 }),
        ]);
        assert_eq!(run_single(&mut fx, &seq, 0).unwrap(), ControlDirective::Continue);
        assert_eq!(run_single(&mut fx, &seq, 1).unwrap(), ControlDirective::Continue);
        assert!(fx.sim.calls.is_empty());
    }

    #[test]
    fn test_mouse_and_key_emit() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![
            Instruction::new(InstructionKind::Mouse {
                action: MouseAction::MoveTo,
                x: 5,
                y: 6,
                wheel_delta: 0,
            }),
            Instruction::new(InstructionKind::Mouse {
                action: MouseAction::RightDown,
                x: 5,
                y: 6,
                wheel_delta: 0,
            }),
            Instruction::new(InstructionKind::Mouse {
                action: MouseAction::Wheel,
                x: 0,
                y: 0,
                wheel_delta: -120,
            }),
            Instruction::new(InstructionKind::Key {
                action: KeyAction::Up,
                key: KeyCode(0x41),
            }),
        ]);
        for index in 0..seq.len() {
            assert_eq!(
                run_single(&mut fx, &seq, index).unwrap(),
                ControlDirective::Continue
            );
        }
        assert_eq!(
            fx.sim.calls,
            vec![
                SimCall::MouseMoveTo(5, 6),
                SimCall::MouseDown(MouseButton::Right),
                SimCall::MouseWheel(-120),
                SimCall::KeyUp(KeyCode(0x41)),
            ]
        );
    }

    #[test]
    fn test_output_failure() {
        let mut fx = Fixture::new();
        fx.sim = MockSimulator::failing();
        let seq = Sequence::new(vec![Instruction::new(InstructionKind::Key {
            action: KeyAction::Down,
            key: KeyCode(0x41),
        })]);
        assert!(matches!(
            run_single(&mut fx, &seq, 0),
            Err(HandlerError::Execution(EventExecutionError::Output(_)))
        ));
    }

    #[test]
    fn test_script_skips_blank_and_comment_lines() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![Instruction::new(InstructionKind::Script {
            lines: vec![
                "$x = 2".to_string(),
                "".to_string(),
                "  // note".to_string(),
                "$x = $x * 5".to_string(),
            ],
        })]);
        run_single(&mut fx, &seq, 0).unwrap();
        assert_eq!(
            fx.engine.variable("x"),
            Some(&Value::Number(10.0))
        );
    }

    #[test]
    fn test_script_error_reports_line() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![Instruction::new(InstructionKind::Script {
            lines: vec!["$a = 1".to_string(), "".to_string(), "$a + $b".to_string()],
        })]);
        match run_single(&mut fx, &seq, 0) {
            Err(HandlerError::Execution(EventExecutionError::Script { line, source })) => {
                assert_eq!(line, 3);
                assert!(matches!(source, EvalError::UndefinedVariable(_)));
            }
            other => panic!("expected script error, got {:?}", other),
        }
    }

    #[test]
    fn test_jump_by_name_then_index() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![
            label("Top"),
            Instruction::new(InstructionKind::Jump {
                target_name: Some("top".to_string()),
                target_index: Some(7),
            }),
            Instruction::new(InstructionKind::Jump {
                target_name: None,
                target_index: Some(1),
            }),
            Instruction::new(InstructionKind::Jump {
                target_name: Some("gone".to_string()),
                target_index: None,
            }),
            Instruction::new(InstructionKind::Jump {
                target_name: None,
                target_index: None,
            }),
        ]);
        assert_eq!(run_single(&mut fx, &seq, 1).unwrap(), ControlDirective::Jump(0));
        assert_eq!(run_single(&mut fx, &seq, 2).unwrap(), ControlDirective::Jump(1));
        assert!(matches!(
            run_single(&mut fx, &seq, 3),
            Err(HandlerError::Flow(FlowControlError::UnresolvedLabel(name))) if name == "gone"
        ));
        assert!(matches!(
            run_single(&mut fx, &seq, 4),
            Err(HandlerError::Flow(FlowControlError::MissingTarget))
        ));
    }

    #[test]
    fn test_pixel_branch_within_tolerance() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![
            branch(
                Condition::Pixel {
                    x: 0,
                    y: 0,
                    color: Color::rgb(12, 18, 30),
                    tolerance: 2,
                },
                BranchTarget::label("yes"),
                BranchTarget::label("no"),
            ),
            branch(
                Condition::Pixel {
                    x: 0,
                    y: 0,
                    color: Color::argb(0, 10, 20, 30),
                    tolerance: 2,
                },
                BranchTarget::label("yes"),
                BranchTarget::label("no"),
            ),
            label("yes"),
            label("no"),
        ]);
        assert_eq!(run_single(&mut fx, &seq, 0).unwrap(), ControlDirective::Jump(2));
        // Alpha is compared too.
        assert_eq!(run_single(&mut fx, &seq, 1).unwrap(), ControlDirective::Jump(3));
    }

    #[test]
    fn test_branch_false_without_target_continues() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![
            branch(custom("false"), BranchTarget::label("end"), BranchTarget::default()),
            label("end"),
        ]);
        assert_eq!(run_single(&mut fx, &seq, 0).unwrap(), ControlDirective::Continue);
    }

    #[test]
    fn test_branch_true_without_target_fails() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![branch(
            custom("1 == 1"),
            BranchTarget::default(),
            BranchTarget::default(),
        )]);
        assert!(matches!(
            run_single(&mut fx, &seq, 0),
            Err(HandlerError::Flow(FlowControlError::MissingTarget))
        ));
    }

    #[test]
    fn test_branch_unresolved_false_target() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![
            branch(custom("0"), BranchTarget::label("here"), BranchTarget::label("nowhere")),
            label("here"),
        ]);
        assert!(matches!(
            run_single(&mut fx, &seq, 0),
            Err(HandlerError::Flow(FlowControlError::UnresolvedLabel(name))) if name == "nowhere"
        ));
    }

    #[test]
    fn test_branch_file_target() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![branch(
            custom("`yes`"),
            BranchTarget::file("next.json"),
            BranchTarget::default(),
        )]);
        assert_eq!(
            run_single(&mut fx, &seq, 0).unwrap(),
            ControlDirective::JumpToFile(PathBuf::from("next.json"))
        );
    }

    #[test]
    fn test_condition_error() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![branch(
            custom("$undefined"),
            BranchTarget::label("x"),
            BranchTarget::default(),
        )]);
        assert!(matches!(
            run_single(&mut fx, &seq, 0),
            Err(HandlerError::Execution(EventExecutionError::Condition(_)))
        ));
    }

    #[test]
    fn test_break() {
        let mut fx = Fixture::new();
        let seq = Sequence::new(vec![Instruction::new(InstructionKind::Break)]);
        assert_eq!(run_single(&mut fx, &seq, 0).unwrap(), ControlDirective::Break);
    }
}
