//! Flat intermediate representation shared by the compiler and the scheduler.
//!
//! A [`Sequence`] is an ordered list of [`Instruction`]s. Structured control
//! flow has already been lowered to labels, jumps and branches, so the
//! scheduler only ever moves a program counter through a linear list.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::keys;

/// Longest gap or delay accepted from a script or a saved sequence (one day).
pub const MAX_DELAY_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// An immutable, compiled or recorded instruction sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence {
    instructions: Vec<Instruction>,
}

impl Sequence {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl From<Vec<Instruction>> for Sequence {
    fn from(instructions: Vec<Instruction>) -> Self {
        Self::new(instructions)
    }
}

/// A single timed instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Recorded or authored gap before this instruction fires.
    #[serde(default)]
    pub time_since_previous_ms: f64,
    /// Optional jump-target name; any instruction may carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: InstructionKind,
}

impl Instruction {
    pub fn new(kind: InstructionKind) -> Self {
        Self {
            time_since_previous_ms: 0.0,
            name: None,
            kind,
        }
    }

    pub fn with_gap(mut self, ms: f64) -> Self {
        self.time_since_previous_ms = ms;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The name this instruction can be jumped to by: its explicit name, or
    /// the name of a label marker.
    pub fn target_name(&self) -> Option<&str> {
        match (&self.name, &self.kind) {
            (Some(name), _) => Some(name),
            (None, InstructionKind::Label { name }) => Some(name),
            _ => None,
        }
    }
}

/// The closed set of instruction kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstructionKind {
    /// Zero-effect jump target.
    Label { name: String },
    /// Extra pacing consumed after the instruction executes.
    Delay { duration_ms: f64 },
    Mouse {
        action: MouseAction,
        x: i32,
        y: i32,
        #[serde(default)]
        wheel_delta: i32,
    },
    Key { action: KeyAction, key: KeyCode },
    /// Lines handed to the expression evaluator in order.
    Script { lines: Vec<String> },
    /// Unconditional jump; the name wins over the index when both are set.
    Jump {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_index: Option<usize>,
    },
    Branch {
        condition: Condition,
        true_target: BranchTarget,
        #[serde(default)]
        false_target: BranchTarget,
    },
    /// Ends the run successfully.
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseAction {
    /// Relative move by `(x, y)`.
    Move,
    /// Absolute move to `(x, y)`.
    MoveTo,
    LeftDown,
    LeftUp,
    RightDown,
    RightUp,
    MiddleDown,
    MiddleUp,
    Wheel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseAction {
    /// The button pressed or released by this action, with `true` for a press.
    pub fn button(self) -> Option<(MouseButton, bool)> {
        match self {
            MouseAction::LeftDown => Some((MouseButton::Left, true)),
            MouseAction::LeftUp => Some((MouseButton::Left, false)),
            MouseAction::RightDown => Some((MouseButton::Right, true)),
            MouseAction::RightUp => Some((MouseButton::Right, false)),
            MouseAction::MiddleDown => Some((MouseButton::Middle, true)),
            MouseAction::MiddleUp => Some((MouseButton::Middle, false)),
            MouseAction::Move | MouseAction::MoveTo | MouseAction::Wheel => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAction {
    Down,
    Up,
}

/// A virtual-key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u16);

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match keys::key_name(*self) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// An ARGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { a: 255, r, g, b }
    }

    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    /// True when every channel differs by at most `tolerance`.
    pub fn matches(&self, other: &Color, tolerance: u8) -> bool {
        [
            (self.a, other.a),
            (self.r, other.r),
            (self.g, other.g),
            (self.b, other.b),
        ]
        .iter()
        .all(|&(x, y)| x.abs_diff(y) <= tolerance)
    }

    /// Parse `#RRGGBB` or `#AARRGGBB`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        let value = u32::from_str_radix(hex, 16).ok()?;
        match hex.len() {
            6 => Some(Self::rgb((value >> 16) as u8, (value >> 8) as u8, value as u8)),
            8 => Some(Self::argb(
                (value >> 24) as u8,
                (value >> 16) as u8,
                (value >> 8) as u8,
                value as u8,
            )),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}{:02X}", self.a, self.r, self.g, self.b)
    }
}

/// What a branch tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Pixel {
        x: i32,
        y: i32,
        color: Color,
        #[serde(default)]
        tolerance: u8,
    },
    /// Opaque text handed to the expression evaluator.
    Expression { source: String },
}

/// Where a branch goes: a label in this sequence, or another file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl BranchTarget {
    pub fn label(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            file: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            file: Some(path.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.file.is_none()
    }
}

/// How the scheduler picks the next program counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlDirective {
    Continue,
    Jump(usize),
    Break,
    JumpToFile(PathBuf),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "[{}] ", name)?;
        }
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionKind::Label { name } => write!(f, "label {}", name),
            InstructionKind::Delay { duration_ms } => write!(f, "Delay({})", duration_ms),
            InstructionKind::Mouse {
                action: MouseAction::Wheel,
                x,
                y,
                wheel_delta,
            } => write!(f, "Mouse(Wheel, {}, {}, {})", x, y, wheel_delta),
            InstructionKind::Mouse { action, x, y, .. } => {
                write!(f, "Mouse({:?}, {}, {})", action, x, y)
            }
            InstructionKind::Key { action, key } => write!(f, "Key({:?}, {})", action, key),
            InstructionKind::Script { lines } => write!(f, "Script({} lines)", lines.len()),
            InstructionKind::Jump {
                target_name: Some(name),
                ..
            } => write!(f, "goto {}", name),
            InstructionKind::Jump {
                target_index: Some(index),
                ..
            } => write!(f, "goto #{}", index),
            InstructionKind::Jump { .. } => write!(f, "goto ?"),
            InstructionKind::Branch {
                condition,
                true_target,
                false_target,
            } => write!(
                f,
                "if {} then {} else {}",
                condition, true_target, false_target
            ),
            InstructionKind::Break => write!(f, "Exit"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Pixel {
                x,
                y,
                color,
                tolerance,
            } => write!(f, "PixelColor({}, {}) == {} ~{}", x, y, color, tolerance),
            Condition::Expression { source } => write!(f, "Custom(`{}`)", source),
        }
    }
}

impl fmt::Display for BranchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.file) {
            (_, Some(path)) => write!(f, "file {}", path.display()),
            (Some(name), None) => write!(f, "{}", name),
            (None, None) => write!(f, "next"),
        }
    }
}
