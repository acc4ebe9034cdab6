//! Input emission and screen sampling capabilities.
//!
//! Provides the `Simulator` and `PixelProbe` traits plus stand-ins:
//! - `DryRunSimulator`, which tracks input state and logs instead of emitting
//! - `FixedProbe`, which reports one colour for every pixel
//! - `MockSimulator` for testing

use std::collections::HashSet;

use thiserror::Error;

use crate::code::{Color, KeyCode, MouseButton};

/// A backend refused or failed to emit an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulatorError {
    #[error("invalid screen resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },
    #[error("input backend failure: {0}")]
    Backend(String),
}

/// Output capability invoked by mouse, key and script instructions.
pub trait Simulator {
    /// Relative cursor move.
    fn mouse_move(&mut self, dx: i32, dy: i32) -> Result<(), SimulatorError>;

    /// Absolute cursor move.
    fn mouse_move_to(&mut self, x: i32, y: i32) -> Result<(), SimulatorError>;

    fn mouse_down(&mut self, button: MouseButton) -> Result<(), SimulatorError>;

    fn mouse_up(&mut self, button: MouseButton) -> Result<(), SimulatorError>;

    /// Scroll by `amount` wheel units; positive is away from the user.
    fn mouse_wheel(&mut self, amount: i32) -> Result<(), SimulatorError>;

    fn key_down(&mut self, key: KeyCode) -> Result<(), SimulatorError>;

    fn key_up(&mut self, key: KeyCode) -> Result<(), SimulatorError>;

    fn release_all_keys(&mut self) -> Result<(), SimulatorError>;

    fn release_all_mouse(&mut self) -> Result<(), SimulatorError>;

    /// Needed only by backends that map absolute coordinates.
    fn set_screen_resolution(&mut self, width: u32, height: u32) -> Result<(), SimulatorError>;
}

/// Reads the colour of a screen pixel.
pub trait PixelProbe {
    fn read_pixel_color(&self, x: i32, y: i32) -> Color;
}

/// Probe that answers every read with the same colour.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub Color);

impl PixelProbe for FixedProbe {
    fn read_pixel_color(&self, _x: i32, _y: i32) -> Color {
        self.0
    }
}

/// Simulator that emits nothing. It keeps the cursor position and the set of
/// held keys and buttons, and logs every event.
#[derive(Debug)]
pub struct DryRunSimulator {
    cursor: (i32, i32),
    screen: (u32, u32),
    held_keys: HashSet<KeyCode>,
    held_buttons: HashSet<MouseButton>,
}

impl Default for DryRunSimulator {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl DryRunSimulator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            cursor: (0, 0),
            screen: (width.max(1), height.max(1)),
            held_keys: HashSet::new(),
            held_buttons: HashSet::new(),
        }
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.cursor
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.held_keys.contains(&key)
    }

    pub fn is_button_held(&self, button: MouseButton) -> bool {
        self.held_buttons.contains(&button)
    }

    /// Keep the cursor on screen.
    fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        let max_x = i32::try_from(self.screen.0 - 1).unwrap_or(i32::MAX);
        let max_y = i32::try_from(self.screen.1 - 1).unwrap_or(i32::MAX);
        (x.clamp(0, max_x), y.clamp(0, max_y))
    }
}

impl Simulator for DryRunSimulator {
    fn mouse_move(&mut self, dx: i32, dy: i32) -> Result<(), SimulatorError> {
        let (x, y) = self.cursor;
        self.cursor = self.clamp(x.saturating_add(dx), y.saturating_add(dy));
        tracing::info!("mouse move by ({}, {}) -> {:?}", dx, dy, self.cursor);
        Ok(())
    }

    fn mouse_move_to(&mut self, x: i32, y: i32) -> Result<(), SimulatorError> {
        self.cursor = self.clamp(x, y);
        tracing::info!("mouse move to {:?}", self.cursor);
        Ok(())
    }

    fn mouse_down(&mut self, button: MouseButton) -> Result<(), SimulatorError> {
        self.held_buttons.insert(button);
        tracing::info!("mouse {:?} down at {:?}", button, self.cursor);
        Ok(())
    }

    fn mouse_up(&mut self, button: MouseButton) -> Result<(), SimulatorError> {
        if !self.held_buttons.remove(&button) {
            tracing::debug!("mouse {:?} released while not held", button);
        }
        tracing::info!("mouse {:?} up at {:?}", button, self.cursor);
        Ok(())
    }

    fn mouse_wheel(&mut self, amount: i32) -> Result<(), SimulatorError> {
        tracing::info!("mouse wheel {}", amount);
        Ok(())
    }

    fn key_down(&mut self, key: KeyCode) -> Result<(), SimulatorError> {
        self.held_keys.insert(key);
        tracing::info!("key {} down", key);
        Ok(())
    }

    fn key_up(&mut self, key: KeyCode) -> Result<(), SimulatorError> {
        if !self.held_keys.remove(&key) {
            tracing::debug!("key {} released while not held", key);
        }
        tracing::info!("key {} up", key);
        Ok(())
    }

    fn release_all_keys(&mut self) -> Result<(), SimulatorError> {
        for key in self.held_keys.drain() {
            tracing::info!("key {} released", key);
        }
        Ok(())
    }

    fn release_all_mouse(&mut self) -> Result<(), SimulatorError> {
        for button in self.held_buttons.drain() {
            tracing::info!("mouse {:?} released", button);
        }
        Ok(())
    }

    fn set_screen_resolution(&mut self, width: u32, height: u32) -> Result<(), SimulatorError> {
        if width == 0 || height == 0 {
            return Err(SimulatorError::InvalidResolution { width, height });
        }
        self.screen = (width, height);
        self.cursor = self.clamp(self.cursor.0, self.cursor.1);
        tracing::debug!("screen resolution set to {}x{}", width, height);
        Ok(())
    }
}

/// Records every call; optionally fails all of them.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockSimulator {
    pub calls: Vec<SimCall>,
    pub fail: bool,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    MouseMove(i32, i32),
    MouseMoveTo(i32, i32),
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    MouseWheel(i32),
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    ReleaseAllKeys,
    ReleaseAllMouse,
    SetScreenResolution(u32, u32),
}

#[cfg(test)]
impl MockSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: Vec::new(),
            fail: true,
        }
    }

    fn record(&mut self, call: SimCall) -> Result<(), SimulatorError> {
        if self.fail {
            return Err(SimulatorError::Backend("mock failure".to_string()));
        }
        self.calls.push(call);
        Ok(())
    }
}

#[cfg(test)]
impl Simulator for MockSimulator {
    fn mouse_move(&mut self, dx: i32, dy: i32) -> Result<(), SimulatorError> {
        self.record(SimCall::MouseMove(dx, dy))
    }

    fn mouse_move_to(&mut self, x: i32, y: i32) -> Result<(), SimulatorError> {
        self.record(SimCall::MouseMoveTo(x, y))
    }

    fn mouse_down(&mut self, button: MouseButton) -> Result<(), SimulatorError> {
        self.record(SimCall::MouseDown(button))
    }

    fn mouse_up(&mut self, button: MouseButton) -> Result<(), SimulatorError> {
        self.record(SimCall::MouseUp(button))
    }

    fn mouse_wheel(&mut self, amount: i32) -> Result<(), SimulatorError> {
        self.record(SimCall::MouseWheel(amount))
    }

    fn key_down(&mut self, key: KeyCode) -> Result<(), SimulatorError> {
        self.record(SimCall::KeyDown(key))
    }

    fn key_up(&mut self, key: KeyCode) -> Result<(), SimulatorError> {
        self.record(SimCall::KeyUp(key))
    }

    fn release_all_keys(&mut self) -> Result<(), SimulatorError> {
        self.record(SimCall::ReleaseAllKeys)
    }

    fn release_all_mouse(&mut self) -> Result<(), SimulatorError> {
        self.record(SimCall::ReleaseAllMouse)
    }

    fn set_screen_resolution(&mut self, width: u32, height: u32) -> Result<(), SimulatorError> {
        self.record(SimCall::SetScreenResolution(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_tracks_cursor() {
        let mut sim = DryRunSimulator::new(100, 50);
        sim.mouse_move_to(10, 10).unwrap();
        sim.mouse_move(5, -3).unwrap();
        assert_eq!(sim.cursor(), (15, 7));
    }

    #[test]
    fn test_dry_run_clamps_to_screen() {
        let mut sim = DryRunSimulator::new(100, 50);
        sim.mouse_move_to(500, -20).unwrap();
        assert_eq!(sim.cursor(), (99, 0));
        sim.set_screen_resolution(40, 40).unwrap();
        sim.mouse_move(0, 100).unwrap();
        assert_eq!(sim.cursor(), (39, 39));
    }

    #[test]
    fn test_dry_run_release_all() {
        let mut sim = DryRunSimulator::default();
        sim.key_down(KeyCode(0x41)).unwrap();
        sim.key_down(KeyCode(0x10)).unwrap();
        sim.mouse_down(MouseButton::Left).unwrap();
        assert!(sim.is_key_held(KeyCode(0x41)));

        sim.release_all_keys().unwrap();
        sim.release_all_mouse().unwrap();
        assert!(!sim.is_key_held(KeyCode(0x41)));
        assert!(!sim.is_key_held(KeyCode(0x10)));
        assert!(!sim.is_button_held(MouseButton::Left));
    }

    #[test]
    fn test_key_up_releases_single_key() {
        let mut sim = DryRunSimulator::default();
        sim.key_down(KeyCode(0x41)).unwrap();
        sim.key_up(KeyCode(0x41)).unwrap();
        assert!(!sim.is_key_held(KeyCode(0x41)));
        // Releasing a key that is not held is not an error.
        assert!(sim.key_up(KeyCode(0x42)).is_ok());
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let mut sim = DryRunSimulator::default();
        assert_eq!(
            sim.set_screen_resolution(0, 10),
            Err(SimulatorError::InvalidResolution {
                width: 0,
                height: 10
            })
        );
    }

    #[test]
    fn test_fixed_probe() {
        let probe = FixedProbe(Color::rgb(1, 2, 3));
        assert_eq!(probe.read_pixel_color(0, 0), Color::rgb(1, 2, 3));
        assert_eq!(probe.read_pixel_color(-5, 900), Color::rgb(1, 2, 3));
    }
}
