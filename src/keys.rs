//! Name tables for mouse actions, key actions and virtual-key codes.
//!
//! All lookups are case-insensitive: keys in the maps are lowercase and
//! callers go through the functions below.

use phf::{Map, phf_map};

use crate::code::{KeyAction, KeyCode, MouseAction, MouseButton};

const MOUSE_ACTIONS: Map<&'static str, MouseAction> = phf_map! {
    "move" => MouseAction::Move,
    "moveto" => MouseAction::MoveTo,
    "leftdown" => MouseAction::LeftDown,
    "leftup" => MouseAction::LeftUp,
    "rightdown" => MouseAction::RightDown,
    "rightup" => MouseAction::RightUp,
    "middledown" => MouseAction::MiddleDown,
    "middleup" => MouseAction::MiddleUp,
    "wheel" => MouseAction::Wheel,
};

const KEY_ACTIONS: Map<&'static str, KeyAction> = phf_map! {
    "down" => KeyAction::Down,
    "up" => KeyAction::Up,
};

const MOUSE_BUTTONS: Map<&'static str, MouseButton> = phf_map! {
    "left" => MouseButton::Left,
    "right" => MouseButton::Right,
    "middle" => MouseButton::Middle,
};

struct KeyInfo {
    code: u16,
    /// Canonical display name, shared by aliases.
    name: &'static str,
}

/// Virtual-key names.  Please keep each group sorted by code.
const KEY_CODES: Map<&'static str, KeyInfo> = phf_map! {
    "backspace" => KeyInfo { code: 0x08, name: "Backspace" },
    "tab" => KeyInfo { code: 0x09, name: "Tab" },
    "return" => KeyInfo { code: 0x0D, name: "Return" },
    "enter" => KeyInfo { code: 0x0D, name: "Return" },
    "shift" => KeyInfo { code: 0x10, name: "Shift" },
    "control" => KeyInfo { code: 0x11, name: "Control" },
    "ctrl" => KeyInfo { code: 0x11, name: "Control" },
    "alt" => KeyInfo { code: 0x12, name: "Alt" },
    "pause" => KeyInfo { code: 0x13, name: "Pause" },
    "capslock" => KeyInfo { code: 0x14, name: "CapsLock" },
    "escape" => KeyInfo { code: 0x1B, name: "Escape" },
    "esc" => KeyInfo { code: 0x1B, name: "Escape" },
    "space" => KeyInfo { code: 0x20, name: "Space" },
    "pageup" => KeyInfo { code: 0x21, name: "PageUp" },
    "pagedown" => KeyInfo { code: 0x22, name: "PageDown" },
    "end" => KeyInfo { code: 0x23, name: "End" },
    "home" => KeyInfo { code: 0x24, name: "Home" },
    "left" => KeyInfo { code: 0x25, name: "Left" },
    "up" => KeyInfo { code: 0x26, name: "Up" },
    "right" => KeyInfo { code: 0x27, name: "Right" },
    "down" => KeyInfo { code: 0x28, name: "Down" },
    "printscreen" => KeyInfo { code: 0x2C, name: "PrintScreen" },
    "insert" => KeyInfo { code: 0x2D, name: "Insert" },
    "delete" => KeyInfo { code: 0x2E, name: "Delete" },

    "d0" => KeyInfo { code: 0x30, name: "D0" },
    "d1" => KeyInfo { code: 0x31, name: "D1" },
    "d2" => KeyInfo { code: 0x32, name: "D2" },
    "d3" => KeyInfo { code: 0x33, name: "D3" },
    "d4" => KeyInfo { code: 0x34, name: "D4" },
    "d5" => KeyInfo { code: 0x35, name: "D5" },
    "d6" => KeyInfo { code: 0x36, name: "D6" },
    "d7" => KeyInfo { code: 0x37, name: "D7" },
    "d8" => KeyInfo { code: 0x38, name: "D8" },
    "d9" => KeyInfo { code: 0x39, name: "D9" },

    "a" => KeyInfo { code: 0x41, name: "A" },
    "b" => KeyInfo { code: 0x42, name: "B" },
    "c" => KeyInfo { code: 0x43, name: "C" },
    "d" => KeyInfo { code: 0x44, name: "D" },
    "e" => KeyInfo { code: 0x45, name: "E" },
    "f" => KeyInfo { code: 0x46, name: "F" },
    "g" => KeyInfo { code: 0x47, name: "G" },
    "h" => KeyInfo { code: 0x48, name: "H" },
    "i" => KeyInfo { code: 0x49, name: "I" },
    "j" => KeyInfo { code: 0x4A, name: "J" },
    "k" => KeyInfo { code: 0x4B, name: "K" },
    "l" => KeyInfo { code: 0x4C, name: "L" },
    "m" => KeyInfo { code: 0x4D, name: "M" },
    "n" => KeyInfo { code: 0x4E, name: "N" },
    "o" => KeyInfo { code: 0x4F, name: "O" },
    "p" => KeyInfo { code: 0x50, name: "P" },
    "q" => KeyInfo { code: 0x51, name: "Q" },
    "r" => KeyInfo { code: 0x52, name: "R" },
    "s" => KeyInfo { code: 0x53, name: "S" },
    "t" => KeyInfo { code: 0x54, name: "T" },
    "u" => KeyInfo { code: 0x55, name: "U" },
    "v" => KeyInfo { code: 0x56, name: "V" },
    "w" => KeyInfo { code: 0x57, name: "W" },
    "x" => KeyInfo { code: 0x58, name: "X" },
    "y" => KeyInfo { code: 0x59, name: "Y" },
    "z" => KeyInfo { code: 0x5A, name: "Z" },
    "lwin" => KeyInfo { code: 0x5B, name: "LWin" },
    "rwin" => KeyInfo { code: 0x5C, name: "RWin" },

    "numpad0" => KeyInfo { code: 0x60, name: "NumPad0" },
    "numpad1" => KeyInfo { code: 0x61, name: "NumPad1" },
    "numpad2" => KeyInfo { code: 0x62, name: "NumPad2" },
    "numpad3" => KeyInfo { code: 0x63, name: "NumPad3" },
    "numpad4" => KeyInfo { code: 0x64, name: "NumPad4" },
    "numpad5" => KeyInfo { code: 0x65, name: "NumPad5" },
    "numpad6" => KeyInfo { code: 0x66, name: "NumPad6" },
    "numpad7" => KeyInfo { code: 0x67, name: "NumPad7" },
    "numpad8" => KeyInfo { code: 0x68, name: "NumPad8" },
    "numpad9" => KeyInfo { code: 0x69, name: "NumPad9" },
    "multiply" => KeyInfo { code: 0x6A, name: "Multiply" },
    "add" => KeyInfo { code: 0x6B, name: "Add" },
    "subtract" => KeyInfo { code: 0x6D, name: "Subtract" },
    "decimal" => KeyInfo { code: 0x6E, name: "Decimal" },
    "divide" => KeyInfo { code: 0x6F, name: "Divide" },

    "f1" => KeyInfo { code: 0x70, name: "F1" },
    "f2" => KeyInfo { code: 0x71, name: "F2" },
    "f3" => KeyInfo { code: 0x72, name: "F3" },
    "f4" => KeyInfo { code: 0x73, name: "F4" },
    "f5" => KeyInfo { code: 0x74, name: "F5" },
    "f6" => KeyInfo { code: 0x75, name: "F6" },
    "f7" => KeyInfo { code: 0x76, name: "F7" },
    "f8" => KeyInfo { code: 0x77, name: "F8" },
    "f9" => KeyInfo { code: 0x78, name: "F9" },
    "f10" => KeyInfo { code: 0x79, name: "F10" },
    "f11" => KeyInfo { code: 0x7A, name: "F11" },
    "f12" => KeyInfo { code: 0x7B, name: "F12" },

    "numlock" => KeyInfo { code: 0x90, name: "NumLock" },
    "scrolllock" => KeyInfo { code: 0x91, name: "ScrollLock" },
    "lshift" => KeyInfo { code: 0xA0, name: "LShift" },
    "rshift" => KeyInfo { code: 0xA1, name: "RShift" },
    "lcontrol" => KeyInfo { code: 0xA2, name: "LControl" },
    "rcontrol" => KeyInfo { code: 0xA3, name: "RControl" },
    "lalt" => KeyInfo { code: 0xA4, name: "LAlt" },
    "ralt" => KeyInfo { code: 0xA5, name: "RAlt" },
};

pub fn mouse_action(name: &str) -> Option<MouseAction> {
    MOUSE_ACTIONS.get(name.to_ascii_lowercase().as_str()).copied()
}

pub fn key_action(name: &str) -> Option<KeyAction> {
    KEY_ACTIONS.get(name.to_ascii_lowercase().as_str()).copied()
}

pub fn mouse_button(name: &str) -> Option<MouseButton> {
    MOUSE_BUTTONS.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Look up a key by name.
pub fn key_code(name: &str) -> Option<KeyCode> {
    KEY_CODES
        .get(name.to_ascii_lowercase().as_str())
        .map(|info| KeyCode(info.code))
}

/// Canonical name of a key code, if it has one.
pub fn key_name(code: KeyCode) -> Option<&'static str> {
    KEY_CODES
        .values()
        .find(|info| info.code == code.0)
        .map(|info| info.name)
}
