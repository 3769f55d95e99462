use std::collections::HashSet;
use std::mem;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if ch.is_ascii_alphabetic() => {
                Some(Self::Character(ch.to_ascii_uppercase()))
            }
            (Some(ch), None) if ch.is_ascii_digit() => Some(Self::Digit(ch as u8 - b'0')),
            _ => None,
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Tab" => Tab,
        "Left" => Left,
        "Right" => Right,
        "Up" => Up,
        "Down" => Down,
        "Escape" | "Esc" => Escape,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
}

/// Keyboard, cursor and wheel state gathered between two frames.
#[derive(Debug, Default)]
pub struct InputState {
    keys: HashSet<KeyCode>,
    pressed: HashSet<KeyCode>,
    cursor: Option<Vec2>,
    cursor_moved: bool,
    scroll: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&mut self, key: KeyCode) {
        // key repeat must not retrigger toggles
        if self.keys.insert(key) {
            self.pressed.insert(key);
        }
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_key_down_by_name(&self, name: &str) -> bool {
        KeyCode::from_name(name).is_some_and(|key| self.is_key_down(key))
    }

    /// Keys that went down since the last call.
    pub fn take_pressed(&mut self) -> HashSet<KeyCode> {
        mem::take(&mut self.pressed)
    }

    /// Window-space cursor position in pixels.
    pub fn set_cursor_position(&mut self, position: Vec2) {
        self.cursor = Some(position);
        self.cursor_moved = true;
    }

    /// Moves a virtual cursor by a raw pointer delta. While the pointer is
    /// grabbed this position is unbounded, like a disabled GLFW cursor.
    pub fn add_cursor_delta(&mut self, delta: Vec2) {
        let origin = self.cursor.unwrap_or(Vec2::ZERO);
        self.set_cursor_position(origin + delta);
    }

    pub fn cursor_position(&self) -> Option<Vec2> {
        self.cursor
    }

    /// Latest cursor position if it moved since the last call.
    pub fn take_cursor_motion(&mut self) -> Option<Vec2> {
        if mem::take(&mut self.cursor_moved) {
            self.cursor
        } else {
            None
        }
    }

    pub fn add_scroll(&mut self, lines: f32) {
        self.scroll += lines;
    }

    pub fn take_scroll(&mut self) -> f32 {
        mem::take(&mut self.scroll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("Tab"),
            Some(KeyCode::Named(NamedKey::Tab))
        );
        assert_eq!(KeyCode::from_name("w"), Some(KeyCode::Character('W')));
        assert_eq!(KeyCode::from_name("2"), Some(KeyCode::Digit(2)));
        assert_eq!(KeyCode::from_name("WW"), None);
    }

    #[test]
    fn input_state_tracks_keys() {
        let mut state = InputState::new();
        state.set_key_down(KeyCode::Character('W'));
        assert!(state.is_key_down_by_name("W"));
        state.set_key_up(KeyCode::Character('W'));
        assert!(!state.is_key_down_by_name("W"));
    }

    #[test]
    fn presses_are_edges_not_levels() {
        let mut state = InputState::new();
        let tab = KeyCode::Named(NamedKey::Tab);
        state.set_key_down(tab);
        state.set_key_down(tab);
        assert_eq!(state.take_pressed().len(), 1);
        assert!(state.take_pressed().is_empty());
        assert!(state.is_key_down(tab));
    }

    #[test]
    fn cursor_and_scroll_are_consumed_once() {
        let mut state = InputState::new();
        assert_eq!(state.take_cursor_motion(), None);
        state.set_cursor_position(Vec2::new(10.0, 20.0));
        state.set_cursor_position(Vec2::new(12.0, 20.0));
        assert_eq!(state.take_cursor_motion(), Some(Vec2::new(12.0, 20.0)));
        assert_eq!(state.take_cursor_motion(), None);
        assert_eq!(state.cursor_position(), Some(Vec2::new(12.0, 20.0)));

        state.add_scroll(1.0);
        state.add_scroll(0.5);
        assert_eq!(state.take_scroll(), 1.5);
        assert_eq!(state.take_scroll(), 0.0);
    }

    #[test]
    fn cursor_deltas_accumulate_past_the_window() {
        let mut state = InputState::new();
        state.add_cursor_delta(Vec2::new(-5.0, 3.0));
        assert_eq!(state.take_cursor_motion(), Some(Vec2::new(-5.0, 3.0)));
        state.set_cursor_position(Vec2::new(790.0, 10.0));
        for _ in 0..4 {
            state.add_cursor_delta(Vec2::new(50.0, -20.0));
        }
        assert_eq!(state.take_cursor_motion(), Some(Vec2::new(990.0, -70.0)));
    }
}
