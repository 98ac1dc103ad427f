//! Client input management with sequencing and fire edge detection

use shared::CharacterInput;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Fire trigger transitions since the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireEdge {
    Pressed,
    Released,
}

/// Collects axis and button events and turns them into sequenced inputs
pub struct InputManager {
    next_sequence: u32,
    move_forward: f32,
    move_right: f32,
    turn_rate: f32,
    look_up_rate: f32,
    fire_held: bool,
    fire_edges: Vec<FireEdge>,
}

fn clamp_axis(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            move_forward: 0.0,
            move_right: 0.0,
            turn_rate: 0.0,
            look_up_rate: 0.0,
            fire_held: false,
            fire_edges: Vec::new(),
        }
    }

    pub fn move_forward(&mut self, value: f32) {
        self.move_forward = clamp_axis(value);
    }

    pub fn move_right(&mut self, value: f32) {
        self.move_right = clamp_axis(value);
    }

    /// Normalized turn rate; 1.0 turns at the loadout's full turn rate.
    pub fn turn_at_rate(&mut self, rate: f32) {
        self.turn_rate = clamp_axis(rate);
    }

    pub fn look_up_at_rate(&mut self, rate: f32) {
        self.look_up_rate = clamp_axis(rate);
    }

    /// Repeated presses while held are collapsed into one edge.
    pub fn fire_button_pressed(&mut self) {
        if !self.fire_held {
            self.fire_held = true;
            self.fire_edges.push(FireEdge::Pressed);
        }
    }

    pub fn fire_button_released(&mut self) {
        if self.fire_held {
            self.fire_held = false;
            self.fire_edges.push(FireEdge::Released);
        }
    }

    pub fn is_fire_held(&self) -> bool {
        self.fire_held
    }

    pub fn take_fire_edges(&mut self) -> Vec<FireEdge> {
        std::mem::take(&mut self.fire_edges)
    }

    /// Packages the current axes as the next input frame.
    pub fn sample(&mut self) -> CharacterInput {
        let input = CharacterInput {
            sequence: self.next_sequence,
            timestamp: Self::get_timestamp(),
            move_forward: self.move_forward,
            move_right: self.move_right,
            turn_rate: self.turn_rate,
            look_up_rate: self.look_up_rate,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        input
    }

    fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
