use std::collections::HashSet;

use winit::keyboard::KeyCode;

use crate::camera::Movement;

/// Cursor positions turned into look deltas.
///
/// The first sample only latches the position so the camera does not jump
/// when the cursor enters the window.
#[derive(Clone, Debug, Default)]
pub struct MouseTracker {
    last: Option<(f64, f64)>,
}

impl MouseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(x_offset, y_offset)`; y grows upwards.
    pub fn update(&mut self, x: f64, y: f64) -> Option<(f32, f32)> {
        let previous = self.last.replace((x, y))?;
        Some(((x - previous.0) as f32, (previous.1 - y) as f32))
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Keys currently held, polled once per frame.
#[derive(Clone, Debug, Default)]
pub struct KeyState {
    pressed: HashSet<KeyCode>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.pressed.insert(key);
        } else {
            self.pressed.remove(&key);
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    pub fn exit_requested(&self) -> bool {
        self.is_pressed(KeyCode::Escape)
    }

    pub fn movements(&self) -> impl Iterator<Item = Movement> + '_ {
        [
            (KeyCode::KeyW, Movement::Forward),
            (KeyCode::KeyS, Movement::Backward),
            (KeyCode::KeyA, Movement::Left),
            (KeyCode::KeyD, Movement::Right),
        ]
        .into_iter()
        .filter(|(key, _)| self.is_pressed(*key))
        .map(|(_, movement)| movement)
    }

    pub fn clear(&mut self) {
        self.pressed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cursor_sample_only_latches() {
        let mut mouse = MouseTracker::new();
        assert_eq!(mouse.update(400.0, 300.0), None);
        assert_eq!(mouse.update(410.0, 290.0), Some((10.0, 10.0)));
        assert_eq!(mouse.update(405.0, 300.0), Some((-5.0, -10.0)));

        mouse.reset();
        assert_eq!(mouse.update(0.0, 0.0), None);
    }

    #[test]
    fn held_keys_map_to_movements() {
        let mut keys = KeyState::new();
        keys.set(KeyCode::KeyW, true);
        keys.set(KeyCode::KeyD, true);
        keys.set(KeyCode::KeyQ, true);
        let movements: Vec<_> = keys.movements().collect();
        assert_eq!(movements, vec![Movement::Forward, Movement::Right]);

        keys.set(KeyCode::KeyW, false);
        assert_eq!(keys.movements().collect::<Vec<_>>(), vec![Movement::Right]);
        assert!(!keys.exit_requested());

        keys.set(KeyCode::Escape, true);
        assert!(keys.exit_requested());
    }
}
