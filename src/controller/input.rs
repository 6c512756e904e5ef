/// Keyboard and mouse state fed from winit events
use std::collections::HashSet;

use glam::Vec3;
use winit::keyboard::KeyCode;

/// Input events the frame loop cares about
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    // Keyboard events
    KeyDown(KeyCode),
    KeyUp(KeyCode),

    // Mouse events
    MouseMove { dx: f32, dy: f32 },
    CursorMoved { x: f32, y: f32 },
    MouseClick { button: MouseButton, is_down: bool },

    // Window events
    FocusLost,
    PointerLockChanged { locked: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        match button {
            winit::event::MouseButton::Left => Some(MouseButton::Left),
            winit::event::MouseButton::Right => Some(MouseButton::Right),
            winit::event::MouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Held keys, per-frame key edges, accumulated look delta and clicks
#[derive(Debug, Default)]
pub struct InputState {
    pub pressed_keys: HashSet<KeyCode>,
    just_pressed: HashSet<KeyCode>,
    pub look_delta: (f32, f32),
    pub pointer_locked: bool,
    pub mouse_pos: (f32, f32),
    left_click: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process an input event and update state
    pub fn process_event(&mut self, event: &InputEvent) {
        match event {
            InputEvent::KeyDown(key) => {
                if self.pressed_keys.insert(*key) {
                    self.just_pressed.insert(*key);
                }
            }
            InputEvent::KeyUp(key) => {
                self.pressed_keys.remove(key);
            }
            InputEvent::MouseMove { dx, dy } => {
                if self.pointer_locked {
                    self.look_delta.0 += dx;
                    self.look_delta.1 += dy;
                }
            }
            InputEvent::CursorMoved { x, y } => {
                self.mouse_pos = (*x, *y);
            }
            InputEvent::MouseClick { button, is_down } => {
                if *button == MouseButton::Left && *is_down {
                    self.left_click = true;
                }
            }
            InputEvent::FocusLost => {
                self.clear_keys();
            }
            InputEvent::PointerLockChanged { locked } => {
                self.pointer_locked = *locked;
                self.look_delta = (0.0, 0.0);
            }
        }
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// True once per physical press of `key`
    pub fn take_press(&mut self, key: KeyCode) -> bool {
        self.just_pressed.remove(&key)
    }

    /// Left-button press position since the last call, if any
    pub fn take_click(&mut self) -> Option<(f32, f32)> {
        std::mem::take(&mut self.left_click).then_some(self.mouse_pos)
    }

    pub fn clear_keys(&mut self) {
        self.pressed_keys.clear();
        self.just_pressed.clear();
    }

    pub fn consume_look(&mut self) -> (f32, f32) {
        std::mem::take(&mut self.look_delta)
    }

    /// Drop edges and clicks nobody consumed this frame
    pub fn end_frame(&mut self) {
        self.just_pressed.clear();
        self.left_click = false;
    }
}

/// Key mapping configuration
#[derive(Debug, Clone)]
pub struct KeyBindings {
    pub yaw_left: KeyCode,
    pub yaw_right: KeyCode,
    pub pitch_up: KeyCode,
    pub pitch_down: KeyCode,
    pub roll_left: KeyCode,
    pub roll_right: KeyCode,
    pub left: KeyCode,
    pub right: KeyCode,
    pub forward: KeyCode,
    pub backward: KeyCode,
    pub up: KeyCode,
    pub down: KeyCode,
    pub jump: KeyCode,
    pub stabilize: KeyCode,
    pub toggle_rotation_mode: KeyCode,
    pub use_entity: KeyCode,
    pub toggle_phys_debug: KeyCode,
    pub pause: KeyCode,
    pub escape: KeyCode,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            yaw_left: KeyCode::KeyH,
            yaw_right: KeyCode::KeyL,
            pitch_up: KeyCode::KeyK,
            pitch_down: KeyCode::KeyJ,
            roll_left: KeyCode::KeyQ,
            roll_right: KeyCode::KeyE,
            left: KeyCode::KeyA,
            right: KeyCode::KeyD,
            forward: KeyCode::KeyW,
            backward: KeyCode::KeyS,
            up: KeyCode::KeyU,
            down: KeyCode::KeyO,
            jump: KeyCode::Space,
            stabilize: KeyCode::KeyV,
            toggle_rotation_mode: KeyCode::KeyB,
            use_entity: KeyCode::KeyF,
            toggle_phys_debug: KeyCode::KeyP,
            pause: KeyCode::Tab,
            escape: KeyCode::Escape,
        }
    }
}

/// High-level input processor
#[derive(Debug, Clone, Default)]
pub struct InputProcessor {
    bindings: KeyBindings,
}

impl InputProcessor {
    pub fn new(bindings: KeyBindings) -> Self {
        Self { bindings }
    }

    fn axis(input: &InputState, positive: KeyCode, negative: KeyCode) -> f32 {
        let mut v = 0.0;
        if input.is_key_pressed(positive) {
            v += 1.0;
        }
        if input.is_key_pressed(negative) {
            v -= 1.0;
        }
        v
    }

    /// Movement request as (right, forward, up), each in -1..=1
    pub fn movement(&self, input: &InputState) -> Vec3 {
        let b = &self.bindings;
        Vec3::new(
            Self::axis(input, b.right, b.left),
            Self::axis(input, b.forward, b.backward),
            Self::axis(input, b.up, b.down),
        )
    }

    /// Keyboard rotation request as (yaw, pitch, roll), each in -1..=1
    pub fn rotation(&self, input: &InputState) -> Vec3 {
        let b = &self.bindings;
        Vec3::new(
            Self::axis(input, b.yaw_right, b.yaw_left),
            Self::axis(input, b.pitch_down, b.pitch_up),
            Self::axis(input, b.roll_left, b.roll_right),
        )
    }

    pub fn is_jumping(&self, input: &InputState) -> bool {
        input.is_key_pressed(self.bindings.jump)
    }

    pub fn is_stabilizing(&self, input: &InputState) -> bool {
        input.is_key_pressed(self.bindings.stabilize)
    }

    pub fn is_escape(&self, input: &InputState) -> bool {
        input.is_key_pressed(self.bindings.escape)
    }

    pub fn wants_to_toggle_rotation_mode(&self, input: &mut InputState) -> bool {
        input.take_press(self.bindings.toggle_rotation_mode)
    }

    pub fn wants_to_use(&self, input: &mut InputState) -> bool {
        input.take_press(self.bindings.use_entity)
    }

    pub fn wants_to_toggle_phys_debug(&self, input: &mut InputState) -> bool {
        input.take_press(self.bindings.toggle_phys_debug)
    }

    pub fn wants_to_pause(&self, input: &mut InputState) -> bool {
        input.take_press(self.bindings.pause)
    }
}

pub mod native {
    use super::*;
    use winit::event::{DeviceEvent, ElementState, WindowEvent};
    use winit::keyboard::PhysicalKey;

    pub fn window_event_to_input(event: &WindowEvent) -> Option<InputEvent> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if event.repeat {
                    return None;
                }
                let PhysicalKey::Code(code) = event.physical_key else {
                    return None;
                };
                Some(match event.state {
                    ElementState::Pressed => InputEvent::KeyDown(code),
                    ElementState::Released => InputEvent::KeyUp(code),
                })
            }
            WindowEvent::CursorMoved { position, .. } => Some(InputEvent::CursorMoved {
                x: position.x as f32,
                y: position.y as f32,
            }),
            WindowEvent::MouseInput { state, button, .. } => {
                MouseButton::from_winit(*button).map(|button| InputEvent::MouseClick {
                    button,
                    is_down: *state == ElementState::Pressed,
                })
            }
            WindowEvent::Focused(false) => Some(InputEvent::FocusLost),
            _ => None,
        }
    }

    pub fn device_event_to_input(event: &DeviceEvent) -> Option<InputEvent> {
        match event {
            DeviceEvent::MouseMotion { delta } => Some(InputEvent::MouseMove {
                dx: delta.0 as f32,
                dy: delta.1 as f32,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_edge_fires_once_per_press() {
        let mut input = InputState::new();
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyB));
        // A second down without an up (OS repeat) is not a new press
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyB));
        assert!(input.take_press(KeyCode::KeyB));
        assert!(!input.take_press(KeyCode::KeyB));
        assert!(input.is_key_pressed(KeyCode::KeyB));

        input.process_event(&InputEvent::KeyUp(KeyCode::KeyB));
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyB));
        assert!(input.take_press(KeyCode::KeyB));
    }

    #[test]
    fn test_unconsumed_edges_expire() {
        let mut input = InputState::new();
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyF));
        input.process_event(&InputEvent::MouseClick { button: MouseButton::Left, is_down: true });
        input.end_frame();
        assert!(!input.take_press(KeyCode::KeyF));
        assert!(input.take_click().is_none());
    }

    #[test]
    fn test_opposing_keys_cancel() {
        let processor = InputProcessor::default();
        let mut input = InputState::new();
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyW));
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyA));
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyD));
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyH));
        assert_eq!(processor.movement(&input), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(processor.rotation(&input), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_look_needs_pointer_lock() {
        let mut input = InputState::new();
        input.process_event(&InputEvent::MouseMove { dx: 3.0, dy: 1.0 });
        assert_eq!(input.consume_look(), (0.0, 0.0));
        input.process_event(&InputEvent::PointerLockChanged { locked: true });
        input.process_event(&InputEvent::MouseMove { dx: 3.0, dy: 1.0 });
        input.process_event(&InputEvent::MouseMove { dx: 1.0, dy: 1.0 });
        assert_eq!(input.consume_look(), (4.0, 2.0));
        assert_eq!(input.consume_look(), (0.0, 0.0));
    }

    #[test]
    fn test_click_reports_cursor_position() {
        let mut input = InputState::new();
        input.process_event(&InputEvent::CursorMoved { x: 10.0, y: 20.0 });
        input.process_event(&InputEvent::MouseClick { button: MouseButton::Right, is_down: true });
        assert!(input.take_click().is_none());
        input.process_event(&InputEvent::MouseClick { button: MouseButton::Left, is_down: true });
        assert_eq!(input.take_click(), Some((10.0, 20.0)));
        assert!(input.take_click().is_none());
    }

    #[test]
    fn test_focus_lost_releases_keys() {
        let mut input = InputState::new();
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyW));
        input.process_event(&InputEvent::FocusLost);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
        assert!(!input.take_press(KeyCode::KeyW));
    }
}
