//! Keyboard, mouse button and cursor state.
//!
//! [`Input`] is fed from winit [`WindowEvent`]s by the runner (or directly through the
//! `press_*`/`release_*` helpers) and queried by components during updates. The held
//! sets of the previous frame are kept so edge queries (`pressed`/`released`) work; call
//! [`Input::step_frame`] once at the end of every frame.
//!
//! Raw events are also queued as [`InputEvent`]s. Only the active input handler, a
//! component that marked itself through
//! [`ComponentContext::mark_active_input_handler`](crate::components::ComponentContext::mark_active_input_handler),
//! may drain them.

use std::collections::HashSet;

use cgmath::Vector2;
use winit::{
    event::{ElementState, MouseButton, WindowEvent},
    keyboard::{KeyCode, ModifiersState, PhysicalKey},
};

use crate::data_structures::game_object::ObjectId;

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key {
        key: KeyCode,
        pressed: bool,
        modifiers: ModifiersState,
    },
    CursorMoved {
        relative: Vector2<f32>,
        absolute: Vector2<f32>,
    },
    MouseButton {
        button: MouseButton,
        pressed: bool,
        modifiers: ModifiersState,
    },
}

#[derive(Debug)]
pub struct Input {
    active_keys: HashSet<KeyCode>,
    last_active_keys: HashSet<KeyCode>,
    active_buttons: HashSet<MouseButton>,
    last_active_buttons: HashSet<MouseButton>,
    cursor: Vector2<f32>,
    modifiers: ModifiersState,
    queued: Vec<InputEvent>,
    active_handler: Option<ObjectId>,
}

impl Input {
    pub fn new() -> Self {
        Self {
            active_keys: HashSet::new(),
            last_active_keys: HashSet::new(),
            active_buttons: HashSet::new(),
            last_active_buttons: HashSet::new(),
            cursor: Vector2::new(0.0, 0.0),
            modifiers: ModifiersState::default(),
            queued: Vec::new(),
            active_handler: None,
        }
    }

    /// Updates the state from a window event. Events that carry no input are ignored.
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if event.repeat {
                    return;
                }
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.press_key(key),
                        ElementState::Released => self.release_key(key),
                    }
                }
            }
            WindowEvent::ModifiersChanged(modifiers) => self.modifiers = modifiers.state(),
            WindowEvent::CursorMoved { position, .. } => {
                self.move_cursor(Vector2::new(position.x as f32, position.y as f32))
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => self.press_button(*button),
                ElementState::Released => self.release_button(*button),
            },
            _ => (),
        }
    }

    pub fn press_key(&mut self, key: KeyCode) {
        self.active_keys.insert(key);
        self.queued.push(InputEvent::Key {
            key,
            pressed: true,
            modifiers: self.modifiers,
        });
    }

    pub fn release_key(&mut self, key: KeyCode) {
        self.active_keys.remove(&key);
        self.queued.push(InputEvent::Key {
            key,
            pressed: false,
            modifiers: self.modifiers,
        });
    }

    pub fn press_button(&mut self, button: MouseButton) {
        self.active_buttons.insert(button);
        self.queued.push(InputEvent::MouseButton {
            button,
            pressed: true,
            modifiers: self.modifiers,
        });
    }

    pub fn release_button(&mut self, button: MouseButton) {
        self.active_buttons.remove(&button);
        self.queued.push(InputEvent::MouseButton {
            button,
            pressed: false,
            modifiers: self.modifiers,
        });
    }

    pub fn move_cursor(&mut self, absolute: Vector2<f32>) {
        let relative = absolute - self.cursor;
        self.cursor = absolute;
        self.queued
            .push(InputEvent::CursorMoved { relative, absolute });
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.active_keys.contains(&key)
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        !self.last_active_keys.contains(&key) && self.active_keys.contains(&key)
    }

    pub fn is_key_released(&self, key: KeyCode) -> bool {
        self.last_active_keys.contains(&key) && !self.active_keys.contains(&key)
    }

    pub fn is_button_held(&self, button: MouseButton) -> bool {
        self.active_buttons.contains(&button)
    }

    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        !self.last_active_buttons.contains(&button) && self.active_buttons.contains(&button)
    }

    pub fn is_button_released(&self, button: MouseButton) -> bool {
        self.last_active_buttons.contains(&button) && !self.active_buttons.contains(&button)
    }

    pub fn cursor_position(&self) -> Vector2<f32> {
        self.cursor
    }

    pub fn modifiers(&self) -> ModifiersState {
        self.modifiers
    }

    pub fn active_handler(&self) -> Option<ObjectId> {
        self.active_handler
    }

    pub(crate) fn set_active_handler(&mut self, handler: Option<ObjectId>) {
        self.active_handler = handler;
    }

    /// Events queued since the last drain or frame step.
    pub fn queued_events(&self) -> &[InputEvent] {
        &self.queued
    }

    pub(crate) fn take_events(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.queued)
    }

    /// Ends the frame: the current held sets become the previous ones and the event queue
    /// is cleared.
    pub fn step_frame(&mut self) {
        self.last_active_keys.clone_from(&self.active_keys);
        self.last_active_buttons.clone_from(&self.active_buttons);
        self.queued.clear();
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}
