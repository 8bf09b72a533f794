//! Conversion of OS input records into canonical events.
//!
//! Two acquisition formats feed the same event shapes:
//!
//! - Legacy hook callbacks carry exactly one action per call (a key edge, a
//!   button edge, a move, or a wheel tick).
//! - Raw input packets may bundle several actions. A mouse packet can report
//!   a button edge, motion and a wheel tick at once; these are split into
//!   independent events emitted in the order button, move, wheel.
//!
//! Message and flag values are the Win32 ones (`WM_*`, `RI_MOUSE_*`).

use super::{DeviceHandle, KeyTransition, MouseButton, MouseEvent, MouseTransition};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_SYSKEYDOWN: u32 = 0x0104;
pub const WM_SYSKEYUP: u32 = 0x0105;

pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_RBUTTONDOWN: u32 = 0x0204;
pub const WM_RBUTTONUP: u32 = 0x0205;
pub const WM_MBUTTONDOWN: u32 = 0x0207;
pub const WM_MBUTTONUP: u32 = 0x0208;
pub const WM_MOUSEWHEEL: u32 = 0x020A;

pub const RI_MOUSE_LEFT_BUTTON_DOWN: u16 = 0x0001;
pub const RI_MOUSE_LEFT_BUTTON_UP: u16 = 0x0002;
pub const RI_MOUSE_RIGHT_BUTTON_DOWN: u16 = 0x0004;
pub const RI_MOUSE_RIGHT_BUTTON_UP: u16 = 0x0008;
pub const RI_MOUSE_MIDDLE_BUTTON_DOWN: u16 = 0x0010;
pub const RI_MOUSE_MIDDLE_BUTTON_UP: u16 = 0x0020;
pub const RI_MOUSE_WHEEL: u16 = 0x0400;

/// Raw button precedence: only the first present pair is reported.
const RAW_BUTTONS: [(MouseButton, u16, u16); 3] = [
    (MouseButton::Left, RI_MOUSE_LEFT_BUTTON_DOWN, RI_MOUSE_LEFT_BUTTON_UP),
    (MouseButton::Right, RI_MOUSE_RIGHT_BUTTON_DOWN, RI_MOUSE_RIGHT_BUTTON_UP),
    (MouseButton::Middle, RI_MOUSE_MIDDLE_BUTTON_DOWN, RI_MOUSE_MIDDLE_BUTTON_UP),
];

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Fields of `KBDLLHOOKSTRUCT` plus the hook's message id.
#[derive(Debug, Clone, Copy)]
pub struct LegacyKeyRecord {
    pub message: u32,
    pub vk_code: u32,
    pub scan_code: u32,
}

/// Fields of `RAWKEYBOARD` plus the packet's device.
#[derive(Debug, Clone, Copy)]
pub struct RawKeyRecord {
    pub message: u32,
    pub vkey: u16,
    pub make_code: u16,
    pub device: DeviceHandle,
}

/// Fields of `MSLLHOOKSTRUCT` plus the hook's message id.
#[derive(Debug, Clone, Copy)]
pub struct LegacyMouseRecord {
    pub message: u32,
    pub x: i32,
    pub y: i32,
    pub mouse_data: u32,
}

/// Fields of `RAWMOUSE` plus the packet's device.
#[derive(Debug, Clone, Copy)]
pub struct RawMouseRecord {
    pub button_flags: u16,
    pub button_data: u16,
    pub last_x: i32,
    pub last_y: i32,
    pub device: DeviceHandle,
}

// ---------------------------------------------------------------------------
// Keyboard
// ---------------------------------------------------------------------------

/// Maps a keyboard message to a transition; other messages carry no event.
pub fn key_transition(message: u32) -> Option<KeyTransition> {
    match message {
        WM_KEYDOWN | WM_SYSKEYDOWN => Some(KeyTransition::Down),
        WM_KEYUP | WM_SYSKEYUP => Some(KeyTransition::Up),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Mouse
// ---------------------------------------------------------------------------

/// Last emitted pointer position, used to drop moves that go nowhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionTracker {
    last: (i32, i32),
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            last: (i32::from(i16::MIN), i32::from(i16::MIN)),
        }
    }

    /// Returns true and remembers the position if it differs from the last one.
    pub fn advance(&mut self, x: i32, y: i32) -> bool {
        if self.last == (x, y) {
            return false;
        }
        self.last = (x, y);
        true
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts one legacy mouse hook callback.
pub fn legacy_mouse(record: &LegacyMouseRecord, tracker: &mut PositionTracker) -> Option<MouseEvent> {
    let LegacyMouseRecord { message, x, y, mouse_data } = *record;

    let edge = |transition, button| MouseEvent {
        transition,
        button: Some(button),
        x,
        y,
        wheel_delta: 0,
        device: None,
    };

    match message {
        WM_LBUTTONDOWN => Some(edge(MouseTransition::Down, MouseButton::Left)),
        WM_LBUTTONUP => Some(edge(MouseTransition::Up, MouseButton::Left)),
        WM_RBUTTONDOWN => Some(edge(MouseTransition::Down, MouseButton::Right)),
        WM_RBUTTONUP => Some(edge(MouseTransition::Up, MouseButton::Right)),
        WM_MBUTTONDOWN => Some(edge(MouseTransition::Down, MouseButton::Middle)),
        WM_MBUTTONUP => Some(edge(MouseTransition::Up, MouseButton::Middle)),
        WM_MOUSEMOVE => tracker.advance(x, y).then_some(MouseEvent {
            transition: MouseTransition::Move,
            button: None,
            x,
            y,
            wheel_delta: 0,
            device: None,
        }),
        WM_MOUSEWHEEL => Some(MouseEvent {
            transition: MouseTransition::Wheel,
            button: None,
            x,
            y,
            wheel_delta: (mouse_data >> 16) as u16 as i16,
            device: None,
        }),
        _ => None,
    }
}

/// The events extracted from one raw mouse packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseEmits {
    pub button: Option<MouseEvent>,
    pub movement: Option<MouseEvent>,
    pub wheel: Option<MouseEvent>,
}

impl MouseEmits {
    pub fn is_empty(&self) -> bool {
        self.button.is_none() && self.movement.is_none() && self.wheel.is_none()
    }

    pub fn len(&self) -> usize {
        (*self).into_iter().count()
    }
}

impl IntoIterator for MouseEmits {
    type Item = MouseEvent;
    type IntoIter = std::iter::Flatten<std::array::IntoIter<Option<MouseEvent>, 3>>;

    /// Yields button, then move, then wheel.
    fn into_iter(self) -> Self::IntoIter {
        [self.button, self.movement, self.wheel].into_iter().flatten()
    }
}

/// Splits a raw mouse packet into its button, move and wheel events.
pub fn raw_mouse(record: &RawMouseRecord, tracker: &mut PositionTracker) -> MouseEmits {
    let RawMouseRecord {
        button_flags,
        button_data,
        last_x: x,
        last_y: y,
        device,
    } = *record;

    let event = |transition, button, wheel_delta| MouseEvent {
        transition,
        button,
        x,
        y,
        wheel_delta,
        device: Some(device),
    };

    let button = RAW_BUTTONS
        .iter()
        .find(|(_, down, up)| button_flags & (down | up) != 0)
        .map(|&(button, down, _)| {
            let transition = if button_flags & down == down {
                MouseTransition::Down
            } else {
                MouseTransition::Up
            };
            event(transition, Some(button), 0)
        });

    let has_motion = x != 0 || y != 0;
    let movement = (has_motion && tracker.advance(x, y))
        .then(|| event(MouseTransition::Move, None, 0));

    let wheel = (button_flags & RI_MOUSE_WHEEL == RI_MOUSE_WHEEL)
        .then(|| event(MouseTransition::Wheel, None, button_data as i16));

    MouseEmits {
        button,
        movement,
        wheel,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE: DeviceHandle = DeviceHandle(0x0001_0045);

    fn raw(button_flags: u16, button_data: u16, x: i32, y: i32) -> RawMouseRecord {
        RawMouseRecord {
            button_flags,
            button_data,
            last_x: x,
            last_y: y,
            device: DEVICE,
        }
    }

    fn legacy(message: u32, x: i32, y: i32, mouse_data: u32) -> LegacyMouseRecord {
        LegacyMouseRecord { message, x, y, mouse_data }
    }

    #[test]
    fn keyboard_messages_map_to_transitions() {
        assert_eq!(key_transition(WM_KEYDOWN), Some(KeyTransition::Down));
        assert_eq!(key_transition(WM_SYSKEYDOWN), Some(KeyTransition::Down));
        assert_eq!(key_transition(WM_KEYUP), Some(KeyTransition::Up));
        assert_eq!(key_transition(WM_SYSKEYUP), Some(KeyTransition::Up));
        assert_eq!(key_transition(0x0102), None); // WM_CHAR
    }

    #[test]
    fn raw_left_wins_over_right() {
        let mut tracker = PositionTracker::new();
        let flags = RI_MOUSE_LEFT_BUTTON_DOWN | RI_MOUSE_RIGHT_BUTTON_DOWN;
        let emits = raw_mouse(&raw(flags, 0, 0, 0), &mut tracker);

        assert_eq!(emits.len(), 1);
        let button = emits.button.unwrap();
        assert_eq!(button.button, Some(MouseButton::Left));
        assert_eq!(button.transition, MouseTransition::Down);
        assert_eq!(button.device, Some(DEVICE));
    }

    #[test]
    fn raw_right_up_reported_when_left_absent() {
        let mut tracker = PositionTracker::new();
        let flags = RI_MOUSE_RIGHT_BUTTON_UP | RI_MOUSE_MIDDLE_BUTTON_DOWN;
        let button = raw_mouse(&raw(flags, 0, 0, 0), &mut tracker).button.unwrap();
        assert_eq!(button.button, Some(MouseButton::Right));
        assert_eq!(button.transition, MouseTransition::Up);
    }

    #[test]
    fn raw_identical_positions_move_once() {
        let mut tracker = PositionTracker::new();
        let first = raw_mouse(&raw(0, 0, 12, -3), &mut tracker);
        let second = raw_mouse(&raw(0, 0, 12, -3), &mut tracker);

        assert_eq!(first.movement.map(|m| (m.x, m.y)), Some((12, -3)));
        assert!(second.is_empty());

        let third = raw_mouse(&raw(0, 0, 12, -2), &mut tracker);
        assert!(third.movement.is_some());
    }

    #[test]
    fn raw_wheel_only_packet() {
        let mut tracker = PositionTracker::new();
        let delta = (-120i16) as u16;
        let emits = raw_mouse(&raw(RI_MOUSE_WHEEL, delta, 0, 0), &mut tracker);

        let events: Vec<MouseEvent> = emits.into_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, MouseTransition::Wheel);
        assert_eq!(events[0].wheel_delta, -120);
        assert_eq!(events[0].button, None);
    }

    #[test]
    fn raw_combined_packet_emits_button_move_wheel_in_order() {
        let mut tracker = PositionTracker::new();
        let flags = RI_MOUSE_MIDDLE_BUTTON_UP | RI_MOUSE_WHEEL;
        let emits = raw_mouse(&raw(flags, 120, 4, 5), &mut tracker);

        let order: Vec<MouseTransition> = emits.into_iter().map(|e| e.transition).collect();
        assert_eq!(
            order,
            vec![MouseTransition::Up, MouseTransition::Move, MouseTransition::Wheel]
        );
    }

    #[test]
    fn legacy_buttons_carry_position() {
        let mut tracker = PositionTracker::new();
        let event = legacy_mouse(&legacy(WM_RBUTTONDOWN, 640, 480, 0), &mut tracker).unwrap();
        assert_eq!(event.transition, MouseTransition::Down);
        assert_eq!(event.button, Some(MouseButton::Right));
        assert_eq!((event.x, event.y), (640, 480));
        assert_eq!(event.device, None);

        let event = legacy_mouse(&legacy(WM_MBUTTONUP, 1, 2, 0), &mut tracker).unwrap();
        assert_eq!(event.transition, MouseTransition::Up);
        assert_eq!(event.button, Some(MouseButton::Middle));
    }

    #[test]
    fn legacy_move_compares_both_coordinates() {
        let mut tracker = PositionTracker::new();
        assert!(legacy_mouse(&legacy(WM_MOUSEMOVE, 10, 10, 0), &mut tracker).is_some());
        assert!(legacy_mouse(&legacy(WM_MOUSEMOVE, 10, 10, 0), &mut tracker).is_none());
        // Only y changes.
        let event = legacy_mouse(&legacy(WM_MOUSEMOVE, 10, 11, 0), &mut tracker).unwrap();
        assert_eq!(event.transition, MouseTransition::Move);
        assert_eq!(event.button, None);
    }

    #[test]
    fn legacy_wheel_delta_is_signed_high_word() {
        let mut tracker = PositionTracker::new();
        let mouse_data = u32::from((-240i16) as u16) << 16;
        let event = legacy_mouse(&legacy(WM_MOUSEWHEEL, 3, 4, mouse_data), &mut tracker).unwrap();
        assert_eq!(event.transition, MouseTransition::Wheel);
        assert_eq!(event.wheel_delta, -240);
        assert_eq!(event.button, None);
    }

    #[test]
    fn legacy_unhandled_messages_emit_nothing() {
        let mut tracker = PositionTracker::new();
        // WM_XBUTTONDOWN, WM_MOUSEHWHEEL
        assert!(legacy_mouse(&legacy(0x020B, 0, 0, 0), &mut tracker).is_none());
        assert!(legacy_mouse(&legacy(0x020E, 0, 0, 0), &mut tracker).is_none());
    }
}
