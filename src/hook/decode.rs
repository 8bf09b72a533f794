//! Dead-key-safe character decoding for keyboard events.
//!
//! Translation APIs such as `ToUnicode` consume pending dead-key state
//! (`^`, `` ` ``, ...) as a side effect, which would break composition in the
//! foreground application. The decoder therefore asks the layout whether the
//! key is a dead key first and skips translation for those keys entirely.
//!
//! The decoder keeps its own 256-entry keyboard state instead of reading the
//! OS state per event: low-level hooks run before the OS state is updated, so
//! only a locally maintained copy reflects the instant of the current event.

use super::KeyTransition;

/// Size of the UTF-16 buffer handed to the layout; one unit is reported.
const TRANSLATE_BUFFER_LEN: usize = 4;

const PRESSED: u8 = 0x80;
const TOGGLED: u8 = 0x01;

const VK_SHIFT: u16 = 0x10;
const VK_CONTROL: u16 = 0x11;
const VK_MENU: u16 = 0x12;
const VK_CAPITAL: u16 = 0x14;
const VK_NUMLOCK: u16 = 0x90;
const VK_SCROLL: u16 = 0x91;
const VK_LSHIFT: u16 = 0xA0;
const VK_RSHIFT: u16 = 0xA1;
const VK_LCONTROL: u16 = 0xA2;
const VK_RCONTROL: u16 = 0xA3;
const VK_LMENU: u16 = 0xA4;
const VK_RMENU: u16 = 0xA5;

// ---------------------------------------------------------------------------
// Keyboard state
// ---------------------------------------------------------------------------

/// Per-virtual-key state in the `GetKeyboardState` layout: bit 7 is the
/// pressed bit, bit 0 the toggle bit (Caps Lock, Num Lock, ...).
#[derive(Clone, PartialEq, Eq)]
pub struct KeyboardState([u8; 256]);

impl KeyboardState {
    pub fn new() -> Self {
        KeyboardState([0; 256])
    }

    pub fn from_bytes(bytes: [u8; 256]) -> Self {
        KeyboardState(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 256] {
        &self.0
    }

    pub fn is_pressed(&self, vk: u16) -> bool {
        self.0[usize::from(vk & 0xFF)] & PRESSED != 0
    }

    pub fn is_toggled(&self, vk: u16) -> bool {
        self.0[usize::from(vk & 0xFF)] & TOGGLED != 0
    }

    /// Records a transition. Side-specific modifiers also refresh their
    /// generic entry, which is the one layouts consult for translation.
    /// Lock keys flip their toggle bit on the press edge only, so
    /// autorepeat does not re-toggle.
    pub fn record(&mut self, vk: u16, transition: KeyTransition) {
        let pressed_edge = transition.is_down() && !self.is_pressed(vk);
        if pressed_edge && matches!(vk, VK_CAPITAL | VK_NUMLOCK | VK_SCROLL) {
            self.0[usize::from(vk & 0xFF)] ^= TOGGLED;
        }
        self.set_pressed(vk, transition.is_down());

        let generic = match vk {
            VK_LSHIFT | VK_RSHIFT => Some((VK_SHIFT, VK_LSHIFT, VK_RSHIFT)),
            VK_LCONTROL | VK_RCONTROL => Some((VK_CONTROL, VK_LCONTROL, VK_RCONTROL)),
            VK_LMENU | VK_RMENU => Some((VK_MENU, VK_LMENU, VK_RMENU)),
            _ => None,
        };
        if let Some((generic, left, right)) = generic {
            let held = self.is_pressed(left) || self.is_pressed(right);
            self.set_pressed(generic, held);
        }
    }

    fn set_pressed(&mut self, vk: u16, pressed: bool) {
        let slot = &mut self.0[usize::from(vk & 0xFF)];
        if pressed {
            *slot |= PRESSED;
        } else {
            *slot &= !PRESSED;
        }
    }
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyboardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pressed: Vec<u16> = (0u16..256).filter(|vk| self.is_pressed(*vk)).collect();
        f.debug_struct("KeyboardState")
            .field("pressed", &pressed)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Layout seam
// ---------------------------------------------------------------------------

/// Outcome of a character translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// The layout reported an invalid dead-key combination (negative result).
    DeadKey,
    /// Number of UTF-16 units written to the buffer (may be 0).
    Units(usize),
}

/// The active keyboard layout, as exposed by the OS.
pub trait KeyboardLayout {
    /// True if `vk` starts a dead-key composition.
    fn is_dead_key(&self, vk: u16) -> bool;

    /// Translates `vk`/`scan_code` under `state` into `buf`.
    fn translate(
        &self,
        vk: u16,
        scan_code: u16,
        state: &KeyboardState,
        buf: &mut [u16],
    ) -> Translation;

    /// Current OS keyboard state, used to seed the decoder.
    fn snapshot(&self) -> KeyboardState;
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Resolves key transitions to characters and tracks the keyboard state.
pub struct KeyDecoder<L> {
    layout: L,
    state: KeyboardState,
}

impl<L: KeyboardLayout> KeyDecoder<L> {
    pub fn new(layout: L) -> Self {
        let state = layout.snapshot();
        Self { layout, state }
    }

    /// Decodes one transition, then records it in the keyboard state so the
    /// next event sees this key as pressed/released.
    pub fn decode(&mut self, vk: u16, scan_code: u16, transition: KeyTransition) -> Option<u16> {
        let character = self.translate(vk, scan_code);
        self.state.record(vk, transition);
        character
    }

    pub fn state(&self) -> &KeyboardState {
        &self.state
    }

    fn translate(&self, vk: u16, scan_code: u16) -> Option<u16> {
        if self.layout.is_dead_key(vk) {
            return None;
        }

        let mut buf = [0u16; TRANSLATE_BUFFER_LEN];
        match self.layout.translate(vk, scan_code, &self.state, &mut buf) {
            Translation::DeadKey => {
                log::debug!("decode: invalid dead key combination for vk {vk:#04x}");
                None
            }
            Translation::Units(0) => None,
            Translation::Units(_) => Some(buf[0]).filter(|unit| *unit != 0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
