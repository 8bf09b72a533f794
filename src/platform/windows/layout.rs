//! Active keyboard layout, queried through `user32`.

use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    GetKeyboardState, MapVirtualKeyW, ToUnicode, MAPVK_VK_TO_CHAR,
};

use crate::hook::decode::{KeyboardLayout, KeyboardState, Translation};

/// High bit of `MapVirtualKeyW(MAPVK_VK_TO_CHAR)`: the key is a dead key.
const DEAD_KEY_BIT: u32 = 0x8000_0000;

#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsLayout;

impl KeyboardLayout for WindowsLayout {
    fn is_dead_key(&self, virtual_key: u16) -> bool {
        // SAFETY: pure lookup in the current thread's layout.
        let mapped = unsafe { MapVirtualKeyW(u32::from(virtual_key), MAPVK_VK_TO_CHAR) };
        mapped & DEAD_KEY_BIT != 0
    }

    fn translate(
        &self,
        virtual_key: u16,
        scan_code: u16,
        state: &KeyboardState,
        out: &mut [u16],
    ) -> Translation {
        // SAFETY: `state` is 256 bytes and `out` is written up to its length.
        let written = unsafe {
            ToUnicode(
                u32::from(virtual_key),
                u32::from(scan_code),
                state.as_bytes().as_ptr(),
                out.as_mut_ptr(),
                out.len() as i32,
                0,
            )
        };
        if written < 0 {
            Translation::DeadKey
        } else {
            Translation::Units(written as usize)
        }
    }

    fn snapshot(&self) -> KeyboardState {
        let mut bytes = [0u8; 256];
        // SAFETY: GetKeyboardState writes exactly 256 bytes.
        if unsafe { GetKeyboardState(bytes.as_mut_ptr()) } == 0 {
            log::warn!("capture: GetKeyboardState failed, starting with no keys down");
            return KeyboardState::new();
        }
        KeyboardState::from_bytes(bytes)
    }
}
