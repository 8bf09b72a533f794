//! systemhook -- system-wide keyboard and mouse hooks.
//!
//! A host registers one hook per input class; each registration blocks its
//! calling thread, which becomes the hook thread and pumps OS messages until
//! the hook is unregistered from any other thread. Events are normalized,
//! keyboard events are decoded to a character without breaking dead-key
//! composition, and every event is handed to the host's `EventHandler`.

pub mod config;
pub mod hook;
pub mod platform;

pub use hook::bridge::{CallbackBridge, EventHandler, HostRuntime, LocalRuntime};
pub use hook::devices::{DeviceError, DeviceMap};
pub use hook::registry::{HookRegistry, HookState};
pub use hook::{
    AcquisitionMode, DeviceHandle, ErrorCode, HookError, InputClass, KeyEvent, KeyTransition,
    MouseButton, MouseEvent, MouseTransition,
};
pub use platform::InputBackend;

#[cfg(target_os = "windows")]
pub use platform::windows::WindowsBackend;
