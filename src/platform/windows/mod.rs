//! Windows backend: `WH_KEYBOARD_LL` / `WH_MOUSE_LL` hooks and raw input
//! through a message-only window.

mod capture;
mod layout;
mod raw_input;

pub use capture::Installation;
pub use layout::WindowsLayout;

use windows_sys::Win32::System::Threading::GetCurrentThreadId;

use crate::hook::devices::{DeviceError, RawDeviceEntry};
use crate::hook::dispatch::EventPipeline;
use crate::hook::{AcquisitionMode, DeviceHandle, HookError};
use crate::platform::InputBackend;

/// The `user32` input backend. Stateless: per-hook state lives on the
/// hook thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }
}

impl InputBackend for WindowsBackend {
    type Installation = Installation;
    type Layout = WindowsLayout;

    fn current_thread_id(&self) -> u32 {
        // SAFETY: no preconditions.
        unsafe { GetCurrentThreadId() }
    }

    fn keyboard_layout(&self) -> WindowsLayout {
        WindowsLayout
    }

    fn install(
        &self,
        mode: AcquisitionMode,
        pipeline: EventPipeline<WindowsLayout>,
    ) -> Result<Installation, HookError> {
        let class = pipeline.class();
        capture::install(class, mode == AcquisitionMode::RawInput, pipeline)
    }

    fn run_message_loop(&self, _installation: &Installation) {
        capture::run_message_loop();
    }

    fn uninstall(&self, installation: Installation) -> Result<(), HookError> {
        capture::uninstall(installation)
    }

    fn post_quit(&self, thread_id: u32) -> bool {
        capture::post_quit(thread_id)
    }

    fn raw_device_list(&self) -> Result<Vec<RawDeviceEntry>, DeviceError> {
        raw_input::device_list()
    }

    fn device_name(&self, handle: DeviceHandle) -> Option<String> {
        raw_input::device_name(handle)
    }
}
