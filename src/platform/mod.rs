//! Platform abstraction layer.
//!
//! Defines the `InputBackend` trait the hook registry drives. The Windows
//! implementation lives in the `windows` child module; tests use the mock
//! backend, which simulates per-thread message queues.

#[cfg(test)]
pub(crate) mod mock;
#[cfg(target_os = "windows")]
pub mod windows;

use crate::hook::decode::KeyboardLayout;
use crate::hook::devices::{DeviceError, RawDeviceEntry};
use crate::hook::dispatch::EventPipeline;
use crate::hook::{AcquisitionMode, DeviceHandle, HookError};

/// OS operations needed to run one hook on the calling thread.
///
/// `install`, `run_message_loop` and `uninstall` are always called on the
/// same thread, in that order. `post_quit` may be called from any thread.
pub trait InputBackend: Send + Sync {
    /// Whatever must be kept alive while the hook runs (hook handle, window).
    type Installation;
    type Layout: KeyboardLayout;

    fn current_thread_id(&self) -> u32;

    fn keyboard_layout(&self) -> Self::Layout;

    /// Installs the interception mechanism for `pipeline.class()` and takes
    /// ownership of the pipeline. On failure everything acquired so far,
    /// the pipeline included, is released.
    fn install(
        &self,
        mode: AcquisitionMode,
        pipeline: EventPipeline<Self::Layout>,
    ) -> Result<Self::Installation, HookError>;

    /// Retrieves and dispatches messages until a quit message arrives.
    fn run_message_loop(&self, installation: &Self::Installation);

    /// Removes the hook or destroys the window and drops the pipeline.
    fn uninstall(&self, installation: Self::Installation) -> Result<(), HookError>;

    /// Posts a quit message to `thread_id`'s queue. Returns false if the
    /// message could not be posted.
    fn post_quit(&self, thread_id: u32) -> bool;

    fn raw_device_list(&self) -> Result<Vec<RawDeviceEntry>, DeviceError>;

    fn device_name(&self, handle: DeviceHandle) -> Option<String>;
}
