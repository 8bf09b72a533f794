//! Hook lifecycle: register, run the message loop, unregister.
//!
//! `register_hook` is synchronous for the whole life of the hook. It captures
//! the calling thread as the hook thread, installs the OS mechanism, signals
//! readiness, then blocks in the message loop until `unregister_hook` posts a
//! quit message to that thread.
//!
//! Each input class has one slot:
//!
//! ```text
//! Idle -> Registering -> Running -> Unregistering -> Idle
//!              |                         ^
//!              +--- unregister (pending) +
//! ```
//!
//! Every failure path returns the slot to `Idle`. An unregister that arrives
//! while the slot is still `Registering` is remembered and honoured right
//! after installation, so `register_hook` never waits on a quit message that
//! was never posted.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use super::bridge::{CallbackBridge, EventHandler, HostRuntime};
use super::devices::{collect_devices, DeviceError, DeviceMap};
use super::dispatch::EventPipeline;
use super::{AcquisitionMode, ErrorCode, HookError, InputClass};
use crate::platform::InputBackend;

const IDLE: u8 = 0;
const REGISTERING: u8 = 1;
const RUNNING: u8 = 2;
const UNREGISTERING: u8 = 3;

/// Lifecycle state of one input class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Idle,
    Registering,
    Running,
    Unregistering,
}

impl HookState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            REGISTERING => HookState::Registering,
            RUNNING => HookState::Running,
            UNREGISTERING => HookState::Unregistering,
            _ => HookState::Idle,
        }
    }
}

#[derive(Debug, Default)]
struct HookSlot {
    state: AtomicU8,
    /// OS id of the thread blocked in `register_hook`; 0 when none.
    thread_id: AtomicU32,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns the keyboard and mouse hook slots for one backend.
///
/// Share it (e.g. in an `Arc`) between the thread that registers a hook and
/// the threads that may unregister it.
pub struct HookRegistry<B> {
    backend: B,
    slots: [HookSlot; 2],
}

impl<B: InputBackend> HookRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            slots: Default::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self, class: InputClass) -> HookState {
        HookState::from_raw(self.slot(class).state.load(Ordering::Acquire))
    }

    /// The thread currently owning the `class` hook, if any.
    pub fn hook_thread(&self, class: InputClass) -> Option<u32> {
        match self.slot(class).thread_id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// Registers a hook and blocks until it is unregistered.
    pub fn register_hook(
        &self,
        class: InputClass,
        mode: AcquisitionMode,
        runtime: Arc<dyn HostRuntime>,
        handler: Arc<dyn EventHandler>,
    ) -> ErrorCode {
        match self.try_register_hook(class, mode, runtime, handler) {
            Ok(()) => ErrorCode::Success,
            Err(e) => {
                log::warn!("hook: {class} hook ended with error: {e}");
                e.code()
            }
        }
    }

    /// `register_hook` with the failure detail preserved.
    pub fn try_register_hook(
        &self,
        class: InputClass,
        mode: AcquisitionMode,
        runtime: Arc<dyn HostRuntime>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), HookError> {
        let slot = self.slot(class);
        if slot
            .state
            .compare_exchange(IDLE, REGISTERING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(HookError::AlreadyRegistered(class));
        }
        slot.thread_id
            .store(self.backend.current_thread_id(), Ordering::Release);

        let result = self.run_hook(slot, class, mode, runtime, handler);

        slot.thread_id.store(0, Ordering::Release);
        slot.state.store(IDLE, Ordering::Release);
        result
    }

    /// Asks the `class` hook to stop. Returns immediately.
    ///
    /// No-op when nothing is registered or a stop is already underway.
    pub fn unregister_hook(&self, class: InputClass) {
        let slot = self.slot(class);
        loop {
            match slot.state.load(Ordering::Acquire) {
                REGISTERING => {
                    if slot
                        .state
                        .compare_exchange(
                            REGISTERING,
                            UNREGISTERING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        log::info!("hook: {class} stop requested during registration");
                        return;
                    }
                }
                RUNNING => {
                    if slot
                        .state
                        .compare_exchange(RUNNING, UNREGISTERING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        // Cleared before posting so no other caller can post to
                        // a thread id the OS may since have reused.
                        let thread_id = slot.thread_id.swap(0, Ordering::AcqRel);
                        if thread_id != 0 && !self.backend.post_quit(thread_id) {
                            log::warn!("hook: could not post quit to {class} thread {thread_id}");
                        }
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    /// Lists raw input devices of `class`.
    pub fn list_devices(&self, class: InputClass) -> Result<DeviceMap, DeviceError> {
        let entries = self.backend.raw_device_list()?;
        Ok(collect_devices(&entries, class, |handle| {
            self.backend.device_name(handle)
        }))
    }

    fn slot(&self, class: InputClass) -> &HookSlot {
        &self.slots[class.index()]
    }

    fn run_hook(
        &self,
        slot: &HookSlot,
        class: InputClass,
        mode: AcquisitionMode,
        runtime: Arc<dyn HostRuntime>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), HookError> {
        log::info!("hook: registering {class} hook ({mode:?})");

        if !handler.supports(class) {
            return Err(HookError::NoHandleMethod(class));
        }

        let installation = {
            let bridge = CallbackBridge::new(runtime, handler);
            let pipeline =
                EventPipeline::new(class, bridge.clone(), self.backend.keyboard_layout());
            let installation = self.backend.install(mode, pipeline)?;
            log::info!("hook: {class} hook installed");

            if let Err(e) = bridge.notify_ready(class) {
                if let Err(unhook) = self.backend.uninstall(installation) {
                    log::warn!("hook: cleanup after failed notify: {unhook}");
                }
                return Err(HookError::NotifyFailed(e.to_string()));
            }
            installation
        };

        if slot
            .state
            .compare_exchange(REGISTERING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.backend.run_message_loop(&installation);
        }

        // Stop further unregister calls from posting to this thread.
        slot.state.store(UNREGISTERING, Ordering::Release);
        slot.thread_id.store(0, Ordering::Release);

        self.backend.uninstall(installation)?;
        log::info!("hook: {class} hook removed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
