//! Mock backend for unit testing.
//!
//! Simulates what the registry relies on from the OS: a message queue per
//! thread (created by `install`), quit messages posted across threads, and
//! hook callbacks running on the hook thread. Tests inject OS records with
//! [`MockBackend::post`]. Raw input registrations are process-wide per input
//! class, as they are on the OS: a raw record only reaches a hook while its
//! class is registered.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use super::InputBackend;
use crate::hook::decode::tests::FakeLayout;
use crate::hook::devices::{DeviceError, RawDeviceEntry};
use crate::hook::dispatch::EventPipeline;
use crate::hook::normalize::{LegacyKeyRecord, LegacyMouseRecord, RawKeyRecord, RawMouseRecord};
use crate::hook::{AcquisitionMode, DeviceHandle, HookError, InputClass};

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static THREAD_ID: u32 = NEXT_THREAD_ID.fetch_add(1, Ordering::SeqCst);
}

/// A message sitting in a mock thread queue.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MockMessage {
    Quit,
    LegacyKey(LegacyKeyRecord),
    RawKey(RawKeyRecord),
    LegacyMouse(LegacyMouseRecord),
    RawMouse(RawMouseRecord),
}

pub(crate) struct MockInstallation {
    thread_id: u32,
    class: InputClass,
    mode: AcquisitionMode,
    queue: Receiver<MockMessage>,
    pipeline: RefCell<EventPipeline<FakeLayout>>,
}

#[derive(Default)]
pub(crate) struct MockBackend {
    queues: Mutex<HashMap<u32, Sender<MockMessage>>>,
    on_install: Mutex<Option<Box<dyn Fn() + Send>>>,
    devices: Mutex<(Vec<RawDeviceEntry>, HashMap<DeviceHandle, String>)>,
    raw_registrations: Mutex<HashSet<InputClass>>,
    pub(crate) fail_install: AtomicBool,
    pub(crate) fail_uninstall: AtomicBool,
    pub(crate) fail_devices: AtomicBool,
    pub(crate) installs: AtomicUsize,
    pub(crate) uninstalls: AtomicUsize,
    pub(crate) loops_entered: AtomicUsize,
    pub(crate) posted_quits: AtomicUsize,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Runs `hook` on the hook thread right after its queue exists.
    pub(crate) fn set_on_install(&self, hook: impl Fn() + Send + 'static) {
        *self.on_install.lock().unwrap() = Some(Box::new(hook));
    }

    pub(crate) fn set_devices(&self, entries: Vec<RawDeviceEntry>, names: Vec<(DeviceHandle, String)>) {
        *self.devices.lock().unwrap() = (entries, names.into_iter().collect());
    }

    pub(crate) fn raw_registered(&self, class: InputClass) -> bool {
        self.raw_registrations.lock().unwrap().contains(&class)
    }

    /// Posts a message to a thread queue; false if the thread has none.
    pub(crate) fn post(&self, thread_id: u32, message: MockMessage) -> bool {
        self.queues
            .lock()
            .unwrap()
            .get(&thread_id)
            .is_some_and(|queue| queue.send(message).is_ok())
    }
}

impl InputBackend for MockBackend {
    type Installation = MockInstallation;
    type Layout = FakeLayout;

    fn current_thread_id(&self) -> u32 {
        THREAD_ID.with(|id| *id)
    }

    fn keyboard_layout(&self) -> FakeLayout {
        FakeLayout::default()
    }

    fn install(
        &self,
        mode: AcquisitionMode,
        pipeline: EventPipeline<FakeLayout>,
    ) -> Result<MockInstallation, HookError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(HookError::InstallFailed {
                class: pipeline.class(),
                reason: "mock install failure".into(),
            });
        }

        let thread_id = self.current_thread_id();
        let class = pipeline.class();
        if mode == AcquisitionMode::RawInput {
            self.raw_registrations.lock().unwrap().insert(class);
        }
        let (tx, rx) = mpsc::channel();
        self.queues.lock().unwrap().insert(thread_id, tx);

        if let Some(hook) = self.on_install.lock().unwrap().as_ref() {
            hook();
        }

        Ok(MockInstallation {
            thread_id,
            class,
            mode,
            queue: rx,
            pipeline: RefCell::new(pipeline),
        })
    }

    fn run_message_loop(&self, installation: &MockInstallation) {
        self.loops_entered.fetch_add(1, Ordering::SeqCst);
        while let Ok(message) = installation.queue.recv() {
            if matches!(message, MockMessage::RawKey(_) | MockMessage::RawMouse(_))
                && !self.raw_registered(installation.class)
            {
                continue;
            }
            let mut pipeline = installation.pipeline.borrow_mut();
            match (message, installation.mode) {
                (MockMessage::Quit, _) => break,
                (MockMessage::LegacyKey(r), AcquisitionMode::Legacy) => pipeline.legacy_key(&r),
                (MockMessage::LegacyMouse(r), AcquisitionMode::Legacy) => pipeline.legacy_mouse(&r),
                (MockMessage::RawKey(r), AcquisitionMode::RawInput) => pipeline.raw_key(&r),
                (MockMessage::RawMouse(r), AcquisitionMode::RawInput) => pipeline.raw_mouse(&r),
                // Records of the other mode never reach this hook.
                _ => {}
            }
        }
    }

    fn uninstall(&self, installation: MockInstallation) -> Result<(), HookError> {
        self.uninstalls.fetch_add(1, Ordering::SeqCst);
        self.queues.lock().unwrap().remove(&installation.thread_id);
        if installation.mode == AcquisitionMode::RawInput {
            self.raw_registrations.lock().unwrap().remove(&installation.class);
        }
        drop(installation);
        if self.fail_uninstall.load(Ordering::SeqCst) {
            return Err(HookError::UnhookFailed("mock unhook failure".into()));
        }
        Ok(())
    }

    fn post_quit(&self, thread_id: u32) -> bool {
        self.posted_quits.fetch_add(1, Ordering::SeqCst);
        self.post(thread_id, MockMessage::Quit)
    }

    fn raw_device_list(&self) -> Result<Vec<RawDeviceEntry>, DeviceError> {
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(DeviceError::SizeChanged);
        }
        Ok(self.devices.lock().unwrap().0.clone())
    }

    fn device_name(&self, handle: DeviceHandle) -> Option<String> {
        self.devices.lock().unwrap().1.get(&handle).cloned()
    }
}
