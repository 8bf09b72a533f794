//! Hand-off of decoded events to the host.
//!
//! Hook procedures and window procedures run on whatever thread the OS picks
//! for them, which the host runtime may never have seen. Every delivery
//! therefore starts by attaching the current thread; attaching is expected to
//! be cheap when the thread is already known. A failed attach drops that one
//! event and leaves the hook running.
//!
//! Nothing may unwind back into the OS dispatcher, so handler panics are
//! caught here and treated like a dropped event.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use super::{InputClass, KeyEvent, MouseEvent};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("could not attach thread to host runtime: {0}")]
    AttachFailed(String),
    #[error("could not notify ready waiter: {0}")]
    NotifyFailed(String),
}

/// Host-side operations the core needs: thread attachment and the one-time
/// "hook is live" notification.
pub trait HostRuntime: Send + Sync {
    fn attach_current_thread(&self) -> Result<(), BridgeError>;

    fn notify_ready(&self, class: InputClass) -> Result<(), BridgeError>;
}

/// Receiver of decoded events.
pub trait EventHandler: Send + Sync {
    /// Whether this handler has an entry point for `class`. Checked before
    /// any OS hook is installed.
    fn supports(&self, class: InputClass) -> bool;

    fn on_key_event(&self, _event: &KeyEvent) {}

    fn on_mouse_event(&self, _event: &MouseEvent) {}
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// Attaches the calling thread and performs the upcall for one event.
#[derive(Clone)]
pub struct CallbackBridge {
    runtime: Arc<dyn HostRuntime>,
    handler: Arc<dyn EventHandler>,
}

impl CallbackBridge {
    pub fn new(runtime: Arc<dyn HostRuntime>, handler: Arc<dyn EventHandler>) -> Self {
        Self { runtime, handler }
    }

    pub fn notify_ready(&self, class: InputClass) -> Result<(), BridgeError> {
        self.runtime.notify_ready(class)
    }

    /// Returns false when the event was dropped.
    pub fn deliver_key(&self, event: &KeyEvent) -> bool {
        self.deliver("key", || self.handler.on_key_event(event))
    }

    /// Returns false when the event was dropped.
    pub fn deliver_mouse(&self, event: &MouseEvent) -> bool {
        self.deliver("mouse", || self.handler.on_mouse_event(event))
    }

    fn deliver(&self, kind: &str, upcall: impl FnOnce()) -> bool {
        if let Err(e) = self.runtime.attach_current_thread() {
            log::debug!("bridge: dropping {kind} event: {e}");
            return false;
        }

        match panic::catch_unwind(AssertUnwindSafe(upcall)) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("bridge: {kind} handler panicked; event dropped");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ready latch
// ---------------------------------------------------------------------------

/// A one-shot ready signal. The flag is latched under the mutex, so a waiter
/// that starts waiting after the notification still sees it.
#[derive(Debug, Default)]
pub struct ReadyLatch {
    ready: Mutex<bool>,
    cond: Condvar,
}

impl ReadyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) -> Result<(), BridgeError> {
        let mut ready = self
            .ready
            .lock()
            .map_err(|_| BridgeError::NotifyFailed("ready latch poisoned".into()))?;
        *ready = true;
        self.cond.notify_all();
        Ok(())
    }

    /// Blocks until notified, then re-arms the latch.
    pub fn wait(&self) {
        let guard = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ready = self
            .cond
            .wait_while(guard, |ready| !*ready)
            .unwrap_or_else(PoisonError::into_inner);
        *ready = false;
    }

    /// Like `wait`, but gives up after `timeout`. Returns true if notified.
    ///
    /// Host-side convenience only; the hook lifecycle itself never waits on
    /// a timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut ready, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |ready| !*ready)
            .unwrap_or_else(PoisonError::into_inner);
        let notified = *ready;
        *ready = false;
        notified
    }
}

/// `HostRuntime` for hosts that are plain Rust: every thread is already
/// "attached", and readiness is reported through one latch per input class.
#[derive(Debug, Default)]
pub struct LocalRuntime {
    ready: [ReadyLatch; 2],
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_ready(&self, class: InputClass) {
        self.ready[class.index()].wait();
    }

    /// Host-side convenience; see [`ReadyLatch::wait_timeout`].
    pub fn wait_ready_timeout(&self, class: InputClass, timeout: Duration) -> bool {
        self.ready[class.index()].wait_timeout(timeout)
    }
}

impl HostRuntime for LocalRuntime {
    fn attach_current_thread(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    fn notify_ready(&self, class: InputClass) -> Result<(), BridgeError> {
        self.ready[class.index()].notify()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::hook::{KeyTransition, MouseTransition};

    /// Handler that records every delivered event.
    #[derive(Default)]
    pub(crate) struct RecordingHandler {
        pub(crate) keys: Mutex<Vec<KeyEvent>>,
        pub(crate) mice: Mutex<Vec<MouseEvent>>,
        pub(crate) unsupported: bool,
    }

    impl RecordingHandler {
        pub(crate) fn keys(&self) -> Vec<KeyEvent> {
            self.keys.lock().unwrap().clone()
        }

        pub(crate) fn mice(&self) -> Vec<MouseEvent> {
            self.mice.lock().unwrap().clone()
        }
    }

    impl EventHandler for RecordingHandler {
        fn supports(&self, _class: InputClass) -> bool {
            !self.unsupported
        }

        fn on_key_event(&self, event: &KeyEvent) {
            self.keys.lock().unwrap().push(*event);
        }

        fn on_mouse_event(&self, event: &MouseEvent) {
            self.mice.lock().unwrap().push(*event);
        }
    }

    /// Runtime whose attach can be switched off, counting attach calls.
    #[derive(Default)]
    pub(crate) struct FlakyRuntime {
        pub(crate) refuse_attach: AtomicBool,
        pub(crate) refuse_notify: bool,
        pub(crate) attaches: AtomicUsize,
    }

    impl HostRuntime for FlakyRuntime {
        fn attach_current_thread(&self) -> Result<(), BridgeError> {
            self.attaches.fetch_add(1, Ordering::SeqCst);
            if self.refuse_attach.load(Ordering::SeqCst) {
                Err(BridgeError::AttachFailed("thread limit reached".into()))
            } else {
                Ok(())
            }
        }

        fn notify_ready(&self, _class: InputClass) -> Result<(), BridgeError> {
            if self.refuse_notify {
                Err(BridgeError::NotifyFailed("no monitor".into()))
            } else {
                Ok(())
            }
        }
    }

    struct PanickingHandler;

    impl EventHandler for PanickingHandler {
        fn supports(&self, _class: InputClass) -> bool {
            true
        }

        fn on_mouse_event(&self, _event: &MouseEvent) {
            panic!("handler bug");
        }
    }

    fn key() -> KeyEvent {
        KeyEvent {
            virtual_key: 0x41,
            scan_code: 0x1E,
            transition: KeyTransition::Down,
            character: Some(u16::from(b'a')),
            device: None,
        }
    }

    fn wheel() -> MouseEvent {
        MouseEvent {
            transition: MouseTransition::Wheel,
            button: None,
            x: 0,
            y: 0,
            wheel_delta: 120,
            device: None,
        }
    }

    #[test]
    fn attaches_on_every_delivery() {
        let runtime = Arc::new(FlakyRuntime::default());
        let handler = Arc::new(RecordingHandler::default());
        let bridge = CallbackBridge::new(runtime.clone(), handler.clone());

        assert!(bridge.deliver_key(&key()));
        assert!(bridge.deliver_key(&key()));
        assert_eq!(runtime.attaches.load(Ordering::SeqCst), 2);
        assert_eq!(handler.keys().len(), 2);
    }

    #[test]
    fn failed_attach_drops_only_that_event() {
        let runtime = Arc::new(FlakyRuntime::default());
        let handler = Arc::new(RecordingHandler::default());
        let bridge = CallbackBridge::new(runtime.clone(), handler.clone());

        runtime.refuse_attach.store(true, Ordering::SeqCst);
        assert!(!bridge.deliver_key(&key()));
        runtime.refuse_attach.store(false, Ordering::SeqCst);
        assert!(bridge.deliver_key(&key()));

        assert_eq!(handler.keys().len(), 1);
    }

    #[test]
    fn handler_panic_is_contained() {
        let bridge = CallbackBridge::new(Arc::new(LocalRuntime::new()), Arc::new(PanickingHandler));
        assert!(!bridge.deliver_mouse(&wheel()));
    }

    #[test]
    fn latch_notified_before_wait_is_not_lost() {
        let latch = ReadyLatch::new();
        latch.notify().unwrap();
        assert!(latch.wait_timeout(Duration::from_millis(10)));
        // Consumed by the first wait.
        assert!(!latch.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn latch_wakes_waiting_thread() {
        let runtime = Arc::new(LocalRuntime::new());
        let waiter = {
            let runtime = runtime.clone();
            thread::spawn(move || runtime.wait_ready(InputClass::Mouse))
        };
        runtime.notify_ready(InputClass::Mouse).unwrap();
        waiter.join().unwrap();
        assert!(!runtime.wait_ready_timeout(InputClass::Keyboard, Duration::from_millis(10)));
    }
}
