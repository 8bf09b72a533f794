//! Per-hook-thread event pipeline: normalize, decode, deliver.
//!
//! One `EventPipeline` exists per installed hook. It is built by the registry,
//! handed to the backend, and lives on the hook thread until teardown, so the
//! keyboard state and last positions it owns are only ever touched by that
//! thread. Dropping it releases the handler reference.

use super::bridge::CallbackBridge;
use super::decode::{KeyDecoder, KeyboardLayout};
use super::normalize::{
    self, LegacyKeyRecord, LegacyMouseRecord, PositionTracker, RawKeyRecord, RawMouseRecord,
};
use super::{DeviceHandle, InputClass, KeyEvent};

pub struct EventPipeline<L> {
    class: InputClass,
    bridge: CallbackBridge,
    decoder: KeyDecoder<L>,
    legacy_position: PositionTracker,
    raw_position: PositionTracker,
}

impl<L: KeyboardLayout> EventPipeline<L> {
    pub fn new(class: InputClass, bridge: CallbackBridge, layout: L) -> Self {
        Self {
            class,
            bridge,
            decoder: KeyDecoder::new(layout),
            legacy_position: PositionTracker::new(),
            raw_position: PositionTracker::new(),
        }
    }

    pub fn class(&self) -> InputClass {
        self.class
    }

    pub fn decoder(&self) -> &KeyDecoder<L> {
        &self.decoder
    }

    /// One `WH_KEYBOARD_LL` callback.
    pub fn legacy_key(&mut self, record: &LegacyKeyRecord) {
        self.key(
            record.message,
            record.vk_code as u16,
            record.scan_code as u16,
            None,
        );
    }

    /// One `RIM_TYPEKEYBOARD` packet.
    pub fn raw_key(&mut self, record: &RawKeyRecord) {
        self.key(
            record.message,
            record.vkey,
            record.make_code,
            Some(record.device),
        );
    }

    /// One `WH_MOUSE_LL` callback.
    pub fn legacy_mouse(&mut self, record: &LegacyMouseRecord) {
        if let Some(event) = normalize::legacy_mouse(record, &mut self.legacy_position) {
            self.bridge.deliver_mouse(&event);
        }
    }

    /// One `RIM_TYPEMOUSE` packet; may deliver up to three events.
    pub fn raw_mouse(&mut self, record: &RawMouseRecord) {
        for event in normalize::raw_mouse(record, &mut self.raw_position) {
            self.bridge.deliver_mouse(&event);
        }
    }

    fn key(&mut self, message: u32, vk: u16, scan_code: u16, device: Option<DeviceHandle>) {
        let Some(transition) = normalize::key_transition(message) else {
            return;
        };

        let character = self.decoder.decode(vk, scan_code, transition);
        let event = KeyEvent {
            virtual_key: vk,
            scan_code,
            transition,
            character,
            device,
        };
        log::debug!("hook: key {vk:#04x} {transition:?} char {character:?}");
        self.bridge.deliver_key(&event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
