//! Raw input device listing.
//!
//! The backend supplies the raw device list and resolves names; this module
//! filters by input class and builds the handle -> name map. A device whose
//! name cannot be resolved is still listed, with no name.

use std::collections::BTreeMap;

use super::{DeviceHandle, InputClass};

/// Handle -> device interface path, for one input class.
pub type DeviceMap = BTreeMap<DeviceHandle, Option<String>>;

/// One `RAWINPUTDEVICELIST` entry. `class` is `None` for HID devices that are
/// neither keyboards nor mice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDeviceEntry {
    pub handle: DeviceHandle,
    pub class: Option<InputClass>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device count changed between sizing and listing.
    #[error("device list changed while it was being read")]
    SizeChanged,
    #[error("device list query failed with error {0}")]
    QueryFailed(u32),
}

/// Builds the device map for `class`.
pub fn collect_devices<F>(entries: &[RawDeviceEntry], class: InputClass, resolve_name: F) -> DeviceMap
where
    F: Fn(DeviceHandle) -> Option<String>,
{
    entries
        .iter()
        .filter(|entry| entry.class == Some(class))
        .map(|entry| {
            let name = resolve_name(entry.handle);
            if name.is_none() {
                log::debug!("devices: no name for {:#x}", entry.handle.0);
            }
            (entry.handle, name)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
