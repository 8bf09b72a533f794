//! `WM_INPUT` payload parsing and raw input device queries.
//!
//! Packets are copied out of the system buffer with `GetRawInputData` and
//! read with `read_unaligned`, since a `Vec<u8>` gives no alignment for
//! `RAWINPUT`.

use std::ffi::c_void;
use std::mem;
use std::ptr;

use windows_sys::Win32::Foundation::{GetLastError, ERROR_INSUFFICIENT_BUFFER, HANDLE, LPARAM};
use windows_sys::Win32::UI::Input::{
    GetRawInputData, GetRawInputDeviceInfoW, GetRawInputDeviceList, HRAWINPUT, RAWINPUTDEVICELIST,
    RAWINPUTHEADER, RAWKEYBOARD, RAWMOUSE, RIDI_DEVICENAME, RID_INPUT, RIM_TYPEKEYBOARD,
    RIM_TYPEMOUSE,
};

use crate::hook::devices::{DeviceError, RawDeviceEntry};
use crate::hook::normalize::{RawKeyRecord, RawMouseRecord};
use crate::hook::{DeviceHandle, InputClass};

#[derive(Debug, Clone, Copy)]
pub(super) enum RawPacket {
    Keyboard(RawKeyRecord),
    Mouse(RawMouseRecord),
}

/// Reads the packet behind a `WM_INPUT` lparam.
pub(super) fn read_packet(l_param: LPARAM) -> Option<RawPacket> {
    let header_size = mem::size_of::<RAWINPUTHEADER>() as u32;
    let handle = l_param as HRAWINPUT;

    // SAFETY: size query first, then a buffer of exactly that size.
    unsafe {
        let mut size = 0u32;
        if GetRawInputData(handle, RID_INPUT, ptr::null_mut(), &mut size, header_size) == u32::MAX
            || size == 0
        {
            return None;
        }

        let mut buf = vec![0u8; size as usize];
        let read = GetRawInputData(
            handle,
            RID_INPUT,
            buf.as_mut_ptr() as *mut c_void,
            &mut size,
            header_size,
        );
        if read == u32::MAX {
            log::debug!("capture: GetRawInputData failed with error {}", GetLastError());
            return None;
        }
        buf.truncate(read as usize);

        parse_packet(&buf)
    }
}

/// Parses a `RID_INPUT` payload. Other HID device types yield `None`.
fn parse_packet(buf: &[u8]) -> Option<RawPacket> {
    let header_size = mem::size_of::<RAWINPUTHEADER>();
    if buf.len() < header_size {
        return None;
    }

    // SAFETY: every read is bounds-checked against `buf` first.
    unsafe {
        let header: RAWINPUTHEADER = ptr::read_unaligned(buf.as_ptr() as *const RAWINPUTHEADER);
        let data = buf.as_ptr().add(header_size);
        let device = handle_of(header.hDevice);

        match header.dwType {
            RIM_TYPEKEYBOARD => {
                if buf.len() < header_size + mem::size_of::<RAWKEYBOARD>() {
                    return None;
                }
                let kb: RAWKEYBOARD = ptr::read_unaligned(data as *const RAWKEYBOARD);
                Some(RawPacket::Keyboard(RawKeyRecord {
                    message: kb.Message,
                    vkey: kb.VKey,
                    make_code: kb.MakeCode,
                    device,
                }))
            }
            RIM_TYPEMOUSE => {
                if buf.len() < header_size + mem::size_of::<RAWMOUSE>() {
                    return None;
                }
                let m: RAWMOUSE = ptr::read_unaligned(data as *const RAWMOUSE);
                Some(RawPacket::Mouse(RawMouseRecord {
                    button_flags: m.Anonymous.Anonymous.usButtonFlags,
                    button_data: m.Anonymous.Anonymous.usButtonData,
                    last_x: m.lLastX,
                    last_y: m.lLastY,
                    device,
                }))
            }
            _ => None,
        }
    }
}

/// Lists every attached raw input device with its class.
pub(super) fn device_list() -> Result<Vec<RawDeviceEntry>, DeviceError> {
    let entry_size = mem::size_of::<RAWINPUTDEVICELIST>() as u32;

    // SAFETY: count query, then a buffer of `count` entries.
    unsafe {
        let mut count = 0u32;
        if GetRawInputDeviceList(ptr::null_mut(), &mut count, entry_size) == u32::MAX {
            return Err(DeviceError::QueryFailed(GetLastError()));
        }

        let expected = count;
        let mut list = vec![
            RAWINPUTDEVICELIST {
                hDevice: ptr::null_mut(),
                dwType: 0,
            };
            count as usize
        ];
        let listed = GetRawInputDeviceList(list.as_mut_ptr(), &mut count, entry_size);
        if listed == u32::MAX {
            let err = GetLastError();
            return Err(if err == ERROR_INSUFFICIENT_BUFFER {
                DeviceError::SizeChanged
            } else {
                DeviceError::QueryFailed(err)
            });
        }
        if listed != expected {
            return Err(DeviceError::SizeChanged);
        }

        Ok(list
            .iter()
            .map(|entry| RawDeviceEntry {
                handle: handle_of(entry.hDevice),
                class: match entry.dwType {
                    RIM_TYPEKEYBOARD => Some(InputClass::Keyboard),
                    RIM_TYPEMOUSE => Some(InputClass::Mouse),
                    _ => None,
                },
            })
            .collect())
    }
}

/// Device interface path (`\\?\HID#...`) of a raw input device.
pub(super) fn device_name(handle: DeviceHandle) -> Option<String> {
    let device = handle.0 as HANDLE;

    // SAFETY: `size` is in u16 units for RIDI_DEVICENAME; the buffer matches it.
    unsafe {
        let mut size = 0u32;
        let probe = GetRawInputDeviceInfoW(device, RIDI_DEVICENAME, ptr::null_mut(), &mut size);
        if probe == u32::MAX || size == 0 {
            return None;
        }

        let mut wide = vec![0u16; size as usize];
        let read = GetRawInputDeviceInfoW(
            device,
            RIDI_DEVICENAME,
            wide.as_mut_ptr() as *mut c_void,
            &mut size,
        );
        if read == u32::MAX {
            return None;
        }

        while wide.last() == Some(&0) {
            wide.pop();
        }
        Some(String::from_utf16_lossy(&wide))
    }
}

fn handle_of(device: HANDLE) -> DeviceHandle {
    DeviceHandle(device as isize)
}
