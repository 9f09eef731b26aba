//! Minimal librtlsdr binding for synchronous receive.
//!
//! RTL-SDR outputs 8-bit unsigned I/Q, interleaved [I0, Q0, I1, Q1, ...],
//! biased around 127. Only the calls the receiver needs are wrapped.

use std::ffi::{c_int, c_uint, c_void};

use libloading::{Library, Symbol};

use super::{SdrError, SdrResult};

const LIB_CANDIDATES: &[&str] = &[
    "librtlsdr.so.0",
    "librtlsdr.so",
    "librtlsdr.0.dylib",
    "librtlsdr.dylib",
    "rtlsdr.dll",
];

/// Driver-recommended buffer length for `read_sync`.
pub const DEFAULT_BUF_LENGTH: usize = 262_144;

pub struct RtlSdr {
    lib: Library,
    handle: *mut c_void,
}

// The handle is only used from one thread at a time.
unsafe impl Send for RtlSdr {}

impl RtlSdr {
    /// Opens device `index`, failing if no dongle is connected.
    pub fn open(index: u32) -> SdrResult<Self> {
        let lib = load_library()?;
        let mut dev = Self {
            lib,
            handle: std::ptr::null_mut(),
        };
        let count = unsafe {
            let f: Symbol<unsafe extern "C" fn() -> c_uint> =
                dev.sym(b"rtlsdr_get_device_count\0")?;
            f()
        };
        if count == 0 {
            return Err(SdrError::NoDevice);
        }
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut *mut c_void, c_uint) -> c_int> =
                dev.sym(b"rtlsdr_open\0")?;
            f(&mut dev.handle, index)
        };
        if code != 0 {
            return Err(SdrError::OpenFailed(code));
        }
        Ok(dev)
    }

    pub fn set_center_freq(&self, hz: u32) -> SdrResult<()> {
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void, c_uint) -> c_int> =
                self.sym(b"rtlsdr_set_center_freq\0")?;
            f(self.handle, hz)
        };
        self.check("rtlsdr_set_center_freq", code)
    }

    pub fn set_sample_rate(&self, hz: u32) -> SdrResult<()> {
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void, c_uint) -> c_int> =
                self.sym(b"rtlsdr_set_sample_rate\0")?;
            f(self.handle, hz)
        };
        self.check("rtlsdr_set_sample_rate", code)
    }

    /// Switches between automatic (false) and manual (true) tuner gain.
    pub fn set_tuner_gain_mode(&self, manual: bool) -> SdrResult<()> {
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void, c_int) -> c_int> =
                self.sym(b"rtlsdr_set_tuner_gain_mode\0")?;
            f(self.handle, manual as c_int)
        };
        self.check("rtlsdr_set_tuner_gain_mode", code)
    }

    /// Sets the tuner gain in tenths of a dB (e.g. 496 for 49.6 dB).
    pub fn set_tuner_gain(&self, tenths_db: i32) -> SdrResult<()> {
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void, c_int) -> c_int> =
                self.sym(b"rtlsdr_set_tuner_gain\0")?;
            f(self.handle, tenths_db)
        };
        self.check("rtlsdr_set_tuner_gain", code)
    }

    /// Flushes the device's stale sample buffer; required before streaming.
    pub fn reset_buffer(&self) -> SdrResult<()> {
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void) -> c_int> =
                self.sym(b"rtlsdr_reset_buffer\0")?;
            f(self.handle)
        };
        self.check("rtlsdr_reset_buffer", code)
    }

    /// Blocking read of interleaved u8 I/Q into `buf`; returns bytes read.
    pub fn read_sync(&self, buf: &mut [u8]) -> SdrResult<usize> {
        let mut n_read: c_int = 0;
        let code = unsafe {
            let f: Symbol<
                unsafe extern "C" fn(*mut c_void, *mut c_void, c_int, *mut c_int) -> c_int,
            > = self.sym(b"rtlsdr_read_sync\0")?;
            f(
                self.handle,
                buf.as_mut_ptr() as *mut c_void,
                buf.len() as c_int,
                &mut n_read,
            )
        };
        self.check("rtlsdr_read_sync", code)?;
        Ok(n_read as usize)
    }

    unsafe fn sym<T>(&self, name: &'static [u8]) -> SdrResult<Symbol<'_, T>> {
        self.lib.get(name).map_err(|e| {
            SdrError::MissingSymbol(
                std::str::from_utf8(&name[..name.len() - 1]).unwrap_or("?"),
                e.to_string(),
            )
        })
    }

    fn check(&self, op: &'static str, code: i32) -> SdrResult<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(SdrError::op(op, code))
        }
    }
}

impl Drop for RtlSdr {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe {
                if let Ok(close) =
                    self.sym::<unsafe extern "C" fn(*mut c_void) -> c_int>(b"rtlsdr_close\0")
                {
                    close(self.handle);
                }
            }
        }
    }
}

fn load_library() -> SdrResult<Library> {
    for name in LIB_CANDIDATES {
        if let Ok(lib) = unsafe { Library::new(name) } {
            return Ok(lib);
        }
    }
    Err(SdrError::LibraryNotFound("librtlsdr"))
}
