//! Minimal libhackrf binding for transmit streaming.
//!
//! Loads `libhackrf` at runtime and wraps the handful of calls the
//! transmitter needs: open, frequency/rate/gain configuration, and the
//! callback-driven TX stream. The driver invokes the TX callback on its own
//! thread with a device-chosen buffer that the callback fills with
//! interleaved i8 I/Q pairs.

use std::ffi::{c_int, c_void};

use libloading::{Library, Symbol};

use super::{SdrError, SdrResult};

const LIB_CANDIDATES: &[&str] = &[
    "libhackrf.so.0",
    "libhackrf.so",
    "libhackrf.0.dylib",
    "libhackrf.dylib",
    "hackrf.dll",
];

/// Mirrors `struct hackrf_transfer` from libhackrf.
#[repr(C)]
struct HackrfTransfer {
    device: *mut c_void,
    buffer: *mut u8,
    buffer_length: c_int,
    valid_length: c_int,
    rx_ctx: *mut c_void,
    tx_ctx: *mut c_void,
}

type SampleBlockCb = unsafe extern "C" fn(*mut HackrfTransfer) -> c_int;

struct TxContext {
    fill: Box<dyn FnMut(&mut [u8]) + Send>,
}

/// The TX callback trampoline: hands the driver's buffer to the streamer
/// closure and marks the whole buffer valid.
unsafe extern "C" fn tx_trampoline(transfer: *mut HackrfTransfer) -> c_int {
    let transfer = &mut *transfer;
    let ctx = &mut *(transfer.tx_ctx as *mut TxContext);
    let buf = std::slice::from_raw_parts_mut(transfer.buffer, transfer.buffer_length as usize);
    (ctx.fill)(buf);
    transfer.valid_length = transfer.buffer_length;
    0
}

pub struct HackRf {
    lib: Library,
    handle: *mut c_void,
    // Kept alive while the driver thread calls into it
    tx_ctx: Option<Box<TxContext>>,
}

// The handle is only touched through the driver's thread-safe entry points.
unsafe impl Send for HackRf {}

impl HackRf {
    /// Loads the driver, initializes it and opens the first device.
    pub fn open() -> SdrResult<Self> {
        let lib = load_library()?;
        let mut dev = Self {
            lib,
            handle: std::ptr::null_mut(),
            tx_ctx: None,
        };
        let code = unsafe {
            let init: Symbol<unsafe extern "C" fn() -> c_int> = dev.sym(b"hackrf_init\0")?;
            init()
        };
        if code != 0 {
            return Err(SdrError::op("hackrf_init", code));
        }
        let code = unsafe {
            let open: Symbol<unsafe extern "C" fn(*mut *mut c_void) -> c_int> =
                dev.sym(b"hackrf_open\0")?;
            open(&mut dev.handle)
        };
        if code != 0 {
            return Err(SdrError::OpenFailed(code));
        }
        Ok(dev)
    }

    pub fn set_freq(&self, hz: u64) -> SdrResult<()> {
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void, u64) -> c_int> =
                self.sym(b"hackrf_set_freq\0")?;
            f(self.handle, hz)
        };
        self.check("hackrf_set_freq", code)
    }

    pub fn set_sample_rate(&self, hz: f64) -> SdrResult<()> {
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void, f64) -> c_int> =
                self.sym(b"hackrf_set_sample_rate\0")?;
            f(self.handle, hz)
        };
        self.check("hackrf_set_sample_rate", code)
    }

    pub fn set_txvga_gain(&self, gain: u32) -> SdrResult<()> {
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void, u32) -> c_int> =
                self.sym(b"hackrf_set_txvga_gain\0")?;
            f(self.handle, gain)
        };
        self.check("hackrf_set_txvga_gain", code)
    }

    pub fn set_amp_enable(&self, enable: bool) -> SdrResult<()> {
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void, u8) -> c_int> =
                self.sym(b"hackrf_set_amp_enable\0")?;
            f(self.handle, enable as u8)
        };
        self.check("hackrf_set_amp_enable", code)
    }

    /// Starts TX streaming. `fill` runs on the driver's thread and must
    /// fill each buffer it is handed with interleaved i8 I/Q bytes.
    pub fn start_tx(&mut self, fill: impl FnMut(&mut [u8]) + Send + 'static) -> SdrResult<()> {
        if self.tx_ctx.is_some() {
            return Err(SdrError::AlreadyStreaming);
        }
        let ctx = Box::new(TxContext { fill: Box::new(fill) });
        let ctx_ptr = &*ctx as *const TxContext as *mut c_void;
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void, SampleBlockCb, *mut c_void) -> c_int> =
                self.sym(b"hackrf_start_tx\0")?;
            f(self.handle, tx_trampoline, ctx_ptr)
        };
        self.check("hackrf_start_tx", code)?;
        self.tx_ctx = Some(ctx);
        Ok(())
    }

    /// Stops the TX stream; the driver joins its callback thread before
    /// returning, after which the streamer context can be dropped.
    pub fn stop_tx(&mut self) -> SdrResult<()> {
        if self.tx_ctx.is_none() {
            return Ok(());
        }
        let code = unsafe {
            let f: Symbol<unsafe extern "C" fn(*mut c_void) -> c_int> =
                self.sym(b"hackrf_stop_tx\0")?;
            f(self.handle)
        };
        self.check("hackrf_stop_tx", code)?;
        self.tx_ctx = None;
        Ok(())
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

impl Drop for HackRf {
    fn drop(&mut self) {
        let _ = self.stop_tx();
        if !self.handle.is_null() {
            unsafe {
                if let Ok(close) =
                    self.sym::<unsafe extern "C" fn(*mut c_void) -> c_int>(b"hackrf_close\0")
                {
                    close(self.handle);
                }
                if let Ok(exit) = self.sym::<unsafe extern "C" fn() -> c_int>(b"hackrf_exit\0") {
                    exit();
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
    Err(SdrError::LibraryNotFound("libhackrf"))
}
