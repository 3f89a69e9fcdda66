//! FFI boundary conventions
//!
//! The contract both sides of the boundary honor: objects cross as
//! opaque integers, failures cross as a code plus an owned message
//! buffer, async results cross through the callback entry point, and a
//! single idempotent teardown hook surfaces leaked immutable handles.

use std::ffi::CStr;

use libc::c_char;
use thiserror::Error;

use crate::bridge::Bridge;
use crate::executor::SubmitError;
use crate::handle::Handle;
use crate::value::PropertyValue;

/// Error code used when a submission failed before the boundary was
/// reached.
pub const CODE_SUBMIT_FAILED: i32 = -1;

/// Error code used when a call's result channel was lost.
pub const CODE_CALL_LOST: i32 = -2;

/// A failed foreign call, as reported back to the caller.
///
/// Always a recoverable error value: the native side reported a nonzero
/// code, or the call never made it across. Never silently swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("foreign call failed (code {code}): {message}")]
pub struct ForeignError {
    /// Nonzero error code from the native runtime (negative codes are
    /// bridge-side failures).
    pub code: i32,
    /// Human-readable message, copied out of the native buffer.
    pub message: String,
}

impl ForeignError {
    /// Build an error from a code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The call never reached the boundary because submission failed.
    pub fn from_submit(err: SubmitError) -> Self {
        Self::new(CODE_SUBMIT_FAILED, err.to_string())
    }

    /// The executor dropped the result channel without answering.
    pub fn call_lost() -> Self {
        Self::new(CODE_CALL_LOST, "foreign call result was lost")
    }
}

/// Frees a native message buffer. Supplied by the host binding, since
/// the buffer was allocated by the native runtime's allocator.
pub type FreeFn = unsafe extern "C" fn(*mut c_char);

/// C-layout error out-parameter filled by a foreign call.
#[repr(C)]
pub struct RawStatus {
    /// Zero means success.
    pub code: i32,
    /// Optional message buffer; ownership transfers to the caller.
    pub message: *mut c_char,
}

impl RawStatus {
    /// A success status with no message.
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: std::ptr::null_mut(),
        }
    }

    /// Decode the status, taking ownership of the message buffer.
    ///
    /// The message, if present, is copied out and freed through `free`
    /// exactly once, on both the success and the failure path.
    ///
    /// # Safety
    ///
    /// `message` must either be null or point to a NUL-terminated buffer
    /// that `free` can release, and must not be used after this call.
    pub unsafe fn consume(self, free: FreeFn) -> Result<(), ForeignError> {
        let message = if self.message.is_null() {
            String::new()
        } else {
            let copied = CStr::from_ptr(self.message).to_string_lossy().into_owned();
            free(self.message);
            copied
        };

        if self.code == 0 {
            Ok(())
        } else {
            Err(ForeignError {
                code: self.code,
                message,
            })
        }
    }
}

/// Entry point the native runtime fires to complete an async call.
///
/// Looks up and removes the callback handle in one step, then invokes
/// the closure with the decoded scalar payload. Returns 0 on success and
/// a positive value-decoding error code otherwise.
///
/// # Panics
///
/// Panics if fired before [`Bridge::install`] or for a handle that was
/// already fired or released; both are lifetime protocol violations.
#[no_mangle]
pub extern "C" fn rtbridge_callback_invoke(handle: u64, tag: u8, bits: u64) -> i32 {
    let bridge = Bridge::get();

    let value = match crate::value::ValueTag::from_u8(tag)
        .and_then(|tag| PropertyValue::from_scalar(tag, bits))
    {
        Ok(value) => value,
        Err(err) => {
            log::error!("callback {} carried an undecodable payload: {}", handle, err);
            return 1;
        }
    };

    bridge.dispatch_callback(Handle::from_raw(handle), value);
    0
}

/// Process-wide teardown hook.
///
/// Idempotent leak detector: reports (and counts) immutable handles
/// still outstanding. Returns the leak count; zero when clean, when
/// already checked, or when no bridge was ever installed.
#[no_mangle]
pub extern "C" fn rtbridge_leak_check() -> u64 {
    match Bridge::try_get() {
        Some(bridge) => bridge.leak_check() as u64,
        None => 0,
    }
}
