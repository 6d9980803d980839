//! FFI bindings for Hoverfetch
//!
//! C-compatible functions for embedding the engine in a browser extension
//! host, a WebView shell or any other runtime with a C ABI. All functions use
//! null-terminated UTF-8 strings and return allocated memory that must be
//! freed by the caller using `hoverfetch_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::EngineConfig;
use crate::pipeline::{replay_events, PredictionEngine};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Replay NDJSON events through a fresh engine and return NDJSON host
/// instructions.
///
/// # Safety
/// - `ndjson` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `hoverfetch_free_string`.
/// - Returns NULL on error; call `hoverfetch_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hoverfetch_replay(ndjson: *const c_char) -> *mut c_char {
    clear_last_error();

    let events = match cstr_to_string(ndjson) {
        Some(s) => s,
        None => {
            set_last_error("Invalid events string pointer");
            return ptr::null_mut();
        }
    };

    match replay_events(&events) {
        Ok(output) => string_to_cstr(&output),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Engine API
// ============================================================================

/// Opaque handle to a PredictionEngine
pub struct HoverfetchEngineHandle {
    engine: PredictionEngine,
}

/// Create an engine. `config_json` may be NULL for the default configuration.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `hoverfetch_engine_free`.
/// - Returns NULL on error; call `hoverfetch_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hoverfetch_engine_new(config_json: *const c_char) -> *mut HoverfetchEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match EngineConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match PredictionEngine::new(config) {
        Ok(engine) => Box::into_raw(Box::new(HoverfetchEngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `hoverfetch_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hoverfetch_engine_free(engine: *mut HoverfetchEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Handle one JSON event and return the resulting host instructions as a
/// JSON array.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `hoverfetch_engine_new`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `hoverfetch_free_string`.
/// - Returns NULL on error; call `hoverfetch_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hoverfetch_engine_handle_event(
    engine: *mut HoverfetchEngineHandle,
    event_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &mut *engine;

    let json = match cstr_to_string(event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event string pointer");
            return ptr::null_mut();
        }
    };

    let result = handle
        .engine
        .handle_json(&json)
        .and_then(|instructions| Ok(serde_json::to_string(&instructions)?));
    match result {
        Ok(output) => string_to_cstr(&output),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Current engine status as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `hoverfetch_engine_new`.
/// - Returns a newly allocated string that must be freed with `hoverfetch_free_string`.
/// - Returns NULL on error; call `hoverfetch_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hoverfetch_engine_status(engine: *const HoverfetchEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    match serde_json::to_string(&handle.engine.status()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Select an operating mode by name ("turbo", "balanced", "eco", "auto").
///
/// # Safety
/// - `engine` must be a valid pointer returned by `hoverfetch_engine_new`.
/// - `mode` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero if the mode was rejected.
#[no_mangle]
pub unsafe extern "C" fn hoverfetch_engine_set_mode(
    engine: *mut HoverfetchEngineHandle,
    mode: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    let mode = match cstr_to_string(mode) {
        Some(s) => s,
        None => {
            set_last_error("Invalid mode string pointer");
            return -1;
        }
    };

    if handle.engine.set_mode(&mode) {
        0
    } else {
        set_last_error(&format!("Unknown mode: {mode}"));
        -1
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Hoverfetch functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Hoverfetch function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hoverfetch_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Hoverfetch function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn hoverfetch_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn hoverfetch_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
