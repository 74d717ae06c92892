//! C ABI over caller-owned stack handles.
//!
//! A C caller owns a zero-initialized [`GuardStackHandle`]
//! (`guardstack_t s = {0};`) and passes its address to every call. All
//! functions return a [`StackStatus`]; none of them abort.

use crate::config::StackConfig;
use crate::error::{StackError, StackStatus};
use crate::stack::{DebugOrigin, ProtectedStack};
use crate::{crash, platform};
use core::ffi::{c_char, c_int, c_void};
use core::ptr;
use std::ffi::CStr;

/// Caller-owned handle. Null `stack` means "not constructed".
#[repr(C)]
pub struct GuardStackHandle {
    stack: *mut ProtectedStack,
}

impl GuardStackHandle {
    pub const fn new() -> Self {
        GuardStackHandle {
            stack: ptr::null_mut(),
        }
    }
}

impl Default for GuardStackHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the stack `handle` owns.
///
/// Both pointers are checked with a single fault-free read each, so a stale
/// or unmapped handle reports `NotInitialized` without scanning the region
/// listing. Permissions are only examined by [`guardstack_check`].
unsafe fn resolve<'a>(handle: *mut GuardStackHandle) -> Result<&'a mut ProtectedStack, StackError> {
    if handle.is_null() {
        return Err(StackError::NullArgument);
    }
    if !platform::is_readable(handle) {
        return Err(StackError::NotInitialized);
    }
    let stack = (*handle).stack;
    if stack.is_null() || !platform::is_readable(stack) {
        return Err(StackError::NotInitialized);
    }
    Ok(&mut *stack)
}

/// [`resolve`] plus the region-listing probe on both pointers.
unsafe fn resolve_mapped<'a>(
    handle: *mut GuardStackHandle,
) -> Result<&'a mut ProtectedStack, StackError> {
    let stack = resolve(handle)?;
    if !platform::is_valid(handle, "rw") || !platform::is_valid(stack as *const ProtectedStack, "rw") {
        return Err(StackError::NotInitialized);
    }
    Ok(stack)
}

unsafe fn origin_from_c(file: *const c_char, line: c_int, name: *const c_char) -> Option<DebugOrigin> {
    if file.is_null() && name.is_null() {
        return None;
    }
    let text = |p: *const c_char| {
        if p.is_null() {
            String::new()
        } else {
            CStr::from_ptr(p).to_string_lossy().into_owned()
        }
    };
    Some(DebugOrigin::new(
        text(file),
        u32::try_from(line).unwrap_or(0),
        text(name),
    ))
}

/// Construct a stack into `handle`. `file` and `name` may be null.
///
/// # Safety
/// `handle` must be null or point to a `GuardStackHandle`; `file` and `name`
/// must be null or NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn guardstack_construct(
    handle: *mut GuardStackHandle,
    elem_size: usize,
    initial_capacity: usize,
    file: *const c_char,
    line: c_int,
    name: *const c_char,
) -> StackStatus {
    if handle.is_null() {
        return StackStatus::NullArgument;
    }
    if !platform::is_valid(handle, "rw") {
        return StackStatus::NotInitialized;
    }
    if !(*handle).stack.is_null() {
        return StackStatus::AlreadyInitialized;
    }

    let mut stack = Box::new(ProtectedStack::new());
    let origin = origin_from_c(file, line, name);
    match stack.construct(elem_size, initial_capacity, StackConfig::from_env(), origin) {
        Ok(()) => {
            (*handle).stack = Box::into_raw(stack);
            StackStatus::Ok
        }
        Err(err) => err.into(),
    }
}

/// Destroy the stack owned by `handle` and reset the handle.
///
/// # Safety
/// `handle` must be null or point to a `GuardStackHandle`.
#[no_mangle]
pub unsafe extern "C" fn guardstack_destruct(handle: *mut GuardStackHandle) -> StackStatus {
    let stack = match resolve(handle) {
        Ok(s) => s,
        Err(err) => return err.into(),
    };
    let status = StackStatus::from(stack.destruct());
    drop(Box::from_raw(stack as *mut ProtectedStack));
    (*handle).stack = ptr::null_mut();
    status
}

/// Push `elem_size` bytes read from `data`.
///
/// # Safety
/// `handle` as above; `data` must be null or readable for `elem_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn guardstack_push(
    handle: *mut GuardStackHandle,
    data: *const c_void,
) -> StackStatus {
    let stack = match resolve(handle) {
        Ok(s) => s,
        Err(err) => return err.into(),
    };
    if data.is_null() {
        return StackStatus::NullArgument;
    }
    let element = core::slice::from_raw_parts(data as *const u8, stack.elem_size());
    stack.push(element).into()
}

/// Pop the top element into `out` (`elem_size` bytes).
///
/// # Safety
/// `handle` as above; `out` must be null or writable for `elem_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn guardstack_pop(handle: *mut GuardStackHandle, out: *mut c_void) -> StackStatus {
    let stack = match resolve(handle) {
        Ok(s) => s,
        Err(err) => return err.into(),
    };
    if out.is_null() {
        return StackStatus::NullArgument;
    }
    let out = core::slice::from_raw_parts_mut(out as *mut u8, stack.elem_size());
    stack.pop(out).into()
}

/// Run the composite integrity check, including the region-listing probe
/// of the handle and the record.
///
/// # Safety
/// `handle` must be null or point to a `GuardStackHandle`.
#[no_mangle]
pub unsafe extern "C" fn guardstack_check(handle: *mut GuardStackHandle) -> StackStatus {
    match resolve_mapped(handle) {
        Ok(stack) => stack.check().into(),
        Err(err) => err.into(),
    }
}

/// Print the diagnostic dump to stderr.
///
/// # Safety
/// `handle` must be null or point to a `GuardStackHandle`.
#[no_mangle]
pub unsafe extern "C" fn guardstack_dump(handle: *mut GuardStackHandle) -> StackStatus {
    match resolve(handle) {
        Ok(stack) => {
            eprint!("{}", stack.dump());
            StackStatus::Ok
        }
        Err(err) => err.into(),
    }
}

/// Install the crash handler. Safe to call repeatedly.
#[no_mangle]
pub extern "C" fn guardstack_install_crash_handler() -> StackStatus {
    match crash::install() {
        Ok(()) => StackStatus::Ok,
        Err(err) => {
            tracing::warn!(%err, "crash handler could not be installed");
            StackStatus::NotInitialized
        }
    }
}

/// Static NUL-terminated name of a status code, e.g. `"STACK_ERR_EMPTY"`.
#[no_mangle]
pub extern "C" fn guardstack_status_str(status: c_int) -> *const c_char {
    match StackStatus::from_code(status) {
        Some(status) => status.name_cstr(),
        None => b"STACK_ERR_UNHANDLED\0".as_ptr() as *const c_char,
    }
}
