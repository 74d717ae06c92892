use core::ffi::c_char;
use thiserror::Error;

/// Failure of a stack operation. None of these are fatal to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("allocation failed")]
    AllocationFailed,
    #[error("null argument")]
    NullArgument,
    #[error("stack is already initialized")]
    AlreadyInitialized,
    #[error("stack is not initialized or its memory failed the map probe")]
    NotInitialized,
    #[error("pop on an empty stack")]
    EmptyContainer,
    #[error("guard canary corrupted")]
    GuardCorrupted,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("element is {actual} bytes, stack holds {expected}-byte elements")]
    SizeMismatch { expected: usize, actual: usize },
}

pub type Result<T> = core::result::Result<T, StackError>;

/// Stable status code returned across the C ABI. `Ok` is zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    Ok = 0,
    AllocationFailed,
    NullArgument,
    AlreadyInitialized,
    EmptyContainer,
    NotInitialized,
    ChecksumMismatch,
    GuardCorrupted,
    SizeMismatch,
}

impl StackStatus {
    pub fn is_ok(self) -> bool {
        self == StackStatus::Ok
    }

    /// Decode a raw status code, e.g. one received from C.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => StackStatus::Ok,
            1 => StackStatus::AllocationFailed,
            2 => StackStatus::NullArgument,
            3 => StackStatus::AlreadyInitialized,
            4 => StackStatus::EmptyContainer,
            5 => StackStatus::NotInitialized,
            6 => StackStatus::ChecksumMismatch,
            7 => StackStatus::GuardCorrupted,
            8 => StackStatus::SizeMismatch,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            StackStatus::Ok => "STACK_OK",
            StackStatus::AllocationFailed => "STACK_ERR_ALLOC",
            StackStatus::NullArgument => "STACK_ERR_ARGNULL",
            StackStatus::AlreadyInitialized => "STACK_ERR_INITIALIZED",
            StackStatus::EmptyContainer => "STACK_ERR_EMPTY",
            StackStatus::NotInitialized => "STACK_ERR_UNINITIALIZED",
            StackStatus::ChecksumMismatch => "STACK_ERR_CRC",
            StackStatus::GuardCorrupted => "STACK_ERR_CANARY",
            StackStatus::SizeMismatch => "STACK_ERR_SIZE",
        }
    }

    /// NUL-terminated form of [`StackStatus::name`] for C callers.
    pub fn name_cstr(self) -> *const c_char {
        let s: &'static [u8] = match self {
            StackStatus::Ok => b"STACK_OK\0",
            StackStatus::AllocationFailed => b"STACK_ERR_ALLOC\0",
            StackStatus::NullArgument => b"STACK_ERR_ARGNULL\0",
            StackStatus::AlreadyInitialized => b"STACK_ERR_INITIALIZED\0",
            StackStatus::EmptyContainer => b"STACK_ERR_EMPTY\0",
            StackStatus::NotInitialized => b"STACK_ERR_UNINITIALIZED\0",
            StackStatus::ChecksumMismatch => b"STACK_ERR_CRC\0",
            StackStatus::GuardCorrupted => b"STACK_ERR_CANARY\0",
            StackStatus::SizeMismatch => b"STACK_ERR_SIZE\0",
        };
        s.as_ptr() as *const c_char
    }
}

impl core::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl From<StackError> for StackStatus {
    fn from(err: StackError) -> Self {
        match err {
            StackError::AllocationFailed => StackStatus::AllocationFailed,
            StackError::NullArgument => StackStatus::NullArgument,
            StackError::AlreadyInitialized => StackStatus::AlreadyInitialized,
            StackError::NotInitialized => StackStatus::NotInitialized,
            StackError::EmptyContainer => StackStatus::EmptyContainer,
            StackError::GuardCorrupted => StackStatus::GuardCorrupted,
            StackError::ChecksumMismatch => StackStatus::ChecksumMismatch,
            StackError::SizeMismatch { .. } => StackStatus::SizeMismatch,
        }
    }
}

impl From<Result<()>> for StackStatus {
    fn from(res: Result<()>) -> Self {
        match res {
            Ok(()) => StackStatus::Ok,
            Err(e) => e.into(),
        }
    }
}
