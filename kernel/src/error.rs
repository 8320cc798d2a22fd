//! Kernel error taxonomy.
//!
//! `KernelError` is the rich internal type threaded through `mm`, `fs`,
//! `process`, `sched`, and `object` with `?`. `OsStatus` is the flat
//! taxonomy that actually crosses the syscall boundary (see
//! `crate::syscall`): every `KernelError` collapses to exactly one
//! `OsStatus` via `From`. `BugCheck` panics are for contract violations a
//! caller could never trigger through the syscall ABI and are never
//! constructed from data that originated in user space.

use core::fmt;

/// Status code returned across the syscall boundary. Numeric values are
/// part of the external ABI and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum OsStatus {
    Success = 0,
    OutOfMemory = 1,
    NotFound = 2,
    InvalidInput = 3,
    NotSupported = 4,
    AlreadyExists = 5,
    /// Attempted to traverse through a non-folder node.
    TraverseNonFolder = 6,
    InvalidType = 7,
    /// The node has an outstanding exclusive lock and cannot be removed.
    HandleLocked = 8,
    /// Malformed path: invalid characters, empty segments, or leading/
    /// trailing separators.
    InvalidPath = 9,
    Timeout = 10,
    EndOfFile = 11,
    MoreData = 12,
    InterfaceNotSupported = 13,
    DeviceNotReady = 14,
    FunctionNotSupported = 15,
    InvalidHandle = 16,
}

impl OsStatus {
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Success)
    }

    pub const fn is_err(self) -> bool {
        !self.is_ok()
    }
}

impl fmt::Display for OsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::OutOfMemory => "out of memory",
            Self::NotFound => "not found",
            Self::InvalidInput => "invalid input",
            Self::NotSupported => "not supported",
            Self::AlreadyExists => "already exists",
            Self::TraverseNonFolder => "traversed a non-folder node",
            Self::InvalidType => "invalid type",
            Self::HandleLocked => "handle locked",
            Self::InvalidPath => "invalid path",
            Self::Timeout => "timed out",
            Self::EndOfFile => "end of file",
            Self::MoreData => "more data available",
            Self::InterfaceNotSupported => "interface not supported",
            Self::DeviceNotReady => "device not ready",
            Self::FunctionNotSupported => "function not supported",
            Self::InvalidHandle => "invalid handle",
        };
        f.write_str(text)
    }
}

pub type OsResult<T> = Result<T, OsStatus>;

/// Internal kernel error type; converts to `OsStatus` at every syscall-facing
/// boundary via `From`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    OutOfMemory {
        requested: usize,
        available: usize,
    },
    InvalidAddress {
        addr: usize,
    },
    UnmappedMemory {
        addr: usize,
    },
    InvalidHandle {
        handle: u64,
    },
    InsufficientRights {
        required: u32,
        actual: u32,
    },
    ProcessNotFound {
        pid: u64,
    },
    ThreadNotFound {
        tid: u64,
    },
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    SchedulerError(SchedError),
    FsError(FsError),
    InvalidArgument {
        name: &'static str,
        value: &'static str,
    },
    OperationNotSupported {
        operation: &'static str,
    },
    ResourceExhausted {
        resource: &'static str,
    },
    PermissionDenied {
        operation: &'static str,
    },
    AlreadyExists {
        resource: &'static str,
        id: u64,
    },
    NotFound {
        resource: &'static str,
        id: u64,
    },
    Timeout {
        operation: &'static str,
        duration_ms: u64,
    },
    NotImplemented {
        feature: &'static str,
    },
    WouldBlock,
    NotInitialized {
        subsystem: &'static str,
    },
    InvalidPath {
        reason: &'static str,
    },
}

/// Scheduler-specific errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    InvalidPriority { priority: u8 },
    InvalidCpuId { cpu: usize },
    ThreadNotFound { tid: u64 },
    CpuOffline { cpu: usize },
    InvalidAffinity,
    QueueEmpty,
    QueueFull,
    AlreadyScheduled,
}

/// Filesystem-specific errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    NotADirectory,
    IsADirectory,
    ReadOnly,
    InvalidPath,
    NoRootMount,
    AlreadyMounted,
    NotMounted,
    UnknownDriver,
    DirectoryNotEmpty,
    NodeLocked,
    InterfaceNotSupported,
    EndOfFile,
    TraverseNonFolder,
}

pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of memory: requested {} bytes, {} available",
                requested, available
            ),
            Self::InvalidAddress { addr } => write!(f, "invalid address: {:#x}", addr),
            Self::UnmappedMemory { addr } => write!(f, "unmapped memory at {:#x}", addr),
            Self::InvalidHandle { handle } => write!(f, "invalid handle: {:#x}", handle),
            Self::InsufficientRights { required, actual } => write!(
                f,
                "insufficient rights: required {:#x}, have {:#x}",
                required, actual
            ),
            Self::ProcessNotFound { pid } => write!(f, "process {} not found", pid),
            Self::ThreadNotFound { tid } => write!(f, "thread {} not found", tid),
            Self::InvalidState { expected, actual } => {
                write!(f, "invalid state: expected {}, got {}", expected, actual)
            }
            Self::SchedulerError(e) => write!(f, "scheduler error: {:?}", e),
            Self::FsError(e) => write!(f, "filesystem error: {:?}", e),
            Self::InvalidArgument { name, value } => {
                write!(f, "invalid argument '{}': {}", name, value)
            }
            Self::OperationNotSupported { operation } => {
                write!(f, "operation not supported: {}", operation)
            }
            Self::ResourceExhausted { resource } => write!(f, "resource exhausted: {}", resource),
            Self::PermissionDenied { operation } => {
                write!(f, "permission denied for operation: {}", operation)
            }
            Self::AlreadyExists { resource, id } => {
                write!(f, "{} with id {} already exists", resource, id)
            }
            Self::NotFound { resource, id } => write!(f, "{} with id {} not found", resource, id),
            Self::Timeout {
                operation,
                duration_ms,
            } => write!(f, "timeout during {}: {} ms", operation, duration_ms),
            Self::NotImplemented { feature } => write!(f, "not implemented: {}", feature),
            Self::WouldBlock => write!(f, "operation would block"),
            Self::NotInitialized { subsystem } => {
                write!(f, "subsystem not initialized: {}", subsystem)
            }
            Self::InvalidPath { reason } => write!(f, "invalid path: {}", reason),
        }
    }
}

impl From<SchedError> for KernelError {
    fn from(err: SchedError) -> Self {
        Self::SchedulerError(err)
    }
}

impl From<FsError> for KernelError {
    fn from(err: FsError) -> Self {
        Self::FsError(err)
    }
}

impl From<KernelError> for OsStatus {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::OutOfMemory { .. } | KernelError::ResourceExhausted { .. } => {
                OsStatus::OutOfMemory
            }
            KernelError::InvalidAddress { .. } | KernelError::UnmappedMemory { .. } => {
                OsStatus::InvalidInput
            }
            KernelError::InvalidHandle { .. } => OsStatus::InvalidHandle,
            KernelError::InsufficientRights { .. } | KernelError::PermissionDenied { .. } => {
                OsStatus::InvalidInput
            }
            KernelError::ProcessNotFound { .. }
            | KernelError::ThreadNotFound { .. }
            | KernelError::NotFound { .. } => OsStatus::NotFound,
            KernelError::InvalidState { .. } => OsStatus::InvalidInput,
            KernelError::SchedulerError(e) => match e {
                SchedError::ThreadNotFound { .. } => OsStatus::NotFound,
                SchedError::QueueEmpty => OsStatus::NotFound,
                SchedError::QueueFull => OsStatus::OutOfMemory,
                SchedError::InvalidPriority { .. }
                | SchedError::InvalidCpuId { .. }
                | SchedError::InvalidAffinity => OsStatus::InvalidInput,
                SchedError::CpuOffline { .. } => OsStatus::DeviceNotReady,
                SchedError::AlreadyScheduled => OsStatus::AlreadyExists,
            },
            KernelError::FsError(e) => match e {
                FsError::NotFound => OsStatus::NotFound,
                FsError::AlreadyExists => OsStatus::AlreadyExists,
                FsError::PermissionDenied => OsStatus::InvalidInput,
                FsError::NotADirectory | FsError::TraverseNonFolder => OsStatus::TraverseNonFolder,
                FsError::IsADirectory => OsStatus::InvalidType,
                FsError::ReadOnly => OsStatus::NotSupported,
                FsError::InvalidPath => OsStatus::InvalidPath,
                FsError::NoRootMount | FsError::NotMounted => OsStatus::NotFound,
                FsError::AlreadyMounted => OsStatus::AlreadyExists,
                FsError::UnknownDriver => OsStatus::NotSupported,
                FsError::DirectoryNotEmpty => OsStatus::InvalidInput,
                FsError::NodeLocked => OsStatus::HandleLocked,
                FsError::InterfaceNotSupported => OsStatus::InterfaceNotSupported,
                FsError::EndOfFile => OsStatus::EndOfFile,
            },
            KernelError::InvalidArgument { .. } => OsStatus::InvalidInput,
            KernelError::OperationNotSupported { .. } | KernelError::NotImplemented { .. } => {
                OsStatus::NotSupported
            }
            KernelError::AlreadyExists { .. } => OsStatus::AlreadyExists,
            KernelError::Timeout { .. } => OsStatus::Timeout,
            KernelError::WouldBlock => OsStatus::Timeout,
            KernelError::NotInitialized { .. } => OsStatus::DeviceNotReady,
            KernelError::InvalidPath { .. } => OsStatus::InvalidPath,
        }
    }
}

/// Panics for contract violations that a well-formed caller can never
/// trigger. Never construct this from syscall-supplied data.
#[track_caller]
pub fn bug_check(message: &str) -> ! {
    let location = core::panic::Location::caller();
    panic!("bug check at {}:{}: {}", location.file(), location.line(), message);
}

#[macro_export]
macro_rules! kernel_error {
    (InvalidArgument { $name:expr => $value:expr }) => {
        $crate::error::KernelError::InvalidArgument {
            name: $name,
            value: $value,
        }
    };
    ($variant:ident) => {
        $crate::error::KernelError::$variant
    };
}
