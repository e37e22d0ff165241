//! The error codes returned by every syscall, matched one-to-one against the
//! POSIX errno families the core subsystems raise. Always carried as a
//! negative return value at the syscall boundary; never translated or
//! reinterpreted along the way.

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorStatus {
    /// Bad argument to an otherwise valid call.
    InvalidArgument = 1,
    /// The call is not implemented for this target/configuration.
    NotSupported = 2,
    /// `ioctl`-style control request not recognized by the resource.
    NotATty = 3,
    /// Protocol/socket type mismatch.
    WrongProtocolType = 4,
    /// Address family not supported.
    AddressFamilyNotSupported = 5,

    /// Out of kernel or physical memory.
    OutOfMemory = 6,
    /// Process has too many open resources.
    TooManyOpenFiles = 7,
    /// System-wide resource table is full.
    SystemResourcesExhausted = 8,
    /// Operation would block and the resource is non-blocking.
    WouldBlock = 9,

    /// Handle/resource ID does not name a live object.
    InvalidResource = 10,
    /// Name lookup found nothing.
    NoSuchEntry = 11,
    /// Object already exists where creation demanded it not.
    AlreadyExists = 12,
    /// Caller lacks permission for the operation.
    PermissionDenied = 13,
    /// PID does not name a live process.
    NoSuchProcess = 14,
    /// `waitpid` with no children left to reap.
    NoChildren = 15,

    /// Sleep/wait deadline elapsed.
    TimedOut = 16,
    /// Interruptible wait was cancelled by a pending signal.
    Interrupted = 17,

    /// Pointer argument failed `vm_mapBelongs` validation.
    BadAddress = 18,
    /// Mapping/protection is not permitted for this region.
    AccessDenied = 19,

    /// Port's peer went away mid-operation.
    BrokenPipe = 20,
    /// Unexpected low-level I/O failure.
    IoError = 21,
    /// Resource busy, e.g. port ownership changed mid-session.
    Busy = 22,

    /// Catch-all for a condition with no dedicated code yet.
    Generic = 23,
}

impl ErrorStatus {
    const MAX: u16 = Self::Generic as u16;

    #[inline(always)]
    pub fn as_str(&self) -> &'static str {
        use ErrorStatus::*;
        match *self {
            InvalidArgument => "Invalid Argument",
            NotSupported => "Not Supported",
            NotATty => "Not a TTY",
            WrongProtocolType => "Wrong Protocol Type",
            AddressFamilyNotSupported => "Address Family Not Supported",
            OutOfMemory => "Out of Memory",
            TooManyOpenFiles => "Too Many Open Files",
            SystemResourcesExhausted => "System Resources Exhausted",
            WouldBlock => "Operation Would Block",
            InvalidResource => "Invalid Resource",
            NoSuchEntry => "No Such Entry",
            AlreadyExists => "Already Exists",
            PermissionDenied => "Permission Denied",
            NoSuchProcess => "No Such Process",
            NoChildren => "No Child Processes",
            TimedOut => "Timed Out",
            Interrupted => "Interrupted",
            BadAddress => "Bad Address",
            AccessDenied => "Access Denied",
            BrokenPipe => "Broken Pipe",
            IoError => "I/O Error",
            Busy => "Resource Busy",
            Generic => "Generic Error",
        }
    }
}

impl TryFrom<u16> for ErrorStatus {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value > 0 && value <= Self::MAX {
            Ok(unsafe { core::mem::transmute(value) })
        } else {
            Err(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysResult {
    Success,
    Error(ErrorStatus),
}

impl From<ErrorStatus> for SysResult {
    #[inline(always)]
    fn from(value: ErrorStatus) -> Self {
        SysResult::Error(value)
    }
}

impl From<Result<(), ErrorStatus>> for SysResult {
    #[inline(always)]
    fn from(value: Result<(), ErrorStatus>) -> Self {
        match value {
            Ok(()) => SysResult::Success,
            Err(err) => SysResult::Error(err),
        }
    }
}

impl TryFrom<u16> for SysResult {
    type Error = ();
    #[inline(always)]
    fn try_from(value: u16) -> Result<Self, ()> {
        match value {
            0 => Ok(SysResult::Success),
            other => {
                let err = ErrorStatus::try_from(other).map_err(|_| ())?;
                Ok(SysResult::Error(err))
            }
        }
    }
}

impl From<SysResult> for Result<(), ErrorStatus> {
    #[inline(always)]
    fn from(value: SysResult) -> Self {
        match value {
            SysResult::Success => Ok(()),
            SysResult::Error(err) => Err(err),
        }
    }
}

impl From<SysResult> for u16 {
    #[inline(always)]
    fn from(value: SysResult) -> Self {
        match value {
            SysResult::Success => 0,
            SysResult::Error(err) => err as u16,
        }
    }
}

pub trait IntoErr {
    fn into_err(self) -> ErrorStatus;
}

impl<T: IntoErr> From<T> for ErrorStatus {
    fn from(value: T) -> Self {
        value.into_err()
    }
}

#[cfg(feature = "std")]
mod std_only {
    use super::SysResult;
    use std::process::ExitCode;
    use std::process::Termination;
    impl Termination for SysResult {
        fn report(self) -> ExitCode {
            let code: u16 = self.into();
            ExitCode::from(code as u8)
        }
    }
}
