// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Bridging MIRIAD's bug handler into Rust errors.
//!
//! MIRIAD reports problems by calling a process-wide callback with a severity
//! and a message. A fatal bug must not return to the C code that raised it, so
//! the handler installed here unwinds (`extern "C-unwind"`) back to the
//! wrapper that made the native call, where [`guarded`] turns the unwind into
//! [`MiriadError::Bug`]. Non-fatal bugs are logged with [`log::warn!`] unless
//! the [`WarningPolicy`] says to escalate them.
//!
//! Unwinding skips whatever cleanup the C frames would have done, exactly like
//! the `longjmp` MIRIAD was designed around. After a fatal bug the only sane
//! thing to do with the affected dataset is close or abort it.
//!
//! MIRIAD is not thread safe; every native call is made while holding a single
//! process-wide lock.

use std::{
    ffi::CStr,
    fmt,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU8, Ordering},
        Mutex, Once, PoisonError,
    },
};

use lazy_static::lazy_static;
use log::warn;

use crate::{io::MiriadError, sys};

lazy_static! {
    static ref NATIVE_LOCK: Mutex<()> = Mutex::new(());
}

static INSTALL_HANDLER: Once = Once::new();

static POLICY: AtomicU8 = AtomicU8::new(WarningPolicy::Log as u8);

/// The severity attached to a MIRIAD bug report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    Informational,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Interpret MIRIAD's one-letter severity code. Only 'f' is fatal;
    /// unrecognised codes are warnings.
    pub fn from_code(code: char) -> Severity {
        match code.to_ascii_lowercase() {
            'i' => Severity::Informational,
            'e' => Severity::Error,
            'f' => Severity::Fatal,
            _ => Severity::Warning,
        }
    }

    /// The one-letter code MIRIAD uses for this severity.
    pub fn code(self) -> char {
        match self {
            Severity::Informational => 'i',
            Severity::Warning => 'w',
            Severity::Error => 'e',
            Severity::Fatal => 'f',
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Informational => "informational",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// What to do with non-fatal bug reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WarningPolicy {
    /// Log them with [`log::warn!`] and carry on.
    #[default]
    Log = 0,

    /// Abort the current call with [`MiriadError::Bug`], as if they were
    /// fatal.
    Escalate = 1,
}

/// Set the process-wide policy for non-fatal bug reports.
pub fn set_warning_policy(policy: WarningPolicy) {
    POLICY.store(policy as u8, Ordering::SeqCst);
}

/// Get the process-wide policy for non-fatal bug reports.
pub fn warning_policy() -> WarningPolicy {
    match POLICY.load(Ordering::SeqCst) {
        1 => WarningPolicy::Escalate,
        _ => WarningPolicy::Log,
    }
}

/// The unwind payload carried from the bug handler to [`catch_bug`].
struct BugUnwind {
    severity: Severity,
    message: String,
}

/// The unwind payload raised by native entry points that weren't linked in.
#[cfg(not(feature = "link"))]
struct Unlinked(&'static str);

/// Called in place of a MIRIAD routine when the crate is built without the
/// `link` feature. [`guarded`] turns this into
/// [`MiriadError::NotImplemented`].
#[cfg(not(feature = "link"))]
pub(crate) fn unlinked(routine: &'static str) -> ! {
    resume_unwind(Box::new(Unlinked(routine)))
}

fn escalates(severity: Severity) -> bool {
    severity == Severity::Fatal || warning_policy() == WarningPolicy::Escalate
}

fn log_bug(severity: Severity, message: &str) {
    warn!("MIRIAD warning (severity {}): {message}", severity.code());
}

/// Signal a bug from Rust code, with the same semantics as a bug raised
/// inside MIRIAD.
pub fn report<S: Into<String>>(severity: Severity, message: S) -> Result<(), MiriadError> {
    let message = message.into();
    if escalates(severity) {
        Err(MiriadError::Bug { severity, message })
    } else {
        log_bug(severity, &message);
        Ok(())
    }
}

/// Handle a bug raised by native code. Does not return if the bug escalates.
fn dispatch(severity: Severity, message: String) {
    if escalates(severity) {
        resume_unwind(Box::new(BugUnwind { severity, message }));
    }
    log_bug(severity, &message);
}

unsafe extern "C-unwind" fn bug_handler() {
    let severity = Severity::from_code(sys::bugseverity_c() as u8 as char);
    let ptr = sys::bugmessage_c();
    let message = if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    };
    dispatch(severity, message);
}

/// Run `f`, converting a bug unwind into [`MiriadError::Bug`]. Any other
/// panic keeps unwinding.
fn catch_bug<T, F: FnOnce() -> T>(f: F) -> Result<T, MiriadError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Ok(v),
        Err(payload) => {
            let payload = match payload.downcast::<BugUnwind>() {
                Ok(bug) => {
                    return Err(MiriadError::Bug {
                        severity: bug.severity,
                        message: bug.message,
                    })
                }
                Err(other) => other,
            };
            #[cfg(not(feature = "link"))]
            let payload = match payload.downcast::<Unlinked>() {
                Ok(unlinked) => return Err(MiriadError::NotImplemented(unlinked.0)),
                Err(other) => other,
            };
            resume_unwind(payload)
        }
    }
}

/// Make a native MIRIAD call. Serialises against every other native call,
/// installs the bug handler on first use, and catches bugs raised during the
/// call.
///
/// `f` must not itself call [`guarded`].
pub(crate) fn guarded<T, F: FnOnce() -> T>(f: F) -> Result<T, MiriadError> {
    let _lock = NATIVE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    INSTALL_HANDLER.call_once(|| unsafe { sys::bugrecover_c(Some(bug_handler)) });
    catch_bug(f)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_severity_codes() {
        for c in ['i', 'w', 'e', 'f'] {
            assert_eq!(Severity::from_code(c).code(), c);
        }
        assert_eq!(Severity::from_code('W'), Severity::Warning);
        assert_eq!(Severity::from_code('F'), Severity::Fatal);
        assert_eq!(Severity::from_code('?'), Severity::Warning);
        assert_eq!(Severity::from_code(' '), Severity::Warning);
        assert_eq!(Severity::Error.to_string(), "error");
    }

    #[test]
    #[serial]
    fn test_fatal_bug_becomes_error() {
        set_warning_policy(WarningPolicy::Log);
        let result: Result<i32, _> = catch_bug(|| {
            dispatch(Severity::Fatal, "Dataset is corrupt".to_string());
            1
        });
        match result {
            Err(MiriadError::Bug { severity, message }) => {
                assert_eq!(severity, Severity::Fatal);
                assert_eq!(message, "Dataset is corrupt");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_warning_is_logged_by_default() {
        set_warning_policy(WarningPolicy::Log);
        let result = catch_bug(|| {
            dispatch(Severity::Warning, "Clipping".to_string());
            7
        });
        assert_eq!(result.unwrap(), 7);
        assert!(report(Severity::Informational, "fyi").is_ok());
    }

    #[test]
    #[serial]
    fn test_warning_escalates() {
        set_warning_policy(WarningPolicy::Escalate);
        let result = catch_bug(|| dispatch(Severity::Warning, "Clipping".to_string()));
        let report_result = report(Severity::Warning, "also clipping");
        set_warning_policy(WarningPolicy::Log);

        assert!(matches!(
            result,
            Err(MiriadError::Bug {
                severity: Severity::Warning,
                ..
            })
        ));
        assert!(report_result.is_err());
    }

    #[test]
    #[serial]
    fn test_report_fatal() {
        set_warning_policy(WarningPolicy::Log);
        let err = report(Severity::Fatal, "Bad input").unwrap_err();
        assert_eq!(err.to_string(), "MIRIAD error: Bad input");
    }

    #[test]
    fn test_other_panics_pass_through() {
        let outer = catch_unwind(|| catch_bug(|| panic!("not a bug")));
        let payload = outer.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"not a bug"));
    }

    #[test]
    #[serial]
    fn test_unknown_severity_is_only_logged() {
        set_warning_policy(WarningPolicy::Log);
        let result = catch_bug(|| {
            dispatch(Severity::from_code('x'), "odd severity".to_string());
            3
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[cfg(not(feature = "link"))]
    #[test]
    fn test_unlinked_routines_are_not_implemented() {
        let item = std::ffi::CString::new("history").unwrap();
        let result = guarded(|| unsafe { sys::hexists_c(1, item.as_ptr()) });
        assert!(matches!(result, Err(MiriadError::NotImplemented("hexists_c"))));

        // The lock was released, so the wrappers fail the same way.
        let err = crate::io::hio::hexists(1, "history").unwrap_err();
        assert_eq!(err.to_string(), "hexists_c is not available in this build");
    }
}
