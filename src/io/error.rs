// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors raised by the MIRIAD I/O bindings.

use thiserror::Error;

use crate::{bug::Severity, wcs::CelError};

/// Why a header item couldn't be read as a single scalar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderItemError {
    #[error("not well-defined")]
    NotWellDefined,

    #[error("its size could not be determined")]
    UnknownSize,

    #[error("it contains mixed binary data")]
    MixedBinary,

    #[error("it is extended textual data")]
    ExtendedText,

    #[error("it is not a single value (has {0} elements)")]
    NotScalar(i32),

    #[error("it does not exist")]
    Missing,

    #[error("it holds {found} data, not {wanted}")]
    WrongType {
        found: &'static str,
        wanted: &'static str,
    },
}

/// All the errors that can occur when talking to MIRIAD.
#[derive(Error, Debug)]
pub enum MiriadError {
    /// MIRIAD called its bug handler with a fatal severity (or a lesser
    /// severity that the current warning policy escalates).
    #[error("MIRIAD error: {message}")]
    Bug {
        /// The severity MIRIAD reported.
        severity: Severity,
        /// The message MIRIAD reported.
        message: String,
    },

    /// A nonzero `iostat` from a MIRIAD routine.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    BadArrayShape {
        argument: &'static str,
        function: &'static str,
        expected: String,
        received: String,
    },

    #[error("argument {argument} of function {function} must be a contiguous (standard layout) array")]
    NotContiguous {
        argument: &'static str,
        function: &'static str,
    },

    /// An error when converting a Rust string to a C string.
    #[error(transparent)]
    BadString(#[from] std::ffi::NulError),

    #[error("cannot read header item \"{item}\": {reason}")]
    HeaderItem {
        item: String,
        reason: HeaderItemError,
    },

    #[error("unknown type code '{code}' for UV variable \"{var}\"")]
    UnknownVarType { var: String, code: char },

    #[error("malformed \"{item}\" table: {reason}")]
    BadTable { item: &'static str, reason: String },

    #[error("failed to open mask item \"{name}\"")]
    MaskOpen { name: String },

    #[error("{0} is not available in this build")]
    NotImplemented(&'static str),

    #[error("invalid argument to {function}: {reason}")]
    InvalidArgument {
        function: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Cel(#[from] CelError),
}

/// Convert a MIRIAD `iostat` into a [`Result`]. MIRIAD uses errno values, so
/// the resulting [`std::io::Error`] carries the system's message.
#[inline]
pub fn check_iostat(iostat: i32) -> Result<(), MiriadError> {
    if iostat == 0 {
        Ok(())
    } else {
        Err(std::io::Error::from_raw_os_error(iostat).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_iostat_ok() {
        assert!(check_iostat(0).is_ok());
    }

    #[test]
    fn test_check_iostat_errno() {
        match check_iostat(libc::ENOENT) {
            Err(MiriadError::Io(e)) => {
                assert_eq!(e.raw_os_error(), Some(libc::ENOENT));
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_error_messages() {
        let e = MiriadError::HeaderItem {
            item: "crval1".to_string(),
            reason: HeaderItemError::NotScalar(3),
        };
        assert_eq!(
            e.to_string(),
            "cannot read header item \"crval1\": it is not a single value (has 3 elements)"
        );

        let e = MiriadError::BadArrayShape {
            argument: "preamble",
            function: "uvread",
            expected: "4 or 5".to_string(),
            received: "3".to_string(),
        };
        assert!(e.to_string().contains("argument preamble of function uvread"));
    }
}
