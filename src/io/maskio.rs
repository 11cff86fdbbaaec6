// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Wrappers over MIRIAD's flag-mask I/O (`maskio.c`).
//!
//! Masks are bit arrays stored in an item. They can be read and written
//! either expanded (one `int` per flag) or run-length encoded; MIRIAD does
//! all the encoding.

use std::{
    os::raw::{c_char, c_int},
    ptr::NonNull,
};

use log::trace;
use ndarray::{ArrayBase, Data, DataMut, Ix1};

use super::{as_slice, as_slice_mut, c_len, c_string, check_min_len, to_off_t, MiriadError};
use crate::{
    bug::guarded,
    constants::{MK_FLAGS, MK_RUNS},
    sys,
};

/// How flags are laid out in the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MaskMode {
    /// One `int` per flag.
    Flags,
    /// Run-length encoded.
    Runs,
}

impl From<MaskMode> for c_int {
    fn from(mode: MaskMode) -> c_int {
        match mode {
            MaskMode::Flags => MK_FLAGS,
            MaskMode::Runs => MK_RUNS,
        }
    }
}

impl TryFrom<c_int> for MaskMode {
    type Error = MiriadError;

    fn try_from(value: c_int) -> Result<Self, Self::Error> {
        match value {
            MK_FLAGS => Ok(MaskMode::Flags),
            MK_RUNS => Ok(MaskMode::Runs),
            _ => Err(MiriadError::InvalidArgument {
                function: "MaskMode::try_from",
                reason: format!("{value} is not a mask mode"),
            }),
        }
    }
}

/// An open mask item. Close it with [`mkclose`].
#[derive(Debug)]
pub struct MaskHandle(NonNull<c_char>);

impl MaskHandle {
    fn as_ptr(&self) -> *mut c_char {
        self.0.as_ptr()
    }
}

/// In expanded mode MIRIAD fills in exactly `n` ints.
fn check_mask_buffer(
    function: &'static str,
    mode: MaskMode,
    nsize: usize,
    n: usize,
) -> Result<(), MiriadError> {
    match mode {
        MaskMode::Flags => check_min_len("flags", function, nsize, n),
        MaskMode::Runs => Ok(()),
    }
}

/// Open the mask item `name` of a dataset. `status` is "old" or "new".
pub fn mkopen(tno: c_int, name: &str, status: &str) -> Result<MaskHandle, MiriadError> {
    trace!("mkopen {name} ({status})");
    let c_name = c_string(name)?;
    let c_status = c_string(status)?;
    let handle = guarded(|| unsafe { sys::mkopen_c(tno, c_name.as_ptr(), c_status.as_ptr()) })?;
    NonNull::new(handle)
        .map(MaskHandle)
        .ok_or_else(|| MiriadError::MaskOpen {
            name: name.to_string(),
        })
}

pub fn mkclose(handle: MaskHandle) -> Result<(), MiriadError> {
    guarded(|| unsafe { sys::mkclose_c(handle.as_ptr()) })
}

/// Read `n` flags starting at flag `offset`. Returns the number of elements
/// of `flags` that were filled in.
pub fn mkread<S: DataMut<Elem = i32>>(
    handle: &MaskHandle,
    mode: MaskMode,
    flags: &mut ArrayBase<S, Ix1>,
    offset: i64,
    n: usize,
) -> Result<usize, MiriadError> {
    check_mask_buffer("mkread", mode, flags.len(), n)?;
    let c_n = c_len("mkread", n)?;
    let nsize = c_len("mkread", flags.len())?;
    let offset = to_off_t("mkread", offset)?;
    let flags = as_slice_mut(flags, "flags", "mkread")?;
    let nread = guarded(|| unsafe {
        sys::mkread_c(
            handle.as_ptr(),     /* I - mask handle           */
            mode.into(),         /* I - MK_FLAGS or MK_RUNS   */
            flags.as_mut_ptr(),  /* O - flags                 */
            offset,              /* I - offset, in flags      */
            c_n,                 /* I - number of flags       */
            nsize,               /* I - size of flags buffer  */
        )
    })?;
    Ok(nread.max(0) as usize)
}

/// Write `n` flags starting at flag `offset`. In run mode, `flags` must
/// decode to `n` flags.
pub fn mkwrite<S: Data<Elem = i32>>(
    handle: &MaskHandle,
    mode: MaskMode,
    flags: &ArrayBase<S, Ix1>,
    offset: i64,
    n: usize,
) -> Result<(), MiriadError> {
    check_mask_buffer("mkwrite", mode, flags.len(), n)?;
    let c_n = c_len("mkwrite", n)?;
    let nsize = c_len("mkwrite", flags.len())?;
    let offset = to_off_t("mkwrite", offset)?;
    let flags = as_slice(flags, "flags", "mkwrite")?;
    guarded(|| unsafe {
        sys::mkwrite_c(handle.as_ptr(), mode.into(), flags.as_ptr(), offset, c_n, nsize)
    })
}

pub fn mkflush(handle: &MaskHandle) -> Result<(), MiriadError> {
    guarded(|| unsafe { sys::mkflush_c(handle.as_ptr()) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_mode_codes() {
        assert_eq!(c_int::from(MaskMode::Flags), 1);
        assert_eq!(c_int::from(MaskMode::Runs), 2);
        assert_eq!(MaskMode::try_from(1).unwrap(), MaskMode::Flags);
        assert_eq!(MaskMode::try_from(2).unwrap(), MaskMode::Runs);
        assert!(MaskMode::try_from(3).is_err());
    }

    #[test]
    fn test_check_mask_buffer() {
        assert!(check_mask_buffer("mkread", MaskMode::Flags, 128, 128).is_ok());
        assert!(check_mask_buffer("mkread", MaskMode::Flags, 127, 128).is_err());
        // Run buffers are bounded by nsize inside MIRIAD.
        assert!(check_mask_buffer("mkread", MaskMode::Runs, 4, 128).is_ok());
    }
}
