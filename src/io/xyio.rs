// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Wrappers over MIRIAD's image I/O (`xyio.c`).
//!
//! Images are accessed a row at a time within the current plane. Row indices
//! passed to these functions are 1-based, as MIRIAD expects.

use std::os::raw::c_int;

use log::trace;
use ndarray::{ArrayBase, Data, DataMut, Ix1};

use super::{as_slice, as_slice_mut, c_len, c_string, check_min_len, MiriadError};
use crate::{bug::guarded, sys};

/// Open an image. For "old" images `axes` is filled in with the axis
/// lengths; for "new" images it must hold them.
pub fn xyopen<S: DataMut<Elem = i32>>(
    name: &str,
    status: &str,
    naxis: usize,
    axes: &mut ArrayBase<S, Ix1>,
) -> Result<c_int, MiriadError> {
    trace!("xyopen {name} ({status}, {naxis} axes)");
    check_min_len("axes", "xyopen", axes.len(), naxis)?;
    let c_naxis = c_len("xyopen", naxis)?;
    let c_name = c_string(name)?;
    let c_status = c_string(status)?;
    let axes = as_slice_mut(axes, "axes", "xyopen")?;
    let mut tno = 0;
    guarded(|| unsafe {
        sys::xyopen_c(
            &mut tno,          /* O - dataset handle       */
            c_name.as_ptr(),   /* I - image path           */
            c_status.as_ptr(), /* I - "old" or "new"       */
            c_naxis,           /* I - size of axes         */
            axes.as_mut_ptr(), /* IO - axis lengths        */
        )
    })?;
    Ok(tno)
}

pub fn xyclose(tno: c_int) -> Result<(), MiriadError> {
    trace!("xyclose {tno}");
    guarded(|| unsafe { sys::xyclose_c(tno) })
}

pub fn xyflush(tno: c_int) -> Result<(), MiriadError> {
    guarded(|| unsafe { sys::xyflush_c(tno) })
}

/// Read a row of the current plane.
///
/// # Safety
///
/// `row` must hold at least as many elements as the image's first axis.
pub unsafe fn xyread<S: DataMut<Elem = f32>>(
    tno: c_int,
    index: i32,
    row: &mut ArrayBase<S, Ix1>,
) -> Result<(), MiriadError> {
    let row = as_slice_mut(row, "data", "xyread")?;
    guarded(|| sys::xyread_c(tno, index, row.as_mut_ptr()))
}

/// Write a row of the current plane.
///
/// # Safety
///
/// `row` must hold at least as many elements as the image's first axis.
pub unsafe fn xywrite<S: Data<Elem = f32>>(
    tno: c_int,
    index: i32,
    row: &ArrayBase<S, Ix1>,
) -> Result<(), MiriadError> {
    let row = as_slice(row, "data", "xywrite")?;
    guarded(|| sys::xywrite_c(tno, index, row.as_ptr()))
}

/// Read the flags of a row of the current plane. Nonzero means good.
///
/// # Safety
///
/// `flags` must hold at least as many elements as the image's first axis.
pub unsafe fn xyflgrd<S: DataMut<Elem = i32>>(
    tno: c_int,
    index: i32,
    flags: &mut ArrayBase<S, Ix1>,
) -> Result<(), MiriadError> {
    let flags = as_slice_mut(flags, "flags", "xyflgrd")?;
    guarded(|| sys::xyflgrd_c(tno, index, flags.as_mut_ptr()))
}

/// Write the flags of a row of the current plane.
///
/// # Safety
///
/// `flags` must hold at least as many elements as the image's first axis.
pub unsafe fn xyflgwr<S: Data<Elem = i32>>(
    tno: c_int,
    index: i32,
    flags: &ArrayBase<S, Ix1>,
) -> Result<(), MiriadError> {
    let flags = as_slice(flags, "flags", "xyflgwr")?;
    guarded(|| sys::xyflgwr_c(tno, index, flags.as_ptr()))
}

/// Select the plane to access. `axes` holds the 1-based indices along the
/// third and higher axes.
pub fn xysetpl<S: Data<Elem = i32>>(
    tno: c_int,
    naxis: usize,
    axes: &ArrayBase<S, Ix1>,
) -> Result<(), MiriadError> {
    check_min_len("axes", "xysetpl", axes.len(), naxis)?;
    let c_naxis = c_len("xysetpl", naxis)?;
    let axes = as_slice(axes, "axes", "xysetpl")?;
    guarded(|| unsafe { sys::xysetpl_c(tno, c_naxis, axes.as_ptr()) })
}

#[cfg(test)]
mod tests {
    use ndarray::{array, s, Array1};

    use super::*;

    #[test]
    fn test_axis_buffers_checked() {
        let mut axes = Array1::<i32>::zeros(2);
        for status in ["old", "new"] {
            assert!(matches!(
                xyopen("image", status, 3, &mut axes),
                Err(MiriadError::BadArrayShape {
                    argument: "axes",
                    function: "xyopen",
                    ..
                })
            ));
        }
        assert!(matches!(
            xysetpl(1, 2, &array![1]),
            Err(MiriadError::BadArrayShape {
                argument: "axes",
                function: "xysetpl",
                ..
            })
        ));
    }

    #[test]
    fn test_bad_strings_rejected_before_opening() {
        let mut axes = array![16, 16];
        assert!(matches!(
            xyopen("bad\0name", "old", 2, &mut axes),
            Err(MiriadError::BadString(_))
        ));
    }

    #[test]
    fn test_rows_must_be_contiguous() {
        let mut row = Array1::<f32>::zeros(32);
        let mut strided = row.slice_mut(s![..;2]);
        let result = unsafe { xyread(1, 1, &mut strided) };
        assert!(matches!(
            result,
            Err(MiriadError::NotContiguous {
                argument: "data",
                function: "xyread"
            })
        ));

        let flags = Array1::<i32>::ones(32);
        let result = unsafe { xyflgwr(1, 1, &flags.slice(s![..;2])) };
        assert!(matches!(
            result,
            Err(MiriadError::NotContiguous {
                argument: "flags",
                function: "xyflgwr"
            })
        ));
    }
}
