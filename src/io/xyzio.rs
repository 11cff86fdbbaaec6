// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Wrappers over MIRIAD's sub-cube image I/O (`xyzio.c`).
//!
//! After [`xyzsetup`], an image is viewed as a sequence of sub-cubes, each
//! one a (possibly 1-D "profile") block of the axes named in the `subcube`
//! string. Sub-cube numbers and coordinates are 1-based.

use std::os::raw::c_int;

use log::trace;
use ndarray::{Array1, ArrayBase, Data, DataMut, Ix1};

use super::{as_slice, as_slice_mut, c_len, c_string, check_min_len, MiriadError};
use crate::{bug::guarded, sys};

/// Open an image for sub-cube access. Returns the handle and the number of
/// axes MIRIAD actually used; for "old" images `axlen` is filled in.
pub fn xyzopen<S: DataMut<Elem = i32>>(
    name: &str,
    status: &str,
    naxis: usize,
    axlen: &mut ArrayBase<S, Ix1>,
) -> Result<(c_int, usize), MiriadError> {
    trace!("xyzopen {name} ({status}, {naxis} axes)");
    check_min_len("axlen", "xyzopen", axlen.len(), naxis)?;
    let mut c_naxis = c_len("xyzopen", naxis)?;
    let c_name = c_string(name)?;
    let c_status = c_string(status)?;
    let axlen = as_slice_mut(axlen, "axlen", "xyzopen")?;
    let mut tno = 0;
    guarded(|| unsafe {
        sys::xyzopen_c(
            &mut tno,            /* O - dataset handle        */
            c_name.as_ptr(),     /* I - image path            */
            c_status.as_ptr(),   /* I - "old" or "new"        */
            &mut c_naxis,        /* IO - number of axes       */
            axlen.as_mut_ptr(),  /* IO - axis lengths         */
        )
    })?;
    Ok((tno, c_naxis.max(0) as usize))
}

pub fn xyzclose(tno: c_int) -> Result<(), MiriadError> {
    trace!("xyzclose {tno}");
    guarded(|| unsafe { sys::xyzclose_c(tno) })
}

pub fn xyzflush(tno: c_int) -> Result<(), MiriadError> {
    guarded(|| unsafe { sys::xyzflush_c(tno) })
}

/// Define the sub-cube geometry. `subcube` names the axes making up one
/// sub-cube (e.g. "z" for spectra, "xy" for planes); `blc` and `trc` bound
/// the region of interest.
///
/// Returns the virtual axis lengths and the cumulative virtual cube sizes,
/// sized like `blc`.
///
/// # Safety
///
/// `blc` and `trc` must hold at least one element per axis of the image
/// open on `tno`. MIRIAD reads that many from each and writes that many
/// into each output.
pub unsafe fn xyzsetup<S1, S2>(
    tno: c_int,
    subcube: &str,
    blc: &ArrayBase<S1, Ix1>,
    trc: &ArrayBase<S2, Ix1>,
) -> Result<(Array1<i32>, Array1<i32>), MiriadError>
where
    S1: Data<Elem = i32>,
    S2: Data<Elem = i32>,
{
    if blc.len() != trc.len() {
        return Err(MiriadError::BadArrayShape {
            argument: "trc",
            function: "xyzsetup",
            expected: format!("{} elements, like blc", blc.len()),
            received: format!("{} elements", trc.len()),
        });
    }
    let c_subcube = c_string(subcube)?;
    let blc = as_slice(blc, "blc", "xyzsetup")?;
    let trc = as_slice(trc, "trc", "xyzsetup")?;
    let mut viraxlen = vec![0; blc.len()];
    let mut vircubesize = vec![0; blc.len()];
    guarded(|| {
        sys::xyzsetup_c(
            tno,
            c_subcube.as_ptr(),
            blc.as_ptr(),
            trc.as_ptr(),
            viraxlen.as_mut_ptr(),
            vircubesize.as_mut_ptr(),
        )
    })?;
    Ok((Array1::from(viraxlen), Array1::from(vircubesize)))
}

/// Convert a sub-cube number into coordinates along the non-sub-cube axes.
///
/// # Safety
///
/// `coords` must hold one element per axis not in the sub-cube.
pub unsafe fn xyzs2c<S: DataMut<Elem = i32>>(
    tno: c_int,
    subcubenr: i32,
    coords: &mut ArrayBase<S, Ix1>,
) -> Result<(), MiriadError> {
    let coords = as_slice_mut(coords, "coords", "xyzs2c")?;
    guarded(|| sys::xyzs2c_c(tno, subcubenr, coords.as_mut_ptr()))
}

/// Convert coordinates along the non-sub-cube axes into a sub-cube number.
///
/// # Safety
///
/// `coords` must hold one element per axis not in the sub-cube.
pub unsafe fn xyzc2s<S: Data<Elem = i32>>(
    tno: c_int,
    coords: &ArrayBase<S, Ix1>,
) -> Result<i32, MiriadError> {
    let coords = as_slice(coords, "coords", "xyzc2s")?;
    let mut subcubenr = 0;
    guarded(|| sys::xyzc2s_c(tno, coords.as_ptr(), &mut subcubenr))?;
    Ok(subcubenr)
}

/// Read the sub-cube at `coords`. Returns the number of pixels read.
///
/// # Safety
///
/// `coords` must hold one element per axis not in the sub-cube, and `data`
/// and `mask` must each hold a whole sub-cube.
pub unsafe fn xyzread<S1, S2, S3>(
    tno: c_int,
    coords: &ArrayBase<S1, Ix1>,
    data: &mut ArrayBase<S2, Ix1>,
    mask: &mut ArrayBase<S3, Ix1>,
) -> Result<usize, MiriadError>
where
    S1: Data<Elem = i32>,
    S2: DataMut<Elem = f32>,
    S3: DataMut<Elem = i32>,
{
    check_min_len("mask", "xyzread", mask.len(), data.len())?;
    let coords = as_slice(coords, "coords", "xyzread")?;
    let data = as_slice_mut(data, "data", "xyzread")?;
    let mask = as_slice_mut(mask, "mask", "xyzread")?;
    let mut ndata = 0;
    guarded(|| {
        sys::xyzread_c(
            tno,
            coords.as_ptr(),
            data.as_mut_ptr(),
            mask.as_mut_ptr(),
            &mut ndata,
        )
    })?;
    Ok(ndata.max(0) as usize)
}

/// Read a single pixel of the virtual cube. Returns the value and whether
/// it is unflagged.
///
/// # Safety
///
/// [`xyzsetup`] must have been called on `tno`.
pub unsafe fn xyzpixrd(tno: c_int, pixnum: i32) -> Result<(f32, bool), MiriadError> {
    let mut data = 0.0;
    let mut mask = 0;
    guarded(|| sys::xyzpixrd_c(tno, pixnum, &mut data, &mut mask))?;
    Ok((data, mask != 0))
}

/// Read profile number `profnum`. Returns the number of pixels read.
///
/// # Safety
///
/// `data` and `mask` must each hold a whole profile.
pub unsafe fn xyzprfrd<S1, S2>(
    tno: c_int,
    profnum: i32,
    data: &mut ArrayBase<S1, Ix1>,
    mask: &mut ArrayBase<S2, Ix1>,
) -> Result<usize, MiriadError>
where
    S1: DataMut<Elem = f32>,
    S2: DataMut<Elem = i32>,
{
    check_min_len("mask", "xyzprfrd", mask.len(), data.len())?;
    let data = as_slice_mut(data, "data", "xyzprfrd")?;
    let mask = as_slice_mut(mask, "mask", "xyzprfrd")?;
    let mut ndata = 0;
    guarded(|| sys::xyzprfrd_c(tno, profnum, data.as_mut_ptr(), mask.as_mut_ptr(), &mut ndata))?;
    Ok(ndata.max(0) as usize)
}

/// Write `ndata` pixels of the sub-cube at `coords`.
///
/// # Safety
///
/// `coords` must hold one element per axis not in the sub-cube, and `ndata`
/// must not exceed the sub-cube size.
pub unsafe fn xyzwrite<S1, S2, S3>(
    tno: c_int,
    coords: &ArrayBase<S1, Ix1>,
    data: &ArrayBase<S2, Ix1>,
    mask: &ArrayBase<S3, Ix1>,
    ndata: usize,
) -> Result<(), MiriadError>
where
    S1: Data<Elem = i32>,
    S2: Data<Elem = f32>,
    S3: Data<Elem = i32>,
{
    check_min_len("data", "xyzwrite", data.len(), ndata)?;
    check_min_len("mask", "xyzwrite", mask.len(), ndata)?;
    let c_ndata = c_len("xyzwrite", ndata)?;
    let coords = as_slice(coords, "coords", "xyzwrite")?;
    let data = as_slice(data, "data", "xyzwrite")?;
    let mask = as_slice(mask, "mask", "xyzwrite")?;
    guarded(|| sys::xyzwrite_c(tno, coords.as_ptr(), data.as_ptr(), mask.as_ptr(), &c_ndata))
}

/// Write `ndata` pixels of profile number `profnum`.
///
/// # Safety
///
/// `ndata` must not exceed the profile length.
pub unsafe fn xyzprfwr<S1, S2>(
    tno: c_int,
    profnum: i32,
    data: &ArrayBase<S1, Ix1>,
    mask: &ArrayBase<S2, Ix1>,
    ndata: usize,
) -> Result<(), MiriadError>
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = i32>,
{
    check_min_len("data", "xyzprfwr", data.len(), ndata)?;
    check_min_len("mask", "xyzprfwr", mask.len(), ndata)?;
    let c_ndata = c_len("xyzprfwr", ndata)?;
    let data = as_slice(data, "data", "xyzprfwr")?;
    let mask = as_slice(mask, "mask", "xyzprfwr")?;
    guarded(|| sys::xyzprfwr_c(tno, profnum, data.as_ptr(), mask.as_ptr(), &c_ndata))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn shape_error(result: Result<impl std::fmt::Debug, MiriadError>) -> (&'static str, &'static str) {
        match result {
            Err(MiriadError::BadArrayShape {
                argument, function, ..
            }) => (argument, function),
            other => panic!("expected a shape error, got {other:?}"),
        }
    }

    #[test]
    fn test_open_needs_axis_lengths() {
        let mut axlen = Array1::<i32>::zeros(2);
        assert_eq!(
            shape_error(xyzopen("cube", "old", 3, &mut axlen)),
            ("axlen", "xyzopen")
        );
    }

    #[test]
    fn test_setup_corners_must_match() {
        for (blc, trc) in [
            (array![1, 1, 1], array![64, 64]),
            (array![1], array![64, 64, 16]),
        ] {
            let result = unsafe { xyzsetup(1, "z", &blc, &trc) };
            assert_eq!(shape_error(result), ("trc", "xyzsetup"));
        }
    }

    #[test]
    fn test_reads_need_a_mask_per_pixel() {
        let coords = array![1, 1];
        let mut data = Array1::<f32>::zeros(16);
        let mut mask = Array1::<i32>::zeros(15);
        let result = unsafe { xyzread(1, &coords, &mut data, &mut mask) };
        assert_eq!(shape_error(result), ("mask", "xyzread"));
        let result = unsafe { xyzprfrd(1, 1, &mut data, &mut mask) };
        assert_eq!(shape_error(result), ("mask", "xyzprfrd"));
    }

    #[test]
    fn test_writes_bounded_by_buffers() {
        let coords = array![1, 1];
        let full = Array1::<f32>::zeros(16);
        let short = Array1::<f32>::zeros(8);
        let mask = Array1::<i32>::ones(16);
        let short_mask = Array1::<i32>::ones(8);

        // (data, mask, ndata, offending argument)
        let cases = [
            (&short, &mask, 16, "data"),
            (&full, &short_mask, 16, "mask"),
            (&full, &mask, 17, "data"),
        ];
        for (data, mask, ndata, argument) in cases {
            let result = unsafe { xyzwrite(1, &coords, data, mask, ndata) };
            assert_eq!(shape_error(result), (argument, "xyzwrite"));
            let result = unsafe { xyzprfwr(1, 1, data, mask, ndata) };
            assert_eq!(shape_error(result), (argument, "xyzprfwr"));
        }
    }

    #[test]
    fn test_non_contiguous_buffers() {
        let coords = array![1, 1];
        let data = Array1::<f32>::zeros(32);
        let mask = Array1::<i32>::ones(32);
        let strided = data.slice(ndarray::s![..;2]);
        let mask_strided = mask.slice(ndarray::s![..;2]);
        let result = unsafe { xyzwrite(1, &coords, &strided, &mask_strided, 16) };
        assert!(matches!(
            result,
            Err(MiriadError::NotContiguous {
                argument: "data",
                function: "xyzwrite"
            })
        ));
    }
}
