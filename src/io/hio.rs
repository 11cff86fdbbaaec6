// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Wrappers over MIRIAD's hierarchical item I/O (`hio.c`).
//!
//! A dataset handle (`tno`) names a directory of items; an item handle
//! (`ihandle`) names one open item. Offsets and lengths are in bytes of the
//! on-disk representation.

use std::os::raw::{c_char, c_int};

use libc::{off_t, size_t};
use log::trace;
use ndarray::{ArrayBase, Data, DataMut, Dimension};

use super::{
    as_slice, as_slice_mut, c_string, check_iostat, string_from_buf, to_off_t, ItemType,
    MiriadError,
};
use crate::{bug::guarded, constants::H_INT2, sys};

/// Open a dataset. `status` is "old", "new" or "append".
pub fn hopen(name: &str, status: &str) -> Result<c_int, MiriadError> {
    trace!("hopen {name} ({status})");
    let c_name = c_string(name)?;
    let c_status = c_string(status)?;
    let mut tno = 0;
    let mut iostat = 0;
    guarded(|| unsafe {
        sys::hopen_c(
            &mut tno,          /* O - dataset handle */
            c_name.as_ptr(),   /* I - dataset path   */
            c_status.as_ptr(), /* I - access status  */
            &mut iostat,       /* O - errno          */
        )
    })?;
    check_iostat(iostat)?;
    Ok(tno)
}

pub fn hflush(tno: c_int) -> Result<(), MiriadError> {
    let mut iostat = 0;
    guarded(|| unsafe { sys::hflush_c(tno, &mut iostat) })?;
    check_iostat(iostat)
}

/// Abandon every open dataset without flushing.
pub fn habort() -> Result<(), MiriadError> {
    guarded(|| unsafe { sys::habort_c() })
}

/// Delete a dataset and close its handle.
pub fn hrm(tno: c_int) -> Result<(), MiriadError> {
    trace!("hrm {tno}");
    guarded(|| unsafe { sys::hrm_c(tno) })
}

pub fn hclose(tno: c_int) -> Result<(), MiriadError> {
    trace!("hclose {tno}");
    guarded(|| unsafe { sys::hclose_c(tno) })
}

pub fn hdelete(tno: c_int, item: &str) -> Result<(), MiriadError> {
    let c_item = c_string(item)?;
    let mut iostat = 0;
    guarded(|| unsafe { sys::hdelete_c(tno, c_item.as_ptr(), &mut iostat) })?;
    check_iostat(iostat)
}

/// Open an item within a dataset. `status` is "read", "write", "append" or
/// "scratch".
pub fn haccess(tno: c_int, item: &str, status: &str) -> Result<c_int, MiriadError> {
    let c_item = c_string(item)?;
    let c_status = c_string(status)?;
    let mut ihandle = 0;
    let mut iostat = 0;
    guarded(|| unsafe {
        sys::haccess_c(
            tno,               /* I - dataset handle */
            &mut ihandle,      /* O - item handle    */
            c_item.as_ptr(),   /* I - item name      */
            c_status.as_ptr(), /* I - access status  */
            &mut iostat,       /* O - errno          */
        )
    })?;
    check_iostat(iostat)?;
    Ok(ihandle)
}

/// The access mode of a dataset: "", "r" or "rw".
pub fn hmode(tno: c_int) -> Result<String, MiriadError> {
    let mut mode: [c_char; 8] = [0; 8];
    guarded(|| unsafe { sys::hmode_c(tno, mode.as_mut_ptr()) })?;
    Ok(string_from_buf(&mode))
}

pub fn hexists(tno: c_int, item: &str) -> Result<bool, MiriadError> {
    let c_item = c_string(item)?;
    let ret = guarded(|| unsafe { sys::hexists_c(tno, c_item.as_ptr()) })?;
    Ok(ret != 0)
}

/// Close an item.
pub fn hdaccess(ihandle: c_int) -> Result<(), MiriadError> {
    let mut iostat = 0;
    guarded(|| unsafe { sys::hdaccess_c(ihandle, &mut iostat) })?;
    check_iostat(iostat)
}

/// The size of an item in bytes.
pub fn hsize(ihandle: c_int) -> Result<i64, MiriadError> {
    let size = guarded(|| unsafe { sys::hsize_c(ihandle) })?;
    Ok(size as i64)
}

fn check_nbytes(
    function: &'static str,
    nbytes: usize,
    external_size: usize,
    buf_len: usize,
) -> Result<(), MiriadError> {
    if nbytes % external_size != 0 || nbytes / external_size > buf_len {
        return Err(MiriadError::BadArrayShape {
            argument: "buf",
            function,
            expected: format!(
                "room for {nbytes} bytes in {external_size}-byte elements"
            ),
            received: format!("{buf_len} elements"),
        });
    }
    Ok(())
}

fn hio_raw(
    ihandle: c_int,
    dowrite: bool,
    type_code: c_int,
    buf: *mut c_char,
    offset: off_t,
    nbytes: usize,
) -> Result<(), MiriadError> {
    let mut iostat = 0;
    guarded(|| unsafe {
        sys::hio_c(
            ihandle,              /* I - item handle               */
            c_int::from(dowrite), /* I - nonzero to write          */
            type_code,            /* I - hio type code             */
            buf,                  /* IO - element buffer           */
            offset,               /* I - byte offset into the item */
            nbytes as size_t,     /* I - number of bytes           */
            &mut iostat,          /* O - errno                     */
        )
    })?;
    check_iostat(iostat)
}

/// Read `nbytes` bytes of an item, starting at byte `offset`, into `buf`.
pub fn hio_read<T, S, D>(
    ihandle: c_int,
    buf: &mut ArrayBase<S, D>,
    offset: i64,
    nbytes: usize,
) -> Result<(), MiriadError>
where
    T: ItemType,
    S: DataMut<Elem = T>,
    D: Dimension,
{
    let slice = as_slice_mut(buf, "buf", "hio_read")?;
    check_nbytes("hio_read", nbytes, T::EXTERNAL_SIZE, slice.len())?;
    let offset = to_off_t("hio_read", offset)?;
    hio_raw(
        ihandle,
        false,
        T::TYPE_CODE,
        slice.as_mut_ptr().cast(),
        offset,
        nbytes,
    )
}

/// Write `nbytes` bytes of `buf` into an item, starting at byte `offset`.
pub fn hio_write<T, S, D>(
    ihandle: c_int,
    buf: &ArrayBase<S, D>,
    offset: i64,
    nbytes: usize,
) -> Result<(), MiriadError>
where
    T: ItemType,
    S: Data<Elem = T>,
    D: Dimension,
{
    let slice = as_slice(buf, "buf", "hio_write")?;
    check_nbytes("hio_write", nbytes, T::EXTERNAL_SIZE, slice.len())?;
    let offset = to_off_t("hio_write", offset)?;
    // hio_c takes a mutable pointer even when writing, but doesn't modify it.
    hio_raw(
        ihandle,
        true,
        T::TYPE_CODE,
        slice.as_ptr() as *mut c_char,
        offset,
        nbytes,
    )
}

/// Read 16-bit integers. MIRIAD expands each one to an `int` in memory.
pub fn hio_read_int2<S, D>(
    ihandle: c_int,
    buf: &mut ArrayBase<S, D>,
    offset: i64,
    nbytes: usize,
) -> Result<(), MiriadError>
where
    S: DataMut<Elem = i32>,
    D: Dimension,
{
    let slice = as_slice_mut(buf, "buf", "hio_read_int2")?;
    check_nbytes("hio_read_int2", nbytes, 2, slice.len())?;
    let offset = to_off_t("hio_read_int2", offset)?;
    hio_raw(ihandle, false, H_INT2, slice.as_mut_ptr().cast(), offset, nbytes)
}

/// Write `int`s as 16-bit integers.
pub fn hio_write_int2<S, D>(
    ihandle: c_int,
    buf: &ArrayBase<S, D>,
    offset: i64,
    nbytes: usize,
) -> Result<(), MiriadError>
where
    S: Data<Elem = i32>,
    D: Dimension,
{
    let slice = as_slice(buf, "buf", "hio_write_int2")?;
    check_nbytes("hio_write_int2", nbytes, 2, slice.len())?;
    let offset = to_off_t("hio_write_int2", offset)?;
    hio_raw(ihandle, true, H_INT2, slice.as_ptr() as *mut c_char, offset, nbytes)
}

/// Read the next line of a text item. Returns `None` at the end of the item.
/// Lines longer than `maxlen` bytes are truncated.
pub fn hreada(ihandle: c_int, maxlen: usize) -> Result<Option<String>, MiriadError> {
    // One extra byte keeps the result NUL-terminated.
    let mut line: Vec<c_char> = vec![0; maxlen + 1];
    let mut iostat = 0;
    guarded(|| unsafe { sys::hreada_c(ihandle, line.as_mut_ptr(), maxlen as size_t, &mut iostat) })?;
    // hio signals end-of-item with -1.
    if iostat == -1 {
        return Ok(None);
    }
    check_iostat(iostat)?;
    Ok(Some(string_from_buf(&line)))
}

/// Append a line to a text item. MIRIAD adds the newline.
pub fn hwritea(ihandle: c_int, line: &str) -> Result<(), MiriadError> {
    let c_line = c_string(line)?;
    let length = line.len() as size_t;
    let mut iostat = 0;
    guarded(|| unsafe { sys::hwritea_c(ihandle, c_line.as_ptr(), length, &mut iostat) })?;
    check_iostat(iostat)
}

/// Move the sequential-access position of an item.
pub fn hseek(ihandle: c_int, offset: i64) -> Result<(), MiriadError> {
    let offset = to_off_t("hseek", offset)?;
    guarded(|| unsafe { sys::hseek_c(ihandle, offset) })
}

/// The sequential-access position of an item.
pub fn htell(ihandle: c_int) -> Result<i64, MiriadError> {
    let pos = guarded(|| unsafe { sys::htell_c(ihandle) })?;
    Ok(pos as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_nbytes() {
        // Four doubles fit in a four-element buffer...
        assert!(check_nbytes("hio_read", 32, 8, 4).is_ok());
        // ... but not a three-element one.
        assert!(check_nbytes("hio_read", 32, 8, 3).is_err());
        // Partial elements aren't allowed.
        assert!(check_nbytes("hio_read", 6, 4, 10).is_err());
        // int2 items expand into int buffers, two bytes per element.
        assert!(check_nbytes("hio_read_int2", 6, 2, 3).is_ok());
        assert!(check_nbytes("hio_read_int2", 8, 2, 3).is_err());
    }

    #[test]
    fn test_to_off_t() {
        assert_eq!(to_off_t("hseek", 4096).unwrap(), 4096);
    }
}
