// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Raw declarations of the MIRIAD (`miriad.h`) and wcslib (`cel.h`) entry
//! points used by this crate.
//!
//! Everything is declared `"C-unwind"`: any MIRIAD routine can call the bug
//! handler, and the handler installed by [`crate::bug`] unwinds through the C
//! frames back to the calling wrapper. Nothing here should be used directly;
//! go through the wrappers in [`crate::io`], [`crate::key`] and [`crate::wcs`]
//! so that calls are serialised and bugs are caught.

#![allow(missing_docs)]

use std::os::raw::{c_char, c_double, c_float, c_int};

use libc::{off_t, size_t};

#[cfg(feature = "link")]
use crate::wcs::Celprm;

/// The type of MIRIAD's bug-recovery callback.
pub type BugHandler = unsafe extern "C-unwind" fn();

#[allow(non_camel_case_types)]
pub type int8 = i64;

/// Declare MIRIAD entry points. With the `link` feature they are resolved
/// from libmir; without it each one unwinds to [`crate::bug`], which reports
/// [`crate::io::MiriadError::NotImplemented`] naming the routine.
macro_rules! miriad_fns {
    ($(
        $(#[$attr:meta])*
        pub fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;
    )*) => {
        #[cfg(feature = "link")]
        extern "C-unwind" {
            $(
                $(#[$attr])*
                pub fn $name($($arg: $ty),*) $(-> $ret)?;
            )*
        }

        $(
            #[cfg(not(feature = "link"))]
            $(#[$attr])*
            #[allow(unused_variables)]
            pub unsafe extern "C-unwind" fn $name($($arg: $ty),*) $(-> $ret)? {
                crate::bug::unlinked(stringify!($name))
            }
        )*
    };
}

#[cfg(feature = "link")]
extern "C-unwind" {
    // bug.c
    pub fn bugrecover_c(cl: Option<BugHandler>);
    pub fn bugseverity_c() -> c_char;
    pub fn bugmessage_c() -> *const c_char;
}

/// Nothing can raise a bug without libmir.
#[cfg(not(feature = "link"))]
pub unsafe extern "C-unwind" fn bugrecover_c(_cl: Option<BugHandler>) {}

#[cfg(not(feature = "link"))]
pub unsafe extern "C-unwind" fn bugseverity_c() -> c_char {
    b'f' as c_char
}

#[cfg(not(feature = "link"))]
pub unsafe extern "C-unwind" fn bugmessage_c() -> *const c_char {
    std::ptr::null()
}

miriad_fns! {
    // hio.c
    pub fn hopen_c(tno: *mut c_int, name: *const c_char, status: *const c_char, iostat: *mut c_int);
    pub fn hflush_c(tno: c_int, iostat: *mut c_int);
    pub fn habort_c();
    pub fn hrm_c(tno: c_int);
    pub fn hclose_c(tno: c_int);
    pub fn hdelete_c(tno: c_int, keyword: *const c_char, iostat: *mut c_int);
    pub fn haccess_c(
        tno: c_int,
        ihandle: *mut c_int,
        keyword: *const c_char,
        status: *const c_char,
        iostat: *mut c_int,
    );
    pub fn hmode_c(tno: c_int, mode: *mut c_char);
    pub fn hexists_c(tno: c_int, keyword: *const c_char) -> c_int;
    pub fn hdaccess_c(ihandle: c_int, iostat: *mut c_int);
    pub fn hsize_c(ihandle: c_int) -> off_t;
    pub fn hio_c(
        ihandle: c_int,
        dowrite: c_int,
        type_: c_int,
        buf: *mut c_char,
        offset: off_t,
        length: size_t,
        iostat: *mut c_int,
    );
    pub fn hseek_c(ihandle: c_int, offset: off_t);
    pub fn htell_c(ihandle: c_int) -> off_t;
    pub fn hreada_c(ihandle: c_int, line: *mut c_char, length: size_t, iostat: *mut c_int);
    pub fn hwritea_c(ihandle: c_int, line: *const c_char, length: size_t, iostat: *mut c_int);

    // headio.c
    pub fn hisopen_c(tno: c_int, status: *const c_char);
    pub fn hiswrite_c(tno: c_int, text: *const c_char);
    pub fn hisclose_c(tno: c_int);
    pub fn wrhdr_c(thandle: c_int, keyword: *const c_char, value: c_double);
    pub fn wrhdd_c(thandle: c_int, keyword: *const c_char, value: c_double);
    pub fn wrhdi_c(thandle: c_int, keyword: *const c_char, value: c_int);
    pub fn wrhdl_c(thandle: c_int, keyword: *const c_char, value: int8);
    pub fn wrhdc_c(thandle: c_int, keyword: *const c_char, value: *const c_float);
    pub fn wrhda_c(thandle: c_int, keyword: *const c_char, value: *const c_char);
    pub fn rdhdr_c(thandle: c_int, keyword: *const c_char, value: *mut c_float, defval: c_double);
    pub fn rdhdi_c(thandle: c_int, keyword: *const c_char, value: *mut c_int, defval: c_int);
    pub fn rdhdl_c(thandle: c_int, keyword: *const c_char, value: *mut int8, defval: int8);
    pub fn rdhdd_c(thandle: c_int, keyword: *const c_char, value: *mut c_double, defval: c_double);
    pub fn rdhdc_c(
        thandle: c_int,
        keyword: *const c_char,
        value: *mut c_float,
        defval: *const c_float,
    );
    pub fn rdhda_c(
        thandle: c_int,
        keyword: *const c_char,
        value: *mut c_char,
        defval: *const c_char,
        len: c_int,
    );
    pub fn hdcopy_c(tin: c_int, tout: c_int, keyword: *const c_char);
    pub fn hdprsnt_c(tno: c_int, keyword: *const c_char) -> c_int;
    pub fn hdprobe_c(
        tno: c_int,
        keyword: *const c_char,
        descr: *mut c_char,
        length: size_t,
        type_: *mut c_char,
        n: *mut c_int,
    );

    // uvio.c
    pub fn uvopen_c(tno: *mut c_int, name: *const c_char, status: *const c_char);
    pub fn uvclose_c(tno: c_int);
    pub fn uvflush_c(tno: c_int);
    pub fn uvnext_c(tno: c_int);
    pub fn uvrewind_c(tno: c_int);
    pub fn uvcopyvr_c(tin: c_int, tout: c_int);
    pub fn uvupdate_c(tno: c_int) -> c_int;
    pub fn uvvarini_c(tno: c_int, vhan: *mut c_int);
    pub fn uvvarset_c(vhan: c_int, var: *const c_char);
    pub fn uvvarcpy_c(vhan: c_int, tout: c_int);
    pub fn uvvarupd_c(vhan: c_int) -> c_int;
    pub fn uvrdvr_c(
        tno: c_int,
        type_: c_int,
        var: *const c_char,
        data: *mut c_char,
        def: *mut c_char,
        n: c_int,
    );
    pub fn uvgetvr_c(tno: c_int, type_: c_int, var: *const c_char, data: *mut c_char, n: c_int);
    pub fn uvprobvr_c(
        tno: c_int,
        var: *const c_char,
        type_: *mut c_char,
        length: *mut c_int,
        updated: *mut c_int,
    );
    pub fn uvputvr_c(tno: c_int, type_: c_int, var: *const c_char, data: *const c_char, n: c_int);
    pub fn uvtrack_c(tno: c_int, name: *const c_char, switches: *const c_char);
    pub fn uvscan_c(tno: c_int, var: *const c_char) -> c_int;
    pub fn uvwrite_c(
        tno: c_int,
        preamble: *const c_double,
        data: *const c_float,
        flags: *const c_int,
        n: c_int,
    );
    pub fn uvselect_c(tno: c_int, object: *const c_char, p1: c_double, p2: c_double, datasel: c_int);
    pub fn uvset_c(
        tno: c_int,
        object: *const c_char,
        type_: *const c_char,
        n: c_int,
        p1: c_double,
        p2: c_double,
        p3: c_double,
    );
    pub fn uvread_c(
        tno: c_int,
        preamble: *mut c_double,
        data: *mut c_float,
        flags: *mut c_int,
        n: c_int,
        nread: *mut c_int,
    );
    pub fn uvflgwr_c(tno: c_int, flags: *const c_int);
    pub fn uvinfo_c(tno: c_int, object: *const c_char, data: *mut c_double);
    #[cfg(feature = "uvchkshadow")]
    pub fn uvchkshadow_c(tno: c_int, diameter_meters: c_double) -> c_int;

    // xyio.c
    pub fn xyopen_c(
        tno: *mut c_int,
        name: *const c_char,
        status: *const c_char,
        naxis: c_int,
        axes: *mut c_int,
    );
    pub fn xyflush_c(tno: c_int);
    pub fn xyclose_c(tno: c_int);
    pub fn xyread_c(tno: c_int, index: c_int, array: *mut c_float);
    pub fn xywrite_c(tno: c_int, index: c_int, array: *const c_float);
    pub fn xyflgwr_c(tno: c_int, index: c_int, flags: *const c_int);
    pub fn xyflgrd_c(tno: c_int, index: c_int, flags: *mut c_int);
    pub fn xysetpl_c(tno: c_int, naxis: c_int, axes: *const c_int);

    // maskio.c
    pub fn mkopen_c(tno: c_int, name: *const c_char, status: *const c_char) -> *mut c_char;
    pub fn mkclose_c(handle: *mut c_char);
    pub fn mkread_c(
        handle: *mut c_char,
        mode: c_int,
        flags: *mut c_int,
        offset: off_t,
        n: c_int,
        nsize: c_int,
    ) -> c_int;
    pub fn mkwrite_c(
        handle: *mut c_char,
        mode: c_int,
        flags: *const c_int,
        offset: off_t,
        n: c_int,
        nsize: c_int,
    );
    pub fn mkflush_c(handle: *mut c_char);

    // xyzio.c
    pub fn xyzopen_c(
        tno: *mut c_int,
        name: *const c_char,
        status: *const c_char,
        naxis: *mut c_int,
        axlen: *mut c_int,
    );
    pub fn xyzclose_c(tno: c_int);
    pub fn xyzflush_c(tno: c_int);
    pub fn xyzsetup_c(
        tno: c_int,
        subcube: *const c_char,
        blc: *const c_int,
        trc: *const c_int,
        viraxlen: *mut c_int,
        vircubesize: *mut c_int,
    );
    pub fn xyzs2c_c(tno: c_int, subcubenr: c_int, coords: *mut c_int);
    pub fn xyzc2s_c(tno: c_int, coords: *const c_int, subcubenr: *mut c_int);
    pub fn xyzread_c(
        tno: c_int,
        coords: *const c_int,
        data: *mut c_float,
        mask: *mut c_int,
        ndata: *mut c_int,
    );
    pub fn xyzpixrd_c(tno: c_int, pixnum: c_int, data: *mut c_float, mask: *mut c_int);
    pub fn xyzprfrd_c(
        tno: c_int,
        profnum: c_int,
        data: *mut c_float,
        mask: *mut c_int,
        ndata: *mut c_int,
    );
    pub fn xyzwrite_c(
        tno: c_int,
        coords: *const c_int,
        data: *const c_float,
        mask: *const c_int,
        ndata: *const c_int,
    );
    pub fn xyzprfwr_c(
        tno: c_int,
        profnum: c_int,
        data: *const c_float,
        mask: *const c_int,
        ndata: *const c_int,
    );

    // key.c
    pub fn keyinit_c(task: *const c_char);
    pub fn keyput_c(task: *const c_char, string: *mut c_char);
    pub fn keyini_c(argc: c_int, argv: *mut *mut c_char);
    pub fn keyfin_c();
    pub fn keyprsnt_c(keyword: *const c_char) -> c_int;
    pub fn keya_c(keyword: *const c_char, value: *mut c_char, keydef: *const c_char);
    pub fn keyf_c(keyword: *const c_char, value: *mut c_char, keydef: *const c_char);
    pub fn keyd_c(keyword: *const c_char, value: *mut c_double, keydef: c_double);
    pub fn keyr_c(keyword: *const c_char, value: *mut c_float, keydef: c_float);
    pub fn keyi_c(keyword: *const c_char, value: *mut c_int, keydef: c_int);
    pub fn keyl_c(keyword: *const c_char, value: *mut c_int, keydef: c_int);
    pub fn mkeyd_c(keyword: *const c_char, value: *mut c_double, nmax: c_int, n: *mut c_int);
    pub fn mkeyr_c(keyword: *const c_char, value: *mut c_float, nmax: c_int, n: *mut c_int);
    pub fn mkeyi_c(keyword: *const c_char, value: *mut c_int, nmax: c_int, n: *mut c_int);
    pub fn keyt_c(keyword: *const c_char, value: *mut c_double, fmt: *const c_char, keydef: c_double);
    pub fn mkeyt_c(
        keyword: *const c_char,
        value: *mut c_double,
        nmax: c_int,
        n: *mut c_int,
        fmt: *const c_char,
    );
}

#[cfg(feature = "link")]
extern "C" {
    // wcslib cel.h
    pub fn celini(cel: *mut Celprm) -> c_int;
    pub fn celset(cel: *mut Celprm) -> c_int;
}
