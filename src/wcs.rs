// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Celestial coordinate parameters from wcslib (`cel.h`, `prj.h`).
//!
//! Only the setup half of wcslib's celestial transformation is exposed: a
//! [`Celprm`] is filled in field by field and then validated and completed by
//! [`Celprm::celset`]. The structs are `#[repr(C)]` mirrors of wcslib 7's, so
//! a `&mut Celprm` can be handed straight to the library.

use std::os::raw::{c_char, c_double, c_int, c_void};

use thiserror::Error;

use crate::constants::PVN;

/// wcslib's marker for a parameter that has not been given a value.
pub const UNDEFINED: f64 = 987654321.0e99;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CelError {
    #[error("Null celprm pointer passed")]
    NullPointer,

    #[error("Invalid projection parameters")]
    BadParam,

    #[error("Invalid coordinate transformation parameters")]
    BadCoordTrans,

    #[error("Ill-conditioned coordinate transformation parameters")]
    IllConditioned,

    #[error("One or more of the (x,y) coordinates were invalid")]
    BadPix,

    #[error("One or more of the (lng,lat) coordinates were invalid")]
    BadWorld,

    #[error("wcslib returned unrecognised status {0}")]
    Unknown(i32),

    #[error("projection parameter index {0} is out of range (must be < {PVN})")]
    PvIndex(usize),

    #[error("wcslib is not linked into this build")]
    NotLinked,
}

impl CelError {
    /// Interpret a wcslib `cel*` status code.
    pub fn from_status(status: c_int) -> Result<(), CelError> {
        match status {
            0 => Ok(()),
            1 => Err(CelError::NullPointer),
            2 => Err(CelError::BadParam),
            3 => Err(CelError::BadCoordTrans),
            4 => Err(CelError::IllConditioned),
            5 => Err(CelError::BadPix),
            6 => Err(CelError::BadWorld),
            other => Err(CelError::Unknown(other)),
        }
    }
}

/// Signature of a projection's pixel-to-sky function.
pub type PrjX2S = unsafe extern "C" fn(
    prj: *mut Prjprm,
    nx: c_int,
    ny: c_int,
    sxy: c_int,
    spt: c_int,
    x: *const c_double,
    y: *const c_double,
    phi: *mut c_double,
    theta: *mut c_double,
    stat: *mut c_int,
) -> c_int;

/// Signature of a projection's sky-to-pixel function.
pub type PrjS2X = unsafe extern "C" fn(
    prj: *mut Prjprm,
    nphi: c_int,
    ntheta: c_int,
    spt: c_int,
    sxy: c_int,
    phi: *const c_double,
    theta: *const c_double,
    x: *mut c_double,
    y: *mut c_double,
    stat: *mut c_int,
) -> c_int;

/// wcslib's `struct prjprm`.
#[repr(C)]
#[derive(Debug)]
pub struct Prjprm {
    pub flag: c_int,
    pub code: [c_char; 4],
    pub r0: c_double,
    pub pv: [c_double; PVN],
    pub phi0: c_double,
    pub theta0: c_double,
    pub bounds: c_int,

    pub name: [c_char; 40],
    pub category: c_int,
    pub pvrange: c_int,
    pub simplezen: c_int,
    pub equiareal: c_int,
    pub conformal: c_int,
    pub global: c_int,
    pub divergent: c_int,
    pub x0: c_double,
    pub y0: c_double,

    pub err: *mut c_void,
    pub padding: *mut c_void,
    pub w: [c_double; 10],
    pub m: c_int,
    pub n: c_int,
    pub prjx2s: Option<PrjX2S>,
    pub prjs2x: Option<PrjS2X>,
}

impl Default for Prjprm {
    fn default() -> Self {
        let mut code = [0; 4];
        code[..3].copy_from_slice(&[b' ' as c_char; 3]);
        let mut name = [0; 40];
        for (dst, src) in name.iter_mut().zip(b"undefined") {
            *dst = *src as c_char;
        }
        Prjprm {
            flag: 0,
            code,
            r0: 0.0,
            pv: [0.0; PVN],
            phi0: UNDEFINED,
            theta0: UNDEFINED,
            bounds: 7,
            name,
            category: 0,
            pvrange: 0,
            simplezen: 0,
            equiareal: 0,
            conformal: 0,
            global: 0,
            divergent: 0,
            x0: 0.0,
            y0: 0.0,
            err: std::ptr::null_mut(),
            padding: std::ptr::null_mut(),
            w: [0.0; 10],
            m: 0,
            n: 0,
            prjx2s: None,
            prjs2x: None,
        }
    }
}

/// wcslib's `struct celprm`.
#[repr(C)]
#[derive(Debug)]
pub struct Celprm {
    pub flag: c_int,
    pub offset: c_int,
    pub phi0: c_double,
    pub theta0: c_double,
    pub r#ref: [c_double; 4],
    pub prj: Prjprm,

    pub euler: [c_double; 5],
    pub latpreq: c_int,
    pub isolat: c_int,

    pub err: *mut c_void,
    pub padding: *mut c_void,
}

/// The state `celini` leaves behind, except that projection parameters
/// wcslib would mark undefined are zero.
impl Default for Celprm {
    fn default() -> Self {
        Celprm {
            flag: 0,
            offset: 0,
            phi0: UNDEFINED,
            theta0: UNDEFINED,
            r#ref: [0.0, 0.0, UNDEFINED, 90.0],
            prj: Prjprm::default(),
            euler: [0.0; 5],
            latpreq: -1,
            isolat: 0,
            err: std::ptr::null_mut(),
            padding: std::ptr::null_mut(),
        }
    }
}

impl Celprm {
    /// Initialise a set of parameters with wcslib's `celini`.
    pub fn new() -> Result<Celprm, CelError> {
        let mut cel = Celprm::default();
        native::celini(&mut cel)?;
        Ok(cel)
    }

    /// Whether (x,y) = (0,0) corresponds to (phi0,theta0) rather than to the
    /// projection's natural reference point.
    pub fn set_offset(&mut self, offset: bool) {
        self.offset = c_int::from(offset);
        self.flag = 0;
    }

    /// The native longitude and latitude of the fiducial point, in degrees.
    pub fn set_phi_theta(&mut self, phi0: f64, theta0: f64) {
        self.phi0 = phi0;
        self.theta0 = theta0;
        self.flag = 0;
    }

    /// The celestial longitude and latitude of the fiducial point, in
    /// degrees.
    pub fn set_ref(&mut self, lng0: f64, lat0: f64) {
        self.r#ref[0] = lng0;
        self.r#ref[1] = lat0;
        self.flag = 0;
    }

    /// The three-letter projection code, e.g. "SIN". Longer codes are
    /// truncated.
    pub fn set_prj_code(&mut self, code: &str) {
        self.prj.code = [0; 4];
        for (dst, src) in self.prj.code.iter_mut().zip(code.bytes().take(3)) {
            *dst = src as c_char;
        }
        self.flag = 0;
    }

    /// The projection code as a string.
    pub fn prj_code(&self) -> String {
        crate::io::string_from_buf(&self.prj.code)
    }

    /// Set projection parameter `PVi_m`, `m == index`.
    pub fn set_prj_pv(&mut self, index: usize, value: f64) -> Result<(), CelError> {
        let slot = self.prj.pv.get_mut(index).ok_or(CelError::PvIndex(index))?;
        *slot = value;
        self.flag = 0;
        Ok(())
    }

    /// Validate the parameters and derive the rest with wcslib's `celset`.
    pub fn celset(&mut self) -> Result<(), CelError> {
        native::celset(self)
    }
}

#[cfg(feature = "link")]
mod native {
    use super::{CelError, Celprm};
    use crate::sys;

    pub(super) fn celini(cel: &mut Celprm) -> Result<(), CelError> {
        CelError::from_status(unsafe { sys::celini(cel) })
    }

    pub(super) fn celset(cel: &mut Celprm) -> Result<(), CelError> {
        CelError::from_status(unsafe { sys::celset(cel) })
    }
}

#[cfg(not(feature = "link"))]
mod native {
    use super::{CelError, Celprm};

    pub(super) fn celini(_cel: &mut Celprm) -> Result<(), CelError> {
        Err(CelError::NotLinked)
    }

    pub(super) fn celset(_cel: &mut Celprm) -> Result<(), CelError> {
        Err(CelError::NotLinked)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_default_matches_celini() {
        let cel = Celprm::default();
        assert_eq!(cel.flag, 0);
        assert_eq!(cel.offset, 0);
        assert_eq!(cel.latpreq, -1);
        assert_eq!(cel.r#ref[3], 90.0);
        assert_eq!(cel.prj.bounds, 7);
        assert_eq!(cel.prj_code(), "   ");
        assert!(cel.prj.pv.iter().all(|&pv| pv == 0.0));
        assert!(cel.prj.prjx2s.is_none());
    }

    #[test]
    fn test_setters() {
        let mut cel = Celprm::default();
        cel.flag = 137;
        cel.set_offset(true);
        assert_eq!(cel.offset, 1);
        assert_eq!(cel.flag, 0);

        cel.set_phi_theta(0.0, 90.0);
        cel.set_ref(83.63, 22.01);
        assert_abs_diff_eq!(cel.theta0, 90.0);
        assert_abs_diff_eq!(cel.r#ref[0], 83.63);
        assert_abs_diff_eq!(cel.r#ref[1], 22.01);
        assert_eq!(cel.r#ref[3], 90.0);
    }

    #[test]
    fn test_prj_code() {
        let mut cel = Celprm::default();
        cel.set_prj_code("SIN");
        assert_eq!(cel.prj_code(), "SIN");
        assert_eq!(cel.prj.code[3], 0);

        cel.set_prj_code("ZEAXX");
        assert_eq!(cel.prj_code(), "ZEA");

        cel.set_prj_code("AR");
        assert_eq!(cel.prj_code(), "AR");
        assert_eq!(cel.prj.code[2], 0);
    }

    #[test]
    fn test_prj_pv_bounds() {
        let mut cel = Celprm::default();
        cel.set_prj_pv(1, 0.5).unwrap();
        cel.set_prj_pv(PVN - 1, -1.0).unwrap();
        assert_abs_diff_eq!(cel.prj.pv[1], 0.5);
        assert_abs_diff_eq!(cel.prj.pv[PVN - 1], -1.0);
        assert_eq!(cel.set_prj_pv(PVN, 1.0), Err(CelError::PvIndex(PVN)));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(CelError::from_status(0), Ok(()));
        assert_eq!(
            CelError::from_status(2).unwrap_err().to_string(),
            "Invalid projection parameters"
        );
        assert_eq!(
            CelError::from_status(6).unwrap_err().to_string(),
            "One or more of the (lng,lat) coordinates were invalid"
        );
        assert_eq!(CelError::from_status(9), Err(CelError::Unknown(9)));
    }

    #[cfg(not(feature = "link"))]
    #[test]
    fn test_unlinked_wcslib() {
        assert_eq!(Celprm::new().unwrap_err(), CelError::NotLinked);
        let mut cel = Celprm::default();
        cel.set_prj_code("SIN");
        assert_eq!(cel.celset(), Err(CelError::NotLinked));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_struct_layout() {
        assert_eq!(std::mem::size_of::<Prjprm>(), 480);
        assert_eq!(std::mem::size_of::<Celprm>(), 600);
    }
}
