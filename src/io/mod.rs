// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Thin, checked wrappers over MIRIAD's I/O subsystems.
//!
//! Each function here corresponds to one MIRIAD C routine. Arguments are
//! validated (strings must not contain NULs, buffers must be contiguous and
//! long enough), the call is made while holding the native lock, a nonzero
//! `iostat` becomes [`MiriadError::Io`] and a fatal bug becomes
//! [`MiriadError::Bug`].
//!
//! Routines whose memory safety depends on the geometry of an open dataset
//! (e.g. the length of an image row) are `unsafe`; the owning types in
//! [`crate::dataset`] track that geometry and are the safe way in.

pub mod error;
pub mod headio;
pub mod hio;
pub mod maskio;
pub mod uvio;
pub mod xyio;
pub mod xyzio;

use std::{
    ffi::CString,
    fmt,
    os::raw::{c_char, c_int},
};

use libc::off_t;
use ndarray::{Array1, ArrayBase, Data, DataMut, Dimension};
use num_traits::Zero;

pub use error::{check_iostat, HeaderItemError, MiriadError};

use crate::{
    c32,
    constants::{H_BYTE, H_CMPLX, H_DBLE, H_INT, H_INT8, H_REAL},
};

/// Element types that MIRIAD's hio layer can move in and out of items.
pub trait ItemType: Copy + Zero + fmt::Debug {
    /// The hio type code (`H_INT`, `H_REAL`, ...).
    const TYPE_CODE: c_int;

    /// The size of one element on disk, in bytes.
    const EXTERNAL_SIZE: usize;

    /// Read `n` 16-bit integers starting at byte `offset`. MIRIAD expands
    /// them to `int`, so only `i32` supports this.
    fn read_int2(ihandle: c_int, offset: i64, n: usize) -> Result<Array1<Self>, MiriadError> {
        let _ = (ihandle, offset, n);
        Err(MiriadError::InvalidArgument {
            function: "read_int2",
            reason: format!(
                "16-bit integers expand to i32, not {}",
                std::any::type_name::<Self>()
            ),
        })
    }
}

impl ItemType for u8 {
    const TYPE_CODE: c_int = H_BYTE;
    const EXTERNAL_SIZE: usize = 1;
}

impl ItemType for i32 {
    const TYPE_CODE: c_int = H_INT;
    const EXTERNAL_SIZE: usize = 4;

    fn read_int2(ihandle: c_int, offset: i64, n: usize) -> Result<Array1<i32>, MiriadError> {
        let mut buf = Array1::zeros(n);
        hio::hio_read_int2(ihandle, &mut buf, offset, 2 * n)?;
        Ok(buf)
    }
}

impl ItemType for i64 {
    const TYPE_CODE: c_int = H_INT8;
    const EXTERNAL_SIZE: usize = 8;
}

impl ItemType for f32 {
    const TYPE_CODE: c_int = H_REAL;
    const EXTERNAL_SIZE: usize = 4;
}

impl ItemType for f64 {
    const TYPE_CODE: c_int = H_DBLE;
    const EXTERNAL_SIZE: usize = 8;
}

impl ItemType for c32 {
    const TYPE_CODE: c_int = H_CMPLX;
    const EXTERNAL_SIZE: usize = 8;
}

/// A single typed value, as stored in a header item or a UV variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Short(i16),
    Int(i32),
    Long(i64),
    Real(f32),
    Double(f64),
    Complex(c32),
}

impl Value {
    /// The value as an `f64`, if it is numeric and real.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Short(v) => Some(v.into()),
            Value::Int(v) => Some(v.into()),
            Value::Long(v) => Some(v as f64),
            Value::Real(v) => Some(v.into()),
            Value::Double(v) => Some(v),
            Value::Text(_) | Value::Complex(_) => None,
        }
    }

    /// The value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Complex(v) => write!(f, "({}, {})", v.re, v.im),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from!(
    String => Text,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Real,
    f64 => Double,
    c32 => Complex,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Borrow the elements of a standard-layout array.
pub(crate) fn as_slice<'a, S, D>(
    array: &'a ArrayBase<S, D>,
    argument: &'static str,
    function: &'static str,
) -> Result<&'a [S::Elem], MiriadError>
where
    S: Data,
    D: Dimension,
{
    array
        .as_slice()
        .ok_or(MiriadError::NotContiguous { argument, function })
}

/// Mutably borrow the elements of a standard-layout array.
pub(crate) fn as_slice_mut<'a, S, D>(
    array: &'a mut ArrayBase<S, D>,
    argument: &'static str,
    function: &'static str,
) -> Result<&'a mut [S::Elem], MiriadError>
where
    S: DataMut,
    D: Dimension,
{
    array
        .as_slice_mut()
        .ok_or(MiriadError::NotContiguous { argument, function })
}

/// Ensure a buffer holds at least `needed` elements.
pub(crate) fn check_min_len(
    argument: &'static str,
    function: &'static str,
    received: usize,
    needed: usize,
) -> Result<(), MiriadError> {
    if received < needed {
        return Err(MiriadError::BadArrayShape {
            argument,
            function,
            expected: format!("at least {needed} elements"),
            received: format!("{received} elements"),
        });
    }
    Ok(())
}

/// Convert an element count to a C `int`.
pub(crate) fn c_len(function: &'static str, n: usize) -> Result<c_int, MiriadError> {
    c_int::try_from(n).map_err(|_| MiriadError::InvalidArgument {
        function,
        reason: format!("{n} elements is too many"),
    })
}

/// Convert a byte offset to the platform's `off_t`.
pub(crate) fn to_off_t(function: &'static str, offset: i64) -> Result<off_t, MiriadError> {
    off_t::try_from(offset).map_err(|_| MiriadError::InvalidArgument {
        function,
        reason: format!("offset {offset} does not fit in off_t"),
    })
}

pub(crate) fn c_string(s: &str) -> Result<CString, MiriadError> {
    Ok(CString::new(s)?)
}

/// Read a NUL-terminated string out of a buffer filled in by MIRIAD. Without
/// a terminator the whole buffer is used.
pub(crate) fn string_from_buf(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// A single character written by MIRIAD, e.g. a type code.
pub(crate) fn char_from_c(c: c_char) -> char {
    c as u8 as char
}

#[cfg(test)]
mod tests {
    use ndarray::{array, s, Array2};

    use super::*;

    #[test]
    fn test_as_slice_contiguous() {
        let a = array![1.0_f32, 2.0, 3.0];
        assert_eq!(as_slice(&a, "data", "test").unwrap(), &[1.0, 2.0, 3.0]);

        let mut b = Array2::<i32>::zeros((2, 3));
        as_slice_mut(&mut b, "flags", "test").unwrap()[4] = 9;
        assert_eq!(b[[1, 1]], 9);
    }

    #[test]
    fn test_as_slice_rejects_strided() {
        let a = array![1, 2, 3, 4, 5, 6];
        let strided = a.slice(s![..;2]);
        let err = as_slice(&strided, "data", "uvwrite").unwrap_err();
        assert!(matches!(
            err,
            MiriadError::NotContiguous {
                argument: "data",
                function: "uvwrite"
            }
        ));

        let t = Array2::<f64>::zeros((3, 2));
        let transposed = t.t();
        assert!(as_slice(&transposed, "data", "test").is_err());
    }

    #[test]
    fn test_check_min_len() {
        assert!(check_min_len("flags", "uvread", 10, 10).is_ok());
        let err = check_min_len("flags", "uvread", 9, 10).unwrap_err();
        assert!(err.to_string().contains("at least 10 elements"));
    }

    #[test]
    fn test_string_from_buf() {
        let buf: Vec<c_char> = b"rw\0junk".iter().map(|&b| b as c_char).collect();
        assert_eq!(string_from_buf(&buf), "rw");

        let unterminated: Vec<c_char> = b"abc".iter().map(|&b| b as c_char).collect();
        assert_eq!(string_from_buf(&unterminated), "abc");
    }

    #[test]
    fn test_c_string_rejects_nul() {
        assert!(matches!(
            c_string("bad\0name"),
            Err(MiriadError::BadString(_))
        ));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(3_i32), Value::Int(3));
        assert_eq!(Value::from("vis"), Value::Text("vis".to_string()));
        assert_eq!(Value::Short(-2).as_f64(), Some(-2.0));
        assert_eq!(Value::Complex(c32::new(1.0, 2.0)).as_f64(), None);
        assert_eq!(Value::Complex(c32::new(1.0, 2.0)).to_string(), "(1, 2)");
        assert_eq!(Value::Text("abc".into()).as_str(), Some("abc"));
    }

    #[test]
    fn test_item_type_sizes() {
        assert_eq!(<c32 as ItemType>::EXTERNAL_SIZE, 8);
        assert_eq!(<f64 as ItemType>::TYPE_CODE, H_DBLE);
        assert_eq!(<u8 as ItemType>::TYPE_CODE, H_BYTE);
    }
}
