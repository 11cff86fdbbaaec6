// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Wrappers over MIRIAD's header and history routines (`headio.c`).

use std::{
    fmt,
    os::raw::{c_char, c_int},
    str::FromStr,
};

use libc::size_t;
use log::trace;
use ndarray::Array1;

use super::{
    c_string, hio, string_from_buf, HeaderItemError, ItemType, MiriadError, Value,
};
use crate::{bug::guarded, c32, constants::BUFSZ, sys};

/// The kinds of item that `hdprobe` can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ItemKind {
    Nonexistent,
    Int2,
    Int8,
    Int,
    Real,
    Double,
    Complex,
    /// A short string stored directly in the header.
    Character,
    Text,
    Binary,
    Unknown,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Nonexistent => "nonexistent",
            ItemKind::Int2 => "integer*2",
            ItemKind::Int8 => "integer*8",
            ItemKind::Int => "integer",
            ItemKind::Real => "real",
            ItemKind::Double => "double",
            ItemKind::Complex => "complex",
            ItemKind::Character => "character",
            ItemKind::Text => "text",
            ItemKind::Binary => "binary",
            ItemKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = std::convert::Infallible;

    /// Anything `hdprobe` doesn't document is [`ItemKind::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "nonexistent" | "nonexistant" => ItemKind::Nonexistent,
            "integer*2" => ItemKind::Int2,
            "integer*8" => ItemKind::Int8,
            "integer" => ItemKind::Int,
            "real" => ItemKind::Real,
            "double" => ItemKind::Double,
            "complex" => ItemKind::Complex,
            "character" => ItemKind::Character,
            "text" => ItemKind::Text,
            "binary" => ItemKind::Binary,
            _ => ItemKind::Unknown,
        })
    }
}

/// What `hdprobe` says about a header item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProbe {
    /// A description of the item, or its value if it is short enough.
    pub description: String,
    pub kind: ItemKind,
    /// The number of elements in the item.
    pub count: i32,
}

/// How a single-valued header item is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarLayout {
    /// The value is the probe's description.
    Description,
    /// A binary value of this kind at this byte offset.
    Binary { kind: ItemKind, offset: i64 },
}

impl HeaderProbe {
    /// Work out how to read this item as a single value. `Ok(None)` means
    /// the item doesn't exist.
    pub(crate) fn scalar_layout(&self, item: &str) -> Result<Option<ScalarLayout>, MiriadError> {
        let fail = |reason| MiriadError::HeaderItem {
            item: item.to_string(),
            reason,
        };

        match self.kind {
            ItemKind::Nonexistent => return Ok(None),
            ItemKind::Unknown => return Err(fail(HeaderItemError::NotWellDefined)),
            _ => (),
        }
        if self.count == 0 {
            return Err(fail(HeaderItemError::UnknownSize));
        }
        match self.kind {
            ItemKind::Binary => Err(fail(HeaderItemError::MixedBinary)),
            ItemKind::Text => Err(fail(HeaderItemError::ExtendedText)),
            ItemKind::Character => Ok(Some(ScalarLayout::Description)),
            _ if self.count != 1 => Err(fail(HeaderItemError::NotScalar(self.count))),
            kind @ (ItemKind::Double | ItemKind::Int8 | ItemKind::Complex) => {
                Ok(Some(ScalarLayout::Binary { kind, offset: 8 }))
            }
            kind => Ok(Some(ScalarLayout::Binary { kind, offset: 4 })),
        }
    }
}

/// Open the history of a dataset. `status` is "read", "write" or "append".
pub fn hisopen(tno: c_int, status: &str) -> Result<(), MiriadError> {
    let c_status = c_string(status)?;
    guarded(|| unsafe { sys::hisopen_c(tno, c_status.as_ptr()) })
}

pub fn hiswrite(tno: c_int, text: &str) -> Result<(), MiriadError> {
    let c_text = c_string(text)?;
    guarded(|| unsafe { sys::hiswrite_c(tno, c_text.as_ptr()) })
}

pub fn hisclose(tno: c_int) -> Result<(), MiriadError> {
    guarded(|| unsafe { sys::hisclose_c(tno) })
}

pub fn wrhda(tno: c_int, item: &str, value: &str) -> Result<(), MiriadError> {
    let c_item = c_string(item)?;
    let c_value = c_string(value)?;
    guarded(|| unsafe { sys::wrhda_c(tno, c_item.as_ptr(), c_value.as_ptr()) })
}

pub fn wrhdi(tno: c_int, item: &str, value: i32) -> Result<(), MiriadError> {
    let c_item = c_string(item)?;
    guarded(|| unsafe { sys::wrhdi_c(tno, c_item.as_ptr(), value) })
}

pub fn wrhdl(tno: c_int, item: &str, value: i64) -> Result<(), MiriadError> {
    let c_item = c_string(item)?;
    guarded(|| unsafe { sys::wrhdl_c(tno, c_item.as_ptr(), value) })
}

/// Write a real-valued item. The C routine takes a double but stores a
/// float.
pub fn wrhdr(tno: c_int, item: &str, value: f32) -> Result<(), MiriadError> {
    let c_item = c_string(item)?;
    guarded(|| unsafe { sys::wrhdr_c(tno, c_item.as_ptr(), value.into()) })
}

pub fn wrhdd(tno: c_int, item: &str, value: f64) -> Result<(), MiriadError> {
    let c_item = c_string(item)?;
    guarded(|| unsafe { sys::wrhdd_c(tno, c_item.as_ptr(), value) })
}

pub fn wrhdc(tno: c_int, item: &str, value: c32) -> Result<(), MiriadError> {
    let c_item = c_string(item)?;
    let pair = [value.re, value.im];
    guarded(|| unsafe { sys::wrhdc_c(tno, c_item.as_ptr(), pair.as_ptr()) })
}

/// Read a string item, up to [`BUFSZ`] bytes.
pub fn rdhda(tno: c_int, item: &str, default: &str) -> Result<String, MiriadError> {
    let c_item = c_string(item)?;
    let c_default = c_string(default)?;
    let mut buf: Vec<c_char> = vec![0; BUFSZ];
    guarded(|| unsafe {
        sys::rdhda_c(
            tno,
            c_item.as_ptr(),
            buf.as_mut_ptr(),
            c_default.as_ptr(),
            BUFSZ as c_int,
        )
    })?;
    Ok(string_from_buf(&buf))
}

pub fn rdhdi(tno: c_int, item: &str, default: i32) -> Result<i32, MiriadError> {
    let c_item = c_string(item)?;
    let mut value = 0;
    guarded(|| unsafe { sys::rdhdi_c(tno, c_item.as_ptr(), &mut value, default) })?;
    Ok(value)
}

pub fn rdhdl(tno: c_int, item: &str, default: i64) -> Result<i64, MiriadError> {
    let c_item = c_string(item)?;
    let mut value = 0;
    guarded(|| unsafe { sys::rdhdl_c(tno, c_item.as_ptr(), &mut value, default) })?;
    Ok(value)
}

pub fn rdhdr(tno: c_int, item: &str, default: f32) -> Result<f32, MiriadError> {
    let c_item = c_string(item)?;
    let mut value = 0.0;
    guarded(|| unsafe { sys::rdhdr_c(tno, c_item.as_ptr(), &mut value, default.into()) })?;
    Ok(value)
}

pub fn rdhdd(tno: c_int, item: &str, default: f64) -> Result<f64, MiriadError> {
    let c_item = c_string(item)?;
    let mut value = 0.0;
    guarded(|| unsafe { sys::rdhdd_c(tno, c_item.as_ptr(), &mut value, default) })?;
    Ok(value)
}

pub fn rdhdc(tno: c_int, item: &str, default: c32) -> Result<c32, MiriadError> {
    let c_item = c_string(item)?;
    let default = [default.re, default.im];
    let mut value = [0.0_f32; 2];
    guarded(|| unsafe {
        sys::rdhdc_c(tno, c_item.as_ptr(), value.as_mut_ptr(), default.as_ptr())
    })?;
    Ok(c32::new(value[0], value[1]))
}

/// Copy a header item from one dataset to another.
pub fn hdcopy(tin: c_int, tout: c_int, item: &str) -> Result<(), MiriadError> {
    let c_item = c_string(item)?;
    guarded(|| unsafe { sys::hdcopy_c(tin, tout, c_item.as_ptr()) })
}

pub fn hdprsnt(tno: c_int, item: &str) -> Result<bool, MiriadError> {
    let c_item = c_string(item)?;
    let ret = guarded(|| unsafe { sys::hdprsnt_c(tno, c_item.as_ptr()) })?;
    Ok(ret != 0)
}

pub fn hdprobe(tno: c_int, item: &str) -> Result<HeaderProbe, MiriadError> {
    let c_item = c_string(item)?;
    let mut descr: Vec<c_char> = vec![0; BUFSZ];
    let mut kind: [c_char; 32] = [0; 32];
    let mut n = 0;
    guarded(|| unsafe {
        sys::hdprobe_c(
            tno,
            c_item.as_ptr(),
            descr.as_mut_ptr(),
            BUFSZ as size_t,
            kind.as_mut_ptr(),
            &mut n,
        )
    })?;
    Ok(HeaderProbe {
        description: string_from_buf(&descr),
        kind: string_from_buf(&kind)
            .parse()
            .unwrap_or(ItemKind::Unknown),
        count: n,
    })
}

fn read_binary_scalar<T: ItemType>(ihandle: c_int, offset: i64) -> Result<T, MiriadError> {
    let mut buf = Array1::<T>::zeros(1);
    hio::hio_read(ihandle, &mut buf, offset, T::EXTERNAL_SIZE)?;
    Ok(buf[0])
}

/// Read any single-valued header item. Returns `None` if the item doesn't
/// exist.
pub fn rdhd(tno: c_int, item: &str) -> Result<Option<Value>, MiriadError> {
    let probe = hdprobe(tno, item)?;
    let (kind, offset) = match probe.scalar_layout(item)? {
        None => return Ok(None),
        Some(ScalarLayout::Description) => return Ok(Some(Value::Text(probe.description))),
        Some(ScalarLayout::Binary { kind, offset }) => (kind, offset),
    };

    trace!("reading {kind} header item {item} at offset {offset}");
    let ihandle = hio::haccess(tno, item, "read")?;
    let value = match kind {
        ItemKind::Real => read_binary_scalar::<f32>(ihandle, offset).map(Value::Real),
        ItemKind::Double => read_binary_scalar::<f64>(ihandle, offset).map(Value::Double),
        ItemKind::Int => read_binary_scalar::<i32>(ihandle, offset).map(Value::Int),
        ItemKind::Int8 => read_binary_scalar::<i64>(ihandle, offset).map(Value::Long),
        ItemKind::Complex => read_binary_scalar::<c32>(ihandle, offset).map(Value::Complex),
        ItemKind::Int2 => {
            let mut buf = Array1::<i32>::zeros(1);
            hio::hio_read_int2(ihandle, &mut buf, offset, 2).map(|()| Value::Short(buf[0] as i16))
        }
        _ => Err(MiriadError::HeaderItem {
            item: item.to_string(),
            reason: HeaderItemError::NotWellDefined,
        }),
    };
    // Close the item even if the read failed.
    let closed = hio::hdaccess(ihandle);
    let value = value?;
    closed?;
    Ok(Some(value))
}

/// Write a single-valued header item, choosing the routine by the value's
/// type. Shorts are widened and written as ints.
pub fn wrhd(tno: c_int, item: &str, value: &Value) -> Result<(), MiriadError> {
    match value {
        Value::Text(s) => wrhda(tno, item, s),
        Value::Short(v) => wrhdi(tno, item, (*v).into()),
        Value::Int(v) => wrhdi(tno, item, *v),
        Value::Long(v) => wrhdl(tno, item, *v),
        Value::Real(v) => wrhdr(tno, item, *v),
        Value::Double(v) => wrhdd(tno, item, *v),
        Value::Complex(v) => wrhdc(tno, item, *v),
    }
}

/// Check a probe result for use by code that wants a definite answer.
pub(crate) fn check_probe(item: &str, probe: &HeaderProbe) -> Result<(), MiriadError> {
    if probe.count == 0 {
        return Err(MiriadError::HeaderItem {
            item: item.to_string(),
            reason: HeaderItemError::UnknownSize,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(kind: ItemKind, count: i32) -> HeaderProbe {
        HeaderProbe {
            description: "J1331+305".to_string(),
            kind,
            count,
        }
    }

    #[test]
    fn test_item_kind_strings() {
        for kind in [
            ItemKind::Nonexistent,
            ItemKind::Int2,
            ItemKind::Int8,
            ItemKind::Int,
            ItemKind::Real,
            ItemKind::Double,
            ItemKind::Complex,
            ItemKind::Character,
            ItemKind::Text,
            ItemKind::Binary,
            ItemKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<ItemKind>().unwrap(), kind);
        }
        assert_eq!("nonexistant".parse::<ItemKind>().unwrap(), ItemKind::Nonexistent);
        assert_eq!("logical".parse::<ItemKind>().unwrap(), ItemKind::Unknown);
    }

    #[test]
    fn test_scalar_layout_offsets() {
        let layout = |kind| probe(kind, 1).scalar_layout("x").unwrap().unwrap();
        assert_eq!(
            layout(ItemKind::Real),
            ScalarLayout::Binary {
                kind: ItemKind::Real,
                offset: 4
            }
        );
        assert_eq!(
            layout(ItemKind::Int2),
            ScalarLayout::Binary {
                kind: ItemKind::Int2,
                offset: 4
            }
        );
        for kind in [ItemKind::Double, ItemKind::Int8, ItemKind::Complex] {
            assert_eq!(layout(kind), ScalarLayout::Binary { kind, offset: 8 });
        }
        assert_eq!(layout(ItemKind::Character), ScalarLayout::Description);
    }

    #[test]
    fn test_scalar_layout_nonexistent() {
        assert_eq!(probe(ItemKind::Nonexistent, 0).scalar_layout("x").unwrap(), None);
    }

    #[test]
    fn test_scalar_layout_errors() {
        let reason = |kind, count| match probe(kind, count).scalar_layout("crval1") {
            Err(MiriadError::HeaderItem { item, reason }) => {
                assert_eq!(item, "crval1");
                reason
            }
            other => panic!("unexpected result {other:?}"),
        };
        assert_eq!(reason(ItemKind::Unknown, 1), HeaderItemError::NotWellDefined);
        assert_eq!(reason(ItemKind::Real, 0), HeaderItemError::UnknownSize);
        assert_eq!(reason(ItemKind::Binary, 12), HeaderItemError::MixedBinary);
        assert_eq!(reason(ItemKind::Text, 40), HeaderItemError::ExtendedText);
        assert_eq!(reason(ItemKind::Double, 3), HeaderItemError::NotScalar(3));
    }

    #[test]
    fn test_check_probe() {
        assert!(check_probe("x", &probe(ItemKind::Real, 1)).is_ok());
        assert!(check_probe("x", &probe(ItemKind::Real, 0)).is_err());
    }
}
