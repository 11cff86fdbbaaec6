// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Wrappers over MIRIAD's task keyword parser (`key.c`).
//!
//! A task hands its command line to [`keyini`], pulls each keyword out with
//! one of the typed getters, then calls [`keyfin`], which complains about
//! anything left unconsumed. Keyword values are consumed as they are read:
//! asking for `vis` twice yields the first and then the second
//! comma-separated value.

use std::{
    os::raw::{c_char, c_int},
    str::FromStr,
};

use itertools::Itertools;
use log::{debug, trace};
use thiserror::Error;

use crate::{
    bug::guarded,
    constants::BUFSZ,
    io::{c_len, c_string, string_from_buf, MiriadError},
    sys,
};

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("keyword '{keyword}': '{value}' matches none of {allowed}")]
    Unknown {
        keyword: String,
        value: String,
        allowed: String,
    },

    #[error("keyword '{keyword}': '{value}' is ambiguous, it could be any of {candidates}")]
    Ambiguous {
        keyword: String,
        value: String,
        candidates: String,
    },

    #[error("keyword '{keyword}': more than {nmax} values given")]
    TooMany { keyword: String, nmax: usize },

    #[error("keyword '{0}' is already registered")]
    DuplicateKeyword(String),

    #[error("option '{0}' is already registered")]
    DuplicateOption(String),

    #[error("boolean keyword '{0}' cannot be multi-valued")]
    MultiValuedBool(String),

    #[error("keyword '{0}' was not registered")]
    NotRegistered(String),

    #[error("unknown keyword kind '{0}'")]
    UnknownKind(char),

    #[error("time keyword '{0}' needs a time format")]
    NoTimeFormat(String),

    #[error("unknown time format '{0}'")]
    UnknownTimeFormat(String),

    #[error("keyword '{keyword}': default '{default}' is not a valid {kind}")]
    BadDefault {
        keyword: String,
        kind: &'static str,
        default: String,
    },

    #[error("keyword '{keyword}' holds {found} values, not {wanted}")]
    WrongKind {
        keyword: String,
        wanted: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Miriad(#[from] MiriadError),
}

/// How `keyt` reads a time or angle, and what it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeFormat {
    /// dd:mm:ss.s or dd.ddd, returned in radians.
    Dms,
    /// hh:mm:ss.s or hh.hhh, returned in radians.
    Hms,
    /// hh:mm:ss.s or hh.hhh, returned as a day fraction.
    DayTime,
    /// yymmmdd.ddd, yymmmdd:hh:mm:ss.s or an epoch (bYYYY, jYYYY),
    /// returned as a Julian date.
    AbsTime,
    /// Either an absolute time or a day fraction.
    Time,
}

impl TimeFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeFormat::Dms => "dms",
            TimeFormat::Hms => "hms",
            TimeFormat::DayTime => "dtime",
            TimeFormat::AbsTime => "atime",
            TimeFormat::Time => "time",
        }
    }
}

impl FromStr for TimeFormat {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<TimeFormat, KeyError> {
        match s {
            "dms" => Ok(TimeFormat::Dms),
            "hms" => Ok(TimeFormat::Hms),
            "dtime" => Ok(TimeFormat::DayTime),
            "atime" => Ok(TimeFormat::AbsTime),
            "time" => Ok(TimeFormat::Time),
            other => Err(KeyError::UnknownTimeFormat(other.to_string())),
        }
    }
}

/// Reset the keyword database and start collecting arguments for `task`
/// with [`keyput`].
pub fn keyinit(task: &str) -> Result<(), MiriadError> {
    let c_task = c_string(task)?;
    guarded(|| unsafe { sys::keyinit_c(c_task.as_ptr()) })
}

/// Add one `keyword=value` argument for `task`.
pub fn keyput(task: &str, arg: &str) -> Result<(), MiriadError> {
    let c_task = c_string(task)?;
    // keyput edits the string in place.
    let mut buf = c_string(arg)?.into_bytes_with_nul();
    guarded(|| unsafe { sys::keyput_c(c_task.as_ptr(), buf.as_mut_ptr().cast::<c_char>()) })
}

/// Load the keyword database from a command line. `args[0]` is the program
/// name, as in `argv`.
pub fn keyini<S: AsRef<str>>(args: &[S]) -> Result<(), MiriadError> {
    trace!("keyini {} arguments", args.len());
    // keyini edits the strings in place, so each one gets its own buffer.
    let mut bufs = args
        .iter()
        .map(|a| c_string(a.as_ref()).map(|c| c.into_bytes_with_nul()))
        .collect::<Result<Vec<_>, _>>()?;
    let mut argv: Vec<*mut c_char> = bufs
        .iter_mut()
        .map(|b| b.as_mut_ptr().cast::<c_char>())
        .collect();
    let argc = c_len("keyini", argv.len())?;
    guarded(|| unsafe { sys::keyini_c(argc, argv.as_mut_ptr()) })
}

/// Finish keyword processing. MIRIAD warns about any unconsumed keywords.
pub fn keyfin() -> Result<(), MiriadError> {
    guarded(|| unsafe { sys::keyfin_c() })
}

/// Whether `keyword` still has values left to consume.
pub fn keyprsnt(keyword: &str) -> Result<bool, MiriadError> {
    let c_keyword = c_string(keyword)?;
    let present = guarded(|| unsafe { sys::keyprsnt_c(c_keyword.as_ptr()) })?;
    Ok(present != 0)
}

/// Pull the next string value of `keyword`, or `default` if none is left.
pub fn keya(keyword: &str, default: &str) -> Result<String, MiriadError> {
    let c_keyword = c_string(keyword)?;
    let c_default = c_string(default)?;
    let mut buf = [0 as c_char; BUFSZ];
    guarded(|| unsafe { sys::keya_c(c_keyword.as_ptr(), buf.as_mut_ptr(), c_default.as_ptr()) })?;
    Ok(string_from_buf(&buf))
}

/// Like [`keya`], but the value is a file name; MIRIAD expands environment
/// variables and wildcards.
pub fn keyf(keyword: &str, default: &str) -> Result<String, MiriadError> {
    let c_keyword = c_string(keyword)?;
    let c_default = c_string(default)?;
    let mut buf = [0 as c_char; BUFSZ];
    guarded(|| unsafe { sys::keyf_c(c_keyword.as_ptr(), buf.as_mut_ptr(), c_default.as_ptr()) })?;
    Ok(string_from_buf(&buf))
}

pub fn keyd(keyword: &str, default: f64) -> Result<f64, MiriadError> {
    let c_keyword = c_string(keyword)?;
    let mut value = 0.0;
    guarded(|| unsafe { sys::keyd_c(c_keyword.as_ptr(), &mut value, default) })?;
    Ok(value)
}

/// A time or angle keyword, converted as `fmt` says. `default` is
/// already converted.
pub fn keyt(keyword: &str, fmt: TimeFormat, default: f64) -> Result<f64, MiriadError> {
    let c_keyword = c_string(keyword)?;
    let c_fmt = c_string(fmt.as_str())?;
    let mut value = 0.0;
    guarded(|| unsafe { sys::keyt_c(c_keyword.as_ptr(), &mut value, c_fmt.as_ptr(), default) })?;
    Ok(value)
}

pub fn keyr(keyword: &str, default: f32) -> Result<f32, MiriadError> {
    let c_keyword = c_string(keyword)?;
    let mut value = 0.0;
    guarded(|| unsafe { sys::keyr_c(c_keyword.as_ptr(), &mut value, default) })?;
    Ok(value)
}

pub fn keyi(keyword: &str, default: i32) -> Result<i32, MiriadError> {
    let c_keyword = c_string(keyword)?;
    let mut value = 0;
    guarded(|| unsafe { sys::keyi_c(c_keyword.as_ptr(), &mut value, default) })?;
    Ok(value)
}

/// A logical keyword (yes/no, true/false, ...).
pub fn keyl(keyword: &str, default: bool) -> Result<bool, MiriadError> {
    let c_keyword = c_string(keyword)?;
    let mut value: c_int = 0;
    guarded(|| unsafe { sys::keyl_c(c_keyword.as_ptr(), &mut value, c_int::from(default)) })?;
    Ok(value != 0)
}

macro_rules! mkey {
    ($name:ident, $c_fn:ident, $t:ty) => {
        /// Pull up to `nmax` values of `keyword`.
        pub fn $name(keyword: &str, nmax: usize) -> Result<Vec<$t>, MiriadError> {
            let c_keyword = c_string(keyword)?;
            let c_nmax = c_len(stringify!($name), nmax)?;
            let mut values: Vec<$t> = vec![Default::default(); nmax];
            let mut n: c_int = 0;
            guarded(|| unsafe { sys::$c_fn(c_keyword.as_ptr(), values.as_mut_ptr(), c_nmax, &mut n) })?;
            values.truncate((n.max(0) as usize).min(nmax));
            Ok(values)
        }
    };
}

mkey!(mkeyd, mkeyd_c, f64);
mkey!(mkeyr, mkeyr_c, f32);
mkey!(mkeyi, mkeyi_c, i32);

/// Pull up to `nmax` times or angles of `keyword`.
pub fn mkeyt(keyword: &str, fmt: TimeFormat, nmax: usize) -> Result<Vec<f64>, MiriadError> {
    let c_keyword = c_string(keyword)?;
    let c_fmt = c_string(fmt.as_str())?;
    let c_nmax = c_len("mkeyt", nmax)?;
    let mut values = vec![0.0; nmax];
    let mut n: c_int = 0;
    guarded(|| unsafe {
        sys::mkeyt_c(c_keyword.as_ptr(), values.as_mut_ptr(), c_nmax, &mut n, c_fmt.as_ptr())
    })?;
    values.truncate((n.max(0) as usize).min(nmax));
    Ok(values)
}

/// Collect up to `nmax` values by calling `get` until it returns an empty
/// string.
fn collect_strings<F>(keyword: &str, nmax: usize, mut get: F) -> Result<Vec<String>, MiriadError>
where
    F: FnMut(&str) -> Result<String, MiriadError>,
{
    let mut values = Vec::new();
    while values.len() < nmax {
        let value = get(keyword)?;
        if value.is_empty() {
            break;
        }
        values.push(value);
    }
    Ok(values)
}

/// Pull up to `nmax` string values of `keyword`.
pub fn mkeya(keyword: &str, nmax: usize) -> Result<Vec<String>, MiriadError> {
    collect_strings(keyword, nmax, |k| keya(k, ""))
}

/// Pull up to `nmax` file-name values of `keyword`.
pub fn mkeyf(keyword: &str, nmax: usize) -> Result<Vec<String>, MiriadError> {
    collect_strings(keyword, nmax, |k| keyf(k, ""))
}

/// Resolve `value` against `names`. Matching ignores case; an exact match
/// wins, otherwise `value` must be a prefix of exactly one name.
pub fn match_option<S: AsRef<str>>(
    keyword: &str,
    value: &str,
    names: &[S],
) -> Result<usize, KeyError> {
    let value_lc = value.to_ascii_lowercase();
    let lowered: Vec<String> = names
        .iter()
        .map(|n| n.as_ref().trim().to_ascii_lowercase())
        .collect();

    if let Some(i) = lowered.iter().position(|n| *n == value_lc) {
        return Ok(i);
    }

    let candidates: Vec<usize> = lowered
        .iter()
        .positions(|n| !value_lc.is_empty() && n.starts_with(&value_lc))
        .collect();
    match candidates.as_slice() {
        [i] => Ok(*i),
        [] => {
            debug!("no match for {keyword}={value}");
            Err(KeyError::Unknown {
                keyword: keyword.to_string(),
                value: value.to_string(),
                allowed: names.iter().map(|n| n.as_ref().trim()).join(", "),
            })
        }
        _ => Err(KeyError::Ambiguous {
            keyword: keyword.to_string(),
            value: value.to_string(),
            candidates: candidates
                .iter()
                .map(|&i| names[i].as_ref().trim())
                .join(", "),
        }),
    }
}

/// Flag which of `names` were given in `values`.
fn present_options<S: AsRef<str>>(
    keyword: &str,
    values: &[String],
    names: &[S],
) -> Result<Vec<bool>, KeyError> {
    let mut present = vec![false; names.len()];
    for value in values {
        present[match_option(keyword, value, names)?] = true;
    }
    Ok(present)
}

/// Resolve each of `values` to its full name, allowing at most `nmax`.
fn matched_names<S: AsRef<str>>(
    keyword: &str,
    values: &[String],
    names: &[S],
    nmax: usize,
) -> Result<Vec<String>, KeyError> {
    if values.len() > nmax {
        return Err(KeyError::TooMany {
            keyword: keyword.to_string(),
            nmax,
        });
    }
    values
        .iter()
        .map(|v| match_option(keyword, v, names).map(|i| names[i].as_ref().trim().to_string()))
        .collect()
}

/// Consume every value of `keyword` (usually "options") and report which of
/// `names` were given. Values may be abbreviated to a unique prefix.
pub fn options<S: AsRef<str>>(keyword: &str, names: &[S]) -> Result<Vec<bool>, KeyError> {
    let values = mkeya(keyword, usize::MAX)?;
    present_options(keyword, &values, names)
}

/// Consume up to `nmax` values of `keyword`, each expanded to the member of
/// `names` it abbreviates.
pub fn keymatch<S: AsRef<str>>(
    keyword: &str,
    names: &[S],
    nmax: usize,
) -> Result<Vec<String>, KeyError> {
    // One extra, so that too many values is an error rather than a leftover.
    let values = mkeya(keyword, nmax.saturating_add(1))?;
    matched_names(keyword, &values, names, nmax)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTS: [&str; 4] = ["nocal", "nopol", "nopass", "relax"];

    #[test]
    fn test_match_option_prefix() {
        assert_eq!(match_option("options", "relax", &OPTS).unwrap(), 3);
        assert_eq!(match_option("options", "rel", &OPTS).unwrap(), 3);
        assert_eq!(match_option("options", "noc", &OPTS).unwrap(), 0);
        assert_eq!(match_option("options", "NOPOL", &OPTS).unwrap(), 1);
    }

    #[test]
    fn test_match_option_exact_beats_prefix() {
        let names = ["line", "linear"];
        assert_eq!(match_option("stokes", "line", &names).unwrap(), 0);
        assert_eq!(match_option("stokes", "linea", &names).unwrap(), 1);
    }

    #[test]
    fn test_match_option_ambiguous() {
        let err = match_option("options", "nop", &OPTS).unwrap_err();
        match err {
            KeyError::Ambiguous { candidates, .. } => assert_eq!(candidates, "nopol, nopass"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_match_option_unknown() {
        assert!(matches!(
            match_option("options", "bogus", &OPTS),
            Err(KeyError::Unknown { .. })
        ));
        assert!(matches!(
            match_option("options", "", &OPTS),
            Err(KeyError::Unknown { .. })
        ));
    }

    #[test]
    fn test_padded_names() {
        // Names padded to a common width still match.
        let names = ["xx    ", "yy    ", "stokes"];
        assert_eq!(match_option("pol", "x", &names).unwrap(), 0);
    }

    #[test]
    fn test_present_options() {
        let values = vec!["rel".to_string(), "nocal".to_string()];
        let present = present_options("options", &values, &OPTS).unwrap();
        assert_eq!(present, vec![true, false, false, true]);
    }

    #[test]
    fn test_matched_names() {
        let values = vec!["nop".to_string()];
        assert!(matched_names("select", &values, &OPTS, 2).is_err());

        let values = vec!["rel".to_string(), "nopa".to_string()];
        assert_eq!(
            matched_names("select", &values, &OPTS, 2).unwrap(),
            vec!["relax", "nopass"]
        );
        assert!(matches!(
            matched_names("select", &values, &OPTS, 1),
            Err(KeyError::TooMany { nmax: 1, .. })
        ));
    }

    #[test]
    fn test_time_formats() {
        for fmt in [
            TimeFormat::Dms,
            TimeFormat::Hms,
            TimeFormat::DayTime,
            TimeFormat::AbsTime,
            TimeFormat::Time,
        ] {
            assert_eq!(fmt.as_str().parse::<TimeFormat>().unwrap(), fmt);
        }
        assert_eq!("dtime".parse::<TimeFormat>().unwrap(), TimeFormat::DayTime);
        assert!(matches!(
            "HMS".parse::<TimeFormat>(),
            Err(KeyError::UnknownTimeFormat(f)) if f == "HMS"
        ));
    }

    #[cfg(not(feature = "link"))]
    #[test]
    fn test_keyt_needs_libmir() {
        assert!(matches!(
            keyt("start", TimeFormat::AbsTime, 0.0),
            Err(MiriadError::NotImplemented("keyt_c"))
        ));
        assert!(matches!(
            mkeyt("ra", TimeFormat::Hms, 4),
            Err(MiriadError::NotImplemented("mkeyt_c"))
        ));
        assert!(matches!(
            keyt("bad\0name", TimeFormat::Dms, 0.0),
            Err(MiriadError::BadString(_))
        ));
    }

    #[test]
    fn test_collect_strings_stops() {
        let mut queue = vec!["a", "b", "c", ""].into_iter();
        let got = collect_strings("vis", 10, |_| Ok(queue.next().unwrap_or("").to_string())).unwrap();
        assert_eq!(got, vec!["a", "b", "c"]);

        let mut queue = vec!["a", "b", "c"].into_iter();
        let got = collect_strings("vis", 2, |_| Ok(queue.next().unwrap_or("").to_string())).unwrap();
        assert_eq!(got, vec!["a", "b"]);
    }
}
