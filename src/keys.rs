// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Declaring a task's keywords up front and reading them all at once.
//!
//! ```ignore
//! use miriad::{KeySpec, TimeFormat};
//!
//! let mut spec = KeySpec::new();
//! spec.keyword("vis", 'f', " ", 1)?
//!     .keyword("interval", 'd', "1", 1)?
//!     .keyword("refant", 'i', "0", 4)?
//!     .keyword_time("start", TimeFormat::AbsTime, 0.0, 1)?
//!     .keymatch("stokes", 2, &["i", "q", "u", "v"])?
//!     .option("nocal")?;
//! let args: Vec<String> = std::env::args().collect();
//! let keys = spec.process(&args)?;
//! let interval = keys.double("interval")?;
//! let nocal = keys.option("nocal")?;
//! # Ok::<(), miriad::KeyError>(())
//! ```

use std::collections::HashMap;

use log::trace;

use crate::key::{self, KeyError, TimeFormat};

/// The kind of values a keyword takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyKind {
    /// 'a'
    Str,
    /// 'f'
    File,
    /// 'i'
    Int,
    /// 'd'
    Double,
    /// 'r'
    Real,
    /// 'b'
    Bool,
    /// 't', a time or angle read with a [`TimeFormat`].
    Time,
}

impl KeyKind {
    pub fn from_code(code: char) -> Result<KeyKind, KeyError> {
        match code {
            'a' => Ok(KeyKind::Str),
            'f' => Ok(KeyKind::File),
            'i' => Ok(KeyKind::Int),
            'd' => Ok(KeyKind::Double),
            'r' => Ok(KeyKind::Real),
            'b' => Ok(KeyKind::Bool),
            't' => Ok(KeyKind::Time),
            other => Err(KeyError::UnknownKind(other)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            KeyKind::Str => "string",
            KeyKind::File => "file name",
            KeyKind::Int => "integer",
            KeyKind::Double | KeyKind::Real => "number",
            KeyKind::Bool => "boolean",
            KeyKind::Time => "time",
        }
    }
}

/// The value of a keyword after processing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyValue {
    Str(String),
    Int(i32),
    Double(f64),
    Real(f32),
    Bool(bool),
    Strs(Vec<String>),
    Ints(Vec<i32>),
    Doubles(Vec<f64>),
    Reals(Vec<f32>),
}

impl KeyValue {
    fn kind_name(&self) -> &'static str {
        match self {
            KeyValue::Str(_) => "string",
            KeyValue::Int(_) => "integer",
            KeyValue::Double(_) => "double",
            KeyValue::Real(_) => "real",
            KeyValue::Bool(_) => "boolean",
            KeyValue::Strs(_) => "multiple string",
            KeyValue::Ints(_) => "multiple integer",
            KeyValue::Doubles(_) => "multiple double",
            KeyValue::Reals(_) => "multiple real",
        }
    }
}

/// A single-valued keyword's default, checked when registered.
#[derive(Debug, Clone, PartialEq)]
enum DefaultValue {
    Str(String),
    Int(i32),
    Double(f64),
    Real(f32),
    Bool(bool),
}

fn parse_default(keyword: &str, kind: KeyKind, text: &str) -> Result<DefaultValue, KeyError> {
    let bad = || KeyError::BadDefault {
        keyword: keyword.to_string(),
        kind: kind.name(),
        default: text.to_string(),
    };
    let trimmed = text.trim();
    Ok(match kind {
        KeyKind::Str | KeyKind::File => DefaultValue::Str(text.to_string()),
        KeyKind::Int => DefaultValue::Int(trimmed.parse().map_err(|_| bad())?),
        KeyKind::Double | KeyKind::Time => DefaultValue::Double(trimmed.parse().map_err(|_| bad())?),
        KeyKind::Real => DefaultValue::Real(trimmed.parse().map_err(|_| bad())?),
        KeyKind::Bool => DefaultValue::Bool(match trimmed.to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "1" => true,
            "f" | "false" | "n" | "no" | "0" | "" => false,
            _ => return Err(bad()),
        }),
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Single { kind: KeyKind, default: DefaultValue },
    Multi { kind: KeyKind, nmax: usize },
    Time { fmt: TimeFormat, default: f64, nmax: usize },
    Match { nmax: usize, allowed: Vec<String> },
}

/// A task's keywords and options.
#[derive(Debug, Clone, Default)]
pub struct KeySpec {
    keywords: Vec<(String, Entry)>,
    options: Vec<String>,
}

impl KeySpec {
    pub fn new() -> KeySpec {
        KeySpec::default()
    }

    fn register(&mut self, name: &str, entry: Entry) -> Result<&mut KeySpec, KeyError> {
        if self.keywords.iter().any(|(n, _)| n == name) {
            return Err(KeyError::DuplicateKeyword(name.to_string()));
        }
        self.keywords.push((name.to_string(), entry));
        Ok(self)
    }

    /// Register a keyword. `kind` is one of 'a' (string), 'f' (file name),
    /// 'i' (integer), 'd' (double), 'r' (real) or 'b' (boolean). Keywords
    /// with `nmax` above 1 collect up to that many values and have no
    /// default; `default` is only used for single-valued keywords. Time
    /// keywords ('t') are registered with [`KeySpec::keyword_time`].
    pub fn keyword(
        &mut self,
        name: &str,
        kind: char,
        default: &str,
        nmax: usize,
    ) -> Result<&mut KeySpec, KeyError> {
        let kind = KeyKind::from_code(kind)?;
        let entry = match (kind, nmax) {
            (KeyKind::Time, _) => return Err(KeyError::NoTimeFormat(name.to_string())),
            (_, 0 | 1) => Entry::Single {
                kind,
                default: parse_default(name, kind, default)?,
            },
            (KeyKind::Bool, _) => return Err(KeyError::MultiValuedBool(name.to_string())),
            (_, nmax) => Entry::Multi { kind, nmax },
        };
        self.register(name, entry)
    }

    /// Register a time or angle keyword, read as `fmt` says. `default` is
    /// in the converted units (radians, day fraction or Julian date) and is
    /// only used when `nmax` is 1.
    pub fn keyword_time(
        &mut self,
        name: &str,
        fmt: TimeFormat,
        default: f64,
        nmax: usize,
    ) -> Result<&mut KeySpec, KeyError> {
        self.register(
            name,
            Entry::Time {
                fmt,
                default,
                nmax: nmax.max(1),
            },
        )
    }

    /// Register a keyword whose values are abbreviations of `allowed`.
    pub fn keymatch<S: AsRef<str>>(
        &mut self,
        name: &str,
        nmax: usize,
        allowed: &[S],
    ) -> Result<&mut KeySpec, KeyError> {
        let allowed = allowed.iter().map(|s| s.as_ref().to_string()).collect();
        self.register(name, Entry::Match { nmax, allowed })
    }

    /// Register an option, given with `options=`.
    pub fn option(&mut self, name: &str) -> Result<&mut KeySpec, KeyError> {
        if self.options.iter().any(|o| o == name) {
            return Err(KeyError::DuplicateOption(name.to_string()));
        }
        self.options.push(name.to_string());
        Ok(self)
    }

    /// Hand `args` (including the program name) to MIRIAD's keyword
    /// routines and read every registered keyword and option.
    pub fn process<S: AsRef<str>>(&self, args: &[S]) -> Result<KeyValues, KeyError> {
        key::keyini(args)?;
        let mut values = HashMap::with_capacity(self.keywords.len());
        for (name, entry) in &self.keywords {
            let value = read_entry(name, entry)?;
            trace!("{name} = {value:?}");
            values.insert(name.clone(), value);
        }
        let options = if self.options.is_empty() {
            HashMap::new()
        } else {
            let present = key::options("options", &self.options)?;
            self.options.iter().cloned().zip(present).collect()
        };
        key::keyfin()?;
        Ok(KeyValues { values, options })
    }
}

fn read_entry(name: &str, entry: &Entry) -> Result<KeyValue, KeyError> {
    Ok(match entry {
        Entry::Single { kind, default } => match (kind, default) {
            (KeyKind::File, DefaultValue::Str(d)) => KeyValue::Str(key::keyf(name, d)?),
            (_, DefaultValue::Str(d)) => KeyValue::Str(key::keya(name, d)?),
            (_, DefaultValue::Int(d)) => KeyValue::Int(key::keyi(name, *d)?),
            (_, DefaultValue::Double(d)) => KeyValue::Double(key::keyd(name, *d)?),
            (_, DefaultValue::Real(d)) => KeyValue::Real(key::keyr(name, *d)?),
            (_, DefaultValue::Bool(d)) => KeyValue::Bool(key::keyl(name, *d)?),
        },
        Entry::Multi { kind, nmax } => match kind {
            KeyKind::Str => KeyValue::Strs(key::mkeya(name, *nmax)?),
            KeyKind::File => KeyValue::Strs(key::mkeyf(name, *nmax)?),
            KeyKind::Int => KeyValue::Ints(key::mkeyi(name, *nmax)?),
            KeyKind::Double => KeyValue::Doubles(key::mkeyd(name, *nmax)?),
            KeyKind::Real => KeyValue::Reals(key::mkeyr(name, *nmax)?),
            KeyKind::Bool => return Err(KeyError::MultiValuedBool(name.to_string())),
            KeyKind::Time => return Err(KeyError::NoTimeFormat(name.to_string())),
        },
        Entry::Time { fmt, default, nmax: 1 } => KeyValue::Double(key::keyt(name, *fmt, *default)?),
        Entry::Time { fmt, nmax, .. } => KeyValue::Doubles(key::mkeyt(name, *fmt, *nmax)?),
        Entry::Match { nmax, allowed } => KeyValue::Strs(key::keymatch(name, allowed, *nmax)?),
    })
}

/// The processed keywords and options of a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyValues {
    values: HashMap<String, KeyValue>,
    options: HashMap<String, bool>,
}

macro_rules! getter {
    ($name:ident, $variant:ident, $t:ty, $wanted:literal) => {
        pub fn $name(&self, keyword: &str) -> Result<$t, KeyError> {
            match self.get(keyword)? {
                KeyValue::$variant(v) => Ok(v.clone()),
                other => Err(KeyError::WrongKind {
                    keyword: keyword.to_string(),
                    wanted: $wanted,
                    found: other.kind_name(),
                }),
            }
        }
    };
}

impl KeyValues {
    pub fn get(&self, keyword: &str) -> Result<&KeyValue, KeyError> {
        self.values
            .get(keyword)
            .ok_or_else(|| KeyError::NotRegistered(keyword.to_string()))
    }

    getter!(string, Str, String, "string");
    getter!(int, Int, i32, "integer");
    getter!(double, Double, f64, "double");
    getter!(real, Real, f32, "real");
    getter!(boolean, Bool, bool, "boolean");
    getter!(strings, Strs, Vec<String>, "multiple string");
    getter!(ints, Ints, Vec<i32>, "multiple integer");
    getter!(doubles, Doubles, Vec<f64>, "multiple double");
    getter!(reals, Reals, Vec<f32>, "multiple real");

    /// Whether an option was given.
    pub fn option(&self, name: &str) -> Result<bool, KeyError> {
        self.options
            .get(name)
            .copied()
            .ok_or_else(|| KeyError::NotRegistered(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        for (code, kind) in [
            ('a', KeyKind::Str),
            ('f', KeyKind::File),
            ('i', KeyKind::Int),
            ('d', KeyKind::Double),
            ('r', KeyKind::Real),
            ('b', KeyKind::Bool),
            ('t', KeyKind::Time),
        ] {
            assert_eq!(KeyKind::from_code(code).unwrap(), kind);
        }
        assert!(matches!(KeyKind::from_code('x'), Err(KeyError::UnknownKind('x'))));
    }

    #[test]
    fn test_registration() {
        let mut spec = KeySpec::new();
        spec.keyword("vis", 'f', " ", 1)
            .unwrap()
            .keyword("line", 'a', "channel", 1)
            .unwrap()
            .keyword("refant", 'i', "3", 1)
            .unwrap()
            .keyword("flux", 'r', "1.5", 1)
            .unwrap()
            .keyword("freq", 'd', "0", 8)
            .unwrap()
            .keyword("apply", 'b', "t", 1)
            .unwrap()
            .keymatch("stokes", 2, &["i", "q", "u", "v"])
            .unwrap()
            .option("nocal")
            .unwrap();

        assert_eq!(spec.keywords.len(), 7);
        assert_eq!(
            spec.keywords[2].1,
            Entry::Single {
                kind: KeyKind::Int,
                default: DefaultValue::Int(3)
            }
        );
        assert_eq!(
            spec.keywords[4].1,
            Entry::Multi {
                kind: KeyKind::Double,
                nmax: 8
            }
        );
        assert_eq!(
            spec.keywords[5].1,
            Entry::Single {
                kind: KeyKind::Bool,
                default: DefaultValue::Bool(true)
            }
        );
    }

    #[test]
    fn test_registration_errors() {
        let mut spec = KeySpec::new();
        spec.keyword("vis", 'f', "", 1).unwrap();
        assert!(matches!(
            spec.keyword("vis", 'a', "", 1),
            Err(KeyError::DuplicateKeyword(k)) if k == "vis"
        ));
        assert!(matches!(
            spec.keymatch("vis", 1, &["a"]),
            Err(KeyError::DuplicateKeyword(_))
        ));
        assert!(matches!(
            spec.keyword("flags", 'b', "f", 4),
            Err(KeyError::MultiValuedBool(_))
        ));
        assert!(matches!(
            spec.keyword("niters", 'i', "lots", 1),
            Err(KeyError::BadDefault { kind: "integer", .. })
        ));
        assert!(matches!(
            spec.keyword("apply", 'b', "maybe", 1),
            Err(KeyError::BadDefault { .. })
        ));
        assert!(matches!(
            spec.keyword("when", 't', "0", 1),
            Err(KeyError::NoTimeFormat(k)) if k == "when"
        ));
        assert!(matches!(
            spec.keyword("when", 'q', "", 1),
            Err(KeyError::UnknownKind('q'))
        ));
        assert!(matches!(
            spec.keyword_time("vis", TimeFormat::Hms, 0.0, 1),
            Err(KeyError::DuplicateKeyword(_))
        ));
        spec.option("nocal").unwrap();
        assert!(matches!(
            spec.option("nocal"),
            Err(KeyError::DuplicateOption(_))
        ));
    }

    #[test]
    fn test_time_keywords() {
        let mut spec = KeySpec::new();
        spec.keyword_time("start", TimeFormat::AbsTime, 2_451_545.0, 1)
            .unwrap()
            .keyword_time("ra", TimeFormat::Hms, 0.0, 4)
            .unwrap()
            .keyword_time("interval", TimeFormat::DayTime, 0.0, 0)
            .unwrap();
        assert_eq!(
            spec.keywords[0].1,
            Entry::Time {
                fmt: TimeFormat::AbsTime,
                default: 2_451_545.0,
                nmax: 1
            }
        );
        assert_eq!(
            spec.keywords[1].1,
            Entry::Time {
                fmt: TimeFormat::Hms,
                default: 0.0,
                nmax: 4
            }
        );
        // nmax 0 means a single value.
        assert!(matches!(spec.keywords[2].1, Entry::Time { nmax: 1, .. }));
    }

    #[cfg(not(feature = "link"))]
    #[test]
    fn test_time_keywords_read_through_keyt() {
        let single = Entry::Time {
            fmt: TimeFormat::Dms,
            default: 0.0,
            nmax: 1,
        };
        assert!(matches!(
            read_entry("dec", &single),
            Err(KeyError::Miriad(crate::MiriadError::NotImplemented("keyt_c")))
        ));
        let multi = Entry::Time {
            fmt: TimeFormat::Dms,
            default: 0.0,
            nmax: 3,
        };
        assert!(matches!(
            read_entry("dec", &multi),
            Err(KeyError::Miriad(crate::MiriadError::NotImplemented("mkeyt_c")))
        ));
    }

    #[test]
    fn test_values() {
        let values = KeyValues {
            values: HashMap::from([
                ("vis".to_string(), KeyValue::Str("a.uv".to_string())),
                ("refant".to_string(), KeyValue::Int(3)),
                ("freq".to_string(), KeyValue::Doubles(vec![1.4, 1.6])),
                ("apply".to_string(), KeyValue::Bool(false)),
            ]),
            options: HashMap::from([("nocal".to_string(), true), ("nopass".to_string(), false)]),
        };
        assert_eq!(values.string("vis").unwrap(), "a.uv");
        assert_eq!(values.int("refant").unwrap(), 3);
        assert_eq!(values.doubles("freq").unwrap(), vec![1.4, 1.6]);
        assert!(!values.boolean("apply").unwrap());
        assert!(values.option("nocal").unwrap());
        assert!(!values.option("nopass").unwrap());

        assert!(matches!(
            values.double("refant"),
            Err(KeyError::WrongKind {
                wanted: "double",
                found: "integer",
                ..
            })
        ));
        assert!(matches!(values.get("select"), Err(KeyError::NotRegistered(_))));
        assert!(matches!(values.option("nofqav"), Err(KeyError::NotRegistered(_))));
    }
}
