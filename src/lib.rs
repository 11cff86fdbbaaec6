// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Bindings to MIRIAD's data I/O libraries, plus the conveniences needed to
//! write MIRIAD-style tasks in Rust.
//!
//! - [`io`] wraps the C routines one-for-one (hio, headio, uvio, xyio,
//!   maskio, xyzio), turning MIRIAD's bug reports into [`MiriadError`]s.
//! - [`dataset`] provides owning handles ([`UvDataSet`], [`XyDataSet`], ...)
//!   that close themselves and keep track of buffer geometry.
//! - [`data`] manages dataset directories on disk and [`task`] runs MIRIAD
//!   programs.
//! - [`key`] and [`keys`] handle task keywords.
//!
//! Linking against libmir is opt-in via the `link` feature.

#[allow(non_camel_case_types)]
pub type c32 = num_complex::Complex<f32>;

pub mod bug;
pub mod constants;
pub mod data;
pub mod dataset;
pub mod io;
pub mod key;
pub mod keys;
pub mod sys;
pub mod task;
pub mod util;
pub mod wcs;

/// Build-time information, generated by `built`.
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// Re-exports.
pub use bug::{report, set_warning_policy, Severity, WarningPolicy};
pub use data::{CalData, Data, DataError, ImData, VisData};
pub use dataset::{
    AccessMode, DataItem, DataSet, DataSetMode, DataSetOps, GainsLayout, GainsReader,
    HistoryMode, ItemMode, LineInfo, MaskAccess, MaskItem, MosaicLayout, MosaicTable, UvDataSet,
    UvMode, UvVarTracker, XyDataSet, XyMode, XyzDataSet,
};
pub use io::{MiriadError, Value};
pub use key::{KeyError, TimeFormat};
pub use keys::{KeyKind, KeySpec, KeyValue, KeyValues};
pub use task::{MiriadEnv, Task, TaskError};
pub use wcs::{CelError, Celprm};

pub use hifitime;
pub use ndarray;
pub use num_complex;

#[cfg(test)]
#[test]
fn hifitime_works_as_expected() {
    use hifitime::Epoch;

    // History stamps go through unix seconds.
    let unix = 1_000_000_000.0;
    let epoch = Epoch::from_unix_seconds(unix);
    approx::assert_abs_diff_eq!(epoch.to_unix_seconds(), unix, epsilon = 1e-6);
    let (y, m, d, hh, mm, ss, _) = epoch.to_gregorian_utc();
    assert_eq!((y, m, d, hh, mm, ss), (2001, 9, 9, 1, 46, 40));
}

#[cfg(test)]
#[test]
fn built_info_is_populated() {
    assert_eq!(built_info::PKG_NAME, "miriad");
    assert_eq!(built_info::PKG_VERSION, env!("CARGO_PKG_VERSION"));
}
