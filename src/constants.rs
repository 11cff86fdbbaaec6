// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful constants, mostly mirrored from `miriad.h`, `hio.h` and `maskio.c`.

use std::os::raw::c_int;

/// hio type code: 8-bit bytes.
pub const H_BYTE: c_int = 1;
/// hio type code: 32-bit integers.
pub const H_INT: c_int = 2;
/// hio type code: 16-bit integers on disk. In memory these expand to `int`.
pub const H_INT2: c_int = 3;
/// hio type code: 32-bit floats.
pub const H_REAL: c_int = 4;
/// hio type code: 64-bit floats.
pub const H_DBLE: c_int = 5;
/// hio type code: text.
pub const H_TXT: c_int = 6;
/// hio type code: pairs of 32-bit floats.
pub const H_CMPLX: c_int = 7;
/// hio type code: 64-bit integers.
pub const H_INT8: c_int = 8;

/// maskio mode: one `int` per flag.
pub const MK_FLAGS: c_int = 1;
/// maskio mode: run-length encoded flags.
pub const MK_RUNS: c_int = 2;

/// The size of the scratch buffers handed to MIRIAD for string results.
pub const BUFSZ: usize = 512;

/// Size of the type header at the start of a binary header item.
pub const ITEM_HDR_SIZE: usize = 4;

/// The number of projection parameters in a wcslib `prjprm` (`PVN`).
pub const PVN: usize = 30;

/// Maximum number of image axes MIRIAD supports (`MAXNAX`).
pub const MAXNAX: usize = 7;

/// The number of bytes of each trailing item fed to a dataset digest.
pub const HASH_TAIL_BYTES: u64 = 1024 * 1024;

/// Line types reported by `uvinfo(tno, "line", ...)`.
pub const LINETYPE_NONE: i32 = 0;
/// Spectral channels.
pub const LINETYPE_CHANNEL: i32 = 1;
/// Wide-band channels.
pub const LINETYPE_WIDE: i32 = 2;
/// Velocity-resampled channels.
pub const LINETYPE_VELOCITY: i32 = 3;
/// Felocity-resampled channels.
pub const LINETYPE_FELOCITY: i32 = 4;
