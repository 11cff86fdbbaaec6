// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Baseline bookkeeping and other small helpers.

use std::collections::HashMap;

use hifitime::Epoch;
use itertools::Itertools;

use crate::io::MiriadError;

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Encode a pair of antenna numbers into MIRIAD's floating-point baseline
/// number, as found in UV preambles. Antenna numbers start at 1.
pub fn encode_baseline(ant1: u32, ant2: u32) -> f64 {
    let bl = if ant2 > 255 {
        u64::from(ant1) * 2048 + u64::from(ant2) + 65_536
    } else {
        u64::from(ant1) * 256 + u64::from(ant2)
    };
    bl as f64
}

/// Decode a MIRIAD baseline number into its antennas. With `check`, the
/// result must satisfy `1 <= ant1 <= ant2`.
pub fn decode_baseline(baseline: f64, check: bool) -> Result<(u32, u32), MiriadError> {
    let bl = baseline.round();
    if !(0.0..=f64::from(u32::MAX)).contains(&bl) {
        return Err(MiriadError::InvalidArgument {
            function: "decode_baseline",
            reason: format!("{baseline} is not a baseline number"),
        });
    }
    let bl = bl as u64;
    let (ant1, ant2) = if bl > 65_536 {
        let bl = bl - 65_536;
        (bl / 2048, bl % 2048)
    } else {
        (bl / 256, bl % 256)
    };
    if check && (ant1 < 1 || ant1 > ant2) {
        return Err(MiriadError::InvalidArgument {
            function: "decode_baseline",
            reason: format!("{baseline} decodes to the invalid pair ({ant1}, {ant2})"),
        });
    }
    // Both halves are bounded by the u32 input range.
    Ok((ant1 as u32, ant2 as u32))
}

/// Every baseline formed from `ants`, paired with a running index. Antennas
/// are sorted first; within a baseline `ant1 < ant2` (or `<=` with
/// autocorrelations). The order is ant2-major, e.g. `[3, 5, 11]` gives
/// `(3, 5, 0)`, `(3, 11, 1)`, `(5, 11, 2)`.
pub fn baseline_index_mapping(ants: &[u32], include_autos: bool) -> Vec<(u32, u32, usize)> {
    let ants: Vec<u32> = ants.iter().copied().sorted().collect();
    let mut mapping = Vec::new();
    for (i, &ant2) in ants.iter().enumerate() {
        let upper = if include_autos { i + 1 } else { i };
        for &ant1 in &ants[..upper] {
            mapping.push((ant1, ant2, mapping.len()));
        }
    }
    mapping
}

/// Map `(ant1, ant2)` to a dense per-baseline index.
pub fn baseline_index_map(ants: &[u32], include_autos: bool) -> HashMap<(u32, u32), usize> {
    baseline_index_mapping(ants, include_autos)
        .into_iter()
        .map(|(a1, a2, i)| ((a1, a2), i))
        .collect()
}

/// The inverse of [`baseline_index_map`].
pub fn index_baseline_map(ants: &[u32], include_autos: bool) -> HashMap<usize, (u32, u32)> {
    baseline_index_mapping(ants, include_autos)
        .into_iter()
        .map(|(a1, a2, i)| (i, (a1, a2)))
        .collect()
}

/// Map encoded baseline numbers to a dense per-baseline index. Encoded
/// baselines are whole numbers, so the key is the integer value.
pub fn encoded_baseline_index_map(ants: &[u32], include_autos: bool) -> HashMap<u64, usize> {
    baseline_index_mapping(ants, include_autos)
        .into_iter()
        .map(|(a1, a2, i)| (encode_baseline(a1, a2) as u64, i))
        .collect()
}

/// Map a dense per-baseline index to the encoded baseline number.
pub fn index_encoded_baseline_map(ants: &[u32], include_autos: bool) -> HashMap<usize, f64> {
    baseline_index_mapping(ants, include_autos)
        .into_iter()
        .map(|(a1, a2, i)| (i, encode_baseline(a1, a2)))
        .collect()
}

/// Format a UTC time the way MIRIAD stamps history, e.g.
/// `09JAN12:13:45:22.5`.
pub fn history_date(epoch: Epoch) -> String {
    let (year, month, day, hour, minute, second, nanos) = epoch.to_gregorian_utc();
    let tenths = nanos / 100_000_000;
    let month = MONTHS[usize::from(month.clamp(1, 12)) - 1];
    format!(
        "{:02}{month}{day:02}:{hour:02}:{minute:02}:{second:02}.{tenths}",
        year.rem_euclid(100)
    )
}

/// The current time, formatted by [`history_date`].
pub fn history_date_now() -> String {
    history_date(Epoch::now().unwrap_or_else(|_| Epoch::from_unix_seconds(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_baseline() {
        assert_eq!(encode_baseline(3, 5), 773.0);
        assert_eq!(encode_baseline(3, 3), 771.0);
        assert_eq!(encode_baseline(1, 256), 2048.0 + 256.0 + 65536.0);
    }

    #[test]
    fn test_decode_baseline() {
        assert_eq!(decode_baseline(773.0, true).unwrap(), (3, 5));
        assert_eq!(decode_baseline(772.9999, true).unwrap(), (3, 5));
        assert_eq!(decode_baseline(encode_baseline(2, 300), true).unwrap(), (2, 300));
        assert_eq!(decode_baseline(encode_baseline(40, 512), false).unwrap(), (40, 512));
    }

    #[test]
    fn test_decode_baseline_check() {
        // (5, 3) is backwards.
        assert!(decode_baseline(5.0 * 256.0 + 3.0, true).is_err());
        assert_eq!(decode_baseline(5.0 * 256.0 + 3.0, false).unwrap(), (5, 3));
        // Antenna 0 doesn't exist.
        assert!(decode_baseline(7.0, true).is_err());
        assert!(decode_baseline(-1.0, false).is_err());
        assert!(decode_baseline(f64::NAN, false).is_err());
    }

    #[test]
    fn test_decode_baseline_large_boundary() {
        // 65536 itself is in the 256-based encoding.
        assert_eq!(decode_baseline(65_536.0, false).unwrap(), (256, 0));
        assert!(decode_baseline(65_536.0, true).is_err());
        assert_eq!(decode_baseline(65_537.0, false).unwrap(), (0, 1));
    }

    #[test]
    fn test_index_mapping() {
        let m = baseline_index_mapping(&[11, 3, 5], false);
        assert_eq!(m, vec![(3, 5, 0), (3, 11, 1), (5, 11, 2)]);

        let m = baseline_index_mapping(&[3, 5, 11], true);
        assert_eq!(
            m,
            vec![
                (3, 3, 0),
                (3, 5, 1),
                (5, 5, 2),
                (3, 11, 3),
                (5, 11, 4),
                (11, 11, 5)
            ]
        );
        assert!(baseline_index_mapping(&[7], false).is_empty());
    }

    #[test]
    fn test_index_maps() {
        let ants = [3, 5, 11];
        let bim = baseline_index_map(&ants, false);
        assert_eq!(bim.len(), 3);
        assert_eq!(bim[&(3, 5)], 0);
        assert!(!bim.contains_key(&(3, 3)));

        let ibm = index_baseline_map(&ants, true);
        assert_eq!(ibm.len(), 6);
        assert_eq!(ibm[&0], (3, 3));
        assert_eq!(ibm[&1], (3, 5));

        let ebim = encoded_baseline_index_map(&ants, true);
        assert_eq!(ebim[&773], 1);
        assert_eq!(ebim[&771], 0);

        let iebm = index_encoded_baseline_map(&ants, false);
        assert_eq!(iebm[&0], 773.0);
        assert_eq!(iebm[&1], 779.0);
    }

    #[test]
    fn test_history_date() {
        let epoch = Epoch::from_gregorian_utc(2009, 1, 12, 13, 45, 22, 500_000_000);
        assert_eq!(history_date(epoch), "09JAN12:13:45:22.5");

        let epoch = Epoch::from_gregorian_utc(2021, 11, 3, 0, 0, 7, 0);
        assert_eq!(history_date(epoch), "21NOV03:00:00:07.0");
    }
}
