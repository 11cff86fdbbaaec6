// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Antenna gain solutions, as stored in a dataset's `gains` item.
//!
//! After an 8-byte header, the item holds one block per solution: the
//! solution time (a double) followed by `ngains` complex gains.

use log::debug;
use ndarray::{Array1, Array2};

use super::{DataItem, DataSetOps, ItemMode};
use crate::{c32, io::MiriadError};

const ITEM: &str = "gains";
const HEADER_BYTES: i64 = 8;

/// The shape of a gains table, from the dataset header and the item size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GainsLayout {
    /// Gains per solution: `nants * (nfeeds + ntau)`.
    pub ngains: usize,
    pub nfeeds: usize,
    /// 1 if a delay term is solved for with each antenna, otherwise 0.
    pub ntau: usize,
    pub nants: usize,
    /// Number of solutions in the table.
    pub nsols: usize,
}

impl GainsLayout {
    /// Check the header counts and work out how many solutions an item of
    /// `item_size` bytes holds.
    pub fn new(ngains: i32, nfeeds: i32, ntau: i32, item_size: i64) -> Result<GainsLayout, MiriadError> {
        let bad = |reason: String| MiriadError::BadTable { item: ITEM, reason };
        if !(1..=2).contains(&nfeeds) || !(0..=1).contains(&ntau) || ngains < 0 {
            return Err(bad(format!(
                "bad number of gains ({ngains}), feeds ({nfeeds}), or taus ({ntau})"
            )));
        }
        let per_ant = nfeeds + ntau;
        if ngains % per_ant != 0 {
            return Err(bad(format!(
                "{ngains} gains don't divide among {nfeeds} feeds and {ntau} taus"
            )));
        }
        // Both are non-negative here.
        let ngains = ngains as usize;
        let nsols = if ngains == 0 || item_size < HEADER_BYTES {
            0
        } else {
            ((item_size - HEADER_BYTES) as usize) / (8 * ngains + 8)
        };
        Ok(GainsLayout {
            ngains,
            nfeeds: nfeeds as usize,
            ntau: ntau as usize,
            nants: ngains / per_ant as usize,
            nsols,
        })
    }

    /// Bytes taken by one solution.
    pub fn solution_bytes(&self) -> i64 {
        (8 * self.ngains + 8) as i64
    }

    /// Byte offset of solution `index`'s time; its gains follow 8 bytes
    /// later.
    pub fn solution_offset(&self, index: usize) -> i64 {
        HEADER_BYTES + index as i64 * self.solution_bytes()
    }
}

/// Reads gain solutions from a dataset.
#[derive(Debug)]
pub struct GainsReader<'a> {
    item: DataItem<'a>,
    layout: GainsLayout,
}

impl<'a> GainsReader<'a> {
    /// Open the `gains` item of `dataset`, checking the `ngains`, `nfeeds`
    /// and `ntau` header variables.
    pub fn open<D: DataSetOps>(dataset: &'a D) -> Result<GainsReader<'a>, MiriadError> {
        if !dataset.has_item(ITEM)? {
            return Err(MiriadError::BadTable {
                item: ITEM,
                reason: format!("{} has no gains table", dataset.path().display()),
            });
        }
        let ngains = dataset.header_i32_or("ngains", 0)?;
        let nfeeds = dataset.header_i32_or("nfeeds", 1)?;
        let ntau = dataset.header_i32_or("ntau", 0)?;
        let item = dataset.item(ITEM, ItemMode::Read)?;
        let layout = GainsLayout::new(ngains, nfeeds, ntau, item.size()?)?;
        debug!(
            "{}: {} gain solutions of {} gains",
            dataset.path().display(),
            layout.nsols,
            layout.ngains
        );
        Ok(GainsReader { item, layout })
    }

    pub fn layout(&self) -> &GainsLayout {
        &self.layout
    }

    /// Read solution `index`: its time and gains.
    pub fn read_solution(&mut self, index: usize) -> Result<(f64, Array1<c32>), MiriadError> {
        let offset = self.check_index(index)?;
        let time = self.item.read::<f64>(offset, 1)?;
        let gains = self.item.read::<c32>(offset + 8, self.layout.ngains)?;
        Ok((time[0], gains))
    }

    /// Read every solution. Returns the times and the gains, shaped
    /// `(nsols, ngains)`.
    pub fn read_all(&mut self) -> Result<(Array1<f64>, Array2<c32>), MiriadError> {
        let GainsLayout { nsols, ngains, .. } = self.layout;
        let mut times = Array1::zeros(nsols);
        let mut gains = Array2::zeros((nsols, ngains));
        let mut time = Array1::zeros(1);
        for (i, mut row) in gains.outer_iter_mut().enumerate() {
            let offset = self.layout.solution_offset(i);
            self.item.read_into(offset, &mut time)?;
            self.item.read_into(offset + 8, &mut row)?;
            times[i] = time[0];
        }
        Ok((times, gains))
    }

    /// Iterate over the solutions in order.
    pub fn solutions(
        &mut self,
    ) -> impl Iterator<Item = Result<(f64, Array1<c32>), MiriadError>> + '_ + use<'_, 'a> {
        (0..self.layout.nsols).map(move |i| self.read_solution(i))
    }

    pub fn close(self) -> Result<(), MiriadError> {
        self.item.close()
    }

    fn check_index(&self, index: usize) -> Result<i64, MiriadError> {
        if index >= self.layout.nsols {
            return Err(MiriadError::InvalidArgument {
                function: "GainsReader::read_solution",
                reason: format!("solution {index} requested of {}", self.layout.nsols),
            });
        }
        Ok(self.layout.solution_offset(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        // 6 antennas, 2 feeds, no delays; 10 solutions of 12 gains.
        let size = 8 + 10 * (8 * 12 + 8);
        let layout = GainsLayout::new(12, 2, 0, size).unwrap();
        assert_eq!(
            layout,
            GainsLayout {
                ngains: 12,
                nfeeds: 2,
                ntau: 0,
                nants: 6,
                nsols: 10,
            }
        );
        assert_eq!(layout.solution_bytes(), 104);
        assert_eq!(layout.solution_offset(0), 8);
        assert_eq!(layout.solution_offset(3), 8 + 3 * 104);

        // A partial trailing solution is ignored.
        let layout = GainsLayout::new(12, 2, 0, size + 50).unwrap();
        assert_eq!(layout.nsols, 10);
    }

    #[test]
    fn test_layout_with_delays() {
        let layout = GainsLayout::new(8, 1, 1, 8 + 2 * 72).unwrap();
        assert_eq!((layout.nants, layout.nsols), (4, 2));
    }

    #[test]
    fn test_layout_rejects_bad_counts() {
        for (ngains, nfeeds, ntau) in [(12, 0, 0), (12, 3, 0), (12, 2, 2), (12, 1, -1), (7, 2, 0), (-2, 1, 1)] {
            assert!(
                matches!(
                    GainsLayout::new(ngains, nfeeds, ntau, 1000),
                    Err(MiriadError::BadTable { item: "gains", .. })
                ),
                "({ngains}, {nfeeds}, {ntau}) was accepted"
            );
        }
    }

    #[test]
    fn test_empty_tables() {
        assert_eq!(GainsLayout::new(0, 1, 0, 8).unwrap().nsols, 0);
        assert_eq!(GainsLayout::new(4, 1, 0, 8).unwrap().nsols, 0);
        assert_eq!(GainsLayout::new(4, 1, 0, 0).unwrap().nsols, 0);
    }
}
