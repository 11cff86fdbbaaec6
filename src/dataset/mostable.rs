// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mosaic pointing tables (the `mostable` item of mosaicked images).

use ndarray::{Array1, Array2};

use super::{DataItem, DataSetOps, ItemMode};
use crate::io::MiriadError;

const ITEM: &str = "mostable";
const HEADER_BYTES: i64 = 8;
/// Bytes per pointing: size (2 ints), RA/Dec (2 doubles), primary beam
/// type (16 chars), rms (a real padded to 8 bytes).
const BLOCK_BYTES: i64 = 48;
/// On-the-fly tables add a second RA/Dec pair per pointing.
const OTF_EXTRA_BYTES: i64 = 16;
const OTF_KIND: i32 = 2;
const PBTYPE_LEN: usize = 16;

/// Where the pointings of a mosaic table live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MosaicLayout {
    pub otf: bool,
    pub block_bytes: i64,
    pub npnt: usize,
}

impl MosaicLayout {
    /// Work out the layout from the table kind and the item size. The size
    /// must be a whole number of pointings.
    pub fn new(kind: i32, item_size: i64) -> Result<MosaicLayout, MiriadError> {
        let otf = kind == OTF_KIND;
        let block_bytes = if otf {
            BLOCK_BYTES + OTF_EXTRA_BYTES
        } else {
            BLOCK_BYTES
        };
        let npnt = (item_size - HEADER_BYTES).max(0) / block_bytes;
        if npnt * block_bytes + HEADER_BYTES != item_size {
            return Err(MiriadError::BadTable {
                item: ITEM,
                reason: format!(
                    "unexpected size {item_size} for {npnt} pointings of {block_bytes} bytes"
                ),
            });
        }
        Ok(MosaicLayout {
            otf,
            block_bytes,
            npnt: npnt as usize,
        })
    }

    /// Byte offset of pointing `index`.
    pub fn pointing_offset(&self, index: usize) -> i64 {
        HEADER_BYTES + index as i64 * self.block_bytes
    }
}

/// The pointings of a mosaic.
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicTable {
    /// Rounded half-width of each pointing's image.
    pub nx2: i32,
    /// Rounded half-height of each pointing's image.
    pub ny2: i32,
    /// Pointing centres, `(npnt, 2)` RA/Dec in radians.
    pub radec: Array2<f64>,
    /// Primary beam type of each pointing.
    pub pbtype: Vec<String>,
    /// Noise of each pointing, in Jy.
    pub rms: Array1<f32>,
    /// Second RA/Dec pair of on-the-fly tables.
    pub radec2: Option<Array2<f64>>,
}

impl MosaicTable {
    /// Read the `mostable` item of `dataset`.
    pub fn read<D: DataSetOps>(dataset: &D) -> Result<MosaicTable, MiriadError> {
        let mut item = dataset.item(ITEM, ItemMode::Read)?;
        let table = MosaicTable::read_item(&mut item);
        let closed = item.close();
        let table = table?;
        closed?;
        Ok(table)
    }

    /// Read a mosaic table from an open item.
    pub fn read_item(item: &mut DataItem) -> Result<MosaicTable, MiriadError> {
        let kind = item.read::<i32>(4, 1)?[0];
        let layout = MosaicLayout::new(kind, item.size()?)?;
        if layout.npnt == 0 {
            return Err(MiriadError::BadTable {
                item: ITEM,
                reason: "no pointings".to_string(),
            });
        }

        let npnt = layout.npnt;
        let mut radec = Array2::zeros((npnt, 2));
        let mut radec2 = Array2::zeros((npnt, 2));
        let mut rms = Array1::zeros(npnt);
        let mut pbtype = Vec::with_capacity(npnt);
        let mut size = Array1::zeros(2);
        let mut rms_value = Array1::zeros(1);
        for i in 0..npnt {
            let offset = layout.pointing_offset(i);
            // The image size is the same for every pointing.
            item.read_into(offset, &mut size)?;
            item.read_into(offset + 8, &mut radec.row_mut(i))?;
            pbtype.push(pbtype_from_bytes(&item.read::<u8>(offset + 24, PBTYPE_LEN)?.to_vec()));
            item.read_into(offset + 40, &mut rms_value)?;
            rms[i] = rms_value[0];
            if layout.otf {
                item.read_into(offset + 48, &mut radec2.row_mut(i))?;
            }
        }

        let (nx2, ny2) = half_sizes(size[0], size[1]);
        Ok(MosaicTable {
            nx2,
            ny2,
            radec,
            pbtype,
            rms,
            radec2: layout.otf.then_some(radec2),
        })
    }

    pub fn num_pointings(&self) -> usize {
        self.pbtype.len()
    }
}

fn half_sizes(width: i32, height: i32) -> (i32, i32) {
    ((width - 1).div_euclid(2), (height - 1).div_euclid(2))
}

fn pbtype_from_bytes(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts() {
        assert_eq!(
            MosaicLayout::new(1, 8 + 3 * 48).unwrap(),
            MosaicLayout {
                otf: false,
                block_bytes: 48,
                npnt: 3
            }
        );
        let otf = MosaicLayout::new(2, 8 + 5 * 64).unwrap();
        assert!(otf.otf);
        assert_eq!(otf.npnt, 5);
        assert_eq!(otf.pointing_offset(0), 8);
        assert_eq!(otf.pointing_offset(2), 8 + 128);
    }

    #[test]
    fn test_layout_size_mismatch() {
        // A 64-byte table read as a 48-byte one.
        for (kind, size) in [(1, 8 + 64), (2, 8 + 48), (1, 7), (1, 8 + 3 * 48 + 1)] {
            assert!(
                matches!(
                    MosaicLayout::new(kind, size),
                    Err(MiriadError::BadTable { item: "mostable", .. })
                ),
                "kind {kind}, size {size} was accepted"
            );
        }
        assert_eq!(MosaicLayout::new(1, 8).unwrap().npnt, 0);
    }

    #[test]
    fn test_half_sizes() {
        assert_eq!(half_sizes(257, 129), (128, 64));
        assert_eq!(half_sizes(256, 1), (127, 0));
    }

    #[test]
    fn test_pbtype() {
        assert_eq!(pbtype_from_bytes(b"ATCA            "), "ATCA");
        assert_eq!(pbtype_from_bytes(b"GAUS(120.0)\0\0\0\0\0"), "GAUS(120.0)");
        assert_eq!(pbtype_from_bytes(b""), "");
    }
}
