// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Images, accessed a row at a time.

use std::path::Path;

use log::debug;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, DataMut, Ix1};

use super::{DataSetOps, Handle};
use crate::{
    constants::MAXNAX,
    io::{xyio, MiriadError},
};

/// How to open an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XyMode {
    ReadWrite,
    Create,
}

impl XyMode {
    fn as_str(self) -> &'static str {
        match self {
            XyMode::ReadWrite => "old",
            XyMode::Create => "new",
        }
    }
}

/// An open image. Row indices are 0-based.
#[derive(Debug)]
pub struct XyDataSet {
    handle: Handle,
    axes: Vec<i32>,
}

impl XyDataSet {
    /// Open an image with `naxis` axes. Creating an image needs the axis
    /// lengths; for existing images they are read from the dataset.
    pub fn open<P: AsRef<Path>>(
        path: P,
        mode: XyMode,
        naxis: usize,
        axes: Option<&[i32]>,
    ) -> Result<XyDataSet, MiriadError> {
        let path = path.as_ref();
        let mut buf = initial_axes(mode, naxis, axes)?;
        let tno = xyio::xyopen(&path.display().to_string(), mode.as_str(), naxis, &mut buf)?;
        Ok(XyDataSet {
            handle: Handle::new(tno, path, xyio::xyclose),
            axes: buf.to_vec(),
        })
    }

    pub fn close(mut self) -> Result<(), MiriadError> {
        self.handle.shutdown()
    }

    pub fn flush(&mut self) -> Result<(), MiriadError> {
        xyio::xyflush(self.tno())
    }

    /// The axis lengths.
    pub fn axes(&self) -> &[i32] {
        &self.axes
    }

    /// The length of a row.
    pub fn nx(&self) -> usize {
        self.axes.first().map_or(0, |&n| n.max(0) as usize)
    }

    /// The number of rows in a plane.
    pub fn ny(&self) -> usize {
        self.axes.get(1).map_or(1, |&n| n.max(0) as usize)
    }

    /// Select the plane to access. `plane` holds 0-based indices along the
    /// third and higher axes.
    pub fn set_plane(&mut self, plane: &[usize]) -> Result<(), MiriadError> {
        let higher = self.axes.get(2..).unwrap_or(&[]);
        if plane.len() > higher.len() {
            return Err(MiriadError::BadArrayShape {
                argument: "plane",
                function: "XyDataSet::set_plane",
                expected: format!("at most {} elements", higher.len()),
                received: format!("{} elements", plane.len()),
            });
        }
        let mut indices = Vec::with_capacity(plane.len());
        for (i, (&p, &len)) in plane.iter().zip(higher).enumerate() {
            if p >= len.max(0) as usize {
                return Err(MiriadError::InvalidArgument {
                    function: "XyDataSet::set_plane",
                    reason: format!("index {p} is out of range for axis {} of length {len}", i + 3),
                });
            }
            indices.push(p as i32 + 1);
        }
        xyio::xysetpl(self.tno(), indices.len(), &Array1::from(indices))
    }

    fn row_number(&self, index: usize, function: &'static str) -> Result<i32, MiriadError> {
        if index >= self.ny() {
            debug!("row {index} requested of an image with {} rows", self.ny());
            return Err(MiriadError::InvalidArgument {
                function,
                reason: format!("row {index} is out of range for {} rows", self.ny()),
            });
        }
        Ok(index as i32 + 1)
    }

    /// Read a row of the current plane, and which of its pixels are valid.
    pub fn read_row(&self, index: usize) -> Result<(Array1<f32>, Array1<bool>), MiriadError> {
        let mut data = Array1::zeros(self.nx());
        let mut valid = Array1::from_elem(self.nx(), false);
        self.read_row_into(index, &mut data, &mut valid)?;
        Ok((data, valid))
    }

    pub fn read_row_into<S1, S2>(
        &self,
        index: usize,
        data: &mut ArrayBase<S1, Ix1>,
        valid: &mut ArrayBase<S2, Ix1>,
    ) -> Result<(), MiriadError>
    where
        S1: DataMut<Elem = f32>,
        S2: DataMut<Elem = bool>,
    {
        let row = self.row_number(index, "XyDataSet::read_row_into")?;
        let nx = self.nx();
        check_row_len("data", "XyDataSet::read_row_into", data.len(), nx)?;
        check_row_len("valid", "XyDataSet::read_row_into", valid.len(), nx)?;
        let mut flags = Array1::<i32>::zeros(nx);
        // Both buffers hold exactly one row.
        unsafe {
            xyio::xyread(self.tno(), row, data)?;
            xyio::xyflgrd(self.tno(), row, &mut flags)?;
        }
        valid.zip_mut_with(&flags, |v, &f| *v = f != 0);
        Ok(())
    }

    /// Iterate over the rows of the current plane.
    pub fn read_rows(
        &self,
    ) -> impl Iterator<Item = Result<(Array1<f32>, Array1<bool>), MiriadError>> + '_ {
        (0..self.ny()).map(move |i| self.read_row(i))
    }

    /// Read the current plane, shaped `(ny, nx)`.
    pub fn read_plane(&self) -> Result<(Array2<f32>, Array2<bool>), MiriadError> {
        let (nx, ny) = (self.nx(), self.ny());
        let mut data = Array2::zeros((ny, nx));
        let mut valid = Array2::from_elem((ny, nx), false);
        for i in 0..ny {
            let mut data_row = data.row_mut(i);
            let mut valid_row = valid.row_mut(i);
            self.read_row_into(i, &mut data_row, &mut valid_row)?;
        }
        Ok((data, valid))
    }

    /// Write a row of the current plane. Flags are written only when
    /// `valid` is given.
    pub fn write_row(
        &mut self,
        index: usize,
        data: ArrayView1<f32>,
        valid: Option<ArrayView1<bool>>,
    ) -> Result<(), MiriadError> {
        let row = self.row_number(index, "XyDataSet::write_row")?;
        let nx = self.nx();
        check_row_len("data", "XyDataSet::write_row", data.len(), nx)?;
        if let Some(valid) = &valid {
            check_row_len("valid", "XyDataSet::write_row", valid.len(), nx)?;
        }
        // Lengths match the row size.
        unsafe {
            xyio::xywrite(self.tno(), row, &data)?;
            if let Some(valid) = valid {
                let flags = valid.mapv(i32::from);
                xyio::xyflgwr(self.tno(), row, &flags)?;
            }
        }
        Ok(())
    }

    /// Write the current plane from an array shaped `(ny, nx)`.
    pub fn write_plane(
        &mut self,
        data: ArrayView2<f32>,
        valid: Option<ArrayView2<bool>>,
    ) -> Result<(), MiriadError> {
        let shape = (self.ny(), self.nx());
        if data.dim() != shape {
            return Err(MiriadError::BadArrayShape {
                argument: "data",
                function: "XyDataSet::write_plane",
                expected: format!("{shape:?}"),
                received: format!("{:?}", data.dim()),
            });
        }
        if let Some(valid) = &valid {
            if valid.dim() != shape {
                return Err(MiriadError::BadArrayShape {
                    argument: "valid",
                    function: "XyDataSet::write_plane",
                    expected: format!("{shape:?}"),
                    received: format!("{:?}", valid.dim()),
                });
            }
        }
        for i in 0..shape.0 {
            // Rows of a non-standard-layout view are copied.
            let row = data.row(i).to_owned();
            let row_valid = valid.as_ref().map(|v| v.row(i).to_owned());
            self.write_row(i, row.view(), row_valid.as_ref().map(|v| v.view()))?;
        }
        Ok(())
    }
}

impl DataSetOps for XyDataSet {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut Handle {
        &mut self.handle
    }
}

/// The axis buffer handed to `xyopen`.
fn initial_axes(mode: XyMode, naxis: usize, axes: Option<&[i32]>) -> Result<Array1<i32>, MiriadError> {
    if naxis == 0 || naxis > MAXNAX {
        return Err(MiriadError::InvalidArgument {
            function: "XyDataSet::open",
            reason: format!("{naxis} axes requested; between 1 and {MAXNAX} are allowed"),
        });
    }
    match (mode, axes) {
        (XyMode::Create, None) => Err(MiriadError::InvalidArgument {
            function: "XyDataSet::open",
            reason: "axis lengths are needed to create an image".to_string(),
        }),
        (_, Some(axes)) => {
            if axes.len() != naxis {
                return Err(MiriadError::BadArrayShape {
                    argument: "axes",
                    function: "XyDataSet::open",
                    expected: format!("{naxis} elements"),
                    received: format!("{} elements", axes.len()),
                });
            }
            Ok(Array1::from(axes.to_vec()))
        }
        (XyMode::ReadWrite, None) => Ok(Array1::zeros(naxis)),
    }
}

fn check_row_len(
    argument: &'static str,
    function: &'static str,
    len: usize,
    nx: usize,
) -> Result<(), MiriadError> {
    if len == nx {
        Ok(())
    } else {
        Err(MiriadError::BadArrayShape {
            argument,
            function,
            expected: format!("{nx} elements"),
            received: format!("{len} elements"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_axes() {
        assert!(initial_axes(XyMode::Create, 2, None).is_err());
        assert!(initial_axes(XyMode::Create, 3, Some(&[4, 4])).is_err());
        assert!(initial_axes(XyMode::ReadWrite, 0, None).is_err());
        assert!(initial_axes(XyMode::ReadWrite, MAXNAX + 1, None).is_err());

        let axes = initial_axes(XyMode::Create, 3, Some(&[64, 32, 8])).unwrap();
        assert_eq!(axes.to_vec(), vec![64, 32, 8]);
        let axes = initial_axes(XyMode::ReadWrite, 2, None).unwrap();
        assert_eq!(axes.to_vec(), vec![0, 0]);
    }

    #[test]
    fn test_row_lengths() {
        assert!(check_row_len("data", "test", 16, 16).is_ok());
        assert!(matches!(
            check_row_len("data", "test", 15, 16),
            Err(MiriadError::BadArrayShape { argument: "data", .. })
        ));
    }

    #[test]
    fn test_mode_strings() {
        assert_eq!(XyMode::ReadWrite.as_str(), "old");
        assert_eq!(XyMode::Create.as_str(), "new");
    }
}
