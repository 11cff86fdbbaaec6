// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Images, accessed a sub-cube at a time.

use std::path::Path;

use log::{debug, trace};
use ndarray::{Array1, ArrayView1};

use super::{DataSetOps, Handle, XyMode};
use crate::{
    constants::MAXNAX,
    io::{xyzio, MiriadError},
};

/// The geometry fixed by [`XyzDataSet::setup`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubcubeGeometry {
    /// The number of axes making up a sub-cube.
    dim: usize,
    viraxlen: Vec<i32>,
    /// Cumulative sizes: `vircubesize[i]` is the size of the first `i + 1`
    /// virtual axes.
    vircubesize: Vec<i32>,
}

impl SubcubeGeometry {
    fn subcube_len(&self) -> usize {
        match self.dim {
            0 => 1,
            d => self.vircubesize.get(d - 1).map_or(0, |&n| n.max(0) as usize),
        }
    }

    fn total_len(&self) -> usize {
        self.vircubesize.last().map_or(0, |&n| n.max(0) as usize)
    }

    fn num_subcubes(&self) -> usize {
        match self.subcube_len() {
            0 => 0,
            n => self.total_len() / n,
        }
    }

    /// The number of coordinates locating a sub-cube.
    fn num_coords(&self) -> usize {
        self.viraxlen.len().saturating_sub(self.dim)
    }
}

/// An open image for sub-cube access. Sub-cube, profile and pixel numbers
/// are 0-based; coordinates are MIRIAD's 1-based pixel coordinates.
#[derive(Debug)]
pub struct XyzDataSet {
    handle: Handle,
    axes: Vec<i32>,
    geometry: Option<SubcubeGeometry>,
}

impl XyzDataSet {
    pub fn open<P: AsRef<Path>>(
        path: P,
        mode: XyMode,
        naxis: usize,
        axes: Option<&[i32]>,
    ) -> Result<XyzDataSet, MiriadError> {
        let path = path.as_ref();
        if naxis == 0 || naxis > MAXNAX {
            return Err(MiriadError::InvalidArgument {
                function: "XyzDataSet::open",
                reason: format!("{naxis} axes requested; between 1 and {MAXNAX} are allowed"),
            });
        }
        let mut axlen = match (mode, axes) {
            (XyMode::Create, None) => {
                return Err(MiriadError::InvalidArgument {
                    function: "XyzDataSet::open",
                    reason: "axis lengths are needed to create an image".to_string(),
                })
            }
            (_, Some(axes)) if axes.len() == naxis => Array1::from(axes.to_vec()),
            (_, Some(axes)) => {
                return Err(MiriadError::BadArrayShape {
                    argument: "axes",
                    function: "XyzDataSet::open",
                    expected: format!("{naxis} elements"),
                    received: format!("{} elements", axes.len()),
                })
            }
            (XyMode::ReadWrite, None) => Array1::zeros(naxis),
        };
        let status = match mode {
            XyMode::ReadWrite => "old",
            XyMode::Create => "new",
        };
        let (tno, naxis) = xyzio::xyzopen(&path.display().to_string(), status, naxis, &mut axlen)?;
        let axes = axlen.iter().take(naxis).copied().collect();
        Ok(XyzDataSet {
            handle: Handle::new(tno, path, xyzio::xyzclose),
            axes,
            geometry: None,
        })
    }

    pub fn close(mut self) -> Result<(), MiriadError> {
        self.handle.shutdown()
    }

    pub fn flush(&mut self) -> Result<(), MiriadError> {
        xyzio::xyzflush(self.tno())
    }

    pub fn axes(&self) -> &[i32] {
        &self.axes
    }

    /// Define the sub-cube geometry. `subcube` names the axes of a
    /// sub-cube (e.g. "z" for spectra); `blc` and `trc` are the 1-based
    /// corners of the region, one element per axis.
    pub fn setup(&mut self, subcube: &str, blc: &[i32], trc: &[i32]) -> Result<(), MiriadError> {
        let naxis = self.axes.len();
        for (argument, corner) in [("blc", blc), ("trc", trc)] {
            if corner.len() != naxis {
                return Err(MiriadError::BadArrayShape {
                    argument,
                    function: "XyzDataSet::setup",
                    expected: format!("{naxis} elements"),
                    received: format!("{} elements", corner.len()),
                });
            }
        }
        let dim = subcube.trim().len();
        if dim > naxis {
            return Err(MiriadError::InvalidArgument {
                function: "XyzDataSet::setup",
                reason: format!("sub-cube \"{subcube}\" has more axes than the image's {naxis}"),
            });
        }
        // blc and trc have one element per axis of the open image.
        let (viraxlen, vircubesize) = unsafe {
            xyzio::xyzsetup(
                self.tno(),
                subcube,
                &ArrayView1::from(blc),
                &ArrayView1::from(trc),
            )?
        };
        let geometry = SubcubeGeometry {
            dim,
            viraxlen: viraxlen.to_vec(),
            vircubesize: vircubesize.to_vec(),
        };
        trace!(
            "xyz setup \"{subcube}\": {} sub-cubes of {} pixels",
            geometry.num_subcubes(),
            geometry.subcube_len()
        );
        self.geometry = Some(geometry);
        Ok(())
    }

    fn geometry(&self, function: &'static str) -> Result<&SubcubeGeometry, MiriadError> {
        self.geometry.as_ref().ok_or_else(|| MiriadError::InvalidArgument {
            function,
            reason: "setup has not been called".to_string(),
        })
    }

    /// The virtual axis lengths set up by [`XyzDataSet::setup`].
    pub fn virtual_axes(&self) -> Option<&[i32]> {
        self.geometry.as_ref().map(|g| g.viraxlen.as_slice())
    }

    /// The number of pixels in a sub-cube.
    pub fn subcube_len(&self) -> Result<usize, MiriadError> {
        Ok(self.geometry("XyzDataSet::subcube_len")?.subcube_len())
    }

    pub fn num_subcubes(&self) -> Result<usize, MiriadError> {
        Ok(self.geometry("XyzDataSet::num_subcubes")?.num_subcubes())
    }

    /// The coordinates buffer handed to MIRIAD. It is padded to the number
    /// of axes.
    fn coords_buffer(&self, coords: &[i32], function: &'static str) -> Result<Array1<i32>, MiriadError> {
        let ncoords = self.geometry(function)?.num_coords();
        if coords.len() != ncoords {
            debug!("{} coordinates given where {ncoords} locate a sub-cube", coords.len());
            return Err(MiriadError::BadArrayShape {
                argument: "coords",
                function,
                expected: format!("{ncoords} elements"),
                received: format!("{} elements", coords.len()),
            });
        }
        let mut buf = Array1::zeros(self.axes.len().max(1));
        for (b, &c) in buf.iter_mut().zip(coords) {
            *b = c;
        }
        Ok(buf)
    }

    fn check_index(&self, what: &str, index: usize, count: usize, function: &'static str) -> Result<i32, MiriadError> {
        if index >= count {
            return Err(MiriadError::InvalidArgument {
                function,
                reason: format!("{what} {index} is out of range for {count}"),
            });
        }
        i32::try_from(index + 1).map_err(|_| MiriadError::InvalidArgument {
            function,
            reason: format!("{what} {index} is too large"),
        })
    }

    /// The coordinates of sub-cube number `index`.
    pub fn subcube_to_coords(&self, index: usize) -> Result<Vec<i32>, MiriadError> {
        let geometry = self.geometry("XyzDataSet::subcube_to_coords")?;
        let n = self.check_index("sub-cube", index, geometry.num_subcubes(), "XyzDataSet::subcube_to_coords")?;
        let ncoords = geometry.num_coords();
        let mut buf = Array1::zeros(self.axes.len().max(1));
        // The buffer has room for every axis.
        unsafe { xyzio::xyzs2c(self.tno(), n, &mut buf)? };
        Ok(buf.iter().take(ncoords).copied().collect())
    }

    /// The sub-cube number at `coords`.
    pub fn coords_to_subcube(&self, coords: &[i32]) -> Result<usize, MiriadError> {
        let buf = self.coords_buffer(coords, "XyzDataSet::coords_to_subcube")?;
        let n = unsafe { xyzio::xyzc2s(self.tno(), &buf)? };
        Ok((n - 1).max(0) as usize)
    }

    /// Read the sub-cube at `coords`, and which of its pixels are valid.
    pub fn read_subcube(&self, coords: &[i32]) -> Result<(Array1<f32>, Array1<bool>), MiriadError> {
        let buf = self.coords_buffer(coords, "XyzDataSet::read_subcube")?;
        let len = self.subcube_len()?;
        let mut data = Array1::zeros(len);
        let mut mask = Array1::<i32>::zeros(len);
        // Buffers hold a whole sub-cube.
        let n = unsafe { xyzio::xyzread(self.tno(), &buf, &mut data, &mut mask)? };
        let n = n.min(len);
        Ok((
            data.slice_move(ndarray::s![..n]),
            mask.slice_move(ndarray::s![..n]).mapv(|m| m != 0),
        ))
    }

    /// Write the sub-cube at `coords`. Every pixel is valid unless `valid`
    /// says otherwise.
    pub fn write_subcube(
        &mut self,
        coords: &[i32],
        data: ArrayView1<f32>,
        valid: Option<ArrayView1<bool>>,
    ) -> Result<(), MiriadError> {
        let buf = self.coords_buffer(coords, "XyzDataSet::write_subcube")?;
        let len = self.subcube_len()?;
        let (data, mask) = write_buffers("XyzDataSet::write_subcube", data, valid, len)?;
        unsafe { xyzio::xyzwrite(self.tno(), &buf, &data, &mask, len) }
    }

    fn profile_len(&self, function: &'static str) -> Result<(usize, usize), MiriadError> {
        let geometry = self.geometry(function)?;
        if geometry.dim != 1 {
            return Err(MiriadError::InvalidArgument {
                function,
                reason: format!("profiles need a 1-axis sub-cube, not {} axes", geometry.dim),
            });
        }
        Ok((geometry.subcube_len(), geometry.num_subcubes()))
    }

    /// Read profile number `index`.
    pub fn read_profile(&self, index: usize) -> Result<(Array1<f32>, Array1<bool>), MiriadError> {
        let (len, count) = self.profile_len("XyzDataSet::read_profile")?;
        let n = self.check_index("profile", index, count, "XyzDataSet::read_profile")?;
        let mut data = Array1::zeros(len);
        let mut mask = Array1::<i32>::zeros(len);
        let nread = unsafe { xyzio::xyzprfrd(self.tno(), n, &mut data, &mut mask)? };
        let nread = nread.min(len);
        Ok((
            data.slice_move(ndarray::s![..nread]),
            mask.slice_move(ndarray::s![..nread]).mapv(|m| m != 0),
        ))
    }

    pub fn write_profile(
        &mut self,
        index: usize,
        data: ArrayView1<f32>,
        valid: Option<ArrayView1<bool>>,
    ) -> Result<(), MiriadError> {
        let (len, count) = self.profile_len("XyzDataSet::write_profile")?;
        let n = self.check_index("profile", index, count, "XyzDataSet::write_profile")?;
        let (data, mask) = write_buffers("XyzDataSet::write_profile", data, valid, len)?;
        unsafe { xyzio::xyzprfwr(self.tno(), n, &data, &mask, len) }
    }

    /// Read pixel number `index` of the virtual cube, and whether it is
    /// valid.
    pub fn read_pixel(&self, index: usize) -> Result<(f32, bool), MiriadError> {
        let total = self.geometry("XyzDataSet::read_pixel")?.total_len();
        let n = self.check_index("pixel", index, total, "XyzDataSet::read_pixel")?;
        unsafe { xyzio::xyzpixrd(self.tno(), n) }
    }
}

impl DataSetOps for XyzDataSet {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut Handle {
        &mut self.handle
    }
}

/// Contiguous data and mask buffers of exactly `len` pixels.
fn write_buffers(
    function: &'static str,
    data: ArrayView1<f32>,
    valid: Option<ArrayView1<bool>>,
    len: usize,
) -> Result<(Array1<f32>, Array1<i32>), MiriadError> {
    if data.len() != len {
        return Err(MiriadError::BadArrayShape {
            argument: "data",
            function,
            expected: format!("{len} elements"),
            received: format!("{} elements", data.len()),
        });
    }
    let mask = match valid {
        Some(valid) if valid.len() != len => {
            return Err(MiriadError::BadArrayShape {
                argument: "valid",
                function,
                expected: format!("{len} elements"),
                received: format!("{} elements", valid.len()),
            })
        }
        Some(valid) => valid.mapv(i32::from),
        None => Array1::ones(len),
    };
    Ok((data.to_owned(), mask))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn spectra() -> SubcubeGeometry {
        // A 16 x 8 x 32 cube viewed as spectra along z.
        SubcubeGeometry {
            dim: 1,
            viraxlen: vec![32, 16, 8],
            vircubesize: vec![32, 512, 4096],
        }
    }

    #[test]
    fn test_geometry() {
        let g = spectra();
        assert_eq!(g.subcube_len(), 32);
        assert_eq!(g.num_subcubes(), 128);
        assert_eq!(g.num_coords(), 2);
        assert_eq!(g.total_len(), 4096);

        let pixels = SubcubeGeometry { dim: 0, ..spectra() };
        assert_eq!(pixels.subcube_len(), 1);
        assert_eq!(pixels.num_subcubes(), 4096);
        assert_eq!(pixels.num_coords(), 3);

        let planes = SubcubeGeometry { dim: 2, ..spectra() };
        assert_eq!(planes.subcube_len(), 512);
        assert_eq!(planes.num_subcubes(), 8);
    }

    #[test]
    fn test_write_buffers() {
        let data = array![1.0f32, 2.0, 3.0];
        let (d, m) = write_buffers("test", data.view(), None, 3).unwrap();
        assert_eq!(d, data);
        assert_eq!(m, array![1, 1, 1]);

        let valid = array![true, false, true];
        let (_, m) = write_buffers("test", data.view(), Some(valid.view()), 3).unwrap();
        assert_eq!(m, array![1, 0, 1]);

        assert!(write_buffers("test", data.view(), None, 4).is_err());
        let short = array![true];
        assert!(write_buffers("test", data.view(), Some(short.view()), 3).is_err());
    }
}
