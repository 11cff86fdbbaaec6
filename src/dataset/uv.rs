// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility datasets.

use std::{os::raw::c_int, path::Path};

use itertools::Itertools;
use log::debug;
use ndarray::{Array1, ArrayBase, ArrayView1, DataMut, Ix1};

use super::{DataSetOps, Handle};
use crate::{
    c32,
    constants::{LINETYPE_CHANNEL, LINETYPE_FELOCITY, LINETYPE_NONE, LINETYPE_VELOCITY, LINETYPE_WIDE},
    io::{
        uvio::{self, VarProbe},
        MiriadError, Value,
    },
};

/// How to open a UV dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UvMode {
    /// Read the visibilities of an existing dataset. Non-UV header items
    /// may still be written.
    ReadWrite,
    Create,
    Append,
}

impl UvMode {
    fn as_str(self) -> &'static str {
        match self {
            UvMode::ReadWrite => "old",
            UvMode::Create => "new",
            UvMode::Append => "append",
        }
    }
}

/// The kind of channels in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineType {
    None,
    Channel,
    Wide,
    Velocity,
    Felocity,
    Other(i32),
}

impl From<i32> for LineType {
    fn from(code: i32) -> LineType {
        match code {
            LINETYPE_NONE => LineType::None,
            LINETYPE_CHANNEL => LineType::Channel,
            LINETYPE_WIDE => LineType::Wide,
            LINETYPE_VELOCITY => LineType::Velocity,
            LINETYPE_FELOCITY => LineType::Felocity,
            other => LineType::Other(other),
        }
    }
}

/// The line selection in effect for the current record. Indices are
/// 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineInfo {
    pub linetype: LineType,
    pub nchan: i32,
    /// The first input channel.
    pub chan0: i32,
    /// The number of input channels averaged into each output channel.
    pub width: i32,
    /// The increment between selected input channels.
    pub step: i32,
    /// The first spectral window contributing, when resampling in velocity;
    /// -1 otherwise.
    pub win0: i32,
}

impl From<[f64; 6]> for LineInfo {
    fn from(raw: [f64; 6]) -> LineInfo {
        let int = |v: f64| v as i32;
        LineInfo {
            linetype: LineType::from(int(raw[0])),
            nchan: int(raw[1]),
            chan0: int(raw[2]) - 1,
            width: int(raw[3]),
            step: int(raw[4]),
            win0: int(raw[5]) - 1,
        }
    }
}

/// The `uvtrack` switches for a variable.
fn track_switches(watch: bool, copy: bool) -> &'static str {
    match (watch, copy) {
        (true, true) => "uc",
        (true, false) => "u",
        (false, true) => "c",
        (false, false) => "",
    }
}

/// An open visibility dataset.
#[derive(Debug)]
pub struct UvDataSet {
    handle: Handle,
    /// Channels returned by the most recent read.
    last_nread: Option<usize>,
}

impl UvDataSet {
    pub fn open<P: AsRef<Path>>(path: P, mode: UvMode) -> Result<UvDataSet, MiriadError> {
        let path = path.as_ref();
        let tno = uvio::uvopen(&path.display().to_string(), mode.as_str())?;
        Ok(UvDataSet {
            handle: Handle::new(tno, path, uvio::uvclose),
            last_nread: None,
        })
    }

    pub fn close(mut self) -> Result<(), MiriadError> {
        self.handle.shutdown()
    }

    pub fn flush(&mut self) -> Result<(), MiriadError> {
        uvio::uvflush(self.tno())
    }

    /// Skip to the next record. When writing, this ends the current record.
    pub fn next(&mut self) -> Result<(), MiriadError> {
        uvio::uvnext(self.tno())
    }

    pub fn rewind(&mut self) -> Result<(), MiriadError> {
        self.last_nread = None;
        uvio::uvrewind(self.tno())
    }

    /// Read the next record into the given buffers, up to `flags.len()`
    /// channels. Returns the number of channels read; 0 at the end of the
    /// data.
    pub fn read_into<S1, S2, S3>(
        &mut self,
        preamble: &mut ArrayBase<S1, Ix1>,
        data: &mut ArrayBase<S2, Ix1>,
        flags: &mut ArrayBase<S3, Ix1>,
    ) -> Result<usize, MiriadError>
    where
        S1: DataMut<Elem = f64>,
        S2: DataMut<Elem = c32>,
        S3: DataMut<Elem = i32>,
    {
        let n = flags.len();
        let nread = uvio::uvread(self.tno(), preamble, data, flags, n)?;
        self.last_nread = Some(nread);
        Ok(nread)
    }

    /// Write a record of `flags.len()` channels.
    pub fn write(
        &mut self,
        preamble: ArrayView1<f64>,
        data: ArrayView1<c32>,
        flags: ArrayView1<i32>,
    ) -> Result<(), MiriadError> {
        uvio::uvwrite(self.tno(), &preamble, &data, &flags, flags.len())
    }

    /// Replace the flags of the record just read.
    pub fn rewrite_flags(&mut self, flags: ArrayView1<i32>) -> Result<(), MiriadError> {
        let nread = self.last_nread.ok_or_else(|| MiriadError::InvalidArgument {
            function: "UvDataSet::rewrite_flags",
            reason: "no record has been read".to_string(),
        })?;
        if flags.len() < nread {
            debug!("{} flags given for a record of {nread} channels", flags.len());
            return Err(MiriadError::BadArrayShape {
                argument: "flags",
                function: "UvDataSet::rewrite_flags",
                expected: format!("at least {nread} elements"),
                received: format!("{} elements", flags.len()),
            });
        }
        // The length was checked against the last read.
        unsafe { uvio::uvflgwr(self.tno(), &flags) }
    }

    pub fn line_info(&self) -> Result<LineInfo, MiriadError> {
        Ok(LineInfo::from(uvio::uvinfo_line(self.tno())?))
    }

    /// The 0-based serial number of the current record.
    pub fn current_vis_num(&self) -> Result<i64, MiriadError> {
        Ok(uvio::uvinfo_visno(self.tno())? as i64 - 1)
    }

    /// Whether the baseline of the record just read is shadowed, given an
    /// antenna diameter in metres. Needs a selection including "shadow",
    /// e.g. "auto,or,-auto,or,shadow(1)", so that uvio recomputes UVWs.
    pub fn baseline_shadowed(&self, diameter_meters: f64) -> Result<bool, MiriadError> {
        uvio::uvchkshadow(self.tno(), diameter_meters)
    }

    /// Choose up to five preamble variables. "uv" and "uvw" expand to the
    /// coordinates.
    pub fn set_preamble(&mut self, vars: &[&str]) -> Result<(), MiriadError> {
        uvio::uvset(self.tno(), "preamble", &vars.iter().join("/"), 0, 0.0, 0.0, 0.0)
    }

    pub fn set_select_amplitude(&mut self, enable: bool) -> Result<(), MiriadError> {
        uvio::uvset(self.tno(), "selection", "amplitude", i32::from(enable), 0.0, 0.0, 0.0)
    }

    pub fn set_select_window(&mut self, enable: bool) -> Result<(), MiriadError> {
        uvio::uvset(self.tno(), "selection", "window", i32::from(enable), 0.0, 0.0, 0.0)
    }

    /// Reference parameters for planet scaling and rotation.
    pub fn set_select_planet(&mut self, major: f64, minor: f64, angle: f64) -> Result<(), MiriadError> {
        uvio::uvset(self.tno(), "planet", "", 0, major, minor, angle)
    }

    /// Return UV coordinates in wavelengths rather than nanoseconds.
    pub fn set_coord_units(&mut self, wavelength: bool) -> Result<(), MiriadError> {
        let units = if wavelength { "wavelength" } else { "nanosec" };
        uvio::uvset(self.tno(), "coord", units, 0, 0.0, 0.0, 0.0)
    }

    pub fn set_correlation_type(&mut self, corr_type: &str) -> Result<(), MiriadError> {
        uvio::uvset(self.tno(), "corr", corr_type, 0, 0.0, 0.0, 0.0)
    }

    /// Add a selection clause.
    pub fn select(&mut self, object: &str, p1: f64, p2: f64, include: bool) -> Result<(), MiriadError> {
        uvio::uvselect(self.tno(), object, p1, p2, include)
    }

    /// Copy variables that changed and are marked for copying.
    pub fn copy_marked_vars(&self, output: &mut UvDataSet) -> Result<(), MiriadError> {
        uvio::uvcopyvr(self.tno(), output.tno())
    }

    /// Whether any variable tracked with `watch` changed in the last read.
    pub fn updated(&self) -> Result<bool, MiriadError> {
        uvio::uvupdate(self.tno())
    }

    /// `None` if the variable is undefined.
    pub fn probe_var(&self, var: &str) -> Result<Option<VarProbe>, MiriadError> {
        let probe = uvio::uvprobvr(self.tno(), var)?;
        Ok(match probe.type_code {
            ' ' | '\0' => None,
            _ => Some(probe),
        })
    }

    /// The first value of a variable, whatever its type.
    pub fn get_var(&self, var: &str) -> Result<Option<Value>, MiriadError> {
        uvio::uvrdvr(self.tno(), var)
    }

    pub fn get_var_str(&self, var: &str) -> Result<String, MiriadError> {
        uvio::uvgetvra(self.tno(), var)
    }

    pub fn get_var_i32(&self, var: &str, n: usize) -> Result<Array1<i32>, MiriadError> {
        uvio::uvgetvri(self.tno(), var, n)
    }

    pub fn get_var_i16(&self, var: &str, n: usize) -> Result<Array1<i16>, MiriadError> {
        uvio::uvgetvrj(self.tno(), var, n)
    }

    pub fn get_var_f32(&self, var: &str, n: usize) -> Result<Array1<f32>, MiriadError> {
        uvio::uvgetvrr(self.tno(), var, n)
    }

    pub fn get_var_f64(&self, var: &str, n: usize) -> Result<Array1<f64>, MiriadError> {
        uvio::uvgetvrd(self.tno(), var, n)
    }

    pub fn get_var_c32(&self, var: &str, n: usize) -> Result<Array1<c32>, MiriadError> {
        uvio::uvgetvrc(self.tno(), var, n)
    }

    /// With `watch`, [`UvDataSet::updated`] reports changes to `var`; with
    /// `copy`, [`UvDataSet::copy_marked_vars`] copies it.
    pub fn track_var(&mut self, var: &str, watch: bool, copy: bool) -> Result<(), MiriadError> {
        uvio::uvtrack(self.tno(), var, track_switches(watch, copy))
    }

    /// Read until `var` changes. Returns false at the end of the data.
    pub fn scan_until_change(&mut self, var: &str) -> Result<bool, MiriadError> {
        self.last_nread = None;
        uvio::uvscan(self.tno(), var)
    }

    pub fn write_var_str(&mut self, var: &str, value: &str) -> Result<(), MiriadError> {
        uvio::uvputvra(self.tno(), var, value)
    }

    pub fn write_var_i32(&mut self, var: &str, values: &[i32]) -> Result<(), MiriadError> {
        uvio::uvputvri(self.tno(), var, &ArrayView1::from(values))
    }

    pub fn write_var_f32(&mut self, var: &str, values: &[f32]) -> Result<(), MiriadError> {
        uvio::uvputvrr(self.tno(), var, &ArrayView1::from(values))
    }

    pub fn write_var_f64(&mut self, var: &str, values: &[f64]) -> Result<(), MiriadError> {
        uvio::uvputvrd(self.tno(), var, &ArrayView1::from(values))
    }

    pub fn write_var_c32(&mut self, var: &str, values: &[c32]) -> Result<(), MiriadError> {
        uvio::uvputvrc(self.tno(), var, &ArrayView1::from(values))
    }

    /// Start a new group of tracked variables. The tracker doesn't borrow
    /// the dataset, so it can be checked between reads.
    pub fn var_tracker(&self) -> Result<UvVarTracker, MiriadError> {
        Ok(UvVarTracker {
            vhan: uvio::uvvarini(self.tno())?,
            tno: self.tno(),
        })
    }
}

impl DataSetOps for UvDataSet {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut Handle {
        &mut self.handle
    }
}

/// Tracks a set of UV variables, so they can be checked for changes and
/// copied as a group. Checks take the dataset the tracker was made from,
/// which must still be open.
#[derive(Debug)]
pub struct UvVarTracker {
    vhan: c_int,
    tno: c_int,
}

impl UvVarTracker {
    pub fn track(&mut self, vars: &[&str]) -> Result<&mut Self, MiriadError> {
        for var in vars {
            uvio::uvvarset(self.vhan, var)?;
        }
        Ok(self)
    }

    fn check_source(&self, source: &UvDataSet, function: &'static str) -> Result<(), MiriadError> {
        if source.tno() == self.tno {
            Ok(())
        } else {
            Err(MiriadError::InvalidArgument {
                function,
                reason: format!(
                    "tracker belongs to dataset handle {}, not {} ({})",
                    self.tno,
                    source.tno(),
                    source.path().display()
                ),
            })
        }
    }

    /// Copy the tracked variables of `source`'s last record to `output`.
    pub fn copy_to(&self, source: &UvDataSet, output: &mut UvDataSet) -> Result<(), MiriadError> {
        self.check_source(source, "UvVarTracker::copy_to")?;
        uvio::uvvarcpy(self.vhan, output.tno())
    }

    /// Whether any tracked variable changed in `source`'s last read.
    pub fn updated(&self, source: &UvDataSet) -> Result<bool, MiriadError> {
        self.check_source(source, "UvVarTracker::updated")?;
        uvio::uvvarupd(self.vhan)
    }
}
