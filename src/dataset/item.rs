// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{marker::PhantomData, os::raw::c_int};

use log::{trace, warn};
use ndarray::{Array1, ArrayBase, Data, DataMut, Ix1};

use super::ItemMode;
use crate::{
    constants::BUFSZ,
    io::{hio, ItemType, MiriadError},
};

/// An open item within a dataset. Offsets are in bytes.
#[derive(Debug)]
pub struct DataItem<'a> {
    ihandle: c_int,
    name: String,
    open: bool,
    _dataset: PhantomData<&'a ()>,
}

impl<'a> DataItem<'a> {
    pub(crate) fn open(tno: c_int, name: &str, mode: ItemMode) -> Result<DataItem<'a>, MiriadError> {
        let ihandle = hio::haccess(tno, name, mode.as_str())?;
        Ok(DataItem {
            ihandle,
            name: name.to_string(),
            open: true,
            _dataset: PhantomData,
        })
    }

    pub(crate) fn ihandle(&self) -> c_int {
        self.ihandle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The size of the item in bytes.
    pub fn size(&self) -> Result<i64, MiriadError> {
        hio::hsize(self.ihandle)
    }

    pub fn seek(&mut self, offset: i64) -> Result<(), MiriadError> {
        hio::hseek(self.ihandle, offset)
    }

    pub fn position(&self) -> Result<i64, MiriadError> {
        hio::htell(self.ihandle)
    }

    /// Read `n` elements starting at byte `offset`.
    pub fn read<T: ItemType>(&mut self, offset: i64, n: usize) -> Result<Array1<T>, MiriadError> {
        let mut buf = Array1::zeros(n);
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` with elements starting at byte `offset`.
    pub fn read_into<T, S>(&mut self, offset: i64, buf: &mut ArrayBase<S, Ix1>) -> Result<(), MiriadError>
    where
        T: ItemType,
        S: DataMut<Elem = T>,
    {
        let nbytes = buf.len() * T::EXTERNAL_SIZE;
        hio::hio_read(self.ihandle, buf, offset, nbytes)
    }

    /// Read `n` 16-bit integers starting at byte `offset`.
    pub fn read_shorts(&mut self, offset: i64, n: usize) -> Result<Array1<i16>, MiriadError> {
        let wide = i32::read_int2(self.ihandle, offset, n)?;
        Ok(wide.mapv(|v| v as i16))
    }

    /// Write `values` starting at byte `offset`.
    pub fn write<T, S>(&mut self, offset: i64, values: &ArrayBase<S, Ix1>) -> Result<(), MiriadError>
    where
        T: ItemType,
        S: Data<Elem = T>,
    {
        let nbytes = values.len() * T::EXTERNAL_SIZE;
        hio::hio_write(self.ihandle, values, offset, nbytes)
    }

    /// Write `values` as 16-bit integers starting at byte `offset`.
    pub fn write_shorts<S: Data<Elem = i16>>(
        &mut self,
        offset: i64,
        values: &ArrayBase<S, Ix1>,
    ) -> Result<(), MiriadError> {
        let wide = values.mapv(i32::from);
        hio::hio_write_int2(self.ihandle, &wide, offset, 2 * wide.len())
    }

    /// Read the next line of text, up to [`BUFSZ`] bytes. `None` at the end.
    pub fn read_line(&mut self) -> Result<Option<String>, MiriadError> {
        hio::hreada(self.ihandle, BUFSZ)
    }

    pub fn write_line(&mut self, line: &str) -> Result<(), MiriadError> {
        hio::hwritea(self.ihandle, line)
    }

    /// Read lines until the position reaches the size of the item.
    pub(crate) fn read_all_lines(&mut self) -> Result<Vec<String>, MiriadError> {
        let size = self.size()?;
        let mut lines = vec![];
        while self.position()? < size {
            match self.read_line()? {
                Some(line) => lines.push(line),
                None => break,
            }
        }
        Ok(lines)
    }

    pub fn close(mut self) -> Result<(), MiriadError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), MiriadError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        trace!("closing item {}", self.name);
        hio::hdaccess(self.ihandle)
    }
}

impl Drop for DataItem<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to close MIRIAD item {}: {e}", self.name);
        }
    }
}
