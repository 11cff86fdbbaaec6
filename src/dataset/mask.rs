// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::marker::PhantomData;

use log::warn;
use ndarray::{ArrayBase, Data, DataMut, Ix1};

use super::DataSetOps;
use crate::io::{
    maskio::{self, MaskHandle, MaskMode},
    MiriadError,
};

/// How to open a mask item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskAccess {
    ReadWrite,
    Create,
}

impl MaskAccess {
    fn as_str(self) -> &'static str {
        match self {
            MaskAccess::ReadWrite => "old",
            MaskAccess::Create => "new",
        }
    }
}

/// A flag mask stored as an item of a dataset. Offsets and counts are in
/// flags.
#[derive(Debug)]
pub struct MaskItem<'a> {
    handle: Option<MaskHandle>,
    name: String,
    _dataset: PhantomData<&'a ()>,
}

impl<'a> MaskItem<'a> {
    pub fn open<D: DataSetOps>(
        dataset: &'a D,
        name: &str,
        access: MaskAccess,
    ) -> Result<MaskItem<'a>, MiriadError> {
        let handle = maskio::mkopen(dataset.tno(), name, access.as_str())?;
        Ok(MaskItem {
            handle: Some(handle),
            name: name.to_string(),
            _dataset: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> Result<&MaskHandle, MiriadError> {
        self.handle.as_ref().ok_or_else(|| MiriadError::InvalidArgument {
            function: "MaskItem",
            reason: format!("mask {} is closed", self.name),
        })
    }

    /// Read `n` flags starting at `offset`. Returns how many elements of
    /// `flags` were filled in; with [`MaskMode::Runs`] that is the length of
    /// the run list.
    pub fn read<S: DataMut<Elem = i32>>(
        &mut self,
        mode: MaskMode,
        flags: &mut ArrayBase<S, Ix1>,
        offset: i64,
        n: usize,
    ) -> Result<usize, MiriadError> {
        maskio::mkread(self.handle()?, mode, flags, offset, n)
    }

    pub fn write<S: Data<Elem = i32>>(
        &mut self,
        mode: MaskMode,
        flags: &ArrayBase<S, Ix1>,
        offset: i64,
        n: usize,
    ) -> Result<(), MiriadError> {
        maskio::mkwrite(self.handle()?, mode, flags, offset, n)
    }

    pub fn flush(&mut self) -> Result<(), MiriadError> {
        maskio::mkflush(self.handle()?)
    }

    pub fn close(mut self) -> Result<(), MiriadError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), MiriadError> {
        match self.handle.take() {
            Some(handle) => maskio::mkclose(handle),
            None => Ok(()),
        }
    }
}

impl Drop for MaskItem<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to close MIRIAD mask {}: {e}", self.name);
        }
    }
}
