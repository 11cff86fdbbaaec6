// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Owning handles to open MIRIAD datasets.
//!
//! Every dataset type implements [`DataSetOps`], which covers what MIRIAD
//! lets you do with any dataset handle: items, history and header
//! variables. Handles are closed with `close(self)`; dropping an open handle
//! closes it too, logging any failure.

mod gains;
mod item;
mod mask;
mod mostable;
mod uv;
mod xy;
mod xyz;

use std::{
    fs::File,
    io::{BufRead, BufReader},
    os::raw::c_int,
    path::{Path, PathBuf},
};

use log::{trace, warn};
use ndarray::{Array1, ArrayBase, Data, Ix1};

pub use gains::{GainsLayout, GainsReader};
pub use item::DataItem;
pub use mask::{MaskAccess, MaskItem};
pub use mostable::{MosaicLayout, MosaicTable};
pub use uv::{LineInfo, LineType, UvDataSet, UvMode, UvVarTracker};
pub use xy::{XyDataSet, XyMode};
pub use xyz::XyzDataSet;

use crate::{
    c32,
    constants::{H_CMPLX, H_DBLE, H_INT, H_INT8, H_REAL, ITEM_HDR_SIZE},
    io::{
        headio::{self, HeaderProbe, ItemKind},
        hio, HeaderItemError, ItemType, MiriadError, Value,
    },
    util::history_date_now,
};

/// How a dataset was opened, as reported by `hmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Unknown,
    Read,
    ReadWrite,
}

impl AccessMode {
    fn from_hmode(mode: &str) -> Result<AccessMode, MiriadError> {
        match mode {
            "" => Ok(AccessMode::Unknown),
            "r" => Ok(AccessMode::Read),
            "rw" => Ok(AccessMode::ReadWrite),
            other => Err(MiriadError::InvalidArgument {
                function: "hmode",
                reason: format!("unknown hio mode type '{other}'"),
            }),
        }
    }
}

/// How to open an item within a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemMode {
    Read,
    /// Truncate and write.
    Write,
    Append,
    /// A temporary item, deleted when closed.
    Scratch,
}

impl ItemMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ItemMode::Read => "read",
            ItemMode::Write => "write",
            ItemMode::Append => "append",
            ItemMode::Scratch => "scratch",
        }
    }
}

/// How to open a dataset's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryMode {
    Read,
    /// Truncate and write.
    Write,
    #[default]
    Append,
}

impl HistoryMode {
    fn as_str(self) -> &'static str {
        match self {
            HistoryMode::Read => "read",
            HistoryMode::Write => "write",
            HistoryMode::Append => "append",
        }
    }
}

/// How to open a generic dataset with [`DataSet::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetMode {
    Old,
    New,
    Append,
}

impl DataSetMode {
    fn as_str(self) -> &'static str {
        match self {
            DataSetMode::Old => "old",
            DataSetMode::New => "new",
            DataSetMode::Append => "append",
        }
    }
}

/// The state shared by every kind of open dataset: the MIRIAD handle, where
/// it lives, and whether its history is open. Closes itself when dropped.
#[derive(Debug)]
pub struct Handle {
    tno: c_int,
    path: PathBuf,
    open: bool,
    history_open: bool,
    closer: fn(c_int) -> Result<(), MiriadError>,
}

impl Handle {
    pub(crate) fn new(
        tno: c_int,
        path: &Path,
        closer: fn(c_int) -> Result<(), MiriadError>,
    ) -> Handle {
        Handle {
            tno,
            path: path.to_path_buf(),
            open: true,
            history_open: false,
            closer,
        }
    }

    pub fn tno(&self) -> c_int {
        self.tno
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the history (if open) and then the dataset. Does nothing the
    /// second time.
    pub(crate) fn shutdown(&mut self) -> Result<(), MiriadError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let history = if self.history_open {
            self.history_open = false;
            headio::hisclose(self.tno)
        } else {
            Ok(())
        };
        let closed = (self.closer)(self.tno);
        history?;
        closed
    }

    /// The dataset is already gone (e.g. after `hrm`).
    pub(crate) fn forget(&mut self) {
        self.open = false;
        self.history_open = false;
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Failed to close MIRIAD dataset {}: {e}", self.path.display());
        }
    }
}

/// Where the elements of an array-valued header item live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArrayLayout {
    /// Number of elements.
    pub(crate) n: usize,
    /// Byte offset of the first element.
    pub(crate) offset: i64,
    /// The item holds 16-bit integers to be read into an `int` buffer.
    pub(crate) int2: bool,
}

/// Work out how to read the header item described by `probe` into `T`s.
pub(crate) fn array_layout<T: ItemType>(
    item: &str,
    probe: &HeaderProbe,
) -> Result<ArrayLayout, MiriadError> {
    let fail = |reason| MiriadError::HeaderItem {
        item: item.to_string(),
        reason,
    };
    let wrong_type = || {
        fail(HeaderItemError::WrongType {
            found: probe.kind.as_str(),
            wanted: std::any::type_name::<T>(),
        })
    };
    let count = usize::try_from(probe.count).map_err(|_| fail(HeaderItemError::UnknownSize))?;

    match probe.kind {
        ItemKind::Nonexistent => Err(fail(HeaderItemError::Missing)),
        ItemKind::Unknown => Err(fail(HeaderItemError::NotWellDefined)),
        ItemKind::Character => Err(wrong_type()),
        // hdprobe counts the item header in the size of these.
        ItemKind::Text | ItemKind::Binary => {
            if T::EXTERNAL_SIZE != 1 {
                return Err(wrong_type());
            }
            let offset = if probe.kind == ItemKind::Text {
                0
            } else {
                ITEM_HDR_SIZE as i64
            };
            Ok(ArrayLayout {
                n: count.saturating_sub(ITEM_HDR_SIZE),
                offset,
                int2: false,
            })
        }
        ItemKind::Int2 => {
            if T::TYPE_CODE != H_INT {
                return Err(wrong_type());
            }
            Ok(ArrayLayout {
                n: count,
                offset: ITEM_HDR_SIZE as i64,
                int2: true,
            })
        }
        kind => {
            let matches = matches!(
                (kind, T::TYPE_CODE),
                (ItemKind::Int, H_INT)
                    | (ItemKind::Int8, H_INT8)
                    | (ItemKind::Real, H_REAL)
                    | (ItemKind::Double, H_DBLE)
                    | (ItemKind::Complex, H_CMPLX)
            );
            if !matches {
                return Err(wrong_type());
            }
            Ok(ArrayLayout {
                n: count,
                offset: array_offset::<T>(),
                int2: false,
            })
        }
    }
}

/// Array header data starts after the item header, aligned to the element
/// size.
pub(crate) fn array_offset<T: ItemType>() -> i64 {
    ITEM_HDR_SIZE.max(T::EXTERNAL_SIZE) as i64
}

/// The history lines recorded for a task invocation. `-f <file>` arguments
/// are replaced by the file's lines.
pub(crate) fn invocation_lines<S, F>(
    identity: &str,
    date: &str,
    args: &[S],
    mut read_file: F,
) -> std::io::Result<Vec<String>>
where
    S: AsRef<str>,
    F: FnMut(&str) -> std::io::Result<Vec<String>>,
{
    let prefix = format!("{identity}: ");
    let mut lines = vec![
        format!("{prefix}Executed on: {date}"),
        format!("{prefix}Command line inputs follow:"),
    ];
    let prefix = format!("{prefix}  ");
    let mut args = args.iter().map(AsRef::as_ref);
    while let Some(arg) = args.next() {
        if arg == "-f" {
            if let Some(file) = args.next() {
                for line in read_file(file)? {
                    lines.push(format!("{prefix}{line}"));
                }
            }
        } else {
            lines.push(format!("{prefix}{arg}"));
        }
    }
    Ok(lines)
}

fn read_lines(path: &str) -> std::io::Result<Vec<String>> {
    BufReader::new(File::open(path)?).lines().collect()
}

/// Operations shared by every kind of dataset.
pub trait DataSetOps {
    fn handle(&self) -> &Handle;

    fn handle_mut(&mut self) -> &mut Handle;

    /// The raw MIRIAD handle, for use with [`crate::io`].
    fn tno(&self) -> c_int {
        self.handle().tno()
    }

    fn path(&self) -> &Path {
        self.handle().path()
    }

    fn mode(&self) -> Result<AccessMode, MiriadError> {
        AccessMode::from_hmode(&hio::hmode(self.tno())?)
    }

    fn has_item(&self, name: &str) -> Result<bool, MiriadError> {
        hio::hexists(self.tno(), name)
    }

    fn delete_item(&mut self, name: &str) -> Result<(), MiriadError> {
        hio::hdelete(self.tno(), name)
    }

    /// Open an item. The directory listing "." is read with
    /// [`DataSetOps::item_names`] instead.
    fn item(&self, name: &str, mode: ItemMode) -> Result<DataItem<'_>, MiriadError> {
        if name == "." {
            return Err(MiriadError::InvalidArgument {
                function: "DataSetOps::item",
                reason: "use item_names() to list items".to_string(),
            });
        }
        DataItem::open(self.tno(), name, mode)
    }

    /// The names of every item in the dataset.
    fn item_names(&self) -> Result<Vec<String>, MiriadError> {
        let mut listing = DataItem::open(self.tno(), ".", ItemMode::Read)?;
        let names = listing.read_all_lines();
        let closed = listing.close();
        let names = names?;
        closed?;
        Ok(names)
    }

    fn open_history(&mut self, mode: HistoryMode) -> Result<(), MiriadError> {
        headio::hisopen(self.tno(), mode.as_str())?;
        self.handle_mut().history_open = true;
        Ok(())
    }

    fn write_history(&mut self, text: &str) -> Result<(), MiriadError> {
        headio::hiswrite(self.tno(), text)
    }

    /// Record a task invocation in the history, the way MIRIAD's `hisinput`
    /// does: the date, then one line per argument, each prefixed with
    /// `identity`. `args` should not include the program name.
    fn log_invocation<S: AsRef<str>>(&mut self, identity: &str, args: &[S]) -> Result<(), MiriadError>
    where
        Self: Sized,
    {
        let lines = invocation_lines(identity, &history_date_now(), args, read_lines)?;
        for line in &lines {
            self.write_history(line)?;
        }
        Ok(())
    }

    fn close_history(&mut self) -> Result<(), MiriadError> {
        headio::hisclose(self.tno())?;
        self.handle_mut().history_open = false;
        Ok(())
    }

    /// Read any single-valued header variable. `None` if it doesn't exist.
    fn header_value(&self, item: &str) -> Result<Option<Value>, MiriadError> {
        headio::rdhd(self.tno(), item)
    }

    fn write_header(&mut self, item: &str, value: &Value) -> Result<(), MiriadError> {
        headio::wrhd(self.tno(), item, value)
    }

    fn header_f32_or(&self, item: &str, default: f32) -> Result<f32, MiriadError> {
        headio::rdhdr(self.tno(), item, default)
    }

    fn header_i32_or(&self, item: &str, default: i32) -> Result<i32, MiriadError> {
        headio::rdhdi(self.tno(), item, default)
    }

    fn header_i64_or(&self, item: &str, default: i64) -> Result<i64, MiriadError> {
        headio::rdhdl(self.tno(), item, default)
    }

    fn header_f64_or(&self, item: &str, default: f64) -> Result<f64, MiriadError> {
        headio::rdhdd(self.tno(), item, default)
    }

    fn header_c32_or(&self, item: &str, default: c32) -> Result<c32, MiriadError> {
        headio::rdhdc(self.tno(), item, default)
    }

    fn header_str_or(&self, item: &str, default: &str) -> Result<String, MiriadError> {
        headio::rdhda(self.tno(), item, default)
    }

    /// Copy a header item into another dataset.
    fn copy_header<D: DataSetOps>(&self, dest: &mut D, item: &str) -> Result<(), MiriadError>
    where
        Self: Sized,
    {
        headio::hdcopy(self.tno(), dest.tno(), item)
    }

    /// Describe a header item. Fails if MIRIAD can't tell its size.
    fn header_info(&self, item: &str) -> Result<HeaderProbe, MiriadError> {
        let probe = headio::hdprobe(self.tno(), item)?;
        headio::check_probe(item, &probe)?;
        Ok(probe)
    }

    /// Read an array-valued header item.
    fn read_array_header<T: ItemType>(&self, item: &str) -> Result<Array1<T>, MiriadError>
    where
        Self: Sized,
    {
        let probe = self.header_info(item)?;
        let layout = array_layout::<T>(item, &probe)?;
        trace!("reading {} elements of {item} at offset {}", layout.n, layout.offset);
        let mut di = self.item(item, ItemMode::Read)?;
        let values = if layout.int2 {
            T::read_int2(di.ihandle(), layout.offset, layout.n)
        } else {
            di.read::<T>(layout.offset, layout.n)
        };
        let closed = di.close();
        let values = values?;
        closed?;
        Ok(values)
    }

    /// Read a character or text header item as a string.
    fn read_text_header(&self, item: &str) -> Result<String, MiriadError>
    where
        Self: Sized,
    {
        let probe = self.header_info(item)?;
        if probe.kind == ItemKind::Character {
            return Ok(probe.description);
        }
        let bytes = self.read_array_header::<u8>(item)?;
        Ok(String::from_utf8_lossy(&bytes.to_vec()).into_owned())
    }

    /// Write an array-valued header item.
    fn write_array_header<T, S>(&mut self, item: &str, values: &ArrayBase<S, Ix1>) -> Result<(), MiriadError>
    where
        Self: Sized,
        T: ItemType + Into<Value>,
        S: Data<Elem = T>,
    {
        // Writing a scalar first gets MIRIAD to lay down the item header.
        self.write_header(item, &T::zero().into())?;
        let mut di = self.item(item, ItemMode::Append)?;
        let written = di.write(array_offset::<T>(), values);
        let closed = di.close();
        written?;
        closed
    }
}

/// A dataset opened with plain hio, e.g. a calibration table or a dataset
/// whose type doesn't matter.
#[derive(Debug)]
pub struct DataSet {
    handle: Handle,
}

impl DataSet {
    pub fn open<P: AsRef<Path>>(path: P, mode: DataSetMode) -> Result<DataSet, MiriadError> {
        let path = path.as_ref();
        let tno = hio::hopen(&path.display().to_string(), mode.as_str())?;
        Ok(DataSet {
            handle: Handle::new(tno, path, hio::hclose),
        })
    }

    pub fn flush(&mut self) -> Result<(), MiriadError> {
        hio::hflush(self.tno())
    }

    pub fn close(mut self) -> Result<(), MiriadError> {
        self.handle.shutdown()
    }

    /// Delete the dataset from disk.
    pub fn delete_all(mut self) -> Result<(), MiriadError> {
        let tno = self.tno();
        self.handle.forget();
        hio::hrm(tno)
    }
}

impl DataSetOps for DataSet {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut Handle {
        &mut self.handle
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn probe(kind: ItemKind, count: i32) -> HeaderProbe {
        HeaderProbe {
            description: String::new(),
            kind,
            count,
        }
    }

    #[test]
    fn test_access_mode() {
        assert_eq!(AccessMode::from_hmode("").unwrap(), AccessMode::Unknown);
        assert_eq!(AccessMode::from_hmode("r").unwrap(), AccessMode::Read);
        assert_eq!(AccessMode::from_hmode("rw").unwrap(), AccessMode::ReadWrite);
        assert!(AccessMode::from_hmode("w").is_err());
    }

    #[test]
    fn test_mode_strings() {
        assert_eq!(ItemMode::Scratch.as_str(), "scratch");
        assert_eq!(HistoryMode::default().as_str(), "append");
        assert_eq!(DataSetMode::Old.as_str(), "old");
    }

    #[test]
    fn test_array_offsets() {
        assert_eq!(array_offset::<i32>(), 4);
        assert_eq!(array_offset::<f32>(), 4);
        assert_eq!(array_offset::<f64>(), 8);
        assert_eq!(array_offset::<i64>(), 8);
        assert_eq!(array_offset::<c32>(), 8);
        assert_eq!(array_offset::<u8>(), 4);
    }

    #[test]
    fn test_array_layout_numeric() {
        let layout = array_layout::<f64>("restfreq", &probe(ItemKind::Double, 3)).unwrap();
        assert_eq!(
            layout,
            ArrayLayout {
                n: 3,
                offset: 8,
                int2: false
            }
        );
        let layout = array_layout::<i32>("nschan", &probe(ItemKind::Int2, 2)).unwrap();
        assert_eq!(
            layout,
            ArrayLayout {
                n: 2,
                offset: 4,
                int2: true
            }
        );
    }

    #[test]
    fn test_array_layout_text_and_binary() {
        let text = array_layout::<u8>("history", &probe(ItemKind::Text, 104)).unwrap();
        assert_eq!((text.n, text.offset), (100, 0));
        let bin = array_layout::<u8>("blob", &probe(ItemKind::Binary, 20)).unwrap();
        assert_eq!((bin.n, bin.offset), (16, 4));
    }

    #[test]
    fn test_array_layout_errors() {
        let reason = |r: Result<ArrayLayout, MiriadError>| match r {
            Err(MiriadError::HeaderItem { reason, .. }) => reason,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(
            reason(array_layout::<f32>("x", &probe(ItemKind::Nonexistent, 1))),
            HeaderItemError::Missing
        );
        assert_eq!(
            reason(array_layout::<f32>("x", &probe(ItemKind::Unknown, 1))),
            HeaderItemError::NotWellDefined
        );
        assert!(matches!(
            reason(array_layout::<f32>("x", &probe(ItemKind::Double, 2))),
            HeaderItemError::WrongType {
                found: "double",
                ..
            }
        ));
        assert!(matches!(
            reason(array_layout::<f64>("x", &probe(ItemKind::Text, 10))),
            HeaderItemError::WrongType { .. }
        ));
        assert!(matches!(
            reason(array_layout::<f32>("x", &probe(ItemKind::Int2, 2))),
            HeaderItemError::WrongType { .. }
        ));
    }

    #[test]
    fn test_invocation_lines() {
        let lines = invocation_lines(
            "UVCAT",
            "21NOV03:00:00:07.0",
            &["vis=in.uv", "out=out.uv"],
            |_| unreachable!(),
        )
        .unwrap();
        assert_eq!(
            lines,
            vec![
                "UVCAT: Executed on: 21NOV03:00:00:07.0",
                "UVCAT: Command line inputs follow:",
                "UVCAT:   vis=in.uv",
                "UVCAT:   out=out.uv",
            ]
        );
    }

    #[test]
    fn test_invocation_lines_expand_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "select=ant(1)").unwrap();
        writeln!(file, "line=chan,10").unwrap();
        let path = file.path().display().to_string();

        let args = vec!["vis=a.uv".to_string(), "-f".to_string(), path, "-f".to_string()];
        let lines = invocation_lines("me", "d", &args, read_lines).unwrap();
        assert_eq!(
            &lines[2..],
            &["me:   vis=a.uv", "me:   select=ant(1)", "me:   line=chan,10"]
        );

        let args = ["-f", "/nonexistent/miriad/args"];
        assert!(invocation_lines("me", "d", &args, read_lines).is_err());
    }

    #[test]
    fn test_handle_shutdown_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static CLOSED: AtomicUsize = AtomicUsize::new(0);
        fn closer(_tno: c_int) -> Result<(), MiriadError> {
            CLOSED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        let mut handle = Handle::new(3, Path::new("vis.uv"), closer);
        handle.shutdown().unwrap();
        handle.shutdown().unwrap();
        drop(handle);
        assert_eq!(CLOSED.load(Ordering::SeqCst), 1);

        let mut handle = Handle::new(4, Path::new("gone.uv"), closer);
        handle.forget();
        drop(handle);
        assert_eq!(CLOSED.load(Ordering::SeqCst), 1);
    }
}
