// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! MIRIAD datasets as directories on disk.
//!
//! [`Data`] refers to a dataset by path, whether or not it exists yet.
//! [`VisData`], [`ImData`] and [`CalData`] add what is specific to
//! visibility, image and calibration datasets.

use std::{
    fmt,
    fs::{self, File},
    io::{Read, Seek, SeekFrom},
    ops::Deref,
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

use log::{info, trace, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
    constants::HASH_TAIL_BYTES,
    dataset::{DataSet, DataSetMode, UvDataSet, UvMode, XyDataSet, XyMode},
    io::MiriadError,
    task::{MiriadEnv, Task, TaskError},
};

/// Items hashed, by name and content, when present in visibility and
/// calibration datasets.
const OPTIONAL_HASH_ITEMS: [&str; 5] = ["flags", "wflags", "gains", "leakage", "bandpass"];

#[derive(Error, Debug)]
pub enum DataError {
    #[error("dataset {0} does not exist")]
    Missing(PathBuf),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Miriad(#[from] MiriadError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DataError + '_ {
    move |source| DataError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn with_params(task: Task, params: &[(&str, &str)]) -> Task {
    params
        .iter()
        .fold(task, |task, (key, value)| task.param(key, value))
}

/// A reference to a MIRIAD dataset on disk. Two `Data` are equal when
/// their real paths are.
#[derive(Debug, Clone)]
pub struct Data {
    base: PathBuf,
}

impl Data {
    pub fn new<P: Into<PathBuf>>(base: P) -> Data {
        Data { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The path of an item within the dataset.
    pub fn path<P: AsRef<Path>>(&self, item: P) -> PathBuf {
        self.base.join(item)
    }

    pub fn exists(&self) -> bool {
        self.base.exists()
    }

    pub fn check_exists(&self) -> Result<(), DataError> {
        if self.exists() {
            Ok(())
        } else {
            Err(DataError::Missing(self.base.clone()))
        }
    }

    pub fn real_path(&self) -> Result<PathBuf, DataError> {
        self.base.canonicalize().map_err(io_error(&self.base))
    }

    /// When the dataset's history was last modified. MIRIAD tasks always
    /// append to the history, so this tracks changes to the dataset.
    pub fn mtime(&self) -> Result<SystemTime, DataError> {
        let history = self.path("history");
        fs::metadata(&history)
            .and_then(|m| m.modified())
            .map_err(io_error(&history))
    }

    /// Like [`Data::mtime`], but the Unix epoch if the dataset doesn't
    /// exist.
    pub fn umtime(&self) -> Result<SystemTime, DataError> {
        match self.mtime() {
            Err(DataError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(SystemTime::UNIX_EPOCH)
            }
            other => other,
        }
    }

    /// Rename the dataset. This can't cross filesystems.
    pub fn move_to<P: Into<PathBuf>>(&mut self, dest: P) -> Result<&mut Data, DataError> {
        self.check_exists()?;
        let dest = dest.into();
        info!("[rename] from={} to={}", self.base.display(), dest.display());
        fs::rename(&self.base, &dest).map_err(io_error(&self.base))?;
        self.base = dest;
        Ok(self)
    }

    /// Copy the dataset, recursively, to `dest`.
    pub fn copy_to<P: Into<PathBuf>>(&self, dest: P) -> Result<Data, DataError> {
        self.check_exists()?;
        let dest = dest.into();
        info!("[copy] from={} to={}", self.base.display(), dest.display());
        copy_dir(&self.base, &dest)?;
        Ok(Data::new(dest))
    }

    /// Delete the dataset if it exists. If the dataset path is a symbolic
    /// link, only the link is removed.
    pub fn delete(&self) -> Result<(), DataError> {
        let meta = match fs::symlink_metadata(&self.base) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error(&self.base)(e)),
        };
        info!("[delete] in={}", self.base.display());
        if meta.file_type().is_symlink() || !meta.is_dir() {
            fs::remove_file(&self.base).map_err(io_error(&self.base))
        } else {
            fs::remove_dir_all(&self.base).map_err(io_error(&self.base))
        }
    }

    /// A dataset named `{self}.{kind}`.
    pub fn make_variant(&self, kind: &str) -> Data {
        let mut name = self.base.clone().into_os_string();
        name.push(".");
        name.push(kind);
        Data::new(name)
    }

    pub fn vis_variant(&self, kind: &str) -> VisData {
        VisData(self.make_variant(kind))
    }

    pub fn im_variant(&self, kind: &str) -> ImData {
        ImData(self.make_variant(kind))
    }

    /// Open the dataset with hio. Visibilities and images should be opened
    /// through [`VisData::open`] and [`ImData::open`].
    pub fn open(&self, mode: DataSetMode) -> Result<DataSet, DataError> {
        Ok(DataSet::open(&self.base, mode)?)
    }

    /// Set `keyword` of `task` to this dataset.
    pub fn apply(&self, task: Task, keyword: &str) -> Task {
        task.param(keyword, self)
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base.display())
    }
}

impl PartialEq for Data {
    fn eq(&self, other: &Data) -> bool {
        match (self.real_path(), other.real_path()) {
            (Ok(a), Ok(b)) => a == b,
            _ => self.base == other.base,
        }
    }
}

macro_rules! data_kind {
    ($(#[$meta:meta])* $name:ident, $keyword:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name(Data);

        impl $name {
            pub fn new<P: Into<PathBuf>>(base: P) -> $name {
                $name(Data::new(base))
            }

            #[doc = concat!("Set the `", $keyword, "` keyword of `task` to this dataset.")]
            pub fn apply(&self, task: Task) -> Task {
                self.0.apply(task, $keyword)
            }

            /// Compute the hex SHA-256 of [`Self::update_hash`].
            pub fn quick_hash(&self) -> Result<String, DataError> {
                let mut hasher = Sha256::new();
                self.update_hash(&mut hasher)?;
                Ok(format!("{:x}", hasher.finalize()))
            }
        }

        impl Deref for $name {
            type Target = Data;

            fn deref(&self) -> &Data {
                &self.0
            }
        }

        impl From<Data> for $name {
            fn from(data: Data) -> $name {
                $name(data)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

data_kind!(
    /// A visibility dataset.
    VisData,
    "vis"
);
data_kind!(
    /// An image dataset.
    ImData,
    "in"
);
data_kind!(
    /// A calibration tables dataset.
    CalData,
    "vis"
);

impl VisData {
    pub fn open(&self, mode: UvMode) -> Result<UvDataSet, DataError> {
        Ok(UvDataSet::open(self.base(), mode)?)
    }

    /// Feed a digest with a representative sample of the dataset: all of
    /// "vartable" and "header", the end of "visdata", and the name and end
    /// of each of the optional calibration items. The history is left out,
    /// as it holds timestamps.
    pub fn update_hash<D: Digest>(&self, hasher: &mut D) -> Result<(), DataError> {
        hash_file(hasher, &self.path("vartable"), None)?;
        hash_file(hasher, &self.path("header"), None)?;
        hash_optional(hasher, &self.path("visdata"), Some(HASH_TAIL_BYTES))?;
        for item in OPTIONAL_HASH_ITEMS {
            let path = self.path(item);
            if path.exists() {
                hasher.update(item);
                hash_optional(hasher, &path, Some(HASH_TAIL_BYTES))?;
            }
        }
        Ok(())
    }

    /// Make a lightweight copy at `dest`: every regular item is copied
    /// except "visdata", which is symlinked back to this dataset. The link
    /// is relative when both paths are relative and `forceabs` is false.
    /// Items named in `skip` are left out. Any existing `dest` is deleted
    /// first; a failed copy is cleaned up.
    pub fn lwcp_to<P: Into<PathBuf>>(
        &self,
        dest: P,
        skip: &[&str],
        forceabs: bool,
    ) -> Result<VisData, DataError> {
        self.check_exists()?;
        let dest = VisData::new(dest);
        let relative = if forceabs || self.base().is_absolute() || dest.base().is_absolute() {
            None
        } else {
            relative_path(self.base(), dest.base())
        };
        let source = match relative {
            Some(rel) => rel,
            None => self.real_path()?,
        };

        dest.delete()?;
        match self.populate_lwcp(&dest, &source, skip) {
            Ok(()) => {
                info!("[lwcp] vis={self} out={dest}");
                Ok(dest)
            }
            Err(e) => {
                if let Err(cleanup) = dest.delete() {
                    warn!("Failed to remove partial copy {dest}: {cleanup}");
                }
                Err(e)
            }
        }
    }

    fn populate_lwcp(&self, dest: &VisData, source: &Path, skip: &[&str]) -> Result<(), DataError> {
        fs::create_dir(dest.base()).map_err(io_error(dest.base()))?;
        for entry in fs::read_dir(self.base()).map_err(io_error(self.base()))? {
            let entry = entry.map_err(io_error(self.base()))?;
            let name = entry.file_name();
            let target = dest.path(&name);
            if skip.iter().any(|s| name == *s) {
                trace!("skipping {}", entry.path().display());
            } else if name == "visdata" {
                symlink(&source.join(&name), &target)?;
            } else if entry.path().is_file() {
                trace!("copying {}", entry.path().display());
                fs::copy(entry.path(), &target).map_err(io_error(&target))?;
            }
        }
        Ok(())
    }

    /// The `uvcat` task copying this dataset to `dest`, with any extra
    /// keywords in `params`.
    pub fn cat_task(&self, dest: &Data, params: &[(&str, &str)]) -> Result<Task, DataError> {
        self.check_exists()?;
        let task = self.apply(Task::new("uvcat")).param("out", dest);
        Ok(with_params(task, params))
    }

    /// Run `uvcat vis={self} out={dest} {params...}`.
    pub fn cat_to(&self, dest: &Data, params: &[(&str, &str)], env: &MiriadEnv) -> Result<(), DataError> {
        Ok(self.cat_task(dest, params)?.run(env)?)
    }

    /// The `uvaver` task averaging this dataset into `dest` over
    /// `interval` minutes.
    pub fn aver_task(&self, dest: &Data, interval: f64, params: &[(&str, &str)]) -> Result<Task, DataError> {
        self.check_exists()?;
        let task = self
            .apply(Task::new("uvaver"))
            .param("out", dest)
            .param("interval", interval);
        Ok(with_params(task, params))
    }

    /// Run `uvaver vis={self} out={dest} interval={interval} {params...}`.
    pub fn aver_to(
        &self,
        dest: &Data,
        interval: f64,
        params: &[(&str, &str)],
        env: &MiriadEnv,
    ) -> Result<(), DataError> {
        Ok(self.aver_task(dest, interval, params)?.run(env)?)
    }
}

impl ImData {
    pub fn open(&self, mode: XyMode, naxis: usize, axes: Option<&[i32]>) -> Result<XyDataSet, DataError> {
        Ok(XyDataSet::open(self.base(), mode, naxis, axes)?)
    }

    /// Feed a digest with all of "header" and "image".
    pub fn update_hash<D: Digest>(&self, hasher: &mut D) -> Result<(), DataError> {
        hash_optional(hasher, &self.path("header"), None)?;
        hash_optional(hasher, &self.path("image"), None)?;
        Ok(())
    }
}

impl CalData {
    /// Feed a digest with all of "header", and the name and contents of
    /// each calibration item present.
    pub fn update_hash<D: Digest>(&self, hasher: &mut D) -> Result<(), DataError> {
        hash_file(hasher, &self.path("header"), None)?;
        for item in OPTIONAL_HASH_ITEMS {
            let path = self.path(item);
            if path.exists() {
                hasher.update(item);
                hash_file(hasher, &path, None)?;
            }
        }
        Ok(())
    }
}

/// Hash a file, or only its last `tail` bytes.
fn hash_file<D: Digest>(hasher: &mut D, path: &Path, tail: Option<u64>) -> Result<(), DataError> {
    let mut file = File::open(path).map_err(io_error(path))?;
    hash_open_file(hasher, &mut file, tail).map_err(io_error(path))
}

/// Like [`hash_file`], but a missing file hashes nothing.
fn hash_optional<D: Digest>(hasher: &mut D, path: &Path, tail: Option<u64>) -> Result<(), DataError> {
    match File::open(path) {
        Ok(mut file) => hash_open_file(hasher, &mut file, tail).map_err(io_error(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(path)(e)),
    }
}

fn hash_open_file<D: Digest>(hasher: &mut D, file: &mut File, tail: Option<u64>) -> std::io::Result<()> {
    if let Some(tail) = tail {
        let size = file.metadata()?.len();
        if size > tail {
            file.seek(SeekFrom::End(-(tail as i64)))?;
        }
    }
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(())
}

fn copy_dir(src: &Path, dest: &Path) -> Result<(), DataError> {
    fs::create_dir(dest).map_err(io_error(dest))?;
    for entry in fs::read_dir(src).map_err(io_error(src))? {
        let entry = entry.map_err(io_error(src))?;
        let target = dest.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(io_error(&target))?;
        }
    }
    Ok(())
}

/// `target` relative to the directory `base`, for two relative paths.
/// `None` if `base` climbs out of the common prefix with "..".
fn relative_path(target: &Path, base: &Path) -> Option<PathBuf> {
    fn normal(p: &Path) -> Vec<Component<'_>> {
        p.components().filter(|c| *c != Component::CurDir).collect()
    }
    let target = normal(target);
    let base = normal(base);
    let common = target.iter().zip(&base).take_while(|(a, b)| a == b).count();
    let mut rel = PathBuf::new();
    for c in &base[common..] {
        match c {
            Component::Normal(_) => rel.push(".."),
            _ => return None,
        }
    }
    for c in &target[common..] {
        rel.push(c.as_os_str());
    }
    Some(rel)
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn symlink(original: &Path, link: &Path) -> Result<(), DataError> {
            std::os::unix::fs::symlink(original, link).map_err(io_error(link))
        }
    } else {
        fn symlink(original: &Path, link: &Path) -> Result<(), DataError> {
            std::os::windows::fs::symlink_file(original, link).map_err(io_error(link))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;

    fn write_item(dir: &Path, item: &str, contents: &[u8]) {
        let mut f = File::create(dir.join(item)).unwrap();
        f.write_all(contents).unwrap();
    }

    fn fake_vis(dir: &Path, name: &str) -> VisData {
        let base = dir.join(name);
        fs::create_dir(&base).unwrap();
        write_item(&base, "vartable", b"d time\nr inttime\n");
        write_item(&base, "header", b"obstype crosscorrelation");
        write_item(&base, "visdata", &[7u8; 4096]);
        write_item(&base, "history", b"UVGEN: Executed on: 09JAN12:13:45:22.5\n");
        VisData::new(base)
    }

    #[test]
    fn test_make_variant() {
        let data = Data::new("obs/src.uv");
        assert_eq!(data.make_variant("avg").base(), Path::new("obs/src.uv.avg"));
        assert_eq!(data.vis_variant("cal").to_string(), "obs/src.uv.cal");
        assert_eq!(data.path("visdata"), PathBuf::from("obs/src.uv/visdata"));
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("a.uv"), Path::new("b.uv")),
            Some(PathBuf::from("../a.uv"))
        );
        assert_eq!(
            relative_path(Path::new("./data/a.uv"), Path::new("data/out/b.uv")),
            Some(PathBuf::from("../../a.uv"))
        );
        assert_eq!(relative_path(Path::new("a.uv"), Path::new("../b.uv")), None);
    }

    #[test]
    fn test_umtime_missing() {
        let dir = TempDir::new().unwrap();
        let data = Data::new(dir.path().join("nothing.uv"));
        assert!(!data.exists());
        assert!(data.check_exists().is_err());
        assert_eq!(data.umtime().unwrap(), SystemTime::UNIX_EPOCH);
        assert!(data.mtime().is_err());
    }

    #[test]
    fn test_copy_move_delete() {
        let dir = TempDir::new().unwrap();
        let vis = fake_vis(dir.path(), "src.uv");
        let copy = vis.copy_to(dir.path().join("copy.uv")).unwrap();
        assert!(copy.path("visdata").is_file());
        assert!(copy.umtime().unwrap() > SystemTime::UNIX_EPOCH);

        let mut moved = copy.clone();
        moved.move_to(dir.path().join("moved.uv")).unwrap();
        assert!(!copy.exists());
        assert!(moved.exists());
        assert_ne!(moved, *vis);

        moved.delete().unwrap();
        assert!(!moved.exists());
        // Deleting again is fine.
        moved.delete().unwrap();
    }

    #[test]
    fn test_vis_hash() {
        let dir = TempDir::new().unwrap();
        let vis = fake_vis(dir.path(), "src.uv");
        let hash = vis.quick_hash().unwrap();
        assert_eq!(hash.len(), 64);

        // History doesn't count.
        write_item(vis.base(), "history", b"something else\n");
        assert_eq!(vis.quick_hash().unwrap(), hash);

        write_item(vis.base(), "flags", &[1u8; 16]);
        let flagged = vis.quick_hash().unwrap();
        assert_ne!(flagged, hash);

        write_item(vis.base(), "visdata", &[8u8; 4096]);
        assert_ne!(vis.quick_hash().unwrap(), flagged);
    }

    #[test]
    fn test_hash_uses_tail() {
        let dir = TempDir::new().unwrap();
        let vis = fake_vis(dir.path(), "big.uv");
        let size = HASH_TAIL_BYTES as usize + 16;
        let mut contents = vec![0u8; size];
        write_item(vis.base(), "visdata", &contents);
        let hash = vis.quick_hash().unwrap();
        // A change before the tail isn't seen.
        contents[0] = 1;
        write_item(vis.base(), "visdata", &contents);
        assert_eq!(vis.quick_hash().unwrap(), hash);
        contents[size - 1] = 1;
        write_item(vis.base(), "visdata", &contents);
        assert_ne!(vis.quick_hash().unwrap(), hash);
    }

    #[test]
    fn test_vis_hash_needs_vartable() {
        let dir = TempDir::new().unwrap();
        let vis = fake_vis(dir.path(), "src.uv");
        fs::remove_file(vis.path("vartable")).unwrap();
        assert!(matches!(vis.quick_hash(), Err(DataError::Io { .. })));
    }

    #[test]
    fn test_im_and_cal_hash() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("src.map");
        fs::create_dir(&base).unwrap();
        write_item(&base, "header", b"naxis 2");
        let im = ImData::new(&base);
        let empty_image = im.quick_hash().unwrap();
        write_item(&base, "image", &[3u8; 64]);
        assert_ne!(im.quick_hash().unwrap(), empty_image);

        let cal = CalData::new(&base);
        let before = cal.quick_hash().unwrap();
        write_item(&base, "gains", &[5u8; 32]);
        assert_ne!(cal.quick_hash().unwrap(), before);
    }

    #[cfg(unix)]
    #[test]
    fn test_lwcp() {
        let dir = TempDir::new().unwrap();
        let vis = fake_vis(dir.path(), "src.uv");
        fs::create_dir(vis.path("subdir")).unwrap();

        let dest = vis.lwcp_to(dir.path().join("lw.uv"), &[], false).unwrap();
        let link = fs::read_link(dest.path("visdata")).unwrap();
        assert!(link.is_absolute());
        assert_eq!(fs::read(dest.path("visdata")).unwrap(), vec![7u8; 4096]);
        assert_eq!(fs::read(dest.path("header")).unwrap(), b"obstype crosscorrelation");
        // Only regular files are copied.
        assert!(!dest.path("subdir").exists());
        assert_eq!(dest.quick_hash().unwrap(), vis.quick_hash().unwrap());

        // An existing destination is replaced.
        let again = vis.lwcp_to(dir.path().join("lw.uv"), &[], true).unwrap();
        assert!(again.path("vartable").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_lwcp_skip() {
        let dir = TempDir::new().unwrap();
        let vis = fake_vis(dir.path(), "src.uv");
        write_item(vis.base(), "flags", &[1u8; 16]);

        let dest = vis
            .lwcp_to(dir.path().join("lw.uv"), &["flags", "visdata"], false)
            .unwrap();
        assert!(!dest.path("flags").exists());
        assert!(fs::symlink_metadata(dest.path("visdata")).is_err());
        assert!(dest.path("header").is_file());
        assert!(vis.path("flags").is_file());
    }

    #[test]
    fn test_lwcp_missing_source() {
        let dir = TempDir::new().unwrap();
        let vis = VisData::new(dir.path().join("missing.uv"));
        assert!(matches!(
            vis.lwcp_to(dir.path().join("lw.uv"), &[], false),
            Err(DataError::Missing(_))
        ));
        assert!(!dir.path().join("lw.uv").exists());
    }

    #[test]
    fn test_tasks() {
        let dir = TempDir::new().unwrap();
        let vis = fake_vis(dir.path(), "src.uv");
        let out = vis.make_variant("avg");
        let task = vis.aver_task(&out, 10.0, &[]).unwrap();
        let line = task.command_line();
        assert_eq!(line[0], "uvaver");
        assert_eq!(line[1], format!("vis={vis}"));
        assert_eq!(line[2], format!("out={out}"));
        assert_eq!(line[3], "interval=10");

        let task = vis.cat_task(&out, &[]).unwrap();
        assert_eq!(task.name(), "uvcat");

        let task = vis
            .cat_task(&out, &[("select", "ant(1)"), ("out", "other.uv")])
            .unwrap();
        assert_eq!(
            task.command_line(),
            vec![
                "uvcat".to_string(),
                format!("vis={vis}"),
                "out=other.uv".to_string(),
                "select=ant(1)".to_string(),
            ]
        );
        let line = vis
            .aver_task(&out, 0.5, &[("line", "chan,4")])
            .unwrap()
            .command_line();
        assert_eq!(&line[3..], ["interval=0.5", "line=chan,4"]);

        let im = ImData::new("x.map");
        assert_eq!(im.apply(Task::new("imstat")).command_line(), vec!["imstat", "in=x.map"]);

        let missing = VisData::new(dir.path().join("missing.uv"));
        assert!(missing.cat_task(&out, &[]).is_err());
    }
}
