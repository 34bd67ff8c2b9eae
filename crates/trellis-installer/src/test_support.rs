//! Helpers for building `.tar.gz` fixtures, including hostile ones.
//!
//! Headers are written byte-for-byte so tests can produce paths the `tar`
//! builder would refuse (`..`, absolute paths, links pointing anywhere).

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{EntryType, Header};

pub(crate) struct ArchiveBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl ArchiveBuilder {
    pub(crate) fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    pub(crate) fn file(mut self, path: &str, contents: &str) -> Self {
        let header = raw_header(path, EntryType::Regular, contents.len() as u64, None);
        self.builder
            .append(&header, contents.as_bytes())
            .expect("append file entry");
        self
    }

    pub(crate) fn executable(mut self, path: &str, contents: &str) -> Self {
        let mut header = raw_header(path, EntryType::Regular, contents.len() as u64, None);
        header.set_mode(0o755);
        header.set_cksum();
        self.builder
            .append(&header, contents.as_bytes())
            .expect("append executable entry");
        self
    }

    pub(crate) fn dir(mut self, path: &str) -> Self {
        let header = raw_header(path, EntryType::Directory, 0, None);
        self.builder
            .append(&header, std::io::empty())
            .expect("append directory entry");
        self
    }

    pub(crate) fn symlink(mut self, path: &str, target: &str) -> Self {
        let header = raw_header(path, EntryType::Symlink, 0, Some(target));
        self.builder
            .append(&header, std::io::empty())
            .expect("append symlink entry");
        self
    }

    pub(crate) fn hard_link(mut self, path: &str, target: &str) -> Self {
        let header = raw_header(path, EntryType::Link, 0, Some(target));
        self.builder
            .append(&header, std::io::empty())
            .expect("append hard link entry");
        self
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        let tar_bytes = self.builder.into_inner().expect("finish tar stream");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).expect("compress archive");
        encoder.finish().expect("finish gzip stream")
    }
}

fn raw_header(path: &str, kind: EntryType, size: u64, link: Option<&str>) -> Header {
    let mut header = Header::new_old();
    let name = path.as_bytes();
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    if let Some(target) = link {
        let target = target.as_bytes();
        header.as_old_mut().linkname[..target.len()].copy_from_slice(target);
    }
    header.set_size(size);
    header.set_mode(0o644);
    header.set_entry_type(kind);
    header.set_cksum();
    header
}

/// Lists every path below `root`, relative to it, without following links.
pub(crate) fn walk(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).expect("read dir") {
            let entry = entry.expect("dir entry");
            let path = entry.path();
            let file_type = entry.file_type().expect("file type");
            if file_type.is_dir() {
                pending.push(path.clone());
            }
            found.push(path.strip_prefix(root).expect("under root").to_path_buf());
        }
    }
    found.sort();
    found
}
