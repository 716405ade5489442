use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, info};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Archive containers the installer can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Detect the format from a file name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }
}

/// Archive and compression suffixes that are recognised but cannot be opened.
const UNSUPPORTED_ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar.xz", ".txz", ".tar.bz2", ".tbz", ".tbz2", ".tar.zst", ".gz", ".xz", ".bz2", ".zst",
    ".7z", ".rar",
];

/// Whether `name` is a `.tar.gz`, `.tgz` or `.zip` file.
pub fn is_supported_archive(name: &str) -> bool {
    ArchiveFormat::from_name(name).is_some()
}

/// Whether `name` looks like an archive this installer cannot open.
pub fn is_unsupported_archive(name: &str) -> bool {
    let name = name.to_lowercase();
    !is_supported_archive(&name)
        && UNSUPPORTED_ARCHIVE_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(suffix))
}

/// What happened to one installed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The file was written to this path.
    Installed(PathBuf),
    /// An identical file was already at this path; nothing was written.
    UpToDate(PathBuf),
}

impl InstallOutcome {
    pub fn path(&self) -> &Path {
        match self {
            InstallOutcome::Installed(p) | InstallOutcome::UpToDate(p) => p,
        }
    }
}

/// Installs executables into a destination directory.
///
/// Every write to the destination goes through a temp file created inside
/// the destination directory and renamed into place, so readers never see a
/// half-written binary. Files whose content and mode already match are left
/// untouched.
pub struct Install {
    /// Directory the executables land in.
    pub install_path: PathBuf,
    /// Entries whose name matches are skipped.
    pub exclude: Option<Regex>,
}

impl Install {
    pub fn new(install_path: impl Into<PathBuf>) -> Self {
        Self {
            install_path: install_path.into(),
            exclude: None,
        }
    }

    /// Skip archive entries whose name matches `exclude` (builder).
    pub fn with_exclude(mut self, exclude: Option<Regex>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Create the install directory (mode 0755) if it does not exist yet.
    pub fn ensure_install_dir(&self) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }
        builder
            .create(&self.install_path)
            .map_err(|e| Error::io("create install directory", &self.install_path, e))
    }

    /// Extract every executable regular file of `archive_path` into the
    /// install directory.
    pub fn install_archive(&self, archive_path: &Path) -> Result<Vec<InstallOutcome>> {
        let file_name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match ArchiveFormat::from_name(&file_name) {
            Some(ArchiveFormat::TarGz) => self.install_tar_gz(archive_path),
            Some(ArchiveFormat::Zip) => self.install_zip(archive_path),
            None => Err(Error::UnsupportedArchive(file_name)),
        }
    }

    /// Install a single downloaded binary as `install_path/name`, adding the
    /// execute bits first.
    pub fn install_binary(&self, src: &Path, name: &str) -> Result<InstallOutcome> {
        let mode = file_mode(src)? | 0o111;
        set_mode(src, mode)?;
        self.install_file(src, &self.install_path.join(name))
    }

    fn install_tar_gz(&self, archive_path: &Path) -> Result<Vec<InstallOutcome>> {
        let file =
            File::open(archive_path).map_err(|e| Error::io("open archive", archive_path, e))?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let corrupt = |e: io::Error| Error::Archive {
            path: archive_path.to_owned(),
            reason: e.to_string(),
        };

        let mut outcomes = Vec::new();
        for entry in archive.entries().map_err(corrupt)? {
            let mut entry = entry.map_err(corrupt)?;
            let header = entry.header();
            if !header.entry_type().is_file() {
                continue;
            }
            let mode = header.mode().map_err(corrupt)?;
            if mode & 0o111 == 0 {
                continue;
            }
            let size = header.size().map_err(corrupt)?;
            let name = entry.path().map_err(corrupt)?.to_string_lossy().into_owned();

            if let Some(outcome) =
                self.install_entry(archive_path, &name, &mut entry, mode, size)?
            {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    fn install_zip(&self, archive_path: &Path) -> Result<Vec<InstallOutcome>> {
        let file =
            File::open(archive_path).map_err(|e| Error::io("open archive", archive_path, e))?;
        let corrupt = |e: zip::result::ZipError| Error::Archive {
            path: archive_path.to_owned(),
            reason: e.to_string(),
        };
        let mut archive = zip::ZipArchive::new(file).map_err(corrupt)?;

        let mut outcomes = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(corrupt)?;
            if entry.is_dir() {
                continue;
            }
            let Some(mode) = entry.unix_mode() else {
                continue;
            };
            if mode & S_IFMT == S_IFLNK || mode & 0o111 == 0 {
                continue;
            }
            let size = entry.size();
            let name = entry.name().to_owned();

            if let Some(outcome) =
                self.install_entry(archive_path, &name, &mut entry, mode, size)?
            {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// Stage one archive entry beside the archive, then install it.
    ///
    /// A truncated stream reads short without an error, so the staged length
    /// must equal the header's `size` before anything reaches the destination.
    fn install_entry(
        &self,
        archive_path: &Path,
        name: &str,
        reader: &mut dyn Read,
        mode: u32,
        size: u64,
    ) -> Result<Option<InstallOutcome>> {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(name) {
                debug!("skipping excluded entry {name}");
                return Ok(None);
            }
        }
        let Some(base) = Path::new(name).file_name() else {
            return Ok(None);
        };

        let staging_dir = archive_path.parent().unwrap_or_else(|| Path::new("."));
        let staged = staging_dir.join(base);
        let result = stage(reader, &staged)
            .and_then(|copied| {
                if copied == size {
                    Ok(())
                } else {
                    Err(Error::Archive {
                        path: archive_path.to_owned(),
                        reason: format!("{name}: expected {size} bytes, read {copied}"),
                    })
                }
            })
            .and_then(|()| set_mode(&staged, (mode & 0o777) | 0o111))
            .and_then(|()| self.install_file(&staged, &self.install_path.join(base)));
        let _ = fs::remove_file(&staged);
        result.map(Some)
    }

    /// Put `src` at `dest` unless an identical file is already there.
    fn install_file(&self, src: &Path, dest: &Path) -> Result<InstallOutcome> {
        if is_identical_file(src, dest)? {
            info!("{} is identical, no need to install", dest.display());
            return Ok(InstallOutcome::UpToDate(dest.to_owned()));
        }

        replace_file(src, dest)?;
        info!("Installed {}", dest.display());
        Ok(InstallOutcome::Installed(dest.to_owned()))
    }
}

/// Copy `reader` into a fresh `staged` file and return the byte count.
fn stage(reader: &mut dyn Read, staged: &Path) -> Result<u64> {
    let mut out =
        File::create(staged).map_err(|e| Error::io("create staging file", staged, e))?;
    io::copy(reader, &mut out).map_err(|e| Error::io("write staging file", staged, e))
}

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Copy `src` into a temp file beside `dest` and rename it over `dest`.
///
/// `src` may live on another filesystem, so it is never renamed directly.
fn replace_file(src: &Path, dest: &Path) -> Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let base = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{base}."))
        .tempfile_in(dir)
        .map_err(|e| Error::io("create temp file in", dir, e))?;

    let mut input = File::open(src).map_err(|e| Error::io("open", src, e))?;
    io::copy(&mut input, temp.as_file_mut()).map_err(|e| Error::io("copy into", temp.path(), e))?;
    set_mode(temp.path(), file_mode(src)?)?;

    temp.persist(dest)
        .map_err(|e| Error::io("rename into", dest, e.error))?;
    Ok(())
}

/// Same SHA-256 content and same permission mode. A missing `dest` is never
/// identical.
fn is_identical_file(src: &Path, dest: &Path) -> Result<bool> {
    let dest_hash = match sha256_file(dest) {
        Ok(hash) => hash,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::io("hash", dest, e)),
    };
    let src_hash = sha256_file(src).map_err(|e| Error::io("hash", src, e))?;

    Ok(src_hash == dest_hash && file_mode(src)? == file_mode(dest)?)
}

fn sha256_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let meta = fs::metadata(path).map_err(|e| Error::io("stat", path, e))?;
    Ok(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(path: &Path) -> Result<u32> {
    fs::metadata(path).map_err(|e| Error::io("stat", path, e))?;
    Ok(0)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::io("set permissions on", path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);
        for (name, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data, mode) in entries {
            let options = zip::write::SimpleFileOptions::default().unix_permissions(*mode);
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ArchiveFormat::from_name("a.tar.gz"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_name("a.TGZ"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_name("a.Zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_name("a.tar.xz"), None);
        assert!(is_unsupported_archive("tool-linux-amd64.tar.xz"));
        assert!(is_unsupported_archive("tool.7z"));
        assert!(!is_unsupported_archive("tool-linux-amd64"));
        assert!(!is_unsupported_archive("tool.tar.gz"));
    }

    #[test]
    fn test_tar_gz_installs_only_executables() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let archive = work.path().join("tool_linux_amd64.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("tool-1.0/tool", b"#!/bin/sh\necho tool\n", 0o755),
                ("tool-1.0/README.md", b"readme", 0o644),
            ],
        );

        let outcomes = Install::new(dest.path()).install_archive(&archive).unwrap();
        assert_eq!(outcomes, vec![InstallOutcome::Installed(dest.path().join("tool"))]);
        assert_eq!(listing(dest.path()), ["tool"]);
        let mode = fs::metadata(dest.path().join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(listing(work.path()), ["tool_linux_amd64.tar.gz"]);
    }

    #[test]
    fn test_zip_installs_only_executables() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let archive = work.path().join("tool_windows_amd64.ZIP");
        write_zip(
            &archive,
            &[("bin/tool", b"binary", 0o750), ("LICENSE", b"license", 0o644)],
        );

        let outcomes = Install::new(dest.path()).install_archive(&archive).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(listing(dest.path()), ["tool"]);
        assert_eq!(fs::read(dest.path().join("tool")).unwrap(), b"binary");
        let mode = fs::metadata(dest.path().join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o751);
    }

    #[test]
    fn test_second_install_is_a_noop() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let archive = work.path().join("tool.tgz");
        write_tar_gz(&archive, &[("tool", b"v1", 0o755)]);
        let install = Install::new(dest.path());

        let first = install.install_archive(&archive).unwrap();
        assert!(matches!(first[0], InstallOutcome::Installed(_)));
        let before = fs::metadata(dest.path().join("tool")).unwrap();

        let second = install.install_archive(&archive).unwrap();
        assert_eq!(second, vec![InstallOutcome::UpToDate(dest.path().join("tool"))]);
        let after = fs::metadata(dest.path().join("tool")).unwrap();
        assert_eq!(before.ino(), after.ino());
        assert_eq!(before.mtime(), after.mtime());
        assert_eq!(before.mtime_nsec(), after.mtime_nsec());
        assert_eq!(listing(dest.path()), ["tool"]);
    }

    #[test]
    fn test_changed_content_is_replaced() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("tool"), b"old").unwrap();
        fs::set_permissions(dest.path().join("tool"), fs::Permissions::from_mode(0o755)).unwrap();

        let archive = work.path().join("tool.tar.gz");
        write_tar_gz(&archive, &[("tool", b"new", 0o755)]);
        let outcomes = Install::new(dest.path()).install_archive(&archive).unwrap();

        assert!(matches!(outcomes[0], InstallOutcome::Installed(_)));
        assert_eq!(fs::read(dest.path().join("tool")).unwrap(), b"new");
        assert_eq!(listing(dest.path()), ["tool"]);
    }

    #[test]
    fn test_mode_change_alone_triggers_install() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("tool"), b"same").unwrap();
        fs::set_permissions(dest.path().join("tool"), fs::Permissions::from_mode(0o700)).unwrap();

        let archive = work.path().join("tool.tar.gz");
        write_tar_gz(&archive, &[("tool", b"same", 0o755)]);
        let outcomes = Install::new(dest.path()).install_archive(&archive).unwrap();

        assert!(matches!(outcomes[0], InstallOutcome::Installed(_)));
        let mode = fs::metadata(dest.path().join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_exclude_pattern_skips_entries() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let archive = work.path().join("tool.tar.gz");
        write_tar_gz(
            &archive,
            &[("tool", b"bin", 0o755), ("LICENSE", b"license", 0o755)],
        );

        let install =
            Install::new(dest.path()).with_exclude(Some(Regex::new("(?i)license").unwrap()));
        install.install_archive(&archive).unwrap();
        assert_eq!(listing(dest.path()), ["tool"]);
    }

    #[test]
    fn test_tar_symlinks_and_dirs_are_skipped() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let archive = work.path().join("tool.tar.gz");
        {
            let file = File::create(&archive).unwrap();
            let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(gz);

            let mut dir = tar::Header::new_gnu();
            dir.set_entry_type(tar::EntryType::Directory);
            dir.set_mode(0o755);
            dir.set_size(0);
            dir.set_cksum();
            builder.append_data(&mut dir, "bin/", io::empty()).unwrap();

            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Symlink);
            link.set_mode(0o777);
            link.set_size(0);
            builder.append_link(&mut link, "bin/alias", "tool").unwrap();

            let mut file = tar::Header::new_gnu();
            file.set_entry_type(tar::EntryType::Regular);
            file.set_mode(0o755);
            file.set_size(3);
            file.set_cksum();
            builder.append_data(&mut file, "bin/tool", &b"bin"[..]).unwrap();

            builder.into_inner().unwrap().finish().unwrap();
        }

        Install::new(dest.path()).install_archive(&archive).unwrap();
        assert_eq!(listing(dest.path()), ["tool"]);
    }

    #[test]
    fn test_zip_symlinks_and_dirs_are_skipped() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let archive = work.path().join("tool.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
            zip.add_directory("bin/", options).unwrap();
            zip.start_file("bin/tool", options).unwrap();
            zip.write_all(b"bin").unwrap();
            zip.add_symlink("bin/alias", "tool", options).unwrap();
            zip.finish().unwrap();
        }

        let outcomes = Install::new(dest.path()).install_archive(&archive).unwrap();
        assert_eq!(outcomes, vec![InstallOutcome::Installed(dest.path().join("tool"))]);
        assert_eq!(listing(dest.path()), ["tool"]);
        assert!(!fs::symlink_metadata(dest.path().join("tool"))
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn test_truncated_tar_gz_leaves_destination_untouched() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("tool"), b"good").unwrap();
        fs::set_permissions(dest.path().join("tool"), fs::Permissions::from_mode(0o755)).unwrap();

        let payload = vec![0x5a_u8; 100_000];
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append_data(&mut header, "tool", &payload[..]).unwrap();
        let mut tar_bytes = builder.into_inner().unwrap();
        tar_bytes.truncate(50_000);

        let archive = work.path().join("tool.tar.gz");
        let mut gz = flate2::write::GzEncoder::new(
            File::create(&archive).unwrap(),
            flate2::Compression::default(),
        );
        gz.write_all(&tar_bytes).unwrap();
        gz.finish().unwrap();

        let err = Install::new(dest.path()).install_archive(&archive).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }), "unexpected error: {err}");
        assert_eq!(fs::read(dest.path().join("tool")).unwrap(), b"good");
        assert_eq!(listing(dest.path()), ["tool"]);
        assert_eq!(listing(work.path()), ["tool.tar.gz"]);
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("tool.tar.xz");
        fs::write(&archive, b"data").unwrap();
        let err = Install::new(work.path()).install_archive(&archive).unwrap_err();
        assert!(matches!(err, Error::UnsupportedArchive(name) if name == "tool.tar.xz"));
    }

    #[test]
    fn test_corrupt_archive_is_a_format_error() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let archive = work.path().join("tool.zip");
        fs::write(&archive, b"not a zip").unwrap();
        let err = Install::new(dest.path()).install_archive(&archive).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
    }

    #[test]
    fn test_single_binary_gets_exec_bit_and_is_idempotent() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let install = Install::new(dest.path());

        let download = work.path().join("tool-linux-amd64");
        let mut f = File::create(&download).unwrap();
        f.write_all(b"\x7fELF").unwrap();
        drop(f);
        fs::set_permissions(&download, fs::Permissions::from_mode(0o644)).unwrap();

        let first = install.install_binary(&download, "tool").unwrap();
        assert_eq!(first, InstallOutcome::Installed(dest.path().join("tool")));
        let mode = fs::metadata(dest.path().join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        fs::set_permissions(&download, fs::Permissions::from_mode(0o644)).unwrap();
        let second = install.install_binary(&download, "tool").unwrap();
        assert_eq!(second, InstallOutcome::UpToDate(dest.path().join("tool")));
    }

    #[test]
    fn test_ensure_install_dir_creates_nested_dirs() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("a/b/bin");
        let install = Install::new(&dir);
        install.ensure_install_dir().unwrap();
        assert!(dir.is_dir());
        install.ensure_install_dir().unwrap();
    }
}
