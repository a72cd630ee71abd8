use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::BridgeError,
    models::ScanArtifact,
    platform::{AccessScope, ScopedAccess},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const PARTIAL_SUFFIX: &str = ".partial";
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Flat directory of exported scene files. The listing is the source of truth.
///
/// The directory is created lazily on the first write. New files are written to a
/// hidden temp file and then linked into place without clobbering, so a concurrent
/// `list` sees either the old directory or the complete new file.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    extension: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `<prefix>_<unix seconds>.<ext>`, the name used when the caller does not pick one.
    pub fn default_file_name(&self, prefix: &str) -> String {
        format!("{prefix}_{}.{}", Utc::now().timestamp(), self.extension)
    }

    pub fn has_scene_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }

    /// Scene files, newest first. A missing directory is an empty store.
    pub fn list(&self) -> Result<Vec<ScanArtifact>, BridgeError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log_warn!("skipping unreadable entry in {}: {err}", self.dir.display());
                    continue;
                }
            };
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !path.is_file() || !self.has_scene_extension(&path) {
                continue;
            }

            match artifact_from_path(&path) {
                Ok(artifact) => artifacts.push(artifact),
                Err(err) => log_warn!("error reading attributes of {}: {err}", path.display()),
            }
        }

        artifacts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(artifacts)
    }

    /// Writes `bytes` under `suggested_name`, renaming on collision. Never overwrites.
    pub fn commit(&self, bytes: &[u8], suggested_name: &str) -> Result<ScanArtifact, BridgeError> {
        let desired = self.normalize_name(suggested_name)?;
        let path = self.place_new(&desired, |temp| {
            let mut file = File::create(temp)?;
            file.write_all(bytes)?;
            file.sync_all()
        })?;

        log_info!("committed scene file {} ({} bytes)", path.display(), bytes.len());
        Ok(artifact_from_path(&path)?)
    }

    pub fn open(&self, file_name: &str) -> Result<ScanArtifact, BridgeError> {
        validate_file_name(file_name)?;
        let path = self.dir.join(file_name);
        if !path.is_file() {
            return Err(BridgeError::FileNotFound(file_name.to_string()));
        }
        Ok(artifact_from_path(&path)?)
    }

    pub fn delete(&self, file_name: &str) -> Result<(), BridgeError> {
        validate_file_name(file_name)?;
        let path = self.dir.join(file_name);
        if !path.is_file() {
            return Err(BridgeError::FileNotFound(file_name.to_string()));
        }

        fs::remove_file(&path)
            .map_err(|err| BridgeError::FileDeleteError(format!("{file_name}: {err}")))?;
        log_info!("deleted scene file {}", path.display());
        Ok(())
    }

    /// Copies an external scene file into the store under its own name.
    ///
    /// The extension is checked before anything else touches the store; scoped
    /// access to `source` is held only for the duration of the copy.
    pub fn import(
        &self,
        source: &Path,
        access: &dyn ScopedAccess,
    ) -> Result<ScanArtifact, BridgeError> {
        if !self.has_scene_extension(source) {
            return Err(BridgeError::InvalidFileType(format!(
                "{} is not a .{} file",
                source.display(),
                self.extension
            )));
        }

        let desired = source
            .file_name()
            .map(|name| name.to_string_lossy().trim_start_matches('.').to_string())
            .ok_or_else(|| BridgeError::ImportFailed(format!("{} has no file name", source.display())))?;
        validate_file_name(&desired).map_err(|err| BridgeError::ImportFailed(err.to_string()))?;

        let _scope = AccessScope::acquire(access, source);
        if !source.is_file() {
            return Err(BridgeError::ImportFailed(format!(
                "{} does not exist or is not a file",
                source.display()
            )));
        }

        let path = self
            .place_new(&desired, |temp| fs::copy(source, temp).map(|_| ()))
            .map_err(|err| BridgeError::ImportFailed(format!("{}: {err}", source.display())))?;

        log_info!("imported {} as {}", source.display(), path.display());
        artifact_from_path(&path).map_err(|err| BridgeError::ImportFailed(err.to_string()))
    }

    fn normalize_name(&self, suggested: &str) -> Result<String, BridgeError> {
        let trimmed = suggested.trim();
        validate_file_name(trimmed)?;
        if self.has_scene_extension(Path::new(trimmed)) {
            Ok(trimmed.to_string())
        } else {
            Ok(format!("{trimmed}.{}", self.extension))
        }
    }

    fn place_new(
        &self,
        desired: &str,
        write: impl FnOnce(&Path) -> io::Result<()>,
    ) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let temp = self
            .dir
            .join(format!(".{desired}.{}{PARTIAL_SUFFIX}", Uuid::new_v4().simple()));
        if let Err(err) = write(&temp) {
            let _ = fs::remove_file(&temp);
            return Err(err);
        }

        let result = self.link_unique(&temp, desired);
        if let Err(err) = fs::remove_file(&temp) {
            if err.kind() != io::ErrorKind::NotFound {
                log_warn!("failed to remove temp file {}: {err}", temp.display());
            }
        }
        result
    }

    fn link_unique(&self, temp: &Path, desired: &str) -> io::Result<PathBuf> {
        let (stem, ext) = split_name(desired);
        let stamp = Utc::now().format("%Y%m%d_%H%M%S%3f").to_string();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate_name = match attempt {
                0 => desired.to_string(),
                1 => join_name(&format!("{stem}_{stamp}"), ext),
                n => join_name(&format!("{stem}_{stamp}_{n}"), ext),
            };
            let candidate = self.dir.join(&candidate_name);

            match fs::hard_link(temp, &candidate) {
                Ok(()) => return Ok(candidate),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    log_debug!("{candidate_name} already exists, trying another name");
                }
                Err(err) => {
                    log_debug!("hard link unavailable ({err}), copying instead");
                    match copy_no_clobber(temp, &candidate) {
                        Ok(()) => return Ok(candidate),
                        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                            log_debug!("{candidate_name} already exists, trying another name");
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free file name for {desired} after {MAX_NAME_ATTEMPTS} attempts"),
        ))
    }
}

/// Copies `temp` into a file that must not exist yet. Used where hard links are unavailable.
fn copy_no_clobber(temp: &Path, target: &Path) -> io::Result<()> {
    let mut dest = OpenOptions::new().write(true).create_new(true).open(target)?;
    let copied = File::open(temp)
        .and_then(|mut source| io::copy(&mut source, &mut dest))
        .and_then(|_| dest.sync_all());
    if let Err(err) = copied {
        let _ = fs::remove_file(target);
        return Err(err);
    }
    Ok(())
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(index) if index > 0 => (&name[..index], Some(&name[index + 1..])),
        _ => (name, None),
    }
}

fn join_name(stem: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Names must stay inside the store directory and must not be hidden.
pub fn validate_file_name(name: &str) -> Result<(), BridgeError> {
    if name.is_empty() {
        return Err(BridgeError::InvalidInput("file name must not be empty".into()));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(BridgeError::InvalidInput(format!(
            "file name '{name}' must not contain path separators"
        )));
    }
    if name.starts_with('.') {
        return Err(BridgeError::InvalidInput(format!(
            "file name '{name}' must not start with '.'"
        )));
    }
    Ok(())
}

fn artifact_from_path(path: &Path) -> io::Result<ScanArtifact> {
    let metadata = fs::metadata(path)?;
    // Birth time is not available on every filesystem.
    let created = metadata.created().or_else(|_| metadata.modified())?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(ScanArtifact {
        file_name,
        file_path: path.to_path_buf(),
        created_at: DateTime::<Utc>::from(created),
        size_bytes: metadata.len(),
        summary: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NoScopedAccess;
    use std::sync::Mutex;
    use std::time::Duration;

    fn store(root: &Path) -> ArtifactStore {
        ArtifactStore::new(root.join("RoomScans"), "usdz")
    }

    #[test]
    fn list_on_missing_directory_is_empty_and_does_not_create_it() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        assert!(store.list().unwrap().is_empty());
        assert!(!store.dir().exists());
    }

    #[test]
    fn commit_creates_directory_lazily() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        let artifact = store.commit(b"scene", "living_room").unwrap();

        assert_eq!(artifact.file_name, "living_room.usdz");
        assert_eq!(artifact.size_bytes, 5);
        assert_eq!(fs::read(&artifact.file_path).unwrap(), b"scene");
    }

    #[test]
    fn same_name_twice_keeps_both_files() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());

        let first = store.commit(b"first", "scan.usdz").unwrap();
        std::thread::sleep(Duration::from_millis(25));
        let second = store.commit(b"second", "scan.usdz").unwrap();

        assert_eq!(first.file_name, "scan.usdz");
        assert_ne!(first.file_path, second.file_path);
        assert!(second.file_name.starts_with("scan_"));
        assert!(second.file_name.ends_with(".usdz"));
        assert_eq!(fs::read(&first.file_path).unwrap(), b"first");
        assert_eq!(fs::read(&second.file_path).unwrap(), b"second");

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_ne!(listed[0].created_at, listed[1].created_at);
        assert_eq!(listed[0].file_name, second.file_name);
    }

    #[test]
    fn repeated_collisions_get_distinct_names() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        let names: Vec<String> = (0..4)
            .map(|i| store.commit(format!("{i}").as_bytes(), "scan").unwrap().file_name)
            .collect();

        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4, "names: {names:?}");
        assert_eq!(store.list().unwrap().len(), 4);
    }

    #[test]
    fn copy_fallback_never_replaces_existing_file() {
        let root = tempfile::tempdir().unwrap();
        let temp = root.path().join(".scan.usdz.partial");
        let target = root.path().join("scan.usdz");
        fs::write(&temp, b"new").unwrap();
        fs::write(&target, b"old").unwrap();

        let err = copy_no_clobber(&temp, &target).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&target).unwrap(), b"old");

        let fresh = root.path().join("scan_2.usdz");
        copy_no_clobber(&temp, &fresh).unwrap();
        assert_eq!(fs::read(&fresh).unwrap(), b"new");
        assert!(temp.exists());
    }

    #[test]
    fn list_skips_temp_hidden_and_foreign_files() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        store.commit(b"scene", "kept").unwrap();
        fs::write(store.dir().join(".kept.usdz.abc.partial"), b"half").unwrap();
        fs::write(store.dir().join("notes.txt"), b"text").unwrap();
        fs::write(store.dir().join("UPPER.USDZ"), b"scene").unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|a| a.file_name).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"kept.usdz".to_string()));
        assert!(names.contains(&"UPPER.USDZ".to_string()));
    }

    #[test]
    fn rejects_names_escaping_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        for bad in ["", "../evil", "nested/scan", ".hidden", ".."] {
            let err = store.commit(b"x", bad).unwrap_err();
            assert_eq!(err.code(), "INVALID_ARGUMENTS", "name {bad:?}");
        }
        assert_eq!(store.delete("../evil.usdz").unwrap_err().code(), "INVALID_ARGUMENTS");
    }

    #[test]
    fn delete_and_open_report_missing_files() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        assert_eq!(store.delete("nope.usdz").unwrap_err().code(), "FILE_NOT_FOUND");
        assert_eq!(store.open("nope.usdz").unwrap_err().code(), "FILE_NOT_FOUND");

        let artifact = store.commit(b"scene", "room").unwrap();
        assert_eq!(store.open("room.usdz").unwrap().file_path, artifact.file_path);
        store.delete("room.usdz").unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[derive(Default)]
    struct CountingAccess {
        begun: Mutex<u32>,
        ended: Mutex<u32>,
    }

    impl ScopedAccess for CountingAccess {
        fn begin(&self, _path: &Path) -> bool {
            *self.begun.lock().unwrap() += 1;
            true
        }

        fn end(&self, _path: &Path) {
            *self.ended.lock().unwrap() += 1;
        }
    }

    #[test]
    fn import_rejects_wrong_extension_without_touching_store() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        let source = root.path().join("photo.jpg");
        fs::write(&source, b"jpeg").unwrap();
        let access = CountingAccess::default();

        let err = store.import(&source, &access).unwrap_err();
        assert_eq!(err.code(), "INVALID_FILE_TYPE");
        assert!(!store.dir().exists());
        assert_eq!(*access.begun.lock().unwrap(), 0);
    }

    #[test]
    fn import_copies_and_releases_access() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        store.commit(b"existing", "kitchen").unwrap();

        let source = root.path().join("kitchen.usdz");
        fs::write(&source, b"imported").unwrap();
        let access = CountingAccess::default();

        let artifact = store.import(&source, &access).unwrap();
        assert_ne!(artifact.file_name, "kitchen.usdz");
        assert_eq!(fs::read(&artifact.file_path).unwrap(), b"imported");
        assert!(source.exists());
        assert_eq!(*access.begun.lock().unwrap(), 1);
        assert_eq!(*access.ended.lock().unwrap(), 1);
    }

    #[test]
    fn import_failure_still_releases_access() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        let access = CountingAccess::default();

        let err = store
            .import(&root.path().join("missing.usdz"), &access)
            .unwrap_err();
        assert_eq!(err.code(), "IMPORT_FAILED");
        assert_eq!(*access.ended.lock().unwrap(), 1);
    }

    #[test]
    fn import_without_scoped_access_support() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        let source = root.path().join("office.USDZ");
        fs::write(&source, b"scene").unwrap();
        assert_eq!(
            store.import(&source, &NoScopedAccess).unwrap().file_name,
            "office.USDZ"
        );
    }
}
