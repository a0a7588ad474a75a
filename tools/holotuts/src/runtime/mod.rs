use crate::errors::HoloTutsError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, HoloTutsError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), HoloTutsError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), HoloTutsError>;
    fn remove_file(&self, path: &Path) -> Result<(), HoloTutsError>;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), HoloTutsError>;
    fn exists(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), HoloTutsError>;
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, HoloTutsError> {
        std::fs::read_to_string(path).map_err(|e| HoloTutsError::Io(e.to_string()))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), HoloTutsError> {
        std::fs::write(path, contents).map_err(|e| HoloTutsError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), HoloTutsError> {
        std::fs::create_dir_all(path).map_err(|e| HoloTutsError::Io(e.to_string()))
    }

    fn remove_file(&self, path: &Path) -> Result<(), HoloTutsError> {
        std::fs::remove_file(path).map_err(|e| HoloTutsError::Io(e.to_string()))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), HoloTutsError> {
        std::fs::rename(from, to).map_err(|e| HoloTutsError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), HoloTutsError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| HoloTutsError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
}

impl FakeClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("clock lock")
    }
}

/// In-memory file system. Clones share the same files.
#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    writes: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<HoloTutsError>>>,
    fail_path: Arc<Mutex<Option<(PathBuf, HoloTutsError)>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }

    pub fn set_fail_next(&self, error: HoloTutsError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    /// Fails the next rename whose source is `path`.
    pub fn set_fail_on(&self, path: impl Into<PathBuf>, error: HoloTutsError) {
        *self.fail_path.lock().expect("fail lock") = Some((path.into(), error));
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .lock()
            .expect("files lock")
            .get(path.as_ref())
            .cloned()
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        self.dirs.lock().expect("dirs lock").clone()
    }

    /// Every path passed to `write_string`, in call order.
    pub fn write_log(&self) -> Vec<PathBuf> {
        self.writes.lock().expect("writes lock").clone()
    }

    fn maybe_fail(&self) -> Result<(), HoloTutsError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, HoloTutsError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| HoloTutsError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), HoloTutsError> {
        self.maybe_fail()?;
        self.writes
            .lock()
            .expect("writes lock")
            .push(path.to_path_buf());
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), HoloTutsError> {
        self.maybe_fail()?;
        self.dirs
            .lock()
            .expect("dirs lock")
            .push(path.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), HoloTutsError> {
        self.maybe_fail()?;
        self.files.lock().expect("files lock").remove(path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), HoloTutsError> {
        self.maybe_fail()?;
        {
            let mut fail_path = self.fail_path.lock().expect("fail lock");
            if fail_path.as_ref().is_some_and(|(path, _)| path == from) {
                if let Some((_, error)) = fail_path.take() {
                    return Err(error);
                }
            }
        }
        let mut files = self.files.lock().expect("files lock");
        let contents = files
            .remove(from)
            .ok_or_else(|| HoloTutsError::Io(format!("missing file {}", from.display())))?;
        files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), HoloTutsError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }
}
