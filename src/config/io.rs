use std::env::current_exe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use directories_next::ProjectDirs;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use serde_json;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::OpenOptions;
use std::str;

use crate::config::types::Config;
use crate::error::ConfigError;

// creates a path to vacuum-controller.json next to the executable, so a portable install keeps
// its own settings
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            if !path.set_extension("json") {
                eprintln!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            eprintln!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to vacuum-controller.json in an os dependent standard directory, such as
// ~/.config on linux
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "example", "vacuum-controller").map(|dirs| {
        dirs.config_dir().join("vacuum-controller.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        if let Ok(attr) = std::fs::metadata(&path) {
            if attr.is_file() {
                return Ok(path);
            }
        }
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    /// Only one process may drive the radio; the guard must be held for as long as the session runs.
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        match self.rw_lock.try_write() {
            Ok(guard) => Ok(guard),
            Err(source) => Err(ConfigError::CanNotLock { source }),
        }
    }
}

struct ConfigIOInner {
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    pub fn new_sync() -> Result<Self, ConfigError> {
        Self::open(get_config_path()?)
    }

    pub fn open(path: PathBuf) -> Result<Self, ConfigError> {
        eprintln!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        let inner = ConfigIOInner {
            file,
        };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    pub fn locker(&self) -> Result<ConfigIOLocker, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(inner.file.try_clone()?),
        })
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");
        let file = inner.file.try_clone()?; // std File
        Ok(File::from_std(file)) // tokio File
    }

    /// An empty file means defaults.
    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = self.get_file()?;
        file.rewind().await?;

        let mut content = vec![];
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        log::info!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vacuum-controller-{}-{}.json", name, std::process::id()))
    }

    #[tokio::test]
    async fn empty_file_reads_as_defaults() {
        let path = temp_path("empty");
        let _ = std::fs::remove_file(&path);
        let io = ConfigIO::open(path.clone()).expect("open config");

        assert_eq!(io.read().await.expect("read config"), Config::default());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn save_then_read() {
        let path = temp_path("save");
        let _ = std::fs::remove_file(&path);
        let io = ConfigIO::open(path.clone()).expect("open config");

        let config = Config { scan_timeout_ms: 3000, log_level: "debug".to_string(), ..Config::default() };
        io.save(&config).await.expect("save config");
        assert_eq!(io.read().await.expect("read config"), config);

        let shorter = Config::default();
        io.save(&shorter).await.expect("save config");
        assert_eq!(io.read().await.expect("read config"), shorter);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let path = temp_path("malformed");
        std::fs::write(&path, "{not json").expect("write fixture");
        let io = ConfigIO::open(path.clone()).expect("open config");

        let runtime = tokio::runtime::Builder::new_current_thread().build().expect("runtime");
        let result = runtime.block_on(io.read());
        assert!(matches!(result, Err(ConfigError::JsonError { .. })));
        let _ = std::fs::remove_file(&path);
    }
}
