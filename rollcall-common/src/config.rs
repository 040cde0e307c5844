//! Configuration loading and root folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "rollcall.db";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "ROLLCALL_ROOT_FOLDER";

/// Root folder resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. `ROLLCALL_ROOT_FOLDER` environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Supply the command-line override, if one was given
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Resolve the root folder through the 4-tier priority chain
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            tracing::info!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            tracing::info!(module = %self.module_name, "Root folder from {}", ROOT_FOLDER_ENV);
            return PathBuf::from(path);
        }

        if let Ok(config_path) = config_file_path() {
            if let Ok(contents) = std::fs::read_to_string(&config_path) {
                if let Ok(config) = toml::from_str::<toml::Value>(&contents) {
                    if let Some(root) = config.get("root_folder").and_then(|v| v.as_str()) {
                        tracing::info!(
                            module = %self.module_name,
                            config = %config_path.display(),
                            "Root folder from config file"
                        );
                        return PathBuf::from(root);
                    }
                }
            }
        }

        tracing::info!(module = %self.module_name, "Root folder from compiled default");
        default_root_folder()
    }
}

/// Prepares the resolved root folder for use and locates the database file
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root folder if it does not exist yet
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            tracing::info!("Created root folder: {}", self.root.display());
        }
        Ok(())
    }

    /// Path of the shared database file under the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }
}

/// Locate the platform config file (`<config dir>/rollcall/config.toml`)
fn config_file_path() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .map(|d| d.join("rollcall").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rollcall"))
        .unwrap_or_else(|| PathBuf::from("./rollcall_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arg_wins() {
        let resolver =
            RootFolderResolver::new("test").with_cli_arg(Some(PathBuf::from("/tmp/rollcall-cli")));
        assert_eq!(resolver.resolve(), PathBuf::from("/tmp/rollcall-cli"));
    }

    #[test]
    fn default_is_non_empty() {
        assert!(!default_root_folder().as_os_str().is_empty());
    }

    #[test]
    fn database_path_under_root() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let initializer = RootFolderInitializer::new(tmp.path().to_path_buf());
        initializer.ensure_directory_exists().expect("ensure dir");
        assert_eq!(initializer.database_path(), tmp.path().join(DATABASE_FILE));
    }
}
