use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{AppConfig, Environment};

pub const INDEX_DB_FILE: &str = "index.db";

/// Absolute locations derived from configuration.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub policies_dir: PathBuf,
    pub index_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_root(config, discover_project_root())
    }

    pub fn with_root(config: &AppConfig, project_root: PathBuf) -> Self {
        let policies_dir = absolutize(&project_root, &config.paths.policies_dir);
        let mut index_dir = absolutize(&project_root, &config.paths.index_dir);
        if config.env == Environment::Testing {
            index_dir = index_dir.join("testing");
        }
        let log_dir = if config.log_dir.as_os_str().is_empty() {
            project_root.join("logs")
        } else {
            absolutize(&project_root, &config.log_dir)
        };

        AppPaths {
            project_root,
            policies_dir,
            index_dir,
            log_dir,
        }
    }

    pub fn index_db_path(&self) -> PathBuf {
        self.index_dir.join(INDEX_DB_FILE)
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.index_dir, &self.log_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn absolutize(root: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("POLICY_ASSISTANT_ROOT") {
        return PathBuf::from(root);
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
