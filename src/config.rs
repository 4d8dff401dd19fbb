use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_path: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./database/course.db"),
            log_dir: None,
        }
    }
}

impl Config {
    /// Defaults overridden by `COURSE_DATABASE` / `COURSE_LOG_DIR` env vars.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        if let Ok(path) = dotenvy::var("COURSE_DATABASE") {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(dir) = dotenvy::var("COURSE_LOG_DIR") {
            config.log_dir = Some(PathBuf::from(dir));
        }
        config
    }
}
