use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub shards_dir: PathBuf,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));
        let mut config = Self::for_data_dir(&data_dir);
        config.port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8086);
        config.log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
        config
    }

    /// Default layout under `data_dir`: `meta.db` and a `shards/` directory.
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            port: 8086,
            data_dir: data_dir.to_path_buf(),
            db_path: data_dir.join("meta.db"),
            shards_dir: data_dir.join("shards"),
            log_level: "info".into(),
        }
    }
}
