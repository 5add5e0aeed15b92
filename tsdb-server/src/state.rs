use crate::config::AppConfig;
use crate::db::connection::MetaDb;
use tokio::sync::Mutex;

pub struct AppState {
    pub db: MetaDb,
    pub config: AppConfig,
    /// Serializes full-store replacements.
    pub restore_lock: Mutex<()>,
}

impl AppState {
    pub fn new(db: MetaDb, config: AppConfig) -> Self {
        Self {
            db,
            config,
            restore_lock: Mutex::new(()),
        }
    }
}
