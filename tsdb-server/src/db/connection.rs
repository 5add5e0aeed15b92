use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tsdb_meta::schema;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = DELETE;
             PRAGMA synchronous = FULL;
             PRAGMA foreign_keys = ON;",
        )
    });
    let pool = Pool::builder().max_size(4).build(manager)?;

    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// The server's metadata store. The whole file can be swapped out by a
/// full restore, so handlers take the pool through a lock.
pub struct MetaDb {
    path: PathBuf,
    pool: RwLock<DbPool>,
}

impl MetaDb {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        tracing::info!("[DB] Opening metadata store at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            pool: RwLock::new(create_pool(path)?),
        })
    }

    /// Current pool. Cheap to clone; connections checked out from it stay
    /// valid after a replacement but see the old file.
    pub async fn pool(&self) -> DbPool {
        self.pool.read().await.clone()
    }

    /// Replace the store with the SQLite file at `snapshot`.
    ///
    /// The snapshot is verified before anything is touched, then renamed
    /// over the store. `snapshot` must be on the same filesystem.
    pub async fn replace(&self, snapshot: &Path) -> anyhow::Result<()> {
        let check = snapshot.to_path_buf();
        tokio::task::spawn_blocking(move || verify_snapshot(&check)).await??;

        let mut pool = self.pool.write().await;
        tokio::fs::rename(snapshot, &self.path).await?;
        let path = self.path.clone();
        *pool = tokio::task::spawn_blocking(move || create_pool(&path)).await??;

        tracing::info!("[DB] Metadata store replaced from snapshot");
        Ok(())
    }

    pub async fn close(&self) {
        let pool = self.pool().await;
        // r2d2 closes connections when the pool is dropped.
        if let Ok(conn) = pool.get() {
            let _ = conn.execute_batch("PRAGMA optimize");
        }
    }
}

fn verify_snapshot(path: &Path) -> tsdb_meta::Result<()> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| tsdb_meta::MetaError::InvalidStore(e.to_string()))?;
    schema::verify(&conn).map_err(|e| match e {
        tsdb_meta::MetaError::Sqlite(e) => tsdb_meta::MetaError::InvalidStore(e.to_string()),
        other => other,
    })
}
