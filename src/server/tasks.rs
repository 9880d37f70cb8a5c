use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::scheduler::{BackgroundTask, Context};
use crate::store::{snapshot, HashIndex};

/// Periodic hash file rewrite. Each firing considers a sync; the snapshot
/// routine itself decides whether enough modifications accumulated.
pub struct SyncTask {
    index: Arc<HashIndex>,
    path: PathBuf,
    expire: Duration,
    sync: SyncConfig,
}

impl SyncTask {
    pub fn new(index: Arc<HashIndex>, path: PathBuf, expire: Duration, sync: SyncConfig) -> Self {
        Self {
            index,
            path,
            expire,
            sync,
        }
    }
}

#[async_trait::async_trait]
impl BackgroundTask for SyncTask {
    fn name(&self) -> &'static str {
        "hashfile-sync"
    }

    fn interval(&self) -> Duration {
        self.sync.interval
    }

    fn jitter_frac(&self) -> f64 {
        self.sync.jitter_frac
    }

    async fn execute(&self, _ctx: Context) -> Result<()> {
        snapshot::sync(
            &self.index,
            &self.path,
            self.expire,
            self.sync.mod_limit,
            false,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzy::{FuzzyHash, HASH_PIPE_LEN};
    use crate::scheduler::Scheduler;
    use crate::store::RECORD_SIZE;
    use crate::tmpfs::NamedTempFile;

    #[tokio::test]
    async fn test_sync_task_rewrites_when_dirty() -> Result<()> {
        let file = NamedTempFile::new().expect("Failed to create temp file");
        let index = Arc::new(HashIndex::new());
        index.write(FuzzyHash::new([b'a'; HASH_PIPE_LEN], 128));

        let task = Arc::new(SyncTask::new(
            index.clone(),
            file.path().to_path_buf(),
            Duration::from_secs(3600),
            SyncConfig::default()
                .interval(Duration::from_millis(10))
                .mod_limit(1),
        ));

        let scheduler = Scheduler::new();
        scheduler.register(task);
        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.shutdown().await?;

        assert_eq!(index.mods(), 0);
        let len = std::fs::metadata(file.path())?.len();
        assert_eq!(len as usize, RECORD_SIZE);
        Ok(())
    }
}
