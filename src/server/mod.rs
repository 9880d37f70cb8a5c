//! The fuzzy storage worker: listener, accept loop, and lifecycle.
//!
//! Startup order follows the original worker: allocate the index (buckets
//! plus Bloom filter), load the hash file, arm the sync timer, then start
//! accepting. Shutdown comes in two flavors delivered over a channel:
//! terminate (flush the hash file unconditionally, then exit) and reload
//! (stop accepting, drain in-flight sessions for a grace window, then exit
//! without a forced flush; the restarted worker syncs on its own schedule).

pub mod tasks;

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::FuzzyConfig;
use crate::error::Result;
use crate::proto::session::Session;
use crate::scheduler::Scheduler;
use crate::store::{snapshot, HashIndex};
use self::tasks::SyncTask;

/// How a worker is asked to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownKind {
    /// Flush the hash file and exit (SIGTERM).
    Terminate,
    /// Stop accepting, drain in-flight sessions, exit (reload signal).
    Reload,
}

pub struct FuzzyServer {
    config: FuzzyConfig,
    listener: TcpListener,
    index: Arc<HashIndex>,
}

impl FuzzyServer {
    /// Bind the listening socket and allocate the index. Bind failure is
    /// fatal; the caller exits nonzero.
    pub async fn bind(config: FuzzyConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        Ok(Self {
            config,
            listener,
            index: Arc::new(HashIndex::new()),
        })
    }

    /// The actually bound address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the worker's index.
    pub fn index(&self) -> Arc<HashIndex> {
        self.index.clone()
    }

    /// Run the worker until a shutdown request arrives.
    pub async fn serve(self, mut shutdown: mpsc::Receiver<ShutdownKind>) -> Result<()> {
        if let Some(path) = &self.config.hashfile {
            if let Err(e) = snapshot::load(&self.index, path) {
                tracing::error!(
                    error = %e,
                    "cannot read hash file, it will be created on the next sync"
                );
            }
        }

        let scheduler = Scheduler::new();
        if let Some(path) = &self.config.hashfile {
            scheduler.register(Arc::new(SyncTask::new(
                self.index.clone(),
                path.clone(),
                self.config.expire,
                self.config.sync.clone(),
            )));
        }

        tracing::info!(listen = %self.config.listen, "fuzzy storage worker ready");

        let kind = loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::info!(peer = %peer, "accepted connection");
                            let index = self.index.clone();
                            let timeout = self.config.io_timeout;
                            tokio::spawn(async move {
                                Session::new(stream, timeout).run(&index).await;
                            });
                        }
                        // Another worker on a shared socket won the race.
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            tracing::debug!("socket already accepted by a peer worker");
                        }
                        Err(e) => tracing::warn!(error = %e, "accept failed"),
                    }
                }
                kind = shutdown.recv() => break kind,
            }
        };

        match kind {
            // A dropped channel means the controller is gone; flush as for
            // a terminate so nothing is lost.
            Some(ShutdownKind::Terminate) | None => {
                if let Some(path) = &self.config.hashfile {
                    self.index.force_dirty();
                    if let Err(e) = snapshot::sync(
                        &self.index,
                        path,
                        self.config.expire,
                        self.config.sync.mod_limit,
                        true,
                    ) {
                        tracing::error!(error = %e, "final hash file sync failed");
                    }
                }
                tracing::info!("worker terminating");
            }
            Some(ShutdownKind::Reload) => {
                drop(self.listener);
                tracing::info!(
                    secs = self.config.soft_shutdown.as_secs(),
                    "worker shutdown pending"
                );
                tokio::time::sleep(self.config.soft_shutdown).await;
            }
        }

        scheduler.shutdown().await?;
        Ok(())
    }
}
