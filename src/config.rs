use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the fuzzy storage worker
#[derive(Debug, Clone)]
pub struct FuzzyConfig {
    /// Address to listen on (default: 127.0.0.1:11335)
    pub listen: SocketAddr,

    /// Path to the on-disk hash file; absent means in-memory only
    pub hashfile: Option<PathBuf>,

    /// Record time-to-live (default: 2 days)
    pub expire: Duration,

    /// Per-connection read timeout (default: 5s)
    pub io_timeout: Duration,

    /// How long to drain in-flight sessions on reload (default: 10s)
    pub soft_shutdown: Duration,

    /// Sync timer configuration
    pub sync: SyncConfig,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base interval between sync considerations (default: 60s)
    pub interval: Duration,

    /// Additional random delay, as a fraction of the interval (default: 1.0,
    /// i.e. each timer fires between interval and 2x interval)
    pub jitter_frac: f64,

    /// Number of modifications that triggers a hash file rewrite (default: 10,000)
    pub mod_limit: u32,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 11335)),
            hashfile: None,
            expire: Duration::from_secs(172_800), // 2 days
            io_timeout: Duration::from_secs(5),
            soft_shutdown: Duration::from_secs(10),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            jitter_frac: 1.0,
            mod_limit: 10_000,
        }
    }
}

impl FuzzyConfig {
    /// Create a new config listening on the given address
    pub fn new(listen: SocketAddr) -> Self {
        Self {
            listen,
            ..Default::default()
        }
    }

    /// Set the listen address
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.listen = addr;
        self
    }

    /// Set the hash file path
    pub fn hashfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.hashfile = Some(path.into());
        self
    }

    /// Set the record TTL
    pub fn expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    /// Set the per-connection read timeout
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Set the reload drain window
    pub fn soft_shutdown(mut self, window: Duration) -> Self {
        self.soft_shutdown = window;
        self
    }

    /// Configure the sync timer
    pub fn sync(mut self, config: SyncConfig) -> Self {
        self.sync = config;
        self
    }
}

impl SyncConfig {
    /// Set the base sync interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the jitter fraction
    pub fn jitter_frac(mut self, frac: f64) -> Self {
        self.jitter_frac = frac;
        self
    }

    /// Set the modification threshold
    pub fn mod_limit(mut self, limit: u32) -> Self {
        self.mod_limit = limit;
        self
    }
}
