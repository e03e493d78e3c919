use std::time::Duration;

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_MAX_IDLE_PER_HOST: usize = 4;

/// Tunables shared by the topology monitor and the connection pool.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    heartbeat_interval: Option<Duration>,
    probe_timeout: Duration,
    connect_timeout: Duration,
    max_idle_per_host: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
        }
    }
}

// Mutators
impl ClientOptions {
    /// Options for tests: no background refresh and short timeouts.
    pub fn default_for_testing() -> Self {
        Self {
            heartbeat_interval: None,
            probe_timeout: Duration::from_millis(500),
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    /// How often the monitor refreshes on its own. `None` disables periodic refresh.
    pub fn set_heartbeat_interval(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn set_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn set_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn set_max_idle_per_host(mut self, max_idle: usize) -> Self {
        self.max_idle_per_host = max_idle;
        self
    }
}

// Getters
impl ClientOptions {
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn max_idle_per_host(&self) -> usize {
        self.max_idle_per_host
    }
}
