use std::time::Duration;

/// Engine-level tuning knobs, shared by every context the engine opens.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline applied to each statement; exceeding it cancels the command
    /// best-effort and surfaces a timeout.
    pub command_timeout: Duration,
    /// Bounded wait for the shared lock when opening a read-only context.
    pub read_lock_timeout: Duration,
    /// Bounded wait for the exclusive lock when opening a writable context.
    pub write_lock_timeout: Duration,
    /// Chunk size for `IN (...)` lists, bounded by engine parameter limits.
    pub in_clause_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            read_lock_timeout: Duration::from_secs(15),
            write_lock_timeout: Duration::from_secs(2),
            in_clause_batch: 500,
        }
    }
}

impl EngineConfig {
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn read_lock_timeout(mut self, timeout: Duration) -> Self {
        self.read_lock_timeout = timeout;
        self
    }

    pub fn write_lock_timeout(mut self, timeout: Duration) -> Self {
        self.write_lock_timeout = timeout;
        self
    }

    pub fn in_clause_batch(mut self, batch: usize) -> Self {
        self.in_clause_batch = batch.max(1);
        self
    }
}
