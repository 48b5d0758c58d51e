use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters the engine reports to a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    ActiveStatements,
    OpenReaders,
    OpenWriters,
    LockWaits,
}

/// Fire-and-forget observability hook. Implementations must never block the
/// calling statement.
pub trait Probe: Send + Sync {
    fn increment(&self, counter: Counter);
    fn decrement(&self, counter: Counter);
    fn record_latency(&self, elapsed: Duration);
}

/// Probe that discards every observation.
#[derive(Debug, Default)]
pub struct NoopProbe;

impl Probe for NoopProbe {
    fn increment(&self, _counter: Counter) {}
    fn decrement(&self, _counter: Counter) {}
    fn record_latency(&self, _elapsed: Duration) {}
}

/// Lock-free counter probe. Latency is tracked as a running sum and count,
/// yielding an average on demand.
#[derive(Debug, Default)]
pub struct AtomicProbe {
    active_statements: AtomicU64,
    open_readers: AtomicU64,
    open_writers: AtomicU64,
    lock_waits: AtomicU64,
    latency_micros: AtomicU64,
    latency_count: AtomicU64,
}

impl AtomicProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::ActiveStatements => &self.active_statements,
            Counter::OpenReaders => &self.open_readers,
            Counter::OpenWriters => &self.open_writers,
            Counter::LockWaits => &self.lock_waits,
        }
    }

    pub fn value(&self, counter: Counter) -> u64 {
        self.cell(counter).load(Ordering::Relaxed)
    }

    pub fn average_latency(&self) -> Duration {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.latency_micros.load(Ordering::Relaxed) / count)
    }
}

impl Probe for AtomicProbe {
    fn increment(&self, counter: Counter) {
        self.cell(counter).fetch_add(1, Ordering::Relaxed);
    }

    fn decrement(&self, counter: Counter) {
        let cell = self.cell(counter);
        let mut current = cell.load(Ordering::Relaxed);
        while current > 0 {
            match cell.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(..) => break,
                Err(observed) => current = observed,
            }
        }
    }

    fn record_latency(&self, elapsed: Duration) {
        self.latency_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }
}
