use crate::{
    Connection, Counter, DatabaseLock, Dialect, EncryptionProvider, EngineConfig, Error,
    LockRegistry, NoopProbe, Probe, Result, RowLabeled, RowsAffected, SqlFragment, TableRegistry,
    Value,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Process-wide entry point: owns the mapping registry, the per-database
/// lock registry and the engine configuration, and opens data contexts.
pub struct Engine {
    registry: Arc<TableRegistry>,
    locks: LockRegistry,
    config: EngineConfig,
    probe: Arc<dyn Probe>,
    encryption: Option<Arc<dyn EncryptionProvider>>,
}

impl Engine {
    pub fn new(registry: TableRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            locks: LockRegistry::new(),
            config: EngineConfig::default(),
            probe: Arc::new(NoopProbe),
            encryption: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_encryption(mut self, provider: Arc<dyn EncryptionProvider>) -> Self {
        self.encryption = Some(provider);
        self
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens a read-only context, acquiring the shared database lock with a
    /// bounded wait.
    pub fn open_read(&self, dialect: Arc<dyn Dialect>) -> Result<DataContext> {
        self.open(dialect, false)
    }

    /// Opens a writable context, acquiring the exclusive database lock with
    /// a bounded wait. Any read lock held by the current thread is released
    /// first.
    pub fn open_write(&self, dialect: Arc<dyn Dialect>) -> Result<DataContext> {
        self.open(dialect, true)
    }

    fn open(&self, dialect: Arc<dyn Dialect>, writable: bool) -> Result<DataContext> {
        let lock = self.locks.lock_for(dialect.database());
        self.probe.increment(Counter::LockWaits);
        let acquired = if writable {
            lock.acquire_write(self.config.write_lock_timeout)
        } else {
            lock.acquire_read(self.config.read_lock_timeout)
        };
        self.probe.decrement(Counter::LockWaits);
        acquired?;
        let connection = match dialect.open() {
            Ok(connection) => connection,
            Err(error) => {
                if writable {
                    lock.release_write();
                } else {
                    lock.release_read();
                }
                return Err(error);
            }
        };
        self.probe.increment(if writable {
            Counter::OpenWriters
        } else {
            Counter::OpenReaders
        });
        Ok(DataContext {
            dialect,
            connection: Mutex::new(Some(connection)),
            lock,
            config: self.config.clone(),
            probe: self.probe.clone(),
            encryption: self.encryption.clone(),
            scratch: Arc::new(Mutex::new(HashMap::new())),
            writable,
            transaction: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        })
    }
}

/// One logical unit of work: an open connection, an optional transaction and
/// a scratch dictionary shared with cloned contexts.
///
/// A context serializes its own statements with a mutex; independent
/// contexts run fully in parallel except where the database lock constrains
/// them. The connection is exclusively owned and never shared with clones.
pub struct DataContext {
    dialect: Arc<dyn Dialect>,
    connection: Mutex<Option<Box<dyn Connection>>>,
    lock: Arc<DatabaseLock>,
    config: EngineConfig,
    probe: Arc<dyn Probe>,
    encryption: Option<Arc<dyn EncryptionProvider>>,
    scratch: Arc<Mutex<HashMap<String, Value>>>,
    writable: bool,
    transaction: AtomicBool,
    disposed: AtomicBool,
}

impl DataContext {
    pub fn dialect(&self) -> &dyn Dialect {
        &*self.dialect
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn encryption(&self) -> Option<&dyn EncryptionProvider> {
        self.encryption.as_deref()
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    fn with_connection<T>(&self, f: impl FnOnce(&mut dyn Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let connection = guard.as_deref_mut().ok_or(Error::Disposed)?;
        f(connection)
    }

    /// Runs one statement under the context mutex with timeout, metrics and
    /// best-effort cancellation applied.
    fn statement<T>(
        &self,
        statement: &SqlFragment,
        f: impl FnOnce(&mut dyn Connection, Duration) -> Result<T>,
    ) -> Result<T> {
        self.ensure_live()?;
        let timeout = self.config.command_timeout;
        self.with_connection(|connection| {
            debug!("executing {}", statement);
            self.probe.increment(Counter::ActiveStatements);
            let started = Instant::now();
            let result = f(connection, timeout);
            self.probe.record_latency(started.elapsed());
            self.probe.decrement(Counter::ActiveStatements);
            match result {
                Err(error) if error.is_timeout() => {
                    if let Err(cancel) = connection.cancel() {
                        warn!("statement cancel failed: {}", cancel);
                    }
                    Err(error)
                }
                other => other,
            }
        })
    }

    /// Executes a modify statement.
    pub fn execute(&self, statement: &SqlFragment) -> Result<RowsAffected> {
        self.statement(statement, |connection, timeout| {
            connection.execute(statement, timeout)
        })
    }

    /// Executes a query and drains the cursor while the statement slot is
    /// held, so the forward-only cursor never outlives its connection
    /// borrow.
    pub fn query_rows(&self, statement: &SqlFragment) -> Result<Vec<RowLabeled>> {
        self.statement(statement, |connection, timeout| {
            let mut cursor = connection.query(statement, timeout)?;
            let mut rows = Vec::new();
            while let Some(row) = cursor.next_row() {
                rows.push(row?);
            }
            Ok(rows)
        })
    }

    /// Executes a query expected to match at most one row. Two or more
    /// matches violate cardinality; zero is an empty result, not an error.
    pub fn single(&self, statement: &SqlFragment) -> Result<Option<RowLabeled>> {
        let rows = self.query_rows(statement)?;
        match rows.len() {
            0 | 1 => Ok(rows.into_iter().next()),
            matched => Err(Error::Cardinality {
                matched: matched as u64,
            }),
        }
    }

    /// Executes a query and returns its first row, if any.
    pub fn first(&self, statement: &SqlFragment) -> Result<Option<RowLabeled>> {
        Ok(self.query_rows(statement)?.into_iter().next())
    }

    pub fn begin(&self) -> Result<()> {
        self.ensure_live()?;
        if !self.writable {
            return Err(Error::invalid_state(
                "cannot begin a transaction on a read-only context",
            ));
        }
        if self.transaction.swap(true, Ordering::SeqCst) {
            return Err(Error::invalid_state("a transaction is already open"));
        }
        self.with_connection(|connection| connection.begin())
    }

    pub fn commit(&self) -> Result<()> {
        self.ensure_live()?;
        if !self.transaction.swap(false, Ordering::SeqCst) {
            return Err(Error::invalid_state("no transaction to commit"));
        }
        self.with_connection(|connection| connection.commit())
    }

    pub fn rollback(&self) -> Result<()> {
        self.ensure_live()?;
        if !self.transaction.swap(false, Ordering::SeqCst) {
            return Err(Error::invalid_state("no transaction to roll back"));
        }
        self.with_connection(|connection| connection.rollback())
    }

    pub fn scratch_get(&self, key: &str) -> Option<Value> {
        self.scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn scratch_set(&self, key: &str, value: Value) {
        self.scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
    }

    /// Advances an engine key sequence through the dialect.
    pub fn next_sequence_value(&self, table: &str, column: &str) -> Result<Value> {
        self.ensure_live()?;
        let dialect = self.dialect.clone();
        self.with_connection(|connection| dialect.next_sequence_value(connection, table, column))
    }

    /// Opens a sibling context for auxiliary queries: same database and
    /// mode, its own connection, the lock re-acquired recursively, and the
    /// scratch dictionary shared.
    pub fn clone_context(&self) -> Result<DataContext> {
        self.ensure_live()?;
        if self.writable {
            self.lock.acquire_write(self.config.write_lock_timeout)?;
        } else {
            self.lock.acquire_read(self.config.read_lock_timeout)?;
        }
        let connection = match self.dialect.open() {
            Ok(connection) => connection,
            Err(error) => {
                if self.writable {
                    self.lock.release_write();
                } else {
                    self.lock.release_read();
                }
                return Err(error);
            }
        };
        self.probe.increment(if self.writable {
            Counter::OpenWriters
        } else {
            Counter::OpenReaders
        });
        Ok(DataContext {
            dialect: self.dialect.clone(),
            connection: Mutex::new(Some(connection)),
            lock: self.lock.clone(),
            config: self.config.clone(),
            probe: self.probe.clone(),
            encryption: self.encryption.clone(),
            scratch: self.scratch.clone(),
            writable: self.writable,
            transaction: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        })
    }

    /// Orderly teardown: rolls back an open transaction, closes the
    /// connection and releases this context's lock hold.
    pub fn close(self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(Error::Disposed);
        }
        let mut result = Ok(());
        if self.transaction.swap(false, Ordering::SeqCst) {
            result = self.with_connection(|connection| connection.rollback());
        }
        if let Some(mut connection) = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let closed = connection.close();
            result = result.and(closed);
        }
        self.release_lock(false);
        result
    }

    /// Abnormal teardown: closes the connection best-effort and
    /// force-releases any lock hold regardless of recursion depth.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut connection) = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            if self.transaction.swap(false, Ordering::SeqCst) {
                if let Err(error) = connection.rollback() {
                    warn!("rollback on dispose failed: {}", error);
                }
            }
            if let Err(error) = connection.close() {
                warn!("connection close on dispose failed: {}", error);
            }
        }
        self.release_lock(true);
    }

    fn release_lock(&self, force: bool) {
        if force {
            self.lock.force_release();
        } else if self.writable {
            self.lock.release_write();
        } else {
            self.lock.release_read();
        }
        self.probe.decrement(if self.writable {
            Counter::OpenWriters
        } else {
            Counter::OpenReaders
        });
    }
}

impl Drop for DataContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Features, RowCursor, RowNames};
    use std::collections::VecDeque;

    struct VecCursor {
        labels: RowNames,
        rows: VecDeque<RowLabeled>,
    }

    impl RowCursor for VecCursor {
        fn labels(&self) -> RowNames {
            self.labels.clone()
        }
        fn next_row(&mut self) -> Option<Result<RowLabeled>> {
            self.rows.pop_front().map(Ok)
        }
    }

    #[derive(Default)]
    struct MockState {
        executed: Mutex<Vec<String>>,
        cancelled: AtomicBool,
    }

    struct MockConnection {
        state: Arc<MockState>,
        rows: Vec<RowLabeled>,
        time_out: bool,
    }

    impl Connection for MockConnection {
        fn execute(&mut self, statement: &SqlFragment, timeout: Duration) -> Result<RowsAffected> {
            self.state
                .executed
                .lock()
                .unwrap()
                .push(statement.sql().to_owned());
            if self.time_out {
                return Err(Error::Timeout { timeout });
            }
            Ok(RowsAffected {
                rows_affected: 1,
                returned_keys: None,
            })
        }

        fn query<'c>(
            &'c mut self,
            statement: &SqlFragment,
            timeout: Duration,
        ) -> Result<Box<dyn RowCursor + 'c>> {
            self.state
                .executed
                .lock()
                .unwrap()
                .push(statement.sql().to_owned());
            if self.time_out {
                return Err(Error::Timeout { timeout });
            }
            let labels: RowNames = self
                .rows
                .first()
                .map(|r| r.labels.clone())
                .unwrap_or_else(|| Arc::from(Vec::new()));
            Ok(Box::new(VecCursor {
                labels,
                rows: self.rows.iter().cloned().collect(),
            }))
        }

        fn cancel(&mut self) -> Result<()> {
            self.state.cancelled.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn begin(&mut self) -> Result<()> {
            Ok(())
        }
        fn commit(&mut self) -> Result<()> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct MockDialect {
        state: Arc<MockState>,
        rows: Vec<RowLabeled>,
        time_out: bool,
    }

    impl Dialect for MockDialect {
        fn name(&self) -> &'static str {
            "mock"
        }
        fn database(&self) -> &str {
            "mock"
        }
        fn features(&self) -> Features {
            Features::default()
        }
        fn open(&self) -> Result<Box<dyn Connection>> {
            Ok(Box::new(MockConnection {
                state: self.state.clone(),
                rows: self.rows.clone(),
                time_out: self.time_out,
            }))
        }
    }

    fn row(id: i32) -> RowLabeled {
        RowLabeled::new(
            Arc::from(vec!["id".to_owned()]),
            vec![Value::Int32(Some(id))].into(),
        )
    }

    fn engine() -> Engine {
        Engine::new(crate::fixtures::registry())
    }

    #[test]
    fn timed_out_statement_is_cancelled_and_reraised() {
        let state = Arc::new(MockState::default());
        let dialect = Arc::new(MockDialect {
            state: state.clone(),
            rows: vec![],
            time_out: true,
        });
        let context = engine().open_write(dialect).unwrap();
        let statement = SqlFragment::new("DELETE FROM patient", []).unwrap();
        let err = context.execute(&statement).unwrap_err();
        assert!(err.is_timeout());
        assert!(state.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn single_enforces_cardinality() {
        let state = Arc::new(MockState::default());
        let dialect = Arc::new(MockDialect {
            state,
            rows: vec![row(1), row(2)],
            time_out: false,
        });
        let context = engine().open_read(dialect).unwrap();
        let statement = SqlFragment::new("SELECT * FROM patient", []).unwrap();
        let err = context.single(&statement).unwrap_err();
        assert!(matches!(err, Error::Cardinality { matched: 2 }));
    }

    #[test]
    fn single_on_empty_result_is_none() {
        let state = Arc::new(MockState::default());
        let dialect = Arc::new(MockDialect {
            state,
            rows: vec![],
            time_out: false,
        });
        let context = engine().open_read(dialect).unwrap();
        let statement = SqlFragment::new("SELECT * FROM patient", []).unwrap();
        assert!(context.single(&statement).unwrap().is_none());
    }

    #[test]
    fn disposed_context_rejects_statements() {
        let state = Arc::new(MockState::default());
        let dialect = Arc::new(MockDialect {
            state,
            rows: vec![],
            time_out: false,
        });
        let context = engine().open_read(dialect).unwrap();
        context.dispose();
        let statement = SqlFragment::new("SELECT 1", []).unwrap();
        assert!(matches!(
            context.query_rows(&statement),
            Err(Error::Disposed)
        ));
    }

    #[test]
    fn cloned_context_shares_scratch_but_not_connection() {
        let state = Arc::new(MockState::default());
        let dialect = Arc::new(MockDialect {
            state,
            rows: vec![],
            time_out: false,
        });
        let context = engine().open_write(dialect).unwrap();
        let sibling = context.clone_context().unwrap();
        context.scratch_set("actor", Value::from("system"));
        assert_eq!(sibling.scratch_get("actor"), Some(Value::from("system")));
        sibling.close().unwrap();
        // the original context still works after the sibling is gone
        let statement = SqlFragment::new("SELECT 1", []).unwrap();
        assert!(context.query_rows(&statement).is_ok());
    }

    #[test]
    fn transactions_require_a_writable_context() {
        let state = Arc::new(MockState::default());
        let dialect = Arc::new(MockDialect {
            state,
            rows: vec![],
            time_out: false,
        });
        let context = engine().open_read(dialect).unwrap();
        assert!(matches!(context.begin(), Err(Error::InvalidState { .. })));
    }
}
