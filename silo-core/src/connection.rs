use crate::{Result, RowLabeled, RowNames, RowsAffected, SqlFragment};
use std::time::Duration;

/// One open connection to an engine, supplied by the dialect provider.
///
/// All calls are blocking; `timeout` bounds each statement. The engine never
/// shares a connection between contexts.
pub trait Connection: Send {
    /// Executes a modify statement and reports its effect.
    fn execute(&mut self, statement: &SqlFragment, timeout: Duration) -> Result<RowsAffected>;

    /// Executes a query, returning a forward-only, single-pass cursor.
    fn query<'c>(
        &'c mut self,
        statement: &SqlFragment,
        timeout: Duration,
    ) -> Result<Box<dyn RowCursor + 'c>>;

    /// Best-effort cancellation of the in-flight command. Called when a
    /// statement exceeds its timeout, before the timeout is re-raised.
    fn cancel(&mut self) -> Result<()> {
        Ok(())
    }

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Forward-only iteration over result rows with by-index/by-name column
/// access through [`RowLabeled`].
pub trait RowCursor {
    /// Column names of the result, available before the first row.
    fn labels(&self) -> RowNames;

    /// Advances and returns the next row, or `None` at the end.
    fn next_row(&mut self) -> Option<Result<RowLabeled>>;
}
