use crate::{
    marshal::Marshaller, AsValue, ColumnDef, DataContext, Entity, Error, Record, Result,
    RowLabeled, SqlFragment, TableDef,
};

/// One ordering direction for [`ResultSet::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

fn ordered(statement: SqlFragment, column: &str, direction: Direction) -> Result<SqlFragment> {
    // first key opens the clause, later keys extend it
    let separator = if statement.sql().contains(" ORDER BY ") {
        ", "
    } else {
        " ORDER BY "
    };
    statement.append(format!("{}{} {}", separator, column, direction.keyword()), [])
}

fn distinct(statement: SqlFragment) -> Result<SqlFragment> {
    SqlFragment::new("SELECT DISTINCT * FROM (", [])?
        .append_fragment(statement)?
        .append(") AS distinct_rows", [])
}

fn combined(left: SqlFragment, keyword: &str, right: SqlFragment) -> Result<SqlFragment> {
    left.append(keyword, [])?.append_fragment(right)
}

fn counted(statement: SqlFragment) -> Result<SqlFragment> {
    SqlFragment::new("SELECT COUNT(*) FROM (", [])?
        .append_fragment(statement)?
        .append(") AS counted", [])
}

/// A deferred query over one context.
///
/// Composition methods rewrite the underlying statement; nothing touches the
/// engine until a terminal method runs. Terminal methods re-execute the
/// statement each time they are called, so a result set can be counted and
/// then enumerated, or enumerated twice.
pub struct ResultSet<'a> {
    context: &'a DataContext,
    statement: SqlFragment,
}

impl<'a> ResultSet<'a> {
    /// Wraps a SELECT statement. Anything else cannot be composed or
    /// enumerated and is rejected up front.
    pub fn new(context: &'a DataContext, statement: SqlFragment) -> Result<Self> {
        if !statement.is_select() {
            return Err(Error::invalid_state(
                "result sets wrap plain SELECT statements only",
            ));
        }
        Ok(Self { context, statement })
    }

    pub fn statement(&self) -> &SqlFragment {
        &self.statement
    }

    pub fn skip(self, n: u64) -> Result<Self> {
        Ok(Self {
            statement: self.statement.offset(n)?,
            ..self
        })
    }

    pub fn take(self, n: u64) -> Result<Self> {
        Ok(Self {
            statement: self.statement.limit(n)?,
            ..self
        })
    }

    pub fn order_by(self, column: &str, direction: Direction) -> Result<Self> {
        Ok(Self {
            statement: ordered(self.statement, column, direction)?,
            ..self
        })
    }

    /// Collapses duplicate rows by wrapping the statement in a DISTINCT
    /// sub-select, which keeps already-appended clauses intact.
    pub fn distinct(self) -> Result<Self> {
        Ok(Self {
            statement: distinct(self.statement)?,
            ..self
        })
    }

    pub fn union(self, other: ResultSet<'_>) -> Result<Self> {
        self.combine(" UNION ", other)
    }

    pub fn intersect(self, other: ResultSet<'_>) -> Result<Self> {
        self.combine(" INTERSECT ", other)
    }

    pub fn except(self, other: ResultSet<'_>) -> Result<Self> {
        self.combine(" EXCEPT ", other)
    }

    fn combine(self, keyword: &str, other: ResultSet<'_>) -> Result<Self> {
        Ok(Self {
            statement: combined(self.statement, keyword, other.statement)?,
            ..self
        })
    }

    /// Reduces the projection to the table's primary key columns, for use as
    /// an IN sub-query against another statement.
    pub fn keys(self, table: &TableDef) -> Result<SqlFragment> {
        let names: Vec<&str> = table.primary_key().map(ColumnDef::name).collect();
        self.statement.wrap_subquery(Some(&names), "keys")
    }

    /// Executes the statement and returns the raw labeled rows.
    pub fn rows(&self) -> Result<Vec<RowLabeled>> {
        self.context.query_rows(&self.statement)
    }

    /// Executes and materializes each row as `E`.
    pub fn entities<E: Entity>(&self) -> Result<Vec<E>> {
        let marshaller = Marshaller::new(self.context.encryption());
        self.rows()?
            .iter()
            .map(|row| marshaller.entity(row))
            .collect()
    }

    /// Executes and materializes each row as a dynamically typed record.
    pub fn records(&self) -> Result<Vec<Record>> {
        let marshaller = Marshaller::new(self.context.encryption());
        Ok(self.rows()?.iter().map(|row| marshaller.record(row)).collect())
    }

    /// Executes and converts the first column of each row.
    pub fn scalars<T: AsValue>(&self) -> Result<Vec<T>> {
        let marshaller = Marshaller::new(self.context.encryption());
        self.rows()?
            .iter()
            .map(|row| marshaller.scalar(row))
            .collect()
    }

    /// Executes the statement expecting at most one row.
    pub fn single<E: Entity>(&self) -> Result<Option<E>> {
        let marshaller = Marshaller::new(self.context.encryption());
        self.context
            .single(&self.statement)?
            .map(|row| marshaller.entity(&row))
            .transpose()
    }

    /// Counts matching rows without materializing them, by wrapping the
    /// statement in a COUNT sub-select so its clauses keep applying.
    pub fn count(&self) -> Result<u64> {
        let marshaller = Marshaller::new(self.context.encryption());
        match self.context.single(&counted(self.statement.clone())?)? {
            Some(row) => marshaller.scalar(&row),
            None => Ok(0),
        }
    }

    /// Whether at least one row matches, fetching at most one.
    pub fn any(&self) -> Result<bool> {
        let probe = SqlFragment::new("SELECT 1 FROM (", [])?
            .append_fragment(self.statement.clone())?
            .append(") AS probed", [])?
            .limit(1)?;
        Ok(!self.context.query_rows(&probe)?.is_empty())
    }
}
