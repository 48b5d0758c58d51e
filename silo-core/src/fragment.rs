use crate::{Error, Result, Value};
use std::fmt::{self, Display};

/// A composable unit of SQL: text with `?` placeholders and the ordered
/// argument list bound to them.
///
/// The invariant `placeholders(sql) == args.len()` holds after every
/// operation. Fragments are built by value: each operation consumes the
/// fragment and returns a new one, and [`SqlFragment::prepare`] yields an
/// immutable copy that rejects further mutation with
/// [`Error::InvalidState`].
#[derive(Debug, Default, Clone)]
pub struct SqlFragment {
    sql: String,
    args: Vec<Value>,
    alias: Option<String>,
    /// (text length, argument count) snapshots taken before each append,
    /// letting `remove_last` pop the most recent piece.
    marks: Vec<(usize, usize)>,
    prepared: bool,
}

fn placeholders(sql: &str) -> usize {
    sql.chars().filter(|c| *c == '?').count()
}

impl SqlFragment {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a fragment from text and its bound arguments.
    pub fn new(sql: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Result<Self> {
        Self::empty().append(sql, args)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }

    /// Whether the statement is a plain SELECT, the only form that may be
    /// ordered or wrapped into result-set compositions.
    pub fn is_select(&self) -> bool {
        self.sql.trim_start().get(..7).is_some_and(|s| {
            s.eq_ignore_ascii_case("SELECT ")
        })
    }

    fn mutable(self, operation: &str) -> Result<Self> {
        if self.prepared {
            return Err(Error::invalid_state(format!(
                "cannot {} a prepared fragment",
                operation
            )));
        }
        Ok(self)
    }

    /// Appends raw text and the arguments bound to its placeholders.
    pub fn append(
        self,
        sql: impl Into<String>,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Self> {
        let mut this = self.mutable("append to")?;
        let sql = sql.into();
        let args: Vec<Value> = args.into_iter().collect();
        if placeholders(&sql) != args.len() {
            return Err(Error::invalid_state(format!(
                "fragment `{}` has {} placeholders but {} arguments",
                sql,
                placeholders(&sql),
                args.len()
            )));
        }
        this.marks.push((this.sql.len(), this.args.len()));
        this.sql.push_str(&sql);
        this.args.extend(args);
        Ok(this)
    }

    /// Appends another fragment, keeping both argument lists aligned.
    pub fn append_fragment(self, other: SqlFragment) -> Result<Self> {
        let mut this = self.mutable("append to")?;
        this.marks.push((this.sql.len(), this.args.len()));
        this.sql.push_str(&other.sql);
        this.args.extend(other.args);
        Ok(this)
    }

    /// Appends a parenthesized conjunction: ` AND (sql)`.
    pub fn and(self, sql: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Result<Self> {
        let prefix = if self.sql.trim_end().is_empty()
            || self.sql.trim_end().ends_with("WHERE")
        {
            ""
        } else {
            " AND "
        };
        self.append(format!("{}({})", prefix, sql.into()), args)
    }

    /// Appends a parenthesized disjunction: ` OR (sql)`.
    pub fn or(self, sql: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Result<Self> {
        let prefix = if self.sql.trim_end().is_empty() {
            ""
        } else {
            " OR "
        };
        self.append(format!("{}({})", prefix, sql.into()), args)
    }

    /// Appends a WHERE clause built from `condition`.
    pub fn where_(self, condition: SqlFragment) -> Result<Self> {
        if condition.is_empty() {
            return Ok(self);
        }
        self.append(" WHERE ", [])?.append_fragment(condition)
    }

    pub fn limit(self, n: u64) -> Result<Self> {
        self.append(format!(" LIMIT {}", n), [])
    }

    pub fn offset(self, n: u64) -> Result<Self> {
        self.append(format!(" OFFSET {}", n), [])
    }

    /// Strips the most recently appended text/argument pair, e.g. to pop a
    /// trailing separator.
    pub fn remove_last(self) -> Result<Self> {
        let mut this = self.mutable("remove from")?;
        let Some((sql_len, arg_len)) = this.marks.pop() else {
            return Err(Error::invalid_state(
                "remove_last on a fragment with no appended parts",
            ));
        };
        this.sql.truncate(sql_len);
        this.args.truncate(arg_len);
        Ok(this)
    }

    /// Wraps this statement as a sub-query: `SELECT <columns|*> FROM (..) AS
    /// <alias>`. Works on prepared fragments too, producing a new fragment.
    pub fn wrap_subquery(&self, columns: Option<&[&str]>, alias: &str) -> Result<SqlFragment> {
        let mut sql = String::with_capacity(self.sql.len() + 32);
        sql.push_str("SELECT ");
        match columns {
            Some(cols) if !cols.is_empty() => {
                crate::util::separated_by(&mut sql, cols.iter(), |out, c| out.push_str(c), ", ");
            }
            _ => sql.push('*'),
        }
        sql.push_str(" FROM (");
        sql.push_str(&self.sql);
        sql.push_str(") AS ");
        sql.push_str(alias);
        Ok(SqlFragment {
            sql,
            args: self.args.clone(),
            alias: Some(alias.to_owned()),
            marks: Vec::new(),
            prepared: false,
        })
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Resolves the fragment into its immutable, executable form. Trailing
    /// whitespace is trimmed and the append history dropped.
    pub fn prepare(mut self) -> SqlFragment {
        let len = self.sql.trim_end().len();
        self.sql.truncate(len);
        self.marks.clear();
        self.prepared = true;
        self
    }

    /// Re-opens a prepared fragment as a fresh builder copy.
    pub fn to_builder(&self) -> SqlFragment {
        SqlFragment {
            sql: self.sql.clone(),
            args: self.args.clone(),
            alias: self.alias.clone(),
            marks: vec![(0, 0)],
            prepared: false,
        }
    }

    /// Verifies the placeholder/argument parity invariant.
    pub fn is_balanced(&self) -> bool {
        placeholders(&self.sql) == self.args.len()
    }
}

impl Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::truncate_long!(self.sql))?;
        if !self.args.is_empty() {
            let mut rendered = String::new();
            crate::util::separated_by(
                &mut rendered,
                &self.args,
                |out, v| v.write_literal(out),
                ", ",
            );
            write!(f, " [{}]", crate::truncate_long!(rendered))?;
        }
        Ok(())
    }
}
