use crate::{
    util::separated_by, Dialect, Error, FilterOp, Keyword, Order, QueryTerm, RelationDef,
    RelationKind, Result, SqlFragment, TableDef, TableRegistry, Value,
};
use log::debug;
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;

/// Extraction pattern for terms carrying already-compiled SQL: only the
/// WHERE clause of the embedded statement is re-composed.
static RAW_SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*SELECT\s+.+?\s+FROM\s+\S+(?:\s+WHERE\s+(?P<clause>.+?))?(?:\s+(?:ORDER|OFFSET|LIMIT)\b.*)?\s*$",
    )
    .expect("raw select pattern is valid")
});

fn extract_where(raw: &str) -> Option<String> {
    let captures = RAW_SELECT.captures(raw)?;
    Some(
        captures
            .name("clause")
            .map(|m| m.as_str().trim().to_owned())
            .unwrap_or_default(),
    )
}

/// One inner join discovered while walking always-joined foreign keys.
struct Join {
    parent: &'static str,
    local: &'static str,
    table: &'static TableDef,
    foreign: &'static str,
}

/// An elided join: the foreign table contributes no columns beyond its key,
/// so its key column resolves to the referencing column instead.
struct Redirect {
    column: &'static str,
    parent: &'static str,
    local: &'static str,
    witness: Value,
}

#[derive(Default)]
struct JoinPlan {
    joins: Vec<Join>,
    redirects: Vec<Redirect>,
}

fn alias_for(table: &TableDef, outer: &str, depth: usize) -> String {
    if table.name() == outer {
        format!("{}{}", table.name(), depth)
    } else {
        table.name().to_owned()
    }
}

fn from_sql(table: &TableDef, alias: &str) -> String {
    if alias == table.name() {
        table.name().to_owned()
    } else {
        format!("{} AS {}", table.name(), alias)
    }
}

fn and_fragment(lhs: SqlFragment, rhs: SqlFragment) -> Result<SqlFragment> {
    if rhs.is_empty() {
        return Ok(lhs);
    }
    if lhs.is_empty() {
        return Ok(rhs);
    }
    lhs.append(" AND ", [])?.append_fragment(rhs)
}

/// Replaces a negated comparison with its positive complement, used when the
/// whole sub-query flips to NOT EXISTS.
fn complement(raw: &str) -> String {
    if raw.eq_ignore_ascii_case("null") {
        "!null".to_owned()
    } else {
        raw.strip_prefix('!').unwrap_or(raw).to_owned()
    }
}

/// Compiles path-based filter terms against a root mapping into a full
/// SELECT statement.
///
/// Terms sharing `(path, guard, cast)` compile together as one correlated
/// sub-query; values for one term combine with OR, distinct terms with AND.
pub struct QueryCompiler<'a> {
    registry: &'a TableRegistry,
    dialect: &'a dyn Dialect,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(registry: &'a TableRegistry, dialect: &'a dyn Dialect) -> Self {
        Self { registry, dialect }
    }

    /// Compiles `terms` into a SELECT over `root`.
    pub fn select(
        &self,
        root: &'static TableDef,
        terms: &[(&str, &str)],
    ) -> Result<SqlFragment> {
        self.select_ordered(root, terms, &[])
    }

    /// Compiles a SELECT with an ORDER BY over root-resolvable columns.
    pub fn select_ordered(
        &self,
        root: &'static TableDef,
        terms: &[(&str, &str)],
        order: &[(&str, Order)],
    ) -> Result<SqlFragment> {
        let plan = self.join_plan(root)?;
        let mut fragment = SqlFragment::new(
            format!(
                "SELECT {} FROM {}",
                self.select_list(root, &plan),
                root.name()
            ),
            [],
        )?;
        for join in &plan.joins {
            fragment = fragment.append(
                format!(
                    " INNER JOIN {} ON {}.{} = {}.{}",
                    join.table.name(),
                    join.parent,
                    join.local,
                    join.table.name(),
                    join.foreign
                ),
                [],
            )?;
        }
        fragment = fragment.where_(self.conditions(root, &plan, terms)?)?;
        if !order.is_empty() {
            let mut clause = String::from(" ORDER BY ");
            let mut first = true;
            for (path, direction) in order {
                let (column, _) = self
                    .resolve_column(root, Some(&plan), path)
                    .ok_or_else(|| Error::MissingMember {
                        table: root.name().to_owned(),
                        path: (*path).to_owned(),
                    })?;
                if !first {
                    clause.push_str(", ");
                }
                first = false;
                clause.push_str(&column);
                clause.push_str(match direction {
                    Order::Asc => " ASC",
                    Order::Desc => " DESC",
                });
            }
            fragment = fragment.append(clause, [])?;
        }
        debug!("compiled query {}", fragment);
        Ok(fragment)
    }

    /// Walks the join graph breadth-first from the root, inner-joining each
    /// always-joined foreign table unless it contributes no columns beyond
    /// its key, in which case the join is elided and the key column
    /// redirects to the referencing table.
    fn join_plan(&self, root: &'static TableDef) -> Result<JoinPlan> {
        let mut plan = JoinPlan::default();
        let mut visited: HashSet<&'static str> = HashSet::from([root.name()]);
        let mut queue: VecDeque<&'static TableDef> = VecDeque::from([root]);
        while let Some(table) = queue.pop_front() {
            for column in table.always_joined() {
                let Some(target_ref) = column.references else {
                    continue;
                };
                let Some(target) = self.registry.by_table(target_ref.table) else {
                    return Err(Error::invalid_state(format!(
                        "always-joined table {} is not registered",
                        target_ref.table
                    )));
                };
                if !visited.insert(target.name()) {
                    continue;
                }
                if target.columns.iter().all(|c| c.is_key()) {
                    let witness = target
                        .column(target_ref.name)
                        .map(|c| c.value.clone())
                        .unwrap_or(Value::Null);
                    plan.redirects.push(Redirect {
                        column: target_ref.name,
                        parent: table.name(),
                        local: column.name(),
                        witness,
                    });
                    continue;
                }
                plan.joins.push(Join {
                    parent: table.name(),
                    local: column.name(),
                    table: target,
                    foreign: target_ref.name,
                });
                queue.push_back(target);
            }
        }
        Ok(plan)
    }

    fn select_list(&self, root: &'static TableDef, plan: &JoinPlan) -> String {
        if plan.joins.is_empty() || !self.dialect.features().strict_subquery_columns {
            return "*".to_owned();
        }
        // Ambiguous duplicate names are forbidden: enumerate distinct
        // columns, first occurrence wins.
        let mut seen = HashSet::new();
        let columns: Vec<(&str, &str)> = root
            .columns
            .iter()
            .map(|c| (root.name(), c.name()))
            .chain(
                plan.joins
                    .iter()
                    .flat_map(|j| j.table.columns.iter().map(|c| (j.table.name(), c.name()))),
            )
            .filter(|(_, name)| seen.insert(*name))
            .collect();
        let mut out = String::new();
        separated_by(
            &mut out,
            columns,
            |out, (table, name)| {
                out.push_str(table);
                out.push('.');
                out.push_str(name);
            },
            ", ",
        );
        out
    }

    fn resolve_column(
        &self,
        root: &'static TableDef,
        plan: Option<&JoinPlan>,
        name: &str,
    ) -> Option<(String, Value)> {
        if let Some(column) = root.column(name) {
            return Some((
                format!("{}.{}", root.name(), column.name()),
                column.value.clone(),
            ));
        }
        let plan = plan?;
        for join in &plan.joins {
            if let Some(column) = join.table.column(name) {
                return Some((
                    format!("{}.{}", join.table.name(), column.name()),
                    column.value.clone(),
                ));
            }
        }
        for redirect in &plan.redirects {
            if redirect.column == name {
                return Some((
                    format!("{}.{}", redirect.parent, redirect.local),
                    redirect.witness.clone(),
                ));
            }
        }
        None
    }

    fn conditions(
        &self,
        root: &'static TableDef,
        plan: &JoinPlan,
        terms: &[(&str, &str)],
    ) -> Result<SqlFragment> {
        // Merge values of identical terms, preserving caller order.
        let mut merged: Vec<(&str, QueryTerm, Vec<&str>)> = Vec::new();
        for &(path, value) in terms {
            if let Some(entry) = merged.iter_mut().find(|(p, ..)| *p == path) {
                entry.2.push(value);
            } else {
                merged.push((path, QueryTerm::parse(path)?, vec![value]));
            }
        }
        let mut groups: Vec<(
            (String, Option<String>, Option<String>),
            Vec<(QueryTerm, Vec<&str>)>,
        )> = Vec::new();
        for (_, term, values) in merged {
            let key = (term.path.clone(), term.guard.clone(), term.cast.clone());
            if let Some(group) = groups.iter_mut().find(|(k, _)| *k == key) {
                group.1.push((term, values));
            } else {
                groups.push((key, vec![(term, values)]));
            }
        }
        let mut condition = SqlFragment::empty();
        for (_, items) in &groups {
            condition = and_fragment(condition, self.compile_group(root, plan, items)?)?;
        }
        Ok(condition)
    }

    fn compile_group(
        &self,
        root: &'static TableDef,
        plan: &JoinPlan,
        items: &[(QueryTerm, Vec<&str>)],
    ) -> Result<SqlFragment> {
        let head = &items[0].0;
        if let Some(relation) = root.relation(&head.path) {
            return self.compile_relation(root, root.name(), relation, items, 1);
        }
        if head.subpath.is_some() || head.guard.is_some() || head.cast.is_some() {
            return Err(Error::MissingMember {
                table: root.name().to_owned(),
                path: head.path.clone(),
            });
        }
        let (column, witness) = self
            .resolve_column(root, Some(plan), &head.path)
            .ok_or_else(|| Error::MissingMember {
                table: root.name().to_owned(),
                path: head.path.clone(),
            })?;
        self.compile_values(&column, &witness, &items[0].1)
    }

    /// Compiles one condition term against `table`; used for sub-paths
    /// inside relation sub-queries, where the join plan does not apply.
    fn compile_condition(
        &self,
        table: &'static TableDef,
        alias: &str,
        term: &QueryTerm,
        values: &[&str],
        depth: usize,
    ) -> Result<SqlFragment> {
        if let Some(relation) = table.relation(&term.path) {
            return self.compile_relation(
                table,
                alias,
                relation,
                &[(term.clone(), values.to_vec())],
                depth,
            );
        }
        let missing = || Error::MissingMember {
            table: table.name().to_owned(),
            path: term.path.clone(),
        };
        if term.subpath.is_some() || term.guard.is_some() || term.cast.is_some() {
            return Err(missing());
        }
        let column = table.column(&term.path).ok_or_else(missing)?;
        self.compile_values(
            &format!("{}.{}", alias, column.name()),
            &column.value,
            values,
        )
    }

    fn compile_relation(
        &self,
        owner: &'static TableDef,
        owner_alias: &str,
        relation: &RelationDef,
        items: &[(QueryTerm, Vec<&str>)],
        depth: usize,
    ) -> Result<SqlFragment> {
        let head = &items[0].0;
        let target: &'static TableDef = match &head.cast {
            Some(cast) => self.registry.resolve(cast).ok_or_else(|| Error::MissingMember {
                table: owner.name().to_owned(),
                path: format!("{}@{}", head.path, cast),
            })?,
            None => (relation.target)(),
        };
        let alias = alias_for(target, owner_alias, depth);
        if relation.is_collection() {
            self.compile_collection(owner_alias, relation, target, &alias, items, depth)
        } else {
            self.compile_to_one(owner_alias, relation, target, &alias, items, depth)
        }
    }

    /// A to-one traversal compiles to `col IN (subSelectOfKeys)` rather
    /// than a join, avoiding duplicate-row fan-out.
    fn compile_to_one(
        &self,
        owner_alias: &str,
        relation: &RelationDef,
        target: &'static TableDef,
        alias: &str,
        items: &[(QueryTerm, Vec<&str>)],
        depth: usize,
    ) -> Result<SqlFragment> {
        let local = format!("{}.{}", owner_alias, relation.local);
        let head = &items[0].0;
        // NULL tests on the relation itself stay on the foreign key column.
        if items.len() == 1 && head.subpath.is_none() && items[0].1.len() == 1 {
            match items[0].1[0] {
                "null" => return SqlFragment::new(format!("{} IS NULL", local), []),
                "!null" => return SqlFragment::new(format!("{} IS NOT NULL", local), []),
                _ => {}
            }
        }
        let mut condition = SqlFragment::empty();
        if let Some(guard) = &head.guard {
            condition = and_fragment(condition, self.guard_condition(target, alias, guard, depth + 1)?)?;
        }
        if let Some(soft) = self.soft_delete_exclusion(target, alias, head, items) {
            condition = and_fragment(condition, SqlFragment::new(soft, [])?)?;
        }
        for (term, values) in items {
            let inner = match &term.subpath {
                Some(subpath) => {
                    let subterm = QueryTerm::parse(subpath)?;
                    self.compile_condition(target, alias, &subterm, values, depth + 1)?
                }
                None => self.classifier_values(target, alias, values, depth + 1)?,
            };
            condition = and_fragment(condition, inner)?;
        }
        let sub = SqlFragment::new(
            format!(
                "SELECT {}.{} FROM {}",
                alias,
                relation.foreign,
                from_sql(target, alias)
            ),
            [],
        )?
        .where_(condition)?;
        SqlFragment::new(format!("{} IN (", local), [])?
            .append_fragment(sub)?
            .append(")", [])
    }

    /// A collection traversal compiles to a correlated EXISTS; when the
    /// lone condition is a negated or null match it flips to NOT EXISTS
    /// with the positive complement inside.
    fn compile_collection(
        &self,
        owner_alias: &str,
        relation: &RelationDef,
        target: &'static TableDef,
        alias: &str,
        items: &[(QueryTerm, Vec<&str>)],
        depth: usize,
    ) -> Result<SqlFragment> {
        let head = &items[0].0;
        let negative = items.len() == 1
            && items[0].1.len() == 1
            && FilterOp::parse(items[0].1[0]).map(|op| op.is_negative()).unwrap_or(false);
        let (sub, correlation) = match relation.kind {
            RelationKind::ManyToMany {
                link,
                link_local,
                link_foreign,
            } => {
                let link = link();
                (
                    SqlFragment::new(
                        format!(
                            "SELECT 1 FROM {} INNER JOIN {} ON {}.{} = {}.{}",
                            link.name(),
                            from_sql(target, alias),
                            link.name(),
                            link_foreign,
                            alias,
                            relation.foreign
                        ),
                        [],
                    )?,
                    format!(
                        "{}.{} = {}.{}",
                        link.name(),
                        link_local,
                        owner_alias,
                        relation.local
                    ),
                )
            }
            _ => (
                SqlFragment::new(format!("SELECT 1 FROM {}", from_sql(target, alias)), [])?,
                format!(
                    "{}.{} = {}.{}",
                    alias,
                    relation.foreign,
                    owner_alias,
                    relation.local
                ),
            ),
        };
        let mut condition = SqlFragment::new(correlation, [])?;
        if let Some(guard) = &head.guard {
            condition = and_fragment(condition, self.guard_condition(target, alias, guard, depth + 1)?)?;
        }
        if let Some(soft) = self.soft_delete_exclusion(target, alias, head, items) {
            condition = and_fragment(condition, SqlFragment::new(soft, [])?)?;
        }
        for (term, values) in items {
            let values: Vec<String> = if negative {
                values.iter().map(|v| complement(v)).collect()
            } else {
                values.iter().map(|v| (*v).to_owned()).collect()
            };
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            let inner = match &term.subpath {
                Some(subpath) => {
                    let subterm = QueryTerm::parse(subpath)?;
                    self.compile_condition(target, alias, &subterm, &values, depth + 1)?
                }
                // A bare existence test carries no value condition.
                None if negative && values == ["!null"] => SqlFragment::empty(),
                None => self.classifier_values(target, alias, &values, depth + 1)?,
            };
            condition = and_fragment(condition, inner)?;
        }
        let sub = sub.where_(condition)?;
        SqlFragment::new(if negative { "NOT EXISTS (" } else { "EXISTS (" }, [])?
            .append_fragment(sub)?
            .append(")", [])
    }

    /// `AND target.deleted = FALSE`, unless the guard or a condition names
    /// the soft-delete column explicitly.
    fn soft_delete_exclusion(
        &self,
        target: &'static TableDef,
        alias: &str,
        head: &QueryTerm,
        items: &[(QueryTerm, Vec<&str>)],
    ) -> Option<String> {
        let soft = target.soft_delete?;
        let guarded = head
            .guard
            .as_deref()
            .is_some_and(|g| g.split_once('=').map(|(p, _)| p) == Some(soft));
        let conditioned = items.iter().any(|(term, _)| {
            term.subpath
                .as_deref()
                .is_some_and(|s| s.split(['.', '[', '@']).next() == Some(soft))
        });
        if guarded || conditioned {
            return None;
        }
        Some(format!(
            "{}.{} = {}",
            alias,
            soft,
            self.dialect.keyword(Keyword::False)
        ))
    }

    /// Resolves a guard of the form `prop=value` (or plain `value`, using
    /// the target's declared classifier) into a classifier-chain condition.
    /// `|` separates alternative values.
    fn guard_condition(
        &self,
        target: &'static TableDef,
        alias: &str,
        guard: &str,
        depth: usize,
    ) -> Result<SqlFragment> {
        let (prop, raw) = match guard.split_once('=') {
            Some((prop, raw)) => (prop.to_owned(), raw),
            None => {
                let classifier = target.classifier.ok_or_else(|| Error::MalformedTerm {
                    term: guard.to_owned(),
                    reason: "guard target declares no classifier property",
                })?;
                (classifier.to_owned(), guard)
            }
        };
        let values: Vec<&str> = raw.split('|').collect();
        self.classifier_chain(target, alias, &prop, &values, depth)
    }

    /// Values on a relation with no sub-path compare against the target's
    /// classifier, walking relation hops until a column terminates the
    /// chain.
    fn classifier_values(
        &self,
        table: &'static TableDef,
        alias: &str,
        values: &[&str],
        depth: usize,
    ) -> Result<SqlFragment> {
        let classifier = table.classifier.ok_or_else(|| Error::MissingMember {
            table: table.name().to_owned(),
            path: "<classifier>".to_owned(),
        })?;
        self.classifier_chain(table, alias, classifier, values, depth)
    }

    fn classifier_chain(
        &self,
        table: &'static TableDef,
        alias: &str,
        prop: &str,
        values: &[&str],
        depth: usize,
    ) -> Result<SqlFragment> {
        if let Some(column) = table.column(prop) {
            return self.compile_values(
                &format!("{}.{}", alias, column.name()),
                &column.value,
                values,
            );
        }
        if let Some(relation) = table.relation(prop) {
            let inner = (relation.target)();
            let inner_alias = alias_for(inner, alias, depth);
            let condition = self.classifier_values(inner, &inner_alias, values, depth + 1)?;
            let sub = SqlFragment::new(
                format!(
                    "SELECT {}.{} FROM {}",
                    inner_alias,
                    relation.foreign,
                    from_sql(inner, &inner_alias)
                ),
                [],
            )?
            .where_(condition)?;
            return SqlFragment::new(format!("{}.{} IN (", alias, relation.local), [])?
                .append_fragment(sub)?
                .append(")", []);
        }
        Err(Error::MissingMember {
            table: table.name().to_owned(),
            path: prop.to_owned(),
        })
    }

    /// Compiles the sigil mini-grammar for one column; values combine with
    /// OR, and an adjacent `>`/`<` pair folds into one BETWEEN.
    fn compile_values(
        &self,
        column: &str,
        witness: &Value,
        values: &[&str],
    ) -> Result<SqlFragment> {
        let mut parts: Vec<SqlFragment> = Vec::new();
        let mut i = 0;
        while i < values.len() {
            let raw = values[i];
            if let Some(clause) = extract_where(raw) {
                parts.push(if clause.is_empty() {
                    SqlFragment::new(self.dialect.keyword(Keyword::True), [])?
                } else {
                    SqlFragment::new(format!("({})", clause), [])?
                });
                i += 1;
                continue;
            }
            let op = FilterOp::parse(raw)?;
            let next = values.get(i + 1).map(|v| FilterOp::parse(v)).transpose()?;
            if let (
                FilterOp::Greater(lo) | FilterOp::GreaterEqual(lo),
                Some(FilterOp::Less(hi) | FilterOp::LessEqual(hi)),
            ) = (&op, &next)
            {
                parts.push(SqlFragment::new(
                    format!("{} BETWEEN ? AND ?", column),
                    [self.operand(witness, lo)?, self.operand(witness, hi)?],
                )?);
                i += 2;
                continue;
            }
            parts.push(match op {
                FilterOp::Function {
                    name,
                    args,
                    operand,
                } => {
                    let function = self.dialect.filter_function(&name).ok_or_else(|| {
                        Error::unsupported(format!("filter function `{}`", name))
                    })?;
                    function.compile(column, &args, &operand)?
                }
                FilterOp::Less(v) => self.comparison(column, " < ?", witness, &v)?,
                FilterOp::LessEqual(v) => self.comparison(column, " <= ?", witness, &v)?,
                FilterOp::Greater(v) => self.comparison(column, " > ?", witness, &v)?,
                FilterOp::GreaterEqual(v) => self.comparison(column, " >= ?", witness, &v)?,
                FilterOp::NotNull => SqlFragment::new(format!("{} IS NOT NULL", column), [])?,
                FilterOp::NotEqual(v) => self.comparison(column, " <> ?", witness, &v)?,
                FilterOp::Contains(v) => self.like(column, format!("%{}%", v))?,
                FilterOp::StartsWith(v) => self.like(column, format!("{}%", v))?,
                FilterOp::EndsWith(v) => self.like(column, format!("%{}", v))?,
                FilterOp::Null => SqlFragment::new(format!("{} IS NULL", column), [])?,
                FilterOp::Equal(v) => self.comparison(column, " = ?", witness, &v)?,
            });
            i += 1;
        }
        let mut iter = parts.into_iter();
        let Some(first) = iter.next() else {
            return Ok(SqlFragment::empty());
        };
        let mut rest = iter.peekable();
        if rest.peek().is_none() {
            return Ok(first);
        }
        let mut out = SqlFragment::new("(", [])?.append_fragment(first)?;
        for part in rest {
            out = out.append(" OR ", [])?.append_fragment(part)?;
        }
        out.append(")", [])
    }

    fn comparison(
        &self,
        column: &str,
        operator: &str,
        witness: &Value,
        operand: &str,
    ) -> Result<SqlFragment> {
        SqlFragment::new(
            format!("{}{}", column, operator),
            [self.operand(witness, operand)?],
        )
    }

    fn like(&self, column: &str, pattern: String) -> Result<SqlFragment> {
        SqlFragment::new(
            format!("{} {} ?", column, self.dialect.keyword(Keyword::ILike)),
            [Value::from(pattern)],
        )
    }

    /// Converts the textual operand into the column's value type.
    fn operand(&self, witness: &Value, text: &str) -> Result<Value> {
        Value::Varchar(Some(text.to_owned())).try_convert(witness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{address_def, patient_def, registry, GENERIC};
    use crate::{ColumnDef, ColumnRef, Connection, Features, TableRegistry};

    #[test]
    fn plain_column_condition() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler.select(address_def(), &[("city", "~bos")]).unwrap();
        assert_eq!(query.sql(), "SELECT * FROM address WHERE address.city ILIKE ?");
        assert_eq!(query.args(), &[Value::from("%bos%")]);
    }

    #[test]
    fn always_joined_table_resolves_foreign_columns() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler.select(patient_def(), &[("mnemonic", "ACTIVE")]).unwrap();
        assert_eq!(
            query.sql(),
            "SELECT * FROM patient \
             INNER JOIN concept ON patient.type_concept_id = concept.id \
             WHERE concept.mnemonic = ?"
        );
    }

    #[test]
    fn adjacent_range_terms_fold_to_between() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler
            .select(patient_def(), &[("version", ">=5"), ("version", "<10")])
            .unwrap();
        assert!(query.sql().ends_with("WHERE patient.version BETWEEN ? AND ?"));
        assert_eq!(
            query.args(),
            &[Value::Int32(Some(5)), Value::Int32(Some(10))]
        );
    }

    #[test]
    fn not_null_sigil_binds_no_arguments() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler
            .select(patient_def(), &[("deceased_time", "!null")])
            .unwrap();
        assert!(query.sql().ends_with("WHERE patient.deceased_time IS NOT NULL"));
        assert!(query.args().is_empty());
    }

    #[test]
    fn multiple_values_for_one_path_combine_with_or() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler
            .select(address_def(), &[("city", "boston"), ("city", "salem")])
            .unwrap();
        assert_eq!(
            query.sql(),
            "SELECT * FROM address WHERE (address.city = ? OR address.city = ?)"
        );
    }

    #[test]
    fn distinct_paths_combine_with_and() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler
            .select(address_def(), &[("city", "boston"), ("state", "MA")])
            .unwrap();
        assert_eq!(
            query.sql(),
            "SELECT * FROM address WHERE address.city = ? AND address.state = ?"
        );
    }

    #[test]
    fn guarded_collection_compiles_to_exists() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler
            .select(patient_def(), &[("address[use=home].city", "~bos")])
            .unwrap();
        assert_eq!(
            query.sql(),
            "SELECT * FROM patient \
             INNER JOIN concept ON patient.type_concept_id = concept.id \
             WHERE EXISTS (SELECT 1 FROM address \
             WHERE address.patient_id = patient.id \
             AND address.use_concept_id IN (SELECT concept.id FROM concept WHERE concept.mnemonic = ?) \
             AND address.obsolete = FALSE \
             AND address.city ILIKE ?)"
        );
        assert_eq!(
            query.args(),
            &[Value::from("home"), Value::from("%bos%")]
        );
    }

    #[test]
    fn null_collection_match_flips_to_not_exists() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler.select(patient_def(), &[("address", "null")]).unwrap();
        assert!(query.sql().ends_with(
            "WHERE NOT EXISTS (SELECT 1 FROM address \
             WHERE address.patient_id = patient.id \
             AND address.obsolete = FALSE)"
        ));
        assert!(query.args().is_empty());
    }

    #[test]
    fn to_one_relation_compiles_to_in_subselect() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler
            .select(patient_def(), &[("typeConcept", "DIAGNOSIS")])
            .unwrap();
        assert!(query.sql().ends_with(
            "WHERE patient.type_concept_id IN \
             (SELECT concept.id FROM concept WHERE concept.mnemonic = ?)"
        ));
    }

    #[test]
    fn null_to_one_match_stays_on_foreign_key() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler.select(patient_def(), &[("typeConcept", "null")]).unwrap();
        assert!(query.sql().ends_with("WHERE patient.type_concept_id IS NULL"));
    }

    #[test]
    fn cast_traverses_through_association_table() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler
            .select(patient_def(), &[("related@Patient.name", "^smi")])
            .unwrap();
        assert!(query.sql().ends_with(
            "WHERE EXISTS (SELECT 1 FROM patient_relationship \
             INNER JOIN patient AS patient1 ON patient_relationship.related_id = patient1.id \
             WHERE patient_relationship.patient_id = patient.id \
             AND patient1.name ILIKE ?)"
        ));
        assert_eq!(query.args(), &[Value::from("smi%")]);
    }

    #[test]
    fn embedded_select_contributes_only_its_where_clause() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler
            .select(
                address_def(),
                &[("city", "SELECT * FROM patient WHERE version > 2 ORDER BY version")],
            )
            .unwrap();
        assert_eq!(query.sql(), "SELECT * FROM address WHERE (version > 2)");
        assert!(query.args().is_empty());
    }

    #[test]
    fn unknown_path_is_a_missing_member() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let err = compiler
            .select(address_def(), &[("zip_code", "02101")])
            .unwrap_err();
        assert!(matches!(err, Error::MissingMember { .. }));
    }

    #[test]
    fn ordering_resolves_root_columns() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler
            .select_ordered(address_def(), &[], &[("city", Order::Asc), ("state", Order::Desc)])
            .unwrap();
        assert_eq!(
            query.sql(),
            "SELECT * FROM address ORDER BY address.city ASC, address.state DESC"
        );
    }

    struct StrictDialect;

    impl Dialect for StrictDialect {
        fn name(&self) -> &'static str {
            "strict"
        }
        fn database(&self) -> &str {
            "strict"
        }
        fn features(&self) -> Features {
            Features {
                strict_subquery_columns: true,
                ..Features::default()
            }
        }
        fn open(&self) -> Result<Box<dyn Connection>> {
            Err(Error::unsupported("no connections"))
        }
    }

    #[test]
    fn strict_dialect_enumerates_distinct_columns() {
        let registry = registry();
        let compiler = QueryCompiler::new(&registry, &StrictDialect);
        let query = compiler.select(patient_def(), &[]).unwrap();
        assert_eq!(
            query.sql(),
            "SELECT patient.id, patient.version, patient.name, patient.dob, \
             patient.deceased_time, patient.ssn, patient.type_concept_id, concept.mnemonic \
             FROM patient INNER JOIN concept ON patient.type_concept_id = concept.id"
        );
    }

    use std::sync::LazyLock;

    static PROTOCOL: LazyLock<TableDef> = LazyLock::new(|| {
        TableDef::new("protocol").with_columns(vec![ColumnDef::new(
            "protocol",
            "protocol_uuid",
            Value::Uuid(None),
        )
        .primary_key()])
    });

    static ACT: LazyLock<TableDef> = LazyLock::new(|| {
        TableDef::new("act").with_columns(vec![
            ColumnDef::new("act", "id", Value::Uuid(None)).primary_key(),
            ColumnDef::new("act", "status", Value::Int32(None)),
            ColumnDef::new("act", "protocol_id", Value::Uuid(None))
                .always_join()
                .references(ColumnRef::new("protocol", "protocol_uuid")),
        ])
    });

    fn protocol_def() -> &'static TableDef {
        &PROTOCOL
    }

    fn act_def() -> &'static TableDef {
        &ACT
    }

    #[test]
    fn key_only_join_is_elided_and_redirected() {
        let registry = TableRegistry::builder()
            .register("Act", act_def())
            .register("Protocol", protocol_def())
            .build()
            .unwrap();
        let compiler = QueryCompiler::new(&registry, &GENERIC);
        let query = compiler
            .select(act_def(), &[("protocol_uuid", "7f0c input")])
            .unwrap_err();
        // operand must convert to the key type
        assert!(matches!(query, Error::Backend(..)));
        let query = compiler
            .select(
                act_def(),
                &[("protocol_uuid", "0bd0ce3c-3d5f-4c5e-9b4c-0a2d31e0a1ef")],
            )
            .unwrap();
        assert_eq!(query.sql(), "SELECT * FROM act WHERE act.protocol_id = ?");
        assert!(query.is_balanced());
    }
}
