//! Typed query builder over `sqlx::QueryBuilder`.
//!
//! Mirrors the select / insert / update / delete contract the services rely on:
//! named tables, filter predicates, ordering, offset/limit ranges and the
//! one-row expectation `single()`. Column names are compile-time strings owned by
//! the services; every value goes through a bind parameter.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Executor, FromRow, QueryBuilder};
use uuid::Uuid;

use crate::backend::pagination::PageRequest;
use crate::backend::{BackendError, Table};

/// A bindable value. Nullable kinds carry an `Option` so NULL keeps its column type.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Text(Option<String>),
    Int(Option<i32>),
    Bool(bool),
    Uuid(Option<Uuid>),
    Date(Option<NaiveDate>),
    Timestamp(Option<DateTime<Utc>>),
    TextArray(Vec<String>),
    UuidArray(Vec<Uuid>),
}

impl From<&str> for Bind {
    fn from(v: &str) -> Self {
        Bind::Text(Some(v.to_string()))
    }
}

impl From<String> for Bind {
    fn from(v: String) -> Self {
        Bind::Text(Some(v))
    }
}

impl From<Option<String>> for Bind {
    fn from(v: Option<String>) -> Self {
        Bind::Text(v)
    }
}

impl From<i32> for Bind {
    fn from(v: i32) -> Self {
        Bind::Int(Some(v))
    }
}

impl From<Option<i32>> for Bind {
    fn from(v: Option<i32>) -> Self {
        Bind::Int(v)
    }
}

impl From<bool> for Bind {
    fn from(v: bool) -> Self {
        Bind::Bool(v)
    }
}

impl From<Uuid> for Bind {
    fn from(v: Uuid) -> Self {
        Bind::Uuid(Some(v))
    }
}

impl From<Option<Uuid>> for Bind {
    fn from(v: Option<Uuid>) -> Self {
        Bind::Uuid(v)
    }
}

impl From<NaiveDate> for Bind {
    fn from(v: NaiveDate) -> Self {
        Bind::Date(Some(v))
    }
}

impl From<Option<NaiveDate>> for Bind {
    fn from(v: Option<NaiveDate>) -> Self {
        Bind::Date(v)
    }
}

impl From<DateTime<Utc>> for Bind {
    fn from(v: DateTime<Utc>) -> Self {
        Bind::Timestamp(Some(v))
    }
}

impl From<Option<DateTime<Utc>>> for Bind {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        Bind::Timestamp(v)
    }
}

impl From<Vec<String>> for Bind {
    fn from(v: Vec<String>) -> Self {
        Bind::TextArray(v)
    }
}

impl From<Vec<Uuid>> for Bind {
    fn from(v: Vec<Uuid>) -> Self {
        Bind::UuidArray(v)
    }
}

fn push_bind(qb: &mut QueryBuilder<'static, Postgres>, value: Bind) {
    match value {
        Bind::Text(v) => qb.push_bind(v),
        Bind::Int(v) => qb.push_bind(v),
        Bind::Bool(v) => qb.push_bind(v),
        Bind::Uuid(v) => qb.push_bind(v),
        Bind::Date(v) => qb.push_bind(v),
        Bind::Timestamp(v) => qb.push_bind(v),
        Bind::TextArray(v) => qb.push_bind(v),
        Bind::UuidArray(v) => qb.push_bind(v),
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Row predicates. All predicates in a query are combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Bind),
    /// `column = ANY($n)`; the bind must be an array.
    In(&'static str, Bind),
    /// Case-insensitive substring match.
    ILike(&'static str, String),
    /// Case-insensitive substring match against any of the columns.
    AnyILike(Vec<&'static str>, String),
    /// `$n = ANY(column)` for array columns.
    ArrayContains(&'static str, Bind),
}

/// Escapes LIKE metacharacters and wraps the term for a substring match.
pub fn contains_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'static, Postgres>, filters: &[Filter]) {
    for (i, filter) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match filter.clone() {
            Filter::Eq(col, v) => {
                qb.push(col).push(" = ");
                push_bind(qb, v);
            }
            Filter::In(col, v) => {
                qb.push(col).push(" = ANY(");
                push_bind(qb, v);
                qb.push(")");
            }
            Filter::ILike(col, term) => {
                qb.push(col).push(" ILIKE ");
                qb.push_bind(contains_pattern(&term));
            }
            Filter::AnyILike(cols, term) => {
                let pattern = contains_pattern(&term);
                qb.push("(");
                for (j, col) in cols.iter().enumerate() {
                    if j > 0 {
                        qb.push(" OR ");
                    }
                    qb.push(*col).push(" ILIKE ");
                    qb.push_bind(pattern.clone());
                }
                qb.push(")");
            }
            Filter::ArrayContains(col, v) => {
                push_bind(qb, v);
                qb.push(" = ANY(").push(col).push(")");
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SELECT
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Select {
    table: Table,
    columns: String,
    joins: Vec<&'static str>,
    filters: Vec<Filter>,
    order: Vec<(&'static str, Direction)>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Select {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            columns: format!("{}.*", table.as_str()),
            joins: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    /// Appends a raw join clause, e.g. `LEFT JOIN profiles author ON author.id = posts.author_id`.
    pub fn join(mut self, clause: &'static str) -> Self {
        self.joins.push(clause);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<Bind>) -> Self {
        self.filter(Filter::Eq(column, value.into()))
    }

    pub fn order(mut self, column: &'static str, direction: Direction) -> Self {
        self.order.push((column, direction));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn range(mut self, offset: i64, limit: i64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn page(self, page: &PageRequest) -> Self {
        self.range(page.offset(), page.limit())
    }

    fn push_from(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        qb.push(" FROM ").push(self.table.as_str());
        for join in &self.joins {
            qb.push(" ").push(*join);
        }
        push_filters(qb, &self.filters);
    }

    pub fn build(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(&self.columns);
        self.push_from(&mut qb);
        for (i, (col, dir)) in self.order.iter().enumerate() {
            qb.push(if i == 0 { " ORDER BY " } else { ", " });
            qb.push(*col).push(" ").push(dir.as_sql());
        }
        if let Some(limit) = self.limit {
            qb.push(" LIMIT ").push(limit.to_string());
        }
        if let Some(offset) = self.offset {
            qb.push(" OFFSET ").push(offset.to_string());
        }
        qb
    }

    fn build_count(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*)");
        self.push_from(&mut qb);
        qb
    }

    pub async fn fetch_all<'c, T, E>(&self, executor: E) -> Result<Vec<T>, BackendError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        E: Executor<'c, Database = Postgres>,
    {
        let mut qb = self.build();
        qb.build_query_as::<T>()
            .fetch_all(executor)
            .await
            .map_err(|e| BackendError::classify(self.table, e))
    }

    /// Exactly one row expected; zero rows is `NotFound`.
    pub async fn single<'c, T, E>(&self, executor: E) -> Result<T, BackendError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        E: Executor<'c, Database = Postgres>,
    {
        self.maybe_single(executor)
            .await?
            .ok_or(BackendError::NotFound {
                table: self.table.as_str(),
            })
    }

    pub async fn maybe_single<'c, T, E>(&self, executor: E) -> Result<Option<T>, BackendError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        E: Executor<'c, Database = Postgres>,
    {
        let mut qb = self.build();
        qb.build_query_as::<T>()
            .fetch_optional(executor)
            .await
            .map_err(|e| BackendError::classify(self.table, e))
    }

    pub async fn count<'c, E>(&self, executor: E) -> Result<i64, BackendError>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let mut qb = self.build_count();
        qb.build_query_scalar::<i64>()
            .fetch_one(executor)
            .await
            .map_err(|e| BackendError::classify(self.table, e))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// INSERT / UPSERT
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Insert {
    table: Table,
    columns: Vec<&'static str>,
    rows: Vec<Vec<Bind>>,
    /// Upsert conflict keys.
    conflict_keys: Option<Vec<&'static str>>,
}

impl Insert {
    pub fn into(table: Table) -> Self {
        Self {
            table,
            columns: Vec::new(),
            rows: vec![Vec::new()],
            conflict_keys: None,
        }
    }

    /// Multi-row insert with a fixed column list.
    pub fn many(table: Table, columns: &[&'static str], rows: Vec<Vec<Bind>>) -> Self {
        Self {
            table,
            columns: columns.to_vec(),
            rows,
            conflict_keys: None,
        }
    }

    /// Adds a column to a single-row insert.
    pub fn value(mut self, column: &'static str, value: impl Into<Bind>) -> Self {
        self.columns.push(column);
        if let Some(row) = self.rows.first_mut() {
            row.push(value.into());
        }
        self
    }

    /// `ON CONFLICT (keys) DO UPDATE` every non-key column from the incoming row.
    pub fn upsert(mut self, keys: &[&'static str]) -> Self {
        self.conflict_keys = Some(keys.to_vec());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }

    pub fn build(&self, returning: bool) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("INSERT INTO ");
        qb.push(self.table.as_str()).push(" (");
        qb.push(self.columns.join(", "));
        qb.push(") VALUES ");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push("(");
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    qb.push(", ");
                }
                push_bind(&mut qb, value.clone());
            }
            qb.push(")");
        }

        if let Some(keys) = &self.conflict_keys {
            let updates: Vec<String> = self
                .columns
                .iter()
                .filter(|c| !keys.contains(c))
                .map(|c| format!("{c} = EXCLUDED.{c}"))
                .collect();
            qb.push(" ON CONFLICT (").push(keys.join(", ")).push(")");
            if updates.is_empty() {
                qb.push(" DO NOTHING");
            } else {
                qb.push(" DO UPDATE SET ").push(updates.join(", "));
            }
        }

        if returning {
            qb.push(" RETURNING *");
        }
        qb
    }

    pub async fn execute<'c, E>(&self, executor: E) -> Result<u64, BackendError>
    where
        E: Executor<'c, Database = Postgres>,
    {
        if self.is_empty() {
            return Ok(0);
        }
        let mut qb = self.build(false);
        qb.build()
            .execute(executor)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| BackendError::classify(self.table, e))
    }

    /// Inserts a single row and returns it as stored.
    pub async fn returning<'c, T, E>(&self, executor: E) -> Result<T, BackendError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        E: Executor<'c, Database = Postgres>,
    {
        let mut qb = self.build(true);
        qb.build_query_as::<T>()
            .fetch_one(executor)
            .await
            .map_err(|e| BackendError::classify(self.table, e))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// UPDATE
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Assignment {
    Value(&'static str, Bind),
    Now(&'static str),
    /// `column = COALESCE(column, now())`
    NowIfNull(&'static str),
}

#[derive(Debug, Clone)]
pub struct Update {
    table: Table,
    assignments: Vec<Assignment>,
    filters: Vec<Filter>,
}

impl Update {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            assignments: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn set(mut self, column: &'static str, value: impl Into<Bind>) -> Self {
        self.assignments.push(Assignment::Value(column, value.into()));
        self
    }

    /// Sets the column only when the value is present; a `None` leaves it untouched.
    pub fn set_some<V: Into<Bind>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    pub fn touch(mut self, column: &'static str) -> Self {
        self.assignments.push(Assignment::Now(column));
        self
    }

    /// Stamps `now()` into the column unless it already holds a value.
    pub fn stamp_once(mut self, column: &'static str) -> Self {
        self.assignments.push(Assignment::NowIfNull(column));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<Bind>) -> Self {
        self.filter(Filter::Eq(column, value.into()))
    }

    pub fn build(&self, returning: bool) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("UPDATE ");
        qb.push(self.table.as_str()).push(" SET ");
        for (i, assignment) in self.assignments.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            match assignment.clone() {
                Assignment::Value(col, v) => {
                    qb.push(col).push(" = ");
                    push_bind(&mut qb, v);
                }
                Assignment::Now(col) => {
                    qb.push(col).push(" = now()");
                }
                Assignment::NowIfNull(col) => {
                    qb.push(col)
                        .push(" = COALESCE(")
                        .push(col)
                        .push(", now())");
                }
            }
        }
        push_filters(&mut qb, &self.filters);
        if returning {
            qb.push(" RETURNING *");
        }
        qb
    }

    pub async fn execute<'c, E>(&self, executor: E) -> Result<u64, BackendError>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let mut qb = self.build(false);
        qb.build()
            .execute(executor)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| BackendError::classify(self.table, e))
    }

    /// Updates and returns the single matched row; no match is `NotFound`.
    pub async fn single<'c, T, E>(&self, executor: E) -> Result<T, BackendError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        E: Executor<'c, Database = Postgres>,
    {
        let mut qb = self.build(true);
        qb.build_query_as::<T>()
            .fetch_optional(executor)
            .await
            .map_err(|e| BackendError::classify(self.table, e))?
            .ok_or(BackendError::NotFound {
                table: self.table.as_str(),
            })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DELETE
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Delete {
    table: Table,
    filters: Vec<Filter>,
}

impl Delete {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<Bind>) -> Self {
        self.filter(Filter::Eq(column, value.into()))
    }

    pub fn build(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("DELETE FROM ");
        qb.push(self.table.as_str());
        push_filters(&mut qb, &self.filters);
        qb
    }

    pub async fn execute<'c, E>(&self, executor: E) -> Result<u64, BackendError>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let mut qb = self.build();
        qb.build()
            .execute(executor)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| BackendError::classify(self.table, e))
    }
}
