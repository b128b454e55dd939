//! Structured query predicates. Each builder method takes an `Option`; `None`
//! means "no constraint" and adds nothing to the SQL.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, ToSql, params_from_iter};
use uuid::Uuid;

use crate::Result;
use crate::codec;

#[derive(Default)]
pub struct Filter {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
    order_by: Option<&'static str>,
    page: Option<(u32, u32)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`
    pub fn id(mut self, column: &str, value: Option<Uuid>) -> Self {
        if let Some(value) = value {
            self.clauses.push(format!("{column} = ?"));
            self.params.push(Box::new(value.to_string()));
        }
        self
    }

    /// `column = value` for integer keys.
    pub fn key(mut self, column: &str, value: Option<i64>) -> Self {
        if let Some(value) = value {
            self.clauses.push(format!("{column} = ?"));
            self.params.push(Box::new(value));
        }
        self
    }

    pub fn text(mut self, column: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.clauses.push(format!("{column} = ?"));
            self.params.push(Box::new(value.to_string()));
        }
        self
    }

    pub fn flag(mut self, column: &str, value: Option<bool>) -> Self {
        if let Some(value) = value {
            self.clauses.push(format!("{column} = ?"));
            self.params.push(Box::new(value));
        }
        self
    }

    /// `column >= since`
    pub fn since(mut self, column: &str, since: Option<DateTime<Utc>>) -> Self {
        if let Some(since) = since {
            self.clauses.push(format!("{column} >= ?"));
            self.params.push(Box::new(codec::ts(&since)));
        }
        self
    }

    /// Symmetric pair equality: `(a = x AND b = y) OR (a = y AND b = x)`.
    pub fn between(mut self, a: &str, b: &str, pair: Option<(Uuid, Uuid)>) -> Self {
        if let Some((x, y)) = pair {
            self.clauses
                .push(format!("(({a} = ? AND {b} = ?) OR ({a} = ? AND {b} = ?))"));
            let (x, y) = (x.to_string(), y.to_string());
            self.params.push(Box::new(x.clone()));
            self.params.push(Box::new(y.clone()));
            self.params.push(Box::new(y));
            self.params.push(Box::new(x));
        }
        self
    }

    /// `a = user OR b = user`
    pub fn involving(mut self, a: &str, b: &str, user: Option<Uuid>) -> Self {
        if let Some(user) = user {
            self.clauses.push(format!("({a} = ? OR {b} = ?)"));
            self.params.push(Box::new(user.to_string()));
            self.params.push(Box::new(user.to_string()));
        }
        self
    }

    pub fn order_by(mut self, order: &'static str) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn page(mut self, limit: Option<u32>, offset: Option<u32>) -> Self {
        if limit.is_some() || offset.is_some() {
            self.page = Some((limit.unwrap_or(u32::MAX), offset.unwrap_or(0)));
        }
        self
    }

    /// Renders everything after the `FROM` clause.
    pub fn tail(&self) -> String {
        let mut sql = String::new();
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        if let Some(order) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if self.page.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
        }
        sql
    }

    fn bindings(&self) -> Vec<&dyn ToSql> {
        let mut out: Vec<&dyn ToSql> = self.params.iter().map(|p| p.as_ref()).collect();
        if let Some((limit, offset)) = &self.page {
            out.push(limit);
            out.push(offset);
        }
        out
    }

    pub(crate) fn select<T, F>(&self, conn: &Connection, head: &str, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let sql = format!("{head}{}", self.tail());
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(self.bindings()), map)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Runs an `UPDATE`/`DELETE` whose `WHERE` clause is this filter.
    pub(crate) fn execute(&self, conn: &Connection, head: &str) -> Result<usize> {
        let sql = format!("{head}{}", self.tail());
        Ok(conn.execute(&sql, params_from_iter(self.bindings()))?)
    }
}
