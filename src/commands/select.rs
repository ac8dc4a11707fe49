//! SELECT command builder.
//!
//! Builds a parameterized SELECT from table metadata, optional criteria and
//! optional query refinements (projection, ordering, paging, joins). Paging
//! uses the dialect's native LIMIT/OFFSET clause when available and falls
//! back to ROW_NUMBER() emulation otherwise.

use crate::commands::{CommandSpec, render_criteria};
use crate::criteria::Criteria;
use crate::dialect::{Dialect, PagingMode};
use crate::error::{AdapterError, AdapterResult};
use crate::query::{Join, JoinKind, OrderBy, Query, SortDirection};
use crate::schema::TableMetadata;
use crate::value::Value;

pub struct SelectBuilder<'a> {
    table: &'a TableMetadata,
    dialect: &'a Dialect,
    criteria: Option<&'a Criteria>,
    columns: &'a [String],
    order_by: &'a [OrderBy],
    skip: Option<u64>,
    take: Option<u64>,
    joins: &'a [Join],
}

impl<'a> SelectBuilder<'a> {
    pub fn new(table: &'a TableMetadata, dialect: &'a Dialect) -> Self {
        Self {
            table,
            dialect,
            criteria: None,
            columns: &[],
            order_by: &[],
            skip: None,
            take: None,
            joins: &[],
        }
    }

    /// Filter by criteria.
    pub fn criteria(mut self, criteria: Option<&'a Criteria>) -> Self {
        self.criteria = criteria;
        self
    }

    /// Cap the number of returned rows.
    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    /// Apply a full query's refinements.
    pub fn apply_query(mut self, query: &'a Query) -> Self {
        self.criteria = query.criteria.as_ref();
        self.columns = &query.columns;
        self.order_by = &query.order_by;
        self.skip = query.skip;
        self.take = query.take;
        self.joins = &query.joins;
        self
    }

    pub fn build(&self) -> AdapterResult<CommandSpec> {
        let mut params: Vec<Value> = Vec::new();

        let where_clause = match self.criteria {
            Some(criteria) => Some(render_criteria(
                criteria,
                self.table,
                self.dialect,
                &mut params,
            )?),
            None => None,
        };

        let use_row_number =
            (self.skip.is_some() || self.take.is_some()) && self.dialect.paging() == PagingMode::RowNumber;

        let sql = if use_row_number {
            self.render_row_number_paged(where_clause.as_deref())?
        } else {
            self.render_plain(where_clause.as_deref())?
        };

        CommandSpec::new(sql, params, self.dialect)
    }

    fn render_plain(&self, where_clause: Option<&str>) -> AdapterResult<String> {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.projection()?,
            self.dialect.quote(&self.table.name)
        );
        sql.push_str(&self.render_joins());

        if let Some(clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.render_order(self.order_by)?);
        }
        if self.skip.is_some() || self.take.is_some() {
            // MySQL requires LIMIT with OFFSET, so a skip without a take gets
            // an effectively unbounded limit.
            let take = self.take.unwrap_or(i64::MAX as u64);
            sql.push_str(&format!(" LIMIT {take}"));
            if let Some(skip) = self.skip {
                sql.push_str(&format!(" OFFSET {skip}"));
            }
        }
        Ok(sql)
    }

    /// Emulated paging for dialects without a native clause: number the rows
    /// in an inner select, filter on the numbering in the outer one.
    fn render_row_number_paged(&self, where_clause: Option<&str>) -> AdapterResult<String> {
        let order = if self.order_by.is_empty() {
            // ROW_NUMBER needs a deterministic order; fall back to the
            // primary key, then to the first column.
            let fallback: Vec<OrderBy> = self
                .table
                .primary_key
                .iter()
                .map(|c| OrderBy {
                    column: c.clone(),
                    direction: SortDirection::Asc,
                })
                .collect();
            if fallback.is_empty() {
                let first = self.table.columns.first().ok_or_else(|| {
                    AdapterError::internal(format!("table '{}' has no columns", self.table.name))
                })?;
                self.render_order(&[OrderBy {
                    column: first.name.clone(),
                    direction: SortDirection::Asc,
                }])?
            } else {
                self.render_order(&fallback)?
            }
        } else {
            self.render_order(self.order_by)?
        };

        let mut inner = format!(
            "SELECT {}, ROW_NUMBER() OVER (ORDER BY {}) AS {} FROM {}",
            self.projection()?,
            order,
            self.dialect.quote("__row"),
            self.dialect.quote(&self.table.name)
        );
        inner.push_str(&self.render_joins());
        if let Some(clause) = where_clause {
            inner.push_str(" WHERE ");
            inner.push_str(clause);
        }

        let row = self.dialect.quote("__row");
        let skip = self.skip.unwrap_or(0);
        let mut outer = format!(
            "SELECT {} FROM ({inner}) AS {} WHERE {row} > {skip}",
            self.outer_projection()?,
            self.dialect.quote("__paged"),
        );
        if let Some(take) = self.take {
            outer.push_str(&format!(" AND {row} <= {}", skip + take));
        }
        outer.push_str(&format!(" ORDER BY {row}"));
        Ok(outer)
    }

    fn projection(&self) -> AdapterResult<String> {
        if self.columns.is_empty() {
            // With joins, keep the result shaped like the main table.
            if self.joins.is_empty() {
                return Ok("*".to_string());
            }
            return Ok(format!("{}.*", self.dialect.quote(&self.table.name)));
        }
        let mut parts = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            parts.push(self.resolve_projection_column(column)?);
        }
        Ok(parts.join(", "))
    }

    /// The outer select of the emulated-paging form re-projects by bare
    /// column name.
    fn outer_projection(&self) -> AdapterResult<String> {
        let names: Vec<String> = if self.columns.is_empty() {
            self.table
                .columns
                .iter()
                .map(|c| self.dialect.quote(&c.name))
                .collect()
        } else {
            self.columns
                .iter()
                .map(|c| {
                    let bare = c.rsplit('.').next().unwrap_or(c);
                    self.dialect.quote(bare)
                })
                .collect()
        };
        Ok(names.join(", "))
    }

    fn render_joins(&self) -> String {
        let mut sql = String::new();
        for join in self.joins {
            let keyword = match join.kind {
                JoinKind::Inner => "JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            sql.push_str(&format!(
                " {keyword} {} ON {}.{} = {}.{}",
                self.dialect.quote(&join.table),
                self.dialect.quote(&self.table.name),
                self.dialect.quote(&join.left_column),
                self.dialect.quote(&join.table),
                self.dialect.quote(&join.right_column),
            ));
        }
        sql
    }

    fn render_order(&self, terms: &[OrderBy]) -> AdapterResult<String> {
        let mut parts = Vec::with_capacity(terms.len());
        for term in terms {
            parts.push(format!(
                "{} {}",
                self.resolve_projection_column(&term.column)?,
                term.direction.as_sql()
            ));
        }
        Ok(parts.join(", "))
    }

    fn resolve_projection_column(&self, column: &str) -> AdapterResult<String> {
        if column.contains('.') {
            return Ok(self.dialect.quote(column));
        }
        // With joins in play unqualified names may belong to another table;
        // only the single-table shape is validated here.
        if self.joins.is_empty() && !self.table.has_column(column) {
            return Err(AdapterError::unknown_column(&self.table.name, column));
        }
        Ok(self.dialect.quote(column))
    }
}
