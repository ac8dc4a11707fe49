//! Full query specifications.
//!
//! A [`Query`] is a superset of a criteria-only find: table reference plus
//! optional criteria, projection, ordering, paging and joins. Built with the
//! same builder style used across the crate.

use crate::criteria::Criteria;

/// Sort direction for an ORDER BY term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One ordering term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// An equi-join between the query's table and another table.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    /// Column on the query's main table.
    pub left_column: String,
    /// Column on the joined table.
    pub right_column: String,
    pub kind: JoinKind,
}

/// A structured read query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub criteria: Option<Criteria>,
    /// Projected columns; empty means all columns.
    pub columns: Vec<String>,
    pub order_by: Vec<OrderBy>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub joins: Vec<Join>,
}

impl Query {
    /// Create a query over a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            criteria: None,
            columns: Vec::new(),
            order_by: Vec::new(),
            skip: None,
            take: None,
            joins: Vec::new(),
        }
    }

    /// Set the filter criteria.
    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    /// Project specific columns.
    pub fn select<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append an ascending order term.
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            direction: SortDirection::Asc,
        });
        self
    }

    /// Append a descending order term.
    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            direction: SortDirection::Desc,
        });
        self
    }

    /// Skip the first `n` rows.
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Take at most `n` rows.
    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    /// Append an inner join.
    pub fn join(
        mut self,
        table: impl Into<String>,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        self.joins.push(Join {
            table: table.into(),
            left_column: left_column.into(),
            right_column: right_column.into(),
            kind: JoinKind::Inner,
        });
        self
    }

    /// Append a left outer join.
    pub fn left_join(
        mut self,
        table: impl Into<String>,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        self.joins.push(Join {
            table: table.into(),
            left_column: left_column.into(),
            right_column: right_column.into(),
            kind: JoinKind::Left,
        });
        self
    }

    /// Whether paging was requested.
    pub fn is_paged(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let q = Query::new("orders")
            .with_criteria(Criteria::eq("status", "open"))
            .select(["id", "total"])
            .order_by_desc("total")
            .skip(10)
            .take(5);

        assert_eq!(q.table, "orders");
        assert_eq!(q.columns, vec!["id", "total"]);
        assert_eq!(q.order_by.len(), 1);
        assert_eq!(q.order_by[0].direction, SortDirection::Desc);
        assert!(q.is_paged());
    }

    #[test]
    fn test_join_kinds() {
        let q = Query::new("orders")
            .join("customers", "customer_id", "id")
            .left_join("coupons", "coupon_id", "id");
        assert_eq!(q.joins[0].kind, JoinKind::Inner);
        assert_eq!(q.joins[1].kind, JoinKind::Left);
    }

    #[test]
    fn test_unpaged_by_default() {
        assert!(!Query::new("users").is_paged());
    }
}
