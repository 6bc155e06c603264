//! Built query plans and backend capabilities.

use std::fmt;
use std::str::FromStr;

use sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, SelectStatement, SqliteQueryBuilder, Value, Values,
};

use crate::schema::ValueType;

/// Relational backend a plan is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Postgres,
    MySql,
    Sqlite,
}

impl Backend {
    /// Guess the backend from a connection URL scheme.
    pub fn from_database_url(url: &str) -> Option<Self> {
        let (scheme, _) = url.split_once(':')?;
        scheme.parse().ok()
    }

    /// Default capabilities of this backend.
    pub fn capabilities(self) -> Capabilities {
        match self {
            Backend::Postgres | Backend::Sqlite => Capabilities {
                supports_copy_restriction: true,
                preferred_count_idiom: CountIdiom::In,
            },
            Backend::MySql => Capabilities {
                supports_copy_restriction: false,
                preferred_count_idiom: CountIdiom::Exists,
            },
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Backend::Postgres),
            "mysql" | "mariadb" => Ok(Backend::MySql),
            "sqlite" => Ok(Backend::Sqlite),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Postgres => "postgres",
            Backend::MySql => "mysql",
            Backend::Sqlite => "sqlite",
        })
    }
}

/// How the count query tests a root identity against the restricted subquery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountIdiom {
    /// `c.id IN (SELECT s.id ...)`
    In,
    /// `EXISTS (SELECT s.id ... AND s.id = c.id)`
    Exists,
}

impl FromStr for CountIdiom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(CountIdiom::In),
            "exists" => Ok(CountIdiom::Exists),
            other => Err(format!("unknown count idiom '{other}'")),
        }
    }
}

/// Backend capability flags consulted by the plan builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The data query's restriction may be reused verbatim in the count subquery
    /// when the data query has no joins.
    pub supports_copy_restriction: bool,
    pub preferred_count_idiom: CountIdiom,
}

impl Default for Capabilities {
    fn default() -> Self {
        Backend::Postgres.capabilities()
    }
}

/// An output column of a data plan.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub value_type: ValueType,
}

/// A built SELECT plus what the executor and callers need to know about it.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub(crate) statement: SelectStatement,
    pub(crate) columns: Vec<OutputColumn>,
    pub(crate) parameters: Vec<(String, Value)>,
    pub(crate) has_order_by: bool,
    pub(crate) distinct: bool,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) has_joins: bool,
    pub(crate) group_by_len: usize,
    pub(crate) has_having: bool,
}

impl QueryPlan {
    /// Render with placeholders and the values to bind, in placeholder order.
    pub fn to_sql(&self, backend: Backend) -> (String, Values) {
        match backend {
            Backend::Postgres => self.statement.build(PostgresQueryBuilder),
            Backend::MySql => self.statement.build(MysqlQueryBuilder),
            Backend::Sqlite => self.statement.build(SqliteQueryBuilder),
        }
    }

    /// Render with values inlined. For logs and inspection only.
    pub fn to_string(&self, backend: Backend) -> String {
        match backend {
            Backend::Postgres => self.statement.to_string(PostgresQueryBuilder),
            Backend::MySql => self.statement.to_string(MysqlQueryBuilder),
            Backend::Sqlite => self.statement.to_string(SqliteQueryBuilder),
        }
    }

    pub fn statement(&self) -> &SelectStatement {
        &self.statement
    }

    /// Output columns with their declared types. Empty for count plans.
    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    /// Criterion operands by generated name, in binding order.
    pub fn parameters(&self) -> &[(String, Value)] {
        &self.parameters
    }

    pub fn has_order_by(&self) -> bool {
        self.has_order_by
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn has_joins(&self) -> bool {
        self.has_joins
    }

    pub fn group_by_len(&self) -> usize {
        self.group_by_len
    }

    pub fn has_having(&self) -> bool {
        self.has_having
    }
}

/// The data plan of a page request and, when counting, its count plan.
#[derive(Debug, Clone)]
pub struct PagePlan {
    pub data: QueryPlan,
    pub count: Option<QueryPlan>,
}
