//! Pagewright: criteria-driven page queries.
//!
//! Turns a [`PageRequest`] (offset, limit, ordering, required and optional
//! field criteria) into a data query and an optional count query over a
//! relational schema, then runs them through a [`QueryExecutor`]:
//! - field paths walk relations and become LEFT JOINs
//! - collection criteria test membership, and "holds all of" through a HAVING count
//! - aggregate predicates move to HAVING and group by the root identity
//! - the count query reuses or recompiles the data restriction per backend

pub mod config;
pub mod criteria;
pub mod error;
pub mod executor;
pub mod page;
pub mod query;
pub mod schema;
pub mod service;

pub use config::Config;
pub use criteria::{Bool, Criterion, Enumerated, IgnoreCase, Literal, MatchMode, Numeric};
pub use error::{EngineError, EngineResult};
pub use executor::{PgExecutor, QueryExecutor, SqliteExecutor};
pub use page::{Order, PageRequest, PageRequestBuilder, PageResult};
pub use query::{
    Backend, Capabilities, CountIdiom, PagePlan, Projection, ProjectionBuilder, QueryContext,
    QueryPlan, WholeEntity, projection,
};
pub use schema::{Entity, EntitySchema, EnumType, SchemaProvider, SchemaRegistry, ValueType};
pub use service::PageService;
