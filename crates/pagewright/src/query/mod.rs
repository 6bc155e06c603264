//! Query planning: path resolution, predicate compilation, grouping and the
//! data/count plan builder.

mod builder;
mod grouping;
pub mod path;
mod plan;
mod predicate;
pub mod projection;

pub use builder::{PlanBuilder, UNBOUNDED_LIMIT};
pub use grouping::{GroupBy, Restriction};
pub use path::{Origin, PathResolver, ResolvedExpr};
pub use plan::{Backend, Capabilities, CountIdiom, OutputColumn, PagePlan, QueryPlan};
pub use predicate::{Clause, CompiledPredicate, compile};
pub use projection::{Projection, ProjectionBuilder, QueryContext, WholeEntity, projection};
