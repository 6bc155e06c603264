//! Page service: plans, executes and decodes page requests for one entity.

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::executor::QueryExecutor;
use crate::page::{PageRequest, PageResult};
use crate::query::{
    Capabilities, OutputColumn, PagePlan, PlanBuilder, ProjectionBuilder, WholeEntity,
};
use crate::schema::{Entity, SchemaProvider, ValueType};

/// Serves pages of entity `E` through executor `X`.
pub struct PageService<E, X> {
    schemas: Arc<dyn SchemaProvider>,
    executor: X,
    capabilities: Capabilities,
    max_limit: Option<u64>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, X> PageService<E, X>
where
    E: Entity,
    X: QueryExecutor,
{
    /// Create a service using the executor backend's default capabilities.
    pub fn new(schemas: Arc<dyn SchemaProvider>, executor: X) -> Self {
        let capabilities = executor.backend().capabilities();
        Self {
            schemas,
            executor,
            capabilities,
            max_limit: None,
            _entity: PhantomData,
        }
    }

    /// Create a service with capabilities and page cap taken from `config`.
    ///
    /// Plans are rendered for the executor's backend, so the configured
    /// overrides apply on top of that backend's defaults.
    pub fn from_config(schemas: Arc<dyn SchemaProvider>, executor: X, config: &Config) -> Self {
        let backend = executor.backend();
        if config.backend != backend {
            tracing::warn!(
                configured = %config.backend,
                executor = %backend,
                "configured backend differs from the executor, using the executor's"
            );
        }
        let capabilities = config.capabilities_for(backend);
        Self::new(schemas, executor)
            .with_capabilities(capabilities)
            .with_max_limit(config.max_limit)
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Cap page sizes at `max_limit`. Unbounded requests are capped too.
    pub fn with_max_limit(mut self, max_limit: Option<u64>) -> Self {
        self.max_limit = max_limit;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn executor(&self) -> &X {
        &self.executor
    }

    /// Build the plans for a whole-entity page without executing them.
    pub fn plan(&self, request: &PageRequest, want_count: bool) -> EngineResult<PagePlan> {
        self.plan_with(request, want_count, &WholeEntity)
    }

    /// Build the plans for a projected page without executing them.
    pub fn plan_with(
        &self,
        request: &PageRequest,
        want_count: bool,
        projection: &dyn ProjectionBuilder,
    ) -> EngineResult<PagePlan> {
        let request = self.cap(request);
        self.build(&request, want_count, projection, false)
    }

    /// Fetch a page of whole entities.
    pub async fn get_page(
        &self,
        request: &PageRequest,
        want_count: bool,
    ) -> EngineResult<PageResult<E>> {
        self.get_page_with(request, want_count, &WholeEntity).await
    }

    /// Fetch a page decoded as `T` using a projection builder.
    ///
    /// When `T` is not the entity type the projection builder must return a
    /// projection; selecting the whole entity fails with `IllegalProjection`.
    pub async fn get_page_with<T, P>(
        &self,
        request: &PageRequest,
        want_count: bool,
        projection: &P,
    ) -> EngineResult<PageResult<T>>
    where
        T: DeserializeOwned + 'static,
        P: ProjectionBuilder,
    {
        let request = self.cap(request);
        let require_projection = TypeId::of::<T>() != TypeId::of::<E>();
        let plan = self.build(&request, want_count, projection, require_projection)?;

        let (rows, total) = self
            .executor
            .fetch_page(&plan.data, plan.count.as_ref())
            .await
            .map_err(EngineError::Execution)?;

        let items = rows
            .into_iter()
            .map(|mut row| {
                normalize_booleans(&mut row, plan.data.columns());
                serde_json::from_value::<T>(row)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let estimated_total = total.map(|total| {
            let total = u64::try_from(total).unwrap_or(0);
            let len = items.len() as u64;
            if total < len {
                tracing::warn!(
                    counted = total,
                    items = len,
                    "count below page size, raising estimated total"
                );
            }
            total
        });

        Ok(PageResult::new(items, request.offset(), estimated_total))
    }

    fn build(
        &self,
        request: &PageRequest,
        want_count: bool,
        projection: &dyn ProjectionBuilder,
        require_projection: bool,
    ) -> EngineResult<PagePlan> {
        let root = self.schemas.require(E::NAME)?;
        let plan = PlanBuilder::new(&*self.schemas, root, self.capabilities).build(
            request,
            want_count,
            projection,
            require_projection,
        )?;

        let backend = self.executor.backend();
        tracing::debug!(
            entity = E::NAME,
            sql = %plan.data.to_string(backend),
            "data query"
        );
        if let Some(count) = &plan.count {
            tracing::debug!(entity = E::NAME, sql = %count.to_string(backend), "count query");
        }
        Ok(plan)
    }

    fn cap(&self, request: &PageRequest) -> PageRequest {
        match self.max_limit.and_then(|max| request.capped(max)) {
            Some(capped) => {
                tracing::warn!(
                    requested = ?request.limit(),
                    capped = ?capped.limit(),
                    "page limit exceeds maximum, capping"
                );
                capped
            }
            None => request.clone(),
        }
    }
}

/// Turn 0/1 values of boolean output columns into JSON booleans.
fn normalize_booleans(row: &mut serde_json::Value, columns: &[OutputColumn]) {
    let Some(object) = row.as_object_mut() else {
        return;
    };
    for column in columns.iter().filter(|c| c.value_type == ValueType::Boolean) {
        if let Some(value) = object.get_mut(&column.name)
            && let Some(n) = value.as_i64()
        {
            *value = serde_json::Value::Bool(n != 0);
        }
    }
}
