//! Page requests and results.

use serde::Serialize;

use crate::criteria::Criterion;
use crate::error::{EngineError, EngineResult};

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    path: String,
    ascending: bool,
}

impl Order {
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ascending: true,
        }
    }

    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ascending: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }
}

/// A request for one page of results.
///
/// Required criteria must all match; optional criteria form one OR group that
/// is conjoined with the required ones when non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    offset: u64,
    limit: Option<u64>,
    ordering: Vec<Order>,
    required: Vec<(String, Criterion)>,
    optional: Vec<(String, Criterion)>,
}

impl PageRequest {
    pub fn builder() -> PageRequestBuilder {
        PageRequestBuilder::default()
    }

    /// Every row, unordered.
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: None,
            ordering: Vec::new(),
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    /// The first row, unordered.
    pub fn one() -> Self {
        Self {
            limit: Some(1),
            ..Self::all()
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Maximum number of rows, or `None` when unbounded.
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn ordering(&self) -> &[Order] {
        &self.ordering
    }

    pub fn required(&self) -> &[(String, Criterion)] {
        &self.required
    }

    pub fn optional(&self) -> &[(String, Criterion)] {
        &self.optional
    }

    /// Reduce the limit to `max`, unbounded requests included.
    pub(crate) fn capped(&self, max: u64) -> Option<Self> {
        match self.limit {
            Some(limit) if limit <= max => None,
            _ => Some(Self {
                limit: Some(max),
                ..self.clone()
            }),
        }
    }
}

/// Builder for [`PageRequest`]. Unbounded and unordered by default.
#[derive(Debug, Clone, Default)]
pub struct PageRequestBuilder {
    offset: u64,
    limit: Option<u64>,
    ordering: Vec<Order>,
    required: Vec<(String, Criterion)>,
    optional: Vec<(String, Criterion)>,
}

impl PageRequestBuilder {
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.limit = None;
        self
    }

    pub fn order_by(mut self, path: impl Into<String>, ascending: bool) -> Self {
        let path = path.into();
        self.ordering.push(if ascending {
            Order::asc(path)
        } else {
            Order::desc(path)
        });
        self
    }

    /// Add a required criterion, replacing any earlier one for the same path.
    pub fn require(mut self, path: impl Into<String>, criterion: impl Into<Criterion>) -> Self {
        upsert(&mut self.required, path.into(), criterion.into());
        self
    }

    /// Add an optional criterion, replacing any earlier one for the same path.
    pub fn optional(mut self, path: impl Into<String>, criterion: impl Into<Criterion>) -> Self {
        upsert(&mut self.optional, path.into(), criterion.into());
        self
    }

    pub fn build(self) -> EngineResult<PageRequest> {
        if self.limit == Some(0) {
            return Err(EngineError::InvalidRequest(
                "limit must be at least 1".to_string(),
            ));
        }
        for (i, order) in self.ordering.iter().enumerate() {
            if self.ordering[..i].iter().any(|o| o.path == order.path) {
                return Err(EngineError::InvalidRequest(format!(
                    "duplicate ordering on '{}'",
                    order.path
                )));
            }
        }
        Ok(PageRequest {
            offset: self.offset,
            limit: self.limit,
            ordering: self.ordering,
            required: self.required,
            optional: self.optional,
        })
    }
}

fn upsert(criteria: &mut Vec<(String, Criterion)>, path: String, criterion: Criterion) {
    match criteria.iter_mut().find(|(p, _)| *p == path) {
        Some((_, existing)) => *existing = criterion,
        None => criteria.push((path, criterion)),
    }
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult<T> {
    items: Vec<T>,
    offset: u64,
    estimated_total: Option<u64>,
}

impl<T> PageResult<T> {
    /// `estimated_total` is raised to the item count when it is lower.
    pub fn new(items: Vec<T>, offset: u64, estimated_total: Option<u64>) -> Self {
        let len = items.len() as u64;
        Self {
            items,
            offset,
            estimated_total: estimated_total.map(|total| total.max(len)),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total number of matching rows, or `None` when counting was skipped.
    pub fn estimated_total(&self) -> Option<u64> {
        self.estimated_total
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of pages of `page_size` rows, when the total is known.
    pub fn total_pages(&self, page_size: u64) -> Option<u64> {
        if page_size == 0 {
            return None;
        }
        self.estimated_total.map(|total| total.div_ceil(page_size))
    }

    /// Whether rows exist past this page, when the total is known.
    pub fn has_next(&self) -> Option<bool> {
        self.estimated_total
            .map(|total| self.offset + (self.items.len() as u64) < total)
    }

    pub fn has_prev(&self) -> bool {
        self.offset > 0
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            offset: self.offset,
            estimated_total: self.estimated_total,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_ordering() {
        let err = PageRequest::builder()
            .order_by("name", true)
            .order_by("age", false)
            .order_by("name", false)
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_zero_limit() {
        let err = PageRequest::builder().limit(0).build().unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[test]
    fn criteria_keep_insertion_order_and_replace() {
        let request = PageRequest::builder()
            .require("status", "active")
            .require("age", 30)
            .require("status", "inactive")
            .build()
            .unwrap();
        let fields: Vec<_> = request.required().iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["status", "age"]);
        assert_eq!(request.required()[0].1, Criterion::from("inactive"));
    }

    #[test]
    fn presets() {
        assert_eq!(PageRequest::all().limit(), None);
        assert_eq!(PageRequest::one().limit(), Some(1));
        assert_eq!(PageRequest::one().offset(), 0);
    }

    #[test]
    fn capping() {
        let request = PageRequest::builder().limit(500).build().unwrap();
        assert_eq!(request.capped(100).unwrap().limit(), Some(100));
        assert!(request.capped(1000).is_none());
        assert_eq!(PageRequest::all().capped(50).unwrap().limit(), Some(50));
    }

    #[test]
    fn result_paging() {
        let result = PageResult::new(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10], 10, Some(25));
        assert_eq!(result.total_pages(10), Some(3));
        assert_eq!(result.has_next(), Some(true));
        assert!(result.has_prev());

        let last = PageResult::new(vec![1, 2, 3, 4, 5], 20, Some(25));
        assert_eq!(last.has_next(), Some(false));

        let uncounted = PageResult::new(vec![1], 0, None);
        assert_eq!(uncounted.has_next(), None);
        assert_eq!(uncounted.total_pages(10), None);
        assert!(!uncounted.has_prev());
    }

    #[test]
    fn total_never_below_item_count() {
        let result = PageResult::new(vec!["a", "b"], 0, Some(1));
        assert_eq!(result.estimated_total(), Some(2));
    }

    #[test]
    fn map_keeps_paging() {
        let result = PageResult::new(vec![1, 2], 4, Some(6)).map(|n| n * 10);
        assert_eq!(result.items(), &[10, 20]);
        assert_eq!(result.offset(), 4);
        assert_eq!(result.estimated_total(), Some(6));
    }
}
