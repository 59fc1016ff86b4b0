//! Collection queries: equality filters, ordering and paging.

use serde_json::Value;

/// Page size used when none is set.
pub const DEFAULT_LIMIT: usize = 100;

/// Page size large enough to read a whole result set.
pub const LIMIT_ALL: usize = i32::MAX as usize;

#[derive(Debug, Clone)]
pub struct Query {
    filters: Vec<(String, Value)>,
    order_by: Vec<(String, bool)>,
    limit: usize,
    offset: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    /// Keep rows whose `key` column equals `value`.
    pub fn filter<V: Into<Value>>(
        mut self,
        key: &str,
        value: V,
    ) -> Self {
        self.filters.push((key.to_string(), value.into()));
        self
    }

    /// Sort by `key`, descending when `rev` is set.
    pub fn sort(
        mut self,
        key: &str,
        rev: bool,
    ) -> Self {
        self.order_by.push((key.to_string(), rev));
        self
    }

    pub fn set_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn set_offset(
        mut self,
        offset: usize,
    ) -> Self {
        self.offset = offset;
        self
    }

    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub fn order_by(&self) -> &[(String, bool)] {
        &self.order_by
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}
