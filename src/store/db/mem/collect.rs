use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock},
};

use serde_json::Value as JsonValue;
use tracing::trace;

use crate::{
    ChainError, Result, ShareLock,
    store::{DbCollection, PageData, query::Query},
};

use super::DbDocument;

/// One in-memory collection keyed by row id.
#[derive(Debug, Clone)]
pub struct Collect<T> {
    name: String,
    rows: ShareLock<BTreeMap<String, T>>,
}

impl<T> Collect<T>
where
    T: DbDocument + Clone,
{
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    fn matches(
        doc: &HashMap<String, JsonValue>,
        q: &Query,
    ) -> bool {
        q.filters().iter().all(|(key, value)| doc.get(key) == Some(value))
    }
}

fn compare(
    a: Option<&JsonValue>,
    b: Option<&JsonValue>,
) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(a)), Some(JsonValue::Number(b))) => a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(a)), Some(JsonValue::String(b))) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

impl<T> DbCollection for Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    type Item = T;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        Ok(self.rows.read().unwrap_or_else(PoisonError::into_inner).contains_key(id))
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        trace!("{}::find({})", self.name, id);
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| ChainError::Store(format!("{} not found: {}", self.name, id)))
    }

    fn query(
        &self,
        q: &Query,
    ) -> Result<PageData<Self::Item>> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut matched = Vec::new();
        for row in rows.values() {
            let doc = row.doc()?;
            if Self::matches(&doc, q) {
                matched.push((doc, row.clone()));
            }
        }

        matched.sort_by(|(a, _), (b, _)| {
            q.order_by().iter().fold(Ordering::Equal, |ord, (key, rev)| {
                ord.then_with(|| {
                    let ord = compare(a.get(key), b.get(key));
                    if *rev { ord.reverse() } else { ord }
                })
            })
        });

        let count = matched.len();
        let page = matched.into_iter().skip(q.offset()).take(q.limit()).map(|(_, row)| row).collect();
        Ok(PageData::paged(count, q, page))
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        trace!("{}::create({})", self.name, data.id());
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        if rows.contains_key(data.id()) {
            return Err(ChainError::Store(format!("{} already exists: {}", self.name, data.id())));
        }
        rows.insert(data.id().to_string(), data.clone());
        Ok(true)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        trace!("{}::update({})", self.name, data.id());
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        match rows.get_mut(data.id()) {
            Some(row) => {
                *row = data.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        trace!("{}::delete({})", self.name, id);
        Ok(self.rows.write().unwrap_or_else(PoisonError::into_inner).remove(id).is_some())
    }
}
