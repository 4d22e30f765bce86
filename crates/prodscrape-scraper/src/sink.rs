//! Persistence boundary for scraped products.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use prodscrape_core::{Asin, ProductRecord, StoredProduct};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("product {asin} is already stored")]
    Duplicate { asin: String },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Accepts validated records and assigns them an id.
pub trait ProductSink: Send + Sync {
    /// Stores `record`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Duplicate`] if the sink already holds this
    /// product, or [`SinkError::Storage`] if the write failed.
    fn insert(
        &self,
        record: ProductRecord,
    ) -> impl Future<Output = Result<StoredProduct, SinkError>> + Send;
}

impl<S: ProductSink> ProductSink for Arc<S> {
    fn insert(
        &self,
        record: ProductRecord,
    ) -> impl Future<Output = Result<StoredProduct, SinkError>> + Send {
        (**self).insert(record)
    }
}

#[derive(Debug, Default)]
struct Store {
    next_id: i64,
    products: HashMap<Asin, StoredProduct>,
}

/// Process-local sink keyed by ASIN. Ids start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct InMemorySink {
    store: Mutex<Store>,
}

impl InMemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.products.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, asin: &Asin) -> Option<StoredProduct> {
        self.store.lock().await.products.get(asin).cloned()
    }
}

impl ProductSink for InMemorySink {
    async fn insert(&self, record: ProductRecord) -> Result<StoredProduct, SinkError> {
        let mut store = self.store.lock().await;
        if store.products.contains_key(&record.asin) {
            return Err(SinkError::Duplicate {
                asin: record.asin.to_string(),
            });
        }

        store.next_id += 1;
        let stored = StoredProduct {
            id: store.next_id,
            record,
        };
        store
            .products
            .insert(stored.record.asin.clone(), stored.clone());
        tracing::info!(asin = %stored.record.asin, id = stored.id, "product stored");
        Ok(stored)
    }
}
