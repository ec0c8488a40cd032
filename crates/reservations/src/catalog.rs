//! The product catalog collaborator seam.
//!
//! Catalog metadata (names, pricing, search) lives in another service; the
//! reservation path only needs existence and active/inactive status. A
//! reserve against an unknown or inactive product fails `ProductNotFound`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use stockroom_core::ProductId;

/// Sellability of a product as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
}

/// Read-only view of the catalog service.
pub trait ProductCatalog: Send + Sync {
    /// `None` when the product does not exist.
    fn status(&self, product_id: ProductId) -> Option<ProductStatus>;
}

impl<C> ProductCatalog for Arc<C>
where
    C: ProductCatalog + ?Sized,
{
    fn status(&self, product_id: ProductId) -> Option<ProductStatus> {
        (**self).status(product_id)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, ProductStatus>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product as active (sellable).
    pub fn add_product(&self, product_id: ProductId) {
        if let Ok(mut products) = self.products.write() {
            products.insert(product_id, ProductStatus::Active);
        }
    }

    pub fn set_status(&self, product_id: ProductId, status: ProductStatus) {
        if let Ok(mut products) = self.products.write() {
            products.insert(product_id, status);
        }
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn status(&self, product_id: ProductId) -> Option<ProductStatus> {
        self.products
            .read()
            .ok()
            .and_then(|products| products.get(&product_id).copied())
    }
}
