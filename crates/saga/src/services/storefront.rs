//! Catalog/storefront service trait and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::{ProductId, StorefrontCustomerId, VariantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SagaError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorefrontVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// ISO country code.
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorefrontCustomer {
    pub id: StorefrontCustomerId,
    pub email: Option<String>,
    pub default_address: Option<Address>,
}

impl StorefrontCustomer {
    pub fn shipping_country(&self) -> Option<&str> {
        self.default_address
            .as_ref()
            .map(|a| a.country.as_str())
            .filter(|c| !c.trim().is_empty())
    }
}

/// External catalog and storefront.
#[async_trait]
pub trait Storefront: Send + Sync {
    async fn fetch_variants(&self, product_id: &ProductId) -> Result<Vec<StorefrontVariant>>;

    async fn is_variant_available(&self, variant_id: &VariantId) -> Result<bool>;

    async fn fetch_customer_by_id(
        &self,
        id: &StorefrontCustomerId,
    ) -> Result<Option<StorefrontCustomer>>;

    /// Writes a custom field on a customer record.
    async fn create_metafield(
        &self,
        owner: &StorefrontCustomerId,
        key: &str,
        value: Value,
    ) -> Result<()>;

    async fn assign_membership_tag(&self, customer: &StorefrontCustomerId, tag: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryStorefrontState {
    variants: HashMap<ProductId, Vec<StorefrontVariant>>,
    sold_out: HashSet<VariantId>,
    customers: HashMap<StorefrontCustomerId, StorefrontCustomer>,
    metafields: Vec<(StorefrontCustomerId, String, Value)>,
    tags: Vec<(StorefrontCustomerId, String)>,
    fail_on_write: bool,
}

/// In-memory storefront for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorefront {
    state: Arc<RwLock<InMemoryStorefrontState>>,
}

impl InMemoryStorefront {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryStorefrontState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryStorefrontState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put_customer(&self, id: impl Into<StorefrontCustomerId>, country: Option<&str>) {
        let id = id.into();
        self.write().customers.insert(
            id.clone(),
            StorefrontCustomer {
                id,
                email: None,
                default_address: country.map(|c| Address {
                    country: c.to_string(),
                }),
            },
        );
    }

    pub fn put_variant(&self, product: impl Into<ProductId>, variant: impl Into<VariantId>) {
        let product_id = product.into();
        let variant = StorefrontVariant {
            id: variant.into(),
            product_id: product_id.clone(),
            title: product_id.to_string(),
        };
        self.write().variants.entry(product_id).or_default().push(variant);
    }

    pub fn set_sold_out(&self, variant: impl Into<VariantId>, sold_out: bool) {
        let variant = variant.into();
        let mut state = self.write();
        if sold_out {
            state.sold_out.insert(variant);
        } else {
            state.sold_out.remove(&variant);
        }
    }

    /// Makes metafield and tag writes fail.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.write().fail_on_write = fail;
    }

    pub fn tags(&self) -> Vec<(StorefrontCustomerId, String)> {
        self.read().tags.clone()
    }

    pub fn metafields(&self) -> Vec<(StorefrontCustomerId, String, Value)> {
        self.read().metafields.clone()
    }
}

#[async_trait]
impl Storefront for InMemoryStorefront {
    async fn fetch_variants(&self, product_id: &ProductId) -> Result<Vec<StorefrontVariant>> {
        Ok(self
            .read()
            .variants
            .get(product_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_variant_available(&self, variant_id: &VariantId) -> Result<bool> {
        Ok(!self.read().sold_out.contains(variant_id))
    }

    async fn fetch_customer_by_id(
        &self,
        id: &StorefrontCustomerId,
    ) -> Result<Option<StorefrontCustomer>> {
        Ok(self.read().customers.get(id).cloned())
    }

    async fn create_metafield(
        &self,
        owner: &StorefrontCustomerId,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let mut state = self.write();
        if state.fail_on_write {
            return Err(SagaError::external("storefront", "metafield write rejected"));
        }
        state.metafields.push((owner.clone(), key.to_string(), value));
        Ok(())
    }

    async fn assign_membership_tag(&self, customer: &StorefrontCustomerId, tag: &str) -> Result<()> {
        let mut state = self.write();
        if state.fail_on_write {
            return Err(SagaError::external("storefront", "tag write rejected"));
        }
        state.tags.push((customer.clone(), tag.to_string()));
        Ok(())
    }
}
