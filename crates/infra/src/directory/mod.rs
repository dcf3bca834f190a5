//! Read-only lookups against the product catalog and operator directory.
//!
//! Both are owned by external systems; the engine only resolves records
//! through these traits.

pub mod in_memory;
pub mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use stocktake_audit::{Operator, Product};
use stocktake_core::OperatorId;

use crate::store::StoreError;

pub use in_memory::{DirectoryFixtures, InMemoryDirectory};
pub use postgres::PostgresDirectory;

/// How a caller identifies an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorRef {
    Id(OperatorId),
    Username(String),
}

impl OperatorRef {
    /// A UUID is taken as an id, anything else as a username.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<OperatorId>() {
            Ok(id) => OperatorRef::Id(id),
            Err(_) => OperatorRef::Username(raw.to_string()),
        }
    }
}

impl core::fmt::Display for OperatorRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OperatorRef::Id(id) => write!(f, "{id}"),
            OperatorRef::Username(name) => f.write_str(name),
        }
    }
}

#[async_trait::async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn lookup_by_code(&self, code: &str) -> Result<Option<Product>, StoreError>;
}

#[async_trait::async_trait]
pub trait OperatorDirectory: Send + Sync {
    async fn find_by_id(&self, id: OperatorId) -> Result<Option<Operator>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Operator>, StoreError>;

    async fn lookup_by_ref(&self, operator: &OperatorRef) -> Result<Option<Operator>, StoreError> {
        match operator {
            OperatorRef::Id(id) => self.find_by_id(*id).await,
            OperatorRef::Username(name) => self.find_by_username(name).await,
        }
    }

    /// Display names for the given operators. Unresolvable ids are left out.
    async fn names_for(
        &self,
        ids: &[OperatorId],
    ) -> Result<HashMap<OperatorId, String>, StoreError> {
        let mut names = HashMap::with_capacity(ids.len());
        for id in ids {
            if names.contains_key(id) {
                continue;
            }
            if let Some(operator) = self.find_by_id(*id).await? {
                names.insert(*id, operator.username);
            }
        }
        Ok(names)
    }
}

#[async_trait::async_trait]
impl<C> ProductCatalog for Arc<C>
where
    C: ProductCatalog + ?Sized,
{
    async fn lookup_by_code(&self, code: &str) -> Result<Option<Product>, StoreError> {
        (**self).lookup_by_code(code).await
    }
}

#[async_trait::async_trait]
impl<D> OperatorDirectory for Arc<D>
where
    D: OperatorDirectory + ?Sized,
{
    async fn find_by_id(&self, id: OperatorId) -> Result<Option<Operator>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Operator>, StoreError> {
        (**self).find_by_username(username).await
    }

    async fn names_for(
        &self,
        ids: &[OperatorId],
    ) -> Result<HashMap<OperatorId, String>, StoreError> {
        (**self).names_for(ids).await
    }
}
