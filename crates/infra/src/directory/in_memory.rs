use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use stocktake_audit::{Operator, Product};
use stocktake_core::OperatorId;

use super::{OperatorDirectory, ProductCatalog};
use crate::store::StoreError;

/// Seed data for [`InMemoryDirectory`], usually read from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryFixtures {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub operators: Vec<Operator>,
}

impl DirectoryFixtures {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Default)]
struct Entries {
    products_by_code: HashMap<String, Product>,
    operators: HashMap<OperatorId, Operator>,
}

/// In-memory product catalog and operator directory.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<Entries>,
}

impl InMemoryDirectory {
    pub fn from_fixtures(fixtures: DirectoryFixtures) -> Self {
        let entries = Entries {
            products_by_code: fixtures
                .products
                .into_iter()
                .map(|p| (p.code.clone(), p))
                .collect(),
            operators: fixtures.operators.into_iter().map(|o| (o.id, o)).collect(),
        };
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Entries>, StoreError> {
        self.entries
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl ProductCatalog for InMemoryDirectory {
    async fn lookup_by_code(&self, code: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products_by_code.get(code).cloned())
    }
}

#[async_trait::async_trait]
impl OperatorDirectory for InMemoryDirectory {
    async fn find_by_id(&self, id: OperatorId) -> Result<Option<Operator>, StoreError> {
        Ok(self.read()?.operators.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Operator>, StoreError> {
        Ok(self
            .read()?
            .operators
            .values()
            .find(|o| o.username == username)
            .cloned())
    }
}
