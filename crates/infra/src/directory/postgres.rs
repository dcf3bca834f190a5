//! Postgres adapters over the externally owned `products` and `operators`
//! tables. Read-only.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::instrument;

use stocktake_audit::{Operator, Product};
use stocktake_core::{OperatorId, ProductId};

use super::{OperatorDirectory, ProductCatalog};
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn lookup_error(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("sqlx error in {operation}: {err}"))
}

fn product_from_row(row: &PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        category_code: row.try_get("category_code")?,
        location: row.try_get("location")?,
    })
}

fn operator_from_row(row: &PgRow) -> Result<Operator, sqlx::Error> {
    Ok(Operator {
        id: OperatorId::from_uuid(row.try_get("id")?),
        username: row.try_get("username")?,
        is_active: row.try_get("is_active")?,
    })
}

#[async_trait::async_trait]
impl ProductCatalog for PostgresDirectory {
    #[instrument(skip(self), err)]
    async fn lookup_by_code(&self, code: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            "SELECT id, code, name, category_code, location FROM products WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| lookup_error("lookup_product", e))?;

        row.as_ref()
            .map(product_from_row)
            .transpose()
            .map_err(|e| lookup_error("lookup_product", e))
    }
}

#[async_trait::async_trait]
impl OperatorDirectory for PostgresDirectory {
    #[instrument(skip(self), err)]
    async fn find_by_id(&self, id: OperatorId) -> Result<Option<Operator>, StoreError> {
        let row = sqlx::query("SELECT id, username, is_active FROM operators WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| lookup_error("find_operator", e))?;

        row.as_ref()
            .map(operator_from_row)
            .transpose()
            .map_err(|e| lookup_error("find_operator", e))
    }

    #[instrument(skip(self), err)]
    async fn find_by_username(&self, username: &str) -> Result<Option<Operator>, StoreError> {
        let row = sqlx::query("SELECT id, username, is_active FROM operators WHERE username = $1")
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| lookup_error("find_operator", e))?;

        row.as_ref()
            .map(operator_from_row)
            .transpose()
            .map_err(|e| lookup_error("find_operator", e))
    }

    /// One round trip instead of a lookup per id.
    #[instrument(skip(self, ids), fields(operator_count = ids.len()), err)]
    async fn names_for(
        &self,
        ids: &[OperatorId],
    ) -> Result<HashMap<OperatorId, String>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<uuid::Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

        let rows = sqlx::query("SELECT id, username FROM operators WHERE id = ANY($1)")
            .bind(&ids[..])
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| lookup_error("operator_names", e))?;

        let mut names = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: uuid::Uuid = row
                .try_get("id")
                .map_err(|e| lookup_error("operator_names", e))?;
            let username: String = row
                .try_get("username")
                .map_err(|e| lookup_error("operator_names", e))?;
            names.insert(OperatorId::from_uuid(id), username);
        }
        Ok(names)
    }
}
