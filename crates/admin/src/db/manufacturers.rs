//! Manufacturer repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pharmacy_core::ManufacturerId;

use super::RepositoryError;
use crate::models::catalog::{Manufacturer, ManufacturerInput, ManufacturerListItem};

#[derive(Debug, sqlx::FromRow)]
struct ManufacturerRow {
    id: i32,
    name: String,
    website: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ManufacturerRow> for Manufacturer {
    fn from(row: ManufacturerRow) -> Self {
        Self {
            id: ManufacturerId::new(row.id),
            name: row.name,
            website: row.website,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ManufacturerListRow {
    #[sqlx(flatten)]
    manufacturer: ManufacturerRow,
    product_count: i64,
}

/// Repository for `rx.manufacturer`.
pub struct ManufacturerRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ManufacturerRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Manufacturers by name with their product counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<ManufacturerListItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, ManufacturerListRow>(
            "SELECT m.id, m.name, m.website, m.created_at, \
                    (SELECT COUNT(*) FROM rx.product p WHERE p.manufacturer_id = m.id) AS product_count \
             FROM rx.manufacturer m ORDER BY lower(m.name)",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ManufacturerListItem {
                manufacturer: row.manufacturer.into(),
                product_count: row.product_count,
            })
            .collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ManufacturerId) -> Result<Option<Manufacturer>, RepositoryError> {
        let row = sqlx::query_as::<_, ManufacturerRow>(
            "SELECT id, name, website, created_at FROM rx.manufacturer WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create(&self, input: &ManufacturerInput) -> Result<Manufacturer, RepositoryError> {
        let row = sqlx::query_as::<_, ManufacturerRow>(
            "INSERT INTO rx.manufacturer (name, website) VALUES ($1, $2) \
             RETURNING id, name, website, created_at",
        )
        .bind(&input.name)
        .bind(input.website.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "a manufacturer with this name"))?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    /// Returns `RepositoryError::NotFound` if the manufacturer does not exist.
    pub async fn update(
        &self,
        id: ManufacturerId,
        input: &ManufacturerInput,
    ) -> Result<Manufacturer, RepositoryError> {
        let row = sqlx::query_as::<_, ManufacturerRow>(
            "UPDATE rx.manufacturer SET name = $2, website = $3 WHERE id = $1 \
             RETURNING id, name, website, created_at",
        )
        .bind(id.as_i32())
        .bind(&input.name)
        .bind(input.website.as_deref())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "a manufacturer with this name"))?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::InUse` while products reference it.
    /// Returns `RepositoryError::NotFound` if the manufacturer does not exist.
    pub async fn delete(&self, id: ManufacturerId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM rx.manufacturer WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await
            .map_err(|e| RepositoryError::from_write(e, "manufacturer"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
