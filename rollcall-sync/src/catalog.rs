//! Product catalog access
//!
//! Read-only view of the commerce catalog mirror (`shop_products`,
//! `shop_product_variants`). The resolver walks variant attributes before
//! parent-product attributes, and published bookable variants drive
//! placeholder creation in the roster ledger.

use rollcall_common::Result;
use sqlx::{Row, SqlitePool};

use crate::commerce::AttributeBag;

/// Catalog status of a product or variant visible to buyers
pub const STATUS_PUBLISHED: &str = "publish";

#[derive(Debug, Clone)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub attributes: AttributeBag,
}

#[derive(Debug, Clone)]
pub struct Variant {
    pub id: i64,
    pub product_id: i64,
    pub status: String,
    pub attributes: AttributeBag,
}

#[derive(Clone)]
pub struct CatalogStore {
    db: SqlitePool,
}

impl CatalogStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn product(&self, product_id: i64) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, status, attributes FROM shop_products WHERE id = ?")
            .bind(product_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|row| Product {
            id: row.get("id"),
            name: row.get("name"),
            status: row.get("status"),
            attributes: AttributeBag::from_json(row.get("attributes")),
        }))
    }

    pub async fn variant(&self, variant_id: i64) -> Result<Option<Variant>> {
        let row = sqlx::query(
            "SELECT id, product_id, status, attributes FROM shop_product_variants WHERE id = ?",
        )
        .bind(variant_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|row| Variant {
            id: row.get("id"),
            product_id: row.get("product_id"),
            status: row.get("status"),
            attributes: AttributeBag::from_json(row.get("attributes")),
        }))
    }

    /// All published variants of published products, joined with their parent
    pub async fn published_variants(&self) -> Result<Vec<(Variant, Product)>> {
        let rows = sqlx::query(
            "SELECT v.id AS v_id, v.product_id AS v_product_id, v.status AS v_status,
                    v.attributes AS v_attributes,
                    p.id AS p_id, p.name AS p_name, p.status AS p_status,
                    p.attributes AS p_attributes
             FROM shop_product_variants v
             JOIN shop_products p ON p.id = v.product_id
             WHERE v.status = 'publish' AND p.status = 'publish'
             ORDER BY v.id ASC",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    Variant {
                        id: row.get("v_id"),
                        product_id: row.get("v_product_id"),
                        status: row.get("v_status"),
                        attributes: AttributeBag::from_json(row.get("v_attributes")),
                    },
                    Product {
                        id: row.get("p_id"),
                        name: row.get("p_name"),
                        status: row.get("p_status"),
                        attributes: AttributeBag::from_json(row.get("p_attributes")),
                    },
                )
            })
            .collect())
    }
}
