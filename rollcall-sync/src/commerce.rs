//! Commerce data source access
//!
//! Orders and line items live in mirror tables (`shop_orders`,
//! `shop_order_items`) populated from the external commerce platform by an
//! out-of-scope replication job. Rollcall reads them as a generic queryable
//! store and writes back exactly two fields per line item: the attributed
//! discount total and the serialized breakdown.

use chrono::{DateTime, Utc};
use rollcall_common::text;
use rollcall_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Order statuses that count as a confirmed booking
pub const PAID_STATUSES: &[&str] = &["processing", "completed"];

/// SQL list literal of the paid statuses
fn paid_status_list() -> String {
    PAID_STATUSES
        .iter()
        .map(|status| format!("'{}'", status))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Raw attribute bag of a line item, product or variant
///
/// Keys arrive case-inconsistent and values may be scalars or lists; every
/// lookup is case-insensitive and returns a trimmed, entity-decoded value.
#[derive(Debug, Clone, Default)]
pub struct AttributeBag(serde_json::Map<String, serde_json::Value>);

impl AttributeBag {
    /// Parse the stored JSON object; malformed bags degrade to empty
    pub fn from_json(raw: &str) -> AttributeBag {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => AttributeBag(map),
            _ => AttributeBag::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive lookup; `-` and `_` in keys are interchangeable
    pub fn get(&self, key: &str) -> Option<String> {
        let wanted = normalize_key(key);
        self.0
            .iter()
            .find(|(k, _)| normalize_key(k) == wanted)
            .and_then(|(_, v)| value_to_string(v))
    }

    /// First key of `keys` that resolves to a non-empty value
    pub fn get_any(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.get(key))
    }

    pub fn has_any(&self, keys: &[&str]) -> bool {
        self.get_any(keys).is_some()
    }

    #[cfg(test)]
    pub fn insert(&mut self, key: &str, value: serde_json::Value) {
        self.0.insert(key.to_string(), value);
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => text::clean(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Array(items) => items.iter().find_map(value_to_string),
        _ => None,
    }
}

/// Order-level discount not attached to any specific line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponLine {
    pub name: String,
    pub amount: f64,
}

/// One commerce order header
#[derive(Debug, Clone)]
pub struct Order {
    pub id: i64,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub billing_name: String,
    pub billing_email: String,
    pub billing_phone: String,
    pub coupons: Vec<CouponLine>,
}

/// One line item of a commerce order
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub variant_id: i64,
    pub name: String,
    pub attributes: AttributeBag,
    pub subtotal: f64,
    pub total: f64,
    pub discount_total: Option<f64>,
    pub discount_breakdown: Option<String>,
}

/// Read/write access to the commerce mirror tables
#[derive(Clone)]
pub struct CommerceStore {
    db: SqlitePool,
}

impl CommerceStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Load a single order header
    pub async fn order(&self, order_id: i64) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, status, created_at, billing_name, billing_email, billing_phone, coupon_lines
             FROM shop_orders WHERE id = ?",
        )
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|row| order_from_row(&row)))
    }

    /// Load all orders in a confirmed status, oldest first
    pub async fn paid_orders(&self) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT id, status, created_at, billing_name, billing_email, billing_phone, coupon_lines
             FROM shop_orders
             WHERE status IN ({})
             ORDER BY id ASC",
            paid_status_list()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.db).await?;

        Ok(rows.iter().map(order_from_row).collect())
    }

    /// Load the line items of one order
    pub async fn items_for_order(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, variant_id, name, attributes,
                    subtotal, total, discount_total, discount_breakdown
             FROM shop_order_items WHERE order_id = ? ORDER BY id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| OrderItem {
                id: row.get("id"),
                order_id: row.get("order_id"),
                product_id: row.get("product_id"),
                variant_id: row.get("variant_id"),
                name: row.get("name"),
                attributes: AttributeBag::from_json(row.get("attributes")),
                subtotal: row.get("subtotal"),
                total: row.get("total"),
                discount_total: row.get("discount_total"),
                discount_breakdown: row.get("discount_breakdown"),
            })
            .collect())
    }

    /// Write the two discount fields back onto a line item
    pub async fn write_item_discount(
        &self,
        item_id: i64,
        total: f64,
        breakdown_json: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE shop_order_items SET discount_total = ?, discount_breakdown = ? WHERE id = ?",
        )
        .bind(total)
        .bind(breakdown_json)
        .bind(item_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Orders still missing attributed discounts, one migration chunk at a time
    pub async fn unmigrated_order_ids(&self, limit: i64) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT DISTINCT i.order_id
             FROM shop_order_items i
             JOIN shop_orders o ON o.id = i.order_id
             WHERE i.discount_total IS NULL
               AND o.status IN ({})
             ORDER BY i.order_id ASC
             LIMIT ?",
            paid_status_list()
        );
        let ids = sqlx::query_scalar(&sql).bind(limit).fetch_all(&self.db).await?;

        Ok(ids)
    }

    /// Total orders awaiting discount migration
    pub async fn unmigrated_order_count(&self) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(DISTINCT i.order_id)
             FROM shop_order_items i
             JOIN shop_orders o ON o.id = i.order_id
             WHERE i.discount_total IS NULL
               AND o.status IN ({})",
            paid_status_list()
        );
        let count = sqlx::query_scalar(&sql).fetch_one(&self.db).await?;

        Ok(count)
    }
}

fn order_from_row(row: &sqlx::sqlite::SqliteRow) -> Order {
    let created_at: Option<String> = row.get("created_at");
    let created_at = created_at
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let coupons: Vec<CouponLine> =
        serde_json::from_str(row.get::<&str, _>("coupon_lines")).unwrap_or_default();

    Order {
        id: row.get("id"),
        status: row.get("status"),
        created_at,
        billing_name: row.get("billing_name"),
        billing_email: row.get("billing_email"),
        billing_phone: row.get("billing_phone"),
        coupons,
    }
}

/// Create the commerce mirror tables if the replication job has not yet
/// run on this database (idempotent)
pub async fn init_mirror_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shop_orders (
            id INTEGER PRIMARY KEY,
            status TEXT NOT NULL DEFAULT '',
            created_at TEXT,
            billing_name TEXT NOT NULL DEFAULT '',
            billing_email TEXT NOT NULL DEFAULT '',
            billing_phone TEXT NOT NULL DEFAULT '',
            coupon_lines TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shop_order_items (
            id INTEGER PRIMARY KEY,
            order_id INTEGER NOT NULL,
            product_id INTEGER NOT NULL DEFAULT 0,
            variant_id INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL DEFAULT '',
            attributes TEXT NOT NULL DEFAULT '{}',
            subtotal REAL NOT NULL DEFAULT 0,
            total REAL NOT NULL DEFAULT 0,
            discount_total REAL,
            discount_breakdown TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_shop_items_order ON shop_order_items(order_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shop_products (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            attributes TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shop_product_variants (
            id INTEGER PRIMARY KEY,
            product_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT '',
            attributes TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
