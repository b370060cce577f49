//! # Catalog Repository
//!
//! Database operations for products, variants, taxes, discounts and
//! coupons.
//!
//! The pricing engine never queries the database: before pricing, the
//! service asks [`CatalogRepository::snapshot_for_cart`] for a
//! [`CatalogSnapshot`] holding exactly the records the cart references,
//! then prices against that in-memory view. Missing records surface as
//! `NotFound` from the engine, not as SQL errors.
//!
//! `tax_ids` on products is a JSON array column, so product rows are
//! mapped by hand instead of `FromRow`.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::pricing::CartInput;
use meridian_core::{CatalogSnapshot, Coupon, Discount, Product, Tax, Variant};

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

/// Maps a product row, decoding the `tax_ids` JSON column.
pub(crate) fn product_from_row(row: &SqliteRow) -> DbResult<Product> {
    let tax_ids_json: String = row.try_get("tax_ids")?;
    let tax_ids: Vec<String> = serde_json::from_str(&tax_ids_json)
        .map_err(|e| DbError::corrupt("products", e.to_string()))?;

    Ok(Product {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        price_cents: row.try_get("price_cents")?,
        tax_ids,
        is_service: row.try_get("is_service")?,
        is_kitchen: row.try_get("is_kitchen")?,
        requires_id_check: row.try_get("requires_id_check")?,
        min_age: row.try_get("min_age")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Gets a product by ID.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    /// Gets a variant by ID.
    pub async fn get_variant(&self, id: &str) -> DbResult<Option<Variant>> {
        let variant = sqlx::query_as::<_, Variant>("SELECT * FROM variants WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(variant)
    }

    /// Gets a tax by ID.
    pub async fn get_tax(&self, id: &str) -> DbResult<Option<Tax>> {
        let tax = sqlx::query_as::<_, Tax>("SELECT * FROM taxes WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tax)
    }

    /// Gets a discount by ID.
    pub async fn get_discount(&self, id: &str) -> DbResult<Option<Discount>> {
        let discount = sqlx::query_as::<_, Discount>("SELECT * FROM discounts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(discount)
    }

    /// Looks up a coupon by its redemption code within a tenant.
    pub async fn get_coupon_by_code(&self, tenant_id: &str, code: &str) -> DbResult<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(
            "SELECT * FROM coupons WHERE tenant_id = ?1 AND code = ?2",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }

    // =========================================================================
    // Snapshot Assembly
    // =========================================================================

    /// Loads every catalog record a cart references into an in-memory
    /// snapshot: variants (with their parent products), products, line
    /// discounts, and all taxes attached to the loaded products.
    ///
    /// Records that don't exist are simply absent from the snapshot; the
    /// pricing engine turns those holes into `NotFound` errors.
    pub async fn snapshot_for_cart(
        &self,
        tenant_id: &str,
        input: &CartInput,
    ) -> DbResult<CatalogSnapshot> {
        let mut snapshot = CatalogSnapshot::new();

        for line in &input.lines {
            if let Some(variant_id) = &line.variant_id {
                if let Some(variant) = self.get_variant(variant_id).await? {
                    if variant.tenant_id == tenant_id {
                        if let Some(product) = self.get_product(&variant.product_id).await? {
                            self.load_taxes(&product, &mut snapshot).await?;
                            snapshot.add_product(product);
                        }
                        snapshot.add_variant(variant);
                    }
                }
            } else if let Some(product_id) = &line.product_id {
                if let Some(product) = self.get_product(product_id).await? {
                    if product.tenant_id == tenant_id {
                        self.load_taxes(&product, &mut snapshot).await?;
                        snapshot.add_product(product);
                    }
                }
            }

            if let Some(discount_id) = &line.discount_id {
                if let Some(discount) = self.get_discount(discount_id).await? {
                    if discount.tenant_id == tenant_id {
                        snapshot.add_discount(discount);
                    }
                }
            }
        }

        Ok(snapshot)
    }

    async fn load_taxes(&self, product: &Product, snapshot: &mut CatalogSnapshot) -> DbResult<()> {
        for tax_id in &product.tax_ids {
            if let Some(tax) = self.get_tax(tax_id).await? {
                snapshot.add_tax(tax);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a product.
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        let tax_ids_json = serde_json::to_string(&product.tax_ids)
            .map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, sku, name, price_cents, tax_ids,
                is_service, is_kitchen, requires_id_check, min_age,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(&tax_ids_json)
        .bind(product.is_service)
        .bind(product.is_kitchen)
        .bind(product.requires_id_check)
        .bind(product.min_age)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a variant.
    pub async fn insert_variant(&self, variant: &Variant) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO variants (
                id, tenant_id, product_id, sku, name, price_cents,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.tenant_id)
        .bind(&variant.product_id)
        .bind(&variant.sku)
        .bind(&variant.name)
        .bind(variant.price_cents)
        .bind(variant.is_active)
        .bind(variant.created_at)
        .bind(variant.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a tax.
    pub async fn insert_tax(&self, tax: &Tax) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO taxes (id, tenant_id, name, rate_bps, inclusive, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&tax.id)
        .bind(&tax.tenant_id)
        .bind(&tax.name)
        .bind(tax.rate_bps)
        .bind(tax.inclusive)
        .bind(tax.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a discount.
    pub async fn insert_discount(&self, discount: &Discount) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO discounts (id, tenant_id, name, kind, value, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&discount.id)
        .bind(&discount.tenant_id)
        .bind(&discount.name)
        .bind(discount.kind)
        .bind(discount.value)
        .bind(discount.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a coupon.
    pub async fn insert_coupon(&self, coupon: &Coupon) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, tenant_id, code, discount_id, usage_limit, usage_count,
                starts_at, ends_at, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&coupon.id)
        .bind(&coupon.tenant_id)
        .bind(&coupon.code)
        .bind(&coupon.discount_id)
        .bind(coupon.usage_limit)
        .bind(coupon.usage_count)
        .bind(coupon.starts_at)
        .bind(coupon.ends_at)
        .bind(coupon.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Transactional Operations
    // =========================================================================

    /// Claims one use of a coupon inside the caller's transaction.
    ///
    /// The guard repeats the limit check in SQL, so of N concurrent
    /// finalizes racing for the last use exactly one sees a row change.
    /// Returns `false` when the limit was already reached (or the coupon
    /// went inactive); the caller must abort its transaction.
    pub async fn claim_coupon_use_tx(
        conn: &mut SqliteConnection,
        coupon_id: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET usage_count = usage_count + 1
            WHERE id = ?1
              AND is_active = 1
              AND (usage_limit IS NULL OR usage_count < usage_limit)
            "#,
        )
        .bind(coupon_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
