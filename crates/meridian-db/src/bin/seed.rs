//! Seeds a demo store into a Meridian POS database.
//!
//! Usage:
//! ```text
//! cargo run -p meridian-db --bin seed [path/to/pos.db]
//! ```
//!
//! Creates a small catalog (taxed products, a variant, an age-restricted
//! item), starting stock, a 10%-off coupon and a loyalty program, then
//! opens a register session. Safe to point at a fresh file only; reruns
//! against a seeded database fail on unique constraints.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use meridian_core::{
    Coupon, Discount, DiscountKind, ItemRef, LoyaltyProgram, Product, StockReason, Tax, Variant,
    DEFAULT_TENANT_ID,
};
use meridian_db::{Database, DbConfig, DEFAULT_LOCATION_ID};

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "meridian.db".to_string());
    info!(path, "Seeding demo store");

    let db = Database::new(DbConfig::new(&path)).await?;
    let catalog = db.catalog();
    let now = Utc::now();

    // ---- Taxes ----
    let sales_tax_id = new_id();
    catalog
        .insert_tax(&Tax {
            id: sales_tax_id.clone(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            name: "Sales Tax 8%".into(),
            rate_bps: 800,
            inclusive: false,
            is_active: true,
        })
        .await?;
    let vat_id = new_id();
    catalog
        .insert_tax(&Tax {
            id: vat_id.clone(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            name: "VAT 20% (included)".into(),
            rate_bps: 2000,
            inclusive: true,
            is_active: true,
        })
        .await?;

    // ---- Products ----
    let mut stocked: Vec<(ItemRef, i64)> = Vec::new();

    let coffee_id = new_id();
    catalog
        .insert_product(&Product {
            id: coffee_id.clone(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            sku: "COF-001".into(),
            name: "House Blend Coffee 340g".into(),
            price_cents: 1299,
            tax_ids: vec![sales_tax_id.clone()],
            is_service: false,
            is_kitchen: false,
            requires_id_check: false,
            min_age: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;
    stocked.push((ItemRef::product(&coffee_id), 120));

    let shirt_id = new_id();
    catalog
        .insert_product(&Product {
            id: shirt_id.clone(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            sku: "TSH-000".into(),
            name: "Logo T-Shirt".into(),
            price_cents: 2499,
            tax_ids: vec![vat_id.clone()],
            is_service: false,
            is_kitchen: false,
            requires_id_check: false,
            min_age: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;
    for (size, delta_cents) in [("S", 0), ("M", 0), ("L", 0), ("XL", 200)] {
        let variant_id = new_id();
        catalog
            .insert_variant(&Variant {
                id: variant_id.clone(),
                tenant_id: DEFAULT_TENANT_ID.into(),
                product_id: shirt_id.clone(),
                sku: format!("TSH-{size}"),
                name: format!("Logo T-Shirt ({size})"),
                price_cents: if delta_cents == 0 { None } else { Some(2499 + delta_cents) },
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await?;
        stocked.push((ItemRef::variant(&variant_id), 40));
    }

    let wine_id = new_id();
    catalog
        .insert_product(&Product {
            id: wine_id.clone(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            sku: "WIN-001".into(),
            name: "Pinot Noir 750ml".into(),
            price_cents: 1899,
            tax_ids: vec![sales_tax_id.clone()],
            is_service: false,
            is_kitchen: false,
            requires_id_check: true,
            min_age: Some(21),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;
    stocked.push((ItemRef::product(&wine_id), 60));

    // A service line: no stock identity, never restocked.
    catalog
        .insert_product(&Product {
            id: new_id(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            sku: "SVC-GIFT".into(),
            name: "Gift Wrapping".into(),
            price_cents: 300,
            tax_ids: vec![],
            is_service: true,
            is_kitchen: false,
            requires_id_check: false,
            min_age: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;

    // ---- Starting stock ----
    let inventory = db.inventory();
    for (item, quantity) in &stocked {
        inventory
            .apply_delta(
                DEFAULT_TENANT_ID,
                DEFAULT_LOCATION_ID,
                item,
                *quantity,
                StockReason::Purchase,
                None,
                now,
            )
            .await?;
        inventory
            .set_reorder_point(DEFAULT_TENANT_ID, DEFAULT_LOCATION_ID, item, Some(10), now)
            .await?;
    }
    info!(items = stocked.len(), "Stock received");

    // ---- Promotions ----
    let discount_id = new_id();
    catalog
        .insert_discount(&Discount {
            id: discount_id.clone(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            name: "10% off".into(),
            kind: DiscountKind::Percent,
            value: 1000,
            is_active: true,
        })
        .await?;
    catalog
        .insert_coupon(&Coupon {
            id: new_id(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            code: "WELCOME10".into(),
            discount_id,
            usage_limit: Some(100),
            usage_count: 0,
            starts_at: None,
            ends_at: None,
            is_active: true,
        })
        .await?;

    db.loyalty()
        .insert_program(&LoyaltyProgram {
            id: new_id(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            redeem_rate_cents_per_point: 5,
            points_per_currency_unit: 1,
            is_active: true,
        })
        .await?;

    // ---- Register ----
    let session = db
        .sessions()
        .open_session(DEFAULT_TENANT_ID, "R1", 20_000, now)
        .await?;
    info!(session_id = %session.id, "Register session R1 opened with $200.00 float");

    info!("Demo store seeded: coupon WELCOME10, loyalty 1pt/$, register R1");
    Ok(())
}
