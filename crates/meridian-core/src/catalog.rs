//! # Catalog Lookup Trait
//!
//! The pricing engine needs catalog records (products, variants, discounts,
//! taxes) but must stay pure. [`Catalog`] is the typed capability interface
//! it prices against: the storage layer pre-loads the records a cart
//! references into an in-memory snapshot and hands it over, so pricing is a
//! deterministic function of its inputs.
//!
//! Implementations must only surface *active* records; an inactive record is
//! indistinguishable from a missing one.

use std::collections::HashMap;

use crate::types::{Discount, Product, Tax, Variant};

/// Read-only, tenant-scoped catalog lookups.
pub trait Catalog {
    fn product(&self, id: &str) -> Option<&Product>;
    fn variant(&self, id: &str) -> Option<&Variant>;
    fn discount(&self, id: &str) -> Option<&Discount>;
    fn tax(&self, id: &str) -> Option<&Tax>;
}

/// An in-memory catalog snapshot: the records one cart references, loaded
/// up-front. Also the test double for the pricing engine.
#[derive(Debug, Default, Clone)]
pub struct CatalogSnapshot {
    products: HashMap<String, Product>,
    variants: HashMap<String, Variant>,
    discounts: HashMap<String, Discount>,
    taxes: HashMap<String, Tax>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&mut self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    pub fn add_variant(&mut self, variant: Variant) {
        self.variants.insert(variant.id.clone(), variant);
    }

    pub fn add_discount(&mut self, discount: Discount) {
        self.discounts.insert(discount.id.clone(), discount);
    }

    pub fn add_tax(&mut self, tax: Tax) {
        self.taxes.insert(tax.id.clone(), tax);
    }
}

impl Catalog for CatalogSnapshot {
    fn product(&self, id: &str) -> Option<&Product> {
        self.products.get(id).filter(|p| p.is_active)
    }

    fn variant(&self, id: &str) -> Option<&Variant> {
        self.variants.get(id).filter(|v| v.is_active)
    }

    fn discount(&self, id: &str) -> Option<&Discount> {
        self.discounts.get(id).filter(|d| d.is_active)
    }

    fn tax(&self, id: &str) -> Option<&Tax> {
        self.taxes.get(id).filter(|t| t.is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_inactive_records_are_invisible() {
        let now = Utc::now();
        let mut snapshot = CatalogSnapshot::new();
        snapshot.add_product(Product {
            id: "p1".into(),
            tenant_id: "t1".into(),
            sku: "SKU-1".into(),
            name: "Inactive".into(),
            price_cents: 100,
            tax_ids: vec![],
            is_service: false,
            is_kitchen: false,
            requires_id_check: false,
            min_age: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        });

        assert!(snapshot.product("p1").is_none());
        assert!(snapshot.product("missing").is_none());
    }
}
