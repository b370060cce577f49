//! # PosService: Sale Orchestration
//!
//! The service layer ties the pure engines in `meridian-core` to the
//! repositories: it resolves catalog snapshots, prices carts, and runs the
//! finalize/refund flows as single SQLite transactions.
//!
//! ## Finalize Transaction
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                       │
//! │    1. status draft → completed   (guarded UPDATE)            │
//! │    2. stock -qty per line        (guarded UPDATE + ledger)   │
//! │    3. coupon usage_count + 1     (guarded UPDATE)            │
//! │    4. points redeemed / earned   (guarded UPDATE + ledger)   │
//! │    5. payments inserted                                      │
//! │    6. expected drawer cash adjusted                          │
//! │    7. receipt document stored                                │
//! │  COMMIT                                                      │
//! │                                                              │
//! │  Any guard failing rolls the whole transaction back: a sale  │
//! │  is either fully settled or untouched.                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Refund runs the mirror flow: refund rows, restocks, loyalty reversal
//! and the refunded status flip, all in one transaction.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbError;
use crate::pool::Database;
use crate::repository::catalog::CatalogRepository;
use crate::repository::inventory::{InventoryRepository, StockApply};
use crate::repository::loyalty::LoyaltyRepository;
use crate::repository::refund::RefundRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::session::SessionRepository;
use crate::DEFAULT_LOCATION_ID;
use meridian_core::pricing::{price_cart, CartInput, PricedCart, PricingContext};
use meridian_core::receipt::{format_receipt_number, ReceiptDocument};
use meridian_core::refund::{plan_refund, RefundLineRequest};
use meridian_core::validation::{age_in_years, validate_payment_amount};
use meridian_core::{
    loyalty, CoreError, Coupon, Discount, ItemRef, LoyaltyEventKind, Payment, PaymentMethod,
    PosConfig, Refund, RefundItem, Sale, SaleChannel, SaleItem, SaleStatus, SessionStatus,
    StockReason,
};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by service operations: domain rejections from the core
/// engines, or storage failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<meridian_core::ValidationError> for ServiceError {
    fn from(err: meridian_core::ValidationError) -> Self {
        ServiceError::Core(CoreError::Validation(err))
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Input / Output Types
// =============================================================================

/// Request to open a new draft sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDraftSale {
    pub tenant_id: String,
    pub cashier_id: String,
    pub location_id: Option<String>,
    pub register_session_id: Option<String>,
    pub customer_id: Option<String>,
    pub channel: SaleChannel,
    pub notes: Option<String>,
    pub cart: CartInput,
}

/// One tendered payment at finalize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderInput {
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub reference: Option<String>,
}

/// ID document data presented for age-restricted lines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdVerification {
    pub birth_date: NaiveDate,
}

/// Everything finalize produces.
#[derive(Debug, Clone)]
pub struct FinalizedSale {
    pub sale: Sale,
    pub receipt: ReceiptDocument,
    pub change_cents: i64,
    pub points_earned: i64,
}

/// Request to refund (part of) a completed sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub cashier_id: String,
    pub reason: Option<String>,
    /// How the money goes back. Cash refunds reduce the drawer's
    /// expected amount.
    pub method: PaymentMethod,
    pub lines: Vec<RefundLineRequest>,
}

// =============================================================================
// Service
// =============================================================================

/// Orchestrates pricing, lifecycle and settlement over the database.
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct PosService {
    db: Database,
    config: PosConfig,
}

impl PosService {
    /// Creates a service over an opened database.
    pub fn new(db: Database, config: PosConfig) -> Self {
        PosService { db, config }
    }

    /// The underlying database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Pricing
    // =========================================================================

    /// Prices a cart without persisting anything.
    ///
    /// Loads the catalog snapshot and resolves the coupon and loyalty
    /// program the cart references, then delegates to the pure engine.
    pub async fn price_cart(&self, tenant_id: &str, input: &CartInput) -> ServiceResult<PricedCart> {
        let snapshot = self.db.catalog().snapshot_for_cart(tenant_id, input).await?;
        let resolved = self.resolve_promotions(tenant_id, input).await?;

        let ctx = PricingContext {
            coupon: resolved
                .coupon
                .as_ref()
                .map(|(coupon, discount)| (coupon, discount)),
            loyalty_program: resolved.program.as_ref(),
            now: Utc::now(),
        };

        Ok(price_cart(&snapshot, &self.config, input, &ctx)?)
    }

    async fn resolve_promotions(
        &self,
        tenant_id: &str,
        input: &CartInput,
    ) -> ServiceResult<ResolvedPromotions> {
        let catalog = self.db.catalog();

        let coupon = match &input.coupon_code {
            Some(code) => match catalog.get_coupon_by_code(tenant_id, code).await? {
                Some(coupon) => {
                    let discount = catalog
                        .get_discount(&coupon.discount_id)
                        .await?
                        .ok_or_else(|| CoreError::not_found("Discount", &coupon.discount_id))?;
                    Some((coupon, discount))
                }
                // The engine reports the code as rejected; an unknown code
                // is not a storage error.
                None => None,
            },
            None => None,
        };

        let program = if input.points_to_redeem.unwrap_or(0) > 0 {
            self.db.loyalty().get_program(tenant_id).await?
        } else {
            None
        };

        Ok(ResolvedPromotions { coupon, program })
    }

    // =========================================================================
    // Draft Lifecycle
    // =========================================================================

    /// Prices the cart and persists it as a draft sale. Drafts have no
    /// inventory, coupon or loyalty effect.
    pub async fn create_draft_sale(&self, request: CreateDraftSale) -> ServiceResult<Sale> {
        let priced = self.price_cart(&request.tenant_id, &request.cart).await?;
        let now = Utc::now();

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            tenant_id: request.tenant_id,
            location_id: request.location_id,
            register_session_id: request.register_session_id,
            cashier_id: request.cashier_id,
            customer_id: request.customer_id,
            channel: request.channel,
            status: SaleStatus::Draft,
            subtotal_cents: priced.subtotal_cents,
            discount_cents: priced.discount_cents,
            tax_cents: priced.tax_cents,
            included_tax_cents: priced.included_tax_cents,
            shipping_cents: priced.shipping_cents,
            total_cents: priced.total_cents,
            paid_cents: 0,
            change_cents: 0,
            coupon_code: priced.coupon_code.clone(),
            points_redeemed: priced.points_redeemed,
            points_earned: 0,
            age_verified: false,
            receipt_number: None,
            notes: request.notes,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let items = items_from_priced(&sale.id, &priced, now);
        self.db.sales().insert_draft(&sale, &items).await?;

        info!(sale_id = %sale.id, total = sale.total_cents, "Draft sale created");
        Ok(sale)
    }

    /// Reprices a draft against the current catalog and replaces its items.
    /// Drafts are the only mutable state; the same cart input always
    /// produces the same cents.
    pub async fn update_draft_sale(&self, sale_id: &str, cart: &CartInput) -> ServiceResult<Sale> {
        let mut sale = self.load_sale(sale_id).await?;
        if sale.status != SaleStatus::Draft {
            return Err(invalid_state(&sale, "update").into());
        }

        let priced = self.price_cart(&sale.tenant_id, cart).await?;
        let now = Utc::now();

        sale.subtotal_cents = priced.subtotal_cents;
        sale.discount_cents = priced.discount_cents;
        sale.tax_cents = priced.tax_cents;
        sale.included_tax_cents = priced.included_tax_cents;
        sale.shipping_cents = priced.shipping_cents;
        sale.total_cents = priced.total_cents;
        sale.coupon_code = priced.coupon_code.clone();
        sale.points_redeemed = priced.points_redeemed;
        sale.updated_at = now;

        let items = items_from_priced(&sale.id, &priced, now);
        if !self.db.sales().replace_draft(&sale, &items).await? {
            // Lost a race with finalize or void.
            let current = self.load_sale(sale_id).await?;
            return Err(invalid_state(&current, "update").into());
        }

        Ok(sale)
    }

    /// Voids a draft. Completed sales cannot be voided, only refunded.
    pub async fn void_draft_sale(&self, sale_id: &str, cashier_id: &str) -> ServiceResult<()> {
        let now = Utc::now();
        if !self.db.sales().mark_voided(sale_id, now).await? {
            let sale = self.load_sale(sale_id).await?;
            return Err(invalid_state(&sale, "void").into());
        }

        let sale = self.load_sale(sale_id).await?;
        self.db
            .audit()
            .log(&sale.tenant_id, cashier_id, "sale.voided", "sale", sale_id, None, now)
            .await;

        info!(sale_id, "Draft sale voided");
        Ok(())
    }

    // =========================================================================
    // Finalize
    // =========================================================================

    /// Settles a draft sale: validates tenders and age restrictions, then
    /// commits the status flip, stock decrements, coupon claim, loyalty
    /// movements, payments and receipt in one transaction.
    pub async fn finalize_sale(
        &self,
        sale_id: &str,
        tenders: &[TenderInput],
        id_verification: Option<IdVerification>,
    ) -> ServiceResult<FinalizedSale> {
        let sale = self.load_sale(sale_id).await?;
        if sale.status != SaleStatus::Draft {
            return Err(invalid_state(&sale, "finalize").into());
        }
        let mut items = self.db.sales().get_items(sale_id).await?;
        let now = Utc::now();

        // ---- Tender validation (pure, before any write) ----
        if tenders.len() > self.config.max_split_tenders {
            return Err(CoreError::invalid_input(format!(
                "at most {} split tenders allowed",
                self.config.max_split_tenders
            ))
            .into());
        }
        for tender in tenders {
            validate_payment_amount(tender.amount_cents)?;
        }
        let paid_cents: i64 = tenders.iter().map(|t| t.amount_cents).sum();
        if paid_cents < sale.total_cents {
            return Err(CoreError::InsufficientPayment {
                total_cents: sale.total_cents,
                paid_cents,
            }
            .into());
        }
        let change_cents = paid_cents - sale.total_cents;
        let cash_cents: i64 = tenders
            .iter()
            .filter(|t| t.method == PaymentMethod::Cash)
            .map(|t| t.amount_cents)
            .sum();
        // Change is given from the drawer, so it can only come out of cash.
        if change_cents > cash_cents {
            return Err(CoreError::invalid_input(
                "change exceeds cash tendered; card payments cannot overpay",
            )
            .into());
        }

        // ---- Age verification ----
        let age_verified = self.check_age_restrictions(&items, id_verification, now)?;

        // ---- Loyalty context ----
        let program = self.db.loyalty().get_program(&sale.tenant_id).await?;
        let account = match (&sale.customer_id, self.config.loyalty_enabled) {
            (Some(customer_id), true) => Some(
                self.db
                    .loyalty()
                    .get_or_create_account(&sale.tenant_id, customer_id, now)
                    .await?,
            ),
            _ => None,
        };
        if sale.points_redeemed > 0 {
            let account = account.as_ref().ok_or_else(|| {
                CoreError::invalid_input("points redemption requires a customer on the sale")
            })?;
            loyalty::validate_redemption(account.balance, sale.points_redeemed)?;
        }
        // Earned on what the customer actually paid for goods: subtotal
        // minus all discounts, before tax and shipping.
        let points_earned = match (&account, &program) {
            (Some(_), Some(program)) => {
                loyalty::points_earned(program, sale.subtotal_cents - sale.discount_cents)
            }
            _ => 0,
        };

        // ---- Coupon record (claimed inside the transaction) ----
        let coupon = match &sale.coupon_code {
            Some(code) => self
                .db
                .catalog()
                .get_coupon_by_code(&sale.tenant_id, code)
                .await?,
            None => None,
        };

        // A referenced register session must still be open: cash settles
        // into its drawer.
        let session = match &sale.register_session_id {
            Some(id) => {
                let session = self
                    .db
                    .sessions()
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("RegisterSession", id))?;
                if session.status != SessionStatus::Open {
                    return Err(CoreError::invalid_input(format!(
                        "register session {} is not open",
                        session.id
                    ))
                    .into());
                }
                Some(session)
            }
            None => None,
        };
        let register_label = session
            .as_ref()
            .map(|s| s.register_id.clone())
            .unwrap_or_else(|| "POS".to_string());
        let location_id = sale
            .location_id
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCATION_ID.to_string());

        // ---- The settlement transaction ----
        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        // Receipt number: per-register daily sequence, backed by the
        // UNIQUE constraint on receipts.receipt_number.
        let prefix = format!("{}-{}", now.format("%Y%m%d"), register_label);
        let sequence = SaleRepository::next_receipt_sequence_tx(&mut tx, &prefix).await?;
        let receipt_number = format_receipt_number(now, &register_label, sequence);

        if !SaleRepository::mark_completed_tx(
            &mut tx,
            sale_id,
            paid_cents,
            change_cents,
            points_earned,
            age_verified,
            &receipt_number,
            now,
        )
        .await?
        {
            // Another finalize won the guarded flip.
            drop(tx);
            let current = self.load_sale(sale_id).await?;
            return Err(invalid_state(&current, "finalize").into());
        }

        for item in &items {
            let Some(item_ref) = item.item_ref() else {
                continue; // service lines carry no stock
            };
            let outcome = InventoryRepository::apply_delta_tx(
                &mut tx,
                &sale.tenant_id,
                &location_id,
                &item_ref,
                -item.quantity,
                StockReason::Sale,
                Some(sale_id),
                now,
            )
            .await?;
            if let StockApply::Insufficient { available } = outcome {
                drop(tx);
                return Err(CoreError::InsufficientStock {
                    item_id: item_ref.id,
                    available,
                    requested: item.quantity,
                }
                .into());
            }
        }

        if let Some(coupon) = &coupon {
            if !CatalogRepository::claim_coupon_use_tx(&mut tx, &coupon.id).await? {
                drop(tx);
                return Err(CoreError::CouponInvalid {
                    code: coupon.code.clone(),
                    reason: meridian_core::CouponRejection::LimitReached,
                }
                .into());
            }
        }

        if let Some(account) = &account {
            if sale.points_redeemed > 0 {
                let debited = LoyaltyRepository::apply_points_tx(
                    &mut tx,
                    &account.id,
                    -sale.points_redeemed,
                    LoyaltyEventKind::Redeem,
                    Some(sale_id),
                    now,
                )
                .await?;
                if !debited {
                    let available = LoyaltyRepository::balance_tx(&mut tx, &account.id).await?;
                    drop(tx);
                    return Err(CoreError::InsufficientPoints {
                        requested: sale.points_redeemed,
                        available,
                    }
                    .into());
                }
            }
            if points_earned > 0 {
                LoyaltyRepository::apply_points_tx(
                    &mut tx,
                    &account.id,
                    points_earned,
                    LoyaltyEventKind::Earn,
                    Some(sale_id),
                    now,
                )
                .await?;
            }
        }

        let mut payments = Vec::with_capacity(tenders.len());
        for tender in tenders {
            let payment = Payment {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.to_string(),
                method: tender.method,
                amount_cents: tender.amount_cents,
                reference: tender.reference.clone(),
                created_at: now,
            };
            SaleRepository::insert_payment_tx(&mut tx, &payment).await?;
            payments.push(payment);
        }

        if let Some(session) = &session {
            let drawer_delta = cash_cents - change_cents;
            if drawer_delta != 0
                && !SessionRepository::adjust_expected_cash_tx(&mut tx, &session.id, drawer_delta)
                    .await?
            {
                // Closed between the precondition check and the write.
                drop(tx);
                return Err(CoreError::invalid_input(format!(
                    "register session {} is not open",
                    session.id
                ))
                .into());
            }
        }

        let mut settled = sale.clone();
        settled.status = SaleStatus::Completed;
        settled.paid_cents = paid_cents;
        settled.change_cents = change_cents;
        settled.points_earned = points_earned;
        settled.age_verified = age_verified;
        settled.receipt_number = Some(receipt_number.clone());
        settled.updated_at = now;
        settled.completed_at = Some(now);
        for item in &mut items {
            item.completed_at = Some(now);
        }

        let receipt = ReceiptDocument::build(&settled, &items, &payments, &receipt_number, now);
        let document = receipt
            .to_json()
            .map_err(|e| DbError::Internal(e.to_string()))?;
        SaleRepository::insert_receipt_tx(&mut tx, sale_id, &receipt_number, &document, now).await?;

        tx.commit().await.map_err(DbError::from)?;

        self.db
            .audit()
            .log(
                &settled.tenant_id,
                &settled.cashier_id,
                "sale.completed",
                "sale",
                sale_id,
                Some(&format!("total={} paid={}", settled.total_cents, paid_cents)),
                now,
            )
            .await;

        info!(
            sale_id,
            receipt_number = %receipt_number,
            total = settled.total_cents,
            change = change_cents,
            "Sale finalized"
        );

        Ok(FinalizedSale {
            sale: settled,
            receipt,
            change_cents,
            points_earned,
        })
    }

    /// Enforces age-restricted lines against the presented ID.
    fn check_age_restrictions(
        &self,
        items: &[SaleItem],
        id_verification: Option<IdVerification>,
        now: chrono::DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let minimum_age = items
            .iter()
            .filter(|item| item.requires_id_check)
            .filter_map(|item| item.min_age)
            .max();

        let restricted = items.iter().any(|item| item.requires_id_check);
        if !restricted {
            return Ok(false);
        }

        let minimum_age = minimum_age.unwrap_or(18);
        let Some(id) = id_verification else {
            return Err(CoreError::AgeVerificationFailed { minimum_age });
        };
        if age_in_years(id.birth_date, now) < minimum_age {
            return Err(CoreError::AgeVerificationFailed { minimum_age });
        }

        Ok(true)
    }

    // =========================================================================
    // Refund
    // =========================================================================

    /// Refunds (part of) a completed sale: prorated amounts, optional
    /// restocks, loyalty reversal and the refunded status flip when the
    /// sale is exhausted, all in one transaction.
    pub async fn refund_sale(&self, sale_id: &str, request: &RefundRequest) -> ServiceResult<Refund> {
        let sale = self.load_sale(sale_id).await?;
        let items = self.db.sales().get_items(sale_id).await?;
        let now = Utc::now();

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        // Prior totals are read inside the transaction so concurrent
        // refunds of the same line serialize.
        let prior = RefundRepository::refunded_totals_tx(&mut tx, sale_id).await?;
        let plan = plan_refund(
            &sale,
            &items,
            &|id: &str| prior.get(id).copied().unwrap_or_default(),
            &request.lines,
        )?;

        let refund = Refund {
            id: Uuid::new_v4().to_string(),
            tenant_id: sale.tenant_id.clone(),
            sale_id: sale_id.to_string(),
            cashier_id: request.cashier_id.clone(),
            reason: request.reason.clone(),
            total_cents: plan.total_cents,
            points_revoked: plan.loyalty.revoked,
            points_restored: plan.loyalty.restored,
            created_at: now,
        };
        let refund_items: Vec<RefundItem> = plan
            .lines
            .iter()
            .map(|line| RefundItem {
                id: Uuid::new_v4().to_string(),
                refund_id: refund.id.clone(),
                sale_item_id: line.sale_item_id.clone(),
                quantity: line.quantity,
                amount_cents: line.amount_cents,
                restock: line.restock,
            })
            .collect();
        RefundRepository::insert_refund_tx(&mut tx, &refund, &refund_items).await?;

        let location_id = sale
            .location_id
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCATION_ID.to_string());
        for line in &plan.lines {
            if let Some(item_ref) = &line.item_ref {
                InventoryRepository::apply_delta_tx(
                    &mut tx,
                    &sale.tenant_id,
                    &location_id,
                    item_ref,
                    line.quantity,
                    StockReason::Refund,
                    Some(&refund.id),
                    now,
                )
                .await?;
            }
        }

        if let Some(customer_id) = &sale.customer_id {
            if let Some(account) =
                LoyaltyRepository::get_account_tx(&mut tx, &sale.tenant_id, customer_id).await?
            {
                if plan.loyalty.restored > 0 {
                    LoyaltyRepository::apply_points_tx(
                        &mut tx,
                        &account.id,
                        plan.loyalty.restored,
                        LoyaltyEventKind::Adjust,
                        Some(sale_id),
                        now,
                    )
                    .await?;
                }
                if plan.loyalty.revoked > 0 {
                    // Revoke what the balance still covers; earned points
                    // already spent elsewhere cannot be clawed back.
                    let balance = LoyaltyRepository::balance_tx(&mut tx, &account.id).await?;
                    let revocable = plan.loyalty.revoked.min(balance);
                    if revocable > 0 {
                        LoyaltyRepository::apply_points_tx(
                            &mut tx,
                            &account.id,
                            -revocable,
                            LoyaltyEventKind::Adjust,
                            Some(sale_id),
                            now,
                        )
                        .await?;
                    }
                }
            }
        }

        if request.method == PaymentMethod::Cash && plan.total_cents > 0 {
            if let Some(session_id) = &sale.register_session_id {
                // Only an open drawer tracks the cash going back out. A
                // refund after the session closed is paid from the current
                // drawer; its expected figure is reconciled at count time,
                // outside this subsystem.
                let adjusted = SessionRepository::adjust_expected_cash_tx(
                    &mut tx,
                    session_id,
                    -plan.total_cents,
                )
                .await?;
                if !adjusted {
                    debug!(
                        session_id = %session_id,
                        "Originating session closed; refund cash not tracked against its drawer"
                    );
                }
            }
        }

        if plan.fully_refunded && !SaleRepository::mark_refunded_tx(&mut tx, sale_id, now).await? {
            drop(tx);
            let current = self.load_sale(sale_id).await?;
            return Err(invalid_state(&current, "refund").into());
        }

        tx.commit().await.map_err(DbError::from)?;

        self.db
            .audit()
            .log(
                &sale.tenant_id,
                &request.cashier_id,
                "sale.refunded",
                "sale",
                sale_id,
                Some(&format!(
                    "refund={} amount={} full={}",
                    refund.id, plan.total_cents, plan.fully_refunded
                )),
                now,
            )
            .await;

        info!(
            sale_id,
            refund_id = %refund.id,
            amount = plan.total_cents,
            fully_refunded = plan.fully_refunded,
            "Refund committed"
        );

        Ok(refund)
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    /// Manual stock adjustment (receiving, counts, shrinkage). Journaled
    /// like every other movement; cannot take stock negative.
    pub async fn adjust_inventory(
        &self,
        tenant_id: &str,
        location_id: &str,
        item: &ItemRef,
        delta: i64,
        reason: StockReason,
        actor_id: &str,
    ) -> ServiceResult<i64> {
        if delta == 0 {
            return Err(CoreError::invalid_input("adjustment delta cannot be zero").into());
        }

        let now = Utc::now();
        let outcome = self
            .db
            .inventory()
            .apply_delta(tenant_id, location_id, item, delta, reason, None, now)
            .await?;

        if let StockApply::Insufficient { available } = outcome {
            return Err(CoreError::InsufficientStock {
                item_id: item.id.clone(),
                available,
                requested: -delta,
            }
            .into());
        }

        self.db
            .audit()
            .log(
                tenant_id,
                actor_id,
                "inventory.adjusted",
                "stock",
                &item.id,
                Some(&format!("delta={delta}")),
                now,
            )
            .await;

        let quantity = self
            .db
            .inventory()
            .get_on_hand(tenant_id, location_id, item)
            .await?
            .map(|s| s.quantity)
            .unwrap_or(0);

        debug!(item_id = %item.id, delta, quantity, "Inventory adjusted");
        Ok(quantity)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// The stored receipt document for a finalized sale.
    pub async fn get_receipt(&self, sale_id: &str) -> ServiceResult<ReceiptDocument> {
        let stored = self
            .db
            .sales()
            .get_receipt(sale_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Receipt", sale_id))?;

        let receipt: ReceiptDocument = serde_json::from_str(&stored.document)
            .map_err(|e| DbError::corrupt("receipts", e.to_string()))?;
        Ok(receipt)
    }

    /// All refunds recorded against a sale.
    pub async fn list_refunds(&self, sale_id: &str) -> ServiceResult<Vec<Refund>> {
        Ok(self.db.refunds().list_for_sale(sale_id).await?)
    }

    async fn load_sale(&self, sale_id: &str) -> ServiceResult<Sale> {
        Ok(self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Sale", sale_id))?)
    }
}

struct ResolvedPromotions {
    coupon: Option<(Coupon, Discount)>,
    program: Option<meridian_core::LoyaltyProgram>,
}

fn invalid_state(sale: &Sale, operation: &'static str) -> CoreError {
    CoreError::InvalidState {
        sale_id: sale.id.clone(),
        status: sale.status.as_str().to_string(),
        operation,
    }
}

/// Materializes priced lines as sale item rows.
fn items_from_priced(
    sale_id: &str,
    priced: &PricedCart,
    now: chrono::DateTime<Utc>,
) -> Vec<SaleItem> {
    priced
        .lines
        .iter()
        .map(|line| SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            product_id: line.product_id.clone(),
            variant_id: line.variant_id.clone(),
            sku: line.sku.clone(),
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
            line_discount_cents: line.line_discount_cents,
            order_discount_cents: line.order_discount_cents,
            tax_cents: line.tax_cents,
            included_tax_cents: line.included_tax_cents,
            total_cents: line.total_cents,
            tax_ids: line.tax_ids.clone(),
            is_service: line.is_service,
            is_kitchen: line.is_kitchen,
            requires_id_check: line.requires_id_check,
            min_age: line.min_age,
            created_at: now,
            completed_at: None,
        })
        .collect()
}

// =============================================================================
// Integration Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use meridian_core::{
        CartLineInput, Coupon, DiscountKind, LoyaltyProgram, Product, Tax, DEFAULT_TENANT_ID,
    };

    const LOC: &str = "store-1";

    async fn service() -> PosService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        PosService::new(db, PosConfig::default())
    }

    fn product(id: &str, price: i64, tax_ids: Vec<String>) -> Product {
        let now = Utc::now();
        Product {
            id: id.into(),
            tenant_id: DEFAULT_TENANT_ID.into(),
            sku: format!("SKU-{id}"),
            name: format!("Product {id}"),
            price_cents: price,
            tax_ids,
            is_service: false,
            is_kitchen: false,
            requires_id_check: false,
            min_age: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Two taxed products with plenty of stock.
    async fn seed_catalog(svc: &PosService) {
        let catalog = svc.db().catalog();
        catalog
            .insert_tax(&Tax {
                id: "tax8".into(),
                tenant_id: DEFAULT_TENANT_ID.into(),
                name: "Sales Tax".into(),
                rate_bps: 800,
                inclusive: false,
                is_active: true,
            })
            .await
            .unwrap();
        catalog
            .insert_product(&product("p1", 1000, vec!["tax8".into()]))
            .await
            .unwrap();
        catalog
            .insert_product(&product("p2", 1500, vec!["tax8".into()]))
            .await
            .unwrap();

        let now = Utc::now();
        for id in ["p1", "p2"] {
            svc.db()
                .inventory()
                .apply_delta(
                    DEFAULT_TENANT_ID,
                    LOC,
                    &ItemRef::product(id),
                    100,
                    StockReason::Purchase,
                    None,
                    now,
                )
                .await
                .unwrap();
        }
    }

    fn line(product_id: &str, qty: i64) -> CartLineInput {
        CartLineInput {
            product_id: Some(product_id.into()),
            variant_id: None,
            quantity: qty,
            unit_price_cents: None,
            discount_cents: None,
            discount_id: None,
        }
    }

    fn draft_request(cart: CartInput) -> CreateDraftSale {
        CreateDraftSale {
            tenant_id: DEFAULT_TENANT_ID.into(),
            cashier_id: "cashier-1".into(),
            location_id: Some(LOC.into()),
            register_session_id: None,
            customer_id: None,
            channel: SaleChannel::Pos,
            notes: None,
            cart,
        }
    }

    fn cash(amount_cents: i64) -> TenderInput {
        TenderInput {
            method: PaymentMethod::Cash,
            amount_cents,
            reference: None,
        }
    }

    async fn on_hand(svc: &PosService, id: &str) -> i64 {
        svc.db()
            .inventory()
            .get_on_hand(DEFAULT_TENANT_ID, LOC, &ItemRef::product(id))
            .await
            .unwrap()
            .map(|s| s.quantity)
            .unwrap_or(0)
    }

    // -------------------------------------------------------------------------
    // Finalize
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_draft_to_finalize_happy_path() {
        let svc = service().await;
        seed_catalog(&svc).await;

        // 2x$10 + 1x$15, $3.50 order discount, 8% tax on the rest.
        let sale = svc
            .create_draft_sale(draft_request(CartInput {
                lines: vec![line("p1", 2), line("p2", 1)],
                order_discount_cents: Some(350),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(sale.status, SaleStatus::Draft);
        assert_eq!(sale.total_cents, 3402);
        // Drafts touch no stock.
        assert_eq!(on_hand(&svc, "p1").await, 100);

        let finalized = svc
            .finalize_sale(&sale.id, &[cash(4000)], None)
            .await
            .unwrap();
        assert_eq!(finalized.change_cents, 598);
        assert_eq!(finalized.sale.status, SaleStatus::Completed);
        assert!(finalized
            .sale
            .receipt_number
            .as_deref()
            .unwrap()
            .ends_with("-0001"));

        // Stock decremented, movements journaled against the sale.
        assert_eq!(on_hand(&svc, "p1").await, 98);
        assert_eq!(on_hand(&svc, "p2").await, 99);
        let ledger = svc
            .db()
            .inventory()
            .ledger_for_item(DEFAULT_TENANT_ID, LOC, &ItemRef::product("p1"), 10)
            .await
            .unwrap();
        assert_eq!(ledger[0].delta, -2);
        assert_eq!(ledger[0].correlation_id.as_deref(), Some(sale.id.as_str()));

        // The stored receipt is the one finalize returned.
        let stored = svc.get_receipt(&sale.id).await.unwrap();
        assert_eq!(stored, finalized.receipt);
        assert_eq!(stored.total_cents, 3402);
        assert_eq!(
            stored.total_cents,
            stored.subtotal_cents - stored.discount_cents + stored.tax_cents
                + stored.shipping_cents
        );
    }

    #[tokio::test]
    async fn test_finalize_requires_full_payment() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let sale = svc
            .create_draft_sale(draft_request(CartInput {
                lines: vec![line("p1", 1)],
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(sale.total_cents, 1080);

        let err = svc
            .finalize_sale(&sale.id, &[cash(1000)], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InsufficientPayment {
                total_cents: 1080,
                paid_cents: 1000
            })
        ));

        // Sale remains a settleable draft.
        let reloaded = svc.db().sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SaleStatus::Draft);
        assert_eq!(on_hand(&svc, "p1").await, 100);
    }

    #[tokio::test]
    async fn test_card_overpayment_is_rejected() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let sale = svc
            .create_draft_sale(draft_request(CartInput {
                lines: vec![line("p1", 1)],
                ..Default::default()
            }))
            .await
            .unwrap();

        let err = svc
            .finalize_sale(
                &sale.id,
                &[TenderInput {
                    method: PaymentMethod::Card,
                    amount_cents: 2000,
                    reference: Some("auth-1".into()),
                }],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_everything() {
        let svc = service().await;
        seed_catalog(&svc).await;

        // Drain p2 down to zero so the second line fails mid-transaction.
        svc.adjust_inventory(
            DEFAULT_TENANT_ID,
            LOC,
            &ItemRef::product("p2"),
            -100,
            StockReason::CountAdjustment,
            "manager-1",
        )
        .await
        .unwrap();

        let sale = svc
            .create_draft_sale(draft_request(CartInput {
                lines: vec![line("p1", 2), line("p2", 1)],
                ..Default::default()
            }))
            .await
            .unwrap();

        let err = svc
            .finalize_sale(&sale.id, &[cash(10_000)], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InsufficientStock { available: 0, requested: 1, .. })
        ));

        // The p1 decrement and the status flip were rolled back with it.
        assert_eq!(on_hand(&svc, "p1").await, 100);
        let reloaded = svc.db().sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SaleStatus::Draft);
        assert!(svc.db().sales().get_payments(&sale.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_finalizes_sell_exactly_the_stock() {
        let svc = service().await;
        seed_catalog(&svc).await;

        // Only 3 units of p1 on the shelf.
        svc.adjust_inventory(
            DEFAULT_TENANT_ID,
            LOC,
            &ItemRef::product("p1"),
            -97,
            StockReason::CountAdjustment,
            "manager-1",
        )
        .await
        .unwrap();
        assert_eq!(on_hand(&svc, "p1").await, 3);

        let mut sale_ids = Vec::new();
        for _ in 0..5 {
            let sale = svc
                .create_draft_sale(draft_request(CartInput {
                    lines: vec![line("p1", 1)],
                    ..Default::default()
                }))
                .await
                .unwrap();
            sale_ids.push(sale.id);
        }

        let mut handles = Vec::new();
        for sale_id in sale_ids {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.finalize_sale(&sale_id, &[cash(2000)], None).await
            }));
        }

        let mut completed = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => completed += 1,
                Err(ServiceError::Core(CoreError::InsufficientStock { .. })) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(completed, 3);
        assert_eq!(rejected, 2);
        assert_eq!(on_hand(&svc, "p1").await, 0);
    }

    #[tokio::test]
    async fn test_double_finalize_is_rejected() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let sale = svc
            .create_draft_sale(draft_request(CartInput {
                lines: vec![line("p1", 1)],
                ..Default::default()
            }))
            .await
            .unwrap();

        svc.finalize_sale(&sale.id, &[cash(2000)], None).await.unwrap();
        let err = svc
            .finalize_sale(&sale.id, &[cash(2000)], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InvalidState { operation: "finalize", .. })
        ));

        // Paid exactly once.
        assert_eq!(on_hand(&svc, "p1").await, 99);
        assert_eq!(svc.db().sales().get_payments(&sale.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cash_sale_updates_drawer() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let session = svc
            .db()
            .sessions()
            .open_session(DEFAULT_TENANT_ID, "R1", 5000, Utc::now())
            .await
            .unwrap();

        let mut request = draft_request(CartInput {
            lines: vec![line("p1", 1)],
            ..Default::default()
        });
        request.register_session_id = Some(session.id.clone());
        let sale = svc.create_draft_sale(request).await.unwrap();

        // $10.80 total paid with $20 cash: drawer gains total, not tender.
        let finalized = svc.finalize_sale(&sale.id, &[cash(2000)], None).await.unwrap();
        assert_eq!(finalized.change_cents, 920);

        let session = svc.db().sessions().get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(session.expected_cash_cents, 5000 + 1080);

        // Receipt numbers carry the register label.
        assert!(finalized.receipt.receipt_number.contains("-R1-"));
    }

    #[tokio::test]
    async fn test_finalize_rejects_closed_session() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let session = svc
            .db()
            .sessions()
            .open_session(DEFAULT_TENANT_ID, "R1", 5000, Utc::now())
            .await
            .unwrap();

        let mut request = draft_request(CartInput {
            lines: vec![line("p1", 1)],
            ..Default::default()
        });
        request.register_session_id = Some(session.id.clone());
        let sale = svc.create_draft_sale(request).await.unwrap();

        svc.db()
            .sessions()
            .close_session(&session.id, Utc::now())
            .await
            .unwrap();

        let err = svc
            .finalize_sale(&sale.id, &[cash(2000)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::InvalidInput { .. })));

        // Nothing settled: drawer, stock and sale are all untouched.
        let closed = svc.db().sessions().get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(closed.expected_cash_cents, 5000);
        assert_eq!(on_hand(&svc, "p1").await, 100);
        let reloaded = svc.db().sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SaleStatus::Draft);
    }

    #[tokio::test]
    async fn test_draft_cannot_reference_unknown_session() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let mut request = draft_request(CartInput {
            lines: vec![line("p1", 1)],
            ..Default::default()
        });
        request.register_session_id = Some("no-such-session".into());

        let err = svc.create_draft_sale(request).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Db(crate::DbError::ForeignKeyViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_refund_after_session_close_leaves_drawer_alone() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let session = svc
            .db()
            .sessions()
            .open_session(DEFAULT_TENANT_ID, "R1", 5000, Utc::now())
            .await
            .unwrap();

        let mut request = draft_request(CartInput {
            lines: vec![line("p1", 1)],
            ..Default::default()
        });
        request.register_session_id = Some(session.id.clone());
        let sale = svc.create_draft_sale(request).await.unwrap();
        svc.finalize_sale(&sale.id, &[cash(1080)], None).await.unwrap();

        svc.db()
            .sessions()
            .close_session(&session.id, Utc::now())
            .await
            .unwrap();

        let item_id = svc.db().sales().get_items(&sale.id).await.unwrap()[0].id.clone();
        let refund = svc
            .refund_sale(
                &sale.id,
                &refund_request(vec![RefundLineRequest {
                    sale_item_id: item_id,
                    quantity: 1,
                    restock: true,
                }]),
            )
            .await
            .unwrap();
        assert_eq!(refund.total_cents, 1080);

        // The refund stands, but a closed drawer's expected cash is final.
        let closed = svc.db().sessions().get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(closed.expected_cash_cents, 5000 + 1080);
        let reloaded = svc.db().sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SaleStatus::Refunded);
    }

    // -------------------------------------------------------------------------
    // Coupons
    // -------------------------------------------------------------------------

    async fn seed_coupon(svc: &PosService, code: &str, limit: Option<i64>) {
        let catalog = svc.db().catalog();
        catalog
            .insert_discount(&meridian_core::Discount {
                id: "d10".into(),
                tenant_id: DEFAULT_TENANT_ID.into(),
                name: "10% off".into(),
                kind: DiscountKind::Percent,
                value: 1000,
                is_active: true,
            })
            .await
            .unwrap();
        catalog
            .insert_coupon(&Coupon {
                id: format!("coupon-{code}"),
                tenant_id: DEFAULT_TENANT_ID.into(),
                code: code.into(),
                discount_id: "d10".into(),
                usage_limit: limit,
                usage_count: 0,
                starts_at: None,
                ends_at: None,
                is_active: true,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_coupon_applies_and_claims_usage() {
        let svc = service().await;
        seed_catalog(&svc).await;
        seed_coupon(&svc, "TEN", Some(5)).await;

        let sale = svc
            .create_draft_sale(draft_request(CartInput {
                lines: vec![line("p1", 1)],
                coupon_code: Some("TEN".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        // 1000 - 100 coupon = 900, +8% = 972
        assert_eq!(sale.total_cents, 972);

        svc.finalize_sale(&sale.id, &[cash(1000)], None).await.unwrap();

        let coupon = svc
            .db()
            .catalog()
            .get_coupon_by_code(DEFAULT_TENANT_ID, "TEN")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(coupon.usage_count, 1);
    }

    #[tokio::test]
    async fn test_last_coupon_use_has_one_winner() {
        let svc = service().await;
        seed_catalog(&svc).await;
        seed_coupon(&svc, "ONCE", Some(1)).await;

        let cart = CartInput {
            lines: vec![line("p1", 1)],
            coupon_code: Some("ONCE".into()),
            ..Default::default()
        };
        let first = svc.create_draft_sale(draft_request(cart.clone())).await.unwrap();
        let second = svc.create_draft_sale(draft_request(cart)).await.unwrap();

        svc.finalize_sale(&first.id, &[cash(1000)], None).await.unwrap();
        let err = svc
            .finalize_sale(&second.id, &[cash(1000)], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::CouponInvalid {
                reason: meridian_core::CouponRejection::LimitReached,
                ..
            })
        ));

        // The losing finalize rolled back completely: still a draft, no
        // stock taken beyond the winner's unit.
        let reloaded = svc.db().sales().get_by_id(&second.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SaleStatus::Draft);
        assert_eq!(on_hand(&svc, "p1").await, 99);
    }

    #[tokio::test]
    async fn test_unknown_coupon_rejected_at_pricing() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let err = svc
            .create_draft_sale(draft_request(CartInput {
                lines: vec![line("p1", 1)],
                coupon_code: Some("NOPE".into()),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::CouponInvalid {
                reason: meridian_core::CouponRejection::NotFound,
                ..
            })
        ));
    }

    // -------------------------------------------------------------------------
    // Loyalty
    // -------------------------------------------------------------------------

    async fn seed_loyalty(svc: &PosService) {
        svc.db()
            .loyalty()
            .insert_program(&LoyaltyProgram {
                id: "lp1".into(),
                tenant_id: DEFAULT_TENANT_ID.into(),
                redeem_rate_cents_per_point: 5,
                points_per_currency_unit: 1,
                is_active: true,
            })
            .await
            .unwrap();
    }

    async fn give_points(svc: &PosService, customer_id: &str, points: i64) -> String {
        let now = Utc::now();
        let account = svc
            .db()
            .loyalty()
            .get_or_create_account(DEFAULT_TENANT_ID, customer_id, now)
            .await
            .unwrap();
        let mut tx = svc.db().pool().begin().await.unwrap();
        LoyaltyRepository::apply_points_tx(
            &mut tx,
            &account.id,
            points,
            LoyaltyEventKind::Adjust,
            None,
            now,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        account.id
    }

    #[tokio::test]
    async fn test_redeem_and_earn_points() {
        let svc = service().await;
        seed_catalog(&svc).await;
        seed_loyalty(&svc).await;
        let account_id = give_points(&svc, "cust-1", 200).await;

        let mut request = draft_request(CartInput {
            lines: vec![line("p2", 2)], // 3000
            points_to_redeem: Some(100), // -500
            ..Default::default()
        });
        request.customer_id = Some("cust-1".into());
        let sale = svc.create_draft_sale(request).await.unwrap();
        assert_eq!(sale.total_cents, 2700); // 2500 + 8%

        let finalized = svc.finalize_sale(&sale.id, &[cash(2700)], None).await.unwrap();
        // Earned on the discounted eligible amount: floor($25.00) = 25.
        assert_eq!(finalized.points_earned, 25);

        let account = svc
            .db()
            .loyalty()
            .get_account(DEFAULT_TENANT_ID, "cust-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.balance, 200 - 100 + 25);

        let ledger = svc.db().loyalty().get_ledger(&account_id, 10).await.unwrap();
        assert_eq!(ledger.len(), 3); // adjust, redeem, earn
    }

    #[tokio::test]
    async fn test_redeeming_more_than_balance_fails() {
        let svc = service().await;
        seed_catalog(&svc).await;
        seed_loyalty(&svc).await;
        give_points(&svc, "cust-1", 10).await;

        let mut request = draft_request(CartInput {
            lines: vec![line("p2", 2)],
            points_to_redeem: Some(100),
            ..Default::default()
        });
        request.customer_id = Some("cust-1".into());
        let sale = svc.create_draft_sale(request).await.unwrap();

        let err = svc
            .finalize_sale(&sale.id, &[cash(5000)], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InsufficientPoints { requested: 100, available: 10 })
        ));
        assert_eq!(on_hand(&svc, "p2").await, 100);
    }

    // -------------------------------------------------------------------------
    // Age Verification
    // -------------------------------------------------------------------------

    async fn seed_restricted(svc: &PosService) {
        let mut beer = product("beer", 899, vec![]);
        beer.requires_id_check = true;
        beer.min_age = Some(21);
        svc.db().catalog().insert_product(&beer).await.unwrap();
        svc.db()
            .inventory()
            .apply_delta(
                DEFAULT_TENANT_ID,
                LOC,
                &ItemRef::product("beer"),
                50,
                StockReason::Purchase,
                None,
                Utc::now(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_age_restricted_sale_requires_valid_id() {
        let svc = service().await;
        seed_catalog(&svc).await;
        seed_restricted(&svc).await;

        let cart = CartInput {
            lines: vec![line("beer", 1)],
            ..Default::default()
        };

        // No ID presented.
        let sale = svc.create_draft_sale(draft_request(cart.clone())).await.unwrap();
        let err = svc.finalize_sale(&sale.id, &[cash(1000)], None).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::AgeVerificationFailed { minimum_age: 21 })
        ));

        // Under age.
        let under = IdVerification {
            birth_date: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
        };
        let err = svc
            .finalize_sale(&sale.id, &[cash(1000)], Some(under))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::AgeVerificationFailed { minimum_age: 21 })
        ));

        // Of age.
        let of_age = IdVerification {
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        };
        let finalized = svc
            .finalize_sale(&sale.id, &[cash(1000)], Some(of_age))
            .await
            .unwrap();
        assert!(finalized.sale.age_verified);
    }

    // -------------------------------------------------------------------------
    // Refunds
    // -------------------------------------------------------------------------

    async fn completed_sale(svc: &PosService, lines: Vec<CartLineInput>) -> FinalizedSale {
        let sale = svc
            .create_draft_sale(draft_request(CartInput {
                lines,
                ..Default::default()
            }))
            .await
            .unwrap();
        svc.finalize_sale(&sale.id, &[cash(100_000)], None).await.unwrap()
    }

    fn refund_request(lines: Vec<RefundLineRequest>) -> RefundRequest {
        RefundRequest {
            cashier_id: "cashier-1".into(),
            reason: Some("customer return".into()),
            method: PaymentMethod::Cash,
            lines,
        }
    }

    #[tokio::test]
    async fn test_partial_then_full_refund() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let finalized = completed_sale(&svc, vec![line("p1", 3)]).await;
        let sale_id = finalized.sale.id.clone();
        let items = svc.db().sales().get_items(&sale_id).await.unwrap();
        let item_id = items[0].id.clone();
        assert_eq!(items[0].total_cents, 3240); // 3000 + 8%
        assert_eq!(on_hand(&svc, "p1").await, 97);

        // Refund one unit with restock.
        let refund = svc
            .refund_sale(
                &sale_id,
                &refund_request(vec![RefundLineRequest {
                    sale_item_id: item_id.clone(),
                    quantity: 1,
                    restock: true,
                }]),
            )
            .await
            .unwrap();
        assert_eq!(refund.total_cents, 1080);
        assert_eq!(on_hand(&svc, "p1").await, 98);
        let reloaded = svc.db().sales().get_by_id(&sale_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SaleStatus::Completed);

        // Refund the remaining two: exactly the remaining cents, and the
        // sale flips to refunded.
        let refund = svc
            .refund_sale(
                &sale_id,
                &refund_request(vec![RefundLineRequest {
                    sale_item_id: item_id.clone(),
                    quantity: 2,
                    restock: true,
                }]),
            )
            .await
            .unwrap();
        assert_eq!(refund.total_cents, 3240 - 1080);
        assert_eq!(on_hand(&svc, "p1").await, 100);
        let reloaded = svc.db().sales().get_by_id(&sale_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SaleStatus::Refunded);

        // Nothing left to refund: the line cap rejects, not the status.
        let err = svc
            .refund_sale(
                &sale_id,
                &refund_request(vec![RefundLineRequest {
                    sale_item_id: item_id,
                    quantity: 1,
                    restock: false,
                }]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::OverRefund { remaining: 0, requested: 1, .. })
        ));

        assert_eq!(svc.list_refunds(&sale_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_over_refund_is_rejected_across_refunds() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let finalized = completed_sale(&svc, vec![line("p1", 2)]).await;
        let sale_id = finalized.sale.id.clone();
        let item_id = svc.db().sales().get_items(&sale_id).await.unwrap()[0].id.clone();

        svc.refund_sale(
            &sale_id,
            &refund_request(vec![RefundLineRequest {
                sale_item_id: item_id.clone(),
                quantity: 1,
                restock: false,
            }]),
        )
        .await
        .unwrap();

        let err = svc
            .refund_sale(
                &sale_id,
                &refund_request(vec![RefundLineRequest {
                    sale_item_id: item_id,
                    quantity: 2,
                    restock: false,
                }]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::OverRefund { remaining: 1, requested: 2, .. })
        ));
        // No restock happened for the rejected refund.
        assert_eq!(on_hand(&svc, "p1").await, 98);
    }

    #[tokio::test]
    async fn test_refund_reverses_loyalty() {
        let svc = service().await;
        seed_catalog(&svc).await;
        seed_loyalty(&svc).await;
        give_points(&svc, "cust-1", 0).await;

        let mut request = draft_request(CartInput {
            lines: vec![line("p1", 2)], // 2000 eligible, earns 20
            ..Default::default()
        });
        request.customer_id = Some("cust-1".into());
        let sale = svc.create_draft_sale(request).await.unwrap();
        let finalized = svc.finalize_sale(&sale.id, &[cash(2160)], None).await.unwrap();
        assert_eq!(finalized.points_earned, 20);

        let item_id = svc.db().sales().get_items(&sale.id).await.unwrap()[0].id.clone();
        let refund = svc
            .refund_sale(
                &sale.id,
                &refund_request(vec![RefundLineRequest {
                    sale_item_id: item_id,
                    quantity: 1,
                    restock: true,
                }]),
            )
            .await
            .unwrap();
        // Half the sale refunded: half the earned points revoked.
        assert_eq!(refund.points_revoked, 10);
        assert_eq!(refund.points_restored, 0);

        let account = svc
            .db()
            .loyalty()
            .get_account(DEFAULT_TENANT_ID, "cust-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.balance, 10);
    }

    // -------------------------------------------------------------------------
    // Draft Updates & Void
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_update_draft_reprices_deterministically() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let cart = CartInput {
            lines: vec![line("p1", 2), line("p2", 1)],
            order_discount_cents: Some(350),
            ..Default::default()
        };
        let sale = svc.create_draft_sale(draft_request(cart.clone())).await.unwrap();

        // Same cart input, same cents.
        let updated = svc.update_draft_sale(&sale.id, &cart).await.unwrap();
        assert_eq!(updated.total_cents, sale.total_cents);
        assert_eq!(updated.discount_cents, sale.discount_cents);

        // A different cart replaces the lines.
        let updated = svc
            .update_draft_sale(
                &sale.id,
                &CartInput {
                    lines: vec![line("p1", 1)],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.total_cents, 1080);
        assert_eq!(svc.db().sales().get_items(&sale.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_completed_sale_cannot_be_updated_or_voided() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let finalized = completed_sale(&svc, vec![line("p1", 1)]).await;
        let sale_id = finalized.sale.id;

        let err = svc
            .update_draft_sale(
                &sale_id,
                &CartInput {
                    lines: vec![line("p1", 2)],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InvalidState { operation: "update", .. })
        ));

        let err = svc.void_draft_sale(&sale_id, "cashier-1").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InvalidState { operation: "void", .. })
        ));
    }

    #[tokio::test]
    async fn test_void_draft_has_no_side_effects() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let sale = svc
            .create_draft_sale(draft_request(CartInput {
                lines: vec![line("p1", 5)],
                ..Default::default()
            }))
            .await
            .unwrap();

        svc.void_draft_sale(&sale.id, "cashier-1").await.unwrap();
        assert_eq!(on_hand(&svc, "p1").await, 100);

        let reloaded = svc.db().sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SaleStatus::Voided);

        // Voided drafts cannot be finalized.
        let err = svc.finalize_sale(&sale.id, &[cash(10_000)], None).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InvalidState { operation: "finalize", .. })
        ));
    }

    // -------------------------------------------------------------------------
    // Inventory Adjustment
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_adjust_inventory_guards_and_audits() {
        let svc = service().await;
        seed_catalog(&svc).await;

        let quantity = svc
            .adjust_inventory(
                DEFAULT_TENANT_ID,
                LOC,
                &ItemRef::product("p1"),
                25,
                StockReason::Purchase,
                "manager-1",
            )
            .await
            .unwrap();
        assert_eq!(quantity, 125);

        let err = svc
            .adjust_inventory(
                DEFAULT_TENANT_ID,
                LOC,
                &ItemRef::product("p1"),
                -999,
                StockReason::CountAdjustment,
                "manager-1",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InsufficientStock { available: 125, .. })
        ));

        let trail = svc
            .db()
            .audit()
            .for_entity(DEFAULT_TENANT_ID, "stock", "p1", 10)
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "inventory.adjusted");
    }
}
