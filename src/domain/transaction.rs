use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{Money, TaxRate, TransactionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog snapshot of a product at the moment it is added to a cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub stock: i32,
    pub is_active: bool,
}

impl Product {
    pub fn is_available(&self) -> bool {
        self.is_active && self.stock > 0
    }

    pub fn can_fulfill(&self, quantity: i32) -> bool {
        self.stock >= quantity
    }
}

/// Owner of a transaction, forwarded to the processor as customer details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Cart line; the unit price is frozen when the item is added
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i32,
    pub line_total: Money,
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    fn new(product: &Product, quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price: product.price,
            quantity,
            line_total: product.price * i64::from(quantity),
            created_at: Utc::now(),
        }
    }

    fn set_quantity(&mut self, quantity: i32) {
        self.quantity = quantity;
        self.line_total = self.unit_price * i64::from(quantity);
    }
}

/// Cart checkpoint that a QR payment is generated for.
///
/// `total_amount = subtotal - discount + tax_amount`, where the tax is the
/// stored rate applied to `subtotal - discount`. Items, discount and tax can
/// only change while the transaction is pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub items: Vec<LineItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax_rate: TaxRate,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(owner_id: Uuid, notes: Option<String>) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            owner_id,
            items: Vec::new(),
            subtotal: Money::zero(),
            discount: Money::zero(),
            tax_rate: TaxRate::zero(),
            tax_amount: Money::zero(),
            total_amount: Money::zero(),
            status: TransactionStatus::Pending,
            notes: notes.filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Adds a product to the cart, merging with an existing line for the same product.
    pub fn add_item(&mut self, product: &Product, quantity: i32) -> DomainResult<()> {
        self.ensure_pending()?;

        if quantity <= 0 {
            return Err(DomainError::ValidationError(
                "Quantity must be greater than 0".to_string(),
            ));
        }

        if !product.is_available() {
            return Err(DomainError::ValidationError(format!(
                "Product {} is not available",
                product.name
            )));
        }

        let existing = self.items.iter().position(|i| i.product_id == product.id);
        let requested = existing
            .map(|idx| self.items[idx].quantity)
            .unwrap_or(0)
            + quantity;

        if !product.can_fulfill(requested) {
            return Err(DomainError::ValidationError(format!(
                "Insufficient stock for {}",
                product.name
            )));
        }

        match existing {
            Some(idx) => self.items[idx].set_quantity(requested),
            None => self.items.push(LineItem::new(product, quantity)),
        }

        self.recalculate();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> DomainResult<()> {
        self.ensure_pending()?;

        let idx = self.item_index(product_id)?;
        self.items.remove(idx);

        self.recalculate();
        Ok(())
    }

    /// Sets the quantity of an existing line; zero removes it.
    pub fn update_item_quantity(&mut self, product: &Product, quantity: i32) -> DomainResult<()> {
        self.ensure_pending()?;

        if quantity < 0 {
            return Err(DomainError::ValidationError(
                "Quantity cannot be negative".to_string(),
            ));
        }

        let idx = self.item_index(product.id)?;

        if quantity == 0 {
            self.items.remove(idx);
        } else {
            if !product.can_fulfill(quantity) {
                return Err(DomainError::ValidationError(format!(
                    "Insufficient stock for {}",
                    product.name
                )));
            }
            self.items[idx].set_quantity(quantity);
        }

        self.recalculate();
        Ok(())
    }

    pub fn apply_discount(&mut self, discount: Money) -> DomainResult<()> {
        self.ensure_pending()?;

        if discount.is_negative() {
            return Err(DomainError::InvalidAmount(
                "Discount cannot be negative".to_string(),
            ));
        }

        if discount > self.subtotal {
            return Err(DomainError::InvalidAmount(
                "Discount cannot exceed subtotal".to_string(),
            ));
        }

        self.discount = discount;
        self.recalculate();
        Ok(())
    }

    pub fn apply_tax(&mut self, rate: TaxRate) -> DomainResult<()> {
        self.ensure_pending()?;

        self.tax_rate = rate;
        self.recalculate();
        Ok(())
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        self.transition(TransactionStatus::Cancelled)
    }

    pub fn mark_as_paid(&mut self) -> DomainResult<()> {
        self.transition(TransactionStatus::Paid)
    }

    /// Closes an abandoned cart
    pub fn mark_as_expired(&mut self) -> DomainResult<()> {
        self.transition(TransactionStatus::Expired)
    }

    pub fn mark_deleted(&mut self) {
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    fn transition(&mut self, next: TransactionStatus) -> DomainResult<()> {
        self.ensure_pending()?;

        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if !self.is_pending() {
            return Err(DomainError::invalid_state("pending", self.status));
        }
        Ok(())
    }

    fn item_index(&self, product_id: Uuid) -> DomainResult<usize> {
        self.items
            .iter()
            .position(|i| i.product_id == product_id)
            .ok_or_else(|| {
                DomainError::ValidationError(format!("Product {} is not in the cart", product_id))
            })
    }

    fn recalculate(&mut self) {
        self.subtotal = self.items.iter().map(|i| i.line_total).sum();
        // a discount applied to a larger cart cannot exceed what is left
        self.discount = self.discount.min(self.subtotal);
        self.tax_amount = (self.subtotal - self.discount).apply_rate(self.tax_rate);
        self.total_amount = self.subtotal - self.discount + self.tax_amount;
        self.updated_at = Utc::now();
    }
}
