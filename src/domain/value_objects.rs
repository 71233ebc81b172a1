use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Neg, Sub};
use std::str::FromStr;

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Waiting for the customer to scan
    Pending,
    /// Settled by the processor
    Success,
    /// Denied, cancelled or expired at the processor
    Failed,
    /// Passed its local expiry without settling
    Expired,
    /// Cancelled by the cashier
    Cancelled,
}

impl PaymentStatus {
    /// Statuses that occupy the single active-payment slot of a transaction.
    pub fn is_active(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "expired" => Ok(PaymentStatus::Expired),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// Payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Fixed-amount QRIS code
    Qris,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Qris => write!(f, "qris"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qris" => Ok(PaymentMethod::Qris),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// Transaction (cart) status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Cancelled,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "paid" => Ok(TransactionStatus::Paid),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            "expired" => Ok(TransactionStatus::Expired),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// Monetary amount in the currency's smallest unit (whole rupiah for IDR),
/// kept as an integer so line items always sum exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const fn from_minor(amount: i64) -> Self {
        Self(amount)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Applies a rate in basis points, rounding half up.
    pub fn apply_rate(&self, rate: TaxRate) -> Money {
        let scaled = self.0 as i128 * rate.bps() as i128;
        Money(((scaled + 5_000) / 10_000) as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Mul<i64> for Money {
    type Output = Money;

    fn mul(self, rhs: i64) -> Money {
        Money(self.0 * rhs)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IDR {}", self.0)
    }
}

/// Tax rate in basis points (1000 = 10%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(u32);

impl TaxRate {
    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn bps(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_arithmetic() {
        let unit = Money::from_minor(10_000);
        let total = unit * 2 + Money::from_minor(5_000) - Money::from_minor(500);

        assert_eq!(total.minor(), 24_500);
        assert_eq!(format!("{}", total), "IDR 24500");
    }

    #[test]
    fn test_money_sum_handles_negative_entries() {
        let entries = [
            Money::from_minor(25_000),
            Money::from_minor(2_500),
            -Money::from_minor(1_000),
        ];

        assert_eq!(entries.into_iter().sum::<Money>(), Money::from_minor(26_500));
    }

    #[test]
    fn test_apply_rate_rounds_half_up() {
        // 11% of 12_345 = 1_357.95
        assert_eq!(Money::from_minor(12_345).apply_rate(TaxRate::from_bps(1_100)).minor(), 1_358);
        // 10% of 25_000
        assert_eq!(Money::from_minor(25_000).apply_rate(TaxRate::from_bps(1_000)).minor(), 2_500);
        assert!(Money::from_minor(25_000).apply_rate(TaxRate::zero()).is_zero());
    }

    #[test]
    fn test_payment_status_classes() {
        assert!(PaymentStatus::Pending.is_active());
        assert!(PaymentStatus::Success.is_active());
        assert!(!PaymentStatus::Expired.is_active());
        assert!(!PaymentStatus::Cancelled.is_active());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("expired".parse::<PaymentStatus>(), Ok(PaymentStatus::Expired));
        assert_eq!("paid".parse::<TransactionStatus>(), Ok(TransactionStatus::Paid));
        assert!("settlement".parse::<PaymentStatus>().is_err());
    }
}
