use crate::domain::payment::ContentType;
use crate::error::{ClassroomError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Fixed,
    Percentage,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Fixed => "fixed",
            DiscountType::Percentage => "percentage",
        }
    }
}

impl FromStr for DiscountType {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed" => Ok(DiscountType::Fixed),
            "percentage" => Ok(DiscountType::Percentage),
            other => Err(ClassroomError::invalid("discount_type", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CouponType {
    #[default]
    Public,
    Private,
}

impl CouponType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponType::Public => "public",
            CouponType::Private => "private",
        }
    }
}

impl FromStr for CouponType {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(CouponType::Public),
            "private" => Ok(CouponType::Private),
            other => Err(ClassroomError::invalid("coupon_type", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub lifetime: bool,
    pub min_order_value: Decimal,
    pub max_uses: Option<i64>,
    pub usage_per_student: Option<i64>,
    pub is_visible: bool,
    pub is_expired: bool,
    pub status: bool,
    pub coupon_type: CouponType,
    pub students: Vec<i64>,
    pub courses: Vec<i64>,
    pub is_all_courses: bool,
    pub total_applied: i64,
    pub created_by: Option<i64>,
    pub created: DateTime<Utc>,
}

/// Everything a redemption check needs to know about the purchase.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub user_id: i64,
    pub content_type: ContentType,
    pub content_id: i64,
    pub original_price: Decimal,
    /// Non-failed transactions this user already made with the coupon
    pub prior_uses_by_user: i64,
    pub now: DateTime<Utc>,
}

impl Coupon {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if !self.status || self.is_expired {
            return false;
        }
        if let Some(max) = self.max_uses {
            if max > 0 && self.total_applied >= max {
                return false;
            }
        }
        if now < self.start_at {
            return false;
        }
        if !self.lifetime {
            if let Some(end) = self.end_at {
                if now > end {
                    return false;
                }
            }
        }
        true
    }

    pub fn usage_limit_reached(&self) -> bool {
        matches!(self.max_uses, Some(max) if max > 0 && self.total_applied >= max)
    }

    /// Run the redemption rules in order; the first failing rule decides the message.
    pub fn check_redeemable(&self, r: &Redemption) -> Result<()> {
        const FIELD: &str = "coupon_code";

        if !self.status || !self.is_visible {
            return Err(ClassroomError::invalid(FIELD, "Invalid coupon code."));
        }
        if r.now < self.start_at {
            return Err(ClassroomError::invalid(FIELD, "Coupon is not yet valid."));
        }
        let ended = !self.lifetime && self.end_at.is_some_and(|end| r.now > end);
        if self.is_expired || ended {
            return Err(ClassroomError::invalid(FIELD, "Coupon has expired."));
        }
        if self.usage_limit_reached() {
            return Err(ClassroomError::invalid(FIELD, "Coupon usage limit has been reached."));
        }
        if let Some(per_student) = self.usage_per_student {
            if per_student > 0 && r.prior_uses_by_user >= per_student {
                return Err(ClassroomError::invalid(
                    FIELD,
                    "You have reached the maximum usage limit for this coupon.",
                ));
            }
        }
        if self.coupon_type == CouponType::Private && !self.students.contains(&r.user_id) {
            return Err(ClassroomError::invalid(FIELD, "This coupon is not applicable to this user."));
        }
        if !self.covers(r.content_type, r.content_id) {
            return Err(ClassroomError::invalid(
                FIELD,
                "This coupon is not applicable to the selected course.",
            ));
        }
        if r.original_price < self.min_order_value {
            return Err(ClassroomError::invalid(
                FIELD,
                "The original price does not meet the minimum order value requirement.",
            ));
        }
        Ok(())
    }

    /// Coupons only ever apply to courses.
    pub fn covers(&self, content_type: ContentType, content_id: i64) -> bool {
        content_type == ContentType::Course && (self.is_all_courses || self.courses.contains(&content_id))
    }

    /// Discount amount for `price`, never more than the price itself.
    pub fn discount_for(&self, price: Decimal) -> Decimal {
        let raw = match self.discount_type {
            DiscountType::Fixed => self.discount_value,
            DiscountType::Percentage => {
                let pct = price * self.discount_value / Decimal::ONE_HUNDRED;
                match self.max_discount_amount {
                    Some(cap) if cap > Decimal::ZERO => pct.min(cap),
                    _ => pct,
                }
            }
        };
        raw.max(Decimal::ZERO).min(price)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouponInput {
    pub name: String,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lifetime: bool,
    #[serde(default)]
    pub min_order_value: Decimal,
    pub max_uses: Option<i64>,
    pub usage_per_student: Option<i64>,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default = "default_true")]
    pub status: bool,
    #[serde(default)]
    pub coupon_type: CouponType,
    #[serde(default)]
    pub students: Vec<i64>,
    #[serde(default)]
    pub courses: Vec<i64>,
    #[serde(default)]
    pub is_all_courses: bool,
}

fn default_true() -> bool {
    true
}

impl CouponInput {
    /// Validate and normalize; a lifetime coupon never carries an end date.
    pub fn validated(mut self) -> Result<Self> {
        self.code = self.code.trim().to_string();
        if self.name.trim().is_empty() {
            return Err(ClassroomError::invalid("name", "This field may not be blank."));
        }
        if self.code.is_empty() {
            return Err(ClassroomError::invalid("code", "This field may not be blank."));
        }
        if self.code.len() > 50 {
            return Err(ClassroomError::invalid("code", "Ensure this field has no more than 50 characters."));
        }
        if self.discount_value <= Decimal::ZERO {
            return Err(ClassroomError::invalid("discount_value", "Ensure this value is greater than 0."));
        }
        if self.discount_type == DiscountType::Percentage && self.discount_value > Decimal::ONE_HUNDRED {
            return Err(ClassroomError::invalid(
                "discount_value",
                "Percentage discount cannot exceed 100.",
            ));
        }
        if self.min_order_value.is_sign_negative() {
            return Err(ClassroomError::invalid(
                "min_order_value",
                "Ensure this value is greater than or equal to 0.",
            ));
        }
        for (field, value) in [("max_uses", self.max_uses), ("usage_per_student", self.usage_per_student)] {
            if value.is_some_and(|v| v < 0) {
                return Err(ClassroomError::invalid(field, "Ensure this value is greater than or equal to 0."));
            }
        }
        if self.lifetime {
            self.end_at = None;
        } else if let Some(end) = self.end_at {
            if end < self.start_at {
                return Err(ClassroomError::invalid("end_at", "End date must be after the start date."));
            }
        }
        Ok(self)
    }
}
