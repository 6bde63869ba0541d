use crate::domain::pricing::FeeBreakdown;
use crate::error::{ClassroomError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Course,
    Batch,
    TestSeries,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Course => "course",
            ContentType::Batch => "batch",
            ContentType::TestSeries => "test_series",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "course" => Ok(ContentType::Course),
            "batch" => Ok(ContentType::Batch),
            "test_series" => Ok(ContentType::TestSeries),
            other => Err(ClassroomError::invalid("content_type", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ClassroomError::Database {
                message: format!("unknown payment status '{other}'"),
            }),
        }
    }
}

/// What is being bought. Batches are bought one installment at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseTarget {
    Course(i64),
    Batch { batch_id: i64, installment: u32 },
    TestSeries(i64),
}

impl PurchaseTarget {
    pub fn content_type(&self) -> ContentType {
        match self {
            PurchaseTarget::Course(_) => ContentType::Course,
            PurchaseTarget::Batch { .. } => ContentType::Batch,
            PurchaseTarget::TestSeries(_) => ContentType::TestSeries,
        }
    }

    pub fn content_id(&self) -> i64 {
        match *self {
            PurchaseTarget::Course(id) | PurchaseTarget::TestSeries(id) => id,
            PurchaseTarget::Batch { batch_id, .. } => batch_id,
        }
    }

    pub fn installment(&self) -> Option<u32> {
        match *self {
            PurchaseTarget::Batch { installment, .. } => Some(installment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub content_type: ContentType,
    pub content_id: i64,
    pub installment_number: Option<u32>,
    pub amount: Decimal,
    /// Gateway order id
    pub transaction_id: String,
    pub payment_id: Option<String>,
    pub payment_status: PaymentStatus,
    #[serde(flatten)]
    pub breakdown: FeeBreakdown,
    pub coupon_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn target(&self) -> PurchaseTarget {
        match self.content_type {
            ContentType::Course => PurchaseTarget::Course(self.content_id),
            ContentType::TestSeries => PurchaseTarget::TestSeries(self.content_id),
            ContentType::Batch => PurchaseTarget::Batch {
                batch_id: self.content_id,
                installment: self.installment_number.unwrap_or(1),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub target: PurchaseTarget,
    pub transaction_id: String,
    pub breakdown: FeeBreakdown,
    pub coupon_id: Option<i64>,
}

/// Transaction plus the display name of what was bought.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub content_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoursePurchaseOrder {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub transaction_id: i64,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSeriesPurchaseOrder {
    pub id: i64,
    pub student_id: i64,
    pub test_series_id: i64,
    pub transaction_id: i64,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    Shipped,
    InTransit,
    Delivered,
    DeliveryPending,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 4] = [
        DeliveryStatus::Shipped,
        DeliveryStatus::InTransit,
        DeliveryStatus::Delivered,
        DeliveryStatus::DeliveryPending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Shipped => "shipped",
            DeliveryStatus::InTransit => "in-transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::DeliveryPending => "delivery-pending",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shipped" => Ok(DeliveryStatus::Shipped),
            "in-transit" => Ok(DeliveryStatus::InTransit),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "delivery-pending" => Ok(DeliveryStatus::DeliveryPending),
            other => Err(ClassroomError::invalid("delivery_status", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalProductOrder {
    pub id: i64,
    pub user_id: i64,
    pub test_series_id: i64,
    pub purchase_order_id: i64,
    pub delivery_status: DeliveryStatus,
    pub order_date: DateTime<Utc>,
}

/// Physical order with what a dispatcher needs to ship it.
#[derive(Debug, Clone, Serialize)]
pub struct ProductOrderSummary {
    #[serde(flatten)]
    pub order: PhysicalProductOrder,
    pub test_series_name: String,
    pub student_name: String,
    pub phone_number: String,
}

/// Order created at the gateway for a pending transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutPrefill {
    pub name: String,
    pub email: String,
    pub contact: String,
}

/// Everything the client-side checkout widget needs to collect a payment.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutPayload {
    pub key: String,
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub name: String,
    pub description: String,
    pub image: String,
    pub prefill: CheckoutPrefill,
    pub breakdown: FeeBreakdown,
}
