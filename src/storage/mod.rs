use crate::domain::catalog::{Batch, BatchInput, Course, CourseInput, TestSeries, TestSeriesInput};
use crate::domain::coupon::{Coupon, CouponInput};
use crate::domain::enrollment::{BatchPurchaseOrder, Enrollment};
use crate::domain::live_class::{Attendance, AttendanceEntry, ClassStatus, LiveClass, NewLiveClass, RecordingUpdate};
use crate::domain::notification::{Device, NotificationRequest, NotificationView, PushNotification};
use crate::domain::payment::{
    DeliveryStatus, NewTransaction, PaymentStatus, ProductOrderSummary, Transaction, TransactionSummary,
};
use crate::domain::user::{NewUser, OtpChallenge, User};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

pub mod sqlite;

pub use sqlite::SqliteStorage;

/// Result of driving a transaction to `completed`.
#[derive(Debug, Clone)]
pub enum Completion {
    /// This call completed the transaction and created its purchase order.
    Completed(Transaction),
    /// An earlier call already completed it; nothing was changed.
    AlreadyCompleted(Transaction),
}

impl Completion {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Completion::Completed(t) | Completion::AlreadyCompleted(t) => t,
        }
    }

    pub fn into_transaction(self) -> Transaction {
        match self {
            Completion::Completed(t) | Completion::AlreadyCompleted(t) => t,
        }
    }
}

/// Offline installment payment recorded by an administrator.
#[derive(Debug, Clone)]
pub struct OfflinePayment {
    pub student_id: i64,
    pub batch_id: i64,
    pub installment_number: u32,
    pub amount: Decimal,
    pub reference_number: Option<String>,
}

/// Persistence for every classroom entity
#[async_trait]
pub trait Storage: Send + Sync {
    // Users
    async fn create_user(&self, user: &NewUser) -> Result<User>;
    async fn get_user(&self, id: i64) -> Result<Option<User>>;
    async fn get_users(&self, ids: &[i64]) -> Result<Vec<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>>;
    async fn find_user_by_merit_id(&self, merit_user_id: &str) -> Result<Option<User>>;
    async fn set_merit_user_id(&self, user_id: i64, merit_user_id: &str) -> Result<()>;

    // One-time passwords
    async fn save_otp(&self, challenge: &OtpChallenge) -> Result<()>;
    async fn get_otp(&self, token: &str) -> Result<Option<OtpChallenge>>;
    async fn consume_otp(&self, token: &str) -> Result<bool>;
    /// Count a wrong code against the challenge, consuming it once
    /// `max_failures` is reached. Returns the failures so far.
    async fn record_otp_failure(&self, token: &str, max_failures: u32) -> Result<u32>;

    // Courses
    async fn create_course(&self, input: &CourseInput, created_by: i64) -> Result<Course>;
    async fn get_course(&self, id: i64) -> Result<Option<Course>>;
    async fn list_courses(&self, published_only: bool) -> Result<Vec<Course>>;
    async fn update_course(&self, id: i64, input: &CourseInput) -> Result<Option<Course>>;
    async fn delete_course(&self, id: i64) -> Result<bool>;
    async fn set_course_published(&self, id: i64, published: bool) -> Result<bool>;

    // Batches
    async fn create_batch(&self, input: &BatchInput, batch_code: &str, created_by: i64) -> Result<Batch>;
    async fn get_batch(&self, id: i64) -> Result<Option<Batch>>;
    async fn list_batches(&self, published_only: bool) -> Result<Vec<Batch>>;
    async fn update_batch(&self, id: i64, input: &BatchInput) -> Result<Option<Batch>>;
    async fn delete_batch(&self, id: i64) -> Result<bool>;
    async fn set_batch_published(&self, id: i64, published: bool) -> Result<bool>;

    // Test series
    async fn create_test_series(&self, input: &TestSeriesInput, created_by: i64) -> Result<TestSeries>;
    async fn get_test_series(&self, id: i64) -> Result<Option<TestSeries>>;
    async fn list_test_series(&self, published_only: bool) -> Result<Vec<TestSeries>>;
    async fn update_test_series(&self, id: i64, input: &TestSeriesInput) -> Result<Option<TestSeries>>;
    async fn delete_test_series(&self, id: i64) -> Result<bool>;
    async fn set_test_series_published(&self, id: i64, published: bool) -> Result<bool>;

    // Enrollments
    async fn create_enrollment(&self, batch_id: i64, student_id: i64) -> Result<Enrollment>;
    /// Returns the enrollment and whether it was created by this call.
    async fn ensure_approved_enrollment(&self, batch_id: i64, student_id: i64, approved_by: i64)
        -> Result<(Enrollment, bool)>;
    async fn get_enrollment(&self, id: i64) -> Result<Option<Enrollment>>;
    async fn find_enrollment(&self, batch_id: i64, student_id: i64) -> Result<Option<Enrollment>>;
    async fn list_enrollments(&self, batch_id: Option<i64>) -> Result<Vec<Enrollment>>;
    async fn approve_enrollment(&self, id: i64, approved_by: i64) -> Result<Option<Enrollment>>;
    async fn delete_enrollment(&self, id: i64) -> Result<bool>;
    async fn student_enrollments(&self, student_id: i64) -> Result<Vec<Enrollment>>;
    async fn approved_student_ids(&self, batch_id: i64) -> Result<Vec<i64>>;

    // Batch installments
    async fn batch_orders(&self, student_id: i64, batch_id: Option<i64>) -> Result<Vec<BatchPurchaseOrder>>;
    async fn record_offline_payment(&self, payment: &OfflinePayment) -> Result<BatchPurchaseOrder>;

    // Coupons
    async fn create_coupon(&self, input: &CouponInput, created_by: i64) -> Result<Coupon>;
    async fn get_coupon(&self, id: i64) -> Result<Option<Coupon>>;
    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;
    async fn list_coupons(&self) -> Result<Vec<Coupon>>;
    async fn update_coupon(&self, id: i64, input: &CouponInput) -> Result<Option<Coupon>>;
    async fn delete_coupon(&self, id: i64) -> Result<bool>;
    /// Non-failed transactions `user_id` has made with the coupon.
    async fn coupon_uses_by_user(&self, coupon_id: i64, user_id: i64) -> Result<i64>;

    // Payments
    async fn create_transaction(&self, tx: &NewTransaction) -> Result<Transaction>;
    async fn get_transaction(&self, id: i64) -> Result<Option<Transaction>>;
    async fn get_transaction_by_order(&self, order_id: &str) -> Result<Option<Transaction>>;
    async fn list_transactions(&self) -> Result<Vec<TransactionSummary>>;
    async fn user_transactions(&self, user_id: i64, status: Option<PaymentStatus>) -> Result<Vec<TransactionSummary>>;
    /// Atomically mark the transaction paid, create its purchase order and
    /// count coupon usage. Completing twice is a no-op.
    async fn complete_transaction(&self, order_id: &str, payment_id: &str) -> Result<Completion>;
    /// Flip a pending transaction to failed. Completed transactions are left alone.
    async fn fail_transaction(&self, order_id: &str) -> Result<Option<Transaction>>;

    // Purchases
    async fn purchased_course_ids(&self, student_id: i64) -> Result<Vec<i64>>;
    async fn purchased_test_series_ids(&self, student_id: i64) -> Result<Vec<i64>>;
    async fn course_buyer_ids(&self, course_id: i64) -> Result<Vec<i64>>;
    /// Approved enrollment or at least one paid installment.
    async fn has_batch_access(&self, student_id: i64, batch_id: i64) -> Result<bool>;

    // Physical deliveries for printed test series
    async fn list_product_orders(&self, status: Option<DeliveryStatus>) -> Result<Vec<ProductOrderSummary>>;
    async fn get_product_order(&self, id: i64) -> Result<Option<ProductOrderSummary>>;
    async fn set_delivery_status(&self, id: i64, status: DeliveryStatus) -> Result<bool>;

    // Live classes
    async fn create_live_class(&self, class: &NewLiveClass) -> Result<LiveClass>;
    async fn list_live_classes(&self, batch_id: i64) -> Result<Vec<LiveClass>>;
    async fn find_live_class(&self, class_id: &str) -> Result<Option<LiveClass>>;
    async fn set_class_status(&self, class_id: &str, status: ClassStatus) -> Result<bool>;
    async fn set_recording(&self, update: &RecordingUpdate) -> Result<bool>;
    async fn upsert_attendance(&self, student_id: i64, live_class_id: i64, entry: &AttendanceEntry) -> Result<()>;
    async fn student_attendance(&self, student_id: i64, batch_id: i64) -> Result<Vec<Attendance>>;

    // Devices and push notifications
    async fn register_device(&self, user_id: i64, registration_id: &str) -> Result<Device>;
    /// Registration ids of active devices, optionally restricted to `user_ids`.
    async fn active_device_tokens(&self, user_ids: Option<&[i64]>) -> Result<Vec<String>>;
    async fn create_notification(&self, request: &NotificationRequest, sender_id: i64) -> Result<PushNotification>;
    async fn list_notifications(&self) -> Result<Vec<NotificationView>>;
}
