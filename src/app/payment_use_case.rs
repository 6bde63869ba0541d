use crate::app::ports::PaymentGatewayPort;
use crate::config::{BrandingConfig, FeeConfig};
use crate::domain::coupon::{Coupon, Redemption};
use crate::domain::payment::{
    CheckoutPayload, CheckoutPrefill, ContentType, NewTransaction, PaymentStatus, PurchaseTarget, Transaction, TransactionSummary,
};
use crate::domain::pricing::{fee_breakdown, to_minor_units, FeeBreakdown};
use crate::domain::user::User;
use crate::error::{ClassroomError, Result};
use crate::metrics::PaymentMetrics;
use crate::storage::{Completion, Storage};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A priced purchase before any money moves.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    #[serde(skip)]
    pub target: PurchaseTarget,
    pub content_type: ContentType,
    pub content_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment_number: Option<u32>,
    pub description: String,
    #[serde(flatten)]
    pub breakdown: FeeBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(skip)]
    pub coupon_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Ignored,
}

impl WebhookOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "success",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Deserialize)]
struct WebhookEvent {
    event: String,
    payload: WebhookPayload,
}

#[derive(Deserialize)]
struct WebhookPayload {
    payment: PaymentWrapper,
}

#[derive(Deserialize)]
struct PaymentWrapper {
    entity: PaymentEntity,
}

#[derive(Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: String,
}

/// Two-phase checkout: `initiate` opens a gateway order, `verify` (or the
/// gateway webhook) settles it.
pub struct PaymentUseCase {
    storage: Arc<dyn Storage>,
    gateway: Arc<dyn PaymentGatewayPort>,
    fees: FeeConfig,
    branding: BrandingConfig,
}

impl PaymentUseCase {
    pub fn new(
        storage: Arc<dyn Storage>,
        gateway: Arc<dyn PaymentGatewayPort>,
        fees: FeeConfig,
        branding: BrandingConfig,
    ) -> Self {
        Self {
            storage,
            gateway,
            fees,
            branding,
        }
    }

    /// Price `target` for `user`, applying `coupon_code` when given.
    pub async fn quote(&self, user: &User, target: PurchaseTarget, coupon_code: Option<&str>) -> Result<Quote> {
        let (description, price, gst) = match target {
            PurchaseTarget::Course(course_id) => {
                let course = self
                    .storage
                    .get_course(course_id)
                    .await?
                    .filter(|c| c.is_published)
                    .ok_or_else(|| ClassroomError::invalid("course_id", "Invalid or unpublished course ID."))?;
                let price = course
                    .effective_price
                    .ok_or_else(|| ClassroomError::invalid("course_id", "This course has no price set."))?;
                let gst = course.tax_percent.map(Decimal::from);
                (format!("Payment for {}", course.name), price, gst)
            }
            PurchaseTarget::Batch { batch_id, installment } => {
                let batch = self
                    .storage
                    .get_batch(batch_id)
                    .await?
                    .filter(|b| b.is_published)
                    .ok_or_else(|| ClassroomError::invalid("batch_id", "Invalid or unpublished batch ID."))?;
                let fee = batch
                    .fee_structure
                    .as_ref()
                    .ok_or_else(|| ClassroomError::invalid("batch_id", "This batch has no fee structure."))?;
                if installment < 1 || installment > fee.installments {
                    return Err(ClassroomError::invalid("installment_number", "Invalid installment number."));
                }
                let paid: HashSet<u32> = self
                    .storage
                    .batch_orders(user.id, Some(batch_id))
                    .await?
                    .into_iter()
                    .filter(|o| o.is_paid)
                    .map(|o| o.installment_number)
                    .collect();
                if paid.contains(&installment) {
                    return Err(ClassroomError::invalid(
                        "installment_number",
                        "This installment has already been paid.",
                    ));
                }
                if installment > 1 && !paid.contains(&(installment - 1)) {
                    return Err(ClassroomError::invalid(
                        "installment_number",
                        "Please pay the previous installment first.",
                    ));
                }
                (
                    format!("Installment {} for {}", installment, batch.name),
                    fee.fee_amount,
                    None,
                )
            }
            PurchaseTarget::TestSeries(test_series_id) => {
                let series = self
                    .storage
                    .get_test_series(test_series_id)
                    .await?
                    .filter(|t| t.is_published)
                    .ok_or_else(|| {
                        ClassroomError::invalid("test_series_id", "Invalid or unpublished test series ID.")
                    })?;
                (
                    format!("Payment for {}", series.name),
                    series.effective_price,
                    Some(Decimal::from(series.gst)),
                )
            }
        };

        let coupon = match coupon_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(self.redeemable_coupon(user, &target, code, price).await?),
            None => None,
        };
        let discount = coupon.as_ref().map_or(Decimal::ZERO, |c| c.discount_for(price));

        Ok(Quote {
            target,
            content_type: target.content_type(),
            content_id: target.content_id(),
            installment_number: target.installment(),
            description,
            breakdown: fee_breakdown(price, discount, gst, &self.fees),
            coupon_code: coupon.as_ref().map(|c| c.code.clone()),
            coupon_id: coupon.map(|c| c.id),
        })
    }

    async fn redeemable_coupon(
        &self,
        user: &User,
        target: &PurchaseTarget,
        code: &str,
        price: Decimal,
    ) -> Result<Coupon> {
        let coupon = self
            .storage
            .find_coupon_by_code(code)
            .await?
            .ok_or_else(|| ClassroomError::invalid("coupon_code", "Invalid coupon code."))?;
        let prior_uses_by_user = self.storage.coupon_uses_by_user(coupon.id, user.id).await?;
        coupon.check_redeemable(&Redemption {
            user_id: user.id,
            content_type: target.content_type(),
            content_id: target.content_id(),
            original_price: price,
            prior_uses_by_user,
            now: Utc::now(),
        })?;
        Ok(coupon)
    }

    /// Price a course with a coupon without starting a payment.
    pub async fn apply_coupon(&self, user: &User, course_id: i64, coupon_code: &str) -> Result<Quote> {
        if coupon_code.trim().is_empty() {
            return Err(ClassroomError::invalid("coupon_code", "This field may not be blank."));
        }
        self.quote(user, PurchaseTarget::Course(course_id), Some(coupon_code)).await
    }

    /// Open a gateway order and record a pending transaction for it.
    pub async fn initiate(
        &self,
        user: &User,
        target: PurchaseTarget,
        coupon_code: Option<&str>,
    ) -> Result<CheckoutPayload> {
        let quote = self.quote(user, target, coupon_code).await?;
        let amount = to_minor_units(quote.breakdown.total_amount);
        let receipt = format!("rcpt_{}", uuid::Uuid::new_v4().simple());

        let order = self
            .gateway
            .create_order(amount, &self.fees.currency, &receipt)
            .await?;

        let transaction = self
            .storage
            .create_transaction(&NewTransaction {
                user_id: user.id,
                target,
                transaction_id: order.id.clone(),
                breakdown: quote.breakdown.clone(),
                coupon_id: quote.coupon_id,
            })
            .await?;

        PaymentMetrics::initiated(target.content_type().as_str());
        info!(
            "Initiated {} payment {} for user {} ({} paise)",
            target.content_type(),
            transaction.transaction_id,
            user.id,
            order.amount
        );

        Ok(CheckoutPayload {
            key: self.gateway.key_id().to_string(),
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            name: self.branding.name.clone(),
            description: quote.description,
            image: self.branding.image.clone(),
            prefill: CheckoutPrefill {
                name: user.full_name.clone(),
                email: user.email.clone(),
                contact: user.phone_number.clone(),
            },
            breakdown: quote.breakdown,
        })
    }

    /// Settle a checkout from the client-side callback.
    pub async fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> Result<Transaction> {
        if !self.gateway.verify_payment_signature(order_id, payment_id, signature) {
            warn!("Signature mismatch for order {}", order_id);
            PaymentMetrics::failed("signature");
            if self.storage.fail_transaction(order_id).await?.is_none() {
                return Err(ClassroomError::not_found("Transaction does not exist."));
            }
            return Err(ClassroomError::Signature("Signature verification failed.".to_string()));
        }
        self.complete(order_id, payment_id).await
    }

    async fn complete(&self, order_id: &str, payment_id: &str) -> Result<Transaction> {
        match self.storage.complete_transaction(order_id, payment_id).await? {
            Completion::Completed(tx) => {
                PaymentMetrics::completed(tx.content_type.as_str());
                if tx.coupon_id.is_some() {
                    PaymentMetrics::coupon_redeemed();
                }
                Ok(tx)
            }
            Completion::AlreadyCompleted(tx) => {
                debug!("Order {} was already settled", order_id);
                Ok(tx)
            }
        }
    }

    /// Server-to-server notification from the gateway.
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        PaymentMetrics::webhook_received("razorpay");
        let valid = signature.is_some_and(|sig| self.gateway.verify_webhook_signature(body, sig));
        if !valid {
            warn!("Rejected payment webhook with a bad signature");
            return Err(ClassroomError::non_field("Invalid signature."));
        }

        let raw: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| ClassroomError::non_field("Invalid payload."))?;
        let event_name = raw.get("event").and_then(|e| e.as_str()).unwrap_or_default();
        if event_name != "payment.captured" && event_name != "payment.failed" {
            debug!("Ignoring webhook event '{}'", event_name);
            return Ok(WebhookOutcome::Ignored);
        }
        let event: WebhookEvent =
            serde_json::from_value(raw).map_err(|_| ClassroomError::non_field("Invalid payload."))?;
        let payment = event.payload.payment.entity;

        if event.event == "payment.captured" {
            self.complete(&payment.order_id, &payment.id).await?;
        } else {
            match self.storage.fail_transaction(&payment.order_id).await? {
                Some(tx) if tx.payment_status == PaymentStatus::Failed => {
                    PaymentMetrics::failed("gateway");
                    info!("Order {} marked failed by webhook", payment.order_id);
                }
                Some(_) => debug!("Order {} already settled, failure ignored", payment.order_id),
                None => warn!("Payment failure for unknown order {}", payment.order_id),
            }
        }
        Ok(WebhookOutcome::Processed)
    }

    pub async fn list_transactions(&self) -> Result<Vec<TransactionSummary>> {
        self.storage.list_transactions().await
    }

    pub async fn get_transaction(&self, id: i64) -> Result<Transaction> {
        self.storage
            .get_transaction(id)
            .await?
            .ok_or_else(|| ClassroomError::not_found("Not found."))
    }

    pub async fn student_transactions(&self, user: &User) -> Result<Vec<TransactionSummary>> {
        self.storage
            .user_transactions(user.id, Some(PaymentStatus::Completed))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{CourseInput, DurationUnit, TestSeriesInput, ValidityType};
    use crate::domain::coupon::{CouponInput, CouponType, DiscountType};
    use crate::domain::payment::GatewayOrder;
    use crate::domain::user::NewUser;
    use crate::infra::razorpay::hmac_sha256_hex;
    use crate::storage::SqliteStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "unit-secret";

    #[derive(Default)]
    struct FakeGateway {
        orders: AtomicUsize,
    }

    #[async_trait]
    impl PaymentGatewayPort for FakeGateway {
        fn key_id(&self) -> &str {
            "rzp_unit"
        }

        async fn create_order(&self, amount_minor: i64, currency: &str, _receipt: &str) -> Result<GatewayOrder> {
            let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(GatewayOrder {
                id: format!("order_{n}"),
                amount: amount_minor,
                currency: currency.to_string(),
            })
        }

        fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
            hmac_sha256_hex(SECRET, format!("{order_id}|{payment_id}").as_bytes()).as_deref() == Some(signature)
        }

        fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
            hmac_sha256_hex(SECRET, body).as_deref() == Some(signature)
        }
    }

    struct Fixture {
        use_case: PaymentUseCase,
        storage: Arc<SqliteStorage>,
        student: User,
        course_id: i64,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let admin = storage
            .create_user(&NewUser::student("admin@example.com", "9000000051", "Admin"))
            .await
            .unwrap();
        let student = storage
            .create_user(&NewUser::student("kid@example.com", "9000000052", "Kid"))
            .await
            .unwrap();
        let course = storage
            .create_course(
                &CourseInput {
                    name: "Chemistry".into(),
                    description: String::new(),
                    thumbnail: String::new(),
                    price: Some(Decimal::new(2000, 0)),
                    discount: Decimal::new(50, 0),
                    validity_type: ValidityType::Lifetime,
                    duration_value: None,
                    duration_unit: DurationUnit::Days,
                    expiry_date: None,
                    is_published: true,
                    is_featured: false,
                    tax_percent: None,
                    internet_handling_charges: false,
                },
                admin.id,
            )
            .await
            .unwrap();
        let use_case = PaymentUseCase::new(
            storage.clone(),
            Arc::new(FakeGateway::default()),
            FeeConfig::default(),
            BrandingConfig::default(),
        );
        Fixture {
            use_case,
            storage,
            student,
            course_id: course.id,
        }
    }

    fn percent_coupon(code: &str, value: i64) -> CouponInput {
        CouponInput {
            name: code.into(),
            code: code.into(),
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::new(value, 0),
            max_discount_amount: None,
            start_at: Utc::now() - chrono::Duration::days(1),
            end_at: None,
            lifetime: true,
            min_order_value: Decimal::ZERO,
            max_uses: Some(1),
            usage_per_student: None,
            is_visible: true,
            is_expired: false,
            status: true,
            coupon_type: CouponType::Public,
            students: vec![],
            courses: vec![],
            is_all_courses: true,
        }
    }

    fn sign(order_id: &str, payment_id: &str) -> String {
        hmac_sha256_hex(SECRET, format!("{order_id}|{payment_id}").as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_course_quote_uses_discounted_price() {
        let f = fixture().await;
        let quote = f
            .use_case
            .quote(&f.student, PurchaseTarget::Course(f.course_id), None)
            .await
            .unwrap();
        // 2000 less 50% course discount
        assert_eq!(quote.breakdown.original_price, Decimal::new(1000, 0));
        assert_eq!(quote.breakdown.total_amount, Decimal::new(120360, 2));
        assert_eq!(quote.content_type, ContentType::Course);
    }

    #[tokio::test]
    async fn test_zero_gst_test_series_is_honoured() {
        let f = fixture().await;
        let series = f
            .storage
            .create_test_series(
                &TestSeriesInput {
                    name: "Mock tests".into(),
                    description: None,
                    thumbnail: None,
                    price: Decimal::new(500, 0),
                    discounted_price: Decimal::new(400, 0),
                    is_digital: true,
                    url: None,
                    highlights: vec![],
                    is_published: true,
                    gst: 0,
                },
                f.student.id,
            )
            .await
            .unwrap();
        let quote = f
            .use_case
            .quote(&f.student, PurchaseTarget::TestSeries(series.id), None)
            .await
            .unwrap();
        assert_eq!(quote.breakdown.gst_amount, Decimal::ZERO);
        assert_eq!(quote.breakdown.total_amount, Decimal::new(420, 0));
    }

    #[tokio::test]
    async fn test_concurrent_verify_completes_once() {
        let f = fixture().await;
        let coupon = f.storage.create_coupon(&percent_coupon("HALF", 50), f.student.id).await.unwrap();
        let checkout = f
            .use_case
            .initiate(&f.student, PurchaseTarget::Course(f.course_id), Some("HALF"))
            .await
            .unwrap();
        assert_eq!(checkout.key, "rzp_unit");
        // 500 + 18% of 520 + 20
        assert_eq!(checkout.amount, 61360);

        let signature = sign(&checkout.order_id, "pay_1");
        let (a, b) = tokio::join!(
            f.use_case.verify(&checkout.order_id, "pay_1", &signature),
            f.use_case.verify(&checkout.order_id, "pay_1", &signature),
        );
        assert_eq!(a.unwrap().payment_status, PaymentStatus::Completed);
        assert_eq!(b.unwrap().payment_status, PaymentStatus::Completed);

        let coupon = f.storage.get_coupon(coupon.id).await.unwrap().unwrap();
        assert_eq!(coupon.total_applied, 1);

        // the single use is spent
        let err = f
            .use_case
            .quote(&f.student, PurchaseTarget::Course(f.course_id), Some("HALF"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ClassroomError::Validation { ref message, .. } if message == "Coupon usage limit has been reached.")
        );
    }

    #[tokio::test]
    async fn test_failed_webhook_never_downgrades() {
        let f = fixture().await;
        let checkout = f
            .use_case
            .initiate(&f.student, PurchaseTarget::Course(f.course_id), None)
            .await
            .unwrap();
        f.use_case
            .verify(&checkout.order_id, "pay_9", &sign(&checkout.order_id, "pay_9"))
            .await
            .unwrap();

        let body = serde_json::json!({
            "event": "payment.failed",
            "payload": { "payment": { "entity": { "id": "pay_9", "order_id": checkout.order_id } } }
        })
        .to_string();
        let signature = hmac_sha256_hex(SECRET, body.as_bytes()).unwrap();
        let outcome = f
            .use_case
            .handle_webhook(body.as_bytes(), Some(&signature))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let tx = f
            .storage
            .get_transaction_by_order(&checkout.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.payment_status, PaymentStatus::Completed);

        let err = f.use_case.handle_webhook(body.as_bytes(), None).await.unwrap_err();
        assert!(matches!(err, ClassroomError::Validation { ref message, .. } if message == "Invalid signature."));
    }
}
