use crate::domain::catalog::{
    generate_batch_code, Batch, BatchInput, Course, CourseInput, FeeStructure, TestSeries, TestSeriesInput,
};
use crate::domain::payment::{DeliveryStatus, ProductOrderSummary};
use crate::domain::user::User;
use crate::error::{ClassroomError, Result};
use crate::storage::Storage;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Fresh codes collide rarely; give up after this many tries.
const BATCH_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct InstallmentDetail {
    pub installment_number: u32,
    pub amount: Decimal,
    pub is_paid: bool,
    pub payment_date: Option<DateTime<Utc>>,
}

/// A batch as a student sees it.
#[derive(Debug, Clone, Serialize)]
pub struct StudentBatch {
    pub id: i64,
    pub name: String,
    pub batch_code: String,
    pub start_date: NaiveDate,
    pub subject: String,
    pub live_class_link: Option<String>,
    pub thumbnail: Option<String>,
    pub fee_structure: Option<FeeStructure>,
    pub installment_details: Vec<InstallmentDetail>,
    pub is_joining_request_sent: bool,
}

/// Which half of the catalog a student is browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogView {
    Available,
    Purchased,
}

impl CatalogView {
    fn includes(self, owned: bool) -> bool {
        match self {
            CatalogView::Available => !owned,
            CatalogView::Purchased => owned,
        }
    }
}

pub struct CatalogUseCase {
    storage: Arc<dyn Storage>,
}

impl CatalogUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    // Courses

    pub async fn create_course(&self, admin: &User, input: CourseInput) -> Result<Course> {
        input.validate()?;
        let course = self.storage.create_course(&input, admin.id).await?;
        info!("Course {} created", course.id);
        Ok(course)
    }

    pub async fn list_courses(&self, published_only: bool) -> Result<Vec<Course>> {
        self.storage.list_courses(published_only).await
    }

    pub async fn get_course(&self, id: i64) -> Result<Course> {
        self.storage.get_course(id).await?.ok_or_else(not_found)
    }

    pub async fn update_course(&self, id: i64, input: CourseInput) -> Result<Course> {
        input.validate()?;
        self.storage.update_course(id, &input).await?.ok_or_else(not_found)
    }

    pub async fn delete_course(&self, id: i64) -> Result<()> {
        deleted(self.storage.delete_course(id).await?)
    }

    pub async fn toggle_course_publish(&self, id: i64) -> Result<String> {
        let course = self.get_course(id).await?;
        self.storage.set_course_published(id, !course.is_published).await?;
        Ok(publish_message("Course", !course.is_published))
    }

    // Batches

    pub async fn create_batch(&self, admin: &User, input: BatchInput) -> Result<Batch> {
        input.validate()?;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let code = generate_batch_code();
            match self.storage.create_batch(&input, &code, admin.id).await {
                Ok(batch) => {
                    info!("Batch {} created with code {}", batch.id, batch.batch_code);
                    return Ok(batch);
                }
                Err(ClassroomError::Conflict(_)) if attempts < BATCH_CODE_ATTEMPTS => {
                    warn!("Batch code {} already taken, retrying", code);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn list_batches(&self, published_only: bool) -> Result<Vec<Batch>> {
        self.storage.list_batches(published_only).await
    }

    pub async fn get_batch(&self, id: i64) -> Result<Batch> {
        self.storage.get_batch(id).await?.ok_or_else(not_found)
    }

    pub async fn update_batch(&self, id: i64, input: BatchInput) -> Result<Batch> {
        input.validate()?;
        self.storage.update_batch(id, &input).await?.ok_or_else(not_found)
    }

    pub async fn delete_batch(&self, id: i64) -> Result<()> {
        deleted(self.storage.delete_batch(id).await?)
    }

    pub async fn toggle_batch_publish(&self, id: i64) -> Result<String> {
        let batch = self.get_batch(id).await?;
        self.storage.set_batch_published(id, !batch.is_published).await?;
        Ok(publish_message("Batch", !batch.is_published))
    }

    // Test series

    pub async fn create_test_series(&self, admin: &User, input: TestSeriesInput) -> Result<TestSeries> {
        input.validate()?;
        let series = self.storage.create_test_series(&input, admin.id).await?;
        info!("Test series {} created", series.id);
        Ok(series)
    }

    pub async fn list_test_series(&self, published_only: bool) -> Result<Vec<TestSeries>> {
        self.storage.list_test_series(published_only).await
    }

    pub async fn get_test_series(&self, id: i64) -> Result<TestSeries> {
        self.storage.get_test_series(id).await?.ok_or_else(not_found)
    }

    pub async fn update_test_series(&self, id: i64, input: TestSeriesInput) -> Result<TestSeries> {
        input.validate()?;
        self.storage.update_test_series(id, &input).await?.ok_or_else(not_found)
    }

    pub async fn delete_test_series(&self, id: i64) -> Result<()> {
        deleted(self.storage.delete_test_series(id).await?)
    }

    pub async fn toggle_test_series_publish(&self, id: i64) -> Result<String> {
        let series = self.get_test_series(id).await?;
        self.storage.set_test_series_published(id, !series.is_published).await?;
        Ok(publish_message("Test series", !series.is_published))
    }

    /// Course as the public catalog shows it; drafts are hidden.
    pub async fn published_course(&self, id: i64) -> Result<Course> {
        Some(self.get_course(id).await?)
            .filter(|c| c.is_published)
            .ok_or_else(not_found)
    }

    pub async fn published_test_series(&self, id: i64) -> Result<TestSeries> {
        Some(self.get_test_series(id).await?)
            .filter(|t| t.is_published)
            .ok_or_else(not_found)
    }

    /// Published courses split by whether the student has bought them.
    pub async fn student_courses(&self, student: &User, view: CatalogView) -> Result<Vec<Course>> {
        let bought: HashSet<i64> = self.storage.purchased_course_ids(student.id).await?.into_iter().collect();
        let courses = self.storage.list_courses(true).await?;
        Ok(courses
            .into_iter()
            .filter(|c| view.includes(bought.contains(&c.id)))
            .collect())
    }

    /// Published test series split by purchase, optionally only digital or
    /// only printed ones.
    pub async fn student_test_series(
        &self,
        student: &User,
        view: CatalogView,
        is_digital: Option<bool>,
    ) -> Result<Vec<TestSeries>> {
        let bought: HashSet<i64> = self
            .storage
            .purchased_test_series_ids(student.id)
            .await?
            .into_iter()
            .collect();
        let series = self.storage.list_test_series(true).await?;
        Ok(series
            .into_iter()
            .filter(|t| is_digital.map_or(true, |d| t.is_digital == d))
            .filter(|t| view.includes(bought.contains(&t.id)))
            .collect())
    }

    // Physical deliveries

    pub async fn list_product_orders(&self, status: Option<DeliveryStatus>) -> Result<Vec<ProductOrderSummary>> {
        self.storage.list_product_orders(status).await
    }

    pub async fn get_product_order(&self, id: i64) -> Result<ProductOrderSummary> {
        self.storage
            .get_product_order(id)
            .await?
            .ok_or_else(|| ClassroomError::not_found("Order not found."))
    }

    pub async fn update_delivery_status(&self, id: i64, status: &str) -> Result<ProductOrderSummary> {
        let order = self.get_product_order(id).await?;
        let status: DeliveryStatus = status.parse().map_err(|_| {
            ClassroomError::invalid(
                "delivery_status",
                format!(
                    "Invalid status. Allowed values are: {}",
                    DeliveryStatus::ALL.map(|s| s.as_str()).join(", ")
                ),
            )
        })?;
        self.storage.set_delivery_status(id, status).await?;
        info!(
            "Product order {} moved from {} to {}",
            id,
            order.order.delivery_status.as_str(),
            status.as_str()
        );
        self.get_product_order(id).await
    }

    /// Published batches split by whether the student already has access.
    pub async fn student_batches(&self, student: &User, view: CatalogView) -> Result<Vec<StudentBatch>> {
        let enrollments = self.storage.student_enrollments(student.id).await?;
        let orders = self.storage.batch_orders(student.id, None).await?;

        let approved: HashSet<i64> = enrollments.iter().filter(|e| e.is_approved).map(|e| e.batch_id).collect();
        let requested: HashSet<i64> = enrollments.iter().map(|e| e.batch_id).collect();
        let purchased: HashSet<i64> = orders.iter().filter(|o| o.is_paid).map(|o| o.batch_id).collect();

        let batches = self.storage.list_batches(true).await?;
        Ok(batches
            .into_iter()
            .filter(|b| {
                view.includes(approved.contains(&b.id) || purchased.contains(&b.id))
            })
            .map(|b| {
                let installment_details = b
                    .fee_structure
                    .as_ref()
                    .map(|fee| {
                        (1..=fee.installments)
                            .map(|n| {
                                let order = orders
                                    .iter()
                                    .find(|o| o.batch_id == b.id && o.installment_number == n);
                                InstallmentDetail {
                                    installment_number: n,
                                    amount: fee.fee_amount,
                                    is_paid: order.is_some_and(|o| o.is_paid),
                                    payment_date: order.and_then(|o| o.payment_date),
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                StudentBatch {
                    is_joining_request_sent: requested.contains(&b.id),
                    installment_details,
                    id: b.id,
                    name: b.name,
                    batch_code: b.batch_code,
                    start_date: b.start_date,
                    subject: b.subject,
                    live_class_link: b.live_class_link,
                    thumbnail: b.thumbnail,
                    fee_structure: b.fee_structure,
                }
            })
            .collect())
    }

    /// One published batch the student can see in either view.
    pub async fn student_batch(&self, student: &User, id: i64) -> Result<StudentBatch> {
        for view in [CatalogView::Purchased, CatalogView::Available] {
            if let Some(batch) = self
                .student_batches(student, view)
                .await?
                .into_iter()
                .find(|b| b.id == id)
            {
                return Ok(batch);
            }
        }
        Err(not_found())
    }
}

fn not_found() -> ClassroomError {
    ClassroomError::not_found("Not found.")
}

fn deleted(existed: bool) -> Result<()> {
    if existed {
        Ok(())
    } else {
        Err(not_found())
    }
}

fn publish_message(kind: &str, published: bool) -> String {
    format!(
        "{} {} successfully.",
        kind,
        if published { "published" } else { "unpublished" }
    )
}
