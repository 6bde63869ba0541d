use crate::config::FeeConfig;
use crate::domain::catalog::Batch;
use crate::domain::enrollment::{outstanding_installments, BatchPurchaseOrder, Enrollment, InstallmentState};
use crate::domain::pricing::fee_breakdown;
use crate::domain::user::{NewUser, User};
use crate::error::{ClassroomError, Result};
use crate::storage::{OfflinePayment, Storage};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct BulkEnrollRequest {
    pub batch: i64,
    #[serde(default)]
    pub students: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddStudentRequest {
    pub email: String,
    pub phone_number: String,
    pub full_name: String,
    pub batch: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfflineFeeRequest {
    pub batch: i64,
    pub student: i64,
    pub amount: Decimal,
    #[serde(default = "first_installment")]
    pub installment_number: u32,
    pub reference_number: Option<String>,
}

fn first_installment() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize)]
pub struct PaidFee {
    pub batch_id: i64,
    pub batch_name: String,
    pub installment_number: u32,
    pub amount: Decimal,
    pub payment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DueFee {
    pub batch_id: i64,
    pub batch_name: String,
    pub installment_number: u32,
    pub amount: Decimal,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeeSchedule {
    pub paid_fees: Vec<PaidFee>,
    pub unpaid_fees: Vec<DueFee>,
    pub upcoming_fees: Vec<DueFee>,
}

pub struct EnrollmentUseCase {
    storage: Arc<dyn Storage>,
    fees: FeeConfig,
}

impl EnrollmentUseCase {
    pub fn new(storage: Arc<dyn Storage>, fees: FeeConfig) -> Self {
        Self { storage, fees }
    }

    async fn batch(&self, id: i64) -> Result<Batch> {
        self.storage
            .get_batch(id)
            .await?
            .ok_or_else(|| ClassroomError::invalid("batch", "Batch does not exist."))
    }

    /// Enroll existing students as approved. Returns the enrollment ids,
    /// whether or not they existed before.
    pub async fn bulk_enroll(&self, admin: &User, request: BulkEnrollRequest) -> Result<Vec<i64>> {
        if request.students.is_empty() {
            return Err(ClassroomError::non_field("Batch ID and student IDs are required."));
        }
        self.batch(request.batch).await?;

        let wanted: BTreeSet<i64> = request.students.iter().copied().collect();
        let ids: Vec<i64> = wanted.iter().copied().collect();
        let found = self.storage.get_users(&ids).await?;
        if found.len() != ids.len() {
            return Err(ClassroomError::invalid("students", "One or more student IDs do not exist."));
        }

        let mut enrollment_ids = Vec::with_capacity(ids.len());
        let mut created = 0;
        for student_id in ids {
            let (enrollment, is_new) = self
                .storage
                .ensure_approved_enrollment(request.batch, student_id, admin.id)
                .await?;
            if is_new {
                created += 1;
            }
            enrollment_ids.push(enrollment.id);
        }
        info!(
            "Bulk enrolled {} students into batch {} ({} new)",
            enrollment_ids.len(),
            request.batch,
            created
        );
        Ok(enrollment_ids)
    }

    /// Create a student account with a pending enrollment in one step.
    pub async fn add_student(&self, request: AddStudentRequest) -> Result<(User, Enrollment)> {
        self.batch(request.batch).await?;
        let new_user = NewUser::student(&request.email, &request.phone_number, &request.full_name).validated()?;

        if self.storage.find_user_by_email(&new_user.email).await?.is_some() {
            return Err(ClassroomError::invalid("email", "Email is already in use."));
        }
        if self.storage.find_user_by_phone(&new_user.phone_number).await?.is_some() {
            return Err(ClassroomError::invalid("phone_number", "Phone number is already in use."));
        }

        let user = self.storage.create_user(&new_user).await?;
        let enrollment = self.storage.create_enrollment(request.batch, user.id).await?;
        info!("Student {} created and enrolled in batch {}", user.id, request.batch);
        Ok((user, enrollment))
    }

    /// Student asks to join a batch; an administrator approves later.
    pub async fn join_request(&self, student: &User, batch_id: i64) -> Result<Enrollment> {
        self.batch(batch_id).await?;
        if !self.storage.batch_orders(student.id, Some(batch_id)).await?.is_empty() {
            return Err(ClassroomError::Conflict("Student is already added to this batch.".to_string()));
        }
        if self.storage.find_enrollment(batch_id, student.id).await?.is_some() {
            return Err(ClassroomError::Conflict(
                "The student is already enrolled in this batch.".to_string(),
            ));
        }
        self.storage.create_enrollment(batch_id, student.id).await
    }

    pub async fn approve(&self, admin: &User, id: i64) -> Result<Enrollment> {
        let enrollment = self
            .storage
            .approve_enrollment(id, admin.id)
            .await?
            .ok_or_else(|| ClassroomError::not_found("Enrollment not found."))?;
        info!("Enrollment {} approved by {}", id, admin.id);
        Ok(enrollment)
    }

    /// Rejecting a request removes it.
    pub async fn reject(&self, id: i64) -> Result<()> {
        if !self.storage.delete_enrollment(id).await? {
            return Err(ClassroomError::not_found("Enrollment not found."));
        }
        Ok(())
    }

    pub async fn list(&self, batch_id: Option<i64>) -> Result<Vec<Enrollment>> {
        self.storage.list_enrollments(batch_id).await
    }

    pub async fn get(&self, id: i64) -> Result<Enrollment> {
        self.storage
            .get_enrollment(id)
            .await?
            .ok_or_else(|| ClassroomError::not_found("Not found."))
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self.storage.delete_enrollment(id).await? {
            return Err(ClassroomError::not_found("Not found."));
        }
        Ok(())
    }

    /// Record an installment paid outside the gateway (cash, bank transfer).
    pub async fn record_offline_fee(&self, request: OfflineFeeRequest) -> Result<BatchPurchaseOrder> {
        let batch = self.batch(request.batch).await?;
        if self.storage.get_user(request.student).await?.is_none() {
            return Err(ClassroomError::invalid("student", "Student does not exist."));
        }

        match self.storage.find_enrollment(batch.id, request.student).await? {
            Some(e) if !e.is_approved => {
                return Err(ClassroomError::invalid(
                    "batch",
                    "You need to first approve the student enrollment",
                ))
            }
            Some(_) => {}
            None => {
                return Err(ClassroomError::invalid(
                    "batch",
                    "There is no pending enrollment for student, Student should be approved for enrollment",
                ))
            }
        }

        let fee = batch
            .fee_structure
            .as_ref()
            .ok_or_else(|| ClassroomError::invalid("batch", "This batch has no fee structure."))?;
        if request.installment_number < 1 || request.installment_number > fee.installments {
            return Err(ClassroomError::invalid("installment_number", "Invalid installment number."));
        }

        let expected = fee_breakdown(fee.fee_amount, Decimal::ZERO, None, &self.fees).total_amount;
        if expected != request.amount {
            return Err(ClassroomError::invalid(
                "amount",
                format!("The amount is required for batch installment is {expected} not matching"),
            ));
        }

        let already_paid = self
            .storage
            .batch_orders(request.student, Some(batch.id))
            .await?
            .iter()
            .any(|o| o.installment_number == request.installment_number && o.is_paid);
        if already_paid {
            return Err(ClassroomError::invalid(
                "batch",
                "Student already paid amount for this installment",
            ));
        }

        let order = self
            .storage
            .record_offline_payment(&OfflinePayment {
                student_id: request.student,
                batch_id: batch.id,
                installment_number: request.installment_number,
                amount: request.amount,
                reference_number: request.reference_number,
            })
            .await?;
        info!(
            "Offline installment {} recorded for student {} in batch {}",
            order.installment_number, order.student_id, order.batch_id
        );
        Ok(order)
    }

    /// Paid, overdue and upcoming installments across the student's batches.
    pub async fn fee_schedule(&self, student: &User) -> Result<FeeSchedule> {
        let now = Utc::now();
        let mut schedule = FeeSchedule::default();
        let orders = self.storage.batch_orders(student.id, None).await?;

        let mut names = std::collections::HashMap::new();
        for order in orders.iter().filter(|o| o.is_paid) {
            if !names.contains_key(&order.batch_id) {
                let name = self
                    .storage
                    .get_batch(order.batch_id)
                    .await?
                    .map(|b| b.name)
                    .unwrap_or_default();
                names.insert(order.batch_id, name);
            }
            schedule.paid_fees.push(PaidFee {
                batch_id: order.batch_id,
                batch_name: names.get(&order.batch_id).cloned().unwrap_or_default(),
                installment_number: order.installment_number,
                amount: order.amount,
                payment_date: order.payment_date,
            });
        }

        for enrollment in self.storage.student_enrollments(student.id).await? {
            if !enrollment.is_approved {
                continue;
            }
            let Some(batch) = self.storage.get_batch(enrollment.batch_id).await? else {
                continue;
            };
            let Some(fee) = batch.fee_structure.as_ref() else {
                continue;
            };
            let recorded: HashSet<u32> = orders
                .iter()
                .filter(|o| o.batch_id == batch.id)
                .map(|o| o.installment_number)
                .collect();
            let joined = enrollment.batch_joined_date.unwrap_or(enrollment.created);

            for due in outstanding_installments(joined, fee, &recorded, now)? {
                let entry = DueFee {
                    batch_id: batch.id,
                    batch_name: batch.name.clone(),
                    installment_number: due.installment_number,
                    amount: due.amount,
                    due_date: due.due_date,
                };
                match due.state {
                    InstallmentState::Overdue => schedule.unpaid_fees.push(entry),
                    InstallmentState::Upcoming => schedule.upcoming_fees.push(entry),
                }
            }
        }
        Ok(schedule)
    }
}
