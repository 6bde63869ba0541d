use crate::domain::catalog::{FeeStructure, Frequency};
use crate::error::{ClassroomError, Result};
use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub batch_id: i64,
    pub student_id: i64,
    pub is_approved: bool,
    pub approved_by: Option<i64>,
    pub batch_joined_date: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

/// One installment of a batch fee, paid online or recorded offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPurchaseOrder {
    pub id: i64,
    pub student_id: i64,
    pub batch_id: i64,
    pub installment_number: u32,
    pub amount: Decimal,
    pub is_paid: bool,
    pub payment_date: Option<DateTime<Utc>>,
    pub transaction_id: Option<i64>,
    pub reference_number: Option<String>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallmentState {
    Overdue,
    Upcoming,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentDue {
    pub installment_number: u32,
    pub amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub state: InstallmentState,
}

/// Due date of installment `n` (1-based) for a student who joined at `joined`.
///
/// Fails when the date falls outside the representable range, which only
/// happens for fee structures stored before their bounds were enforced.
pub fn installment_due_date(joined: DateTime<Utc>, n: u32, fee: &FeeStructure) -> Result<DateTime<Utc>> {
    let steps = n.saturating_sub(1);
    let due = match fee.frequency {
        Some(Frequency::Weekly) => steps
            .checked_mul(fee.number_of_values)
            .and_then(|weeks| Duration::try_weeks(i64::from(weeks)))
            .and_then(|gap| joined.checked_add_signed(gap)),
        Some(Frequency::Monthly) => steps
            .checked_mul(fee.number_of_values)
            .and_then(|months| joined.checked_add_months(Months::new(months))),
        None => joined.checked_add_months(Months::new(steps)),
    };
    due.ok_or_else(|| ClassroomError::invalid("number_of_values", "Installment due date is out of range."))
}

/// Installments with no purchase order yet, split by whether they are past due.
pub fn outstanding_installments(
    joined: DateTime<Utc>,
    fee: &FeeStructure,
    recorded: &HashSet<u32>,
    now: DateTime<Utc>,
) -> Result<Vec<InstallmentDue>> {
    (1..=fee.installments)
        .filter(|n| !recorded.contains(n))
        .map(|n| {
            let due_date = installment_due_date(joined, n, fee)?;
            Ok(InstallmentDue {
                installment_number: n,
                amount: fee.fee_amount,
                due_date,
                state: if due_date < now {
                    InstallmentState::Overdue
                } else {
                    InstallmentState::Upcoming
                },
            })
        })
        .collect()
}
