use crate::domain::pricing::{course_effective_price, test_series_effective_price};
use crate::error::{ClassroomError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const BATCH_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const BATCH_CODE_LEN: usize = 8;

/// GST slabs a course may be configured with.
pub const COURSE_TAX_SLABS: [i64; 4] = [0, 5, 18, 25];

pub fn generate_batch_code() -> String {
    let mut rng = rand::thread_rng();
    (0..BATCH_CODE_LEN)
        .map(|_| BATCH_CODE_CHARSET[rng.gen_range(0..BATCH_CODE_CHARSET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidityType {
    #[default]
    Single,
    Multiple,
    Lifetime,
    ExpiryDate,
}

impl ValidityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidityType::Single => "single",
            ValidityType::Multiple => "multiple",
            ValidityType::Lifetime => "lifetime",
            ValidityType::ExpiryDate => "expiry_date",
        }
    }
}

impl FromStr for ValidityType {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(ValidityType::Single),
            "multiple" => Ok(ValidityType::Multiple),
            "lifetime" => Ok(ValidityType::Lifetime),
            "expiry_date" => Ok(ValidityType::ExpiryDate),
            other => Err(ClassroomError::invalid("validity_type", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[default]
    Days,
    Months,
    Years,
}

impl DurationUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationUnit::Days => "days",
            DurationUnit::Months => "months",
            DurationUnit::Years => "years",
        }
    }
}

impl FromStr for DurationUnit {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "days" => Ok(DurationUnit::Days),
            "months" => Ok(DurationUnit::Months),
            "years" => Ok(DurationUnit::Years),
            other => Err(ClassroomError::invalid("duration_unit", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub thumbnail: String,
    pub price: Option<Decimal>,
    pub discount: Decimal,
    pub effective_price: Option<Decimal>,
    pub validity_type: ValidityType,
    pub duration_value: Option<i64>,
    pub duration_unit: DurationUnit,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_published: bool,
    pub is_featured: bool,
    /// GST slab; `None` means the platform default applies
    pub tax_percent: Option<i64>,
    pub internet_handling_charges: bool,
    pub created_by: i64,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: String,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub validity_type: ValidityType,
    pub duration_value: Option<i64>,
    #[serde(default)]
    pub duration_unit: DurationUnit,
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub is_featured: bool,
    pub tax_percent: Option<i64>,
    #[serde(default)]
    pub internet_handling_charges: bool,
}

impl CourseInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ClassroomError::invalid("name", "This field may not be blank."));
        }
        if let Some(price) = self.price {
            if price.is_sign_negative() {
                return Err(ClassroomError::invalid("price", "Ensure this value is greater than or equal to 0."));
            }
        }
        if self.discount.is_sign_negative() || self.discount > Decimal::ONE_HUNDRED {
            return Err(ClassroomError::invalid("discount", "Discount must be a percentage between 0 and 100."));
        }
        if let Some(tax) = self.tax_percent {
            if !COURSE_TAX_SLABS.contains(&tax) {
                return Err(ClassroomError::invalid("tax_percent", format!("\"{tax}\" is not a valid choice.")));
            }
        }
        match self.validity_type {
            ValidityType::Single | ValidityType::Multiple if self.duration_value.unwrap_or(0) <= 0 => Err(
                ClassroomError::invalid("duration_value", "This field is required for the selected validity."),
            ),
            ValidityType::ExpiryDate if self.expiry_date.is_none() => Err(ClassroomError::invalid(
                "expiry_date",
                "This field is required for the selected validity.",
            )),
            _ => Ok(()),
        }
    }

    pub fn effective_price(&self) -> Option<Decimal> {
        course_effective_price(self.price, self.discount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl FromStr for Frequency {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(ClassroomError::invalid("frequency", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

/// Installment plan attached to a batch: `installments` payments of
/// `fee_amount`, one every `number_of_values` weeks or months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeStructure {
    pub structure_name: String,
    pub fee_amount: Decimal,
    pub installments: u32,
    pub frequency: Option<Frequency>,
    #[serde(default = "default_interval")]
    pub number_of_values: u32,
}

fn default_interval() -> u32 {
    1
}

/// Upper bound on the number of installments in one fee structure.
pub const MAX_INSTALLMENTS: u32 = 60;
/// Upper bound on the gap between installments, in weeks or months.
pub const MAX_INSTALLMENT_INTERVAL: u32 = 52;

impl FeeStructure {
    pub fn total_amount(&self) -> Decimal {
        self.fee_amount * Decimal::from(self.installments)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fee_amount <= Decimal::ZERO {
            return Err(ClassroomError::invalid("fee_amount", "Ensure this value is greater than 0."));
        }
        if self.installments == 0 {
            return Err(ClassroomError::invalid("installments", "Ensure this value is greater than 0."));
        }
        if self.installments > MAX_INSTALLMENTS {
            return Err(ClassroomError::invalid(
                "installments",
                format!("Ensure this value is less than or equal to {MAX_INSTALLMENTS}."),
            ));
        }
        if self.number_of_values == 0 {
            return Err(ClassroomError::invalid("number_of_values", "Ensure this value is greater than 0."));
        }
        if self.number_of_values > MAX_INSTALLMENT_INTERVAL {
            return Err(ClassroomError::invalid(
                "number_of_values",
                format!("Ensure this value is less than or equal to {MAX_INSTALLMENT_INTERVAL}."),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: i64,
    pub name: String,
    pub batch_code: String,
    pub start_date: NaiveDate,
    pub subject: String,
    pub live_class_link: Option<String>,
    pub thumbnail: Option<String>,
    pub is_published: bool,
    pub fee_structure: Option<FeeStructure>,
    pub created_by: i64,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchInput {
    pub name: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub subject: String,
    pub live_class_link: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    pub fee_structure: Option<FeeStructure>,
}

impl BatchInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ClassroomError::invalid("name", "This field may not be blank."));
        }
        if let Some(link) = &self.live_class_link {
            if !(link.starts_with("http://") || link.starts_with("https://")) {
                return Err(ClassroomError::invalid("live_class_link", "Enter a valid URL."));
            }
        }
        if let Some(fs) = &self.fee_structure {
            fs.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSeries {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub price: Decimal,
    pub discounted_price: Decimal,
    pub effective_price: Decimal,
    pub is_digital: bool,
    pub url: Option<String>,
    pub highlights: Vec<String>,
    pub is_published: bool,
    pub gst: i64,
    pub created_by: Option<i64>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestSeriesInput {
    pub name: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub discounted_price: Decimal,
    #[serde(default)]
    pub is_digital: bool,
    pub url: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default = "default_test_series_gst")]
    pub gst: i64,
}

fn default_test_series_gst() -> i64 {
    18
}

impl TestSeriesInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ClassroomError::invalid("name", "This field may not be blank."));
        }
        if self.price.is_sign_negative() || self.discounted_price.is_sign_negative() {
            return Err(ClassroomError::invalid("price", "Ensure this value is greater than or equal to 0."));
        }
        if !self.price.is_zero() && self.discounted_price > self.price {
            return Err(ClassroomError::invalid(
                "discounted_price",
                "Discounted price cannot exceed the price.",
            ));
        }
        if !(0..=100).contains(&self.gst) {
            return Err(ClassroomError::invalid("gst", "GST must be between 0 and 100."));
        }
        Ok(())
    }

    pub fn effective_price(&self) -> Decimal {
        test_series_effective_price(self.price, self.discounted_price)
    }
}
