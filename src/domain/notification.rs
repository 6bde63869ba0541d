use crate::error::{ClassroomError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Who a push notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criteria {
    Course,
    Batch,
    Student,
    General,
}

impl Criteria {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criteria::Course => "course",
            Criteria::Batch => "batch",
            Criteria::Student => "student",
            Criteria::General => "general",
        }
    }
}

impl FromStr for Criteria {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "course" => Ok(Criteria::Course),
            "batch" => Ok(Criteria::Batch),
            "student" => Ok(Criteria::Student),
            "general" => Ok(Criteria::General),
            other => Err(ClassroomError::invalid("criteria", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub message: String,
    pub criteria: Criteria,
    pub course: Option<i64>,
    pub batch: Option<i64>,
    #[serde(default)]
    pub student_ids: Vec<i64>,
}

impl NotificationRequest {
    /// Each criteria needs its own target field.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ClassroomError::invalid("title", "This field may not be blank."));
        }
        if self.title.chars().count() > 255 {
            return Err(ClassroomError::invalid(
                "title",
                "Ensure this field has no more than 255 characters.",
            ));
        }
        if self.message.trim().is_empty() {
            return Err(ClassroomError::invalid("message", "This field may not be blank."));
        }
        match self.criteria {
            Criteria::Course if self.course.is_none() => Err(ClassroomError::invalid(
                "course",
                "This field is required for 'course' criteria.",
            )),
            Criteria::Batch if self.batch.is_none() => Err(ClassroomError::invalid(
                "batch",
                "This field is required for 'batch' criteria.",
            )),
            Criteria::Student if self.student_ids.is_empty() => Err(ClassroomError::invalid(
                "student_ids",
                "This field is required for 'student' criteria.",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotification {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub criteria: Criteria,
    pub course_id: Option<i64>,
    pub batch_id: Option<i64>,
    pub student_ids: Vec<i64>,
    pub sent_at: DateTime<Utc>,
    pub sender_id: Option<i64>,
}

/// Notification as shown in the admin list.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: PushNotification,
    pub course_title: Option<String>,
    pub batch_title: Option<String>,
    pub student_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub user_id: i64,
    pub registration_id: String,
    pub active: bool,
}
