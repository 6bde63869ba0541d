use crate::error::{ClassroomError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Class lifecycle codes reported by the live video provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassStatus {
    #[serde(rename = "up")]
    Scheduled,
    #[serde(rename = "lv")]
    Live,
    #[serde(rename = "cp")]
    Ended,
    #[serde(rename = "cl")]
    Cancelled,
    #[serde(rename = "ex")]
    Expired,
}

impl ClassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassStatus::Scheduled => "up",
            ClassStatus::Live => "lv",
            ClassStatus::Ended => "cp",
            ClassStatus::Cancelled => "cl",
            ClassStatus::Expired => "ex",
        }
    }
}

impl FromStr for ClassStatus {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(ClassStatus::Scheduled),
            "lv" => Ok(ClassStatus::Live),
            "cp" => Ok(ClassStatus::Ended),
            "cl" => Ok(ClassStatus::Cancelled),
            "ex" => Ok(ClassStatus::Expired),
            other => Err(ClassroomError::invalid("status", format!("Unknown class status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveClass {
    pub id: i64,
    pub batch_id: i64,
    pub title: String,
    pub class_id: String,
    pub date: DateTime<Utc>,
    pub status: ClassStatus,
    pub host_link: Option<String>,
    pub common_host_link: Option<String>,
    pub common_moderator_link: Option<String>,
    pub common_participant_link: Option<String>,
    pub recording_url: Option<String>,
    pub recording_status: Option<String>,
    pub duration: Option<i64>,
    pub created: DateTime<Utc>,
}

/// Fields filled in once the provider has scheduled the class.
#[derive(Debug, Clone)]
pub struct NewLiveClass {
    pub batch_id: i64,
    pub title: String,
    pub class_id: String,
    pub date: DateTime<Utc>,
    pub host_link: String,
    pub common_host_link: String,
    pub common_moderator_link: String,
    pub common_participant_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendance {
    pub id: i64,
    pub student_id: i64,
    pub live_class_id: i64,
    pub attended: bool,
    pub analytics: Option<Value>,
    pub browser: Option<String>,
    pub ip: Option<String>,
    pub os: Option<String>,
    pub start_time: Option<String>,
    pub total_time: Option<i64>,
}

/// One participant entry of an attendance report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub user_id: String,
    #[serde(default)]
    pub analytics: Option<Value>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub total_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingUpdate {
    pub class_id: String,
    pub url: Option<String>,
    pub status: Option<String>,
    pub duration: Option<i64>,
}

/// Callback events pushed by the live video provider.
#[derive(Debug, Clone)]
pub enum ClassEvent {
    Status { class_id: String, status: ClassStatus },
    Attendance { class_id: String, entries: Vec<AttendanceEntry> },
    Recording(RecordingUpdate),
    Files { class_id: String },
    Chats { class_id: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    class_id: String,
    status: ClassStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceBody {
    class_id: String,
    #[serde(default)]
    attendance: Vec<AttendanceEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassRef {
    #[serde(default)]
    class_id: String,
}

impl ClassEvent {
    /// Dispatch on `requestType`; anything unrecognised is rejected.
    pub fn parse(body: Value) -> Result<Self> {
        let request_type = body
            .get("requestType")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let event = match request_type.as_str() {
            "classStatus" => {
                let b: StatusBody = serde_json::from_value(body)?;
                ClassEvent::Status {
                    class_id: b.class_id,
                    status: b.status,
                }
            }
            "attendance" => {
                let b: AttendanceBody = serde_json::from_value(body)?;
                ClassEvent::Attendance {
                    class_id: b.class_id,
                    entries: b.attendance,
                }
            }
            "recording" => ClassEvent::Recording(serde_json::from_value(body)?),
            "classFiles" => ClassEvent::Files {
                class_id: serde_json::from_value::<ClassRef>(body)?.class_id,
            },
            "chats" => ClassEvent::Chats {
                class_id: serde_json::from_value::<ClassRef>(body)?.class_id,
            },
            _ => return Err(ClassroomError::invalid("message", "Unknown request type")),
        };
        Ok(event)
    }

    pub fn ack_message(&self) -> &'static str {
        match self {
            ClassEvent::Status { .. } => "Class status processed",
            ClassEvent::Attendance { .. } => "Attendance data processed",
            ClassEvent::Recording(_) => "Recording processed",
            ClassEvent::Files { .. } => "Class files processed",
            ClassEvent::Chats { .. } => "Chat data processed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_class_status() {
        let event = ClassEvent::parse(json!({
            "requestType": "classStatus",
            "classId": "c-1",
            "status": "lv"
        }))
        .unwrap();
        assert!(matches!(event, ClassEvent::Status { ref class_id, status: ClassStatus::Live } if class_id == "c-1"));
        assert_eq!(event.ack_message(), "Class status processed");
    }

    #[test]
    fn test_parse_attendance() {
        let event = ClassEvent::parse(json!({
            "requestType": "attendance",
            "classId": "c-1",
            "attendance": [
                {"userId": "m-9", "browser": "firefox", "totalTime": 3120, "startTime": "2024-05-01T10:00:00Z"}
            ]
        }))
        .unwrap();
        match event {
            ClassEvent::Attendance { entries, .. } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].user_id, "m-9");
                assert_eq!(entries[0].total_time, Some(3120));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_unknown_request_type() {
        let err = ClassEvent::parse(json!({"requestType": "poll"})).unwrap_err();
        assert!(matches!(err, ClassroomError::Validation { ref message, .. } if message == "Unknown request type"));
        assert!(ClassEvent::parse(json!({})).is_err());
    }
}
