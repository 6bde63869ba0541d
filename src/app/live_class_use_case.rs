use crate::app::ports::{ClassSchedule, LiveUser, LiveVideoPort, ParticipantControl, RecordingOptions};
use crate::domain::live_class::{Attendance, ClassEvent, ClassStatus, LiveClass, NewLiveClass};
use crate::domain::user::User;
use crate::error::{ClassroomError, Result};
use crate::metrics::PaymentMetrics;
use crate::storage::Storage;
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CLASS_MINUTES: u32 = 60;

pub struct LiveClassUseCase {
    storage: Arc<dyn Storage>,
    video: Arc<dyn LiveVideoPort>,
    time_zone: String,
}

impl LiveClassUseCase {
    pub fn new(storage: Arc<dyn Storage>, video: Arc<dyn LiveVideoPort>, time_zone: String) -> Self {
        Self {
            storage,
            video,
            time_zone,
        }
    }

    /// Provider user id for `host`, registering them on first use.
    async fn host_id(&self, host: &User) -> Result<String> {
        if let Some(id) = &host.merit_user_id {
            return Ok(id.clone());
        }
        let id = self
            .video
            .create_user(&LiveUser {
                name: host.full_name.clone(),
                email: host.email.clone(),
                client_user_id: host.id.to_string(),
                role: "C".to_string(),
                time_zone: self.time_zone.clone(),
                permission: "CC".to_string(),
            })
            .await?;
        self.storage.set_merit_user_id(host.id, &id).await?;
        Ok(id)
    }

    /// Start a one-hour class for `batch_id` hosted by `host`.
    pub async fn schedule(&self, host: &User, batch_id: i64, title: &str) -> Result<LiveClass> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ClassroomError::non_field("Batch ID and title are required."));
        }
        if self.storage.get_batch(batch_id).await?.is_none() {
            return Err(ClassroomError::invalid(
                "batch_id",
                format!("Batch with id {batch_id} does not exist"),
            ));
        }

        let host_id = self.host_id(host).await?;
        let start = Utc::now();
        let end = start + Duration::minutes(i64::from(CLASS_MINUTES));
        let schedule = ClassSchedule {
            title: title.to_string(),
            start_time: start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end_date: end.to_rfc3339_opts(SecondsFormat::Secs, true),
            duration: CLASS_MINUTES,
            lang: "en".to_string(),
            time_zone_id: self.time_zone.clone(),
            description: "This is a scheduled class.".to_string(),
            class_type: "oneTime".to_string(),
            access: "private".to_string(),
            login: false,
            layout: "CR".to_string(),
            status: "up".to_string(),
            recording: RecordingOptions {
                record: true,
                auto_record: false,
                recording_control: true,
            },
            participant_control: ParticipantControl {
                write: false,
                audio: false,
                video: false,
            },
            schedule: Vec::new(),
            total_classes: 1,
        };
        let scheduled = self.video.schedule_class(&host_id, &schedule).await?;

        let class = self
            .storage
            .create_live_class(&NewLiveClass {
                batch_id,
                title: schedule.title,
                class_id: scheduled.class_id,
                date: start,
                host_link: scheduled.host_link,
                common_host_link: scheduled.common_host_link,
                common_moderator_link: scheduled.common_moderator_link,
                common_participant_link: scheduled.common_participant_link,
            })
            .await?;
        info!("Live class {} scheduled for batch {}", class.class_id, batch_id);

        let students = self.storage.approved_student_ids(batch_id).await?;
        let merit_ids: Vec<String> = self
            .storage
            .get_users(&students)
            .await?
            .into_iter()
            .filter_map(|u| u.merit_user_id)
            .collect();
        if !merit_ids.is_empty() {
            if let Err(e) = self.video.add_users(&class.class_id, &merit_ids).await {
                warn!("Could not add {} students to class {}: {}", merit_ids.len(), class.class_id, e);
            }
        }
        Ok(class)
    }

    pub async fn list(&self, batch_id: i64) -> Result<Vec<LiveClass>> {
        self.storage.list_live_classes(batch_id).await
    }

    async fn require_access(&self, student: &User, batch_id: i64) -> Result<()> {
        if self.storage.has_batch_access(student.id, batch_id).await? {
            Ok(())
        } else {
            Err(ClassroomError::PermissionDenied(
                "You do not have access to this batch.".to_string(),
            ))
        }
    }

    pub async fn student_classes(&self, student: &User, batch_id: i64) -> Result<Vec<LiveClass>> {
        self.require_access(student, batch_id).await?;
        self.storage.list_live_classes(batch_id).await
    }

    pub async fn student_attendance(&self, student: &User, batch_id: i64) -> Result<Vec<Attendance>> {
        self.require_access(student, batch_id).await?;
        self.storage.student_attendance(student.id, batch_id).await
    }

    pub async fn cancel(&self, class_id: &str) -> Result<()> {
        if self.storage.find_live_class(class_id).await?.is_none() {
            return Err(ClassroomError::not_found("Not found."));
        }
        self.video.delete_class(class_id).await?;
        self.storage.set_class_status(class_id, ClassStatus::Cancelled).await?;
        info!("Live class {} cancelled", class_id);
        Ok(())
    }

    pub async fn remove_students(&self, class_id: &str, student_ids: &[i64]) -> Result<()> {
        if self.storage.find_live_class(class_id).await?.is_none() {
            return Err(ClassroomError::not_found("Not found."));
        }
        let merit_ids: Vec<String> = self
            .storage
            .get_users(student_ids)
            .await?
            .into_iter()
            .filter_map(|u| u.merit_user_id)
            .collect();
        if merit_ids.is_empty() {
            return Ok(());
        }
        self.video.remove_users(class_id, &merit_ids).await
    }

    /// Apply a provider callback and return the acknowledgement text.
    pub async fn handle_webhook(&self, body: Value) -> Result<&'static str> {
        PaymentMetrics::webhook_received("merithub");
        let event = ClassEvent::parse(body)?;
        match &event {
            ClassEvent::Status { class_id, status } => {
                if !self.storage.set_class_status(class_id, *status).await? {
                    warn!("Live class {} not found", class_id);
                }
            }
            ClassEvent::Attendance { class_id, entries } => {
                let Some(class) = self.storage.find_live_class(class_id).await? else {
                    warn!("Live class {} not found", class_id);
                    return Ok(event.ack_message());
                };
                for entry in entries {
                    match self.storage.find_user_by_merit_id(&entry.user_id).await? {
                        Some(user) => self.storage.upsert_attendance(user.id, class.id, entry).await?,
                        None => debug!("No user for provider id {}", entry.user_id),
                    }
                }
            }
            ClassEvent::Recording(update) => {
                if !self.storage.set_recording(update).await? {
                    warn!("Live class {} not found", update.class_id);
                }
            }
            ClassEvent::Files { class_id } | ClassEvent::Chats { class_id } => {
                debug!("Acknowledged {} for class {}", event.ack_message(), class_id);
            }
        }
        Ok(event.ack_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::ScheduledClass;
    use crate::domain::catalog::BatchInput;
    use crate::domain::user::NewUser;
    use crate::storage::SqliteStorage;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeVideo {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LiveVideoPort for FakeVideo {
        async fn create_user(&self, user: &LiveUser) -> Result<String> {
            self.calls.lock().unwrap().push(format!("create_user {}", user.client_user_id));
            Ok(format!("m-{}", user.client_user_id))
        }

        async fn schedule_class(&self, host_user_id: &str, _class: &ClassSchedule) -> Result<ScheduledClass> {
            self.calls.lock().unwrap().push(format!("schedule {host_user_id}"));
            Ok(ScheduledClass {
                class_id: "class-1".into(),
                host_link: "h".into(),
                common_host_link: "ch".into(),
                common_moderator_link: "cm".into(),
                common_participant_link: "cp".into(),
            })
        }

        async fn add_users(&self, _class_id: &str, user_ids: &[String]) -> Result<()> {
            self.calls.lock().unwrap().push(format!("add {}", user_ids.join(",")));
            Ok(())
        }

        async fn remove_users(&self, _class_id: &str, _user_ids: &[String]) -> Result<()> {
            Ok(())
        }

        async fn delete_class(&self, class_id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("delete {class_id}"));
            Ok(())
        }
    }

    async fn setup() -> (LiveClassUseCase, Arc<SqliteStorage>, Arc<FakeVideo>, User, i64) {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let video = Arc::new(FakeVideo::default());
        let teacher = storage
            .create_user(&NewUser::student("t@example.com", "9000000021", "Teacher"))
            .await
            .unwrap();
        let batch = storage
            .create_batch(
                &BatchInput {
                    name: "Live".into(),
                    start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    subject: String::new(),
                    live_class_link: None,
                    thumbnail: None,
                    is_published: true,
                    fee_structure: None,
                },
                "LIVE0001",
                teacher.id,
            )
            .await
            .unwrap();
        let use_case = LiveClassUseCase::new(storage.clone(), video.clone(), "Asia/Kolkata".into());
        (use_case, storage, video, teacher, batch.id)
    }

    #[tokio::test]
    async fn test_schedule_registers_host_once() {
        let (use_case, storage, video, teacher, batch_id) = setup().await;
        use_case.schedule(&teacher, batch_id, "Algebra").await.unwrap();

        let teacher = storage.get_user(teacher.id).await.unwrap().unwrap();
        assert_eq!(teacher.merit_user_id.as_deref(), Some(&*format!("m-{}", teacher.id)));
        let calls = video.calls.lock().unwrap().clone();
        assert_eq!(calls.iter().filter(|c| c.starts_with("create_user")).count(), 1);
        assert_eq!(use_case.list(batch_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_updates_status_and_attendance() {
        let (use_case, storage, _, teacher, batch_id) = setup().await;
        let student = storage
            .create_user(&NewUser::student("s@example.com", "9000000022", "S"))
            .await
            .unwrap();
        storage.set_merit_user_id(student.id, "m-student").await.unwrap();
        storage.ensure_approved_enrollment(batch_id, student.id, teacher.id).await.unwrap();
        use_case.schedule(&teacher, batch_id, "Algebra").await.unwrap();

        let ack = use_case
            .handle_webhook(json!({"requestType": "classStatus", "classId": "class-1", "status": "cp"}))
            .await
            .unwrap();
        assert_eq!(ack, "Class status processed");
        assert_eq!(use_case.list(batch_id).await.unwrap()[0].status, ClassStatus::Ended);

        let ack = use_case
            .handle_webhook(json!({
                "requestType": "attendance",
                "classId": "class-1",
                "attendance": [{"userId": "m-student", "totalTime": 1800}, {"userId": "m-unknown"}]
            }))
            .await
            .unwrap();
        assert_eq!(ack, "Attendance data processed");
        let student = storage.get_user(student.id).await.unwrap().unwrap();
        let attendance = use_case.student_attendance(&student, batch_id).await.unwrap();
        assert_eq!(attendance.len(), 1);
        assert_eq!(attendance[0].total_time, Some(1800));
    }

    #[tokio::test]
    async fn test_student_without_access_is_denied() {
        let (use_case, storage, _, _, batch_id) = setup().await;
        let outsider = storage
            .create_user(&NewUser::student("o@example.com", "9000000023", "O"))
            .await
            .unwrap();
        let err = use_case.student_classes(&outsider, batch_id).await.unwrap_err();
        assert!(matches!(err, ClassroomError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_cancel_marks_class_cancelled() {
        let (use_case, _, video, teacher, batch_id) = setup().await;
        use_case.schedule(&teacher, batch_id, "Algebra").await.unwrap();
        use_case.cancel("class-1").await.unwrap();
        assert_eq!(use_case.list(batch_id).await.unwrap()[0].status, ClassStatus::Cancelled);
        assert!(video.calls.lock().unwrap().contains(&"delete class-1".to_string()));
        assert!(matches!(use_case.cancel("missing").await, Err(ClassroomError::NotFound(_))));
    }
}
