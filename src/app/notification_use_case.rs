use crate::app::ports::PushPort;
use crate::domain::notification::{Criteria, Device, NotificationRequest, NotificationView, PushNotification};
use crate::domain::user::User;
use crate::error::{ClassroomError, Result};
use crate::storage::Storage;
use std::sync::Arc;
use tracing::{info, warn};

pub struct NotificationUseCase {
    storage: Arc<dyn Storage>,
    push: Arc<dyn PushPort>,
}

impl NotificationUseCase {
    pub fn new(storage: Arc<dyn Storage>, push: Arc<dyn PushPort>) -> Self {
        Self { storage, push }
    }

    /// Push to every device the criteria selects and keep a record of it.
    pub async fn send(&self, sender: &User, request: NotificationRequest) -> Result<PushNotification> {
        request.validate()?;

        let recipients: Option<Vec<i64>> = match request.criteria {
            Criteria::Course => {
                let course_id = request.course.unwrap_or_default();
                if self.storage.get_course(course_id).await?.is_none() {
                    return Err(ClassroomError::invalid(
                        "course",
                        "Course with the given ID does not exist.",
                    ));
                }
                Some(self.storage.course_buyer_ids(course_id).await?)
            }
            Criteria::Batch => {
                let batch_id = request.batch.unwrap_or_default();
                if self.storage.get_batch(batch_id).await?.is_none() {
                    return Err(ClassroomError::invalid(
                        "batch",
                        "Batch with the given ID does not exist.",
                    ));
                }
                Some(self.storage.approved_student_ids(batch_id).await?)
            }
            Criteria::Student => Some(request.student_ids.clone()),
            Criteria::General => None,
        };

        let tokens = match &recipients {
            Some(ids) if ids.is_empty() => Vec::new(),
            Some(ids) => self.storage.active_device_tokens(Some(ids)).await?,
            None => self.storage.active_device_tokens(None).await?,
        };

        if tokens.is_empty() {
            info!("No active devices for '{}' notification", request.criteria.as_str());
        } else {
            match self.push.send(&tokens, &request.title, &request.message).await {
                Ok(report) => info!(
                    "Notification '{}' pushed: {} delivered, {} failed",
                    request.title, report.success, report.failure
                ),
                Err(e) => warn!("Push delivery failed for '{}': {}", request.title, e),
            }
        }

        self.storage.create_notification(&request, sender.id).await
    }

    pub async fn register_device(&self, user: &User, registration_id: &str) -> Result<Device> {
        let registration_id = registration_id.trim();
        if registration_id.is_empty() {
            return Err(ClassroomError::invalid("registration_id", "This field may not be blank."));
        }
        self.storage.register_device(user.id, registration_id).await
    }

    pub async fn list(&self) -> Result<Vec<NotificationView>> {
        self.storage.list_notifications().await
    }
}
