use crate::domain::coupon::{Coupon, CouponInput};
use crate::domain::user::User;
use crate::error::{ClassroomError, Result};
use crate::storage::Storage;
use std::sync::Arc;
use tracing::info;

/// Administrator management of discount coupons.
pub struct CouponUseCase {
    storage: Arc<dyn Storage>,
}

impl CouponUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn create(&self, admin: &User, input: CouponInput) -> Result<Coupon> {
        let input = input.validated()?;
        let coupon = self.storage.create_coupon(&input, admin.id).await?;
        info!("Coupon {} created by {}", coupon.code, admin.id);
        Ok(coupon)
    }

    pub async fn list(&self) -> Result<Vec<Coupon>> {
        self.storage.list_coupons().await
    }

    pub async fn get(&self, id: i64) -> Result<Coupon> {
        self.storage
            .get_coupon(id)
            .await?
            .ok_or_else(|| ClassroomError::not_found("Not found."))
    }

    /// Used coupons are frozen.
    pub async fn update(&self, id: i64, input: CouponInput) -> Result<Coupon> {
        let existing = self.get(id).await?;
        if existing.total_applied > 0 {
            return Err(ClassroomError::non_field(
                "This coupon has already been used and cannot be modified.",
            ));
        }
        let input = input.validated()?;
        self.storage
            .update_coupon(id, &input)
            .await?
            .ok_or_else(|| ClassroomError::not_found("Not found."))
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let existing = self.get(id).await?;
        if existing.total_applied > 0 {
            return Err(ClassroomError::non_field(
                "This coupon has already been used and cannot be deleted.",
            ));
        }
        self.storage.delete_coupon(id).await?;
        info!("Coupon {} deleted", existing.code);
        Ok(())
    }
}
