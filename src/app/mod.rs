pub mod ports;
pub mod auth_use_case;
pub mod catalog_use_case;
pub mod coupon_use_case;
pub mod enrollment_use_case;
pub mod live_class_use_case;
pub mod notification_use_case;
pub mod payment_use_case;
