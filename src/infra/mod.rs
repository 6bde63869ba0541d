//! Adapters for the outbound ports in [`crate::app::ports`].

pub mod fcm;
pub mod jwt;
pub mod merithub;
pub mod razorpay;
pub mod textlocal;
pub mod totp;
