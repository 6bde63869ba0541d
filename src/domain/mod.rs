//! Entities and the business rules that need no I/O.

pub mod catalog;
pub mod coupon;
pub mod enrollment;
pub mod live_class;
pub mod notification;
pub mod payment;
pub mod pricing;
pub mod user;
