pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

// Entities and pure business rules
pub mod domain;

// Persistence
pub mod storage;

// Use cases and the outbound ports they depend on
pub mod app;

// Port adapters for external services
pub mod infra;

// HTTP router, extractors and handlers
pub mod api;
