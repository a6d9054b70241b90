//! Scoring and settlement engine for a round-based soccer prediction
//! pool: predictions are admitted while a match is open, scored when it
//! finishes, and every points mutation flows through the settlement
//! layer so user totals always match the sum of their predictions.

pub mod admission;
pub mod auth;
pub mod bonus;
pub mod error;
pub mod ledger;
pub mod model;
pub mod persist;
pub mod scoring;
pub mod settlement;
pub mod sqlite_store;
pub mod store;
pub mod views;
