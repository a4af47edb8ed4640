//! Complaint ledger core.
//!
//! Anchors citizen complaints on an external chain registry, keeps a local
//! SQLite mirror for fast lookup, and feeds confirmed department labels back
//! into an incremental classifier.
//!
//! Components, leaves first:
//!   - `ledger`      chain client (reads, signed writes, fee policy)
//!   - `store`       local mirror store
//!   - `classifier`  incremental department classifier
//!   - `engine`      submission and lookup orchestration
//!   - `reconcile`   pure merge of mirror and ledger answers

pub mod classifier;
pub mod clock;
pub mod complaint;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod ledger;
pub mod reconcile;
pub mod rng;
pub mod store;
pub mod types;
