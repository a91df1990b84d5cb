//! Order lifecycle and multi-vendor wallet ledger for a marketplace.
//!
//! Orders move through a role-checked state machine; vendor revenue is
//! credited as pending at placement, released on delivery and reversed on
//! cancellation, with every balance change recorded in an append-only log.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
