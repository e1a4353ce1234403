//! Gymledger - payment and fulfillment reconciliation engine for a gym backend
//!
//! This library accepts money through four rails (cash, in-person card, bank
//! transfer with manual proof, and an external card gateway), drives every
//! payment through a shared state machine, and triggers dependent effects
//! (membership activation, order fulfillment, ledger entries) exactly once
//! per completed payment.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod orders;
