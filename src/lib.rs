//! fxdesk - currency exchange back-office engine
//!
//! Order commissions and settlement for multi-tenant exchange houses: a
//! single-entry cash ledger per operator and payment method (every movement
//! records the balance before and after it), commission quoting and
//! reconciliation, the order lifecycle, and platform commission payouts.

pub mod config;
pub mod domain;
pub mod persistence;
