pub mod commission_calculator;
pub mod commission_payouts;
pub mod ledger_store;
pub mod order_lifecycle;
pub mod pair_configuration;
pub mod payment_method_selector;
