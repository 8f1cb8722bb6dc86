pub mod commission;
pub mod currency_pair;
pub mod customer;
pub mod exchange_house;
pub mod ledger;
pub mod order;
pub mod payment_method;
