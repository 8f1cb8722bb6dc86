pub mod amount;
pub mod rate;
