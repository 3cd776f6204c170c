pub mod agent;
pub mod balances;
pub mod batch;
pub mod chain;
pub mod config;
/// Operator session tying agents, store, status log and chain together.
pub mod console;
pub mod csv;
pub mod funding;
pub mod join;
pub mod lottery;
pub mod signing;
pub mod status;
pub mod store;
pub mod units;
