pub mod booking;
pub mod cache;
pub mod clock;
pub mod config;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod notifications;
pub mod pricing;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
pub mod waitlist;

#[cfg(test)]
pub(crate) mod testing;
