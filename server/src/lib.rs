pub mod cart;
pub mod checkout;
pub mod config;
pub mod handlers;
pub mod models;
pub mod payment;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;
