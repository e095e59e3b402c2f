// lib.rs
// Library modules for the shared tombola card pool

pub mod defs;
pub mod logging;
pub mod config;
pub mod card;
pub mod win;
pub mod store;
pub mod retry;
pub mod identity;
pub mod claim;
pub mod tracker;
pub mod api_handlers;
pub mod server;
pub mod clients;
