// src/clients/mod.rs
// Player-side pieces: the HTTP store client and terminal rendering.

pub mod display;
pub mod http_store;
