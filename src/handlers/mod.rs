// src/handlers/mod.rs
pub mod chat;
pub mod emi;
pub mod error;
pub mod funds;
pub mod sip;
