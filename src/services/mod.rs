// src/services/mod.rs
pub mod chat;
pub mod emi;
pub mod error;
pub mod fuzzy;
pub mod llm;
pub mod mfapi;
pub mod scheme_lookup;
pub mod sip;

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
