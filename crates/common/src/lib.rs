//! Cutroom Common
//!
//! Pieces every Cutroom crate leans on:
//! - `error`: the `CutroomError` taxonomy and `CutroomResult`
//! - `clock`: job/frame clocks and `MM:SS.mmm` formatting
//! - `config`: `AppConfig` loading with default fallback
//! - `logging`: tracing subscriber setup

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
