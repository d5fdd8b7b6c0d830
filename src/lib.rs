//! FX Regime Attribution
//!
//! A market regime detection and performance attribution engine for forex
//! strategies, featuring multi-signal regime classification, factor and
//! event attribution, and walk-forward validation.

pub mod config;
pub mod data;
pub mod calendar;
pub mod regime;
pub mod attribution;
pub mod backtest;
pub mod optimizer;
pub mod walkforward;
pub mod indicators;
pub mod metrics;
pub mod types;

pub use config::Config;
pub use types::*;
