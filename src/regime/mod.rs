//! Market regime detection

pub mod detector;
pub mod signals;

pub use detector::RegimeDetector;
