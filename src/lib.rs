//! Binning and summary of detector HV scan calibration runs.
//!
//! A run is a CSV time series of detector metrics. It is filtered to a time
//! window, converted to absolute units, grouped by high voltage and averaged
//! over equal-width voltage bins (see [`binning`]) or fixed time windows.

pub mod analysis;
pub mod binning;
pub mod config;
pub mod data;
pub mod manager;
pub mod stats;
