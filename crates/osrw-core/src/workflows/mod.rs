//! # Workflows Module
//!
//! High-level procedures built on the engine: complete biased runs and the analysis of
//! what they leave behind.
//!
//! ## Architecture
//!
//! - **Walk Workflow** ([`walk`]) - Multi-walker OSRW sampling with Brownian coordinate
//!   dynamics, progress reporting and final restart files.
//! - **Profile Workflow** ([`profile`]) - Free-energy profile of a histogram restart file.

pub mod profile;
pub mod walk;
