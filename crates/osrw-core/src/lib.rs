//! # OSRW Core Library
//!
//! Orthogonal Space Random Walk: an adaptive biasing method that estimates the
//! free-energy difference along an alchemical coordinate λ while it samples.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data and math: the (λ, F_λ) recursion
//!   kernel, the Gaussian bias, free-energy integration, the `Potential` and
//!   `LambdaInterface` collaborator traits, an analytic model potential, and restart I/O.
//!
//! - **[`engine`]: The Logic Core.** The stateful `OsrwEngine` that wraps a λ-dependent
//!   potential, the concurrent histogram store, the λ particle, walker synchronization,
//!   and optional hooks.
//!
//! - **[`workflows`]: The Public API.** Complete procedures such as a multi-walker biased
//!   walk or the analysis of a saved histogram.

pub mod core;
pub mod engine;
pub mod workflows;
