//! # Engine Module
//!
//! Stateful machinery of an OSRW run: the biasing engine that wraps a λ-dependent
//! potential, the histogram store it shares with other walkers, and the auxiliary λ
//! particle it propagates.
//!
//! ## Overview
//!
//! [`OsrwEngine`](osrw::OsrwEngine) is queried once per integration step. It evaluates
//! the underlying potential, adds the Gaussian recursion-kernel bias and the running
//! free-energy bias, records `(λ, F_λ)` observations every count interval, and advances
//! λ by one Langevin step. Observations are exchanged with cooperating walkers either
//! through a blocking collective or by a background receiver thread.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Run parameters and their validating builder
//! - **Histogram Store** ([`store`]) - Concurrent recursion kernel with guarded growth
//! - **Lambda Particle** ([`lambda_particle`]) - Langevin dynamics of θ with λ = sin²θ
//! - **Walker Synchronization** ([`walkers`]) - Transport trait, in-process world, receiver
//! - **Capability Hooks** ([`hooks`]) - Optional optimization and traversal collaborators
//! - **Progress Monitoring** ([`progress`]) - Progress events for front ends
//! - **Error Handling** ([`error`]) - Engine-level error type
//! - **OSRW Engine** ([`osrw`]) - The biased potential itself
//!
//! ## Concurrency
//!
//! Bias evaluations are not linearizable with concurrent increments from the receiver
//! thread: a read may see some in-flight counts and miss others. Growth of the F_λ axis
//! is the only operation that excludes all others.

pub mod config;
pub mod error;
pub mod hooks;
pub mod lambda_particle;
pub mod osrw;
pub mod progress;
pub mod store;
pub mod walkers;
