//! # Core Module
//!
//! Stateless building blocks of the OSRW method: the recursion kernel, the Gaussian bias
//! derived from it, the free-energy integrator, and the interfaces a physical potential
//! must implement to be biased.
//!
//! ## Overview
//!
//! Orthogonal space random walk samples the joint distribution of the alchemical
//! coordinate λ and its generalized force F_λ = ∂U/∂λ. Visits are accumulated in a
//! two-dimensional histogram; a sum of Gaussians over that histogram pushes the system
//! away from regions it has already explored, and the reweighted ⟨F_λ⟩ of each λ bin
//! integrates to the free-energy difference between the end states.
//!
//! ## Architecture
//!
//! - **Recursion Kernel** ([`histogram`]) - Growable (λ, F_λ) visit-count grid with atomic cells
//! - **Bias Potential** ([`bias`]) - Gaussian-sum bias and its partial derivatives
//! - **Free Energy** ([`free_energy`]) - Thermodynamic integration over the kernel
//! - **Collaborator Interfaces** ([`potential`]) - `Potential` and `LambdaInterface` traits
//! - **Model Systems** ([`model`]) - Analytic λ-dependent potential with a known ΔG
//! - **Restart I/O** ([`io`]) - Histogram and lambda restart files

pub mod bias;
pub mod free_energy;
pub mod histogram;
pub mod io;
pub mod model;
pub mod potential;
