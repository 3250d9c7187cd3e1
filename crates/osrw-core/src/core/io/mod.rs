//! Restart files that let an OSRW run resume where it stopped.
//!
//! Two plain-text formats are supported: the shared histogram file, written by rank 0,
//! and one lambda file per walker. Both start with fixed `Key value` header records
//! laid out so that files written by older OSRW implementations load unchanged.

pub mod error;
pub mod histogram;
pub mod lambda;
pub mod traits;

pub use error::{RestartError, RestartParseErrorKind};
pub use histogram::{HistogramFile, HistogramRestart};
pub use lambda::{LambdaFile, LambdaRestart};
pub use traits::RestartFile;

/// Formats `value` like C's `%<width>.<precision>e`, with a signed exponent of at
/// least two digits.
pub(crate) fn format_scientific(value: f64, width: usize, precision: usize) -> String {
    let formatted = format!("{value:.precision$e}");
    let body = match formatted.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exp.abs())
            }
            Err(_) => formatted.clone(),
        },
        None => formatted.clone(),
    };
    format!("{body:>width$}")
}
