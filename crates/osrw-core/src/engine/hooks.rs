use thiserror::Error;

/// λ below which a walker counts as having reached the initial state.
pub const TRAVERSAL_LOW: f64 = 0.1;
/// λ above which a walker counts as having reached the final state.
pub const TRAVERSAL_HIGH: f64 = 0.9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HookError {
    #[error("Hook failed: {0}")]
    Failed(String),
}

/// Periodic minimization of the coordinates along the walk.
pub trait OptimizationHook: Send {
    /// Minimizes a copy of `coordinates` at the current λ and returns the minimized
    /// energy. The walker's own coordinates are left untouched.
    fn optimize(&mut self, coordinates: &[f64], lambda: f64) -> Result<f64, HookError>;

    /// Called when `optimize` returned the lowest energy seen so far.
    fn on_new_minimum(&mut self, _energy: f64, _lambda: f64, _step: u64) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// From below [`TRAVERSAL_LOW`] to above [`TRAVERSAL_HIGH`].
    Up,
    /// From above [`TRAVERSAL_HIGH`] to below [`TRAVERSAL_LOW`].
    Down,
}

/// Notified each time λ completes a full crossing of the alchemical path.
pub trait TraversalHook: Send {
    fn on_traversal(&mut self, traversal: Traversal, step: u64, coordinates: &[f64]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndState {
    Low,
    High,
}

/// Detects complete crossings of λ between the two end regions.
#[derive(Debug, Clone, Default)]
pub struct TraversalTracker {
    last_end: Option<EndState>,
}

impl TraversalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, lambda: f64) -> Option<Traversal> {
        if lambda < TRAVERSAL_LOW {
            let previous = self.last_end.replace(EndState::Low);
            (previous == Some(EndState::High)).then_some(Traversal::Down)
        } else if lambda > TRAVERSAL_HIGH {
            let previous = self.last_end.replace(EndState::High);
            (previous == Some(EndState::Low)).then_some(Traversal::Up)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_reports_complete_crossings_only() {
        let mut tracker = TraversalTracker::new();
        let path = [0.5, 0.05, 0.4, 0.85, 0.95, 0.97, 0.5, 0.08, 0.02, 0.92];

        let events: Vec<Option<Traversal>> = path.iter().map(|&l| tracker.update(l)).collect();

        assert_eq!(
            events,
            vec![
                None,
                None,
                None,
                None,
                Some(Traversal::Up),
                None,
                None,
                Some(Traversal::Down),
                None,
                Some(Traversal::Up),
            ]
        );
    }

    #[test]
    fn first_visit_to_an_end_is_not_a_traversal() {
        let mut tracker = TraversalTracker::new();
        assert_eq!(tracker.update(0.99), None);
        assert_eq!(tracker.update(0.01), Some(Traversal::Down));
    }
}
