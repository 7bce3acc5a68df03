use serde::{Deserialize, Serialize};

/// Chronological record of `(time, state)` pairs produced by a
/// history-recording integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory<T> {
    pub times: Vec<f64>,
    pub states: Vec<Vec<T>>,
}

impl<T> Default for Trajectory<T> {
    fn default() -> Self {
        Self {
            times: Vec::new(),
            states: Vec::new(),
        }
    }
}

impl<T: Clone> Trajectory<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            times: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, t: f64, state: &[T]) {
        self.times.push(t);
        self.states.push(state.to_vec());
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time of the last recorded sample.
    pub fn final_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    /// State of the last recorded sample.
    pub fn final_state(&self) -> Option<&[T]> {
        self.states.last().map(|s| s.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[T])> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.states.iter().map(|s| s.as_slice()))
    }
}
