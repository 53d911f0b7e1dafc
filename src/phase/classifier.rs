//! Phase classification strategies (design §4.7). `NearestCluster` is the
//! default: it returns the first already-known phase whose normalized
//! branch vector is within `similarity_threshold` of the window's.

use super::{Phase, Window};

pub trait Classifier: Send {
    /// Returns the index into `phase_list` of the phase `window` belongs
    /// to, or `None` if no existing phase is close enough (design §4.7:
    /// `Phase::not_found`).
    fn classify(&self, phase_list: &[Phase], window: &Window) -> Option<usize>;
}

pub struct NearestCluster {
    similarity_threshold: f64,
}

impl NearestCluster {
    pub fn new(similarity_threshold: f64) -> Self {
        NearestCluster { similarity_threshold }
    }
}

impl Default for NearestCluster {
    fn default() -> Self {
        // Matches the original's default `similarity_threshold = 1`.
        NearestCluster::new(1.0)
    }
}

fn normalize(vec: &[f64]) -> Vec<f64> {
    let norm = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        vec.to_vec()
    } else {
        vec.iter().map(|v| v / norm).collect()
    }
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

impl Classifier for NearestCluster {
    fn classify(&self, phase_list: &[Phase], window: &Window) -> Option<usize> {
        let normalized = normalize(&window.branch_vector);
        phase_list
            .iter()
            .position(|phase| euclidean_distance(&normalized, phase.normalized_vector()) <= self.similarity_threshold)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identical_vectors_are_within_threshold() {
        let window = Window::new(4);
        let phase = Phase::new(window.clone());
        let classifier = NearestCluster::default();
        assert_eq!(classifier.classify(&[phase], &window), Some(0));
    }

    #[test]
    fn empty_phase_list_never_matches() {
        let window = Window::new(4);
        let classifier = NearestCluster::default();
        assert_eq!(classifier.classify(&[], &window), None);
    }
}
