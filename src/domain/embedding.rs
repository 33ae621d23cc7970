//! Face embedding vectors and the distance primitive used wherever
//! identity similarity must be judged.

use serde::{Deserialize, Serialize};

use crate::shared::errors::Result;

/// Distance sentinel meaning "unknown / not comparable".
pub const DIST_UNKNOWN: f64 = -1.0;

/// A fixed-dimensional numeric vector summarizing a face's visual identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f64>);

impl Embedding {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance to another embedding. Callers must only compare
    /// vectors of equal dimensionality.
    pub fn euclidean_distance(&self, other: &Embedding) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// The embedding vectors attached to one marker or face sample set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embeddings(pub Vec<Embedding>);

impl Embeddings {
    /// Parses the persisted JSON column format (array of arrays of numbers).
    /// An empty string is an empty set, not an error.
    pub fn from_json(s: &str) -> Result<Embeddings> {
        if s.trim().is_empty() {
            return Ok(Embeddings::default());
        }

        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|e| e.is_empty())
    }

    /// Smallest Euclidean distance between any of these vectors and the
    /// reference, comparing only vectors of equal dimensionality. Returns
    /// [`DIST_UNKNOWN`] when nothing is comparable.
    pub fn min_distance(&self, reference: &Embedding) -> f64 {
        let mut best = DIST_UNKNOWN;

        if reference.is_empty() {
            return best;
        }

        for e in &self.0 {
            if e.len() != reference.len() {
                continue;
            }

            let d = e.euclidean_distance(reference);

            if best < 0.0 || d < best {
                best = d;
            }
        }

        best
    }

    /// Component-wise average of all vectors matching the dimensionality of
    /// the first non-empty one; the reference embedding of a cluster.
    pub fn average(&self) -> Option<Embedding> {
        let dim = self.0.iter().find(|e| !e.is_empty())?.len();
        let mut sum = vec![0.0f64; dim];
        let mut count = 0usize;

        for e in &self.0 {
            if e.len() != dim {
                continue;
            }

            for (s, v) in sum.iter_mut().zip(e.0.iter()) {
                *s += v;
            }

            count += 1;
        }

        if count == 0 {
            return None;
        }

        for s in sum.iter_mut() {
            *s /= count as f64;
        }

        Some(Embedding(sum))
    }
}
