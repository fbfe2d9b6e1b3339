//! Room classification
//!
//! The guided flow already knows which room is being shot, so the result is
//! advisory. [`RandomClassifier`] is a placeholder until a real model is
//! plugged in behind [`RoomClassifier`].

use async_trait::async_trait;
use rand::{rngs::StdRng, RngExt, SeedableRng};
use std::sync::Mutex;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    /// 0.0 - 1.0
    pub confidence: f32,
}

#[async_trait]
pub trait RoomClassifier: Send + Sync {
    /// Guess the room type shown in an encoded still
    async fn classify(&self, image: &[u8]) -> Result<Classification>;
}

/// Picks a label uniformly at random; its confidence is chance level.
#[derive(Debug)]
pub struct RandomClassifier {
    labels: Vec<String>,
    seeded: Option<Mutex<StdRng>>,
}

impl Default for RandomClassifier {
    fn default() -> Self {
        Self::new(["Living room", "Kitchen", "Bedroom", "Bathroom", "Hallway"])
    }
}

impl RandomClassifier {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            seeded: None,
        }
    }

    /// Reproducible picks, for tests
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seeded = Some(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    fn pick_index(&self) -> usize {
        match &self.seeded {
            Some(rng) => {
                let mut rng = rng.lock().unwrap_or_else(|e| e.into_inner());
                rng.random_range(0..self.labels.len())
            }
            None => {
                let mut rng = rand::rng();
                rng.random_range(0..self.labels.len())
            }
        }
    }
}

#[async_trait]
impl RoomClassifier for RandomClassifier {
    async fn classify(&self, _image: &[u8]) -> Result<Classification> {
        if self.labels.is_empty() {
            return Ok(Classification {
                label: String::new(),
                confidence: 0.0,
            });
        }

        let index = self.pick_index();
        Ok(Classification {
            label: self.labels[index].clone(),
            confidence: 1.0 / self.labels.len() as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_labels_come_from_the_fixed_set() {
        let classifier = RandomClassifier::default();
        for _ in 0..20 {
            let result = classifier.classify(&[0xFF, 0xD8]).await.unwrap();
            assert!(classifier.labels.contains(&result.label));
            assert_eq!(result.confidence, 0.2);
        }
    }

    #[tokio::test]
    async fn test_seeded_classifier_is_reproducible() {
        let a = RandomClassifier::default().with_seed(7);
        let b = RandomClassifier::default().with_seed(7);
        for _ in 0..10 {
            assert_eq!(a.classify(&[]).await.unwrap(), b.classify(&[]).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_empty_label_set_reports_nothing() {
        let classifier = RandomClassifier::new(Vec::<String>::new());
        let result = classifier.classify(&[]).await.unwrap();
        assert!(result.label.is_empty());
        assert_eq!(result.confidence, 0.0);
    }
}
