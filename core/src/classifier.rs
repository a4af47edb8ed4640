//! Incremental department classifier.
//!
//! One-vs-rest logistic regression over hashed word unigrams and bigrams,
//! trained one example at a time with plain SGD. The label set is fixed when
//! the model is created; adding a department needs a fresh model.
//!
//! RULES:
//!   - Predictions read an immutable `Arc` snapshot and never block on an
//!     update in progress.
//!   - Updates are serialized by `writer`. Each builds a new parameter set
//!     from the current snapshot and swaps it in whole.
//!   - A persisted model is replaced with a synced temp file + rename,
//!     never edited in place.

use crate::{
    config::ClassifierConfig,
    error::{LedgerError, LedgerResult},
    types::FALLBACK_DEPARTMENT,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Serialized model: parameters plus the label set they were trained for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierState {
    pub labels: Vec<String>,
    pub dimensions: usize,
    /// Row-major, `labels.len() * dimensions`.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    pub updates_applied: u64,
}

impl ClassifierState {
    pub fn untrained(labels: Vec<String>, dimensions: usize) -> Self {
        Self {
            weights: vec![0.0; labels.len() * dimensions],
            bias: vec![0.0; labels.len()],
            labels,
            dimensions,
            updates_applied: 0,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.labels.is_empty() {
            return Err("model has no labels".into());
        }
        if self.dimensions == 0 {
            return Err("model has zero feature dimensions".into());
        }
        if self.weights.len() != self.labels.len() * self.dimensions
            || self.bias.len() != self.labels.len()
        {
            return Err(format!(
                "parameter shape does not match {} labels x {} dimensions",
                self.labels.len(),
                self.dimensions
            ));
        }
        Ok(())
    }

    fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    fn score(&self, class: usize, features: &[(usize, f32)]) -> f32 {
        let row = &self.weights[class * self.dimensions..(class + 1) * self.dimensions];
        features.iter().map(|(i, x)| row[*i] * x).sum::<f32>() + self.bias[class]
    }

    /// Per-label probabilities, in label order.
    fn probabilities(&self, features: &[(usize, f32)]) -> Vec<f32> {
        (0..self.labels.len())
            .map(|k| sigmoid(self.score(k, features)))
            .collect()
    }

    /// One SGD step on a single labeled example.
    fn step(&mut self, features: &[(usize, f32)], target: usize, learning_rate: f32, l2: f32) {
        for k in 0..self.labels.len() {
            let y = if k == target { 1.0 } else { 0.0 };
            let gradient = sigmoid(self.score(k, features)) - y;
            let row = &mut self.weights[k * self.dimensions..(k + 1) * self.dimensions];
            for (i, x) in features {
                row[*i] -= learning_rate * (gradient * x + l2 * row[*i]);
            }
            self.bias[k] -= learning_rate * gradient;
        }
        self.updates_applied += 1;
    }
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

fn fnv1a(token: &str) -> u64 {
    token
        .bytes()
        .fold(FNV_OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// Hashed, L2-normalized bag of lowercase word unigrams and bigrams.
/// Empty when the text has no alphanumeric words.
pub fn featurize(text: &str, dimensions: usize) -> Vec<(usize, f32)> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() || dimensions == 0 {
        return Vec::new();
    }

    let mut counts: BTreeMap<usize, f32> = BTreeMap::new();
    let mut bump = |token: &str| {
        let idx = (fnv1a(token) % dimensions as u64) as usize;
        *counts.entry(idx).or_insert(0.0) += 1.0;
    };
    for w in &words {
        bump(w);
    }
    for pair in words.windows(2) {
        bump(&format!("{} {}", pair[0], pair[1]));
    }

    let norm = counts.values().map(|c| c * c).sum::<f32>().sqrt();
    counts.into_iter().map(|(i, c)| (i, c / norm)).collect()
}

pub struct IncrementalClassifier {
    state: RwLock<Option<Arc<ClassifierState>>>,
    writer: Mutex<()>,
    model_path: Option<PathBuf>,
    learning_rate: f32,
    l2_penalty: f32,
}

impl IncrementalClassifier {
    /// Loads the persisted model, or starts an untrained one over `labels`
    /// when none exists yet. An unreadable model leaves the classifier
    /// disabled rather than failing startup.
    pub fn load(config: &ClassifierConfig, labels: &[String]) -> Self {
        let state = match read_model(&config.model_path) {
            Ok(Some(state)) => {
                log::info!(
                    "Classifier loaded from {} ({} labels, {} updates)",
                    config.model_path.display(),
                    state.labels.len(),
                    state.updates_applied
                );
                Some(state)
            }
            Ok(None) if labels.is_empty() => {
                log::warn!("No classifier model and no labels; classifier disabled");
                None
            }
            Ok(None) => {
                log::info!(
                    "No classifier model at {}; starting untrained over {} labels",
                    config.model_path.display(),
                    labels.len()
                );
                Some(ClassifierState::untrained(labels.to_vec(), config.dimensions))
            }
            Err(e) => {
                log::warn!("Classifier disabled: {e}");
                None
            }
        };
        Self {
            state: RwLock::new(state.map(Arc::new)),
            writer: Mutex::new(()),
            model_path: Some(config.model_path.clone()),
            learning_rate: config.learning_rate,
            l2_penalty: config.l2_penalty,
        }
    }

    /// A classifier with no model. Predicts the fallback label, rejects updates.
    pub fn disabled() -> Self {
        Self {
            state: RwLock::new(None),
            writer: Mutex::new(()),
            model_path: None,
            learning_rate: 0.0,
            l2_penalty: 0.0,
        }
    }

    /// Wraps an existing state. `model_path: None` keeps updates in memory only.
    pub fn from_state(
        state: ClassifierState,
        model_path: Option<PathBuf>,
        config: &ClassifierConfig,
    ) -> LedgerResult<Self> {
        state.validate().map_err(LedgerError::InvalidInput)?;
        Ok(Self {
            state: RwLock::new(Some(Arc::new(state))),
            writer: Mutex::new(()),
            model_path,
            learning_rate: config.learning_rate,
            l2_penalty: config.l2_penalty,
        })
    }

    fn snapshot(&self) -> Option<Arc<ClassifierState>> {
        self.state.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn is_available(&self) -> bool {
        self.snapshot().is_some()
    }

    pub fn labels(&self) -> Vec<String> {
        self.snapshot().map(|s| s.labels.clone()).unwrap_or_default()
    }

    pub fn updates_applied(&self) -> u64 {
        self.snapshot().map_or(0, |s| s.updates_applied)
    }

    /// Most probable label, or `General` when there is nothing to go on.
    pub fn predict(&self, text: &str) -> String {
        let Some(state) = self.snapshot() else {
            return FALLBACK_DEPARTMENT.to_string();
        };
        if state.updates_applied == 0 {
            return FALLBACK_DEPARTMENT.to_string();
        }
        let features = featurize(text, state.dimensions);
        if features.is_empty() {
            return FALLBACK_DEPARTMENT.to_string();
        }
        state
            .probabilities(&features)
            .into_iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(k, _)| state.labels[k].clone())
            .unwrap_or_else(|| FALLBACK_DEPARTMENT.to_string())
    }

    /// Applies one labeled example and persists the result.
    ///
    /// On a persistence failure the new parameters stay live in memory and
    /// `Persistence` is returned.
    pub fn update(&self, text: &str, label: &str) -> LedgerResult<()> {
        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let current = self.snapshot().ok_or(LedgerError::ClassifierUnavailable)?;
        let target = current
            .label_index(label)
            .ok_or_else(|| LedgerError::UnknownLabel(label.to_string()))?;
        let features = featurize(text, current.dimensions);
        if features.is_empty() {
            return Err(LedgerError::InvalidInput(
                "complaint text has no words to learn from".into(),
            ));
        }

        let mut next = (*current).clone();
        next.step(&features, target, self.learning_rate, self.l2_penalty);
        let next = Arc::new(next);
        *self.state.write().unwrap_or_else(|p| p.into_inner()) = Some(Arc::clone(&next));
        log::debug!("Classifier updated with '{label}' ({} updates)", next.updates_applied);

        match &self.model_path {
            Some(path) => write_model(path, &next),
            None => Ok(()),
        }
    }
}

fn read_model(path: &Path) -> LedgerResult<Option<ClassifierState>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let state: ClassifierState = serde_json::from_str(&content)?;
    state
        .validate()
        .map_err(|e| LedgerError::InvalidInput(format!("{}: {e}", path.display())))?;
    Ok(Some(state))
}

fn write_model(path: &Path, state: &ClassifierState) -> LedgerResult<()> {
    let write = || -> std::io::Result<()> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec(state).map_err(std::io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)?;
        match parent {
            Some(dir) => sync_directory(dir),
            None => Ok(()),
        }
    };
    write().map_err(|e| {
        log::warn!("Classifier model not persisted to {}: {e}", path.display());
        LedgerError::Persistence(format!("{}: {e}", path.display()))
    })
}

/// Makes the rename itself durable.
#[cfg(unix)]
fn sync_directory(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
