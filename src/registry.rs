//! Pre-trained prediction models.
//!
//! Training happens offline. Each model is exported as a JSON artifact that
//! describes a small, fixed family of predictors; the registry loads the three
//! artifacts once at startup and is read-only afterwards. A model that fails
//! to load leaves its slot empty, and predictions are refused until the
//! process is restarted with a working artifact.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{Output, PredictionResult};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read model artifact {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse model artifact {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("Models unavailable: {}", missing.join(", "))]
    Unavailable { missing: Vec<&'static str> },

    #[error("Prediction failed: {0}")]
    Prediction(String),
}

/// A trained model treated as a black box: one input row in, one or more
/// values out.
pub trait PredictionModel: Send + Sync {
    fn input_dim(&self) -> usize;
    fn predict(&self, row: &[f64]) -> Result<Vec<Output>, RegistryError>;
}

/// On-disk model description.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelArtifact {
    /// Multi-output linear regression.
    Linear(LinearModel),
    /// Bucketed classifier over a single input column.
    Threshold(ThresholdModel),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    pub intercepts: Vec<f64>,
    /// One weight row per output, one weight per input column.
    pub coefficients: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdModel {
    #[serde(default)]
    pub feature: usize,
    /// Ascending upper bounds; `labels` has one more entry than this.
    pub thresholds: Vec<f64>,
    pub labels: Vec<String>,
}

impl ModelArtifact {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        match self {
            ModelArtifact::Linear(model) => model.validate(),
            ModelArtifact::Threshold(model) => model.validate(),
        }
    }

    pub fn into_model(self) -> Arc<dyn PredictionModel> {
        match self {
            ModelArtifact::Linear(model) => Arc::new(model),
            ModelArtifact::Threshold(model) => Arc::new(model),
        }
    }
}

impl LinearModel {
    fn validate(&self) -> Result<(), RegistryError> {
        if self.intercepts.is_empty() {
            return Err(RegistryError::InvalidArtifact(
                "linear model has no outputs".to_string(),
            ));
        }
        if self.coefficients.len() != self.intercepts.len() {
            return Err(RegistryError::InvalidArtifact(format!(
                "linear model has {} intercepts but {} coefficient rows",
                self.intercepts.len(),
                self.coefficients.len()
            )));
        }

        let width = self.input_dim();
        if width == 0 || self.coefficients.iter().any(|row| row.len() != width) {
            return Err(RegistryError::InvalidArtifact(
                "linear model coefficient rows must share a non-zero width".to_string(),
            ));
        }

        Ok(())
    }
}

impl PredictionModel for LinearModel {
    fn input_dim(&self) -> usize {
        self.coefficients.first().map_or(0, Vec::len)
    }

    fn predict(&self, row: &[f64]) -> Result<Vec<Output>, RegistryError> {
        check_width(row, self.input_dim())?;

        Ok(self
            .intercepts
            .iter()
            .zip(&self.coefficients)
            .map(|(intercept, weights)| {
                let dot: f64 = weights.iter().zip(row).map(|(w, x)| w * x).sum();
                Output::Number(intercept + dot)
            })
            .collect())
    }
}

impl ThresholdModel {
    fn validate(&self) -> Result<(), RegistryError> {
        if self.labels.len() != self.thresholds.len() + 1 {
            return Err(RegistryError::InvalidArtifact(format!(
                "threshold model needs {} labels, found {}",
                self.thresholds.len() + 1,
                self.labels.len()
            )));
        }
        if self.thresholds.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(RegistryError::InvalidArtifact(
                "threshold model thresholds must be ascending".to_string(),
            ));
        }

        Ok(())
    }
}

impl PredictionModel for ThresholdModel {
    fn input_dim(&self) -> usize {
        self.feature + 1
    }

    fn predict(&self, row: &[f64]) -> Result<Vec<Output>, RegistryError> {
        check_width(row, self.input_dim())?;

        let value = row[self.feature];
        let bucket = self
            .thresholds
            .iter()
            .position(|threshold| value < *threshold)
            .unwrap_or(self.thresholds.len());

        Ok(vec![Output::Label(self.labels[bucket].clone())])
    }
}

fn check_width(row: &[f64], expected: usize) -> Result<(), RegistryError> {
    if row.len() != expected {
        return Err(RegistryError::Prediction(format!(
            "expected {expected} input columns, got {}",
            row.len()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    BloodPressure,
    HeartRate,
    Stress,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::BloodPressure,
        ModelKind::HeartRate,
        ModelKind::Stress,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::BloodPressure => "blood_pressure",
            ModelKind::HeartRate => "heart_rate",
            ModelKind::Stress => "stress",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ModelKind::BloodPressure => "bp_model.json",
            ModelKind::HeartRate => "hr_model.json",
            ModelKind::Stress => "stress_model.json",
        }
    }
}

#[derive(Default)]
pub struct ModelRegistry {
    blood_pressure: Option<Arc<dyn PredictionModel>>,
    heart_rate: Option<Arc<dyn PredictionModel>>,
    stress: Option<Arc<dyn PredictionModel>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("blood_pressure", &self.blood_pressure.is_some())
            .field("heart_rate", &self.heart_rate.is_some())
            .field("stress", &self.stress.is_some())
            .finish()
    }
}

impl ModelRegistry {
    /// Loads every artifact from `dir`. Never fails: a model that cannot be
    /// loaded is logged and left unavailable.
    pub fn load_all(dir: &Path) -> Self {
        let mut registry = Self::default();

        for kind in ModelKind::ALL {
            let path = dir.join(kind.file_name());
            match ModelArtifact::load(&path) {
                Ok(artifact) => {
                    info!("Loaded {} model from {}", kind.name(), path.display());
                    registry.insert(kind, artifact.into_model());
                }
                Err(err) => warn!("Could not load {} model: {err}", kind.name()),
            }
        }

        let missing = registry.missing();
        if missing.is_empty() {
            info!("All prediction models loaded");
        } else {
            warn!(
                "Prediction requests will fail, unavailable models: {}",
                missing.join(", ")
            );
        }

        registry
    }

    pub fn insert(&mut self, kind: ModelKind, model: Arc<dyn PredictionModel>) {
        let slot = match kind {
            ModelKind::BloodPressure => &mut self.blood_pressure,
            ModelKind::HeartRate => &mut self.heart_rate,
            ModelKind::Stress => &mut self.stress,
        };
        *slot = Some(model);
    }

    pub fn missing(&self) -> Vec<&'static str> {
        ModelKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_none())
            .map(ModelKind::name)
            .collect()
    }

    pub fn is_ready(&self) -> bool {
        ModelKind::ALL.into_iter().all(|kind| self.get(kind).is_some())
    }

    fn get(&self, kind: ModelKind) -> Option<&Arc<dyn PredictionModel>> {
        match kind {
            ModelKind::BloodPressure => self.blood_pressure.as_ref(),
            ModelKind::HeartRate => self.heart_rate.as_ref(),
            ModelKind::Stress => self.stress.as_ref(),
        }
    }

    /// Runs all three models on a single feature value.
    pub fn predict(&self, input: f64) -> Result<PredictionResult, RegistryError> {
        let (Some(blood_pressure), Some(heart_rate), Some(stress)) =
            (&self.blood_pressure, &self.heart_rate, &self.stress)
        else {
            return Err(RegistryError::Unavailable {
                missing: self.missing(),
            });
        };

        let row = [input];

        let pressure = blood_pressure.predict(&row)?;
        let (systolic, diastolic) = match pressure.as_slice() {
            [first, second, ..] => (
                rounded(first, "systolic")?,
                rounded(second, "diastolic")?,
            ),
            _ => {
                return Err(RegistryError::Prediction(format!(
                    "blood pressure model returned {} values, expected 2",
                    pressure.len()
                )))
            }
        };

        let heart_rate = heart_rate
            .predict(&row)?
            .first()
            .map(|value| rounded(value, "heart rate"))
            .transpose()?
            .ok_or_else(|| {
                RegistryError::Prediction("heart rate model returned no values".to_string())
            })?;

        let stress = stress
            .predict(&row)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RegistryError::Prediction("stress model returned no values".to_string())
            })?;

        Ok(PredictionResult {
            systolic,
            diastolic,
            heart_rate,
            stress,
        })
    }
}

/// Largest magnitude accepted for a rounded vital sign.
const MAX_VITAL: f64 = 10_000.0;

/// Rounds half to even.
fn rounded(value: &Output, what: &str) -> Result<i64, RegistryError> {
    match value.as_number() {
        Some(number) if number.is_finite() && number.abs() <= MAX_VITAL => {
            Ok(number.round_ties_even() as i64)
        }
        Some(number) => Err(RegistryError::Prediction(format!(
            "{what} prediction is out of range: {number}"
        ))),
        None => Err(RegistryError::Prediction(format!(
            "{what} prediction is not numeric"
        ))),
    }
}
