use serde::{Deserialize, Serialize};

/// Column order of the users file. The header row is written from this list.
pub const USER_FIELDS: [&str; 5] = ["name", "phone", "email", "gender", "password"];

/// One row of the users file.
///
/// The password is kept in clear text, exactly as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub gender: String,
    pub password: String,
}

/// A single value produced by a prediction model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Output {
    Number(f64),
    Label(String),
}

impl Output {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Output::Number(value) => Some(*value),
            Output::Label(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub systolic: i64,
    pub diastolic: i64,
    pub heart_rate: i64,
    pub stress: Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub status: Status,
    pub message: String,
}

impl MessageBody {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionBody {
    pub status: Status,
    #[serde(flatten)]
    pub result: PredictionResult,
}
