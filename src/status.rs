//! Status parsing: turns one submission record into a notification.
//!
//! The caller owns the last emitted verdict and passes it in, so repeated
//! polls of an unchanged record produce no message.

use serde_json::Value;

use crate::error::{RelayError, Result};

/// Review outcome reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Reviewing,
    Rejected,
}

impl Verdict {
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "approved" => Some(Self::Approved),
            "reviewing" => Some(Self::Reviewing),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Reviewing => "reviewing",
            Self::Rejected => "rejected",
        }
    }

    pub fn sentence(&self) -> &'static str {
        match self {
            Self::Approved => "The work has been reviewed: the reviewer liked everything. Hooray!",
            Self::Reviewing => "Work has been taken up for review by the reviewer.",
            Self::Rejected => "The work has been reviewed: the reviewer has comments.",
        }
    }
}

/// Parse a submission record against the last emitted verdict.
///
/// Returns `Ok(None)` when the verdict is unchanged. On a change the new
/// verdict is written to `last_verdict` and the formatted message returned.
/// Errors leave `last_verdict` untouched.
pub fn parse_status(record: &Value, last_verdict: &mut Option<Verdict>) -> Result<Option<String>> {
    let name = record
        .get("homework_name")
        .ok_or_else(|| RelayError::MissingKey("homework_name".to_string()))?;
    let name = match name {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let verdict = match record.get("status") {
        Some(Value::String(status)) => Verdict::from_status(status)
            .ok_or_else(|| RelayError::UnknownStatus(status.clone()))?,
        Some(other) => return Err(RelayError::UnknownStatus(other.to_string())),
        None => return Err(RelayError::UnknownStatus("<none>".to_string())),
    };

    if *last_verdict == Some(verdict) {
        return Ok(None);
    }

    *last_verdict = Some(verdict);
    Ok(Some(format!(
        "Status changed for submission \"{name}\". {}",
        verdict.sentence()
    )))
}
