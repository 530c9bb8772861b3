//! Results of validation and coherence checks.
//!
//! Outcomes are tagged: a pass carries only a timestamp and optional details,
//! a failure carries the code, message and severity that explain it.

use crate::domain::types::{CoherenceState, Severity, TimestampUtc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Free-form detail map attached to an outcome.
pub type Details = BTreeMap<String, Value>;

/// Error codes produced by field validation and step processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NonIncreasingSequence,
    NonPrimeCredential,
    InvalidSpatialComponent,
    InvalidDomainAlignment,
    InvalidTemporalMarker,
    InvalidGate,
    IncompatibleDomains,
    GateSequenceViolation,
    InvalidFlowState,
    UnknownStepType,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NonIncreasingSequence => "NON_INCREASING_SEQUENCE",
            ErrorCode::NonPrimeCredential => "NON_PRIME_CREDENTIAL",
            ErrorCode::InvalidSpatialComponent => "INVALID_SPATIAL_COMPONENT",
            ErrorCode::InvalidDomainAlignment => "INVALID_DOMAIN_ALIGNMENT",
            ErrorCode::InvalidTemporalMarker => "INVALID_TEMPORAL_MARKER",
            ErrorCode::InvalidGate => "INVALID_GATE",
            ErrorCode::IncompatibleDomains => "INCOMPATIBLE_DOMAINS",
            ErrorCode::GateSequenceViolation => "GATE_SEQUENCE_VIOLATION",
            ErrorCode::InvalidFlowState => "INVALID_FLOW_STATE",
            ErrorCode::UnknownStepType => "UNKNOWN_STEP_TYPE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Severity attached to failures with this code.
    ///
    /// Domain-alignment and domain-pair problems are recoverable by an
    /// operator (quarantine); everything else stops the flow.
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::InvalidDomainAlignment | ErrorCode::IncompatibleDomains => Severity::High,
            _ => Severity::Critical,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of a failed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
    pub timestamp: TimestampUtc,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: Details,
}

/// Result of one atomic validation check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Passed {
        timestamp: TimestampUtc,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        details: Details,
    },
    Failed(ValidationFailure),
}

impl ValidationOutcome {
    pub fn passed() -> Self {
        Self::Passed {
            timestamp: TimestampUtc::now(),
            details: Details::new(),
        }
    }

    /// Failure with the code's default severity.
    pub fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::failed_with(code, code.severity(), message)
    }

    pub fn failed_with(code: ErrorCode, severity: Severity, message: impl Into<String>) -> Self {
        Self::Failed(ValidationFailure {
            code,
            message: message.into(),
            severity,
            timestamp: TimestampUtc::now(),
            details: Details::new(),
        })
    }

    /// Converts an unexpected internal error into a critical failure.
    pub fn internal(error: impl std::fmt::Display) -> Self {
        Self::failed_with(ErrorCode::InternalError, Severity::Critical, error.to_string())
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        match &mut self {
            Self::Passed { details, .. } => details.insert(key.to_string(), value.into()),
            Self::Failed(failure) => failure.details.insert(key.to_string(), value.into()),
        };
        self
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    pub fn failure(&self) -> Option<&ValidationFailure> {
        match self {
            Self::Passed { .. } => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.failure().map(|f| f.code)
    }

    /// Passes are always `normal`.
    pub fn severity(&self) -> Severity {
        self.failure().map_or(Severity::Normal, |f| f.severity)
    }

    pub fn timestamp(&self) -> TimestampUtc {
        match self {
            Self::Passed { timestamp, .. } => *timestamp,
            Self::Failed(failure) => failure.timestamp,
        }
    }

    pub fn details(&self) -> &Details {
        match self {
            Self::Passed { details, .. } => details,
            Self::Failed(failure) => &failure.details,
        }
    }
}

/// Which cross-field relation a drift was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftPoint {
    PrimeSpatialMisalignment,
    GateTemporalMisalignment,
    SpatialGateMisalignment,
    SystemError,
}

impl DriftPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftPoint::PrimeSpatialMisalignment => "prime_spatial_misalignment",
            DriftPoint::GateTemporalMisalignment => "gate_temporal_misalignment",
            DriftPoint::SpatialGateMisalignment => "spatial_gate_misalignment",
            DriftPoint::SystemError => "system_error",
        }
    }
}

/// Error codes produced by coherence checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoherenceCode {
    CredentialAddressIncoherence,
    GateTemporalIncoherence,
    AddressGateIncoherence,
    CoherenceCheckError,
}

/// Details of a detected drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceDrift {
    pub classification: CoherenceState,
    pub drift_points: BTreeSet<DriftPoint>,
    pub code: CoherenceCode,
    pub message: String,
    pub timestamp: TimestampUtc,
}

/// Result of a single cross-check or of the full-field check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CoherenceOutcome {
    Coherent { timestamp: TimestampUtc },
    Drifted(CoherenceDrift),
}

impl CoherenceOutcome {
    pub fn coherent() -> Self {
        Self::Coherent {
            timestamp: TimestampUtc::now(),
        }
    }

    pub fn drifted(
        classification: CoherenceState,
        point: DriftPoint,
        code: CoherenceCode,
        message: impl Into<String>,
    ) -> Self {
        Self::Drifted(CoherenceDrift {
            classification,
            drift_points: BTreeSet::from([point]),
            code,
            message: message.into(),
            timestamp: TimestampUtc::now(),
        })
    }

    /// Converts an internal error during a check into a critical drift.
    pub fn system_error(error: impl std::fmt::Display) -> Self {
        Self::drifted(
            CoherenceState::CriticalDrift,
            DriftPoint::SystemError,
            CoherenceCode::CoherenceCheckError,
            error.to_string(),
        )
    }

    pub fn is_coherent(&self) -> bool {
        matches!(self, Self::Coherent { .. })
    }

    pub fn classification(&self) -> CoherenceState {
        match self {
            Self::Coherent { .. } => CoherenceState::Coherent,
            Self::Drifted(drift) => drift.classification,
        }
    }

    pub fn drift(&self) -> Option<&CoherenceDrift> {
        match self {
            Self::Coherent { .. } => None,
            Self::Drifted(drift) => Some(drift),
        }
    }

    pub fn has_drift_point(&self, point: DriftPoint) -> bool {
        self.drift().is_some_and(|d| d.drift_points.contains(&point))
    }

    pub fn timestamp(&self) -> TimestampUtc {
        match self {
            Self::Coherent { timestamp } => *timestamp,
            Self::Drifted(drift) => drift.timestamp,
        }
    }
}
