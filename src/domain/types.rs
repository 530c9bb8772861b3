//! Strongly typed primitives shared by the rule validator, the coherence
//! detector and the flow state machine.

use crate::domain::errors::FlowError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// UTC timestamp, serialized as RFC 3339 with a `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimestampUtc(pub DateTime<Utc>);

impl TimestampUtc {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the timestamp as an RFC 3339 string with microsecond precision.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl Default for TimestampUtc {
    fn default() -> Self {
        Self::now()
    }
}

impl std::fmt::Display for TimestampUtc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

/// How serious a failed validation is. Drives the flow's state after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Normal,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// High and critical failures are surfaced to the observer.
    pub fn is_alert(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Initializing,
    Active,
    Validating,
    Paused,
    Quarantined,
    Error,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Initializing => "initializing",
            FlowState::Active => "active",
            FlowState::Validating => "validating",
            FlowState::Paused => "paused",
            FlowState::Quarantined => "quarantined",
            FlowState::Error => "error",
        }
    }

    /// Step processing is refused outright while initializing or after an error.
    pub fn accepts_steps(&self) -> bool {
        !matches!(self, FlowState::Initializing | FlowState::Error)
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-computed coherence classification of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceState {
    #[default]
    Coherent,
    PartialDrift,
    CriticalDrift,
    Quarantined,
}

impl CoherenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoherenceState::Coherent => "coherent",
            CoherenceState::PartialDrift => "partial_drift",
            CoherenceState::CriticalDrift => "critical_drift",
            CoherenceState::Quarantined => "quarantined",
        }
    }
}

impl std::fmt::Display for CoherenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured spatiotemporal address of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Address {
    /// Field coordinate; its final path segment is the node identifier.
    pub spatial: String,
    /// Domain alignment, `<DOMAIN>/<qualifier>`.
    pub domain_alignment: String,
    /// Temporal marker.
    pub temporal: String,
}

impl Address {
    pub fn new(
        spatial: impl Into<String>,
        domain_alignment: impl Into<String>,
        temporal: impl Into<String>,
    ) -> Self {
        Self {
            spatial: spatial.into(),
            domain_alignment: domain_alignment.into(),
            temporal: temporal.into(),
        }
    }

    /// True when no component has been set.
    pub fn is_empty(&self) -> bool {
        self.spatial.is_empty() && self.domain_alignment.is_empty() && self.temporal.is_empty()
    }

    /// Final `/`-separated segment of the spatial component.
    pub fn node_segment(&self) -> &str {
        self.spatial.rsplit('/').next().unwrap_or_default()
    }

    /// Domain named by the domain-alignment component (text before the first `/`).
    pub fn aligned_domain(&self) -> &str {
        self.domain_alignment.split('/').next().unwrap_or_default()
    }

    /// Temporal marker for the current moment, `YYYYMMDDHHMMSSZ`.
    pub fn temporal_marker_now() -> String {
        Utc::now().format("%Y%m%d%H%M%SZ").to_string()
    }
}

/// Number of positions in the canonical gate cycle.
pub const GATE_CYCLE_LEN: usize = 4;

/// The canonical gate cycle: a fixed, ordered array of gate tokens.
///
/// Successors are computed by index arithmetic modulo [`GATE_CYCLE_LEN`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateCycle([String; GATE_CYCLE_LEN]);

impl GateCycle {
    pub fn new(gates: [String; GATE_CYCLE_LEN]) -> Self {
        Self(gates)
    }

    pub fn gates(&self) -> &[String; GATE_CYCLE_LEN] {
        &self.0
    }

    /// Index of `gate` in the cycle, if it belongs to it.
    pub fn position(&self, gate: &str) -> Option<usize> {
        self.0.iter().position(|g| g == gate)
    }

    pub fn contains(&self, gate: &str) -> bool {
        self.position(gate).is_some()
    }

    /// Gate at `index`, wrapping around the cycle.
    pub fn at(&self, index: usize) -> &str {
        &self.0[index % GATE_CYCLE_LEN]
    }

    pub fn first(&self) -> &str {
        self.at(0)
    }

    /// The only gate acceptable after the already accepted `gates`.
    ///
    /// Returns an error when the last accepted gate is not part of the cycle.
    pub fn expected_next(&self, accepted: &[String]) -> Result<&str, FlowError> {
        match accepted.last() {
            None => Ok(self.first()),
            Some(last) => {
                let index = self
                    .position(last)
                    .ok_or_else(|| FlowError::UnknownGate { gate: last.clone() })?;
                Ok(self.at(index + 1))
            }
        }
    }
}

impl Default for GateCycle {
    fn default() -> Self {
        Self([
            "🜂".to_string(),
            "🜄".to_string(),
            "🜃".to_string(),
            "🜁".to_string(),
        ])
    }
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
