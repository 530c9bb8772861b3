use crate::domain::GateCycle;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Gate -> source domain -> allowed target domains.
pub type GateDomainMap = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Rule configuration document, read once at startup and never rewritten.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub address_rules: AddressRules,
    /// Canonical gate cycle. Exactly four entries.
    pub gate_cycle: GateCycle,
    /// Names of the domains a flow may occupy.
    pub domains: Vec<String>,
    /// Gate/domain compatibility table used by the coherence detector.
    #[serde(default = "default_gate_domain_map")]
    pub gate_domain_map: GateDomainMap,
}

/// Patterns for the three address components.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddressRules {
    pub spatial: PatternRule,
    pub domain_alignment: PatternRule,
    pub temporal: PatternRule,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternRule {
    pub pattern: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl PatternRule {
    /// Compiles the pattern, naming the component in the error.
    pub fn compile(&self, component: &str) -> Result<Regex> {
        Regex::new(&self.pattern)
            .with_context(|| format!("Invalid {} pattern: {}", component, self.pattern))
    }
}

fn default_gate_domain_map() -> GateDomainMap {
    let cycle = GateCycle::default();
    let route = |from: &str, to: &str| BTreeMap::from([(from.to_string(), vec![to.to_string()])]);
    BTreeMap::from([
        (cycle.at(0).to_string(), route("OBI-WAN", "BERJAK")),
        (cycle.at(1).to_string(), route("BERJAK", "INFINITY")),
        (cycle.at(2).to_string(), route("INFINITY", "OBI-WAN")),
    ])
}

impl RuleConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to load rules file: {}", path.display()))
    }

    /// Parses and validates a YAML rule document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse rules as YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        const DEFAULT_RULES_YAML: &str = include_str!("../rules.yaml");

        Self::from_yaml(DEFAULT_RULES_YAML)
            .expect("Failed to parse embedded rules.yaml - this is a bug in the rules.yaml file")
    }

    fn validate(&self) -> Result<()> {
        let rules = &self.address_rules;
        rules.spatial.compile("spatial")?;
        rules.domain_alignment.compile("domain_alignment")?;
        rules.temporal.compile("temporal")?;

        let mut seen = HashSet::new();
        for gate in self.gate_cycle.gates() {
            if gate.is_empty() {
                anyhow::bail!("Gate cycle contains an empty gate");
            }
            if !seen.insert(gate.as_str()) {
                anyhow::bail!("Gate '{}' appears more than once in the gate cycle", gate);
            }
        }

        if self.domains.is_empty() {
            anyhow::bail!("At least one domain must be configured");
        }

        for (gate, routes) in &self.gate_domain_map {
            if !self.gate_cycle.contains(gate) {
                anyhow::bail!("gate_domain_map references unknown gate '{}'", gate);
            }
            for (from, targets) in routes {
                for domain in std::iter::once(from).chain(targets) {
                    if !self.is_domain(domain) {
                        anyhow::bail!(
                            "gate_domain_map for gate '{}' references unknown domain '{}'",
                            gate,
                            domain
                        );
                    }
                }
            }
        }

        Ok(())
    }

    pub fn is_domain(&self, name: &str) -> bool {
        self.domains.iter().any(|d| d == name)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
