//! Capability roles in the fixed step catalog.

use serde::{Deserialize, Serialize};

/// A role a remote capability fulfils within the pipeline.
///
/// Task submissions carry a map from role to a concrete capability instance
/// id; the step catalog names roles, never instance ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityRole {
    /// Reasoning agent that inspects the target repository.
    RepoScanner,
    /// Deterministic function running static analysis over the repository.
    StaticAnalyzer,
    /// Reasoning agent that designs the pipeline stages.
    PipelineDesigner,
    /// Reasoning agent that reviews the design for security issues.
    SecurityReviewer,
    /// Reasoning agent that generates the workflow document.
    YamlGenerator,
    /// Reasoning agent that publishes the change request.
    PrManager,
}

impl CapabilityRole {
    /// Stable string form, matching the submission wire format.
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityRole::RepoScanner => "repo_scanner",
            CapabilityRole::StaticAnalyzer => "static_analyzer",
            CapabilityRole::PipelineDesigner => "pipeline_designer",
            CapabilityRole::SecurityReviewer => "security_reviewer",
            CapabilityRole::YamlGenerator => "yaml_generator",
            CapabilityRole::PrManager => "pr_manager",
        }
    }
}

impl std::fmt::Display for CapabilityRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CapabilityRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repo_scanner" => Ok(CapabilityRole::RepoScanner),
            "static_analyzer" => Ok(CapabilityRole::StaticAnalyzer),
            "pipeline_designer" => Ok(CapabilityRole::PipelineDesigner),
            "security_reviewer" => Ok(CapabilityRole::SecurityReviewer),
            "yaml_generator" => Ok(CapabilityRole::YamlGenerator),
            "pr_manager" => Ok(CapabilityRole::PrManager),
            other => Err(format!("unknown capability role: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde_round_trip() {
        let json = serde_json::to_string(&CapabilityRole::RepoScanner).unwrap();
        assert_eq!(json, "\"repo_scanner\"");
        let back: CapabilityRole = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CapabilityRole::RepoScanner);
    }

    #[test]
    fn test_role_from_str_round_trip() {
        let role: CapabilityRole = "yaml_generator".parse().unwrap();
        assert_eq!(role, CapabilityRole::YamlGenerator);
        assert!("unknown".parse::<CapabilityRole>().is_err());
    }

    #[test]
    fn test_role_display_matches_serde() {
        for role in [
            CapabilityRole::RepoScanner,
            CapabilityRole::StaticAnalyzer,
            CapabilityRole::PipelineDesigner,
            CapabilityRole::SecurityReviewer,
            CapabilityRole::YamlGenerator,
            CapabilityRole::PrManager,
        ] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role));
        }
    }
}
