//! Publish token resolution.
//!
//! Resolution order:
//! 1. `PIPESMITH_GITHUB_TOKEN` environment variable
//! 2. `GITHUB_TOKEN` environment variable
//! 3. Explicit config value (with a warning; prefer the environment)

/// Environment variables checked, in order.
const TOKEN_ENV_VARS: [&str; 2] = ["PIPESMITH_GITHUB_TOKEN", "GITHUB_TOKEN"];

/// Result of token resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    /// The token value.
    pub value: String,
    /// Where the token was found.
    pub source: TokenSource,
}

/// Where a token was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Environment variable.
    EnvVar(String),
    /// Explicit configuration value.
    Config,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::EnvVar(var) => write!(f, "env var {}", var),
            TokenSource::Config => write!(f, "config value"),
        }
    }
}

/// Resolve the publish token using the full resolution chain.
pub fn resolve_token(config_value: Option<&str>) -> Option<ResolvedToken> {
    for var in TOKEN_ENV_VARS {
        if let Ok(value) = std::env::var(var)
            && !value.is_empty()
        {
            return Some(ResolvedToken {
                value,
                source: TokenSource::EnvVar(var.to_string()),
            });
        }
    }

    config_value.filter(|v| !v.is_empty()).map(|v| {
        tracing::warn!("Using publish token from config; prefer the environment");
        ResolvedToken {
            value: v.to_string(),
            source: TokenSource::Config,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var resolution is not exercised here: tests must stay isolated
    // from local machine state.

    #[test]
    fn test_config_fallback() {
        let resolved = resolve_token(Some("tok-abc"));
        // Only assert when the environment doesn't shadow the config value.
        if std::env::var("PIPESMITH_GITHUB_TOKEN").is_err()
            && std::env::var("GITHUB_TOKEN").is_err()
        {
            let resolved = resolved.unwrap();
            assert_eq!(resolved.value, "tok-abc");
            assert_eq!(resolved.source, TokenSource::Config);
        }
    }

    #[test]
    fn test_empty_config_is_none() {
        if std::env::var("PIPESMITH_GITHUB_TOKEN").is_err()
            && std::env::var("GITHUB_TOKEN").is_err()
        {
            assert_eq!(resolve_token(Some("")), None);
            assert_eq!(resolve_token(None), None);
        }
    }
}
