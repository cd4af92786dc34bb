//! Structural validation of generated workflow documents.
//!
//! Deterministic checks over the YAML the generator produced: required
//! GitHub Actions structure, permission warnings, and referenced-secrets
//! collection. Runs as the generation postcondition and again as the
//! `validation` catalog step.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// How strictly a validation report gates progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    /// Errors and warnings both fail.
    Strict,
    /// Errors fail, warnings pass.
    #[default]
    Normal,
    /// Nothing fails.
    Lenient,
}

/// Outcome of validating one workflow document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub secrets_referenced: Vec<String>,
}

impl ValidationReport {
    /// A report carrying a single fatal error.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    /// True if the document passes at the given level.
    pub fn passes(&self, level: ValidationLevel) -> bool {
        match level {
            ValidationLevel::Strict => self.errors.is_empty() && self.warnings.is_empty(),
            ValidationLevel::Normal => self.errors.is_empty(),
            ValidationLevel::Lenient => true,
        }
    }
}

/// Validate a workflow document.
pub fn validate_workflow(doc: &str) -> ValidationReport {
    let mut report = ValidationReport::default();

    let parsed: Value = match serde_yaml::from_str(doc) {
        Ok(v) => v,
        Err(e) => {
            report.errors.push(format!("YAML syntax error: {}", e));
            return report;
        }
    };

    let Some(map) = parsed.as_mapping() else {
        report
            .errors
            .push("workflow document is empty or not a mapping".to_string());
        return report;
    };

    if get_key(map, "name").is_none() {
        report.warnings.push("workflow name is missing".to_string());
    }

    if !has_trigger(map) {
        report
            .errors
            .push("workflow trigger (\"on\") is missing".to_string());
    }

    match get_key(map, "jobs").and_then(Value::as_mapping) {
        None => report
            .errors
            .push("workflow jobs section is missing".to_string()),
        Some(jobs) => {
            for (job_key, job) in jobs {
                let job_name = job_key.as_str().unwrap_or("<job>");
                validate_job(job_name, job, &mut report);
            }
        }
    }

    check_hardcoded_secrets(doc, &mut report);
    report.secrets_referenced = secrets_referenced(doc);
    report
}

fn validate_job(job_name: &str, job: &Value, report: &mut ValidationReport) {
    let Some(job) = job.as_mapping() else {
        report
            .errors
            .push(format!("job \"{}\" is not a mapping", job_name));
        return;
    };

    if get_key(job, "runs-on").is_none() {
        report
            .errors
            .push(format!("job \"{}\" missing \"runs-on\"", job_name));
    }

    match get_key(job, "steps").and_then(Value::as_sequence) {
        None => report
            .errors
            .push(format!("job \"{}\" missing \"steps\"", job_name)),
        Some(steps) => {
            for (i, step) in steps.iter().enumerate() {
                let has_action = step
                    .as_mapping()
                    .map(|s| get_key(s, "uses").is_some() || get_key(s, "run").is_some())
                    .unwrap_or(false);
                if !has_action {
                    report.errors.push(format!(
                        "job \"{}\" step {} missing \"uses\" or \"run\"",
                        job_name,
                        i + 1
                    ));
                }
            }
        }
    }

    if let Some(permissions) = get_key(job, "permissions").and_then(Value::as_mapping) {
        if get_key(permissions, "contents").and_then(Value::as_str) == Some("write") {
            report.warnings.push(format!(
                "job \"{}\" has write permissions to contents - ensure this is necessary",
                job_name
            ));
        }
        if get_key(permissions, "id-token").and_then(Value::as_str) == Some("write") {
            report.warnings.push(format!(
                "job \"{}\" has OIDC write permissions - verify least privilege",
                job_name
            ));
        }
    }
}

/// Mentioning password/secret material outside a `${{ secrets.* }}` reference
/// suggests a hard-coded credential.
fn check_hardcoded_secrets(doc: &str, report: &mut ValidationReport) {
    let lowered = doc.to_lowercase();
    if (lowered.contains("password") || lowered.contains("secret"))
        && !lowered.contains("secrets.")
        && !lowered.contains("${{")
    {
        report
            .warnings
            .push("potential hardcoded secrets detected".to_string());
    }
}

/// Collect distinct `${{ secrets.NAME }}` references in document order.
fn secrets_referenced(doc: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r"\$\{\{\s*secrets\.([A-Za-z0-9_]+)\s*\}\}") else {
        return Vec::new();
    };

    let mut seen = Vec::new();
    for captures in re.captures_iter(doc) {
        if let Some(name) = captures.get(1) {
            let name = name.as_str().to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
    }
    seen
}

/// Look up a string key in a YAML mapping.
fn get_key<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

/// The YAML 1.1 quirk: an unquoted `on:` key parses as boolean `true`.
/// Accept either representation.
fn has_trigger(map: &Mapping) -> bool {
    get_key(map, "on").is_some() || map.iter().any(|(k, _)| k.as_bool() == Some(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "name: ci\non:\n  push:\n    branches: [main]\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: actions/checkout@v4\n      - run: make test";

    #[test]
    fn test_valid_workflow_passes() {
        let report = validate_workflow(VALID);
        assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
        assert!(report.passes(ValidationLevel::Normal));
        assert!(report.passes(ValidationLevel::Strict));
    }

    #[test]
    fn test_on_key_boolean_quirk_accepted() {
        // Unquoted `on` deserializes as Bool(true) under YAML 1.1 rules; the
        // validator must not report the trigger as missing.
        let report = validate_workflow(VALID);
        assert!(!report.errors.iter().any(|e| e.contains("trigger")));
    }

    #[test]
    fn test_missing_trigger_is_error() {
        let doc = "name: ci\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: make";
        let report = validate_workflow(doc);
        assert!(report.errors.iter().any(|e| e.contains("trigger")));
        assert!(!report.passes(ValidationLevel::Normal));
    }

    #[test]
    fn test_missing_jobs_is_error() {
        let report = validate_workflow("name: ci\non: push");
        assert!(report.errors.iter().any(|e| e.contains("jobs")));
    }

    #[test]
    fn test_job_structure_errors() {
        let doc = "on: push\njobs:\n  build:\n    steps:\n      - name: no action here";
        let report = validate_workflow(doc);
        assert!(report.errors.iter().any(|e| e.contains("runs-on")));
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.contains("missing \"uses\" or \"run\""))
        );
    }

    #[test]
    fn test_missing_name_is_warning_only() {
        let doc = "on: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: make";
        let report = validate_workflow(doc);
        assert!(report.errors.is_empty());
        assert!(report.warnings.iter().any(|w| w.contains("name")));
        assert!(report.passes(ValidationLevel::Normal));
        assert!(!report.passes(ValidationLevel::Strict));
    }

    #[test]
    fn test_lenient_passes_anything() {
        let report = validate_workflow("not: [valid");
        assert!(!report.errors.is_empty());
        assert!(report.passes(ValidationLevel::Lenient));
    }

    #[test]
    fn test_unparseable_document() {
        let report = validate_workflow("{{{{");
        assert!(!report.errors.is_empty());
    }

    #[test]
    fn test_write_permissions_warn() {
        let doc = "on: push\njobs:\n  deploy:\n    runs-on: ubuntu-latest\n    permissions:\n      contents: write\n      id-token: write\n    steps:\n      - run: make deploy";
        let report = validate_workflow(doc);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_secrets_referenced_collected() {
        let doc = "name: ci\non: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: deploy\n        env:\n          KEY: ${{ secrets.AWS_ACCESS_KEY_ID }}\n          OTHER: ${{ secrets.AWS_SECRET_ACCESS_KEY }}\n          AGAIN: ${{ secrets.AWS_ACCESS_KEY_ID }}";
        let report = validate_workflow(doc);
        assert_eq!(
            report.secrets_referenced,
            vec!["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"]
        );
    }

    #[test]
    fn test_hardcoded_secret_warning() {
        let doc = "name: ci\non: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: login --password hunter2";
        let report = validate_workflow(doc);
        assert!(
            report
                .warnings
                .iter()
                .any(|w| w.contains("hardcoded secrets"))
        );
    }

    #[test]
    fn test_proper_secret_reference_no_warning() {
        let doc = "name: ci\non: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: login --password ${{ secrets.PASSWORD }}";
        let report = validate_workflow(doc);
        assert!(
            !report
                .warnings
                .iter()
                .any(|w| w.contains("hardcoded secrets"))
        );
    }

    #[test]
    fn test_failure_helper() {
        let report = ValidationReport::failure("no document");
        assert!(!report.passes(ValidationLevel::Normal));
        assert!(report.passes(ValidationLevel::Lenient));
    }
}
