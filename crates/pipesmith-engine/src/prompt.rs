//! Instruction builders for the reasoning-agent roles.
//!
//! Each step's free-text instruction is assembled from the subject and the
//! payloads of earlier steps. Content lives here, away from the executor's
//! control flow.

use pipesmith_types::Subject;

/// Instruction for the repository scanner.
pub fn scanner(subject: &Subject) -> String {
    format!(
        "Analyze repository: {} (branch: {}). Extract all manifest files, detect languages, \
         frameworks, and infrastructure components.",
        subject.repo_url, subject.branch
    )
}

/// Instruction for the pipeline designer.
pub fn designer(scan_summary: &str) -> String {
    format!(
        "Based on this repository analysis: {}, design a CI/CD pipeline with appropriate stages \
         for build, test, scan, container build, registry push, and deployment.",
        scan_summary
    )
}

/// Instruction for the security reviewer. Static-analysis findings are
/// appended when the analysis step produced them; their absence just means a
/// leaner review.
pub fn security_reviewer(design: &str, analysis: Option<&serde_json::Value>) -> String {
    let mut instruction = format!(
        "Review this pipeline design for security and compliance: {}. Ensure SAST/SCA scanning, \
         secrets scanning, and least privilege permissions.",
        design
    );

    if let Some(analysis) = analysis {
        let rendered =
            serde_json::to_string_pretty(analysis).unwrap_or_else(|_| analysis.to_string());
        instruction.push_str("\n\nStatic Analysis Results:\n");
        instruction.push_str(&rendered);
    }

    instruction
}

/// Instruction for the workflow generator. On a retry the previous attempt's
/// validation errors are fed back so the agent can correct them.
pub fn generator(design: &str, validation_feedback: Option<&[String]>) -> String {
    let mut instruction = format!(
        "Generate a GitHub Actions workflow YAML based on this pipeline design: {}. Include all \
         stages, proper secrets management, and cloud credentials configuration.",
        design
    );

    if let Some(errors) = validation_feedback
        && !errors.is_empty()
    {
        instruction.push_str(
            "\n\nA previous attempt failed validation with the following errors; fix every one \
             of them:\n",
        );
        for error in errors {
            instruction.push_str("- ");
            instruction.push_str(error);
            instruction.push('\n');
        }
    }

    instruction
}

/// Instruction for the publish manager.
pub fn publisher(subject: &Subject, branch: &str, path: &str, yaml: &str) -> String {
    format!(
        "Create a draft change request for repository {} against base branch {}. Create branch \
         {}, add the generated workflow file at {}, and open the request with a comprehensive \
         description explaining the pipeline stages and required secrets. Workflow content:\n\n{}",
        subject.repo_url, subject.branch, branch, path, yaml
    )
}
