//! The fixed step catalog, represented as data.
//!
//! One ordered list of step specifications consumed by the executor's
//! generic loop. Keeping the sequence as data keeps the state machine's
//! transition table auditable independently of any one step's logic.

use pipesmith_types::{CapabilityRole, StepName};

use crate::remediation::PublishOperationKind;

/// How a step is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Invokes a reasoning agent fulfilling the given role.
    Agent(CapabilityRole),
    /// Invokes a deterministic processing function fulfilling the given role.
    Function(CapabilityRole),
    /// Computed locally from earlier step payloads; no remote call.
    Internal,
}

impl StepKind {
    /// The capability role this step needs bound, if any.
    pub fn role(&self) -> Option<CapabilityRole> {
        match self {
            StepKind::Agent(role) | StepKind::Function(role) => Some(*role),
            StepKind::Internal => None,
        }
    }
}

/// Whether a step's failure terminates the task.
///
/// Injected per step rather than hard-coded in the executor: an advisory
/// step's failure degrades gracefully into the next step with reduced
/// context, a mandatory step's failure is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    Mandatory,
    Advisory,
}

/// One entry of the step catalog.
#[derive(Debug, Clone)]
pub struct StepSpec {
    pub name: StepName,
    pub kind: StepKind,
    pub policy: StepPolicy,
    /// Sub-operations the capability is mandated to perform; checked against
    /// the invocation trace and remediated directly when absent.
    pub expected_operations: Vec<PublishOperationKind>,
}

impl StepSpec {
    fn new(name: StepName, kind: StepKind, policy: StepPolicy) -> Self {
        Self {
            name,
            kind,
            policy,
            expected_operations: Vec::new(),
        }
    }

    fn with_expected_operations(mut self, operations: &[PublishOperationKind]) -> Self {
        self.expected_operations = operations.to_vec();
        self
    }
}

/// The fixed step sequence. Order here IS execution order.
pub fn step_catalog() -> Vec<StepSpec> {
    vec![
        StepSpec::new(
            StepName::Ingestion,
            StepKind::Agent(CapabilityRole::RepoScanner),
            StepPolicy::Mandatory,
        ),
        StepSpec::new(
            StepName::Analysis,
            StepKind::Function(CapabilityRole::StaticAnalyzer),
            StepPolicy::Advisory,
        ),
        StepSpec::new(
            StepName::Design,
            StepKind::Agent(CapabilityRole::PipelineDesigner),
            StepPolicy::Mandatory,
        ),
        StepSpec::new(
            StepName::SecurityReview,
            StepKind::Agent(CapabilityRole::SecurityReviewer),
            StepPolicy::Advisory,
        ),
        StepSpec::new(
            StepName::Generation,
            StepKind::Agent(CapabilityRole::YamlGenerator),
            StepPolicy::Mandatory,
        ),
        StepSpec::new(StepName::Validation, StepKind::Internal, StepPolicy::Mandatory),
        StepSpec::new(
            StepName::PrPreparation,
            StepKind::Internal,
            StepPolicy::Mandatory,
        ),
        StepSpec::new(
            StepName::Publish,
            StepKind::Agent(CapabilityRole::PrManager),
            StepPolicy::Mandatory,
        )
        .with_expected_operations(&PublishOperationKind::DEPENDENCY_ORDER),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_is_fixed() {
        let names: Vec<StepName> = step_catalog().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                StepName::Ingestion,
                StepName::Analysis,
                StepName::Design,
                StepName::SecurityReview,
                StepName::Generation,
                StepName::Validation,
                StepName::PrPreparation,
                StepName::Publish,
            ]
        );
    }

    #[test]
    fn test_only_publish_declares_expected_operations() {
        for spec in step_catalog() {
            if spec.name == StepName::Publish {
                assert_eq!(spec.expected_operations.len(), 3);
            } else {
                assert!(spec.expected_operations.is_empty());
            }
        }
    }

    #[test]
    fn test_advisory_steps() {
        let advisory: Vec<StepName> = step_catalog()
            .iter()
            .filter(|s| s.policy == StepPolicy::Advisory)
            .map(|s| s.name)
            .collect();
        assert_eq!(advisory, vec![StepName::Analysis, StepName::SecurityReview]);
    }

    #[test]
    fn test_mandatory_roles() {
        let roles: Vec<CapabilityRole> = step_catalog()
            .iter()
            .filter(|s| s.policy == StepPolicy::Mandatory)
            .filter_map(|s| s.kind.role())
            .collect();
        assert_eq!(
            roles,
            vec![
                CapabilityRole::RepoScanner,
                CapabilityRole::PipelineDesigner,
                CapabilityRole::YamlGenerator,
                CapabilityRole::PrManager,
            ]
        );
    }
}
