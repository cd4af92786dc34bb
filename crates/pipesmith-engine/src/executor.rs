//! The workflow executor: drives one task through the fixed step sequence.
//!
//! Each step is invoked, its postconditions checked, its record appended to
//! the task store, and only then does the task advance. A store failure
//! therefore never lets a task move past an unrecorded step. One task's
//! steps run strictly sequentially; concurrency lives across tasks, each
//! driven by its own `execute` call over the shared store and clients.

use tokio_util::sync::CancellationToken;

use pipesmith_capability::{
    AgentInput, CapabilityInvocation, SharedCapabilityClient, extract_yaml,
};
use pipesmith_publish::SharedPublisher;
use pipesmith_store::SharedTaskStore;
use pipesmith_types::{
    CapabilityRole, ErrorKind, StepName, StepRecord, Submission, Subject, Task, TaskError,
    TaskStatus, new_task_id,
};

use crate::catalog::{StepPolicy, StepSpec, step_catalog};
use crate::error::{EngineError, Result, ValidationError};
use crate::prompt;
use crate::remediation::{
    CompletedOperation, PublishPlan, RemediationEngine, compute_plan, expected_operations,
};
use crate::validate::{ValidationLevel, ValidationReport, validate_workflow};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the workflow executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Bounded retries for the generation step. Large structured-text
    /// generation has a non-trivial failure rate; one adjusted retry
    /// recovers most of it.
    pub max_generation_attempts: u32,

    /// Gate applied to the generated workflow document.
    pub validation_level: ValidationLevel,

    /// Repository path the workflow file is written to.
    pub workflow_path: String,

    /// Open change requests as drafts.
    pub draft_requests: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_generation_attempts: 2,
            validation_level: ValidationLevel::Normal,
            workflow_path: ".github/workflows/ci.yml".to_string(),
            draft_requests: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Step context
// ─────────────────────────────────────────────────────────────────────────────

/// Payloads flowing between steps. Later steps read only what their
/// contract declares; advisory steps may leave their slot empty.
#[derive(Debug, Default)]
struct StepContext {
    scan_summary: Option<String>,
    analysis: Option<serde_json::Value>,
    design: Option<String>,
    security_review: Option<String>,
    workflow_yaml: Option<String>,
    validation: Option<ValidationReport>,
    publish_plan: Option<PublishPlan>,
}

impl StepContext {
    /// The most refined design text available: the security-reviewed version
    /// when that step succeeded, the raw design otherwise.
    fn design_context(&self) -> Option<&str> {
        self.security_review.as_deref().or(self.design.as_deref())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────────────────

/// Drives tasks through the step catalog.
pub struct WorkflowExecutor {
    store: SharedTaskStore,
    client: SharedCapabilityClient,
    publisher: SharedPublisher,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        store: SharedTaskStore,
        client: SharedCapabilityClient,
        publisher: SharedPublisher,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            client,
            publisher,
            config,
        }
    }

    /// Validate a submission and persist the pending task record.
    ///
    /// Every mandatory role must be bound to a capability instance up front;
    /// advisory roles may be absent and degrade at runtime.
    pub async fn prepare(&self, submission: &Submission) -> Result<Task> {
        let subject = Subject::parse(&submission.repo_url, &submission.branch)?;

        for spec in step_catalog() {
            if spec.policy == StepPolicy::Mandatory
                && let Some(role) = spec.kind.role()
                && submission.capability(role).is_none()
            {
                return Err(EngineError::MissingCapability { role });
            }
        }

        let id = submission.task_id.clone().unwrap_or_else(new_task_id);
        let task = Task::new(id, subject);
        self.store.create(&task).await?;

        tracing::info!(task_id = %task.id, subject = %task.subject, "Task prepared");
        Ok(task)
    }

    /// Convenience: prepare and execute in one call.
    pub async fn run(&self, submission: &Submission, cancel: CancellationToken) -> Result<Task> {
        let task = self.prepare(submission).await?;
        self.execute(task, submission, cancel).await
    }

    /// Drive a prepared task to a terminal state.
    ///
    /// Returns the final task record for both completed and failed runs; an
    /// `Err` means the store became unavailable and the outcome could not be
    /// recorded.
    pub async fn execute(
        &self,
        task: Task,
        submission: &Submission,
        cancel: CancellationToken,
    ) -> Result<Task> {
        self.store
            .set_status(&task.id, TaskStatus::InProgress, None)
            .await?;

        let mut ctx = StepContext::default();

        for spec in step_catalog() {
            if cancel.is_cancelled() {
                return self.finalize_failed(&task.id, cancelled_error(spec.name)).await;
            }

            tracing::info!(task_id = %task.id, step = %spec.name, "Executing step");

            let outcome = match spec.name {
                StepName::Generation => {
                    // Generation manages its own per-attempt records.
                    match self.step_generation(&task, submission, &mut ctx, &cancel).await {
                        Ok(()) => continue,
                        Err(e) => Err((e, true)),
                    }
                }
                _ => self
                    .execute_step(&spec, &task, submission, &mut ctx, &cancel)
                    .await
                    .map_err(|e| (e, false)),
            };

            match outcome {
                Ok(record) => {
                    self.store.append_step(&task.id, record).await?;
                }
                Err((EngineError::Store(e), _)) => return Err(e.into()),
                Err((e, _)) if matches!(e.error_kind(), ErrorKind::Cancelled) => {
                    return self.finalize_failed(&task.id, cancelled_error(spec.name)).await;
                }
                Err((e, already_recorded)) => {
                    if !already_recorded {
                        let record = StepRecord::error(
                            spec.name,
                            serde_json::json!({ "error": e.to_string() }),
                        );
                        self.store.append_step(&task.id, record).await?;
                    }

                    match spec.policy {
                        StepPolicy::Advisory => {
                            tracing::warn!(
                                task_id = %task.id,
                                step = %spec.name,
                                error = %e,
                                "Advisory step failed, continuing with reduced context"
                            );
                        }
                        StepPolicy::Mandatory => {
                            tracing::error!(
                                task_id = %task.id,
                                step = %spec.name,
                                error = %e,
                                "Mandatory step failed, terminating task"
                            );
                            let error = TaskError::new(spec.name, e.error_kind(), e.to_string());
                            return self.finalize_failed(&task.id, error).await;
                        }
                    }
                }
            }
        }

        self.store
            .set_status(&task.id, TaskStatus::Completed, None)
            .await?;
        tracing::info!(task_id = %task.id, "Task completed");
        Ok(self.store.get(&task.id).await?)
    }

    async fn finalize_failed(&self, task_id: &str, error: TaskError) -> Result<Task> {
        self.store
            .set_status(task_id, TaskStatus::Failed, Some(error))
            .await?;
        Ok(self.store.get(task_id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Step dispatch
    // ─────────────────────────────────────────────────────────────────────────

    async fn execute_step(
        &self,
        spec: &StepSpec,
        task: &Task,
        submission: &Submission,
        ctx: &mut StepContext,
        cancel: &CancellationToken,
    ) -> Result<StepRecord> {
        match spec.name {
            StepName::Ingestion => self.step_ingestion(task, submission, ctx, cancel).await,
            StepName::Analysis => self.step_analysis(task, submission, ctx, cancel).await,
            StepName::Design => self.step_design(task, submission, ctx, cancel).await,
            StepName::SecurityReview => {
                self.step_security_review(task, submission, ctx, cancel).await
            }
            StepName::Validation => self.step_validation(ctx),
            StepName::PrPreparation => self.step_pr_preparation(task, ctx),
            StepName::Publish => self.step_publish(spec, task, submission, ctx, cancel).await,
            StepName::Generation | StepName::GenerationAttempt(_) => Err(EngineError::Internal(
                "generation is dispatched outside the generic step path".to_string(),
            )),
        }
    }

    async fn invoke_role_agent(
        &self,
        task: &Task,
        submission: &Submission,
        role: CapabilityRole,
        instruction: String,
        cancel: &CancellationToken,
    ) -> Result<CapabilityInvocation> {
        let capability = submission
            .capability(role)
            .ok_or(EngineError::MissingCapability { role })?;
        let input = AgentInput::new(instruction, format!("{}-{}", task.id, role));
        Ok(self.client.invoke_agent(capability, input, cancel).await?)
    }

    async fn step_ingestion(
        &self,
        task: &Task,
        submission: &Submission,
        ctx: &mut StepContext,
        cancel: &CancellationToken,
    ) -> Result<StepRecord> {
        let invocation = self
            .invoke_role_agent(
                task,
                submission,
                CapabilityRole::RepoScanner,
                prompt::scanner(&task.subject),
                cancel,
            )
            .await?;

        let payload = serde_json::json!({ "summary": invocation.final_text });
        ctx.scan_summary = Some(invocation.final_text);
        Ok(StepRecord::success(StepName::Ingestion, payload))
    }

    async fn step_analysis(
        &self,
        task: &Task,
        submission: &Submission,
        ctx: &mut StepContext,
        cancel: &CancellationToken,
    ) -> Result<StepRecord> {
        let role = CapabilityRole::StaticAnalyzer;
        let capability = submission
            .capability(role)
            .ok_or(EngineError::MissingCapability { role })?;

        let payload = serde_json::json!({
            "repo_url": task.subject.repo_url,
            "branch": task.subject.branch,
            "analysis_types": ["dockerfile", "dependencies", "tests"],
        });
        let result = self.client.invoke_function(capability, payload, cancel).await?;

        ctx.analysis = Some(result.clone());
        Ok(StepRecord::success(StepName::Analysis, result))
    }

    async fn step_design(
        &self,
        task: &Task,
        submission: &Submission,
        ctx: &mut StepContext,
        cancel: &CancellationToken,
    ) -> Result<StepRecord> {
        let scan = ctx.scan_summary.as_deref().ok_or_else(|| {
            EngineError::Internal("design step requires the ingestion summary".to_string())
        })?;

        let invocation = self
            .invoke_role_agent(
                task,
                submission,
                CapabilityRole::PipelineDesigner,
                prompt::designer(scan),
                cancel,
            )
            .await?;

        let payload = serde_json::json!({ "design": invocation.final_text });
        ctx.design = Some(invocation.final_text);
        Ok(StepRecord::success(StepName::Design, payload))
    }

    async fn step_security_review(
        &self,
        task: &Task,
        submission: &Submission,
        ctx: &mut StepContext,
        cancel: &CancellationToken,
    ) -> Result<StepRecord> {
        let design = ctx.design.as_deref().ok_or_else(|| {
            EngineError::Internal("security review requires the design payload".to_string())
        })?;

        let invocation = self
            .invoke_role_agent(
                task,
                submission,
                CapabilityRole::SecurityReviewer,
                prompt::security_reviewer(design, ctx.analysis.as_ref()),
                cancel,
            )
            .await?;

        let payload = serde_json::json!({ "review": invocation.final_text });
        ctx.security_review = Some(invocation.final_text);
        Ok(StepRecord::success(StepName::SecurityReview, payload))
    }

    /// Bounded-retry generation: each attempt is recorded as its own step,
    /// and a failed attempt feeds its validation errors into the next one.
    async fn step_generation(
        &self,
        task: &Task,
        submission: &Submission,
        ctx: &mut StepContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let design = ctx
            .design_context()
            .ok_or_else(|| {
                EngineError::Internal("generation requires the design payload".to_string())
            })?
            .to_string();

        let mut feedback: Vec<String> = Vec::new();

        for attempt in 1..=self.config.max_generation_attempts {
            let step = StepName::GenerationAttempt(attempt);
            let instruction = prompt::generator(
                &design,
                if feedback.is_empty() {
                    None
                } else {
                    Some(&feedback)
                },
            );

            let invocation = match self
                .invoke_role_agent(task, submission, CapabilityRole::YamlGenerator, instruction, cancel)
                .await
            {
                Ok(invocation) => invocation,
                Err(e) if matches!(e.error_kind(), ErrorKind::Cancelled) => return Err(e),
                Err(e) => {
                    // Capability failures are not validation failures: no
                    // adjusted retry, the step terminates the task.
                    let record =
                        StepRecord::error(step, serde_json::json!({ "error": e.to_string() }));
                    self.store.append_step(&task.id, record).await?;
                    return Err(e);
                }
            };

            let (yaml, report) = match extract_yaml(&invocation.final_text) {
                Some(yaml) => {
                    let report = validate_workflow(&yaml);
                    (Some(yaml), report)
                }
                None => (
                    None,
                    ValidationReport::failure("no YAML document found in agent output"),
                ),
            };

            if report.passes(self.config.validation_level)
                && let Some(yaml) = yaml
            {
                let record = StepRecord::success(
                    step,
                    serde_json::json!({ "yaml": yaml, "validation": report }),
                );
                self.store.append_step(&task.id, record).await?;
                ctx.workflow_yaml = Some(yaml);
                ctx.validation = Some(report);
                return Ok(());
            }

            tracing::warn!(
                task_id = %task.id,
                attempt,
                errors = ?report.errors,
                "Generated workflow failed validation"
            );
            let record = StepRecord::error(step, serde_json::json!({ "validation": report }));
            self.store.append_step(&task.id, record).await?;
            feedback = report.errors;
        }

        Err(ValidationError::SchemaInvalid { errors: feedback }.into())
    }

    /// Record the passing validation report as the catalog's validation step.
    fn step_validation(&self, ctx: &mut StepContext) -> Result<StepRecord> {
        let report = ctx.validation.as_ref().ok_or_else(|| {
            EngineError::Internal("validation step requires a generation report".to_string())
        })?;
        Ok(StepRecord::success(
            StepName::Validation,
            serde_json::json!({ "validation": report, "level": self.config.validation_level }),
        ))
    }

    /// Derive the deterministic publish parameters from earlier payloads.
    /// These drive both the publish instruction and any remediation, so they
    /// must never depend on agent output.
    fn step_pr_preparation(&self, task: &Task, ctx: &mut StepContext) -> Result<StepRecord> {
        let secrets = ctx
            .validation
            .as_ref()
            .map(|r| r.secrets_referenced.clone())
            .unwrap_or_default();

        let plan = PublishPlan::derive(
            task,
            &self.config.workflow_path,
            &secrets,
            self.config.draft_requests,
        );
        let payload = serde_json::to_value(&plan)
            .map_err(|e| EngineError::Internal(format!("failed to encode publish plan: {}", e)))?;
        ctx.publish_plan = Some(plan);
        Ok(StepRecord::success(StepName::PrPreparation, payload))
    }

    async fn step_publish(
        &self,
        spec: &StepSpec,
        task: &Task,
        submission: &Submission,
        ctx: &mut StepContext,
        cancel: &CancellationToken,
    ) -> Result<StepRecord> {
        let plan = ctx.publish_plan.as_ref().ok_or_else(|| {
            EngineError::Internal("publish requires the pr-preparation payload".to_string())
        })?;
        let yaml = ctx.workflow_yaml.as_deref().ok_or_else(|| {
            EngineError::Internal("publish requires the generated workflow".to_string())
        })?;

        let expected = expected_operations(&spec.expected_operations, plan, yaml);

        let invocation = match self
            .invoke_role_agent(
                task,
                submission,
                CapabilityRole::PrManager,
                prompt::publisher(&task.subject, &plan.branch, &plan.path, yaml),
                cancel,
            )
            .await
        {
            Ok(invocation) => invocation,
            Err(e) if matches!(e.error_kind(), ErrorKind::Cancelled) => return Err(e),
            Err(e) => {
                // The agent produced no usable trace at all. Remediation
                // parameters come from the plan, so recovery proceeds with an
                // empty invocation covering every expected operation.
                tracing::warn!(
                    task_id = %task.id,
                    error = %e,
                    "Publish agent failed, falling back to direct remediation"
                );
                CapabilityInvocation::new(
                    submission
                        .capability(CapabilityRole::PrManager)
                        .unwrap_or_default(),
                )
            }
        };

        let remediation_plan = compute_plan(&expected, &invocation);
        if remediation_plan.is_empty() {
            let payload = serde_json::json!({
                "operations": invocation.succeeded_operations(),
                "summary": invocation.final_text,
            });
            return Ok(StepRecord::success(StepName::Publish, payload));
        }

        let missing: Vec<String> = remediation_plan
            .operation_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        tracing::warn!(
            task_id = %task.id,
            missing = ?missing,
            "{}",
            ValidationError::PostconditionUnmet {
                step: StepName::Publish,
                missing: missing.clone(),
            }
        );

        let engine = RemediationEngine::new(self.publisher.clone());
        let completed = engine.execute(&task.subject, &remediation_plan).await?;

        let request = completed.iter().find_map(|op| match op {
            CompletedOperation::OpenChangeRequest(request) => Some(request.clone()),
            _ => None,
        });
        let payload = serde_json::json!({
            "operations": invocation.succeeded_operations(),
            "remediated_operations": missing,
            "request": request,
        });
        Ok(StepRecord::success(StepName::Publish, payload).with_remediated())
    }
}

fn cancelled_error(step: StepName) -> TaskError {
    TaskError::new(step, ErrorKind::Cancelled, "task cancelled by caller")
}
