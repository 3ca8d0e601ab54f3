//! Pipeline Runner: execute the planned steps in order.
//!
//! Strictly sequential at the step level — later steps observe the
//! filesystem effects of earlier ones. Failure semantics follow three
//! tiers: configuration errors never reach the runner; stage-fatal errors
//! (staging build, manifest patch, threshold-breaching checks) abort the
//! remaining steps; per-item errors are captured into their own results and
//! the run continues. Cancellation is observed at every step boundary.

use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::artefact::{self, ArtefactResult};
use crate::checks::{self, CheckReport, CheckStatus};
use crate::context::RunContext;
use crate::deps::{self, DependencyResult, DependencyStatus};
use crate::docs::{DocsReport, HelpTopic};
use crate::error::Result;
use crate::format;
use crate::install::{self, InstallReport};
use crate::manifest::ManifestPatch;
use crate::plan::Plan;
use crate::publish::{self, PublishResult, PublishStatus};
use crate::signing::{self, SigningReport};
use crate::staging::{StagedModule, StagingSession};
use crate::steps::{self, PipelineStep, StepKind};
use crate::toolchain::Toolchain;
use crate::utils::command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub key: String,
    pub kind: StepKind,
    pub title: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_steps: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub command: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Terminal result of one pipeline run, suitable for serialization.
/// Exit-code mapping belongs to the CLI layer consuming this.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub module_name: String,
    pub resolved_version: String,
    pub started_at: String,
    pub finished_at: String,
    pub status: RunStatus,
    pub summary: RunSummary,
    pub steps: Vec<StepRecord>,
    pub plan: Plan,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<DocsReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artefacts: Vec<ArtefactResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub publishes: Vec<PublishResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallReport>,
}

/// Outcome of one step body: status, payload, error, warnings, and whether
/// the rest of the pipeline must be aborted.
struct StepOutcome {
    status: StepStatus,
    data: Option<Value>,
    error: Option<String>,
    warnings: Vec<String>,
    abort: bool,
}

impl StepOutcome {
    fn success(data: Option<Value>) -> Self {
        Self {
            status: StepStatus::Success,
            data,
            error: None,
            warnings: Vec::new(),
            abort: false,
        }
    }

    fn failed(error: impl Into<String>, data: Option<Value>, abort: bool) -> Self {
        Self {
            status: StepStatus::Failed,
            data,
            error: Some(error.into()),
            warnings: Vec::new(),
            abort,
        }
    }

    fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

#[derive(Default)]
struct RunState {
    session: Option<StagingSession>,
    staged: Option<StagedModule>,
    topics: Vec<HelpTopic>,
    docs: DocsReport,
    skip_remaining_publishes: bool,
}

fn to_data<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

/// Parse a pass percentage out of test-runner output ("87.5% passed").
fn parse_pass_percent(output: &str) -> Option<f64> {
    crate::utils::parser::extract_first(output, r"(\d+(?:\.\d+)?)\s*%\s*pass")?
        .parse::<f64>()
        .ok()
}

/// Execute the plan's steps against the toolchain and collect the report.
pub fn run(plan: &Plan, ctx: &RunContext, tools: &Toolchain) -> Result<RunReport> {
    let planned = steps::sequence(plan);
    let started_at = chrono::Utc::now();

    let mut report = RunReport {
        run_id: ctx.run_id.clone(),
        module_name: plan.module_name.clone(),
        resolved_version: plan.resolved_version.clone(),
        started_at: started_at.to_rfc3339(),
        finished_at: String::new(),
        status: RunStatus::Success,
        summary: RunSummary {
            total_steps: planned.len(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
        },
        steps: Vec::with_capacity(planned.len()),
        plan: plan.clone(),
        dependencies: Vec::new(),
        signing: None,
        checks: Vec::new(),
        docs: None,
        tests: None,
        artefacts: Vec::new(),
        publishes: Vec::new(),
        install: None,
    };

    let mut state = RunState::default();
    let mut aborted = false;
    let mut cancelled = false;

    for step in planned {
        if ctx.cancel.is_cancelled() {
            cancelled = true;
        }

        if cancelled || aborted {
            let reason = if cancelled {
                "Run cancelled"
            } else {
                "Skipped after a fatal failure upstream"
            };
            report.steps.push(StepRecord {
                key: step.key.clone(),
                kind: step.kind,
                title: step.title.clone(),
                status: StepStatus::Skipped,
                duration_ms: 0,
                data: None,
                error: None,
                warnings: vec![reason.to_string()],
            });
            continue;
        }

        let timer = Instant::now();
        let outcome = execute_step(&step, plan, ctx, tools, &mut state, &mut report);
        if outcome.abort {
            aborted = true;
        }

        report.steps.push(StepRecord {
            key: step.key,
            kind: step.kind,
            title: step.title,
            status: outcome.status,
            duration_ms: timer.elapsed().as_millis() as u64,
            data: outcome.data,
            error: outcome.error,
            warnings: outcome.warnings,
        });
    }

    for record in &report.steps {
        match record.status {
            StepStatus::Success => report.summary.succeeded += 1,
            StepStatus::Failed => report.summary.failed += 1,
            StepStatus::Skipped => report.summary.skipped += 1,
        }
    }

    report.status = if cancelled {
        RunStatus::Cancelled
    } else if aborted {
        RunStatus::Failed
    } else if report.summary.failed > 0 && report.summary.succeeded > 0 {
        RunStatus::PartialSuccess
    } else if report.summary.failed > 0 {
        RunStatus::Failed
    } else {
        RunStatus::Success
    };
    report.finished_at = chrono::Utc::now().to_rfc3339();

    Ok(report)
}

fn execute_step(
    step: &PipelineStep,
    plan: &Plan,
    ctx: &RunContext,
    tools: &Toolchain,
    state: &mut RunState,
    report: &mut RunReport,
) -> StepOutcome {
    match step.kind {
        StepKind::InstallDependencies => run_deps(plan, ctx, tools, report),
        StepKind::Stage => run_stage(plan, ctx, state),
        StepKind::Merge => run_merge(plan, tools, state),
        StepKind::PatchManifest => run_patch_manifest(plan, tools, state),
        StepKind::ExtractHelp => run_extract_help(plan, tools, state),
        StepKind::WriteDocs => run_write_docs(plan, tools, state, report),
        StepKind::ExternalHelp => run_external_help(tools, state, report),
        StepKind::FormatStaging => run_format_target(plan, ctx, state, true),
        StepKind::FormatProject => run_format_target(plan, ctx, state, false),
        StepKind::Sign => run_sign(plan, ctx, tools, state, report),
        StepKind::ConsistencyStaging => run_consistency(plan, state, report, true),
        StepKind::ConsistencyProject => run_consistency(plan, state, report, false),
        StepKind::Compatibility => run_compatibility(plan, state, report),
        StepKind::ModuleValidation => run_module_validation(plan, tools, state, report),
        StepKind::Test => run_tests(plan, ctx, state, report),
        StepKind::Artefact => run_artefact(step, plan, ctx, tools, state, report),
        StepKind::Publish => run_publish(step, plan, ctx, tools, state, report),
        StepKind::Install => run_install(plan, tools, state, report),
        StepKind::Cleanup => run_cleanup(plan, state),
    }
}

fn staged_or_abort(state: &RunState) -> std::result::Result<&StagedModule, StepOutcome> {
    state.staged.as_ref().ok_or_else(|| {
        StepOutcome::failed("No staged module available", None, true)
    })
}

fn run_deps(
    plan: &Plan,
    ctx: &RunContext,
    tools: &Toolchain,
    report: &mut RunReport,
) -> StepOutcome {
    let Some(import) = &plan.import else {
        return StepOutcome::success(None);
    };

    let results = deps::install_dependencies(
        &plan.required_modules,
        import,
        &plan.skip_modules,
        tools.installer.as_ref(),
        ctx,
    );
    let data = to_data(&results);
    let failed: Vec<String> = results
        .iter()
        .filter(|r| r.status == DependencyStatus::Failed)
        .map(|r| r.name.clone())
        .collect();
    report.dependencies = results;

    if failed.is_empty() {
        StepOutcome::success(data)
    } else {
        // Dependency failures are reported, not fatal.
        StepOutcome::failed(
            format!("Failed to install: {}", failed.join(", ")),
            data,
            false,
        )
    }
}

fn run_stage(plan: &Plan, ctx: &RunContext, state: &mut RunState) -> StepOutcome {
    let session = match StagingSession::prepare(&plan.build, ctx) {
        Ok(session) => session,
        Err(e) => return StepOutcome::failed(e.message, None, true),
    };

    let mut warnings = Vec::new();
    for raw in &plan.commands.before_merge {
        let (program, args) = match command::split_template(raw, &plan.project_root) {
            Ok(split) => split,
            Err(e) => return StepOutcome::failed(e.message, None, true),
        };
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let outcome = command::run_with_timeout(
            &program,
            &arg_refs,
            Some(&plan.project_root),
            ctx.command_timeout,
            "pre-merge command",
        );
        match outcome {
            Ok(output) if output.success => {}
            Ok(output) => {
                return StepOutcome::failed(
                    format!("Pre-merge command failed ({}): {}", raw, output.error_text()),
                    None,
                    true,
                );
            }
            Err(e) if plan.commands.fail_on_missing_commands => {
                return StepOutcome::failed(e.message, None, true);
            }
            Err(e) => warnings.push(format!("Pre-merge command unavailable ({}): {}", raw, e.message)),
        }
    }

    let data = serde_json::json!({
        "stagingPath": session.root.to_string_lossy(),
        "synthesized": session.synthesized,
    });
    state.session = Some(session);
    StepOutcome::success(Some(data)).with_warnings(warnings)
}

fn run_merge(plan: &Plan, tools: &Toolchain, state: &mut RunState) -> StepOutcome {
    let Some(session) = &state.session else {
        return StepOutcome::failed("Staging session not prepared", None, true);
    };

    match tools.builder.build_to_staging(&plan.build, &session.root) {
        Ok(staged) => {
            let data = to_data(&staged);
            state.staged = Some(staged);
            StepOutcome::success(data)
        }
        Err(e) => StepOutcome::failed(e.message, None, true),
    }
}

fn run_patch_manifest(plan: &Plan, tools: &Toolchain, state: &mut RunState) -> StepOutcome {
    let staged = match staged_or_abort(state) {
        Ok(staged) => staged,
        Err(outcome) => return outcome,
    };

    let patch = ManifestPatch {
        version: Some(plan.resolved_version.clone()),
        prerelease: plan.prerelease.clone(),
        clear_prerelease: false,
        author: plan.manifest.author.clone(),
        company_name: plan.manifest.company_name.clone(),
        copyright: plan.manifest.copyright.clone(),
        description: plan.manifest.description.clone(),
        tags: (!plan.manifest.tags.is_empty()).then(|| plan.manifest.tags.clone()),
        project_uri: plan.manifest.project_uri.clone(),
        license_uri: plan.manifest.license_uri.clone(),
        icon_uri: plan.manifest.icon_uri.clone(),
        compatible_editions: (!plan.compatible_editions.is_empty())
            .then(|| plan.compatible_editions.clone()),
        required_modules: (!plan.required_modules.is_empty())
            .then(|| plan.required_modules.clone()),
        external_module_dependencies: (!plan.external_module_dependencies.is_empty())
            .then(|| plan.external_module_dependencies.clone()),
        functions_to_export: Some(staged.exports.functions.clone()),
        aliases_to_export: Some(staged.exports.aliases.clone()),
        release_notes: plan.manifest.release_notes.clone(),
    };

    match tools.manifest.write_metadata(&staged.manifest_path, &patch) {
        Ok(()) => StepOutcome::success(to_data(&patch)),
        // Nothing downstream can be trusted without a valid manifest.
        Err(e) => StepOutcome::failed(e.message, None, true),
    }
}

fn run_extract_help(plan: &Plan, tools: &Toolchain, state: &mut RunState) -> StepOutcome {
    let staged = match staged_or_abort(state) {
        Ok(staged) => staged,
        Err(outcome) => return outcome,
    };

    match tools
        .help
        .extract(&staged.staging_path, &plan.build.script_extensions)
    {
        Ok(topics) => {
            let data = serde_json::json!({ "topics": topics.len() });
            state.topics = topics;
            state.docs.topics = state.topics.len();
            StepOutcome::success(Some(data))
        }
        Err(e) => StepOutcome::failed(e.message, None, false),
    }
}

fn run_write_docs(
    plan: &Plan,
    tools: &Toolchain,
    state: &mut RunState,
    report: &mut RunReport,
) -> StepOutcome {
    let Some(docs) = &plan.docs else {
        return StepOutcome::success(None);
    };
    let out_dir = plan.project_root.join(&docs.path);

    match tools.help.write_markdown(&state.topics, &out_dir) {
        Ok(written) => {
            state.docs.files_written = written;
            report.docs = Some(state.docs.clone());
            StepOutcome::success(Some(serde_json::json!({ "filesWritten": written })))
        }
        Err(e) => StepOutcome::failed(e.message, None, false),
    }
}

fn run_external_help(
    tools: &Toolchain,
    state: &mut RunState,
    report: &mut RunReport,
) -> StepOutcome {
    let staged = match staged_or_abort(state) {
        Ok(staged) => staged,
        Err(outcome) => return outcome,
    };

    match tools.help.generate_external(&state.topics, &staged.staging_path) {
        Ok(path) => {
            state.docs.external_help_path = Some(path.to_string_lossy().to_string());
            report.docs = Some(state.docs.clone());
            StepOutcome::success(Some(serde_json::json!({
                "externalHelpPath": path.to_string_lossy()
            })))
        }
        Err(e) => StepOutcome::failed(e.message, None, false),
    }
}

fn run_format_target(
    plan: &Plan,
    ctx: &RunContext,
    state: &mut RunState,
    staging_target: bool,
) -> StepOutcome {
    let Some(settings) = &plan.formatting else {
        return StepOutcome::success(None);
    };

    let target = if staging_target {
        match staged_or_abort(state) {
            Ok(staged) => staged.staging_path.clone(),
            Err(outcome) => return outcome,
        }
    } else {
        plan.project_root.clone()
    };

    match format::run_format(&target, settings, ctx) {
        Ok(result) => StepOutcome::success(to_data(&result)),
        Err(e) => StepOutcome::failed(e.message, None, false),
    }
}

fn run_sign(
    plan: &Plan,
    ctx: &RunContext,
    tools: &Toolchain,
    state: &mut RunState,
    report: &mut RunReport,
) -> StepOutcome {
    let Some(settings) = &plan.signing else {
        return StepOutcome::success(None);
    };
    let staged = match staged_or_abort(state) {
        Ok(staged) => staged,
        Err(outcome) => return outcome,
    };

    let signing_report =
        signing::sign_staging(&staged.staging_path, settings, tools.signer.as_ref(), ctx);
    let data = to_data(&signing_report);
    let mut warnings = Vec::new();
    if signing_report.unknown_error > 0 {
        warnings.push(format!(
            "{} signing outcomes could not be classified",
            signing_report.unknown_error
        ));
    }

    let success = signing_report.success;
    let failed = signing_report.failed;
    report.signing = Some(signing_report);

    if success {
        StepOutcome::success(data).with_warnings(warnings)
    } else {
        StepOutcome::failed(format!("{} files failed to sign", failed), data, false)
            .with_warnings(warnings)
    }
}

fn check_outcome(report: &mut RunReport, check: CheckReport) -> StepOutcome {
    let data = to_data(&check);
    let status = check.status;
    let flagged = check.flagged;
    let fails_run = check.fails_run();
    report.checks.push(check);

    match status {
        CheckStatus::Pass => StepOutcome::success(data),
        CheckStatus::Warning => StepOutcome::success(data)
            .with_warnings(vec![format!("{} files flagged", flagged)]),
        // Threshold breached: the caller's configuration makes this fatal.
        CheckStatus::Fail => StepOutcome::failed(
            format!("{} files flagged beyond the configured threshold", flagged),
            data,
            fails_run,
        ),
    }
}

fn run_consistency(
    plan: &Plan,
    state: &mut RunState,
    report: &mut RunReport,
    staging_target: bool,
) -> StepOutcome {
    let (settings, root, name) = if staging_target {
        let staged = match staged_or_abort(state) {
            Ok(staged) => staged,
            Err(outcome) => return outcome,
        };
        (
            plan.validation.consistency_staging.as_ref(),
            staged.staging_path.clone(),
            "consistency:staging",
        )
    } else {
        (
            plan.validation.consistency_project.as_ref(),
            plan.project_root.clone(),
            "consistency:project",
        )
    };
    let Some(settings) = settings else {
        return StepOutcome::success(None);
    };

    match checks::check_consistency(&root, settings, &plan.build.script_extensions, name) {
        Ok(check) => check_outcome(report, check),
        Err(e) => StepOutcome::failed(e.message, None, false),
    }
}

fn run_compatibility(plan: &Plan, state: &mut RunState, report: &mut RunReport) -> StepOutcome {
    let Some(settings) = &plan.validation.compatibility else {
        return StepOutcome::success(None);
    };
    let staged = match staged_or_abort(state) {
        Ok(staged) => staged,
        Err(outcome) => return outcome,
    };

    match checks::check_compatibility(
        &staged.staging_path,
        settings,
        &plan.build.script_extensions,
    ) {
        Ok(check) => check_outcome(report, check),
        Err(e) => StepOutcome::failed(e.message, None, false),
    }
}

fn run_module_validation(
    plan: &Plan,
    tools: &Toolchain,
    state: &mut RunState,
    report: &mut RunReport,
) -> StepOutcome {
    let staged = match staged_or_abort(state) {
        Ok(staged) => staged,
        Err(outcome) => return outcome,
    };
    let check = checks::check_module(plan, staged, tools.manifest.as_ref());
    check_outcome(report, check)
}

fn run_tests(
    plan: &Plan,
    ctx: &RunContext,
    state: &mut RunState,
    report: &mut RunReport,
) -> StepOutcome {
    let Some(settings) = &plan.tests else {
        return StepOutcome::success(None);
    };
    let staged = match staged_or_abort(state) {
        Ok(staged) => staged,
        Err(outcome) => return outcome,
    };

    let (program, args) = match command::split_template(&settings.command, &staged.staging_path) {
        Ok(split) => split,
        Err(e) => return StepOutcome::failed(e.message, None, false),
    };
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let outcome = command::run_with_timeout(
        &program,
        &arg_refs,
        Some(&plan.project_root),
        ctx.command_timeout,
        "run module tests",
    );

    let test_report = match outcome {
        Ok(output) => {
            let pass_percent = parse_pass_percent(&output.stdout);
            let success = output.success
                || matches!(
                    (pass_percent, settings.minimum_pass_percent),
                    (Some(actual), Some(minimum)) if actual >= minimum
                );
            TestReport {
                command: settings.command.clone(),
                success,
                pass_percent,
                output: if output.stdout.trim().is_empty() {
                    None
                } else {
                    Some(output.stdout.trim().to_string())
                },
            }
        }
        Err(e) => TestReport {
            command: settings.command.clone(),
            success: false,
            pass_percent: None,
            output: Some(e.message),
        },
    };

    let data = to_data(&test_report);
    let success = test_report.success;
    report.tests = Some(test_report);

    if success {
        StepOutcome::success(data)
    } else {
        // An untested module must not be packaged, published, or installed.
        StepOutcome::failed("Module tests failed", data, true)
    }
}

fn run_artefact(
    step: &PipelineStep,
    plan: &Plan,
    ctx: &RunContext,
    tools: &Toolchain,
    state: &mut RunState,
    report: &mut RunReport,
) -> StepOutcome {
    let Some(index) = step.artefact else {
        return StepOutcome::failed("Artefact step without a segment reference", None, false);
    };
    let staged = match staged_or_abort(state) {
        Ok(staged) => staged,
        Err(outcome) => return outcome,
    };

    let result = artefact::package_artefact(
        &plan.artefacts[index],
        plan,
        staged,
        tools.installer.as_ref(),
        ctx,
    );
    let data = to_data(&result);
    let success = result.success;
    let error = result.error.clone();
    report.artefacts.push(result);

    if success {
        StepOutcome::success(data)
    } else {
        StepOutcome::failed(
            error.unwrap_or_else(|| "Artefact packaging failed".to_string()),
            data,
            false,
        )
    }
}

fn run_publish(
    step: &PipelineStep,
    plan: &Plan,
    ctx: &RunContext,
    tools: &Toolchain,
    state: &mut RunState,
    report: &mut RunReport,
) -> StepOutcome {
    let Some(index) = step.publish else {
        return StepOutcome::failed("Publish step without a segment reference", None, false);
    };
    let segment = &plan.publishes[index];

    if state.skip_remaining_publishes {
        let result = PublishResult {
            destination: segment.destination,
            id: segment.id.clone(),
            repository: segment.repository.clone(),
            status: PublishStatus::Skipped,
            tag: None,
            assets: Vec::new(),
            message: Some("Skipped: an earlier destination failed with failFast".to_string()),
            warnings: Vec::new(),
        };
        let data = to_data(&result);
        report.publishes.push(result);
        return StepOutcome {
            status: StepStatus::Skipped,
            data,
            error: None,
            warnings: vec!["Earlier publish destination failed with failFast".to_string()],
            abort: false,
        };
    }

    let staged = match staged_or_abort(state) {
        Ok(staged) => staged,
        Err(outcome) => return outcome,
    };

    let result = publish::publish_destination(
        segment,
        index,
        plan,
        staged,
        tools.registry.as_ref(),
        tools.releases.as_ref(),
        ctx,
    );
    let data = to_data(&result);
    let failed = result.status == PublishStatus::Failed;
    let message = result.message.clone();
    let warnings = result.warnings.clone();
    report.publishes.push(result);

    if failed {
        if segment.fail_fast {
            state.skip_remaining_publishes = true;
        }
        StepOutcome::failed(
            message.unwrap_or_else(|| "Publish failed".to_string()),
            data,
            false,
        )
        .with_warnings(warnings)
    } else {
        StepOutcome::success(data).with_warnings(warnings)
    }
}

fn run_install(
    plan: &Plan,
    tools: &Toolchain,
    state: &mut RunState,
    report: &mut RunReport,
) -> StepOutcome {
    let staged = match staged_or_abort(state) {
        Ok(staged) => staged,
        Err(outcome) => return outcome,
    };

    let install_report = install::install_module(plan, staged, tools.manifest.as_ref());
    let data = to_data(&install_report);
    let success = install_report.success;
    let failed_roots: Vec<String> = install_report
        .roots
        .iter()
        .filter(|r| r.error.is_some())
        .map(|r| r.root.clone())
        .collect();
    report.install = Some(install_report);

    if success {
        StepOutcome::success(data)
    } else {
        StepOutcome::failed(
            format!("Install failed for: {}", failed_roots.join(", ")),
            data,
            false,
        )
    }
}

fn run_cleanup(plan: &Plan, state: &mut RunState) -> StepOutcome {
    let Some(session) = state.session.take() else {
        return StepOutcome::success(None);
    };

    match std::fs::remove_dir_all(&session.root) {
        Ok(()) => StepOutcome::success(Some(serde_json::json!({
            "removed": session.root.to_string_lossy()
        }))),
        Err(e) if plan.fail_on_delete_error => {
            StepOutcome::failed(format!("Failed to remove staging: {}", e), None, false)
        }
        Err(e) => StepOutcome::success(None).with_warnings(vec![format!(
            "Failed to remove staging {}: {}",
            session.root.display(),
            e
        )]),
    }
}
