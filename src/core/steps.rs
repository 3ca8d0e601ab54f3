//! Step Sequencer: derive the ordered step list from a plan.
//!
//! A pure function of the plan — two calls over the same plan always yield
//! the same list, and a step with no enabling configuration is omitted
//! entirely rather than emitted as a no-op. The order is a fixed total
//! order, not a dependency graph.

use heck::ToKebabCase;
use serde::Serialize;

use crate::plan::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    InstallDependencies,
    Stage,
    Merge,
    PatchManifest,
    ExtractHelp,
    WriteDocs,
    ExternalHelp,
    FormatStaging,
    FormatProject,
    Sign,
    ConsistencyStaging,
    ConsistencyProject,
    Compatibility,
    ModuleValidation,
    Test,
    Artefact,
    Publish,
    Install,
    Cleanup,
}

/// One planned pipeline step. Keys are stable strings unique within a run;
/// progress consumers index by key. Artefact/publish steps carry the index
/// of their segment in the plan's ordered lists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub kind: StepKind,
    pub key: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artefact: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<usize>,
}

impl PipelineStep {
    fn new(kind: StepKind, key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            title: title.into(),
            artefact: None,
            publish: None,
        }
    }
}

/// Key for an indexed segment step. The 1-based index plus kind plus the
/// optional id keep keys stable under reordering of *other* segment types.
fn indexed_key(prefix: &str, index: usize, kind: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("{}:{:02}:{}:{}", prefix, index + 1, kind, id.to_kebab_case()),
        None => format!("{}:{:02}:{}", prefix, index + 1, kind),
    }
}

/// Derive the ordered, conditional step list for a plan.
pub fn sequence(plan: &Plan) -> Vec<PipelineStep> {
    let mut steps = Vec::new();

    if plan.import.is_some() {
        steps.push(PipelineStep::new(
            StepKind::InstallDependencies,
            "deps",
            "Install required modules",
        ));
    }

    // The three mandatory build sub-steps.
    steps.push(PipelineStep::new(
        StepKind::Stage,
        "build:stage",
        "Prepare staging directory",
    ));
    steps.push(PipelineStep::new(
        StepKind::Merge,
        "build:merge",
        format!("Build {} to staging", plan.module_name),
    ));
    steps.push(PipelineStep::new(
        StepKind::PatchManifest,
        "build:manifest",
        format!("Patch manifest to {}", plan.resolved_version),
    ));

    if plan.docs.is_some() {
        steps.push(PipelineStep::new(
            StepKind::ExtractHelp,
            "docs:extract",
            "Extract help topics",
        ));
        steps.push(PipelineStep::new(
            StepKind::WriteDocs,
            "docs:write",
            "Write markdown documentation",
        ));
        if plan.docs.as_ref().is_some_and(|d| d.external_help) {
            steps.push(PipelineStep::new(
                StepKind::ExternalHelp,
                "docs:external",
                "Generate external help",
            ));
        }
    }

    if let Some(formatting) = &plan.formatting {
        if formatting.staging {
            steps.push(PipelineStep::new(
                StepKind::FormatStaging,
                "format:staging",
                "Format staged sources",
            ));
        }
        if formatting.project {
            steps.push(PipelineStep::new(
                StepKind::FormatProject,
                "format:project",
                "Format project sources",
            ));
        }
    }

    if plan.signing.is_some() {
        steps.push(PipelineStep::new(
            StepKind::Sign,
            "sign",
            "Sign staged files",
        ));
    }

    if plan.validation.consistency_staging.is_some() {
        steps.push(PipelineStep::new(
            StepKind::ConsistencyStaging,
            "check:consistency:staging",
            "Check staging file consistency",
        ));
    }
    if plan.validation.consistency_project.is_some() {
        steps.push(PipelineStep::new(
            StepKind::ConsistencyProject,
            "check:consistency:project",
            "Check project file consistency",
        ));
    }
    if plan.validation.compatibility.is_some() {
        steps.push(PipelineStep::new(
            StepKind::Compatibility,
            "check:compatibility",
            "Check edition compatibility",
        ));
    }
    if plan.validation.module_validation {
        steps.push(PipelineStep::new(
            StepKind::ModuleValidation,
            "check:module",
            "Validate staged module",
        ));
    }

    if plan.tests.is_some() {
        steps.push(PipelineStep::new(
            StepKind::Test,
            "test",
            "Run module tests",
        ));
    }

    for (index, artefact) in plan.artefacts.iter().enumerate() {
        let key = indexed_key("artefact", index, artefact.kind.as_str(), artefact.id.as_deref());
        let mut step = PipelineStep::new(
            StepKind::Artefact,
            key,
            format!("Package {} artefact", artefact.kind.as_str()),
        );
        step.artefact = Some(index);
        steps.push(step);
    }

    for (index, publish) in plan.publishes.iter().enumerate() {
        let key = indexed_key(
            "publish",
            index,
            publish.destination.as_str(),
            publish.id.as_deref(),
        );
        let mut step = PipelineStep::new(
            StepKind::Publish,
            key,
            format!("Publish to {}", publish.destination.as_str()),
        );
        step.publish = Some(index);
        steps.push(step);
    }

    if plan.install.enabled {
        steps.push(PipelineStep::new(
            StepKind::Install,
            "install",
            format!("Install {} locally", plan.module_name),
        ));
    }

    if plan.staging_synthesized && plan.delete_staging_after_run {
        steps.push(PipelineStep::new(
            StepKind::Cleanup,
            "cleanup",
            "Remove synthesized staging",
        ));
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{build_plan, StaticVersionLookup};
    use crate::spec::ModuleSpec;
    use tempfile::tempdir;

    fn plan_for(segments: &str, install: Option<&str>) -> Plan {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        let install = install.map(|i| format!(r#","install": {}"#, i)).unwrap_or_default();
        let raw = format!(
            r#"{{
                "schemaVersion": 1,
                "build": {{
                    "moduleName": "Sample",
                    "sourceRoot": "{}",
                    "projectRoot": "{}",
                    "versionExpression": "1.0.0"
                }},
                "segments": {}{}
            }}"#,
            dir.path().join("src").display(),
            dir.path().display(),
            segments,
            install
        );
        let spec = ModuleSpec::from_json(&raw).unwrap();
        build_plan(&spec, &StaticVersionLookup::default()).unwrap()
    }

    #[test]
    fn minimal_plan_yields_exactly_the_three_build_sub_steps() {
        let plan = plan_for("[]", None);
        let steps = sequence(&plan);
        let keys: Vec<&str> = steps.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["build:stage", "build:merge", "build:manifest"]);
    }

    #[test]
    fn sequence_is_deterministic() {
        let plan = plan_for(
            r#"[
                {"type":"Signing","certificateThumbprint":"AABBCC"},
                {"type":"Artefact","kind":"Packed","path":"dist"},
                {"type":"Publish","destination":"Feed","repository":"ModuleFeed"}
            ]"#,
            Some(r#"{"enabled": true, "roots": ["/tmp/mods"]}"#),
        );
        let first = sequence(&plan);
        let second = sequence(&plan);
        let first_keys: Vec<&str> = first.iter().map(|s| s.key.as_str()).collect();
        let second_keys: Vec<&str> = second.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(first_keys, second_keys);
    }

    #[test]
    fn full_configuration_orders_steps_correctly() {
        let plan = plan_for(
            r#"[
                {"type":"ImportModules"},
                {"type":"Documentation","generateExternalHelp":true},
                {"type":"Formatting","formatProject":true},
                {"type":"Signing","certificateThumbprint":"AABBCC"},
                {"type":"FileConsistency","project":true},
                {"type":"Compatibility"},
                {"type":"Validation"},
                {"type":"Test"},
                {"type":"Artefact","kind":"Packed","path":"dist","id":"Release Zip"},
                {"type":"Artefact","kind":"Unpacked","path":"out"},
                {"type":"Publish","destination":"GitHub","repository":"owner/sample"},
                {"type":"Publish","destination":"Feed","repository":"ModuleFeed","id":"Main Feed"}
            ]"#,
            Some(r#"{"enabled": true, "roots": ["/tmp/mods"]}"#),
        );
        let steps = sequence(&plan);
        let keys: Vec<&str> = steps.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "deps",
                "build:stage",
                "build:merge",
                "build:manifest",
                "docs:extract",
                "docs:write",
                "docs:external",
                "format:staging",
                "format:project",
                "sign",
                "check:consistency:staging",
                "check:consistency:project",
                "check:compatibility",
                "check:module",
                "test",
                "artefact:01:Packed:release-zip",
                "artefact:02:Unpacked",
                "publish:01:GitHub",
                "publish:02:Feed:main-feed",
                "install",
                "cleanup",
            ]
        );
    }

    #[test]
    fn artefact_keys_reference_segment_indexes() {
        let plan = plan_for(
            r#"[
                {"type":"Artefact","kind":"Packed","path":"dist"},
                {"type":"Artefact","kind":"Script","path":"scripts"}
            ]"#,
            None,
        );
        let steps = sequence(&plan);
        let artefact_steps: Vec<&PipelineStep> =
            steps.iter().filter(|s| s.kind == StepKind::Artefact).collect();
        assert_eq!(artefact_steps.len(), 2);
        assert_eq!(artefact_steps[0].artefact, Some(0));
        assert_eq!(artefact_steps[1].artefact, Some(1));
        assert_eq!(artefact_steps[1].key, "artefact:02:Script");
    }

    #[test]
    fn disabled_install_emits_no_install_step() {
        let plan = plan_for("[]", Some(r#"{"enabled": false, "roots": ["/tmp/mods"]}"#));
        let steps = sequence(&plan);
        assert!(steps.iter().all(|s| s.kind != StepKind::Install));
    }
}
