//! Publishing to package feeds and release hosts.
//!
//! Each configured destination is independent: one destination's failure is
//! captured into its own result and never corrupts a sibling's attempt. A
//! destination that already carries the resolved version is treated as
//! already satisfied, not as an error, unless `force` is set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{PublishCredentials, RunContext};
use crate::error::{Error, Result};
use crate::plan::Plan;
use crate::segment::{DestinationKind, PublishSegment};
use crate::staging::StagedModule;
use crate::utils::{command, io, paths};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PublishStatus {
    Published,
    AlreadySatisfied,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub destination: DestinationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub status: PublishStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl PublishResult {
    fn new(segment: &PublishSegment) -> Self {
        Self {
            destination: segment.destination,
            id: segment.id.clone(),
            repository: segment.repository.clone(),
            status: PublishStatus::Skipped,
            tag: None,
            assets: Vec::new(),
            message: None,
            warnings: Vec::new(),
        }
    }

    fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = PublishStatus::Failed;
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// Feed boundary
// ============================================================================

#[derive(Debug, Clone)]
pub struct FeedRegistration {
    pub repository: String,
    pub source_uri: Option<String>,
    pub publish_uri: Option<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedPublishRequest {
    pub module_name: String,
    pub version: String,
    pub repository: String,
    pub api_key: Option<String>,
    pub staging_path: PathBuf,
}

pub trait PackageRegistry: Send + Sync {
    /// Latest published version of a module; `None` repository means the
    /// tool's default feed.
    fn latest_version(&self, module: &str, repository: Option<&str>) -> Result<Option<String>>;
    fn is_registered(&self, repository: &str) -> Result<bool>;
    fn register(&self, registration: &FeedRegistration) -> Result<()>;
    fn unregister(&self, repository: &str) -> Result<()>;
    fn publish(&self, request: &FeedPublishRequest) -> Result<()>;
}

// ============================================================================
// Release-host boundary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn parse(value: &str) -> Result<Self> {
        match value.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok(Self {
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ => Err(Error::validation_invalid_argument(
                "publish.repository",
                format!("Expected 'owner/repo', got '{}'", value),
                None,
                None,
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub id: u64,
    #[serde(rename = "tag_name")]
    pub tag: String,
    pub prerelease: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseRequest {
    #[serde(rename = "tag_name")]
    pub tag: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub prerelease: bool,
}

pub trait ReleaseHost: Send + Sync {
    fn find_release(&self, repo: &RepoRef, tag: &str, token: Option<&str>)
        -> Result<Option<ReleaseInfo>>;
    fn create_release(
        &self,
        repo: &RepoRef,
        request: &ReleaseRequest,
        token: Option<&str>,
    ) -> Result<ReleaseInfo>;
    fn upload_asset(
        &self,
        repo: &RepoRef,
        release: &ReleaseInfo,
        file: &Path,
        token: Option<&str>,
    ) -> Result<()>;
}

// ============================================================================
// Destination publishing
// ============================================================================

fn publish_to_feed(
    segment: &PublishSegment,
    plan: &Plan,
    staged: &StagedModule,
    creds: &PublishCredentials,
    registry: &dyn PackageRegistry,
) -> PublishResult {
    let mut result = PublishResult::new(segment);
    let Some(repository) = segment.repository.clone() else {
        return result.failed("Feed destination has no repository name");
    };

    let has_custom_feed = segment.source_uri.is_some()
        || segment.publish_uri.is_some()
        || creds.credential.is_some();

    let mut registered_by_us = false;
    if segment.ensure_registered && has_custom_feed {
        match registry.is_registered(&repository) {
            Err(e) => return result.failed(e.message),
            Ok(true) => {}
            Ok(false) => {
                let registration = FeedRegistration {
                    repository: repository.clone(),
                    source_uri: segment.source_uri.clone(),
                    publish_uri: segment.publish_uri.clone(),
                    credential: creds.credential.clone(),
                };
                if let Err(e) = registry.register(&registration) {
                    return result.failed(e.message);
                }
                registered_by_us = true;
            }
        }
    }

    let unregister_if_needed = |result: &mut PublishResult| {
        if registered_by_us && segment.unregister_after_use {
            if let Err(e) = registry.unregister(&repository) {
                result
                    .warnings
                    .push(format!("Failed to unregister feed '{}': {}", repository, e.message));
            }
        }
    };

    match registry.latest_version(&plan.module_name, Some(&repository)) {
        Err(e) => {
            result
                .warnings
                .push(format!("Could not query latest version: {}", e.message));
        }
        Ok(Some(latest)) if latest == plan.resolved_version && !segment.force => {
            result.status = PublishStatus::AlreadySatisfied;
            result.message = Some(format!(
                "Version {} is already published to '{}'",
                latest, repository
            ));
            unregister_if_needed(&mut result);
            return result;
        }
        Ok(_) => {}
    }

    let request = FeedPublishRequest {
        module_name: plan.module_name.clone(),
        version: plan.resolved_version.clone(),
        repository: repository.clone(),
        api_key: creds.api_key.clone(),
        staging_path: staged.staging_path.clone(),
    };
    match registry.publish(&request) {
        Err(e) => {
            result = result.failed(e.message);
            unregister_if_needed(&mut result);
            result
        }
        Ok(()) => {
            result.status = PublishStatus::Published;
            unregister_if_needed(&mut result);
            log_status!("publish", "Pushed {} to {}", plan.module_name, repository);
            result
        }
    }
}

fn expand_assets(plan: &Plan, segment: &PublishSegment) -> Vec<PathBuf> {
    let mut assets = Vec::new();
    for pattern in &segment.assets {
        let full = format!("{}/{}", plan.project_root.display(), pattern);
        let Ok(entries) = glob::glob(&full) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()).filter(|p| p.is_file()) {
            if !assets.contains(&entry) {
                assets.push(entry);
            }
        }
    }
    assets.sort();
    assets
}

fn publish_to_release_host(
    segment: &PublishSegment,
    plan: &Plan,
    creds: &PublishCredentials,
    host: &dyn ReleaseHost,
) -> PublishResult {
    let mut result = PublishResult::new(segment);
    let Some(repository) = segment.repository.as_deref() else {
        return result.failed("Release destination has no repository");
    };
    let repo = match RepoRef::parse(repository) {
        Ok(repo) => repo,
        Err(e) => return result.failed(e.message),
    };

    let tag = segment
        .tag
        .clone()
        .unwrap_or_else(|| format!("v{}", plan.resolved_version));
    result.tag = Some(tag.clone());
    let token = creds.credential.as_deref().or(creds.api_key.as_deref());

    let existing = match host.find_release(&repo, &tag, token) {
        Ok(existing) => existing,
        Err(e) => return result.failed(e.message),
    };

    let release = match existing {
        Some(_) if !segment.force => {
            result.status = PublishStatus::AlreadySatisfied;
            result.message = Some(format!("Release '{}' already exists", tag));
            return result;
        }
        Some(release) => release,
        None => {
            let request = ReleaseRequest {
                tag: tag.clone(),
                name: format!("{} {}", plan.module_name, plan.resolved_version),
                body: plan.manifest.release_notes.clone(),
                // Releases stay pre-releases unless explicitly overridden.
                prerelease: segment.prerelease.unwrap_or(true),
            };
            match host.create_release(&repo, &request, token) {
                Ok(release) => release,
                Err(e) => return result.failed(e.message),
            }
        }
    };

    for asset in expand_assets(plan, segment) {
        match host.upload_asset(&repo, &release, &asset, token) {
            Ok(()) => result.assets.push(paths::file_name(&asset)),
            Err(e) => {
                return result.failed(format!(
                    "Failed to upload asset {}: {}",
                    asset.display(),
                    e.message
                ));
            }
        }
    }

    result.status = PublishStatus::Published;
    log_status!("publish", "Released {} as {}", plan.module_name, tag);
    result
}

/// Publish the staged module to one configured destination.
pub fn publish_destination(
    segment: &PublishSegment,
    index: usize,
    plan: &Plan,
    staged: &StagedModule,
    registry: &dyn PackageRegistry,
    host: &dyn ReleaseHost,
    ctx: &RunContext,
) -> PublishResult {
    let fallback = PublishCredentials::default();
    let creds = ctx.publish_credentials.get(index).unwrap_or(&fallback);

    match segment.destination {
        DestinationKind::Feed => publish_to_feed(segment, plan, staged, creds, registry),
        DestinationKind::GitHub => publish_to_release_host(segment, plan, creds, host),
    }
}

// ============================================================================
// Command-line feed registry
// ============================================================================

/// Registry backed by an external package-manager CLI with
/// `latest/registered/register/unregister/publish` subcommands.
pub struct CommandPackageRegistry {
    program: String,
    timeout: Duration,
}

impl CommandPackageRegistry {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn run_tool(&self, args: &[String], context: &str) -> Result<String> {
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output =
            command::run_with_timeout(&self.program, &arg_refs, None, self.timeout, context)?;
        if !output.success {
            return Err(Error::publish_failed(
                format!("{} failed: {}", context, output.error_text()),
                None,
            ));
        }
        Ok(output.stdout.trim().to_string())
    }
}

impl PackageRegistry for CommandPackageRegistry {
    fn latest_version(&self, module: &str, repository: Option<&str>) -> Result<Option<String>> {
        let mut args = vec!["latest".to_string(), module.to_string()];
        if let Some(repository) = repository {
            args.push("--repository".to_string());
            args.push(repository.to_string());
        }
        let stdout = self.run_tool(&args, "query latest version")?;
        Ok(if stdout.is_empty() { None } else { Some(stdout) })
    }

    fn is_registered(&self, repository: &str) -> Result<bool> {
        let args = vec!["registered".to_string(), repository.to_string()];
        Ok(self.run_tool(&args, "query feed registration")? == "true")
    }

    fn register(&self, registration: &FeedRegistration) -> Result<()> {
        let mut args = vec!["register".to_string(), registration.repository.clone()];
        if let Some(uri) = &registration.source_uri {
            args.push("--source-uri".to_string());
            args.push(uri.clone());
        }
        if let Some(uri) = &registration.publish_uri {
            args.push("--publish-uri".to_string());
            args.push(uri.clone());
        }
        if let Some(credential) = &registration.credential {
            use base64::{engine::general_purpose::STANDARD, Engine as _};
            args.push("--credential".to_string());
            args.push(STANDARD.encode(credential));
        }
        self.run_tool(&args, "register feed").map(|_| ())
    }

    fn unregister(&self, repository: &str) -> Result<()> {
        let args = vec!["unregister".to_string(), repository.to_string()];
        self.run_tool(&args, "unregister feed").map(|_| ())
    }

    fn publish(&self, request: &FeedPublishRequest) -> Result<()> {
        let mut args = vec![
            "publish".to_string(),
            request.staging_path.to_string_lossy().to_string(),
            "--repository".to_string(),
            request.repository.clone(),
        ];
        if let Some(api_key) = &request.api_key {
            args.push("--api-key".to_string());
            args.push(api_key.clone());
        }
        self.run_tool(&args, "publish module").map(|_| ())
    }
}

// ============================================================================
// GitHub release host
// ============================================================================

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_UPLOADS: &str = "https://uploads.github.com";

pub struct GitHubReleaseHost {
    api_base: String,
    uploads_base: String,
    timeout: Duration,
}

impl GitHubReleaseHost {
    pub fn new(timeout: Duration) -> Self {
        Self {
            api_base: GITHUB_API.to_string(),
            uploads_base: GITHUB_UPLOADS.to_string(),
            timeout,
        }
    }

    /// Point the host at a compatible self-hosted API.
    pub fn with_base(api_base: impl Into<String>, uploads_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            uploads_base: uploads_base.into(),
            timeout: Duration::from_secs(30),
        }
    }

    fn client(&self) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .user_agent(format!("shipwright/{}", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))
    }

    fn authorize(
        request: reqwest::blocking::RequestBuilder,
        token: Option<&str>,
    ) -> reqwest::blocking::RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl ReleaseHost for GitHubReleaseHost {
    fn find_release(
        &self,
        repo: &RepoRef,
        tag: &str,
        token: Option<&str>,
    ) -> Result<Option<ReleaseInfo>> {
        let url = format!(
            "{}/repos/{}/{}/releases/tags/{}",
            self.api_base, repo.owner, repo.repo, tag
        );
        let response = Self::authorize(self.client()?.get(&url), token)
            .send()
            .map_err(|e| Error::publish_failed(e.to_string(), Some("GitHub".to_string())))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::publish_failed(
                format!("GitHub release lookup failed: HTTP {}", response.status()),
                Some("GitHub".to_string()),
            ));
        }

        let release: ReleaseInfo = response.json().map_err(|e| {
            Error::internal_json(e.to_string(), Some("parse release response".to_string()))
        })?;
        Ok(Some(release))
    }

    fn create_release(
        &self,
        repo: &RepoRef,
        request: &ReleaseRequest,
        token: Option<&str>,
    ) -> Result<ReleaseInfo> {
        let url = format!("{}/repos/{}/{}/releases", self.api_base, repo.owner, repo.repo);
        let response = Self::authorize(self.client()?.post(&url), token)
            .json(request)
            .send()
            .map_err(|e| Error::publish_failed(e.to_string(), Some("GitHub".to_string())))?;

        if !response.status().is_success() {
            return Err(Error::publish_failed(
                format!("GitHub release creation failed: HTTP {}", response.status()),
                Some("GitHub".to_string()),
            ));
        }

        response.json().map_err(|e| {
            Error::internal_json(e.to_string(), Some("parse release response".to_string()))
        })
    }

    fn upload_asset(
        &self,
        repo: &RepoRef,
        release: &ReleaseInfo,
        file: &Path,
        token: Option<&str>,
    ) -> Result<()> {
        let name = paths::file_name(file);
        let url = format!(
            "{}/repos/{}/{}/releases/{}/assets?name={}",
            self.uploads_base, repo.owner, repo.repo, release.id, name
        );
        let bytes = io::read_bytes(file, "read release asset")?;

        let response = Self::authorize(self.client()?.post(&url), token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .map_err(|e| Error::publish_failed(e.to_string(), Some("GitHub".to_string())))?;

        if !response.status().is_success() {
            return Err(Error::publish_failed(
                format!("Asset upload failed: HTTP {}", response.status()),
                Some("GitHub".to_string()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::CancelToken;
    use crate::plan::{build_plan, StaticVersionLookup};
    use crate::spec::ModuleSpec;
    use crate::staging::ExportSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// In-memory registry recording calls; optionally failing pushes.
    pub(crate) struct FakeRegistry {
        pub latest: Option<String>,
        pub publish_calls: AtomicUsize,
        pub registered: Mutex<Vec<String>>,
        pub unregistered: Mutex<Vec<String>>,
        pub fail_publish: bool,
    }

    impl FakeRegistry {
        pub fn new(latest: Option<&str>) -> Self {
            Self {
                latest: latest.map(str::to_string),
                publish_calls: AtomicUsize::new(0),
                registered: Mutex::new(Vec::new()),
                unregistered: Mutex::new(Vec::new()),
                fail_publish: false,
            }
        }
    }

    impl PackageRegistry for FakeRegistry {
        fn latest_version(
            &self,
            _module: &str,
            _repository: Option<&str>,
        ) -> Result<Option<String>> {
            Ok(self.latest.clone())
        }

        fn is_registered(&self, _repository: &str) -> Result<bool> {
            Ok(false)
        }

        fn register(&self, registration: &FeedRegistration) -> Result<()> {
            self.registered
                .lock()
                .unwrap()
                .push(registration.repository.clone());
            Ok(())
        }

        fn unregister(&self, repository: &str) -> Result<()> {
            self.unregistered.lock().unwrap().push(repository.to_string());
            Ok(())
        }

        fn publish(&self, _request: &FeedPublishRequest) -> Result<()> {
            self.publish_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_publish {
                return Err(Error::publish_failed("feed rejected the package", None));
            }
            Ok(())
        }
    }

    /// Release host storing created releases in memory.
    pub(crate) struct FakeHost {
        pub existing_tag: Option<String>,
        pub created: Mutex<Vec<String>>,
        pub uploaded: Mutex<Vec<String>>,
    }

    impl FakeHost {
        pub fn new(existing_tag: Option<&str>) -> Self {
            Self {
                existing_tag: existing_tag.map(str::to_string),
                created: Mutex::new(Vec::new()),
                uploaded: Mutex::new(Vec::new()),
            }
        }
    }

    impl ReleaseHost for FakeHost {
        fn find_release(
            &self,
            _repo: &RepoRef,
            tag: &str,
            _token: Option<&str>,
        ) -> Result<Option<ReleaseInfo>> {
            Ok(self.existing_tag.as_deref().filter(|t| *t == tag).map(|t| {
                ReleaseInfo {
                    id: 7,
                    tag: t.to_string(),
                    prerelease: true,
                }
            }))
        }

        fn create_release(
            &self,
            _repo: &RepoRef,
            request: &ReleaseRequest,
            _token: Option<&str>,
        ) -> Result<ReleaseInfo> {
            self.created.lock().unwrap().push(request.tag.clone());
            Ok(ReleaseInfo {
                id: 1,
                tag: request.tag.clone(),
                prerelease: request.prerelease,
            })
        }

        fn upload_asset(
            &self,
            _repo: &RepoRef,
            _release: &ReleaseInfo,
            file: &Path,
            _token: Option<&str>,
        ) -> Result<()> {
            self.uploaded.lock().unwrap().push(paths::file_name(file));
            Ok(())
        }
    }

    fn ctx() -> RunContext {
        RunContext {
            run_id: "publish-test".to_string(),
            temp_root: std::env::temp_dir(),
            command_timeout: Duration::from_secs(5),
            concurrency: 2,
            cancel: CancelToken::new(),
            publish_credentials: vec![PublishCredentials::default()],
        }
    }

    fn plan_with(segments: &str, dir: &Path) -> (Plan, StagedModule) {
        std::fs::create_dir_all(dir.join("src")).unwrap();
        let staging = dir.join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("Sample.json"), r#"{"name":"Sample"}"#).unwrap();

        let raw = format!(
            r#"{{
                "schemaVersion": 1,
                "build": {{
                    "moduleName": "Sample",
                    "sourceRoot": "{}",
                    "projectRoot": "{}",
                    "versionExpression": "1.2.3"
                }},
                "segments": {}
            }}"#,
            dir.join("src").display(),
            dir.display(),
            segments
        );
        let spec = ModuleSpec::from_json(&raw).unwrap();
        let plan = build_plan(&spec, &StaticVersionLookup::default()).unwrap();
        let staged = StagedModule {
            staging_path: staging.clone(),
            manifest_path: staging.join("Sample.json"),
            exports: ExportSet::default(),
        };
        (plan, staged)
    }

    #[test]
    fn feed_publish_pushes_new_versions() {
        let dir = tempdir().unwrap();
        let (plan, staged) = plan_with(
            r#"[{"type":"Publish","destination":"Feed","repository":"ModuleFeed"}]"#,
            dir.path(),
        );
        let registry = FakeRegistry::new(Some("1.2.2"));
        let host = FakeHost::new(None);

        let result =
            publish_destination(&plan.publishes[0], 0, &plan, &staged, &registry, &host, &ctx());

        assert_eq!(result.status, PublishStatus::Published);
        assert_eq!(registry.publish_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn identical_version_is_already_satisfied_without_force() {
        let dir = tempdir().unwrap();
        let (plan, staged) = plan_with(
            r#"[{"type":"Publish","destination":"Feed","repository":"ModuleFeed"}]"#,
            dir.path(),
        );
        let registry = FakeRegistry::new(Some("1.2.3"));
        let host = FakeHost::new(None);

        let result =
            publish_destination(&plan.publishes[0], 0, &plan, &staged, &registry, &host, &ctx());

        assert_eq!(result.status, PublishStatus::AlreadySatisfied);
        assert_eq!(registry.publish_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn force_republishes_identical_versions() {
        let dir = tempdir().unwrap();
        let (plan, staged) = plan_with(
            r#"[{"type":"Publish","destination":"Feed","repository":"ModuleFeed","force":true}]"#,
            dir.path(),
        );
        let registry = FakeRegistry::new(Some("1.2.3"));
        let host = FakeHost::new(None);

        let result =
            publish_destination(&plan.publishes[0], 0, &plan, &staged, &registry, &host, &ctx());

        assert_eq!(result.status, PublishStatus::Published);
        assert_eq!(registry.publish_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_destination_creates_tagged_prerelease() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/Sample-1.2.3.zip"), "zip").unwrap();

        let (plan, staged) = plan_with(
            r#"[{"type":"Publish","destination":"GitHub","repository":"owner/sample","assets":["dist/*.zip"]}]"#,
            dir.path(),
        );
        let registry = FakeRegistry::new(None);
        let host = FakeHost::new(None);

        let result =
            publish_destination(&plan.publishes[0], 0, &plan, &staged, &registry, &host, &ctx());

        assert_eq!(result.status, PublishStatus::Published);
        assert_eq!(result.tag.as_deref(), Some("v1.2.3"));
        assert_eq!(host.created.lock().unwrap().as_slice(), ["v1.2.3"]);
        assert_eq!(
            host.uploaded.lock().unwrap().as_slice(),
            ["Sample-1.2.3.zip"]
        );
    }

    #[test]
    fn existing_release_is_already_satisfied() {
        let dir = tempdir().unwrap();
        let (plan, staged) = plan_with(
            r#"[{"type":"Publish","destination":"GitHub","repository":"owner/sample"}]"#,
            dir.path(),
        );
        let registry = FakeRegistry::new(None);
        let host = FakeHost::new(Some("v1.2.3"));

        let result =
            publish_destination(&plan.publishes[0], 0, &plan, &staged, &registry, &host, &ctx());

        assert_eq!(result.status, PublishStatus::AlreadySatisfied);
        assert!(host.created.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_repo_reference_fails_that_destination_only() {
        let dir = tempdir().unwrap();
        let (plan, staged) = plan_with(
            r#"[{"type":"Publish","destination":"GitHub","repository":"not-a-repo-ref"}]"#,
            dir.path(),
        );
        let registry = FakeRegistry::new(None);
        let host = FakeHost::new(None);

        let result =
            publish_destination(&plan.publishes[0], 0, &plan, &staged, &registry, &host, &ctx());

        assert_eq!(result.status, PublishStatus::Failed);
        assert!(result.message.as_deref().unwrap().contains("owner/repo"));
    }
}
