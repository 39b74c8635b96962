//! The provisioning executor: a strictly sequential converge loop.
//!
//! Steps run one at a time, in plan order — later steps may depend on host
//! state produced by earlier ones and no dependency graph is declared, so
//! sequential order is the only correctness guarantee available. The first
//! fatal failure aborts the run; best-effort steps log their failure and let
//! the run continue. Re-invoking a failed run is the recovery mechanism:
//! converged steps simply report `Unchanged`.

use std::sync::Arc;

use crate::config::{Plan, Step, StepKind, StepSpec};
use crate::error::EngineError;
use crate::exec::Executor;
use crate::fetch::Fetcher;
use crate::logging;
use crate::resources::{
    Resource, ResourceState, archive::ArchiveResource, container, container::ContainerResource,
    file::FileResource, package::PackageManager, package::PackageResource,
    service::ServiceResource, template::TemplateResource, user::UserResource,
};
use crate::secrets::SecretProvider;

/// Terminal state of an executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Current state already matched the desired state.
    Unchanged,
    /// A mutation was applied to converge the target.
    Applied,
    /// Dry run: the step diverges but nothing was mutated.
    WouldChange,
    /// Resolution or application failed.
    Failed,
}

/// Outcome of one step in one run.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Display label of the step.
    pub name: String,
    /// Resource kind.
    pub kind: StepKind,
    /// Identity of the target resource.
    pub identity: String,
    /// Terminal status.
    pub status: StepStatus,
    /// Whether the step was marked best-effort in the plan.
    pub best_effort: bool,
    /// Classified error for failed steps.
    pub error: Option<EngineError>,
}

impl ExecutionResult {
    /// Whether this step mutated the host.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.status == StepStatus::Applied
    }

    /// Whether this failure should abort a run / fail the exit code.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.status == StepStatus::Failed && !self.best_effort
    }
}

/// Ordered record of one engine invocation. Immutable once produced; used
/// for reporting only.
#[derive(Debug, Default)]
pub struct Run {
    /// One entry per executed step, in execution order.
    pub results: Vec<ExecutionResult>,
}

impl Run {
    /// First fatal failure, if the run aborted.
    #[must_use]
    pub fn fatal_failure(&self) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.is_fatal())
    }

    /// True when every executed step ended `Unchanged`, `Applied` or
    /// `WouldChange` (best-effort failures do not count against success).
    #[must_use]
    pub fn success(&self) -> bool {
        self.fatal_failure().is_none()
    }

    /// Number of steps that mutated the host.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.results.iter().filter(|r| r.changed()).count()
    }

    /// Number of steps with a given status.
    #[must_use]
    pub fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Shared dependencies for a run.
///
/// Everything behind a trait object so tests can swap in mock executors,
/// canned fetchers and static secret providers.
pub struct RunContext {
    /// Command execution seam.
    pub executor: Arc<dyn Executor>,
    /// Secret resolution seam.
    pub secrets: Arc<dyn SecretProvider>,
    /// Remote payload seam.
    pub fetcher: Arc<dyn Fetcher>,
    /// Resolve and report divergence without mutating.
    pub dry_run: bool,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("executor", &"<dyn Executor>")
            .field("secrets", &"<dyn SecretProvider>")
            .field("fetcher", &"<dyn Fetcher>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl RunContext {
    /// Production context: real executor, environment secrets, HTTP fetcher.
    #[must_use]
    pub fn system(dry_run: bool) -> Self {
        Self {
            executor: Arc::new(crate::exec::SystemExecutor),
            secrets: Arc::new(crate::secrets::EnvSecretProvider),
            fetcher: Arc::new(crate::fetch::HttpFetcher::new()),
            dry_run,
        }
    }
}

/// Execute the selected steps of `plan`, strictly in order.
///
/// `selector` filters steps by tag intersection; an empty selector selects
/// everything. The returned [`Run`] contains one result per executed step —
/// steps after a fatal failure are not executed and not recorded.
#[must_use]
pub fn run(plan: &Plan, selector: &[String], ctx: &RunContext) -> Run {
    let mut results = Vec::new();

    for step in plan.steps.iter().filter(|s| s.selected_by(selector)) {
        logging::stage(&step.display_name());
        let (status, error) = execute_step(step, plan, ctx);

        match (status, &error) {
            (StepStatus::Unchanged, _) => tracing::info!("unchanged"),
            (StepStatus::Applied, _) => tracing::info!("applied"),
            (StepStatus::WouldChange, _) => {}
            (StepStatus::Failed, Some(e)) if step.best_effort => {
                tracing::warn!("best-effort step failed: {e}");
            }
            (StepStatus::Failed, Some(e)) => {
                tracing::error!("{} '{}' failed: {e}", step.kind(), step.identity());
            }
            (StepStatus::Failed, None) => {}
        }

        let result = ExecutionResult {
            name: step.display_name(),
            kind: step.kind(),
            identity: step.identity(),
            status,
            best_effort: step.best_effort,
            error,
        };
        let fatal = result.is_fatal();
        results.push(result);
        if fatal {
            break;
        }
    }

    Run { results }
}

/// Run one step through its state machine:
/// resolve, compare, and apply when divergent.
fn execute_step(step: &Step, plan: &Plan, ctx: &RunContext) -> (StepStatus, Option<EngineError>) {
    let attempt = || -> Result<StepStatus, EngineError> {
        let resource = build_resource(step, plan, ctx)?;
        tracing::debug!("resolving {}", resource.describe());

        match resource.current_state()? {
            ResourceState::Correct => Ok(StepStatus::Unchanged),
            state if ctx.dry_run => {
                let detail = match state {
                    ResourceState::Missing => "missing".to_string(),
                    ResourceState::Divergent { current } => current,
                    ResourceState::Correct => String::new(),
                };
                tracing::info!("would apply ({detail})");
                Ok(StepStatus::WouldChange)
            }
            _ => {
                resource.apply()?;
                Ok(StepStatus::Applied)
            }
        }
    };

    match attempt() {
        Ok(status) => (status, None),
        Err(e) => (StepStatus::Failed, Some(e)),
    }
}

/// Construct the per-kind adapter for a step.
fn build_resource<'a>(
    step: &'a Step,
    plan: &'a Plan,
    ctx: &'a RunContext,
) -> Result<Box<dyn Resource + 'a>, EngineError> {
    let executor: &dyn Executor = ctx.executor.as_ref();

    Ok(match &step.spec {
        StepSpec::Package(spec) => {
            let manager = match &spec.manager {
                Some(name) => PackageManager::from_name(name)?,
                None => PackageManager::detect(executor)?,
            };
            Box::new(PackageResource::new(spec.package.clone(), manager, executor))
        }
        StepSpec::Service(spec) => Box::new(ServiceResource::new(
            spec.service.clone(),
            spec.state,
            spec.enabled,
            executor,
        )),
        StepSpec::User(spec) => Box::new(UserResource::new(
            spec.user.clone(),
            spec.home.clone(),
            spec.shell.clone(),
            spec.system,
            executor,
        )),
        StepSpec::File(spec) => Box::new(FileResource::from_spec(
            spec,
            ctx.secrets.as_ref(),
            executor,
        )?),
        StepSpec::Archive(spec) => Box::new(ArchiveResource::new(
            spec.url.clone(),
            spec.dest.clone(),
            &spec.sha256,
            ctx.fetcher.as_ref(),
        )),
        StepSpec::Template(spec) => Box::new(TemplateResource::new(
            plan.dir.join(&spec.src),
            spec.dest.clone(),
            spec.owner.clone(),
            spec.group.clone(),
            spec.mode.as_deref(),
            &plan.vars,
            ctx.secrets.as_ref(),
            executor,
        )?),
        StepSpec::Container(spec) => {
            let engine = match &spec.engine {
                Some(name) => name.clone(),
                None => container::detect_engine(executor)?,
            };
            Box::new(ContainerResource::new(
                spec.container.clone(),
                spec.image.clone(),
                spec.ports.clone(),
                spec.volumes.clone(),
                spec.env.clone(),
                spec.restart.clone(),
                engine,
                executor,
            ))
        }
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::exec::test_helpers::MockExecutor;
    use crate::fetch::sha256_hex;
    use crate::fetch::test_helpers::StaticFetcher;
    use crate::secrets::StaticSecretProvider;
    use std::path::Path;

    fn load_plan(dir: &Path, content: &str) -> Plan {
        let path = dir.join("plan.toml");
        std::fs::write(&path, content).unwrap();
        Plan::load(&path).unwrap()
    }

    fn file_ctx() -> RunContext {
        RunContext {
            executor: Arc::new(MockExecutor::with_responses(vec![])),
            secrets: Arc::new(StaticSecretProvider::new()),
            fetcher: Arc::new(StaticFetcher::new()),
            dry_run: false,
        }
    }

    #[test]
    fn file_steps_apply_then_report_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let plan = load_plan(
            dir.path(),
            &format!(
                "[[step]]\nkind = \"file\"\npath = \"{0}/www\"\nstate = \"directory\"\n\n\
                 [[step]]\nkind = \"file\"\npath = \"{0}/www/index.html\"\ncontent = \"hi\"\n",
                dir.path().display()
            ),
        );

        let first = run(&plan, &[], &file_ctx());
        assert_eq!(first.results.len(), 2);
        assert!(first.results.iter().all(|r| r.status == StepStatus::Applied));
        assert!(first.success());

        let second = run(&plan, &[], &file_ctx());
        assert!(
            second
                .results
                .iter()
                .all(|r| r.status == StepStatus::Unchanged),
            "re-running an unchanged plan must be a no-op"
        );
        assert_eq!(second.changed_count(), 0);
    }

    #[test]
    fn selector_restricts_to_intersecting_tags_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let plan = load_plan(
            dir.path(),
            &format!(
                "[[step]]\nkind = \"file\"\npath = \"{0}/a\"\ncontent = \"a\"\ntags = [\"web\"]\n\n\
                 [[step]]\nkind = \"file\"\npath = \"{0}/b\"\ncontent = \"b\"\ntags = [\"db\"]\n\n\
                 [[step]]\nkind = \"file\"\npath = \"{0}/c\"\ncontent = \"c\"\ntags = [\"web\", \"db\"]\n",
                dir.path().display()
            ),
        );

        let result = run(&plan, &["web".to_string()], &file_ctx());
        let identities: Vec<_> = result.results.iter().map(|r| r.identity.clone()).collect();
        assert_eq!(identities.len(), 2);
        assert!(identities[0].ends_with("/a"));
        assert!(identities[1].ends_with("/c"));
        assert!(!dir.path().join("b").exists(), "unselected step must not run");
    }

    #[test]
    fn fatal_failure_aborts_and_skips_later_steps() {
        let dir = tempfile::tempdir().unwrap();
        // First step declares a file where a directory exists.
        std::fs::create_dir(dir.path().join("clash")).unwrap();
        let plan = load_plan(
            dir.path(),
            &format!(
                "[[step]]\nkind = \"file\"\npath = \"{0}/clash\"\ncontent = \"x\"\n\n\
                 [[step]]\nkind = \"file\"\npath = \"{0}/after\"\ncontent = \"y\"\n",
                dir.path().display()
            ),
        );

        let result = run(&plan, &[], &file_ctx());
        assert_eq!(result.results.len(), 1, "run aborts at the first fatal failure");
        assert_eq!(result.results[0].status, StepStatus::Failed);
        assert_eq!(
            result.results[0].error.as_ref().unwrap().kind(),
            ErrorKind::ConflictingState
        );
        assert!(!result.success());
        assert!(!dir.path().join("after").exists());
    }

    #[test]
    fn best_effort_failure_continues_and_does_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("clash")).unwrap();
        let plan = load_plan(
            dir.path(),
            &format!(
                "[[step]]\nname = \"firewall off\"\nkind = \"file\"\npath = \"{0}/clash\"\ncontent = \"x\"\nbest_effort = true\n\n\
                 [[step]]\nkind = \"file\"\npath = \"{0}/after\"\ncontent = \"y\"\n",
                dir.path().display()
            ),
        );

        let result = run(&plan, &[], &file_ctx());
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].status, StepStatus::Failed);
        assert!(result.results[0].best_effort);
        assert_eq!(result.results[1].status, StepStatus::Applied);
        assert!(
            result.success(),
            "a best-effort failure must not fail the run"
        );
    }

    #[test]
    fn dry_run_reports_would_change_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let plan = load_plan(
            dir.path(),
            &format!(
                "[[step]]\nkind = \"file\"\npath = \"{0}/www\"\nstate = \"directory\"\n",
                dir.path().display()
            ),
        );

        let ctx = RunContext {
            dry_run: true,
            ..file_ctx()
        };
        let result = run(&plan, &[], &ctx);
        assert_eq!(result.results[0].status, StepStatus::WouldChange);
        assert!(!dir.path().join("www").exists(), "dry run must not mutate");
    }

    #[test]
    fn missing_secret_fails_the_step() {
        let dir = tempfile::tempdir().unwrap();
        let plan = load_plan(
            dir.path(),
            &format!(
                "[[step]]\nkind = \"file\"\npath = \"{0}/token\"\nsecret = \"unset\"\n",
                dir.path().display()
            ),
        );
        let result = run(&plan, &[], &file_ctx());
        assert_eq!(result.results[0].status, StepStatus::Failed);
        assert_eq!(
            result.results[0].error.as_ref().unwrap().kind(),
            ErrorKind::ResourceUnavailable
        );
    }

    /// The full provisioning scenario: package, user, owned directory,
    /// verified archive, container. First run applies all five; a second run
    /// with no external changes reports all five unchanged.
    #[cfg(unix)]
    #[test]
    fn end_to_end_scenario_applies_then_converges() {
        let dir = tempfile::tempdir().unwrap();
        let www = dir.path().join("srv/www");
        let payload = {
            let mut builder = tar::Builder::new(Vec::new());
            let mut header = tar::Header::new_gnu();
            header.set_size(4);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "index.html", &b"site"[..])
                .unwrap();
            builder.into_inner().unwrap()
        };
        let digest = sha256_hex(&payload);
        let url = "https://cdn.example.com/site.tar.gz";

        let plan_src = format!(
            "[[step]]\nkind = \"package\"\npackage = \"docker.io\"\nmanager = \"apt\"\n\n\
             [[step]]\nkind = \"user\"\nuser = \"webapp\"\n\n\
             [[step]]\nkind = \"file\"\npath = \"{www}\"\nstate = \"directory\"\nowner = \"webapp\"\nmode = \"0755\"\n\n\
             [[step]]\nkind = \"archive\"\nurl = \"{url}\"\ndest = \"{www}\"\nsha256 = \"{digest}\"\n\n\
             [[step]]\nkind = \"container\"\ncontainer = \"web\"\nimage = \"nginx:1.25\"\nvolumes = [\"{www}:/usr/share/nginx/html:ro\"]\nengine = \"docker\"\n",
            www = www.display(),
        );
        let plan = load_plan(dir.path(), &plan_src);
        let fetcher = StaticFetcher::new().with_payload(url, &payload);

        // First run: every resolve reports missing, every apply succeeds.
        let first_executor = MockExecutor::with_responses(vec![
            (false, String::new()), // dpkg-query: not installed
            (true, String::new()),  // apt-get install
            (false, String::new()), // getent passwd: no user
            (true, String::new()),  // useradd
            (true, String::new()),  // chown on the directory
            (false, String::new()), // docker inspect: no container
            (false, String::new()), // docker inspect again inside apply
            (true, String::new()),  // docker run
        ]);
        let ctx = RunContext {
            executor: Arc::new(first_executor),
            secrets: Arc::new(StaticSecretProvider::new()),
            fetcher: Arc::new(StaticFetcher::new().with_payload(url, &payload)),
            dry_run: false,
        };
        let first = run(&plan, &[], &ctx);
        assert_eq!(first.results.len(), 5);
        assert!(
            first.results.iter().all(|r| r.status == StepStatus::Applied),
            "first run must apply all five steps: {:?}",
            first.results
        );
        assert_eq!(std::fs::read(www.join("index.html")).unwrap(), b"site");

        // Second run: every resolve reports the converged state.
        use std::os::unix::fs::MetadataExt as _;
        let meta = std::fs::metadata(&www).unwrap();
        let (uid, gid) = (meta.uid(), meta.gid());
        let inspect = format!(
            r#"[{{
              "State": {{ "Running": true }},
              "Config": {{ "Image": "nginx:1.25", "Env": [] }},
              "HostConfig": {{
                "RestartPolicy": {{ "Name": "no" }},
                "PortBindings": {{}},
                "Binds": ["{}:/usr/share/nginx/html:ro"]
              }}
            }}]"#,
            www.display()
        );
        let second_executor = MockExecutor::with_responses(vec![
            (true, "install ok installed".to_string()), // dpkg-query
            (true, "webapp:x:1042:1042:::/bin/sh".to_string()), // getent passwd
            (true, format!("webapp:x:{uid}:{gid}:::/bin/sh")), // getent for owner compare
            (true, inspect),                            // docker inspect
        ]);
        let ctx = RunContext {
            executor: Arc::new(second_executor),
            secrets: Arc::new(StaticSecretProvider::new()),
            fetcher: Arc::new(fetcher),
            dry_run: false,
        };
        let second = run(&plan, &[], &ctx);
        assert_eq!(second.results.len(), 5);
        assert!(
            second
                .results
                .iter()
                .all(|r| r.status == StepStatus::Unchanged),
            "second run must be fully converged: {:?}",
            second.results
        );
    }

    #[test]
    fn run_counts_by_status() {
        let run = Run {
            results: vec![
                ExecutionResult {
                    name: "a".into(),
                    kind: StepKind::FileState,
                    identity: "/a".into(),
                    status: StepStatus::Applied,
                    best_effort: false,
                    error: None,
                },
                ExecutionResult {
                    name: "b".into(),
                    kind: StepKind::FileState,
                    identity: "/b".into(),
                    status: StepStatus::Unchanged,
                    best_effort: false,
                    error: None,
                },
            ],
        };
        assert_eq!(run.count(StepStatus::Applied), 1);
        assert_eq!(run.count(StepStatus::Unchanged), 1);
        assert_eq!(run.changed_count(), 1);
        assert!(run.success());
    }
}
