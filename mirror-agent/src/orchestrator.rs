//! Run sequencing: load, back up each repository in order, prune, report,
//! optionally publish, then notify exactly once.

use crate::archive::{Archiver, ARCHIVE_EXTENSION};
use crate::config::Config;
use crate::executor::clone::{CloneExecutor, VcsClient};
use crate::executor::retry::RetryPolicy;
use crate::executor::BackupExecutor;
use crate::fs::size::SizeProbe;
use crate::notify::{Notification, Notifier};
use crate::publish::{PublishResult, Publisher};
use crate::report::render::{self, SUMMARY_DIR};
use crate::report::{RunReport, RunStatus};
use crate::repos::load_repository_list;
use crate::retention::{count_archives, RetentionEnforcer};
use crate::utils::errors::{MirrorError, Result};
use crate::utils::format::{format_bytes, format_duration};
use chrono::{NaiveDate, Utc};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// A run that got as far as producing a report.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    /// `None` when publishing is disabled or failed
    pub publish: Option<PublishResult>,
}

/// Terminal state of one process invocation.
#[derive(Debug)]
pub enum RunResult {
    Completed(RunOutcome),
    /// Pre-flight failure; no repository was touched
    Aborted(MirrorError),
    /// The run panicked; carries the panic message
    Crashed(String),
}

impl RunResult {
    /// 0 only when every repository was backed up.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunResult::Completed(outcome) if outcome.report.all_succeeded() => 0,
            _ => 1,
        }
    }

    pub fn notification(&self) -> Notification {
        match self {
            RunResult::Completed(outcome) => {
                let report = &outcome.report;
                let successful = report.successful_names();
                if report.all_succeeded() {
                    let message = match outcome.publish {
                        Some(PublishResult::NoChanges) => {
                            "Backup completed successfully, no changes to commit"
                        }
                        _ => "Backup completed successfully",
                    };
                    Notification::new(RunStatus::Success, message, successful)
                } else if report.succeeded_count == 0 {
                    Notification::new(RunStatus::Failure, "All backups failed", Vec::new())
                } else {
                    Notification::new(RunStatus::Failure, "Some backups failed", successful)
                }
            }
            RunResult::Aborted(e) => Notification::new(
                RunStatus::Failure,
                format!("Backup process failed before starting: {}", e),
                Vec::new(),
            ),
            RunResult::Crashed(_) => {
                Notification::new(RunStatus::Crashed, "Backup process panicked", Vec::new())
            }
        }
    }
}

pub struct Orchestrator {
    config: Config,
    vcs: Arc<dyn VcsClient>,
    size_probe: Arc<dyn SizeProbe>,
}

impl Orchestrator {
    pub fn new(config: Config, vcs: Arc<dyn VcsClient>, size_probe: Arc<dyn SizeProbe>) -> Self {
        Self {
            config,
            vcs,
            size_probe,
        }
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        self.run_on(Utc::now().date_naive()).await
    }

    /// Full run with `run_date` naming today's backup directories.
    pub async fn run_on(&self, run_date: NaiveDate) -> Result<RunOutcome> {
        let config = &self.config;

        // Pre-flight: any error here aborts before a repository is touched
        config.validate()?;
        let repositories = load_repository_list(&config.paths.repositories_file)?;
        let token = config.token()?.to_string();
        let backups_root = config.paths.backups_dir.clone();
        std::fs::create_dir_all(&backups_root)?;

        info!(
            repositories = repositories.len(),
            backups_dir = %backups_root.display(),
            date = %run_date,
            "Starting backup run"
        );

        let cloner = CloneExecutor::new(
            Arc::clone(&self.vcs),
            RetryPolicy::linear(
                config.clone.max_attempts,
                Duration::from_secs(config.clone.backoff_step_secs),
            ),
            config.clone.timeout(),
        );
        let executor = BackupExecutor::new(
            cloner,
            Archiver::default(),
            Arc::clone(&self.size_probe),
            backups_root.clone(),
            token,
        );

        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(repositories.len());
        for (index, repo) in repositories.iter().enumerate() {
            info!(repo = %repo.name, progress = %format!("{}/{}", index + 1, repositories.len()), "Processing repository");
            outcomes.push(executor.backup(repo, run_date).await);
        }
        let finished_at = Utc::now();

        let enforcer = RetentionEnforcer::new(config.retention.max_backups);
        enforcer.enforce_all(&backups_root);

        let report = RunReport::build(run_date, started_at, finished_at, outcomes);
        render::persist(&report, &backups_root);
        // Summaries are pruned only after today's report has landed
        if let Err(e) = enforcer.enforce(&backups_root.join(SUMMARY_DIR)) {
            warn!(error = %e, "Retention skipped for summaries");
        }

        log_summary(&report);
        info!(
            count = count_archives(&backups_root, ARCHIVE_EXTENSION),
            "Archives on disk"
        );

        let publish = if config.publish.enabled {
            match self.publish(run_date).await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(error = %e, "Failed to commit/push backups");
                    None
                }
            }
        } else {
            None
        };

        Ok(RunOutcome { report, publish })
    }

    async fn publish(&self, run_date: NaiveDate) -> Result<PublishResult> {
        let publisher = Publisher::detect(self.config.publish.clone())?;
        publisher
            .publish(&self.config.paths.backups_dir, run_date)
            .await
    }
}

fn log_summary(report: &RunReport) {
    info!(
        total = report.total(),
        succeeded = report.succeeded_count,
        failed = report.failed_count,
        success_rate = %format!("{:.1}%", report.success_rate()),
        archived = %format_bytes(report.total_archive_bytes()),
        duration = %format_duration(report.elapsed),
        "Backup run finished"
    );
    for outcome in report.outcomes.iter().filter(|o| !o.succeeded) {
        warn!(
            repo = %outcome.name(),
            stage = ?outcome.failed_stage,
            error = %outcome.failure_reason.as_deref().unwrap_or_default(),
            "Repository backup failed"
        );
    }
}

/// Run the pipeline, convert any panic into a crash result, then send
/// exactly one notification.
pub async fn run_and_notify(orchestrator: Orchestrator, notifier: &mut Notifier) -> RunResult {
    let handle = tokio::spawn(async move { orchestrator.run().await });

    let result = match handle.await {
        Ok(Ok(outcome)) => RunResult::Completed(outcome),
        Ok(Err(e)) => {
            error!(error = %e, "Backup run aborted");
            RunResult::Aborted(e)
        }
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!(panic = %message, "Backup run panicked");
            RunResult::Crashed(message)
        }
        Err(e) => {
            error!(error = %e, "Backup task cancelled");
            RunResult::Crashed(e.to_string())
        }
    };

    notifier.notify(&result.notification()).await;
    result
}

/// Notify for a run that never got started (unreadable config, no `git`).
pub async fn abort_and_notify(error: MirrorError, notifier: &mut Notifier) -> RunResult {
    error!(error = %error, "Backup run aborted before start");
    let result = RunResult::Aborted(error);
    notifier.notify(&result.notification()).await;
    result
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyConfig;
    use crate::executor::clone::tests::FakeVcs;
    use crate::fs::size::WalkSizeProbe;
    use crate::notify::RunContext;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    const REPO_LIST: &str = "https://example.com/org/repoA.git\n# comment\n\nhttps://example.com/org/repoB.git\n";

    fn config(root: &Path, list: &str) -> Config {
        let repositories_file = root.join("repositories.txt");
        std::fs::write(&repositories_file, list).unwrap();

        let mut config = Config::default();
        config.paths.repositories_file = repositories_file;
        config.paths.backups_dir = root.join("backups");
        config.auth.token = Some("ghp_orchestrator_token".to_string());
        config.clone.backoff_step_secs = 0;
        config
    }

    fn silent_notifier() -> Notifier {
        Notifier::new(&NotifyConfig::default(), RunContext::default()).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[tokio::test]
    async fn test_outcome_per_listed_repository() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), REPO_LIST),
            Arc::new(FakeVcs::failing(0)),
            Arc::new(WalkSizeProbe),
        );

        let outcome = orchestrator.run_on(date()).await.unwrap();
        let report = &outcome.report;

        assert_eq!(report.total(), 2);
        assert_eq!(report.succeeded_count + report.failed_count, report.total());
        assert_eq!(report.successful_names(), ["repoA", "repoB"]);
        assert!(outcome.publish.is_none());

        let backups = temp_dir.path().join("backups");
        assert!(backups.join("repoA/2024-03-15/repoA.git.tar.zst").is_file());
        assert!(!backups.join("repoA/2024-03-15/repoA.git").exists());
        assert!(backups.join("summary/2024-03-15/backup-summary.json").is_file());
        assert!(backups.join("summary/2024-03-15/backup-summary.md").is_file());

        let result = RunResult::Completed(outcome);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.notification().message, "Backup completed successfully");
    }

    #[tokio::test]
    async fn test_partial_failure_continues_and_exits_nonzero() {
        let temp_dir = TempDir::new().unwrap();
        let mut cfg = config(temp_dir.path(), REPO_LIST);
        cfg.clone.max_attempts = 1;
        // First clone call (repoA) fails, everything after succeeds
        let orchestrator = Orchestrator::new(cfg, Arc::new(FakeVcs::failing(1)), Arc::new(WalkSizeProbe));

        let outcome = orchestrator.run_on(date()).await.unwrap();
        assert_eq!(outcome.report.failed_count, 1);
        assert_eq!(outcome.report.successful_names(), ["repoB"]);

        let result = RunResult::Completed(outcome);
        assert_eq!(result.exit_code(), 1);
        let notification = result.notification();
        assert_eq!(notification.status, RunStatus::Failure);
        assert_eq!(notification.message, "Some backups failed");
        assert_eq!(notification.successful_repos, ["repoB"]);
    }

    #[tokio::test]
    async fn test_retention_runs_after_backups() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(temp_dir.path(), "https://example.com/org/repoA.git\n");
        let repo_root = temp_dir.path().join("backups/repoA");
        for day in 1..=7 {
            std::fs::create_dir_all(repo_root.join(format!("2024-03-0{}", day))).unwrap();
        }

        let orchestrator = Orchestrator::new(cfg, Arc::new(FakeVcs::failing(0)), Arc::new(WalkSizeProbe));
        orchestrator.run_on(date()).await.unwrap();

        let mut remaining: Vec<String> = std::fs::read_dir(&repo_root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            ["2024-03-04", "2024-03-05", "2024-03-06", "2024-03-07", "2024-03-15"]
        );
    }

    #[tokio::test]
    async fn test_missing_token_aborts_and_still_notifies() {
        let temp_dir = TempDir::new().unwrap();
        let mut cfg = config(temp_dir.path(), REPO_LIST);
        cfg.auth.token = None;
        let vcs = Arc::new(FakeVcs::failing(0));
        let orchestrator = Orchestrator::new(cfg, vcs.clone(), Arc::new(WalkSizeProbe));

        let result = run_and_notify(orchestrator, &mut silent_notifier()).await;

        assert!(matches!(result, RunResult::Aborted(MirrorError::Config(_))));
        assert_eq!(result.exit_code(), 1);
        assert_eq!(vcs.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(!temp_dir.path().join("backups").exists());
    }

    #[tokio::test]
    async fn test_summary_history_is_capped() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(temp_dir.path(), "https://example.com/org/repoA.git\n");
        let summary_root = temp_dir.path().join("backups").join(SUMMARY_DIR);
        for day in 1..=7 {
            std::fs::create_dir_all(summary_root.join(format!("2024-03-0{}", day))).unwrap();
        }

        let orchestrator = Orchestrator::new(cfg, Arc::new(FakeVcs::failing(0)), Arc::new(WalkSizeProbe));
        orchestrator.run_on(date()).await.unwrap();

        let mut remaining: Vec<String> = std::fs::read_dir(&summary_root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            ["2024-03-04", "2024-03-05", "2024-03-06", "2024-03-07", "2024-03-15"]
        );
        assert!(summary_root.join("2024-03-15/backup-summary.json").is_file());
    }

    #[tokio::test]
    async fn test_unreadable_config_still_notifies() {
        let (url, server) = crate::notify::tests::one_shot_server(200).await;
        let notify_config = NotifyConfig {
            webhook_url: Some(url),
            ..Default::default()
        };
        let mut notifier = Notifier::new(&notify_config, RunContext::default()).unwrap();

        let error = Config::load(Some(Path::new("/nonexistent/mirror-agent.toml"))).unwrap_err();
        let result = abort_and_notify(error, &mut notifier).await;

        assert!(matches!(result, RunResult::Aborted(MirrorError::Config(_))));
        assert_eq!(result.exit_code(), 1);

        let body = server.await.unwrap();
        assert!(body.contains("Backup process failed before starting"));
        assert!(body.contains("failed to load"));
    }

    #[tokio::test]
    async fn test_malformed_list_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(temp_dir.path(), "https://example.com/org/repoA.git\nnot-a-url\n");
        let orchestrator = Orchestrator::new(cfg, Arc::new(FakeVcs::failing(0)), Arc::new(WalkSizeProbe));

        let err = orchestrator.run_on(date()).await.unwrap_err();
        assert!(err.is_fatal());
    }

    struct PanickingVcs;

    #[async_trait]
    impl VcsClient for PanickingVcs {
        async fn clone_mirror(&self, _url: &str, _dest: &Path) -> Result<()> {
            panic!("vcs exploded");
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_crash_result() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), REPO_LIST),
            Arc::new(PanickingVcs),
            Arc::new(WalkSizeProbe),
        );

        let result = run_and_notify(orchestrator, &mut silent_notifier()).await;

        match &result {
            RunResult::Crashed(message) => assert!(message.contains("vcs exploded")),
            other => panic!("expected crash, got {:?}", other),
        }
        assert_eq!(result.exit_code(), 1);
        assert_eq!(result.notification().status, RunStatus::Crashed);
    }

    #[test]
    fn test_no_changes_message() {
        let report = RunReport::build(
            date(),
            Utc::now(),
            Utc::now(),
            vec![crate::report::BackupOutcome::success(
                crate::report::tests::repo("repoA"),
                10,
                5,
                Utc::now(),
                Duration::from_secs(1),
            )],
        );
        let result = RunResult::Completed(RunOutcome {
            report,
            publish: Some(PublishResult::NoChanges),
        });

        let notification = result.notification();
        assert_eq!(notification.status, RunStatus::Success);
        assert_eq!(notification.message, "Backup completed successfully, no changes to commit");
    }
}
