use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::job::{Job, JobStatus};

const BANNER_RULE: &str = "=======================";

/// Runs conversion jobs one after another
///
/// The encoder is expected to saturate the machine, so there is never more
/// than one job in flight.
#[derive(Debug, Clone, Default)]
pub struct JobRunner {
    cancel: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner that stops starting new jobs once `cancel` is raised
    pub fn with_cancel_flag(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run every job in order and report how each one ended
    pub async fn run_all(&self, jobs: Vec<Job>) -> RunReport {
        let total = jobs.len();
        let mut finished = Vec::with_capacity(total);

        for (idx, mut job) in jobs.into_iter().enumerate() {
            if self.is_cancelled() {
                job.status = JobStatus::Cancelled;
                job.reason = Some("run cancelled before start".to_string());
                finished.push(job);
                continue;
            }

            info!("Job {}/{}: {}", idx + 1, total, job.record);
            self.run_job(&mut job).await;
            finished.push(job);
        }

        let report = RunReport { jobs: finished };
        info!(
            "Run complete: {} succeeded, {} failed, {} archive failures, {} cancelled",
            report.count(JobStatus::Succeeded),
            report.count(JobStatus::Failed),
            report.count(JobStatus::ArchiveFailed),
            report.count(JobStatus::Cancelled)
        );
        report
    }

    /// Drive one job from Pending to a terminal state
    pub async fn run_job(&self, job: &mut Job) {
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        info!("Starting job {}: {}", job.id, job.source_path.display());

        let (status, reason) = match self.encode(job).await {
            Ok(()) => match archive_source(&job.source_path, &job.archived_path) {
                Ok(()) => {
                    info!(
                        "Job {} completed: {} -> {}",
                        job.id,
                        job.source_path.display(),
                        job.output_path.display()
                    );
                    (JobStatus::Succeeded, None)
                }
                Err(e) => {
                    error!("Job {}: converted but not archived: {}", job.id, e);
                    (JobStatus::ArchiveFailed, Some(e.to_string()))
                }
            },
            Err(e) => {
                error!("Job {} failed: {}", job.id, e);
                (JobStatus::Failed, Some(e.to_string()))
            }
        };

        job.status = status;
        job.reason = reason;
        job.finished_at = Some(Utc::now());
    }

    async fn encode(&self, job: &Job) -> Result<()> {
        if let Some(parent) = job.output_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::EncodeFailed {
                path: job.source_path.clone(),
                status: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }

        info!("Encoding: {}", job.command.render());
        let status = Command::new(&job.command.program)
            .args(&job.command.args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::EncodeFailed {
                path: job.source_path.clone(),
                status: format!("could not start {}: {}", job.command.program.display(), e),
            })?;

        if !status.success() {
            return Err(Error::EncodeFailed {
                path: job.source_path.clone(),
                status: status.to_string(),
            });
        }

        if !job.output_path.is_file() {
            return Err(Error::EncodeFailed {
                path: job.source_path.clone(),
                status: format!("exited 0 but wrote no {}", job.output_path.display()),
            });
        }

        Ok(())
    }
}

/// Move a converted source into its archive location
///
/// Never overwrites an existing archived file. Falls back to copy and remove
/// when a plain rename fails, e.g. across filesystems.
pub fn archive_source(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(Error::archive_move(from, to, "destination already exists"));
    }

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::archive_move(from, to, e.to_string()))?;
    }

    let rename_err = match fs::rename(from, to) {
        Ok(()) => {
            info!("Archived {} -> {}", from.display(), to.display());
            return Ok(());
        }
        Err(e) => e,
    };

    warn!(
        "Rename {} -> {} failed ({}), copying instead",
        from.display(),
        to.display(),
        rename_err
    );

    if let Err(copy_err) = fs::copy(from, to) {
        let _ = fs::remove_file(to);
        return Err(Error::archive_move(
            from,
            to,
            format!("{}; copy fallback failed: {}", rename_err, copy_err),
        ));
    }

    fs::remove_file(from).map_err(|e| {
        Error::archive_move(from, to, format!("copied but could not remove source: {}", e))
    })?;

    info!("Archived {} -> {}", from.display(), to.display());
    Ok(())
}

/// What happened to every job in a run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub jobs: Vec<Job>,
}

impl RunReport {
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    /// Jobs that need the operator's attention
    pub fn failures(&self) -> impl Iterator<Item = &Job> {
        self.jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Failed | JobStatus::ArchiveFailed))
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Banner shown to the operator for a failed job
pub fn failure_banner(job: &Job) -> String {
    let heading = match job.status {
        JobStatus::ArchiveFailed => "ARCHIVING FAILED",
        _ => "ENCODING FAILED",
    };
    banner(heading, &job.source_path, job.reason.as_deref())
}

/// `heading` framed by rules, with the affected path and reason between them
pub fn banner(heading: &str, path: &Path, reason: Option<&str>) -> String {
    let rule = format!("{}{}{}", BANNER_RULE, heading, BANNER_RULE);

    let mut banner = format!("{}\n{}\n", rule, path.display());
    if let Some(reason) = reason {
        banner.push_str(reason);
        banner.push('\n');
    }
    banner.push_str(&rule);
    banner
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ConvertConfig;
    use crate::media::{DiscFormat, MediaCategory, MediaRecord};
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Stand-in for HandBrakeCLI that writes its `-o` argument
    const WRITES_OUTPUT: &str = r#"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
printf 'converted' > "$out"
"#;

    /// Stand-in for HandBrakeCLI that writes its `-i` path into its `-o` file
    const COPIES_INPUT_NAME: &str = r#"
in=""
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-i" ]; then in="$2"; fi
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
printf '%s' "$in" > "$out"
"#;

    fn fake_encoder(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn source(root: &Path, name: &str) -> PathBuf {
        let path = root.join("DVD/Movies/TO_CONVERT").join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"rip").unwrap();
        path
    }

    fn job_for(path: &Path, encoder: &Path, root: &Path) -> Job {
        let cfg = ConvertConfig {
            root_dir: root.to_path_buf(),
            handbrake_bin: encoder.to_path_buf(),
            ..ConvertConfig::default()
        };
        let record = MediaRecord::new(path, DiscFormat::Dvd, MediaCategory::Movie).unwrap();
        Job::from_record(record, &cfg).unwrap()
    }

    #[tokio::test]
    async fn test_successful_encode_archives_source() {
        let bin = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let root = media.path();
        let encoder = fake_encoder(bin.path(), "hb-ok", WRITES_OUTPUT);
        let src = source(root, "Alien_t00.mkv");

        let report = JobRunner::new()
            .run_all(vec![job_for(&src, &encoder, root)])
            .await;

        let job = &report.jobs[0];
        assert_eq!(job.status, JobStatus::Succeeded, "{:?}", job.reason);
        assert!(!src.exists());
        assert!(root.join("DVD/Movies/SOURCE_PROCESSED/Alien_t00.mkv").is_file());
        assert!(root.join("DVD/Movies/CONVERTED/Alien.mkv").is_file());
        assert!(job.started_at.is_some() && job.finished_at.is_some());
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_failed_encode_leaves_source() {
        let bin = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let root = media.path();
        let encoder = fake_encoder(bin.path(), "hb-fail", "exit 1");
        let src = source(root, "Alien_t00.mkv");

        let report = JobRunner::new()
            .run_all(vec![job_for(&src, &encoder, root)])
            .await;

        let job = &report.jobs[0];
        assert_eq!(job.status, JobStatus::Failed);
        assert!(src.is_file());
        assert!(!root.join("DVD/Movies/SOURCE_PROCESSED/Alien_t00.mkv").exists());

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        let reason = failures[0].reason.as_deref().unwrap();
        assert!(reason.contains(&src.display().to_string()));
        assert!(failure_banner(failures[0]).contains("ENCODING FAILED"));
    }

    #[tokio::test]
    async fn test_zero_exit_without_output_is_failure() {
        let bin = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let root = media.path();
        let encoder = fake_encoder(bin.path(), "hb-silent", "exit 0");
        let src = source(root, "Alien_t00.mkv");

        let report = JobRunner::new()
            .run_all(vec![job_for(&src, &encoder, root)])
            .await;

        assert_eq!(report.jobs[0].status, JobStatus::Failed);
        assert!(src.is_file());
    }

    #[tokio::test]
    async fn test_missing_encoder_is_failure() {
        let media = TempDir::new().unwrap();
        let root = media.path();
        let src = source(root, "Alien_t00.mkv");

        let report = JobRunner::new()
            .run_all(vec![job_for(&src, Path::new("/nonexistent/HandBrakeCLI"), root)])
            .await;

        assert_eq!(report.jobs[0].status, JobStatus::Failed);
        assert!(src.is_file());
    }

    #[tokio::test]
    async fn test_archive_collision_does_not_stop_other_jobs() {
        let bin = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let root = media.path();
        let encoder = fake_encoder(bin.path(), "hb-ok", WRITES_OUTPUT);
        let first = source(root, "Alien_t00.mkv");
        let second = source(root, "Heat_t00.mkv");

        let taken = root.join("DVD/Movies/SOURCE_PROCESSED/Alien_t00.mkv");
        fs::create_dir_all(taken.parent().unwrap()).unwrap();
        fs::write(&taken, b"older archive").unwrap();

        let report = JobRunner::new()
            .run_all(vec![
                job_for(&first, &encoder, root),
                job_for(&second, &encoder, root),
            ])
            .await;

        assert_eq!(report.jobs[0].status, JobStatus::ArchiveFailed);
        assert!(first.is_file());
        assert_eq!(fs::read(&taken).unwrap(), b"older archive");
        assert!(root.join("DVD/Movies/CONVERTED/Alien.mkv").is_file());
        assert!(failure_banner(&report.jobs[0]).contains("ARCHIVING FAILED"));

        assert_eq!(report.jobs[1].status, JobStatus::Succeeded);
        assert!(!second.exists());
        assert_eq!(report.count(JobStatus::Succeeded), 1);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_output_collision_last_write_wins() {
        let bin = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let root = media.path();
        let encoder = fake_encoder(bin.path(), "hb-echo", COPIES_INPUT_NAME);
        let first = source(root, "Alien_t00.mkv");
        let second = source(root, "Alien_t01.mkv");

        let jobs = vec![
            job_for(&first, &encoder, root),
            job_for(&second, &encoder, root),
        ];
        assert_eq!(jobs[0].output_path, jobs[1].output_path);

        let report = JobRunner::new().run_all(jobs).await;

        assert_eq!(report.count(JobStatus::Succeeded), 2);
        let output = fs::read_to_string(root.join("DVD/Movies/CONVERTED/Alien.mkv")).unwrap();
        assert_eq!(output, second.display().to_string());
        assert!(root.join("DVD/Movies/SOURCE_PROCESSED/Alien_t00.mkv").is_file());
        assert!(root.join("DVD/Movies/SOURCE_PROCESSED/Alien_t01.mkv").is_file());
        assert!(!first.exists() && !second.exists());
    }

    #[test]
    fn test_banner_frames_path_and_reason() {
        let text = banner("SCANNING FAILED", Path::new("/rips/DVD"), Some("missing"));
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "=======================SCANNING FAILED=======================",
                "/rips/DVD",
                "missing",
                "=======================SCANNING FAILED=======================",
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let bin = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let root = media.path();
        let encoder = fake_encoder(bin.path(), "hb-ok", WRITES_OUTPUT);
        let src = source(root, "Alien_t00.mkv");

        let runner = JobRunner::new();
        runner.cancel_flag().store(true, Ordering::SeqCst);
        let report = runner.run_all(vec![job_for(&src, &encoder, root)]).await;

        assert_eq!(report.jobs[0].status, JobStatus::Cancelled);
        assert!(src.is_file());
        assert!(!root.join("DVD/Movies/CONVERTED").exists());
        assert!(report.is_clean());
    }

    #[test]
    fn test_archive_creates_missing_folders() {
        let media = TempDir::new().unwrap();
        let from = media.path().join("a.mkv");
        fs::write(&from, b"rip").unwrap();
        let to = media.path().join("deep/er/a.mkv");

        archive_source(&from, &to).unwrap();
        assert!(to.is_file());
        assert!(!from.exists());
    }
}
