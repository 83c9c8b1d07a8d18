use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Serialize, Serializer};

use crate::config::ConvertConfig;
use crate::error::Error;
use crate::media::MediaRecord;
use crate::paths;
use crate::runner::banner;

/// Job lifecycle: Pending -> Running -> Succeeded | Failed | ArchiveFailed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    /// Encoder failed; the source stays where it was
    Failed,
    /// Encode succeeded but the source could not be moved to the archive
    ArchiveFailed,
    /// Never started because the run was cancelled
    Cancelled,
}

/// Program plus argument vector for one HandBrake invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl EncodeCommand {
    /// HandBrakeCLI invocation converting `input` into `output`
    pub fn handbrake(
        cfg: &ConvertConfig,
        input: &Path,
        preset: &str,
        output: &Path,
    ) -> Self {
        let args = vec![
            OsString::from("--preset-import-file"),
            cfg.preset_file.clone().into_os_string(),
            OsString::from("-i"),
            input.as_os_str().to_os_string(),
            OsString::from("--preset"),
            OsString::from(preset),
            OsString::from("-o"),
            output.as_os_str().to_os_string(),
            OsString::from("-f"),
            OsString::from(&cfg.container),
        ];

        Self {
            program: cfg.handbrake_bin.clone(),
            args,
        }
    }

    /// Shell-style rendering with every path and the preset quoted
    ///
    /// Arguments come in flag/value pairs; only the values get quotes.
    pub fn render(&self) -> String {
        let mut rendered = quote(&self.program.to_string_lossy());
        for (idx, arg) in self.args.iter().enumerate() {
            let arg = arg.to_string_lossy();
            rendered.push(' ');
            if idx % 2 == 0 {
                rendered.push_str(&arg);
            } else {
                rendered.push_str(&quote(&arg));
            }
        }
        rendered
    }
}

fn serialize_rendered<S: Serializer>(command: &EncodeCommand, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&command.render())
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\\\""))
}

/// One file to convert, from build until the runner is done with it
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub record: MediaRecord,
    #[serde(serialize_with = "serialize_rendered")]
    pub command: EncodeCommand,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub archived_path: PathBuf,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl Job {
    /// Build the job for one record, failing when its disc format has no preset
    pub fn from_record(record: MediaRecord, cfg: &ConvertConfig) -> Result<Self, Error> {
        let format = record.disc_format();
        let preset = cfg
            .preset_for(format)
            .ok_or(Error::UnknownPreset { format })?;

        let source_path = record.filename().to_path_buf();
        let stem = output_file_stem(&record);
        let output_path =
            paths::to_output_file(&source_path, &cfg.process_dirs, &stem, &cfg.extension);
        let archived_path = paths::to_archived_path(&source_path, &cfg.process_dirs);
        let command = EncodeCommand::handbrake(cfg, &source_path, preset, &output_path);

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            record,
            command,
            source_path,
            output_path,
            archived_path,
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            reason: None,
        })
    }
}

/// Output file stem for a record, with path separators neutralized
fn output_file_stem(record: &MediaRecord) -> String {
    let stem: String = record
        .output_stem()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '-' } else { c })
        .collect();
    let stem = stem.trim().trim_matches('.').to_string();

    if stem.is_empty() {
        record.basename()
    } else {
        stem
    }
}

/// A record whose job could not be built
#[derive(Debug)]
pub struct BuildFailure {
    pub path: PathBuf,
    pub error: Error,
}

impl BuildFailure {
    /// Banner shown to the operator for a file that got no job
    pub fn banner(&self) -> String {
        banner("NOT CONVERTED", &self.path, Some(&self.error.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub jobs: Vec<Job>,
    pub failures: Vec<BuildFailure>,
}

/// Turn records into jobs, in order
///
/// A record without a preset is reported and skipped; the rest still build.
/// When two records land on the same output file both jobs are kept and the
/// later one overwrites the earlier one's output when run.
pub fn build_jobs(records: Vec<MediaRecord>, cfg: &ConvertConfig) -> BuildOutcome {
    let mut outcome = BuildOutcome::default();
    let mut outputs: HashMap<PathBuf, PathBuf> = HashMap::new();

    for record in records {
        let path = record.filename().to_path_buf();
        match Job::from_record(record, cfg) {
            Ok(job) => {
                if let Some(previous) = outputs.insert(job.output_path.clone(), path.clone()) {
                    warn!(
                        "{} and {} both convert to {}; the later one wins",
                        previous.display(),
                        path.display(),
                        job.output_path.display()
                    );
                }
                debug!("Built job {}: {}", job.id, job.command.render());
                outcome.jobs.push(job);
            }
            Err(e) => {
                warn!("Cannot build job for {}: {}", path.display(), e);
                outcome.failures.push(BuildFailure { path, error: e });
            }
        }
    }

    outcome
}
