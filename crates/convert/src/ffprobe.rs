use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde_json::Value;
use tokio::process::Command;

use crate::config::ConvertConfig;
use crate::error::{Error, Result};

/// Top-level section of the ffprobe report we read
const FORMAT_SECTION: &str = "format";

/// Flattened format report: scalar fields plus one level of merged children
pub type ProbeMap = BTreeMap<String, Value>;

/// Something that can turn a media file into a [`ProbeMap`]
#[allow(async_fn_in_trait)]
pub trait MediaProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeMap>;
}

/// Runs the configured ffprobe binary against each file
#[derive(Debug, Clone)]
pub struct FFProbe {
    ffprobe_bin: PathBuf,
}

impl FFProbe {
    pub fn new(ffprobe_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    pub fn from_config(cfg: &ConvertConfig) -> Self {
        Self::new(&cfg.ffprobe_bin)
    }
}

impl MediaProbe for FFProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeMap> {
        probe_file(&self.ffprobe_bin, path).await
    }
}

/// Run ffprobe and flatten its JSON format report
///
/// `-sexagesimal` prints times as `H:MM:SS.micro` while leaving bit rates and
/// sizes as plain integers.
pub async fn probe_file(ffprobe_bin: &Path, file_path: &Path) -> Result<ProbeMap> {
    if !file_path.is_file() {
        return Err(Error::probe(file_path, "file does not exist"));
    }

    let mut cmd = Command::new(ffprobe_bin);
    cmd.arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-sexagesimal")
        .arg(file_path);

    debug!(
        "ffprobe command: {} -v error -print_format json -show_format -sexagesimal {}",
        ffprobe_bin.display(),
        file_path.display()
    );

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::probe(
                file_path,
                format!("{} not found; install ffmpeg", ffprobe_bin.display()),
            )
        } else {
            Error::probe(file_path, format!("failed to execute ffprobe: {}", e))
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        return Err(Error::probe(
            file_path,
            format!("ffprobe exited with code {}: {}", exit_code, stderr.trim()),
        ));
    }

    let report: Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::probe(file_path, format!("unparseable ffprobe JSON: {}", e)))?;

    flatten_report(&report).map_err(|message| Error::probe(file_path, message))
}

/// Pull the format section out of a report and merge its nested objects
/// (tags, mostly) into the top level
///
/// Nested keys are merged after the scalar ones, so on a name clash the
/// nested value wins.
pub fn flatten_report(report: &Value) -> std::result::Result<ProbeMap, String> {
    let format = report
        .get(FORMAT_SECTION)
        .and_then(Value::as_object)
        .ok_or_else(|| format!("ffprobe report has no '{}' object", FORMAT_SECTION))?;

    let mut flat: ProbeMap = format
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for child in format.values().filter_map(Value::as_object) {
        for (k, v) in child {
            flat.insert(k.clone(), v.clone());
        }
    }

    Ok(flat)
}
