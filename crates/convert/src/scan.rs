use std::path::PathBuf;

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ConvertConfig;
use crate::error::Error;
use crate::ffprobe::MediaProbe;
use crate::hierarchy::Hierarchy;
use crate::media::{DiscFormat, MediaCategory, MediaRecord};
use crate::runner::banner;

/// A file found under a source stage folder, not yet probed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub disc_format: DiscFormat,
    pub category: MediaCategory,
}

/// Something that went wrong for one directory or one file during a scan
#[derive(Debug)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub error: Error,
}

impl ScanFailure {
    /// Banner shown to the operator for a directory or file that was skipped
    pub fn banner(&self) -> String {
        banner("SCANNING FAILED", &self.path, Some(&self.error.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    pub failures: Vec<ScanFailure>,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<MediaRecord>,
    pub failures: Vec<ScanFailure>,
    /// Files found on disk, including the ones that failed to probe
    pub discovered: usize,
}

impl ScanOutcome {
    /// True only when no source folder held any file at all
    pub fn found_nothing(&self) -> bool {
        self.discovered == 0
    }
}

/// Walk every `{disc format}/{category}/{source stage}` folder for files
///
/// A missing disc-format folder is recorded as a failure and the remaining
/// formats are still walked. Missing category or stage folders just mean
/// there is nothing to convert there. Files come back sorted by path.
pub fn discover_media(cfg: &ConvertConfig) -> Discovery {
    let mut discovery = Discovery::default();
    let hierarchy = Hierarchy::new(cfg);

    for (disc_format, disc_path) in hierarchy.disc_paths() {
        if !disc_path.is_dir() {
            warn!("Media directory does not exist: {}", disc_path.display());
            discovery.failures.push(ScanFailure {
                path: disc_path.clone(),
                error: Error::MissingDirectory { path: disc_path },
            });
            continue;
        }

        for branch in hierarchy
            .branches()
            .into_iter()
            .filter(|b| b.disc_format == disc_format)
        {
            let source_dir = branch.path.join(&cfg.process_dirs.source);
            if !source_dir.is_dir() {
                debug!("No source folder at {}", source_dir.display());
                continue;
            }

            info!("Scanning directory: {}", source_dir.display());
            let mut found = 0;

            for entry in WalkDir::new(&source_dir).follow_links(false) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("Error reading directory entry: {}", e);
                        continue;
                    }
                };

                if !entry.file_type().is_file() {
                    continue;
                }

                found += 1;
                debug!("Found media file: {}", entry.path().display());
                discovery.files.push(DiscoveredFile {
                    path: entry.into_path(),
                    disc_format: branch.disc_format,
                    category: branch.category,
                });
            }

            info!("Finished scanning {}: {} files", source_dir.display(), found);
        }
    }

    discovery.files.sort_by(|a, b| a.path.cmp(&b.path));
    discovery
}

/// Discover files and probe each one into a [`MediaRecord`]
///
/// A probe or field-format failure drops that one file and the scan carries
/// on with the rest.
pub async fn scan_media<P: MediaProbe>(cfg: &ConvertConfig, probe: &P) -> ScanOutcome {
    let Discovery { files, failures } = discover_media(cfg);
    let mut outcome = ScanOutcome {
        records: Vec::with_capacity(files.len()),
        failures,
        discovered: files.len(),
    };

    for file in files {
        let probed = match probe.probe(&file.path).await {
            Ok(map) => MediaRecord::from_probe(&file.path, file.disc_format, file.category, &map),
            Err(e) => Err(e),
        };

        match probed {
            Ok(record) => {
                debug!("Probed {}", record);
                outcome.records.push(record);
            }
            Err(e) => {
                warn!("Skipping {}: {}", file.path.display(), e);
                outcome.failures.push(ScanFailure {
                    path: file.path,
                    error: e,
                });
            }
        }
    }

    info!(
        "Scan complete: {} of {} files probed, {} failures",
        outcome.records.len(),
        outcome.discovered,
        outcome.failures.len()
    );
    outcome
}
