use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::media::{DiscFormat, MediaCategory};

/// Folder names for each stage a file passes through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessDirs {
    /// Media ready for conversion
    pub source: String,
    /// Converted files, for review
    pub output: String,
    /// Sources moved here once converted, so they are not queued again
    pub archive: String,
}

impl Default for ProcessDirs {
    fn default() -> Self {
        Self {
            source: "TO_CONVERT".to_string(),
            output: "CONVERTED".to_string(),
            archive: "SOURCE_PROCESSED".to_string(),
        }
    }
}

/// Configuration for a conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Media root holding one folder per disc format
    pub root_dir: PathBuf,
    /// Disc-format folder names under the root
    pub disc_folders: BTreeMap<String, DiscFormat>,
    /// Category folder names under each disc-format folder
    pub category_folders: BTreeMap<String, MediaCategory>,
    pub process_dirs: ProcessDirs,
    /// HandBrake presets, `<category>/<preset name>` from the preset file
    pub presets: BTreeMap<DiscFormat, String>,
    /// Path to HandBrakeCLI
    pub handbrake_bin: PathBuf,
    /// JSON preset file passed to `--preset-import-file`
    pub preset_file: PathBuf,
    /// Path to ffprobe
    pub ffprobe_bin: PathBuf,
    /// HandBrake container identifier passed to `-f`
    pub container: String,
    /// Extension of the converted file
    pub extension: String,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ConvertConfig {
    pub fn default_config() -> Self {
        let disc_folders = BTreeMap::from([
            ("DVD".to_string(), DiscFormat::Dvd),
            ("Blu-Ray".to_string(), DiscFormat::BluRay),
        ]);
        let category_folders = BTreeMap::from([
            ("Movies".to_string(), MediaCategory::Movie),
            ("TV Shows".to_string(), MediaCategory::Show),
        ]);
        let presets = BTreeMap::from([
            (
                DiscFormat::Dvd,
                "Ryan/(Ryan) Apple 480p - Surround - 265 (Very Slow)".to_string(),
            ),
            (
                DiscFormat::BluRay,
                "Ryan/(Ryan) Apple 1080p - Surround - 265 (Very Slow)".to_string(),
            ),
        ]);

        Self {
            root_dir: PathBuf::from("/media/routine"),
            disc_folders,
            category_folders,
            process_dirs: ProcessDirs::default(),
            presets,
            handbrake_bin: PathBuf::from("HandBrakeCLI"),
            preset_file: PathBuf::from("/media/routine/presets.json"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            container: "av_mkv".to_string(),
            extension: "mkv".to_string(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make path translation meaningless
    pub fn validate(&self) -> Result<()> {
        let dirs = &self.process_dirs;
        for (label, name) in [
            ("source", &dirs.source),
            ("output", &dirs.output),
            ("archive", &dirs.archive),
        ] {
            if name.trim().is_empty() {
                anyhow::bail!("process_dirs.{} must not be empty", label);
            }
        }

        if dirs.source == dirs.output || dirs.source == dirs.archive || dirs.output == dirs.archive {
            anyhow::bail!(
                "process_dirs must be distinct (source={}, output={}, archive={})",
                dirs.source,
                dirs.output,
                dirs.archive
            );
        }

        if self.extension.trim().is_empty() {
            anyhow::bail!("extension must not be empty");
        }

        Ok(())
    }

    /// Preset identifier for a disc format, if one is configured
    pub fn preset_for(&self, format: DiscFormat) -> Option<&str> {
        self.presets.get(&format).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ConvertConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.process_dirs.source, "TO_CONVERT");
        assert!(cfg.preset_for(DiscFormat::BluRay).unwrap().contains("1080p"));
        assert_eq!(cfg.disc_folders.get("Blu-Ray"), Some(&DiscFormat::BluRay));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = ConvertConfig::load_config(Some(Path::new("/no/such/config.toml"))).unwrap();
        assert_eq!(cfg.extension, "mkv");
        assert_eq!(ConvertConfig::load_config(None).unwrap().container, "av_mkv");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("convert.toml");
        fs::write(
            &path,
            r#"
root_dir = "/srv/rips"
handbrake_bin = "/opt/hb/HandBrakeCLI"

[process_dirs]
output = "DONE"
"#,
        )
        .unwrap();

        let cfg = ConvertConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.root_dir, PathBuf::from("/srv/rips"));
        assert_eq!(cfg.handbrake_bin, PathBuf::from("/opt/hb/HandBrakeCLI"));
        assert_eq!(cfg.process_dirs.output, "DONE");
        assert_eq!(cfg.process_dirs.source, "TO_CONVERT");
        assert_eq!(cfg.presets.len(), 2);
    }

    #[test]
    fn test_json_presets_replace_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("convert.json");
        fs::write(
            &path,
            r#"{ "presets": { "dvd": "General/Fast 480p30" }, "extension": "m4v" }"#,
        )
        .unwrap();

        let cfg = ConvertConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.preset_for(DiscFormat::Dvd), Some("General/Fast 480p30"));
        assert_eq!(cfg.preset_for(DiscFormat::BluRay), None);
        assert_eq!(cfg.extension, "m4v");
    }

    #[test]
    fn test_rejects_overlapping_process_dirs() {
        let mut cfg = ConvertConfig::default();
        cfg.process_dirs.output = cfg.process_dirs.source.clone();
        assert!(cfg.validate().is_err());

        let mut cfg = ConvertConfig::default();
        cfg.process_dirs.archive = "  ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_json_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ConvertConfig::load_config(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));
    }
}
