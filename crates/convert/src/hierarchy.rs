//! The folder layout the pipeline expects:
//! `root/{disc format}/{category}/{process stage}/...`
//!
//! Creating the tree is left to whoever sets up the media root; this module
//! only names the folders.

use std::path::PathBuf;

use crate::config::ConvertConfig;
use crate::media::{DiscFormat, MediaCategory};

/// One `{disc format}/{category}` branch of the media root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBranch {
    pub disc_format: DiscFormat,
    pub category: MediaCategory,
    /// `root/{disc format}/{category}`
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Hierarchy<'a> {
    cfg: &'a ConvertConfig,
}

impl<'a> Hierarchy<'a> {
    pub fn new(cfg: &'a ConvertConfig) -> Self {
        Self { cfg }
    }

    /// Disc-format folders under the root, with the format each one holds
    pub fn disc_paths(&self) -> Vec<(DiscFormat, PathBuf)> {
        self.cfg
            .disc_folders
            .iter()
            .map(|(folder, format)| (*format, self.cfg.root_dir.join(folder)))
            .collect()
    }

    pub fn branches(&self) -> Vec<MediaBranch> {
        let mut branches = Vec::new();
        for (disc_format, disc_path) in self.disc_paths() {
            for (folder, category) in &self.cfg.category_folders {
                branches.push(MediaBranch {
                    disc_format,
                    category: *category,
                    path: disc_path.join(folder),
                });
            }
        }
        branches
    }

    /// Folders to drop files into for conversion
    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.stage_paths(&self.cfg.process_dirs.source)
    }

    /// Folders receiving the converted files
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.stage_paths(&self.cfg.process_dirs.output)
    }

    /// Folders original sources are moved to after conversion
    pub fn archive_paths(&self) -> Vec<PathBuf> {
        self.stage_paths(&self.cfg.process_dirs.archive)
    }

    fn stage_paths(&self, stage: &str) -> Vec<PathBuf> {
        self.branches().into_iter().map(|b| b.path.join(stage)).collect()
    }
}

/// Render a list of paths one per line, indented for log output
pub fn path_list_to_string(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("\t\t{}\n", p.display()))
        .collect()
}
