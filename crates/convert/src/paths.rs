use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::config::ProcessDirs;

/// Where the converted file for `source` lives (same tree, output stage)
///
/// Paths that do not pass through the source stage folder come back
/// unchanged; callers only hand in paths found under it.
pub fn to_output_path(source: &Path, dirs: &ProcessDirs) -> PathBuf {
    substitute_segment(source, &dirs.source, &dirs.output)
}

/// Where `source` is moved once it has been converted
pub fn to_archived_path(source: &Path, dirs: &ProcessDirs) -> PathBuf {
    substitute_segment(source, &dirs.source, &dirs.archive)
}

/// Output path with the file name swapped for `<stem>.<extension>`
pub fn to_output_file(source: &Path, dirs: &ProcessDirs, stem: &str, extension: &str) -> PathBuf {
    to_output_path(source, dirs).with_file_name(format!("{}.{}", stem, extension))
}

/// Replace every path segment equal to `from` with `to`
///
/// Matching is per segment, so a file called `TO_CONVERT_notes.mkv` keeps its
/// name.
pub fn substitute_segment(path: &Path, from: &str, to: &str) -> PathBuf {
    let from = OsStr::new(from);
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(name) if name == from => out.push(to),
            other => out.push(other.as_os_str()),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dirs() -> ProcessDirs {
        ProcessDirs::default()
    }

    #[test]
    fn test_output_and_archive_paths() {
        let source = Path::new("/media/DVD/Movies/TO_CONVERT/Alien_t00.mkv");
        assert_eq!(
            to_output_path(source, &dirs()),
            PathBuf::from("/media/DVD/Movies/CONVERTED/Alien_t00.mkv")
        );
        assert_eq!(
            to_archived_path(source, &dirs()),
            PathBuf::from("/media/DVD/Movies/SOURCE_PROCESSED/Alien_t00.mkv")
        );
    }

    #[test]
    fn test_output_file_renames() {
        let source = Path::new("/media/DVD/Movies/TO_CONVERT/nested/Alien_t00.mkv");
        assert_eq!(
            to_output_file(source, &dirs(), "Alien", "mkv"),
            PathBuf::from("/media/DVD/Movies/CONVERTED/nested/Alien.mkv")
        );
    }

    #[test]
    fn test_path_without_token_unchanged() {
        let source = Path::new("/media/DVD/Movies/elsewhere/Alien_t00.mkv");
        assert_eq!(to_output_path(source, &dirs()), source);
        assert_eq!(to_archived_path(source, &dirs()), source);
    }

    #[test]
    fn test_token_inside_file_name_untouched() {
        let source = Path::new("/media/TO_CONVERT/TO_CONVERT_notes.mkv");
        assert_eq!(
            to_output_path(source, &dirs()),
            PathBuf::from("/media/CONVERTED/TO_CONVERT_notes.mkv")
        );
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let source = Path::new("/TO_CONVERT/a/TO_CONVERT/b.mkv");
        assert_eq!(
            substitute_segment(source, "TO_CONVERT", "CONVERTED"),
            PathBuf::from("/CONVERTED/a/CONVERTED/b.mkv")
        );
    }

    #[test]
    fn test_relative_paths() {
        let source = Path::new("DVD/Movies/TO_CONVERT/x.mkv");
        assert_eq!(
            to_output_path(source, &dirs()),
            PathBuf::from("DVD/Movies/CONVERTED/x.mkv")
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_translation_is_idempotent(
            prefix in prop::collection::vec("[a-z]{1,8}", 0..4),
            suffix in prop::collection::vec("[a-z]{1,8}", 0..3),
            file in "[a-z]{1,8}\\.mkv",
        ) {
            let mut source = PathBuf::from("/");
            for seg in &prefix {
                source.push(seg);
            }
            source.push("TO_CONVERT");
            for seg in &suffix {
                source.push(seg);
            }
            source.push(&file);

            let once = to_output_path(&source, &dirs());
            let twice = to_output_path(&once, &dirs());
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.components().any(|c| c.as_os_str() == "CONVERTED"));

            let archived = to_archived_path(&source, &dirs());
            prop_assert_eq!(to_archived_path(&archived, &dirs()), archived.clone());
            prop_assert_eq!(archived.file_name(), source.file_name());
        }
    }
}
