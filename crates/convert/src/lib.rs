pub mod config;
pub mod error;
pub mod ffprobe;
pub mod hierarchy;
pub mod job;
pub mod media;
pub mod paths;
pub mod runner;
pub mod scan;

pub use config::{ConvertConfig, ProcessDirs};
pub use error::{Error, Result};
pub use ffprobe::{FFProbe, MediaProbe, ProbeMap};
pub use job::{build_jobs, Job, JobStatus};
pub use media::{DiscFormat, MediaCategory, MediaRecord};
pub use runner::{JobRunner, RunReport};
pub use scan::{scan_media, ScanOutcome};
