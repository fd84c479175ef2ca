//! 命令行参数.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;
use seg_berry::consts::{defaults, names};
use seg_berry::pairing::PairPolicy;
use seg_berry::writer::ResumeMode;

/// 配对策略.
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum Policy {
    /// 任意两个会话.
    #[default]
    All,

    /// 仅相邻会话.
    Consecutive,
}

impl From<Policy> for PairPolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::All => PairPolicy::AllPairs,
            Policy::Consecutive => PairPolicy::Consecutive,
        }
    }
}

/// 已有结果表的处理方式.
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum Resume {
    /// 直接追加.
    #[default]
    Append,

    /// 跳过已有结果.
    Skip,
}

impl From<Resume> for ResumeMode {
    fn from(r: Resume) -> Self {
        match r {
            Resume::Append => ResumeMode::Append,
            Resume::Skip => ResumeMode::SkipExisting,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "session-metrics")]
#[command(version, long_about = None)]
#[command(about = "Per-label longitudinal segmentation metrics between sessions")]
pub struct Args {
    /// Root directory of the segmentation tree [default: $HOME/dataset/freesurfer]
    #[arg(short, long, value_name = "DIR", env = "FREESURFER_DIR")]
    pub root: Option<PathBuf>,

    /// Output CSV file [default: $RESULTS_DIR/session_metrics.csv or ./data/session_metrics.csv]
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Only process these subjects (comma-separated)
    #[arg(long, value_name = "SUBJECTS", value_delimiter = ',')]
    pub subjects: Vec<String>,

    /// Only process sessions whose run directory contains '.long.'
    #[arg(long)]
    pub long_only: bool,

    /// Labels to evaluate (comma-separated) [default: cortical + subcortical]
    #[arg(long, value_name = "LABELS", value_delimiter = ',', allow_negative_numbers = true)]
    pub labels: Vec<i32>,

    /// Evaluate every non-zero label present in either volume
    #[arg(long, conflicts_with = "labels")]
    pub present_labels: bool,

    /// Rows buffered before each write
    #[arg(long, value_name = "N", default_value_t = defaults::CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Session pairing policy
    #[arg(long, value_enum, default_value_t = Policy::All)]
    pub policy: Policy,

    /// Maximum directory depth to search
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Accepted segmentation file names [default: aparc.DKTatlas+aseg.mgz,aparcDKT+aseg.mgz]
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub names: Vec<String>,

    /// Accepted segmentation file name suffixes [default: _aparcDKT+aseg.mgz]
    #[arg(long, value_name = "SUFFIXES", value_delimiter = ',')]
    pub suffixes: Vec<String>,

    /// Label lookup table CSV (label,label_name,structure,region_category)
    #[arg(long, value_name = "FILE")]
    pub lut: Option<PathBuf>,

    /// Surface Dice tolerance in mm
    #[arg(long, value_name = "MM", default_value_t = defaults::SURFACE_TOLERANCE_MM)]
    pub tolerance: f64,

    /// Hausdorff distance percentile, in (0, 100]
    #[arg(long, value_name = "P", default_value_t = defaults::HAUSDORFF_PERCENTILE)]
    pub percentile: f64,

    /// Neighbourhood used for surface extraction (6 or 26)
    #[arg(long, value_name = "N", default_value_t = 6)]
    pub connectivity: u32,

    /// What to do with rows already present in the output
    #[arg(long, value_enum, default_value_t = Resume::Append)]
    pub resume: Resume,

    /// Process subjects in parallel
    #[arg(short = 'j', long)]
    pub parallel: bool,

    /// Subject name for run directories named `ses-*`
    #[arg(long, value_name = "NAME", default_value = names::POOLED_SUBJECT)]
    pub pooled_subject: String,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Less output (-q warn, -qq error)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Args {
    /// 由 `-v`/`-q` 决定的日志级别. 均未给出时返回 `None`.
    pub fn log_level(&self) -> Option<LevelFilter> {
        match (self.verbose, self.quiet) {
            (0, 0) => None,
            (1, _) => Some(LevelFilter::Debug),
            (v, _) if v >= 2 => Some(LevelFilter::Trace),
            (_, 1) => Some(LevelFilter::Warn),
            _ => Some(LevelFilter::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Args, Policy, Resume};
    use clap::Parser;
    use log::LevelFilter;

    #[test]
    fn test_defaults() {
        let a = Args::try_parse_from(["session-metrics", "--root", "/data"]).unwrap();
        assert_eq!(a.chunk_size, 5);
        assert!(matches!(a.policy, Policy::All));
        assert!(matches!(a.resume, Resume::Append));
        assert!(a.labels.is_empty());
        assert_eq!(a.pooled_subject, "simon");
        assert_eq!(a.connectivity, 6);
        assert_eq!(a.log_level(), None);
    }

    #[test]
    fn test_lists_and_levels() {
        let a = Args::try_parse_from([
            "session-metrics",
            "--labels",
            "17,53",
            "--subjects",
            "sub-01,sub-02",
            "--policy",
            "consecutive",
            "--resume",
            "skip",
            "-vv",
        ])
        .unwrap();
        assert_eq!(a.labels, vec![17, 53]);
        assert_eq!(a.subjects, vec!["sub-01", "sub-02"]);
        assert!(matches!(a.policy, Policy::Consecutive));
        assert!(matches!(a.resume, Resume::Skip));
        assert_eq!(a.log_level(), Some(LevelFilter::Trace));

        let a = Args::try_parse_from(["session-metrics", "-q"]).unwrap();
        assert_eq!(a.log_level(), Some(LevelFilter::Warn));
    }

    #[test]
    fn test_present_conflicts_with_labels() {
        let r = Args::try_parse_from(["session-metrics", "--labels", "17", "--present-labels"]);
        assert!(r.is_err());
    }
}
