//! 计算纵向会话之间的逐标签分割差异度量, 结果写入 CSV.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use seg_berry::consts::cortical_and_subcortical;
use seg_berry::dataset::{IndexError, IndexOptions, SegmentationIndex};
use seg_berry::identity::Resolver;
use seg_berry::labels::{LabelTable, LabelTableError};
use seg_berry::longitudinal::{RunError, RunOptions, RunSummary, Runner};
use seg_berry::metrics::{LabelSelection, MetricSpec};
use seg_berry::morph_3d::Connectivity;
use seg_berry::writer::{ResultWriter, WriteError};

mod args;

use args::Args;

/// 使程序以非零状态退出的错误.
#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("无法初始化日志: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("不支持的邻域: {0} (仅支持 6 或 26)")]
    Connectivity(u32),

    #[error("非法的度量参数: tolerance = {tolerance}, percentile = {percentile}")]
    MetricSpec { tolerance: f64, percentile: f64 },

    #[error("chunk size 必须为正")]
    ChunkSize,

    #[error("无法创建输出目录: {0}")]
    OutputDir(io::Error),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Labels(#[from] LabelTableError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Run(#[from] RunError),
}

fn init_logger(args: &Args) -> Result<(), log::SetLoggerError> {
    let logger = match args.log_level() {
        Some(level) => SimpleLogger::new().with_level(level),
        None => SimpleLogger::new().with_level(LevelFilter::Info).env(),
    };
    logger.init()
}

fn index_options(args: &Args) -> IndexOptions {
    let mut opts = IndexOptions {
        subjects: (!args.subjects.is_empty())
            .then(|| args.subjects.iter().cloned().collect::<BTreeSet<_>>()),
        max_depth: args.max_depth,
        long_only: args.long_only,
        resolver: Resolver::default().pooled_subject(args.pooled_subject.as_str()),
        ..Default::default()
    };
    if !args.names.is_empty() {
        opts.names = args.names.clone();
    }
    if !args.suffixes.is_empty() {
        opts.suffixes = args.suffixes.clone();
    }
    opts
}

fn run_options(args: &Args) -> Result<RunOptions, Error> {
    let connectivity = Connectivity::from_neighbours(args.connectivity)
        .ok_or(Error::Connectivity(args.connectivity))?;
    let metrics = MetricSpec::new(args.tolerance, args.percentile, connectivity).ok_or(
        Error::MetricSpec {
            tolerance: args.tolerance,
            percentile: args.percentile,
        },
    )?;
    let selection = if args.present_labels {
        LabelSelection::Present
    } else if args.labels.is_empty() {
        LabelSelection::Explicit(cortical_and_subcortical())
    } else {
        LabelSelection::Explicit(args.labels.clone())
    };
    Ok(RunOptions {
        policy: args.policy.into(),
        selection,
        metrics,
    })
}

#[cfg(feature = "rayon")]
fn run_all(runner: &Runner<'_>, parallel: bool) -> Result<RunSummary, RunError> {
    if parallel {
        log::info!("并行处理受试者, 可用核心数 {}", utils::cpus());
        runner.run_parallel()
    } else {
        runner.run()
    }
}

#[cfg(not(feature = "rayon"))]
fn run_all(runner: &Runner<'_>, parallel: bool) -> Result<RunSummary, RunError> {
    if parallel {
        log::warn!("未启用 rayon, 按顺序处理受试者");
    }
    runner.run()
}

fn run(args: &Args) -> Result<RunSummary, Error> {
    let opts = run_options(args)?;
    let root = args
        .root
        .clone()
        .unwrap_or_else(utils::loader::freesurfer_dir_from_env_or_home);
    let output = args
        .output
        .clone()
        .unwrap_or_else(utils::loader::results_path_from_env);
    let chunk_size = NonZeroUsize::new(args.chunk_size).ok_or(Error::ChunkSize)?;

    let index = SegmentationIndex::build(&root, &index_options(args))?;
    let labels = match &args.lut {
        Some(p) => LabelTable::open(p)?,
        None => LabelTable::empty(),
    };

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(Error::OutputDir)?;
    }
    let writer = ResultWriter::open(&output, chunk_size, args.resume.into())?;
    log::info!("结果写入 {}", output.display());

    let runner = Runner::new(&index, &writer, &labels, opts);
    let summary = run_all(&runner, args.parallel)?;
    writer.finish()?;
    Ok(summary)
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logger(&args) {
        eprintln!("{}", Error::from(e));
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(summary) => {
            let mut out = io::stdout().lock();
            let printed = utils::sep_to(&mut out)
                .and_then(|_| summary.describe_into(&mut out))
                .and_then(|_| utils::sep_to(&mut out))
                .and_then(|_| out.flush());
            if let Err(e) = printed {
                log::error!("无法输出统计结果: {e}");
            }
            if summary.failed() > 0 {
                log::warn!("{} 个会话对读取失败", summary.failed());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
