//! 纵向会话度量的批处理流程.
//!
//! 索引 -> 配对 -> 逐标签度量 -> 元数据关联 -> 增量写入.

use crate::consts::cortical_and_subcortical;
use crate::metrics::{LabelSelection, MetricSpec};
use crate::pairing::PairPolicy;
use crate::writer::WriteError;

mod report;
mod runner;

pub use report::{AccTimer, PairOutcome, RunSummary, SkipReason, SubjectReport};
pub use runner::Runner;

/// 批处理参数.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// 配对策略.
    pub policy: PairPolicy,

    /// 需要计算的标签.
    pub selection: LabelSelection,

    /// 度量参数.
    pub metrics: MetricSpec,
}

impl Default for RunOptions {
    /// 全配对, 皮层 + 皮层下 34 个区域, 默认度量参数.
    fn default() -> Self {
        Self {
            policy: PairPolicy::AllPairs,
            selection: LabelSelection::Explicit(cortical_and_subcortical()),
            metrics: MetricSpec::default(),
        }
    }
}

/// 使整次运行中止的错误. 单个会话对的失败不在此列.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// 结果写入失败.
    #[error(transparent)]
    Write(#[from] WriteError),
}
