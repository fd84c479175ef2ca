//! 批处理执行器.

use std::time::Instant;

use crate::dataset::{PairLoader, SegmentationIndex, SessionPair};
use crate::labels::LabelTable;
use crate::metrics::{compare_volumes, LabelSelection};
use crate::writer::{MetricRow, ResultWriter, ResumeMode};

use super::report::{AccTimer, PairOutcome, RunSummary, SkipReason, SubjectReport};
use super::{RunError, RunOptions};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 批处理执行器. 借用索引, 写入器和标签表, 自身不持有状态.
#[derive(Debug)]
pub struct Runner<'a> {
    index: &'a SegmentationIndex,
    writer: &'a ResultWriter,
    labels: &'a LabelTable,
    opts: RunOptions,
}

impl<'a> Runner<'a> {
    /// 初始化.
    pub fn new(
        index: &'a SegmentationIndex,
        writer: &'a ResultWriter,
        labels: &'a LabelTable,
        opts: RunOptions,
    ) -> Self {
        Self {
            index,
            writer,
            labels,
            opts,
        }
    }

    /// 批处理参数.
    #[inline]
    pub fn options(&self) -> &RunOptions {
        &self.opts
    }

    /// 依次处理所有受试者.
    pub fn run(&self) -> Result<RunSummary, RunError> {
        let start = Instant::now();
        let reports = self
            .index
            .subjects()
            .map(|s| self.run_subject(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RunSummary::new(reports, start.elapsed()))
    }

    /// 并行处理所有受试者. 写入器内部加锁, 表头仍然只写一次.
    #[cfg(feature = "rayon")]
    pub fn run_parallel(&self) -> Result<RunSummary, RunError> {
        let start = Instant::now();
        let subjects: Vec<&str> = self.index.subjects().collect();
        let reports = subjects
            .into_par_iter()
            .map(|s| self.run_subject(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RunSummary::new(reports, start.elapsed()))
    }

    /// 处理单个受试者的全部会话对, 结束时落盘.
    ///
    /// 单个会话对读取失败或形状不一致时记录并继续. 写入失败时中止.
    pub fn run_subject(&self, subject: &str) -> Result<SubjectReport, RunError> {
        let start = Instant::now();
        let sessions = self.index.sessions(subject).map_or(0, |s| s.len());
        let mut report = SubjectReport::new(subject, sessions);

        let pairs = self.index.session_pairs(subject, self.opts.policy);
        log::info!("{subject}: {sessions} 个会话, {} 个会话对", pairs.len());

        let (todo, done): (Vec<_>, Vec<_>) = pairs.into_iter().partition(|p| !self.is_written(p));
        for p in done.iter() {
            log::debug!("{subject}: {} vs {} 已有结果, 跳过", p.session1, p.session2);
            report.record(&PairOutcome::Skipped(SkipReason::AlreadyWritten));
        }

        let mut timer = AccTimer::new();
        for (pair, data) in PairLoader::new(todo) {
            let outcome = match data {
                Err(e) => {
                    log::error!("{subject}: {} vs {} 读取失败: {e}", pair.session1, pair.session2);
                    PairOutcome::Failed(e.to_string())
                }
                Ok((v1, v2)) => {
                    timer.start();
                    let computed =
                        compare_volumes(&v1, &v2, &self.opts.selection, &self.opts.metrics);
                    timer.elapsed();
                    match computed {
                        Err(mismatch) => {
                            log::warn!(
                                "{subject}: {} vs {} 跳过: {mismatch}",
                                pair.session1,
                                pair.session2
                            );
                            PairOutcome::Skipped(SkipReason::ShapeMismatch(mismatch))
                        }
                        Ok(metrics) => {
                            let rows: Vec<MetricRow> = metrics
                                .iter()
                                .map(|m| {
                                    MetricRow::new(
                                        subject,
                                        &pair.session1,
                                        &pair.session2,
                                        m,
                                        self.labels.lookup(m.label),
                                    )
                                })
                                .collect();
                            let n = rows.len();
                            self.writer.push(rows)?;
                            PairOutcome::Computed { rows: n }
                        }
                    }
                }
            };
            report.record(&outcome);
        }
        self.writer.flush()?;

        report.compute_time = timer.total();
        report.real_time = start.elapsed();
        log::info!(
            "{subject}: 完成 {}/{} 个会话对, {} 行",
            report.computed,
            report.pairs(),
            report.rows
        );
        Ok(report)
    }

    /// 会话对的每个标签都已有结果时才跳过. `Present` 模式下标签取决于体数据,
    /// 只能交给写入器逐行去重.
    fn is_written(&self, p: &SessionPair) -> bool {
        if self.writer.resume_mode() != ResumeMode::SkipExisting {
            return false;
        }
        match &self.opts.selection {
            LabelSelection::Explicit(labels) => {
                self.writer
                    .contains_labels(&p.subject, &p.session1, &p.session2, labels)
            }
            LabelSelection::Present => false,
        }
    }
}
