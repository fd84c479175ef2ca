//! 运行统计.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::metrics::ShapeMismatch;

/// 累计计时器.
///
/// 该计时器支持 "中途中断" 与 "结束中断, 继续开始计时".
#[derive(Clone, Debug)]
pub struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 初始化计时器. 初始化时会视为已经开始计时 (`self.start()`).
    #[inline]
    pub fn new() -> Self {
        Self {
            consumed: Duration::ZERO,
            since: Instant::now(),
        }
    }

    /// 开始计时. 可以通过反复调用来重置.
    #[inline]
    pub fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束计时, 并将这一区间的时间累加. 返回本轮计时时长.
    ///
    /// # 注意
    ///
    /// 上一次调用必须是 `self.start()`, 否则计算时间值无意义.
    #[inline]
    pub fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    /// 累计时长.
    #[inline]
    pub fn total(&self) -> Duration {
        self.consumed
    }
}

impl Default for AccTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// 会话对被跳过的原因.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// 两个标签体形状不一致.
    ShapeMismatch(ShapeMismatch),

    /// 结果表中已有该会话对的结果.
    AlreadyWritten,
}

/// 单个会话对的处理结果.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairOutcome {
    /// 计算完成, 产生了 `rows` 行结果.
    Computed {
        /// 结果行数.
        rows: usize,
    },

    /// 被跳过.
    Skipped(SkipReason),

    /// 读取失败. 附带错误描述.
    Failed(String),
}

/// 单个受试者的处理统计.
#[derive(Clone, Debug, Default)]
pub struct SubjectReport {
    /// 受试者.
    pub subject: String,

    /// 会话个数.
    pub sessions: usize,

    /// 计算完成的会话对个数.
    pub computed: usize,

    /// 因形状不一致跳过的会话对个数.
    pub shape_mismatches: usize,

    /// 因已有结果跳过的会话对个数.
    pub already_written: usize,

    /// 读取失败的会话对个数.
    pub failed: usize,

    /// 产生的结果行数.
    pub rows: usize,

    /// 计算度量所花的时间 (不含读取).
    pub compute_time: Duration,

    /// 处理该受试者所花的总时间.
    pub real_time: Duration,
}

impl SubjectReport {
    /// 初始化.
    pub fn new<S: Into<String>>(subject: S, sessions: usize) -> Self {
        Self {
            subject: subject.into(),
            sessions,
            ..Default::default()
        }
    }

    /// 记录一个会话对的处理结果.
    pub fn record(&mut self, outcome: &PairOutcome) {
        match outcome {
            PairOutcome::Computed { rows } => {
                self.computed += 1;
                self.rows += rows;
            }
            PairOutcome::Skipped(SkipReason::ShapeMismatch(_)) => self.shape_mismatches += 1,
            PairOutcome::Skipped(SkipReason::AlreadyWritten) => self.already_written += 1,
            PairOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// 会话对总数.
    #[inline]
    pub fn pairs(&self) -> usize {
        self.computed + self.shape_mismatches + self.already_written + self.failed
    }
}

/// 整次运行的统计.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    subjects: Vec<SubjectReport>,
    real_time: Duration,
}

impl RunSummary {
    /// 由各受试者的统计组成. 受试者按名称排序.
    pub fn new(mut subjects: Vec<SubjectReport>, real_time: Duration) -> Self {
        subjects.sort_by(|a, b| a.subject.cmp(&b.subject));
        Self {
            subjects,
            real_time,
        }
    }

    /// 各受试者统计.
    #[inline]
    pub fn subjects(&self) -> &[SubjectReport] {
        &self.subjects
    }

    fn sum(&self, f: fn(&SubjectReport) -> usize) -> usize {
        self.subjects.iter().map(f).sum()
    }

    /// 会话对总数.
    pub fn pairs(&self) -> usize {
        self.sum(SubjectReport::pairs)
    }

    /// 计算完成的会话对总数.
    pub fn computed(&self) -> usize {
        self.sum(|r| r.computed)
    }

    /// 跳过的会话对总数.
    pub fn skipped(&self) -> usize {
        self.sum(|r| r.shape_mismatches + r.already_written)
    }

    /// 读取失败的会话对总数.
    pub fn failed(&self) -> usize {
        self.sum(|r| r.failed)
    }

    /// 结果行总数.
    pub fn rows(&self) -> usize {
        self.sum(|r| r.rows)
    }

    /// 将统计结果写进 `w` 中.
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        const S4: &str = "    ";

        writeln!(w, "Run summary:")?;
        writeln!(w, "{S4}Subjects: {}", self.subjects.len())?;
        writeln!(w, "{S4}Session pairs: {}", self.pairs())?;
        writeln!(w, "{S4}Computed: {}", self.computed())?;
        writeln!(w, "{S4}Skipped: {}", self.skipped())?;
        writeln!(w, "{S4}Failed: {}", self.failed())?;
        writeln!(w, "{S4}Rows: {}", self.rows())?;
        writeln!(w, "{S4}Total machine time: {} ms", self.real_time.as_millis())?;
        for r in self.subjects.iter() {
            writeln!(
                w,
                "{S4}{S4}{}: {} sessions, {}/{} pairs computed, {} rows, {} ms",
                r.subject,
                r.sessions,
                r.computed,
                r.pairs(),
                r.rows,
                r.compute_time.as_millis()
            )?;
        }
        Ok(())
    }
}
