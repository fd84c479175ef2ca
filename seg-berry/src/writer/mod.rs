//! 分块增量写入的结果表.
//!
//! 结果以 CSV 形式追加到目标文件. 行先进入 FIFO 缓冲区,
//! 缓冲区满 `chunk_size` 行时整体落盘, 因此进程中断时最多丢失一个分块.
//!
//! 表头只写一次: 目标文件不存在或为空时, 第一次成功落盘会先写表头;
//! 已存在的非空文件视为已有表头. 上次运行在写入中途被打断时,
//! 文件末尾可能留下不完整的一行, 打开时会截掉它.

use std::collections::{HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::consts::LabelCode;
use crate::labels::LabelMetadata;
use crate::metrics::LabelMetrics;
use crate::table::{column_of, escape, split_record};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 输出表的列, 按顺序.
pub const COLUMNS: [&str; 13] = [
    "subject",
    "session1",
    "session2",
    "label",
    "label_name",
    "structure",
    "region_category",
    "volume1",
    "volume2",
    "volume_diff",
    "dice",
    "surface_dice",
    "hd95",
];

/// 一行结果: 一个会话对上的一个标签.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricRow {
    /// 受试者.
    pub subject: String,

    /// 较早的会话.
    pub session1: String,

    /// 较晚的会话.
    pub session2: String,

    /// 标签.
    pub label: LabelCode,

    /// 标签名.
    pub label_name: Option<String>,

    /// 结构名.
    pub structure: Option<String>,

    /// 区域类别.
    pub region_category: Option<String>,

    /// `session1` 中的体积, 立方毫米.
    pub volume1: f64,

    /// `session2` 中的体积, 立方毫米.
    pub volume2: f64,

    /// `volume2 - volume1`.
    pub volume_diff: f64,

    /// Dice 系数, 可能为 NaN.
    pub dice: f64,

    /// 表面 Dice.
    pub surface_dice: f64,

    /// 稳健 Hausdorff 距离, 可能为 NaN.
    pub hd95: f64,
}

impl MetricRow {
    /// 由度量结果和标签元数据组装一行.
    pub fn new(
        subject: &str,
        session1: &str,
        session2: &str,
        m: &LabelMetrics,
        meta: LabelMetadata,
    ) -> Self {
        Self {
            subject: subject.to_string(),
            session1: session1.to_string(),
            session2: session2.to_string(),
            label: m.label,
            label_name: meta.label_name,
            structure: meta.structure,
            region_category: meta.region_category,
            volume1: m.volume1,
            volume2: m.volume2,
            volume_diff: m.volume_diff,
            dice: m.dice,
            surface_dice: m.surface_dice,
            hd95: m.hd95,
        }
    }

    fn key(&self) -> RowKey {
        (
            self.subject.clone(),
            self.session1.clone(),
            self.session2.clone(),
            self.label,
        )
    }
}

/// `(subject, session1, session2, label)`.
type RowKey = (String, String, String, LabelCode);

/// 写入已有结果表时的行为.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ResumeMode {
    /// 直接追加. 重复运行会产生重复行.
    #[default]
    Append,

    /// 预先扫描已有结果, 丢弃已经存在的行.
    SkipExisting,
}

/// 写入错误.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// 底层 I/O 错误.
    #[error("写入 {path} 失败: {source}")]
    Io {
        /// 目标文件.
        path: PathBuf,

        /// 底层错误.
        source: io::Error,
    },

    /// 已有结果表缺少必需的列.
    #[error("结果表 {path} 缺少 `{column}` 列, 无法续写")]
    MissingColumn {
        /// 目标文件.
        path: PathBuf,

        /// 缺少的列名.
        column: &'static str,
    },
}

/// 锁内状态.
#[derive(Debug, Default)]
struct WriterState {
    header_written: bool,
    buffer: VecDeque<MetricRow>,
    rows_written: usize,
    existing_rows: HashSet<RowKey>,
}

/// 增量结果写入器.
///
/// 内部状态由互斥锁保护, 多个生产者可以共享同一个写入器,
/// 各自的落盘操作会串行化, 表头仍然只写一次.
#[derive(Debug)]
pub struct ResultWriter {
    path: PathBuf,
    chunk_size: NonZeroUsize,
    resume: ResumeMode,
    state: Mutex<WriterState>,
}

/// 写入单行. NaN 和 `None` 写为空单元格.
fn write_row<W: Write>(w: &mut W, row: &MetricRow) -> io::Result<()> {
    #[inline]
    fn f64_to_cell(f: f64) -> String {
        if f.is_nan() {
            String::new()
        } else {
            format!("{f:?}")
        }
    }

    #[inline]
    fn opt_to_cell(s: &Option<String>) -> String {
        s.as_deref().map(escape).unwrap_or_default().into_owned()
    }

    writeln!(
        w,
        "{},{},{},{},{},{},{},{},{},{},{},{},{}",
        escape(&row.subject),
        escape(&row.session1),
        escape(&row.session2),
        row.label,
        opt_to_cell(&row.label_name),
        opt_to_cell(&row.structure),
        opt_to_cell(&row.region_category),
        f64_to_cell(row.volume1),
        f64_to_cell(row.volume2),
        f64_to_cell(row.volume_diff),
        f64_to_cell(row.dice),
        f64_to_cell(row.surface_dice),
        f64_to_cell(row.hd95),
    )
}

impl ResultWriter {
    /// 打开写入器. 不会创建目标文件, 直到第一次落盘.
    /// 已有文件若不以换行结尾, 末尾不完整的一行会被截掉.
    ///
    /// [`ResumeMode::SkipExisting`] 模式下会读取已有结果表,
    /// 其表头必须包含 `subject`, `session1`, `session2`, `label` 四列.
    pub fn open<P: AsRef<Path>>(
        path: P,
        chunk_size: NonZeroUsize,
        resume: ResumeMode,
    ) -> Result<Self, WriteError> {
        let path = path.as_ref().to_owned();
        let header_written = truncate_partial_line(&path).map_err(|source| WriteError::Io {
            path: path.clone(),
            source,
        })? > 0;

        let mut state = WriterState {
            header_written,
            ..Default::default()
        };
        if header_written && resume == ResumeMode::SkipExisting {
            scan_existing(&path, &mut state)?;
            log::info!(
                "{} 中已有 {} 行结果",
                path.display(),
                state.existing_rows.len()
            );
        }

        Ok(Self {
            path,
            chunk_size,
            resume,
            state: Mutex::new(state),
        })
    }

    /// 目标文件.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 续写模式.
    #[inline]
    pub fn resume_mode(&self) -> ResumeMode {
        self.resume
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 表头是否已经写入 (或目标文件原本就非空).
    pub fn header_written(&self) -> bool {
        self.lock().header_written
    }

    /// 缓冲区中尚未落盘的行数.
    pub fn pending(&self) -> usize {
        self.lock().buffer.len()
    }

    /// 本写入器已落盘的行数.
    pub fn rows_written(&self) -> usize {
        self.lock().rows_written
    }

    /// 已有结果表中是否已经有该会话对上 `labels` 的每一行.
    /// 仅在 [`ResumeMode::SkipExisting`] 下有意义.
    pub fn contains_labels(
        &self,
        subject: &str,
        session1: &str,
        session2: &str,
        labels: &[LabelCode],
    ) -> bool {
        let state = self.lock();
        let mut key = (
            subject.to_string(),
            session1.to_string(),
            session2.to_string(),
            0,
        );
        labels.iter().all(|&label| {
            key.3 = label;
            state.existing_rows.contains(&key)
        })
    }

    /// 追加若干行, 每凑满一个分块就落盘一次. 返回本次落盘的行数.
    ///
    /// 落盘失败时未写入的行保留在缓冲区中.
    pub fn push<I: IntoIterator<Item = MetricRow>>(&self, rows: I) -> Result<usize, WriteError> {
        let mut state = self.lock();
        let chunk = self.chunk_size.get();
        let mut flushed = 0;

        for row in rows {
            if self.resume == ResumeMode::SkipExisting && state.existing_rows.contains(&row.key())
            {
                log::debug!(
                    "跳过已有结果 {} {} {} {}",
                    row.subject,
                    row.session1,
                    row.session2,
                    row.label
                );
                continue;
            }
            state.buffer.push_back(row);
        }
        while state.buffer.len() >= chunk {
            flushed += self.write_chunk(&mut state, chunk)?;
        }
        Ok(flushed)
    }

    /// 将缓冲区中的全部行落盘. 返回落盘的行数.
    pub fn flush(&self) -> Result<usize, WriteError> {
        let mut state = self.lock();
        let n = state.buffer.len();
        if n == 0 {
            return Ok(0);
        }
        self.write_chunk(&mut state, n)
    }

    /// 落盘剩余行并返回本写入器累计写入的行数.
    pub fn finish(self) -> Result<usize, WriteError> {
        self.flush()?;
        Ok(self.rows_written())
    }

    /// 将缓冲区最前面的 `n` 行写入目标文件. 成功后才更新状态.
    fn write_chunk(&self, state: &mut WriterState, n: usize) -> Result<usize, WriteError> {
        let mut buf = Vec::with_capacity(128 * (n + 1));
        if !state.header_written {
            // 写入内存缓冲区不会失败.
            let _ = writeln!(buf, "{}", COLUMNS.join(","));
        }
        for row in state.buffer.iter().take(n) {
            let _ = write_row(&mut buf, row);
        }

        self.append_bytes(&buf).map_err(|source| WriteError::Io {
            path: self.path.clone(),
            source,
        })?;

        state.header_written = true;
        state.buffer.drain(..n);
        state.rows_written += n;
        log::info!("已写入 {n} 行到 {}", self.path.display());
        Ok(n)
    }

    fn append_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        f.write_all(bytes)?;
        f.flush()
    }
}

/// 若文件不以换行结尾, 截断到最后一个换行之后. 返回截断后的长度.
/// 文件不存在时返回 0.
fn truncate_partial_line(path: &Path) -> io::Result<u64> {
    const BLOCK: u64 = 4096;

    let mut f = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let len = f.metadata()?.len();
    let mut end = len;
    let mut buf = Vec::with_capacity(BLOCK as usize);
    while end > 0 {
        let start = end.saturating_sub(BLOCK);
        buf.clear();
        f.seek(SeekFrom::Start(start))?;
        (&mut f).take(end - start).read_to_end(&mut buf)?;
        if let Some(i) = buf.iter().rposition(|&b| b == b'\n') {
            end = start + i as u64 + 1;
            break;
        }
        end = start;
    }
    if end < len {
        log::warn!(
            "{} 末尾有 {} 字节不完整的行, 已截掉",
            path.display(),
            len - end
        );
        f.set_len(end)?;
    }
    Ok(end)
}

/// 读取已有结果表中的行键.
fn scan_existing(path: &Path, state: &mut WriterState) -> Result<(), WriteError> {
    let io_err = |source| WriteError::Io {
        path: path.to_owned(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => split_record(&line.map_err(io_err)?),
        None => return Ok(()),
    };
    let col = |column: &'static str| {
        column_of(&header, column).ok_or_else(|| WriteError::MissingColumn {
            path: path.to_owned(),
            column,
        })
    };
    let cols = [col("subject")?, col("session1")?, col("session2")?, col("label")?];

    for line in lines {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_record(&line);
        let [subject, session1, session2, label] = cols.map(|c| fields.get(c).cloned());
        match (subject, session1, session2, label.and_then(|l| l.trim().parse().ok())) {
            (Some(subject), Some(session1), Some(session2), Some(label)) => {
                state
                    .existing_rows
                    .insert((subject, session1, session2, label));
            }
            _ => log::warn!("{} 中有无法解析的行: {line}", path.display()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MetricRow, ResultWriter, ResumeMode, WriteError, COLUMNS};
    use std::fs;
    use std::num::NonZeroUsize;

    fn row(session2: &str, label: i32) -> MetricRow {
        MetricRow {
            subject: "sub-01".to_string(),
            session1: "ses-1".to_string(),
            session2: session2.to_string(),
            label,
            label_name: Some("Left-Hippocampus".to_string()),
            structure: None,
            region_category: None,
            volume1: 27.0,
            volume2: 27.0,
            volume_diff: 0.0,
            dice: 1.0,
            surface_dice: 1.0,
            hd95: 0.0,
        }
    }

    fn chunk(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn lines_of(path: &std::path::Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_header_once_across_chunks_and_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_metrics.csv");

        let w = ResultWriter::open(&path, chunk(100), ResumeMode::Append).unwrap();
        assert!(!w.header_written());
        let batches = [
            vec![row("ses-2", 17), row("ses-2", 53)],
            vec![row("ses-3", 17), row("ses-3", 53)],
            vec![row("ses-4", 17)],
        ];
        for batch in batches {
            w.push(batch).unwrap();
            w.flush().unwrap();
        }
        assert_eq!(w.finish().unwrap(), 5);

        let lines = lines_of(&path);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], COLUMNS.join(","));
        assert_eq!(
            lines[1],
            "sub-01,ses-1,ses-2,17,Left-Hippocampus,,,27.0,27.0,0.0,1.0,1.0,0.0"
        );

        let w = ResultWriter::open(&path, chunk(5), ResumeMode::Append).unwrap();
        assert!(w.header_written());
        w.push(vec![row("ses-5", 17)]).unwrap();
        w.finish().unwrap();
        let lines = lines_of(&path);
        assert_eq!(lines.len(), 7);
        assert_eq!(lines.iter().filter(|l| l.starts_with("subject,")).count(), 1);
    }

    #[test]
    fn test_chunked_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let w = ResultWriter::open(&path, chunk(2), ResumeMode::Append).unwrap();

        assert_eq!(w.push(vec![row("ses-2", 17)]).unwrap(), 0);
        assert!(!path.exists());
        let rest = vec![
            row("ses-2", 53),
            row("ses-3", 17),
            row("ses-3", 53),
            row("ses-4", 17),
        ];
        assert_eq!(w.push(rest).unwrap(), 4);
        assert_eq!(w.pending(), 1);
        assert_eq!(lines_of(&path).len(), 5);
        assert_eq!(w.finish().unwrap(), 5);
        assert_eq!(lines_of(&path).len(), 6);
    }

    #[test]
    fn test_nan_and_escape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let w = ResultWriter::open(&path, chunk(1), ResumeMode::Append).unwrap();
        let mut r = row("ses-2", 99);
        r.dice = f64::NAN;
        r.hd95 = f64::NAN;
        r.surface_dice = 0.0;
        r.label_name = Some("a,b".to_string());
        r.volume1 = 0.125;
        w.push(vec![r]).unwrap();

        let lines = lines_of(&path);
        assert_eq!(
            lines[1],
            "sub-01,ses-1,ses-2,99,\"a,b\",,,0.125,27.0,0.0,,0.0,"
        );
    }

    #[test]
    fn test_failed_flush_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("missing");
        let path = sub.join("out.csv");
        let w = ResultWriter::open(&path, chunk(2), ResumeMode::Append).unwrap();

        let e = w.push(vec![row("ses-2", 17), row("ses-2", 53)]);
        assert!(matches!(e, Err(WriteError::Io { .. })));
        assert_eq!(w.pending(), 2);
        assert!(!w.header_written());

        fs::create_dir(&sub).unwrap();
        assert_eq!(w.flush().unwrap(), 2);
        let lines = lines_of(&path);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("subject,"));
    }

    #[test]
    fn test_skip_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let w = ResultWriter::open(&path, chunk(10), ResumeMode::Append).unwrap();
        w.push(vec![row("ses-2", 17), row("ses-2", 53)]).unwrap();
        w.finish().unwrap();

        let w = ResultWriter::open(&path, chunk(10), ResumeMode::SkipExisting).unwrap();
        assert!(w.contains_labels("sub-01", "ses-1", "ses-2", &[17, 53]));
        assert!(!w.contains_labels("sub-01", "ses-1", "ses-2", &[17, 53, 10]));
        assert!(!w.contains_labels("sub-01", "ses-1", "ses-3", &[17]));
        w.push(vec![row("ses-2", 17), row("ses-2", 10), row("ses-3", 17)]).unwrap();
        assert_eq!(w.finish().unwrap(), 2);
        assert_eq!(lines_of(&path).len(), 5);
    }

    #[test]
    fn test_skip_existing_requires_key_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "subject,label\nsub-01,17\n").unwrap();
        let e = ResultWriter::open(&path, chunk(1), ResumeMode::SkipExisting);
        assert!(matches!(
            e,
            Err(WriteError::MissingColumn {
                column: "session1",
                ..
            })
        ));
        // 直接追加不检查表头.
        assert!(ResultWriter::open(&path, chunk(1), ResumeMode::Append).is_ok());
    }

    #[test]
    fn test_partial_trailing_line_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let header = COLUMNS.join(",");
        fs::write(&path, format!("{header}\nsub-01,ses-1,ses-2,17,,,,27.0")).unwrap();

        let w = ResultWriter::open(&path, chunk(1), ResumeMode::Append).unwrap();
        assert!(w.header_written());
        w.push(vec![row("ses-3", 17)]).unwrap();

        let lines = lines_of(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], header);
        assert_eq!(lines[1].split(',').count(), COLUMNS.len());
        assert!(lines[1].starts_with("sub-01,ses-1,ses-3,17,"));
    }

    #[test]
    fn test_partial_header_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "subject,sess").unwrap();

        let w = ResultWriter::open(&path, chunk(1), ResumeMode::SkipExisting).unwrap();
        assert!(!w.header_written());
        w.push(vec![row("ses-2", 17)]).unwrap();
        let lines = lines_of(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], COLUMNS.join(","));
    }
}
