//! 标签元数据查询表.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::consts::LabelCode;
use crate::table::{column_of, split_record};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 单个标签的元数据. 所有字段均可缺失.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelMetadata {
    /// 标签名, 例如 `Left-Hippocampus`.
    pub label_name: Option<String>,

    /// 结构名.
    pub structure: Option<String>,

    /// 区域类别, 例如 `subcortical`.
    pub region_category: Option<String>,
}

/// 读取查询表时的错误.
#[derive(Debug, thiserror::Error)]
pub enum LabelTableError {
    /// 文件读取失败.
    #[error("无法读取标签表 {path}: {source}")]
    Io {
        /// 文件路径.
        path: PathBuf,

        /// 底层错误.
        source: std::io::Error,
    },

    /// 文件为空.
    #[error("标签表 {0} 为空")]
    Empty(PathBuf),

    /// 表头缺少 `label` 列.
    #[error("标签表 {0} 缺少 `label` 列")]
    MissingLabelColumn(PathBuf),

    /// `label` 列无法解析为整数.
    #[error("标签表 {path} 第 {line} 行: 无法解析标签 `{value}`")]
    BadLabel {
        /// 文件路径.
        path: PathBuf,

        /// 行号, 从 1 开始.
        line: usize,

        /// 原始值.
        value: String,
    },
}

/// `label -> LabelMetadata` 查询表. 未收录的标签返回空元数据.
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
    entries: HashMap<LabelCode, LabelMetadata>,
}

impl FromIterator<(LabelCode, LabelMetadata)> for LabelTable {
    fn from_iter<T: IntoIterator<Item = (LabelCode, LabelMetadata)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl LabelTable {
    /// 空表.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// 从 CSV 文件读取.
    ///
    /// 列按表头名称定位, 只有 `label` 是必需的. `label_name`, `structure`,
    /// `region_category` 缺列或单元格为空时为 `None`. 空行被忽略,
    /// 重复的标签以后出现者为准.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LabelTableError> {
        let path = path.as_ref();
        let io_err = |source| LabelTableError::Io {
            path: path.to_owned(),
            source,
        };

        let reader = BufReader::new(File::open(path).map_err(io_err)?);
        let mut lines = reader.lines().enumerate();

        let header = match lines.next() {
            Some((_, line)) => split_record(&line.map_err(io_err)?),
            None => return Err(LabelTableError::Empty(path.to_owned())),
        };
        let label_col = column_of(&header, "label")
            .ok_or_else(|| LabelTableError::MissingLabelColumn(path.to_owned()))?;
        let name_col = column_of(&header, "label_name");
        let structure_col = column_of(&header, "structure");
        let category_col = column_of(&header, "region_category");

        let mut entries = HashMap::new();
        for (i, line) in lines {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_record(&line);
            let cell = |col: Option<usize>| {
                col.and_then(|c| fields.get(c))
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };

            let raw = cell(Some(label_col)).unwrap_or_default();
            let label = raw
                .parse::<LabelCode>()
                .map_err(|_| LabelTableError::BadLabel {
                    path: path.to_owned(),
                    line: i + 1,
                    value: raw.clone(),
                })?;
            entries.insert(
                label,
                LabelMetadata {
                    label_name: cell(name_col),
                    structure: cell(structure_col),
                    region_category: cell(category_col),
                },
            );
        }

        log::debug!("从 {} 读取了 {} 个标签", path.display(), entries.len());
        Ok(Self { entries })
    }

    /// 查询 `label`. 未收录时返回空元数据.
    pub fn lookup(&self, label: LabelCode) -> LabelMetadata {
        self.entries.get(&label).cloned().unwrap_or_default()
    }

    /// 已收录的标签个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空表.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
