//! 会话对加载器.
//!
//! 提供迭代器风格的标签体获取模式.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::pairing::{select_pairs, PairPolicy};
use crate::volume::{LabelVolume, OpenVolumeError};

use super::SegmentationIndex;

/// 一个待比较的会话对. `session1` 在会话排序中位于 `session2` 之前.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionPair {
    /// 受试者.
    pub subject: String,

    /// 较早的会话.
    pub session1: String,

    /// `session1` 的分割文件.
    pub path1: PathBuf,

    /// 较晚的会话.
    pub session2: String,

    /// `session2` 的分割文件.
    pub path2: PathBuf,
}

/// 读取某个分割文件失败.
#[derive(Debug, thiserror::Error)]
#[error("无法读取 {path}: {source}")]
pub struct LoadError {
    /// 出错的文件.
    pub path: PathBuf,

    /// 底层错误.
    pub source: OpenVolumeError,
}

impl SegmentationIndex {
    /// 按 `policy` 生成 `subject` 的所有会话对. 受试者不存在时返回空列表.
    pub fn session_pairs(&self, subject: &str, policy: PairPolicy) -> Vec<SessionPair> {
        let Some(sessions) = self.sessions(subject) else {
            return Vec::new();
        };
        let keys: Vec<&str> = sessions.keys().map(String::as_str).collect();
        select_pairs(&keys, policy)
            .into_iter()
            .map(|(s1, s2)| SessionPair {
                subject: subject.to_string(),
                session1: s1.to_string(),
                path1: sessions[s1].clone(),
                session2: s2.to_string(),
                path2: sessions[s2].clone(),
            })
            .collect()
    }

    /// 创建 `subject` 的会话对加载器.
    #[inline]
    pub fn pair_loader(&self, subject: &str, policy: PairPolicy) -> PairLoader {
        PairLoader::new(self.session_pairs(subject, policy))
    }
}

/// 会话对标签体加载器.
///
/// 内部缓存上一对的两个标签体. 对于相邻配对策略, 每个文件只会被读取一次.
#[derive(Debug)]
pub struct PairLoader {
    pairs_rev: Vec<SessionPair>,
    cache: Vec<(PathBuf, Arc<LabelVolume>)>,
}

/// 加载器的输出.
pub type LoadedPair = Result<(Arc<LabelVolume>, Arc<LabelVolume>), LoadError>;

impl PairLoader {
    /// 按给定顺序加载 `pairs`.
    pub fn new<I: IntoIterator<Item = SessionPair>>(pairs: I) -> Self {
        let mut pairs_rev: Vec<SessionPair> = pairs.into_iter().collect();
        pairs_rev.reverse();
        Self {
            pairs_rev,
            cache: Vec::with_capacity(2),
        }
    }

    fn load(&self, path: &Path) -> Result<Arc<LabelVolume>, LoadError> {
        if let Some((_, v)) = self.cache.iter().find(|(p, _)| p == path) {
            log::debug!("复用已加载的 {}", path.display());
            return Ok(Arc::clone(v));
        }
        LabelVolume::open(path)
            .map(Arc::new)
            .map_err(|source| LoadError {
                path: path.to_owned(),
                source,
            })
    }
}

impl Iterator for PairLoader {
    type Item = (SessionPair, LoadedPair);

    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.pairs_rev.pop()?;

        let v1 = self.load(&pair.path1);
        let v2 = self.load(&pair.path2);
        let data = match (v1, v2) {
            (Ok(v1), Ok(v2)) => {
                self.cache = vec![
                    (pair.path1.clone(), Arc::clone(&v1)),
                    (pair.path2.clone(), Arc::clone(&v2)),
                ];
                Ok((v1, v2))
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        Some((pair, data))
    }
}

impl ExactSizeIterator for PairLoader {
    #[inline]
    fn len(&self) -> usize {
        self.pairs_rev.len()
    }
}
