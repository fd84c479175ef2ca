//! 数据集操作.
//!
//! 遍历目录树, 找出所有分割文件, 解析其 `(subject, session)` 并按受试者分组.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::consts::names;
use crate::identity::{is_long_path, Resolver};

mod loader;

pub use loader::{LoadError, PairLoader, SessionPair};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 一个分割文件.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SegmentationRecord {
    /// 受试者.
    pub subject: String,

    /// 会话.
    pub session: String,

    /// 文件路径.
    pub path: PathBuf,
}

/// 同一 `(subject, session)` 出现了多个文件. 保留先发现的那个.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Collision {
    /// 被保留的文件.
    pub kept: PathBuf,

    /// 被丢弃的记录.
    pub dropped: SegmentationRecord,
}

/// 建立索引时的致命错误.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// 根目录不存在或不是目录.
    #[error("数据根目录 {0} 不存在")]
    RootNotFound(PathBuf),

    /// 没有找到任何分割文件.
    #[error("在 {0} 下没有找到分割文件")]
    NoSegmentations(PathBuf),

    /// 过滤后没有剩下任何受试者.
    #[error("在 {0} 下没有找到符合条件的受试者")]
    NoSubjects(PathBuf),
}

/// 建立索引的参数.
#[derive(Clone, Debug)]
pub struct IndexOptions {
    /// 完全匹配的文件名.
    pub names: Vec<String>,

    /// 后缀匹配的文件名.
    pub suffixes: Vec<String>,

    /// 只保留这些受试者. `None` 表示不过滤.
    pub subjects: Option<BTreeSet<String>>,

    /// 最大遍历深度. 深度为 `max_depth` 的目录中的文件仍会被考虑,
    /// 但不会继续进入其子目录. `None` 表示不限制.
    pub max_depth: Option<usize>,

    /// 只保留纵向流程输出 (见 [`is_long_path`]).
    pub long_only: bool,

    /// 身份解析器.
    pub resolver: Resolver,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            names: vec![
                names::APARC_DKT_ASEG.to_string(),
                names::APARC_DKT_ASEG_SHORT.to_string(),
            ],
            suffixes: vec![names::FLAT_SUFFIX.to_string()],
            subjects: None,
            max_depth: None,
            long_only: false,
            resolver: Resolver::default(),
        }
    }
}

impl IndexOptions {
    /// 文件名是否为分割文件.
    pub fn is_segmentation(&self, file_name: &str) -> bool {
        self.names.iter().any(|n| n == file_name)
            || self.suffixes.iter().any(|s| file_name.ends_with(s.as_str()))
    }

    /// 受试者是否通过过滤.
    #[inline]
    pub fn accepts_subject(&self, subject: &str) -> bool {
        self.subjects.as_ref().map_or(true, |s| s.contains(subject))
    }
}

/// `subject -> (session -> path)` 分割文件索引. 受试者和会话均按字典序存储.
#[derive(Clone, Debug, Default)]
pub struct SegmentationIndex {
    subjects: BTreeMap<String, BTreeMap<String, PathBuf>>,
    collisions: Vec<Collision>,
    unresolved: Vec<PathBuf>,
}

impl FromIterator<SegmentationRecord> for SegmentationIndex {
    /// 按给定顺序插入. 重复的 `(subject, session)` 记为 [`Collision`].
    fn from_iter<T: IntoIterator<Item = SegmentationRecord>>(iter: T) -> Self {
        let mut ans = Self::default();
        for r in iter {
            ans.insert(r);
        }
        ans
    }
}

impl SegmentationIndex {
    /// 遍历 `root`, 建立索引.
    ///
    /// 遍历按文件名排序, 因此结果是确定的. 身份按相对 `root` 的路径解析.
    /// 无法读取的目录项和无法解析身份的文件会被记录日志并跳过.
    pub fn build<P: AsRef<Path>>(root: P, opts: &IndexOptions) -> Result<Self, IndexError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(IndexError::RootNotFound(root.to_owned()));
        }

        let files = find_segmentations(root, opts);
        log::info!(
            "在 {} 下找到 {} 个分割文件{}",
            root.display(),
            files.len(),
            if opts.long_only { " (仅纵向)" } else { "" }
        );
        if files.is_empty() {
            return Err(IndexError::NoSegmentations(root.to_owned()));
        }

        let mut ans = Self::default();
        for path in files {
            // 运行目录必须位于 root 之内.
            let rel = path.strip_prefix(root).unwrap_or(path.as_path());
            match opts.resolver.resolve(rel) {
                Some(id) if opts.accepts_subject(&id.subject) => ans.insert(SegmentationRecord {
                    subject: id.subject,
                    session: id.session,
                    path,
                }),
                Some(_) => {}
                None => {
                    log::warn!("无法从路径解析受试者/会话, 跳过: {}", path.display());
                    ans.unresolved.push(path);
                }
            }
        }

        if ans.subjects.is_empty() {
            return Err(IndexError::NoSubjects(root.to_owned()));
        }
        log::info!(
            "共 {} 个受试者, {} 个会话",
            ans.subject_len(),
            ans.record_len()
        );
        Ok(ans)
    }

    fn insert(&mut self, r: SegmentationRecord) {
        let sessions = self.subjects.entry(r.subject.clone()).or_default();
        match sessions.get(&r.session) {
            Some(kept) => {
                log::warn!(
                    "{} / {} 重复: 保留 {}, 忽略 {}",
                    r.subject,
                    r.session,
                    kept.display(),
                    r.path.display()
                );
                self.collisions.push(Collision {
                    kept: kept.clone(),
                    dropped: r,
                });
            }
            None => {
                sessions.insert(r.session, r.path);
            }
        }
    }

    /// 受试者个数.
    #[inline]
    pub fn subject_len(&self) -> usize {
        self.subjects.len()
    }

    /// 分割文件 (会话) 总数.
    pub fn record_len(&self) -> usize {
        self.subjects.values().map(BTreeMap::len).sum()
    }

    /// 所有受试者, 按字典序.
    pub fn subjects(&self) -> impl Iterator<Item = &str> + '_ {
        self.subjects.keys().map(String::as_str)
    }

    /// 某个受试者的 `session -> path`.
    #[inline]
    pub fn sessions(&self, subject: &str) -> Option<&BTreeMap<String, PathBuf>> {
        self.subjects.get(subject)
    }

    /// 所有记录, 按受试者, 会话的字典序.
    pub fn records(&self) -> impl Iterator<Item = SegmentationRecord> + '_ {
        self.subjects.iter().flat_map(|(subject, sessions)| {
            sessions.iter().map(|(session, path)| SegmentationRecord {
                subject: subject.clone(),
                session: session.clone(),
                path: path.clone(),
            })
        })
    }

    /// 重复记录.
    #[inline]
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// 无法解析身份的文件.
    #[inline]
    pub fn unresolved(&self) -> &[PathBuf] {
        &self.unresolved
    }
}

/// 按文件名排序遍历 `root`, 收集所有分割文件.
fn find_segmentations(root: &Path, opts: &IndexOptions) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if let Some(depth) = opts.max_depth {
        // 文件比它所在的目录深一层.
        walker = walker.max_depth(depth + 1);
    }

    let mut found = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("跳过无法读取的目录项: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !opts.is_segmentation(name) {
            continue;
        }
        // 与身份解析一致, 只看 root 之内的路径.
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if opts.long_only && !is_long_path(rel) {
            continue;
        }
        found.push(entry.into_path());
    }
    found
}

#[cfg(test)]
mod tests {
    use super::{Collision, IndexError, IndexOptions, SegmentationIndex, SegmentationRecord};
    use std::fs;
    use std::path::{Path, PathBuf};

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(&p, b"").unwrap();
        p
    }

    #[test]
    fn test_build_mixed_conventions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "ses-002.long.simonBase/mri/aparc.DKTatlas+aseg.mgz");
        touch(root, "ses-001.long.simonBase/mri/aparc.DKTatlas+aseg.mgz");
        touch(root, "sub-01_ses-a.long.base/mri/aparc.DKTatlas+aseg.mgz");
        touch(root, "flat/sub-02_ses-x_aparcDKT+aseg.mgz");
        touch(root, "ses-001.long.simonBase/mri/aseg.mgz");

        let idx = SegmentationIndex::build(root, &IndexOptions::default()).unwrap();
        assert_eq!(idx.subjects().collect::<Vec<_>>(), vec!["simon", "sub-01", "sub-02"]);
        assert_eq!(idx.record_len(), 4);
        let simon = idx.sessions("simon").unwrap();
        assert_eq!(
            simon.keys().collect::<Vec<_>>(),
            vec!["ses-001.long.simonBase", "ses-002.long.simonBase"]
        );
        assert!(idx.collisions().is_empty());
        assert!(idx.unresolved().is_empty());
    }

    #[test]
    fn test_subject_filter_and_long_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "sub-01_ses-a.long.base/mri/aparc.DKTatlas+aseg.mgz");
        touch(root, "sub-01_ses-b/mri/aparc.DKTatlas+aseg.mgz");
        touch(root, "sub-02_ses-a.long.base/mri/aparc.DKTatlas+aseg.mgz");

        let opts = IndexOptions {
            subjects: Some(["sub-01".to_string()].into()),
            long_only: true,
            ..Default::default()
        };
        let idx = SegmentationIndex::build(root, &opts).unwrap();
        assert_eq!(idx.subjects().collect::<Vec<_>>(), vec!["sub-01"]);
        assert_eq!(idx.record_len(), 1);

        let opts = IndexOptions {
            subjects: Some(["sub-99".to_string()].into()),
            ..Default::default()
        };
        assert!(matches!(
            SegmentationIndex::build(root, &opts),
            Err(IndexError::NoSubjects(_))
        ));
    }

    #[test]
    fn test_long_only_ignores_root_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sub-01_ses-a.long.base");
        touch(&root, "mri/aparc.DKTatlas+aseg.mgz");
        touch(&root, "sub-01_ses-b/mri/aparc.DKTatlas+aseg.mgz");
        touch(&root, "sub-01_ses-c.long.base/mri/aparc.DKTatlas+aseg.mgz");

        let opts = IndexOptions {
            long_only: true,
            ..Default::default()
        };
        let idx = SegmentationIndex::build(&root, &opts).unwrap();
        assert_eq!(idx.record_len(), 1);
        assert!(idx.unresolved().is_empty());
        assert_eq!(
            idx.records().map(|r| r.session).collect::<Vec<_>>(),
            vec!["sub-01_ses-c.long.base"]
        );
    }

    #[test]
    fn test_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "a/sub-01_ses-1_aparcDKT+aseg.mgz");
        touch(root, "a/b/sub-01_ses-2_aparcDKT+aseg.mgz");
        touch(root, "a/b/c/sub-01_ses-3_aparcDKT+aseg.mgz");

        let count = |d: Option<usize>| {
            let opts = IndexOptions {
                max_depth: d,
                ..Default::default()
            };
            SegmentationIndex::build(root, &opts).map(|i| i.record_len())
        };
        assert!(matches!(count(Some(0)), Err(IndexError::NoSegmentations(_))));
        assert_eq!(count(Some(1)).unwrap(), 1);
        assert_eq!(count(Some(2)).unwrap(), 2);
        assert_eq!(count(None).unwrap(), 3);
    }

    #[test]
    fn test_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            SegmentationIndex::build(&missing, &IndexOptions::default()),
            Err(IndexError::RootNotFound(_))
        ));
        assert!(matches!(
            SegmentationIndex::build(dir.path(), &IndexOptions::default()),
            Err(IndexError::NoSegmentations(_))
        ));
    }

    #[test]
    fn test_unresolved_and_collision() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        // 太浅, 无法解析.
        touch(root, "aparc.DKTatlas+aseg.mgz");
        // 两种命名指向同一个会话.
        touch(root, "ses-1/mri/aparc.DKTatlas+aseg.mgz");
        touch(root, "ses-1/mri/aparcDKT+aseg.mgz");

        let idx = SegmentationIndex::build(root, &IndexOptions::default()).unwrap();
        assert_eq!(idx.unresolved().len(), 1);
        assert_eq!(idx.record_len(), 1);
        assert_eq!(idx.collisions().len(), 1);
        let c = &idx.collisions()[0];
        assert!(c.kept.ends_with("mri/aparc.DKTatlas+aseg.mgz"));
        assert!(c.dropped.path.ends_with("mri/aparcDKT+aseg.mgz"));
    }

    #[test]
    fn test_from_records_keeps_first() {
        let rec = |p: &str| SegmentationRecord {
            subject: "s".to_string(),
            session: "ses-1".to_string(),
            path: PathBuf::from(p),
        };
        let idx: SegmentationIndex = vec![rec("a"), rec("b")].into_iter().collect();
        assert_eq!(idx.sessions("s").unwrap()["ses-1"], PathBuf::from("a"));
        assert_eq!(
            idx.collisions(),
            &[Collision {
                kept: PathBuf::from("a"),
                dropped: rec("b"),
            }]
        );
        assert_eq!(idx.records().count(), 1);
    }
}
