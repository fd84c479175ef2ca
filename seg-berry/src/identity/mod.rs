//! 从分割文件路径恢复 `(subject, session)`.
//!
//! 不同批次的数据使用了不同的目录/文件命名约定. 解析器按优先级依次尝试
//! 一组命名约定 ([`Convention`]), 第一个匹配的约定给出结果.
//!
//! 运行目录 (run directory) 指文件上两级的目录, 即 `<run_dir>/mri/<file>`.

use std::path::{Component, Path};

use crate::consts::names;

/// 一个分割文件的身份.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionIdentity {
    /// 受试者.
    pub subject: String,

    /// 会话. 在同一受试者内唯一.
    pub session: String,
}

impl SessionIdentity {
    /// 初始化.
    pub fn new<S: Into<String>, T: Into<String>>(subject: S, session: T) -> Self {
        Self {
            subject: subject.into(),
            session: session.into(),
        }
    }
}

/// 命名约定.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Convention {
    /// 扁平文件名 `{subject}_{session}_aparcDKT+aseg.mgz`,
    /// 其中 subject 以 `sub-` 开头, session 以 `ses-` 开头.
    FlatFilename,

    /// 运行目录以 `sub-` 开头, 例如 `sub-01_ses-siteATV.long.sub01_base_all_sites`.
    /// subject 取第一个 `_` 之前的部分, session 为整个目录名.
    SubjectRunDir,

    /// 运行目录以 `ses-` 开头, 例如 `ses-017.long.simonBase_all_2025`.
    /// 所有会话归入同一个合成受试者, session 为整个目录名.
    PooledSessionRunDir,

    /// 兜底: subject 为去掉 `.long.*` 后缀的目录名, session 为整个目录名.
    LongRunDir,
}

impl Convention {
    /// 默认优先级.
    pub const ALL: [Convention; 4] = [
        Self::FlatFilename,
        Self::SubjectRunDir,
        Self::PooledSessionRunDir,
        Self::LongRunDir,
    ];
}

/// 文件路径身份解析器.
#[derive(Clone, Debug)]
pub struct Resolver {
    conventions: Vec<Convention>,
    pooled_subject: String,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            conventions: Convention::ALL.to_vec(),
            pooled_subject: names::POOLED_SUBJECT.to_string(),
        }
    }
}

impl Resolver {
    /// 使用给定的约定优先级初始化. 合成受试者名使用默认值.
    pub fn with_conventions(conventions: Vec<Convention>) -> Self {
        Self {
            conventions,
            ..Self::default()
        }
    }

    /// 修改 [`Convention::PooledSessionRunDir`] 所用的合成受试者名.
    pub fn pooled_subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.pooled_subject = subject.into();
        self
    }

    /// 依次尝试各个约定. 全部不匹配 (例如路径太浅) 时返回 `None`.
    pub fn resolve(&self, path: &Path) -> Option<SessionIdentity> {
        self.conventions.iter().find_map(|c| self.try_convention(*c, path))
    }

    /// 返回匹配的约定及其结果.
    pub fn resolve_with(&self, path: &Path) -> Option<(Convention, SessionIdentity)> {
        self.conventions
            .iter()
            .find_map(|c| self.try_convention(*c, path).map(|id| (*c, id)))
    }

    fn try_convention(&self, c: Convention, path: &Path) -> Option<SessionIdentity> {
        match c {
            Convention::FlatFilename => {
                let name = path.file_name()?.to_str()?;
                parse_flat_filename(name)
            }
            Convention::SubjectRunDir => {
                let run = run_dir(path)?;
                if !run.starts_with(names::SUBJECT_PREFIX) {
                    return None;
                }
                let subject = run.split('_').next().unwrap_or(run);
                Some(SessionIdentity::new(subject, run))
            }
            Convention::PooledSessionRunDir => {
                let run = run_dir(path)?;
                run.starts_with(names::SESSION_PREFIX)
                    .then(|| SessionIdentity::new(self.pooled_subject.as_str(), run))
            }
            Convention::LongRunDir => {
                let run = run_dir(path)?;
                let subject = run.split(names::LONG_MARKER).next().unwrap_or(run);
                Some(SessionIdentity::new(subject, run))
            }
        }
    }
}

/// 从末尾开始的第 `n` 个普通路径分量 (`0` 为文件名本身).
fn nth_from_end(path: &Path, n: usize) -> Option<&str> {
    path.components()
        .rev()
        .filter(|c| matches!(c, Component::Normal(_)))
        .nth(n)?
        .as_os_str()
        .to_str()
}

/// 运行目录名, 即文件上两级的目录.
#[inline]
fn run_dir(path: &Path) -> Option<&str> {
    nth_from_end(path, 2)
}

/// 解析 `sub-XX_ses-YY_aparcDKT+aseg.mgz`. 两个 token 都不能再包含 `_`.
fn parse_flat_filename(name: &str) -> Option<SessionIdentity> {
    let stem = name.strip_suffix(names::FLAT_SUFFIX)?;
    let (subject, session) = stem.split_once('_')?;
    let valid = |tok: &str, prefix: &str| tok.len() > prefix.len() && tok.starts_with(prefix);
    if session.contains('_')
        || !valid(subject, names::SUBJECT_PREFIX)
        || !valid(session, names::SESSION_PREFIX)
    {
        return None;
    }
    Some(SessionIdentity::new(subject, session))
}

/// 路径是否属于纵向流程输出: 至少三个分量, 且倒数第三个分量包含 `.long.`.
pub fn is_long_path(path: &Path) -> bool {
    run_dir(path).is_some_and(|run| run.contains(names::LONG_MARKER))
}

#[cfg(test)]
mod tests {
    use super::{is_long_path, Convention, Resolver, SessionIdentity};
    use std::path::Path;

    fn id(subject: &str, session: &str) -> Option<SessionIdentity> {
        Some(SessionIdentity::new(subject, session))
    }

    #[test]
    fn test_flat_filename() {
        let r = Resolver::default();
        let p = Path::new("/data/fastsurfer/sub-01_ses-siteATV_aparcDKT+aseg.mgz");
        assert_eq!(r.resolve(p), id("sub-01", "ses-siteATV"));
        assert_eq!(r.resolve_with(p).map(|(c, _)| c), Some(Convention::FlatFilename));

        // 扁平文件名优先于目录约定.
        let p = Path::new("/x/sub-09_ses-a.long.b/mri/sub-01_ses-002_aparcDKT+aseg.mgz");
        assert_eq!(r.resolve(p), id("sub-01", "ses-002"));
    }

    #[test]
    fn test_flat_filename_rejects_malformed() {
        let r = Resolver::with_conventions(vec![Convention::FlatFilename]);
        for name in [
            "sub-01_aparcDKT+aseg.mgz",
            "subj-01_ses-1_aparcDKT+aseg.mgz",
            "sub-01_ses-1_x_aparcDKT+aseg.mgz",
            "sub-_ses-1_aparcDKT+aseg.mgz",
            "sub-01_ses-1_aseg.mgz",
        ] {
            assert_eq!(r.resolve(Path::new(name)), None, "{name}");
        }
    }

    #[test]
    fn test_subject_run_dir() {
        let r = Resolver::default();
        let p = Path::new(
            "/fs/sub-01_ses-siteATV.long.sub01_base_all_sites/mri/aparc.DKTatlas+aseg.mgz",
        );
        assert_eq!(
            r.resolve(p),
            id("sub-01", "sub-01_ses-siteATV.long.sub01_base_all_sites")
        );
    }

    #[test]
    fn test_pooled_session_run_dir() {
        let p = Path::new("/fs/ses-017.long.simonBase_all_2025/mri/aparc.DKTatlas+aseg.mgz");
        assert_eq!(
            Resolver::default().resolve(p),
            id("simon", "ses-017.long.simonBase_all_2025")
        );
        assert_eq!(
            Resolver::default().pooled_subject("cohort").resolve(p),
            id("cohort", "ses-017.long.simonBase_all_2025")
        );
    }

    #[test]
    fn test_long_run_dir_fallback() {
        let r = Resolver::default();
        let p = Path::new("/fs/bert_tp1.long.bert_base/mri/aparc.DKTatlas+aseg.mgz");
        assert_eq!(r.resolve(p), id("bert_tp1", "bert_tp1.long.bert_base"));

        let p = Path::new("/fs/bert/mri/aparc.DKTatlas+aseg.mgz");
        assert_eq!(r.resolve(p), id("bert", "bert"));
    }

    #[test]
    fn test_too_shallow() {
        let r = Resolver::default();
        assert_eq!(r.resolve(Path::new("aparc.DKTatlas+aseg.mgz")), None);
        assert_eq!(r.resolve(Path::new("mri/aparc.DKTatlas+aseg.mgz")), None);
    }

    #[test]
    fn test_is_long_path() {
        assert!(is_long_path(Path::new(
            "/fs/ses-001.long.base/mri/aparc.DKTatlas+aseg.mgz"
        )));
        assert!(!is_long_path(Path::new("/fs/ses-001/mri/aparc.DKTatlas+aseg.mgz")));
        assert!(!is_long_path(Path::new("mri/aparc.DKTatlas+aseg.mgz")));
        // 仅检查倒数第三个分量.
        assert!(!is_long_path(Path::new("/a.long.b/ses-1/mri/seg.mgz")));
    }
}
