//! 会话排序与配对.

use std::cmp::Ordering;

use itertools::Itertools;

use crate::consts::names::SESSION_PREFIX;

/// 配对策略.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PairPolicy {
    /// 任意两个不同会话, `n * (n - 1) / 2` 对.
    #[default]
    AllPairs,

    /// 仅相邻会话, `n - 1` 对.
    Consecutive,
}

/// 会话排序键.
///
/// 会话名中含有 `ses-` 且紧跟十进制数字时按该数字排序,
/// 并排在其余会话之前; 其余会话按字符串排序.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum SessionKey<'a> {
    /// `(数字, 完整会话名)`. 后者仅用于打破平局.
    Numbered(u64, &'a str),

    /// 无法解析出数字的会话.
    Named(&'a str),
}

impl<'a> SessionKey<'a> {
    /// 计算排序键.
    pub fn of(session: &'a str) -> Self {
        match session_number(session) {
            Some(n) => Self::Numbered(n, session),
            None => Self::Named(session),
        }
    }
}

/// 第一个紧跟数字的 `ses-` 之后的数字. 数字溢出视为无法解析.
fn session_number(session: &str) -> Option<u64> {
    session.match_indices(SESSION_PREFIX).find_map(|(at, _)| {
        let rest = &session[at + SESSION_PREFIX.len()..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        match end {
            0 => None,
            _ => Some(rest[..end].parse::<u64>().ok()),
        }
    })?
}

/// 比较两个会话名.
#[inline]
pub fn compare_sessions(a: &str, b: &str) -> Ordering {
    SessionKey::of(a).cmp(&SessionKey::of(b))
}

/// 按会话排序键就地排序.
pub fn sort_sessions<S: AsRef<str>>(sessions: &mut [S]) {
    sessions.sort_by(|a, b| compare_sessions(a.as_ref(), b.as_ref()));
}

/// 按 `policy` 生成会话对. 结果中每对的第一个会话总是排序在前.
///
/// 配对结果只取决于策略和会话集合, 与输入顺序无关.
pub fn select_pairs<S: AsRef<str> + Clone>(sessions: &[S], policy: PairPolicy) -> Vec<(S, S)> {
    let mut sorted = sessions.to_vec();
    sort_sessions(&mut sorted);
    match policy {
        PairPolicy::AllPairs => sorted.into_iter().tuple_combinations().collect(),
        PairPolicy::Consecutive => sorted.into_iter().tuple_windows().collect(),
    }
}
