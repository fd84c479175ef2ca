//! 极简 CSV 读写工具. 仅支持逗号分隔, 双引号转义的单行记录.

use std::borrow::Cow;

/// 转义单个字段. 含有逗号, 双引号或换行时整体加引号.
pub(crate) fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// 拆分一行记录. 行尾的 `\r` 会被忽略, 字段两侧空白保留.
pub(crate) fn split_record(line: &str) -> Vec<String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if cur.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut cur)),
            (c, _) => cur.push(c),
        }
    }
    fields.push(cur);
    fields
}

/// 在表头中查找列. 比较时忽略两侧空白和大小写.
pub(crate) fn column_of(header: &[String], name: &str) -> Option<usize> {
    header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::{column_of, escape, split_record};

    #[test]
    fn test_escape() {
        assert_eq!(escape("Left-Hippocampus"), "Left-Hippocampus");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_split_record() {
        assert_eq!(split_record("a,b,,c\r"), vec!["a", "b", "", "c"]);
        assert_eq!(
            split_record("17,\"Left, Hippocampus\",\"x\"\"y\""),
            vec!["17", "Left, Hippocampus", "x\"y"]
        );
        assert_eq!(split_record(""), vec![""]);
    }

    #[test]
    fn test_escape_then_split() {
        let fields = ["sub-01", "a,b", "q\"q", ""];
        let line = fields.map(|f| escape(f).into_owned()).join(",");
        assert_eq!(split_record(&line), fields);
    }

    #[test]
    fn test_column_of() {
        let h = split_record("Label, label_name ,Structure");
        assert_eq!(column_of(&h, "label"), Some(0));
        assert_eq!(column_of(&h, "label_name"), Some(1));
        assert_eq!(column_of(&h, "structure"), Some(2));
        assert_eq!(column_of(&h, "region_category"), None);
    }
}
