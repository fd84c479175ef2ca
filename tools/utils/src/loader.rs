//! 对 `seg-berry::dataset` 的更一层封装. 提供默认的数据/结果路径.

use seg_berry::consts::names;
use std::env;
use std::path::PathBuf;

/// 数据根目录的环境变量.
pub const FREESURFER_DIR: &str = "FREESURFER_DIR";

/// 结果目录的环境变量.
pub const RESULTS_DIR: &str = "RESULTS_DIR";

/// 获取 FreeSurfer 纵向处理结果的根目录.
///
/// 1. 若环境变量 `$FREESURFER_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/freesurfer`;
/// 3. 无法确定主目录时, 返回当前目录下的 `freesurfer`.
pub fn freesurfer_dir_from_env_or_home() -> PathBuf {
    match env::var(FREESURFER_DIR) {
        Ok(d) if !d.is_empty() => PathBuf::from(d),
        _ => seg_berry::dataset::home_dataset_dir_with(["freesurfer"])
            .unwrap_or_else(|| PathBuf::from("freesurfer")),
    }
}

/// 获取结果文件路径.
///
/// 1. 若环境变量 `$RESULTS_DIR` 非空, 则返回 `$RESULTS_DIR/session_metrics.csv`;
/// 2. 否则, 返回 `./data/session_metrics.csv`.
pub fn results_path_from_env() -> PathBuf {
    let mut ans = match env::var(RESULTS_DIR) {
        Ok(d) if !d.is_empty() => PathBuf::from(d),
        _ => PathBuf::from("data"),
    };
    ans.push(names::RESULTS_CSV);
    ans
}
