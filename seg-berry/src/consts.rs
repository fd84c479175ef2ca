//! 通用常量.

/// 标签编码类型. DKT 皮层标签可达 2035, 因此不能用 `u8`.
pub type LabelCode = i32;

/// 背景标签.
pub const BACKGROUND: LabelCode = 0;

/// 分割文件名相关常量.
pub mod names {
    /// FreeSurfer 纵向流程输出的分割文件名.
    pub const APARC_DKT_ASEG: &str = "aparc.DKTatlas+aseg.mgz";

    /// FastSurfer 风格的分割文件名.
    pub const APARC_DKT_ASEG_SHORT: &str = "aparcDKT+aseg.mgz";

    /// 扁平命名 (`{subject}_{session}_aparcDKT+aseg.mgz`) 的文件名后缀.
    pub const FLAT_SUFFIX: &str = "_aparcDKT+aseg.mgz";

    /// 受试者目录/文件名前缀.
    pub const SUBJECT_PREFIX: &str = "sub-";

    /// 会话目录/文件名前缀.
    pub const SESSION_PREFIX: &str = "ses-";

    /// 纵向 base template 关联标记. 例如 `ses-017.long.simonBase_all_2025`.
    pub const LONG_MARKER: &str = ".long.";

    /// 仅包含 `ses-*` 运行目录的单受试者纵向队列所使用的合成受试者名.
    pub const POOLED_SUBJECT: &str = "simon";

    /// 默认输出文件名.
    pub const RESULTS_CSV: &str = "session_metrics.csv";
}

/// 度量默认参数.
pub mod defaults {
    /// 表面 Dice 的默认容差, 以毫米为单位.
    pub const SURFACE_TOLERANCE_MM: f64 = 1.0;

    /// 稳健 Hausdorff 距离的默认百分位.
    pub const HAUSDORFF_PERCENTILE: f64 = 95.0;

    /// 结果写入的默认分块大小 (行数).
    pub const CHUNK_SIZE: usize = 5;
}

/// 默认标签白名单: DKT 皮层 18 个区域 (左/右).
pub const CORTICAL_LABELS: [LabelCode; 18] = [
    1002, 1006, 1007, 1008, 1012, 1014, 1028, 1030, 1035, //
    2002, 2006, 2007, 2008, 2012, 2014, 2028, 2030, 2035,
];

/// 默认标签白名单: 皮层下 16 个区域.
///
/// 丘脑, 尾状核, 壳核, 苍白球, 海马, 杏仁核, 伏隔核, 腹侧间脑 (左/右).
pub const SUBCORTICAL_LABELS: [LabelCode; 16] = [
    10, 49, 11, 50, 12, 51, 13, 52, 17, 53, 18, 54, 26, 58, 28, 60,
];

/// 皮层 + 皮层下, 共 34 个区域. 顺序为先皮层后皮层下.
pub fn cortical_and_subcortical() -> Vec<LabelCode> {
    CORTICAL_LABELS
        .iter()
        .chain(SUBCORTICAL_LABELS.iter())
        .copied()
        .collect()
}
