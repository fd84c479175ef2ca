//! 逐标签差异度量.
//!
//! 给定两个定义在同一体素网格上的标签体, 对每个标签计算:
//!
//! 1. 两侧体积 (立方毫米) 及其差值 `volume2 - volume1`;
//! 2. Dice 系数. 两侧都不含该标签时为 NaN;
//! 3. 给定容差下的表面 Dice;
//! 4. 稳健 Hausdorff 距离 (默认 95 百分位).
//!
//! 任一侧表面为空时, 表面 Dice 记为 `0.0`, Hausdorff 距离记为 NaN.

use std::collections::BTreeSet;
use std::fmt;

use crate::consts::{defaults, LabelCode};
use crate::morph_3d::{BinaryMask, Connectivity};
use crate::volume::{LabelVolume, VoxelGrid};
use crate::Idx3d;

mod distance;

pub use distance::{PointCloud, SurfaceDistances};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 度量参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MetricSpec {
    tolerance_mm: f64,
    percentile: f64,
    connectivity: Connectivity,
}

impl Default for MetricSpec {
    fn default() -> Self {
        Self {
            tolerance_mm: defaults::SURFACE_TOLERANCE_MM,
            percentile: defaults::HAUSDORFF_PERCENTILE,
            connectivity: Connectivity::Face6,
        }
    }
}

impl MetricSpec {
    /// 构建度量参数.
    ///
    /// `tolerance_mm` 必须为非负有限值, `percentile` 必须在 `(0, 100]` 内,
    /// 否则返回 `None`.
    pub fn new(tolerance_mm: f64, percentile: f64, connectivity: Connectivity) -> Option<Self> {
        let tolerance_ok = tolerance_mm.is_finite() && tolerance_mm >= 0.0;
        if tolerance_ok && percentile > 0.0 && percentile <= 100.0 {
            Some(Self {
                tolerance_mm,
                percentile,
                connectivity,
            })
        } else {
            None
        }
    }

    /// 表面 Dice 容差, 毫米.
    #[inline]
    pub fn tolerance_mm(&self) -> f64 {
        self.tolerance_mm
    }

    /// Hausdorff 百分位.
    #[inline]
    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    /// 表面提取所用的连通性.
    #[inline]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }
}

/// 需要计算的标签集合.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelSelection {
    /// 调用方给定的标签列表. 输出仅包含这些标签, 顺序一致.
    Explicit(Vec<LabelCode>),

    /// 两个体中出现过的全部非背景标签的并集, 升序.
    Present,
}

impl LabelSelection {
    /// 针对一对标签体解析出实际要计算的标签.
    pub fn resolve(&self, v1: &LabelVolume, v2: &LabelVolume) -> Vec<LabelCode> {
        match self {
            Self::Explicit(labels) => labels.clone(),
            Self::Present => {
                let mut all: BTreeSet<LabelCode> = v1.labels();
                all.extend(v2.labels());
                all.into_iter().collect()
            }
        }
    }
}

/// 单个标签的度量结果.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelMetrics {
    /// 标签编码.
    pub label: LabelCode,

    /// 第一个体中该标签的体积, 立方毫米.
    pub volume1: f64,

    /// 第二个体中该标签的体积, 立方毫米.
    pub volume2: f64,

    /// `volume2 - volume1`.
    pub volume_diff: f64,

    /// Dice 系数. 两侧均为空时为 NaN.
    pub dice: f64,

    /// 表面 Dice. 任一侧表面为空时为 `0.0`.
    pub surface_dice: f64,

    /// 稳健 Hausdorff 距离, 毫米. 任一侧表面为空时为 NaN.
    pub hd95: f64,
}

/// 两个标签体形状不一致. 这不是错误, 调用方应跳过该对.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ShapeMismatch {
    /// 第一个体的形状.
    pub left: Idx3d,

    /// 第二个体的形状.
    pub right: Idx3d,
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape mismatch: {:?} vs {:?}", self.left, self.right)
    }
}

/// Dice 系数 `2|A∩B| / (|A|+|B|)`. 两者都为空时返回 NaN.
pub fn dice(m1: &BinaryMask, m2: &BinaryMask) -> f64 {
    let total = m1.count() + m2.count();
    if total == 0 {
        return f64::NAN;
    }
    2.0 * m1.intersection_count(m2) as f64 / total as f64
}

/// 计算单个标签的全部度量. 体素体积取自 `v1`.
///
/// 两个体形状必须一致, 否则程序 panic. 需要容错时请使用 [`compare_volumes`].
pub fn compare_label(
    v1: &LabelVolume,
    v2: &LabelVolume,
    label: LabelCode,
    spec: &MetricSpec,
) -> LabelMetrics {
    assert!(v1.same_shape(v2), "标签体形状不一致");

    let (m1, m2) = (v1.mask(label), v2.mask(label));
    let voxel = v1.voxel();
    let volume1 = m1.count() as f64 * voxel;
    let volume2 = m2.count() as f64 * voxel;

    let (surface_dice, hd95) = match SurfaceDistances::of_masks(&m1, &m2, spec.connectivity) {
        Some(sd) => (
            sd.surface_dice(spec.tolerance_mm),
            sd.robust_hausdorff(spec.percentile),
        ),
        None => (0.0, f64::NAN),
    };

    LabelMetrics {
        label,
        volume1,
        volume2,
        volume_diff: volume2 - volume1,
        dice: dice(&m1, &m2),
        surface_dice,
        hd95,
    }
}

/// 对 `labels` 中每个标签计算度量, 保持顺序.
#[cfg(feature = "rayon")]
fn compare_labels(
    v1: &LabelVolume,
    v2: &LabelVolume,
    labels: &[LabelCode],
    spec: &MetricSpec,
) -> Vec<LabelMetrics> {
    labels
        .par_iter()
        .map(|&label| compare_label(v1, v2, label, spec))
        .collect()
}

/// 对 `labels` 中每个标签计算度量, 保持顺序.
#[cfg(not(feature = "rayon"))]
fn compare_labels(
    v1: &LabelVolume,
    v2: &LabelVolume,
    labels: &[LabelCode],
    spec: &MetricSpec,
) -> Vec<LabelMetrics> {
    labels
        .iter()
        .map(|&label| compare_label(v1, v2, label, spec))
        .collect()
}

/// 比较两个标签体, 按 `selection` 逐标签计算度量.
///
/// 形状不一致时返回 `Err(ShapeMismatch)`, 不做任何计算.
pub fn compare_volumes(
    v1: &LabelVolume,
    v2: &LabelVolume,
    selection: &LabelSelection,
    spec: &MetricSpec,
) -> Result<Vec<LabelMetrics>, ShapeMismatch> {
    if !v1.same_shape(v2) {
        return Err(ShapeMismatch {
            left: v1.shape(),
            right: v2.shape(),
        });
    }
    let labels = selection.resolve(v1, v2);
    Ok(compare_labels(v1, v2, &labels, spec))
}
