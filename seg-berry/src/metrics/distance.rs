//! 表面点云与表面距离.

use itertools::izip;
use ordered_float::OrderedFloat;

use crate::morph_3d::{BinaryMask, Connectivity};
use crate::volume::VoxelGrid;
use crate::Idx3d;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 按体素分辨率缩放到毫米坐标的点云.
///
/// 按分量分开存储 (SoA), 这样 [`Self::min_sq_distance`]
/// 的内循环是三条连续 `f64` 流, 编译器可以自动向量化.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    z: Vec<f64>,
    h: Vec<f64>,
    w: Vec<f64>,
}

impl PointCloud {
    /// 从体素下标构造. `pix_dim` 按 `[z, h, w]` 给出.
    pub fn from_positions(positions: &[Idx3d], pix_dim: [f64; 3]) -> Self {
        let [sz, sh, sw] = pix_dim;
        let mut out = Self {
            z: Vec::with_capacity(positions.len()),
            h: Vec::with_capacity(positions.len()),
            w: Vec::with_capacity(positions.len()),
        };
        for &(z, h, w) in positions {
            out.z.push(z as f64 * sz);
            out.h.push(h as f64 * sh);
            out.w.push(w as f64 * sw);
        }
        out
    }

    /// 提取掩码的表面体素并转换为点云.
    #[inline]
    pub fn surface_of(mask: &BinaryMask, conn: Connectivity) -> Self {
        Self::from_positions(&mask.surface_pos(conn), mask.pix_dim())
    }

    /// 点的个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.z.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// 第 `i` 个点.
    #[inline]
    fn point(&self, i: usize) -> (f64, f64, f64) {
        (self.z[i], self.h[i], self.w[i])
    }

    /// 点 `p` 到点云的最小平方距离. 点云为空时返回正无穷.
    #[inline]
    fn min_sq_distance(&self, (pz, ph, pw): (f64, f64, f64)) -> f64 {
        izip!(&self.z, &self.h, &self.w).fold(f64::INFINITY, |acc, (z, h, w)| {
            let (dz, dh, dw) = (z - pz, h - ph, w - pw);
            acc.min(dz * dz + dh * dh + dw * dw)
        })
    }

    /// `self` 中每个点到 `other` 的最小欧几里得距离, 顺序与 `self` 一致.
    #[cfg(feature = "rayon")]
    pub fn directed_distances(&self, other: &PointCloud) -> Vec<f64> {
        (0..self.len())
            .into_par_iter()
            .map(|i| other.min_sq_distance(self.point(i)).sqrt())
            .collect()
    }

    /// `self` 中每个点到 `other` 的最小欧几里得距离, 顺序与 `self` 一致.
    #[cfg(not(feature = "rayon"))]
    pub fn directed_distances(&self, other: &PointCloud) -> Vec<f64> {
        (0..self.len())
            .map(|i| other.min_sq_distance(self.point(i)).sqrt())
            .collect()
    }
}

/// 两个表面之间的双向距离.
///
/// 每个表面体素视为单位面积, 不建模亚体素的面元几何.
#[derive(Debug, Clone)]
pub struct SurfaceDistances {
    /// 第一个表面的每个体素到第二个表面的最近距离.
    forward: Vec<f64>,

    /// 第二个表面的每个体素到第一个表面的最近距离.
    backward: Vec<f64>,
}

impl SurfaceDistances {
    /// 计算两个点云之间的双向距离. 任一点云为空时返回 `None`.
    pub fn between(a: &PointCloud, b: &PointCloud) -> Option<Self> {
        if a.is_empty() || b.is_empty() {
            return None;
        }
        Some(Self {
            forward: a.directed_distances(b),
            backward: b.directed_distances(a),
        })
    }

    /// 计算两个掩码表面之间的双向距离. 任一表面为空时返回 `None`.
    #[inline]
    pub fn of_masks(m1: &BinaryMask, m2: &BinaryMask, conn: Connectivity) -> Option<Self> {
        Self::between(
            &PointCloud::surface_of(m1, conn),
            &PointCloud::surface_of(m2, conn),
        )
    }

    /// 正向距离.
    #[inline]
    pub fn forward(&self) -> &[f64] {
        &self.forward
    }

    /// 反向距离.
    #[inline]
    pub fn backward(&self) -> &[f64] {
        &self.backward
    }

    /// 容差 `tolerance_mm` 下的表面 Dice.
    ///
    /// `(正向 <= t 的个数 + 反向 <= t 的个数) / (正向总数 + 反向总数)`.
    pub fn surface_dice(&self, tolerance_mm: f64) -> f64 {
        let within = |d: &[f64]| d.iter().filter(|v| **v <= tolerance_mm).count();
        let overlap = within(&self.forward) + within(&self.backward);
        overlap as f64 / (self.forward.len() + self.backward.len()) as f64
    }

    /// 稳健 Hausdorff 距离: 两个方向各自取 `percentile` 百分位, 再取较大者.
    ///
    /// `percentile` 应在 `(0, 100]` 内, 取 100 时即为普通 Hausdorff 距离.
    /// 超出范围的值被截断到 `[0, 100]`, NaN 按 100 处理.
    pub fn robust_hausdorff(&self, percentile: f64) -> f64 {
        let percentile = if percentile.is_nan() {
            100.0
        } else {
            percentile.clamp(0.0, 100.0)
        };
        percentile_of(&self.forward, percentile).max(percentile_of(&self.backward, percentile))
    }
}

/// 单位面积下的百分位距离: 排序后, 累计面积占比首次达到 `percentile / 100`
/// 的那个距离. `d` 不能为空.
fn percentile_of(d: &[f64], percentile: f64) -> f64 {
    debug_assert!(!d.is_empty());
    let mut sorted = d.to_vec();
    sorted.sort_unstable_by_key(|v| OrderedFloat(*v));

    let n = sorted.len();
    let q = percentile / 100.0;
    let idx = (0..n)
        .position(|i| (i + 1) as f64 / n as f64 >= q)
        .unwrap_or(n - 1);
    sorted[idx]
}
