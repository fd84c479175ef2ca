//! 3D 二值形态学操作.
//!
//! 提供单体素腐蚀和表面体素提取. 数组范围之外的体素一律视为背景,
//! 因此贴着数组边缘的前景体素总是表面体素.

use std::ops::Index;

use ndarray::{Array3, ArrayView, Ix3, Zip};

use crate::volume::VoxelGrid;
use crate::Idx3d;

/// 三维邻域偏移量.
type Offset = (isize, isize, isize);

/// 钻石型 (面相邻) 6-邻域.
const FACE6: [Offset; 6] = [
    (-1, 0, 0),
    (1, 0, 0),
    (0, -1, 0),
    (0, 1, 0),
    (0, 0, -1),
    (0, 0, 1),
];

/// 完全 26-邻域.
const FULL26: [Offset; 26] = full26();

const fn full26() -> [Offset; 26] {
    let mut out = [(0, 0, 0); 26];
    let mut i = 0;
    let mut dz = -1;
    while dz <= 1 {
        let mut dh = -1;
        while dh <= 1 {
            let mut dw = -1;
            while dw <= 1 {
                if !(dz == 0 && dh == 0 && dw == 0) {
                    out[i] = (dz, dh, dw);
                    i += 1;
                }
                dw += 1;
            }
            dh += 1;
        }
        dz += 1;
    }
    out
}

/// 腐蚀结构元的连通性.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Connectivity {
    /// 6-连通 (钻石型). 与 `scipy.ndimage.binary_erosion` 的默认结构元一致.
    #[default]
    Face6,

    /// 26-连通 (3x3x3 立方体).
    Full26,
}

impl Connectivity {
    /// 邻域偏移量.
    #[inline]
    fn offsets(self) -> &'static [Offset] {
        match self {
            Self::Face6 => &FACE6,
            Self::Full26 => &FULL26,
        }
    }

    /// 从邻居个数构造. 仅支持 6 和 26.
    pub fn from_neighbours(n: u32) -> Option<Self> {
        match n {
            6 => Some(Self::Face6),
            26 => Some(Self::Full26),
            _ => None,
        }
    }
}

/// 3D 二值掩码. 携带所属体的体素分辨率.
#[derive(Debug, Clone)]
pub struct BinaryMask {
    data: Array3<bool>,
    pix_dim: [f64; 3],
}

impl VoxelGrid for BinaryMask {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        self.pix_dim
    }
}

impl Index<Idx3d> for BinaryMask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl BinaryMask {
    /// 初始化.
    #[inline]
    pub fn new(data: Array3<bool>, pix_dim: [f64; 3]) -> Self {
        Self { data, pix_dim }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, bool, Ix3> {
        self.data.view()
    }

    /// 前景体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }

    /// 是否不含任何前景.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|p| *p)
    }

    /// 与 `other` 的交集体素个数. 两者形状必须相同, 否则程序 panic.
    pub fn intersection_count(&self, other: &BinaryMask) -> usize {
        assert!(self.same_shape(other), "掩码形状不一致");
        Zip::from(&self.data)
            .and(&other.data)
            .fold(0usize, |acc, a, b| acc + (*a && *b) as usize)
    }

    /// `pos` 在 `conn` 邻域内的邻居是否全部为前景.
    /// 越界邻居视为背景.
    fn is_interior(&self, (z, h, w): Idx3d, conn: Connectivity) -> bool {
        conn.offsets().iter().all(|&(dz, dh, dw)| {
            let neigh = (
                z.checked_add_signed(dz),
                h.checked_add_signed(dh),
                w.checked_add_signed(dw),
            );
            match neigh {
                (Some(nz), Some(nh), Some(nw)) => self.data.get((nz, nh, nw)).is_some_and(|p| *p),
                _ => false,
            }
        })
    }

    /// 以 `conn` 为结构元做一次形态学腐蚀.
    pub fn erode(&self, conn: Connectivity) -> BinaryMask {
        let data = Array3::from_shape_fn(self.data.dim(), |pos| {
            self.data[pos] && self.is_interior(pos, conn)
        });
        Self::new(data, self.pix_dim)
    }

    /// 表面掩码: 属于掩码但不属于其单体素腐蚀结果的体素.
    pub fn surface(&self, conn: Connectivity) -> BinaryMask {
        let data = Array3::from_shape_fn(self.data.dim(), |pos| {
            self.data[pos] && !self.is_interior(pos, conn)
        });
        Self::new(data, self.pix_dim)
    }

    /// 收集表面体素下标, 结果按行优先存储.
    pub fn surface_pos(&self, conn: Connectivity) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, p)| (*p && !self.is_interior(pos, conn)).then_some(pos))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{BinaryMask, Connectivity, FULL26};
    use ndarray::{s, Array3};

    fn cube_mask(n: usize, from: usize, to: usize) -> BinaryMask {
        let mut data = Array3::from_elem((n, n, n), false);
        data.slice_mut(s![from..to, from..to, from..to]).fill(true);
        BinaryMask::new(data, [1.0; 3])
    }

    #[test]
    fn test_full26_offsets_unique() {
        let mut v = FULL26.to_vec();
        v.sort_unstable();
        v.dedup();
        assert_eq!(v.len(), 26);
        assert!(!v.contains(&(0, 0, 0)));
    }

    /// 3x3x3 立方体腐蚀后只剩中心.
    #[test]
    fn test_erode_cube() {
        let m = cube_mask(10, 2, 5);
        for conn in [Connectivity::Face6, Connectivity::Full26] {
            let e = m.erode(conn);
            assert_eq!(e.count(), 1);
            assert!(e[(3, 3, 3)]);
            assert_eq!(m.surface(conn).count(), 26);
            assert_eq!(m.surface_pos(conn).len(), 26);
        }
    }

    /// 6-连通与 26-连通的差别: 4x4x4 立方体的棱上邻居.
    #[test]
    fn test_surface_connectivity_difference() {
        let mut m = cube_mask(8, 2, 6);
        // 在立方体外角上挖掉一个体素, 只影响 26-邻域.
        let mut data = m.data().to_owned();
        data[(2, 2, 2)] = false;
        m = BinaryMask::new(data, [1.0; 3]);

        let s6 = m.surface(Connectivity::Face6).count();
        let s26 = m.surface(Connectivity::Full26).count();
        // 内部 2x2x2 中的 (3,3,3) 只在 26-邻域下变为表面.
        assert_eq!(s26, s6 + 1);
    }

    /// 贴边体素总是表面体素.
    #[test]
    fn test_surface_at_border() {
        let data = Array3::from_elem((3, 3, 3), true);
        let m = BinaryMask::new(data, [1.0; 3]);
        assert_eq!(m.surface(Connectivity::Face6).count(), 26);
        assert_eq!(m.erode(Connectivity::Face6).count(), 1);
    }

    #[test]
    fn test_intersection_and_empty() {
        let a = cube_mask(6, 0, 2);
        let b = cube_mask(6, 1, 3);
        assert_eq!(a.intersection_count(&b), 1);
        assert!(!a.is_empty());
        assert!(BinaryMask::new(Array3::from_elem((2, 2, 2), false), [1.0; 3]).is_empty());
        assert_eq!(Connectivity::from_neighbours(26), Some(Connectivity::Full26));
        assert_eq!(Connectivity::from_neighbours(18), None);
    }
}
