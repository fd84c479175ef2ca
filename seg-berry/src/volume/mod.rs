//! 3D 分割标签体数据结构及其读取.

use std::collections::BTreeSet;
use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayView, Axis, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::{LabelCode, BACKGROUND};
use crate::morph_3d::BinaryMask;
use crate::Idx3d;

mod error;
mod mgh;

pub use error::OpenVolumeError;
pub use mgh::encode_mgh;

/// 体数据文件格式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VolumeFormat {
    /// `.nii` 或 `.nii.gz`.
    Nifti,

    /// FreeSurfer `.mgh` 或 `.mgz`.
    Mgh,
}

impl VolumeFormat {
    /// 根据文件名判断格式. 无法识别时返回 `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".mgz") || name.ends_with(".mgh") || name.ends_with(".mgh.gz") {
            Some(Self::Mgh)
        } else if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Some(Self::Nifti)
        } else {
            None
        }
    }
}

/// 体素网格的共用属性和部分通用操作.
///
/// 所有形状均按 `(z, h, w)` 组织, 分辨率也按相同顺序给出.
pub trait VoxelGrid {
    /// 获取数据形状大小.
    fn shape(&self) -> Idx3d;

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 顺序为 `[z, h, w]`.
    fn pix_dim(&self) -> [f64; 3];

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.pix_dim();
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 两者是否定义在形状相同的网格上. 分辨率不参与比较.
    #[inline]
    fn same_shape<G: VoxelGrid>(&self, other: &G) -> bool {
        self.shape() == other.shape()
    }
}

/// 3D 分割标签体, 包括标签数据和体素分辨率.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    data: Array3<LabelCode>,
    pix_dim: [f64; 3],
}

impl VoxelGrid for LabelVolume {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        self.pix_dim
    }
}

impl Index<Idx3d> for LabelVolume {
    type Output = LabelCode;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

/// 检查分辨率是否合法. NIfTI 中偶尔会出现负值, 取绝对值后再检查.
fn checked_pix_dim(pix_dim: [f64; 3]) -> Result<[f64; 3], OpenVolumeError> {
    let p = pix_dim.map(f64::abs);
    if p.iter().all(|v| v.is_finite() && *v > 0.0) {
        Ok(p)
    } else {
        Err(OpenVolumeError::InvalidSpacing(pix_dim))
    }
}

/// NIfTI header 中的分辨率 `[_, w, h, z, ..]` -> `[z, h, w]`.
#[inline]
fn pix_dim_from_header(h: &NiftiHeader) -> [f64; 3] {
    let [_, w, h, z, ..] = h.pixdim;
    [z as f64, h as f64, w as f64]
}

impl LabelVolume {
    /// 根据裸标签数据和体素分辨率直接创建 `LabelVolume`.
    ///
    /// `data` 按 `(z, h, w)` 组织, `pix_dim` 按 `[z, h, w]` 给出.
    /// 分辨率必须为正, 否则程序 panic.
    pub fn new(data: Array3<LabelCode>, pix_dim: [f64; 3]) -> Self {
        assert!(
            pix_dim.iter().all(|v| v.is_finite() && *v > 0.0),
            "体素分辨率必须为正"
        );
        Self { data, pix_dim }
    }

    /// 打开分割标签体. 根据扩展名选择 NIfTI 或 MGH/MGZ 读取器.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenVolumeError> {
        let path = path.as_ref();
        match VolumeFormat::from_path(path) {
            Some(VolumeFormat::Nifti) => Self::open_nifti(path),
            Some(VolumeFormat::Mgh) => Self::open_mgh(path),
            None => Err(OpenVolumeError::UnknownFormat(path.to_owned())),
        }
    }

    /// 打开 nii 文件格式的标签体.
    ///
    /// 标签先以 `f32` 读出再四舍五入, 因此浮点存储的标签文件也能正确读取.
    pub fn open_nifti<P: AsRef<Path>>(path: P) -> Result<Self, OpenVolumeError> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let pix_dim = checked_pix_dim(pix_dim_from_header(obj.header()))?;

        let data = obj.into_volume().into_ndarray::<f32>()?;
        let data = match data.ndim() {
            3 => data,
            // 单帧 4D 体, 取第一帧.
            4 if data.len_of(Axis(3)) == 1 => data.index_axis_move(Axis(3), 0),
            n => return Err(OpenVolumeError::Dimensionality(n)),
        };

        // [W, H, z] -> [z, H, W].
        let data = data.permuted_axes([2, 1, 0].as_slice());
        let shape = (data.shape()[0], data.shape()[1], data.shape()[2]);
        // 按逻辑顺序收集, 不依赖底层内存布局.
        let raw: Vec<LabelCode> = data.iter().map(|v| v.round() as LabelCode).collect();
        let data = Array3::from_shape_vec(shape, raw)?;

        Ok(Self { data, pix_dim })
    }

    /// 打开 mgh/mgz 文件格式的标签体. 仅读取第一帧.
    pub fn open_mgh<P: AsRef<Path>>(path: P) -> Result<Self, OpenVolumeError> {
        let mgh = mgh::open_mgh(path.as_ref())?;
        let [w, h, z] = mgh.dims;
        let [sw, sh, sz] = mgh.spacing;
        let pix_dim = checked_pix_dim([sz, sh, sw])?;

        // MGH 中 x 变化最快, 恰好是 (z, h, w) 的标准布局.
        let data = Array3::from_shape_vec((z, h, w), mgh.data)?;
        Ok(Self { data, pix_dim })
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, LabelCode, Ix3> {
        self.data.view()
    }

    /// 获取值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: LabelCode) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 获取值为 `label` 的区域的实际体积, 以立方毫米为单位.
    #[inline]
    pub fn volume_mm3(&self, label: LabelCode) -> f64 {
        self.count(label) as f64 * self.voxel()
    }

    /// 收集所有出现过的非背景标签, 升序.
    pub fn labels(&self) -> BTreeSet<LabelCode> {
        self.data
            .iter()
            .copied()
            .filter(|p| *p != BACKGROUND)
            .collect()
    }

    /// 构造 `label` 的二值掩码.
    #[inline]
    pub fn mask(&self, label: LabelCode) -> BinaryMask {
        BinaryMask::new(self.data.mapv(|p| p == label), self.pix_dim)
    }

    /// 收集值为 `label` 的所有体素下标, 结果按行优先存储.
    pub fn filter_pos(&self, label: LabelCode) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, p)| (*p == label).then_some(pos))
            .collect()
    }
}
