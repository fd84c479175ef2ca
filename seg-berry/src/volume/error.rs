//! 体数据读取错误.

use std::path::PathBuf;
use thiserror::Error;

/// 打开 [`LabelVolume`](super::LabelVolume) 错误.
#[derive(Debug, Error)]
pub enum OpenVolumeError {
    /// 文件扩展名既不是 NIfTI 也不是 MGH/MGZ.
    #[error("unrecognized volume format: {}", .0.display())]
    UnknownFormat(PathBuf),

    /// 底层 I/O 错误.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `nifti` 解析错误.
    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// MGH header 版本号不是 1.
    #[error("unsupported MGH version {0}")]
    MghVersion(i32),

    /// MGH 体素类型不受支持. 参数为 header 中的类型码.
    #[error("unsupported MGH voxel type {0}")]
    MghDataType(i32),

    /// MGH header 中的形状过大 (或相乘溢出), 通常意味着文件损坏.
    #[error("MGH dimensions {0:?} exceed the supported volume size")]
    MghTooLarge([usize; 3]),

    /// 数据不是三维的 (或第四维长度大于 1 之外的其它情况).
    #[error("expected a 3D volume, got {0} dimensions")]
    Dimensionality(usize),

    /// 体素分辨率非正或非有限.
    #[error("invalid voxel spacing {0:?}")]
    InvalidSpacing([f64; 3]),

    /// 数据长度与形状不一致.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}
