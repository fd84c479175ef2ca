//! FreeSurfer MGH (以及 gzip 压缩的 MGZ) 格式读取.
//!
//! 格式要点 (全部为大端序):
//!
//! | 偏移 | 类型 | 含义 |
//! |---|---|---|
//! | 0 | i32 | 版本号, 固定为 1 |
//! | 4 | i32 x 4 | width, height, depth, frames |
//! | 20 | i32 | 体素类型 |
//! | 24 | i32 | dof (忽略) |
//! | 28 | i16 | goodRASflag |
//! | 30 | f32 x 3 | 体素分辨率 (仅当 goodRASflag > 0 时有效) |
//! | 284 | - | 数据区, x 变化最快 |

use super::OpenVolumeError;
use crate::consts::LabelCode;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// 数据区起始偏移.
const HEADER_LEN: usize = 284;

/// 单帧体素数上限. 超过该值的 header 视为损坏.
const MAX_VOXELS: usize = 1 << 30;

/// gzip 魔数.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// MGH 体素类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum MghType {
    UChar,
    Int,
    Float,
    Short,
}

impl MghType {
    fn from_code(code: i32) -> Result<Self, OpenVolumeError> {
        match code {
            0 => Ok(Self::UChar),
            1 => Ok(Self::Int),
            3 => Ok(Self::Float),
            4 => Ok(Self::Short),
            _ => Err(OpenVolumeError::MghDataType(code)),
        }
    }

    /// 单个体素的字节数.
    #[inline]
    const fn width(self) -> usize {
        match self {
            Self::UChar => 1,
            Self::Short => 2,
            Self::Int | Self::Float => 4,
        }
    }

    /// 将一个大端序体素解码为标签值. 浮点标签四舍五入.
    #[inline]
    fn decode(self, b: &[u8]) -> LabelCode {
        match self {
            Self::UChar => b[0] as LabelCode,
            Self::Short => i16::from_be_bytes([b[0], b[1]]) as LabelCode,
            Self::Int => i32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            Self::Float => f32::from_be_bytes([b[0], b[1], b[2], b[3]]).round() as LabelCode,
        }
    }
}

/// 解码后的 MGH 体 (仅第一帧).
#[derive(Debug)]
pub(super) struct MghVolume {
    /// `[width, height, depth]`.
    pub dims: [usize; 3],

    /// `[x, y, z]` 方向体素分辨率, 毫米.
    pub spacing: [f64; 3],

    /// x 变化最快的标签数据.
    pub data: Vec<LabelCode>,
}

/// 打开 MGH 或 MGZ 文件. 是否解压由文件头的 gzip 魔数决定, 与扩展名无关.
pub(super) fn open_mgh(path: &Path) -> Result<MghVolume, OpenVolumeError> {
    let mut reader = BufReader::new(File::open(path)?);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        read_mgh(MultiGzDecoder::new(reader))
    } else {
        read_mgh(reader)
    }
}

#[inline]
fn be_i32(b: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

#[inline]
fn be_f32(b: &[u8], at: usize) -> f32 {
    f32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// 从未压缩的 MGH 字节流中读取第一帧.
pub(super) fn read_mgh<R: Read>(mut r: R) -> Result<MghVolume, OpenVolumeError> {
    let mut header = [0u8; HEADER_LEN];
    r.read_exact(&mut header)?;

    let version = be_i32(&header, 0);
    if version != 1 {
        return Err(OpenVolumeError::MghVersion(version));
    }
    let [w, h, d, frames] = [4, 8, 12, 16].map(|at| be_i32(&header, at));
    if w <= 0 || h <= 0 || d <= 0 || frames <= 0 {
        return Err(OpenVolumeError::Dimensionality(0));
    }
    let ty = MghType::from_code(be_i32(&header, 20))?;

    let good_ras = i16::from_be_bytes([header[28], header[29]]);
    let spacing = if good_ras > 0 {
        [30, 34, 38].map(|at| be_f32(&header, at) as f64)
    } else {
        [1.0; 3]
    };

    let dims = [w as usize, h as usize, d as usize];
    let len = dims
        .iter()
        .try_fold(1usize, |acc, &x| acc.checked_mul(x))
        .filter(|&n| n <= MAX_VOXELS)
        .and_then(|n| n.checked_mul(ty.width()))
        .ok_or(OpenVolumeError::MghTooLarge(dims))?;

    // 只读第一帧, 其余帧不关心. 不按 header 预分配, 截断的文件尽早失败.
    let mut raw = Vec::new();
    r.take(len as u64).read_to_end(&mut raw)?;
    if raw.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("MGH data holds {} of {len} bytes", raw.len()),
        )
        .into());
    }
    let data = raw.chunks_exact(ty.width()).map(|b| ty.decode(b)).collect();

    Ok(MghVolume {
        dims,
        spacing,
        data,
    })
}

/// 将 x 变化最快的标签数据编码为未压缩 MGH 字节流 (类型为 int).
///
/// 主要用于测试和构造实验数据.
pub fn encode_mgh(dims: [usize; 3], spacing: [f32; 3], data: &[LabelCode]) -> Vec<u8> {
    assert_eq!(dims.iter().product::<usize>(), data.len());
    let mut out = vec![0u8; HEADER_LEN];
    let mut put = |at: usize, b: [u8; 4]| out[at..at + 4].copy_from_slice(&b);
    put(0, 1i32.to_be_bytes());
    put(4, (dims[0] as i32).to_be_bytes());
    put(8, (dims[1] as i32).to_be_bytes());
    put(12, (dims[2] as i32).to_be_bytes());
    put(16, 1i32.to_be_bytes());
    put(20, 1i32.to_be_bytes());
    put(30, spacing[0].to_be_bytes());
    put(34, spacing[1].to_be_bytes());
    put(38, spacing[2].to_be_bytes());
    out[28..30].copy_from_slice(&1i16.to_be_bytes());

    out.reserve(data.len() * 4);
    for v in data {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{encode_mgh, read_mgh, HEADER_LEN};
    use crate::volume::OpenVolumeError;

    #[test]
    fn test_read_mgh_int() {
        let data: Vec<i32> = (0..24).collect();
        let bytes = encode_mgh([4, 3, 2], [1.0, 1.5, 2.0], &data);
        let v = read_mgh(bytes.as_slice()).unwrap();
        assert_eq!(v.dims, [4, 3, 2]);
        assert_eq!(v.spacing, [1.0, 1.5, 2.0]);
        assert_eq!(v.data, data);
    }

    #[test]
    fn test_read_mgh_uchar_without_ras() {
        let mut bytes = encode_mgh([2, 1, 1], [3.0, 3.0, 3.0], &[0, 0]);
        bytes.truncate(HEADER_LEN);
        // type = uchar, goodRASflag = 0
        bytes[20..24].copy_from_slice(&0i32.to_be_bytes());
        bytes[28..30].copy_from_slice(&0i16.to_be_bytes());
        bytes.extend_from_slice(&[17, 53]);

        let v = read_mgh(bytes.as_slice()).unwrap();
        assert_eq!(v.spacing, [1.0; 3]);
        assert_eq!(v.data, vec![17, 53]);
    }

    #[test]
    fn test_read_mgh_bad_version() {
        let mut bytes = encode_mgh([1, 1, 1], [1.0; 3], &[0]);
        bytes[0..4].copy_from_slice(&2i32.to_be_bytes());
        assert!(matches!(
            read_mgh(bytes.as_slice()),
            Err(OpenVolumeError::MghVersion(2))
        ));
    }

    #[test]
    fn test_read_mgh_truncated() {
        let bytes = encode_mgh([2, 2, 2], [1.0; 3], &[1; 8]);
        let r = read_mgh(&bytes[..bytes.len() - 1]);
        assert!(matches!(r, Err(OpenVolumeError::Io(_))));
    }

    #[test]
    fn test_read_mgh_oversized_header() {
        let mut bytes = encode_mgh([1, 1, 1], [1.0; 3], &[0]);
        for at in [4, 8, 12] {
            bytes[at..at + 4].copy_from_slice(&(1i32 << 30).to_be_bytes());
        }
        assert!(matches!(
            read_mgh(bytes.as_slice()),
            Err(OpenVolumeError::MghTooLarge(_))
        ));

        // 形状合法但数据缺失: 不按 header 预分配, 直接报错.
        let mut bytes = encode_mgh([1, 1, 1], [1.0; 3], &[0]);
        bytes.truncate(HEADER_LEN);
        bytes[4..8].copy_from_slice(&(1i32 << 20).to_be_bytes());
        bytes[8..12].copy_from_slice(&512i32.to_be_bytes());
        assert!(matches!(read_mgh(bytes.as_slice()), Err(OpenVolumeError::Io(_))));
    }
}
