#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 比较同一受试者在多个扫描时间点 (会话) 上的脑结构分割结果,
//! 逐标签量化体积和形状的差异.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 不做任何配准或重采样. 参与比较的两个标签体必须定义在同一个体素网格上,
//!   形状不一致的会话对会被跳过.
//! 2. 在非期望情况下 (例如直接用不同形状的掩码求交集), 程序会直接 panic,
//!   而不会导致内存错误. As what Rust promises.
//!
//! # 功能
//!
//! ### 标签体读取 ✅
//!
//! 支持 NIfTI (`.nii`, `.nii.gz`) 和 FreeSurfer MGH (`.mgh`, `.mgz`).
//! 统一转换为 `(z, h, w)` 布局, 分辨率顺序为 `[z, h, w]`.
//!
//! 实现位于 `seg-berry/src/volume`.
//!
//! ### 会话身份解析 ✅
//!
//! 不同批次的数据目录命名约定不同. 按优先级依次尝试扁平文件名, `sub-*` 运行目录,
//! `ses-*` 运行目录和 `.long.` 运行目录四种约定.
//!
//! 实现位于 `seg-berry/src/identity`.
//!
//! ### 分割文件索引与会话对加载 ✅
//!
//! 确定性遍历目录树, 按受试者和会话分组. 迭代器风格的会话对加载器会复用上一对的标签体.
//!
//! 实现位于 `seg-berry/src/dataset`.
//!
//! ### 会话配对 ✅
//!
//! 全配对或仅相邻配对. 会话按 `ses-` 后的数字排序, 无法解析的排在最后.
//!
//! 实现位于 `seg-berry/src/pairing`.
//!
//! ### 三维形态学操作 ✅
//!
//! 6-邻域或 26-邻域单体素腐蚀, 表面体素提取.
//!
//! 实现位于 `seg-berry/src/morph_3d`.
//!
//! ### 逐标签度量 ✅
//!
//! 体积差, Dice, 表面 Dice (默认容差 1mm), 稳健 Hausdorff 距离 (默认 95 百分位).
//!
//! 实现位于 `seg-berry/src/metrics`.
//!
//! ### 增量结果写入与续写 ✅
//!
//! 分块落盘, 表头只写一次. 可以跳过已有结果续写.
//!
//! 实现位于 `seg-berry/src/writer`.
//!
//! ### 批处理 ✅
//!
//! 实现位于 `seg-berry/src/longitudinal`.

/// 三维索引, 同时也可一定程度上用作非负整数向量. 顺序为 `(z, h, w)`.
pub type Idx3d = (usize, usize, usize);

pub mod consts;

/// 3D 分割标签体数据结构.
pub mod volume;

pub mod morph_3d;

pub mod metrics;

pub mod identity;

pub mod pairing;

pub mod dataset;

pub mod labels;

mod table;

pub mod writer;

pub mod longitudinal;

pub mod prelude;

pub use labels::{LabelMetadata, LabelTable};
pub use metrics::{LabelMetrics, LabelSelection, MetricSpec};
pub use volume::{LabelVolume, VoxelGrid};
