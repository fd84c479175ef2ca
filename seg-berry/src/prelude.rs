//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::volume::{LabelVolume, VolumeFormat, VoxelGrid};

pub use crate::morph_3d::{BinaryMask, Connectivity};

pub use crate::consts::{cortical_and_subcortical, LabelCode, BACKGROUND};

pub use crate::identity::{is_long_path, Convention, Resolver, SessionIdentity};

pub use crate::dataset::{self, home_dataset_dir_with, IndexOptions, SegmentationIndex};

pub use crate::pairing::{select_pairs, sort_sessions, PairPolicy};

pub use crate::metrics::{compare_volumes, LabelMetrics, LabelSelection, MetricSpec};

pub use crate::labels::{LabelMetadata, LabelTable};

pub use crate::writer::{MetricRow, ResultWriter, ResumeMode};

pub use crate::longitudinal::{RunOptions, RunSummary, Runner};
