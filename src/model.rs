// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use thiserror::Error;

use crate::frame::RawTensor;

/// 模型输入边长
pub const INPUT_SIZE: u32 = 640;
/// 垃圾类别数量
pub const NUM_CLASSES: usize = 8;
/// 通用解码的置信度阈值
pub const CONFIDENCE_THRESHOLD: f32 = 0.25;
/// 静态图像流水线顶层调用使用的置信度阈值
pub const STILL_IMAGE_CONFIDENCE_THRESHOLD: f32 = 0.30;
/// NMS IoU 阈值
pub const IOU_THRESHOLD: f32 = 0.5;

/// 默认输入尺寸的张量
pub type InputTensor = RawTensor<{ INPUT_SIZE }>;

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型加载错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("模型加载任务异常终止: {0}")]
  TaskAborted(String),
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("模型尚未加载")]
  NotReady,
  #[error("推理运行错误: {0}")]
  Runtime(String),
  #[error("模型输出长度 {len} 不能按 {rows} 行重排")]
  OutputShape { len: usize, rows: usize },
  #[error("推理任务异常终止: {0}")]
  TaskAborted(String),
}

/// 已加载的检测模型：输入 `[1, S, S, 3]` 张量，输出 `[1, 4 + C, A]` 的扁平序列
pub trait Model<const S: u32>: Send + Sync + 'static {
  fn infer(&self, input: &RawTensor<S>) -> Result<Vec<f32>, InferenceError>;
}

/// 模型构建器，只在首次预热时调用一次
pub trait ModelLoader<const S: u32>: Send + Sync + 'static {
  type Model: Model<S>;

  fn load(&self) -> Result<Self::Model, ModelLoadError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，输入方图的像素坐标
  pub class_id: u32,
  pub confidence: f32,
}

impl Detection {
  pub fn label<T: WithLabel>(&self) -> Option<T> {
    T::from_label_id(self.class_id)
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectDetectionResult {
  pub detections: Vec<Detection>,
  /// 所有检测中的最大置信度，无检测时为 0
  pub confidence: f32,
}

impl ObjectDetectionResult {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn from_detections(detections: Vec<Detection>) -> Self {
    let confidence = detections
      .iter()
      .map(|d| d.confidence)
      .fold(0.0f32, f32::max);
    Self {
      detections,
      confidence,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }

  pub fn len(&self) -> usize {
    self.detections.len()
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> &'static str;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Option<Self>;
}

/// 模型训练时使用的 8 个垃圾类别，顺序即类别编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WasteLabel {
  PaperCardboard,
  Glass,
  Recyclables,
  BioWaste,
  TextileReuse,
  Electronics,
  Battery,
  ResidualWaste,
}

impl WasteLabel {
  pub const ALL: [WasteLabel; NUM_CLASSES] = [
    WasteLabel::PaperCardboard,
    WasteLabel::Glass,
    WasteLabel::Recyclables,
    WasteLabel::BioWaste,
    WasteLabel::TextileReuse,
    WasteLabel::Electronics,
    WasteLabel::Battery,
    WasteLabel::ResidualWaste,
  ];
}

impl WithLabel for WasteLabel {
  fn to_label_str(&self) -> &'static str {
    match self {
      WasteLabel::PaperCardboard => "paper_cardboard",
      WasteLabel::Glass => "glass",
      WasteLabel::Recyclables => "recyclables",
      WasteLabel::BioWaste => "bio_waste",
      WasteLabel::TextileReuse => "textile_reuse",
      WasteLabel::Electronics => "electronics",
      WasteLabel::Battery => "battery",
      WasteLabel::ResidualWaste => "residual_waste",
    }
  }

  fn to_label_id(&self) -> u32 {
    *self as u32
  }

  fn from_label_id(id: u32) -> Option<Self> {
    Self::ALL.get(id as usize).copied()
  }
}

mod onnx;
pub mod runtime;
pub use self::onnx::{ONNX_SCHEME, TractModel, TractModelBuilder};
pub use self::runtime::ModelRuntime;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn result_confidence_is_max_or_zero() {
    assert_eq!(ObjectDetectionResult::from_detections(Vec::new()).confidence, 0.0);

    let result = ObjectDetectionResult::from_detections(vec![
      Detection {
        bbox: [0.0, 0.0, 1.0, 1.0],
        class_id: 1,
        confidence: 0.4,
      },
      Detection {
        bbox: [2.0, 2.0, 3.0, 3.0],
        class_id: 4,
        confidence: 0.7,
      },
    ]);
    assert_eq!(result.len(), 2);
    assert_eq!(result.confidence, 0.7);
  }

  #[test]
  fn labels_follow_class_order() {
    for (id, label) in WasteLabel::ALL.iter().enumerate() {
      assert_eq!(label.to_label_id(), id as u32);
      assert_eq!(WasteLabel::from_label_id(id as u32), Some(*label));
    }
    assert_eq!(WasteLabel::from_label_id(2).map(|l| l.to_label_str()), Some("recyclables"));
    assert_eq!(WasteLabel::from_label_id(8), None);
  }
}
