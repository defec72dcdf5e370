// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode.rs - 模型输出解码与置信度过滤
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

use tracing::debug;

use crate::{
  model::{
    CONFIDENCE_THRESHOLD, Detection, INPUT_SIZE, IOU_THRESHOLD, InferenceError, NUM_CLASSES,
    STILL_IMAGE_CONFIDENCE_THRESHOLD,
  },
  nms,
};

/// 每个锚点的框几何行数：cx, cy, w, h
pub const BOX_ROWS: usize = 4;

/// 单个锚点的中心形式框（归一化）与各类别原始分数
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
  pub class_scores: Vec<f32>,
}

impl Candidate {
  /// 分数最大的类别及其原始分数，并列时取编号最小者。不做 softmax。
  pub fn best_class(&self) -> Option<(u32, f32)> {
    let mut best: Option<(u32, f32)> = None;
    for (class_id, &score) in self.class_scores.iter().enumerate() {
      match best {
        Some((_, max)) if !(score > max) => {}
        _ => best = Some((class_id as u32, score)),
      }
    }
    best
  }

  /// 角点形式的像素坐标，各坐标独立裁剪到 `[0, input_size]`
  pub fn corners(&self, input_size: f32) -> [f32; 4] {
    let x1 = (self.cx - self.w / 2.0) * input_size;
    let y1 = (self.cy - self.h / 2.0) * input_size;
    let x2 = (self.cx + self.w / 2.0) * input_size;
    let y2 = (self.cy + self.h / 2.0) * input_size;
    [x1, y1, x2, y2].map(|v| v.clamp(0.0, input_size))
  }
}

/// 把扁平输出看作 `[4 + C, A]`：第 `r` 行第 `a` 个锚点位于 `r * A + a`
#[derive(Debug, Clone, Copy)]
pub struct OutputView<'a> {
  data: &'a [f32],
  num_classes: usize,
  anchors: usize,
}

impl<'a> OutputView<'a> {
  pub fn new(data: &'a [f32], num_classes: usize) -> Result<Self, InferenceError> {
    let rows = BOX_ROWS + num_classes;
    if data.len() % rows != 0 {
      return Err(InferenceError::OutputShape {
        len: data.len(),
        rows,
      });
    }

    Ok(Self {
      data,
      num_classes,
      anchors: data.len() / rows,
    })
  }

  pub fn anchors(&self) -> usize {
    self.anchors
  }

  pub fn rows(&self) -> usize {
    BOX_ROWS + self.num_classes
  }

  pub fn value(&self, row: usize, anchor: usize) -> f32 {
    self.data[row * self.anchors + anchor]
  }

  /// 转置：收集一个锚点的全部行
  pub fn candidate(&self, anchor: usize) -> Candidate {
    Candidate {
      cx: self.value(0, anchor),
      cy: self.value(1, anchor),
      w: self.value(2, anchor),
      h: self.value(3, anchor),
      class_scores: (0..self.num_classes)
        .map(|c| self.value(BOX_ROWS + c, anchor))
        .collect(),
    }
  }

  pub fn candidates(&self) -> impl Iterator<Item = Candidate> + '_ {
    (0..self.anchors).map(move |anchor| self.candidate(anchor))
  }
}

/// 丢弃置信度不大于阈值的候选（严格大于才保留），其余转换为像素坐标检测
pub fn filter_candidates<I>(candidates: I, threshold: f32, input_size: f32) -> Vec<Detection>
where
  I: IntoIterator<Item = Candidate>,
{
  candidates
    .into_iter()
    .filter_map(|candidate| {
      let (class_id, confidence) = candidate.best_class()?;
      (confidence > threshold).then(|| Detection {
        bbox: candidate.corners(input_size),
        class_id,
        confidence,
      })
    })
    .collect()
}

/// 解码、过滤与 NMS 的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostprocessConfig {
  pub num_classes: usize,
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
  pub input_size: f32,
}

impl Default for PostprocessConfig {
  fn default() -> Self {
    Self::new(INPUT_SIZE)
  }
}

impl PostprocessConfig {
  pub fn new(input_size: u32) -> Self {
    Self {
      num_classes: NUM_CLASSES,
      confidence_threshold: CONFIDENCE_THRESHOLD,
      iou_threshold: IOU_THRESHOLD,
      input_size: input_size as f32,
    }
  }

  pub fn still_image(input_size: u32) -> Self {
    Self {
      confidence_threshold: STILL_IMAGE_CONFIDENCE_THRESHOLD,
      ..Self::new(input_size)
    }
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn postprocess(&self, output: &[f32]) -> Result<Vec<Detection>, InferenceError> {
    let view = OutputView::new(output, self.num_classes)?;
    let filtered = filter_candidates(
      view.candidates(),
      self.confidence_threshold,
      self.input_size,
    );
    let kept = nms::suppress(&filtered, self.iou_threshold);
    debug!(
      "锚点 {} 个，过滤后 {} 个，NMS 后 {} 个",
      view.anchors(),
      filtered.len(),
      kept.len()
    );
    Ok(kept)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// 按 `[4 + C, A]` 行主序拼出模型输出
  fn layout(anchors: &[([f32; 4], [f32; NUM_CLASSES])]) -> Vec<f32> {
    let count = anchors.len();
    let mut data = vec![0.0; (BOX_ROWS + NUM_CLASSES) * count];
    for (a, (geometry, scores)) in anchors.iter().enumerate() {
      for (r, &v) in geometry.iter().chain(scores.iter()).enumerate() {
        data[r * count + a] = v;
      }
    }
    data
  }

  fn scores(class_id: usize, score: f32) -> [f32; NUM_CLASSES] {
    let mut scores = [0.0; NUM_CLASSES];
    scores[class_id] = score;
    scores
  }

  #[test]
  fn view_transposes_rows_into_candidates() {
    let data = layout(&[
      ([0.1, 0.2, 0.3, 0.4], scores(5, 0.9)),
      ([0.5, 0.6, 0.7, 0.8], scores(1, 0.3)),
    ]);
    let view = OutputView::new(&data, NUM_CLASSES).unwrap();
    assert_eq!(view.anchors(), 2);
    assert_eq!(view.rows(), 12);

    let second = view.candidate(1);
    assert_eq!((second.cx, second.cy, second.w, second.h), (0.5, 0.6, 0.7, 0.8));
    assert_eq!(second.best_class(), Some((1, 0.3)));
    assert_eq!(view.candidate(0).best_class(), Some((5, 0.9)));
  }

  #[test]
  fn view_rejects_ragged_output() {
    let data = vec![0.0; 25];
    assert!(matches!(
      OutputView::new(&data, NUM_CLASSES),
      Err(InferenceError::OutputShape { len: 25, rows: 12 })
    ));
    assert_eq!(OutputView::new(&[], NUM_CLASSES).unwrap().anchors(), 0);
  }

  #[test]
  fn argmax_prefers_first_of_ties_and_uses_raw_score() {
    let candidate = Candidate {
      cx: 0.5,
      cy: 0.5,
      w: 0.1,
      h: 0.1,
      class_scores: vec![-1.0, 3.5, 3.5, 0.0],
    };
    assert_eq!(candidate.best_class(), Some((1, 3.5)));
  }

  #[test]
  fn threshold_is_strict() {
    let candidate = |score: f32| Candidate {
      cx: 0.5,
      cy: 0.5,
      w: 0.2,
      h: 0.2,
      class_scores: scores(3, score).to_vec(),
    };

    assert!(filter_candidates([candidate(0.25)], 0.25, 640.0).is_empty());
    let kept = filter_candidates([candidate(0.25 + 1e-6)], 0.25, 640.0);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].class_id, 3);
  }

  #[test]
  fn corners_are_clipped_to_input() {
    let candidate = Candidate {
      cx: 0.95,
      cy: 0.05,
      w: 0.2,
      h: 0.2,
      class_scores: scores(0, 0.9).to_vec(),
    };
    let [x1, y1, x2, y2] = candidate.corners(640.0);
    assert_eq!(x2, 640.0);
    assert_eq!(y1, 0.0);
    assert!((x1 - 544.0).abs() < 1e-3);
    assert!((y2 - 96.0).abs() < 1e-3);
  }

  #[test]
  fn still_image_config_uses_higher_threshold() {
    let data = layout(&[([0.5, 0.5, 0.1, 0.1], scores(2, 0.28))]);
    assert_eq!(PostprocessConfig::new(640).postprocess(&data).unwrap().len(), 1);
    assert!(
      PostprocessConfig::still_image(640)
        .postprocess(&data)
        .unwrap()
        .is_empty()
    );
  }
}
