// 该文件是 Shanan （山南西风） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

use std::collections::VecDeque;

use crate::model::Detection;

/// 计算两个边界框 `[x1, y1, x2, y2]` 的 IoU，并集为 0 时返回 0
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 贪心 NMS，不区分类别。
///
/// 按置信度降序（稳定排序，并列保持原始顺序）依次取出队首，
/// 并移除与之 IoU 严格大于 `iou_threshold` 的其余框。
/// 返回保留框的下标，顺序即保留顺序。
pub fn nms(boxes: &[[f32; 4]], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
  let mut order: Vec<usize> = (0..boxes.len().min(scores.len())).collect();
  order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

  let mut queue = VecDeque::from(order);
  let mut keep = Vec::new();
  while let Some(best) = queue.pop_front() {
    keep.push(best);
    queue.retain(|&other| iou(&boxes[best], &boxes[other]) <= iou_threshold);
  }

  keep
}

pub fn suppress(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
  let boxes: Vec<[f32; 4]> = detections.iter().map(|d| d.bbox).collect();
  let scores: Vec<f32> = detections.iter().map(|d| d.confidence).collect();
  nms(&boxes, &scores, iou_threshold)
    .into_iter()
    .map(|index| detections[index])
    .collect()
}
