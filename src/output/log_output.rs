// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/log_output.rs - 日志输出
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
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Detection, ObjectDetectionResult, WasteLabel, WithLabel},
  output::Render,
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 通过 tracing 打印每个检测框
#[derive(Debug, Default, Clone)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }
    Ok(LogOutput)
  }
}

pub(crate) fn label_name(detection: &Detection) -> String {
  detection
    .label::<WasteLabel>()
    .map(|label| label.to_label_str().to_string())
    .unwrap_or_else(|| format!("class_{}", detection.class_id))
}

impl Render<[Detection]> for LogOutput {
  type Error = LogOutputError;

  fn render_result(&self, result: &[Detection]) -> Result<(), Self::Error> {
    if result.is_empty() {
      info!("未检测到目标");
      return Ok(());
    }

    for (index, detection) in result.iter().enumerate() {
      let [x1, y1, x2, y2] = detection.bbox;
      info!(
        "[{}] {} ({:.2}%): [{:.1}, {:.1}, {:.1}, {:.1}]",
        index,
        label_name(detection),
        detection.confidence * 100.0,
        x1,
        y1,
        x2,
        y2
      );
    }
    Ok(())
  }
}

impl Render<ObjectDetectionResult> for LogOutput {
  type Error = LogOutputError;

  fn render_result(&self, result: &ObjectDetectionResult) -> Result<(), Self::Error> {
    info!(
      "检测到 {} 个目标，最高置信度 {:.2}%",
      result.len(),
      result.confidence * 100.0
    );
    self.render_result(result.detections.as_slice())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_class_falls_back_to_id() {
    let detection = Detection {
      bbox: [0.0, 0.0, 1.0, 1.0],
      class_id: 42,
      confidence: 0.5,
    };
    assert_eq!(label_name(&detection), "class_42");

    let detection = Detection {
      class_id: 6,
      ..detection
    };
    assert_eq!(label_name(&detection), "battery");
  }
}
