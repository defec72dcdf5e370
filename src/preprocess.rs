// 该文件是 Shanan （山南西风） 项目的一部分。
// src/preprocess.rs - 图像/相机帧预处理
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

use std::path::Path;

use image::{
  DynamicImage, ImageReader,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::debug;

use crate::frame::{CameraFrame, RGB_CHANNELS, RGBA_CHANNELS, RawTensor};

/// 均值低于该值视为全黑帧
pub const DEGENERATE_MEAN_LOW: f32 = 0.01;
/// 均值高于该值视为全白帧
pub const DEGENERATE_MEAN_HIGH: f32 = 0.99;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("帧尺寸无效: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("帧缓冲长度不匹配: 期望 {expected}, 实际 {actual}")]
  FrameBuffer { expected: usize, actual: usize },
  #[error("张量长度不匹配: 期望 {expected}, 实际 {actual}")]
  TensorLength { expected: usize, actual: usize },
  #[error("预处理任务异常终止: {0}")]
  TaskAborted(String),
}

/// 打开并解码图像文件，格式由文件内容推断
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage, PreprocessError> {
  let path = path.as_ref();
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  debug!(
    "图像解码完成: {} ({}x{})",
    path.display(),
    image.width(),
    image.height()
  );
  Ok(image)
}

/// 静态图像预处理：直接拉伸缩放到 `S x S`（不保持宽高比，不做填充），除以 255 归一化
pub fn image_to_tensor<const S: u32>(image: &DynamicImage) -> Result<RawTensor<S>, PreprocessError> {
  if image.width() == 0 || image.height() == 0 {
    return Err(PreprocessError::EmptyFrame {
      width: image.width(),
      height: image.height(),
    });
  }

  // alpha 通道在缩放前丢弃
  let rgb = image.to_rgb8();
  let resized = imageops::resize(&rgb, S, S, FilterType::Triangle);

  let mut tensor = RawTensor::<S>::default();
  let slice = tensor.as_mut();
  for (index, pixel) in resized.pixels().enumerate() {
    let base = index * RGB_CHANNELS;
    for c in 0..RGB_CHANNELS {
      slice[base + c] = pixel[c] as f32 / 255.0;
    }
  }

  Ok(tensor)
}

/// 相机帧预处理：最近邻下采样到 `S x S`，
/// 目标像素 `(x, y)` 取源像素 `(floor(x * Wf / S), floor(y * Hf / S))`
pub fn frame_to_tensor<const S: u32, F: CameraFrame + ?Sized>(
  frame: &F,
) -> Result<RawTensor<S>, PreprocessError> {
  let (width, height) = (frame.width(), frame.height());
  if width == 0 || height == 0 {
    return Err(PreprocessError::EmptyFrame { width, height });
  }

  let pixels = frame.rgba()?;
  let expected = RGBA_CHANNELS * width as usize * height as usize;
  if pixels.len() < expected {
    return Err(PreprocessError::FrameBuffer {
      expected,
      actual: pixels.len(),
    });
  }

  let (src_w, src_h, size) = (width as u64, height as u64, S as u64);
  let mut tensor = RawTensor::<S>::default();
  let slice = tensor.as_mut();
  for y in 0..size {
    let src_y = y * src_h / size;
    for x in 0..size {
      let src_x = x * src_w / size;
      let src = ((src_y * src_w + src_x) as usize) * RGBA_CHANNELS;
      let dst = ((y * size + x) as usize) * RGB_CHANNELS;
      for c in 0..RGB_CHANNELS {
        slice[dst + c] = pixels[src + c] as f32 / 255.0;
      }
    }
  }

  Ok(tensor)
}

/// 近乎纯黑/纯白的输入（相机未对焦、镜头被遮挡等）不值得推理
pub fn is_degenerate<const S: u32>(tensor: &RawTensor<S>) -> bool {
  let mean = tensor.mean();
  mean < DEGENERATE_MEAN_LOW || mean > DEGENERATE_MEAN_HIGH
}
