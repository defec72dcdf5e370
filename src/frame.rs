// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 输入张量与相机帧定义
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

use image::RgbaImage;

use crate::preprocess::PreprocessError;

pub const RGB_CHANNELS: usize = 3;
pub const RGBA_CHANNELS: usize = 4;

/// 形状为 `[1, S, S, 3]` 的 NHWC 浮点张量，数值归一化到 `[0, 1]`。
///
/// 像素 `(row, col)` 的 R、G、B 依次位于 `(row * S + col) * 3 + {0, 1, 2}`。
#[derive(Debug, Clone)]
pub struct RawTensor<const S: u32> {
  data: Box<[f32]>,
}

impl<const S: u32> RawTensor<S> {
  /// 张量元素个数，即 `S * S * 3`
  pub const LEN: usize = RGB_CHANNELS * (S as usize) * (S as usize);

  pub fn size(&self) -> usize {
    S as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, S as usize, S as usize, RGB_CHANNELS]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 全部元素的算术平均值
  pub fn mean(&self) -> f32 {
    if self.data.is_empty() {
      return 0.0;
    }
    let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
    (sum / self.data.len() as f64) as f32
  }
}

impl<const S: u32> Default for RawTensor<S> {
  fn default() -> Self {
    Self {
      data: vec![0.0f32; Self::LEN].into_boxed_slice(),
    }
  }
}

impl<const S: u32> TryFrom<Vec<f32>> for RawTensor<S> {
  type Error = PreprocessError;

  fn try_from(data: Vec<f32>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(PreprocessError::TensorLength {
        expected: Self::LEN,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const S: u32> AsMut<[f32]> for RawTensor<S> {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

/// 相机帧：任意尺寸，RGBA 顺序的原始像素缓冲
pub trait CameraFrame {
  fn width(&self) -> u32;
  fn height(&self) -> u32;
  fn rgba(&self) -> Result<&[u8], PreprocessError>;
}

#[derive(Debug, Clone)]
pub struct RgbaFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl RgbaFrame {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PreprocessError> {
    let expected = RGBA_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(PreprocessError::FrameBuffer {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 纯色帧，主要用于预热与测试
  pub fn filled(width: u32, height: u32, pixel: [u8; 4]) -> Self {
    let data = pixel
      .iter()
      .copied()
      .cycle()
      .take(RGBA_CHANNELS * width as usize * height as usize)
      .collect::<Vec<_>>();
    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }
}

impl From<RgbaImage> for RgbaFrame {
  fn from(image: RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl CameraFrame for RgbaFrame {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn rgba(&self) -> Result<&[u8], PreprocessError> {
    Ok(&self.data)
  }
}
