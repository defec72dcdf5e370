// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/image_file.rs - 图像文件输入
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbaFrame,
  preprocess::{self, PreprocessError},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Image file not found: {0}")]
  NotFound(PathBuf),
}

/// 单张静态图像。解码推迟到流水线中进行。
#[derive(Debug, Clone)]
pub struct ImageFileInput {
  path: PathBuf,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = PathBuf::from(url.path());
    if !path.is_file() {
      return Err(ImageFileInputError::NotFound(path));
    }

    Ok(ImageFileInput { path })
  }
}

impl ImageFileInput {
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 解码为一帧 RGBA 相机帧
  pub fn load_frame(&self) -> Result<RgbaFrame, PreprocessError> {
    let image = preprocess::load_image(&self.path)?;
    Ok(RgbaFrame::from(image.to_rgba8()))
  }

  pub fn into_frames(self) -> ImageFileFrames {
    ImageFileFrames { inner: Some(self) }
  }
}

pub struct ImageFileFrames {
  inner: Option<ImageFileInput>,
}

impl Iterator for ImageFileFrames {
  type Item = RgbaFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let input = self.inner.take()?;
    match input.load_frame() {
      Ok(frame) => Some(frame),
      Err(e) => {
        warn!("无法解码图像 {}: {}", input.path.display(), e);
        None
      }
    }
  }
}
