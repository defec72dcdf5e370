// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/image_folder.rs - 图像目录帧序列输入
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
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbaFrame, preprocess};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum ImageFolderInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把目录中的图像按文件名顺序当作连续相机帧
#[derive(Debug, Clone)]
pub struct ImageFolderInput {
  paths: Vec<PathBuf>,
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageFolderInput {
  type Error = ImageFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFolderInputError::SchemeMismatch);
    }

    Self::from_dir(url.path())
  }
}

fn is_image_file(path: &Path) -> bool {
  path.is_file()
    && path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
      .unwrap_or(false)
}

impl ImageFolderInput {
  pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, ImageFolderInputError> {
    let dir = dir.as_ref();
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
      let path = entry?.path();
      if is_image_file(&path) {
        paths.push(path);
      }
    }
    paths.sort();
    info!("目录 {} 中共有 {} 帧", dir.display(), paths.len());

    Ok(Self { paths })
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  pub fn into_frames(self) -> ImageFolderFrames {
    ImageFolderFrames {
      paths: self.paths.into_iter(),
    }
  }
}

pub struct ImageFolderFrames {
  paths: std::vec::IntoIter<PathBuf>,
}

impl Iterator for ImageFolderFrames {
  type Item = RgbaFrame;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.paths.by_ref() {
      match preprocess::load_image(&path) {
        Ok(image) => {
          debug!("读取帧: {}", path.display());
          return Some(RgbaFrame::from(image.to_rgba8()));
        }
        Err(e) => warn!("跳过无法解码的帧 {}: {}", path.display(), e),
      }
    }
    None
  }
}
