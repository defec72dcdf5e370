// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 图像/帧输入
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

use crate::{FromUrl, FromUrlWithScheme, frame::RgbaFrame};

mod image_file;
mod image_folder;

pub use self::image_file::{ImageFileFrames, ImageFileInput, ImageFileInputError};
pub use self::image_folder::{ImageFolderFrames, ImageFolderInput, ImageFolderInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("Image folder input error: {0}")]
  ImageFolderInputError(#[from] ImageFolderInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

/// 帧来源：单张图像或图像目录
pub enum InputWrapper {
  ImageFile(ImageFileInput),
  ImageFolder(ImageFolderInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      ImageFolderInput::SCHEME => Ok(InputWrapper::ImageFolder(ImageFolderInput::from_url(url)?)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl InputWrapper {
  pub fn into_frames(self) -> InputWrapperFrames {
    match self {
      InputWrapper::ImageFile(input) => InputWrapperFrames::ImageFile(input.into_frames()),
      InputWrapper::ImageFolder(input) => InputWrapperFrames::ImageFolder(input.into_frames()),
    }
  }
}

pub enum InputWrapperFrames {
  ImageFile(ImageFileFrames),
  ImageFolder(ImageFolderFrames),
}

impl Iterator for InputWrapperFrames {
  type Item = RgbaFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapperFrames::ImageFile(input) => input.next(),
      InputWrapperFrames::ImageFolder(input) => input.next(),
    }
  }
}
