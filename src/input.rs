// 该文件是 Qupu （曲谱） 项目的一部分。
// src/input.rs - 图像输入
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

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::PixelGrid,
  split::{Split, SplitRatios},
};

mod image_directory;
mod read_image_file;

pub use self::image_directory::{ImageDirectoryInput, ImageDirectoryItems};
pub use self::read_image_file::{ImageFileInput, ImageFileInputError, ImageFileItems, load_image};

/// 输入中的一张图像
///
/// 图像在迭代时才读取；读取失败不会中断迭代，由调用方决定跳过。
#[derive(Debug)]
pub struct InputItem {
  pub path: PathBuf,
  pub split: Option<Split>,
  pub image: Result<PixelGrid, ImageFileInputError>,
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("无法读取目录 {0}: {1}")]
  DirectoryError(PathBuf, std::io::Error),
  #[error("不是目录: {0}")]
  NotADirectory(PathBuf),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum InputWrapper {
  ImageFile(ImageFileInput),
  ImageDirectory(ImageDirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      ImageDirectoryInput::SCHEME => Ok(InputWrapper::ImageDirectory(
        ImageDirectoryInput::from_url(url)?,
      )),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl InputWrapper {
  /// 为每张图像分配训练/测试/验证集
  pub fn with_splits(self, ratios: SplitRatios) -> Self {
    match self {
      InputWrapper::ImageFile(input) => InputWrapper::ImageFile(input.with_splits(ratios)),
      InputWrapper::ImageDirectory(input) => {
        InputWrapper::ImageDirectory(input.with_splits(ratios))
      }
    }
  }

  /// 限制处理的图像数量，需在划分之前调用
  pub fn with_limit(self, limit: usize) -> Self {
    match self {
      InputWrapper::ImageDirectory(input) => {
        InputWrapper::ImageDirectory(input.with_limit(limit))
      }
      single => single,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      InputWrapper::ImageFile(_) => 1,
      InputWrapper::ImageDirectory(input) => input.paths().len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn into_items(self) -> InputWrapperIter {
    match self {
      InputWrapper::ImageFile(input) => InputWrapperIter::ImageFile(input.into_items()),
      InputWrapper::ImageDirectory(input) => {
        InputWrapperIter::ImageDirectory(input.into_items())
      }
    }
  }
}

pub enum InputWrapperIter {
  ImageFile(ImageFileItems),
  ImageDirectory(ImageDirectoryItems),
}

impl Iterator for InputWrapperIter {
  type Item = InputItem;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapperIter::ImageFile(items) => items.next(),
      InputWrapperIter::ImageDirectory(items) => items.next(),
    }
  }
}
