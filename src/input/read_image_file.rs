// 该文件是 Qupu （曲谱） 项目的一部分。
// src/input/read_image_file.rs - 单张图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::error;
use url::Url;

use super::InputItem;
use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  frame::PixelGrid,
  split::{Split, SplitRatios},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 读取并解码一张图像，格式按文件内容猜测
pub fn load_image(path: impl AsRef<Path>) -> Result<PixelGrid, ImageFileInputError> {
  let image = ImageReader::open(path.as_ref())?
    .with_guessed_format()?
    .decode()?;
  Ok(PixelGrid::from(image))
}

pub struct ImageFileInput {
  path: PathBuf,
  split: Option<Split>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配：期望 '{}'，实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    let path = PathBuf::from(decode_url_path(url));
    if !path.is_file() {
      error!("图像文件不存在: {}", path.display());
      return Err(ImageFileInputError::IoError(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} 不存在", path.display()),
      )));
    }

    Ok(ImageFileInput { path, split: None })
  }
}

impl ImageFileInput {
  /// 单张图像总是落在划分的最后一段
  pub fn with_splits(self, ratios: SplitRatios) -> Self {
    Self {
      split: Some(ratios.split_of(0, 1)),
      ..self
    }
  }

  pub fn into_items(self) -> ImageFileItems {
    ImageFileItems { inner: Some(self) }
  }
}

pub struct ImageFileItems {
  inner: Option<ImageFileInput>,
}

impl Iterator for ImageFileItems {
  type Item = InputItem;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.take().map(|input| InputItem {
      image: load_image(&input.path),
      path: input.path,
      split: input.split,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{GrayImage, Luma};

  #[test]
  fn yields_the_image_once() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("score.png");
    GrayImage::from_pixel(12, 7, Luma([200])).save(&file).unwrap();

    let url = Url::parse(&format!("image://{}", file.display())).unwrap();
    let mut items = ImageFileInput::from_url(&url).unwrap().into_items();

    let item = items.next().unwrap();
    assert_eq!(item.path, file);
    assert_eq!(item.split, None);
    let grid = item.image.unwrap();
    assert_eq!((grid.width(), grid.height()), (12, 7));
    assert!(items.next().is_none());
  }

  #[test]
  fn corrupt_file_is_reported_per_item() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("broken.png");
    std::fs::write(&file, b"not an image").unwrap();

    let url = Url::parse(&format!("image://{}", file.display())).unwrap();
    let item = ImageFileInput::from_url(&url)
      .unwrap()
      .into_items()
      .next()
      .unwrap();
    assert!(item.image.is_err());
  }

  #[test]
  fn missing_file_is_rejected_up_front() {
    let url = Url::parse("image:///definitely/not/here.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::IoError(_))
    ));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("folder:///tmp").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch)
    ));
  }
}
