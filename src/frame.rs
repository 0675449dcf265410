// 该文件是 Qupu （曲谱） 项目的一部分。
// src/frame.rs - 灰度像素网格定义
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

use image::{DynamicImage, GrayImage, RgbImage, imageops};

/// 灰度像素网格
///
/// 加载后不再修改；彩色图像在构造时转换为灰度。
#[derive(Debug, Clone)]
pub struct PixelGrid {
  image: GrayImage,
}

impl From<GrayImage> for PixelGrid {
  fn from(image: GrayImage) -> Self {
    Self { image }
  }
}

impl From<RgbImage> for PixelGrid {
  fn from(image: RgbImage) -> Self {
    DynamicImage::ImageRgb8(image).into()
  }
}

impl From<DynamicImage> for PixelGrid {
  fn from(image: DynamicImage) -> Self {
    Self {
      image: image.to_luma8(),
    }
  }
}

impl PixelGrid {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 宽或高为零的图像无法归一化
  pub fn is_degenerate(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }

  pub fn as_gray(&self) -> &GrayImage {
    &self.image
  }

  /// 反色后的灰度图，深色音符头变为亮色前景
  pub fn inverted(&self) -> GrayImage {
    let mut image = self.image.clone();
    imageops::invert(&mut image);
    image
  }
}
