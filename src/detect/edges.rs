// 该文件是 Qupu （曲谱） 项目的一部分。
// src/detect/edges.rs - 边缘检测
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

use image::{GrayImage, Luma};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use tracing::debug;

use crate::{config::EdgeParams, detect::Extractor};

/// tan(22.5°) 的 Q15 定点值
const TAN_22_5_Q15: i64 = 13573;

const EDGE: Luma<u8> = Luma([255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
  None,
  Weak,
  Strong,
}

/// 非极大值抑制时比较的梯度方向
enum Sector {
  /// 梯度沿 x 方向，与左右邻居比较
  Horizontal,
  /// 梯度沿 y 方向，与上下邻居比较
  Vertical,
  /// 对角方向，`step` 为 ±1
  Diagonal(i64),
}

impl Sector {
  fn of(gx: i64, gy: i64) -> Self {
    let xs = gx.abs();
    let ys = gy.abs() << 15;
    let tg22x = xs * TAN_22_5_Q15;
    if ys < tg22x {
      return Sector::Horizontal;
    }
    let tg67x = tg22x + (xs << 16);
    if ys > tg67x {
      Sector::Vertical
    } else {
      Sector::Diagonal(if (gx ^ gy) < 0 { -1 } else { 1 })
    }
  }
}

/// 基于梯度的边缘检测
///
/// 3x3 Sobel 梯度、L1 幅值、四方向非极大值抑制，再以高低阈值做滞后连接。
/// 输出为二值图，边缘像素为 255。
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
  params: EdgeParams,
}

impl EdgeDetector {
  pub fn new(params: EdgeParams) -> Self {
    Self { params }
  }
}

impl Extractor for EdgeDetector {
  type Input = GrayImage;
  type Output = GrayImage;

  fn extract(&self, image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut edges = GrayImage::new(width, height);
    if width == 0 || height == 0 {
      return edges;
    }

    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);

    let (w, h) = (width as i64, height as i64);
    let magnitude: Vec<i64> = gx
      .pixels()
      .zip(gy.pixels())
      .map(|(x, y)| (x[0] as i64).abs() + (y[0] as i64).abs())
      .collect();
    let mag = |x: i64, y: i64| -> i64 {
      if x < 0 || y < 0 || x >= w || y >= h {
        0
      } else {
        magnitude[(y * w + x) as usize]
      }
    };

    let low = self.params.low_threshold as f64;
    let high = self.params.high_threshold as f64;

    let mut candidates = vec![Candidate::None; magnitude.len()];
    let mut stack = Vec::new();

    for y in 0..h {
      for x in 0..w {
        let index = (y * w + x) as usize;
        let m = magnitude[index];
        if (m as f64) <= low {
          continue;
        }

        let dx = gx.get_pixel(x as u32, y as u32)[0] as i64;
        let dy = gy.get_pixel(x as u32, y as u32)[0] as i64;
        let is_peak = match Sector::of(dx, dy) {
          Sector::Horizontal => m > mag(x - 1, y) && m >= mag(x + 1, y),
          Sector::Vertical => m > mag(x, y - 1) && m >= mag(x, y + 1),
          Sector::Diagonal(s) => m > mag(x - s, y - 1) && m > mag(x + s, y + 1),
        };
        if !is_peak {
          continue;
        }

        if (m as f64) > high {
          candidates[index] = Candidate::Strong;
          stack.push((x, y));
        } else {
          candidates[index] = Candidate::Weak;
        }
      }
    }

    // 滞后连接：与强边缘 8 邻接的弱边缘升级为强边缘
    while let Some((x, y)) = stack.pop() {
      for ny in (y - 1)..=(y + 1) {
        for nx in (x - 1)..=(x + 1) {
          if nx < 0 || ny < 0 || nx >= w || ny >= h {
            continue;
          }
          let index = (ny * w + nx) as usize;
          if candidates[index] == Candidate::Weak {
            candidates[index] = Candidate::Strong;
            stack.push((nx, ny));
          }
        }
      }
    }

    let mut count = 0usize;
    for (index, candidate) in candidates.iter().enumerate() {
      if *candidate == Candidate::Strong {
        let (x, y) = (index as i64 % w, index as i64 / w);
        edges.put_pixel(x as u32, y as u32, EDGE);
        count += 1;
      }
    }
    debug!("边缘像素 {} 个 ({}x{})", count, width, height);

    edges
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EdgeParams;
  use crate::detect::testing::*;

  fn detector() -> EdgeDetector {
    EdgeDetector::new(EdgeParams::default())
  }

  fn edge_rows(edges: &GrayImage, x: u32) -> Vec<u32> {
    (0..edges.height())
      .filter(|&y| edges.get_pixel(x, y)[0] != 0)
      .collect()
  }

  #[test]
  fn blank_image_has_no_edges() {
    let edges = detector().extract(&blank(64, 48));
    assert!(edges.pixels().all(|p| p[0] == 0));
  }

  #[test]
  fn thin_stroke_has_an_edge_on_each_side() {
    let mut image = blank(200, 60);
    draw_line(&mut image, (20, 30), (180, 30));
    let edges = detector().extract(&image);

    assert_eq!(edge_rows(&edges, 100), vec![29, 31]);
  }

  #[test]
  fn step_edge_is_thinned_to_one_pixel() {
    let mut image = blank(40, 40);
    for y in 20..40 {
      for x in 0..40 {
        image.put_pixel(x, y, BLACK);
      }
    }
    let edges = detector().extract(&image);

    assert_eq!(edge_rows(&edges, 20).len(), 1);
  }

  #[test]
  fn weak_contrast_below_low_threshold_is_ignored() {
    let mut image = blank(40, 40);
    for y in 20..40 {
      for x in 0..40 {
        image.put_pixel(x, y, Luma([245]));
      }
    }
    let edges = detector().extract(&image);
    assert!(edges.pixels().all(|p| p[0] == 0));
  }

  #[test]
  fn empty_image_is_not_an_error() {
    let edges = detector().extract(&GrayImage::new(0, 0));
    assert_eq!(edges.dimensions(), (0, 0));
  }
}
