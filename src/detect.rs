// 该文件是 Qupu （曲谱） 项目的一部分。
// src/detect.rs - 启发式检测
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

use serde::Serialize;
use tracing::debug;

use crate::{config::DetectorConfig, frame::PixelGrid};

/// 纯函数式的检测步骤：同样的输入和参数总是得到同样的输出
pub trait Extractor {
  type Input: ?Sized;
  type Output;

  fn extract(&self, input: &Self::Input) -> Self::Output;
}

/// 像素坐标下的线段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LineSegment {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl LineSegment {
  pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn dx(&self) -> i32 {
    self.x2 - self.x1
  }

  pub fn dy(&self) -> i32 {
    self.y2 - self.y1
  }
}

/// 音符头候选：质心与近似半径（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Blob {
  pub x: i32,
  pub y: i32,
  pub radius: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
  StaffLine(LineSegment),
  Note(Blob),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectResult {
  pub staff_lines: Vec<LineSegment>,
  pub notes: Vec<Blob>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.staff_lines.len() + self.notes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 先谱线后音符的检测序列
  pub fn detections(&self) -> impl Iterator<Item = Detection> + '_ {
    self
      .staff_lines
      .iter()
      .copied()
      .map(Detection::StaffLine)
      .chain(self.notes.iter().copied().map(Detection::Note))
  }
}

mod blob;
mod classify;
mod edges;
mod hough;

pub use self::blob::{BlobExtractor, BlobShape};
pub use self::classify::StaffLineClassifier;
pub use self::edges::EdgeDetector;
pub use self::hough::{HoughLine, LineExtractor, fuse_segments, probabilistic_hough};

/// 谱线与音符头检测的组合
#[derive(Debug, Clone)]
pub struct SheetDetector {
  lines: LineExtractor,
  classifier: StaffLineClassifier,
  blobs: BlobExtractor,
}

impl SheetDetector {
  pub fn new(config: &DetectorConfig) -> Self {
    Self {
      lines: LineExtractor::new(config.edge, config.hough),
      classifier: StaffLineClassifier::new(config.staff_line),
      blobs: BlobExtractor::new(config.blob),
    }
  }
}

impl Default for SheetDetector {
  fn default() -> Self {
    Self::new(&DetectorConfig::default())
  }
}

impl Extractor for SheetDetector {
  type Input = PixelGrid;
  type Output = DetectResult;

  fn extract(&self, grid: &PixelGrid) -> DetectResult {
    let segments = self.lines.extract(grid);
    let staff_lines = self.classifier.extract(&segments);
    debug!(
      "线段 {} 条，其中谱线 {} 条",
      segments.len(),
      staff_lines.len()
    );

    let notes = self.blobs.extract(grid);
    debug!("音符头候选 {} 个", notes.len());

    DetectResult { staff_lines, notes }
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use image::{GrayImage, Luma};

  pub const WHITE: Luma<u8> = Luma([255]);
  pub const BLACK: Luma<u8> = Luma([0]);

  pub fn blank(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, WHITE)
  }

  /// 从 (x1, y1) 到 (x2, y2) 的 1 像素宽黑线，x 方向为主轴
  pub fn draw_line(image: &mut GrayImage, (x1, y1): (i32, i32), (x2, y2): (i32, i32)) {
    let span = (x2 - x1).max(1);
    for x in x1..=x2 {
      let offset = ((y2 - y1) * 2 * (x - x1) + span) / (2 * span);
      image.put_pixel(x as u32, (y1 + offset) as u32, BLACK);
    }
  }

  /// 实心黑色圆盘
  pub fn draw_disk(image: &mut GrayImage, (cx, cy): (i32, i32), radius: i32) {
    for y in (cy - radius)..=(cy + radius) {
      for x in (cx - radius)..=(cx + radius) {
        let (dx, dy) = (x - cx, y - cy);
        if dx * dx + dy * dy <= radius * radius
          && x >= 0
          && y >= 0
          && (x as u32) < image.width()
          && (y as u32) < image.height()
        {
          image.put_pixel(x as u32, y as u32, BLACK);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::testing::*;
  use super::*;

  #[test]
  fn detections_list_staff_lines_before_notes() {
    let result = DetectResult {
      staff_lines: vec![LineSegment::new(0, 0, 10, 0)],
      notes: vec![Blob {
        x: 1,
        y: 2,
        radius: 3,
      }],
    };

    let kinds: Vec<_> = result.detections().collect();
    assert_eq!(kinds.len(), 2);
    assert!(matches!(kinds[0], Detection::StaffLine(_)));
    assert!(matches!(kinds[1], Detection::Note(_)));
  }

  #[test]
  fn sheet_detector_separates_line_and_disk() {
    let mut image = blank(640, 480);
    draw_line(&mut image, (50, 200), (300, 202));
    draw_disk(&mut image, (400, 300), 8);

    let result = SheetDetector::default().extract(&PixelGrid::from(image));
    assert_eq!(result.staff_lines, vec![LineSegment::new(49, 200, 300, 202)]);
    assert_eq!(
      result.notes,
      vec![Blob {
        x: 400,
        y: 300,
        radius: 8
      }]
    );
  }

  #[test]
  fn blank_page_yields_nothing() {
    let result = SheetDetector::default().extract(&PixelGrid::from(blank(320, 240)));
    assert!(result.is_empty());
  }
}
