// 该文件是 Qupu （曲谱） 项目的一部分。
// src/detect/blob.rs - 音符头候选（斑点）检测
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

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::{
  contours::{BorderType, find_contours},
  geometry::{arc_length, convex_hull},
  point::Point,
  region_labelling::{Connectivity, connected_components},
};
use tracing::debug;

use crate::{
  config::BlobParams,
  detect::{Blob, Extractor},
  frame::PixelGrid,
};

type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

const FOREGROUND: Luma<u8> = Luma([255]);
const BACKGROUND: Luma<u8> = Luma([0]);

/// 连通域的累计统计
#[derive(Debug, Clone, Copy)]
struct Region {
  area: u64,
  sum_x: u64,
  sum_y: u64,
  min_x: u32,
  min_y: u32,
  max_x: u32,
  max_y: u32,
}

impl Default for Region {
  fn default() -> Self {
    Self {
      area: 0,
      sum_x: 0,
      sum_y: 0,
      min_x: u32::MAX,
      min_y: u32::MAX,
      max_x: 0,
      max_y: 0,
    }
  }
}

impl Region {
  fn add(&mut self, x: u32, y: u32) {
    self.area += 1;
    self.sum_x += x as u64;
    self.sum_y += y as u64;
    self.min_x = self.min_x.min(x);
    self.min_y = self.min_y.min(y);
    self.max_x = self.max_x.max(x);
    self.max_y = self.max_y.max(y);
  }

  fn bbox_size(&self) -> (u32, u32) {
    (self.max_x - self.min_x + 1, self.max_y - self.min_y + 1)
  }
}

/// 单个连通域的形状度量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobShape {
  /// 像素个数
  pub area: f64,
  /// 外轮廓闭合周长
  pub perimeter: f64,
  /// 4π·面积/周长²
  pub circularity: f64,
  /// 面积 / 凸包内格点数
  pub convexity: f64,
  /// 质心
  pub centroid: (f64, f64),
  /// 外接框宽高的平均值，即近似直径
  pub size: f64,
}

impl BlobShape {
  pub fn to_blob(&self) -> Blob {
    Blob {
      x: self.centroid.0 as i32,
      y: self.centroid.1 as i32,
      radius: (self.size / 2.0) as i32,
    }
  }
}

/// 在反色灰度图上按面积、圆度、凸度筛选连通域
#[derive(Debug, Clone, Copy)]
pub struct BlobExtractor {
  params: BlobParams,
}

impl BlobExtractor {
  pub fn new(params: BlobParams) -> Self {
    Self { params }
  }

  /// 度量所有满足面积条件的连通域，不做形状过滤
  pub fn measure(&self, grid: &PixelGrid) -> Vec<BlobShape> {
    let threshold = self.params.foreground_threshold;
    let inverted = grid.inverted();
    let binary = GrayImage::from_fn(inverted.width(), inverted.height(), |x, y| {
      if inverted.get_pixel(x, y)[0] >= threshold {
        FOREGROUND
      } else {
        BACKGROUND
      }
    });

    let labels = connected_components(&binary, Connectivity::Eight, BACKGROUND);
    let mut regions: Vec<Region> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
      let label = label[0] as usize;
      if label == 0 {
        continue;
      }
      if regions.len() < label {
        regions.resize(label, Region::default());
      }
      regions[label - 1].add(x, y);
    }
    debug!("前景连通域 {} 个", regions.len());

    regions
      .iter()
      .enumerate()
      .filter(|(_, region)| {
        let area = region.area as f64;
        region.area > 0 && area >= self.params.min_area && area <= self.params.max_area
      })
      .map(|(index, region)| shape_of(&labels, index as u32 + 1, region))
      .collect()
  }
}

impl Extractor for BlobExtractor {
  type Input = PixelGrid;
  type Output = Vec<Blob>;

  fn extract(&self, grid: &PixelGrid) -> Vec<Blob> {
    self
      .measure(grid)
      .into_iter()
      .filter(|shape| {
        let keep = shape.circularity >= self.params.min_circularity
          && shape.convexity >= self.params.min_convexity;
        if !keep {
          debug!(
            "丢弃斑点 ({:.1}, {:.1})：圆度 {:.3}，凸度 {:.3}",
            shape.centroid.0, shape.centroid.1, shape.circularity, shape.convexity
          );
        }
        keep
      })
      .map(|shape| shape.to_blob())
      .collect()
  }
}

fn shape_of(labels: &LabelImage, label: u32, region: &Region) -> BlobShape {
  let area = region.area as f64;
  let (bw, bh) = region.bbox_size();

  // 单独裁出该连通域，四周留 1 像素背景，保证轮廓闭合
  let mask = GrayImage::from_fn(bw + 2, bh + 2, |x, y| {
    if x == 0 || y == 0 || x > bw || y > bh {
      return BACKGROUND;
    }
    let (lx, ly) = (region.min_x + x - 1, region.min_y + y - 1);
    if labels.get_pixel(lx, ly)[0] == label {
      FOREGROUND
    } else {
      BACKGROUND
    }
  });

  let outline: Vec<Point<i32>> = find_contours::<i32>(&mask)
    .into_iter()
    .find(|contour| matches!(contour.border_type, BorderType::Outer))
    .map(|contour| contour.points)
    .unwrap_or_default();

  let perimeter = arc_length(&outline, true);
  let circularity = if perimeter > f64::EPSILON {
    4.0 * std::f64::consts::PI * area / (perimeter * perimeter)
  } else {
    1.0
  };

  let hull = convex_hull(outline.as_slice());
  let lattice = hull_lattice_points(&hull);
  let convexity = if lattice > 0.0 {
    (area / lattice).min(1.0)
  } else {
    0.0
  };

  BlobShape {
    area,
    perimeter,
    circularity,
    convexity,
    centroid: (
      region.sum_x as f64 / area,
      region.sum_y as f64 / area,
    ),
    size: (bw + bh) as f64 / 2.0,
  }
}

/// 凸多边形内部及边上的格点数（Pick 定理）
fn hull_lattice_points(hull: &[Point<i32>]) -> f64 {
  if hull.is_empty() {
    return 0.0;
  }

  let mut twice_area = 0i64;
  let mut boundary = 0i64;
  for (i, p) in hull.iter().enumerate() {
    let q = hull[(i + 1) % hull.len()];
    twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    boundary += gcd((q.x - p.x).abs() as i64, (q.y - p.y).abs() as i64);
  }

  ((twice_area.abs() + boundary) / 2 + 1) as f64
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
  while b != 0 {
    (a, b) = (b, a % b);
  }
  a
}
