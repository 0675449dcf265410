// 该文件是 Qupu （曲谱） 项目的一部分。
// src/detect/hough.rs - 概率霍夫直线段提取
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

use std::f64::consts::PI;

use image::GrayImage;
use tracing::debug;

use crate::{
  config::{EdgeParams, HoughParams},
  detect::{EdgeDetector, Extractor, LineSegment},
  frame::PixelGrid,
};

/// 行走时使用的定点小数位数
const WALK_SHIFT: u32 = 16;

/// 融合两条线段时允许的最大夹角
const FUSE_MAX_ANGLE: f64 = 2.0 * PI / 180.0;

/// 融合后沿中心线重新拟合的轮数
const REFIT_ROUNDS: usize = 2;

/// 边缘图 → 线段
#[derive(Debug, Clone, Copy)]
pub struct LineExtractor {
  edges: EdgeDetector,
  params: HoughParams,
}

impl LineExtractor {
  pub fn new(edge: EdgeParams, params: HoughParams) -> Self {
    Self {
      edges: EdgeDetector::new(edge),
      params,
    }
  }
}

impl Extractor for LineExtractor {
  type Input = PixelGrid;
  type Output = Vec<LineSegment>;

  fn extract(&self, grid: &PixelGrid) -> Vec<LineSegment> {
    let edges = self.edges.extract(grid.as_gray());
    let lines = probabilistic_hough(&edges, &self.params);
    let fused = fuse_segments(
      lines,
      &edges,
      self.params.merge_distance,
      self.params.max_line_gap as f64,
    );
    debug!("融合后线段 {} 条", fused.len());
    fused
  }
}

/// 霍夫累加器
struct Accumulator {
  trig: Vec<(f64, f64)>,
  num_rho: usize,
  rho_offset: i64,
  votes: Vec<i32>,
}

impl Accumulator {
  fn new(width: u32, height: u32, rho: f64, theta: f64) -> Self {
    let num_angle = ((PI / theta).round() as usize).max(1);
    let num_rho = ((((width + height) * 2 + 1) as f64 / rho).round() as usize).max(1);
    let inv_rho = 1.0 / rho;
    let trig = (0..num_angle)
      .map(|n| {
        let angle = n as f64 * theta;
        (angle.cos() * inv_rho, angle.sin() * inv_rho)
      })
      .collect();

    Self {
      trig,
      num_rho,
      rho_offset: (num_rho as i64 - 1) / 2,
      votes: vec![0; num_angle * num_rho],
    }
  }

  fn slot(&self, n: usize, x: i64, y: i64) -> Option<usize> {
    let (cos, sin) = self.trig[n];
    let r = (x as f64 * cos + y as f64 * sin).round_ties_even() as i64 + self.rho_offset;
    (r >= 0 && (r as usize) < self.num_rho).then(|| n * self.num_rho + r as usize)
  }

  /// 投票，返回得票最多的角度索引及其票数
  fn vote(&mut self, x: i64, y: i64) -> (usize, i32) {
    let mut best = (0, 0);
    for n in 0..self.trig.len() {
      if let Some(slot) = self.slot(n, x, y) {
        self.votes[slot] += 1;
        if self.votes[slot] > best.1 {
          best = (n, self.votes[slot]);
        }
      }
    }
    best
  }

  fn unvote(&mut self, x: i64, y: i64) {
    for n in 0..self.trig.len() {
      if let Some(slot) = self.slot(n, x, y) {
        self.votes[slot] -= 1;
      }
    }
  }
}

/// 沿某一角度的直线，以定点步进行走
struct LineWalk {
  x0: i64,
  y0: i64,
  dx0: i64,
  dy0: i64,
  x_major: bool,
}

impl LineWalk {
  fn new(x: i64, y: i64, angle: f64) -> Self {
    let a = -angle.sin();
    let b = angle.cos();
    let one = (1i64 << WALK_SHIFT) as f64;
    let half = 1i64 << (WALK_SHIFT - 1);
    if a.abs() > b.abs() {
      Self {
        x0: x,
        y0: (y << WALK_SHIFT) + half,
        dx0: if a > 0.0 { 1 } else { -1 },
        dy0: (b * one / a.abs()).round_ties_even() as i64,
        x_major: true,
      }
    } else {
      Self {
        x0: (x << WALK_SHIFT) + half,
        y0: y,
        dx0: (a * one / b.abs()).round_ties_even() as i64,
        dy0: if b > 0.0 { 1 } else { -1 },
        x_major: false,
      }
    }
  }

  /// 第 `step` 步所在像素，`forward` 为假时反向行走
  fn at(&self, forward: bool, step: i64) -> (i64, i64) {
    let sign = if forward { 1 } else { -1 };
    let x = self.x0 + sign * self.dx0 * step;
    let y = self.y0 + sign * self.dy0 * step;
    if self.x_major {
      (x, y >> WALK_SHIFT)
    } else {
      (x >> WALK_SHIFT, y)
    }
  }

  /// 垂直于主轴偏移后的像素
  fn beside(&self, (x, y): (i64, i64), offset: i64) -> (i64, i64) {
    if self.x_major {
      (x, y + offset)
    } else {
      (x + offset, y)
    }
  }
}

/// 概率霍夫变换输出的一条线段
#[derive(Debug, Clone, PartialEq)]
pub struct HoughLine {
  /// 行走两端最后命中的边缘像素
  pub segment: LineSegment,
  /// 行走时占用的全部边缘像素
  pub pixels: Vec<(i64, i64)>,
}

fn edge_points(edges: &GrayImage) -> Vec<(i64, i64)> {
  edges
    .enumerate_pixels()
    .filter(|(_, _, p)| p[0] != 0)
    .map(|(x, y, _)| (x as i64, y as i64))
    .collect()
}

/// 确定性的概率霍夫变换
///
/// 与经典实现相同：逐点投票，一旦某个累加单元达到阈值，就从该点沿对应方向
/// 双向行走收集边缘像素，长度足够则输出线段并撤回这些像素的投票。
/// 区别在于边缘点按光栅顺序而非随机顺序处理，因此结果可复现。
pub fn probabilistic_hough(edges: &GrayImage, params: &HoughParams) -> Vec<HoughLine> {
  let (width, height) = edges.dimensions();
  let (w, h) = (width as i64, height as i64);
  let mut lines = Vec::new();
  if w == 0 || h == 0 {
    return lines;
  }

  let mut accumulator = Accumulator::new(width, height, params.rho, params.theta);
  let threshold = params.threshold as i32;
  let min_length = params.min_line_length as i64;
  let max_gap = params.max_line_gap as i64;

  let corridor = params.corridor as i64;
  let offsets: Vec<i64> = std::iter::once(0)
    .chain((1..=corridor).flat_map(|d| [-d, d]))
    .collect();

  let index = |(x, y): (i64, i64)| (y * w + x) as usize;
  let inside = |(x, y): (i64, i64)| x >= 0 && y >= 0 && x < w && y < h;

  let points = edge_points(edges);
  let mut available = vec![false; (w * h) as usize];
  let mut voted = vec![false; (w * h) as usize];
  for &point in &points {
    available[index(point)] = true;
  }

  for &point in &points {
    // 已被其他线段占用
    if !available[index(point)] {
      continue;
    }

    let (best_angle, best_votes) = accumulator.vote(point.0, point.1);
    voted[index(point)] = true;
    if best_votes < threshold {
      continue;
    }

    let walk = LineWalk::new(point.0, point.1, best_angle as f64 * params.theta);
    let mut ends = [point; 2];
    let mut last_step = [0i64; 2];

    for (k, forward) in [true, false].into_iter().enumerate() {
      let mut gap = 0;
      let mut step = 0;
      loop {
        let center = walk.at(forward, step);
        if !inside(center) {
          break;
        }
        let hit = offsets
          .iter()
          .map(|&offset| walk.beside(center, offset))
          .find(|&p| inside(p) && available[index(p)]);
        match hit {
          Some(p) => {
            gap = 0;
            ends[k] = p;
            last_step[k] = step;
          }
          None => {
            gap += 1;
            if gap > max_gap {
              break;
            }
          }
        }
        step += 1;
      }
    }

    let good_line =
      (ends[1].0 - ends[0].0).abs() >= min_length || (ends[1].1 - ends[0].1).abs() >= min_length;

    let mut pixels = Vec::new();
    for (k, forward) in [true, false].into_iter().enumerate() {
      for step in 0..=last_step[k] {
        let center = walk.at(forward, step);
        for &offset in &offsets {
          let p = walk.beside(center, offset);
          if !inside(p) || !available[index(p)] {
            continue;
          }
          if good_line && voted[index(p)] {
            accumulator.unvote(p.0, p.1);
          }
          available[index(p)] = false;
          pixels.push(p);
        }
      }
    }

    if good_line {
      let segment = LineSegment::new(
        ends[0].0 as i32,
        ends[0].1 as i32,
        ends[1].0 as i32,
        ends[1].1 as i32,
      );
      debug!("线段 {:?}，得票 {}，像素 {}", segment, best_votes, pixels.len());
      lines.push(HoughLine { segment, pixels });
    }
  }

  lines
}

/// 像素坐标的一阶与二阶矩，用于最小二乘拟合直线
#[derive(Debug, Default, Clone, Copy)]
struct Moments {
  n: f64,
  sx: f64,
  sy: f64,
  sxx: f64,
  syy: f64,
  sxy: f64,
}

impl Moments {
  fn of<'a>(pixels: impl IntoIterator<Item = &'a (i64, i64)>) -> Self {
    pixels.into_iter().fold(Self::default(), |m, &(x, y)| {
      let (x, y) = (x as f64, y as f64);
      Self {
        n: m.n + 1.0,
        sx: m.sx + x,
        sy: m.sy + y,
        sxx: m.sxx + x * x,
        syy: m.syy + y * y,
        sxy: m.sxy + x * y,
      }
    })
  }

  fn add(self, other: Self) -> Self {
    Self {
      n: self.n + other.n,
      sx: self.sx + other.sx,
      sy: self.sy + other.sy,
      sxx: self.sxx + other.sxx,
      syy: self.syy + other.syy,
      sxy: self.sxy + other.sxy,
    }
  }

  /// 主轴：过质心、方向为协方差矩阵的主特征向量
  fn axis(&self) -> Axis {
    let (cx, cy) = (self.sx / self.n, self.sy / self.n);
    let vxx = self.sxx / self.n - cx * cx;
    let vyy = self.syy / self.n - cy * cy;
    let vxy = self.sxy / self.n - cx * cy;
    let angle = 0.5 * (2.0 * vxy).atan2(vxx - vyy);
    Axis {
      center: (cx, cy),
      direction: (angle.cos(), angle.sin()),
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct Axis {
  center: (f64, f64),
  direction: (f64, f64),
}

impl Axis {
  /// 沿轴方向与垂直方向的坐标
  fn project(&self, (x, y): (f64, f64)) -> (f64, f64) {
    let (px, py) = (x - self.center.0, y - self.center.1);
    let (ux, uy) = self.direction;
    (px * ux + py * uy, py * ux - px * uy)
  }

  fn angle(&self) -> f64 {
    self.direction.1.atan2(self.direction.0)
  }

  fn point(&self, t: f64) -> (i32, i32) {
    (
      (self.center.0 + self.direction.0 * t).round() as i32,
      (self.center.1 + self.direction.1 * t).round() as i32,
    )
  }
}

/// 一组被视为同一笔画的线段
#[derive(Debug, Clone)]
struct Stroke {
  moments: Moments,
  ends: Vec<(f64, f64)>,
}

impl Stroke {
  fn new(line: &HoughLine) -> Self {
    let s = line.segment;
    Self {
      moments: Moments::of(&line.pixels),
      ends: vec![(s.x1 as f64, s.y1 as f64), (s.x2 as f64, s.y2 as f64)],
    }
  }

  /// 端点在主轴上的投影范围
  fn span(&self, axis: &Axis) -> (f64, f64) {
    self
      .ends
      .iter()
      .map(|&p| axis.project(p).0)
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
        (lo.min(t), hi.max(t))
      })
  }

  fn merge(&mut self, other: Stroke) {
    self.moments = self.moments.add(other.moments);
    self.ends.extend(other.ends);
  }

  /// 两条线段夹角不超过 2°、`other` 的端点到本笔画主轴的距离不超过
  /// `max_distance`、且沿主轴的投影重叠或间隔不超过 `max_gap` 时可融合
  fn accepts(&self, other: &Stroke, max_distance: f64, max_gap: f64) -> bool {
    let axis = self.moments.axis();
    let diff = (axis.angle() - other.moments.axis().angle()).abs() % PI;
    if diff.min(PI - diff) > FUSE_MAX_ANGLE {
      return false;
    }

    let projected: Vec<(f64, f64)> = other.ends.iter().map(|&p| axis.project(p)).collect();
    if projected.iter().any(|&(_, s)| s.abs() > max_distance) {
      return false;
    }

    let (start, end) = self.span(&axis);
    let (lo, hi) = projected
      .iter()
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(t, _)| {
        (lo.min(t), hi.max(t))
      });
    (lo - end).max(start - hi).max(0.0) <= max_gap
  }

  /// 用主轴两侧 `band` 以内的全部边缘像素重新拟合
  fn refit(&mut self, points: &[(i64, i64)], band: f64) {
    for _ in 0..REFIT_ROUNDS {
      let axis = self.moments.axis();
      let (start, end) = self.span(&axis);
      let moments = Moments::of(points.iter().filter(|&&(x, y)| {
        let (t, s) = axis.project((x as f64, y as f64));
        s.abs() <= band && t >= start - 1.0 && t <= end + 1.0
      }));
      if moments.n == 0.0 {
        return;
      }
      self.moments = moments;
    }
  }

  fn segment(&self) -> LineSegment {
    let axis = self.moments.axis();
    let (start, end) = self.span(&axis);
    let (x1, y1) = axis.point(start);
    let (x2, y2) = axis.point(end);
    LineSegment::new(x1, y1, x2, y2)
  }
}

/// 合并同一笔画两侧产生的近似平行线段
///
/// 一像素宽的笔画在边缘图上是上下两条边，霍夫变换会给出两条线段。
/// 可融合的线段合并各自占用像素的矩，融合完成后再用主轴附近
/// `max_distance` 以内的全部边缘像素做最小二乘拟合，输出主轴上端点投影的范围。
/// 结果保持首次出现的顺序；`max_distance` 为 0 时原样返回各线段。
pub fn fuse_segments(
  lines: Vec<HoughLine>,
  edges: &GrayImage,
  max_distance: f64,
  max_gap: f64,
) -> Vec<LineSegment> {
  if max_distance <= 0.0 {
    return lines.into_iter().map(|line| line.segment).collect();
  }

  let mut strokes: Vec<Stroke> = lines.iter().map(Stroke::new).collect();
  'search: loop {
    for i in 0..strokes.len() {
      for j in (i + 1)..strokes.len() {
        if strokes[i].accepts(&strokes[j], max_distance, max_gap) {
          let other = strokes.remove(j);
          strokes[i].merge(other);
          continue 'search;
        }
      }
    }
    break;
  }

  let points = edge_points(edges);
  strokes
    .into_iter()
    .map(|mut stroke| {
      stroke.refit(&points, max_distance);
      let segment = stroke.segment();
      debug!("笔画 {} 条边合并为 {:?}", stroke.ends.len() / 2, segment);
      segment
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::testing::*;
  use image::Luma;

  fn edge_row(width: u32, height: u32, y: u32, xs: std::ops::RangeInclusive<u32>) -> GrayImage {
    let mut edges = GrayImage::new(width, height);
    for x in xs {
      edges.put_pixel(x, y, Luma([255]));
    }
    edges
  }

  fn edge_map(width: u32, height: u32, pixels: &[(u32, u32)]) -> GrayImage {
    let mut edges = GrayImage::new(width, height);
    for &(x, y) in pixels {
      edges.put_pixel(x, y, Luma([255]));
    }
    edges
  }

  fn fused(edges: &GrayImage, merge_distance: f64) -> Vec<LineSegment> {
    let lines = probabilistic_hough(edges, &HoughParams::default());
    fuse_segments(lines, edges, merge_distance, 10.0)
  }

  fn stroke_segments(from: (i32, i32), to: (i32, i32)) -> Vec<LineSegment> {
    let mut image = blank(640, 480);
    draw_line(&mut image, from, to);
    let extractor = LineExtractor::new(EdgeParams::default(), HoughParams::default());
    extractor.extract(&PixelGrid::from(image))
  }

  #[test]
  fn long_edge_row_becomes_one_segment() {
    let edges = edge_row(300, 100, 40, 20..=259);
    let lines = probabilistic_hough(&edges, &HoughParams::default());

    assert_eq!(lines.len(), 1);
    let s = lines[0].segment;
    assert_eq!((s.x1.min(s.x2), s.x1.max(s.x2)), (20, 259));
    assert_eq!((s.y1, s.y2), (40, 40));
    assert_eq!(lines[0].pixels.len(), 240);
  }

  #[test]
  fn short_edge_row_is_rejected() {
    let edges = edge_row(300, 100, 40, 20..=110);
    assert!(probabilistic_hough(&edges, &HoughParams::default()).is_empty());
  }

  #[test]
  fn small_gaps_are_bridged() {
    let mut edges = edge_row(300, 100, 40, 20..=259);
    for x in 120..126 {
      edges.put_pixel(x, 40, Luma([0]));
    }
    let lines = probabilistic_hough(&edges, &HoughParams::default());
    assert_eq!(lines.len(), 1);
  }

  #[test]
  fn empty_edge_map_is_not_an_error() {
    let edges = GrayImage::new(100, 100);
    assert!(probabilistic_hough(&edges, &HoughParams::default()).is_empty());
    assert!(fused(&edges, 3.0).is_empty());
  }

  #[test]
  fn transform_is_repeatable() {
    let mut image = blank(400, 200);
    draw_line(&mut image, (30, 50), (370, 56));
    draw_line(&mut image, (30, 120), (370, 120));
    let grid = PixelGrid::from(image);
    let extractor = LineExtractor::new(EdgeParams::default(), HoughParams::default());

    assert_eq!(extractor.extract(&grid), extractor.extract(&grid));
  }

  #[test]
  fn parallel_stroke_edges_are_fused_to_centerline() {
    let pixels: Vec<(u32, u32)> = (100..=400).flat_map(|x| [(x, 99), (x, 101)]).collect();
    let edges = edge_map(500, 200, &pixels);

    assert_eq!(probabilistic_hough(&edges, &HoughParams::default()).len(), 2);
    assert_eq!(fused(&edges, 3.0), vec![LineSegment::new(100, 100, 400, 100)]);
  }

  #[test]
  fn distant_or_crossing_segments_stay_apart() {
    let pixels: Vec<(u32, u32)> = (20..=220)
      .flat_map(|x| [(x, 20), (x, 32)])
      .chain((280..=420).map(|x| (x, 20)))
      .chain((40..=190).map(|y| (240, y)))
      .collect();
    let segments = fused(&edge_map(450, 200, &pixels), 3.0);

    assert_eq!(segments.len(), 4);
    assert!(segments.contains(&LineSegment::new(20, 20, 220, 20)));
    assert!(segments.contains(&LineSegment::new(20, 32, 220, 32)));
    assert!(segments.contains(&LineSegment::new(280, 20, 420, 20)));
    let vertical = segments
      .iter()
      .find(|s| s.x1 == 240 && s.x2 == 240)
      .unwrap();
    assert_eq!((vertical.y1.min(vertical.y2), vertical.y1.max(vertical.y2)), (40, 190));
  }

  #[test]
  fn zero_merge_distance_disables_fusion() {
    let pixels: Vec<(u32, u32)> = (100..=400).flat_map(|x| [(x, 99), (x, 101)]).collect();
    let edges = edge_map(500, 200, &pixels);
    let raw: Vec<LineSegment> = probabilistic_hough(&edges, &HoughParams::default())
      .into_iter()
      .map(|line| line.segment)
      .collect();

    assert_eq!(raw.len(), 2);
    assert_eq!(fused(&edges, 0.0), raw);
  }

  #[test]
  fn horizontal_stroke_yields_single_centered_segment() {
    let segments = stroke_segments((100, 100), (400, 100));
    assert_eq!(segments, vec![LineSegment::new(99, 100, 400, 100)]);
  }

  #[test]
  fn flat_stroke_stays_flat_on_its_row() {
    let segments = stroke_segments((50, 200), (300, 200));

    assert_eq!(segments.len(), 1);
    let s = segments[0];
    assert_eq!(s.dy(), 0, "{:?}", s);
    assert_eq!(s.y1, 200);
    assert_eq!((s.x1, s.x2), (49, 300));
  }

  #[test]
  fn skewed_stroke_keeps_its_rise() {
    // 两端各一像素的边缘延伸不改变斜率
    let segments = stroke_segments((50, 200), (300, 202));
    assert_eq!(segments, vec![LineSegment::new(49, 200, 300, 202)]);

    let segments = stroke_segments((50, 200), (550, 195));
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].dy().abs(), 5, "{:?}", segments[0]);

    let segments = stroke_segments((20, 100), (620, 103));
    assert_eq!(segments, vec![LineSegment::new(19, 100, 620, 103)]);
  }
}
