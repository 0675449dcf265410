// 该文件是 Qupu （曲谱） 项目的一部分。
// src/detect/classify.rs - 谱线分类
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

use crate::{
  config::StaffLineParams,
  detect::{Extractor, LineSegment},
};

/// 只保留近似水平的线段，允许扫描件的轻微倾斜
#[derive(Debug, Clone, Copy)]
pub struct StaffLineClassifier {
  max_skew: i32,
}

impl StaffLineClassifier {
  pub fn new(params: StaffLineParams) -> Self {
    Self {
      max_skew: params.max_skew,
    }
  }

  pub fn is_staff_line(&self, segment: &LineSegment) -> bool {
    segment.dy().abs() < self.max_skew
  }
}

impl Extractor for StaffLineClassifier {
  type Input = [LineSegment];
  type Output = Vec<LineSegment>;

  fn extract(&self, segments: &[LineSegment]) -> Vec<LineSegment> {
    segments
      .iter()
      .filter(|segment| self.is_staff_line(segment))
      .copied()
      .collect()
  }
}
