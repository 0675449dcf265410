// 该文件是 Qupu （曲谱） 项目的一部分。
// src/split.rs - 训练/测试/验证集划分
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

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
  Train,
  Test,
  Valid,
}

impl Split {
  pub fn as_str(&self) -> &'static str {
    match self {
      Split::Train => "train",
      Split::Test => "test",
      Split::Valid => "valid",
    }
  }
}

impl fmt::Display for Split {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 划分比例，三者之和应为 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
  pub train: f64,
  pub test: f64,
  pub valid: f64,
}

impl Default for SplitRatios {
  fn default() -> Self {
    Self {
      train: 0.7,
      test: 0.2,
      valid: 0.1,
    }
  }
}

impl SplitRatios {
  /// 返回 (训练集结束位置, 测试集结束位置)，其余为验证集
  ///
  /// 边界向下取整，验证集吸收取整余量。
  pub fn boundaries(&self, total: usize) -> (usize, usize) {
    let train_end = ((total as f64 * self.train) + 1e-9).floor() as usize;
    let test_end = ((total as f64 * (self.train + self.test)) + 1e-9).floor() as usize;
    (train_end.min(total), test_end.clamp(train_end.min(total), total))
  }

  pub fn split_of(&self, index: usize, total: usize) -> Split {
    let (train_end, test_end) = self.boundaries(total);
    if index < train_end {
      Split::Train
    } else if index < test_end {
      Split::Test
    } else {
      Split::Valid
    }
  }

  /// 按文件名字典序排序后划分
  pub fn assign(&self, mut paths: Vec<PathBuf>) -> Vec<(PathBuf, Split)> {
    paths.sort();
    let total = paths.len();
    paths
      .into_iter()
      .enumerate()
      .map(|(index, path)| (path, self.split_of(index, total)))
      .collect()
  }
}
