// 该文件是 Qupu （曲谱） 项目的一部分。
// src/config.rs - 检测参数与凭据配置
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

//! # 检测参数
//!
//! 所有启发式阈值集中在 [`DetectorConfig`] 中，默认值即标注脚本沿用的经验值。
//! 可以从 JSON 文件覆盖其中任意字段，未给出的字段保持默认：
//!
//! ```json
//! {
//!   "edge": { "low_threshold": 40.0 },
//!   "blob": { "max_area": 800.0 }
//! }
//! ```

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("缺少上传服务的 API 密钥")]
  MissingApiKey,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("参数无效: {0}")]
  Invalid(String),
}

/// 边缘检测的滞后阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
  pub low_threshold: f32,
  pub high_threshold: f32,
}

impl Default for EdgeParams {
  fn default() -> Self {
    Self {
      low_threshold: 50.0,
      high_threshold: 150.0,
    }
  }
}

/// 概率霍夫直线变换参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughParams {
  /// 距离分辨率（像素）
  pub rho: f64,
  /// 角度分辨率（弧度）
  pub theta: f64,
  /// 累加器投票阈值
  pub threshold: u32,
  /// 最短线段长度（像素）
  pub min_line_length: u32,
  /// 同一直线上允许的最大断裂（像素）
  pub max_line_gap: u32,
  /// 沿直线行走时，两侧可接受的边缘像素偏移
  pub corridor: u32,
  /// 笔画两侧边缘融合为一条线段的最大垂直距离，0 表示不融合
  pub merge_distance: f64,
}

impl Default for HoughParams {
  fn default() -> Self {
    Self {
      rho: 1.0,
      theta: std::f64::consts::PI / 180.0,
      threshold: 100,
      min_line_length: 100,
      max_line_gap: 10,
      corridor: 1,
      merge_distance: 3.0,
    }
  }
}

/// 五线谱线分类参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffLineParams {
  /// 保留 `|y2 - y1| < max_skew` 的线段
  pub max_skew: i32,
}

impl Default for StaffLineParams {
  fn default() -> Self {
    Self { max_skew: 10 }
  }
}

/// 斑点（音符头候选）过滤参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobParams {
  /// 反色图中不低于该值的像素视为前景
  pub foreground_threshold: u8,
  pub min_area: f64,
  pub max_area: f64,
  pub min_circularity: f64,
  pub min_convexity: f64,
}

impl Default for BlobParams {
  fn default() -> Self {
    Self {
      foreground_threshold: 128,
      min_area: 100.0,
      max_area: 500.0,
      min_circularity: 0.1,
      min_convexity: 0.5,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  pub edge: EdgeParams,
  pub hough: HoughParams,
  pub staff_line: StaffLineParams,
  pub blob: BlobParams,
}

impl DetectorConfig {
  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    debug!("读取检测参数文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let config: DetectorConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let EdgeParams {
      low_threshold,
      high_threshold,
    } = self.edge;
    if !(low_threshold >= 0.0 && low_threshold <= high_threshold) {
      return Err(ConfigError::Invalid(format!(
        "边缘阈值需满足 0 <= low <= high, 实际为 {} / {}",
        low_threshold, high_threshold
      )));
    }

    if self.hough.rho <= 0.0 || self.hough.theta <= 0.0 {
      return Err(ConfigError::Invalid(format!(
        "霍夫变换分辨率必须为正数, 实际为 rho={} theta={}",
        self.hough.rho, self.hough.theta
      )));
    }

    if self.hough.threshold == 0 {
      return Err(ConfigError::Invalid("霍夫投票阈值不能为 0".to_string()));
    }

    if self.hough.merge_distance < 0.0 {
      return Err(ConfigError::Invalid(format!(
        "融合距离不能为负数: {}",
        self.hough.merge_distance
      )));
    }

    if self.staff_line.max_skew <= 0 {
      return Err(ConfigError::Invalid(format!(
        "谱线倾斜容差必须为正数: {}",
        self.staff_line.max_skew
      )));
    }

    if !(self.blob.min_area >= 0.0 && self.blob.min_area <= self.blob.max_area) {
      return Err(ConfigError::Invalid(format!(
        "斑点面积范围无效: [{}, {}]",
        self.blob.min_area, self.blob.max_area
      )));
    }

    Ok(())
  }
}

/// 上传服务的 API 密钥
///
/// 构造时即校验非空，`Debug` 输出不泄露密钥内容。
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
  pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
    let key = key.into().trim().to_string();
    if key.is_empty() {
      return Err(ConfigError::MissingApiKey);
    }
    Ok(Self(key))
  }

  /// 从可选值构造，缺失时返回 [`ConfigError::MissingApiKey`]
  pub fn require(key: Option<&str>) -> Result<Self, ConfigError> {
    key.ok_or(ConfigError::MissingApiKey).and_then(Self::new)
  }

  pub fn expose(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for ApiKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ApiKey(***{} chars)", self.0.len())
  }
}
