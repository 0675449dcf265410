// 该文件是 Qupu （曲谱） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use thiserror::Error;
use tracing::debug;

use super::{AnnotationPayload, Upload};
use crate::{
  FromUrl, FromUrlWithScheme, annotation::Annotation, decode_url_path, split::Split,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的图像文件名: {0}")]
  InvalidFileName(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

/// 离线记录标注：`<dir>/<split>/<stem>.json`，并复制原图
///
/// 带 `?no-image` 查询参数时只写标注。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  copy_image: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let copy_image = !uri.query_pairs().any(|(k, _)| k == "no-image");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(decode_url_path(uri)),
      copy_image,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      copy_image: true,
    }
  }

  fn split_directory(&self, split: Option<Split>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = match split {
      Some(split) => self.directory.join(split.as_str()),
      None => self.directory.clone(),
    };
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }
    Ok(directory)
  }
}

impl Upload for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn upload(
    &self,
    image: &Path,
    annotations: &[Annotation],
    split: Option<Split>,
  ) -> Result<(), Self::Error> {
    let (Some(file_name), Some(stem)) = (image.file_name(), image.file_stem()) else {
      return Err(DirectoryRecordOutputError::InvalidFileName(image.to_path_buf()));
    };

    let directory = self.split_directory(split)?;
    let record = directory.join(format!("{}.json", stem.to_string_lossy()));
    let payload = AnnotationPayload::new(image, annotations);
    std::fs::write(&record, serde_json::to_vec_pretty(&payload)?)?;

    if self.copy_image {
      std::fs::copy(image, directory.join(file_name))?;
    }

    debug!("已记录 {} 个标注到 {}", annotations.len(), record.display());
    Ok(())
  }
}
