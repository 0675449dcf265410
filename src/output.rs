// 该文件是 Qupu （曲谱） 项目的一部分。
// src/output.rs - 标注上传定义
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

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use url::Url;

#[cfg(any(feature = "roboflow_upload", feature = "directory_record"))]
use crate::{FromUrl, FromUrlWithScheme};
#[cfg(feature = "roboflow_upload")]
use crate::config::ApiKey;
use crate::{annotation::Annotation, config::ConfigError, split::Split};

/// 接收一张图像及其标注
pub trait Upload {
  type Error;
  fn upload(
    &self,
    image: &Path,
    annotations: &[Annotation],
    split: Option<Split>,
  ) -> Result<(), Self::Error>;
}

impl<U: Upload + ?Sized> Upload for &U {
  type Error = U::Error;

  fn upload(
    &self,
    image: &Path,
    annotations: &[Annotation],
    split: Option<Split>,
  ) -> Result<(), Self::Error> {
    (**self).upload(image, annotations, split)
  }
}

/// 上传的标注文件内容：`{"name": ..., "annotations": [...]}`
#[derive(Debug, Serialize)]
pub struct AnnotationPayload<'a> {
  pub name: &'a str,
  pub annotations: &'a [Annotation],
}

impl<'a> AnnotationPayload<'a> {
  pub fn new(image: &'a Path, annotations: &'a [Annotation]) -> Self {
    Self {
      name: image
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default(),
      annotations,
    }
  }
}

#[cfg(feature = "roboflow_upload")]
mod roboflow;
#[cfg(feature = "roboflow_upload")]
pub use self::roboflow::{RoboflowUpload, RoboflowUploadBuilder, RoboflowUploadError};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "roboflow_upload")]
  #[error("Roboflow 上传错误: {0}")]
  RoboflowUploadError(#[from] RoboflowUploadError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("配置错误: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  #[cfg(feature = "roboflow_upload")]
  Roboflow(RoboflowUpload),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordOutput),
}

impl OutputWrapper {
  /// 按 URL 方案构造输出
  ///
  /// `roboflow` 输出必须提供非空的 API key，在读取任何图像之前失败。
  #[cfg_attr(not(feature = "roboflow_upload"), allow(unused_variables))]
  pub fn open(url: &Url, api_key: Option<&str>) -> Result<Self, OutputError> {
    match url.scheme() {
      #[cfg(feature = "roboflow_upload")]
      RoboflowUploadBuilder::SCHEME => {
        let api_key = ApiKey::require(api_key)?;
        let output = RoboflowUploadBuilder::from_url(url)?.build(api_key)?;
        Ok(OutputWrapper::Roboflow(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecord(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Upload for OutputWrapper {
  type Error = OutputError;

  #[allow(unused_variables)]
  fn upload(
    &self,
    image: &Path,
    annotations: &[Annotation],
    split: Option<Split>,
  ) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "roboflow_upload")]
      OutputWrapper::Roboflow(output) => output
        .upload(image, annotations, split)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output
        .upload(image, annotations, split)
        .map_err(OutputError::from),
      #[allow(unreachable_patterns)]
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::annotation::AnnotationClass;

  #[test]
  fn payload_uses_file_name() {
    let annotations = [Annotation {
      class: AnnotationClass::Note,
      x: 0.5,
      y: 0.5,
      width: 0.1,
      height: 0.1,
    }];
    let payload = AnnotationPayload::new(Path::new("/scans/page-01.png"), &annotations);
    let value = serde_json::to_value(&payload).unwrap();

    assert_eq!(value["name"], "page-01.png");
    assert_eq!(value["annotations"][0]["class"], "note");
    assert_eq!(value["annotations"].as_array().unwrap().len(), 1);
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("ftp://example.com/data").unwrap();
    assert!(matches!(
      OutputWrapper::open(&url, Some("key")),
      Err(OutputError::SchemeMismatch)
    ));
  }

  #[cfg(feature = "roboflow_upload")]
  #[test]
  fn roboflow_requires_api_key() {
    let url = Url::parse("roboflow://maistro/sheet-music-omr").unwrap();
    for key in [None, Some(""), Some("   ")] {
      assert!(matches!(
        OutputWrapper::open(&url, key),
        Err(OutputError::ConfigError(ConfigError::MissingApiKey))
      ));
    }
  }
}
