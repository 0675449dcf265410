// 该文件是 Qupu （曲谱） 项目的一部分。
// src/input/image_directory.rs - 图像目录输入
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

use tracing::{error, info};
use url::Url;

use super::{InputError, InputItem, load_image};
use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  split::{Split, SplitRatios},
};

const DEFAULT_EXTENSION: &str = "png";

/// 目录中按扩展名过滤、按路径排序的图像列表
///
/// URL 形如 `folder:///data/scans?ext=jpg`，`ext` 缺省为 `png`，不区分大小写。
pub struct ImageDirectoryInput {
  entries: Vec<(PathBuf, Option<Split>)>,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配：期望 '{}'，实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch);
    }

    let extension = url
      .query_pairs()
      .find(|(key, _)| key == "ext")
      .map(|(_, value)| value.trim_start_matches('.').to_string())
      .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    let dir = PathBuf::from(decode_url_path(url));
    let paths = list_images(&dir, &extension)?;
    info!(
      "目录 {} 中找到 {} 张 .{} 图像",
      dir.display(),
      paths.len(),
      extension
    );

    Ok(Self {
      entries: paths.into_iter().map(|path| (path, None)).collect(),
    })
  }
}

fn list_images(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, InputError> {
  if !dir.is_dir() {
    return Err(InputError::NotADirectory(dir.to_path_buf()));
  }

  let read_dir =
    std::fs::read_dir(dir).map_err(|err| InputError::DirectoryError(dir.to_path_buf(), err))?;

  let mut paths = Vec::new();
  for entry in read_dir {
    let path = entry
      .map_err(|err| InputError::DirectoryError(dir.to_path_buf(), err))?
      .path();
    let matches = path.is_file()
      && path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
    if matches {
      paths.push(path);
    }
  }
  paths.sort();
  Ok(paths)
}

impl ImageDirectoryInput {
  pub fn paths(&self) -> Vec<&Path> {
    self.entries.iter().map(|(path, _)| path.as_path()).collect()
  }

  /// 只保留排序后的前 `limit` 张
  pub fn with_limit(mut self, limit: usize) -> Self {
    self.entries.truncate(limit);
    self
  }

  pub fn with_splits(self, ratios: SplitRatios) -> Self {
    let paths = self.entries.into_iter().map(|(path, _)| path).collect();
    Self {
      entries: ratios
        .assign(paths)
        .into_iter()
        .map(|(path, split)| (path, Some(split)))
        .collect(),
    }
  }

  pub fn into_items(self) -> ImageDirectoryItems {
    ImageDirectoryItems {
      entries: self.entries.into_iter(),
    }
  }
}

pub struct ImageDirectoryItems {
  entries: std::vec::IntoIter<(PathBuf, Option<Split>)>,
}

impl Iterator for ImageDirectoryItems {
  type Item = InputItem;

  fn next(&mut self) -> Option<Self::Item> {
    self.entries.next().map(|(path, split)| InputItem {
      image: load_image(&path),
      path,
      split,
    })
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.entries.size_hint()
  }
}
