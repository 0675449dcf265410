// 该文件是 Qupu （曲谱） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像标注测试
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

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use url::Url;

use qupu::{
  FromUrl,
  config::DetectorConfig,
  detect::SheetDetector,
  input::ImageFileInput,
  output::AnnotationPayload,
  task::annotate,
};
use tracing::info;

/// 标注一张图像并把结果打印到标准输出，不上传
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像，例如 image:///path/to/page.png
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 检测参数 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("输入来源: {}", args.input);

  let config = match &args.config {
    Some(path) => DetectorConfig::from_json_file(path)?,
    None => DetectorConfig::default(),
  };
  config.validate()?;
  let detector = SheetDetector::new(&config);

  let input = ImageFileInput::from_url(&args.input)?;
  let now = std::time::Instant::now();
  for item in input.into_items() {
    let grid = item.image?;
    let annotations = annotate(&detector, &grid)
      .ok_or_else(|| anyhow!("图像尺寸为 {}x{}，无法标注", grid.width(), grid.height()))?;
    info!("标注完成，共 {} 个，耗时: {:.2?}", annotations.len(), now.elapsed());

    let payload = AnnotationPayload::new(&item.path, &annotations);
    println!("{}", serde_json::to_string_pretty(&payload)?);
  }

  Ok(())
}
