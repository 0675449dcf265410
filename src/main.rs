// 该文件是 Qupu （曲谱） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use qupu::{
  FromUrl,
  config::DetectorConfig,
  detect::SheetDetector,
  input::InputWrapper,
  output::OutputWrapper,
  split::SplitRatios,
  task::{BatchTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();
  let args = args::Args::parse();

  info!("Qupu 乐谱自动标注");
  info!("输入来源: {}", args.input);
  info!("标注输出: {}", args.output);

  // 输出先于输入构造，缺少 API key 时不读取任何图像
  let output = OutputWrapper::open(&args.output, args.api_key.as_deref())
    .with_context(|| format!("无法打开输出 {}", args.output))?;

  let config = match &args.config {
    Some(path) => DetectorConfig::from_json_file(path)
      .with_context(|| format!("无法读取检测参数 {}", path.display()))?,
    None => DetectorConfig::default(),
  };
  config.validate()?;
  let detector = SheetDetector::new(&config);

  let mut input = InputWrapper::from_url(&args.input)
    .with_context(|| format!("无法打开输入 {}", args.input))?;
  if let Some(limit) = args.max_images {
    input = input.with_limit(limit);
  }
  if args.split {
    input = input.with_splits(SplitRatios::default());
  }
  info!("待处理图像 {} 张", input.len());

  let report = BatchTask::default()
    .interruptible()?
    .run_task(input.into_items(), detector, output)?;

  println!("{}", serde_json::to_string_pretty(&report)?);
  Ok(())
}
