// 该文件是 Qupu （曲谱） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

/// Qupu 乐谱自动标注
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// 支持格式:
  /// - 单张图像: image:///path/to/page.png
  /// - 图像目录: folder:///path/to/dir?ext=png
  #[arg(short, long, value_name = "URL")]
  pub input: Url,

  /// 标注输出
  /// 支持格式:
  /// - Roboflow 数据集: roboflow://<workspace>/<project>
  /// - 本地目录: folder:///path/to/out
  #[arg(short, long, value_name = "URL")]
  pub output: Url,

  /// Roboflow API key
  #[arg(long, env = "ROBOFLOW_API_KEY", hide_env_values = true)]
  pub api_key: Option<String>,

  /// 检测参数 JSON 文件，缺省字段使用默认值
  #[arg(short, long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 按 70/20/10 划分训练/测试/验证集
  #[arg(long)]
  pub split: bool,

  /// 最多处理的图像数（按文件名排序后截取）
  #[arg(long, value_name = "COUNT")]
  pub max_images: Option<usize>,
}
