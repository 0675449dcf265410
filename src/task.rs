// 该文件是 Qupu （曲谱） 项目的一部分。
// src/task.rs - 批量标注任务
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

use std::{fmt, sync::mpsc, thread, time::Duration};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
  annotation::{Annotation, AnnotationEncoder},
  detect::{DetectResult, Extractor},
  frame::PixelGrid,
  input::InputItem,
  output::Upload,
};

pub trait Task<I, D, U>: Sized {
  type Report;
  type Error;
  fn run_task(self, input: I, detector: D, output: U) -> Result<Self::Report, Self::Error>;
}

/// 检测并编码一张图像，宽或高为零时返回 `None`
pub fn annotate<D>(detector: &D, grid: &PixelGrid) -> Option<Vec<Annotation>>
where
  D: Extractor<Input = PixelGrid, Output = DetectResult>,
{
  if grid.is_degenerate() {
    return None;
  }
  let encoder = AnnotationEncoder::for_grid(grid)?;
  let result = detector.extract(grid);
  Some(encoder.encode_all(&result))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
  /// 迭代到的图像数
  pub total: usize,
  /// 完成检测与编码的图像数
  pub annotated: usize,
  /// 读取失败或尺寸为零而跳过的图像数
  pub skipped: usize,
  pub uploaded: usize,
  pub upload_failed: usize,
  /// 产生的标注总数
  pub annotations: usize,
}

impl fmt::Display for BatchReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "共 {} 张：标注 {} 张（{} 个标注），跳过 {} 张，上传成功 {} 张，上传失败 {} 张",
      self.total,
      self.annotated,
      self.annotations,
      self.skipped,
      self.uploaded,
      self.upload_failed
    )
  }
}

/// 逐张处理输入，单张失败只记录日志，不中断批次
#[derive(Debug, Default)]
pub struct BatchTask {
  stop: Option<mpsc::Receiver<()>>,
}

impl BatchTask {
  /// 收到信号后处理完当前图像即停止
  pub fn with_stop_signal(mut self, stop: mpsc::Receiver<()>) -> Self {
    self.stop = Some(stop);
    self
  }

  /// 安装 Ctrl-C 处理器
  ///
  /// 第一次中断在当前图像结束后停止；30 秒内仍未退出则强制结束进程。
  pub fn interruptible(self) -> anyhow::Result<Self> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，处理完当前图像后退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(self.with_stop_signal(rx))
  }

  fn should_stop(&self) -> bool {
    self
      .stop
      .as_ref()
      .map(|rx| rx.try_recv().is_ok())
      .unwrap_or(false)
  }
}

impl<I, D, U> Task<I, D, U> for BatchTask
where
  I: IntoIterator<Item = InputItem>,
  D: Extractor<Input = PixelGrid, Output = DetectResult>,
  U: Upload,
  U::Error: fmt::Display,
{
  type Report = BatchReport;
  type Error = anyhow::Error;

  fn run_task(self, input: I, detector: D, output: U) -> Result<Self::Report, Self::Error> {
    info!("开始批量标注...");
    let mut report = BatchReport::default();

    for item in input {
      report.total += 1;
      let now = std::time::Instant::now();
      info!("处理第 {} 张图像: {}", report.total, item.path.display());

      match item.image {
        Err(err) => {
          warn!("无法读取图像 {}，跳过: {}", item.path.display(), err);
          report.skipped += 1;
        }
        Ok(grid) => match annotate(&detector, &grid) {
          None => {
            warn!(
              "图像 {} 尺寸为 {}x{}，跳过",
              item.path.display(),
              grid.width(),
              grid.height()
            );
            report.skipped += 1;
          }
          Some(annotations) => {
            report.annotated += 1;
            report.annotations += annotations.len();
            debug!(
              "生成 {} 个标注，耗时: {:.2?}",
              annotations.len(),
              now.elapsed()
            );

            match output.upload(&item.path, &annotations, item.split) {
              Ok(()) => {
                report.uploaded += 1;
                info!("上传完成，耗时: {:.2?}", now.elapsed());
              }
              Err(err) => {
                error!("上传 {} 失败: {}", item.path.display(), err);
                report.upload_failed += 1;
              }
            }
          }
        },
      }

      if self.should_stop() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成: {}", report);
    Ok(report)
  }
}
