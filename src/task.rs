// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/task.rs - 关键点提取任务
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

use std::{fmt::Display, sync::mpsc::Receiver};

use anyhow::Context;
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  collect::KeypointTable,
  detector::LandmarkDetector,
  input::{FrameSource, VideoProperties},
  model::{LandmarkSet, Model},
  normalize::{DegenerateAxisPolicy, NormalizationReport, normalize},
  output::Export,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 一次提取的统计信息
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSummary {
  pub properties: VideoProperties,
  pub frames_processed: u64,
  pub frames_with_faces: u64,
  pub detection_failures: u64,
  pub records: usize,
  /// 提前结束迭代的解码错误
  pub decode_failure: Option<String>,
  pub interrupted: bool,
  pub normalization: NormalizationReport,
}

/// 逐帧解码、检测、收集，全部帧结束后归一化并一次性输出
///
/// 输入源在帧循环结束时即被丢弃，无论循环是正常结束还是提前退出。
#[derive(Default, Debug)]
pub struct ExtractionTask {
  policy: DegenerateAxisPolicy,
  max_frames: Option<u64>,
  interrupt: Option<Receiver<()>>,
}

impl ExtractionTask {
  pub fn with_policy(mut self, policy: DegenerateAxisPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames;
    self
  }

  /// 收到信号后停止读取新帧，已收集的数据照常输出
  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }
}

impl<I, M, E, O> Task<I, LandmarkDetector<M>, O> for ExtractionTask
where
  I: FrameSource,
  M: Model<Input = RgbImage, Output = Vec<LandmarkSet>, Error = E>,
  E: Display,
  O: Export<KeypointTable>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = ExtractionSummary;
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    mut detector: LandmarkDetector<M>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    let properties = input.properties();
    info!("视频信息: {}", properties);

    let mut table = KeypointTable::new();
    let mut frames_processed = 0u64;
    let mut frames_with_faces = 0u64;
    let mut decode_failure = None;
    let mut interrupted = false;

    info!("开始提取关键点...");
    let now = std::time::Instant::now();
    let mut input = input;
    loop {
      if self.max_frames.is_some_and(|n| frames_processed >= n) {
        info!("达到指定帧数 {}, 停止读取", frames_processed);
        break;
      }

      let frame = match input.next() {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
          warn!("第 {} 帧解码失败，按视频结束处理: {}", frames_processed, e);
          decode_failure = Some(e.to_string());
          break;
        }
        None => break,
      };

      let faces = detector.detect(&frame);
      if !faces.is_empty() {
        frames_with_faces += 1;
      }
      let added = table.push_frame(frame.index(), frame.width(), frame.height(), &faces);
      debug!("帧 {}: {} 张人脸, {} 条记录", frame.index(), faces.len(), added);
      frames_processed += 1;

      if self.interrupted() {
        warn!("中断信号接收，停止读取");
        interrupted = true;
        break;
      }
    }
    drop(input);

    info!(
      "帧处理完成: {} 帧, 其中 {} 帧检测到人脸, {} 条记录, 耗时 {:.2?}",
      frames_processed,
      frames_with_faces,
      table.len(),
      now.elapsed()
    );

    let normalization = normalize(&mut table, self.policy);
    for axis in normalization.axes.iter() {
      match axis.range {
        Some(range) => info!("{} 轴原始范围: {}", axis.axis.name(), range),
        None => info!("{} 轴无数据", axis.axis.name()),
      }
    }

    output.export(&table).context("输出关键点表失败")?;

    Ok(ExtractionSummary {
      properties,
      frames_processed,
      frames_with_faces,
      detection_failures: detector.failures(),
      records: table.len(),
      decode_failure,
      interrupted,
      normalization,
    })
  }
}
