// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/detector.rs - 关键点检测适配
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

use std::fmt::Display;

use image::RgbImage;
use tracing::{debug, warn};

use crate::{
  frame::Frame,
  model::{DetectorConfig, LandmarkSet, Model},
};

/// 包装关键点模型
///
/// 帧先转换为 RGB 再送入模型。单帧推理失败记为无人脸并继续；
/// 关键点数量不符或含非有限值的结果被丢弃；输出人脸数不超过 `max_faces`。
pub struct LandmarkDetector<M> {
  model: M,
  config: DetectorConfig,
  failures: u64,
}

impl<M, E> LandmarkDetector<M>
where
  M: Model<Input = RgbImage, Output = Vec<LandmarkSet>, Error = E>,
  E: Display,
{
  pub fn new(model: M, config: DetectorConfig) -> Self {
    Self {
      model,
      config,
      failures: 0,
    }
  }

  /// 推理失败的帧数
  pub fn failures(&self) -> u64 {
    self.failures
  }

  pub fn detect(&mut self, frame: &Frame) -> Vec<LandmarkSet> {
    let image = frame.to_rgb_image();

    let sets = match self.model.infer(&image) {
      Ok(sets) => sets,
      Err(e) => {
        self.failures += 1;
        warn!("帧 {} 检测失败，按无人脸处理: {}", frame.index(), e);
        return Vec::new();
      }
    };

    let expected = self.config.landmark_count();
    let faces = sets
      .into_iter()
      .filter(|set| {
        if set.len() != expected {
          warn!(
            "帧 {} 关键点数量不符: 期望 {}, 实际 {}",
            frame.index(),
            expected,
            set.len()
          );
          return false;
        }
        if !set.iter().all(|p| p.is_finite()) {
          warn!("帧 {} 关键点含非有限值，已丢弃", frame.index());
          return false;
        }
        true
      })
      .take(self.config.max_faces)
      .collect::<Vec<_>>();

    debug!("帧 {}: {} 张人脸", frame.index(), faces.len());
    faces
  }
}
