// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/input.rs - 视频帧输入
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

use std::{fmt, path::Path};

use thiserror::Error;

use crate::frame::{Frame, FrameError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_video;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_video::GStreamerVideoSource;

#[derive(Error, Debug)]
pub enum InputError {
  /// 视频无法打开（文件不存在、编码不支持等），在任何输出之前终止
  #[error("Video source unavailable: {path}: {reason}")]
  SourceUnavailable { path: String, reason: String },
  /// 解码过程中出错，按流结束处理
  #[error("Decode failure: {0}")]
  DecodeFailure(String),
  #[error("Frame error: {0}")]
  FrameError(#[from] FrameError),
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gstreamer::glib::Error),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gstreamer::glib::BoolError),
  #[cfg(feature = "gstreamer_input")]
  #[error("State change error: {0}")]
  StateChangeError(#[from] gstreamer::StateChangeError),
}

impl InputError {
  pub fn unavailable(path: &Path, reason: impl Into<String>) -> Self {
    InputError::SourceUnavailable {
      path: path.display().to_string(),
      reason: reason.into(),
    }
  }
}

/// 视频属性
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoProperties {
  pub fps: f64,
  /// 由时长与帧率估算，容器不提供时长时为 0
  pub frame_count: u64,
  pub width: u32,
  pub height: u32,
}

impl fmt::Display for VideoProperties {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{:.2} FPS, {} 帧, {}x{}",
      self.fps, self.frame_count, self.width, self.height
    )
  }
}

/// 帧输入源
///
/// 单次前向迭代，帧序号从 0 开始严格递增。迭代器返回 `Err` 表示解码失败，
/// 之后不再产生帧。底层资源在输入源被丢弃时释放。
pub trait FrameSource: Iterator<Item = Result<Frame, InputError>> {
  fn properties(&self) -> VideoProperties;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
  fn properties(&self) -> VideoProperties {
    (**self).properties()
  }
}
