// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/input/gstreamer_video.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频文件输入
//!
//! 通过 `filesrc ! decodebin ! videoconvert` 解码本地视频文件，
//! 输出 BGR 排列的帧（与常见视频解码库的默认通道顺序一致）。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use lianpu::input::{FrameSource, GStreamerVideoSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = GStreamerVideoSource::open("face.mp4")?;
//! println!("{}", source.properties());
//! for frame in source {
//!     let frame = frame?;
//!     println!("帧 {}: {}x{}", frame.index(), frame.width(), frame.height());
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, info, warn};

use super::{FrameSource, InputError, VideoProperties};
use crate::frame::{ChannelOrder, Frame};

// appsink 不丢帧，文件输入需要完整帧序列
const PIPELINE_DESCRIPTION: &str = "filesrc name=src ! decodebin ! videoconvert ! \
   video/x-raw,format=BGR ! appsink name=sink sync=false max-buffers=4 drop=false";

const PREROLL_TIMEOUT_SECS: u64 = 10;

/// GStreamer 视频文件输入
///
/// 持有独占的管道句柄，丢弃时将管道置为 `Null` 状态释放资源。
pub struct GStreamerVideoSource {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  properties: VideoProperties,
  next_index: u64,
  finished: bool,
}

impl Drop for GStreamerVideoSource {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerVideoSource {
  /// 打开视频文件并预读首帧获取属性
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, InputError> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(InputError::unavailable(path, "文件不存在"));
    }

    gst::init()?;

    let pipeline = gst::parse::launch(PIPELINE_DESCRIPTION)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| InputError::PipelineError("Failed to create pipeline".to_string()))?;

    let filesrc = pipeline
      .by_name("src")
      .ok_or_else(|| InputError::PipelineError("Failed to get filesrc element".to_string()))?;
    filesrc.set_property("location", path.to_string_lossy().as_ref());

    let appsink = pipeline
      .by_name("sink")
      .ok_or_else(|| InputError::PipelineError("Failed to get appsink element".to_string()))?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| InputError::PipelineError("Failed to convert element to appsink".to_string()))?;

    let mut source = GStreamerVideoSource {
      pipeline,
      appsink,
      properties: VideoProperties::default(),
      next_index: 0,
      finished: false,
    };

    // 从这里开始由 Drop 负责释放管道
    source.preroll(path)?;
    source.pipeline.set_state(gst::State::Playing)?;
    info!("视频已打开: {}", path.display());

    Ok(source)
  }

  fn preroll(&mut self, path: &Path) -> Result<(), InputError> {
    if self.pipeline.set_state(gst::State::Paused).is_err() {
      return Err(InputError::unavailable(path, self.reason("无法启动解码管道")));
    }

    let (result, _, _) = self
      .pipeline
      .state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
    if result.is_err() {
      return Err(InputError::unavailable(path, self.reason("预读失败")));
    }

    let preroll = self
      .appsink
      .pull_preroll()
      .map_err(|_| InputError::unavailable(path, self.reason("视频中没有可解码的帧")))?;
    let caps = preroll
      .caps()
      .ok_or_else(|| InputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| InputError::VideoInfoError)?;

    let fps = {
      let fraction = video_info.fps();
      if fraction.denom() == 0 {
        0.0
      } else {
        fraction.numer() as f64 / fraction.denom() as f64
      }
    };

    let frame_count = self.frame_count(fps);

    self.properties = VideoProperties {
      fps,
      frame_count,
      width: video_info.width(),
      height: video_info.height(),
    };
    debug!("视频属性: {}", self.properties);

    Ok(())
  }

  fn frame_count(&self, fps: f64) -> u64 {
    let frames = self
      .pipeline
      .query_duration::<gst::format::Default>()
      .map(|frames| *frames);
    let duration = self
      .pipeline
      .query_duration::<gst::ClockTime>()
      .map(|duration| duration.nseconds());
    estimate_frame_count(frames, duration, fps)
  }

  /// 总线上的首个错误信息，没有则使用默认描述
  fn reason(&self, fallback: &str) -> String {
    self.bus_error().unwrap_or_else(|| fallback.to_string())
  }

  fn bus_error(&self) -> Option<String> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(match err.debug() {
        Some(debug) => format!("{} ({})", err.error(), debug),
        None => err.error().to_string(),
      }),
      _ => None,
    }
  }

  fn convert_sample(&mut self, sample: gst::Sample) -> Result<Frame, InputError> {
    let buffer = sample
      .buffer()
      .ok_or_else(|| InputError::PipelineError("No buffer in sample".to_string()))?;
    let caps = sample
      .caps()
      .ok_or_else(|| InputError::PipelineError("No caps in sample".to_string()))?;

    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| InputError::VideoInfoError)?;

    let order = match video_info.format() {
      gst_video::VideoFormat::Bgr => ChannelOrder::Bgr,
      gst_video::VideoFormat::Rgb => ChannelOrder::Rgb,
      _ => return Err(InputError::UnsupportedFormat),
    };

    let width = video_info.width() as usize;
    let height = video_info.height() as usize;
    let stride = video_info.stride()[0] as usize;
    let offset = video_info.offset()[0];
    let row = width * 3;

    let map = buffer.map_readable().map_err(|e| {
      InputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
    })?;
    let data = map.as_slice();

    // 行之间可能存在对齐填充
    let expected = offset + stride * height.saturating_sub(1) + row;
    if data.len() < expected {
      return Err(InputError::DecodeFailure(format!(
        "Buffer size mismatch: expected {} bytes, got {} bytes",
        expected,
        data.len()
      )));
    }

    let mut pixels = Vec::with_capacity(row * height);
    for y in 0..height {
      let start = offset + y * stride;
      pixels.extend_from_slice(&data[start..start + row]);
    }

    let frame = Frame::new(
      self.next_index,
      video_info.width(),
      video_info.height(),
      order,
      pixels,
    )?;
    self.next_index += 1;
    Ok(frame)
  }
}

/// 优先使用容器给出的帧数；否则由时长乘帧率向上取整估算，两者都没有时为 0
fn estimate_frame_count(frames: Option<u64>, duration_ns: Option<u64>, fps: f64) -> u64 {
  match (frames, duration_ns) {
    (Some(frames), _) if frames > 0 => frames,
    (_, Some(ns)) if fps > 0.0 => (ns as f64 / 1e9 * fps).ceil() as u64,
    _ => 0,
  }
}

impl Iterator for GStreamerVideoSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.appsink.pull_sample() {
      Ok(sample) => {
        let frame = self.convert_sample(sample);
        if frame.is_err() {
          self.finished = true;
        }
        Some(frame)
      }
      Err(_) if self.appsink.is_eos() => {
        debug!("视频流结束，共 {} 帧", self.next_index);
        self.finished = true;
        None
      }
      Err(e) => {
        self.finished = true;
        Some(Err(InputError::DecodeFailure(
          self.bus_error().unwrap_or_else(|| e.to_string()),
        )))
      }
    }
  }
}

impl FrameSource for GStreamerVideoSource {
  fn properties(&self) -> VideoProperties {
    self.properties
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_file_is_unavailable() {
    let result = GStreamerVideoSource::open("/definitely/not/here/face.mp4");
    assert!(matches!(result, Err(InputError::SourceUnavailable { .. })));
  }

  #[test]
  fn test_frame_count_prefers_container() {
    assert_eq!(estimate_frame_count(Some(301), Some(10_000_000_000), 30.0), 301);
  }

  #[test]
  fn test_frame_count_from_duration_rounds_up() {
    // 10.01 秒 @ 30 FPS 有 301 帧，四舍五入会少算一帧
    assert_eq!(estimate_frame_count(None, Some(10_010_000_000), 30.0), 301);
    assert_eq!(estimate_frame_count(Some(0), Some(2_000_000_000), 25.0), 50);
  }

  #[test]
  fn test_frame_count_unknown() {
    assert_eq!(estimate_frame_count(None, None, 30.0), 0);
    assert_eq!(estimate_frame_count(None, Some(1_000_000_000), 0.0), 0);
  }
}
