// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/frame.rs - 视频帧定义
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

use image::RgbImage;
use thiserror::Error;

const CHANNELS: usize = 3;

/// 像素通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
  Rgb,
  Bgr,
}

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

/// 解码后的一帧图像，HWC 紧密排列，每像素 3 字节
#[derive(Debug, Clone)]
pub struct Frame {
  index: u64,
  width: u32,
  height: u32,
  order: ChannelOrder,
  data: Box<[u8]>,
}

impl Frame {
  pub fn new(
    index: u64,
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    let expected = CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      index,
      width,
      height,
      order,
      data: data.into_boxed_slice(),
    })
  }

  /// 单色帧，主要用于合成输入
  pub fn filled(index: u64, width: u32, height: u32, order: ChannelOrder, pixel: [u8; 3]) -> Self {
    let data = pixel
      .iter()
      .copied()
      .cycle()
      .take(CHANNELS * width as usize * height as usize)
      .collect::<Vec<u8>>();

    Self {
      index,
      width,
      height,
      order,
      data: data.into_boxed_slice(),
    }
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  /// 转换为 RGB 顺序的图像，BGR 帧会交换 R/B 通道
  pub fn to_rgb_image(&self) -> RgbImage {
    let data = match self.order {
      ChannelOrder::Rgb => self.data.to_vec(),
      ChannelOrder::Bgr => self
        .data
        .chunks_exact(CHANNELS)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect(),
    };

    // 长度已在构造时校验
    RgbImage::from_raw(self.width, self.height, data)
      .unwrap_or_else(|| RgbImage::new(self.width, self.height))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rejects_short_buffer() {
    let result = Frame::new(0, 4, 4, ChannelOrder::Bgr, vec![0u8; 10]);
    assert!(matches!(
      result,
      Err(FrameError::BufferSizeMismatch {
        expected: 48,
        actual: 10
      })
    ));
  }

  #[test]
  fn test_bgr_to_rgb_swaps_channels() {
    let frame = Frame::new(3, 2, 1, ChannelOrder::Bgr, vec![1, 2, 3, 4, 5, 6]).unwrap();
    let image = frame.to_rgb_image();
    assert_eq!(image.get_pixel(0, 0).0, [3, 2, 1]);
    assert_eq!(image.get_pixel(1, 0).0, [6, 5, 4]);
  }

  #[test]
  fn test_rgb_is_untouched() {
    let frame = Frame::filled(0, 3, 2, ChannelOrder::Rgb, [10, 20, 30]);
    let image = frame.to_rgb_image();
    assert_eq!(image.dimensions(), (3, 2));
    assert!(image.pixels().all(|p| p.0 == [10, 20, 30]));
  }
}
