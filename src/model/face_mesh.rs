// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/model/face_mesh.rs - 面部网格模型
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

use image::{
  RgbImage,
  imageops::{self, FilterType},
};
use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectorConfig, Landmark, LandmarkSet, Model},
};

const FACE_MESH_NUM_INPUTS: u32 = 1;
const FACE_MESH_MIN_OUTPUTS: u32 = 2;
const FACE_MESH_INPUT_SIZE: u32 = 192;
const FACE_MESH_ROI_SCALE: f32 = 1.5;
const FACE_MESH_PRESENCE_THRESH: f32 = 0.5;
const FACE_MESH_TRACK_IOU: f32 = 0.5;

#[derive(Error, Debug)]
pub enum FaceMeshError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型输出不匹配: 需要 {landmarks} 个关键点值与 1 个置信度")]
  OutputMismatch { landmarks: usize },
}

impl From<std::io::Error> for FaceMeshError {
  fn from(err: std::io::Error) -> Self {
    FaceMeshError::ModelLoadError(err)
  }
}

impl From<rknpu::Error> for FaceMeshError {
  fn from(err: rknpu::Error) -> Self {
    FaceMeshError::RknnError(err)
  }
}

impl FaceMeshError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    FaceMeshError::ModelInvalid(msg.to_string(), e)
  }
}

/// 帧像素坐标下的正方形感兴趣区域，(x, y) 为左上角，可超出图像边界
#[derive(Debug, Clone, Copy, PartialEq)]
struct Roi {
  x: f32,
  y: f32,
  size: f32,
}

impl Roi {
  /// 覆盖整帧的正方形，短边两侧留黑边
  fn full_frame(width: u32, height: u32) -> Self {
    let size = width.max(height) as f32;
    Roi {
      x: (width as f32 - size) / 2.0,
      y: (height as f32 - size) / 2.0,
      size,
    }
  }

  /// 由上一帧关键点外接框放大得到的跟踪区域
  fn around(set: &LandmarkSet, width: u32, height: u32) -> Self {
    let (w, h) = (width as f32, height as f32);
    let (mut x_min, mut y_min) = (f32::MAX, f32::MAX);
    let (mut x_max, mut y_max) = (f32::MIN, f32::MIN);
    for p in set.iter() {
      x_min = x_min.min(p.x * w);
      y_min = y_min.min(p.y * h);
      x_max = x_max.max(p.x * w);
      y_max = y_max.max(p.y * h);
    }

    let size = ((x_max - x_min).max(y_max - y_min) * FACE_MESH_ROI_SCALE).max(1.0);
    Roi {
      x: (x_min + x_max) / 2.0 - size / 2.0,
      y: (y_min + y_max) / 2.0 - size / 2.0,
      size,
    }
  }

  fn iou(&self, other: &Roi) -> f32 {
    let ix = ((self.x + self.size).min(other.x + other.size) - self.x.max(other.x)).max(0.0);
    let iy = ((self.y + self.size).min(other.y + other.size) - self.y.max(other.y)).max(0.0);
    let inter = ix * iy;
    let union = self.size * self.size + other.size * other.size - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
  }
}

pub struct FaceMeshBuilder {
  model_path: String,
  config: DetectorConfig,
  threshold: f32,
}

impl FromUrlWithScheme for FaceMeshBuilder {
  const SCHEME: &'static str = "facemesh";
}

impl FromUrl for FaceMeshBuilder {
  type Error = FaceMeshError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FaceMeshError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let model_path = urlencoding::decode(url.path())
      .map_err(|e| FaceMeshError::ModelPathError(format!("路径解码失败: {}", e)))?
      .into_owned();

    let threshold = match url.query_pairs().find(|(k, _)| k == "threshold") {
      Some((_, v)) => v
        .parse::<f32>()
        .map_err(|_| FaceMeshError::ModelPathError(format!("无效的置信度阈值: {}", v)))?,
      None => FACE_MESH_PRESENCE_THRESH,
    };

    Ok(FaceMeshBuilder {
      model_path,
      config: DetectorConfig::default(),
      threshold,
    })
  }
}

impl FaceMeshBuilder {
  pub fn config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Result<FaceMesh, FaceMeshError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, InitFlags::default())?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(FaceMeshError::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| FaceMeshError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| FaceMeshError::invalid("无法获取输出数量", e))?;

    if num_inputs != FACE_MESH_NUM_INPUTS {
      let msg = format!(
        "预期模型输入数量为 {}, 实际为 {}",
        FACE_MESH_NUM_INPUTS, num_inputs
      );
      error!("{}", msg);
      return Err(FaceMeshError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    if num_outputs < FACE_MESH_MIN_OUTPUTS {
      let msg = format!(
        "预期模型输出数量至少为 {}, 实际为 {}",
        FACE_MESH_MIN_OUTPUTS, num_outputs
      );
      error!("{}", msg);
      return Err(FaceMeshError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!(
      "模型加载完成: {} 个关键点, 最多 {} 张人脸, 跟踪 {}",
      self.config.landmark_count(),
      self.config.max_faces,
      if self.config.track { "开启" } else { "关闭" }
    );

    Ok(FaceMesh {
      context,
      num_outputs: num_outputs as usize,
      config: self.config,
      threshold: self.threshold,
      tracks: Vec::new(),
    })
  }
}

/// RKNN 上运行的 MediaPipe 面部网格模型
///
/// 输入为 192x192 RGB NHWC；输出按张量大小区分关键点（N×3）与人脸置信度（1）。
/// 开启跟踪时，下一帧的感兴趣区域由本帧关键点推出；
/// 跟踪的人脸少于上限时，额外在整帧上搜索新的人脸。
pub struct FaceMesh {
  context: Context,
  num_outputs: usize,
  config: DetectorConfig,
  threshold: f32,
  tracks: Vec<Roi>,
}

impl FaceMesh {
  fn run_roi(&self, image: &RgbImage, roi: &Roi) -> Result<Option<LandmarkSet>, FaceMeshError> {
    let input = crop_square(image, roi);
    self.context.set_input(
      0,
      input.as_raw().as_slice(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;
    self.context.run()?;
    let output = self.context.get_outputs()?;

    let mut tensors = Vec::with_capacity(self.num_outputs);
    for idx in 0..self.num_outputs {
      match output.get_f32(idx) {
        Ok(data) => tensors.push(data),
        Err(e) => error!("获取第 {} 个输出失败: {}", idx, e),
      }
    }

    let landmark_count = self.config.landmark_count();
    let (raw, logit) = split_outputs(&tensors, landmark_count).ok_or(
      FaceMeshError::OutputMismatch {
        landmarks: landmark_count * 3,
      },
    )?;

    let presence = sigmoid(logit);
    debug!("人脸置信度: {:.3}", presence);
    if presence < self.threshold {
      return Ok(None);
    }

    let (width, height) = image.dimensions();
    Ok(Some(to_frame_space(raw, roi, width, height)))
  }
}

impl Model for FaceMesh {
  type Input = RgbImage;
  type Output = Vec<LandmarkSet>;
  type Error = FaceMeshError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (width, height) = input.dimensions();

    // 出错时跟踪状态保持为空，下一帧重新整帧搜索
    let tracks = std::mem::take(&mut self.tracks);
    let found = search_faces(&tracks, width, height, self.config.max_faces, |roi| {
      self.run_roi(input, roi)
    })?;

    let (faces, next): (Vec<_>, Vec<_>) = found.into_iter().unzip();
    if self.config.track {
      self.tracks = next;
    }

    debug!("检测到 {} 张人脸", faces.len());
    Ok(faces)
  }
}

/// 依次在跟踪区域上推理，人脸数不足 `max_faces` 时追加一次整帧搜索
///
/// 返回每张人脸及其下一帧的跟踪区域；与已接受区域重叠的结果视为同一张脸。
fn search_faces<E, F>(
  tracks: &[Roi],
  width: u32,
  height: u32,
  max_faces: usize,
  mut run: F,
) -> Result<Vec<(LandmarkSet, Roi)>, E>
where
  F: FnMut(&Roi) -> Result<Option<LandmarkSet>, E>,
{
  let mut rois = tracks.iter().take(max_faces).copied().collect::<Vec<_>>();
  if rois.len() < max_faces {
    rois.push(Roi::full_frame(width, height));
  }

  let mut found: Vec<(LandmarkSet, Roi)> = Vec::new();
  for roi in rois.iter() {
    if found.len() >= max_faces {
      break;
    }
    let Some(set) = run(roi)? else {
      continue;
    };
    let next = Roi::around(&set, width, height);
    if found.iter().any(|(_, r)| r.iou(&next) > FACE_MESH_TRACK_IOU) {
      debug!("跟踪区域重叠，丢弃重复人脸");
      continue;
    }
    found.push((set, next));
  }
  Ok(found)
}

/// 根据张量大小找出关键点输出与置信度输出
fn split_outputs<'a>(tensors: &[&'a [f32]], landmark_count: usize) -> Option<(&'a [f32], f32)> {
  let landmarks = tensors
    .iter()
    .copied()
    .find(|t| t.len() == landmark_count * 3)?;
  let presence = tensors.iter().copied().find(|t| t.len() == 1)?;
  Some((landmarks, presence[0]))
}

/// 模型输入坐标（0..192）映射回整帧归一化坐标
fn to_frame_space(raw: &[f32], roi: &Roi, width: u32, height: u32) -> LandmarkSet {
  let scale = roi.size / FACE_MESH_INPUT_SIZE as f32;
  let (w, h) = (width as f32, height as f32);
  raw
    .chunks_exact(3)
    .map(|p| {
      Landmark::new(
        (roi.x + p[0] * scale) / w,
        (roi.y + p[1] * scale) / h,
        p[2] * scale / w,
      )
    })
    .collect::<Vec<_>>()
    .into()
}

/// 从图像中裁出感兴趣区域并缩放到模型输入大小，越界部分填黑
fn crop_square(image: &RgbImage, roi: &Roi) -> RgbImage {
  let size = FACE_MESH_INPUT_SIZE;
  let mut canvas = RgbImage::new(size, size);
  let (w, h) = image.dimensions();

  let x0 = roi.x.max(0.0).floor() as u32;
  let y0 = roi.y.max(0.0).floor() as u32;
  let x1 = (roi.x + roi.size).min(w as f32).ceil().max(0.0) as u32;
  let y1 = (roi.y + roi.size).min(h as f32).ceil().max(0.0) as u32;
  if x1 <= x0 || y1 <= y0 {
    return canvas;
  }

  let scale = size as f32 / roi.size;
  let region = imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
  let rw = (((x1 - x0) as f32) * scale).round().max(1.0) as u32;
  let rh = (((y1 - y0) as f32) * scale).round().max(1.0) as u32;
  let resized = imageops::resize(&region, rw, rh, FilterType::Triangle);

  let ox = ((x0 as f32 - roi.x) * scale).round() as i64;
  let oy = ((y0 as f32 - roi.y) * scale).round() as i64;
  imageops::overlay(&mut canvas, &resized, ox, oy);
  canvas
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn test_full_frame_roi_is_centered_square() {
    let roi = Roi::full_frame(640, 480);
    assert_eq!(roi.size, 640.0);
    assert_eq!(roi.x, 0.0);
    assert_eq!(roi.y, -80.0);
  }

  #[test]
  fn test_track_roi_expands_landmark_box() {
    let set: LandmarkSet =
      vec![Landmark::new(0.25, 0.25, 0.0), Landmark::new(0.75, 0.5, 0.0)].into();
    let roi = Roi::around(&set, 200, 100);
    // 外接框 100x25，放大 1.5 倍
    assert!((roi.size - 150.0).abs() < 1e-4);
    assert!((roi.x + roi.size / 2.0 - 100.0).abs() < 1e-4);
    assert!((roi.y + roi.size / 2.0 - 37.5).abs() < 1e-4);
  }

  #[test]
  fn test_iou() {
    let a = Roi { x: 0.0, y: 0.0, size: 10.0 };
    let b = Roi { x: 5.0, y: 0.0, size: 10.0 };
    assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
  }

  #[test]
  fn test_split_outputs_by_size() {
    let landmarks = vec![0.5f32; 478 * 3];
    let presence = vec![2.0f32];
    let tongue = vec![0.1f32; 4];
    let tensors = vec![tongue.as_slice(), presence.as_slice(), landmarks.as_slice()];
    let (raw, logit) = split_outputs(&tensors, 478).unwrap();
    assert_eq!(raw.len(), 1434);
    assert_eq!(logit, 2.0);
    assert!(split_outputs(&tensors, 468).is_none());
  }

  #[test]
  fn test_to_frame_space() {
    let roi = Roi { x: -80.0, y: 0.0, size: 384.0 };
    let set = to_frame_space(&[96.0, 96.0, 19.2], &roi, 224, 384);
    let p = set.points[0];
    assert!((p.x - 112.0 / 224.0).abs() < 1e-6);
    assert!((p.y - 0.5).abs() < 1e-6);
    assert!((p.z - 38.4 / 224.0).abs() < 1e-6);
  }

  #[test]
  fn test_crop_pads_outside_frame() {
    let image = RgbImage::from_pixel(100, 50, Rgb([200, 100, 50]));
    let canvas = crop_square(&image, &Roi::full_frame(100, 50));
    assert_eq!(canvas.dimensions(), (192, 192));
    assert_eq!(canvas.get_pixel(96, 96).0, [200, 100, 50]);
    assert_eq!(canvas.get_pixel(96, 2).0, [0, 0, 0]);
  }

  /// 以 (cx, cy) 为中心、边长 0.1 的两点人脸
  fn face_at(cx: f32, cy: f32) -> LandmarkSet {
    vec![
      Landmark::new(cx - 0.05, cy - 0.05, 0.0),
      Landmark::new(cx + 0.05, cy + 0.05, 0.0),
    ]
    .into()
  }

  fn center(roi: &Roi) -> (f32, f32) {
    (roi.x + roi.size / 2.0, roi.y + roi.size / 2.0)
  }

  #[test]
  fn test_search_without_tracks_scans_full_frame() {
    let mut calls = Vec::new();
    let found = search_faces::<(), _>(&[], 100, 100, 1, |roi| {
      calls.push(*roi);
      Ok(Some(face_at(0.5, 0.5)))
    })
    .unwrap();
    assert_eq!(calls, vec![Roi::full_frame(100, 100)]);
    assert_eq!(found.len(), 1);
  }

  #[test]
  fn test_search_single_face_skips_full_frame_while_tracking() {
    let track = Roi::around(&face_at(0.25, 0.25), 100, 100);
    let mut calls = 0;
    let found = search_faces::<(), _>(&[track], 100, 100, 1, |_| {
      calls += 1;
      Ok(Some(face_at(0.25, 0.25)))
    })
    .unwrap();
    assert_eq!(calls, 1);
    assert_eq!(found.len(), 1);
  }

  #[test]
  fn test_search_picks_up_new_face_while_tracking() {
    let track = Roi::around(&face_at(0.25, 0.25), 100, 100);
    let found = search_faces::<(), _>(&[track], 100, 100, 2, |roi| {
      if *roi == Roi::full_frame(100, 100) {
        Ok(Some(face_at(0.75, 0.75)))
      } else {
        let (cx, cy) = center(roi);
        Ok(Some(face_at(cx / 100.0, cy / 100.0)))
      }
    })
    .unwrap();
    assert_eq!(found.len(), 2);
    assert!((found[0].0.points[0].x - 0.2).abs() < 1e-4);
    assert!((found[1].0.points[0].x - 0.7).abs() < 1e-4);

    // 下一帧两张脸都在跟踪中，不再整帧搜索
    let tracks = found.iter().map(|(_, r)| *r).collect::<Vec<_>>();
    let mut full_frame_runs = 0;
    let again = search_faces::<(), _>(&tracks, 100, 100, 2, |roi| {
      if *roi == Roi::full_frame(100, 100) {
        full_frame_runs += 1;
      }
      let (cx, cy) = center(roi);
      Ok(Some(face_at(cx / 100.0, cy / 100.0)))
    })
    .unwrap();
    assert_eq!(full_frame_runs, 0);
    assert_eq!(again.len(), 2);
  }

  #[test]
  fn test_search_drops_duplicate_of_tracked_face() {
    let track = Roi::around(&face_at(0.5, 0.5), 100, 100);
    let found = search_faces::<(), _>(&[track], 100, 100, 3, |_| Ok(Some(face_at(0.5, 0.5))))
      .unwrap();
    assert_eq!(found.len(), 1);
  }

  #[test]
  fn test_search_propagates_inference_error() {
    let result = search_faces(&[], 100, 100, 2, |_| Err::<Option<LandmarkSet>, _>("npu"));
    assert_eq!(result.unwrap_err(), "npu");
  }
}
