// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/model.rs - 模型
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

/// 面部网格关键点数量
pub const FACE_MESH_LANDMARKS: usize = 468;
/// 启用精细化（虹膜）后的关键点数量
pub const FACE_MESH_REFINED_LANDMARKS: usize = 478;

/// 推理模型
///
/// `infer` 接收 RGB 图像。带跟踪的模型会在调用之间保存状态，因此需要 `&mut self`。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 单个关键点，x/y 为相对图像宽高的归一化坐标，z 为模型定义的相对深度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
  pub x: f32,
  pub y: f32,
  pub z: f32,
}

impl Landmark {
  pub fn new(x: f32, y: f32, z: f32) -> Self {
    Self { x, y, z }
  }

  pub fn is_finite(&self) -> bool {
    self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
  }
}

/// 一张人脸在一帧中的全部关键点，按关键点编号排列
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
  pub points: Box<[Landmark]>,
}

impl LandmarkSet {
  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
    self.points.iter()
  }
}

impl From<Vec<Landmark>> for LandmarkSet {
  fn from(points: Vec<Landmark>) -> Self {
    Self {
      points: points.into_boxed_slice(),
    }
  }
}

/// 检测器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
  /// 跨帧跟踪
  pub track: bool,
  pub max_faces: usize,
  /// 精细化关键点（包含虹膜）
  pub refine_landmarks: bool,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      track: true,
      max_faces: 1,
      refine_landmarks: true,
    }
  }
}

impl DetectorConfig {
  pub fn landmark_count(&self) -> usize {
    if self.refine_landmarks {
      FACE_MESH_REFINED_LANDMARKS
    } else {
      FACE_MESH_LANDMARKS
    }
  }
}

#[cfg(feature = "model_face_mesh")]
mod face_mesh;
#[cfg(feature = "model_face_mesh")]
pub use self::face_mesh::{FaceMesh, FaceMeshBuilder, FaceMeshError};
