// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/collect.rs - 关键点收集
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

use crate::model::LandmarkSet;

/// 一条关键点记录
///
/// 归一化之前 x/y 为像素坐标，z 为模型深度单位。
/// `face` 为该人脸在本帧中的输出次序，`landmark_id` 仅在同一张人脸内唯一。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeypointRecord {
  pub frame: u64,
  pub face: usize,
  pub landmark_id: usize,
  pub x: f64,
  pub y: f64,
  pub z: f64,
}

/// 单帧检测结果展开为记录：先按人脸输出次序，再按关键点编号
pub fn collect(
  frame_index: u64,
  width: u32,
  height: u32,
  landmark_sets: &[LandmarkSet],
) -> impl Iterator<Item = KeypointRecord> + '_ {
  let (w, h) = (width as f64, height as f64);
  landmark_sets
    .iter()
    .enumerate()
    .flat_map(move |(face, set)| {
      set
        .iter()
        .enumerate()
        .map(move |(landmark_id, p)| KeypointRecord {
          frame: frame_index,
          face,
          landmark_id,
          x: p.x as f64 * w,
          y: p.y as f64 * h,
          z: p.z as f64,
        })
    })
}

/// 只追加的关键点表，记录顺序即插入顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeypointTable {
  records: Vec<KeypointRecord>,
}

impl KeypointTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// 追加一帧的记录，返回新增条数
  pub fn push_frame(
    &mut self,
    frame_index: u64,
    width: u32,
    height: u32,
    landmark_sets: &[LandmarkSet],
  ) -> usize {
    let before = self.records.len();
    self
      .records
      .extend(collect(frame_index, width, height, landmark_sets));
    self.records.len() - before
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn records(&self) -> &[KeypointRecord] {
    &self.records
  }

  pub fn records_mut(&mut self) -> &mut [KeypointRecord] {
    &mut self.records
  }

  pub fn iter(&self) -> impl Iterator<Item = &KeypointRecord> {
    self.records.iter()
  }
}

impl From<Vec<KeypointRecord>> for KeypointTable {
  fn from(records: Vec<KeypointRecord>) -> Self {
    Self { records }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Landmark;

  fn face(points: &[(f32, f32, f32)]) -> LandmarkSet {
    points
      .iter()
      .map(|&(x, y, z)| Landmark::new(x, y, z))
      .collect::<Vec<_>>()
      .into()
  }

  #[test]
  fn test_scales_xy_and_keeps_z() {
    let sets = [face(&[(0.5, 0.25, -0.03), (1.0, 0.0, 0.1)])];
    let records = collect(7, 640, 480, &sets).collect::<Vec<_>>();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].frame, 7);
    assert_eq!(records[0].landmark_id, 0);
    assert!((records[0].x - 320.0).abs() < 1e-6);
    assert!((records[0].y - 120.0).abs() < 1e-6);
    assert!((records[0].z - (-0.03f32) as f64).abs() < 1e-9);
    assert_eq!(records[1].landmark_id, 1);
    assert!((records[1].x - 640.0).abs() < 1e-6);
  }

  #[test]
  fn test_faces_in_emission_order() {
    let sets = [
      face(&[(0.1, 0.1, 0.0), (0.2, 0.2, 0.0)]),
      face(&[(0.8, 0.8, 0.0), (0.9, 0.9, 0.0)]),
    ];
    let ids = collect(0, 10, 10, &sets)
      .map(|r| (r.face, r.landmark_id))
      .collect::<Vec<_>>();
    assert_eq!(ids, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
  }

  #[test]
  fn test_no_faces_no_records() {
    let mut table = KeypointTable::new();
    assert_eq!(table.push_frame(0, 10, 10, &[]), 0);
    assert!(table.is_empty());
  }

  #[test]
  fn test_table_appends_in_frame_order() {
    let mut table = KeypointTable::new();
    table.push_frame(1, 10, 10, &[face(&[(0.1, 0.1, 0.0)])]);
    table.push_frame(2, 10, 10, &[face(&[(0.2, 0.2, 0.0)])]);
    let frames = table.iter().map(|r| r.frame).collect::<Vec<_>>();
    assert_eq!(frames, vec![1, 2]);
  }
}
