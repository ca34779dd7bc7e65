// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/normalize.rs - 坐标归一化
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

//! 全局最小-最大归一化
//!
//! 每个坐标轴独立地用整段视频（所有帧、所有人脸、所有关键点）的最小值和最大值
//! 做一次仿射变换，映射到 [0, 1]。取值恒定的轴按 [`DegenerateAxisPolicy`] 处理，
//! 不会产生 NaN 或无穷大。

use std::fmt;

use tracing::{debug, warn};

use crate::collect::{KeypointRecord, KeypointTable};

/// 取值恒定（最大值等于最小值）的轴的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegenerateAxisPolicy {
  /// 全部置为 0
  #[default]
  Zero,
  /// 保持原值不缩放
  PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
  X,
  Y,
  Z,
}

impl Axis {
  pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

  pub fn name(&self) -> &'static str {
    match self {
      Axis::X => "x",
      Axis::Y => "y",
      Axis::Z => "z",
    }
  }

  fn get(&self, record: &KeypointRecord) -> f64 {
    match self {
      Axis::X => record.x,
      Axis::Y => record.y,
      Axis::Z => record.z,
    }
  }

  fn get_mut<'a>(&self, record: &'a mut KeypointRecord) -> &'a mut f64 {
    match self {
      Axis::X => &mut record.x,
      Axis::Y => &mut record.y,
      Axis::Z => &mut record.z,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
  pub min: f64,
  pub max: f64,
}

impl AxisRange {
  pub fn is_degenerate(&self) -> bool {
    self.max <= self.min
  }

  fn include(range: Option<AxisRange>, value: f64) -> Option<AxisRange> {
    if !value.is_finite() {
      return range;
    }
    Some(match range {
      Some(r) => AxisRange {
        min: r.min.min(value),
        max: r.max.max(value),
      },
      None => AxisRange {
        min: value,
        max: value,
      },
    })
  }
}

impl fmt::Display for AxisRange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}, {}]", self.min, self.max)
  }
}

/// 单轴归一化结果，`range` 为缩放前的取值范围，空表时为 `None`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisReport {
  pub axis: Axis,
  pub range: Option<AxisRange>,
}

impl AxisReport {
  pub fn is_degenerate(&self) -> bool {
    self.range.is_some_and(|r| r.is_degenerate())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationReport {
  pub policy: DegenerateAxisPolicy,
  pub axes: [AxisReport; 3],
}

impl NormalizationReport {
  pub fn axis(&self, axis: Axis) -> &AxisReport {
    match axis {
      Axis::X => &self.axes[0],
      Axis::Y => &self.axes[1],
      Axis::Z => &self.axes[2],
    }
  }
}

/// 一次遍历求出三个轴的取值范围
pub fn axis_ranges(records: &[KeypointRecord]) -> [Option<AxisRange>; 3] {
  records.iter().fold([None; 3], |mut acc, record| {
    for (slot, axis) in acc.iter_mut().zip(Axis::ALL) {
      *slot = AxisRange::include(*slot, axis.get(record));
    }
    acc
  })
}

/// 原地归一化关键点表的 x/y/z 三列
pub fn normalize(table: &mut KeypointTable, policy: DegenerateAxisPolicy) -> NormalizationReport {
  let ranges = axis_ranges(table.records());
  let records = table.records_mut();

  for (axis, range) in Axis::ALL.into_iter().zip(ranges) {
    let Some(range) = range else {
      continue;
    };

    if range.is_degenerate() {
      warn!(
        "{} 轴取值恒定为 {}，按 {:?} 策略处理",
        axis.name(),
        range.min,
        policy
      );
      if policy == DegenerateAxisPolicy::Zero {
        for record in records.iter_mut() {
          *axis.get_mut(record) = 0.0;
        }
      }
      continue;
    }

    debug!("{} 轴取值范围: {}", axis.name(), range);
    let span = range.max - range.min;
    for record in records.iter_mut() {
      let value = axis.get_mut(record);
      *value = (*value - range.min) / span;
    }
  }

  NormalizationReport {
    policy,
    axes: [
      AxisReport {
        axis: Axis::X,
        range: ranges[0],
      },
      AxisReport {
        axis: Axis::Y,
        range: ranges[1],
      },
      AxisReport {
        axis: Axis::Z,
        range: ranges[2],
      },
    ],
  }
}
