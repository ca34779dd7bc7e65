// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/output/stats.rs - 归一化参数输出
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

use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};

use crate::{
  normalize::{AxisReport, DegenerateAxisPolicy},
  output::{Export, OutputError, write_atomically},
  task::ExtractionSummary,
};

/// 以 JSON 写出各轴原始取值范围与提取统计，用于把归一化坐标换算回像素
pub struct StatsExporter {
  path: PathBuf,
}

impl StatsExporter {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }
}

fn axis_json(report: &AxisReport) -> Value {
  match report.range {
    Some(range) => json!({
      "min": range.min,
      "max": range.max,
      "degenerate": range.is_degenerate(),
    }),
    None => Value::Null,
  }
}

fn to_json(summary: &ExtractionSummary) -> Value {
  let axes = summary
    .normalization
    .axes
    .iter()
    .map(|report| (report.axis.name().to_string(), axis_json(report)))
    .collect::<Map<String, Value>>();

  let policy = match summary.normalization.policy {
    DegenerateAxisPolicy::Zero => "zero",
    DegenerateAxisPolicy::PassThrough => "pass-through",
  };

  json!({
    "video": {
      "fps": summary.properties.fps,
      "frame_count": summary.properties.frame_count,
      "width": summary.properties.width,
      "height": summary.properties.height,
    },
    "frames_processed": summary.frames_processed,
    "frames_with_faces": summary.frames_with_faces,
    "detection_failures": summary.detection_failures,
    "records": summary.records,
    "decode_failure": summary.decode_failure,
    "interrupted": summary.interrupted,
    "degenerate_axis_policy": policy,
    "axes": axes,
  })
}

impl Export<ExtractionSummary> for StatsExporter {
  type Error = OutputError;

  fn export(&self, summary: &ExtractionSummary) -> Result<(), Self::Error> {
    let content = serde_json::to_string_pretty(&to_json(summary))?;
    write_atomically(&self.path, |w| {
      w.write_all(content.as_bytes())?;
      w.write_all(b"\n")
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    input::VideoProperties,
    normalize::{Axis, AxisRange, NormalizationReport},
  };

  fn summary() -> ExtractionSummary {
    ExtractionSummary {
      properties: VideoProperties {
        fps: 25.0,
        frame_count: 3,
        width: 640,
        height: 480,
      },
      frames_processed: 3,
      frames_with_faces: 2,
      detection_failures: 0,
      records: 956,
      decode_failure: None,
      interrupted: false,
      normalization: NormalizationReport {
        policy: DegenerateAxisPolicy::Zero,
        axes: [
          AxisReport {
            axis: Axis::X,
            range: Some(AxisRange { min: 10.0, max: 20.0 }),
          },
          AxisReport {
            axis: Axis::Y,
            range: Some(AxisRange { min: 5.0, max: 5.0 }),
          },
          AxisReport {
            axis: Axis::Z,
            range: None,
          },
        ],
      },
    }
  }

  #[test]
  fn test_stats_json() {
    let value = to_json(&summary());
    assert_eq!(value["video"]["width"], 640);
    assert_eq!(value["records"], 956);
    assert_eq!(value["axes"]["x"]["min"], 10.0);
    assert_eq!(value["axes"]["y"]["degenerate"], true);
    assert!(value["axes"]["z"].is_null());
    assert!(value["decode_failure"].is_null());
    assert_eq!(value["degenerate_axis_policy"], "zero");
  }

  #[test]
  fn test_stats_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.json");
    StatsExporter::new(&path).export(&summary()).unwrap();
    let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["frames_with_faces"], 2);
  }
}
