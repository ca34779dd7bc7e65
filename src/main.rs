// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::{info, warn};
use url::Url;

use lianpu::{
  FromUrl,
  detector::LandmarkDetector,
  input::GStreamerVideoSource,
  model::{DetectorConfig, FaceMeshBuilder},
  normalize::DegenerateAxisPolicy,
  output::{CsvExporter, Export, StatsExporter},
  task::{ExtractionTask, Task},
};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DegenerateAxis {
  /// 恒定轴全部置 0
  Zero,
  /// 恒定轴保持原值
  PassThrough,
}

impl From<DegenerateAxis> for DegenerateAxisPolicy {
  fn from(value: DegenerateAxis) -> Self {
    match value {
      DegenerateAxis::Zero => DegenerateAxisPolicy::Zero,
      DegenerateAxis::PassThrough => DegenerateAxisPolicy::PassThrough,
    }
  }
}

/// Lianpu 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入视频文件路径
  #[arg(long, value_name = "VIDEO")]
  pub video: PathBuf,

  /// 输出 CSV 文件路径
  #[arg(long, value_name = "OUTPUT", default_value = "facial_keypoints.csv")]
  pub output: PathBuf,

  /// 面部网格模型，例如 facemesh:///opt/models/face_mesh.rknn?threshold=0.5
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 最多同时检测的人脸数
  #[arg(
    long,
    default_value_t = 1,
    value_name = "COUNT",
    value_parser = clap::value_parser!(u32).range(1..)
  )]
  pub max_faces: u32,

  /// 精细化关键点（478 点，含虹膜）
  #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
  pub refine_landmarks: bool,

  /// 每帧独立检测，不跨帧跟踪
  #[arg(long)]
  pub static_image_mode: bool,

  /// 取值恒定的坐标轴的处理方式
  #[arg(long, value_enum, default_value_t = DegenerateAxis::Zero)]
  degenerate_axis: DegenerateAxis,

  /// 输出中加入 Face_ID 列
  #[arg(long)]
  pub face_column: bool,

  /// 最大处理帧数（0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_frames: u64,

  /// 归一化参数与统计信息的 JSON 输出路径
  #[arg(long, value_name = "STATS")]
  pub stats: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入视频: {}", args.video.display());
  info!("输出文件: {}", args.output.display());
  info!("模型: {}", args.model);

  let config = DetectorConfig {
    track: !args.static_image_mode,
    max_faces: args.max_faces as usize,
    refine_landmarks: args.refine_landmarks,
  };

  let model = FaceMeshBuilder::from_url(&args.model)?
    .config(config)
    .build()
    .context("模型加载失败")?;
  let detector = LandmarkDetector::new(model, config);

  let source = GStreamerVideoSource::open(&args.video)?;

  let (tx, rx) = std::sync::mpsc::channel();
  if let Err(e) = ctrlc::set_handler(move || {
    info!("收到中断信号，准备输出已收集的数据...");
    let _ = tx.send(());
  }) {
    warn!("无法设置 Ctrl-C 处理: {}", e);
  }

  let max_frames = (args.max_frames > 0).then_some(args.max_frames);
  let exporter = CsvExporter::new(&args.output).with_face_column(args.face_column);

  let summary = ExtractionTask::default()
    .with_policy(args.degenerate_axis.into())
    .with_max_frames(max_frames)
    .with_interrupt(rx)
    .run_task(source, detector, exporter)?;

  if let Some(path) = &args.stats {
    StatsExporter::new(path).export(&summary)?;
    info!("归一化参数已保存到 {}", path.display());
  }

  if summary.detection_failures > 0 {
    warn!("{} 帧检测失败，已按无人脸处理", summary.detection_failures);
  }
  info!("面部关键点已保存到 {}", args.output.display());

  Ok(())
}
