// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/output/csv_export.rs - CSV 关键点表输出
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

use tracing::debug;

use crate::{
  collect::KeypointTable,
  output::{Export, OutputError, write_atomically},
};

const HEADER: &str = "Frame,Landmark_ID,X,Y,Z";
const HEADER_WITH_FACE: &str = "Frame,Face_ID,Landmark_ID,X,Y,Z";

/// 逗号分隔的关键点表，总是整体覆盖目标文件
pub struct CsvExporter {
  path: PathBuf,
  face_column: bool,
}

impl CsvExporter {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      face_column: false,
    }
  }

  /// 在 `Frame` 之后加入 `Face_ID` 列，区分同一帧中的多张人脸
  pub fn with_face_column(mut self, face_column: bool) -> Self {
    self.face_column = face_column;
    self
  }
}

impl Export<KeypointTable> for CsvExporter {
  type Error = OutputError;

  fn export(&self, table: &KeypointTable) -> Result<(), Self::Error> {
    debug!("写入 {} 条记录到 {}", table.len(), self.path.display());
    write_atomically(&self.path, |w| {
      if self.face_column {
        writeln!(w, "{}", HEADER_WITH_FACE)?;
        for r in table.iter() {
          writeln!(
            w,
            "{},{},{},{},{},{}",
            r.frame, r.face, r.landmark_id, r.x, r.y, r.z
          )?;
        }
      } else {
        writeln!(w, "{}", HEADER)?;
        for r in table.iter() {
          writeln!(w, "{},{},{},{},{}", r.frame, r.landmark_id, r.x, r.y, r.z)?;
        }
      }
      Ok(())
    })
  }
}
