// 该文件是 Lianpu （脸谱） 项目的一部分。
// src/output.rs - 输出定义
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

use std::{
  io::{self, BufWriter, Write},
  path::Path,
};

use tempfile::NamedTempFile;
use thiserror::Error;

pub trait Export<T>: Sized {
  type Error;
  fn export(&self, value: &T) -> Result<(), Self::Error>;
}

mod csv_export;
pub use self::csv_export::CsvExporter;

mod stats;
pub use self::stats::StatsExporter;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("写入 {path} 失败: {source}")]
  Write {
    path: String,
    #[source]
    source: io::Error,
  },
  #[error("序列化错误: {0}")]
  Serialize(#[from] serde_json::Error),
}

impl OutputError {
  fn write(path: &Path, source: io::Error) -> Self {
    OutputError::Write {
      path: path.display().to_string(),
      source,
    }
  }
}

/// 先写入同目录下的临时文件，完成后替换目标文件；失败时目标文件保持原状
fn write_atomically<F>(path: &Path, write: F) -> Result<(), OutputError>
where
  F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
  let directory = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };

  let file = NamedTempFile::new_in(directory).map_err(|e| OutputError::write(path, e))?;
  let mut writer = BufWriter::new(file);
  write(&mut writer).map_err(|e| OutputError::write(path, e))?;
  let file = writer
    .into_inner()
    .map_err(|e| OutputError::write(path, e.into_error()))?;
  file
    .persist(path)
    .map_err(|e| OutputError::write(path, e.error))?;
  Ok(())
}
