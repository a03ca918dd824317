// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/error.rs - 库级错误类型
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

use thiserror::Error;

use crate::{input::ImageFileInputError, output::OutputError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
  /// 图像无法解码，或尺寸为零
  #[error("无效图像: {0}")]
  InvalidImage(String),
  /// 模型调用失败，或输出形状不符合批次
  #[error("推理错误: {0}")]
  Inference(String),
  /// 模型权重、类别表或印章资源缺失
  #[error("资源不可用: {0}")]
  ResourceUnavailable(String),
  /// 未知模型变体、阈值越界等配置问题
  #[error("配置错误: {0}")]
  Configuration(String),
  #[error("输出错误: {0}")]
  Output(#[from] OutputError),
}

impl Error {
  pub fn inference<E: std::fmt::Display>(e: E) -> Self {
    Error::Inference(e.to_string())
  }
}

impl From<ImageFileInputError> for Error {
  fn from(err: ImageFileInputError) -> Self {
    Error::InvalidImage(err.to_string())
  }
}
