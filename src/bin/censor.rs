// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/bin/censor.rs - 遮挡单张图像或整个目录
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;
use zhezhao::{
  Detector, FromUrl,
  censor::{CensorPolicy, DEFAULT_CENSORED_LABELS, Stamp},
  model::{ModelResources, ModelVariant, RknnRetinaNetBuilder},
  output::OutputWrapper,
  task::{CensorDirectoryTask, OneShotCensorTask, Task},
};
use tracing::{info, warn};

/// 遮挡图像中的敏感区域
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型变体: default 或 base
  #[arg(long, default_value = "default")]
  pub variant: String,
  /// 模型缓存根目录，默认 ~/.zhezhao
  #[arg(long, value_name = "DIR")]
  pub model_root: Option<PathBuf>,
  /// 输入图像文件或目录
  #[arg(long, value_name = "PATH")]
  pub input: PathBuf,
  /// 单图输出 URL (image:///out.png, folder:///records?record)，目录输入时为输出目录路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<String>,
  /// 需要遮挡的类别，留空表示全部类别
  #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_CENSORED_LABELS.map(String::from))]
  pub labels: Vec<String>,
  /// 印章图像 (RGBA)
  #[arg(long, value_name = "STAMP")]
  pub stamp: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let variant: ModelVariant = args.variant.parse()?;
  let resources = match &args.model_root {
    Some(root) => ModelResources::locate_in(root, variant)?,
    None => ModelResources::locate(variant)?,
  };
  info!("模型文件路径: {}", resources.checkpoint.display());
  info!("输入: {}", args.input.display());

  let model = RknnRetinaNetBuilder::new(&resources.checkpoint).build()?;
  let detector = Detector::from_classes_file(model, &resources.classes)?;

  let stamp = args.stamp.as_ref().map(Stamp::open).transpose()?;
  let labels = args.labels.iter().filter(|label| !label.is_empty());
  let policy = CensorPolicy::from_labels(labels).with_stamp(stamp.is_some());

  if args.input.is_dir() {
    let Some(output) = &args.output else {
      warn!("目录输入需要指定输出目录");
      return Ok(());
    };
    let summary = CensorDirectoryTask::new(policy)
      .with_stamp(stamp)
      .run_task(&args.input, &detector, PathBuf::from(output).as_path())?;
    info!("成功 {} 张, 失败 {} 张", summary.censored, summary.failed.len());
  } else {
    let output = match args.output.as_deref() {
      Some(output) => Some(OutputWrapper::from_url(&Url::parse(output)?)?),
      None => None,
    };
    OneShotCensorTask::new(policy)
      .with_stamp(stamp)
      .run_task(&args.input, &detector, output.as_ref())?;
  }

  Ok(())
}
