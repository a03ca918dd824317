// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/bin/detect.rs - 检测图像或视频并输出 JSON
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

use anyhow::{Result, bail};
use clap::Parser;
use url::Url;
use zhezhao::{
  Detector, FromUrl, FromUrlWithScheme,
  aggregate::DetectionResult,
  input::ImageFileInput,
  model::{ModelResources, ModelVariant, RknnRetinaNetBuilder},
  runner::{DEFAULT_BATCH_SIZE, DEFAULT_MIN_PROB},
};
use tracing::info;

/// 检测图像或视频中的敏感区域，以 JSON 输出结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型变体: default 或 base
  #[arg(long, default_value = "default")]
  pub variant: String,
  /// 模型缓存根目录，默认 ~/.zhezhao
  #[arg(long, value_name = "DIR")]
  pub model_root: Option<PathBuf>,
  /// 输入来源: image:///path 或 gst://file/path
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 置信度阈值
  #[arg(long, default_value_t = DEFAULT_MIN_PROB)]
  pub min_prob: f32,
  /// 视频推理批大小
  #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
  pub batch_size: usize,
  /// 不输出推理进度
  #[arg(long)]
  pub no_progress: bool,
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
  info!("输入来源: {}", args.input);

  let model = RknnRetinaNetBuilder::new(&resources.checkpoint).build()?;
  let detector = Detector::from_classes_file(model, &resources.classes)?;

  let now = std::time::Instant::now();
  let result = match args.input.scheme() {
    ImageFileInput::SCHEME => {
      let mut input = ImageFileInput::from_url(&args.input)?;
      let Some(image) = input.next() else {
        bail!("没有输入图像");
      };
      DetectionResult::Image(detector.detect(&image, args.min_prob)?)
    }
    #[cfg(feature = "gstreamer_input")]
    zhezhao::input::GStreamerFrameSampler::SCHEME => {
      let sampler = zhezhao::input::GStreamerFrameSampler::from_url(&args.input)?;
      let options = zhezhao::VideoOptions::default()
        .with_batch_size(args.batch_size)
        .with_min_prob(args.min_prob)
        .with_show_progress(!args.no_progress);
      detector.detect_video(&sampler, args.input.path(), &options)?
    }
    other => bail!("不支持的输入方案: {}", other),
  };
  info!("检测完成，耗时: {:.2?}", now.elapsed());

  println!("{}", serde_json::to_string_pretty(&result)?);
  Ok(())
}
