// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/model/rknn.rs - 基于 RKNPU 的 RetinaNet 检测模型
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::NormalizedImage,
  model::{Model, RawDetections},
};

const RETINANET_NUM_INPUTS: u32 = 1;
// boxes, scores, labels
const RETINANET_NUM_OUTPUTS: u32 = 3;
// 归一化后的长边最大 1333，按 32 对齐
const RETINANET_INPUT_W: u32 = 1344;
const RETINANET_INPUT_H: u32 = 1344;

#[derive(Error, Debug)]
pub enum RknnModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("输入尺寸 {width}x{height} 超出模型输入 {max_width}x{max_height}")]
  InputTooLarge {
    width: usize,
    height: usize,
    max_width: u32,
    max_height: u32,
  },
  #[error("输出形状不匹配: boxes={boxes}, scores={scores}, labels={labels}")]
  ShapeMismatch {
    boxes: usize,
    scores: usize,
    labels: usize,
  },
}

impl RknnModelError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnModelError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct RknnRetinaNet {
  context: Context,
  input_width: u32,
  input_height: u32,
}

pub struct RknnRetinaNetBuilder {
  model_path: PathBuf,
  flags: InitFlags,
  input_width: u32,
  input_height: u32,
}

impl FromUrlWithScheme for RknnRetinaNetBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnRetinaNetBuilder {
  type Error = RknnModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = RknnRetinaNetBuilder::new(url.path());
    for (k, v) in url.query_pairs() {
      let parsed = v.parse::<u32>().ok();
      match (k.as_ref(), parsed) {
        ("width", Some(width)) => builder.input_width = width,
        ("height", Some(height)) => builder.input_height = height,
        _ => {}
      }
    }
    Ok(builder)
  }
}

impl RknnRetinaNetBuilder {
  pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      flags: InitFlags::default(),
      input_width: RETINANET_INPUT_W,
      input_height: RETINANET_INPUT_H,
    }
  }

  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn build(self) -> Result<RknnRetinaNet, RknnModelError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnModelError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnModelError::invalid("无法获取输出数量", e))?;

    if num_inputs != RETINANET_NUM_INPUTS || num_outputs != RETINANET_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        RETINANET_NUM_INPUTS, RETINANET_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(RknnModelError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成");
    Ok(RknnRetinaNet {
      context,
      input_width: self.input_width,
      input_height: self.input_height,
    })
  }
}

impl RknnRetinaNet {
  /// 将归一化图像放到固定尺寸输入的左上角，其余位置补零，缩放比例不变
  fn pad_input(&self, image: &NormalizedImage) -> Result<Vec<u8>, RknnModelError> {
    let (in_w, in_h) = (self.input_width as usize, self.input_height as usize);
    if image.width() > in_w || image.height() > in_h {
      return Err(RknnModelError::InputTooLarge {
        width: image.width(),
        height: image.height(),
        max_width: self.input_width,
        max_height: self.input_height,
      });
    }

    let channels = image.channels();
    let mut padded = vec![0f32; in_w * in_h * channels];
    let row = image.width() * channels;
    for (y, src) in image.as_nhwc().chunks_exact(row).enumerate() {
      let start = y * in_w * channels;
      padded[start..start + row].copy_from_slice(src);
    }

    Ok(padded.iter().flat_map(|v| v.to_ne_bytes()).collect())
  }

  fn infer_one(&self, image: &NormalizedImage) -> Result<RawDetections, RknnModelError> {
    let input = self.pad_input(image)?;

    debug!("设置模型输入");
    self
      .context
      .set_input(0, &input, TensorFormat::NHWC, TensorType::Float32)?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    let boxes = output.get_f32(0)?;
    let scores = output.get_f32(1)?;
    let labels = output.get_f32(2)?;

    if boxes.len() != scores.len() * 4 || labels.len() != scores.len() {
      error!(
        "输出形状不匹配: boxes={}, scores={}, labels={}",
        boxes.len(),
        scores.len(),
        labels.len()
      );
      return Err(RknnModelError::ShapeMismatch {
        boxes: boxes.len(),
        scores: scores.len(),
        labels: labels.len(),
      });
    }

    let mut raw = RawDetections::default();
    for ((bbox, &score), &label) in boxes.chunks_exact(4).zip(scores).zip(labels) {
      raw.push([bbox[0], bbox[1], bbox[2], bbox[3]], score, label as i64);
    }
    debug!("模型输出 {} 个候选框", raw.len());
    Ok(raw)
  }
}

impl Model for RknnRetinaNet {
  type Error = RknnModelError;

  // NPU 上下文按单张图像推理，批次在这里逐张展开
  fn infer(&self, batch: &[NormalizedImage]) -> Result<Vec<RawDetections>, Self::Error> {
    batch.iter().map(|image| self.infer_one(image)).collect()
  }
}
