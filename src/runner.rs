// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/runner.rs - 批量推理
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

use tracing::{debug, error};

use crate::{
  error::{Error, Result},
  frame::NormalizedImage,
  model::{Detection, DetectionBox, LabelVocabulary, Model, RawDetections},
};

pub const DEFAULT_BATCH_SIZE: usize = 2;
pub const DEFAULT_MIN_PROB: f32 = 0.6;

/// 校验置信度阈值，必须位于 [0, 1]
pub fn validate_min_prob(min_prob: f32) -> Result<()> {
  if !(0.0..=1.0).contains(&min_prob) {
    return Err(Error::Configuration(format!(
      "置信度阈值必须位于 [0, 1], 实际为 {}",
      min_prob
    )));
  }
  Ok(())
}

/// 批量推理器
///
/// 把输入切成至多 `batch_size` 张的连续批次逐批送入模型，按每张图像自己的
/// 缩放比例还原坐标，并丢弃分数低于 `min_prob` 的结果。
pub struct BatchRunner<'a, M> {
  model: &'a M,
  vocabulary: &'a LabelVocabulary,
  batch_size: usize,
  min_prob: f32,
}

impl<'a, M: Model> BatchRunner<'a, M> {
  pub fn new(model: &'a M, vocabulary: &'a LabelVocabulary) -> Self {
    Self {
      model,
      vocabulary,
      batch_size: DEFAULT_BATCH_SIZE,
      min_prob: DEFAULT_MIN_PROB,
    }
  }

  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size;
    self
  }

  pub fn with_min_prob(mut self, min_prob: f32) -> Self {
    self.min_prob = min_prob;
    self
  }

  fn validate(&self) -> Result<()> {
    if self.batch_size == 0 {
      return Err(Error::Configuration("批大小必须大于 0".to_string()));
    }
    validate_min_prob(self.min_prob)
  }

  pub fn run(&self, images: &[NormalizedImage]) -> Result<Vec<Vec<Detection>>> {
    self.run_with_progress(images, |_, _| {})
  }

  /// 逐批推理，每完成一批调用一次 `on_batch(已完成批数, 总批数)`
  pub fn run_with_progress<F>(
    &self,
    images: &[NormalizedImage],
    mut on_batch: F,
  ) -> Result<Vec<Vec<Detection>>>
  where
    F: FnMut(usize, usize),
  {
    self.validate()?;

    let total = images.len().div_ceil(self.batch_size);
    let mut results = Vec::with_capacity(images.len());

    for (batch_index, batch) in images.chunks(self.batch_size).enumerate() {
      debug!("推理第 {}/{} 批, 共 {} 张", batch_index + 1, total, batch.len());
      let raw = self.model.infer(batch).map_err(|e| {
        error!("第 {} 批推理失败: {}", batch_index + 1, e);
        Error::inference(e)
      })?;

      if raw.len() != batch.len() {
        return Err(Error::Inference(format!(
          "模型返回 {} 组结果, 批次包含 {} 张图像",
          raw.len(),
          batch.len()
        )));
      }

      let batch_results = batch
        .iter()
        .zip(raw)
        .map(|(image, raw)| self.postprocess(image, raw))
        .collect::<Result<Vec<_>>>()?;
      results.extend(batch_results);
      on_batch(batch_index + 1, total);
    }

    Ok(results)
  }

  /// 带帧索引的批量推理，输出与输入的帧索引一一对应
  pub fn run_frames<F>(
    &self,
    frames: Vec<(u64, NormalizedImage)>,
    on_batch: F,
  ) -> Result<Vec<(u64, Vec<Detection>)>>
  where
    F: FnMut(usize, usize),
  {
    let (indices, images): (Vec<u64>, Vec<NormalizedImage>) = frames.into_iter().unzip();
    let results = self.run_with_progress(&images, on_batch)?;
    Ok(indices.into_iter().zip(results).collect())
  }

  fn postprocess(&self, image: &NormalizedImage, raw: RawDetections) -> Result<Vec<Detection>> {
    let RawDetections {
      boxes,
      scores,
      labels,
    } = raw;
    if boxes.len() != scores.len() || labels.len() != scores.len() {
      return Err(Error::Inference(format!(
        "输出形状不匹配: boxes={}, scores={}, labels={}",
        boxes.len(),
        scores.len(),
        labels.len()
      )));
    }

    let mut detections = Vec::new();
    for ((bbox, score), label) in boxes.into_iter().zip(scores).zip(labels) {
      // NaN 也在这里被丢弃
      if !(score >= self.min_prob) {
        continue;
      }
      let Some(label) = self.vocabulary.resolve(label) else {
        debug!("丢弃无效类别索引 {}", label);
        continue;
      };
      detections.push(Detection {
        bbox: DetectionBox::from_scaled(bbox, image.scale()),
        score,
        label: label.to_string(),
      });
    }
    Ok(detections)
  }
}
