// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/detector.rs - 检测器门面
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

use std::path::Path;

use tracing::{debug, info, warn};

use crate::{
  aggregate::{AggregateMode, DetectionResult, aggregate},
  censor::{Censor, CensorPolicy, Stamp},
  error::{Error, Result},
  frame::{NormalizedImage, PixelImage},
  input::{FrameSampler, ImageSource, VideoMetadata, read_image},
  model::{Detection, LabelVocabulary, Model},
  normalize::Normalizer,
  output::{OutputWrapper, Render},
  runner::{BatchRunner, DEFAULT_BATCH_SIZE, DEFAULT_MIN_PROB, validate_min_prob},
};

/// 视频检测选项
#[derive(Debug, Clone)]
pub struct VideoOptions {
  pub batch_size: usize,
  pub min_prob: f32,
  pub show_progress: bool,
}

impl Default for VideoOptions {
  fn default() -> Self {
    Self {
      batch_size: DEFAULT_BATCH_SIZE,
      min_prob: DEFAULT_MIN_PROB,
      show_progress: true,
    }
  }
}

impl VideoOptions {
  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size;
    self
  }

  pub fn with_min_prob(mut self, min_prob: f32) -> Self {
    self.min_prob = min_prob;
    self
  }

  pub fn with_show_progress(mut self, show_progress: bool) -> Self {
    self.show_progress = show_progress;
    self
  }
}

/// 检测器
///
/// 持有模型与类别表，串联归一化、批量推理、结果汇总与遮挡。
/// 构造之后只读，模型本身可共享时检测器也可以跨线程共享。
pub struct Detector<M> {
  model: M,
  vocabulary: LabelVocabulary,
  normalizer: Normalizer,
  censor: Censor,
}

impl<M: Model> Detector<M> {
  pub fn new(model: M, vocabulary: LabelVocabulary) -> Result<Self> {
    if vocabulary.is_empty() {
      return Err(Error::ResourceUnavailable("类别表为空".to_string()));
    }
    info!("检测器就绪, 共 {} 个类别", vocabulary.len());
    Ok(Self {
      model,
      vocabulary,
      normalizer: Normalizer::default(),
      censor: Censor::default(),
    })
  }

  /// 从换行分隔的类别文件构造
  pub fn from_classes_file<P: AsRef<Path>>(model: M, classes: P) -> Result<Self> {
    let vocabulary = LabelVocabulary::from_file(classes)?;
    Self::new(model, vocabulary)
  }

  pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
    self.normalizer = normalizer;
    self
  }

  pub fn with_censor(mut self, censor: Censor) -> Self {
    self.censor = censor;
    self
  }

  pub fn vocabulary(&self) -> &LabelVocabulary {
    &self.vocabulary
  }

  fn runner(&self) -> BatchRunner<'_, M> {
    BatchRunner::new(&self.model, &self.vocabulary)
  }

  /// 检测单张图像，返回原图坐标系下分数不低于 `min_prob` 的结果
  pub fn detect<'a>(&self, source: impl Into<ImageSource<'a>>, min_prob: f32) -> Result<Vec<Detection>> {
    validate_min_prob(min_prob)?;
    let image = source.into().load()?;
    let normalized = self.normalizer.normalize(&image)?;

    let raw = self
      .runner()
      .with_batch_size(1)
      .with_min_prob(min_prob)
      .run_frames(vec![(0, normalized)], |_, _| {})?;

    let detections = match aggregate(raw, AggregateMode::SingleImage) {
      DetectionResult::Image(detections) => detections,
      DetectionResult::Video(_) => Vec::new(),
    };
    debug!("检测到 {} 个目标", detections.len());
    Ok(detections)
  }

  /// 检测视频的关键帧
  ///
  /// 采样失败或任意一帧归一化失败都会中止整个任务。
  pub fn detect_video<S: FrameSampler>(
    &self,
    sampler: &S,
    video_path: &str,
    options: &VideoOptions,
  ) -> Result<DetectionResult> {
    validate_min_prob(options.min_prob)?;

    let sampled = sampler
      .sample(video_path)
      .map_err(|e| Error::InvalidImage(format!("视频 {} 采样失败: {}", video_path, e)))?;
    info!(
      "视频 {}: {} 帧, {:.2} fps, 采样 {} 帧",
      video_path,
      sampled.video_length,
      sampled.fps,
      sampled.frames.len()
    );

    let frames = sampled
      .frames
      .iter()
      .map(|frame| {
        self
          .normalizer
          .normalize(&frame.image)
          .map(|normalized| (frame.index, normalized))
          .map_err(|e| Error::InvalidImage(format!("第 {} 帧无效: {}", frame.index, e)))
      })
      .collect::<Result<Vec<(u64, NormalizedImage)>>>()?;

    let show_progress = options.show_progress;
    let raw = self
      .runner()
      .with_batch_size(options.batch_size)
      .with_min_prob(options.min_prob)
      .run_frames(frames, |done, total| {
        if show_progress {
          info!("推理进度: {}/{} 批", done, total);
        }
      })?;

    let metadata = VideoMetadata {
      fps: sampled.fps,
      video_length: sampled.video_length,
      video_path: video_path.to_string(),
    };
    Ok(aggregate(raw, AggregateMode::Video(metadata)))
  }

  /// 检测并遮挡图像文件，通过 `output` 写出结果
  ///
  /// 未提供输出时只记录警告并返回 `None`，不读取也不修改任何文件。
  pub fn censor<P: AsRef<Path>>(
    &self,
    img_path: P,
    output: Option<&OutputWrapper>,
    policy: &CensorPolicy,
    stamp: Option<&Stamp>,
  ) -> Result<Option<PixelImage>> {
    let img_path = img_path.as_ref();
    let Some(output) = output else {
      warn!("未指定输出, 跳过遮挡: {}", img_path.display());
      return Ok(None);
    };

    let mut image = read_image(img_path)?;
    let detections = self.detect(&image, DEFAULT_MIN_PROB)?;
    self.censor.censor(&mut image, &detections, policy, stamp);
    output.render_result(&image, &detections)?;
    info!("遮挡完成: {}, {} 个目标", img_path.display(), detections.len());
    Ok(Some(image))
  }
}
