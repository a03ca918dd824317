// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/input/sampler.rs - 视频关键帧采样
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

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::frame::{PixelImage, SampledFrame};

const DEFAULT_INTEREST_THRESHOLD: f32 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
  pub fps: f64,
  pub video_length: u64,
  pub video_path: String,
}

/// 采样结果：稀疏的关键帧以及视频的帧率与总帧数
#[derive(Debug, Clone, Default)]
pub struct SampledVideo {
  pub frames: Vec<SampledFrame>,
  pub fps: f64,
  pub video_length: u64,
}

/// 帧采样器
///
/// 从视频中挑出值得检测的帧。返回的帧索引严格递增，但不要求连续。
pub trait FrameSampler {
  type Error: std::error::Error + Send + Sync + 'static;

  fn sample(&self, video_path: &str) -> Result<SampledVideo, Self::Error>;
}

impl<S: FrameSampler + ?Sized> FrameSampler for &S {
  type Error = S::Error;

  fn sample(&self, video_path: &str) -> Result<SampledVideo, Self::Error> {
    (**self).sample(video_path)
  }
}

/// 关键帧筛选
///
/// 保留第一帧，以及与上一个保留帧的平均像素差超过阈值的帧。
/// 尺寸变化的帧总是保留。
#[derive(Debug, Clone)]
pub struct InterestFilter {
  threshold: f32,
}

impl Default for InterestFilter {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_INTEREST_THRESHOLD,
    }
  }
}

impl InterestFilter {
  /// 阈值为 [0, 1] 内的平均绝对差，0 表示保留每一帧
  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold.clamp(0.0, 1.0);
    self
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  /// 遍历解码出的全部帧，返回关键帧与总帧数；任何一帧解码失败都会中止
  pub fn select<I, E>(&self, frames: I) -> Result<(Vec<SampledFrame>, u64), E>
  where
    I: IntoIterator<Item = Result<PixelImage, E>>,
  {
    let mut kept: Vec<SampledFrame> = Vec::new();
    let mut total = 0u64;

    for (index, frame) in frames.into_iter().enumerate() {
      let image = frame?;
      total += 1;
      let keep = match kept.last() {
        None => true,
        Some(last) => mean_abs_diff(&last.image, &image)
          .map(|diff| diff > self.threshold)
          .unwrap_or(true),
      };
      if keep {
        kept.push(SampledFrame {
          index: index as u64,
          image,
        });
      }
    }

    debug!("共 {} 帧, 保留 {} 个关键帧", total, kept.len());
    Ok((kept, total))
  }
}

// 两帧尺寸一致时返回归一化到 [0, 1] 的平均绝对差
fn mean_abs_diff(a: &PixelImage, b: &PixelImage) -> Option<f32> {
  if a.dimensions() != b.dimensions() {
    return None;
  }
  let raw_a = a.as_raw();
  let raw_b = b.as_raw();
  if raw_a.is_empty() {
    return Some(0.0);
  }
  let sum: u64 = raw_a
    .iter()
    .zip(raw_b.iter())
    .map(|(&x, &y)| x.abs_diff(y) as u64)
    .sum();
  Some(sum as f32 / (raw_a.len() as f32 * 255.0))
}

#[cfg(test)]
mod tests {
  use std::convert::Infallible;

  use image::Rgb;

  use super::*;

  fn solid(value: u8) -> Result<PixelImage, Infallible> {
    Ok(PixelImage::from_pixel(4, 4, Rgb([value; 3])))
  }

  #[test]
  fn keeps_first_and_changed_frames() {
    let frames = vec![solid(0), solid(1), solid(2), solid(200), solid(201), solid(10)];
    let (kept, total) = InterestFilter::default().select(frames).unwrap();
    assert_eq!(total, 6);
    let indices: Vec<u64> = kept.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![0, 3, 5]);
  }

  #[test]
  fn zero_threshold_keeps_every_changed_frame() {
    let frames = vec![solid(0), solid(0), solid(1)];
    let (kept, _) = InterestFilter::default()
      .with_threshold(0.0)
      .select(frames)
      .unwrap();
    let indices: Vec<u64> = kept.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![0, 2]);
  }

  #[test]
  fn resized_frame_is_kept() {
    let frames: Vec<Result<PixelImage, Infallible>> = vec![
      Ok(PixelImage::new(4, 4)),
      Ok(PixelImage::new(8, 4)),
    ];
    let (kept, _) = InterestFilter::default().select(frames).unwrap();
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn decode_failure_aborts() {
    #[derive(Debug, PartialEq)]
    struct Broken;
    let frames = vec![Ok(PixelImage::new(2, 2)), Err(Broken)];
    let err = InterestFilter::default().select(frames).unwrap_err();
    assert_eq!(err, Broken);
  }
}
