// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/frame.rs - 像素帧与归一化张量定义
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

use crate::error::{Error, Result};

/// RGB 顺序的 8 位三通道图像，整条流水线统一使用该通道顺序
pub type PixelImage = image::RgbImage;

const BGR_CHANNELS: usize = 3;

/// 归一化后的 NHWC 浮点帧
///
/// 通道顺序为 BGR，已减去模型要求的通道均值。`scale` 是缩放时使用的比例，
/// 模型返回的所有坐标都必须除以它才能回到原图坐标系。
#[derive(Debug, Clone)]
pub struct NormalizedImage {
  data: Box<[f32]>,
  width: u32,
  height: u32,
  scale: f32,
}

impl NormalizedImage {
  pub fn new(data: Vec<f32>, width: u32, height: u32, scale: f32) -> Result<Self> {
    let expected = BGR_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(Error::InvalidImage(format!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        expected,
        data.len()
      )));
    }

    if !(scale.is_finite() && scale > 0.0) {
      return Err(Error::InvalidImage(format!("缩放比例无效: {}", scale)));
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
      scale,
    })
  }

  pub fn height(&self) -> usize {
    self.height as usize
  }

  pub fn width(&self) -> usize {
    self.width as usize
  }

  pub fn channels(&self) -> usize {
    BGR_CHANNELS
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn as_nhwc(&self) -> &[f32] {
    &self.data
  }
}

/// 采样得到的视频帧
#[derive(Debug, Clone)]
pub struct SampledFrame {
  /// 帧在原视频中的索引
  pub index: u64,
  pub image: PixelImage,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_length_mismatch() {
    let err = NormalizedImage::new(vec![0.0; 5], 2, 1, 1.0).unwrap_err();
    assert!(matches!(err, Error::InvalidImage(_)));
  }

  #[test]
  fn rejects_non_positive_scale() {
    assert!(NormalizedImage::new(vec![0.0; 6], 2, 1, 0.0).is_err());
    assert!(NormalizedImage::new(vec![0.0; 6], 2, 1, -1.0).is_err());
    assert!(NormalizedImage::new(vec![0.0; 6], 2, 1, f32::NAN).is_err());
  }

  #[test]
  fn keeps_shape_and_scale() {
    let frame = NormalizedImage::new(vec![0.0; 24], 4, 2, 2.5).unwrap();
    assert_eq!(frame.width(), 4);
    assert_eq!(frame.height(), 2);
    assert_eq!(frame.channels(), 3);
    assert_eq!(frame.scale(), 2.5);
    assert_eq!(frame.as_nhwc().len(), 24);
  }
}
