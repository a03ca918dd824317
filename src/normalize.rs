// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/normalize.rs - 图像归一化与缩放
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

use image::imageops::{self, FilterType};
use tracing::debug;

use crate::{
  error::{Error, Result},
  frame::{NormalizedImage, PixelImage},
};

const DEFAULT_MIN_SIDE: u32 = 800;
const DEFAULT_MAX_SIDE: u32 = 1333;
// caffe 风格的 BGR 通道均值
const CAFFE_BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// 图像归一化器
///
/// 短边缩放到 `min_side`，若长边因此超过 `max_side` 则改为以长边为准，
/// 保持宽高比。输出张量为 BGR 顺序并减去通道均值。
#[derive(Debug, Clone)]
pub struct Normalizer {
  min_side: u32,
  max_side: u32,
  mean: [f32; 3],
  filter: FilterType,
}

impl Default for Normalizer {
  fn default() -> Self {
    Self {
      min_side: DEFAULT_MIN_SIDE,
      max_side: DEFAULT_MAX_SIDE,
      mean: CAFFE_BGR_MEAN,
      filter: FilterType::Triangle,
    }
  }
}

impl Normalizer {
  pub fn with_sides(mut self, min_side: u32, max_side: u32) -> Self {
    self.min_side = min_side.max(1);
    self.max_side = max_side.max(self.min_side);
    self
  }

  pub fn with_mean(mut self, mean: [f32; 3]) -> Self {
    self.mean = mean;
    self
  }

  pub fn with_filter(mut self, filter: FilterType) -> Self {
    self.filter = filter;
    self
  }

  /// 计算缩放比例，调用方保证宽高非零
  pub fn compute_scale(&self, width: u32, height: u32) -> f32 {
    let smallest = width.min(height) as f32;
    let largest = width.max(height) as f32;
    let mut scale = self.min_side as f32 / smallest;
    if largest * scale > self.max_side as f32 {
      scale = self.max_side as f32 / largest;
    }
    scale
  }

  pub fn normalize(&self, image: &PixelImage) -> Result<NormalizedImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(Error::InvalidImage(format!(
        "图像尺寸为零: {}x{}",
        width, height
      )));
    }

    let scale = self.compute_scale(width, height);
    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    debug!(
      "归一化图像: {}x{} -> {}x{}, 缩放比例 {:.4}",
      width, height, new_width, new_height, scale
    );

    let resized;
    let source = if (new_width, new_height) == (width, height) {
      image
    } else {
      resized = imageops::resize(image, new_width, new_height, self.filter);
      &resized
    };

    let mut data = Vec::with_capacity(3 * new_width as usize * new_height as usize);
    for pixel in source.pixels() {
      let [r, g, b] = pixel.0;
      data.push(b as f32 - self.mean[0]);
      data.push(g as f32 - self.mean[1]);
      data.push(r as f32 - self.mean[2]);
    }

    NormalizedImage::new(data, new_width, new_height, scale)
  }
}
