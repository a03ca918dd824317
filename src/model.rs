// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/model.rs - 模型
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

use crate::frame::NormalizedImage;

/// 检测模型
///
/// 模型被视为黑盒：输入一批归一化图像，按顺序为每张图像返回一组原始
/// (框, 分数, 类别索引)。框坐标位于归一化图像的坐标系中。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, batch: &[NormalizedImage]) -> Result<Vec<RawDetections>, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Error = M::Error;

  fn infer(&self, batch: &[NormalizedImage]) -> Result<Vec<RawDetections>, Self::Error> {
    (**self).infer(batch)
  }
}

/// 单张图像的原始模型输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetections {
  pub boxes: Vec<[f32; 4]>, // [x_min, y_min, x_max, y_max]
  pub scores: Vec<f32>,
  pub labels: Vec<i64>,
}

impl RawDetections {
  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }

  pub fn push(&mut self, bbox: [f32; 4], score: f32, label: i64) {
    self.boxes.push(bbox);
    self.scores.push(score);
    self.labels.push(label);
  }
}

// 截断取整前的容差，抵消 rescale/descale 往返的浮点误差
const DESCALE_TOLERANCE: f64 = 1e-4;

/// 原图坐标系下的整数检测框
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct DetectionBox {
  pub x_min: i32,
  pub y_min: i32,
  pub x_max: i32,
  pub y_max: i32,
}

impl From<[i32; 4]> for DetectionBox {
  fn from([x0, y0, x1, y1]: [i32; 4]) -> Self {
    DetectionBox::new(x0, y0, x1, y1)
  }
}

impl From<DetectionBox> for [i32; 4] {
  fn from(bbox: DetectionBox) -> Self {
    [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max]
  }
}

impl DetectionBox {
  /// 构造检测框，两个角点的顺序无关
  pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
    Self {
      x_min: x0.min(x1),
      y_min: y0.min(y1),
      x_max: x0.max(x1),
      y_max: y0.max(y1),
    }
  }

  /// 将模型坐标除以缩放比例，并向零截断为整数像素坐标
  pub fn from_scaled(raw: [f32; 4], scale: f32) -> Self {
    let scale = scale as f64;
    let descale = |v: f32| {
      let v = v as f64 / scale;
      let v = v + DESCALE_TOLERANCE.copysign(v);
      v.trunc().clamp(i32::MIN as f64, i32::MAX as f64) as i32
    };
    DetectionBox::new(
      descale(raw[0]),
      descale(raw[1]),
      descale(raw[2]),
      descale(raw[3]),
    )
  }

  /// 映射回缩放后的模型坐标系
  pub fn to_scaled(&self, scale: f32) -> [f32; 4] {
    [
      self.x_min as f32 * scale,
      self.y_min as f32 * scale,
      self.x_max as f32 * scale,
      self.y_max as f32 * scale,
    ]
  }

  pub fn width(&self) -> u32 {
    self.x_max.abs_diff(self.x_min)
  }

  pub fn height(&self) -> u32 {
    self.y_max.abs_diff(self.y_min)
  }

  pub fn is_empty(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }

  /// 裁剪到图像范围内，裁剪后为空则返回 None
  pub fn clamp(&self, width: u32, height: u32) -> Option<DetectionBox> {
    let w = width.min(i32::MAX as u32) as i32;
    let h = height.min(i32::MAX as u32) as i32;
    let clamped = DetectionBox {
      x_min: self.x_min.clamp(0, w),
      y_min: self.y_min.clamp(0, h),
      x_max: self.x_max.clamp(0, w),
      y_max: self.y_max.clamp(0, h),
    };
    (!clamped.is_empty()).then_some(clamped)
  }
}

/// 一个带类别与分数的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  #[serde(rename = "box")]
  pub bbox: DetectionBox,
  pub score: f32,
  pub label: String,
}

impl Detection {
  pub fn new(bbox: DetectionBox, score: f32, label: impl Into<String>) -> Self {
    Self {
      bbox,
      score,
      label: label.into(),
    }
  }
}

mod variant;
mod vocabulary;
pub use self::variant::{ModelResources, ModelVariant};
pub use self::vocabulary::LabelVocabulary;

#[cfg(feature = "rknn_backend")]
mod rknn;
#[cfg(feature = "rknn_backend")]
pub use self::rknn::{RknnModelError, RknnRetinaNet, RknnRetinaNetBuilder};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn box_corners_are_ordered() {
    let bbox = DetectionBox::new(50, 60, 10, 20);
    assert_eq!(bbox, DetectionBox::new(10, 20, 50, 60));
    assert_eq!(bbox.width(), 40);
    assert_eq!(bbox.height(), 40);
  }

  #[test]
  fn descale_truncates_toward_zero() {
    let bbox = DetectionBox::from_scaled([21.0, 31.0, 99.9, 100.0], 2.0);
    assert_eq!(bbox, DetectionBox::new(10, 15, 49, 50));
  }

  #[test]
  fn rescale_round_trip() {
    let boxes = [
      DetectionBox::new(0, 0, 1, 1),
      DetectionBox::new(10, 10, 50, 50),
      DetectionBox::new(13, 7, 641, 479),
      DetectionBox::new(123, 456, 789, 1011),
    ];
    for scale in [0.3f32, 0.75, 1.0, 1.3, 1.6666666, 3.1415927, 13.333333] {
      for bbox in boxes {
        let back = DetectionBox::from_scaled(bbox.to_scaled(scale), scale);
        assert_eq!(back, bbox, "scale {}", scale);
      }
    }
  }

  #[test]
  fn clamp_to_image_bounds() {
    let bbox = DetectionBox::new(-10, -5, 120, 80);
    assert_eq!(bbox.clamp(100, 100), Some(DetectionBox::new(0, 0, 100, 80)));

    let outside = DetectionBox::new(150, 150, 200, 200);
    assert_eq!(outside.clamp(100, 100), None);

    let degenerate = DetectionBox::new(10, 10, 10, 40);
    assert_eq!(degenerate.clamp(100, 100), None);
  }

  #[test]
  fn detection_serializes_box_as_list() {
    let detection = Detection::new(DetectionBox::new(1, 2, 3, 4), 0.75, "EXPOSED_BELLY");
    let json = serde_json::to_value(&detection).unwrap();
    assert_eq!(json["box"], serde_json::json!([1, 2, 3, 4]));
    assert_eq!(json["label"], "EXPOSED_BELLY");

    let back: Detection = serde_json::from_value(json).unwrap();
    assert_eq!(back, detection);
  }
}
