// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/output/draw.rs - 检测框标注与结果记录
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

use image::Rgb;
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use serde::Serialize;

use crate::{frame::PixelImage, model::Detection};

const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const BOX_THICKNESS: u32 = 2;

/// 在图像上绘制检测框
pub struct Draw {
  color: Rgb<u8>,
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: Rgb(BOX_COLOR),
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = Rgb(color);
    self
  }

  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  pub fn draw_detections(&self, image: &mut PixelImage, detections: &[Detection]) {
    for detection in detections {
      let Some(region) = detection.bbox.clamp(image.width(), image.height()) else {
        continue;
      };

      // 向内逐像素收缩，绘制加粗边框
      for t in 0..self.thickness {
        let (w, h) = (
          region.width().saturating_sub(2 * t),
          region.height().saturating_sub(2 * t),
        );
        if w == 0 || h == 0 {
          break;
        }
        let rect = Rect::at(region.x_min + t as i32, region.y_min + t as i32).of_size(w, h);
        draw_hollow_rect_mut(image, rect, self.color);
      }
    }
  }
}

#[derive(Serialize)]
struct RecordFile<'a> {
  image: &'a str,
  detections: &'a [Detection],
}

/// 将检测结果以 JSON 旁路文件形式记录在图像旁边
pub struct Record;

impl Record {
  pub fn record(&self, detections: &[Detection], image_path: &Path) -> Result<(), std::io::Error> {
    let name = image_path
      .file_name()
      .map(|n| n.to_string_lossy())
      .unwrap_or_default();
    let record = RecordFile {
      image: &name,
      detections,
    };
    let json = serde_json::to_string_pretty(&record).map_err(std::io::Error::other)?;
    std::fs::write(image_path.with_extension("json"), json)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectionBox;

  #[test]
  fn draws_outline_only() {
    let mut image = PixelImage::new(20, 20);
    let detections = vec![Detection::new(DetectionBox::new(2, 2, 12, 12), 0.9, "A")];
    Draw::default().draw_detections(&mut image, &detections);

    assert_eq!(image.get_pixel(2, 2).0, BOX_COLOR);
    assert_eq!(image.get_pixel(3, 7).0, BOX_COLOR);
    assert_eq!(image.get_pixel(7, 7).0, [0, 0, 0]);
    assert_eq!(image.get_pixel(15, 15).0, [0, 0, 0]);
  }

  #[test]
  fn record_writes_json_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shot.png");
    let detections = vec![Detection::new(DetectionBox::new(1, 2, 3, 4), 0.7, "B")];
    Record.record(&detections, &path).unwrap();

    let text = std::fs::read_to_string(dir.path().join("shot.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["image"], "shot.png");
    assert_eq!(json["detections"][0]["box"], serde_json::json!([1, 2, 3, 4]));
  }
}
