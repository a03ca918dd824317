// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/censor.rs - 马赛克与印章遮挡
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

use std::{collections::HashSet, path::Path};

use image::{
  ImageReader, Rgb, RgbaImage,
  imageops::{self, FilterType},
};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};
use tracing::{debug, info};

use crate::{
  error::{Error, Result},
  frame::PixelImage,
  model::{Detection, DetectionBox},
};

pub const DEFAULT_PIXEL_BLOCKS: u32 = 7;
/// 需要盖印章的类别，同时也是最后处理的类别
pub const STAMPED_LABEL: &str = "EXPOSED_GENITALIA_F";

/// 批量处理目录时默认遮挡的类别
pub const DEFAULT_CENSORED_LABELS: [&str; 7] = [
  "EXPOSED_BUTTOCKS",
  "EXPOSED_BREAST_F",
  "EXPOSED_GENITALIA_F",
  "EXPOSED_ANUS",
  "COVERED_BUTTOCKS",
  "COVERED_BREAST_F",
  "COVERED_GENITALIA_F",
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LabelFilter {
  /// 处理所有检测结果
  #[default]
  All,
  /// 只处理集合中的类别，空集合不处理任何结果
  Only(HashSet<String>),
}

impl LabelFilter {
  pub fn only<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    LabelFilter::Only(labels.into_iter().map(Into::into).collect())
  }

  pub fn accepts(&self, label: &str) -> bool {
    match self {
      LabelFilter::All => true,
      LabelFilter::Only(labels) => labels.contains(label),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CensorPolicy {
  pub labels: LabelFilter,
  pub apply_stamp: bool,
}

impl CensorPolicy {
  pub fn new(labels: LabelFilter) -> Self {
    Self {
      labels,
      apply_stamp: false,
    }
  }

  /// 按类别列表构造策略，空列表表示处理全部类别
  pub fn from_labels<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let labels: HashSet<String> = labels.into_iter().map(Into::into).collect();
    if labels.is_empty() {
      Self::new(LabelFilter::All)
    } else {
      Self::new(LabelFilter::Only(labels))
    }
  }

  pub fn with_stamp(mut self, apply_stamp: bool) -> Self {
    self.apply_stamp = apply_stamp;
    self
  }
}

/// 叠加在遮挡区域上的 RGBA 印章
#[derive(Debug, Clone)]
pub struct Stamp {
  image: RgbaImage,
}

impl Stamp {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let unavailable =
      |e: &dyn std::fmt::Display| Error::ResourceUnavailable(format!("无法加载印章 {}: {}", path.display(), e));
    let image = ImageReader::open(path)
      .map_err(|e| unavailable(&e))?
      .with_guessed_format()
      .map_err(|e| unavailable(&e))?
      .decode()
      .map_err(|e| unavailable(&e))?
      .to_rgba8();
    info!("加载印章 {}: {}x{}", path.display(), image.width(), image.height());
    Ok(Self::from_rgba(image))
  }

  pub fn from_rgba(image: RgbaImage) -> Self {
    Self { image }
  }

  pub fn image(&self) -> &RgbaImage {
    &self.image
  }

  fn scaled(&self, side: u32) -> RgbaImage {
    imageops::resize(&self.image, side, side, FilterType::Triangle)
  }
}

/// 遮挡引擎
#[derive(Debug, Clone)]
pub struct Censor {
  blocks: u32,
  stamped_label: String,
}

impl Default for Censor {
  fn default() -> Self {
    Self {
      blocks: DEFAULT_PIXEL_BLOCKS,
      stamped_label: STAMPED_LABEL.to_string(),
    }
  }
}

impl Censor {
  pub fn with_blocks(mut self, blocks: u32) -> Self {
    self.blocks = blocks.max(1);
    self
  }

  pub fn with_stamped_label(mut self, label: impl Into<String>) -> Self {
    self.stamped_label = label.into();
    self
  }

  /// 过滤并排序：需要盖印章的类别移到最后，其余保持原有相对顺序，
  /// 保证印章不会被后续的马赛克覆盖
  pub fn order<'d>(&self, detections: &'d [Detection], policy: &CensorPolicy) -> Vec<&'d Detection> {
    let (mut ordered, stamped): (Vec<&Detection>, Vec<&Detection>) = detections
      .iter()
      .filter(|d| policy.labels.accepts(&d.label))
      .partition(|d| d.label != self.stamped_label);
    ordered.extend(stamped);
    ordered
  }

  /// 在原图上原地遮挡检测区域
  pub fn censor<'i>(
    &self,
    image: &'i mut PixelImage,
    detections: &[Detection],
    policy: &CensorPolicy,
    stamp: Option<&Stamp>,
  ) -> &'i mut PixelImage {
    let ordered = self.order(detections, policy);
    debug!("遮挡 {}/{} 个区域", ordered.len(), detections.len());

    for detection in ordered {
      let Some(region) = detection.bbox.clamp(image.width(), image.height()) else {
        debug!("跳过空区域: {:?}", detection.bbox);
        continue;
      };

      pixelate(image, &region, self.blocks);

      if policy.apply_stamp
        && detection.label == self.stamped_label
        && let Some(stamp) = stamp
      {
        overlay_stamp(image, &region, stamp);
      }
    }

    image
  }
}

/// 把区域均分为 `blocks`×`blocks` 个块，每块填充为块内均值
///
/// 块边界为 `floor(i * extent / blocks)`，区域小于块数时部分块面积为零，直接跳过。
pub fn pixelate(image: &mut PixelImage, region: &DetectionBox, blocks: u32) {
  let Some(region) = region.clamp(image.width(), image.height()) else {
    return;
  };
  let blocks = blocks.max(1) as u64;
  let (x0, y0) = (region.x_min as u32, region.y_min as u32);
  let steps = |extent: u32| -> Vec<u32> {
    (0..=blocks)
      .map(|i| (i * extent as u64 / blocks) as u32)
      .collect()
  };
  let x_steps = steps(region.width());
  let y_steps = steps(region.height());

  for ys in y_steps.windows(2) {
    for xs in x_steps.windows(2) {
      let (block_w, block_h) = (xs[1] - xs[0], ys[1] - ys[0]);
      if block_w == 0 || block_h == 0 {
        continue;
      }
      let (bx, by) = (x0 + xs[0], y0 + ys[0]);
      let mean = block_mean(image, bx, by, block_w, block_h);
      let rect = Rect::at(bx as i32, by as i32).of_size(block_w, block_h);
      draw_filled_rect_mut(image, rect, Rgb(mean));
    }
  }
}

// 按通道求均值并向下取整
fn block_mean(image: &PixelImage, x: u32, y: u32, width: u32, height: u32) -> [u8; 3] {
  let mut sum = [0u64; 3];
  for py in y..y + height {
    for px in x..x + width {
      let pixel = image.get_pixel(px, py);
      for (acc, &value) in sum.iter_mut().zip(pixel.0.iter()) {
        *acc += value as u64;
      }
    }
  }
  let count = width as u64 * height as u64;
  sum.map(|s| (s / count) as u8)
}

/// 将印章缩放为区域宽高的平均边长，居中后按印章自身的 alpha 通道混合
fn overlay_stamp(image: &mut PixelImage, region: &DetectionBox, stamp: &Stamp) {
  let (width, height) = (region.width() as i64, region.height() as i64);
  let side = (width + height) / 2;
  if side <= 0 {
    return;
  }

  // 非正方形区域时偏移量可能为负，向零截断
  let offset_x = region.x_min as i64 + (width - side) / 2;
  let offset_y = region.y_min as i64 + (height - side) / 2;
  let scaled = stamp.scaled(side as u32);
  debug!(
    "叠加印章: {}x{} at ({}, {})",
    side, side, offset_x, offset_y
  );

  let (image_w, image_h) = (image.width() as i64, image.height() as i64);
  for (sx, sy, pixel) in scaled.enumerate_pixels() {
    let (ix, iy) = (offset_x + sx as i64, offset_y + sy as i64);
    if ix < 0 || iy < 0 || ix >= image_w || iy >= image_h {
      continue;
    }
    let [r, g, b, a] = pixel.0;
    let alpha = a as f32 / 255.0;
    let target = image.get_pixel_mut(ix as u32, iy as u32);
    for (dst, src) in target.0.iter_mut().zip([r, g, b]) {
      *dst = (alpha * src as f32 + (1.0 - alpha) * *dst as f32) as u8;
    }
  }
}

#[cfg(test)]
mod tests {
  use image::Rgba;

  use super::*;

  fn detection(label: &str, bbox: (i32, i32, i32, i32)) -> Detection {
    Detection::new(DetectionBox::new(bbox.0, bbox.1, bbox.2, bbox.3), 0.9, label)
  }

  fn gradient(width: u32, height: u32) -> PixelImage {
    PixelImage::from_fn(width, height, |x, y| {
      Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8])
    })
  }

  #[test]
  fn stamped_label_is_processed_last() {
    let detections = vec![
      detection("EXPOSED_GENITALIA_F", (0, 0, 10, 10)),
      detection("EXPOSED_BUTTOCKS", (5, 5, 15, 15)),
      detection("EXPOSED_BREAST_F", (0, 0, 3, 3)),
    ];
    let ordered = Censor::default().order(&detections, &CensorPolicy::default());
    let labels: Vec<&str> = ordered.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(
      labels,
      vec!["EXPOSED_BUTTOCKS", "EXPOSED_BREAST_F", "EXPOSED_GENITALIA_F"]
    );

    let reversed = vec![detections[1].clone(), detections[0].clone()];
    let ordered = Censor::default().order(&reversed, &CensorPolicy::default());
    assert_eq!(ordered[0].label, "EXPOSED_BUTTOCKS");
    assert_eq!(ordered[1].label, "EXPOSED_GENITALIA_F");
  }

  #[test]
  fn filter_selects_labels() {
    let detections = vec![
      detection("EXPOSED_FEET", (0, 0, 10, 10)),
      detection("EXPOSED_BUTTOCKS", (5, 5, 15, 15)),
    ];
    let policy = CensorPolicy::new(LabelFilter::only(["EXPOSED_BUTTOCKS"]));
    let ordered = Censor::default().order(&detections, &policy);
    assert_eq!(ordered.len(), 1);
    assert_eq!(ordered[0].label, "EXPOSED_BUTTOCKS");

    let nothing = CensorPolicy::new(LabelFilter::Only(HashSet::new()));
    assert!(Censor::default().order(&detections, &nothing).is_empty());

    let everything = CensorPolicy::from_labels(Vec::<String>::new());
    assert_eq!(everything.labels, LabelFilter::All);
    assert_eq!(Censor::default().order(&detections, &everything).len(), 2);
  }

  #[test]
  fn solid_region_becomes_its_mean() {
    let mut image = PixelImage::from_pixel(100, 100, Rgb([40, 90, 200]));
    let original = image.clone();
    let detections = vec![detection("TEST", (10, 10, 50, 50))];
    let policy = CensorPolicy::from_labels(["TEST"]);
    Censor::default().censor(&mut image, &detections, &policy, None);

    for (x, y, pixel) in image.enumerate_pixels() {
      if (10..50).contains(&x) && (10..50).contains(&y) {
        assert_eq!(pixel.0, [40, 90, 200]);
      } else {
        assert_eq!(pixel, original.get_pixel(x, y));
      }
    }
  }

  #[test]
  fn blocks_hold_block_means_and_outside_is_untouched() {
    let mut image = gradient(64, 48);
    let original = image.clone();
    let region = DetectionBox::new(8, 4, 36, 32);
    pixelate(&mut image, &region, 7);

    // 28x28 区域按 7 块均分，每块 4x4
    for by in 0..7u32 {
      for bx in 0..7u32 {
        let (x, y) = (8 + bx * 4, 4 + by * 4);
        let mut sum = [0u64; 3];
        for py in y..y + 4 {
          for px in x..x + 4 {
            for c in 0..3 {
              sum[c] += original.get_pixel(px, py)[c] as u64;
            }
          }
        }
        let mean = sum.map(|s| (s / 16) as u8);
        for py in y..y + 4 {
          for px in x..x + 4 {
            assert_eq!(image.get_pixel(px, py).0, mean);
          }
        }
      }
    }

    for (x, y, pixel) in image.enumerate_pixels() {
      if !((8..36).contains(&x) && (4..32).contains(&y)) {
        assert_eq!(pixel, original.get_pixel(x, y));
      }
    }
  }

  #[test]
  fn pixelation_is_idempotent() {
    let mut image = gradient(80, 60);
    let region = DetectionBox::new(3, 5, 70, 41);
    pixelate(&mut image, &region, 7);
    let once = image.clone();
    pixelate(&mut image, &region, 7);
    assert_eq!(image, once);
  }

  #[test]
  fn tiny_region_does_not_panic() {
    let mut image = gradient(10, 10);
    let original = image.clone();
    pixelate(&mut image, &DetectionBox::new(2, 2, 5, 4), 7);
    // 3x2 区域里部分块面积为零，其余块各只有一个像素，均值等于自身
    assert_eq!(image, original);
  }

  #[test]
  fn degenerate_and_outside_boxes_are_skipped() {
    let mut image = gradient(20, 20);
    let original = image.clone();
    let detections = vec![
      detection("A", (5, 5, 5, 15)),
      detection("B", (30, 30, 40, 40)),
      detection("C", (-10, -10, 0, 0)),
    ];
    Censor::default().censor(&mut image, &detections, &CensorPolicy::default(), None);
    assert_eq!(image, original);
  }

  #[test]
  fn box_crossing_the_border_is_clamped() {
    let mut image = PixelImage::from_pixel(20, 20, Rgb([10, 20, 30]));
    image.put_pixel(19, 19, Rgb([250, 250, 250]));
    let detections = vec![detection("A", (15, 15, 40, 40))];
    Censor::default()
      .with_blocks(1)
      .censor(&mut image, &detections, &CensorPolicy::default(), None);

    let expected = [
      ((10 * 24 + 250) / 25) as u8,
      ((20 * 24 + 250) / 25) as u8,
      ((30 * 24 + 250) / 25) as u8,
    ];
    assert_eq!(image.get_pixel(15, 15).0, expected);
    assert_eq!(image.get_pixel(19, 19).0, expected);
    assert_eq!(image.get_pixel(14, 14).0, [10, 20, 30]);
  }

  #[test]
  fn opaque_stamp_covers_centered_square() {
    let mut image = PixelImage::from_pixel(40, 40, Rgb([0, 0, 255]));
    let stamp = Stamp::from_rgba(RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])));
    // 宽 20 高 10，正方形边长 15，x 偏移 10 + 2，y 偏移 10 + (-2)
    let detections = vec![detection(STAMPED_LABEL, (10, 10, 30, 20))];
    let policy = CensorPolicy::default().with_stamp(true);
    Censor::default().censor(&mut image, &detections, &policy, Some(&stamp));

    let center = image.get_pixel(19, 15).0;
    assert!(center[0] >= 250 && center[2] <= 5, "{:?}", center);
    let corner = image.get_pixel(12, 8).0;
    assert!(corner[0] >= 250, "{:?}", corner);
    assert_eq!(image.get_pixel(11, 15).0, [0, 0, 255]);
    assert_eq!(image.get_pixel(27, 15).0, [0, 0, 255]);
  }

  #[test]
  fn transparent_stamp_leaves_pixelation() {
    let mut stamped = gradient(40, 40);
    let mut plain = stamped.clone();
    let stamp = Stamp::from_rgba(RgbaImage::from_pixel(6, 6, Rgba([255, 255, 255, 0])));
    let detections = vec![detection(STAMPED_LABEL, (5, 5, 25, 25))];

    let censor = Censor::default();
    censor.censor(
      &mut stamped,
      &detections,
      &CensorPolicy::default().with_stamp(true),
      Some(&stamp),
    );
    censor.censor(&mut plain, &detections, &CensorPolicy::default(), None);
    assert_eq!(stamped, plain);
  }

  #[test]
  fn stamp_only_applies_to_stamped_label() {
    let mut image = PixelImage::from_pixel(30, 30, Rgb([0, 0, 0]));
    let stamp = Stamp::from_rgba(RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])));
    let detections = vec![detection("EXPOSED_BUTTOCKS", (5, 5, 25, 25))];
    let policy = CensorPolicy::default().with_stamp(true);
    Censor::default().censor(&mut image, &detections, &policy, Some(&stamp));
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
  }

  #[test]
  fn half_transparent_stamp_blends() {
    let mut image = PixelImage::from_pixel(20, 20, Rgb([0, 0, 0]));
    let stamp = Stamp::from_rgba(RgbaImage::from_pixel(4, 4, Rgba([200, 100, 50, 128])));
    overlay_stamp(&mut image, &DetectionBox::new(0, 0, 10, 10), &stamp);
    let alpha = 128.0f32 / 255.0;
    let expected = [
      (alpha * 200.0) as u8,
      (alpha * 100.0) as u8,
      (alpha * 50.0) as u8,
    ];
    let pixel = image.get_pixel(5, 5).0;
    for c in 0..3 {
      assert!(pixel[c].abs_diff(expected[c]) <= 1, "{:?} vs {:?}", pixel, expected);
    }
  }

  #[test]
  fn missing_stamp_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = Stamp::open(dir.path().join("stamp.png")).unwrap_err();
    assert!(matches!(err, Error::ResourceUnavailable(_)));
  }
}
