// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::{
  borrow::Cow,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::PixelImage,
  model::Detection,
  output::{Render, draw::Draw},
};

/// 把遮挡后的图像写入单个文件
///
/// URL 形如 `image:///path/to/out.png`，附带 `?annotate` 时额外画出检测框。
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Option<Draw>,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let annotate = uri.query_pairs().any(|(k, _)| k == "annotate");
    Ok(SaveImageFileOutput::new(uri.path()).with_annotate(annotate))
  }
}

impl SaveImageFileOutput {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      draw: None,
    }
  }

  pub fn with_annotate(mut self, annotate: bool) -> Self {
    self.draw = annotate.then(Draw::default);
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &PixelImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, image: &PixelImage, detections: &[Detection]) -> Result<(), Self::Error> {
    let image = match &self.draw {
      Some(draw) => {
        let mut annotated = image.clone();
        draw.draw_detections(&mut annotated, detections);
        Cow::Owned(annotated)
      }
      None => Cow::Borrowed(image),
    };
    self.save_image(&image)
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;
  use crate::model::DetectionBox;

  #[test]
  fn saves_into_nested_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/out.png");
    let output = SaveImageFileOutput::new(&path);
    let image = PixelImage::from_pixel(6, 4, Rgb([1, 2, 3]));
    output.render_result(&image, &[]).unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved, image);
  }

  #[test]
  fn annotate_draws_on_a_copy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotated.png");
    let output = SaveImageFileOutput::new(&path).with_annotate(true);
    let image = PixelImage::from_pixel(10, 10, Rgb([0, 0, 0]));
    let detections = vec![Detection::new(DetectionBox::new(1, 1, 8, 8), 0.9, "A")];
    output.render_result(&image, &detections).unwrap();

    assert_eq!(image.get_pixel(1, 1).0, [0, 0, 0]);
    let saved = image::open(&path).unwrap().to_rgb8();
    assert_ne!(saved.get_pixel(1, 1).0, [0, 0, 0]);
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
