// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/input/read_image_file.rs - 图像文件与像素缓冲输入
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

use std::{borrow::Cow, path::Path};

use image::{ImageReader, Rgb};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::PixelImage};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Empty image: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

/// 读取图像文件并转换为 RGB 像素图
pub fn read_image<P: AsRef<Path>>(path: P) -> Result<PixelImage, ImageFileInputError> {
  let path = path.as_ref();
  let image = ImageReader::open(path)?
    .with_guessed_format()?
    .decode()?
    .to_rgb8();

  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(ImageFileInputError::EmptyImage { width, height });
  }
  debug!("读取图像 {}: {}x{}", path.display(), width, height);
  Ok(image)
}

/// 待检测图像的来源
pub enum ImageSource<'a> {
  /// 可解码的图像文件
  File(&'a Path),
  /// 已解码的 RGB 像素图
  Pixels(&'a PixelImage),
  /// 按行排列的 BGR 原始缓冲，常见于视频解码器
  Bgr {
    data: &'a [u8],
    width: u32,
    height: u32,
  },
}

impl<'a> From<&'a Path> for ImageSource<'a> {
  fn from(path: &'a Path) -> Self {
    ImageSource::File(path)
  }
}

impl<'a> From<&'a PixelImage> for ImageSource<'a> {
  fn from(image: &'a PixelImage) -> Self {
    ImageSource::Pixels(image)
  }
}

impl<'a> ImageSource<'a> {
  pub fn load(self) -> Result<Cow<'a, PixelImage>, ImageFileInputError> {
    match self {
      ImageSource::File(path) => read_image(path).map(Cow::Owned),
      ImageSource::Pixels(image) => {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
          return Err(ImageFileInputError::EmptyImage { width, height });
        }
        Ok(Cow::Borrowed(image))
      }
      ImageSource::Bgr {
        data,
        width,
        height,
      } => {
        if width == 0 || height == 0 {
          return Err(ImageFileInputError::EmptyImage { width, height });
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
          return Err(ImageFileInputError::BufferSizeMismatch {
            expected,
            actual: data.len(),
          });
        }
        let image = PixelImage::from_fn(width, height, |x, y| {
          let idx = (y as usize * width as usize + x as usize) * 3;
          Rgb([data[idx + 2], data[idx + 1], data[idx]])
        });
        Ok(Cow::Owned(image))
      }
    }
  }
}

/// 以 `image:///path/to/file.png` 形式指定的单张图像输入
pub struct ImageFileInput {
  image: Option<PixelImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let image = read_image(url.path())?;
    Ok(ImageFileInput { image: Some(image) })
  }
}

impl Iterator for ImageFileInput {
  type Item = PixelImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}
