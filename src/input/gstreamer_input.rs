// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频帧采样
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

//! # GStreamer 视频帧采样
//!
//! 使用 `decodebin` 解码视频文件，逐帧转换为 RGB 像素图，再交给
//! [`InterestFilter`] 挑选关键帧。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use zhezhao::{FromUrl, input::{FrameSampler, GStreamerFrameSampler}};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("gst://file/videos/clip.mp4?threshold=0.1")?;
//! let sampler = GStreamerFrameSampler::from_url(&url)?;
//! let video = sampler.sample("/videos/clip.mp4")?;
//! println!("{} 个关键帧, fps {}", video.frames.len(), video.fps);
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::PixelImage,
  input::{FrameSampler, InterestFilter, SampledVideo},
};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://file/..."）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

/// 基于 GStreamer 的帧采样器
#[derive(Debug, Clone, Default)]
pub struct GStreamerFrameSampler {
  filter: InterestFilter,
}

impl FromUrlWithScheme for GStreamerFrameSampler {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerFrameSampler {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME || url.host_str() != Some("file") {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let mut filter = InterestFilter::default();
    for (k, v) in url.query_pairs() {
      if k == "threshold" {
        match v.parse::<f32>() {
          Ok(threshold) => filter = filter.with_threshold(threshold),
          Err(_) => warn!("忽略无效的关键帧阈值: {}", v),
        }
      }
    }

    Ok(Self { filter })
  }
}

impl GStreamerFrameSampler {
  pub fn new(filter: InterestFilter) -> Self {
    Self { filter }
  }

  fn build_pipeline(
    video_path: &str,
  ) -> Result<(gst::Pipeline, gst_app::AppSink), GStreamerInputError> {
    gst::init()?;

    let description = format!(
      "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGB ! appsink name=sink sync=false",
      video_path.replace('"', "\\\"")
    );
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;
    Ok((pipeline, appsink))
  }

  // 管道停止后检查总线上是否有错误，避免把解码失败当作正常结束
  fn check_bus(pipeline: &gst::Pipeline) -> Result<(), GStreamerInputError> {
    let Some(bus) = pipeline.bus() else {
      return Ok(());
    };
    if let Some(message) = bus.pop_filtered(&[gst::MessageType::Error])
      && let gst::MessageView::Error(err) = message.view()
    {
      error!("GStreamer 管道错误: {}", err.error());
      return Err(GStreamerInputError::PipelineError(err.error().to_string()));
    }
    Ok(())
  }
}

impl FrameSampler for GStreamerFrameSampler {
  type Error = GStreamerInputError;

  fn sample(&self, video_path: &str) -> Result<SampledVideo, Self::Error> {
    let (pipeline, appsink) = Self::build_pipeline(video_path)?;
    let fps = Cell::new(0.0f64);

    let frames = std::iter::from_fn(|| appsink.pull_sample().ok()).map(|sample| {
      let (image, frame_fps) = convert_sample_to_rgb(&sample)?;
      fps.set(frame_fps);
      Ok::<_, GStreamerInputError>(image)
    });
    let selected = self.filter.select(frames);

    let bus_result = Self::check_bus(&pipeline);
    if let Err(e) = pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }

    let (frames, video_length) = selected?;
    bus_result?;

    info!(
      "视频 {}: {} 帧, fps {:.2}, 关键帧 {} 个",
      video_path,
      video_length,
      fps.get(),
      frames.len()
    );

    Ok(SampledVideo {
      frames,
      fps: fps.get(),
      video_length,
    })
  }
}

fn convert_sample_to_rgb(sample: &gst::Sample) -> Result<(PixelImage, f64), GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat);
  }

  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;
  let fps = {
    let fraction = video_info.fps();
    if fraction.denom() == 0 {
      0.0
    } else {
      fraction.numer() as f64 / fraction.denom() as f64
    }
  };

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let row = width as usize * 3;
  let expected = stride * (height as usize).saturating_sub(1) + row;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  // 每行可能带有对齐填充，按 stride 逐行拷贝
  let mut pixels = Vec::with_capacity(row * height as usize);
  for y in 0..height as usize {
    let start = y * stride;
    pixels.extend_from_slice(&data[start..start + row]);
  }

  let image = PixelImage::from_raw(width, height, pixels).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: row * height as usize,
      actual: data.len(),
    },
  )?;
  Ok((image, fps))
}
