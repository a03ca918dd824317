// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/aggregate.rs - 检测结果汇总
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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{input::VideoMetadata, model::Detection};

pub enum AggregateMode {
  SingleImage,
  Video(VideoMetadata),
}

/// 视频检测结果
///
/// `preds` 只包含被采样的帧。被采样但没有检测到任何目标的帧对应空列表，
/// 未被采样的帧不会出现。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDetections {
  pub metadata: VideoMetadata,
  pub preds: BTreeMap<u64, Vec<Detection>>,
}

impl VideoDetections {
  /// 该帧是否被评估过
  pub fn is_evaluated(&self, frame_index: u64) -> bool {
    self.preds.contains_key(&frame_index)
  }

  pub fn frame(&self, frame_index: u64) -> Option<&[Detection]> {
    self.preds.get(&frame_index).map(Vec::as_slice)
  }

  pub fn total_detections(&self) -> usize {
    self.preds.values().map(Vec::len).sum()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetectionResult {
  Image(Vec<Detection>),
  Video(VideoDetections),
}

impl DetectionResult {
  pub fn as_image(&self) -> Option<&[Detection]> {
    match self {
      DetectionResult::Image(detections) => Some(detections),
      DetectionResult::Video(_) => None,
    }
  }

  pub fn as_video(&self) -> Option<&VideoDetections> {
    match self {
      DetectionResult::Image(_) => None,
      DetectionResult::Video(video) => Some(video),
    }
  }

  pub fn into_image(self) -> Option<Vec<Detection>> {
    match self {
      DetectionResult::Image(detections) => Some(detections),
      DetectionResult::Video(_) => None,
    }
  }

  pub fn into_video(self) -> Option<VideoDetections> {
    match self {
      DetectionResult::Image(_) => None,
      DetectionResult::Video(video) => Some(video),
    }
  }
}

/// 汇总按帧索引排列的原始结果
///
/// 单图模式下把所有结果按顺序拼接为一个列表；视频模式下按帧索引建表，
/// 同一帧出现多次时按出现顺序追加。
pub fn aggregate(raw: Vec<(u64, Vec<Detection>)>, mode: AggregateMode) -> DetectionResult {
  match mode {
    AggregateMode::SingleImage => {
      DetectionResult::Image(raw.into_iter().flat_map(|(_, detections)| detections).collect())
    }
    AggregateMode::Video(metadata) => {
      let mut preds: BTreeMap<u64, Vec<Detection>> = BTreeMap::new();
      for (frame_index, detections) in raw {
        preds.entry(frame_index).or_default().extend(detections);
      }
      DetectionResult::Video(VideoDetections { metadata, preds })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectionBox;

  fn detection(label: &str) -> Detection {
    Detection::new(DetectionBox::new(0, 0, 4, 4), 0.8, label)
  }

  fn metadata() -> VideoMetadata {
    VideoMetadata {
      fps: 25.0,
      video_length: 100,
      video_path: "clip.mp4".to_string(),
    }
  }

  #[test]
  fn single_image_is_flat() {
    let raw = vec![(0, vec![detection("A"), detection("B")])];
    let result = aggregate(raw, AggregateMode::SingleImage);
    let labels: Vec<&str> = result
      .as_image()
      .unwrap()
      .iter()
      .map(|d| d.label.as_str())
      .collect();
    assert_eq!(labels, vec!["A", "B"]);
  }

  #[test]
  fn unsampled_frames_are_absent() {
    let raw = vec![(0, vec![detection("A")]), (7, vec![]), (30, vec![detection("B")])];
    let result = aggregate(raw, AggregateMode::Video(metadata()));
    let video = result.as_video().unwrap();

    assert!(video.is_evaluated(7));
    assert_eq!(video.frame(7), Some(&[][..]));
    assert!(!video.is_evaluated(1));
    assert_eq!(video.frame(1), None);
    assert_eq!(video.preds.len(), 3);
    assert_eq!(video.total_detections(), 2);
    assert_eq!(video.metadata, metadata());
  }

  #[test]
  fn repeated_frame_appends_in_order() {
    let raw = vec![(5, vec![detection("A")]), (5, vec![detection("B")])];
    let video = aggregate(raw, AggregateMode::Video(metadata()))
      .into_video()
      .unwrap();
    let labels: Vec<&str> = video.preds[&5].iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["A", "B"]);
  }

  #[test]
  fn video_json_shape() {
    let raw = vec![(2, vec![detection("A")])];
    let result = aggregate(raw, AggregateMode::Video(metadata()));
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["metadata"]["fps"], 25.0);
    assert_eq!(json["metadata"]["video_path"], "clip.mp4");
    assert_eq!(json["preds"]["2"][0]["label"], "A");
  }
}
