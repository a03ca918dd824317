// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/model/vocabulary.rs - 类别表
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

use tracing::debug;

use crate::error::{Error, Result};

/// 按行分隔的类别表，行号即模型输出的类别索引
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary {
  labels: Box<[String]>,
}

impl LabelVocabulary {
  /// 解析类别表，去掉首尾空白并跳过空行
  pub fn parse(text: &str) -> Self {
    let labels = text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(String::from)
      .collect::<Vec<_>>();
    Self {
      labels: labels.into_boxed_slice(),
    }
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
      Error::ResourceUnavailable(format!("无法读取类别表 {}: {}", path.display(), e))
    })?;
    let vocabulary = Self::parse(&text);
    if vocabulary.is_empty() {
      return Err(Error::ResourceUnavailable(format!(
        "类别表为空: {}",
        path.display()
      )));
    }
    debug!("从 {} 加载 {} 个类别", path.display(), vocabulary.len());
    Ok(vocabulary)
  }

  /// 将模型给出的类别索引解析为类别名，负数或越界索引返回 None
  pub fn resolve(&self, index: i64) -> Option<&str> {
    usize::try_from(index)
      .ok()
      .and_then(|i| self.labels.get(i))
      .map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl<S: Into<String>> FromIterator<S> for LabelVocabulary {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let labels = iter.into_iter().map(Into::into).collect::<Vec<_>>();
    Self {
      labels: labels.into_boxed_slice(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_skips_blank_lines() {
    let vocabulary = LabelVocabulary::parse("EXPOSED_ANUS\n\n  EXPOSED_ARMPITS \r\nCOVERED_BELLY\n\n");
    assert_eq!(vocabulary.len(), 3);
    assert_eq!(vocabulary.resolve(1), Some("EXPOSED_ARMPITS"));
    assert_eq!(vocabulary.resolve(2), Some("COVERED_BELLY"));
  }

  #[test]
  fn resolve_rejects_invalid_index() {
    let vocabulary: LabelVocabulary = ["A", "B"].into_iter().collect();
    assert_eq!(vocabulary.resolve(-1), None);
    assert_eq!(vocabulary.resolve(2), None);
    assert_eq!(vocabulary.resolve(0), Some("A"));
  }

  #[test]
  fn missing_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = LabelVocabulary::from_file(dir.path().join("classes")).unwrap_err();
    assert!(matches!(err, Error::ResourceUnavailable(_)));
  }

  #[test]
  fn empty_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("classes");
    std::fs::write(&path, "\n \n").unwrap();
    let err = LabelVocabulary::from_file(&path).unwrap_err();
    assert!(matches!(err, Error::ResourceUnavailable(_)));
  }
}
