// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/task.rs - 遮挡任务
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

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::{
  censor::{CensorPolicy, Stamp},
  detector::Detector,
  model::Model,
  output::{OutputWrapper, SaveImageFileOutput},
};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub trait Task<I, D, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, detector: D, output: O) -> Result<Self::Output, Self::Error>;
}

/// 递归收集目录下的 jpg/jpeg/png 文件，按路径排序
pub fn collect_images<P: AsRef<Path>>(directory: P) -> std::io::Result<Vec<PathBuf>> {
  let mut found = Vec::new();
  let mut pending = vec![directory.as_ref().to_path_buf()];

  while let Some(dir) = pending.pop() {
    for entry in std::fs::read_dir(&dir)? {
      let path = entry?.path();
      if path.is_dir() {
        pending.push(path);
      } else if is_image_file(&path) {
        found.push(path);
      }
    }
  }

  found.sort();
  Ok(found)
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// 遮挡单张图像
pub struct OneShotCensorTask {
  policy: CensorPolicy,
  stamp: Option<Stamp>,
}

impl OneShotCensorTask {
  pub fn new(policy: CensorPolicy) -> Self {
    Self { policy, stamp: None }
  }

  pub fn with_stamp(mut self, stamp: Option<Stamp>) -> Self {
    self.stamp = stamp;
    self
  }
}

impl<'a, M: Model> Task<&'a Path, &'a Detector<M>, Option<&'a OutputWrapper>> for OneShotCensorTask {
  type Output = bool;
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: &'a Path,
    detector: &'a Detector<M>,
    output: Option<&'a OutputWrapper>,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let now = std::time::Instant::now();
    let censored = detector.censor(input, output, &self.policy, self.stamp.as_ref())?;
    info!("任务完成，耗时: {:.2?}", now.elapsed());
    Ok(censored.is_some())
  }
}

/// 目录遮挡统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CensorSummary {
  pub censored: usize,
  pub failed: Vec<PathBuf>,
}

/// 遮挡目录中的所有图像，输出保持相对路径
///
/// 单个文件失败只记录错误并继续，失败文件列在返回的统计中。
pub struct CensorDirectoryTask {
  policy: CensorPolicy,
  stamp: Option<Stamp>,
}

impl CensorDirectoryTask {
  pub fn new(policy: CensorPolicy) -> Self {
    Self { policy, stamp: None }
  }

  pub fn with_stamp(mut self, stamp: Option<Stamp>) -> Self {
    self.stamp = stamp;
    self
  }
}

impl<'a, M: Model> Task<&'a Path, &'a Detector<M>, &'a Path> for CensorDirectoryTask {
  type Output = CensorSummary;
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: &'a Path,
    detector: &'a Detector<M>,
    output: &'a Path,
  ) -> Result<Self::Output, Self::Error> {
    let images = collect_images(input)?;
    info!("目录 {} 中共有 {} 张图像", input.display(), images.len());
    if images.is_empty() {
      warn!("没有可处理的图像");
    }

    let mut summary = CensorSummary::default();
    for (index, path) in images.iter().enumerate() {
      let relative = path.strip_prefix(input).unwrap_or(path);
      let target = OutputWrapper::from(SaveImageFileOutput::new(output.join(relative)));

      info!("处理第 {}/{} 张: {}", index + 1, images.len(), relative.display());
      match detector.censor(path, Some(&target), &self.policy, self.stamp.as_ref()) {
        Ok(_) => summary.censored += 1,
        Err(e) => {
          error!("遮挡 {} 失败: {}", path.display(), e);
          summary.failed.push(path.clone());
        }
      }
    }

    info!(
      "任务完成: 成功 {} 张, 失败 {} 张",
      summary.censored,
      summary.failed.len()
    );
    Ok(summary)
  }
}
