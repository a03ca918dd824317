// 该文件是 Zhezhao （遮罩） 项目的一部分。
// src/model/variant.rs - 模型变体与本地资源定位
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
  fmt,
  path::{Path, PathBuf},
  str::FromStr,
};

use tracing::{error, info};

use crate::error::{Error, Result};

const MODEL_HOME_DIR: &str = ".zhezhao";
const CHECKPOINT_FILE: &str = "checkpoint";
const CLASSES_FILE: &str = "classes";
const RELEASE_BASE_URL: &str = "https://github.com/notAI-tech/NudeNet/releases/download/v0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelVariant {
  #[default]
  Default,
  Base,
}

impl ModelVariant {
  pub fn name(&self) -> &'static str {
    match self {
      ModelVariant::Default => "default",
      ModelVariant::Base => "base",
    }
  }

  /// 权重的发布地址，仅用于提示用户手动获取
  pub fn checkpoint_url(&self) -> String {
    format!("{}/detector_v2_{}_checkpoint", RELEASE_BASE_URL, self.name())
  }

  pub fn classes_url(&self) -> String {
    format!("{}/detector_v2_{}_classes", RELEASE_BASE_URL, self.name())
  }
}

impl fmt::Display for ModelVariant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for ModelVariant {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "default" => Ok(ModelVariant::Default),
      "base" => Ok(ModelVariant::Base),
      other => Err(Error::Configuration(format!(
        "未知模型变体: {}, 可选: default, base",
        other
      ))),
    }
  }
}

/// 某个模型变体在本地缓存中的权重与类别表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResources {
  pub variant: ModelVariant,
  pub checkpoint: PathBuf,
  pub classes: PathBuf,
}

impl ModelResources {
  /// 在 `~/.zhezhao/<variant>` 下定位资源
  pub fn locate(variant: ModelVariant) -> Result<Self> {
    let home = dirs::home_dir()
      .ok_or_else(|| Error::ResourceUnavailable("无法确定用户主目录".to_string()))?;
    Self::locate_in(home.join(MODEL_HOME_DIR), variant)
  }

  pub fn locate_in<P: AsRef<Path>>(root: P, variant: ModelVariant) -> Result<Self> {
    let folder = root.as_ref().join(variant.name());
    let checkpoint = folder.join(CHECKPOINT_FILE);
    let classes = folder.join(CLASSES_FILE);

    for (path, url) in [
      (&checkpoint, variant.checkpoint_url()),
      (&classes, variant.classes_url()),
    ] {
      if !path.is_file() {
        error!("模型资源缺失: {}", path.display());
        return Err(Error::ResourceUnavailable(format!(
          "{} 不存在, 请从 {} 获取",
          path.display(),
          url
        )));
      }
    }

    info!("使用模型变体 {}: {}", variant, folder.display());
    Ok(Self {
      variant,
      checkpoint,
      classes,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_known_variants() {
    assert_eq!("default".parse::<ModelVariant>().unwrap(), ModelVariant::Default);
    assert_eq!("base".parse::<ModelVariant>().unwrap(), ModelVariant::Base);
  }

  #[test]
  fn unknown_variant_is_configuration_error() {
    let err = "large".parse::<ModelVariant>().unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
  }

  #[test]
  fn locate_requires_both_files() {
    let root = tempfile::tempdir().unwrap();
    let folder = root.path().join("base");
    std::fs::create_dir_all(&folder).unwrap();
    std::fs::write(folder.join("checkpoint"), b"weights").unwrap();

    let err = ModelResources::locate_in(root.path(), ModelVariant::Base).unwrap_err();
    assert!(matches!(err, Error::ResourceUnavailable(_)));

    std::fs::write(folder.join("classes"), "EXPOSED_ANUS\n").unwrap();
    let resources = ModelResources::locate_in(root.path(), ModelVariant::Base).unwrap();
    assert_eq!(resources.checkpoint, folder.join("checkpoint"));
    assert_eq!(resources.classes, folder.join("classes"));
  }
}
