// 该文件是 Chewei （车位） 项目的一部分。
// src/config.rs - 检测参数配置
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

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::foreground::{BackgroundParams, MaskParams};
use crate::occupancy::OccupancyParams;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("参数文件解析错误: {0}")]
  ParseError(#[from] serde_yaml::Error),
  #[error("{name} 核尺寸必须是正奇数，实际为 {size}")]
  InvalidKernel { name: &'static str, size: u8 },
  #[error("{name} 必须位于 [0, 1] 区间，实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f64 },
  #[error("背景模型历史长度必须大于 0")]
  ZeroHistory,
  #[error("var_threshold 必须为正的有限数，实际为 {0}")]
  InvalidVarThreshold(f32),
}

/// 全部可调参数，未给出的字段使用默认值
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
  pub background: BackgroundParams,
  pub mask: MaskParams,
  pub occupancy: OccupancyParams,
}

impl DetectorConfig {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let config = Self::from_yaml_str(&raw)?;
    info!("从 {} 加载检测参数: {:?}", path.display(), config);
    Ok(config)
  }

  pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
    let config: Option<DetectorConfig> = serde_yaml::from_str(raw)?;
    let config = config.unwrap_or_default();
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.background.history == 0 {
      return Err(ConfigError::ZeroHistory);
    }
    let var_threshold = self.background.var_threshold;
    if !var_threshold.is_finite() || var_threshold <= 0.0 {
      return Err(ConfigError::InvalidVarThreshold(var_threshold));
    }

    for (name, size) in [
      ("open_kernel", self.mask.open_kernel),
      ("close_kernel", self.mask.close_kernel),
    ] {
      if size % 2 == 0 {
        return Err(ConfigError::InvalidKernel { name, size });
      }
    }

    for (name, value) in [
      ("enter_thresh", self.occupancy.enter_thresh),
      ("exit_thresh", self.occupancy.exit_thresh),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }

    if self.occupancy.enter_thresh <= self.occupancy.exit_thresh {
      warn!(
        "enter_thresh ({}) 不大于 exit_thresh ({})，状态机没有滞回区间",
        self.occupancy.enter_thresh, self.occupancy.exit_thresh
      );
    }

    Ok(())
  }
}
