// 该文件是 Chewei （车位） 项目的一部分。
// src/foreground.rs - 前景（运动）提取
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

use image::GrayImage;
use thiserror::Error;

use crate::config::DetectorConfig;
use crate::frame::RgbFrame;

mod background;
mod mask;

pub use self::background::{BACKGROUND, BackgroundParams, FOREGROUND, GaussianBackground};
pub use self::mask::{MaskCleanup, MaskParams, motion_ratio};

/// 前景提取器：输入一帧，输出同尺寸的二值掩码（非 0 即运动）
pub trait ForegroundExtractor {
  type Input;
  type Error;

  fn extract(&mut self, input: &Self::Input) -> Result<GrayImage, Self::Error>;
}

#[derive(Error, Debug)]
pub enum ForegroundError {
  #[error("帧尺寸变化: 期望 {expected:?}, 实际 {actual:?}")]
  FrameSizeChanged {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

/// 背景减除 + 掩码清理
pub struct MotionExtractor {
  background: GaussianBackground,
  cleanup: MaskCleanup,
}

impl MotionExtractor {
  pub fn new(background: BackgroundParams, mask: MaskParams) -> Self {
    Self {
      background: GaussianBackground::new(background),
      cleanup: MaskCleanup::new(mask),
    }
  }

  pub fn from_config(config: &DetectorConfig) -> Self {
    Self::new(config.background, config.mask)
  }
}

impl ForegroundExtractor for MotionExtractor {
  type Input = RgbFrame;
  type Error = ForegroundError;

  fn extract(&mut self, input: &RgbFrame) -> Result<GrayImage, Self::Error> {
    let raw = self.background.apply(input.image())?;
    Ok(self.cleanup.apply(&raw))
  }
}
