// 该文件是 Chewei （车位） 项目的一部分。
// src/foreground/background.rs - 自适应高斯背景模型
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

use image::{GrayImage, Luma, RgbImage};
use serde::Deserialize;
use tracing::debug;

use super::ForegroundError;

const RGB_CHANNELS: usize = 3;

pub const DEFAULT_HISTORY: u32 = 500;
pub const DEFAULT_VAR_THRESHOLD: f32 = 16.0;

const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundParams {
  /// 参与背景学习的历史帧数
  pub history: u32,
  /// 平方马氏距离阈值
  pub var_threshold: f32,
}

impl Default for BackgroundParams {
  fn default() -> Self {
    Self {
      history: DEFAULT_HISTORY,
      var_threshold: DEFAULT_VAR_THRESHOLD,
    }
  }
}

/// 每像素单高斯背景模型
///
/// 均值按 RGB 三通道维护，方差三通道共享。学习率为 `1 / min(2n, history)`，
/// 前几帧快速收敛，之后按历史长度缓慢更新。
pub struct GaussianBackground {
  params: BackgroundParams,
  width: u32,
  height: u32,
  mean: Vec<f32>,
  variance: Vec<f32>,
  frames_seen: u64,
}

impl GaussianBackground {
  pub fn new(params: BackgroundParams) -> Self {
    Self {
      params,
      width: 0,
      height: 0,
      mean: Vec::new(),
      variance: Vec::new(),
      frames_seen: 0,
    }
  }

  pub fn frames_seen(&self) -> u64 {
    self.frames_seen
  }

  fn learning_rate(&self) -> f32 {
    let window = (2 * self.frames_seen).min(self.params.history as u64).max(1);
    1.0 / window as f32
  }

  fn seed(&mut self, image: &RgbImage) {
    let (width, height) = image.dimensions();
    self.width = width;
    self.height = height;
    self.mean = image.as_raw().iter().map(|&v| v as f32).collect();
    self.variance = vec![VAR_INIT; (width * height) as usize];
    self.frames_seen = 1;
    debug!("背景模型初始化: {}x{}", width, height);
  }

  /// 用新帧更新模型，并返回该帧的前景掩码（0 / 255）。
  ///
  /// 第一帧只用于初始化，返回全背景掩码。MOG2 没有背景模式时会把首帧整帧判为
  /// 前景，这里有意不这样做，空车位的进入计数不会因首帧而从 1 开始。
  pub fn apply(&mut self, image: &RgbImage) -> Result<GrayImage, ForegroundError> {
    let (width, height) = image.dimensions();
    if self.frames_seen == 0 {
      self.seed(image);
      return Ok(GrayImage::new(width, height));
    }

    if (width, height) != (self.width, self.height) {
      return Err(ForegroundError::FrameSizeChanged {
        expected: (self.width, self.height),
        actual: (width, height),
      });
    }

    self.frames_seen += 1;
    let alpha = self.learning_rate();
    let var_threshold = self.params.var_threshold;
    let mut mask = GrayImage::new(width, height);

    let pixels = image.as_raw().chunks_exact(RGB_CHANNELS);
    let means = self.mean.chunks_exact_mut(RGB_CHANNELS);
    for (((pixel, mean), variance), out) in pixels
      .zip(means)
      .zip(self.variance.iter_mut())
      .zip(mask.pixels_mut())
    {
      let mut dist2 = 0.0;
      let mut delta = [0.0f32; RGB_CHANNELS];
      for c in 0..RGB_CHANNELS {
        delta[c] = pixel[c] as f32 - mean[c];
        dist2 += delta[c] * delta[c];
      }

      if dist2 > var_threshold * *variance {
        *out = Luma([FOREGROUND]);
      } else {
        *out = Luma([BACKGROUND]);
      }

      for c in 0..RGB_CHANNELS {
        mean[c] += alpha * delta[c];
      }
      let sample_var = dist2 / RGB_CHANNELS as f32;
      *variance = (*variance + alpha * (sample_var - *variance)).clamp(VAR_MIN, VAR_MAX);
    }

    Ok(mask)
  }
}
