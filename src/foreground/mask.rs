// 该文件是 Chewei （车位） 项目的一部分。
// src/foreground/mask.rs - 前景掩码清理与车位占比统计
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

use image::{GenericImageView, GrayImage};
use imageproc::contrast::{ThresholdType, threshold};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use serde::Deserialize;

use crate::slot::BoundingBox;

pub const DEFAULT_FG_THRESHOLD: u8 = 200;
pub const DEFAULT_OPEN_KERNEL: u8 = 3;
pub const DEFAULT_CLOSE_KERNEL: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaskParams {
  /// 二值化阈值，严格大于该值视为前景
  pub fg_threshold: u8,
  /// 开运算方形核边长（奇数）
  pub open_kernel: u8,
  /// 闭运算方形核边长（奇数）
  pub close_kernel: u8,
}

impl Default for MaskParams {
  fn default() -> Self {
    Self {
      fg_threshold: DEFAULT_FG_THRESHOLD,
      open_kernel: DEFAULT_OPEN_KERNEL,
      close_kernel: DEFAULT_CLOSE_KERNEL,
    }
  }
}

/// 二值化 + 开运算（去噪）+ 闭运算（补洞）
#[derive(Debug, Clone, Copy)]
pub struct MaskCleanup {
  params: MaskParams,
}

impl MaskCleanup {
  pub fn new(params: MaskParams) -> Self {
    Self { params }
  }

  pub fn apply(&self, mask: &GrayImage) -> GrayImage {
    let binary = threshold(mask, self.params.fg_threshold, ThresholdType::Binary);
    // 边长为 2k+1 的方形核对应 L∞ 半径 k
    let opened = open(&binary, Norm::LInf, self.params.open_kernel / 2);
    close(&opened, Norm::LInf, self.params.close_kernel / 2)
  }
}

/// 包围盒内前景像素数 / 包围盒面积。
///
/// 超出图像的部分按背景计，分母仍是包围盒面积；面积为 0 时返回 0。
pub fn motion_ratio(mask: &GrayImage, bbox: &BoundingBox) -> f64 {
  let area = bbox.area();
  if area == 0 {
    return 0.0;
  }

  let (width, height) = mask.dimensions();
  let x0 = bbox.x.clamp(0, width as i32) as u32;
  let y0 = bbox.y.clamp(0, height as i32) as u32;
  let x1 = (bbox.x as i64 + bbox.width as i64).clamp(0, width as i64) as u32;
  let y1 = (bbox.y as i64 + bbox.height as i64).clamp(0, height as i64) as u32;
  if x1 <= x0 || y1 <= y0 {
    return 0.0;
  }

  let motion = mask
    .view(x0, y0, x1 - x0, y1 - y0)
    .pixels()
    .filter(|(_, _, p)| p[0] != 0)
    .count();

  motion as f64 / area as f64
}
