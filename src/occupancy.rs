// 该文件是 Chewei （车位） 项目的一部分。
// src/occupancy.rs - 车位占用状态机（滞回 + 去抖）
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

//! # 车位占用状态机
//!
//! 每个车位每帧输入一个前景像素占比 `pct`，状态机据此给出稳定的占用标志：
//!
//! - 空闲时，连续 `enter_frames` 帧 `pct > enter_thresh` 才转为占用；
//! - 占用时，连续 `exit_frames` 帧 `pct < exit_thresh` 才转为空闲；
//! - 任意一帧不满足条件，对应方向的计数立即清零。
//!
//! 两个阈值构成滞回区间，连续帧计数用于去抖。

use serde::Deserialize;

pub const DEFAULT_ENTER_THRESH: f64 = 0.02;
pub const DEFAULT_EXIT_THRESH: f64 = 0.005;
pub const DEFAULT_ENTER_FRAMES: u32 = 5;
pub const DEFAULT_EXIT_FRAMES: u32 = 5;

/// 状态机参数
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OccupancyParams {
  /// 超过该占比视为“进入”证据
  pub enter_thresh: f64,
  /// 低于该占比视为“离开”证据
  pub exit_thresh: f64,
  /// 转为占用所需的连续帧数
  pub enter_frames: u32,
  /// 转为空闲所需的连续帧数
  pub exit_frames: u32,
}

impl Default for OccupancyParams {
  fn default() -> Self {
    Self {
      enter_thresh: DEFAULT_ENTER_THRESH,
      exit_thresh: DEFAULT_EXIT_THRESH,
      enter_frames: DEFAULT_ENTER_FRAMES,
      exit_frames: DEFAULT_EXIT_FRAMES,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occupancy {
  Empty,
  Occupied,
}

impl Occupancy {
  pub fn is_occupied(self) -> bool {
    matches!(self, Occupancy::Occupied)
  }
}

impl From<bool> for Occupancy {
  fn from(occupied: bool) -> Self {
    if occupied {
      Occupancy::Occupied
    } else {
      Occupancy::Empty
    }
  }
}

impl std::fmt::Display for Occupancy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Occupancy::Empty => write!(f, "empty"),
      Occupancy::Occupied => write!(f, "occupied"),
    }
  }
}

/// 单个车位的可变状态
///
/// `enter_streak` 与 `exit_streak` 任意时刻至多一个非零。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotState {
  pub occupied: bool,
  pub enter_streak: u32,
  pub exit_streak: u32,
}

impl SlotState {
  pub fn new(occupied: bool) -> Self {
    Self {
      occupied,
      ..Self::default()
    }
  }

  pub fn status(&self) -> Occupancy {
    Occupancy::from(self.occupied)
  }

  /// 根据本帧前景占比推进一步。
  ///
  /// 纯函数：只依赖上一状态与 `pct`。超出 `[0, 1]` 的 `pct` 原样参与比较。
  pub fn update(self, pct: f64, params: &OccupancyParams) -> Self {
    let mut next = self;

    if !next.occupied {
      if pct > params.enter_thresh {
        next.enter_streak += 1;
        next.exit_streak = 0;
        if next.enter_streak >= params.enter_frames {
          next.occupied = true;
          next.enter_streak = 0;
        }
      } else {
        next.enter_streak = 0;
      }
    } else if pct < params.exit_thresh {
      next.exit_streak += 1;
      next.enter_streak = 0;
      if next.exit_streak >= params.exit_frames {
        next.occupied = false;
        next.exit_streak = 0;
      }
    } else {
      next.exit_streak = 0;
    }

    next
  }

  /// 与 [`SlotState::update`] 相同，另外返回本帧是否发生了状态翻转。
  pub fn update_with_transition(self, pct: f64, params: &OccupancyParams) -> (Self, Option<Occupancy>) {
    let next = self.update(pct, params);
    let transition = (next.occupied != self.occupied).then(|| next.status());
    (next, transition)
  }
}
