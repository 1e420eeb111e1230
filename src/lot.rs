// 该文件是 Chewei （车位） 项目的一部分。
// src/lot.rs - 停车场：车位与其状态的绑定
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
use tracing::{debug, info};

use crate::foreground::motion_ratio;
use crate::occupancy::{Occupancy, OccupancyParams, SlotState};
use crate::slot::{Slot, SlotId, SlotRegistry};

/// 车位及其当前状态，总是成对出现
#[derive(Debug, Clone)]
pub struct TrackedSlot {
  slot: Slot,
  state: SlotState,
  ratio: f64,
}

impl TrackedSlot {
  fn new(slot: Slot) -> Self {
    let state = SlotState::new(slot.initially_occupied());
    Self {
      slot,
      state,
      ratio: 0.0,
    }
  }

  pub fn slot(&self) -> &Slot {
    &self.slot
  }

  pub fn state(&self) -> &SlotState {
    &self.state
  }

  pub fn status(&self) -> Occupancy {
    self.state.status()
  }

  /// 最近一帧的前景占比
  pub fn ratio(&self) -> f64 {
    self.ratio
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub id: SlotId,
  pub to: Occupancy,
}

#[derive(Debug, Clone)]
pub struct ParkingLot {
  slots: Box<[TrackedSlot]>,
  params: OccupancyParams,
}

impl ParkingLot {
  pub fn new(registry: SlotRegistry, params: OccupancyParams) -> Self {
    let slots = registry
      .into_iter()
      .map(TrackedSlot::new)
      .collect::<Vec<_>>()
      .into_boxed_slice();
    Self { slots, params }
  }

  pub fn params(&self) -> &OccupancyParams {
    &self.params
  }

  pub fn slots(&self) -> &[TrackedSlot] {
    &self.slots
  }

  pub fn get(&self, id: SlotId) -> Option<&TrackedSlot> {
    self.slots.iter().find(|tracked| tracked.slot.id() == id)
  }

  pub fn occupied_count(&self) -> usize {
    self
      .slots
      .iter()
      .filter(|tracked| tracked.state.occupied)
      .count()
  }

  /// 以一帧掩码推进全部车位，返回本帧发生翻转的车位。
  pub fn observe(&mut self, mask: &GrayImage) -> Vec<Transition> {
    let params = self.params;
    let mut transitions = Vec::new();

    for tracked in self.slots.iter_mut() {
      let ratio = motion_ratio(mask, tracked.slot.bbox());
      let (state, flipped) = tracked.state.update_with_transition(ratio, &params);
      tracked.state = state;
      tracked.ratio = ratio;

      debug!(
        "车位 {}: 占比 {:.4}, 进入计数 {}, 离开计数 {}",
        tracked.slot.id(),
        ratio,
        state.enter_streak,
        state.exit_streak
      );

      if let Some(to) = flipped {
        info!("车位 {} 状态变为 {}", tracked.slot.label(), to);
        transitions.push(Transition {
          id: tracked.slot.id(),
          to,
        });
      }
    }

    transitions
  }
}
