// 该文件是 Chewei （车位） 项目的一部分。
// src/task.rs - 逐帧处理任务
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

use std::sync::mpsc::{Receiver, channel};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::{foreground::ForegroundExtractor, frame::RgbFrame, lot::ParkingLot, output::Render};

pub trait Task<I, E, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, extractor: E, output: O) -> Result<Self::Output, Self::Error>;
}

/// 注册 Ctrl-C 处理，返回每帧轮询的停止信号
pub fn ctrlc_stop_signal() -> anyhow::Result<Receiver<()>> {
  let (tx, rx) = channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
  })?;
  Ok(rx)
}

/// 只处理第一帧：按车位初始状态绘制并输出，用于核对车位表与画面是否对齐
pub struct OneShotTask {
  lot: ParkingLot,
}

impl OneShotTask {
  pub fn new(lot: ParkingLot) -> Self {
    Self { lot }
  }
}

impl<I, E, RE, O> Task<I, E, O> for OneShotTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbFrame>,
  O: Render<RgbFrame, ParkingLot, Error = RE>,
{
  type Output = ParkingLot;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, _extractor: E, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功: {}x{}", frame.width(), frame.height());
    output.render_result(&frame, &self.lot)?;
    info!("渲染完成，共 {} 个车位", self.lot.slots().len());
    Ok(self.lot)
  }
}

/// 连续处理：提取掩码 → 更新全部车位 → 渲染，直到输入结束或收到停止信号
pub struct MonitorTask {
  lot: ParkingLot,
  frame_number: Option<u64>,
  stop: Option<Receiver<()>>,
}

impl MonitorTask {
  pub fn new(lot: ParkingLot) -> Self {
    Self {
      lot,
      frame_number: None,
      stop: None,
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_stop_signal(mut self, stop: Receiver<()>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn stop_signalled(&self) -> bool {
    self
      .stop
      .as_ref()
      .map(|rx| rx.try_recv().is_ok())
      .unwrap_or(false)
  }
}

impl<I, E, EE, RE, O> Task<I, E, O> for MonitorTask
where
  EE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbFrame>,
  E: ForegroundExtractor<Input = RgbFrame, Error = EE>,
  O: Render<RgbFrame, ParkingLot, Error = RE>,
{
  type Output = ParkingLot;
  type Error = anyhow::Error;

  fn run_task(mut self, input: I, mut extractor: E, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务，共 {} 个车位...", self.lot.slots().len());

    let mut processed = 0u64;
    for frame in input {
      let now = Instant::now();
      let mask = extractor.extract(&frame)?;
      let transitions = self.lot.observe(&mask);
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &self.lot)?;
      let elapsed_b = now.elapsed();
      processed += 1;

      debug!(
        "第 {} 帧: 占用 {}/{}，翻转 {} 个，耗时 {:.2?} / {:.2?}",
        frame.index(),
        self.lot.occupied_count(),
        self.lot.slots().len(),
        transitions.len(),
        elapsed_a,
        elapsed_b
      );

      if self.frame_number.map(|n| processed >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", processed);
        break;
      }
      if self.stop_signalled() || output.stop_requested() {
        warn!("收到停止请求，退出任务循环");
        break;
      }
    }

    info!(
      "任务完成，共处理 {} 帧，占用 {}/{}",
      processed,
      self.lot.occupied_count(),
      self.lot.slots().len()
    );
    Ok(self.lot)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::occupancy::{Occupancy, OccupancyParams};
  use crate::slot::SlotRegistry;
  use image::{GrayImage, Luma, RgbImage};
  use std::cell::RefCell;
  use std::convert::Infallible;

  /// 按预设序列返回掩码，忽略帧内容
  struct ScriptedMasks {
    masks: std::vec::IntoIter<GrayImage>,
  }

  impl ForegroundExtractor for ScriptedMasks {
    type Input = RgbFrame;
    type Error = std::io::Error;

    fn extract(&mut self, _input: &RgbFrame) -> Result<GrayImage, Self::Error> {
      self
        .masks
        .next()
        .ok_or_else(|| std::io::Error::other("no mask"))
    }
  }

  #[derive(Default)]
  struct Recorder {
    seen: RefCell<Vec<(u64, Occupancy)>>,
    stop_after: Option<usize>,
  }

  impl Render<RgbFrame, ParkingLot> for &Recorder {
    type Error = Infallible;

    fn render_result(&self, frame: &RgbFrame, result: &ParkingLot) -> Result<(), Self::Error> {
      let status = result.get(0).map(|t| t.status()).unwrap_or(Occupancy::Empty);
      self.seen.borrow_mut().push((frame.index(), status));
      Ok(())
    }

    fn stop_requested(&self) -> bool {
      self
        .stop_after
        .map(|n| self.seen.borrow().len() >= n)
        .unwrap_or(false)
    }
  }

  fn lot() -> ParkingLot {
    let registry =
      SlotRegistry::from_yaml_str("- id: 0\n  coordinates: [[0, 0], [3, 0], [3, 3], [0, 3]]\n")
        .unwrap();
    ParkingLot::new(registry, OccupancyParams::default())
  }

  fn frames(n: u64) -> impl Iterator<Item = RgbFrame> {
    (0..n).map(|i| RgbFrame::new(i, RgbImage::new(4, 4)))
  }

  fn masks(busy: &[bool]) -> ScriptedMasks {
    let masks = busy
      .iter()
      .map(|&b| GrayImage::from_pixel(4, 4, Luma([if b { 255 } else { 0 }])))
      .collect::<Vec<_>>();
    ScriptedMasks {
      masks: masks.into_iter(),
    }
  }

  #[test]
  fn monitor_renders_every_frame_in_order() {
    let recorder = Recorder::default();
    let lot = MonitorTask::new(lot())
      .run_task(frames(6), masks(&[true; 6]), &recorder)
      .unwrap();

    let seen = recorder.seen.borrow();
    assert_eq!(seen.len(), 6);
    assert_eq!(seen[3], (3, Occupancy::Empty));
    assert_eq!(seen[4], (4, Occupancy::Occupied));
    assert_eq!(lot.get(0).unwrap().status(), Occupancy::Occupied);
  }

  #[test]
  fn monitor_honours_frame_limit() {
    let recorder = Recorder::default();
    MonitorTask::new(lot())
      .with_frame_number(Some(3))
      .run_task(frames(10), masks(&[false; 10]), &recorder)
      .unwrap();
    assert_eq!(recorder.seen.borrow().len(), 3);
  }

  #[test]
  fn monitor_stops_on_signal_at_frame_boundary() {
    let (tx, rx) = channel();
    tx.send(()).unwrap();
    let recorder = Recorder::default();
    MonitorTask::new(lot())
      .with_stop_signal(rx)
      .run_task(frames(10), masks(&[false; 10]), &recorder)
      .unwrap();
    assert_eq!(recorder.seen.borrow().len(), 1);
  }

  #[test]
  fn monitor_stops_when_output_asks() {
    let recorder = Recorder {
      stop_after: Some(2),
      ..Recorder::default()
    };
    MonitorTask::new(lot())
      .run_task(frames(10), masks(&[false; 10]), &recorder)
      .unwrap();
    assert_eq!(recorder.seen.borrow().len(), 2);
  }

  #[test]
  fn extractor_failure_aborts_the_task() {
    let recorder = Recorder::default();
    let result = MonitorTask::new(lot()).run_task(frames(5), masks(&[true; 2]), &recorder);
    assert!(result.is_err());
    assert_eq!(recorder.seen.borrow().len(), 2);
  }

  #[test]
  fn one_shot_renders_initial_state_only() {
    let recorder = Recorder::default();
    let lot = OneShotTask::new(lot())
      .run_task(frames(5), masks(&[]), &recorder)
      .unwrap();
    assert_eq!(*recorder.seen.borrow(), vec![(0, Occupancy::Empty)]);
    assert_eq!(lot.get(0).unwrap().state().enter_streak, 0);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let recorder = Recorder::default();
    assert!(
      OneShotTask::new(lot())
        .run_task(frames(0), masks(&[]), &recorder)
        .is_err()
    );
  }
}
