// 该文件是 Chewei （车位） 项目的一部分。
// tests/monitor_pipeline.rs - 从磁盘读帧到写出标注图像的完整流程
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

use image::{Rgb, RgbImage};
use url::Url;

use chewei::{
  FromUrl,
  config::DetectorConfig,
  foreground::MotionExtractor,
  input::ImageFileInput,
  lot::ParkingLot,
  occupancy::Occupancy,
  output::{
    SaveImageFileOutput,
    draw::{COLOR_GREEN, COLOR_RED, Draw},
  },
  slot::SlotRegistry,
  task::{MonitorTask, OneShotTask, Task},
};

const WIDTH: u32 = 80;
const HEIGHT: u32 = 40;
const STATIC_FRAMES: usize = 8;
const CAR_FRAMES: usize = 8;

const SLOTS: &str = "\
- id: 0
  coordinates: [[10, 10], [29, 10], [29, 19], [10, 19]]
- id: 1
  coordinates: [[45, 10], [64, 10], [64, 19], [45, 19]]
";

/// 静止背景若干帧后，一辆“车”停进 0 号车位
fn write_frames(dir: &Path) {
  let background = Rgb([100, 100, 100]);
  for index in 0..STATIC_FRAMES + CAR_FRAMES {
    let mut frame = RgbImage::from_pixel(WIDTH, HEIGHT, background);
    if index >= STATIC_FRAMES {
      for y in 10..20 {
        for x in 10..30 {
          frame.put_pixel(x, y, Rgb([255, 255, 255]));
        }
      }
    }
    frame.save(dir.join(format!("{:04}.png", index))).unwrap();
  }
}

fn setup() -> (tempfile::TempDir, ParkingLot, MotionExtractor) {
  let dir = tempfile::tempdir().unwrap();
  std::fs::create_dir(dir.path().join("frames")).unwrap();
  write_frames(&dir.path().join("frames"));

  let slots = dir.path().join("slots.yaml");
  std::fs::write(&slots, SLOTS).unwrap();
  let params = dir.path().join("params.yaml");
  std::fs::write(&params, "occupancy:\n  enter_frames: 5\n").unwrap();

  let config = DetectorConfig::from_path(&params).unwrap();
  let registry = SlotRegistry::from_path(&slots).unwrap();
  let lot = ParkingLot::new(registry, config.occupancy);
  (dir, lot, MotionExtractor::from_config(&config))
}

#[test]
fn parked_car_flips_its_slot_after_the_entry_run() {
  let (dir, lot, extractor) = setup();
  let input = ImageFileInput::open(dir.path().join("frames")).unwrap();
  let target = dir.path().join("out").join("latest.png");
  let output = SaveImageFileOutput::new(&target, Draw::default());

  let lot = MonitorTask::new(lot)
    .run_task(input, extractor, output)
    .unwrap();

  assert_eq!(lot.get(0).unwrap().status(), Occupancy::Occupied);
  assert_eq!(lot.get(1).unwrap().status(), Occupancy::Empty);
  assert_eq!(lot.occupied_count(), 1);
  assert!(lot.get(0).unwrap().ratio() > 0.9);
  assert_eq!(lot.get(1).unwrap().ratio(), 0.0);

  let saved = image::open(&target).unwrap().into_rgb8();
  assert_eq!(saved.get_pixel(20, 10).0, COLOR_RED);
  assert_eq!(saved.get_pixel(55, 10).0, COLOR_GREEN);
}

#[test]
fn short_run_keeps_the_slot_empty() {
  let (dir, lot, extractor) = setup();
  let input = ImageFileInput::open(dir.path().join("frames")).unwrap();
  let output = SaveImageFileOutput::new(dir.path().join("latest.png"), Draw::default());

  // 只看到四帧有车
  let lot = MonitorTask::new(lot)
    .with_frame_number(Some((STATIC_FRAMES + 4) as u64))
    .run_task(input, extractor, output)
    .unwrap();

  let slot = lot.get(0).unwrap();
  assert_eq!(slot.status(), Occupancy::Empty);
  assert_eq!(slot.state().enter_streak, 4);
}

#[test]
fn preview_draws_the_initial_state_from_urls() {
  let (dir, _, _) = setup();
  let slots = "- id: 3\n  coordinates: [[10, 10], [29, 10], [29, 19], [10, 19]]\n  occupied: true\n";
  let registry = SlotRegistry::from_yaml_str(slots).unwrap();
  let lot = ParkingLot::new(registry, Default::default());

  let frames = Url::from_directory_path(dir.path().join("frames")).unwrap();
  let frames = Url::parse(&frames.as_str().replacen("file", "image", 1)).unwrap();
  let target = dir.path().join("preview.png");
  let output = Url::parse(&format!("image://{}", target.display())).unwrap();

  let lot = OneShotTask::new(lot)
    .run_task(
      ImageFileInput::from_url(&frames).unwrap(),
      (),
      SaveImageFileOutput::from_url(&output).unwrap(),
    )
    .unwrap();

  assert_eq!(lot.get(3).unwrap().status(), Occupancy::Occupied);
  let saved = image::open(&target).unwrap().into_rgb8();
  assert_eq!(saved.dimensions(), (WIDTH, HEIGHT));
  assert_eq!(saved.get_pixel(20, 10).0, COLOR_RED);
}
