// 该文件是 Chewei （车位） 项目的一部分。
// src/main.rs - 车位占用监测主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use chewei::{
  FromUrl,
  config::DetectorConfig,
  foreground::MotionExtractor,
  input::InputWrapper,
  lot::ParkingLot,
  output::OutputWrapper,
  slot::SlotRegistry,
  task::{MonitorTask, Task, ctrlc_stop_signal},
};

/// Chewei 车位占用监测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 车位坐标文件（YAML）
  #[arg(long, value_name = "SLOTS")]
  pub slots: PathBuf,
  /// 输入来源，例如 gst://file/path/to/video.mp4 或 image:///path/to/frames/
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 gst://display 或 image:///tmp/latest.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 检测参数文件（YAML），缺省使用内置默认值
  #[arg(long, value_name = "PARAMS")]
  pub params: Option<PathBuf>,
  /// 最多处理的帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<u64>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("车位文件: {}", args.slots.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = match &args.params {
    Some(path) => DetectorConfig::from_path(path)?,
    None => DetectorConfig::default(),
  };
  let registry = SlotRegistry::from_path(&args.slots)?;
  info!("共加载 {} 个车位", registry.len());

  let extractor = MotionExtractor::from_config(&config);
  let lot = ParkingLot::new(registry, config.occupancy);
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let lot = MonitorTask::new(lot)
    .with_frame_number(args.frame_number)
    .with_stop_signal(ctrlc_stop_signal()?)
    .run_task(input, extractor, output)?;

  for tracked in lot.slots() {
    info!(
      "车位 {}: {} (最近运动比例 {:.4})",
      tracked.slot().label(),
      tracked.status(),
      tracked.ratio()
    );
  }

  Ok(())
}
