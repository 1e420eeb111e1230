// 该文件是 Chewei （车位） 项目的一部分。
// src/bin/slot_preview.rs - 在第一帧上绘制车位，核对坐标
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
  input::InputWrapper,
  lot::ParkingLot,
  occupancy::OccupancyParams,
  output::OutputWrapper,
  slot::SlotRegistry,
  task::{OneShotTask, Task},
};

/// 车位坐标预览
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 车位坐标文件（YAML）
  #[arg(long, value_name = "SLOTS")]
  pub slots: PathBuf,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("车位文件: {}", args.slots.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let registry = SlotRegistry::from_path(&args.slots)?;
  let lot = ParkingLot::new(registry, OccupancyParams::default());
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask::new(lot).run_task(input, (), output)?;

  Ok(())
}
