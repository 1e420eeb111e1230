// 该文件是 Chewei （车位） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频输入模块
//!
//! 通过 GStreamer 读取停车场监控视频，支持：
//! - 视频文件：`gst://file/path/to/video.mp4`
//! - V4L2 摄像头：`gst://camera/dev/video0?width=1280&height=720&fps=15`
//!
//! 可选参数 `rotate`（0/90/180/270）用于旋转画面。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use chewei::{FromUrl, input::GStreamerInputPipelineBuilder};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("gst://file/videos/parking.mp4")?;
//! let input = GStreamerInputPipelineBuilder::from_url(&url)?.build()?;
//!
//! for frame in input {
//!     println!("帧 {}: {}x{}", frame.index(), frame.width(), frame.height());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! 输出帧统一为 RGB。文件源按帧拉取、不丢帧，占用判断依赖连续帧计数；
//! 摄像头源只保留最新的两帧。

use std::collections::HashMap;
use std::path::Path;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, url_path};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

const RGB_CHANNELS: usize = 3;
const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_CAMERA_FPS: u32 = 15;
const STARTUP_TIMEOUT_SECS: u64 = 10;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://file/..." 或 "gst://camera/..."）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// 视频文件不存在
  #[error("Video file not found: {0}")]
  FileNotFound(String),
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        width,
        height,
        fps,
      } => {
        let io_mode_str = if let Some(mode) = io_mode {
          format!(" io-mode={}", mode)
        } else {
          "".to_string()
        };
        format!(
          "v4l2src device={}{} ! video/x-raw,width={},height={},framerate={}/1",
          camera, io_mode_str, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }
}

/// GStreamer 输入管道构建器
#[derive(Debug, Clone)]
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
  live: bool,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl GStreamerInputPipelineBuilder {
  fn build_camera_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let camera = path.to_string();
    let io_mode = query.get("io-mode").and_then(|v| v.parse::<u32>().ok());
    let width = query
      .get("width")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(DEFAULT_CAMERA_WIDTH);
    let height = query
      .get("height")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(DEFAULT_CAMERA_HEIGHT);
    let fps = query
      .get("fps")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(DEFAULT_CAMERA_FPS);

    let mut items = vec![GStreamerInputBuilderItem::CameraSource {
      camera,
      io_mode,
      width,
      height,
      fps,
    }];
    items.extend(Self::video_flip(query.get("rotate").map(|s| s.as_ref())));

    GStreamerInputPipelineBuilder { items, live: true }
  }

  fn build_file_pipeline(
    path: &str,
    query: &HashMap<String, String>,
  ) -> Result<Self, GStreamerInputError> {
    if !Path::new(path).is_file() {
      return Err(GStreamerInputError::FileNotFound(path.to_string()));
    }

    let mut items = vec![GStreamerInputBuilderItem::FileSource(path.to_string())];
    items.extend(Self::video_flip(query.get("rotate").map(|s| s.as_ref())));

    Ok(GStreamerInputPipelineBuilder { items, live: false })
  }

  fn video_flip(rotate: Option<&str>) -> Option<GStreamerInputBuilderItem> {
    let method = match rotate? {
      "90" => 1,
      "180" => 2,
      "270" => 3,
      _ => return None,
    };
    Some(GStreamerInputBuilderItem::VideoFlip { method })
  }

  pub fn pipeline_description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    let sink = if self.live {
      "appsink max-buffers=2 drop=true name=sink"
    } else {
      "appsink max-buffers=4 drop=false sync=false name=sink"
    };
    format!("{} ! {}", basic_pipeline, sink)
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.pipeline_description();
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    let input = GStreamerInput {
      pipeline,
      appsink,
      index: 0,
    };

    // 启动阶段等待管道就绪，源不可读时在这里失败
    input.pipeline.set_state(gst::State::Playing)?;
    let (result, _, _) = input
      .pipeline
      .state(gst::ClockTime::from_seconds(STARTUP_TIMEOUT_SECS));
    result?;

    Ok(input)
  }
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let path = url_path(url);

    let mut builder = match url.host_str() {
      Some("camera") => Self::build_camera_pipeline(&path, &query),
      Some("file") => Self::build_file_pipeline(&path, &query)?,
      _ => {
        return Err(GStreamerInputError::SchemeMismatch);
      }
    };

    builder.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: "RGB".to_string(),
    });

    Ok(builder)
  }
}

/// GStreamer 视频输入
///
/// 持有管道与 appsink，按帧迭代；拉取失败或流结束时迭代终止。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  index: u64,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  fn pull_sample(&self) -> Option<gst::Sample> {
    if self.appsink.is_eos() {
      info!("视频流结束");
      return None;
    }

    self
      .appsink
      .pull_sample()
      .map_err(|e| {
        error!("Failed to pull sample: {}", e);
        e
      })
      .ok()
  }
}

impl Iterator for GStreamerInput {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = self.pull_sample()?;
    let image = convert_sample_to_rgb(sample)
      .map_err(|e| {
        error!("Failed to fetch sample: {}", e);
        e
      })
      .ok()?;
    let frame = RgbFrame::new(self.index, image);
    self.index += 1;
    Some(frame)
  }
}

fn convert_sample_to_rgb(sample: gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let row_bytes = width * RGB_CHANNELS;
  let expected_size = stride * height.saturating_sub(1) + row_bytes;
  if data.len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row_bytes * height);
  match video_info.format() {
    gst_video::VideoFormat::Rgb => {
      // RGB 行按 4 字节对齐，逐行拷贝去掉填充
      for row in data.chunks(stride).take(height) {
        pixels.extend_from_slice(&row[..row_bytes]);
      }
    }
    gst_video::VideoFormat::Bgr => {
      for row in data.chunks(stride).take(height) {
        for bgr in row[..row_bytes].chunks_exact(RGB_CHANNELS) {
          pixels.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
        }
      }
    }
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  }

  RgbImage::from_raw(width as u32, height as u32, pixels).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: row_bytes * height,
      actual: data.len(),
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_url_builds_a_live_pipeline() {
    let url = Url::parse("gst://camera/dev/video2?width=640&height=480&fps=10&rotate=180").unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder.pipeline_description(),
      "v4l2src device=/dev/video2 ! video/x-raw,width=640,height=480,framerate=10/1 ! \
       videoflip method=2 ! videoconvert ! video/x-raw,format=RGB ! \
       appsink max-buffers=2 drop=true name=sink"
    );
  }

  #[test]
  fn camera_io_mode_is_passed_through() {
    let url = Url::parse("gst://camera/dev/video0?io-mode=4").unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    assert!(builder.pipeline_description().starts_with(
      "v4l2src device=/dev/video0 io-mode=4 ! video/x-raw,width=1280,height=720,framerate=15/1 ! "
    ));

    let url = Url::parse("gst://camera/dev/video0?io-mode=dma&rotate=45").unwrap();
    let description = GStreamerInputPipelineBuilder::from_url(&url)
      .unwrap()
      .pipeline_description();
    assert!(description.starts_with("v4l2src device=/dev/video0 ! "));
    assert!(!description.contains("videoflip"));
  }

  #[test]
  fn file_url_accepts_rotation() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let url = Url::parse(&format!("gst://file{}?rotate=90", file.path().display())).unwrap();
    let description = GStreamerInputPipelineBuilder::from_url(&url)
      .unwrap()
      .pipeline_description();
    assert!(description.contains("decodebin ! videoflip method=1 ! videoconvert"));
  }

  #[test]
  fn file_url_keeps_every_frame() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let url = Url::parse(&format!("gst://file{}", file.path().display())).unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    let description = builder.pipeline_description();
    assert!(description.starts_with(&format!("filesrc location=\"{}\"", file.path().display())));
    assert!(description.ends_with("appsink max-buffers=4 drop=false sync=false name=sink"));
  }

  #[test]
  fn missing_file_is_rejected_before_starting() {
    let url = Url::parse("gst://file/nonexistent/parking.mp4").unwrap();
    assert!(matches!(
      GStreamerInputPipelineBuilder::from_url(&url),
      Err(GStreamerInputError::FileNotFound(_))
    ));
  }

  #[test]
  fn unknown_host_is_a_scheme_mismatch() {
    let url = Url::parse("gst://rtsp/stream").unwrap();
    assert!(matches!(
      GStreamerInputPipelineBuilder::from_url(&url),
      Err(GStreamerInputError::SchemeMismatch)
    ));
  }
}
