// 该文件是 Chewei （车位） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 实时显示 / 视频文件输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频输出模块
//!
//! ## URL
//!
//! - `gst://display` - 通过 `autovideosink` 打开实时窗口
//! - `gst://file/path/to/output.mp4?fps=25` - 保存为视频文件（mp4 / mkv / avi / webm）
//!
//! 任一 URL 均可带 `font=/path/to/font.ttf` 参数用于绘制车位编号。
//!
//! 帧尺寸在收到第一帧时确定，此时才设置 appsrc 的 caps。
//! 显示窗口被关闭时管道会报错，[`Render::stop_requested`] 据此返回 `true`。

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  lot::ParkingLot,
  output::{
    Render,
    draw::{Draw, DrawError},
  },
  url_path,
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

const DEFAULT_FPS: i32 = 25;
const EOS_TIMEOUT_SECS: u64 = 5;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// URI scheme 不匹配
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 缓冲区创建错误
  #[error("Buffer creation error")]
  BufferCreationError,
  /// 字体加载错误
  #[error("Draw error: {0}")]
  DrawError(#[from] DrawError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSink {
  Display,
  File(String),
}

impl VideoSink {
  fn pipeline_description(&self) -> String {
    match self {
      VideoSink::Display => {
        "appsrc name=src is-live=true ! videoconvert ! autovideosink sync=false".to_string()
      }
      VideoSink::File(path) if path.ends_with(".mkv") => format!(
        "appsrc name=src ! videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux ! filesink location=\"{}\"",
        path
      ),
      VideoSink::File(path) if path.ends_with(".avi") => format!(
        "appsrc name=src ! videoconvert ! video/x-raw,format=I420 ! x264enc ! avimux ! filesink location=\"{}\"",
        path
      ),
      VideoSink::File(path) if path.ends_with(".webm") => format!(
        "appsrc name=src ! videoconvert ! vp8enc ! webmmux ! filesink location=\"{}\"",
        path
      ),
      // 默认 MP4
      VideoSink::File(path) => format!(
        "appsrc name=src ! videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux ! filesink location=\"{}\"",
        path
      ),
    }
  }
}

/// GStreamer 视频输出
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  sink: VideoSink,
  fps: i32,
  draw: Draw,
  frame_count: Mutex<u64>,
  caps_size: Mutex<Option<(u32, u32)>>,
  stopped: AtomicBool,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    let sink = parse_sink(url)?;
    let fps: i32 = url
      .query_pairs()
      .find(|(k, _)| k == "fps")
      .and_then(|(_, v)| v.parse().ok())
      .filter(|fps| *fps > 0)
      .unwrap_or(DEFAULT_FPS);
    let draw = Draw::from_url_query(url)?;

    // Initialize GStreamer (subsequent calls are safe no-ops)
    gst::init()?;

    let pipeline_desc = sink.pipeline_description();
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      sink,
      fps,
      draw,
      frame_count: Mutex::new(0),
      caps_size: Mutex::new(None),
      stopped: AtomicBool::new(false),
    })
  }
}

fn parse_sink(url: &Url) -> Result<VideoSink, GStreamerVideoOutputError> {
  match url.host_str() {
    Some("display") => Ok(VideoSink::Display),
    Some("file") => Ok(VideoSink::File(url_path(url))),
    _ => Err(GStreamerVideoOutputError::SchemeMismatch),
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    // 文件输出需要 EOS 才能写完容器尾部
    let _ = self.appsrc.end_of_stream();
    if let VideoSink::File(_) = self.sink
      && let Some(bus) = self.pipeline.bus()
    {
      let _ = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }

    let frame_count = self.frame_count.lock().map(|c| *c).unwrap_or_default();
    info!("Video output closed. Total frames written: {}", frame_count);
  }
}

impl GStreamerVideoOutput {
  fn ensure_caps(&self, width: u32, height: u32) -> Result<(), GStreamerVideoOutputError> {
    let mut caps_size = self
      .caps_size
      .lock()
      .map_err(|_| GStreamerVideoOutputError::PipelineError("caps lock poisoned".to_string()))?;
    if *caps_size == Some((width, height)) {
      return Ok(());
    }

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", gst::Fraction::new(self.fps, 1))
      .build();
    self.appsrc.set_caps(Some(&caps));
    *caps_size = Some((width, height));

    info!(
      "Video output initialized: {}x{} @ {} fps -> {:?}",
      width, height, self.fps, self.sink
    );
    Ok(())
  }

  fn push_frame(&self, image: image::RgbImage) -> Result<(), GStreamerVideoOutputError> {
    self.ensure_caps(image.width(), image.height())?;

    let mut frame_count = self
      .frame_count
      .lock()
      .map_err(|_| GStreamerVideoOutputError::PipelineError("counter lock poisoned".to_string()))?;
    let frame_duration = 1_000_000_000 / self.fps as u64;
    let timestamp = *frame_count * frame_duration;

    let mut buffer = gst::Buffer::from_mut_slice(image.into_raw());
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(timestamp));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_duration));
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    *frame_count += 1;

    Ok(())
  }
}

impl Render<RgbFrame, ParkingLot> for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn render_result(&self, frame: &RgbFrame, result: &ParkingLot) -> Result<(), Self::Error> {
    let image = self.draw.annotate(frame, result);
    self.push_frame(image)
  }

  fn stop_requested(&self) -> bool {
    if self.stopped.load(Ordering::Relaxed) {
      return true;
    }

    let Some(bus) = self.pipeline.bus() else {
      return false;
    };
    match bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) {
      Some(message) => {
        warn!("输出管道结束: {:?}", message.view());
        self.stopped.store(true, Ordering::Relaxed);
        true
      }
      None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sink_is_chosen_from_the_host() {
    let url = Url::parse("gst://display?font=/tmp/font.ttf").unwrap();
    assert_eq!(parse_sink(&url).unwrap(), VideoSink::Display);

    let url = Url::parse("gst://file/tmp/out%20put.mkv").unwrap();
    let sink = parse_sink(&url).unwrap();
    assert_eq!(sink, VideoSink::File("/tmp/out put.mkv".to_string()));
    assert!(sink.pipeline_description().contains("matroskamux"));

    let url = Url::parse("gst://rtsp/live").unwrap();
    assert!(matches!(
      parse_sink(&url),
      Err(GStreamerVideoOutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn unknown_extension_defaults_to_mp4() {
    let sink = VideoSink::File("/tmp/out.video".to_string());
    assert!(sink.pipeline_description().contains("mp4mux"));
    assert!(VideoSink::Display.pipeline_description().contains("autovideosink"));
  }
}
