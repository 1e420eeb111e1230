// 该文件是 Chewei （车位） 项目的一部分。
// src/input/read_image_file.rs - 图像文件（序列）输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! `image:///path/to/frame.png` 读取单张图像；
//! `image:///path/to/frames/` 按文件名顺序把目录中的图像当作视频帧。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, url_path};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("No image files found in {0}")]
  NoFrames(PathBuf),
}

pub struct ImageFileInput {
  first: Option<RgbImage>,
  pending: VecDeque<PathBuf>,
  index: u64,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let mut pending: VecDeque<PathBuf> = if path.is_dir() {
      let mut files = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image_file(p))
        .collect::<Vec<_>>();
      files.sort();
      files.into()
    } else {
      VecDeque::from([path.to_path_buf()])
    };

    // 第一帧在打开时读取，源不可读时在启动阶段报错
    let first_path = pending
      .pop_front()
      .ok_or_else(|| ImageFileInputError::NoFrames(path.to_path_buf()))?;
    let first = load_rgb(&first_path)?;

    info!(
      "图像输入已打开: {} ({}x{}, 共 {} 帧)",
      path.display(),
      first.width(),
      first.height(),
      pending.len() + 1
    );

    Ok(ImageFileInput {
      first: Some(first),
      pending,
      index: 0,
    })
  }

  fn next_image(&mut self) -> Option<RgbImage> {
    if let Some(image) = self.first.take() {
      return Some(image);
    }

    let path = self.pending.pop_front()?;
    match load_rgb(&path) {
      Ok(image) => Some(image),
      Err(e) => {
        error!("读取图像 {} 失败，结束输入: {}", path.display(), e);
        self.pending.clear();
        None
      }
    }
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let image = self.next_image()?;
    let frame = RgbFrame::new(self.index, image);
    self.index += 1;
    Some(frame)
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

fn load_rgb(path: &Path) -> Result<RgbImage, ImageFileInputError> {
  let image = ImageReader::open(path)?.decode()?;
  Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn write_frame(dir: &Path, name: &str, value: u8) {
    RgbImage::from_pixel(6, 4, Rgb([value, value, value]))
      .save(dir.join(name))
      .unwrap();
  }

  #[test]
  fn directory_frames_come_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path(), "002.png", 20);
    write_frame(dir.path(), "001.png", 10);
    write_frame(dir.path(), "003.png", 30);
    std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

    let frames: Vec<_> = ImageFileInput::open(dir.path()).unwrap().collect();
    let values: Vec<_> = frames.iter().map(|f| f.image().get_pixel(0, 0)[0]).collect();
    let indices: Vec<_> = frames.iter().map(RgbFrame::index).collect();
    assert_eq!(values, vec![10, 20, 30]);
    assert_eq!(indices, vec![0, 1, 2]);
  }

  #[test]
  fn unreadable_source_fails_at_open() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageFileInput::open(dir.path()),
      Err(ImageFileInputError::NoFrames(_))
    ));
    assert!(ImageFileInput::open(dir.path().join("missing.png")).is_err());
  }

  #[test]
  fn broken_frame_mid_stream_ends_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path(), "001.png", 10);
    std::fs::write(dir.path().join("002.png"), b"garbage").unwrap();
    write_frame(dir.path(), "003.png", 30);

    let frames: Vec<_> = ImageFileInput::open(dir.path()).unwrap().collect();
    assert_eq!(frames.len(), 1);
  }

  #[test]
  fn url_paths_are_percent_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("lot cam");
    std::fs::create_dir(&frames).unwrap();
    write_frame(&frames, "001.png", 10);

    let url = Url::from_directory_path(&frames).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();
    assert_eq!(ImageFileInput::from_url(&url).unwrap().count(), 1);
  }
}
