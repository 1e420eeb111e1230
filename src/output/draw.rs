// 该文件是 Chewei （车位） 项目的一部分。
// src/output/draw.rs - 车位状态可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut, text_size};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{frame::RgbFrame, lot::ParkingLot, occupancy::Occupancy, slot::MAX_COORDINATE};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const OUTLINE_THICKNESS: i32 = 2;

pub const COLOR_RED: [u8; 3] = [255, 0, 0];
pub const COLOR_GREEN: [u8; 3] = [0, 255, 0];
pub const COLOR_WHITE: [u8; 3] = [255, 255, 255];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 车位状态对应的颜色：占用为红，空闲为绿
pub fn status_color(status: Occupancy) -> [u8; 3] {
  match status {
    Occupancy::Occupied => COLOR_RED,
    Occupancy::Empty => COLOR_GREEN,
  }
}

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  text_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      text_color: COLOR_WHITE,
    }
  }
}

impl Draw {
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)?;
    info!("已加载标签字体: {}", path.display());
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  /// 从输出 URL 的 `font` 查询参数加载字体；未给出时只画轮廓
  pub fn from_url_query(url: &Url) -> Result<Self, DrawError> {
    match url.query_pairs().find(|(k, _)| k == "font") {
      Some((_, path)) => Self::with_font_file(path.into_owned()),
      None => Ok(Self::default()),
    }
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 画一个车位：多边形轮廓（状态色）+ 质心处的白色标签
  pub fn draw_slot(&self, image: &mut RgbImage, polygon: &[[i32; 2]], label: &str, color: [u8; 3]) {
    if polygon.is_empty() {
      return;
    }

    // 越界顶点先收进合法坐标范围，绘制时不会溢出
    let polygon: Vec<[i32; 2]> = polygon
      .iter()
      .map(|&[x, y]| {
        [
          x.clamp(-MAX_COORDINATE, MAX_COORDINATE),
          y.clamp(-MAX_COORDINATE, MAX_COORDINATE),
        ]
      })
      .collect();

    for offset in 0..OUTLINE_THICKNESS {
      for (i, &[x0, y0]) in polygon.iter().enumerate() {
        let [x1, y1] = polygon[(i + 1) % polygon.len()];
        draw_line_segment_mut(
          image,
          ((x0 + offset) as f32, (y0 + offset) as f32),
          ((x1 + offset) as f32, (y1 + offset) as f32),
          Rgb(color),
        );
      }
    }

    let Some(font) = self.font.as_ref() else {
      return;
    };

    let n = polygon.len() as i64;
    let cx = polygon.iter().map(|p| p[0] as i64).sum::<i64>() / n;
    let cy = polygon.iter().map(|p| p[1] as i64).sum::<i64>() / n;

    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, label);
    draw_text_mut(
      image,
      Rgb(self.text_color),
      cx as i32 - text_width as i32 / 2,
      cy as i32 - text_height as i32 / 2,
      scale,
      font,
      label,
    );
  }

  pub fn draw_lot_on_image(&self, image: &mut RgbImage, lot: &ParkingLot) {
    for tracked in lot.slots() {
      let slot = tracked.slot();
      self.draw_slot(
        image,
        slot.polygon(),
        &slot.label(),
        status_color(tracked.status()),
      );
    }
  }

  pub fn annotate(&self, frame: &RgbFrame, lot: &ParkingLot) -> RgbImage {
    let mut image = frame.image().clone();
    self.draw_lot_on_image(&mut image, lot);
    image
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::occupancy::OccupancyParams;
  use crate::slot::SlotRegistry;

  const SLOTS: &str = r#"
- id: 0
  coordinates: [[2, 2], [12, 2], [12, 12], [2, 12]]
- id: 1
  coordinates: [[20, 2], [30, 2], [30, 12], [20, 12]]
  occupied: true
"#;

  #[test]
  fn outlines_use_status_colors() {
    let lot = ParkingLot::new(
      SlotRegistry::from_yaml_str(SLOTS).unwrap(),
      OccupancyParams::default(),
    );
    let frame = RgbFrame::new(0, RgbImage::new(40, 20));
    let image = Draw::default().annotate(&frame, &lot);

    assert_eq!(image.get_pixel(7, 2).0, COLOR_GREEN);
    assert_eq!(image.get_pixel(25, 2).0, COLOR_RED);
    assert_eq!(image.get_pixel(7, 7).0, [0, 0, 0]);
    assert_eq!(image.get_pixel(35, 15).0, [0, 0, 0]);
  }

  #[test]
  fn outline_is_two_pixels_thick() {
    let mut image = RgbImage::new(20, 20);
    Draw::default().draw_slot(&mut image, &[[2, 2], [12, 2], [12, 12]], "1", COLOR_RED);
    assert_eq!(image.get_pixel(6, 2).0, COLOR_RED);
    assert_eq!(image.get_pixel(6, 3).0, COLOR_RED);
  }

  #[test]
  fn far_away_vertices_are_clamped() {
    let mut image = RgbImage::new(20, 20);
    Draw::default().draw_slot(&mut image, &[[0, 0], [i32::MAX, 0], [0, 5]], "1", COLOR_RED);
    assert_eq!(image.get_pixel(10, 0).0, COLOR_RED);
    assert_eq!(image.get_pixel(0, 3).0, COLOR_RED);
  }

  #[test]
  fn status_color_mapping() {
    assert_eq!(status_color(Occupancy::Occupied), COLOR_RED);
    assert_eq!(status_color(Occupancy::Empty), COLOR_GREEN);
  }

  #[test]
  fn missing_font_file_is_reported() {
    let url = Url::parse("gst://display?font=/nonexistent/font.ttf").unwrap();
    assert!(matches!(Draw::from_url_query(&url), Err(DrawError::IoError(_))));
    let url = Url::parse("gst://display").unwrap();
    assert!(!Draw::from_url_query(&url).unwrap().has_font());
  }

  #[test]
  fn garbage_font_is_invalid() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), b"not a font").unwrap();
    assert!(matches!(
      Draw::with_font_file(file.path()),
      Err(DrawError::InvalidFont(_))
    ));
  }
}
