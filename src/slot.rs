// 该文件是 Chewei （车位） 项目的一部分。
// src/slot.rs - 车位定义与车位表加载
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

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

const MIN_POLYGON_POINTS: usize = 3;

/// 车位坐标允许的绝对值上限
pub const MAX_COORDINATE: i32 = 65536;

pub type SlotId = u32;

#[derive(Error, Debug)]
pub enum SlotRegistryError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("车位表解析错误: {0}")]
  ParseError(#[from] serde_yaml::Error),
  #[error("车位表为空")]
  Empty,
  #[error("车位 {id} 的多边形只有 {points} 个顶点，至少需要 3 个")]
  TooFewPoints { id: SlotId, points: usize },
  #[error("车位编号重复: {0}")]
  DuplicateId(SlotId),
  #[error("车位 {id} 的顶点 {point:?} 超出坐标范围 [-65536, 65536]")]
  CoordinateOutOfRange { id: SlotId, point: [i32; 2] },
}

/// 轴对齐包围盒（像素坐标，宽高按包含端点计算）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
  pub x: i32,
  pub y: i32,
  pub width: u32,
  pub height: u32,
}

impl BoundingBox {
  pub fn from_points(points: &[[i32; 2]]) -> Self {
    let Some(&[x0, y0]) = points.first() else {
      return BoundingBox {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
      };
    };

    let (mut x_min, mut y_min, mut x_max, mut y_max) = (x0, y0, x0, y0);
    for &[x, y] in points.iter().skip(1) {
      x_min = x_min.min(x);
      y_min = y_min.min(y);
      x_max = x_max.max(x);
      y_max = y_max.max(y);
    }

    BoundingBox {
      x: x_min,
      y: y_min,
      width: inclusive_extent(x_min, x_max),
      height: inclusive_extent(y_min, y_max),
    }
  }

  pub fn area(&self) -> u64 {
    self.width as u64 * self.height as u64
  }
}

fn inclusive_extent(min: i32, max: i32) -> u32 {
  let extent = max as i64 - min as i64 + 1;
  u32::try_from(extent).unwrap_or(u32::MAX)
}

fn in_range(&[x, y]: &[i32; 2]) -> bool {
  let range = -MAX_COORDINATE..=MAX_COORDINATE;
  range.contains(&x) && range.contains(&y)
}

/// 车位：编号 + 多边形，加载后只读
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
  id: SlotId,
  polygon: Box<[[i32; 2]]>,
  bbox: BoundingBox,
  initially_occupied: bool,
}

impl Slot {
  pub fn new(id: SlotId, polygon: Vec<[i32; 2]>, initially_occupied: bool) -> Self {
    let bbox = BoundingBox::from_points(&polygon);
    Self {
      id,
      polygon: polygon.into_boxed_slice(),
      bbox,
      initially_occupied,
    }
  }

  pub fn id(&self) -> SlotId {
    self.id
  }

  pub fn polygon(&self) -> &[[i32; 2]] {
    &self.polygon
  }

  pub fn bbox(&self) -> &BoundingBox {
    &self.bbox
  }

  pub fn initially_occupied(&self) -> bool {
    self.initially_occupied
  }

  /// 画面上显示的标签（配置中的编号从 0 开始，显示从 1 开始）
  pub fn label(&self) -> String {
    (self.id as u64 + 1).to_string()
  }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SlotRecord {
  id: SlotId,
  coordinates: Vec<[i32; 2]>,
  #[serde(default)]
  occupied: bool,
}

/// 车位表
#[derive(Debug, Clone)]
pub struct SlotRegistry {
  slots: Box<[Slot]>,
}

impl SlotRegistry {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SlotRegistryError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let registry = Self::from_yaml_str(&raw)?;
    info!("从 {} 加载了 {} 个车位", path.display(), registry.len());
    Ok(registry)
  }

  pub fn from_yaml_str(raw: &str) -> Result<Self, SlotRegistryError> {
    let records: Option<Vec<SlotRecord>> = serde_yaml::from_str(raw)?;
    let records = records.unwrap_or_default();
    if records.is_empty() {
      return Err(SlotRegistryError::Empty);
    }

    let mut seen = HashSet::with_capacity(records.len());
    let mut slots = Vec::with_capacity(records.len());
    for record in records {
      if record.coordinates.len() < MIN_POLYGON_POINTS {
        return Err(SlotRegistryError::TooFewPoints {
          id: record.id,
          points: record.coordinates.len(),
        });
      }
      if let Some(&point) = record.coordinates.iter().find(|p| !in_range(p)) {
        return Err(SlotRegistryError::CoordinateOutOfRange {
          id: record.id,
          point,
        });
      }
      if !seen.insert(record.id) {
        return Err(SlotRegistryError::DuplicateId(record.id));
      }
      slots.push(Slot::new(record.id, record.coordinates, record.occupied));
    }

    Ok(SlotRegistry {
      slots: slots.into_boxed_slice(),
    })
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  pub fn slots(&self) -> &[Slot] {
    &self.slots
  }

  pub fn get(&self, id: SlotId) -> Option<&Slot> {
    self.slots.iter().find(|slot| slot.id == id)
  }
}

impl IntoIterator for SlotRegistry {
  type Item = Slot;
  type IntoIter = std::vec::IntoIter<Slot>;

  fn into_iter(self) -> Self::IntoIter {
    self.slots.into_vec().into_iter()
  }
}
