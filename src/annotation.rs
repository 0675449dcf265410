// 该文件是 Qupu （曲谱） 项目的一部分。
// src/annotation.rs - 归一化标注框
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

use serde::{Deserialize, Serialize};

use crate::{
  detect::{Blob, DetectResult, Detection, LineSegment},
  frame::PixelGrid,
};

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Option<Self>;
  fn from_label_str(label: &str) -> Option<Self>;
}

/// 数据集中的标注类别
///
/// 启发式标注只产生 `staff_line` 与 `note`，其余类别供人工标注后的数据集解析使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationClass {
  StaffLine,
  Note,
  BarLine,
  TrebleClef,
  BassClef,
  AltoClef,
  WholeNote,
  HalfNote,
  QuarterNote,
  EighthNote,
  SixteenthNote,
  Dot,
  Sharp,
  Flat,
  Natural,
  WholeRest,
  HalfRest,
  QuarterRest,
  EighthRest,
  TimeSigNumber,
  DynamicMark,
  TempoMark,
}

impl AnnotationClass {
  pub const ALL: [AnnotationClass; 22] = [
    AnnotationClass::StaffLine,
    AnnotationClass::Note,
    AnnotationClass::BarLine,
    AnnotationClass::TrebleClef,
    AnnotationClass::BassClef,
    AnnotationClass::AltoClef,
    AnnotationClass::WholeNote,
    AnnotationClass::HalfNote,
    AnnotationClass::QuarterNote,
    AnnotationClass::EighthNote,
    AnnotationClass::SixteenthNote,
    AnnotationClass::Dot,
    AnnotationClass::Sharp,
    AnnotationClass::Flat,
    AnnotationClass::Natural,
    AnnotationClass::WholeRest,
    AnnotationClass::HalfRest,
    AnnotationClass::QuarterRest,
    AnnotationClass::EighthRest,
    AnnotationClass::TimeSigNumber,
    AnnotationClass::DynamicMark,
    AnnotationClass::TempoMark,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      AnnotationClass::StaffLine => "staff_line",
      AnnotationClass::Note => "note",
      AnnotationClass::BarLine => "bar_line",
      AnnotationClass::TrebleClef => "treble_clef",
      AnnotationClass::BassClef => "bass_clef",
      AnnotationClass::AltoClef => "alto_clef",
      AnnotationClass::WholeNote => "whole_note",
      AnnotationClass::HalfNote => "half_note",
      AnnotationClass::QuarterNote => "quarter_note",
      AnnotationClass::EighthNote => "eighth_note",
      AnnotationClass::SixteenthNote => "sixteenth_note",
      AnnotationClass::Dot => "dot",
      AnnotationClass::Sharp => "sharp",
      AnnotationClass::Flat => "flat",
      AnnotationClass::Natural => "natural",
      AnnotationClass::WholeRest => "whole_rest",
      AnnotationClass::HalfRest => "half_rest",
      AnnotationClass::QuarterRest => "quarter_rest",
      AnnotationClass::EighthRest => "eighth_rest",
      AnnotationClass::TimeSigNumber => "time_sig_number",
      AnnotationClass::DynamicMark => "dynamic_mark",
      AnnotationClass::TempoMark => "tempo_mark",
    }
  }
}

impl std::fmt::Display for AnnotationClass {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl WithLabel for AnnotationClass {
  fn to_label_str(&self) -> String {
    self.as_str().to_string()
  }

  fn to_label_id(&self) -> u32 {
    Self::ALL
      .iter()
      .position(|class| class == self)
      .unwrap_or_default() as u32
  }

  fn from_label_id(id: u32) -> Option<Self> {
    Self::ALL.get(id as usize).copied()
  }

  fn from_label_str(label: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|class| class.as_str() == label)
  }
}

/// 归一化标注框，(x, y) 为框中心，四个几何字段均在 [0, 1] 内
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
  pub class: AnnotationClass,
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
}

/// 像素坐标 → 归一化标注
#[derive(Debug, Clone, Copy)]
pub struct AnnotationEncoder {
  width: f64,
  height: f64,
}

impl AnnotationEncoder {
  /// 宽或高为零时无法归一化，返回 `None`
  pub fn new(width: u32, height: u32) -> Option<Self> {
    (width > 0 && height > 0).then(|| Self {
      width: width as f64,
      height: height as f64,
    })
  }

  pub fn for_grid(grid: &PixelGrid) -> Option<Self> {
    Self::new(grid.width(), grid.height())
  }

  pub fn encode(&self, detection: &Detection) -> Annotation {
    match detection {
      Detection::StaffLine(segment) => self.encode_staff_line(segment),
      Detection::Note(blob) => self.encode_note(blob),
    }
  }

  /// 先谱线后音符，每个检测对应一个标注
  pub fn encode_all(&self, result: &DetectResult) -> Vec<Annotation> {
    result
      .detections()
      .map(|detection| self.encode(&detection))
      .collect()
  }

  fn encode_staff_line(&self, segment: &LineSegment) -> Annotation {
    let center_x = (segment.x1 + segment.x2) as f64 / 2.0;
    let center_y = (segment.y1 + segment.y2) as f64 / 2.0;
    // 水平线高度为 0，至少按 1 像素计
    let width = segment.dx().abs().max(1) as f64;
    let height = segment.dy().abs().max(1) as f64;
    self.normalized(AnnotationClass::StaffLine, center_x, center_y, width, height)
  }

  fn encode_note(&self, blob: &Blob) -> Annotation {
    let diameter = (blob.radius * 2).max(1) as f64;
    self.normalized(
      AnnotationClass::Note,
      blob.x as f64,
      blob.y as f64,
      diameter,
      diameter,
    )
  }

  fn normalized(&self, class: AnnotationClass, x: f64, y: f64, width: f64, height: f64) -> Annotation {
    Annotation {
      class,
      x: (x / self.width).clamp(0.0, 1.0),
      y: (y / self.height).clamp(0.0, 1.0),
      width: (width / self.width).clamp(0.0, 1.0),
      height: (height / self.height).clamp(0.0, 1.0),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPS: f64 = 1e-12;

  fn encoder() -> AnnotationEncoder {
    AnnotationEncoder::new(640, 480).unwrap()
  }

  #[test]
  fn staff_line_is_centered_on_midpoint() {
    let a = encoder().encode(&Detection::StaffLine(LineSegment::new(50, 200, 300, 202)));

    assert_eq!(a.class, AnnotationClass::StaffLine);
    assert!((a.x - 175.0 / 640.0).abs() < EPS);
    assert!((a.y - 201.0 / 480.0).abs() < EPS);
    assert!((a.width - 250.0 / 640.0).abs() < EPS);
    assert!((a.height - 2.0 / 480.0).abs() < EPS);
  }

  #[test]
  fn flat_staff_line_keeps_one_pixel_height() {
    let a = encoder().encode(&Detection::StaffLine(LineSegment::new(10, 30, 400, 30)));
    assert!(a.height >= 1.0 / 480.0);
    assert!((a.height - 1.0 / 480.0).abs() < EPS);
  }

  #[test]
  fn note_box_spans_its_diameter() {
    let a = encoder().encode(&Detection::Note(Blob {
      x: 400,
      y: 300,
      radius: 8,
    }));

    assert_eq!(a.class, AnnotationClass::Note);
    assert_eq!((a.x, a.y), (0.625, 0.625));
    assert!((a.width - 0.025).abs() < EPS);
    assert!((a.height - 16.0 / 480.0).abs() < EPS);
  }

  #[test]
  fn boxes_stay_inside_unit_square() {
    let a = encoder().encode(&Detection::Note(Blob {
      x: 639,
      y: 0,
      radius: 400,
    }));
    for v in [a.x, a.y, a.width, a.height] {
      assert!((0.0..=1.0).contains(&v));
    }
  }

  #[test]
  fn zero_sized_image_has_no_encoder() {
    assert!(AnnotationEncoder::new(0, 480).is_none());
    assert!(AnnotationEncoder::new(640, 0).is_none());
  }

  #[test]
  fn encode_all_keeps_staff_lines_first() {
    let result = DetectResult {
      staff_lines: vec![
        LineSegment::new(0, 10, 200, 10),
        LineSegment::new(0, 20, 200, 20),
      ],
      notes: vec![Blob {
        x: 5,
        y: 5,
        radius: 2,
      }],
    };
    let classes: Vec<_> = encoder()
      .encode_all(&result)
      .into_iter()
      .map(|a| a.class)
      .collect();

    assert_eq!(
      classes,
      vec![
        AnnotationClass::StaffLine,
        AnnotationClass::StaffLine,
        AnnotationClass::Note
      ]
    );
  }

  #[test]
  fn serializes_with_wire_field_names() {
    let a = Annotation {
      class: AnnotationClass::StaffLine,
      x: 0.5,
      y: 0.25,
      width: 0.5,
      height: 0.125,
    };
    let value = serde_json::to_value(a).unwrap();
    assert_eq!(
      value,
      serde_json::json!({
        "class": "staff_line",
        "x": 0.5,
        "y": 0.25,
        "width": 0.5,
        "height": 0.125
      })
    );
  }

  #[test]
  fn labels_round_trip_through_ids_and_names() {
    for class in AnnotationClass::ALL {
      assert_eq!(AnnotationClass::from_label_id(class.to_label_id()), Some(class));
      assert_eq!(AnnotationClass::from_label_str(&class.to_label_str()), Some(class));
      assert_eq!(
        serde_json::to_value(class).unwrap(),
        serde_json::Value::String(class.to_string())
      );
    }
    assert_eq!(AnnotationClass::from_label_str("bass_drum"), None);
  }
}
