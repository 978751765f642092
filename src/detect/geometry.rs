//! Pixel-space to screen-space conversion.
//!
//! The service reports positions in a camera-follow convention: the center
//! of the image is (0, 0) and the edges are -1/+1, so a frontend can feed
//! the values straight into pan/tilt control. Sizes stay as fractions of the
//! image, and `area` doubles as a cheap proxy for distance to the camera.

use serde::Serialize;

use super::backend::RawDetection;

/// Normalized corner coordinates, each in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// One detected object instance with normalized geometry.
#[derive(Clone, Debug, Serialize)]
pub struct Detection {
    /// Canonical class label.
    #[serde(rename = "class")]
    pub class_label: String,
    /// Model confidence in [0, 1].
    pub confidence: f32,
    /// Box center, 0 at image center, -1/+1 at the edges.
    pub x: f32,
    pub y: f32,
    /// Box size as a fraction of the image dimension.
    pub width: f32,
    pub height: f32,
    /// width * height; larger means closer to the camera.
    pub area: f32,
    pub bbox: BoundingBox,
}

/// Convert a raw pixel-space box into normalized screen-space geometry.
///
/// Callers guarantee non-zero image dimensions (decoded images always have
/// them), so the divisions here are well-defined.
pub fn normalize(raw: &RawDetection, class_label: String, img_w: u32, img_h: u32) -> Detection {
    let w = img_w as f32;
    let h = img_h as f32;

    let center_x = (raw.x1 + raw.x2) / 2.0;
    let center_y = (raw.y1 + raw.y2) / 2.0;

    let width = (raw.x2 - raw.x1) / w;
    let height = (raw.y2 - raw.y1) / h;

    Detection {
        class_label,
        confidence: raw.confidence,
        x: (center_x / w - 0.5) * 2.0,
        y: (center_y / h - 0.5) * 2.0,
        width,
        height,
        area: width * height,
        bbox: BoundingBox {
            x1: raw.x1 / w,
            y1: raw.y1 / h,
            x2: raw.x2 / w,
            y2: raw.y2 / h,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(x1: f32, y1: f32, x2: f32, y2: f32) -> RawDetection {
        RawDetection {
            class_id: 0,
            confidence: 0.9,
            x1,
            y1,
            x2,
            y2,
        }
    }

    #[test]
    fn full_frame_box_is_centered_with_unit_area() {
        let d = normalize(&raw(0.0, 0.0, 640.0, 480.0), "person".into(), 640, 480);
        assert_eq!(d.x, 0.0);
        assert_eq!(d.y, 0.0);
        assert_eq!(d.width, 1.0);
        assert_eq!(d.height, 1.0);
        assert_eq!(d.area, 1.0);
    }

    #[test]
    fn top_left_box_maps_to_negative_coordinates() {
        let d = normalize(&raw(0.0, 0.0, 160.0, 120.0), "person".into(), 640, 480);
        // Center of the box is at 1/8 of the image: (0.125 - 0.5) * 2 = -0.75.
        assert!((d.x - -0.75).abs() < 1e-6);
        assert!((d.y - -0.75).abs() < 1e-6);
        assert!((d.width - 0.25).abs() < 1e-6);
        assert!((d.area - 0.0625).abs() < 1e-6);
        assert_eq!(d.bbox.x1, 0.0);
        assert!((d.bbox.x2 - 0.25).abs() < 1e-6);
    }

    #[test]
    fn normalized_values_stay_in_range() {
        let d = normalize(&raw(320.0, 240.0, 640.0, 480.0), "cup".into(), 640, 480);
        assert!((-1.0..=1.0).contains(&d.x));
        assert!((-1.0..=1.0).contains(&d.y));
        assert!((0.0..=1.0).contains(&d.width));
        assert!((0.0..=1.0).contains(&d.height));
    }
}
