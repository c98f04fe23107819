//! Rotation detection by scanning slanted lines into a region from its
//! edges, and correction of the detected angle.

use tracing::debug;

use crate::buffer::{PixelBuffer, WHITE};
use crate::config::DeskewConfig;
use crate::error::Result;
use crate::geometry::{Point, Rect};
use crate::transform::rotate;

/// Upper bound on sample points along one virtual scan line.
const MAX_SCAN_SIZE: u32 = 10_000;

/// Largest step-to-step increase in darkness seen while a virtual line of
/// slope `m` moves from one edge of `area` toward its middle.
///
/// `shift` is `(1, 0)` for the left edge, `(-1, 0)` for the right edge,
/// `(0, 1)` for the top and `(0, -1)` for the bottom. Returns zero if the
/// line reaches the middle before the darkness budget is spent.
pub fn detect_edge_rotation_peak(
    image: &PixelBuffer,
    area: Rect,
    m: f64,
    shift: (i32, i32),
    config: &DeskewConfig,
) -> i64 {
    let (width, height) = (area.width(), area.height());
    let horizontal = shift.1 == 0;
    let span = if horizontal { height } else { width }.max(0) as u32;
    let size = config.size.unwrap_or(span).min(MAX_SCAN_SIZE).min(span) as i32;
    let budget = (WHITE as f32 * size as f32 * config.depth) as i64;
    let half = size / 2;
    let outer_offset = (m.abs() * half as f64) as i32;

    let (max_depth, mut x, mut y, step_x, step_y) = if horizontal {
        let side = if shift.0 > 0 {
            area.left - outer_offset
        } else {
            area.right + outer_offset
        };
        let y = area.top + height / 2 - half;
        (width / 2, side as f64 + half as f64 * m, y as f64, -m, 1.0)
    } else {
        let side = if shift.1 > 0 {
            area.top - outer_offset
        } else {
            area.bottom + outer_offset
        };
        let x = area.left + width / 2 - half;
        (height / 2, x as f64, side as f64 - half as f64 * m, 1.0, -m)
    };

    let mut line = Vec::with_capacity(size.max(0) as usize);
    for _ in 0..size {
        line.push(Point::new(x as i32, y as i32));
        x += step_x;
        y += step_y;
    }

    let mut last = 0i64;
    let mut max_diff = 0i64;
    let mut accumulated = 0i64;
    let mut depth = 0;
    while accumulated < budget && depth < max_depth {
        let mut blackness = 0i64;
        for p in line.iter_mut() {
            if area.contains(*p) {
                blackness += (WHITE - image.darkness_inverse(p.x, p.y)) as i64;
            }
            p.x += shift.0;
            p.y += shift.1;
        }
        let diff = blackness - last;
        last = blackness;
        if diff >= max_diff {
            max_diff = diff;
        }
        accumulated += blackness;
        depth += 1;
    }

    if depth < max_depth {
        max_diff
    } else {
        0
    }
}

/// Angle in degrees whose scan line gives the sharpest edge on one side.
///
/// Angles are tried as 0, -step, +step, -2 step, ... up to `range`. Ties keep
/// the angle tried first, so zero wins unless another slope is strictly better.
pub fn detect_edge_rotation(
    image: &PixelBuffer,
    area: Rect,
    shift: (i32, i32),
    config: &DeskewConfig,
) -> f64 {
    let range = (config.range as f64).to_radians();
    let step = (config.step as f64).to_radians();
    let mut detected = 0.0f64;
    let mut max_peak = 0;
    let mut rotation = 0.0f64;
    while rotation <= range {
        let peak = detect_edge_rotation_peak(image, area, rotation.tan(), shift, config);
        if peak > max_peak {
            detected = rotation;
            max_peak = peak;
        }
        rotation = if rotation >= 0.0 {
            -(rotation + step)
        } else {
            -rotation
        };
    }
    detected.to_degrees()
}

/// Rotation of the content of `area`, in degrees.
///
/// A positive result means the content is turned clockwise on screen. The
/// configured edges are measured independently; if they disagree by more
/// than the allowed deviation, no rotation is reported.
pub fn detect_rotation(image: &PixelBuffer, area: Rect, config: &DeskewConfig) -> f64 {
    let edges = config.edges;
    let mut rotations = Vec::with_capacity(4);
    if edges.left {
        rotations.push(detect_edge_rotation(image, area, (1, 0), config));
    }
    if edges.top {
        rotations.push(-detect_edge_rotation(image, area, (0, 1), config));
    }
    if edges.right {
        rotations.push(detect_edge_rotation(image, area, (-1, 0), config));
    }
    if edges.bottom {
        rotations.push(-detect_edge_rotation(image, area, (0, -1), config));
    }
    if rotations.is_empty() {
        return 0.0;
    }

    let mean = rotations.iter().sum::<f64>() / rotations.len() as f64;
    let deviation = rotations
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        .sqrt();
    debug!(?rotations, mean, deviation, "rotation scan");
    if deviation <= config.deviation as f64 {
        mean
    } else {
        0.0
    }
}

/// Rotate the pixels inside `area` by `degrees` around the area's centre.
pub fn rotate_area(image: &mut PixelBuffer, area: Rect, degrees: f64) -> Result<()> {
    let (width, height) = (area.width() as u32, area.height() as u32);
    let mut source = image.blank_like(width, height)?;
    image.copy_area(area, Point::new(0, 0), &mut source);
    let mut target = image.blank_like(width, height)?;
    rotate(&source, &mut target, degrees.to_radians());
    target.copy_into(area.top_left(), image);
    Ok(())
}
