//! Vector boundary extraction
//!
//! Traces the outer boundaries of connected engrave regions into closed
//! polygon loops. Small boundaries are discarded as scan noise, and each
//! retained boundary is simplified with a tolerance proportional to its
//! perimeter, so large shapes and small shapes lose comparable detail.

use crate::binarize::BinaryMask;
use crate::error::CamToolResult;
use engravekit_core::{Point, TracedPath};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use serde::{Deserialize, Serialize};

/// Parameters for vector boundary extraction
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VectorTraceParams {
    /// Boundaries enclosing no more than this area (px²) are discarded
    pub min_contour_area: f64,
    /// Simplification tolerance as a fraction of boundary perimeter
    pub epsilon_ratio: f64,
}

impl Default for VectorTraceParams {
    fn default() -> Self {
        Self {
            min_contour_area: 5.0,
            epsilon_ratio: 0.002,
        }
    }
}

/// Trace the outer boundaries of engrave regions into closed loops
///
/// Only external contours are kept: holes inside a region and anything
/// nested in one are not traced. Each retained boundary is simplified
/// and emitted as a [`PathKind::ClosedLoop`](engravekit_core::PathKind)
/// path that implicitly returns to its first vertex.
pub fn extract_loops(
    mask: &BinaryMask,
    params: &VectorTraceParams,
) -> CamToolResult<Vec<TracedPath>> {
    let img = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.is_engrave(x, y) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    let contours: Vec<Contour<u32>> = find_contours(&img);
    let mut loops = Vec::new();

    for contour in contours {
        // External boundaries only: top-level outer borders.
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }

        let ring: Vec<Point> = contour
            .points
            .iter()
            .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
            .collect();
        if ring.len() < 2 {
            continue;
        }

        if ring_area(&ring) <= params.min_contour_area {
            continue;
        }

        let epsilon = params.epsilon_ratio * ring_perimeter(&ring);
        let simplified = simplify_ring(&ring, epsilon);
        if simplified.len() < 2 {
            continue;
        }

        loops.push(TracedPath::closed_loop(simplified));
    }

    tracing::debug!(loops = loops.len(), "traced outer boundaries");
    Ok(loops)
}

/// Enclosed area of a closed ring via the shoelace formula
fn ring_area(ring: &[Point]) -> f64 {
    let mut twice_area = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        twice_area += a.x * b.y - b.x * a.y;
    }
    twice_area.abs() / 2.0
}

/// Perimeter of a closed ring, including the closing edge
fn ring_perimeter(ring: &[Point]) -> f64 {
    let mut length = 0.0;
    for i in 0..ring.len() {
        length += ring[i].distance(ring[(i + 1) % ring.len()]);
    }
    length
}

/// Simplify a closed ring with Ramer-Douglas-Peucker.
///
/// The open-polyline form of RDP pins both endpoints, which for a ring
/// would pin two adjacent boundary pixels and leave a spurious vertex.
/// Instead the ring is anchored at its first vertex and the vertex
/// farthest from it, and each half is simplified independently.
fn simplify_ring(ring: &[Point], epsilon: f64) -> Vec<Point> {
    if ring.len() < 4 || epsilon <= 0.0 {
        return ring.to_vec();
    }

    let mut far = 0;
    let mut far_dist = 0.0;
    for (i, p) in ring.iter().enumerate() {
        let d = ring[0].distance(*p);
        if d > far_dist {
            far_dist = d;
            far = i;
        }
    }
    if far == 0 {
        // Every vertex coincides with the first.
        return vec![ring[0]];
    }

    let first_half = simplify_polyline(&ring[..=far], epsilon);

    let mut second_ring: Vec<Point> = ring[far..].to_vec();
    second_ring.push(ring[0]);
    let second_half = simplify_polyline(&second_ring, epsilon);

    // Both halves share their endpoints; keep each vertex once.
    let mut out = first_half;
    out.extend_from_slice(&second_half[1..second_half.len() - 1]);
    out
}

/// Ramer-Douglas-Peucker over an open polyline, endpoints pinned
fn simplify_polyline(points: &[Point], epsilon: f64) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut segments = vec![(0usize, n - 1)];
    while let Some((start, end)) = segments.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut max_idx = start;
        for i in (start + 1)..end {
            let d = chord_distance(points[i], points[start], points[end]);
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }
        if max_dist > epsilon {
            keep[max_idx] = true;
            segments.push((start, max_idx));
            segments.push((max_idx, end));
        }
    }

    points
        .iter()
        .zip(&keep)
        .filter_map(|(&p, &k)| k.then_some(p))
        .collect()
}

/// Perpendicular distance from `p` to the chord through `a` and `b`
fn chord_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return p.distance(a);
    }
    let cross = dx * (p.y - a.y) - dy * (p.x - a.x);
    cross.abs() / length_sq.sqrt()
}
