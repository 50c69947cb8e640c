//! Container sizing and child placement.
//!
//! Pure functions over a container's [`LayoutKind`] and its children's
//! measured sizes, shared by the measure and place stages.

use trellis_core::{Axis, LayoutKind, Size, Vec2};

/// Size of a container from its children's sizes. A `Leaf` with children is
/// sized by its own `measure`, so it returns `None`.
pub fn container_size(layout: LayoutKind, children: &[Size]) -> Option<Size> {
    match layout {
        LayoutKind::Leaf => None,
        LayoutKind::Stack { axis, gap } => {
            let gaps = gap * children.len().saturating_sub(1) as f32;
            let (main, cross) = children.iter().fold((0.0f32, 0.0f32), |(m, c), s| {
                let (sm, sc) = split(axis, *s);
                (m + sm, c.max(sc))
            });
            Some(join(axis, main + gaps, cross))
        }
        LayoutKind::Overlay => Some(children.iter().fold(Size::ZERO, |acc, s| {
            Size::new(acc.width.max(s.width), acc.height.max(s.height))
        })),
    }
}

/// Offsets of each child relative to its parent's origin.
pub fn child_offsets(layout: LayoutKind, children: &[Size]) -> Vec<Vec2> {
    match layout {
        LayoutKind::Leaf | LayoutKind::Overlay => vec![Vec2::ZERO; children.len()],
        LayoutKind::Stack { axis, gap } => {
            let mut cursor = 0.0f32;
            children
                .iter()
                .map(|s| {
                    let at = match axis {
                        Axis::Vertical => Vec2::new(0.0, cursor),
                        Axis::Horizontal => Vec2::new(cursor, 0.0),
                    };
                    cursor += split(axis, *s).0 + gap;
                    at
                })
                .collect()
        }
    }
}

/// (main, cross) extents along `axis`.
fn split(axis: Axis, s: Size) -> (f32, f32) {
    match axis {
        Axis::Vertical => (s.height, s.width),
        Axis::Horizontal => (s.width, s.height),
    }
}

fn join(axis: Axis, main: f32, cross: f32) -> Size {
    match axis {
        Axis::Vertical => Size::new(cross, main),
        Axis::Horizontal => Size::new(main, cross),
    }
}
