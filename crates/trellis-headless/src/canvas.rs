use trellis_core::{Color, PaintContext, Rect, Transform, Vec2};

#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Rect {
        rect: Rect,
        color: Color,
    },
    Text {
        text: String,
        pos: Vec2,
        color: Color,
    },
    Path {
        points: Vec<Vec2>,
        color: Color,
        width: f32,
    },
}

/// A [`PaintContext`] that records primitives in surface coordinates.
///
/// Pushed transforms are applied to everything drawn while they are active;
/// primitives entirely outside the current clip are dropped.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    pub ops: Vec<DrawOp>,
    transforms: Vec<Transform>,
    clips: Vec<Rect>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
        self.transforms.clear();
        self.clips.clear();
    }

    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn current(&self) -> Transform {
        self.transforms.last().copied().unwrap_or_default()
    }

    fn visible(&self, r: Rect) -> bool {
        self.clips.last().is_none_or(|c| {
            r.x < c.x + c.w && r.x + r.w > c.x && r.y < c.y + c.h && r.y + r.h > c.y
        })
    }
}

impl PaintContext for RecordingCanvas {
    fn draw_rect(&mut self, bounds: Rect, color: Color) {
        let rect = self.current().apply_to_rect(bounds);
        if self.visible(rect) {
            self.ops.push(DrawOp::Rect { rect, color });
        }
    }

    fn draw_text(&mut self, text: &str, offset: Vec2, color: Color) {
        let pos = self.current().apply_to_point(offset);
        if self.clips.last().is_none_or(|c| c.contains(pos)) {
            self.ops.push(DrawOp::Text {
                text: text.to_string(),
                pos,
                color,
            });
        }
    }

    fn draw_path(&mut self, points: &[Vec2], color: Color, width: f32) {
        let t = self.current();
        self.ops.push(DrawOp::Path {
            points: points.iter().map(|p| t.apply_to_point(*p)).collect(),
            color,
            width,
        });
    }

    fn push_transform(&mut self, transform: Transform) {
        let combined = self.current().combine(&transform);
        self.transforms.push(combined);
    }

    fn pop_transform(&mut self) {
        self.transforms.pop();
    }

    fn push_clip(&mut self, rect: Rect) {
        let rect = self.current().apply_to_rect(rect);
        self.clips.push(rect);
    }

    fn pop_clip(&mut self) {
        self.clips.pop();
    }
}
