#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn origin(&self) -> Vec2 {
        Vec2 {
            x: self.x,
            y: self.y,
        }
    }

    pub fn size(&self) -> Size {
        Size {
            width: self.w,
            height: self.h,
        }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x <= self.x + self.w && p.y >= self.y && p.y <= self.y + self.h
    }

    /// Same size, origin shifted by `offset`.
    pub fn translate(&self, offset: Vec2) -> Rect {
        Rect {
            x: self.x + offset.x,
            y: self.y + offset.y,
            w: self.w,
            h: self.h,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translate_x: f32,
    pub translate_y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            translate_x: 0.0,
            translate_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            translate_x: x,
            translate_y: y,
            ..Self::identity()
        }
    }

    pub fn apply_to_point(&self, p: Vec2) -> Vec2 {
        Vec2 {
            x: p.x * self.scale_x + self.translate_x,
            y: p.y * self.scale_y + self.translate_y,
        }
    }

    pub fn apply_to_rect(&self, r: Rect) -> Rect {
        let p = self.apply_to_point(r.origin());
        Rect {
            x: p.x,
            y: p.y,
            w: r.w * self.scale_x,
            h: r.h * self.scale_y,
        }
    }

    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            translate_x: self.translate_x + other.translate_x * self.scale_x,
            translate_y: self.translate_y + other.translate_y * self.scale_y,
            scale_x: self.scale_x * other.scale_x,
            scale_y: self.scale_y * other.scale_y,
        }
    }
}

/// Upper bounds handed to a widget's `measure`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Constraints {
    pub max_width: f32,
    pub max_height: f32,
}

impl Constraints {
    pub fn new(max_width: f32, max_height: f32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    pub fn max(&self) -> Size {
        Size {
            width: self.max_width,
            height: self.max_height,
        }
    }

    /// Clamp `size` into `[0, max]` on both axes.
    pub fn constrain(&self, size: Size) -> Size {
        Size {
            width: size.width.clamp(0.0, self.max_width.max(0.0)),
            height: size.height.clamp(0.0, self.max_height.max(0.0)),
        }
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constrain_clamps_both_axes() {
        let c = Constraints::new(100.0, 50.0);
        assert_eq!(c.constrain(Size::new(140.0, -3.0)), Size::new(100.0, 0.0));
        assert_eq!(c.constrain(Size::new(10.0, 20.0)), Size::new(10.0, 20.0));
    }

    #[test]
    fn translate_keeps_size() {
        let r = Rect::new(1.0, 2.0, 3.0, 4.0).translate(Vec2::new(10.0, 20.0));
        assert_eq!(r, Rect::new(11.0, 22.0, 3.0, 4.0));
    }

    #[test]
    fn combined_transform_applies_outer_scale_to_inner_translation() {
        let outer = Transform {
            scale_x: 2.0,
            scale_y: 2.0,
            ..Transform::translate(5.0, 5.0)
        };
        let t = outer.combine(&Transform::translate(1.0, 1.0));
        assert_eq!(t.apply_to_point(Vec2::ZERO), Vec2::new(7.0, 7.0));
    }
}
