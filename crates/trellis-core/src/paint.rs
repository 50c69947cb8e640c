//! Paint commands and frame diffing.
//!
//! The commit stage flattens the element tree into a list of
//! [`PaintCommand`]s, one per visible element, parent before children. Two
//! consecutive lists are compared by element identity: property changes
//! become targeted update commands, anything that changes the set or order of
//! identities is structural and needs a full repaint.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::render_api::PaintContext;
use crate::{Color, ElementId, Rect, Vec2};

pub type ClickHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Rect,
    Text,
    Button,
    Container,
    UpdateText,
    UpdateColor,
    UpdateBackground,
    UpdateBorder,
    UpdateShadow,
    UpdateBounds,
}

impl CommandKind {
    pub fn is_update(self) -> bool {
        matches!(
            self,
            CommandKind::UpdateText
                | CommandKind::UpdateColor
                | CommandKind::UpdateBackground
                | CommandKind::UpdateBorder
                | CommandKind::UpdateShadow
                | CommandKind::UpdateBounds
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Border {
    pub color: Color,
    pub width: f32,
    pub radius: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shadow {
    pub color: Color,
    pub offset: Vec2,
    pub blur: f32,
}

#[derive(Clone)]
pub struct PaintCommand {
    pub id: ElementId,
    pub kind: CommandKind,
    /// Absolute bounds on the surface.
    pub bounds: Rect,
    pub text: String,
    pub color: Color,
    pub background: Option<Color>,
    pub border: Option<Border>,
    pub shadow: Option<Shadow>,
    pub on_click: Option<ClickHandler>,
}

impl fmt::Debug for PaintCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaintCommand")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("bounds", &self.bounds)
            .field("text", &self.text)
            .field("color", &self.color)
            .field("background", &self.background)
            .field("border", &self.border)
            .field("shadow", &self.shadow)
            .field("on_click", &self.on_click.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl PaintCommand {
    pub fn new(id: impl Into<ElementId>, kind: CommandKind, bounds: Rect) -> Self {
        Self {
            id: id.into(),
            kind,
            bounds,
            text: String::new(),
            color: Color::BLACK,
            background: None,
            border: None,
            shadow: None,
            on_click: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn background(mut self, background: Color) -> Self {
        self.background = Some(background);
        self
    }

    pub fn border(mut self, border: Border) -> Self {
        self.border = Some(border);
        self
    }

    pub fn shadow(mut self, shadow: Shadow) -> Self {
        self.shadow = Some(shadow);
        self
    }

    pub fn on_click(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_click = Some(Arc::new(f));
        self
    }

    /// Same element, retagged as an update of the given kind.
    pub fn as_update(&self, kind: CommandKind) -> PaintCommand {
        PaintCommand {
            kind,
            ..self.clone()
        }
    }

    /// Replay as paint-context primitives.
    pub fn draw(&self, cx: &mut dyn PaintContext) {
        let rect = self.bounds;
        if let Some(sh) = self.shadow {
            cx.draw_rect(rect.translate(sh.offset), sh.color);
        }
        if let Some(bg) = self.background {
            cx.draw_rect(rect, bg);
        }
        match self.kind {
            CommandKind::Rect => cx.draw_rect(rect, self.color),
            CommandKind::Text | CommandKind::Button | CommandKind::UpdateText => {
                if !self.text.is_empty() {
                    cx.draw_text(&self.text, rect.origin(), self.color);
                }
            }
            _ => {}
        }
        if let Some(b) = self.border {
            let Rect { x, y, w, h } = rect;
            let outline = [
                Vec2::new(x, y),
                Vec2::new(x + w, y),
                Vec2::new(x + w, y + h),
                Vec2::new(x, y + h),
                Vec2::new(x, y),
            ];
            cx.draw_path(&outline, b.color, b.width);
        }
    }
}

/// How a frame's command list relates to the previous one.
#[derive(Clone, Debug)]
pub enum FrameDiff {
    Unchanged,
    /// Same identities in the same order; only properties changed.
    Patch(Vec<PaintCommand>),
    Structural {
        added: Vec<ElementId>,
        removed: Vec<ElementId>,
        reordered: bool,
    },
}

impl FrameDiff {
    pub fn is_structural(&self) -> bool {
        matches!(self, FrameDiff::Structural { .. })
    }

    pub fn updates(&self) -> &[PaintCommand] {
        match self {
            FrameDiff::Patch(u) => u,
            _ => &[],
        }
    }
}

/// Property-level updates for one element present in both frames. A change
/// of kind is not representable as an update and returns `None`.
pub fn diff_command(prev: &PaintCommand, next: &PaintCommand) -> Option<Vec<PaintCommand>> {
    if prev.kind != next.kind {
        return None;
    }
    let mut out = Vec::new();
    if prev.text != next.text && matches!(next.kind, CommandKind::Text | CommandKind::Button) {
        out.push(next.as_update(CommandKind::UpdateText));
    }
    if prev.color != next.color {
        out.push(next.as_update(CommandKind::UpdateColor));
    }
    if prev.background != next.background {
        out.push(next.as_update(CommandKind::UpdateBackground));
    }
    if prev.border != next.border {
        out.push(next.as_update(CommandKind::UpdateBorder));
    }
    if prev.shadow != next.shadow {
        out.push(next.as_update(CommandKind::UpdateShadow));
    }
    if prev.bounds != next.bounds {
        out.push(next.as_update(CommandKind::UpdateBounds));
    }
    Some(out)
}

/// Compare two frames by element identity.
pub fn diff(prev: &[PaintCommand], next: &[PaintCommand]) -> FrameDiff {
    let prev_ids: HashSet<&ElementId> = prev.iter().map(|c| &c.id).collect();
    let next_ids: HashSet<&ElementId> = next.iter().map(|c| &c.id).collect();

    let added: Vec<ElementId> = next
        .iter()
        .filter(|c| !prev_ids.contains(&c.id))
        .map(|c| c.id.clone())
        .collect();
    let removed: Vec<ElementId> = prev
        .iter()
        .filter(|c| !next_ids.contains(&c.id))
        .map(|c| c.id.clone())
        .collect();
    let reordered = added.is_empty()
        && removed.is_empty()
        && prev.iter().zip(next).any(|(a, b)| a.id != b.id);
    if !added.is_empty() || !removed.is_empty() || reordered {
        return FrameDiff::Structural {
            added,
            removed,
            reordered,
        };
    }

    let mut updates = Vec::new();
    for (a, b) in prev.iter().zip(next) {
        match diff_command(a, b) {
            Some(u) => updates.extend(u),
            None => {
                return FrameDiff::Structural {
                    added: vec![b.id.clone()],
                    removed: vec![a.id.clone()],
                    reordered: false,
                };
            }
        }
    }
    if updates.is_empty() {
        FrameDiff::Unchanged
    } else {
        FrameDiff::Patch(updates)
    }
}
