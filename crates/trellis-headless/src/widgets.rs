//! Minimal widgets with deterministic metrics.
//!
//! Text is measured as a fixed-width font: every char is `CHAR_WIDTH` wide
//! and a line is `LINE_HEIGHT` tall.

use std::sync::Arc;

use trellis_core::{
    Border, ClickHandler, Color, CommandKind, Constraints, ElementId, Event, EventKind,
    EventResponse, LayoutKind, PaintCommand, PointerEventKind, Rect, Size, Widget,
};

pub const CHAR_WIDTH: f32 = 8.0;
pub const LINE_HEIGHT: f32 = 16.0;

fn text_size(text: &str) -> Size {
    Size::new(text.chars().count() as f32 * CHAR_WIDTH, LINE_HEIGHT)
}

#[derive(Clone, Debug)]
pub struct Label {
    pub text: String,
    pub color: Color,
}

impl Label {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: Color::BLACK,
        }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

impl Widget for Label {
    fn measure(&self, constraints: Constraints) -> Size {
        constraints.constrain(text_size(&self.text))
    }

    fn command(&self, id: &ElementId, bounds: Rect) -> Option<PaintCommand> {
        Some(
            PaintCommand::new(id.clone(), CommandKind::Text, bounds)
                .text(self.text.clone())
                .color(self.color),
        )
    }

    fn debug_name(&self) -> &str {
        "label"
    }
}

pub struct Button {
    pub label: String,
    pub padding: f32,
    pub on_click: Option<ClickHandler>,
    pub pressed: bool,
}

impl Button {
    pub fn new(label: impl Into<String>, on_click: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            padding: 4.0,
            on_click: Some(Arc::new(on_click)),
            pressed: false,
        }
    }
}

impl Widget for Button {
    fn measure(&self, constraints: Constraints) -> Size {
        let t = text_size(&self.label);
        constraints.constrain(Size::new(
            t.width + self.padding * 2.0,
            t.height + self.padding * 2.0,
        ))
    }

    fn command(&self, id: &ElementId, bounds: Rect) -> Option<PaintCommand> {
        let mut cmd = PaintCommand::new(id.clone(), CommandKind::Button, bounds)
            .text(self.label.clone())
            .background(Color::from_hex("#E0E0E0"))
            .border(Border {
                color: Color::from_hex("#9E9E9E"),
                width: 1.0,
                radius: 4.0,
            });
        cmd.on_click = self.on_click.clone();
        Some(cmd)
    }

    /// Clicks on release after a press inside the button. The callback runs
    /// after dispatch releases the button, so it may relabel it.
    fn handle_event(&mut self, event: &Event) -> EventResponse {
        let EventKind::Pointer(p) = &event.kind else {
            return EventResponse::Ignored;
        };
        match p.event {
            PointerEventKind::Down(_) => {
                self.pressed = true;
                EventResponse::Consumed
            }
            PointerEventKind::Up(_) if std::mem::take(&mut self.pressed) => {
                EventResponse::Activated(self.on_click.clone())
            }
            PointerEventKind::Cancel => {
                self.pressed = false;
                EventResponse::Ignored
            }
            _ => EventResponse::Ignored,
        }
    }

    fn debug_name(&self) -> &str {
        "button"
    }
}

/// A container laid out by [`LayoutKind`]; paints a `Container` command with
/// an optional background.
#[derive(Clone, Debug)]
pub struct Stack {
    pub layout: LayoutKind,
    pub background: Option<Color>,
}

impl Stack {
    pub fn column(gap: f32) -> Self {
        Self {
            layout: LayoutKind::column(gap),
            background: None,
        }
    }

    pub fn row(gap: f32) -> Self {
        Self {
            layout: LayoutKind::row(gap),
            background: None,
        }
    }

    pub fn overlay() -> Self {
        Self {
            layout: LayoutKind::Overlay,
            background: None,
        }
    }

    pub fn background(mut self, color: Color) -> Self {
        self.background = Some(color);
        self
    }
}

impl Widget for Stack {
    fn layout(&self) -> LayoutKind {
        self.layout
    }

    fn measure(&self, _constraints: Constraints) -> Size {
        Size::ZERO
    }

    fn command(&self, id: &ElementId, bounds: Rect) -> Option<PaintCommand> {
        let cmd = PaintCommand::new(id.clone(), CommandKind::Container, bounds);
        Some(match self.background {
            Some(bg) => cmd.background(bg),
            None => cmd,
        })
    }

    fn debug_name(&self) -> &str {
        "stack"
    }
}

/// A solid rectangle with a fixed size.
#[derive(Clone, Debug)]
pub struct Block {
    pub size: Size,
    pub color: Color,
}

impl Block {
    pub fn new(width: f32, height: f32, color: Color) -> Self {
        Self {
            size: Size::new(width, height),
            color,
        }
    }
}

impl Widget for Block {
    fn measure(&self, constraints: Constraints) -> Size {
        constraints.constrain(self.size)
    }

    fn intrinsic_size(&self) -> Option<Size> {
        Some(self.size)
    }

    fn command(&self, id: &ElementId, bounds: Rect) -> Option<PaintCommand> {
        Some(PaintCommand::new(id.clone(), CommandKind::Rect, bounds).color(self.color))
    }

    fn debug_name(&self) -> &str {
        "block"
    }
}

/// An invisible leaf with a fixed size; emits no paint command.
#[derive(Clone, Debug)]
pub struct Spacer(pub Size);

impl Widget for Spacer {
    fn measure(&self, constraints: Constraints) -> Size {
        constraints.constrain(self.0)
    }

    fn debug_name(&self) -> &str {
        "spacer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{PointerButton, Vec2};

    #[test]
    fn label_metrics_are_fixed_width() {
        let l = Label::new("hello");
        assert_eq!(l.measure(Constraints::default()), Size::new(40.0, 16.0));
        assert_eq!(
            l.measure(Constraints::new(10.0, 100.0)),
            Size::new(10.0, 16.0)
        );
    }

    #[test]
    fn button_activates_on_press_then_release() {
        let mut b = Button::new("ok", || {});
        let up = Event::pointer(PointerEventKind::Up(PointerButton::Primary), Vec2::ZERO);
        assert!(!b.handle_event(&up).is_consumed());
        let down = Event::pointer(PointerEventKind::Down(PointerButton::Primary), Vec2::ZERO);
        assert!(matches!(b.handle_event(&down), EventResponse::Consumed));
        assert!(matches!(b.handle_event(&up), EventResponse::Activated(Some(_))));
        assert!(!b.pressed);
        assert!(!b.handle_event(&up).is_consumed());
    }
}
