use std::any::Any;

use crate::input::Event;
use crate::paint::{ClickHandler, PaintCommand};
use crate::render_api::PaintContext;
use crate::{Constraints, ElementId, Rect, Size};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// How an element arranges its children. The pipeline lays out containers
/// from this alone and never inspects the concrete widget type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LayoutKind {
    /// Sized by `measure`; children (if any) sit at its origin.
    Leaf,
    /// Children one after another along `axis`, `gap` apart.
    Stack { axis: Axis, gap: f32 },
    /// Children on top of each other; size is the largest child.
    Overlay,
}

impl LayoutKind {
    pub fn row(gap: f32) -> Self {
        LayoutKind::Stack {
            axis: Axis::Horizontal,
            gap,
        }
    }

    pub fn column(gap: f32) -> Self {
        LayoutKind::Stack {
            axis: Axis::Vertical,
            gap,
        }
    }
}

/// What a widget did with an event.
#[derive(Clone, Default)]
pub enum EventResponse {
    #[default]
    Ignored,
    Consumed,
    /// Consumed, and the widget was activated (a click). The callback and the
    /// element's [`on_activate`](crate::on_activate) handlers run once the
    /// widget has been released, so they may read or update it.
    Activated(Option<ClickHandler>),
}

impl EventResponse {
    pub fn is_consumed(&self) -> bool {
        !matches!(self, EventResponse::Ignored)
    }
}

impl std::fmt::Debug for EventResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventResponse::Ignored => f.write_str("Ignored"),
            EventResponse::Consumed => f.write_str("Consumed"),
            EventResponse::Activated(cb) => f
                .debug_tuple("Activated")
                .field(&cb.as_ref().map(|_| "<callback>"))
                .finish(),
        }
    }
}

/// The payload an element carries.
pub trait Widget: Any + Send + Sync {
    fn layout(&self) -> LayoutKind {
        LayoutKind::Leaf
    }

    /// Size of a leaf under `constraints`. Containers are sized from their
    /// children and only consult this for padding-free fallbacks.
    fn measure(&self, constraints: Constraints) -> Size;

    /// Preferred size regardless of constraints, if the widget has one.
    fn intrinsic_size(&self) -> Option<Size> {
        None
    }

    /// The command the commit stage emits for this element; `None` for
    /// invisible elements.
    fn command(&self, _id: &ElementId, _bounds: Rect) -> Option<PaintCommand> {
        None
    }

    /// Immediate-mode painting; the default replays [`command`](Widget::command).
    fn paint(&self, id: &ElementId, bounds: Rect, cx: &mut dyn PaintContext) {
        if let Some(cmd) = self.command(id, bounds) {
            cmd.draw(cx);
        }
    }

    /// Runs with the payload locked; anything that touches the element
    /// again belongs in the [`EventResponse::Activated`] callback.
    fn handle_event(&mut self, _event: &Event) -> EventResponse {
        EventResponse::Ignored
    }

    fn dispose(&mut self) {}

    fn debug_name(&self) -> &str {
        "widget"
    }
}

impl dyn Widget {
    pub fn downcast_ref<W: Widget>(&self) -> Option<&W> {
        (self as &dyn Any).downcast_ref::<W>()
    }

    pub fn downcast_mut<W: Widget>(&mut self) -> Option<&mut W> {
        (self as &mut dyn Any).downcast_mut::<W>()
    }
}
