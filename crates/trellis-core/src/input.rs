use web_time::Instant;

use crate::Vec2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PointerId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
    Pen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    Primary,   // Left mouse, touch
    Secondary, // Right mouse
    Tertiary,  // Middle mouse
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerEventKind {
    Down(PointerButton),
    Up(PointerButton),
    Move,
    Cancel,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointerEvent {
    pub id: PointerId,
    pub kind: PointerKind,
    pub event: PointerEventKind,
    pub position: Vec2,
    pub modifiers: Modifiers,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        /// Cmd on Mac, Win key on Windows
        const META = 1 << 3;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Character(char),
    Enter,
    Tab,
    Backspace,
    Delete,
    Escape,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Space,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub modifiers: Modifiers,
    pub pressed: bool,
    pub is_repeat: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    Pointer(PointerEvent),
    Key(KeyEvent),
    Text(String),
    Focus(bool),
}

/// An input event delivered to widgets, root first.
#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: Instant,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Instant::now(),
        }
    }

    pub fn pointer(event: PointerEventKind, position: Vec2) -> Self {
        Self::new(EventKind::Pointer(PointerEvent {
            id: PointerId(0),
            kind: PointerKind::Mouse,
            event,
            position,
            modifiers: Modifiers::empty(),
        }))
    }

    pub fn key(key: Key, modifiers: Modifiers) -> Self {
        Self::new(EventKind::Key(KeyEvent {
            key,
            modifiers,
            pressed: true,
            is_repeat: false,
        }))
    }

    pub fn tag(&self) -> &'static str {
        match self.kind {
            EventKind::Pointer(_) => "pointer",
            EventKind::Key(_) => "key",
            EventKind::Text(_) => "text",
            EventKind::Focus(_) => "focus",
        }
    }

    /// Position for pointer events; `None` for everything else.
    pub fn position(&self) -> Option<Vec2> {
        match &self.kind {
            EventKind::Pointer(p) => Some(p.position),
            _ => None,
        }
    }

    /// The same event with its position shifted by `-offset`.
    pub fn localized(&self, offset: Vec2) -> Event {
        let mut ev = self.clone();
        if let EventKind::Pointer(p) = &mut ev.kind {
            p.position = Vec2::new(p.position.x - offset.x, p.position.y - offset.y);
        }
        ev
    }
}
