pub use crate::batch::{Transaction, batch, batch_value, transaction};
pub use crate::color::Color;
pub use crate::effects::{Dispose, Effect, effect, effect_with, on_cleanup, untrack, watch};
pub use crate::element::{DirtyFlags, Element, ElementId};
pub use crate::error::{ReactiveError, RenderError, TreeError};
pub use crate::geometry::{Constraints, Rect, Size, Transform, Vec2};
pub use crate::handlers::on_activate;
pub use crate::input::{Event, EventKind, Key, Modifiers, PointerEventKind};
pub use crate::memo::{Memo, memo};
pub use crate::paint::{CommandKind, FrameDiff, PaintCommand};
pub use crate::reactive::{EffectOptions, flush_effects};
pub use crate::render_api::{PaintContext, Renderer, SurfaceHandle};
pub use crate::scope::{Scope, current_scope};
pub use crate::signal::{Signal, signal};
pub use crate::tree::Tree;
pub use crate::widget::{Axis, EventResponse, LayoutKind, Widget};
