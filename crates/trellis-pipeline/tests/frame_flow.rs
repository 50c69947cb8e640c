use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use trellis_core::*;
use trellis_graph::{CancelToken, FnPass, PassHistory};
use trellis_headless::*;
use trellis_pipeline::*;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// root (column, gap 4)
/// ├── title: "hello"
/// └── row (gap 2)
///     ├── a: 10x10
///     └── b: 20x5
fn demo_tree() -> Tree {
    let tree = Tree::new();
    let root = Element::with_children(
        "root",
        Stack::column(4.0),
        [
            Element::new("title", Label::new("hello")),
            Element::with_children(
                "row",
                Stack::row(2.0),
                [
                    Element::new("a", Block::new(10.0, 10.0, Color::BLACK)),
                    Element::new("b", Block::new(20.0, 5.0, Color::WHITE)),
                ],
            ),
        ],
    );
    tree.set_root(root).unwrap();
    tree
}

fn surface() -> SurfaceHandle {
    SurfaceHandle::new("test", 800, 600)
}

fn retained(tree: Tree) -> (Host, Arc<Mutex<RetainedState>>) {
    let r = RetainedRenderer::new();
    let state = r.state();
    let host = Host::new(tree, Box::new(r), surface(), PipelineConfig::default()).unwrap();
    (host, state)
}

fn immediate(tree: Tree) -> (Host, Arc<Mutex<ImmediateState>>) {
    let r = ImmediateRenderer::new();
    let state = r.state();
    let host = Host::new(tree, Box::new(r), surface(), PipelineConfig::default()).unwrap();
    (host, state)
}

fn set_text(tree: &Tree, id: &str, text: &str) {
    let node = tree.find_by_id(id).unwrap();
    assert!(node.update_widget::<Label>(DirtyFlags::PROPERTIES, |l| l.text = text.into()));
}

#[test]
fn first_frame_lays_out_and_paints_everything() {
    init_logs();
    let tree = demo_tree();
    let (mut host, state) = retained(tree.clone());

    let report = host.frame().unwrap();
    assert_eq!(report.frame, 1);
    assert_eq!(report.mode, FrameMode::Full);
    assert_eq!(report.commands, 5);

    let bounds = |id: &str| tree.find_by_id(id).unwrap().bounds();
    assert_eq!(bounds("root"), Rect::new(0.0, 0.0, 40.0, 30.0));
    assert_eq!(bounds("title"), Rect::new(0.0, 0.0, 40.0, 16.0));
    assert_eq!(bounds("row"), Rect::new(0.0, 20.0, 32.0, 10.0));
    assert_eq!(bounds("b"), Rect::new(12.0, 0.0, 20.0, 5.0));

    let st = state.lock();
    let order: Vec<&str> = st.nodes.keys().map(|k| k.as_str()).collect();
    assert_eq!(order, ["root", "title", "row", "a", "b"]);
    assert_eq!(st.node("b").unwrap().bounds, Rect::new(12.0, 20.0, 20.0, 5.0));
    assert_eq!(st.stats.full_repaints, 1);
    drop(st);

    assert!(tree.dirty_nodes().next().is_none());
    assert!(!host.needs_frame());
}

#[test]
fn single_text_change_is_patched_by_retained_renderer() {
    init_logs();
    let tree = demo_tree();
    let (mut host, state) = retained(tree.clone());
    host.frame().unwrap();

    set_text(&tree, "title", "world");
    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Patched);
    assert_eq!(report.updates, 1);

    let st = state.lock();
    assert_eq!(st.applied.len(), 1);
    assert_eq!(st.applied[0].kind, CommandKind::UpdateText);
    assert_eq!(st.applied[0].id.as_str(), "title");
    assert_eq!(st.node("title").unwrap().text, "world");
    assert_eq!(st.stats.full_repaints, 1);
    assert_eq!(st.stats.patches, 1);
}

#[test]
fn canvas_renderer_falls_back_to_full_repaint() {
    init_logs();
    let tree = demo_tree();
    let (mut host, state) = immediate(tree.clone());
    host.frame().unwrap();

    set_text(&tree, "title", "world");
    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Full);
    assert_eq!(report.updates, 1);

    let st = state.lock();
    assert_eq!(st.stats.rejected_patches, 1);
    assert_eq!(st.stats.full_repaints, 2);
    assert_eq!(st.canvas.texts(), ["world"]);
    assert_eq!(st.frame.len(), 5);
}

#[test]
fn text_change_that_resizes_patches_bounds_too() {
    let tree = demo_tree();
    let (mut host, state) = retained(tree.clone());
    host.frame().unwrap();

    set_text(&tree, "title", "hi");
    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Patched);

    let st = state.lock();
    let applied: Vec<(&str, CommandKind)> = st
        .applied
        .iter()
        .map(|u| (u.id.as_str(), u.kind))
        .collect();
    assert_eq!(
        applied,
        [
            ("root", CommandKind::UpdateBounds),
            ("title", CommandKind::UpdateText),
            ("title", CommandKind::UpdateBounds),
        ]
    );
    assert_eq!(st.node("root").unwrap().bounds.w, 32.0);
}

#[test]
fn clean_tree_skips_the_renderer() {
    let tree = demo_tree();
    let (mut host, state) = retained(tree);
    host.frame().unwrap();

    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Skipped);
    assert_eq!(report.frame, 1);
    assert_eq!(report.commands, 5);
    assert_eq!(host.pipeline().frame_count(), 1);
    assert_eq!(state.lock().stats.full_repaints, 1);
}

#[test]
fn dirty_leaf_marks_its_ancestors() {
    // R(A(X), B)
    let tree = Tree::new();
    let x = Element::new("X", Block::new(5.0, 5.0, Color::BLACK));
    let root = Element::with_children(
        "R",
        Stack::column(0.0),
        [
            Element::with_children("A", Stack::overlay(), [x.clone()]),
            Element::new("B", Block::new(5.0, 5.0, Color::WHITE)),
        ],
    );
    tree.set_root(root).unwrap();
    let (mut host, _state) = retained(tree.clone());
    host.frame().unwrap();

    x.mark_dirty(DirtyFlags::LAYOUT);
    let report = host.frame().unwrap();
    assert_eq!(report.dirty_frontier, 3);
    // Nothing visible changed.
    assert_eq!(report.mode, FrameMode::Skipped);
    assert!(!tree.find_by_id("R").unwrap().is_dirty());
}

#[test]
fn signal_drives_tree_through_effect() {
    init_logs();
    let tree = demo_tree();
    let (mut host, state) = retained(tree.clone());

    let count = signal(0);
    let title = tree.find_by_id("title").unwrap();
    let _fx = {
        let count = count.clone();
        effect(move || {
            let text = format!("count {}", count.get());
            title.update_widget::<Label>(DirtyFlags::PROPERTIES, |l| l.text = text);
        })
    };
    host.frame().unwrap();
    assert_eq!(state.lock().node("title").unwrap().text, "count 0");

    count.set(1);
    assert!(host.needs_frame());
    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Patched);
    assert_eq!(state.lock().node("title").unwrap().text, "count 1");
}

#[test]
fn deferred_effects_flush_before_the_frame() {
    let tree = demo_tree();
    let (mut host, state) = retained(tree.clone());

    let name = signal("a".to_string());
    let title = tree.find_by_id("title").unwrap();
    let _fx = {
        let name = name.clone();
        effect_with(EffectOptions::deferred(), move || {
            let text = name.get();
            title.update_widget::<Label>(DirtyFlags::PROPERTIES, |l| l.text = text);
        })
    };
    host.frame().unwrap();

    name.set("b".into());
    assert!(has_pending_effects());
    assert!(!host.needs_frame());

    let report = host.frame().unwrap();
    assert!(!has_pending_effects());
    assert_eq!(report.mode, FrameMode::Patched);
    assert_eq!(state.lock().node("title").unwrap().text, "b");
}

fn counter_tree(button: Button) -> Tree {
    let tree = Tree::new();
    let root = Element::with_children(
        "root",
        Stack::column(0.0),
        [
            Element::new("label", Label::new("count: 0")),
            Element::new("inc", button),
        ],
    );
    tree.set_root(root).unwrap();
    tree
}

fn click(host: &Host, at: Vec2) -> Option<ElementId> {
    let down = Event::pointer(PointerEventKind::Down(PointerButton::Primary), at);
    let up = Event::pointer(PointerEventKind::Up(PointerButton::Primary), at);
    assert!(host.dispatch(&down).is_some());
    host.dispatch(&up)
}

#[test]
fn click_reaches_the_button_under_the_pointer() {
    let clicks = Arc::new(AtomicUsize::new(0));
    let tree = counter_tree({
        let clicks = clicks.clone();
        Button::new("+", move || {
            clicks.fetch_add(1, Ordering::SeqCst);
        })
    });
    let (mut host, _state) = retained(tree.clone());
    host.frame().unwrap();
    assert_eq!(
        tree.find_by_id("inc").unwrap().bounds(),
        Rect::new(0.0, 16.0, 16.0, 24.0)
    );

    let hit = click(&host, Vec2::new(4.0, 20.0));
    assert_eq!(hit.as_ref().map(|i| i.as_str()), Some("inc"));
    assert_eq!(clicks.load(Ordering::SeqCst), 1);

    let miss = Event::pointer(
        PointerEventKind::Down(PointerButton::Primary),
        Vec2::new(500.0, 500.0),
    );
    assert_eq!(host.dispatch(&miss), None);
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
}

#[test]
fn click_writes_a_signal_that_patches_the_label() {
    init_logs();
    let tree = counter_tree(Button::new("+", || {}));
    let (mut host, state) = retained(tree.clone());

    let count = signal(0);
    let _inc = on_activate("inc", {
        let count = count.clone();
        move || count.update(|c| *c += 1)
    });
    let label = tree.find_by_id("label").unwrap();
    let _fx = {
        let count = count.clone();
        effect(move || {
            let text = format!("count: {}", count.get());
            label.update_widget::<Label>(DirtyFlags::PROPERTIES, |l| l.text = text);
        })
    };
    host.frame().unwrap();

    click(&host, Vec2::new(4.0, 20.0));
    assert_eq!(count.peek(), 1);
    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Patched);
    let st = state.lock();
    assert_eq!(st.node("label").unwrap().text, "count: 1");
    assert_eq!(st.applied.len(), 1);
    assert_eq!(st.applied[0].kind, CommandKind::UpdateText);
    assert_eq!(st.applied[0].id.as_str(), "label");
}

#[test]
fn button_relabels_itself_on_click() {
    let tree = Tree::new();
    let toggle = {
        let tree = tree.clone();
        Button::new("off", move || {
            if let Some(node) = tree.find_by_id("toggle") {
                node.update_widget::<Button>(DirtyFlags::PROPERTIES, |b| {
                    b.label = if b.label == "off" { "on" } else { "off" }.to_string();
                });
            }
        })
    };
    tree.set_root(Element::with_children(
        "root",
        Stack::column(0.0),
        [Element::new("toggle", toggle)],
    ))
    .unwrap();
    let (mut host, state) = retained(tree.clone());
    host.frame().unwrap();

    let at = Vec2::new(4.0, 4.0);
    assert_eq!(click(&host, at).as_ref().map(|i| i.as_str()), Some("toggle"));
    let node = tree.find_by_id("toggle").unwrap();
    assert_eq!(node.read_widget::<Button, _>(|b| b.label.clone()).as_deref(), Some("on"));
    host.frame().unwrap();
    assert_eq!(state.lock().node("toggle").unwrap().text, "on");

    click(&host, at);
    assert_eq!(node.read_widget::<Button, _>(|b| b.label.clone()).as_deref(), Some("off"));
    tree.dispose();
}

#[test]
fn structural_change_forces_full_repaint() {
    let tree = demo_tree();
    let (mut host, state) = retained(tree.clone());
    host.frame().unwrap();

    let root = tree.root().unwrap();
    tree.insert(&root, Element::new("extra", Label::new("new")), 1)
        .unwrap();
    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Full);
    assert_eq!(report.commands, 6);
    {
        let st = state.lock();
        assert_eq!(st.stats.full_repaints, 2);
        assert_eq!(st.node("extra").unwrap().bounds.y, 20.0);
        assert_eq!(st.node("row").unwrap().bounds.y, 40.0);
    }

    let row = tree.find_by_id("row").unwrap();
    assert!(tree.remove(&row));
    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Full);
    let st = state.lock();
    assert!(st.node("a").is_none());
    assert_eq!(st.nodes.len(), 3);
}

#[test]
fn failed_update_repaints_in_the_same_frame() {
    let tree = demo_tree();
    let (mut host, state) = retained(tree.clone());
    host.frame().unwrap();

    state.lock().fail_next_update = true;
    set_text(&tree, "title", "world");
    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Full);
    let st = state.lock();
    assert_eq!(st.stats.full_repaints, 2);
    assert!(st.applied.is_empty());
    assert_eq!(st.node("title").unwrap().text, "world");
}

#[test]
fn unusable_surface_aborts_startup() {
    let err = Host::new(
        demo_tree(),
        Box::new(RetainedRenderer::new()),
        SurfaceHandle::new("", 0, 0),
        PipelineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Render(RenderError::Init { .. })));
}

#[test]
fn resize_remeasures_under_new_constraints() {
    let tree = demo_tree();
    let (mut host, state) = retained(tree.clone());
    host.frame().unwrap();

    host.resize(20, 600);
    assert!(host.needs_frame());
    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Full);
    assert_eq!(tree.find_by_id("title").unwrap().bounds().w, 20.0);
    assert_eq!(host.pipeline().config().root_constraints, Constraints::new(20.0, 600.0));

    let st = state.lock();
    assert_eq!(st.stats.resizes, vec![(20, 600)]);
    assert_eq!(st.stats.full_repaints, 2);
}

#[test]
fn cancelled_frame_leaves_tree_dirty_for_retry() {
    let tree = demo_tree();
    let (host, state) = retained(tree.clone());

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = host.pipeline().run_with(&cancel).unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { ref stage } if stage == MARK));
    assert!(tree.root().unwrap().is_dirty());
    assert_eq!(state.lock().stats.full_repaints, 0);

    let report = host.pipeline().run().unwrap();
    assert_eq!(report.mode, FrameMode::Full);
    assert_eq!(report.frame, 1);
}

#[test]
fn failing_stage_aborts_before_commit_and_retry_converges() {
    let tree = demo_tree();
    let (mut host, state) = retained(tree.clone());

    let failed = Arc::new(AtomicBool::new(false));
    let audit = {
        let failed = failed.clone();
        FnPass::new("audit", move |_: &FrameContext, _, _| {
            if !failed.swap(true, Ordering::SeqCst) {
                anyhow::bail!("audit rejected the layout");
            }
            Ok(StageOutput::Placed(0))
        })
        .after(MEASURE)
    };
    host.pipeline_mut().add_stage(audit).unwrap();

    let err = host.frame().unwrap_err();
    match err {
        PipelineError::Stage { stage, source } => {
            assert_eq!(stage, "audit");
            assert!(source.to_string().contains("rejected"));
        }
        other => panic!("expected stage failure, got {other:?}"),
    }
    assert!(tree.find_by_id("title").unwrap().is_dirty());
    assert_eq!(state.lock().stats.full_repaints, 0);
    assert_eq!(host.pipeline().frame_count(), 0);

    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Full);
    assert_eq!(state.lock().stats.full_repaints, 1);
}

#[test]
fn clean_subtrees_reuse_their_measurement() {
    let tree = demo_tree();
    let (mut host, state) = retained(tree.clone());

    let seen: Arc<Mutex<Vec<(usize, usize)>>> = Arc::default();
    let probe = {
        let seen = seen.clone();
        FnPass::new("probe", move |_: &FrameContext, history: &PassHistory<StageOutput>, _| {
            if let Some(StageOutput::Measured { measured, reused }) = history.get(MEASURE) {
                seen.lock().push((*measured, *reused));
            }
            Ok(StageOutput::Custom(Arc::new(())))
        })
        .after(MEASURE)
    };
    host.pipeline_mut().add_stage(probe).unwrap();
    host.frame().unwrap();

    let b = tree.find_by_id("b").unwrap();
    assert!(b.update_widget::<Block>(DirtyFlags::PAINT, |b| b.color = Color::from_hex("#FF0000")));
    let report = host.frame().unwrap();
    assert_eq!(report.mode, FrameMode::Patched);

    // Only the ancestors of `b` are measured again.
    assert_eq!(*seen.lock(), [(5, 0), (2, 3)]);
    let st = state.lock();
    assert_eq!(st.applied.len(), 1);
    assert_eq!(st.applied[0].kind, CommandKind::UpdateColor);
}

#[test]
fn independent_stages_share_a_level() {
    let tree = demo_tree();
    let (mut host, _state) = retained(tree);

    let runs = Arc::new(AtomicUsize::new(0));
    for name in ["stats", "audit"] {
        let runs = runs.clone();
        host.pipeline_mut()
            .add_stage(
                FnPass::new(name, move |cx: &FrameContext, _, _| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(StageOutput::Custom(Arc::new(cx.tree().node_count())))
                })
                .after(COMMIT)
                .independent(),
            )
            .unwrap();
    }
    let plan = host.pipeline().plan().unwrap();
    assert_eq!(plan.last().unwrap(), &["stats", "audit"]);

    host.frame().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn shutdown_disposes_the_tree() {
    let tree = demo_tree();
    let (mut host, _state) = retained(tree.clone());
    host.frame().unwrap();
    let title = tree.find_by_id("title").unwrap();

    host.shutdown();
    assert!(title.is_disposed());
    assert!(tree.root().is_none());
    assert_eq!(tree.node_count(), 0);
}
