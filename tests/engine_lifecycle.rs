use std::cell::RefCell;
use std::rc::Rc;

use glyphdance::engine::{Engine, EngineState};
use glyphdance::options::{DanceOptions, OptionsPatch, SizeMode};
use glyphdance::scheduler::ManualScheduler;
use glyphdance::surface::FixedHost;
use glyphdance::text_surface::TextSurface;

type Handles = (
    Engine,
    Rc<RefCell<TextSurface>>,
    Rc<RefCell<FixedHost>>,
    Rc<RefCell<ManualScheduler>>,
);

fn build(options: DanceOptions, width: f32, height: f32) -> Handles {
    let surface = Rc::new(RefCell::new(TextSurface::new()));
    let host = Rc::new(RefCell::new(FixedHost::new(width, height)));
    let scheduler = Rc::new(RefCell::new(ManualScheduler::new()));
    let engine = Engine::new(
        Box::new(surface.clone()),
        Box::new(host.clone()),
        Box::new(scheduler.clone()),
        options,
    )
    .expect("engine construction");
    (engine, surface, host, scheduler)
}

#[test]
fn restart_never_stacks_a_second_loop() {
    let (mut engine, _surface, _host, scheduler) = build(DanceOptions::default(), 120.0, 60.0);

    engine.start();
    engine.stop();
    engine.start();
    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(
        scheduler.borrow().outstanding(),
        1,
        "restart must leave exactly one active frame schedule"
    );

    // Driving frames keeps it at one.
    engine.tick(0.0);
    engine.tick(16.7);
    assert_eq!(scheduler.borrow().outstanding(), 1);
}

#[test]
fn font_patch_changes_glyph_spacing_on_the_very_next_frame() {
    let (mut engine, surface, _host, _scheduler) = build(DanceOptions::default(), 120.0, 60.0);
    engine.start();
    engine.tick(0.0);

    let step_before = surface.borrow().ops()[1].x - surface.borrow().ops()[0].x;

    let patch = OptionsPatch {
        font_px: Some(20.0),
        ..OptionsPatch::default()
    };
    engine.update(&patch).expect("font patch");
    engine.tick(16.7);

    let ops = surface.borrow().ops().to_vec();
    let step_after = ops[1].x - ops[0].x;
    assert!(
        step_after > step_before,
        "new font size must widen the glyph step immediately ({step_before} -> {step_after})"
    );
    let (glyph_w, _) = engine.glyph_metrics();
    assert_eq!(step_after, glyph_w);
}

#[test]
fn resize_is_safe_before_the_first_frame() {
    let (mut engine, surface, host, _scheduler) = build(DanceOptions::default(), 120.0, 60.0);
    host.borrow_mut().set_viewport(240.0, 60.0);
    engine.resize().expect("resize before start");

    engine.start();
    engine.tick(0.0);
    let wide_cols = surface.borrow().to_text().lines().next().map(str::len);

    host.borrow_mut().set_viewport(120.0, 60.0);
    engine.resize().expect("resize while running");
    engine.tick(16.7);
    let narrow_cols = surface.borrow().to_text().lines().next().map(str::len);

    assert!(wide_cols > narrow_cols, "{wide_cols:?} vs {narrow_cols:?}");
}

#[test]
fn element_sizing_mode_watches_element_bounds() {
    let mut options = DanceOptions::default();
    options.size_mode = SizeMode::Element;
    let (mut engine, surface, host, _scheduler) = build(options, 500.0, 500.0);

    host.borrow_mut().set_element_size(Some((70.0, 30.0)));
    engine.resize().expect("element resize");
    engine.start();
    assert_eq!(host.borrow().watching(), Some(SizeMode::Element));

    engine.tick(0.0);
    // Cell is 7.2 x 16.2 at the default 12px font, so 70 x 30 CSS px holds
    // 10 columns and 2 rows with margin against float step drift.
    let text = surface.borrow().to_text();
    assert_eq!(text.lines().count(), 2);
    assert!(text.lines().all(|line| line.len() == 10));
}

#[test]
fn stop_cancels_the_scheduled_frame() {
    let (mut engine, surface, _host, scheduler) = build(DanceOptions::default(), 120.0, 60.0);
    engine.start();
    engine.stop();
    assert_eq!(scheduler.borrow().outstanding(), 0);

    // A late callback delivery after stop must not render.
    engine.tick(0.0);
    assert!(surface.borrow().ops().is_empty());
}

#[test]
fn getters_expose_the_live_configuration() {
    let (mut engine, _surface, _host, _scheduler) = build(DanceOptions::default(), 120.0, 60.0);
    assert_eq!(engine.options().seed, 1337);

    let patch = OptionsPatch {
        seed: Some(99),
        ..OptionsPatch::default()
    };
    engine.update(&patch).expect("seed patch");
    assert_eq!(engine.options().seed, 99);
}
