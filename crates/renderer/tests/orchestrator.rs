use performance::{Color, Line, PerformanceModel, Point};
use renderer::{
    FrameOrchestrator, ManualTimeSource, OrchestratorOptions, OrchestratorState, RenderError,
};

const WIDTH: u32 = 600;
const HEIGHT: u32 = 300;
/// `WIDTH / (HEIGHT / 6)`.
const SLOT: f64 = 12.0;

fn model() -> PerformanceModel {
    let rising = (0..=40)
        .map(|i| {
            let time = f64::from(i) * 2.5;
            Point::new(time, 48.0 + f64::from(i % 24), i == 0, i == 40)
        })
        .collect();
    let mut phrased = Vec::new();
    for phrase in 0..20 {
        let start = f64::from(phrase) * 5.0;
        phrased.push(Point::new(start, 60.0, true, false));
        phrased.push(Point::new(start + 1.0, 67.0, false, false));
        phrased.push(Point::new(start + 3.0, 64.0, false, true));
    }
    PerformanceModel {
        duration: 100.0,
        min_note: 48.0,
        max_note: 72.0,
        lines: vec![
            Line::new(rising, Color::from_hsl(0.0, 1.0, 0.6)),
            Line::new(phrased, Color::from_hsl(180.0, 1.0, 0.6)),
        ],
    }
}

fn session(start: f64) -> (FrameOrchestrator, ManualTimeSource) {
    let clock = ManualTimeSource::new(start);
    let orchestrator = FrameOrchestrator::new(
        model(),
        WIDTH,
        HEIGHT,
        OrchestratorOptions::default(),
        Box::new(clock.clone()),
    )
    .unwrap();
    (orchestrator, clock)
}

#[test]
fn first_tick_fills_both_slots() -> Result<(), RenderError> {
    let (mut orchestrator, _clock) = session(0.0);
    assert_eq!(orchestrator.state(), OrchestratorState::Init);

    let report = orchestrator.tick()?;
    assert_eq!(report.state, OrchestratorState::Resizing);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.blitted, 0);
    assert_eq!(orchestrator.committed_time(), SLOT);

    orchestrator.wait_for_pending()?;
    assert_eq!(orchestrator.state(), OrchestratorState::Running);
    assert_eq!(orchestrator.slot_boundary(0), Some(0.0));
    assert_eq!(orchestrator.slot_boundary(1), Some(SLOT));

    let report = orchestrator.tick()?;
    assert_eq!(report.state, OrchestratorState::Running);
    assert_eq!(report.dispatched, 0);
    // Only the older slot has scrolled into view at the start.
    assert_eq!(report.blitted, 1);
    Ok(())
}

#[test]
fn fill_quantizes_to_slot_boundaries() -> Result<(), RenderError> {
    let (mut orchestrator, _clock) = session(30.0);
    orchestrator.tick()?;
    orchestrator.wait_for_pending()?;
    assert_eq!(orchestrator.slot_boundary(0), Some(24.0));
    assert_eq!(orchestrator.slot_boundary(1), Some(36.0));
    assert_eq!(orchestrator.committed_time(), 36.0);

    let report = orchestrator.tick()?;
    assert_eq!(report.blitted, 2);
    Ok(())
}

#[test]
fn every_crossing_rotates_once() -> Result<(), RenderError> {
    let (mut orchestrator, clock) = session(0.0);
    orchestrator.tick()?;
    orchestrator.wait_for_pending()?;

    let mut committed = orchestrator.committed_time();
    let mut crossings = 0;
    for step in 1..=24 {
        clock.set(f64::from(step) * 5.0);
        let report = orchestrator.tick()?;
        orchestrator.wait_for_pending()?;

        if report.time > committed {
            crossings += 1;
            assert_eq!(report.dispatched, 1, "step {step}");
            committed += SLOT;
        } else {
            assert_eq!(report.dispatched, 0, "step {step}");
        }
        assert_eq!(orchestrator.committed_time(), committed);
        assert_eq!(orchestrator.rotations(), crossings);
        assert_eq!(orchestrator.older_slot() as u64, crossings % 2);

        let newer = (orchestrator.older_slot() + 1) % 2;
        assert_eq!(orchestrator.slot_boundary(newer), Some(committed));
        assert_eq!(
            orchestrator.slot_boundary(orchestrator.older_slot()),
            Some(committed - SLOT)
        );
    }
    assert_eq!(crossings, 9);
    Ok(())
}

#[test]
fn in_flight_render_blocks_further_dispatch() -> Result<(), RenderError> {
    let (mut orchestrator, clock) = session(0.0);
    orchestrator.tick()?;
    orchestrator.wait_for_pending()?;

    clock.set(13.0);
    let first = orchestrator.tick()?;
    assert_eq!(first.dispatched, 1);

    let mut dispatched = 0;
    for _ in 0..5 {
        clock.advance(0.01);
        if orchestrator.pending_renders() == 0 {
            break;
        }
        dispatched += orchestrator.tick()?.dispatched;
    }
    assert_eq!(dispatched, 0);

    orchestrator.wait_for_pending()?;
    assert_eq!(orchestrator.committed_time(), 2.0 * SLOT);
    assert_eq!(orchestrator.rotations(), 1);
    Ok(())
}

/// Slot duration and first boundary the orchestrator derives for a size at
/// `time`, with the default six seconds per screen height.
fn slots_for(width: u32, height: u32, time: f64) -> (f64, f64) {
    let slot = f64::from(width) / (f64::from(height) / 6.0);
    (slot, time - time.rem_euclid(slot))
}

#[test]
fn resize_invalidates_both_slots() -> Result<(), RenderError> {
    let (mut orchestrator, clock) = session(20.0);
    orchestrator.tick()?;
    orchestrator.wait_for_pending()?;
    assert!(orchestrator.tick()?.blitted > 0);

    clock.set(21.0);
    orchestrator.resize(450, 300);
    let report = orchestrator.tick()?;
    assert_eq!(report.state, OrchestratorState::Resizing);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.blitted, 0);
    assert!(!orchestrator.slot_ready(0));
    assert!(!orchestrator.slot_ready(1));
    assert_eq!(orchestrator.frame().width(), 450);
    assert_eq!(orchestrator.frame().height(), 300);

    // A second resize before the refill lands makes those renders stale.
    // Every size involved gives a different slot duration, so a stale image
    // would show up as a wrong boundary or size.
    let (stale_slot, stale_base) = slots_for(450, 300, 21.0);
    let (slot, base) = slots_for(500, 200, 21.0);
    assert_ne!(stale_slot, slot);
    assert_ne!(slot, SLOT);

    orchestrator.resize(500, 200);
    let mut report = orchestrator.tick()?;
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.blitted, 0);
    for _ in 0..200 {
        let ready = (0..2).filter(|&index| orchestrator.slot_ready(index)).count();
        for index in 0..2 {
            if let Some(size) = orchestrator.slot_size(index) {
                assert_eq!(size, (500, 200), "slot {index}");
            }
        }
        assert!(report.blitted <= ready, "{report:?} with {ready} ready");
        if ready == 2 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
        report = orchestrator.tick()?;
    }
    orchestrator.wait_for_pending()?;
    assert_eq!(orchestrator.state(), OrchestratorState::Running);
    assert_eq!(orchestrator.layout().width, 500);

    assert_eq!(orchestrator.slot_size(0), Some((500, 200)));
    assert_eq!(orchestrator.slot_size(1), Some((500, 200)));
    assert_eq!(orchestrator.slot_boundary(0), Some(base));
    assert_eq!(orchestrator.slot_boundary(1), Some(base + slot));
    assert_ne!(orchestrator.slot_boundary(0), Some(stale_base));
    assert_ne!(orchestrator.slot_boundary(1), Some(stale_base + stale_slot));
    assert_eq!(orchestrator.committed_time(), base + slot);
    assert!(orchestrator.tick()?.blitted > 0);
    Ok(())
}

#[test]
fn zero_sized_viewport_suspends_rendering() -> Result<(), RenderError> {
    let (mut orchestrator, _clock) = session(5.0);
    orchestrator.resize(0, 0);
    let report = orchestrator.tick()?;
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.blitted, 0);
    assert_eq!(orchestrator.pending_renders(), 0);

    let report = orchestrator.tick()?;
    assert_eq!(report.dispatched, 0);

    orchestrator.resize(300, 150);
    assert_eq!(orchestrator.tick()?.dispatched, 2);
    Ok(())
}

#[test]
fn composed_frame_is_buffer_left_of_rift_and_empty_past_it() -> Result<(), RenderError> {
    let (mut orchestrator, _clock) = session(0.0);
    orchestrator.tick()?;
    orchestrator.wait_for_pending()?;
    orchestrator.tick()?;

    let rift_start = orchestrator.layout().rift_start as u32;
    let frame = orchestrator.frame_mut();
    assert_eq!(frame.pixel(10, 10)[3], 255);
    assert_eq!(frame.pixel(rift_start - 1, 2)[3], 255);
    assert_eq!(frame.pixel(WIDTH - 5, 2)[3], 0);
    Ok(())
}
