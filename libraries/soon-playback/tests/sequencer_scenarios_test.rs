//! Scenario tests for the playback sequencer
//!
//! Each test drives a full session on a manual clock against the fake
//! backend and checks what a listener (and the audio engine) would see.

use soon_playback::testing::{BackendCall, FakeBackend};
use soon_playback::{
    ClipSet, LoopSlot, ManualClock, PlaybackPhase, PlaybackSequencer, SequencerConfig,
    SequencerError, SequencerEvent, Voice, DEFAULT_DURATIONS,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

// ===== Test Helpers =====

type Sequencer = PlaybackSequencer<FakeBackend, ManualClock>;

fn clips() -> ClipSet {
    ClipSet::new("intro.mp3", "loop.mp3", "outro.mp3")
}

/// Sequencer with default config (intro 5 s, loop 20 s, outro 8 s)
fn sequencer() -> (Sequencer, ManualClock) {
    let clock = ManualClock::new();
    let backend = FakeBackend::new(clock.clone());
    let seq =
        PlaybackSequencer::with_clock(backend, clips(), SequencerConfig::default(), clock.clone())
            .unwrap();
    (seq, clock)
}

/// One-minute sessions with custom clip lengths
fn short_sequencer(intro: u64, loop_secs: u64, outro: u64) -> (Sequencer, ManualClock) {
    let clock = ManualClock::new();
    let backend = FakeBackend::with_lengths(
        clock.clone(),
        Duration::from_secs(intro),
        Duration::from_secs(loop_secs),
        Duration::from_secs(outro),
    );
    let config = SequencerConfig {
        allowed_durations: vec![1],
        default_duration: 1,
        ..Default::default()
    };
    let seq = PlaybackSequencer::with_clock(backend, clips(), config, clock.clone()).unwrap();
    (seq, clock)
}

/// Advance the clock in `step` increments, polling after each
fn run_for(seq: &mut Sequencer, clock: &ManualClock, total: Duration, step: Duration) {
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        clock.advance(step);
        seq.poll();
        elapsed += step;
    }
}

fn record_events(seq: &mut Sequencer) -> Rc<RefCell<Vec<SequencerEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    seq.on_event(move |event| sink.borrow_mut().push(event.clone()));
    events
}

// ===== Lifecycle =====

#[test]
fn start_then_stop_restores_every_duration() {
    let (mut seq, clock) = sequencer();

    for minutes in DEFAULT_DURATIONS {
        seq.configure(minutes).unwrap();
        seq.start().unwrap();
        run_for(&mut seq, &clock, Duration::from_secs(7), Duration::from_millis(100));
        assert_eq!(seq.phase(), PlaybackPhase::Loop);
        assert!(seq.remaining_minutes() < f64::from(minutes));

        seq.stop();
        assert_eq!(seq.phase(), PlaybackPhase::Idle);
        assert_eq!(seq.remaining_minutes(), f64::from(minutes));
    }
}

#[test]
fn fifteen_minute_session_runs_to_completion() {
    let (mut seq, clock) = sequencer();
    let events = record_events(&mut seq);

    seq.configure(15).unwrap();
    seq.start().unwrap();

    run_for(&mut seq, &clock, Duration::from_secs(5), Duration::from_millis(100));
    assert_eq!(seq.phase(), PlaybackPhase::Loop);

    run_for(&mut seq, &clock, Duration::from_secs(884), Duration::from_millis(100));
    assert_eq!(seq.phase(), PlaybackPhase::Loop);
    assert_eq!(seq.countdown().remaining(), Duration::from_secs(11));

    // The tick that reaches 10 s cuts over
    run_for(&mut seq, &clock, Duration::from_secs(1), Duration::from_millis(100));
    assert_eq!(seq.phase(), PlaybackPhase::Outro);
    assert_eq!(seq.countdown().remaining(), Duration::from_secs(10));
    assert!(seq.backend().is_playing(Voice::Outro));
    assert!(!seq.backend().is_playing(Voice::Loop(LoopSlot::A)));
    assert!(!seq.backend().is_playing(Voice::Loop(LoopSlot::B)));

    // Outro is 8 s long
    run_for(&mut seq, &clock, Duration::from_secs(8), Duration::from_millis(100));
    assert_eq!(seq.phase(), PlaybackPhase::Idle);
    assert_eq!(seq.countdown().remaining(), Duration::ZERO);

    let events = events.borrow();
    let outro_at = events
        .iter()
        .position(|e| {
            *e == SequencerEvent::PhaseChanged {
                phase: PlaybackPhase::Outro,
            }
        })
        .unwrap();
    let last_tick = events[..outro_at]
        .iter()
        .rev()
        .find_map(|e| match e {
            SequencerEvent::CountdownTick { remaining_minutes } => Some(*remaining_minutes),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_tick, 10.0 / 60.0);

    let phases: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SequencerEvent::PhaseChanged { phase } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            PlaybackPhase::Intro,
            PlaybackPhase::Loop,
            PlaybackPhase::Outro,
            PlaybackPhase::Idle
        ]
    );
    assert_eq!(events.last(), Some(&SequencerEvent::SessionCompleted));
    assert!(events
        .iter()
        .any(|e| matches!(e, SequencerEvent::CrossfadeCompleted { .. })));
}

#[test]
fn completed_session_can_start_again() {
    let (mut seq, clock) = short_sequencer(5, 20, 4);
    seq.start().unwrap();
    run_for(&mut seq, &clock, Duration::from_secs(60), Duration::from_millis(100));
    assert_eq!(seq.phase(), PlaybackPhase::Idle);
    assert_eq!(seq.countdown().remaining(), Duration::ZERO);

    seq.start().unwrap();
    assert_eq!(seq.phase(), PlaybackPhase::Intro);
    assert_eq!(seq.countdown().remaining(), Duration::from_secs(60));
}

#[test]
fn intro_ending_inside_outro_window_skips_loop() {
    let (mut seq, clock) = short_sequencer(55, 20, 4);
    let events = record_events(&mut seq);

    seq.start().unwrap();
    run_for(&mut seq, &clock, Duration::from_secs(55), Duration::from_millis(100));

    assert_eq!(seq.phase(), PlaybackPhase::Outro);
    assert_eq!(
        seq.backend()
            .count(|c| matches!(c, BackendCall::Play(Voice::Loop(_), _))),
        0
    );
    assert!(!events.borrow().contains(&SequencerEvent::PhaseChanged {
        phase: PlaybackPhase::Loop
    }));
}

#[test]
fn configure_overwrites_previous_duration() {
    let (mut seq, _) = sequencer();
    seq.configure(30).unwrap();
    seq.configure(45).unwrap();
    assert_eq!(seq.countdown().total_minutes(), 45);
    assert_eq!(seq.remaining_minutes(), 45.0);
}

#[test]
fn configure_rejects_unlisted_duration() {
    let (mut seq, _) = sequencer();
    seq.configure(45).unwrap();

    let err = seq.configure(20).unwrap_err();
    assert!(matches!(err, SequencerError::InvalidConfiguration(_)));
    assert_eq!(seq.countdown().total_minutes(), 45);
    assert_eq!(seq.remaining_minutes(), 45.0);
}

// ===== Failures =====

#[test]
fn initialize_failure_leaves_idle() {
    let (mut seq, _) = sequencer();
    seq.backend_mut().set_fail_initialize(true);

    let err = seq.start().unwrap_err();
    assert!(matches!(err, SequencerError::AudioUnavailable(_)));
    assert_eq!(seq.phase(), PlaybackPhase::Idle);
    assert!(!seq.backend().is_playing(Voice::Intro));

    // Nothing cached: the next start retries
    seq.backend_mut().set_fail_initialize(false);
    seq.start().unwrap();
    assert_eq!(seq.phase(), PlaybackPhase::Intro);
    assert_eq!(seq.backend().initialize_attempts(), 2);
}

#[test]
fn intro_failure_leaves_nothing_playing() {
    let (mut seq, clock) = sequencer();
    seq.backend_mut().set_fail_play(Voice::Intro, true);

    let err = seq.start().unwrap_err();
    assert!(matches!(err, SequencerError::AudioUnavailable(_)));
    assert_eq!(seq.phase(), PlaybackPhase::Idle);
    assert!(Voice::ALL.iter().all(|&v| !seq.backend().is_playing(v)));

    // No ticker was started
    run_for(&mut seq, &clock, Duration::from_secs(3), Duration::from_millis(500));
    assert_eq!(seq.remaining_minutes(), 30.0);
}

#[test]
fn failed_restart_keeps_finished_countdown() {
    let (mut seq, clock) = short_sequencer(5, 20, 4);
    seq.start().unwrap();
    run_for(&mut seq, &clock, Duration::from_secs(60), Duration::from_millis(100));
    assert_eq!(seq.remaining_minutes(), 0.0);

    let events = record_events(&mut seq);
    seq.backend_mut().set_fail_play(Voice::Intro, true);

    let err = seq.start().unwrap_err();
    assert!(matches!(err, SequencerError::AudioUnavailable(_)));
    assert_eq!(seq.phase(), PlaybackPhase::Idle);
    assert_eq!(seq.remaining_minutes(), 0.0);
    assert_eq!(seq.countdown().remaining(), Duration::ZERO);
    assert!(!events
        .borrow()
        .iter()
        .any(|e| matches!(e, SequencerEvent::CountdownTick { .. })));

    // The rewind happens once the intro actually plays
    seq.backend_mut().set_fail_play(Voice::Intro, false);
    seq.start().unwrap();
    assert_eq!(seq.remaining_minutes(), 1.0);
    assert!(events
        .borrow()
        .contains(&SequencerEvent::CountdownTick { remaining_minutes: 1.0 }));
}

#[test]
fn outro_failure_tears_down_with_error_event() {
    let (mut seq, clock) = short_sequencer(5, 20, 4);
    let events = record_events(&mut seq);
    seq.backend_mut().set_fail_play(Voice::Outro, true);

    seq.start().unwrap();
    run_for(&mut seq, &clock, Duration::from_secs(51), Duration::from_millis(100));

    assert_eq!(seq.phase(), PlaybackPhase::Idle);
    assert_eq!(seq.remaining_minutes(), 1.0);
    assert!(Voice::ALL.iter().all(|&v| !seq.backend().is_playing(v)));
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, SequencerEvent::Error { .. })));
}

#[test]
fn stalled_host_restarts_the_loop() {
    let (mut seq, clock) = sequencer();
    seq.start().unwrap();
    run_for(&mut seq, &clock, Duration::from_secs(5), Duration::from_millis(100));
    assert_eq!(seq.phase(), PlaybackPhase::Loop);

    // Jump straight past the end of slot A
    clock.advance(Duration::from_secs(25));
    seq.poll();

    assert_eq!(seq.phase(), PlaybackPhase::Loop);
    assert!(seq.backend().is_playing(Voice::Loop(LoopSlot::A)));
    assert_eq!(seq.countdown().remaining(), Duration::from_secs(30 * 60 - 30));
}

// ===== Metering =====

#[test]
fn level_is_mean_magnitude_while_playing() {
    let (mut seq, clock) = sequencer();
    let levels = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&levels);
    seq.on_level_sample(move |level| sink.borrow_mut().push(level));

    seq.backend_mut().set_spectrum(vec![0.2, 0.4, 0.6]);
    seq.start().unwrap();
    run_for(&mut seq, &clock, Duration::from_millis(500), Duration::from_millis(16));

    assert!((seq.level() - 0.4).abs() < 1e-6);
    // Published once, not on every poll
    assert_eq!(levels.borrow().len(), 1);

    seq.stop();
    assert_eq!(seq.level(), 0.0);
    assert_eq!(levels.borrow().last(), Some(&0.0));

    let reads = seq.backend().analysis_reads();
    run_for(&mut seq, &clock, Duration::from_secs(1), Duration::from_millis(16));
    assert_eq!(seq.backend().analysis_reads(), reads);
    assert_eq!(levels.borrow().len(), 2);
}

#[test]
fn countdown_listener_sees_each_tick() {
    let (mut seq, clock) = sequencer();
    let ticks = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&ticks);
    seq.on_countdown_tick(move |minutes| sink.borrow_mut().push(minutes));

    seq.configure(15).unwrap();
    seq.start().unwrap();
    run_for(&mut seq, &clock, Duration::from_secs(3), Duration::from_millis(50));

    let ticks = ticks.borrow();
    assert_eq!(
        *ticks,
        vec![
            15.0,
            899.0 / 60.0,
            898.0 / 60.0,
            897.0 / 60.0
        ]
    );
}
