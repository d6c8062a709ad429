//! Host loop for one sleep session
//!
//! Drives `poll()` at the configured rate until the sequencer is back in
//! `Idle`, logging what a presentation layer would show: phase changes, the
//! countdown once per whole minute and, optionally, the VU needle.

use crate::config::HostSettings;
use crate::error::Result;
use soon_playback::{
    AudioBackend, Clock, NeedleBallistics, PlaybackPhase, PlaybackSequencer, SequencerEvent,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wobble applied to the needle while playing, in degrees
const NEEDLE_JITTER: f32 = 2.0;

/// What happened during a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    /// Every phase entered, in order
    pub phases: Vec<PlaybackPhase>,
    /// The outro played to its end
    pub completed: bool,
    /// Failures reported by the sequencer
    pub errors: Vec<String>,
    /// Host time spent in the loop
    pub elapsed: Duration,
    /// Highest level published
    pub peak_level: f32,
    /// Countdown left when the session ended, in minutes
    pub remaining_minutes: f64,
}

/// Start the configured session and poll it until it ends
///
/// Takes the sequencer, so the listeners registered here are only ever
/// registered once. `sleep` waits one host frame; tests pass a closure that
/// advances a manual clock instead.
pub fn run_session<B, C>(
    mut sequencer: PlaybackSequencer<B, C>,
    host: &HostSettings,
    mut sleep: impl FnMut(Duration),
) -> Result<SessionReport>
where
    B: AudioBackend,
    C: Clock,
{
    let report = Rc::new(RefCell::new(SessionReport::default()));

    {
        let report = Rc::clone(&report);
        sequencer.on_phase_change(move |phase| {
            info!(%phase, "Phase changed");
            report.borrow_mut().phases.push(phase);
        });
    }

    sequencer.on_countdown_tick(|remaining_minutes| {
        let secs = (remaining_minutes * 60.0).round() as u64;
        if secs % 60 == 0 {
            info!(remaining = %format!("{:02}:{:02}", secs / 60, secs % 60), "Countdown");
        }
    });

    {
        let report = Rc::clone(&report);
        sequencer.on_level_sample(move |level| {
            let mut report = report.borrow_mut();
            report.peak_level = report.peak_level.max(level);
        });
    }

    {
        let report = Rc::clone(&report);
        sequencer.on_event(move |event| match event {
            SequencerEvent::SessionCompleted => report.borrow_mut().completed = true,
            SequencerEvent::Error { message } => {
                warn!("Session stopped: {}", message);
                report.borrow_mut().errors.push(message.clone());
            }
            SequencerEvent::CrossfadeStarted { from, to, .. } => {
                debug!(?from, ?to, "Loop crossfade");
            }
            _ => {}
        });
    }

    info!(
        minutes = sequencer.countdown().total_minutes(),
        poll_hz = host.poll_hz,
        "Starting session"
    );
    sequencer.start()?;

    let frame = host.frame();
    let started = sequencer.clock().now();
    let meter_every = u64::from(host.poll_hz.max(1));
    let mut needle = NeedleBallistics::new().with_jitter(NEEDLE_JITTER);
    let mut frames: u64 = 0;

    while sequencer.phase().is_playing() {
        sleep(frame);
        sequencer.poll();
        frames += 1;

        if host.meter {
            let wobble = (frames as f32 * 0.37).sin();
            let angle = needle.update(sequencer.level(), sequencer.phase().is_playing(), wobble);
            if frames % meter_every == 0 {
                info!(
                    angle = %format!("{angle:+.1}"),
                    level = %format!("{:.3}", sequencer.level()),
                    remaining = %sequencer.countdown().display(),
                    "Meter"
                );
            }
        }
    }

    let mut report = report.take();
    report.elapsed = sequencer.clock().now().saturating_sub(started);
    report.remaining_minutes = sequencer.remaining_minutes();
    Ok(report)
}
