//! Color fade engine — stepped linear interpolation over the link session.

use std::time::Duration;

use log::{debug, warn};

use crate::color::Rgb;
use crate::protocol;
use crate::session::LinkSession;

/// Default number of interpolation steps per fade.
pub const FADE_STEPS: u32 = 8;

/// Lower bound on inter-packet spacing, protecting the transport from
/// saturation at the cost of animation smoothness.
pub const MIN_STEP_DELAY: Duration = Duration::from_millis(100);

/// Step count and per-step delay for a fade of `duration`.
///
/// Normally `FADE_STEPS` steps of `duration / FADE_STEPS`. If that delay
/// falls under [`MIN_STEP_DELAY`], the delay is clamped and the step count
/// recomputed as `max(1, floor(duration / MIN_STEP_DELAY))` — never zero
/// steps for a nonzero duration.
pub fn fade_plan(duration: Duration) -> (u32, Duration) {
    let delay = duration / FADE_STEPS;
    if delay >= MIN_STEP_DELAY {
        return (FADE_STEPS, delay);
    }
    let steps = (duration.as_secs_f64() / MIN_STEP_DELAY.as_secs_f64()).floor() as u32;
    (steps.max(1), MIN_STEP_DELAY)
}

/// Channel values at step `i` (1-indexed) of `steps`, truncated to integer.
pub fn fade_step(start: Rgb, target: Rgb, i: u32, steps: u32) -> Rgb {
    let factor = f64::from(i) / f64::from(steps);
    let lerp = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * factor) as u8;
    Rgb::new(
        lerp(start.r, target.r),
        lerp(start.g, target.g),
        lerp(start.b, target.b),
    )
}

/// Animate the light from its last-known color to `target` over `duration`.
///
/// Connects first; if that fails the fade is abandoned entirely and light
/// memory is untouched. Equal source and target is a no-op. Per-step send
/// failures are logged and the fade continues — the animation is
/// best-effort. On loop completion light memory is set to `target`
/// unconditionally, even if every step failed; the next fade starts from
/// this belief rather than from the device's actual state.
pub async fn fade_to(session: &mut LinkSession, target: Rgb, duration: Duration) {
    if !session.ensure_connected().await {
        warn!("fade to {target} abandoned: no link");
        return;
    }

    let start = session.current_rgb();
    if start == target {
        return;
    }

    let (steps, delay) = fade_plan(duration);
    debug!("fading {start} -> {target} in {steps} steps");
    for i in 1..=steps {
        let step = fade_step(start, target, i, steps);
        if let Err(e) = session.send(&protocol::encode_color(step)).await {
            warn!("fade step {i}/{steps} failed: {e}");
        }
        tokio::time::sleep(delay).await;
    }

    session.set_current_rgb(target);
}
