// Deterministic, non-trivial pattern content. Used by tests and to seed the
// host simulator so there is something to page through.

use crate::shared::STEP_COUNT;

use super::project::{CurveSequence, CurveStep, PatternBundle, RunMode, TrackPattern};

pub fn demo_bundle(seed: u8) -> PatternBundle {
    let mut bundle = PatternBundle::default();

    for track in 0..6 {
        let Some(seq) = bundle.note_mut(track) else {
            continue;
        };
        seq.set_name(&format!("DEMO{seed}-{track}"));
        seq.set_divisor(6 * (track as u16 + 1));
        seq.set_root_note((seed % 12) as i8);
        seq.set_run_mode(RunMode::from_u8(seed.wrapping_add(track as u8) % 6));
        seq.set_last_step(15 + track as u8 * 8);

        // euclid-ish spread, offset per track so tracks differ
        let hits = 3 + (usize::from(seed) + track) % 5;
        for i in 0..STEP_COUNT {
            let gate = (i * hits) % 16 < hits;
            if let Some(step) = seq.step_mut((i + track) % STEP_COUNT) {
                step.set_gate(gate);
                step.set_length((i % 8) as u8);
                step.set_note(0, 36 + (i % 24) as i8);
                step.set_velocity(64 + (i as u8 * 7) % 64);
                step.set_probability(if i % 5 == 0 { 50 } else { 100 });
            }
        }
    }

    let mut curve = CurveSequence::default();
    curve.set_name("RAMP");
    curve.set_range(seed % CurveSequence::RANGE_COUNT);
    for i in 0..STEP_COUNT {
        if let Some(step) = curve.step_mut(i) {
            *step = CurveStep {
                shape: (i % 4) as u8,
                min: (i * 2) as u8,
                max: 200,
            };
        }
    }
    bundle.tracks[6] = TrackPattern::Curve(Box::new(curve));
    bundle.tracks[7] = TrackPattern::MidiCv;

    bundle
}
