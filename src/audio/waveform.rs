// Shared by the engine and the modulator page preview, so what's drawn is exactly
// what's played. Phase 0..65535 covers one cycle; output is -127..=127.

use crate::pipeline::modulator::Shape;
use crate::shared::PHASE_RANGE;

pub fn generate(shape: Shape, phase: u16) -> i32 {
    match shape {
        Shape::Sine => sine(phase),
        Shape::Triangle => triangle(phase),
        Shape::SawUp => i32::from(phase) * 254 / 65536 - 127,
        Shape::SawDown => 127 - i32::from(phase) * 254 / 65536,
        Shape::Square => {
            if phase < 32768 { 127 } else { -127 }
        }
        // need history, the engine handles these itself
        Shape::Random | Shape::Adsr => 0,
    }
}

// parabolic approximation: sin ~ 4x(1 - |x|), x in -1..1 as fixed point over 32768
fn sine(phase: u16) -> i32 {
    let x = i32::from(phase) - 32768;
    let result = 4 * x * (32768 - x.abs()) / 32768;
    -(result * 127 / 32768)
}

// rises over the first half, falls over the second
fn triangle(phase: u16) -> i32 {
    let phase = i32::from(phase);
    if phase < 32768 {
        -127 + phase * 254 / 32768
    } else {
        127 - (phase - 32768) * 254 / 32768
    }
}

/// One cycle of `shape` spread over `out`, starting at `phase_degrees`.
pub fn preview(shape: Shape, phase_degrees: u16, out: &mut [i32]) {
    if out.is_empty() {
        return;
    }
    let offset = u32::from(phase_degrees % 360) * PHASE_RANGE / 360;
    let len = out.len() as u32;
    for (i, sample) in out.iter_mut().enumerate() {
        let phase = (i as u32 * PHASE_RANGE / len + offset) % PHASE_RANGE;
        *sample = generate(shape, phase as u16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LFO_SHAPES: [Shape; 5] = [
        Shape::Sine,
        Shape::Triangle,
        Shape::SawUp,
        Shape::SawDown,
        Shape::Square,
    ];

    #[test]
    fn stays_in_range() {
        for shape in LFO_SHAPES {
            for phase in (0..=u16::MAX).step_by(7) {
                let v = generate(shape, phase);
                assert!((-127..=127).contains(&v), "{shape:?} at {phase} gave {v}");
            }
        }
    }

    #[test]
    fn sine_key_points() {
        assert_eq!(generate(Shape::Sine, 0), 0);
        assert_eq!(generate(Shape::Sine, 16384), 127);
        assert_eq!(generate(Shape::Sine, 32768), 0);
        assert_eq!(generate(Shape::Sine, 49152), -127);
    }

    #[test]
    fn sine_is_odd_around_the_cycle() {
        for p in (1..32768u32).step_by(13) {
            let a = generate(Shape::Sine, p as u16);
            let b = generate(Shape::Sine, (65536 - p) as u16);
            assert_eq!(a, -b, "phase {p}");
            // and each half mirrors around its peak
            assert_eq!(a, generate(Shape::Sine, (32768 - p) as u16));
        }
    }

    #[test]
    fn linear_shapes() {
        assert_eq!(generate(Shape::Triangle, 0), -127);
        assert_eq!(generate(Shape::Triangle, 32768), 127);
        assert_eq!(generate(Shape::Triangle, 16384), 0);
        assert_eq!(generate(Shape::SawUp, 0), -127);
        assert_eq!(generate(Shape::SawUp, 65535), 126);
        assert_eq!(generate(Shape::SawDown, 0), 127);
        assert_eq!(generate(Shape::Square, 32767), 127);
        assert_eq!(generate(Shape::Square, 32768), -127);
    }

    #[test]
    fn stateful_shapes_are_neutral() {
        assert_eq!(generate(Shape::Random, 1234), 0);
        assert_eq!(generate(Shape::Adsr, 40000), 0);
    }

    #[test]
    fn preview_matches_generate() {
        let mut points = [0i32; 64];
        preview(Shape::Sine, 0, &mut points);
        assert_eq!(points[0], 0);
        assert_eq!(points[16], 127);
        assert_eq!(points[48], -127);
        for (i, &v) in points.iter().enumerate() {
            assert_eq!(v, generate(Shape::Sine, (i * 1024) as u16));
        }

        // starting 90 degrees in leaves a quarter cycle of the high half
        preview(Shape::Square, 90, &mut points);
        assert_eq!(points[0], 127);
        assert_eq!(points[15], 127);
        assert_eq!(points[16], -127);
        assert_eq!(points[47], -127);
        assert_eq!(points[48], 127);
    }
}
