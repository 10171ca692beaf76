// the pattern model that lives in flash; one PatternBundle per (track, pattern) slot
//
// Terminology, since it's easy to mix up:
// "bundle": everything one pattern slot stores, one TrackPattern for each track.
// "sequence": the steps of one track in that pattern plus its playback settings.
// "step": a single position in the sequence (gate, length, notes...).

use crate::shared::{STEP_COUNT, TRACK_COUNT};

use super::serialize::{since, Reader, SerializeError, Writer};

pub const NAME_LENGTH: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    Forward,
    Backward,
    Pendulum,
    PingPong,
    Random,
    RandomWalk,
    #[default]
    Free,
}

impl RunMode {
    const ALL: [RunMode; 7] = [
        RunMode::Forward,
        RunMode::Backward,
        RunMode::Pendulum,
        RunMode::PingPong,
        RunMode::Random,
        RunMode::RandomWalk,
        RunMode::Free,
    ];

    // out of range values clamp to the last mode
    pub fn from_u8(value: u8) -> Self {
        Self::ALL[usize::from(value).min(Self::ALL.len() - 1)]
    }
}

/// Mode tag written in front of each track's body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackMode {
    Note = 0,
    Curve = 1,
    MidiCv = 2,
}

// fixed width, NUL padded name field (NAME_LENGTH chars + terminator)
fn write_name(w: &mut Writer, name: &str) {
    let mut raw = [0u8; NAME_LENGTH + 1];
    for (dst, b) in raw.iter_mut().zip(name.bytes().take(NAME_LENGTH)) {
        *dst = b;
    }
    w.write_bytes(&raw);
}

fn read_name(r: &mut Reader) -> Result<String, SerializeError> {
    let raw = r.read_bytes(NAME_LENGTH + 1)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(NAME_LENGTH).min(NAME_LENGTH);
    Ok(raw[..end]
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect())
}

// only what read_name gives back unchanged: printable ascii and space
fn clean_name(name: &str) -> String {
    name.chars()
        .filter(|&c| c.is_ascii_graphic() || c == ' ')
        .take(NAME_LENGTH)
        .collect()
}

// ---------------------------------------------------------------- note track

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteStep {
    gate: bool,
    length: u8,       // 0..7
    notes: [i8; 4],   // -1 = unused voice
    velocity: u8,     // 0..127
    probability: u8,  // percent
}

impl Default for NoteStep {
    fn default() -> Self {
        Self {
            gate: false,
            length: 0,
            notes: [-1; 4],
            velocity: 127,
            probability: 100,
        }
    }
}

impl NoteStep {
    pub const MAX_LENGTH: u8 = 7;

    pub fn gate(&self) -> bool {
        self.gate
    }

    pub fn set_gate(&mut self, gate: bool) {
        self.gate = gate;
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn set_length(&mut self, length: u8) {
        self.length = length.min(Self::MAX_LENGTH);
    }

    pub fn notes(&self) -> [i8; 4] {
        self.notes
    }

    pub fn set_note(&mut self, voice: usize, note: i8) {
        if let Some(slot) = self.notes.get_mut(voice) {
            *slot = note.max(-1);
        }
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: u8) {
        self.velocity = velocity.min(127);
    }

    pub fn probability(&self) -> u8 {
        self.probability
    }

    pub fn set_probability(&mut self, probability: u8) {
        self.probability = probability.min(100);
    }

    fn raw(&self) -> u32 {
        u32::from(self.gate) | (u32::from(self.length) << 1)
    }

    fn write(&self, w: &mut Writer) {
        w.write(self.raw());
        for note in self.notes {
            w.write(note);
        }
        w.write(self.velocity);
        w.write(self.probability);
    }

    fn read(r: &mut Reader) -> Result<Self, SerializeError> {
        let raw: u32 = r.read()?;
        let mut step = NoteStep {
            gate: raw & 1 != 0,
            length: ((raw >> 1) & 0x7) as u8,
            ..NoteStep::default()
        };
        for voice in 0..4 {
            let note: i8 = r.read()?;
            step.set_note(voice, note);
        }
        step.set_velocity(r.read_since(since::STEP_VELOCITY, 127)?);
        step.set_probability(r.read_since(since::STEP_PROBABILITY, 100)?);
        Ok(step)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteSequence {
    name: String,
    scale: i8,         // -1 = use the project scale
    root_note: i8,     // -1 = use the project root
    divisor: u16,
    reset_measure: u8, // 0 = never
    run_mode: RunMode,
    first_step: u8,
    last_step: u8,
    steps: [NoteStep; STEP_COUNT],
}

impl Default for NoteSequence {
    fn default() -> Self {
        Self {
            name: "INIT".to_string(),
            scale: -1,
            root_note: -1,
            divisor: 12,
            reset_measure: 0,
            run_mode: RunMode::default(),
            first_step: 0,
            last_step: (STEP_COUNT - 1) as u8,
            steps: [NoteStep::default(); STEP_COUNT],
        }
    }
}

impl NoteSequence {
    pub const SCALE_COUNT: i8 = 24;

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = clean_name(name);
    }

    pub fn scale(&self) -> i8 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: i8) {
        self.scale = scale.clamp(-1, Self::SCALE_COUNT - 1);
    }

    pub fn root_note(&self) -> i8 {
        self.root_note
    }

    pub fn set_root_note(&mut self, root: i8) {
        self.root_note = root.clamp(-1, 11);
    }

    pub fn divisor(&self) -> u16 {
        self.divisor
    }

    pub fn set_divisor(&mut self, divisor: u16) {
        self.divisor = divisor.clamp(1, 192);
    }

    pub fn reset_measure(&self) -> u8 {
        self.reset_measure
    }

    pub fn set_reset_measure(&mut self, measure: u8) {
        self.reset_measure = measure.min(128);
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn set_run_mode(&mut self, mode: RunMode) {
        self.run_mode = mode;
    }

    pub fn first_step(&self) -> u8 {
        self.first_step
    }

    pub fn set_first_step(&mut self, step: u8) {
        self.first_step = step.min(self.last_step);
    }

    pub fn last_step(&self) -> u8 {
        self.last_step
    }

    pub fn set_last_step(&mut self, step: u8) {
        self.last_step = step.clamp(self.first_step, (STEP_COUNT - 1) as u8);
    }

    pub fn steps(&self) -> &[NoteStep; STEP_COUNT] {
        &self.steps
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut NoteStep> {
        self.steps.get_mut(index)
    }

    /// Gate output `tick` clock ticks into forward playback of first..=last.
    /// `ticks_per_unit` converts the divisor into clock ticks.
    pub fn gate_at_tick(&self, tick: u32, ticks_per_unit: u32) -> bool {
        let step_ticks = u32::from(self.divisor) * ticks_per_unit.max(1);
        let span = u32::from(self.last_step - self.first_step) + 1;
        let index = u32::from(self.first_step) + (tick / step_ticks) % span;
        let step = &self.steps[index as usize];
        // length 0..7 holds the gate for 1/8..8/8 of the step
        let held = step_ticks * (u32::from(step.length) + 1) / 8;
        step.gate && tick % step_ticks < held.max(1)
    }

    fn write(&self, w: &mut Writer) {
        write_name(w, &self.name);
        w.write(self.scale);
        w.write(self.root_note);
        w.write(self.divisor);
        w.write(self.reset_measure);
        w.write(self.run_mode as u8);
        w.write(self.first_step);
        w.write(self.last_step);
        for step in &self.steps {
            step.write(w);
        }
    }

    fn read(r: &mut Reader) -> Result<Self, SerializeError> {
        let mut seq = NoteSequence::default();
        seq.name = read_name(r)?;
        seq.set_scale(r.read()?);
        seq.set_root_note(r.read()?);
        seq.set_divisor(r.read()?);
        seq.set_reset_measure(r.read()?);
        seq.run_mode = RunMode::from_u8(r.read()?);
        let first: u8 = r.read()?;
        let last: u8 = r.read()?;
        // widen first so the pair can be restored in either order
        seq.first_step = 0;
        seq.set_last_step(last);
        seq.set_first_step(first);
        for step in seq.steps.iter_mut() {
            *step = NoteStep::read(r)?;
        }
        Ok(seq)
    }
}

// ---------------------------------------------------------------- curve track

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CurveStep {
    pub shape: u8,
    pub min: u8,
    pub max: u8,
}

impl CurveStep {
    pub const SHAPE_COUNT: u8 = 16;

    fn write(&self, w: &mut Writer) {
        w.write(self.shape);
        w.write(self.min);
        w.write(self.max);
    }

    fn read(r: &mut Reader) -> Result<Self, SerializeError> {
        let shape: u8 = r.read()?;
        let min: u8 = r.read()?;
        let max: u8 = r.read()?;
        Ok(Self {
            shape: shape.min(Self::SHAPE_COUNT - 1),
            min,
            max: max.max(min),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurveSequence {
    name: String,
    range: u8, // output voltage range preset
    divisor: u16,
    first_step: u8,
    last_step: u8,
    steps: [CurveStep; STEP_COUNT],
}

impl Default for CurveSequence {
    fn default() -> Self {
        Self {
            name: "INIT".to_string(),
            range: 0,
            divisor: 12,
            first_step: 0,
            last_step: (STEP_COUNT - 1) as u8,
            steps: [CurveStep::default(); STEP_COUNT],
        }
    }
}

impl CurveSequence {
    pub const RANGE_COUNT: u8 = 8;

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = clean_name(name);
    }

    pub fn range(&self) -> u8 {
        self.range
    }

    pub fn set_range(&mut self, range: u8) {
        self.range = range.min(Self::RANGE_COUNT - 1);
    }

    pub fn divisor(&self) -> u16 {
        self.divisor
    }

    pub fn set_divisor(&mut self, divisor: u16) {
        self.divisor = divisor.clamp(1, 192);
    }

    pub fn steps(&self) -> &[CurveStep; STEP_COUNT] {
        &self.steps
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut CurveStep> {
        self.steps.get_mut(index)
    }

    fn write(&self, w: &mut Writer) {
        write_name(w, &self.name);
        w.write(self.range);
        w.write(self.divisor);
        w.write(self.first_step);
        w.write(self.last_step);
        for step in &self.steps {
            step.write(w);
        }
    }

    fn read(r: &mut Reader) -> Result<Self, SerializeError> {
        let mut seq = CurveSequence::default();
        seq.name = read_name(r)?;
        seq.set_range(r.read()?);
        seq.set_divisor(r.read()?);
        let first: u8 = r.read()?;
        let last: u8 = r.read()?;
        seq.last_step = last.min((STEP_COUNT - 1) as u8);
        seq.first_step = first.min(seq.last_step);
        for step in seq.steps.iter_mut() {
            *step = CurveStep::read(r)?;
        }
        Ok(seq)
    }
}

// ---------------------------------------------------------------- bundle

/// What one track contributes to a pattern. MIDI/CV tracks keep their settings
/// in the project, so they have no per-pattern body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackPattern {
    Note(Box<NoteSequence>),
    Curve(Box<CurveSequence>),
    MidiCv,
}

impl Default for TrackPattern {
    fn default() -> Self {
        TrackPattern::Note(Box::default())
    }
}

impl TrackPattern {
    pub fn mode(&self) -> TrackMode {
        match self {
            TrackPattern::Note(_) => TrackMode::Note,
            TrackPattern::Curve(_) => TrackMode::Curve,
            TrackPattern::MidiCv => TrackMode::MidiCv,
        }
    }

    fn write(&self, w: &mut Writer) {
        w.write(self.mode() as u8);
        match self {
            TrackPattern::Note(seq) => seq.write(w),
            TrackPattern::Curve(seq) => seq.write(w),
            TrackPattern::MidiCv => {}
        }
    }

    fn read(r: &mut Reader) -> Result<Self, SerializeError> {
        let tag: u8 = r.read()?;
        match tag {
            0 => Ok(TrackPattern::Note(Box::new(NoteSequence::read(r)?))),
            1 => Ok(TrackPattern::Curve(Box::new(CurveSequence::read(r)?))),
            2 => Ok(TrackPattern::MidiCv),
            value => Err(SerializeError::BadTag {
                what: "track mode",
                value,
            }),
        }
    }
}

/// Everything stored in one pattern slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatternBundle {
    pub tracks: [TrackPattern; TRACK_COUNT],
}

impl PatternBundle {
    pub fn write(&self, w: &mut Writer) {
        for track in &self.tracks {
            track.write(w);
        }
    }

    pub fn read(r: &mut Reader) -> Result<Self, SerializeError> {
        let mut bundle = PatternBundle::default();
        for track in bundle.tracks.iter_mut() {
            *track = TrackPattern::read(r)?;
        }
        Ok(bundle)
    }

    pub fn note(&self, track: usize) -> Option<&NoteSequence> {
        match self.tracks.get(track)? {
            TrackPattern::Note(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn note_mut(&mut self, track: usize) -> Option<&mut NoteSequence> {
        match self.tracks.get_mut(track)? {
            TrackPattern::Note(seq) => Some(seq),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::serialize::DataVersion;
    use crate::pipeline::test_fixture::demo_bundle;

    fn round_trip(bundle: &PatternBundle) -> PatternBundle {
        let mut w = Writer::new();
        bundle.write(&mut w);
        let bytes = w.finish();
        let mut r = Reader::new(&bytes, DataVersion::LATEST);
        let out = PatternBundle::read(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        out
    }

    #[test]
    fn default_bundle_is_all_note_tracks() {
        let bundle = PatternBundle::default();
        for track in &bundle.tracks {
            assert_eq!(track.mode(), TrackMode::Note);
        }
        let seq = bundle.note(0).unwrap();
        assert_eq!(seq.name(), "INIT");
        assert_eq!(seq.divisor(), 12);
        assert_eq!(seq.last_step(), 63);
    }

    #[test]
    fn populated_bundle_survives_serialization() {
        let bundle = demo_bundle(5);
        assert_eq!(round_trip(&bundle), bundle);
    }

    #[test]
    fn names_survive_serialization() {
        let mut bundle = PatternBundle::default();
        bundle.note_mut(0).unwrap().set_name("KICKDRUM");
        bundle.note_mut(1).unwrap().set_name("A\0B\tC \u{e9}\x7f!");
        let mut curve = CurveSequence::default();
        curve.set_name("\nLFO 2");
        bundle.tracks[2] = TrackPattern::Curve(Box::new(curve));

        assert_eq!(bundle.note(0).unwrap().name(), "KICKDRUM");
        assert_eq!(bundle.note(1).unwrap().name(), "ABC !");
        assert_eq!(round_trip(&bundle), bundle);
    }

    #[test]
    fn setters_clamp() {
        let mut seq = NoteSequence::default();
        seq.set_divisor(0);
        assert_eq!(seq.divisor(), 1);
        seq.set_divisor(1000);
        assert_eq!(seq.divisor(), 192);
        seq.set_root_note(40);
        assert_eq!(seq.root_note(), 11);
        seq.set_reset_measure(200);
        assert_eq!(seq.reset_measure(), 128);
        seq.set_last_step(10);
        seq.set_first_step(20);
        assert_eq!(seq.first_step(), 10);
        seq.set_name("a very long name");
        assert_eq!(seq.name(), "a very l");

        let step = seq.step_mut(0).unwrap();
        step.set_length(12);
        step.set_velocity(200);
        step.set_probability(150);
        step.set_note(2, -20);
        assert_eq!(step.length(), 7);
        assert_eq!(step.velocity(), 127);
        assert_eq!(step.probability(), 100);
        assert_eq!(step.notes()[2], -1);
    }

    #[test]
    fn step_raw_packs_gate_and_length() {
        let mut step = NoteStep::default();
        step.set_gate(true);
        step.set_length(5);
        assert_eq!(step.raw(), 0b1011);
    }

    #[test]
    fn gate_follows_steps_and_length() {
        let mut seq = NoteSequence::default();
        seq.set_last_step(3);
        let step = seq.step_mut(1).unwrap();
        step.set_gate(true);
        step.set_length(3); // half the step

        // divisor 12 at 4 ticks a unit: 48 ticks a step
        assert!(!seq.gate_at_tick(0, 4));
        assert!(seq.gate_at_tick(48, 4));
        assert!(seq.gate_at_tick(71, 4));
        assert!(!seq.gate_at_tick(72, 4));
        // four step loop comes back round
        assert!(seq.gate_at_tick(48 + 4 * 48, 4));
    }

    #[test]
    fn unknown_track_mode_is_an_error() {
        let bytes = [9u8];
        let mut r = Reader::new(&bytes, DataVersion::LATEST);
        assert_eq!(
            TrackPattern::read(&mut r),
            Err(SerializeError::BadTag {
                what: "track mode",
                value: 9
            })
        );
    }

    #[test]
    fn run_mode_clamps_to_last() {
        assert_eq!(RunMode::from_u8(0), RunMode::Forward);
        assert_eq!(RunMode::from_u8(200), RunMode::Free);
    }
}
