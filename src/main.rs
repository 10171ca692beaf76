// Host run of the sequencer core: patterns live in a RAM backed flash image,
// a scripted front panel sends commands and the modulator outputs get logged.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};

use seqcore::config::Config;
use seqcore::middle::Middle;
use seqcore::pipeline::modulator::{LfoMode, Param, RandomMode, Shape};
use seqcore::pipeline::persistence;
use seqcore::pipeline::test_fixture::demo_bundle;
use seqcore::sequencer_api::SequencerCommand;
use seqcore::storage::{PatternCache, PatternStore, RamFlash};

const CONFIG_FILE: &str = "seqcore.json";
const DEMO_PATTERNS: usize = 4; // per track, seeded into the blank image
const LOG_EVERY: u32 = 96;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let project_dir: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let config = load_config(&project_dir)?;
    tracing::info!(
        base = %format!("{:#010x}", config.storage.base_address),
        slots = config.storage.used_slots(),
        bpm = config.clock.bpm,
        "starting"
    );

    let mut store = PatternStore::new(config.storage.clone(), RamFlash::for_config(&config.storage));
    seed_demo_patterns(&mut store).context("could not seed the flash image")?;

    // presets next to the project win over whatever the flash image holds
    let modulators = match persistence::load_modulators(&project_dir) {
        Some(bank) => bank,
        None => store.load_modulators().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read modulators from flash");
            None
        })
        .unwrap_or_default(),
    };
    for (slot, m) in modulators.slots.iter().enumerate() {
        tracing::info!(slot, shape = m.shape().name(), rate = %m.rate_label(), "modulator");
    }
    let mut middle = Middle::new(PatternCache::new(store), modulators, config.clock);

    let (tx, rx) = crossbeam_channel::bounded::<SequencerCommand>(64);
    let panel = std::thread::spawn(move || scripted_panel(tx));

    run_ticks(&mut middle, &rx);

    // power down: nothing dirty may be left in RAM
    let saved = middle.shutdown().context("final flush failed")?;
    persistence::save_modulators(&project_dir, &middle.modulators)?;
    let stats = middle.cache.stats();
    tracing::info!(
        saved,
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        flash_loads = stats.flash_loads,
        "stopped"
    );
    let _ = panel.join();
    Ok(())
}

fn load_config(project_dir: &Path) -> anyhow::Result<Config> {
    let path = project_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(Config::default());
    }
    Config::load(&path)
}

fn seed_demo_patterns(store: &mut PatternStore<RamFlash>) -> anyhow::Result<()> {
    let ppt = store.config().patterns_per_track;
    for track in 0..seqcore::shared::TRACK_COUNT {
        for pattern in 0..DEMO_PATTERNS.min(ppt) {
            let slot = track * ppt + pattern;
            store.save(slot, &demo_bundle((slot % 256) as u8))?;
        }
    }
    Ok(())
}

// Drains whatever the panel sent since the last tick, then ticks once.
fn run_ticks(middle: &mut Middle<RamFlash>, rx: &Receiver<SequencerCommand>) {
    loop {
        while let Ok(cmd) = rx.try_recv() {
            tracing::debug!(?cmd, "command");
            if !middle.handle_cmd(cmd) {
                return;
            }
        }
        let tick = middle.tick_count();
        let outputs = *middle.tick();
        if tick % LOG_EVERY == 0 {
            tracing::info!(tick, gates = ?middle.gates(), ?outputs, "modulators");
        }
        std::thread::sleep(Duration::from_secs_f32(middle.tick_duration()));
    }
}

// Stand-in for the front panel: a short session of edits, then quit.
fn scripted_panel(tx: Sender<SequencerCommand>) {
    let edit = |slot, param, value| SequencerCommand::EditModulator {
        slot,
        param,
        value,
        shift: false,
    };
    let script = [
        edit(0, Param::Shape, Shape::Triangle.index() as i32),
        edit(1, Param::Shape, Shape::Adsr.index() as i32),
        edit(1, Param::GateTrack, 2),
        edit(2, Param::Shape, Shape::Random.index() as i32),
        edit(2, Param::RandomMode, RandomMode::Triggered.index() as i32),
        edit(0, Param::Mode, LfoMode::Retrigger.index() as i32),
        edit(0, Param::GateTrack, 1),
        SequencerCommand::SelectPattern { track: 0, pattern: 1 },
        SequencerCommand::ToggleStep { track: 0, step: 3 },
        SequencerCommand::SetTempo(140.0),
        SequencerCommand::SelectPattern { track: 3, pattern: 2 },
        SequencerCommand::Flush { blocking: false },
        SequencerCommand::DeletePattern { track: 5, pattern: 3 },
    ];
    for cmd in script {
        std::thread::sleep(Duration::from_millis(250));
        if tx.send(cmd).is_err() {
            return;
        }
    }
    std::thread::sleep(Duration::from_millis(500));
    let _ = tx.send(SequencerCommand::Quit);
}
