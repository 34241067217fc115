mod controller;

use stagesim::{BumperArray, World, WorldFile};

const DEFAULT_TICKS: u64 = 100;
const REPORT_INTERVAL: u64 = 20;

pub fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        anyhow::bail!("Usage: headless <world.yaml> [ticks]");
    };
    let ticks = match args.next() {
        Some(ticks) => ticks.parse()?,
        None => DEFAULT_TICKS,
    };

    let file = WorldFile::load(&path)?;
    let mut world = World::new();

    let failures = world.load_file(&file);
    for failure in &failures {
        log::warn!("{failure}");
    }
    log::info!(
        "Loaded {} models from {path} ({} failed)",
        world.len(),
        failures.len()
    );

    let bumpers: Vec<_> = world
        .models()
        .filter(|m| m.sensor::<BumperArray>().is_some())
        .map(|m| m.id())
        .collect();

    for id in bumpers {
        if let Some(model) = world.model_mut(id) {
            controller::attach(model, REPORT_INTERVAL);
        }
    }

    world.startup()?;

    let start = std::time::Instant::now();
    for _ in 0..ticks {
        world.update();
    }
    log::info!(
        "Ran {ticks} ticks in {} ms",
        start.elapsed().as_millis()
    );

    for model in world.models() {
        println!("{model}");
    }

    world.shutdown();

    Ok(())
}
