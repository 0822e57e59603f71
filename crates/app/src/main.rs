mod cli;
mod config;

use bytesize::ByteSize;
use clap::Parser;
use pica64::modules::platform::NopPlatformModule;
use pica64::{Modules, System};
use renderer::Renderer;
use renderer::gpu::{Command, RecordingGpu};

use crate::config::{FileConfig, LoadError};

fn setup_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or(EnvFilter::new("app=info,pica64=info,renderer=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

/// One line per command, with payloads reduced to their size.
fn describe(command: &Command<'_>) -> String {
    match command {
        Command::UploadVertices { buffer, data } => {
            format!("UploadVertices {{ buffer: {buffer:?}, floats: {} }}", data.len())
        }
        Command::UploadTexture { slot, data } => {
            format!(
                "UploadTexture {{ slot: {slot:?}, size: {} }}",
                ByteSize::b(data.len() as u64)
            )
        }
        Command::UploadFogLut { slot, .. } => format!("UploadFogLut {{ slot: {slot:?} }}"),
        Command::SetTevStages(stages) => {
            let stages = stages
                .iter()
                .map(|stage| format!("rgb={} a={}", stage.color, stage.alpha))
                .collect::<Vec<_>>();
            format!("SetTevStages [{}]", stages.join("; "))
        }
        other => format!("{other:?}"),
    }
}

fn main() -> Result<(), LoadError> {
    setup_tracing();
    let cfg = cli::Config::parse();

    let mut file = match &cfg.config {
        Some(path) => FileConfig::open(path)?,
        None => FileConfig::default(),
    };
    file.merge(&cfg);

    let ram = config::load_ram(&cfg.ram)?;
    tracing::info!(
        "loaded RAM image {} ({})",
        cfg.ram.display(),
        ByteSize::b(ram.len() as u64)
    );

    let gpu = RecordingGpu::default();
    let (renderer, handle) = Renderer::new(gpu.clone(), file.renderer);
    handle.set_slider(cfg.slider);

    let modules = Modules {
        render: Box::new(renderer),
        platform: Box::new(NopPlatformModule::default()),
    };
    let mut system = System::new(modules, file.system, ram);

    let mut interpreter = pica64::Stats::default();
    let mut backend = renderer::Stats::default();
    let mut commands = 0;
    let mut dropped = 0;

    for frame in 0..cfg.frames {
        let Some(stats) = system.run_frame(cfg.entry) else {
            dropped += 1;
            continue;
        };

        let recorded = gpu.take();
        if cfg.dump {
            println!("frame {frame}");
            for command in &recorded {
                println!("  {}", describe(command));
            }
        }

        interpreter += stats;
        backend += handle.stats();
        commands += recorded.len();
    }

    tracing::info!(
        frames = handle.frames(),
        dropped,
        gpu_commands = commands,
        "replay finished"
    );
    tracing::info!(
        commands = interpreter.commands,
        triangles = interpreter.triangles,
        flushes = interpreter.flushes,
        draws = interpreter.draws,
        texture_loads = interpreter.texture_loads,
        texture_failures = interpreter.texture_failures,
        unknown = interpreter.unknown,
        "interpreter"
    );
    tracing::info!(
        draws = backend.draws,
        dropped_draws = backend.dropped_draws,
        clears = backend.clears,
        state_changes = backend.state_changes,
        redundant_state = backend.redundant_state,
        combiners = backend.combiners_created,
        programs = backend.programs_created,
        texture_uploads = backend.texture_uploads,
        texture_hits = backend.texture_hits,
        texture_misses = backend.texture_misses,
        texture_evictions = backend.texture_evictions,
        texture_invalidations = backend.texture_invalidations,
        fog_tables = backend.fog_tables,
        "renderer"
    );

    Ok(())
}
