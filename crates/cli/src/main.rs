use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use indicatif::ProgressStyle;
use tracing::{info, info_span, warn};
use tracing_indicatif::{IndicatifLayer, span_ext::IndicatifSpanExt};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use raytracing::{
    AccelerationStructure, RayTracer,
    kernel::hit_color,
    scene::{SceneCapacity, SceneDescription, test_scenes},
    settings::{Backend, SceneSettings},
};
use raytracing_cpu::{CpuAccelerationStructure, CpuBackendSettings};
use raytracing_gpu::{GpuAccelerationStructure, GpuBackendSettings};

mod gltf_scene;
mod output;

#[derive(Debug, clap::Parser)]
struct CommandLineArguments {
    #[command(flatten)]
    input: InputScene,

    #[arg(short, long, default_value = "output.png", help = "Output PNG path")]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = Backend::Software, help = "Traversal backend")]
    backend: Backend,

    #[arg(long, default_value_t = 800, help = "Image width in pixels")]
    width: u32,
    #[arg(long, default_value_t = 600, help = "Image height in pixels")]
    height: u32,

    #[arg(short = 't', long = "threads", help = "Worker threads for the software backend")]
    num_threads: Option<u32>,

    #[arg(long, help = "Maximum number of meshes")]
    max_meshes: Option<u32>,
    #[arg(long, help = "Maximum total vertices over all meshes")]
    max_vertices: Option<u32>,
    #[arg(long, help = "Maximum total triangles over all meshes")]
    max_primitives: Option<u32>,
    #[arg(long, help = "Maximum number of instances")]
    max_instances: Option<u32>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Args)]
#[group(multiple = false)]
struct InputScene {
    #[arg(long, help = "Load a scene from a glTF file")]
    scene_path: Option<PathBuf>,
    #[arg(long, help = "Load a builtin test scene by name")]
    scene_name: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    #[command(about = "Render one frame to the output PNG (default)")]
    Render,
    #[command(about = "Trace a single pixel and print its hit record")]
    Pixel {
        #[arg(help = "Pixel x coordinate")]
        x: u32,
        #[arg(help = "Pixel y coordinate (0 is the bottom row)")]
        y: u32,
    },
    #[command(about = "List all builtin test scenes as JSON")]
    ListScenes,
}

enum LoadedAccel {
    Software(CpuAccelerationStructure),
    Hardware(GpuAccelerationStructure),
}

impl LoadedAccel {
    fn new(settings: &SceneSettings) -> anyhow::Result<Self> {
        Ok(match settings.backend {
            Backend::Software => LoadedAccel::Software(CpuAccelerationStructure::new(settings.capacity)),
            Backend::Hardware => LoadedAccel::Hardware(
                GpuAccelerationStructure::new(settings.capacity, &GpuBackendSettings::default())
                    .context("failed to initialize hardware backend")?,
            ),
        })
    }

    fn accel(&self) -> &dyn AccelerationStructure {
        match self {
            LoadedAccel::Software(a) => a,
            LoadedAccel::Hardware(a) => a,
        }
    }

    fn accel_mut(&mut self) -> &mut dyn AccelerationStructure {
        match self {
            LoadedAccel::Software(a) => a,
            LoadedAccel::Hardware(a) => a,
        }
    }

    fn render(&self, tracer: &RayTracer, cpu_settings: CpuBackendSettings) -> anyhow::Result<Vec<u32>> {
        match self {
            LoadedAccel::Software(a) => Ok(raytracing_cpu::render(a, tracer, cpu_settings)),
            LoadedAccel::Hardware(a) => Ok(raytracing_gpu::render(a, tracer)?),
        }
    }
}

fn init_logging() {
    let indicatif_layer = IndicatifLayer::new();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

fn load_scene(input: &InputScene) -> anyhow::Result<SceneDescription> {
    if let Some(path) = &input.scene_path {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gltf") | Some("glb") => {}
            ext => warn!("unrecognized file extension {ext:?}, trying to import as gltf"),
        }
        return gltf_scene::load_gltf(path);
    }
    if let Some(name) = &input.scene_name {
        let Some(test_scene) = test_scenes::find_test_scene(name) else {
            bail!("no builtin scene named '{name}' (see list-scenes)");
        };
        return Ok((test_scene.scene_func)());
    }
    bail!("either --scene-path or --scene-name is required")
}

fn scene_settings(cli_args: &CommandLineArguments) -> SceneSettings {
    let defaults = SceneCapacity::default();
    SceneSettings {
        backend: cli_args.backend,
        capacity: SceneCapacity {
            max_meshes: cli_args.max_meshes.unwrap_or(defaults.max_meshes),
            max_total_vertices: cli_args.max_vertices.unwrap_or(defaults.max_total_vertices),
            max_total_primitives: cli_args.max_primitives.unwrap_or(defaults.max_total_primitives),
            max_instances: cli_args.max_instances.unwrap_or(defaults.max_instances),
        },
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let cli_args = CommandLineArguments::parse();

    if let Some(Command::ListScenes) = cli_args.command {
        let scenes: Vec<&str> = test_scenes::all_test_scenes()
            .iter()
            .map(|s| s.name)
            .collect();
        println!("{}", serde_json::to_string(&scenes)?);
        return Ok(());
    }

    if cli_args.backend == Backend::Hardware && cli_args.num_threads.is_some() {
        bail!("--threads is not supported with the hardware backend");
    }
    if cli_args.width == 0 || cli_args.height == 0 {
        bail!("image size must be non-zero");
    }

    let description = load_scene(&cli_args.input)?;

    let settings = scene_settings(&cli_args);
    let mut loaded = LoadedAccel::new(&settings)?;
    let summary = description
        .load_into(loaded.accel_mut())
        .context("failed to build acceleration structure")?;
    if summary.rejected_meshes > 0 || summary.rejected_instances > 0 {
        warn!(
            "{} meshes and {} instances were rejected",
            summary.rejected_meshes, summary.rejected_instances
        );
    }
    let stats = loaded.accel().stats();
    info!(
        "{:?} backend: {} geometries, {} instances, {} triangles",
        cli_args.backend, stats.geometry_count, stats.instance_count, stats.total_primitives
    );

    let (width, height) = (cli_args.width, cli_args.height);
    let inv_proj_view = description
        .camera
        .inv_proj_view(width, height)
        .context("camera has a degenerate view or projection")?;
    let mut tracer = RayTracer::new(width, height);
    tracer.update_view(description.camera.position, &inv_proj_view);

    if let Some(Command::Pixel { x, y }) = cli_args.command {
        if x >= width || y >= height {
            bail!("pixel ({x}, {y}) is outside the {width}x{height} image");
        }
        let hit = tracer
            .query_pixel(loaded.accel(), x, y)
            .context("pixel query failed")?;
        println!("hit: {}", hit.is_hit());
        println!("t: {}", hit.t);
        println!("inst_id: {:#x}", hit.inst_id);
        println!("geom_id: {:#x}", hit.geom_id);
        println!("prim_id: {:#x}", hit.prim_id);
        println!("coords: {:?}", hit.coords);
        println!("color: {:#010x}", hit_color(&hit));
        return Ok(());
    }

    let cpu_settings = CpuBackendSettings {
        num_threads: cli_args.num_threads.unwrap_or_default(),
    };

    let frame_span = info_span!("frame");
    frame_span.pb_set_style(&ProgressStyle::with_template(
        "[{elapsed_precise}] {spinner} rendering...",
    )?);
    let colors = {
        let _frame_guard = frame_span.enter();
        loaded.render(&tracer, cpu_settings)?
    };

    output::save_png(&colors, width, height, &cli_args.output)?;
    info!("wrote {}", cli_args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CommandLineArguments, clap::Error> {
        CommandLineArguments::try_parse_from(std::iter::once("raytracing-cli").chain(args.iter().copied()))
    }

    #[test]
    fn backend_flag_accepts_names_and_aliases() {
        assert_eq!(parse(&["--scene-name", "two_cubes"]).unwrap().backend, Backend::Software);
        assert_eq!(parse(&["--backend", "hardware"]).unwrap().backend, Backend::Hardware);
        assert_eq!(parse(&["--backend", "gpu"]).unwrap().backend, Backend::Hardware);
        assert_eq!(parse(&["--backend", "cpu"]).unwrap().backend, Backend::Software);
        assert!(parse(&["--backend", "vulkan"]).is_err());
    }

    #[test]
    fn capacity_flags_override_defaults() {
        let args = parse(&["--backend", "gpu", "--max-instances", "4", "--max-meshes", "2"]).unwrap();
        let settings = scene_settings(&args);
        let defaults = SceneCapacity::default();
        assert_eq!(settings.backend, Backend::Hardware);
        assert_eq!(settings.capacity.max_instances, 4);
        assert_eq!(settings.capacity.max_meshes, 2);
        assert_eq!(settings.capacity.max_total_vertices, defaults.max_total_vertices);
    }
}
