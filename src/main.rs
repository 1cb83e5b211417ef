use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use island_generator::automata::{self, AutomataGrid};
use island_generator::color::Bitmap;
use island_generator::config::{self, RunConfig};
use island_generator::export::{self, ExportTarget};
use island_generator::island;
use island_generator::logging::init_logging;
use island_generator::palette::{self, BiomePalette};
use island_generator::seeds::IslandSeeds;

#[derive(Parser, Debug)]
#[command(name = "island_generator")]
#[command(about = "Generate procedural islands, noise textures and automata masks")]
struct Args {
    /// JSON run configuration (built-in defaults if not specified)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Master seed (overrides the config; per-layer seeds are derived from it)
    #[arg(short, long, global = true)]
    seed: Option<u64>,

    /// Output directory for PNG files
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Output width in pixels
    #[arg(short = 'W', long, global = true)]
    width: Option<usize>,

    /// Output height in pixels
    #[arg(short = 'H', long, global = true)]
    height: Option<usize>,

    /// Debug-level logging for the generator
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the height noise field as a grayscale texture
    Noise {
        /// File stem of the texture
        #[arg(long, default_value = "noise")]
        name: String,
    },
    /// Generate a cellular automata mask
    Automata {
        /// Rotation in degrees (overrides the config)
        #[arg(long)]
        rotate: Option<f64>,

        /// Report 8-connected regions of the mask
        #[arg(long)]
        regions: bool,
    },
    /// Compose an island biome map
    Island {
        /// Classification graph PNG (overrides the config)
        #[arg(long)]
        graph: Option<PathBuf>,

        /// Skip biome boundary smoothing
        #[arg(long)]
        no_smooth: bool,

        /// Also write the height, moisture and gradient layers
        #[arg(long)]
        layers: bool,
    },
    /// Write the effective configuration as JSON
    InitConfig {
        /// Destination file
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    match &args.command {
        Command::Noise { name } => run_noise(&config, name),
        Command::Automata { rotate, regions } => run_automata(&config, *rotate, *regions),
        Command::Island { graph, no_smooth, layers } => run_island(&config, graph.as_deref(), *no_smooth, *layers),
        Command::InitConfig { path } => {
            config.save(path)?;
            info!(path = %path.display(), "wrote config");
            Ok(())
        }
    }
}

fn apply_overrides(config: &mut RunConfig, args: &Args) {
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if config.output_dir.as_os_str().is_empty() {
        config.output_dir = PathBuf::from("output");
    }
    if let Some(width) = args.width {
        config.island.width = width;
        config.automata.width = width;
    }
    if let Some(height) = args.height {
        config.island.height = height;
        config.automata.height = height;
    }

    if let Some(master) = config.seed {
        let seeds = IslandSeeds::from_master(master);
        info!("{}", seeds);
        config.island = config.island.clone().with_seeds(&seeds);
        config.automata.rules.seed = seeds.automata_phrase();
    }
}

fn write(bitmap: &Bitmap, dir: &Path, name: &str) -> Result<(), Box<dyn Error>> {
    let path = export::export_png(bitmap, &ExportTarget::new(dir, name))?;
    info!(path = %path.display(), "wrote {}x{} image", bitmap.width(), bitmap.height());
    Ok(())
}

fn run_noise(config: &RunConfig, name: &str) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(&config.output_dir)?;
    let params = &config.island.height_map;
    info!(
        width = config.island.width,
        height = config.island.height,
        seed = params.seed,
        "generating noise texture"
    );

    let bitmap = island::filtered_field(config.island.width, config.island.height, params);
    write(&bitmap, &config.output_dir, name)
}

fn run_automata(config: &RunConfig, rotate: Option<f64>, report_regions: bool) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(&config.output_dir)?;
    let settings = &config.automata;
    let rotation = rotate.unwrap_or(settings.rotation);

    let mut mask = AutomataGrid::randomized(settings.width, settings.height, &settings.rules)
        .smoothed(&settings.rules)
        .cleaned();
    if rotation != 0.0 {
        let (w, h) = automata::rotated_extent(settings.width, settings.height, rotation);
        info!(rotation, "rotating mask (full extent would be {}x{})", w, h);
        mask = mask.rotated(rotation);
    }

    let cells = mask.cells();
    let filled = cells.as_slice().iter().filter(|&&c| c).count();
    info!(
        "Mask {}x{}: {} cells filled ({:.1}%)",
        cells.width(),
        cells.height(),
        filled,
        100.0 * filled as f64 / cells.len().max(1) as f64
    );

    if report_regions {
        let regions = automata::regions(cells);
        let largest = regions.iter().map(Vec::len).max().unwrap_or(0);
        info!("Found {} regions, largest {} cells", regions.len(), largest);
    }

    write(&export::mask_bitmap(cells), &config.output_dir, "automata")
}

fn run_island(
    config: &RunConfig,
    graph_override: Option<&Path>,
    no_smooth: bool,
    layers: bool,
) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(&config.output_dir)?;

    let (builtin_graph, builtin_palette) = palette::builtin_graph();
    let graph = match graph_override.or(config.classification_graph.as_deref()) {
        Some(path) => config::load_bitmap(path)?,
        None => builtin_graph,
    };
    let palette: &BiomePalette = config.palette.as_ref().unwrap_or(&builtin_palette);

    let mut settings = config.island.clone();
    settings.smooth_biomes &= !no_smooth;
    info!(
        width = settings.width,
        height = settings.height,
        graph = ?(graph.width(), graph.height()),
        smooth = settings.smooth_biomes,
        "composing island"
    );

    let result = settings.compose(&graph);
    write(&result.biomes, &config.output_dir, "island")?;
    if layers {
        write(&result.height, &config.output_dir, "island_height")?;
        write(&result.moisture, &config.output_dir, "island_moisture")?;
        write(&result.gradient, &config.output_dir, "island_gradient")?;
    }

    let layout = palette.layout(&result.biomes);
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for biome in layout.as_slice().iter().flatten() {
        *counts.entry(biome.as_str()).or_insert(0) += 1;
    }
    let total = layout.len().max(1) as f64;
    for (biome, count) in &counts {
        info!("  {:<12} {:>7} ({:.1}%)", biome, count, 100.0 * *count as f64 / total);
    }

    Ok(())
}
