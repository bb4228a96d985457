use std::{collections::BTreeMap, path::PathBuf};

use amseg::{
    backend::{batcher, create_device, get_backend_name},
    train::{AugmentationMethod, DatasetConfig, DatasetIndex, SegmentationDataset, TransformPreset},
};
use anyhow::{Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    prelude::*,
    tensor::{cast::ToElement, TensorData},
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "amseg", version)]
#[command(about = "Index, augment and inspect grouped image/mask segmentation datasets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a dataset root and report rows per group
    Index {
        /// Dataset root holding one directory per group
        #[arg(short, long)]
        root: PathBuf,

        /// Comma separated groups to keep
        #[arg(long, value_delimiter = ',')]
        groups: Vec<String>,
    },

    /// Load samples and batches and print their shapes and value ranges
    Inspect(InspectArgs),

    /// Show backend information
    Info,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Dataset root, required unless given by --config
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Dataset configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transform preset: eval, train or validation
    #[arg(long)]
    preset: Option<TransformPreset>,

    /// Comma separated groups to keep
    #[arg(long, value_delimiter = ',')]
    groups: Vec<String>,

    /// Replicate or truncate the dataset to this many samples
    #[arg(long)]
    size: Option<usize>,

    /// Seed of the per-sample random generators
    #[arg(long)]
    seed: Option<u64>,

    /// Probability of running the transform pipeline
    #[arg(long)]
    p: Option<f64>,

    /// Resize every sample to a square of this size, needed to batch images of different sizes
    #[arg(long)]
    image_size: Option<u32>,

    /// Number of samples to inspect
    #[arg(long, default_value = "4")]
    num_samples: usize,

    /// Batch size for the data loader
    #[arg(long, default_value = "2")]
    batch_size: usize,

    /// Number of workers for the data loader
    #[arg(long, default_value = "0")]
    num_workers: usize,

    /// Number of batches to pull
    #[arg(long, default_value = "3")]
    max_batches: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Index { root, groups } => run_index(root, &groups),
        Commands::Inspect(args) => run_inspect(args),
        Commands::Info => {
            println!("amseg Information:");
            println!("  Backend: {}", get_backend_name());
            println!("  Device: {:?}", create_device());
            Ok(())
        }
    }
}

fn run_index(root: PathBuf, groups: &[String]) -> Result<()> {
    let index = DatasetIndex::build(&root)
        .with_context(|| format!("Failed to index dataset at {}", root.display()))?
        .filter_groups(groups);

    // group -> (rows, rows without a mask file)
    let mut per_group: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for mask in index.masks() {
        let counts = per_group.entry(mask.group.as_str()).or_default();
        counts.0 += 1;
        if !mask.path.exists() {
            counts.1 += 1;
        }
    }

    println!("Dataset: {}", root.display());
    for (group, (rows, missing)) in &per_group {
        println!("  {group}: {rows} samples, {missing} without mask");
    }
    println!("Total: {} samples in {} groups", index.len(), per_group.len());
    Ok(())
}

fn resolve_config(args: &InspectArgs) -> Result<DatasetConfig> {
    let mut config = match (&args.config, &args.root) {
        (Some(path), _) => DatasetConfig::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        (None, Some(root)) => DatasetConfig::new(root.clone()),
        (None, None) => anyhow::bail!("either --root or --config is required"),
    };

    // Command line overrides
    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    if let Some(preset) = args.preset {
        config.preset = preset;
    }
    if !args.groups.is_empty() {
        config.groups = Some(args.groups.clone());
    }
    if args.size.is_some() {
        config.size = args.size;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(p) = args.p {
        config.p = p;
    }
    if let Some(size) = args.image_size {
        let mut augmentation = config.augmentation_config();
        augmentation.methods.push(AugmentationMethod::Resize {
            height: size,
            width: size,
        });
        config.augmentation = Some(augmentation);
    }

    Ok(config)
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    println!("Using backend: {}", get_backend_name());
    println!("Dataset: {}", config.root.display());
    println!("Preset: {}", config.preset);

    let dataset = config
        .load_dataset()
        .context("Failed to create dataset")?;
    println!("Dataset created with {} samples", dataset.len());

    inspect_samples(&dataset, args.num_samples)?;
    inspect_batches(dataset, &args, config.seed)?;

    println!("Inspection completed");
    Ok(())
}

fn inspect_samples(dataset: &SegmentationDataset, num_samples: usize) -> Result<()> {
    println!("\n=== Samples ===");

    let mut image_stats = StatisticsAccumulator::new();
    let mut mask_stats = StatisticsAccumulator::new();
    let num_samples = num_samples.min(dataset.len());

    for i in 0..num_samples {
        let item = dataset
            .try_get(i)
            .with_context(|| format!("Failed to get sample {i}"))?;
        let (img_min, img_max, img_mean) = data_stats(&item.image)?;
        let (mask_min, mask_max, mask_mean) = data_stats(&item.mask)?;

        println!("Sample {i} ({}):", dataset.entries()[i].image_path.display());
        println!("  Image shape: {:?}", item.image.shape);
        println!("  Mask shape: {:?}", item.mask.shape);
        println!("  Image stats: min={img_min:.4}, max={img_max:.4}, mean={img_mean:.4}");
        println!("  Mask stats: min={mask_min:.4}, max={mask_max:.4}, mean={mask_mean:.4}");

        image_stats.add(img_min, img_max, img_mean);
        mask_stats.add(mask_min, mask_max, mask_mean);
    }

    if num_samples > 0 {
        image_stats.report("Image", num_samples);
        mask_stats.report("Mask", num_samples);
    }
    Ok(())
}

fn inspect_batches(
    dataset: SegmentationDataset,
    args: &InspectArgs,
    seed: u64,
) -> Result<()> {
    println!("\n=== Batches ===");

    let dataloader = DataLoaderBuilder::new(batcher())
        .batch_size(args.batch_size)
        .shuffle(seed)
        .num_workers(args.num_workers)
        .build(dataset);

    let mut batch_count = 0;
    for batch in dataloader.iter().take(args.max_batches) {
        batch_count += 1;

        let [images, channels, height, width] = batch.images.dims();
        let [masks, mask_channels, mask_height, mask_width] = batch.masks.dims();
        println!("Batch {batch_count}:");
        println!("  Images shape: {:?}", [images, channels, height, width]);
        println!("  Masks shape: {:?}", [masks, mask_channels, mask_height, mask_width]);

        let (min, max, mean) = tensor_stats(batch.images);
        println!("  Image stats: min={min:.4}, max={max:.4}, mean={mean:.4}");

        if (height, width) != (mask_height, mask_width) {
            tracing::error!(batch = batch_count, "image and mask sizes differ");
        }
    }

    println!("Batch loading completed ({batch_count} batches)");
    Ok(())
}

fn data_stats(data: &TensorData) -> Result<(f32, f32, f32)> {
    let values = data
        .to_vec::<f32>()
        .map_err(|err| anyhow::anyhow!("Failed to read tensor data: {err:?}"))?;
    if values.is_empty() {
        return Ok((0.0, 0.0, 0.0));
    }

    let (min, max, sum) = values.iter().fold(
        (f32::INFINITY, f32::NEG_INFINITY, 0.0f64),
        |(min, max, sum), v| (min.min(*v), max.max(*v), sum + f64::from(*v)),
    );
    Ok((min, max, (sum / values.len() as f64) as f32))
}

fn tensor_stats<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> (f32, f32, f32) {
    let min = tensor.clone().min().into_scalar().to_f32();
    let max = tensor.clone().max().into_scalar().to_f32();
    let mean = tensor.mean().into_scalar().to_f32();

    (min, max, mean)
}

/// Aggregates per-sample statistics.
struct StatisticsAccumulator {
    min_val: f32,
    max_val: f32,
    mean_sum: f32,
    count: usize,
}

impl StatisticsAccumulator {
    const fn new() -> Self {
        Self {
            min_val: f32::INFINITY,
            max_val: f32::NEG_INFINITY,
            mean_sum: 0.0,
            count: 0,
        }
    }

    fn add(&mut self, min: f32, max: f32, mean: f32) {
        self.min_val = self.min_val.min(min);
        self.max_val = self.max_val.max(max);
        self.mean_sum += mean;
        self.count += 1;
    }

    fn avg_mean(&self) -> f32 {
        if self.count > 0 {
            self.mean_sum / self.count as f32
        } else {
            0.0
        }
    }

    fn report(&self, label: &str, num_samples: usize) {
        println!("{label} statistics across {num_samples} samples:");
        println!("  Min: {:.4}", self.min_val);
        println!("  Max: {:.4}", self.max_val);
        println!("  Mean: avg={:.4}", self.avg_mean());
    }
}
