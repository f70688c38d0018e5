//! geodedup CLI - Debug tool for geo-duplicate resolution
//!
//! Usage:
//!   geodedup synth --out <file> [--sites N] [--observations N] [--resolve]
//!   geodedup stats <dataset> [--radius <m>]
//!   geodedup candidates <dataset> [--radius <m>] [--class <name>] [--out <file>]
//!   geodedup resolve <dataset> --report <file> [--out <file>] [--manifest <file>]
//!
//! Datasets are JSON arrays of image records. `resolve` runs the
//! persisted-verdict workflow: pair verdicts produced by an earlier matcher
//! run are combined into components and resolved without touching any
//! matcher backend. `synth --resolve` demonstrates the full in-process
//! pipeline on a generated scene with scripted crops.

use clap::{Parser, Subcommand};
use geodedup::synthetic::{color_oracles, SceneOptions, SyntheticScene};
use geodedup::{candidates, graph, resolve};
use geodedup::{
    Dataset, DedupConfig, DedupEngine, DedupOutcome, ImageRecord, MatchReport, SpatialIndex,
};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "geodedup")]
#[command(about = "Debug tool for geo-duplicate resolution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic scene with known duplicate structure
    Synth {
        /// Output file for the dataset (JSON array of image records)
        #[arg(short, long)]
        out: PathBuf,

        /// Number of sites observed several times each
        #[arg(long, default_value = "4")]
        sites: usize,

        /// Observations per site
        #[arg(long, default_value = "3")]
        observations: usize,

        /// Additional sites observed exactly once
        #[arg(long, default_value = "0")]
        strays: usize,

        /// Generation seed
        #[arg(long, default_value = "10")]
        seed: u64,

        /// Also run the full engine with color oracles and print the outcome
        #[arg(long)]
        resolve: bool,

        /// Output file for the removal manifest (with --resolve)
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Show dataset statistics and neighborhood structure
    Stats {
        /// Dataset file (JSON array of image records)
        dataset: PathBuf,

        /// Neighborhood radius in meters
        #[arg(short, long, default_value = "30.0")]
        radius: f64,
    },

    /// Generate candidate pairs without running any matcher
    Candidates {
        /// Dataset file (JSON array of image records)
        dataset: PathBuf,

        /// Neighborhood radius in meters
        #[arg(short, long, default_value = "30.0")]
        radius: f64,

        /// Restrict matching to these classes (repeatable)
        #[arg(short, long)]
        class: Vec<String>,

        /// Output file for the pairs (JSON)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Resolve duplicates from persisted pair verdicts
    Resolve {
        /// Dataset file (JSON array of image records)
        dataset: PathBuf,

        /// Match report with pair verdicts (JSON)
        #[arg(long)]
        report: PathBuf,

        /// Representative selection seed
        #[arg(long, default_value = "10")]
        seed: u64,

        /// Output file for the filtered dataset
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Output file for the removal manifest
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Synth {
            out,
            sites,
            observations,
            strays,
            seed,
            resolve,
            manifest,
        } => run_synth(
            &out,
            sites,
            observations,
            strays,
            seed,
            resolve,
            manifest.as_deref(),
            cli.verbose,
        ),
        Commands::Stats { dataset, radius } => run_stats(&dataset, radius, cli.verbose),
        Commands::Candidates {
            dataset,
            radius,
            class,
            out,
        } => run_candidates(&dataset, radius, class, out.as_deref(), cli.verbose),
        Commands::Resolve {
            dataset,
            report,
            seed,
            out,
            manifest,
        } => run_resolve(
            &dataset,
            &report,
            seed,
            out.as_deref(),
            manifest.as_deref(),
            cli.verbose,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn Error>>;

/// Load a dataset from a JSON array of image records
fn load_dataset(path: &Path) -> Result<Dataset, Box<dyn Error>> {
    let file = File::open(path).map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    let images: Vec<ImageRecord> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| format!("cannot parse {}: {e}", path.display()))?;
    Ok(Dataset::new(images)?)
}

/// Write any serializable value as pretty JSON
fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> CliResult {
    let file = File::create(path).map_err(|e| format!("cannot create {}: {e}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

/// Generate a synthetic scene, optionally resolving it in-process
#[allow(clippy::too_many_arguments)]
fn run_synth(
    out: &Path,
    sites: usize,
    observations: usize,
    strays: usize,
    seed: u64,
    resolve: bool,
    manifest_out: Option<&Path>,
    verbose: bool,
) -> CliResult {
    let options = SceneOptions {
        site_count: sites,
        observations_per_site: observations,
        stray_count: strays,
        seed,
        ..SceneOptions::default()
    };
    let scene = SyntheticScene::generate(&options);

    println!("\n{}", "=".repeat(60));
    println!("SYNTHETIC SCENE");
    println!("{}", "=".repeat(60));
    println!(
        "  Sites:             {} x {} observations + {} strays",
        sites, observations, strays
    );
    println!("  Images:            {}", scene.dataset.image_count());
    println!("  Detections:        {}", scene.dataset.detection_count());
    println!("  Expected groups:   {}", scene.site_count());
    println!("  Expected removals: {}", scene.expected_removals());

    if verbose {
        for site in &scene.sites {
            println!(
                "    site {} at ({:.6}, {:.6}) x{} color #{:02x}{:02x}{:02x}",
                site.id,
                site.location.latitude,
                site.location.longitude,
                site.observations,
                site.color[0],
                site.color[1],
                site.color[2],
            );
        }
    }

    write_json(out, scene.dataset.images())?;
    println!("\n  Written: {}", out.display());

    if resolve {
        println!("\n[Resolve] Running the engine with 3 color oracles...");
        let engine = DedupEngine::new(
            DedupConfig::default(),
            color_oracles(3),
            Box::new(scene.crop_source()),
        );
        let outcome = engine.run(scene.dataset.clone())?;
        print_outcome(&outcome, verbose);

        if let Some(path) = manifest_out {
            write_json(path, &outcome.manifest)?;
            println!("\n  Written: {}", path.display());
        }
    }

    Ok(())
}

/// Show dataset statistics and neighborhood structure
fn run_stats(dataset_path: &Path, radius: f64, verbose: bool) -> CliResult {
    let dataset = load_dataset(dataset_path)?;

    println!("\n{}", "=".repeat(60));
    println!("DATASET STATS: {}", dataset_path.display());
    println!("{}", "=".repeat(60));

    let mut classes: BTreeMap<&str, usize> = BTreeMap::new();
    let mut located = 0;
    for image in dataset.images() {
        if image.location.map_or(false, |l| l.is_valid()) {
            located += 1;
        }
        for det in &image.detections {
            *classes.entry(det.class.as_str()).or_default() += 1;
        }
    }

    println!("  Images:     {} ({} located)", dataset.image_count(), located);
    println!("  Detections: {}", dataset.detection_count());
    println!("  Classes:");
    for (class, count) in &classes {
        println!("    {:24} {}", class, count);
    }

    let config = DedupConfig {
        radius_meters: radius,
        ..DedupConfig::default()
    };

    println!("\n[Step 1] Collecting match scope...");
    let scope = candidates::collect_scope(&dataset, &config);
    println!("  Matchable detections: {}", scope.matchable);

    println!("\n[Step 2] Building spatial index...");
    let (points, coord_warnings) = candidates::index_points(&dataset, &scope);
    let index = SpatialIndex::build(points);
    println!("  Indexed images: {}", index.len());

    println!("\n[Step 3] Pairing within {radius}m...");
    let set = candidates::generate(&dataset, &index, &scope, radius);
    println!("  Image pairs:     {}", set.image_pairs);
    println!("  Candidate pairs: {}", set.pairs.len());

    let warnings: Vec<_> = scope.warnings.iter().chain(&coord_warnings).collect();
    if !warnings.is_empty() {
        println!("\n  Warnings: {}", warnings.len());
        if verbose {
            for w in &warnings {
                println!("    - {w}");
            }
        }
    }

    Ok(())
}

/// Generate candidate pairs without running any matcher
fn run_candidates(
    dataset_path: &Path,
    radius: f64,
    class: Vec<String>,
    out: Option<&Path>,
    verbose: bool,
) -> CliResult {
    let dataset = load_dataset(dataset_path)?;
    let config = DedupConfig {
        radius_meters: radius,
        class_filter: class,
        ..DedupConfig::default()
    };

    println!("\n{}", "=".repeat(60));
    println!("CANDIDATE PAIRS");
    println!("{}", "=".repeat(60));

    let scope = candidates::collect_scope(&dataset, &config);
    let (points, _) = candidates::index_points(&dataset, &scope);
    let index = SpatialIndex::build(points);
    let set = candidates::generate(&dataset, &index, &scope, radius);

    println!("  Matchable detections: {}", scope.matchable);
    println!("  Image pairs:          {}", set.image_pairs);
    println!("  Candidate pairs:      {}", set.pairs.len());

    if verbose {
        for pair in &set.pairs {
            let left = dataset
                .detection_image(pair.left)
                .map(|i| i.name.as_str())
                .unwrap_or("?");
            let right = dataset
                .detection_image(pair.right)
                .map(|i| i.name.as_str())
                .unwrap_or("?");
            println!("    {pair}: {left} <-> {right}");
        }
    }

    if let Some(path) = out {
        write_json(path, &set.pairs)?;
        println!("\n  Written: {}", path.display());
    }

    Ok(())
}

/// Resolve duplicates from a persisted match report
fn run_resolve(
    dataset_path: &Path,
    report_path: &Path,
    seed: u64,
    out: Option<&Path>,
    manifest_out: Option<&Path>,
    verbose: bool,
) -> CliResult {
    let dataset = load_dataset(dataset_path)?;

    let file =
        File::open(report_path).map_err(|e| format!("cannot open {}: {e}", report_path.display()))?;
    let report: MatchReport = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| format!("cannot parse {}: {e}", report_path.display()))?;

    println!("\n{}", "=".repeat(60));
    println!("DUPLICATE RESOLUTION");
    println!("{}", "=".repeat(60));
    println!("  Verdicts:        {}", report.verdicts.len());
    println!("  Duplicate pairs: {}", report.duplicate_count());
    println!("  Skipped pairs:   {}", report.skipped_pairs);

    println!("\n[Step 1] Building duplicate components...");
    let ids = dataset.detection_ids();
    let components = graph::connected_components(&ids, report.duplicate_pairs())?;
    let multi = components.iter().filter(|c| !c.is_singleton()).count();
    println!(
        "  Components: {} total, {} with duplicates",
        components.len(),
        multi
    );

    println!("\n[Step 2] Selecting representatives (seed {seed})...");
    let (filtered, manifest) = resolve::resolve(&dataset, &components, seed)?;

    println!("\n{}", "-".repeat(60));
    println!("RESULTS");
    println!("{}", "-".repeat(60));
    println!("  Groups:             {}", manifest.groups.len());
    println!("  Removed detections: {}", manifest.removed_detections.len());
    println!("  Removed images:     {}", manifest.removed_images.len());
    println!(
        "  Dataset:            {} -> {} images, {} -> {} detections",
        dataset.image_count(),
        filtered.image_count(),
        dataset.detection_count(),
        filtered.detection_count()
    );

    if verbose {
        for group in &manifest.groups {
            println!("\n  Group {} keeps {}:", group.id, group.representative);
            for member in &group.members {
                if *member != group.representative {
                    let image = dataset
                        .detection_image(*member)
                        .map(|i| i.name.as_str())
                        .unwrap_or("?");
                    println!("    drop {member} ({image})");
                }
            }
        }
    }

    if let Some(path) = out {
        write_json(path, filtered.images())?;
        println!("\n  Written: {}", path.display());
    }
    if let Some(path) = manifest_out {
        write_json(path, &manifest)?;
        println!("  Written: {}", path.display());
    }

    Ok(())
}

/// Print an engine outcome in the RESULTS format
fn print_outcome(outcome: &DedupOutcome, verbose: bool) {
    let stats = &outcome.stats;

    println!("\n{}", "-".repeat(60));
    println!("RESULTS");
    println!("{}", "-".repeat(60));
    println!(
        "  Images:          {} ({} indexed, {} unlocated)",
        stats.images, stats.images_indexed, stats.images_unlocated
    );
    println!(
        "  Detections:      {} ({} matchable)",
        stats.detections, stats.detections_matchable
    );
    println!("  Image pairs:     {}", stats.image_pairs);
    println!(
        "  Candidate pairs: {} ({} evaluated, {} skipped)",
        stats.candidate_pairs, stats.pairs_evaluated, stats.pairs_skipped
    );
    println!("  Duplicate pairs: {}", stats.duplicate_pairs);
    println!("  Oracle failures: {}", stats.oracle_failures);
    println!("  Groups:          {}", stats.groups);
    println!(
        "  Removed:         {} detections, {} images",
        stats.detections_removed, stats.images_removed
    );

    if !outcome.warnings.is_empty() {
        println!("\n  Warnings ({}):", outcome.warnings.len());
        for w in &outcome.warnings {
            println!("    - {w}");
        }
    }

    if verbose {
        for group in &outcome.manifest.groups {
            println!(
                "\n  Group {} (representative {}):",
                group.id, group.representative
            );
            for member in &group.members {
                let marker = if *member == group.representative {
                    "keep"
                } else {
                    "drop"
                };
                println!("    [{marker}] {member}");
            }
        }
    }
}
