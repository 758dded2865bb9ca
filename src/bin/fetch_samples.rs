use anyhow::{Context, Result};
use clap::Parser;
use listening_test_prep::corpus::read_metadata;
use listening_test_prep::fetch::fetch_samples;
use listening_test_prep::test_config::{build_config, write_js_config};
use listening_test_prep::{StudyConfig, TestKind};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;

/// Collect, resample and rename the stimuli of each listening test and write
/// the BeaqleJS configuration files.
#[derive(Parser, Debug)]
#[command(name = "fetch-samples")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the selector's JSON metadata files
    #[arg(long, default_value = "./listening_test_interspeech2025/split_metadata")]
    metadata_dir: PathBuf,

    /// Root of the output audio tree and the .js configs
    #[arg(long, default_value = "./audio/20250215_tokan")]
    output_dir: PathBuf,

    /// Study description (JSON); the built-in study is used when omitted
    #[arg(long)]
    study: Option<PathBuf>,

    /// Random seed for hidden reference selection
    #[arg(long, default_value = "777")]
    seed: u64,

    /// Worker threads for audio conversion (defaults to one per core)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Tests to build, e.g. MUSHRANAT,BWSSIM (defaults to every planned test)
    #[arg(long, value_delimiter = ',')]
    tests: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let study = match &cli.study {
        Some(path) => StudyConfig::from_json_file(path)
            .with_context(|| format!("loading study {}", path.display()))?,
        None => StudyConfig::default(),
    };

    let kinds: Vec<TestKind> = if cli.tests.is_empty() {
        study.tests.iter().map(|plan| plan.kind).collect()
    } else {
        cli.tests
            .iter()
            .map(|tag| tag.parse())
            .collect::<listening_test_prep::Result<_>>()?
    };

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("configuring worker pool")?;
    }

    fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("creating {}", cli.output_dir.display()))?;
    let mut rng = StdRng::seed_from_u64(cli.seed);

    for kind in kinds {
        let metadata_path = cli.metadata_dir.join(kind.metadata_file());
        let records = read_metadata(&metadata_path)
            .with_context(|| format!("reading {}", metadata_path.display()))?;
        info!("{}: {} samples from {:?}", kind, records.len(), metadata_path);

        let items = fetch_samples(&records, kind, &study, &cli.output_dir)
            .with_context(|| format!("fetching stimuli for {kind}"))?;
        let config = build_config(kind, items, &study, &mut rng)
            .with_context(|| format!("building {kind} configuration"))?;
        info!("{}: {} test sets", kind, config.testsets().len());

        let config_path = cli.output_dir.join(format!("{}.js", kind.tag()));
        write_js_config(&config, &config_path)
            .with_context(|| format!("writing {}", config_path.display()))?;
    }

    Ok(())
}
