use anyhow::{Context, Result};
use clap::Parser;
use listening_test_prep::corpus::{write_metadata, Corpus};
use listening_test_prep::sampler::select_disjoint_sets;
use listening_test_prep::StudyConfig;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;

/// Draw disjoint naturalness, accentedness and speaker-similarity sample sets
/// from a test corpus.
#[derive(Parser, Debug)]
#[command(name = "select-samples")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Corpus index, one `{speaker}_{sentence_id}<TAB>{text}` line per utterance
    #[arg(long)]
    test_file: PathBuf,

    /// Directory receiving naturalness.json, accentedness.json and spksim.json
    #[arg(long)]
    output_dir: PathBuf,

    /// Random seed for reproducible selection
    #[arg(long, default_value = "777")]
    seed: u64,

    /// Study description (JSON); the built-in study is used when omitted
    #[arg(long)]
    study: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let study = match &cli.study {
        Some(path) => StudyConfig::from_json_file(path)
            .with_context(|| format!("loading study {}", path.display()))?,
        None => StudyConfig::default(),
    };
    let corpus = Corpus::from_path(&cli.test_file)
        .with_context(|| format!("reading corpus {}", cli.test_file.display()))?;

    info!("Selecting samples with seed {}", cli.seed);
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let sets = select_disjoint_sets(&corpus, &study, &mut rng).context("selecting samples")?;

    fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("creating {}", cli.output_dir.display()))?;
    for (kind, records) in &sets {
        let path = cli.output_dir.join(kind.metadata_file());
        write_metadata(&path, records).with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}
