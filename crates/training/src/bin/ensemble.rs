use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use training::{geometric_fusion, majority_vote, EnsembleConfig};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("ensembling failed: {err:#}");
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Combine IAN prediction files into labels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    method: Method,
}

#[derive(Subcommand, Debug)]
enum Method {
    /// Label 1 when the geometric mean of the scores exceeds the threshold.
    Geometric(EnsembleArgs),
    /// Label 1 when a strict majority of scores exceeds the threshold.
    Vote(EnsembleArgs),
}

#[derive(Args, Debug)]
struct EnsembleArgs {
    #[arg(
        short,
        long = "input",
        value_name = "PATH",
        required = true,
        num_args = 1..,
        help = "Prediction CSVs with header qid1,qid2,score"
    )]
    inputs: Vec<PathBuf>,

    #[arg(short, long, value_name = "PATH", help = "Destination for qid1,qid2,label")]
    output: PathBuf,

    #[arg(long, default_value_t = 0.5)]
    threshold: f32,
}

impl From<EnsembleArgs> for EnsembleConfig {
    fn from(args: EnsembleArgs) -> Self {
        let mut config = EnsembleConfig::new(args.inputs, args.output);
        config.threshold = args.threshold;
        config
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let labels = match cli.method {
        Method::Geometric(args) => {
            let config = EnsembleConfig::from(args);
            geometric_fusion(&config)
                .with_context(|| format!("geometric fusion into {}", config.output.display()))?
        }
        Method::Vote(args) => {
            let config = EnsembleConfig::from(args);
            majority_vote(&config)
                .with_context(|| format!("majority vote into {}", config.output.display()))?
        }
    };
    let positives = labels.iter().filter(|&&label| label == 1).count();
    println!("{} pairs labelled, {positives} positive", labels.len());
    Ok(())
}
