//! Build labeled sentence corpora from raw publication dumps.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use quill_core::corpus::save_corpus;
use quill_core::ingest::CorpusBuilder;

#[derive(Debug, Parser)]
#[command(name = "prepare-corpus", about = "Build labeled sentence corpora")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Training corpus from known citation mentions.
    Train {
        /// Directory of extracted publication text files.
        #[arg(long)]
        text_dir: PathBuf,

        /// publications.json metadata file.
        #[arg(long)]
        publications: PathBuf,

        /// data_set_citations.json with per-publication mention lists.
        #[arg(long)]
        citations: PathBuf,

        /// Output corpus (JSONL).
        #[arg(long)]
        output: PathBuf,
    },
    /// Inference corpus with silver labels from the dataset catalog.
    Inference {
        /// Directory of extracted publication text files.
        #[arg(long)]
        text_dir: PathBuf,

        /// publications.json metadata file.
        #[arg(long)]
        publications: PathBuf,

        /// data_sets.json catalog with names and mention lists.
        #[arg(long)]
        datasets: PathBuf,

        /// Output corpus (JSONL).
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let builder = CorpusBuilder::new()?;

    match args.command {
        Command::Train {
            text_dir,
            publications,
            citations,
            output,
        } => {
            let examples = builder.build_training_corpus(&text_dir, &publications, &citations)?;
            save_corpus(&output, &examples)?;
            info!("wrote {} examples to {}", examples.len(), output.display());
        }
        Command::Inference {
            text_dir,
            publications,
            datasets,
            output,
        } => {
            let examples = builder.build_inference_corpus(&text_dir, &publications, &datasets)?;
            save_corpus(&output, &examples)?;
            info!("wrote {} examples to {}", examples.len(), output.display());
        }
    }

    Ok(())
}
