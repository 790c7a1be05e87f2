use clap::{Parser, Subcommand};
use log::info;
use moldel::archive::SeasonArchive;
use moldel::types::{Participant, PredictionSample, TrainingSet};
use moldel::{ExamDropPipeline, FittedPipelineState, PipelineConfig, PipelineError};
use std::collections::BTreeSet;
use std::error::Error;
use std::process;

#[derive(Parser)]
#[command(
    name = "moldel",
    about = "Fit and apply the exam-drop feature pipeline",
    long_about = "Turns archived exam answers into a discretized, filtered and projected feature \
                 matrix for mol prediction, and applies the fitted transforms to a running season."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the pipeline on the train seasons
    #[command(about = "Fit on train seasons (outputs: pipeline state TOML + train TSV)")]
    Fit {
        /// Pipeline configuration TOML
        #[arg(long)]
        config: String,

        /// Season archive TOML with answers and stored features
        #[arg(long)]
        archive: String,

        /// Where to write the fitted pipeline state
        #[arg(long, default_value = "pipeline_state.toml")]
        state: String,

        /// Where to write the train matrix, labels and weights
        #[arg(long, default_value = "train.tsv")]
        output: String,

        /// Override the configured number of additional bins
        #[arg(long)]
        max_splits: Option<usize>,
    },

    /// Build prediction samples with a previously fitted state
    #[command(about = "Transform a season with a fitted state (outputs: predictions TSV)")]
    Predict {
        /// Pipeline configuration TOML
        #[arg(long)]
        config: String,

        /// Season archive TOML with answers and stored features
        #[arg(long)]
        archive: String,

        /// Fitted pipeline state produced by `fit`
        #[arg(long, default_value = "pipeline_state.toml")]
        state: String,

        /// Where to write the prediction samples
        #[arg(long, default_value = "predictions.tsv")]
        output: String,

        /// Override the configured predict season
        #[arg(long)]
        season: Option<u32>,

        /// Override the configured visibility cutoff episode
        #[arg(long)]
        episode: Option<u32>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fit {
            config,
            archive,
            state,
            output,
            max_splits,
        } => fit_command(&config, &archive, &state, &output, max_splits),
        Commands::Predict {
            config,
            archive,
            state,
            output,
            season,
            episode,
        } => predict_command(&config, &archive, &state, &output, season, episode),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn fit_command(
    config_path: &str,
    archive_path: &str,
    state_path: &str,
    output_path: &str,
    max_splits: Option<usize>,
) -> Result<(), Box<dyn Error>> {
    let mut config = PipelineConfig::load(config_path)?;
    if let Some(max_splits) = max_splits {
        config.max_splits = max_splits;
    }
    let archive = SeasonArchive::load(archive_path)?;
    info!(
        "Loaded {} seasons from {}",
        archive.seasons.len(),
        archive_path
    );

    let extractor = archive.stored_features();
    let mut pipeline = ExamDropPipeline::new(config, &archive, extractor);
    let train = pipeline.fit_train()?;

    let state = pipeline.state().ok_or(PipelineError::NotFitted)?;
    state.save(state_path)?;
    info!("Pipeline state saved to: {}", state_path);
    save_training_set(&train, output_path)?;
    info!("Train matrix saved to: {}", output_path);
    Ok(())
}

fn predict_command(
    config_path: &str,
    archive_path: &str,
    state_path: &str,
    output_path: &str,
    season: Option<u32>,
    episode: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let config = PipelineConfig::load(config_path)?;
    let state = FittedPipelineState::load(state_path)?;
    let archive = SeasonArchive::load(archive_path)?;

    let season = season.unwrap_or(config.predict_season);
    let episode = episode.unwrap_or(config.predict_episode);
    let extractor = archive.stored_features();
    let pipeline = ExamDropPipeline::from_state(config, &archive, extractor, state);
    let samples = pipeline.predict_at(season, episode)?;

    save_predictions(&samples, output_path)?;
    info!(
        "{} prediction samples saved to: {}",
        samples.len(),
        output_path
    );
    Ok(())
}

fn tsv_writer(output_path: &str) -> Result<csv::Writer<std::fs::File>, csv::Error> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(false)
        .from_path(output_path)
}

/// Writes one row per train sample: label, weight, then the reduced features.
fn save_training_set(train: &TrainingSet, output_path: &str) -> Result<(), Box<dyn Error>> {
    let mut writer = tsv_writer(output_path)?;
    let mut header = vec!["label".to_string(), "weight".to_string()];
    header.extend((1..=train.features.ncols()).map(|i| format!("PC{i}")));
    writer.write_record(&header)?;

    for ((label, weight), row) in train
        .labels
        .iter()
        .zip(train.weights.iter())
        .zip(train.features.rows())
    {
        let mut record = vec![label.to_string(), format!("{weight:.6}")];
        record.extend(row.iter().map(|v| format!("{v:.6}")));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn join_names(names: &BTreeSet<Participant>) -> String {
    names
        .iter()
        .map(Participant::name)
        .collect::<Vec<_>>()
        .join(",")
}

/// Writes one row per sample: included and excluded participants, weight, then the
/// included and excluded feature vectors.
fn save_predictions(samples: &[PredictionSample], output_path: &str) -> Result<(), Box<dyn Error>> {
    let mut writer = tsv_writer(output_path)?;
    let width = samples.first().map_or(0, |s| s.in_features.len());
    let mut header = vec![
        "in_answer".to_string(),
        "out_answer".to_string(),
        "weight".to_string(),
    ];
    header.extend((1..=width).map(|i| format!("in_PC{i}")));
    header.extend((1..=width).map(|i| format!("out_PC{i}")));
    writer.write_record(&header)?;

    for sample in samples {
        let mut record = vec![
            join_names(&sample.in_answer),
            join_names(&sample.out_answer),
            format!("{:.6}", sample.weight),
        ];
        record.extend(sample.in_features.iter().map(|v| format!("{v:.6}")));
        record.extend(sample.out_features.iter().map(|v| format!("{v:.6}")));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
