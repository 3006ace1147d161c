// AlexNet training over an image folder.
//
// Expected layout: <data_dir>/<class_name>/<image>.{png,jpg,jpeg}
// Outputs (under --output-dir): model/, model_epoch<N>/, loss.txt, acc.png,
// loss.png, first_kernel_visualization/.

use alexnet_trainer::config::{load_config, validate_config, TrainingConfig};
use alexnet_trainer::data::ImageFolderSource;
use alexnet_trainer::layout::OutputLayout;
use alexnet_trainer::model::{AlexNet, Classifier};
use alexnet_trainer::training::TrainingLoop;
use alexnet_trainer::utils::SimpleRng;
use alexnet_trainer::{Result, TrainError};
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "train_alexnet", about = "Train an AlexNet image classifier")]
struct Args {
    /// JSON training configuration; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of the class-per-directory image tree
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Directory receiving checkpoints, logs and plots
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    max_epoch: Option<usize>,

    #[arg(long)]
    loss_sampling_step: Option<usize>,

    #[arg(long)]
    acc_sampling_step: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,
}

fn resolve_config(args: &Args) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => TrainingConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data.data_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.output_dir {
        config.data.output_dir = dir.clone();
    }
    if let Some(v) = args.max_epoch {
        config.run.max_epoch = v;
    }
    if let Some(v) = args.loss_sampling_step {
        config.run.loss_sampling_step = v;
    }
    if let Some(v) = args.acc_sampling_step {
        config.run.acc_sampling_step = v;
    }
    if let Some(v) = args.seed {
        config.seed = v;
    }
    validate_config(&config)?;
    Ok(config)
}

fn train(args: &Args) -> Result<()> {
    let config = resolve_config(args)?;
    let data_dir = config
        .data
        .data_dir
        .clone()
        .ok_or_else(|| TrainError::Config("no data directory given (--data-dir)".into()))?;

    let arch = &config.architecture;
    let source = ImageFolderSource::open(
        &data_dir,
        arch.input_size,
        arch.input_channels,
        config.data.val_fraction,
        config.seed,
    )?;
    if source.num_classes() != arch.num_classes {
        return Err(TrainError::Config(format!(
            "{} has {} classes ({}) but the network is configured for {}",
            data_dir.display(),
            source.num_classes(),
            source.class_names().join(", "),
            arch.num_classes
        )));
    }

    let mut rng = SimpleRng::new(config.seed);
    let model = AlexNet::new(arch, &config.lrn, config.hyperparameters.weight_decay, &mut rng)?;
    info!(parameters = model.parameter_count(), "model ready");

    let layout = OutputLayout::new(config.data.output_dir.clone());
    let mut trainer = TrainingLoop::new(model, source, &config, layout);
    let summary = trainer.run(
        config.run.max_epoch,
        config.run.loss_sampling_step,
        config.run.acc_sampling_step,
    )?;

    info!(
        epochs = summary.epochs_run,
        learning_rate = summary.final_learning_rate,
        decays = summary.decay_count,
        last_val_acc = ?summary.history.val_acc().last(),
        "done"
    );
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    if let Err(err) = train(&args) {
        error!("{err}");
        let mut source = err.source();
        while let Some(cause) = source {
            error!("  caused by: {cause}");
            source = cause.source();
        }
        process::exit(1);
    }
}
