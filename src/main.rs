use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::CommandFactory;

use rembg_rs::{
    logging, paths::ensure_input_dir, BackgroundRemovalProcessor, Config, Mode,
    OnnxBackgroundRemover,
};

fn main() -> Result<ExitCode> {
    let config = Config::new();
    logging::init_logging(config.verbose);

    let Some(mode) = config.mode() else {
        Config::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    // a bad directory is reported before any model is loaded
    if let Mode::Batch { input_dir, .. } = mode {
        if let Err(e) = ensure_input_dir(input_dir) {
            println!("✗ {}", e);
            return Ok(ExitCode::FAILURE);
        }
    }

    let remover = OnnxBackgroundRemover::new(config.model_home(), config.device_id);
    remover
        .prepare(config.model)
        .with_context(|| format!("Failed to prepare model {}", config.model))?;

    let processor = BackgroundRemovalProcessor::new(remover);

    match mode {
        Mode::Batch {
            input_dir,
            output_dir,
        } => {
            if processor
                .process_batch(input_dir, output_dir, config.model)
                .is_err()
            {
                return Ok(ExitCode::FAILURE);
            }
        }
        Mode::Single { input, output } => {
            processor.remove_background(input, output, config.model);
        }
    }

    Ok(ExitCode::SUCCESS)
}
