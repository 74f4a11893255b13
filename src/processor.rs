use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{RemBgError, Result};
use crate::model::ModelName;
use crate::paths::{
    batch_output_path, collect_image_files, default_output_dir, default_output_path,
    ensure_input_dir,
};
use crate::progress_tracker::ProgressTracker;
use crate::traits::BackgroundRemover;

/// Outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub discovered: usize,
    pub succeeded: usize,
    pub output_dir: PathBuf,
}

impl BatchSummary {
    pub const fn failed(&self) -> usize {
        self.discovered - self.succeeded
    }
}

/// Reads images, hands them to a [`BackgroundRemover`] and writes the results.
///
/// Files are processed one at a time; only one input and one output buffer are
/// held in memory.
pub struct BackgroundRemovalProcessor<R: BackgroundRemover> {
    remover: R,
}

impl<R: BackgroundRemover> BackgroundRemovalProcessor<R> {
    pub const fn new(remover: R) -> Self {
        Self { remover }
    }

    pub const fn remover(&self) -> &R {
        &self.remover
    }

    /// Remove the background of a single image.
    ///
    /// Failures are printed and reported as `None`; they never abort the caller.
    /// Without `output` the result goes to `<parent>/<stem>_no_bg.png`.
    pub fn remove_background(
        &self,
        input: &Path,
        output: Option<&Path>,
        model: ModelName,
    ) -> Option<PathBuf> {
        match self.try_remove_background(input, output, model) {
            Ok(output_path) => {
                println!("✓ Background removed!");
                println!("  Input: {}", input.display());
                println!("  Output: {}", output_path.display());
                Some(output_path)
            }
            Err(e) => {
                debug!("{}: {:?}", input.display(), e);
                println!("✗ Failed to remove background: {}", e);
                None
            }
        }
    }

    pub fn try_remove_background(
        &self,
        input: &Path,
        output: Option<&Path>,
        model: ModelName,
    ) -> Result<PathBuf> {
        let data = fs::read(input).map_err(|e| RemBgError::FileSystem {
            path: input.to_path_buf(),
            operation: "read input image".to_string(),
            source: e,
        })?;
        debug!("Read {} bytes from {}", data.len(), input.display());

        let result = self.remover.remove(&data, model)?;
        drop(data);

        let output_path = match output {
            Some(output) => output.to_path_buf(),
            None => default_output_path(input)?,
        };

        fs::write(&output_path, &result).map_err(|e| RemBgError::FileSystem {
            path: output_path.clone(),
            operation: "write output image".to_string(),
            source: e,
        })?;
        debug!("Wrote {} bytes to {}", result.len(), output_path.display());

        Ok(output_path)
    }

    /// Remove backgrounds from every supported image directly inside
    /// `input_dir`.
    ///
    /// A missing directory or a directory without images is printed and
    /// returned as an error before anything is written. Individual file
    /// failures only lower the success count.
    pub fn process_batch(
        &self,
        input_dir: &Path,
        output_dir: Option<&Path>,
        model: ModelName,
    ) -> Result<BatchSummary> {
        let result = self.run_batch(input_dir, output_dir, model);
        if let Err(e) = &result {
            println!("✗ {}", e);
        }
        result
    }

    fn run_batch(
        &self,
        input_dir: &Path,
        output_dir: Option<&Path>,
        model: ModelName,
    ) -> Result<BatchSummary> {
        ensure_input_dir(input_dir)?;

        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_output_dir(input_dir)?,
        };

        let image_files = collect_image_files(input_dir)?;
        if image_files.is_empty() {
            return Err(RemBgError::NoImagesFound {
                path: input_dir.to_path_buf(),
            });
        }

        fs::create_dir_all(&output_dir).map_err(|e| RemBgError::FileSystem {
            path: output_dir.clone(),
            operation: "create output directory".to_string(),
            source: e,
        })?;

        let total = image_files.len();
        info!(
            "Batch of {} images from {} into {} with {}",
            total,
            input_dir.display(),
            output_dir.display(),
            model
        );
        println!("Processing {} images...", total);

        let progress = ProgressTracker::new(total);
        let mut succeeded = 0;

        for (index, image_file) in image_files.iter().enumerate() {
            let processed = progress.suspend(|| {
                let name = image_file
                    .file_name()
                    .map(|name| name.to_string_lossy())
                    .unwrap_or_default();
                println!("\n[{}/{}] Processing: {}", index + 1, total, name);

                match batch_output_path(image_file, &output_dir) {
                    Ok(output_file) => self
                        .remove_background(image_file, Some(&output_file), model)
                        .is_some(),
                    Err(e) => {
                        println!("✗ Failed to remove background: {}", e);
                        false
                    }
                }
            });

            if processed {
                succeeded += 1;
            }
            progress.inc();
        }
        progress.finish();

        println!("\n✓ Batch processing complete!");
        println!("  Processed successfully: {}/{} images", succeeded, total);
        println!("  Output directory: {}", output_dir.display());

        Ok(BatchSummary {
            discovered: total,
            succeeded,
            output_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockBackgroundRemover;
    use tempfile::TempDir;

    #[test]
    fn test_default_output_next_to_input() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("cat.jpeg");
        fs::write(&input, b"cat")?;

        let processor = BackgroundRemovalProcessor::new(MockBackgroundRemover::new());
        let output = processor
            .remove_background(&input, None, ModelName::U2net)
            .unwrap();

        assert_eq!(output, temp_dir.path().join("cat_no_bg.png"));
        assert!(output.exists());
        Ok(())
    }

    #[test]
    fn test_missing_input_is_absence() {
        let temp_dir = TempDir::new().unwrap();
        let processor = BackgroundRemovalProcessor::new(MockBackgroundRemover::new());

        let missing = temp_dir.path().join("missing.png");
        assert!(processor
            .remove_background(&missing, None, ModelName::U2net)
            .is_none());
        assert!(!temp_dir.path().join("missing_no_bg.png").exists());
    }

    #[test]
    fn test_remover_failure_writes_nothing() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("bad.png");
        fs::write(&input, b"FAIL")?;

        let processor =
            BackgroundRemovalProcessor::new(MockBackgroundRemover::failing_on(b"FAIL"));
        let err = processor
            .try_remove_background(&input, None, ModelName::U2net)
            .unwrap_err();

        assert!(matches!(err, RemBgError::Model { .. }));
        assert!(!temp_dir.path().join("bad_no_bg.png").exists());
        Ok(())
    }

    #[test]
    fn test_unwritable_output_is_absence() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("a.png");
        fs::write(&input, b"a")?;
        let output = temp_dir.path().join("no_such_dir").join("a.png");

        let processor = BackgroundRemovalProcessor::new(MockBackgroundRemover::new());
        assert!(processor
            .remove_background(&input, Some(&output), ModelName::U2net)
            .is_none());
        Ok(())
    }

    #[test]
    fn test_batch_summary_failed() {
        let summary = BatchSummary {
            discovered: 5,
            succeeded: 3,
            output_dir: PathBuf::from("out"),
        };
        assert_eq!(summary.failed(), 2);
    }

    #[test]
    fn test_batch_passes_model_through() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let input_dir = temp_dir.path().join("in");
        fs::create_dir(&input_dir)?;
        fs::write(input_dir.join("x.webp"), b"x")?;

        let processor = BackgroundRemovalProcessor::new(MockBackgroundRemover::new());
        processor.process_batch(&input_dir, None, ModelName::Silueta)?;

        assert_eq!(
            processor.remover().calls(),
            vec![(b"x".to_vec(), ModelName::Silueta)]
        );
        Ok(())
    }
}
