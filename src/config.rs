use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::model::{model_home, ModelName};

#[derive(Parser, Clone, Debug)]
#[command(
    version,
    about = "Remove backgrounds from images",
    long_about = None,
    after_help = usage_epilog()
)]
pub struct Config {
    /// Input image
    pub input: Option<PathBuf>,

    /// Output image (single-image mode)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Process every image in this directory; `input` is ignored
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Output directory for batch mode (`-od` is accepted too)
    #[arg(long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Background removal model
    #[arg(short, long, value_enum, default_value_t = ModelName::U2net)]
    pub model: ModelName,

    /// Directory holding the .onnx models [default: $U2NET_HOME or ~/.u2net]
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// GPU used by the CUDA and TensorRT execution providers
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// What a parsed command line asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode<'a> {
    Batch {
        input_dir: &'a Path,
        output_dir: Option<&'a Path>,
    },
    Single {
        input: &'a Path,
        output: Option<&'a Path>,
    },
}

impl Config {
    pub fn new() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    /// `None` when neither an input nor a directory was given.
    pub fn mode(&self) -> Option<Mode<'_>> {
        if let Some(input_dir) = &self.directory {
            return Some(Mode::Batch {
                input_dir,
                output_dir: self.output_dir.as_deref(),
            });
        }

        self.input.as_deref().map(|input| Mode::Single {
            input,
            output: self.output.as_deref(),
        })
    }

    pub fn model_home(&self) -> PathBuf {
        model_home(self.model_dir.as_deref())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite the two-letter `-od` flag to `--output-dir`.
///
/// clap only knows single-character short flags and would otherwise read `-od`
/// as `-o d`.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut past_separator = false;

    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if past_separator {
                return arg;
            }
            match arg.to_str() {
                Some("--") => {
                    past_separator = true;
                    arg
                }
                Some("-od") => OsString::from("--output-dir"),
                Some(s) if s.starts_with("-od=") => {
                    OsString::from(format!("--output-dir={}", &s["-od=".len()..]))
                }
                _ => arg,
            }
        })
        .collect()
}

fn usage_epilog() -> String {
    let models = ModelName::ALL
        .iter()
        .map(|m| format!("  - {}: {}", m.as_str(), m.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Examples:
  # Remove the background from one image
  rembg-rs input.jpg

  # Choose the output file
  rembg-rs input.jpg -o output.png

  # Process a whole directory
  rembg-rs -d /path/to/images

  # Use another model
  rembg-rs input.jpg -m u2net_human_seg

Models:
{models}"
    )
}
