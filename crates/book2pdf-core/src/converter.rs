//! External image-to-PDF conversion
//!
//! The converter receives the ordered image paths as arguments and writes
//! the PDF to standard output, which is redirected into the output file.
//! Success is judged by exit status alone.

use crate::cancel::CancelToken;
use crate::config::Tuning;
use crate::error::BuildError;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Exit report of one conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    /// Whether the tool exited zero
    pub success: bool,
    /// Exit status as reported by the OS
    pub status: String,
    /// Captured standard error
    pub stderr: String,
}

impl ConversionOutcome {
    /// Successful conversion
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            success: true,
            status: "exit status: 0".to_string(),
            stderr: String::new(),
        }
    }

    /// Failed conversion
    pub fn failed(status: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            status: status.into(),
            stderr: stderr.into(),
        }
    }
}

/// Turns an ordered list of images into one PDF
#[async_trait::async_trait]
pub trait Converter: Send + Sync {
    /// Program name for diagnostics
    fn name(&self) -> &str;

    /// Convert `inputs`, in order, into `output`
    ///
    /// A tool that runs and fails is an `Ok` outcome with `success == false`;
    /// `Err` means the tool could not be run at all.
    async fn convert(
        &self,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<ConversionOutcome, BuildError>;
}

/// Runs `img2pdf` (or a compatible program) as a child process
#[derive(Debug, Clone)]
pub struct Img2PdfConverter {
    program: String,
    args: Vec<String>,
    cancel: CancelToken,
}

impl Img2PdfConverter {
    /// Create converter running `program args... images...`
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cancel: CancelToken::new(),
        }
    }

    /// Converter configured by tunables
    #[must_use]
    pub fn from_tuning(tuning: &Tuning) -> Self {
        Self::new(tuning.converter.clone(), tuning.converter_args.clone())
    }

    /// Kill the child process when `cancel` fires
    #[inline]
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait::async_trait]
impl Converter for Img2PdfConverter {
    fn name(&self) -> &str {
        &self.program
    }

    async fn convert(
        &self,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<ConversionOutcome, BuildError> {
        let file = std::fs::File::create(output).map_err(|source| BuildError::io(output, source))?;
        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .args(inputs)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildError::ConverterLaunch {
                program: self.program.clone(),
                source,
            })?;

        let result = self
            .cancel
            .run(child.wait_with_output())
            .await
            .ok_or(BuildError::Cancelled)?;
        let out = result.map_err(|source| BuildError::ConverterLaunch {
            program: self.program.clone(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if out.status.success() {
            Ok(ConversionOutcome {
                success: true,
                status: out.status.to_string(),
                stderr,
            })
        } else {
            Ok(ConversionOutcome::failed(out.status.to_string(), stderr))
        }
    }
}
