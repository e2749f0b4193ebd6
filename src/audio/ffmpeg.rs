use songbird::input::ChildContainer;
use std::process::{Command, Stdio};
use symphonia::core::io::{MediaSource, ReadOnlySource};
use tracing::debug;

use crate::audio::pipeline::{PipelineDescriptor, PipelineError, SourceSpawner};

/// Lanza un proceso ffmpeg por fuente y expone su stdout.
///
/// El proceso queda dentro de un [`ChildContainer`] de songbird, que lo mata y
/// lo espera fuera del runtime cuando la fuente se suelta.
pub struct FfmpegSpawner {
    executable: String,
}

impl FfmpegSpawner {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl SourceSpawner for FfmpegSpawner {
    fn spawn(&self, pipeline: &PipelineDescriptor) -> Result<Box<dyn MediaSource>, PipelineError> {
        let child = Command::new(&self.executable)
            .args(pipeline.ffmpeg_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        debug!("🎬 ffmpeg iniciado (pid {}) para {}", child.id(), pipeline.url());

        // ChildContainer lee del stdout del último proceso; sin él no hay fuente
        let has_stdout = child.stdout.is_some();
        let container = ChildContainer::from(child);
        if !has_stdout {
            return Err(PipelineError::MissingStdout);
        }

        Ok(Box::new(ReadOnlySource::new(container)))
    }
}
