//! Construcción del pipeline de audio.
//!
//! Decide entre *passthrough* (se reenvía el stream Opus original sin tocarlo) y
//! *transcode* (ffmpeg decodifica, aplica filtros y entrega PCM 48 kHz estéreo).
//! El passthrough solo se elige cuando no hay ninguna duda sobre el formato.

use std::{fmt, sync::Arc};
use symphonia::core::io::MediaSource;
use tracing::{debug, info, warn};

use crate::audio::track::{Track, NATIVE_SAMPLE_RATE};

/// Etapas de filtro en su orden fijo de aplicación.
///
/// La normalización va al final para medir la señal ya procesada, y el cambio de
/// velocidad/tono va antes de los filtros espaciales y vocales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStage {
    BassBoost,
    Nightcore,
    Spatial,
    Karaoke,
    Normalize,
}

impl FilterStage {
    pub const ORDER: [FilterStage; 5] = [
        FilterStage::BassBoost,
        FilterStage::Nightcore,
        FilterStage::Spatial,
        FilterStage::Karaoke,
        FilterStage::Normalize,
    ];

    /// Expresión de filtro de ffmpeg (`-af`)
    pub fn expression(self) -> &'static str {
        match self {
            FilterStage::BassBoost => {
                "equalizer=f=40:t=h:width=50:g=10,\
                 equalizer=f=100:t=h:width=100:g=8,\
                 equalizer=f=200:t=h:width=100:g=4"
            }
            FilterStage::Nightcore => "asetrate=48000*1.25,aresample=48000,atempo=1.1",
            FilterStage::Spatial => "apulsator=hz=0.125,stereotools=mlev=0.015625",
            FilterStage::Karaoke => "pan=stereo|c0=c0-c1|c1=c1-c0",
            FilterStage::Normalize => "loudnorm=I=-16:LRA=11:TP=-1.5",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FilterStage::BassBoost => "Bass Boost",
            FilterStage::Nightcore => "Nightcore",
            FilterStage::Spatial => "8D Audio",
            FilterStage::Karaoke => "Karaoke",
            FilterStage::Normalize => "Normalize",
        }
    }
}

/// Los cinco interruptores de filtro de un servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSet {
    pub bass_boost: bool,
    pub nightcore: bool,
    pub spatial: bool,
    pub karaoke: bool,
    pub normalize: bool,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self {
            bass_boost: false,
            nightcore: false,
            spatial: false,
            karaoke: false,
            normalize: true,
        }
    }
}

impl FilterSet {
    /// Todos los filtros apagados
    pub fn none() -> Self {
        Self {
            normalize: false,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self, stage: FilterStage) -> bool {
        match stage {
            FilterStage::BassBoost => self.bass_boost,
            FilterStage::Nightcore => self.nightcore,
            FilterStage::Spatial => self.spatial,
            FilterStage::Karaoke => self.karaoke,
            FilterStage::Normalize => self.normalize,
        }
    }

    pub fn set(&mut self, stage: FilterStage, enabled: bool) {
        let slot = match stage {
            FilterStage::BassBoost => &mut self.bass_boost,
            FilterStage::Nightcore => &mut self.nightcore,
            FilterStage::Spatial => &mut self.spatial,
            FilterStage::Karaoke => &mut self.karaoke,
            FilterStage::Normalize => &mut self.normalize,
        };
        *slot = enabled;
    }

    /// Invierte un filtro y devuelve su nuevo estado
    pub fn toggle(&mut self, stage: FilterStage) -> bool {
        let enabled = !self.is_enabled(stage);
        self.set(stage, enabled);
        enabled
    }

    pub fn any_active(&self) -> bool {
        FilterStage::ORDER.iter().any(|stage| self.is_enabled(*stage))
    }

    /// Etapas activas, siempre en el orden de [`FilterStage::ORDER`]
    pub fn chain(&self) -> Vec<FilterStage> {
        FilterStage::ORDER
            .into_iter()
            .filter(|stage| self.is_enabled(*stage))
            .collect()
    }
}

/// Formato de salida fijo del camino de transcodificación
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub channels: u8,
    pub sample_rate: u32,
    pub codec: &'static str,
}

pub const PCM_OUTPUT: OutputFormat = OutputFormat {
    channels: 2,
    sample_rate: NATIVE_SAMPLE_RATE,
    codec: "pcm_s16le",
};

/// Descripción de cómo convertir una URL en bytes para el transporte de voz
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineDescriptor {
    Passthrough {
        url: String,
    },
    Transcode {
        url: String,
        filters: Vec<FilterStage>,
        output: OutputFormat,
    },
}

impl PipelineDescriptor {
    pub fn transcode(url: impl Into<String>, filters: Vec<FilterStage>) -> Self {
        Self::Transcode {
            url: url.into(),
            filters,
            output: PCM_OUTPUT,
        }
    }

    /// Pipeline sin filtros para el modo radio
    pub fn raw(url: impl Into<String>) -> Self {
        Self::transcode(url, Vec::new())
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Passthrough { url } | Self::Transcode { url, .. } => url,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough { .. })
    }

    pub fn filters(&self) -> &[FilterStage] {
        match self {
            Self::Passthrough { .. } => &[],
            Self::Transcode { filters, .. } => filters,
        }
    }

    /// Grafo `-af` completo, o `None` si no hay filtros
    pub fn filter_graph(&self) -> Option<String> {
        let filters = self.filters();
        if filters.is_empty() {
            return None;
        }
        Some(
            filters
                .iter()
                .map(|stage| stage.expression())
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Extensión del contenedor que ffmpeg escribe en stdout
    pub fn container(&self) -> &'static str {
        match self {
            Self::Passthrough { .. } => "ogg",
            Self::Transcode { .. } => "wav",
        }
    }

    /// Argumentos de ffmpeg que producen este pipeline por stdout
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "5",
            "-analyzeduration",
            "0",
            "-loglevel",
            "panic",
            "-nostats",
            "-i",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect();
        args.push(self.url().to_string());
        args.push("-vn".to_string());

        match self {
            Self::Passthrough { .. } => {
                args.extend(["-c:a", "copy"].map(String::from));
            }
            Self::Transcode { output, .. } => {
                if let Some(graph) = self.filter_graph() {
                    args.push("-af".to_string());
                    args.push(graph);
                }
                args.extend([
                    "-ac".to_string(),
                    output.channels.to_string(),
                    "-ar".to_string(),
                    output.sample_rate.to_string(),
                    "-acodec".to_string(),
                    output.codec.to_string(),
                ]);
            }
        }

        args.extend(["-f".to_string(), self.container().to_string(), "pipe:1".to_string()]);
        args
    }
}

/// Ganancia a la que el mezclador de voz reenvía los paquetes Opus sin tocarlos
pub const UNITY_GAIN: f32 = 1.0;

fn is_unity_gain(gain: f32) -> bool {
    (gain - UNITY_GAIN).abs() < f32::EPSILON
}

/// Decide el pipeline para una pista.
///
/// Passthrough solo si no hay filtros, el volumen es 100%, el codec es Opus y la
/// frecuencia es 48 kHz. Con otra ganancia el mezclador tendría que decodificar
/// igualmente. Cualquier dato ausente fuerza la transcodificación.
pub fn build(track: &Track, filters: &FilterSet, gain: f32) -> PipelineDescriptor {
    if !filters.any_active()
        && is_unity_gain(gain)
        && track.is_native_codec()
        && track.has_native_sample_rate()
    {
        return PipelineDescriptor::Passthrough {
            url: track.direct_url().to_string(),
        };
    }
    PipelineDescriptor::transcode(track.direct_url(), filters.chain())
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No se pudo iniciar ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ffmpeg no expuso su salida estándar")]
    MissingStdout,
}

/// Lanza el proceso que materializa un [`PipelineDescriptor`]
pub trait SourceSpawner: Send + Sync {
    fn spawn(&self, pipeline: &PipelineDescriptor) -> Result<Box<dyn MediaSource>, PipelineError>;
}

/// Fuente lista para entregar al transporte de voz
pub struct AudioSource {
    pub pipeline: PipelineDescriptor,
    pub volume: f32,
    /// El passthrough falló y se usó transcodificación
    pub degraded: bool,
    pub stream: Box<dyn MediaSource>,
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource")
            .field("pipeline", &self.pipeline)
            .field("volume", &self.volume)
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AudioPipelineBuilder {
    spawner: Arc<dyn SourceSpawner>,
}

impl AudioPipelineBuilder {
    pub fn new(spawner: Arc<dyn SourceSpawner>) -> Self {
        Self { spawner }
    }

    /// Abre la fuente de una pista con los filtros y volumen actuales.
    ///
    /// Si el passthrough no arranca se cae a transcodificación y solo se marca
    /// `degraded`; el error solo sube si también falla la transcodificación.
    pub fn open(&self, track: &Track, filters: &FilterSet, volume: f32) -> Result<AudioSource, PipelineError> {
        let pipeline = build(track, filters, volume);

        if pipeline.is_passthrough() {
            match self.spawner.spawn(&pipeline) {
                Ok(stream) => {
                    info!("🎯 Passthrough Opus para: {}", track.title());
                    return Ok(AudioSource {
                        pipeline,
                        volume,
                        degraded: false,
                        stream,
                    });
                }
                Err(e) => {
                    warn!("⚠️ Passthrough falló para {}, usando PCM: {}", track.title(), e);
                    let fallback = PipelineDescriptor::transcode(track.direct_url(), filters.chain());
                    let stream = self.spawner.spawn(&fallback)?;
                    return Ok(AudioSource {
                        pipeline: fallback,
                        volume,
                        degraded: true,
                        stream,
                    });
                }
            }
        }

        info!("🎛️ Pipeline PCM para: {} ({})", track.title(), track.quality_info());
        if let Some(graph) = pipeline.filter_graph() {
            debug!("Filtros: {}", graph);
        }
        let stream = self.spawner.spawn(&pipeline)?;
        Ok(AudioSource {
            pipeline,
            volume,
            degraded: false,
            stream,
        })
    }

    /// Fuente cruda para retransmitir una URL de radio
    pub fn open_raw(&self, url: &str) -> Result<AudioSource, PipelineError> {
        let pipeline = PipelineDescriptor::raw(url);
        let stream = self.spawner.spawn(&pipeline)?;
        Ok(AudioSource {
            pipeline,
            volume: 1.0,
            degraded: false,
            stream,
        })
    }
}
