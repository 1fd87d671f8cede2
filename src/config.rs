use anyhow::Result;
use serde::Deserialize;

use crate::audio::EncodingMode;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub transcriber: TranscriberConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub block_size: usize,
    pub monitor: bool,
}

#[derive(Debug, Deserialize)]
pub struct TranscriberConfig {
    pub endpoint_url: String,
    pub encoding: EncodingMode,
    pub target_sample_rate: u32,
    pub settings_path: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Session configuration derived from the audio and transcriber
    /// sections.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            endpoint_url: self.transcriber.endpoint_url.clone(),
            block_size: self.audio.block_size,
            encoding: self.transcriber.encoding,
            target_sample_rate: self.transcriber.target_sample_rate,
            monitor: self.audio.monitor,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            service: ServiceConfig {
                name: "tabscribe".to_string(),
                http: HttpConfig {
                    bind: "127.0.0.1".to_string(),
                    port: 3030,
                },
            },
            audio: AudioConfig {
                block_size: session.block_size,
                monitor: session.monitor,
            },
            transcriber: TranscriberConfig {
                endpoint_url: session.endpoint_url,
                encoding: session.encoding,
                target_sample_rate: session.target_sample_rate,
                settings_path: ".tabscribe/settings.json".to_string(),
            },
        }
    }
}
