//! Server configuration: built-in defaults, then an optional TOML file, then
//! `VQA_*` environment variables (nested keys joined with `__`, e.g.
//! `VQA_MODEL__DIR`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when none is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "vqa.toml";

/// Image fetched by `GET /demo`
pub const DEMO_IMAGE_URL: &str = "http://images.cocodataset.org/val2017/000000039769.jpg";

/// Question asked by `GET /demo`, and the prefilled value of the upload form
pub const DEMO_QUESTION: &str = "What are the colors of the cats?";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceChoice {
    /// CUDA when available, otherwise CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl DeviceChoice {
    pub fn resolve(self) -> tch::Device {
        match self {
            DeviceChoice::Auto => tch::Device::cuda_if_available(),
            DeviceChoice::Cpu => tch::Device::Cpu,
            DeviceChoice::Cuda => tch::Device::Cuda(0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Directory holding `model.pt`, `tokenizer.json` and `config.json`
    pub dir: PathBuf,
    pub device: DeviceChoice,
    /// Questions are truncated to this many tokens, special tokens included
    pub max_text_len: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            dir: PathBuf::from("models/vilt-b32-finetuned-vqa"),
            device: DeviceChoice::Auto,
            max_text_len: crate::vqa::processor::DEFAULT_MAX_TEXT_LEN,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    pub image_url: String,
    pub question: String,
    /// Upper bound on the whole image download, `0` for none
    pub fetch_timeout_secs: u64,
}

impl DemoSettings {
    /// `0` disables the timeout
    pub fn fetch_timeout(&self) -> Option<Duration> {
        match self.fetch_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for DemoSettings {
    fn default() -> Self {
        DemoSettings {
            image_url: DEMO_IMAGE_URL.into(),
            question: DEMO_QUESTION.into(),
            fetch_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// The ngrok executable
    pub binary: String,
    /// ngrok's local inspection API
    pub api_url: String,
    pub startup_timeout_secs: u64,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        TunnelSettings {
            binary: "ngrok".into(),
            api_url: "http://127.0.0.1:4040/api/tunnels".into(),
            startup_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    /// `0` picks any free port
    pub port: u16,
    /// Default tracing filter, used when `RUST_LOG` is unset
    pub log_level: String,
    /// `0` disables the timeout
    pub inference_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub model: ModelSettings,
    pub demo: DemoSettings,
    pub tunnel: TunnelSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "0.0.0.0".into(),
            port: 8000,
            log_level: "info,actix_web=info".into(),
            inference_timeout_secs: 120,
            max_upload_bytes: 10 * 1024 * 1024,
            model: ModelSettings::default(),
            demo: DemoSettings::default(),
            tunnel: TunnelSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings. An explicitly named file must exist; the default
    /// `vqa.toml` is optional.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        config::Config::builder()
            .add_source(source)
            .add_source(
                config::Environment::with_prefix("VQA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .context("invalid configuration")
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        match self.inference_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// `Settings::load` reads the process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vqa-{name}-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{contents}").unwrap();
        path
    }

    #[test]
    fn defaults_without_a_file() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.demo.image_url, DEMO_IMAGE_URL);
        assert_eq!(settings.demo.question, DEMO_QUESTION);
        assert_eq!(settings.model.max_text_len, 40);
        assert_eq!(settings.inference_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(settings.demo.fetch_timeout_secs, 30);
    }

    #[test]
    fn toml_overrides_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let path = write_config(
            "toml",
            r#"
            port = 9001
            inference_timeout_secs = 0

            [model]
            dir = "/srv/vilt"
            device = "cpu"

            [demo]
            question = "How many cats are there?"
            "#,
        );

        let settings = Settings::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.port, 9001);
        assert_eq!(settings.inference_timeout(), None);
        assert_eq!(settings.model.dir, PathBuf::from("/srv/vilt"));
        assert_eq!(settings.model.device, DeviceChoice::Cpu);
        assert_eq!(settings.model.max_text_len, 40);
        assert_eq!(settings.demo.question, "How many cats are there?");
        assert_eq!(settings.demo.image_url, DEMO_IMAGE_URL);
        assert_eq!(settings.host, "0.0.0.0");
    }

    #[test]
    fn environment_overrides_file_and_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let path = write_config(
            "env",
            r#"
            port = 9001

            [model]
            dir = "/srv/vilt"
            "#,
        );

        let vars = [
            ("VQA_PORT", "9100"),
            ("VQA_MODEL__DIR", "/opt/vilt"),
            ("VQA_INFERENCE_TIMEOUT_SECS", "7"),
            ("VQA_DEMO__QUESTION", "How many cats are there?"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        let loaded = Settings::load(Some(&path));
        for (key, _) in vars {
            std::env::remove_var(key);
        }
        std::fs::remove_file(&path).unwrap();
        let settings = loaded.unwrap();

        assert_eq!(settings.port, 9100);
        assert_eq!(settings.model.dir, PathBuf::from("/opt/vilt"));
        assert_eq!(settings.inference_timeout(), Some(Duration::from_secs(7)));
        assert_eq!(settings.demo.question, "How many cats are there?");
        assert_eq!(settings.demo.image_url, DEMO_IMAGE_URL);
        assert_eq!(settings.model.device, DeviceChoice::Auto);
    }

    #[test]
    fn named_file_must_exist() {
        assert!(Settings::load(Some(Path::new("/nonexistent/vqa.toml"))).is_err());
    }
}
