use clap::{Args, Parser};
use serde::Deserialize;

use crate::error::AppError;

#[derive(Parser)]
#[command(name = "pulse-ingestor", about = "Локальный fs-broker и конвейер pulse-событий")]
pub struct Cli {
    #[command(flatten)]
    pub args: IngestorArgs,
}

#[derive(Args, Clone, Debug)]
pub struct IngestorArgs {
    /// Порт broker'а
    #[arg(long, env = "BROKER_PORT")]
    pub port: Option<u16>,

    /// Topic входящих pulse-событий
    #[arg(long, env = "SOURCE_TOPIC")]
    pub source_topic: Option<String>,

    /// Путь к TOML конфиг файлу (необязателен)
    #[arg(long, default_value = "ingestor.toml", env = "INGESTOR_CONFIG")]
    pub config: String,

    /// Включить генератор случайных pulse'ов
    #[arg(long)]
    pub stub: bool,

    /// Количество случайных tenant'ов генератора
    #[arg(long)]
    pub stub_tenants: Option<usize>,

    /// Количество случайных SKU генератора
    #[arg(long)]
    pub stub_skus: Option<usize>,

    /// Удалить data-директорию перед генерацией
    #[arg(long)]
    pub stub_clean: bool,
}

// ---- TOML Config ----

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub port: Option<u16>,
    pub source_topic: Option<String>,
    pub stub: Option<bool>,
    pub stub_tenants: Option<usize>,
    pub stub_skus: Option<usize>,
    pub stub_clean: Option<bool>,
}

fn load_config(path: &str) -> Result<Config, AppError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        // отсутствующий конфиг — не ошибка, работаем на дефолтах
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => return Err(AppError::Config(format!("cannot read config '{path}': {e}"))),
    };
    toml::from_str(&content).map_err(|e| AppError::Config(format!("bad config '{path}': {e}")))
}

/// Итоговая конфигурация после мержа: config.toml < env/CLI.
#[derive(Debug, Clone)]
pub struct Effective {
    pub port: u16,
    pub source_topic: String,
    pub stub: bool,
    pub stub_tenants: usize,
    pub stub_skus: usize,
    pub stub_clean: bool,
}

impl Effective {
    pub fn new(args: &IngestorArgs) -> Result<Self, AppError> {
        let cfg = load_config(&args.config)?;

        Ok(Self {
            port: args.port.or(cfg.port).unwrap_or(9000),
            source_topic: args
                .source_topic
                .clone()
                .or(cfg.source_topic)
                .unwrap_or_else(|| "source.pulses".to_string()),
            stub: args.stub || cfg.stub.unwrap_or(false),
            stub_tenants: args.stub_tenants.or(cfg.stub_tenants).unwrap_or(10),
            stub_skus: args.stub_skus.or(cfg.stub_skus).unwrap_or(50),
            stub_clean: args.stub_clean || cfg.stub_clean.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_args() -> IngestorArgs {
        IngestorArgs {
            port: None,
            source_topic: None,
            config: "does-not-exist.toml".to_string(),
            stub: false,
            stub_tenants: None,
            stub_skus: None,
            stub_clean: false,
        }
    }

    #[test]
    fn defaults_without_config_file() {
        let eff = Effective::new(&bare_args()).unwrap();
        assert_eq!(eff.port, 9000);
        assert_eq!(eff.source_topic, "source.pulses");
        assert!(!eff.stub);
        assert_eq!(eff.stub_tenants, 10);
        assert_eq!(eff.stub_skus, 50);
    }

    #[test]
    fn cli_overrides_defaults() {
        let mut args = bare_args();
        args.port = Some(9100);
        args.source_topic = Some("other.pulses".to_string());
        args.stub = true;
        args.stub_tenants = Some(3);

        let eff = Effective::new(&args).unwrap();
        assert_eq!(eff.port, 9100);
        assert_eq!(eff.source_topic, "other.pulses");
        assert!(eff.stub);
        assert_eq!(eff.stub_tenants, 3);
        assert_eq!(eff.stub_skus, 50);
    }
}
