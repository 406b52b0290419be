use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::{
    apis::telematics::{Locale, PollPolicy, DEFAULT_ENDPOINT},
    tools::fleet_report::ReportKind,
};

const DEFAULT_CONFIG_FILE: &str = "fleetscore.json";

const TRIPS_TEMPLATE: &str = include_str!("../assets/templates/trips.json");
const ECO_DRIVING_TEMPLATE: &str = include_str!("../assets/templates/eco_driving.json");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {0} does not exist")]
    Missing(PathBuf),
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown time zone \"{0}\"")]
    TimeZone(String),
    #[error("poll delay of {0} seconds is out of range")]
    PollDelay(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub credentials_file: PathBuf,
    /// Which entry of the credential file to log in with.
    pub account: String,
    pub group_directory: PathBuf,
    pub group_directory_sheet: String,
    /// IANA name of the zone that report periods and trip times are in.
    pub timezone: String,
    pub request_timeout_secs: u64,
    pub poll: PollConfig,
    pub locale: Option<Locale>,
    pub trips_report: ReportTemplateConfig,
    pub eco_driving_report: ReportTemplateConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_ENDPOINT.to_owned(),
            credentials_file: PathBuf::from("accounts.json"),
            account: "track3".to_owned(),
            group_directory: PathBuf::from("track3_unit groups.xlsx"),
            group_directory_sheet: "Sheet1".to_owned(),
            timezone: "Africa/Nairobi".to_owned(),
            request_timeout_secs: 60,
            poll: PollConfig::default(),
            locale: Some(Locale::default()),
            trips_report: ReportTemplateConfig {
                resource_id: 17082202,
                template_id: 0,
                sheet_name: "Trips".to_owned(),
                template_file: None,
            },
            eco_driving_report: ReportTemplateConfig {
                resource_id: 26749909,
                template_id: 8,
                sheet_name: "Eco driving".to_owned(),
                template_file: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub delay_secs: f64,
    pub min_payload_bytes: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            delay_secs: policy.delay.as_secs_f64(),
            min_payload_bytes: policy.min_payload_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTemplateConfig {
    pub resource_id: u64,
    pub template_id: u64,
    /// Sheet of the exported workbook that holds the rows we aggregate.
    pub sheet_name: String,
    /// Overrides the built-in template body.
    #[serde(default)]
    pub template_file: Option<PathBuf>,
}

impl Config {
    /// Loads the config from `path`, or from `fleetscore.json` in the working
    /// directory if it exists, or falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) if !path.exists() => return Err(ConfigError::Missing(path.to_owned())),
            Some(path) => path.to_owned(),
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default_path.exists() {
                    info!("no config file found; using built-in defaults");
                    return Ok(Self::default());
                }
                default_path
            }
        };
        let content = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        let config =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn time_zone(&self) -> Result<Tz, ConfigError> {
        self.timezone.parse().map_err(|_| ConfigError::TimeZone(self.timezone.clone()))
    }

    pub fn poll_policy(&self) -> Result<PollPolicy, ConfigError> {
        let delay = Duration::try_from_secs_f64(self.poll.delay_secs.max(0.0))
            .map_err(|_| ConfigError::PollDelay(self.poll.delay_secs))?;
        Ok(PollPolicy {
            max_attempts: self.poll.max_attempts.max(1),
            delay,
            min_payload_bytes: self.poll.min_payload_bytes,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn report(&self, kind: ReportKind) -> &ReportTemplateConfig {
        match kind {
            ReportKind::Trips => &self.trips_report,
            ReportKind::EcoDriving => &self.eco_driving_report,
        }
    }

    /// Loads the template bodies for both report kinds.
    pub fn load_templates(&self) -> Result<ReportTemplates, ConfigError> {
        Ok(ReportTemplates {
            trips: self.trips_report.load_template(TRIPS_TEMPLATE)?,
            eco_driving: self.eco_driving_report.load_template(ECO_DRIVING_TEMPLATE)?,
        })
    }
}

impl ReportTemplateConfig {
    fn load_template(&self, builtin: &str) -> Result<Value, ConfigError> {
        match &self.template_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
                let template = serde_json::from_str(&content)
                    .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
                info!("loaded report template from {}", path.display());
                Ok(template)
            }
            None => serde_json::from_str(builtin).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<built-in template>"),
                source,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportTemplates {
    pub trips: Value,
    pub eco_driving: Value,
}

impl ReportTemplates {
    pub fn get(&self, kind: ReportKind) -> &Value {
        match kind {
            ReportKind::Trips => &self.trips,
            ReportKind::EcoDriving => &self.eco_driving,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn builtin_templates_parse() {
        let templates = Config::default().load_templates().unwrap();
        assert_eq!(templates.trips["n"], "Group Trips Stops and Parkings Report");
        assert_eq!(templates.eco_driving["id"], 8);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"timezone": "Europe/London", "poll": {{"max_attempts": 3}}}}"#).unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.timezone, "Europe/London");
        assert_eq!(config.poll.max_attempts, 3);
        assert_eq!(config.poll.min_payload_bytes, 100);
        assert_eq!(config.account, "track3");
        assert_eq!(config.eco_driving_report.sheet_name, "Eco driving");
        assert_eq!(config.poll_policy().unwrap().delay, Duration::from_secs(2));
    }

    #[test]
    fn rejects_unknown_time_zone() {
        let config = Config { timezone: "Mars/Olympus".to_owned(), ..Config::default() };
        assert!(matches!(config.time_zone(), Err(ConfigError::TimeZone(_))));
        assert!(Config::default().time_zone().is_ok());
    }

    #[test]
    fn rejects_out_of_range_poll_delay() {
        let config = Config {
            poll: PollConfig { delay_secs: 1e20, ..PollConfig::default() },
            ..Config::default()
        };
        assert!(matches!(config.poll_policy(), Err(ConfigError::PollDelay(_))));
        let config = Config { poll: PollConfig { delay_secs: -3.0, ..PollConfig::default() }, ..Config::default() };
        assert_eq!(config.poll_policy().unwrap().delay, Duration::ZERO);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/fleetscore.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }
}
