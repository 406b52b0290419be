//! Client for the fleet telemetry service's `ajax.html` API.
//!
//! Every call is an HTTP POST with the service name, JSON-encoded parameters
//! and the session id in the query string. Reports are executed
//! asynchronously on the remote side, so after submitting one we poll the
//! export endpoint until a real file comes back.

use std::{thread, time::Duration};

use anyhow::Context as _;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::{
    config::Config,
    credentials,
    tools::fleet_report::{ReportKind, ReportSource},
};

pub const DEFAULT_ENDPOINT: &str = "https://hst-api.wialon.com/wialon/ajax.html";

const SVC_LOGIN: &str = "token/login";
const SVC_SET_LOCALE: &str = "render/set_locale";
const SVC_EXEC_REPORT: &str = "report/exec_report";
const SVC_EXPORT_RESULT: &str = "report/export_result";

/// Export format 8 is an xlsx workbook; compression stays off so the body is
/// the workbook itself.
const EXPORT_PARAMS: &str = r#"{"format":8,"compress":0}"#;

#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// The HTTP layer underneath the API calls.
pub trait Transport {
    fn post(&self, url: Url) -> anyhow::Result<RawResponse>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: Url) -> anyhow::Result<RawResponse> {
        let response = self.client.post(url).send()?;
        let status = response.status();
        let body = response.bytes()?.to_vec();
        Ok(RawResponse { status, body })
    }
}

#[derive(Debug, Clone)]
pub struct ApiEndpoint {
    base: Url,
}

impl ApiEndpoint {
    pub fn new(base: &str) -> Result<Self, url::ParseError> {
        Ok(Self { base: Url::parse(base)? })
    }

    pub fn url(&self, svc: &str, params: &str, sid: Option<&str>) -> Url {
        let mut url = self.base.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("svc", svc).append_pair("params", params);
            if let Some(sid) = sid {
                query.append_pair("sid", sid);
            }
        }
        url
    }
}

/// Session-scoped display preferences sent right after logging in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Locale {
    #[serde(rename = "tzOffset")]
    pub tz_offset: i64,
    pub language: String,
    #[serde(rename = "formatDate")]
    pub format_date: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self { tz_offset: 134228528, language: "en".to_owned(), format_date: "%E.%m.%Y %H:%M:%S".to_owned() }
    }
}

/// An authenticated session. The id is opaque and only meaningful to the
/// remote service.
#[derive(Debug, Clone)]
pub struct Session {
    sid: String,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.sid
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential file {0} does not exist")]
    MissingCredentialFile(String),
    #[error("credential file {path} is malformed: {source}")]
    MalformedCredentialFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("account \"{0}\" has no access token in the credential file")]
    MissingAccessToken(String),
    #[error("login did not return a session id (response: {0})")]
    NoSessionId(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Exchanges an access token for a session, then applies the locale if one
/// is given. A failure to set the locale only produces a warning.
pub fn authenticate<T: Transport>(
    transport: &T,
    endpoint: &ApiEndpoint,
    access_token: &str,
    locale: Option<&Locale>,
) -> Result<Session, AuthError> {
    #[derive(Deserialize)]
    struct LoginResponse {
        eid: Option<String>,
    }

    info!("logging in to the telemetry service");
    let params = json!({ "token": access_token }).to_string();
    let response = transport.post(endpoint.url(SVC_LOGIN, &params, None)).context("login request failed")?;
    let body = String::from_utf8_lossy(&response.body).into_owned();
    if !response.status.is_success() {
        return Err(AuthError::NoSessionId(format!("HTTP {}: {}", response.status, body)));
    }
    let login: LoginResponse =
        serde_json::from_str(&body).map_err(|_| AuthError::NoSessionId(body.clone()))?;
    let sid = match login.eid {
        Some(eid) if !eid.is_empty() => eid,
        _ => return Err(AuthError::NoSessionId(body)),
    };
    let session = Session { sid };
    info!("obtained telemetry session");

    if let Some(locale) = locale {
        let params = serde_json::to_string(locale).context("serializing locale")?;
        match transport.post(endpoint.url(SVC_SET_LOCALE, &params, Some(session.id()))) {
            Ok(response) if response.status.is_success() => debug!("session locale set"),
            Ok(response) => warn!("setting session locale returned status {}", response.status),
            Err(e) => warn!("failed to set session locale: {}", e),
        }
    }

    Ok(session)
}

/// Everything the exec_report call needs to run one report.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub resource_id: u64,
    pub template_id: u64,
    pub object_id: u64,
    /// Opaque description of the report's tables and columns.
    pub template: Value,
    /// Unix seconds, inclusive on both ends.
    pub interval: (i64, i64),
}

impl ReportRequest {
    pub fn to_params(&self) -> Value {
        json!({
            "reportResourceId": self.resource_id,
            "reportTemplateId": self.template_id,
            "reportObjectId": self.object_id,
            "reportObjectSecId": 0,
            "reportTemplate": self.template,
            "interval": {
                "from": self.interval.0,
                "to": self.interval.1,
                "flags": 0,
            },
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Bodies this size or smaller are placeholders, not report files.
    pub min_payload_bytes: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { max_attempts: 6, delay: Duration::from_secs(2), min_payload_bytes: 100 }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("exec_report was rejected with status {status}: {body}")]
    ExecRejected { status: StatusCode, body: String },
    #[error("report was not ready after {attempts} export attempts")]
    Timeout { attempts: u32 },
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Runs a report and downloads its exported workbook.
pub fn fetch_report<T: Transport>(
    transport: &T,
    endpoint: &ApiEndpoint,
    session: &Session,
    request: &ReportRequest,
    policy: &PollPolicy,
) -> Result<Vec<u8>, FetchError> {
    let params = request.to_params().to_string();
    debug!(
        "executing report template {} for object {} over {:?}",
        request.template_id, request.object_id, request.interval
    );
    let exec = transport
        .post(endpoint.url(SVC_EXEC_REPORT, &params, Some(session.id())))
        .context("exec_report request failed")?;
    if !exec.status.is_success() {
        return Err(FetchError::ExecRejected {
            status: exec.status,
            body: String::from_utf8_lossy(&exec.body).into_owned(),
        });
    }

    let export_url = endpoint.url(SVC_EXPORT_RESULT, EXPORT_PARAMS, Some(session.id()));
    for attempt in 1..=policy.max_attempts {
        match transport.post(export_url.clone()) {
            Ok(response)
                if response.status.is_success() && response.body.len() > policy.min_payload_bytes =>
            {
                info!("downloaded report ({} bytes) on attempt {}", response.body.len(), attempt);
                return Ok(response.body);
            }
            Ok(response) => trace!(
                "export attempt {} not ready: status {}, {} bytes",
                attempt,
                response.status,
                response.body.len()
            ),
            Err(e) => warn!("export attempt {} failed: {}", attempt, e),
        }
        if attempt < policy.max_attempts {
            thread::sleep(policy.delay);
        }
    }
    Err(FetchError::Timeout { attempts: policy.max_attempts })
}

/// Where one kind of report lives on the service and how its export is read.
#[derive(Debug, Clone)]
pub struct ReportTarget {
    pub resource_id: u64,
    pub template_id: u64,
    pub template: Value,
    pub sheet_name: String,
}

/// An authenticated client that can run both report kinds for any vehicle
/// group.
pub struct TelematicsClient<T: Transport = HttpTransport> {
    transport: T,
    endpoint: ApiEndpoint,
    session: Session,
    trips: ReportTarget,
    eco_driving: ReportTarget,
    policy: PollPolicy,
}

impl TelematicsClient<HttpTransport> {
    /// Reads the access token named by the config, logs in and prepares the
    /// report templates.
    pub fn connect(config: &Config) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(config.request_timeout())?;
        Self::connect_with(transport, config)
    }
}

impl<T: Transport> TelematicsClient<T> {
    pub fn connect_with(transport: T, config: &Config) -> anyhow::Result<Self> {
        let endpoint = ApiEndpoint::new(&config.api_base_url)
            .with_context(|| format!("invalid API url \"{}\"", config.api_base_url))?;
        let token = credentials::load_access_token(&config.credentials_file, &config.account)?;
        let session = authenticate(&transport, &endpoint, &token, config.locale.as_ref())?;
        let templates = config.load_templates()?;
        let target = |kind: ReportKind| {
            let report = config.report(kind);
            ReportTarget {
                resource_id: report.resource_id,
                template_id: report.template_id,
                template: templates.get(kind).clone(),
                sheet_name: report.sheet_name.clone(),
            }
        };
        Ok(Self {
            trips: target(ReportKind::Trips),
            eco_driving: target(ReportKind::EcoDriving),
            transport,
            endpoint,
            session,
            policy: config.poll_policy()?,
        })
    }

    fn target(&self, kind: ReportKind) -> &ReportTarget {
        match kind {
            ReportKind::Trips => &self.trips,
            ReportKind::EcoDriving => &self.eco_driving,
        }
    }
}

impl<T: Transport> ReportSource for TelematicsClient<T> {
    fn fetch(&self, kind: ReportKind, group_id: u64, interval: (i64, i64)) -> Result<Vec<u8>, FetchError> {
        let target = self.target(kind);
        let request = ReportRequest {
            resource_id: target.resource_id,
            template_id: target.template_id,
            object_id: group_id,
            template: target.template.clone(),
            interval,
        };
        info!("fetching {} report for group {}", kind, group_id);
        fetch_report(&self.transport, &self.endpoint, &self.session, &request, &self.policy)
    }

    fn sheet_name(&self, kind: ReportKind) -> &str {
        &self.target(kind).sheet_name
    }
}
