use serde::{Deserialize, Serialize};

use crate::models::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn parse(s: &str) -> crate::models::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            other => Err(SourceError::Configuration(format!(
                "Unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetMode {
    SimpleIncrementing,
    Chaining,
    CursorPagination,
    SnapshotPagination,
    ODataPagination,
}

impl OffsetMode {
    pub fn parse(s: &str) -> crate::models::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "SIMPLE_INCREMENTING" => Ok(OffsetMode::SimpleIncrementing),
            "CHAINING" => Ok(OffsetMode::Chaining),
            "CURSOR_PAGINATION" => Ok(OffsetMode::CursorPagination),
            "SNAPSHOT_PAGINATION" => Ok(OffsetMode::SnapshotPagination),
            "ODATA_PAGINATION" => Ok(OffsetMode::ODataPagination),
            other => Err(SourceError::Configuration(format!(
                "Unknown offset mode: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffPolicy {
    ConstantValue,
    ExponentialWithJitter,
}

impl BackoffPolicy {
    pub fn parse(s: &str) -> crate::models::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CONSTANT_VALUE" => Ok(BackoffPolicy::ConstantValue),
            "EXPONENTIAL_WITH_JITTER" => Ok(BackoffPolicy::ExponentialWithJitter),
            other => Err(SourceError::Configuration(format!(
                "Unknown backoff policy: {}",
                other
            ))),
        }
    }
}

/// Inclusive status code ranges, parsed from forms like `"400-,404,500-502"`.
/// An open range `"400-"` covers everything from 400 up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRanges(Vec<(u16, u16)>);

impl StatusRanges {
    pub fn parse(raw: &str) -> crate::models::Result<Self> {
        let mut ranges = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let range = if let Some((lo, hi)) = part.split_once('-') {
                let lo: u16 = lo.trim().parse().map_err(|_| {
                    SourceError::Configuration(format!("Invalid status range: {}", part))
                })?;
                let hi = hi.trim();
                if hi.is_empty() {
                    (lo, u16::MAX)
                } else {
                    let hi: u16 = hi.parse().map_err(|_| {
                        SourceError::Configuration(format!("Invalid status range: {}", part))
                    })?;
                    (lo, hi)
                }
            } else {
                let code: u16 = part.parse().map_err(|_| {
                    SourceError::Configuration(format!("Invalid status code: {}", part))
                })?;
                (code, code)
            };
            if range.0 > range.1 {
                return Err(SourceError::Configuration(format!(
                    "Empty status range: {}",
                    part
                )));
            }
            ranges.push(range);
        }
        Ok(StatusRanges(ranges))
    }

    pub fn contains(&self, status: u16) -> bool {
        self.0.iter().any(|(lo, hi)| status >= *lo && status <= *hi)
    }
}

impl Default for StatusRanges {
    fn default() -> Self {
        // Everything from 400 up, on top of the always-retried set
        StatusRanges(vec![(400, u16::MAX)])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub backoff_policy: BackoffPolicy,
    pub backoff_ms: u64,
    pub retry_on_status: StatusRanges,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_policy: BackoffPolicy::ExponentialWithJitter,
            backoff_ms: 500,
            retry_on_status: StatusRanges::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_time_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_time_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ODataTokenMode {
    FullUrl,
    TokenOnly,
}

impl ODataTokenMode {
    pub fn parse(s: &str) -> crate::models::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "FULL_URL" => Ok(ODataTokenMode::FullUrl),
            "TOKEN_ONLY" => Ok(ODataTokenMode::TokenOnly),
            other => Err(SourceError::Configuration(format!(
                "Unknown OData token mode: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ODataSettings {
    pub next_link_field: String,
    pub delta_link_field: String,
    pub token_mode: ODataTokenMode,
    pub skiptoken_param: String,
    pub deltatoken_param: String,
    pub next_link_interval_ms: Option<u64>,
    pub delta_link_interval_ms: Option<u64>,
}

impl Default for ODataSettings {
    fn default() -> Self {
        Self {
            next_link_field: "@odata.nextLink".to_string(),
            delta_link_field: "@odata.deltaLink".to_string(),
            token_mode: ODataTokenMode::FullUrl,
            skiptoken_param: "$skiptoken".to_string(),
            deltatoken_param: "$deltatoken".to_string(),
            next_link_interval_ms: None,
            delta_link_interval_ms: None,
        }
    }
}

/// Everything one polled endpoint is configured with. Built by
/// `ConnectorConfig::parse` from the `api{N}.`-prefixed keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    pub id: String,
    pub path: String,
    pub topic: String,
    pub method: HttpMethod,
    pub headers: Option<String>,
    pub parameters: Option<String>,
    pub body: Option<String>,
    pub headers_separator: String,
    pub parameters_separator: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub interval_ms: u64,
    pub offset_mode: OffsetMode,
    pub initial_offset: Option<String>,
    pub data_pointer: Option<String>,
    pub offset_pointer: Option<String>,
    pub next_page_pointer: Option<String>,
    pub chaining_pointer: Option<String>,
    pub retry: RetrySettings,
    pub breaker: BreakerSettings,
    pub odata: ODataSettings,
}

impl EndpointSettings {
    /// Effective URL template for this endpoint before expansion.
    pub fn url_template(&self, base_url: &str) -> String {
        format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            if self.path.starts_with('/') {
                self.path.clone()
            } else {
                format!("/{}", self.path)
            }
        )
    }
}
