use std::collections::{HashMap, HashSet};

use crate::auth::{ApiKeyLocation, AuthSettings, ClientAuthMode, OAuth2Settings};
use crate::http::ProxySettings;
use crate::models::{
    BackoffPolicy, BreakerSettings, EndpointSettings, HttpMethod, ODataSettings, ODataTokenMode,
    OffsetMode, RetrySettings, SourceError, StatusRanges,
};

pub const MAX_ENDPOINTS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorOnError {
    Fail,
    Ignore,
}

impl BehaviorOnError {
    fn parse(s: &str) -> crate::models::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "FAIL" => Ok(BehaviorOnError::Fail),
            "IGNORE" => Ok(BehaviorOnError::Ignore),
            other => Err(SourceError::Configuration(format!(
                "Unknown behavior.on.error: {}",
                other
            ))),
        }
    }
}

/// Fully validated worker configuration, parsed from the flat key/value map
/// the host hands over. Per-endpoint keys carry an `api{N}.` prefix with a
/// 1-based index; global keys carry none.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub base_url: String,
    pub user_agent: String,
    pub behavior_on_error: BehaviorOnError,
    pub stop_timeout_ms: u64,
    pub auth: AuthSettings,
    pub proxy: Option<ProxySettings>,
    pub endpoints: Vec<EndpointSettings>,
    /// child endpoint id -> parent endpoint id
    pub chaining: HashMap<String, String>,
}

impl ConnectorConfig {
    pub fn parse(props: &HashMap<String, String>) -> crate::models::Result<Self> {
        let get = |k: &str| props.get(k).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let required = |k: &str| {
            get(k).ok_or_else(|| SourceError::Configuration(format!("Missing required key: {}", k)))
        };

        let base_url = required("http.api.base.url")?;
        let apis_num: usize = required("apis.num")?
            .parse()
            .map_err(|_| SourceError::Configuration("apis.num must be an integer".into()))?;
        if apis_num == 0 || apis_num > MAX_ENDPOINTS {
            return Err(SourceError::Configuration(format!(
                "apis.num must be between 1 and {}",
                MAX_ENDPOINTS
            )));
        }

        let user_agent =
            get("http.user.agent").unwrap_or_else(|| "http-source-worker/0.1".to_string());
        let behavior_on_error = match get("behavior.on.error") {
            Some(v) => BehaviorOnError::parse(&v)?,
            None => BehaviorOnError::Fail,
        };
        let stop_timeout_ms = parse_or_default(&get, "task.stop.timeout.ms", 30_000)?;

        let auth = parse_auth(&get)?;
        let proxy = parse_proxy(&get)?;

        let mut endpoints = Vec::with_capacity(apis_num);
        for n in 1..=apis_num {
            endpoints.push(parse_endpoint(props, n)?);
        }

        let chaining = parse_chaining(&get, &endpoints)?;

        Ok(ConnectorConfig {
            base_url,
            user_agent,
            behavior_on_error,
            stop_timeout_ms,
            auth,
            proxy,
            endpoints,
            chaining,
        })
    }

    pub fn endpoint(&self, id: &str) -> Option<&EndpointSettings> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn parent_of(&self, child_id: &str) -> Option<&str> {
        self.chaining.get(child_id).map(String::as_str)
    }
}

fn parse_or_default<F>(get: &F, key: &str, default: u64) -> crate::models::Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v
            .parse()
            .map_err(|_| SourceError::Configuration(format!("{} must be an integer", key))),
        None => Ok(default),
    }
}

fn parse_auth<F>(get: &F) -> crate::models::Result<AuthSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let auth_type = get("auth.type").unwrap_or_else(|| "NONE".to_string());
    let required = |k: &str| {
        get(k).ok_or_else(|| SourceError::Configuration(format!("Missing required key: {}", k)))
    };
    match auth_type.to_uppercase().as_str() {
        "NONE" => Ok(AuthSettings::None),
        "BASIC" => Ok(AuthSettings::Basic {
            user: required("auth.basic.user")?,
            password: required("auth.basic.password")?,
        }),
        "BEARER" => Ok(AuthSettings::Bearer {
            token: required("auth.bearer.token")?,
        }),
        "API_KEY" => {
            let location = match get("auth.apikey.location") {
                Some(v) => match v.to_uppercase().as_str() {
                    "HEADER" => ApiKeyLocation::Header,
                    "QUERY" => ApiKeyLocation::Query,
                    other => {
                        return Err(SourceError::Configuration(format!(
                            "Unknown auth.apikey.location: {}",
                            other
                        )))
                    }
                },
                None => ApiKeyLocation::Header,
            };
            Ok(AuthSettings::ApiKey {
                name: required("auth.apikey.name")?,
                value: required("auth.apikey.value")?,
                location,
            })
        }
        "OAUTH2" => {
            let client_auth_mode = match get("auth.oauth2.client.auth.mode") {
                Some(v) => match v.to_uppercase().as_str() {
                    "HEADER" => ClientAuthMode::Header,
                    "URL" => ClientAuthMode::Url,
                    other => {
                        return Err(SourceError::Configuration(format!(
                            "Unknown auth.oauth2.client.auth.mode: {}",
                            other
                        )))
                    }
                },
                None => ClientAuthMode::Header,
            };
            Ok(AuthSettings::OAuth2(OAuth2Settings {
                token_url: required("auth.oauth2.token.url")?,
                client_id: required("auth.oauth2.client.id")?,
                client_secret: required("auth.oauth2.client.secret")?,
                scope: get("auth.oauth2.scope"),
                token_property: get("auth.oauth2.token.property.name")
                    .unwrap_or_else(|| "access_token".to_string()),
                client_auth_mode,
                refresh_interval_minutes: parse_or_default(
                    get,
                    "auth.oauth2.refresh.interval.minutes",
                    30,
                )?,
            }))
        }
        other => Err(SourceError::Configuration(format!(
            "Unknown auth.type: {}",
            other
        ))),
    }
}

fn parse_proxy<F>(get: &F) -> crate::models::Result<Option<ProxySettings>>
where
    F: Fn(&str) -> Option<String>,
{
    let host = match get("http.proxy.host") {
        Some(h) => h,
        None => return Ok(None),
    };
    let port: u16 = get("http.proxy.port")
        .ok_or_else(|| SourceError::Configuration("Missing required key: http.proxy.port".into()))?
        .parse()
        .map_err(|_| SourceError::Configuration("http.proxy.port must be a port number".into()))?;
    Ok(Some(ProxySettings {
        host,
        port,
        user: get("http.proxy.user"),
        password: get("http.proxy.password"),
    }))
}

fn parse_endpoint(
    props: &HashMap<String, String>,
    n: usize,
) -> crate::models::Result<EndpointSettings> {
    let prefix = format!("api{}.", n);
    let get = |k: &str| {
        props
            .get(&format!("{}{}", prefix, k))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let required = |k: &str| {
        get(k).ok_or_else(|| {
            SourceError::Configuration(format!("Missing required key: {}{}", prefix, k))
        })
    };

    let id = format!("api{}", n);
    let path = required("http.api.path")?;
    let topic = required("topics")?;
    let method = match get("http.request.method") {
        Some(m) => HttpMethod::parse(&m)?,
        None => HttpMethod::Get,
    };
    let offset_mode = match get("http.offset.mode") {
        Some(m) => OffsetMode::parse(&m)?,
        None => OffsetMode::SimpleIncrementing,
    };

    let interval_ms = parse_or_default(&get, "request.interval.ms", 60_000)?;
    if interval_ms == 0 {
        return Err(SourceError::Configuration(format!(
            "{}request.interval.ms must be > 0",
            prefix
        )));
    }

    let retry = RetrySettings {
        max_retries: parse_or_default(&get, "max.retries", 3)? as u32,
        backoff_policy: match get("retry.backoff.policy") {
            Some(p) => BackoffPolicy::parse(&p)?,
            None => BackoffPolicy::ExponentialWithJitter,
        },
        backoff_ms: parse_or_default(&get, "retry.backoff.ms", 500)?,
        retry_on_status: match get("retry.on.status.codes") {
            Some(s) => StatusRanges::parse(&s)?,
            None => StatusRanges::default(),
        },
    };

    let breaker = BreakerSettings {
        failure_threshold: parse_or_default(&get, "circuit.breaker.failure.threshold", 3)? as u32,
        recovery_time_ms: parse_or_default(&get, "circuit.breaker.recovery.time.ms", 30_000)?,
    };

    let odata_defaults = ODataSettings::default();
    let odata = ODataSettings {
        next_link_field: get("odata.nextlink.field").unwrap_or(odata_defaults.next_link_field),
        delta_link_field: get("odata.deltalink.field").unwrap_or(odata_defaults.delta_link_field),
        token_mode: match get("odata.token.mode") {
            Some(m) => ODataTokenMode::parse(&m)?,
            None => odata_defaults.token_mode,
        },
        skiptoken_param: get("odata.skiptoken.param").unwrap_or(odata_defaults.skiptoken_param),
        deltatoken_param: get("odata.deltatoken.param").unwrap_or(odata_defaults.deltatoken_param),
        next_link_interval_ms: match get("odata.nextlink.poll.interval.ms") {
            Some(v) => Some(v.parse().map_err(|_| {
                SourceError::Configuration(format!(
                    "{}odata.nextlink.poll.interval.ms must be an integer",
                    prefix
                ))
            })?),
            None => None,
        },
        delta_link_interval_ms: match get("odata.deltalink.poll.interval.ms") {
            Some(v) => Some(v.parse().map_err(|_| {
                SourceError::Configuration(format!(
                    "{}odata.deltalink.poll.interval.ms must be an integer",
                    prefix
                ))
            })?),
            None => None,
        },
    };

    let endpoint = EndpointSettings {
        id,
        path,
        topic,
        method,
        headers: get("http.request.headers"),
        parameters: get("http.request.parameters"),
        body: get("http.request.body"),
        headers_separator: get("http.request.headers.separator").unwrap_or_else(|| "|".into()),
        parameters_separator: get("http.request.parameters.separator")
            .unwrap_or_else(|| "&".into()),
        connect_timeout_ms: parse_or_default(&get, "http.connect.timeout.ms", 5_000)?,
        request_timeout_ms: parse_or_default(&get, "http.request.timeout.ms", 30_000)?,
        interval_ms,
        offset_mode,
        initial_offset: get("http.initial.offset"),
        data_pointer: get("http.response.data.json.pointer"),
        offset_pointer: get("http.offset.json.pointer"),
        next_page_pointer: get("http.next.page.json.pointer"),
        chaining_pointer: get("http.chaining.json.pointer"),
        retry,
        breaker,
        odata,
    };

    validate_mode_requirements(&endpoint)?;
    Ok(endpoint)
}

fn validate_mode_requirements(ep: &EndpointSettings) -> crate::models::Result<()> {
    match ep.offset_mode {
        OffsetMode::Chaining if ep.offset_pointer.is_none() => {
            Err(SourceError::Configuration(format!(
                "{}: CHAINING offset mode requires http.offset.json.pointer",
                ep.id
            )))
        }
        OffsetMode::CursorPagination if ep.next_page_pointer.is_none() => {
            Err(SourceError::Configuration(format!(
                "{}: CURSOR_PAGINATION requires http.next.page.json.pointer",
                ep.id
            )))
        }
        OffsetMode::SnapshotPagination if ep.offset_pointer.is_none() => {
            Err(SourceError::Configuration(format!(
                "{}: SNAPSHOT_PAGINATION requires http.offset.json.pointer",
                ep.id
            )))
        }
        _ => Ok(()),
    }
}

fn parse_chaining<F>(
    get: &F,
    endpoints: &[EndpointSettings],
) -> crate::models::Result<HashMap<String, String>>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = match get("api.chaining.parent.child.relationship") {
        Some(s) => s,
        None => return Ok(HashMap::new()),
    };

    let known: HashSet<&str> = endpoints.iter().map(|e| e.id.as_str()).collect();
    let mut relations: HashMap<String, String> = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (child, parent) = pair.split_once(':').ok_or_else(|| {
            SourceError::Configuration(format!(
                "Chaining relationship must be child:parent, got: {}",
                pair
            ))
        })?;
        let (child, parent) = (child.trim(), parent.trim());
        if !known.contains(child) || !known.contains(parent) {
            return Err(SourceError::Configuration(format!(
                "Chaining relationship references unknown endpoint: {}",
                pair
            )));
        }
        if child == parent {
            return Err(SourceError::Configuration(format!(
                "Endpoint cannot chain to itself: {}",
                child
            )));
        }
        if relations.insert(child.to_string(), parent.to_string()).is_some() {
            return Err(SourceError::Configuration(format!(
                "Endpoint {} has more than one parent",
                child
            )));
        }
    }

    detect_cycles(&relations)?;
    Ok(relations)
}

/// DFS over the child -> parent map. A repeated node along a walk is a
/// circular reference.
fn detect_cycles(relations: &HashMap<String, String>) -> crate::models::Result<()> {
    for start in relations.keys() {
        let mut seen = HashSet::new();
        seen.insert(start.as_str());
        let mut current = start.as_str();
        while let Some(parent) = relations.get(current) {
            if !seen.insert(parent.as_str()) {
                return Err(SourceError::Configuration(format!(
                    "Circular chaining relationship involving {}",
                    parent
                )));
            }
            current = parent.as_str();
        }
    }
    Ok(())
}
