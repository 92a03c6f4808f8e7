use std::collections::HashMap;

use url::Url;

use crate::auth::AuthProvider;
use crate::http::RequestPlan;
use crate::models::{EndpointSettings, HttpMethod, SourceError};
use crate::offsets::CursorDisposition;
use crate::template;

pub const OFFSET_VAR: &str = "offset";

/// Assemble the plan for one fetch: expand the URL, parameter, header and
/// body templates with `${offset}` and the chaining variables, then attach
/// query-located API keys. Expansion happens before URL parsing so variable
/// values cannot confuse URL decomposition.
pub fn build_request(
    endpoint: &EndpointSettings,
    base_url: &str,
    disposition: &CursorDisposition,
    chaining_vars: &HashMap<String, String>,
    auth: &AuthProvider,
) -> crate::models::Result<RequestPlan> {
    let mut vars = chaining_vars.clone();
    let offset_value = match disposition {
        CursorDisposition::Template(cursor) => cursor.clone().unwrap_or_default(),
        CursorDisposition::FullUrl(link) => link.clone(),
        CursorDisposition::QueryParam { value, .. } => value.clone(),
    };
    vars.insert(OFFSET_VAR.to_string(), offset_value);

    let mut url = match disposition {
        // A persisted full link is used verbatim; the cursor itself is never
        // template-expanded. A leading slash replaces the path on the base
        // URL's origin.
        CursorDisposition::FullUrl(link) => {
            if link.starts_with('/') {
                format!("{}{}", origin_of(base_url)?, link)
            } else {
                link.clone()
            }
        }
        _ => {
            let mut url = template::expand(&endpoint.url_template(base_url), &vars);
            if let Some(params) = &endpoint.parameters {
                let expanded = template::expand(params, &vars);
                for piece in expanded
                    .split(endpoint.parameters_separator.as_str())
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                {
                    append_query(&mut url, piece);
                }
            }
            if let CursorDisposition::QueryParam { name, value } = disposition {
                append_query(&mut url, &format!("{}={}", name, value));
            }
            url
        }
    };

    if let Some((name, value)) = auth.query_api_key() {
        append_query(&mut url, &format!("{}={}", name, value));
    }

    Url::parse(&url)
        .map_err(|e| SourceError::Configuration(format!("Invalid request URL {}: {}", url, e)))?;

    let mut headers = Vec::new();
    if let Some(raw) = &endpoint.headers {
        let expanded = template::expand(raw, &vars);
        for piece in expanded
            .split(endpoint.headers_separator.as_str())
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let (name, value) = piece.split_once(':').ok_or_else(|| {
                SourceError::Configuration(format!("Header must be name: value, got: {}", piece))
            })?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let body = match endpoint.method {
        HttpMethod::Post => endpoint.body.as_ref().map(|b| template::expand(b, &vars)),
        HttpMethod::Get => None,
    };

    Ok(RequestPlan {
        url,
        method: endpoint.method,
        headers,
        body,
    })
}

fn append_query(url: &mut String, pair: &str) {
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(pair);
}

fn origin_of(base_url: &str) -> crate::models::Result<String> {
    let parsed = Url::parse(base_url)
        .map_err(|e| SourceError::Configuration(format!("Invalid base URL {}: {}", base_url, e)))?;
    Ok(parsed.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BreakerSettings, ODataSettings, OffsetMode, RetrySettings,
    };

    fn endpoint() -> EndpointSettings {
        EndpointSettings {
            id: "api1".into(),
            path: "/users".into(),
            topic: "users".into(),
            method: HttpMethod::Get,
            headers: None,
            parameters: None,
            body: None,
            headers_separator: "|".into(),
            parameters_separator: "&".into(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            interval_ms: 1_000,
            offset_mode: OffsetMode::SimpleIncrementing,
            initial_offset: None,
            data_pointer: None,
            offset_pointer: None,
            next_page_pointer: None,
            chaining_pointer: None,
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
            odata: ODataSettings::default(),
        }
    }

    fn no_vars() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn expands_offset_into_url_and_parameters() {
        let mut ep = endpoint();
        ep.path = "/users/${offset}".into();
        ep.parameters = Some("limit=10&from=${offset}".into());
        let plan = build_request(
            &ep,
            "http://h/v1",
            &CursorDisposition::Template(Some("42".into())),
            &no_vars(),
            &AuthProvider::None,
        )
        .unwrap();
        assert_eq!(plan.url, "http://h/v1/users/42?limit=10&from=42");
    }

    #[test]
    fn chaining_variables_reach_the_url() {
        let mut ep = endpoint();
        ep.path = "/companies/${parent_value}/employees".into();
        let mut vars = HashMap::new();
        vars.insert("parent_value".to_string(), "42".to_string());
        let plan = build_request(
            &ep,
            "http://h/v1",
            &CursorDisposition::Template(None),
            &vars,
            &AuthProvider::None,
        )
        .unwrap();
        assert_eq!(plan.url, "http://h/v1/companies/42/employees");
    }

    #[test]
    fn headers_split_on_configured_separator() {
        let mut ep = endpoint();
        ep.headers = Some("X-From: ${offset};X-Fixed: yes".into());
        ep.headers_separator = ";".into();
        let plan = build_request(
            &ep,
            "http://h/v1",
            &CursorDisposition::Template(Some("7".into())),
            &no_vars(),
            &AuthProvider::None,
        )
        .unwrap();
        assert_eq!(
            plan.headers,
            vec![
                ("X-From".to_string(), "7".to_string()),
                ("X-Fixed".to_string(), "yes".to_string())
            ]
        );
    }

    #[test]
    fn post_body_is_expanded() {
        let mut ep = endpoint();
        ep.method = HttpMethod::Post;
        ep.body = Some(r#"{"since": "${offset}"}"#.into());
        let plan = build_request(
            &ep,
            "http://h/v1",
            &CursorDisposition::Template(Some("9".into())),
            &no_vars(),
            &AuthProvider::None,
        )
        .unwrap();
        assert_eq!(plan.body.as_deref(), Some(r#"{"since": "9"}"#));
    }

    #[test]
    fn token_cursor_is_appended_as_query_parameter() {
        let mut ep = endpoint();
        ep.path = "/entities".into();
        let plan = build_request(
            &ep,
            "http://h",
            &CursorDisposition::QueryParam {
                name: "$skiptoken".into(),
                value: "T1".into(),
            },
            &no_vars(),
            &AuthProvider::None,
        )
        .unwrap();
        assert_eq!(plan.url, "http://h/entities?$skiptoken=T1");
    }

    #[test]
    fn full_link_cursor_replaces_the_path() {
        let ep = endpoint();
        let plan = build_request(
            &ep,
            "http://h/v1",
            &CursorDisposition::FullUrl("/entities?$skiptoken=T2".into()),
            &no_vars(),
            &AuthProvider::None,
        )
        .unwrap();
        assert_eq!(plan.url, "http://h/entities?$skiptoken=T2");

        let plan = build_request(
            &ep,
            "http://h/v1",
            &CursorDisposition::FullUrl("http://other/x?$deltatoken=D".into()),
            &no_vars(),
            &AuthProvider::None,
        )
        .unwrap();
        assert_eq!(plan.url, "http://other/x?$deltatoken=D");
    }

    #[test]
    fn query_api_key_lands_in_the_url() {
        let ep = endpoint();
        let auth = AuthProvider::ApiKey {
            name: "key".into(),
            value: "k123".into(),
            location: crate::auth::ApiKeyLocation::Query,
        };
        let plan = build_request(
            &ep,
            "http://h/v1",
            &CursorDisposition::Template(None),
            &no_vars(),
            &auth,
        )
        .unwrap();
        assert_eq!(plan.url, "http://h/v1/users?key=k123");
    }

    #[test]
    fn malformed_header_is_a_configuration_error() {
        let mut ep = endpoint();
        ep.headers = Some("NoColonHere".into());
        let err = build_request(
            &ep,
            "http://h/v1",
            &CursorDisposition::Template(None),
            &no_vars(),
            &AuthProvider::None,
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::Configuration(_)));
    }
}
