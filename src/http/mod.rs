pub mod retry;

pub use retry::*;

use std::time::{Duration, Instant};

use crate::auth::AuthProvider;
use crate::models::{EndpointSettings, HttpMethod, SourceError};

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// The plan for one fetch, fully derived from endpoint config, cursor,
/// chaining variables and template expansion before execution.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: String,
    pub elapsed: Duration,
}

/// Thin wrapper over a per-endpoint reqwest client carrying the endpoint's
/// connect and request timeouts, redirect handling and optional proxy.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn build(
        endpoint: &EndpointSettings,
        proxy: Option<&ProxySettings>,
        user_agent: &str,
    ) -> crate::models::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(endpoint.request_timeout_ms))
            .connect_timeout(Duration::from_millis(endpoint.connect_timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(user_agent.to_string());

        if let Some(p) = proxy {
            let mut proxy = reqwest::Proxy::all(format!("http://{}:{}", p.host, p.port))
                .map_err(SourceError::Http)?;
            if let Some(user) = &p.user {
                proxy = proxy.basic_auth(user, p.password.as_deref().unwrap_or(""));
            }
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(SourceError::Http)?;
        Ok(Self { client })
    }

    /// Execute a single prepared request. Non-2xx statuses surface as
    /// `SourceError::Status` carrying the status and body.
    pub async fn execute(
        &self,
        plan: &RequestPlan,
        auth: &AuthProvider,
    ) -> crate::models::Result<HttpResponse> {
        let started = Instant::now();

        let mut request_builder = match plan.method {
            HttpMethod::Get => self.client.get(&plan.url),
            HttpMethod::Post => self.client.post(&plan.url),
        };
        for (name, value) in &plan.headers {
            request_builder = request_builder.header(name.as_str(), value.as_str());
        }
        request_builder = request_builder.header("Accept", "application/json");
        if let Some(body) = &plan.body {
            request_builder = request_builder
                .header("Content-Type", "application/json")
                .body(body.clone());
        }

        // Auth header is applied last so it wins over template headers
        request_builder = auth.apply(request_builder)?;

        let response = request_builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let elapsed = started.elapsed();

        if !(200..300).contains(&status) {
            return Err(SourceError::status(status, body));
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
            elapsed,
        })
    }
}
