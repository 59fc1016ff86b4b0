use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{ChainError, Result, ShareLock, common::Vars, template};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Executes a plugin tool by id, invoked by `plugin` nodes.
#[async_trait]
pub trait PluginClient: Send + Sync {
    async fn execute(
        &self,
        plugin_tool_id: &str,
        args: Vars,
    ) -> Result<Value>;
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PluginMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginAuth {
    #[default]
    NoAuth,
    Bearer {
        token: String,
    },
    /// `credentials` is `user:password` and gets base64 encoded.
    Basic {
        credentials: String,
    },
    /// Key/value pair sent as a header, or as a query parameter when `in_query` is set.
    ApiKey {
        key: String,
        value: String,
        #[serde(default)]
        in_query: bool,
    },
}

/// HTTP endpoint backing one plugin tool.
///
/// `url` may contain `{name}` segments filled from the call arguments.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PluginEndpoint {
    pub url: String,
    #[serde(default)]
    pub method: PluginMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub auth: PluginAuth,
    /// request timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Reqwest-backed [`PluginClient`] with an in-memory endpoint table.
#[derive(Clone)]
pub struct HttpPluginClient {
    client: reqwest::Client,
    endpoints: ShareLock<HashMap<String, PluginEndpoint>>,
}

impl Default for HttpPluginClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpPluginClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register(
        &self,
        plugin_tool_id: &str,
        endpoint: PluginEndpoint,
    ) {
        self.endpoints.write().unwrap_or_else(PoisonError::into_inner).insert(plugin_tool_id.to_string(), endpoint);
    }

    fn endpoint(
        &self,
        plugin_tool_id: &str,
    ) -> Result<PluginEndpoint> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plugin_tool_id)
            .cloned()
            .ok_or_else(|| ChainError::Client(format!("plugin tool not found: {}", plugin_tool_id)))
    }

    fn headers(endpoint: &PluginEndpoint) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("accept"), HeaderValue::from_static("*/*"));

        for (key, value) in &endpoint.headers {
            headers.insert(
                key.parse::<HeaderName>().map_err(|err| ChainError::Client(err.to_string()))?,
                value.parse().map_err(|err: InvalidHeaderValue| ChainError::Client(err.to_string()))?,
            );
        }

        let auth = match &endpoint.auth {
            PluginAuth::NoAuth => None,
            PluginAuth::Bearer {
                token,
            } => Some(("authorization".to_string(), format!("Bearer {}", token))),
            PluginAuth::Basic {
                credentials,
            } => Some(("authorization".to_string(), format!("Basic {}", STANDARD.encode(credentials.as_bytes())))),
            PluginAuth::ApiKey {
                key,
                value,
                in_query: false,
            } => Some((key.clone(), value.clone())),
            PluginAuth::ApiKey {
                ..
            } => None,
        };
        if let Some((key, value)) = auth {
            headers.insert(
                key.parse::<HeaderName>().map_err(|err| ChainError::Client(err.to_string()))?,
                value.parse().map_err(|err: InvalidHeaderValue| ChainError::Client(err.to_string()))?,
            );
        }

        Ok(headers)
    }

    /// Fill `{name}` path segments and return the arguments left over.
    fn fill_path(
        url: &str,
        args: &Vars,
    ) -> (String, Vars) {
        let mut url = url.to_string();
        let mut rest = Vars::new();
        for (key, value) in args.iter() {
            let segment = format!("{{{}}}", key);
            if url.contains(&segment) {
                url = url.replace(&segment, &template::stringify(value));
            } else {
                rest.set(key, value);
            }
        }
        (url, rest)
    }
}

#[async_trait]
impl PluginClient for HttpPluginClient {
    async fn execute(
        &self,
        plugin_tool_id: &str,
        args: Vars,
    ) -> Result<Value> {
        let endpoint = self.endpoint(plugin_tool_id)?;
        let (url, args) = Self::fill_path(&endpoint.url, &args);

        let mut query = Vec::new();
        if let PluginAuth::ApiKey {
            key,
            value,
            in_query: true,
        } = &endpoint.auth
        {
            query.push((key.clone(), value.clone()));
        }

        let method = endpoint.method.as_ref().parse::<reqwest::Method>().map_err(|e| ChainError::Client(e.to_string()))?;
        let mut request = self
            .client
            .request(method, &url)
            .headers(Self::headers(&endpoint)?)
            .timeout(Duration::from_millis(endpoint.timeout.unwrap_or(DEFAULT_TIMEOUT_MS)));

        match endpoint.method {
            PluginMethod::Get | PluginMethod::Delete => {
                query.extend(args.iter().map(|(k, v)| (k.clone(), template::stringify(v))));
            }
            _ => {
                request = request.json(&args);
            }
        }
        debug!(plugin_tool_id, url = %url, "calling plugin");

        let response = request.query(&query).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ChainError::Client(format!("plugin {} returned {}: {}", plugin_tool_id, status, text)));
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}
