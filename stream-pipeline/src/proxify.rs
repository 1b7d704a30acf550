use crate::config::ProxyConfig;
use crate::error::PipelineError;
use crate::stream::ParsedStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use surf::Client;
use url::Url;
use utils::SurfLogging;

/// One stream's worth of input to the bulk URL-generation call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// The proxy collaborator: turns a batch of upstream URLs into proxied
/// ones. `None` per slot means that stream's generation failed.
#[async_trait]
pub trait ProxyServer: Send + Sync {
    async fn generate_urls(
        &self,
        requests: &[ProxyRequest],
    ) -> Result<Vec<Option<String>>, PipelineError>;
}

/// Rewrites eligible streams through the proxy in one bulk call.
///
/// Streams whose URL generation fails are dropped rather than returned
/// with a broken link; rewritten streams are marked `proxied` and lose
/// their request headers, since the proxy takes those over. A failure of
/// the bulk call itself drops every eligible stream the same way — better
/// no link than one that bypasses the proxy the user configured.
pub async fn apply(
    streams: Vec<ParsedStream>,
    config: &ProxyConfig,
    proxy: &dyn ProxyServer,
) -> Vec<ParsedStream> {
    if !config.enabled {
        return streams;
    }

    let proxy_host = Url::parse(&config.url)
        .ok()
        .and_then(|u| u.host_str().map(String::from));

    // slots keep original positions; dropped streams become holes
    let mut slots: Vec<Option<ParsedStream>> = streams.into_iter().map(Some).collect();

    let eligible: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| {
            slot.as_ref()
                .map(|s| is_eligible(s, config, proxy_host.as_deref()))
                .unwrap_or(false)
        })
        .map(|(index, _)| index)
        .collect();

    if eligible.is_empty() {
        return slots.into_iter().flatten().collect();
    }

    let requests: Vec<ProxyRequest> = eligible
        .iter()
        .filter_map(|&index| slots[index].as_ref())
        .map(|stream| ProxyRequest {
            // eligibility guarantees a URL
            url: stream.url.clone().unwrap_or_default(),
            filename: stream.filename.clone(),
            headers: stream.request_headers.clone(),
        })
        .collect();

    match proxy.generate_urls(&requests).await {
        Ok(generated) if generated.len() != requests.len() => {
            // a short or long answer can't be matched back to its streams
            log::error!(
                "proxy returned {} urls for {} requests; dropping {} eligible streams",
                generated.len(),
                requests.len(),
                eligible.len()
            );
            for index in eligible {
                slots[index] = None;
            }
        }
        Ok(generated) => {
            for (&index, proxied_url) in eligible.iter().zip(generated) {
                let Some(stream) = slots[index].as_mut() else { continue };
                match proxied_url {
                    Some(url) => {
                        stream.url = Some(url);
                        stream.proxied = true;
                        stream.request_headers.clear();
                    }
                    None => {
                        log::warn!(
                            "proxied URL generation failed for stream {}; dropping",
                            stream.id
                        );
                        slots[index] = None;
                    }
                }
            }
        }
        Err(e) => {
            log::error!(
                "bulk proxy call failed; dropping {} eligible streams: {}",
                eligible.len(),
                e
            );
            for index in eligible {
                slots[index] = None;
            }
        }
    }

    slots.into_iter().flatten().collect()
}

fn is_eligible(stream: &ParsedStream, config: &ProxyConfig, proxy_host: Option<&str>) -> bool {
    if stream.proxied {
        return false;
    }
    let Some(url) = &stream.url else { return false };

    if !config.allowed_services.is_empty() {
        let allowed = stream
            .service
            .as_deref()
            .map(|s| config.allowed_services.iter().any(|a| a == s))
            .unwrap_or(false);
        if !allowed {
            return false;
        }
    }

    // don't proxy what already points at the proxy
    if let (Some(proxy_host), Ok(parsed)) = (proxy_host, Url::parse(url)) {
        if parsed.host_str() == Some(proxy_host) {
            return false;
        }
    }

    true
}

#[derive(Serialize)]
struct BulkRequestBody<'a> {
    items: &'a [ProxyRequest],
}

#[derive(Deserialize)]
struct BulkResponseBody {
    urls: Vec<Option<String>>,
}

/// HTTP client for a bulk URL-generation endpoint.
pub struct BulkProxyClient {
    http: Client,
    endpoint: Url,
    request_timeout: std::time::Duration,
}

impl BulkProxyClient {
    pub fn new(config: &ProxyConfig) -> Result<Self, PipelineError> {
        let endpoint = Url::parse(&config.url)
            .map_err(|e| PipelineError::ProxyConfig(format!("invalid proxy url: {}", e)))?;
        Ok(Self {
            http: Client::new().with(SurfLogging),
            endpoint,
            request_timeout: std::time::Duration::from_millis(config.request_timeout_ms),
        })
    }
}

#[async_trait]
impl ProxyServer for BulkProxyClient {
    async fn generate_urls(
        &self,
        requests: &[ProxyRequest],
    ) -> Result<Vec<Option<String>>, PipelineError> {
        let body = BulkRequestBody { items: requests };
        let request = self
            .http
            .post(self.endpoint.as_str())
            .body_json(&body)
            .map_err(|e| PipelineError::Proxy(e.to_string()))?;

        let response = tokio::time::timeout(self.request_timeout, async {
            request
                .recv_json::<BulkResponseBody>()
                .await
                .map_err(|e| PipelineError::Proxy(e.to_string()))
        })
        .await
        .map_err(|_| PipelineError::Proxy("proxy request timed out".to_string()))??;

        if response.urls.len() != requests.len() {
            return Err(PipelineError::Proxy(format!(
                "proxy returned {} urls for {} requests",
                response.urls.len(),
                requests.len()
            )));
        }
        Ok(response.urls)
    }
}
