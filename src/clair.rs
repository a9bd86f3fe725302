// Copyright 2024 SAP SE
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::auth::AuthToken;
use crate::config::ClairArgs;
use crate::error::ClairError;
use crate::image_ref::ImageReference;
use crate::registry::Manifest;
use crate::report::VulnerabilityReport;

/// The only index state that lets the scan continue.
pub const INDEX_FINISHED: &str = "IndexFinished";

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct IndexRequest {
    pub hash: String,
    pub layers: Vec<LayerDescriptor>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct LayerDescriptor {
    pub hash: String,
    pub uri: String,
    pub headers: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct IndexReport {
    #[serde(default)]
    state: String,
    #[serde(default)]
    err: String,
}

/// The indexer and matcher endpoints the scan talks to.
pub trait IndexerApi {
    /// Submits the layers for indexing and returns the reported state.
    async fn submit_index(&self, request: &IndexRequest) -> Result<String, ClairError>;

    async fn index_status(&self, hash: &str) -> Result<String, ClairError>;

    async fn vulnerability_report(&self, hash: &str) -> Result<VulnerabilityReport, ClairError>;
}

/// Describes every manifest layer so clair can fetch it from the registry itself.
///
/// Layers without their own URL are fetched from `<registry>/v2/<repository>/blobs/<digest>`,
/// carrying the registry auth token if there is one. The request is keyed by the config digest.
pub fn build_index_request(
    manifest: &Manifest,
    image: &ImageReference,
    registry_url: &str,
    token: &AuthToken,
) -> IndexRequest {
    let layers = manifest
        .layers
        .iter()
        .map(|layer| {
            let uri = match layer.urls.first() {
                Some(url) => url.clone(),
                None => format!("{registry_url}/v2/{}/blobs/{}", image.repository, layer.digest),
            };
            let mut headers = BTreeMap::new();
            if let Some(authorization) = token.header_value() {
                headers.insert("Authorization".to_string(), vec![authorization]);
            }
            LayerDescriptor {
                hash: layer.digest.clone(),
                uri,
                headers,
            }
        })
        .collect();

    IndexRequest {
        hash: manifest.config.digest.clone(),
        layers,
    }
}

pub async fn index_manifest<I: IndexerApi>(
    api: &I,
    manifest: &Manifest,
    image: &ImageReference,
    registry_url: &str,
    token: &AuthToken,
) -> Result<String, ClairError> {
    let request = build_index_request(manifest, image, registry_url, token);
    debug!(hash = %request.hash, layers = request.layers.len(), "submitting index request");
    api.submit_index(&request).await
}

/// Polls the index status every `interval` until it is finished or `timeout` has passed since
/// `started`. Errors while polling abort immediately.
pub async fn wait_for_index<I: IndexerApi>(
    api: &I,
    hash: &str,
    mut state: String,
    started: Instant,
    timeout: Duration,
    interval: Duration,
) -> Result<(), ClairError> {
    while state != INDEX_FINISHED && started.elapsed() < timeout {
        sleep(interval).await;
        state = api.index_status(hash).await?;
        debug!(%hash, %state, elapsed = ?started.elapsed(), "polled index status");
    }

    if state == INDEX_FINISHED {
        info!(%hash, elapsed = ?started.elapsed(), "indexing finished");
        Ok(())
    } else {
        Err(ClairError::Timeout {
            state,
            elapsed: started.elapsed(),
        })
    }
}

#[derive(Debug)]
pub struct ClairClient {
    http: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl ClairClient {
    pub fn new(args: &ClairArgs) -> Self {
        Self {
            http: Client::new(),
            base_url: args.base_url(),
            credentials: args
                .credentials()
                .map(|(username, password)| (username.to_string(), password.to_string())),
        }
    }

    fn with_credentials(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((username, password)) => req.basic_auth(username, Some(password)),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClairError> {
        let resp = self.with_credentials(req).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        decode(status, &body)
    }
}

impl IndexerApi for ClairClient {
    async fn submit_index(&self, request: &IndexRequest) -> Result<String, ClairError> {
        let url = format!("{}/indexer/api/v1/index_report", self.base_url);
        let report: IndexReport = self.send(self.http.post(url).json(request)).await?;
        index_state(report)
    }

    async fn index_status(&self, hash: &str) -> Result<String, ClairError> {
        let url = format!("{}/indexer/api/v1/index_report/{hash}", self.base_url);
        let report: IndexReport = self.send(self.http.get(url)).await?;
        index_state(report)
    }

    async fn vulnerability_report(&self, hash: &str) -> Result<VulnerabilityReport, ClairError> {
        let url = format!("{}/matcher/api/v1/vulnerability_report/{hash}", self.base_url);
        self.send(self.http.get(url)).await
    }
}

fn decode<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ClairError> {
    if !status.is_success() {
        return Err(ClairError::Status {
            status,
            body: body.to_string(),
        });
    }
    Ok(serde_json::from_str(body)?)
}

/// The indexer can accept a request and still report an internal failure in `err`.
fn index_state(report: IndexReport) -> Result<String, ClairError> {
    if report.err.is_empty() {
        Ok(report.state)
    } else {
        Err(ClairError::Indexing(report.err))
    }
}
