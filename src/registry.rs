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

use reqwest::{header, Client};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::auth::{AuthToken, RegistryApi};
use crate::config::RegistryArgs;
use crate::error::{AuthError, RegistryError};
use crate::image_ref::ImageReference;

const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
pub struct Descriptor {
    pub digest: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Handle for one registry. Holds only connection configuration, so every call borrows it.
#[derive(Debug)]
pub struct RegistryClient {
    http: Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(args: &RegistryArgs) -> Self {
        Self {
            http: Client::new(),
            base_url: args.base_url(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn manifest(&self, image: &ImageReference, token: &AuthToken) -> Result<Manifest, RegistryError> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, image.repository, image.tag);
        debug!(%url, "fetching manifest");

        let mut req = self
            .http
            .get(&url)
            .header(header::ACCEPT, format!("{MEDIA_TYPE_DOCKER_MANIFEST}, {MEDIA_TYPE_OCI_MANIFEST}"));
        if let Some(authorization) = token.header_value() {
            req = req.header(header::AUTHORIZATION, authorization);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(RegistryError::Status { status, body });
        }

        parse_manifest(&body)
    }
}

impl RegistryApi for RegistryClient {
    async fn challenge(&self) -> Result<Option<String>, AuthError> {
        let resp = self
            .http
            .get(format!("{}/v2/", self.base_url))
            .send()
            .await
            .map_err(AuthError::Request)?;

        Ok(resp
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(ToString::to_string))
    }

    async fn fetch_realm(&self, url: Url, authorization: Option<String>) -> Result<String, AuthError> {
        let mut req = self.http.get(url);
        if let Some(authorization) = authorization {
            req = req.header(header::AUTHORIZATION, authorization);
        }
        let resp = req.send().await.map_err(AuthError::Realm)?;
        let status = resp.status();
        let body = resp.text().await.map_err(AuthError::Realm)?;
        if !status.is_success() {
            return Err(AuthError::RealmStatus { status, body });
        }
        Ok(body)
    }
}

fn parse_manifest(body: &str) -> Result<Manifest, RegistryError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    if let Some(media_type) = value.get("mediaType").and_then(serde_json::Value::as_str) {
        if media_type != MEDIA_TYPE_DOCKER_MANIFEST && media_type != MEDIA_TYPE_OCI_MANIFEST {
            return Err(RegistryError::UnsupportedManifest(media_type.to_string()));
        }
    }

    let manifest: Manifest = serde_json::from_value(value)?;
    if manifest.schema_version != 2 {
        return Err(RegistryError::UnsupportedManifest(format!(
            "schema version {}",
            manifest.schema_version
        )));
    }
    Ok(manifest)
}
