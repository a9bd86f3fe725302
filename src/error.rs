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

use std::time::Duration;

use thiserror::Error;

/// Problems with the operator supplied configuration, raised before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid image path {0:?}")]
    InvalidImagePath(String),
    #[error("invalid maximum severity {0:?}, expected one of Unknown, Negligible, Low, Medium, High, Critical")]
    InvalidSeverity(String),
    #[error("error loading whitelist {path}: {source}")]
    Whitelist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("registry auth request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("registry auth realm request failed: {0}")]
    Realm(#[source] reqwest::Error),
    #[error("registry auth realm responded with {status} - {body}")]
    RealmStatus { status: reqwest::StatusCode, body: String },
    #[error("can't prepare url for registry auth realm request: {0}")]
    RealmUrl(#[from] url::ParseError),
    #[error("bearer challenge {0:?} carries no realm")]
    MissingRealm(String),
    #[error("can't decode auth realm response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("missing token in auth realm response")]
    MissingToken,
    #[error("invalid token in auth realm response")]
    InvalidToken,
    #[error("unsupported auth method {0}")]
    UnsupportedScheme(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("registry responded with {status} - {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("can't decode manifest: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unsupported manifest media type {0}")]
    UnsupportedManifest(String),
}

#[derive(Debug, Error)]
pub enum ClairError {
    #[error("clair request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("clair responded with {status} - {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("can't decode clair response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("indexing manifest in clair failed: {0}")]
    Indexing(String),
    #[error("index status is still {state:?} after {elapsed:?}")]
    Timeout { state: String, elapsed: Duration },
}
