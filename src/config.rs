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

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::NonEmptyStringValueParser;
use clap::Args;

#[derive(Args, Clone, Debug)]
pub struct RegistryArgs {
    /// URL of the docker registry hosting the image
    #[arg(
        id = "registry_url",
        long = "registry-url",
        env = "REGISTRY_URL",
        value_parser = NonEmptyStringValueParser::new()
    )]
    pub url: String,

    /// Docker registry username
    #[arg(id = "registry_username", long = "registry-username", env = "REGISTRY_USERNAME", default_value = "")]
    pub username: String,

    /// Docker registry password
    #[arg(
        id = "registry_password",
        long = "registry-password",
        env = "REGISTRY_PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub password: String,
}

impl RegistryArgs {
    pub fn base_url(&self) -> String {
        self.url.trim_end_matches('/').to_string()
    }
}

#[derive(Args, Clone, Debug)]
pub struct ClairArgs {
    /// URL of the clair instance
    #[arg(
        id = "clair_url",
        long = "clair-url",
        env = "CLAIR_URL",
        value_parser = NonEmptyStringValueParser::new()
    )]
    pub url: String,

    /// Clair username
    #[arg(id = "clair_username", long = "clair-username", env = "CLAIR_USERNAME", default_value = "")]
    pub username: String,

    /// Clair password
    #[arg(
        id = "clair_password",
        long = "clair-password",
        env = "CLAIR_PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub password: String,

    /// Seconds to wait for clair to finish indexing the image
    #[arg(long = "clair-index-timeout", env = "CLAIR_INDEX_TIMEOUT", default_value_t = 120)]
    pub index_timeout: u64,

    /// Seconds between two index status requests
    #[arg(long = "clair-poll-interval", default_value_t = 5, hide = true)]
    pub poll_interval: u64,
}

impl ClairArgs {
    pub fn base_url(&self) -> String {
        self.url.trim_end_matches('/').to_string()
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Basic auth credentials, only if both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        (!self.username.is_empty() && !self.password.is_empty()).then_some((self.username.as_str(), self.password.as_str()))
    }
}

#[derive(Args, Clone, Debug)]
pub struct AnalyzerArgs {
    /// File with one whitelisted vulnerability name per line
    #[arg(long, env = "CLAIR_SCAN_WHITELIST")]
    pub whitelist: Option<PathBuf>,

    /// Maximum severity regarded as ok
    #[arg(long = "max-severity", env = "CLAIR_SCAN_MAX_SEVERITY", default_value = "Medium")]
    pub max_severity: String,
}
