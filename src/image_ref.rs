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

use std::fmt;

use crate::error::ConfigError;

const DEFAULT_TAG: &str = "latest";

/// Repository and tag of the image to scan, relative to the configured registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    /// Normalizes `image_path` against `registry_domain`.
    ///
    /// Both inputs are lowercased and stripped of their `http(s)://` scheme, the image path
    /// has repeated slashes collapsed and a leading registry domain is removed. The tag is
    /// everything after the first `:`, so `repo:sha256:abc` keeps `sha256:abc` as its tag.
    pub fn parse(image_path: &str, registry_domain: &str) -> Result<Self, ConfigError> {
        let registry_domain = registry_domain.to_lowercase();
        let registry_domain = strip_scheme(&registry_domain).trim_end_matches('/');

        let image_path = image_path.to_lowercase();
        let image_path = collapse_slashes(strip_scheme(&image_path));

        let remainder = image_path.strip_prefix(registry_domain).unwrap_or(&image_path);

        let mut parts = remainder.splitn(2, ':');
        let repository = parts.next().unwrap_or_default().trim_matches('/');
        let tag = parts.next().unwrap_or(DEFAULT_TAG);

        if repository.is_empty() || tag.is_empty() {
            return Err(ConfigError::InvalidImagePath(image_path.clone()));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

fn strip_scheme(s: &str) -> &str {
    s.strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(s)
}

fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}
