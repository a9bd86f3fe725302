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

use base64::prelude::{Engine, BASE64_STANDARD};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::AuthError;

/// The two registry round-trips needed to obtain an `Authorization` header.
pub trait RegistryApi {
    /// Unauthenticated `GET <registry>/v2/`, returning the `WWW-Authenticate` header if any.
    async fn challenge(&self) -> Result<Option<String>, AuthError>;

    /// `GET` the bearer realm, optionally with a `Basic` authorization header, returning the body.
    async fn fetch_realm(&self, url: Url, authorization: Option<String>) -> Result<String, AuthError>;
}

/// Value for the `Authorization` header of registry requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthToken {
    /// The registry did not ask for credentials.
    #[default]
    None,
    Basic(String),
    Bearer(String),
}

impl AuthToken {
    pub fn header_value(&self) -> Option<String> {
        match self {
            Self::None => None,
            _ => Some(self.to_string()),
        }
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Basic(credentials) => write!(f, "Basic {credentials}"),
            Self::Bearer(token) => write!(f, "Bearer {token}"),
        }
    }
}

pub fn basic_credentials(username: &str, password: &str) -> String {
    BASE64_STANDARD.encode(format!("{username}:{password}"))
}

/// Answers the `WWW-Authenticate` challenge of the registry, if it sends one.
pub async fn negotiate<R: RegistryApi>(api: &R, username: &str, password: &str) -> Result<AuthToken, AuthError> {
    let Some(challenge) = api.challenge().await? else {
        debug!("registry requires no authentication");
        return Ok(AuthToken::None);
    };

    if has_scheme(&challenge, "Basic") {
        debug!("registry requested basic authentication");
        return Ok(AuthToken::Basic(basic_credentials(username, password)));
    }

    if !has_scheme(&challenge, "Bearer") {
        return Err(AuthError::UnsupportedScheme(challenge));
    }

    let params = parse_challenge(&challenge);
    let url = realm_url(&challenge, &params)?;
    debug!(realm = %url, "requesting bearer token");

    let authorization = (!username.is_empty() && !password.is_empty())
        .then(|| AuthToken::Basic(basic_credentials(username, password)).to_string());
    let body = api.fetch_realm(url, authorization).await?;

    let body: Value = serde_json::from_str(&body)?;
    match body.get("token") {
        None => Err(AuthError::MissingToken),
        Some(Value::String(token)) => Ok(AuthToken::Bearer(token.clone())),
        Some(_) => Err(AuthError::InvalidToken),
    }
}

fn has_scheme(challenge: &str, scheme: &str) -> bool {
    challenge
        .get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

/// Extracts the `key="value"` parameters of a bearer challenge in the order they appear.
/// A repeated key keeps its first position and its last value.
pub fn parse_challenge(challenge: &str) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = Vec::new();

    for segment in challenge.split(' ') {
        if segment == "Bearer" {
            continue;
        }
        for param in segment.split(',') {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            let value = value.replace('"', "");
            match params.iter_mut().find(|(k, _)| k == key) {
                Some(existing) => existing.1 = value,
                None => params.push((key.to_string(), value)),
            }
        }
    }

    params
}

/// Builds `<realm>?<key>=<value>&...` from every challenge parameter, `realm` included.
fn realm_url(challenge: &str, params: &[(String, String)]) -> Result<Url, AuthError> {
    let (_, realm) = params
        .iter()
        .find(|(k, _)| k == "realm")
        .ok_or_else(|| AuthError::MissingRealm(challenge.to_string()))?;
    let mut url = Url::parse(realm)?;
    url.query_pairs_mut().extend_pairs(params);
    Ok(url)
}
