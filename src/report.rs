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
use std::marker::PhantomData;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// Matcher output for one manifest. Only the fields needed for the analysis are decoded.
#[derive(Debug, Default, Deserialize)]
pub struct VulnerabilityReport {
    #[serde(default, deserialize_with = "nullable_string")]
    pub manifest_hash: String,
    /// Keyed by vulnerability id on the wire, kept here in document order.
    #[serde(default, deserialize_with = "ordered_values")]
    pub vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Vulnerability {
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub normalized_severity: String,
    #[serde(default)]
    pub distribution: Option<Distribution>,
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub package: Option<Package>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub fixed_in_version: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Distribution {
    #[serde(default, deserialize_with = "nullable_string")]
    pub pretty_name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub version: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Package {
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub version: String,
}

fn nullable_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn ordered_values<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct ValuesVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for ValuesVisitor<T> {
        type Value = Vec<T>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of vulnerabilities")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut values = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((IgnoredAny, value)) = map.next_entry::<IgnoredAny, T>()? {
                values.push(value);
            }
            Ok(values)
        }
    }

    deserializer.deserialize_any(ValuesVisitor(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_keeps_document_order() {
        let report: VulnerabilityReport = serde_json::from_str(
            r#"{
                "manifest_hash": "sha256:cfg",
                "packages": {"10": {"id": "10", "name": "openssl", "version": "1.1.1k"}},
                "vulnerabilities": {
                    "9": {
                        "id": "9",
                        "name": "CVE-2021-3711",
                        "normalized_severity": "Critical",
                        "fixed_in_version": "1.1.1l-r0",
                        "package": {"id": "10", "name": "openssl", "version": "1.1.1k"},
                        "distribution": {"id": "1", "pretty_name": "Alpine Linux v3.14", "version": "3.14"}
                    },
                    "1": {
                        "id": "1",
                        "name": "CVE-2021-3712",
                        "normalized_severity": "High",
                        "fixed_in_version": null,
                        "range": null,
                        "package": null,
                        "distribution": null
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(report.manifest_hash, "sha256:cfg");
        let names: Vec<&str> = report.vulnerabilities.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["CVE-2021-3711", "CVE-2021-3712"]);

        let first = &report.vulnerabilities[0];
        assert_eq!(first.package.as_ref().unwrap().name, "openssl");
        assert_eq!(first.distribution.as_ref().unwrap().pretty_name, "Alpine Linux v3.14");

        let second = &report.vulnerabilities[1];
        assert_eq!(second.fixed_in_version, "");
        assert!(second.package.is_none());
        assert!(second.distribution.is_none());
        assert!(second.range.is_none());
    }

    #[test]
    fn decode_without_vulnerabilities() {
        let report: VulnerabilityReport = serde_json::from_str(r#"{"manifest_hash": "sha256:cfg"}"#).unwrap();
        assert!(report.vulnerabilities.is_empty());

        let report: VulnerabilityReport = serde_json::from_str(r#"{"vulnerabilities": null}"#).unwrap();
        assert!(report.vulnerabilities.is_empty());
    }
}
