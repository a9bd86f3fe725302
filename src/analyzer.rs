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

use std::collections::HashSet;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::config::AnalyzerArgs;
use crate::error::ConfigError;
use crate::report::{Vulnerability, VulnerabilityReport};

/// Severity labels as normalized by clair, ordered by rank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    #[default]
    Unknown,
    Negligible,
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for Severity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unknown" => Ok(Self::Unknown),
            "Negligible" => Ok(Self::Negligible),
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            "Critical" => Ok(Self::Critical),
            _ => Err(ConfigError::InvalidSeverity(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisRow {
    pub vulnerability_name: String,
    pub severity: String,
    pub component_namespace: String,
    pub component_name: String,
    pub version: String,
    pub fixed_in: String,
    pub whitelisted: bool,
}

impl AnalysisRow {
    /// `namespace > name`, or whichever of the two is set.
    pub fn component(&self) -> String {
        match (self.component_namespace.is_empty(), self.component_name.is_empty()) {
            (false, false) => format!("{} > {}", self.component_namespace, self.component_name),
            (false, true) => self.component_namespace.clone(),
            (true, false) => self.component_name.clone(),
            (true, true) => String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub ok: bool,
    pub rows: Vec<AnalysisRow>,
    pub count_total: usize,
    pub count_not_ok_whitelisted: usize,
    pub count_not_ok_not_whitelisted: usize,
}

impl AnalysisResult {
    pub fn count_not_ok(&self) -> usize {
        self.count_not_ok_whitelisted + self.count_not_ok_not_whitelisted
    }
}

#[derive(Debug)]
pub struct Analyzer {
    whitelist: HashSet<String>,
    max_severity: Severity,
}

impl Analyzer {
    pub fn load(args: &AnalyzerArgs) -> Result<Self, ConfigError> {
        let max_severity = args.max_severity.parse()?;
        let whitelist = match &args.whitelist {
            Some(path) => load_whitelist(path)?,
            None => HashSet::new(),
        };
        debug!(%max_severity, whitelisted = whitelist.len(), "analyzer loaded");

        Ok(Self {
            whitelist,
            max_severity,
        })
    }

    pub fn max_severity(&self) -> Severity {
        self.max_severity
    }

    pub fn analyze(&self, report: &VulnerabilityReport) -> AnalysisResult {
        let mut result = AnalysisResult::default();

        for vulnerability in &report.vulnerabilities {
            let row = self.row(vulnerability);
            let rank: Severity = row.severity.parse().unwrap_or_default();

            result.count_total += 1;
            if rank > self.max_severity {
                if row.whitelisted {
                    result.count_not_ok_whitelisted += 1;
                } else {
                    result.count_not_ok_not_whitelisted += 1;
                }
            }

            result.rows.push(row);
        }

        result.ok = result.count_not_ok_not_whitelisted == 0;
        result
    }

    fn row(&self, vulnerability: &Vulnerability) -> AnalysisRow {
        // later sources win: distribution, then range, then package
        let mut version = String::new();
        let mut component_namespace = String::new();
        let mut component_name = String::new();

        if let Some(distribution) = &vulnerability.distribution {
            component_namespace.clone_from(&distribution.pretty_name);
            if !distribution.version.is_empty() {
                version.clone_from(&distribution.version);
            }
        }
        if let Some(range) = vulnerability.range.as_ref().filter(|r| !r.is_empty()) {
            version.clone_from(range);
        }
        if let Some(package) = &vulnerability.package {
            component_name.clone_from(&package.name);
            if !package.version.is_empty() {
                version.clone_from(&package.version);
            }
        }

        AnalysisRow {
            vulnerability_name: vulnerability.name.clone(),
            severity: vulnerability.normalized_severity.clone(),
            component_namespace,
            component_name,
            version,
            fixed_in: vulnerability.fixed_in_version.clone(),
            whitelisted: self.whitelist.contains(&vulnerability.name.to_uppercase()),
        }
    }
}

/// A missing whitelist file is an empty whitelist.
fn load_whitelist(path: &Path) -> Result<HashSet<String>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "whitelist file does not exist");
            return Ok(HashSet::new());
        },
        Err(source) => {
            return Err(ConfigError::Whitelist {
                path: path.display().to_string(),
                source,
            })
        },
    };

    Ok(content
        .split('\n')
        .map(|line| line.trim_matches([' ', '\t', '\r']))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_uppercase)
        .collect())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;
    use crate::report::{Distribution, Package};

    fn analyzer(whitelist: &[&str], max_severity: Severity) -> Analyzer {
        Analyzer {
            whitelist: whitelist.iter().map(ToString::to_string).collect(),
            max_severity,
        }
    }

    fn vulnerability(name: &str, severity: &str) -> Vulnerability {
        Vulnerability {
            name: name.to_string(),
            normalized_severity: severity.to_string(),
            ..Vulnerability::default()
        }
    }

    fn report(vulnerabilities: Vec<Vulnerability>) -> VulnerabilityReport {
        VulnerabilityReport {
            manifest_hash: "sha256:cfg".to_string(),
            vulnerabilities,
        }
    }

    #[test]
    fn severity_order() {
        assert!(Severity::Unknown < Severity::Negligible);
        assert!(Severity::Negligible < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!("High".parse::<Severity>().unwrap(), Severity::High);
        assert!("high".parse::<Severity>().is_err());
        assert_eq!(Severity::Critical.to_string(), "Critical");
    }

    #[test]
    fn load_rejects_unknown_severity() {
        let args = AnalyzerArgs {
            whitelist: None,
            max_severity: "Severe".to_string(),
        };
        assert!(matches!(Analyzer::load(&args), Err(ConfigError::InvalidSeverity(_))));
    }

    #[test]
    fn load_whitelist_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "# accepted risks\ncve-2021-1234\r\n\n  CVE-2020-0001\t\n#CVE-1999-0001\n").unwrap();

        let args = AnalyzerArgs {
            whitelist: Some(file.path().to_path_buf()),
            max_severity: "Medium".to_string(),
        };
        let analyzer = Analyzer::load(&args).unwrap();
        assert_eq!(analyzer.max_severity(), Severity::Medium);
        assert_eq!(
            analyzer.whitelist,
            HashSet::from(["CVE-2021-1234".to_string(), "CVE-2020-0001".to_string()])
        );
    }

    #[test]
    fn load_missing_whitelist_is_empty() {
        let dir = TempDir::new().unwrap();
        let args = AnalyzerArgs {
            whitelist: Some(dir.path().join("does-not-exist")),
            max_severity: "Medium".to_string(),
        };
        assert!(Analyzer::load(&args).unwrap().whitelist.is_empty());
    }

    #[test]
    fn load_unreadable_whitelist_fails() {
        let dir = TempDir::new().unwrap();
        let args = AnalyzerArgs {
            whitelist: Some(dir.path().to_path_buf()),
            max_severity: "Medium".to_string(),
        };
        assert!(matches!(Analyzer::load(&args), Err(ConfigError::Whitelist { .. })));
    }

    #[test]
    fn empty_report_is_ok() {
        let result = analyzer(&[], Severity::Medium).analyze(&report(Vec::new()));
        assert!(result.ok);
        assert_eq!(result.count_total, 0);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn severity_above_threshold_is_not_ok() {
        let result = analyzer(&[], Severity::Medium).analyze(&report(vec![
            vulnerability("CVE-2021-0001", "High"),
            vulnerability("CVE-2021-0002", "Medium"),
            vulnerability("CVE-2021-0003", "Low"),
        ]));
        assert!(!result.ok);
        assert_eq!(result.count_total, 3);
        assert_eq!(result.count_not_ok_not_whitelisted, 1);
        assert_eq!(result.count_not_ok_whitelisted, 0);
        assert_eq!(result.count_not_ok(), 1);
    }

    #[test]
    fn whitelisted_finding_keeps_result_ok() {
        let result = analyzer(&["CVE-2021-1234"], Severity::Medium).analyze(&report(vec![
            vulnerability("cve-2021-1234", "High"),
            vulnerability("CVE-2021-0002", "Medium"),
        ]));
        assert!(result.ok);
        assert!(result.rows[0].whitelisted);
        assert!(!result.rows[1].whitelisted);
        assert_eq!(result.count_not_ok_whitelisted, 1);
        assert_eq!(result.count_not_ok_not_whitelisted, 0);
    }

    #[test]
    fn unrecognized_severity_ranks_as_unknown() {
        let result = analyzer(&[], Severity::Unknown).analyze(&report(vec![
            vulnerability("CVE-2021-0001", "Important"),
            vulnerability("CVE-2021-0002", ""),
            vulnerability("CVE-2021-0003", "Negligible"),
        ]));
        assert_eq!(result.count_not_ok_not_whitelisted, 1);
        assert_eq!(result.rows[0].severity, "Important");
    }

    #[test]
    fn rows_keep_report_order_and_counts_hold() {
        let names = ["CVE-3", "CVE-1", "CVE-2", "CVE-5", "CVE-4"];
        let severities = ["Critical", "Low", "High", "Unknown", "Medium"];
        let result = analyzer(&["CVE-2"], Severity::Low).analyze(&report(
            names
                .iter()
                .zip(severities)
                .map(|(name, severity)| vulnerability(name, severity))
                .collect(),
        ));

        let row_names: Vec<&str> = result.rows.iter().map(|r| r.vulnerability_name.as_str()).collect();
        assert_eq!(row_names, names);
        assert_eq!(result.count_total, result.rows.len());
        assert!(result.count_not_ok() <= result.count_total);
        assert_eq!(result.count_not_ok_whitelisted, 1);
        assert_eq!(result.count_not_ok_not_whitelisted, 2);
        assert_eq!(result.ok, result.count_not_ok_not_whitelisted == 0);
    }

    #[test]
    fn version_precedence_last_writer_wins() {
        let analyzer = analyzer(&[], Severity::Medium);
        let mut vulnerability = vulnerability("CVE-2021-0001", "Low");
        vulnerability.fixed_in_version = "1.2.4".to_string();
        vulnerability.distribution = Some(Distribution {
            pretty_name: "Debian GNU/Linux 11 (bullseye)".to_string(),
            version: "11".to_string(),
        });

        let row = analyzer.row(&vulnerability);
        assert_eq!(row.version, "11");
        assert_eq!(row.component(), "Debian GNU/Linux 11 (bullseye)");
        assert_eq!(row.fixed_in, "1.2.4");

        vulnerability.range = Some(String::new());
        assert_eq!(analyzer.row(&vulnerability).version, "11");
        vulnerability.range = Some("<1.2.4".to_string());
        assert_eq!(analyzer.row(&vulnerability).version, "<1.2.4");

        vulnerability.package = Some(Package {
            name: "libssl".to_string(),
            version: String::new(),
        });
        let row = analyzer.row(&vulnerability);
        assert_eq!(row.version, "<1.2.4");
        assert_eq!(row.component(), "Debian GNU/Linux 11 (bullseye) > libssl");

        vulnerability.package = Some(Package {
            name: "libssl".to_string(),
            version: "1.2.3".to_string(),
        });
        assert_eq!(analyzer.row(&vulnerability).version, "1.2.3");

        vulnerability.distribution = None;
        let row = analyzer.row(&vulnerability);
        assert_eq!(row.component_namespace, "");
        assert_eq!(row.component(), "libssl");
    }

    #[test]
    fn row_without_components() {
        let row = analyzer(&[], Severity::Medium).row(&vulnerability("CVE-2021-0001", "Low"));
        assert_eq!(row.component(), "");
        assert_eq!(row.version, "");
        assert_eq!(row.fixed_in, "");
    }
}
