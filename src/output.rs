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

use comfy_table::Table;

use crate::analyzer::{AnalysisResult, Severity};

const HEADERS: [&str; 6] = ["Vulnerability", "Severity", "Component", "Version", "FixedIn", "Whitelisted"];

pub fn result_table(result: &AnalysisResult) -> Table {
    let mut table = Table::new();
    table.set_header(HEADERS);
    for row in &result.rows {
        table.add_row(vec![
            row.vulnerability_name.clone(),
            row.severity.clone(),
            row.component(),
            row.version.clone(),
            row.fixed_in.clone(),
            row.whitelisted.to_string(),
        ]);
    }
    table
}

pub fn summary(result: &AnalysisResult, max_severity: Severity) -> String {
    format!(
        "Found {} vulnerabilities with severity '{max_severity}' or more ({} whitelisted)",
        result.count_not_ok(),
        result.count_not_ok_whitelisted,
    )
}

/// Prints the table unless quiet, and the summary unless quiet and ok.
/// A failing summary goes to stderr.
pub fn print_result(result: &AnalysisResult, max_severity: Severity, quiet: bool) {
    if !quiet {
        println!("\n{}", result_table(result));
    }

    if quiet && result.ok {
        return;
    }

    let summary = summary(result, max_severity);
    if result.ok {
        println!("\n{summary}\n");
    } else {
        eprintln!("\n{summary}\n");
    }
}
