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

#![warn(clippy::pedantic)]

mod analyzer;
mod auth;
mod clair;
mod config;
mod error;
mod image_ref;
mod output;
mod registry;
mod report;
#[cfg(test)]
mod test_server;

use std::process::ExitCode;

use analyzer::{AnalysisResult, Analyzer};
use anyhow::Context;
use clair::{ClairClient, IndexerApi};
use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use config::{AnalyzerArgs, ClairArgs, RegistryArgs};
use image_ref::ImageReference;
use registry::RegistryClient;
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Scans a container image for known vulnerabilities with clair
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Image to scan, e.g. myorga/myimage:v1.0.0, optionally prefixed with the registry url
    #[arg(long, env = "CLAIR_SCAN_IMAGE", value_parser = NonEmptyStringValueParser::new())]
    image: String,

    /// Only print the summary, and only if vulnerabilities were found
    #[arg(long, short)]
    quiet: bool,

    #[command(flatten)]
    registry: RegistryArgs,

    #[command(flatten)]
    clair: ClairArgs,

    #[command(flatten)]
    analyzer: AnalyzerArgs,
}

#[tokio::main]
async fn main() -> Result<ExitCode, anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let analyzer = Analyzer::load(&cli.analyzer).context("while initializing analyzer")?;
    let image = ImageReference::parse(&cli.image, &cli.registry.url).context("while parsing image name")?;

    let registry = RegistryClient::new(&cli.registry);
    let clair = ClairClient::new(&cli.clair);

    progress(cli.quiet, &format!("Logging into registry {} ...", registry.base_url()));
    let token = auth::negotiate(&registry, &cli.registry.username, &cli.registry.password)
        .await
        .context("while getting registry auth token")?;

    progress(cli.quiet, &format!("Loading manifest for image {image} from registry ..."));
    let manifest = registry
        .manifest(&image, &token)
        .await
        .with_context(|| format!("while loading manifest for image {image}"))?;
    let hash = manifest.config.digest.clone();
    info!(%image, %hash, layers = manifest.layers.len(), "loaded manifest");

    progress(cli.quiet, "Indexing manifest in clair ...");
    let started = Instant::now();
    let state = clair::index_manifest(&clair, &manifest, &image, registry.base_url(), &token)
        .await
        .context("while indexing manifest in clair")?;

    progress(cli.quiet, "Waiting for indexing of manifest in clair to finish ...");
    clair::wait_for_index(
        &clair,
        &hash,
        state,
        started,
        cli.clair.index_timeout(),
        cli.clair.poll_interval(),
    )
    .await
    .context("while waiting for clair to index manifest")?;

    progress(cli.quiet, "Generating vulnerability report ...");
    let report = clair
        .vulnerability_report(&hash)
        .await
        .context("while loading vulnerability report from clair")?;
    info!(manifest_hash = %report.manifest_hash, vulnerabilities = report.vulnerabilities.len(), "loaded vulnerability report");

    progress(cli.quiet, "Processing vulnerability report ...");
    let result = analyzer.analyze(&report);
    info!(
        total = result.count_total,
        not_ok = result.count_not_ok_not_whitelisted,
        whitelisted = result.count_not_ok_whitelisted,
        "analyzed vulnerability report"
    );
    output::print_result(&result, analyzer.max_severity(), cli.quiet);

    Ok(exit_code(&result))
}

fn exit_code(result: &AnalysisResult) -> ExitCode {
    if result.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn progress(quiet: bool, line: &str) {
    if !quiet {
        println!("{line}");
    }
}
