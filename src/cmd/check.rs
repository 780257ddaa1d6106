use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use crossterm::style::{self, Stylize};
use serde::Serialize;

use crate::config::AuditConfig;
use crate::names::ImageNames;
use crate::progress::Spinner;
use crate::remove::Remover;
use crate::store::imagedb::list_images;
use crate::store::{LayerIndex, RawLayerIndex};
use crate::verify::{Audit, Unreferenced, WalkStats};

/// A removal that failed; the rest of the batch still ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRemoval {
    pub path: PathBuf,
    pub error: String,
}

/// Everything one run found, and what it did about it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub root: PathBuf,
    pub driver: String,
    pub layers_indexed: usize,
    pub raw_layers_indexed: usize,
    pub stats: WalkStats,
    pub unreferenced: Unreferenced,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub layer_images: BTreeMap<String, BTreeSet<String>>,
    pub dangling_images: Vec<String>,
    pub removed: Vec<PathBuf>,
    pub failed_removals: Vec<FailedRemoval>,
}

impl AuditReport {
    /// Whether the store had nothing unreferenced. Removing the leaks does
    /// not make a run clean.
    pub fn is_clean(&self) -> bool {
        self.unreferenced.is_empty()
    }
}

pub fn run(cfg: &AuditConfig, remover: &dyn Remover) -> Result<ExitCode> {
    let spinner = Spinner::new("Checking folder structure...");
    let report = match execute(cfg, remover, Some(&spinner)) {
        Ok(report) => report,
        Err(e) => {
            spinner.abandon();
            return Err(e);
        }
    };
    spinner.finish(summary_line(&report));

    if cfg.verbose {
        print_layer_images(&report.layer_images);
    }
    print_findings(cfg, &report);

    if let Some(dest) = cfg.json.as_deref() {
        let output = serde_json::to_string_pretty(&report)?;
        if dest == "-" {
            println!("{output}");
        } else {
            fs::write(dest, &output)
                .with_context(|| format!("Failed to write JSON to {dest}"))?;
            eprintln!("{} Wrote {dest}", "✔".green());
        }
    }

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Index, resolve, walk and report; then remove leaks if asked to.
pub fn execute(
    cfg: &AuditConfig,
    remover: &dyn Remover,
    spinner: Option<&Spinner>,
) -> Result<AuditReport> {
    let layout = &cfg.layout;
    layout.validate()?;

    let stage = |msg: &str| {
        if let Some(s) = spinner {
            s.set_message(msg.to_string());
        }
    };

    stage("Indexing raw layers...");
    let raw = RawLayerIndex::scan(&layout.raw_layer_dir())?;
    stage("Indexing layer metadata...");
    let layers = LayerIndex::scan(&layout.layer_metadata_dir())?;
    let layers_indexed = layers.len();
    let raw_layers_indexed = raw.len();
    if let Some(s) = spinner {
        s.step(format!(
            "Indexed {layers_indexed} layers and {raw_layers_indexed} raw layers"
        ));
    }

    stage("Resolving image names...");
    let names = ImageNames::resolve(&layout.repositories_file(), &layout.image_metadata_dir())
        .context("Failed to resolve image names")?;
    log::debug!("Resolved {} image names", names.len());

    stage("Walking images...");
    let images = list_images(&layout.image_content_dir())?;
    let mut audit = Audit::new(layers, raw);
    audit.walk_images(&images, &cfg.platform, cfg.verbose.then_some(&names))?;
    audit.visit_containers(&layout.container_dir())?;

    let unreferenced = audit.unreferenced();
    let mut report = AuditReport {
        root: layout.root().to_path_buf(),
        driver: layout.driver().to_string(),
        layers_indexed,
        raw_layers_indexed,
        stats: audit.stats,
        unreferenced,
        layer_images: audit.layer_images,
        dangling_images: names.dangling.into_iter().collect(),
        ..Default::default()
    };

    if cfg.remove {
        stage("Removing unreferenced layers...");
        let targets: Vec<PathBuf> = report
            .unreferenced
            .layers
            .iter()
            .map(|id| audit.layers.dir().join(id))
            .chain(
                report
                    .unreferenced
                    .raw_layers
                    .iter()
                    .map(|id| audit.raw.dir().join(id)),
            )
            .collect();
        for path in targets {
            remove_one(remover, path, &mut report);
        }
    }

    Ok(report)
}

fn summary_line(report: &AuditReport) -> String {
    format!(
        "Walked {} images ({} skipped) over {} layers and {} raw layers",
        report.stats.images_traversed,
        report.stats.images_skipped,
        report.layers_indexed,
        report.raw_layers_indexed
    )
}

fn remove_one(remover: &dyn Remover, path: PathBuf, report: &mut AuditReport) {
    log::info!("Removing {}", path.display());
    match remover.remove_tree(&path) {
        Ok(()) => report.removed.push(path),
        Err(e) => {
            log::error!("Failed to remove {}: {e}", path.display());
            report.failed_removals.push(FailedRemoval {
                path,
                error: e.to_string(),
            });
        }
    }
}

fn print_layer_images(layer_images: &BTreeMap<String, BTreeSet<String>>) {
    let mut stderr = io::stderr();
    for (diff_id, images) in layer_images {
        let _ = writeln!(
            stderr,
            "Found layer {} belonging to the following images:",
            style::style(diff_id).cyan()
        );
        for name in images {
            let _ = writeln!(stderr, "\t{name}");
        }
        let _ = writeln!(stderr);
    }
}

fn print_findings(cfg: &AuditConfig, report: &AuditReport) {
    let mut stderr = io::stderr();

    if report.is_clean() {
        let _ = writeln!(stderr, "{} No errors found", "✔".green());
        return;
    }

    let layout = &cfg.layout;
    let groups = [
        ("layerdb", layout.layer_metadata_dir(), &report.unreferenced.layers),
        (
            layout.driver(),
            layout.raw_layer_dir(),
            &report.unreferenced.raw_layers,
        ),
    ];
    for (store, dir, ids) in groups {
        for id in ids {
            let path = dir.join(id);
            if report.removed.contains(&path) {
                let _ = writeln!(
                    stderr,
                    "{} Unreferenced layer in {store}: {id} (removed)",
                    "✔".yellow()
                );
            } else if let Some(failed) = failed_removal(report, &path) {
                let _ = writeln!(
                    stderr,
                    "{} Unreferenced layer in {store}: {id} (remove failed: {})",
                    "✘".red(),
                    failed.error
                );
            } else {
                let _ = writeln!(
                    stderr,
                    "{} Unreferenced layer in {store}: {id}",
                    "✘".red().bold()
                );
            }
        }
    }

    if !cfg.remove {
        let _ = writeln!(
            stderr,
            "{}",
            "Re-run with --remove to delete unreferenced layers.".dim()
        );
    }
}

fn failed_removal<'a>(report: &'a AuditReport, path: &Path) -> Option<&'a FailedRemoval> {
    report.failed_removals.iter().find(|f| f.path == path)
}
