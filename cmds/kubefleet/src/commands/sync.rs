//! `sync`, `reconcile` and `preview`.
//!
//! All three push a manifest set into the target clusters. `reconcile` always
//! writes and `preview` never does; `sync` writes unless `--dry-run` is set.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use tracing::instrument;

use super::{
	output::{paint_action, write_structured, Table},
	util::{runtime, CommonArgs, Fleet, SourceArgs},
};
use crate::gitops::{Reconciler, SyncReport, SyncRequest};

/// How a sync run treats writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
	/// Honor `--dry-run`.
	Sync,
	Reconcile,
	Preview,
}

#[derive(Args)]
pub struct SyncTargetArgs {
	#[command(flatten)]
	pub source: SourceArgs,

	/// Cluster to sync, may be repeated. All clusters when omitted.
	#[arg(short, long = "cluster")]
	pub clusters: Vec<String>,

	/// Put every namespaced object into this namespace
	#[arg(short, long)]
	pub namespace: Option<String>,

	/// Only sync these kinds, may be repeated
	#[arg(long = "include-kind")]
	pub include: Vec<String>,

	/// Never sync these kinds, may be repeated. Wins over --include-kind.
	#[arg(long = "exclude-kind")]
	pub exclude: Vec<String>,

	/// Field manager for server-side apply. Defaults to the configured one.
	#[arg(long)]
	pub field_manager: Option<String>,

	#[command(flatten)]
	pub common: CommonArgs,
}

#[derive(Args)]
pub struct SyncArgs {
	/// Only report what would change
	#[arg(long)]
	pub dry_run: bool,

	#[command(flatten)]
	pub target: SyncTargetArgs,
}

pub fn run<W: Write>(args: SyncTargetArgs, mode: SyncMode, dry_run: bool, writer: W) -> Result<()> {
	let fleet = Fleet::connect(&args.common)?;
	runtime()?.block_on(sync(&fleet, &args, mode, dry_run, writer))
}

#[instrument(skip_all, fields(mode = ?mode))]
pub async fn sync<W: Write>(
	fleet: &Fleet,
	args: &SyncTargetArgs,
	mode: SyncMode,
	dry_run: bool,
	writer: W,
) -> Result<()> {
	let request = sync_request(fleet, args, dry_run)?;

	let reconciler = Reconciler::new(fleet.executor.clone());
	let report = match mode {
		SyncMode::Sync => reconciler.sync(&request).await?,
		SyncMode::Reconcile => reconciler.reconcile(request).await?,
		SyncMode::Preview => reconciler.preview(request).await?,
	};
	render(&report, &args.common, writer)
}

pub(super) fn sync_request(fleet: &Fleet, args: &SyncTargetArgs, dry_run: bool) -> Result<SyncRequest> {
	Ok(SyncRequest::builder()
		.source(args.source.manifest_source(&fleet.config)?)
		.clusters(args.clusters.clone())
		.maybe_namespace(args.namespace.clone())
		.dry_run(dry_run)
		.include(args.include.clone())
		.exclude(args.exclude.clone())
		.field_manager(
			args.field_manager
				.clone()
				.unwrap_or_else(|| fleet.config.field_manager.clone()),
		)
		.build())
}

/// Write the report, failing when any resource failed.
pub(super) fn render<W: Write>(report: &SyncReport, common: &CommonArgs, mut writer: W) -> Result<()> {
	if !write_structured(&mut writer, common.output, report)? {
		write_text(report, common.color.should_colorize(), &mut writer)?;
	}

	if report.has_failures() {
		let failed: usize = report.summaries.iter().map(|s| s.failed).sum();
		anyhow::bail!("{failed} resource(s) failed to sync");
	}
	Ok(())
}

fn write_text<W: Write>(report: &SyncReport, colored: bool, writer: &mut W) -> Result<()> {
	if report.dry_run {
		writeln!(writer, "Dry-run: no changes were made.")?;
	}
	let mut table = Table::new(&mut *writer, &["CLUSTER", "KIND", "NAMESPACE", "NAME", "ACTION", "MESSAGE"])?;
	for summary in &report.summaries {
		for result in &summary.results {
			table.row(&[
				result.cluster.clone(),
				result.kind.clone(),
				result.namespace.clone().unwrap_or_default(),
				result.name.clone(),
				paint_action(result.action, colored),
				result.message.clone(),
			])?;
		}
	}
	table.finish()?;

	writeln!(writer)?;
	let mut totals = Table::new(
		&mut *writer,
		&["CLUSTER", "CREATED", "UPDATED", "UNCHANGED", "SKIPPED", "FAILED"],
	)?;
	for s in &report.summaries {
		totals.row(&[
			s.cluster.clone(),
			s.created.to_string(),
			s.updated.to_string(),
			s.unchanged.to_string(),
			s.skipped.to_string(),
			s.failed.to_string(),
		])?;
	}
	totals.finish()?;
	writer.flush()?;
	Ok(())
}
