//! `deploy`: sync manifests to the clusters that can run them.
//!
//! Without `--cluster`, the placement flags pick the target clusters from
//! their live capabilities. Named clusters are used as given.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use tracing::instrument;

use super::{
	find::RequirementArgs,
	sync::{render, sync_request, SyncTargetArgs},
	util::{runtime, Fleet},
};
use crate::gitops::Reconciler;

#[derive(Args)]
pub struct DeployArgs {
	/// Only report what would change
	#[arg(long)]
	pub dry_run: bool,

	#[command(flatten)]
	pub workload: RequirementArgs,

	#[command(flatten)]
	pub target: SyncTargetArgs,
}

pub fn run<W: Write>(args: DeployArgs, writer: W) -> Result<()> {
	let fleet = Fleet::connect(&args.target.common)?;
	runtime()?.block_on(deploy(&fleet, &args, writer))
}

#[instrument(skip_all, fields(dry_run = args.dry_run))]
pub async fn deploy<W: Write>(fleet: &Fleet, args: &DeployArgs, writer: W) -> Result<()> {
	let mut request = sync_request(fleet, &args.target, args.dry_run)?;
	if args.workload.is_set() {
		request.requirements = Some(args.workload.to_requirements()?);
	}

	let report = Reconciler::new(fleet.executor.clone()).sync(&request).await?;
	render(&report, &args.target.common, writer)
}
