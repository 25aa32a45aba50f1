//! Report rendering shared by all commands.

use std::{
	fmt,
	io::{IsTerminal, Write},
};

use anyhow::Result;
use clap::ValueEnum;
use nu_ansi_term::{Color, Style};
use serde::Serialize;
use tabwriter::TabWriter;

use crate::{cluster::HealthStatus, gitops::SyncAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
	/// Aligned columns for people
	#[default]
	Text,
	Json,
	Yaml,
}

impl fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
			OutputFormat::Yaml => write!(f, "yaml"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
	/// Color when stdout is a terminal
	#[default]
	Auto,
	Always,
	Never,
}

impl ColorMode {
	pub fn should_colorize(self) -> bool {
		match self {
			ColorMode::Auto => std::io::stdout().is_terminal(),
			ColorMode::Always => true,
			ColorMode::Never => false,
		}
	}
}

impl fmt::Display for ColorMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ColorMode::Auto => write!(f, "auto"),
			ColorMode::Always => write!(f, "always"),
			ColorMode::Never => write!(f, "never"),
		}
	}
}

/// Write `value` as pretty JSON or sorted YAML. Returns `false` for text
/// output, which each command renders itself.
pub fn write_structured<W: Write, T: Serialize>(writer: &mut W, format: OutputFormat, value: &T) -> Result<bool> {
	match format {
		OutputFormat::Json => {
			serde_json::to_writer_pretty(&mut *writer, value)?;
			writeln!(writer)?;
		}
		OutputFormat::Yaml => write!(writer, "{}", crate::yaml::to_yaml(value)?)?,
		OutputFormat::Text => return Ok(false),
	}
	writer.flush()?;
	Ok(true)
}

/// Tab-aligned rows with an upper-case header.
pub struct Table<W: Write> {
	inner: TabWriter<W>,
}

impl<W: Write> Table<W> {
	pub fn new(writer: W, header: &[&str]) -> Result<Self> {
		let mut table = Self {
			inner: TabWriter::new(writer).padding(2).ansi(true),
		};
		table.row(header)?;
		Ok(table)
	}

	pub fn row<S: AsRef<str>>(&mut self, cells: &[S]) -> Result<()> {
		let line = cells.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\t");
		writeln!(self.inner, "{line}")?;
		Ok(())
	}

	pub fn finish(mut self) -> Result<()> {
		self.inner.flush()?;
		Ok(())
	}
}

fn paint(text: &str, style: Style, colored: bool) -> String {
	if colored {
		style.paint(text).to_string()
	} else {
		text.to_string()
	}
}

pub fn paint_action(action: SyncAction, colored: bool) -> String {
	let style = match action {
		SyncAction::Created => Color::Green.normal(),
		SyncAction::Updated => Color::Yellow.normal(),
		SyncAction::Unchanged => Style::default().dimmed(),
		SyncAction::Skipped => Color::Blue.normal(),
		SyncAction::Failed => Color::Red.bold(),
	};
	paint(&action.to_string(), style, colored)
}

pub fn paint_health(status: HealthStatus, colored: bool) -> String {
	let style = match status {
		HealthStatus::Healthy => Color::Green.normal(),
		HealthStatus::Degraded => Color::Yellow.normal(),
		HealthStatus::Unhealthy => Color::Red.bold(),
	};
	paint(&status.to_string(), style, colored)
}

pub fn paint_error(text: &str, colored: bool) -> String {
	paint(text, Color::Red.normal(), colored)
}

/// `-` for empty cells so columns stay aligned.
pub fn cell(text: &str) -> &str {
	if text.is_empty() {
		"-"
	} else {
		text
	}
}
