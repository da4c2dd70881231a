//! Migration command surface.
//!
//! This module is a library the host application's management binary
//! calls into: the host wires its own [`DatabaseInterface`] and metadata
//! registry into a [`CliEnvironment`] and hands parsed arguments to
//! [`run`]. Exit codes: 0 success, 1 generic error, 2 validation error,
//! 3 database error.

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use console::style;

use crate::backends::DatabaseInterface;
use crate::error::MigrationError;
use crate::metadata::MetadataRegistry;
use crate::migrations::{MigrationGenerator, MigrationManager};

/// Parsed command line of the migration tool.
#[derive(Debug, Parser)]
#[command(name = "grappelli", about = "Schema migration management", long_about = None)]
#[command(version)]
pub struct Cli {
	#[command(subcommand)]
	pub command: Command,

	/// Verbosity level (can be repeated for more output)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbosity: u8,
}

/// Migration commands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
	/// Diff the live schema against the model and write a migration file
	#[command(name = "migration:generate")]
	Generate {
		/// Migration stamp, YYYYMMDDHHMM; defaults to the current minute
		datetime: Option<String>,
	},

	/// Apply every pending migration
	#[command(name = "migration:run")]
	Run,

	/// Revert the most recently executed migration
	#[command(name = "migration:rollback")]
	Rollback {
		/// Print the SQL without executing it
		#[arg(long)]
		dry_run: bool,
	},

	/// Show registered migrations and their applied state
	#[command(name = "migration:status")]
	Status,
}

/// Everything the commands need from the host application.
pub struct CliEnvironment {
	pub registry: Arc<MetadataRegistry>,
	pub db: Rc<dyn DatabaseInterface>,
	/// Schema name introspection reads from.
	pub database: String,
	pub migrations_dir: PathBuf,
}

/// Execute one command, translating errors into concise messages and the
/// documented exit codes.
pub fn run(cli: &Cli, env: &CliEnvironment) -> i32 {
	match dispatch(&cli.command, env) {
		Ok(()) => 0,
		Err(err) => {
			eprintln!("{} {}", style("error:").red().bold(), err);
			exit_code(&err)
		}
	}
}

fn dispatch(command: &Command, env: &CliEnvironment) -> Result<(), MigrationError> {
	match command {
		Command::Generate { datetime } => {
			let generator = MigrationGenerator::new(
				env.registry.clone(),
				env.db.clone(),
				env.database.clone(),
				env.migrations_dir.clone(),
			)?;
			let stamp = datetime
				.clone()
				.unwrap_or_else(|| Utc::now().format("%Y%m%d%H%M").to_string());
			match generator.generate_migration(&stamp)? {
				Some(path) => {
					println!(
						"{} generated {}",
						style("✓").green(),
						style(path.display()).bold()
					);
				}
				None => println!("schema is up to date, nothing to generate"),
			}
			Ok(())
		}
		Command::Run => {
			let mut manager = MigrationManager::new(env.db.clone())?;
			manager.register_from(&env.migrations_dir)?;
			let applied = manager.migrate()?;
			if applied == 0 {
				println!("no pending migrations");
			} else {
				println!("{} applied {applied} migration(s)", style("✓").green());
			}
			Ok(())
		}
		Command::Rollback { dry_run } => {
			let mut manager = MigrationManager::new(env.db.clone())?;
			manager.register_from(&env.migrations_dir)?;
			if *dry_run {
				match manager.plan_rollback()? {
					Some((version, statements)) => {
						println!("would roll back {}", style(&version).bold());
						for sql in statements {
							println!("  {sql}");
						}
					}
					None => println!("nothing to roll back"),
				}
				return Ok(());
			}
			if manager.rollback()? {
				println!("{} rolled back one migration", style("✓").green());
			} else {
				println!("nothing to roll back");
			}
			Ok(())
		}
		Command::Status => {
			let mut manager = MigrationManager::new(env.db.clone())?;
			manager.register_from(&env.migrations_dir)?;
			let status = manager.status()?;
			if status.is_empty() {
				println!("no migrations registered");
				return Ok(());
			}
			for (version, applied) in status {
				let mark = if applied {
					style("✓").green()
				} else {
					style("-").dim()
				};
				println!("{mark} {version}");
			}
			Ok(())
		}
	}
}

fn exit_code(err: &MigrationError) -> i32 {
	match err {
		MigrationError::InvalidDatetime(_)
		| MigrationError::MigrationDirectoryMissing(_)
		| MigrationError::DuplicateMigrationVersion(_)
		| MigrationError::Validation(_)
		| MigrationError::Parse { .. } => 2,
		MigrationError::Database(_) | MigrationError::MigrationFailed { .. } => 3,
		_ => 1,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::SchemaValidationError;

	#[test]
	fn test_command_names_parse() {
		let cli = Cli::try_parse_from(["grappelli", "migration:generate", "202505011024"]).unwrap();
		assert!(matches!(
			cli.command,
			Command::Generate { datetime: Some(ref d) } if d == "202505011024"
		));

		let cli = Cli::try_parse_from(["grappelli", "migration:rollback", "--dry-run"]).unwrap();
		assert!(matches!(cli.command, Command::Rollback { dry_run: true }));

		assert!(Cli::try_parse_from(["grappelli", "migration:run"]).is_ok());
		assert!(Cli::try_parse_from(["grappelli", "migration:status"]).is_ok());
		assert!(Cli::try_parse_from(["grappelli", "unknown:command"]).is_err());
	}

	#[test]
	fn test_exit_codes_follow_error_kind() {
		assert_eq!(
			exit_code(&MigrationError::InvalidDatetime("x".into())),
			2
		);
		assert_eq!(
			exit_code(&MigrationError::Validation(
				SchemaValidationError::EntityHasNoColumns("User".into())
			)),
			2
		);
		assert_eq!(
			exit_code(&MigrationError::Database(
				crate::error::DbError::Execution("boom".into())
			)),
			3
		);
		assert_eq!(
			exit_code(&MigrationError::AlreadyExecuted("20250501-1024".into())),
			1
		);
	}
}
