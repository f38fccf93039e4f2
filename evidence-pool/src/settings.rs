use std::path::PathBuf;

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Db {
	pub path: PathBuf,
}

/// Host-provided settings for the evidence subsystem.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
	pub db: Db,
}

impl Settings {
	/// Load settings from `config/evidence.toml` on top of the built-in
	/// defaults. The file is optional.
	pub fn new() -> Result<Self, ConfigError> {
		Self::from_file("config/evidence.toml")
	}

	pub fn from_file(file: &str) -> Result<Self, ConfigError> {
		Config::builder()
			.set_default("db.path", "data/evidence.db")?
			.add_source(File::with_name(file).required(false))
			.build()?
			.try_deserialize()
	}
}
