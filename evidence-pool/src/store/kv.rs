
use std::{cmp::Ordering, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, WriteOptions, DB};

use super::keys::PREFIX_SIZE;

/// This is the version of the persisted data layout on this current branch.
/// It must be bumped, and a migration written, on any change to the format.
const LATEST_SCHEMA_VERSION: u32 = 0;

/// Key used to store the `LATEST_SCHEMA_VERSION` value in the `METADATA_COLUMN`
const DB_SCHEMA_VERSION_KEY: &[u8; 17] = b"db_schema_version";

/// Column family names
// All data is stored in `DATA_COLUMN` with a prefix for key spaces
const DATA_COLUMN: &str = "data";
// This column is just for schema version info. No prefix is used.
const METADATA_COLUMN: &str = "metadata";

/// The ordered key-value store backing the evidence pool. Point operations
/// and batches are safe to call from multiple threads.
pub struct KeyValueStore {
	/// Rocksdb database instance
	db: DB,
}

impl KeyValueStore {
	/// Open the store, creating it if it doesn't exist. Refuses a database
	/// written by a newer schema version.
	pub fn open(db_path: &Path) -> Result<Self> {
		let is_existing_db = db_path.exists();

		// Use a prefix extractor on the data column
		let mut cfopts_for_prefix = Options::default();
		cfopts_for_prefix
			.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(PREFIX_SIZE));

		let cfs = vec![
			ColumnFamilyDescriptor::new(METADATA_COLUMN, Options::default()),
			ColumnFamilyDescriptor::new(DATA_COLUMN, cfopts_for_prefix),
		];

		let mut create_missing_db_and_cols_opts = Options::default();
		create_missing_db_and_cols_opts.create_missing_column_families(true);
		create_missing_db_and_cols_opts.create_if_missing(true);

		// Open the db or create a new one if it doesn't exist
		let db = DB::open_cf_descriptors(&create_missing_db_and_cols_opts, db_path, cfs)
			.map_err(anyhow::Error::msg)
			.context(format!("Failed to open database at: {}", db_path.display()))?;

		if is_existing_db {
			let version = read_schema_version(&db)?;
			match version.cmp(&LATEST_SCHEMA_VERSION) {
				Ordering::Equal => {},
				Ordering::Greater => bail!(
					"Database schema version {version} is ahead of the current schema version {LATEST_SCHEMA_VERSION}. Is your node up to date?"
				),
				Ordering::Less => bail!("Unexpected migration from version {version}"),
			}
		} else {
			db.put_cf(
				get_metadata_column_handle(&db),
				DB_SCHEMA_VERSION_KEY,
				LATEST_SCHEMA_VERSION.to_be_bytes(),
			)
			.context("Failed to write metadata to new db")?;
		}

		Ok(KeyValueStore { db })
	}

	pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
		self.db
			.put_cf(get_data_column_handle(&self.db), key, value)
			.map_err(|e| anyhow!("Failed to write data to database. Error: {e}"))
	}

	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		Ok(self.db.get_cf(get_data_column_handle(&self.db), key)?)
	}

	pub fn exists(&self, key: &[u8]) -> Result<bool> {
		Ok(self.db.get_pinned_cf(get_data_column_handle(&self.db), key)?.is_some())
	}

	pub fn delete(&self, key: &[u8]) -> Result<()> {
		self.db
			.delete_cf(get_data_column_handle(&self.db), key)
			.map_err(|e| anyhow!("Failed to delete data from database. Error: {e}"))
	}

	/// Ordered iteration of all `(key, value)` pairs whose key starts with
	/// `prefix`. Keys are returned with the prefix still attached.
	pub fn iter_prefix<'a>(
		&'a self,
		prefix: &[u8; PREFIX_SIZE],
	) -> impl Iterator<Item = (Box<[u8]>, Box<[u8]>)> + 'a {
		self.db
			.prefix_iterator_cf(get_data_column_handle(&self.db), prefix)
			.map(|result| result.expect("prefix iterator should not fail"))
	}

	pub fn batch(&self) -> StoreBatch<'_> {
		StoreBatch { db: &self.db, batch: WriteBatch::default() }
	}
}

/// A set of writes applied atomically.
pub struct StoreBatch<'a> {
	db: &'a DB,
	batch: WriteBatch,
}

impl<'a> StoreBatch<'a> {
	pub fn put(&mut self, key: &[u8], value: &[u8]) {
		self.batch.put_cf(get_data_column_handle(self.db), key, value);
	}

	pub fn delete(&mut self, key: &[u8]) {
		self.batch.delete_cf(get_data_column_handle(self.db), key);
	}

	pub fn is_empty(&self) -> bool {
		self.batch.is_empty()
	}

	/// Apply the batch, syncing the write-ahead log before returning.
	pub fn write_sync(self) -> Result<()> {
		let mut write_opts = WriteOptions::default();
		write_opts.set_sync(true);
		self.db
			.write_opt(self.batch, &write_opts)
			.map_err(|e| anyhow!("Failed to write batch to database. Error: {e}"))
	}
}

fn read_schema_version(db: &DB) -> Result<u32> {
	db.get_cf(get_metadata_column_handle(db), DB_SCHEMA_VERSION_KEY)
		.context("Failed to get metadata column")?
		.map(|version| {
			let version: [u8; 4] = version.try_into().expect("Version should be a u32");
			u32::from_be_bytes(version)
		})
		.ok_or_else(|| anyhow!("Could not find db schema version"))
}

fn get_data_column_handle(db: &DB) -> &ColumnFamily {
	get_column_handle(db, DATA_COLUMN)
}

fn get_metadata_column_handle(db: &DB) -> &ColumnFamily {
	get_column_handle(db, METADATA_COLUMN)
}

fn get_column_handle<'a>(db: &'a DB, column_name: &str) -> &'a ColumnFamily {
	db.cf_handle(column_name)
		.unwrap_or_else(|| panic!("Should get column family handle for {column_name}"))
}
