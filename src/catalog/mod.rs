//! Endpoint catalog
//!
//! Scans the configs directory, parses every `.ovpn` file into an
//! [`Endpoint`] and groups them by country code. The catalog is rebuilt on
//! every invocation and never written back.
//!
//! Files that cannot be parsed are skipped and kept as [`ParseWarning`]s so
//! callers can show them in verbose mode. A second file resolving to an
//! existing endpoint name is skipped the same way. Only an empty result is
//! fatal.

pub mod country;
pub mod endpoint;

pub use country::{CountryCode, CountryCodeError};
pub use endpoint::{Endpoint, ParseError, Remote};

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Config directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("Failed to read config directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("No usable endpoint files in {path} ({skipped} skipped)")]
    Empty { path: PathBuf, skipped: usize },
}

/// A file that was skipped during the scan
#[derive(Debug)]
pub struct ParseWarning {
    pub path: PathBuf,
    pub error: ParseError,
}

/// Endpoints grouped by country, each bucket sorted by name
#[derive(Debug)]
pub struct Catalog {
    buckets: BTreeMap<CountryCode, Vec<Endpoint>>,
    warnings: Vec<ParseWarning>,
}

impl Catalog {
    /// Scan `directory` for endpoint files
    pub fn build(directory: &Path) -> Result<Self, CatalogError> {
        if !directory.is_dir() {
            return Err(CatalogError::MissingDirectory(directory.to_path_buf()));
        }

        let io_error = |source| CatalogError::Io {
            path: directory.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(directory).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();

            if !path.is_file() || !endpoint::is_endpoint_file(&path) {
                debug!("Ignoring {}", path.display());
                continue;
            }
            paths.push(path);
        }
        // Directory order is arbitrary; the first path wins a name clash
        paths.sort();

        let mut endpoints = Vec::new();
        let mut warnings = Vec::new();
        let mut names = HashSet::new();

        for path in paths {
            let endpoint = match Endpoint::from_file(&path) {
                Ok(endpoint) => endpoint,
                Err(error) => {
                    warnings.push(ParseWarning { path, error });
                    continue;
                }
            };

            if !names.insert(endpoint.name.clone()) {
                let error = ParseError::DuplicateName(endpoint.name);
                warnings.push(ParseWarning { path, error });
                continue;
            }
            endpoints.push(endpoint);
        }

        if endpoints.is_empty() {
            return Err(CatalogError::Empty {
                path: directory.to_path_buf(),
                skipped: warnings.len(),
            });
        }

        Ok(Self::from_endpoints(endpoints, warnings))
    }

    /// Group already-parsed endpoints
    pub(crate) fn from_endpoints(endpoints: Vec<Endpoint>, warnings: Vec<ParseWarning>) -> Self {
        let mut buckets: BTreeMap<CountryCode, Vec<Endpoint>> = BTreeMap::new();
        for endpoint in endpoints {
            buckets.entry(endpoint.country_code).or_default().push(endpoint);
        }
        for bucket in buckets.values_mut() {
            bucket.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Self { buckets, warnings }
    }

    /// Country codes in sorted order, `unknown` last
    pub fn countries(&self) -> impl Iterator<Item = CountryCode> + '_ {
        self.buckets.keys().copied()
    }

    pub fn bucket(&self, code: CountryCode) -> Option<&[Endpoint]> {
        self.buckets.get(&code).map(Vec::as_slice)
    }

    /// All endpoints, bucket by bucket
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.buckets.values().flatten()
    }

    pub fn find(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints().find(|endpoint| endpoint.name == name)
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// Write the `list` output for `requested` codes (all when empty)
    ///
    /// One code per line; `verbose` adds the endpoint names under each code.
    /// Returns the requested codes that have no bucket.
    pub fn write_listing<W: Write>(
        &self,
        out: &mut W,
        requested: &[CountryCode],
        verbose: bool,
    ) -> io::Result<Vec<CountryCode>> {
        let mut missing = Vec::new();
        let codes: Vec<CountryCode> = if requested.is_empty() {
            self.countries().collect()
        } else {
            let mut codes = requested.to_vec();
            codes.sort();
            codes.dedup();
            codes
        };

        for code in codes {
            let Some(bucket) = self.bucket(code) else {
                missing.push(code);
                continue;
            };

            writeln!(out, "{}", code)?;
            if verbose {
                for endpoint in bucket {
                    match &endpoint.protocol {
                        Some(proto) => {
                            writeln!(out, "  {}\t{} ({})", endpoint.name, endpoint.remote, proto)?
                        }
                        None => writeln!(out, "  {}\t{}", endpoint.name, endpoint.remote)?,
                    }
                }
            }
        }

        Ok(missing)
    }
}
