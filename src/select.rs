//! Endpoint selection
//!
//! An explicit name always wins. Otherwise the pick is uniform over the
//! requested country's bucket, or over every endpoint in the catalog, so a
//! country with ten servers gets ten times the weight of a country with one.

use crate::catalog::{Catalog, CountryCode, Endpoint};
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectError {
    #[error("No endpoint named '{0}'")]
    NoSuchEndpoint(String),
    #[error("No endpoints for country '{0}'")]
    NoSuchCountry(CountryCode),
    #[error("Catalog is empty")]
    EmptyCatalog,
}

/// Filters given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub name: Option<String>,
    pub country: Option<CountryCode>,
}

impl Selection {
    pub fn is_deterministic(&self) -> bool {
        self.name.is_some()
    }
}

/// Pick one endpoint from `catalog`
pub fn select<'a, R: Rng + ?Sized>(
    catalog: &'a Catalog,
    selection: &Selection,
    rng: &mut R,
) -> Result<&'a Endpoint, SelectError> {
    if let Some(name) = &selection.name {
        if let Some(country) = selection.country {
            debug!("Endpoint named explicitly, ignoring country filter {}", country);
        }
        return find(catalog, name);
    }

    if let Some(country) = selection.country {
        let bucket = country_bucket(catalog, country)?;
        return bucket.choose(rng).ok_or(SelectError::NoSuchCountry(country));
    }

    let all: Vec<&Endpoint> = catalog.endpoints().collect();
    all.choose(rng).copied().ok_or(SelectError::EmptyCatalog)
}

/// Check that [`select`] can succeed, without picking
///
/// The answer only depends on the catalog, so it holds for any later
/// invocation that sees the same configs directory.
pub fn validate(catalog: &Catalog, selection: &Selection) -> Result<(), SelectError> {
    if let Some(name) = &selection.name {
        return find(catalog, name).map(|_| ());
    }
    if let Some(country) = selection.country {
        return country_bucket(catalog, country).map(|_| ());
    }
    if catalog.is_empty() {
        return Err(SelectError::EmptyCatalog);
    }
    Ok(())
}

fn find<'a>(catalog: &'a Catalog, name: &str) -> Result<&'a Endpoint, SelectError> {
    catalog
        .find(name)
        .ok_or_else(|| SelectError::NoSuchEndpoint(name.to_string()))
}

fn country_bucket(catalog: &Catalog, country: CountryCode) -> Result<&[Endpoint], SelectError> {
    catalog
        .bucket(country)
        .filter(|bucket| !bucket.is_empty())
        .ok_or(SelectError::NoSuchCountry(country))
}
