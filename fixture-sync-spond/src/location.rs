use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::api::SpondApi;
use crate::error::SpondResult;
use crate::types::Location;

/// Resolves free-text venue addresses to Spond locations.
///
/// Answers are remembered for the lifetime of the service, including
/// addresses with no candidate, so a venue shared by many matches costs one
/// autocomplete call. Failed lookups are not remembered.
pub struct LocationService<A: SpondApi> {
    api: Arc<A>,
    resolved: Mutex<HashMap<String, Option<Location>>>,
}

impl<A: SpondApi> LocationService<A> {
    pub fn new(api: Arc<A>) -> Self {
        LocationService {
            api,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// The full location of the first autocomplete candidate for `address`.
    ///
    /// `Ok(None)` when Spond knows no candidate; the event is then written
    /// without a location.
    pub async fn resolve(&self, address: &str) -> SpondResult<Option<Location>> {
        if let Some(cached) = self.cached(address) {
            return Ok(cached);
        }
        let location = self.lookup(address).await?;
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_string(), location.clone());
        Ok(location)
    }

    fn cached(&self, address: &str) -> Option<Option<Location>> {
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    async fn lookup(&self, address: &str) -> SpondResult<Option<Location>> {
        let candidates = self.api.autocomplete_location(address).await?;
        let Some(candidate) = candidates.into_iter().next() else {
            warn!("[{}] Could not autocomplete location.", address);
            return Ok(None);
        };
        debug!(
            "[{}] Successfully autocompleted location to {}.",
            address, candidate
        );

        let location = self.api.get_location(&candidate.id).await?;
        debug!(
            "[{}] Resolved autocomplete location {} to location {}.",
            address, candidate, location
        );
        Ok(Some(location))
    }
}
