// Locator session - the page controller
//
// Owns the loaded records, the current selection and the apartment markers.
// Every search or clear starts a new epoch; geocode results tagged with an
// older epoch are dropped when they arrive.

use crate::config::GeocodingConfig;
use crate::error::LocatorError;
use crate::geocode::{Coordinate, Geocoder};
use crate::map::{MapSurface, Marker, MarkerId, MarkerKind};
use crate::records::{ApartmentRecord, RecordSet};
use crate::search::{self, SearchOutcome};
use crate::share;
use crate::source::RecordSource;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Geocoding knobs used by the session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub address_suffix: String,
    pub max_concurrent_geocodes: Option<usize>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings::from(&GeocodingConfig::default())
    }
}

impl From<&GeocodingConfig> for SessionSettings {
    fn from(config: &GeocodingConfig) -> Self {
        SessionSettings {
            address_suffix: config.address_suffix.clone(),
            max_concurrent_geocodes: config.max_concurrent_geocodes,
        }
    }
}

/// Mutable page state, always accessed under the session lock
pub struct SessionState<M> {
    records: RecordSet,
    selection: Vec<ApartmentRecord>,
    apartment_markers: Vec<(String, MarkerId)>,
    share_link: Option<String>,
    epoch: u64,
    map: M,
}

impl<M: MapSurface> SessionState<M> {
    /// Remove apartment markers and the selection, and invalidate
    /// in-flight geocodes. Landmark markers stay.
    fn reset_selection(&mut self) {
        for (_, id) in self.apartment_markers.drain(..) {
            self.map.remove_marker(id);
        }
        self.selection.clear();
        self.share_link = None;
        self.epoch += 1;
    }
}

/// Copy of the non-map state, for rendering
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub record_count: usize,
    pub loaded_at: Option<DateTime<Utc>>,
    pub selection: Vec<ApartmentRecord>,
    pub placed: usize,
    pub share_link: Option<String>,
    pub epoch: u64,
}

/// Geocode tasks spawned by one search
#[derive(Debug, Default)]
pub struct GeocodeBatch {
    handles: Vec<JoinHandle<()>>,
}

impl GeocodeBatch {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait until every geocode of the batch has been applied or dropped
    pub async fn settle(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Geocode task failed: {}", e);
            }
        }
    }
}

#[derive(Debug)]
pub struct SearchReport {
    pub outcome: SearchOutcome,
    pub epoch: u64,
    pub pending: GeocodeBatch,
}

/// Search replayed from a share link
#[derive(Debug)]
pub struct SharedRestore {
    /// Decoded `apparts` value, to pre-fill the search field
    pub input: String,
    pub report: SearchReport,
}

/// The locator page controller.
///
/// Cloning is cheap and every clone drives the same page. `search` spawns
/// onto the ambient tokio runtime and must be called from within one.
pub struct LocatorSession<M> {
    state: Arc<Mutex<SessionState<M>>>,
    geocoder: Arc<dyn Geocoder>,
    settings: SessionSettings,
    geocode_limit: Option<Arc<Semaphore>>,
    ready: Arc<watch::Sender<bool>>,
}

impl<M> Clone for LocatorSession<M> {
    fn clone(&self) -> Self {
        LocatorSession {
            state: Arc::clone(&self.state),
            geocoder: Arc::clone(&self.geocoder),
            settings: self.settings.clone(),
            geocode_limit: self.geocode_limit.clone(),
            ready: Arc::clone(&self.ready),
        }
    }
}

fn lock<M>(state: &Mutex<SessionState<M>>) -> MutexGuard<'_, SessionState<M>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<M: MapSurface + 'static> LocatorSession<M> {
    pub fn new(map: M, geocoder: Arc<dyn Geocoder>, settings: SessionSettings) -> Self {
        let geocode_limit = settings
            .max_concurrent_geocodes
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let (ready, _) = watch::channel(false);

        LocatorSession {
            state: Arc::new(Mutex::new(SessionState {
                records: RecordSet::default(),
                selection: Vec::new(),
                apartment_markers: Vec::new(),
                share_link: None,
                epoch: 0,
                map,
            })),
            geocoder,
            settings,
            geocode_limit,
            ready: Arc::new(ready),
        }
    }

    /// Fetch and parse the sheet, replacing the record set wholesale.
    ///
    /// On failure the previous record set is kept.
    pub async fn load_records(&self, source: &dyn RecordSource) -> Result<usize, LocatorError> {
        let csv_text = match source.fetch_csv().await {
            Ok(text) => text,
            Err(e) => {
                error!("Erreur lors du chargement des données ({}): {}", source.describe(), e);
                return Err(e);
            }
        };

        let records = RecordSet::from_csv(&csv_text);
        let count = records.len();

        lock(&self.state).records = records;
        self.ready.send_replace(count > 0);

        info!("Données chargées: {} appartements depuis {}", count, source.describe());
        Ok(count)
    }

    /// Place the fixed landmark and geocode the agency marker
    pub async fn place_landmarks(&self, palais: Coordinate, agency_address: &str) {
        lock(&self.state).map.place_marker(Marker {
            label: MarkerKind::Landmark.legend().to_string(),
            position: palais,
            info: MarkerKind::Landmark.legend().to_string(),
            kind: MarkerKind::Landmark,
        });

        match self.geocoder.geocode(agency_address).await {
            Ok(position) => {
                lock(&self.state).map.place_marker(Marker {
                    label: MarkerKind::Agency.legend().to_string(),
                    position,
                    info: agency_address.to_string(),
                    kind: MarkerKind::Agency,
                });
            }
            Err(e) => error!("Geocode failed for agence: {}", e),
        }
    }

    /// Resolve `input` and display the matches.
    ///
    /// Rejected inputs leave every piece of state untouched. Otherwise the
    /// previous selection and markers are cleared, the selection is set
    /// from the matches right away, and one geocode task is spawned per
    /// match; each adds its marker when it completes.
    pub fn search(&self, input: &str) -> Result<SearchReport, LocatorError> {
        let (outcome, epoch) = {
            let mut state = lock(&self.state);
            let outcome = search::resolve(input, &state.records)?;

            state.reset_selection();
            state.selection = outcome.matched.clone();
            (outcome, state.epoch)
        };

        info!(
            "Recherche: {} trouvé(s), {} inconnu(s)",
            outcome.matched.len(),
            outcome.unmatched.len()
        );

        let handles = outcome
            .matched
            .iter()
            .map(|apartment| self.spawn_geocode(apartment.clone(), epoch))
            .collect();

        Ok(SearchReport {
            outcome,
            epoch,
            pending: GeocodeBatch { handles },
        })
    }

    fn spawn_geocode(&self, apartment: ApartmentRecord, epoch: u64) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let geocoder = Arc::clone(&self.geocoder);
        let limit = self.geocode_limit.clone();
        let address = format!("{}{}", apartment.address, self.settings.address_suffix);

        tokio::spawn(async move {
            let _permit = match limit {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            if lock(&state).epoch != epoch {
                debug!("Skipping geocode of {}: search superseded", apartment.reference);
                return;
            }

            let result = geocoder.geocode(&address).await;

            let mut state = lock(&state);
            if state.epoch != epoch {
                debug!("Discarding stale geocode of {}", apartment.reference);
                return;
            }

            match result {
                Ok(position) => {
                    let id = state.map.place_marker(Marker {
                        label: apartment.reference.clone(),
                        position,
                        info: apartment.info(),
                        kind: MarkerKind::Apartment,
                    });
                    state.apartment_markers.push((apartment.reference, id));
                }
                Err(e) => error!("Geocode failed for {}: {}", address, e),
            }
        })
    }

    /// Remove apartment markers and the selection
    pub fn clear(&self) {
        lock(&self.state).reset_selection();
    }

    /// Share link for the current selection, also kept for display
    pub fn share_link(&self, page_url: &str) -> Result<String, LocatorError> {
        let mut state = lock(&self.state);
        let link = share::share_link(page_url, &state.selection)?;
        state.share_link = Some(link.clone());
        Ok(link)
    }

    /// Replay the search encoded in `page_url`.
    ///
    /// Waits for a non-empty record set before searching; a failed load
    /// keeps it waiting for the next reload. Returns `Ok(None)` when the
    /// URL carries no shared codes.
    pub async fn restore_shared_link(&self, page_url: &str) -> Result<Option<SharedRestore>, LocatorError> {
        let Some(input) = share::shared_codes(page_url) else {
            return Ok(None);
        };

        // The sender lives as long as the session, so this only returns once loaded
        let mut ready = self.ready.subscribe();
        let _ = ready.wait_for(|loaded| *loaded).await;

        let report = self.search(&input)?;
        Ok(Some(SharedRestore { input, report }))
    }

    /// Open the popup of a displayed apartment; false when it has no marker yet
    pub fn open_info(&self, reference: &str) -> bool {
        let upper = reference.trim().to_uppercase();
        let mut state = lock(&self.state);

        let id = state
            .apartment_markers
            .iter()
            .find(|(r, _)| r.to_uppercase() == upper)
            .map(|(_, id)| *id);

        match id {
            Some(id) => {
                state.map.open_info(id);
                true
            }
            None => false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.state);
        SessionSnapshot {
            record_count: state.records.len(),
            loaded_at: state.records.loaded_at(),
            selection: state.selection.clone(),
            placed: state.apartment_markers.len(),
            share_link: state.share_link.clone(),
            epoch: state.epoch,
        }
    }

    /// Read access to the map, e.g. for rendering
    pub fn with_map<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&lock(&self.state).map)
    }
}
