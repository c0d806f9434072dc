use super::{Credentials, LookupTransport};
use crate::cache::{CacheEntry, CacheStore, FileCacheStore, MemoryCacheStore};
use crate::error::{AuditError, Result};
use crate::filter::{FilterEngine, FilterRule};
use crate::model::{AuditedPackage, InclusionPath, PackageCoordinate};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Maximum number of coordinates sent in one remote request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 128;

/// Default time-to-live of cached reports, in hours.
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 12;

/// Progress of the most recent [`LookupService::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    BatchingMisses,
    AwaitingRemote,
    Filtering,
    Done,
    Errored,
}

struct Registration {
    key: String,
    path: InclusionPath,
}

impl Registration {
    fn coordinate(&self) -> &PackageCoordinate {
        self.path.target()
    }
}

struct RunState {
    phase: RunPhase,
    store: Option<Arc<dyn CacheStore>>,
}

/// Collects coordinates to audit and resolves them to filtered reports.
///
/// Registered coordinates are deduplicated case-insensitively; the first
/// inclusion path registered for a coordinate is the one used for filtering.
/// [`run`](Self::run) consults the cache, fetches misses from the transport in
/// batches, and filters every report against its inclusion path. Results come
/// back in registration order.
pub struct LookupService {
    transport: Arc<dyn LookupTransport>,
    registrations: Vec<Registration>,
    registered_keys: HashSet<String>,
    filters: FilterEngine,
    cache_file: Option<PathBuf>,
    cache_ttl_hours: u64,
    max_batch_size: usize,
    credentials: Option<Credentials>,
    injected_store: Option<Arc<dyn CacheStore>>,
    state: Mutex<RunState>,
}

impl LookupService {
    /// Creates a service without a persistent cache.
    pub fn new(transport: Arc<dyn LookupTransport>) -> Self {
        Self {
            transport,
            registrations: Vec::new(),
            registered_keys: HashSet::new(),
            filters: FilterEngine::new(),
            cache_file: None,
            cache_ttl_hours: DEFAULT_CACHE_TTL_HOURS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            credentials: None,
            injected_store: None,
            state: Mutex::new(RunState {
                phase: RunPhase::Idle,
                store: None,
            }),
        }
    }

    /// Registers the last element of `path` for auditing and returns its
    /// placeholder report.
    pub fn register(&mut self, path: InclusionPath) -> AuditedPackage {
        let pending = AuditedPackage::pending(path.target());
        let key = path.target().cache_key();
        if self.registered_keys.insert(key.clone()) {
            self.registrations.push(Registration { key, path });
        } else {
            debug!("{} is already registered", pending.coordinates);
        }
        pending
    }

    pub fn register_coordinate(&mut self, coordinate: PackageCoordinate) -> AuditedPackage {
        self.register(InclusionPath::single(coordinate))
    }

    /// Inclusion paths of the distinct registered coordinates, in registration order.
    pub fn registered_paths(&self) -> impl Iterator<Item = &InclusionPath> {
        self.registrations.iter().map(|r| &r.path)
    }

    pub fn add_filter_rule(&mut self, rule: FilterRule) {
        self.filters.add_rule(rule);
    }

    /// Sets the cache file; `None` disables persistent caching.
    ///
    /// Fails when the path is not a regular file, the file is not writable, or
    /// the parent directory cannot be created or written to.
    pub fn set_cache_location(&mut self, location: Option<PathBuf>) -> Result<()> {
        if let Some(path) = &location {
            validate_cache_location(path)?;
        }
        self.cache_file = location;
        self.state.get_mut().store = None;
        Ok(())
    }

    pub fn set_cache_ttl(&mut self, hours: u64) {
        self.cache_ttl_hours = hours;
        self.state.get_mut().store = None;
    }

    pub fn set_max_batch_size(&mut self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(AuditError::Config(
                "maximum batch size must be at least 1".to_string(),
            ));
        }
        self.max_batch_size = size;
        Ok(())
    }

    pub fn set_credentials(&mut self, username: impl Into<String>, token: impl Into<String>) {
        self.credentials = Some(Credentials::new(username, token));
    }

    /// Uses `store` for caching instead of the configured cache file.
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.injected_store = Some(store);
        self
    }

    /// The phase reached by the last run. Waits for a run in progress.
    pub async fn phase(&self) -> RunPhase {
        self.state.lock().await.phase
    }

    /// Resolves every registered coordinate to a filtered report.
    ///
    /// Batches that were committed to the cache before a failure stay cached.
    pub async fn run(&self) -> Result<Vec<AuditedPackage>> {
        let mut state = self.state.lock().await;
        let result = self.execute(&mut state).await;
        if result.is_err() {
            state.phase = RunPhase::Errored;
        }
        result
    }

    async fn execute(&self, state: &mut RunState) -> Result<Vec<AuditedPackage>> {
        state.phase = RunPhase::BatchingMisses;
        let store = self.resolve_store(state);

        let keys: Vec<&str> = self.registrations.iter().map(|r| r.key.as_str()).collect();
        let mut cached = match store.get_many(&keys) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("{}; fetching every package", e);
                HashMap::new()
            }
        };

        let mut reports: HashMap<String, AuditedPackage> = HashMap::new();
        let mut misses: Vec<&Registration> = Vec::new();
        for registration in &self.registrations {
            match cached
                .remove(&registration.key)
                .and_then(|entry| cached_report(&registration.key, &entry))
            {
                Some(package) => {
                    debug!("Cache hit for {}", registration.key);
                    reports.insert(registration.key.clone(), package);
                }
                None => misses.push(registration),
            }
        }
        debug!("{} cached, {} to fetch", reports.len(), misses.len());

        for batch in misses.chunks(self.max_batch_size) {
            state.phase = RunPhase::AwaitingRemote;
            let coordinates: Vec<String> =
                batch.iter().map(|r| r.coordinate().to_purl()).collect();
            debug!("Sending batch of {} coordinates", coordinates.len());
            let fetched = self
                .transport
                .bulk_lookup(&coordinates, self.credentials.as_ref())
                .await?;

            let resolved = assign_to_batch(batch, fetched);
            let entries: Vec<(String, CacheEntry)> = resolved
                .iter()
                .filter_map(|(key, package)| match CacheEntry::for_package(package) {
                    Ok(entry) => Some((key.clone(), entry)),
                    Err(e) => {
                        warn!("Not caching {}: {}", key, e);
                        None
                    }
                })
                .collect();
            let target = Arc::clone(&store);
            tokio::task::spawn_blocking(move || target.commit(entries)).await??;
            reports.extend(resolved);
        }

        state.phase = RunPhase::Filtering;
        let results = self
            .registrations
            .iter()
            .map(|registration| match reports.get(&registration.key) {
                Some(package) => self.filters.apply(package, &registration.path),
                None => {
                    warn!("No report returned for {}", registration.coordinate());
                    AuditedPackage::pending(registration.coordinate())
                }
            })
            .collect();
        state.phase = RunPhase::Done;
        Ok(results)
    }

    fn resolve_store(&self, state: &mut RunState) -> Arc<dyn CacheStore> {
        if let Some(store) = &self.injected_store {
            return Arc::clone(store);
        }
        if let Some(store) = &state.store {
            return Arc::clone(store);
        }
        let store: Arc<dyn CacheStore> = match &self.cache_file {
            Some(path) => match FileCacheStore::open(path, self.cache_ttl_hours) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!("{}; falling back to an in-memory cache", e);
                    Arc::new(MemoryCacheStore::new(self.cache_ttl_hours))
                }
            },
            None => Arc::new(MemoryCacheStore::new(self.cache_ttl_hours)),
        };
        state.store = Some(Arc::clone(&store));
        store
    }
}

fn cached_report(key: &str, entry: &CacheEntry) -> Option<AuditedPackage> {
    match entry.package() {
        Ok(package) => Some(package),
        Err(e) => {
            warn!("Discarding unreadable cache entry for {}: {}", key, e);
            None
        }
    }
}

/// Keys each fetched report by the registration it answers.
///
/// A report is matched on the coordinate it names, in whichever form the
/// service echoed it, first by case-insensitive canonical key and then by the
/// one registration with the same identity and an overlapping version. Each
/// registration takes at most one report. Only when nothing in the batch could
/// be matched that way and the service returned one report per requested
/// coordinate are reports matched by position.
fn assign_to_batch(
    batch: &[&Registration],
    fetched: Vec<AuditedPackage>,
) -> Vec<(String, AuditedPackage)> {
    let mut taken: HashSet<&str> = HashSet::new();
    let mut assigned = Vec::with_capacity(fetched.len());
    let mut unmatched = Vec::new();
    for (index, package) in fetched.into_iter().enumerate() {
        match find_registration(batch, &taken, &package) {
            Some(registration) => {
                taken.insert(registration.key.as_str());
                assigned.push((registration.key.clone(), package));
            }
            None => unmatched.push((index, package)),
        }
    }

    let positional = assigned.is_empty() && unmatched.len() == batch.len();
    for (index, package) in unmatched {
        if positional {
            debug!(
                "Matched report {} to {} by position",
                package.coordinates, batch[index].key
            );
            assigned.push((batch[index].key.clone(), package));
        } else {
            warn!("Ignoring report for unrequested {}", package.coordinates);
        }
    }
    assigned
}

fn find_registration<'a>(
    batch: &[&'a Registration],
    taken: &HashSet<&str>,
    package: &AuditedPackage,
) -> Option<&'a Registration> {
    let key = package.cache_key();
    let open = batch
        .iter()
        .copied()
        .filter(|r| !taken.contains(r.key.as_str()));
    if let Some(registration) = open.clone().find(|r| r.key == key) {
        return Some(registration);
    }

    let reported: PackageCoordinate = key.parse().ok()?;
    let mut candidates = open.filter(|r| {
        r.key
            .parse::<PackageCoordinate>()
            .is_ok_and(|registered| registered.matches(&reported))
    });
    match (candidates.next(), candidates.next()) {
        (Some(registration), None) => Some(registration),
        _ => None,
    }
}

fn validate_cache_location(path: &Path) -> Result<()> {
    let invalid = |reason: &str| {
        Err(AuditError::Config(format!(
            "cache location {} {}",
            path.display(),
            reason
        )))
    };

    if path.exists() {
        if !path.is_file() {
            return invalid("is not a file");
        }
        if OpenOptions::new().append(true).open(path).is_err() {
            return invalid("is not writable");
        }
        return Ok(());
    }

    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => return Ok(()),
    };
    if parent.exists() && !parent.is_dir() {
        return invalid("has a parent that is not a directory");
    }
    if fs::create_dir_all(parent).is_err() {
        return invalid("has a parent directory that cannot be created");
    }
    match fs::metadata(parent) {
        Ok(metadata) if !metadata.permissions().readonly() => Ok(()),
        _ => invalid("has a parent directory that is not writable"),
    }
}
