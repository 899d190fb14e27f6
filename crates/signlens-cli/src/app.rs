use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use signlens_config::SignLensConfig;
use signlens_media::{
    CredentialSource, EnvCredentials, GeminiClient, GeoProvider, IpGeoProvider, StaticGeoProvider,
};
use signlens_storage::SignLensStorage;

/// Collaborators shared by every command.
pub struct App {
    pub config: SignLensConfig,
    pub credentials: Arc<EnvCredentials>,
    pub gemini: Arc<GeminiClient>,
}

impl App {
    pub fn load() -> Result<Self> {
        let config = match signlens_config::load_config() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config, using defaults: {e}");
                SignLensConfig::default()
            }
        };
        let credentials = Arc::new(EnvCredentials::new(config.provider.api_key_env.clone()));
        let gemini = Arc::new(
            GeminiClient::from_config(&config.provider).context("Failed to build HTTP client")?,
        );
        Ok(Self {
            config,
            credentials,
            gemini,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.credentials.api_key().is_some()
    }

    /// Coordinates from the command line, then config, then an IP lookup.
    pub fn geo_provider(&self, coordinates: Option<(f64, f64)>) -> Result<Box<dyn GeoProvider>> {
        match coordinates.or(self.config.locality.fixed_coordinates()) {
            Some((lat, lng)) => {
                debug!(lat, lng, "Using fixed coordinates");
                Ok(Box::new(StaticGeoProvider::new(lat, lng)))
            }
            None => {
                let provider = IpGeoProvider::new(self.config.locality.ip_lookup_url.clone())
                    .context("Failed to build geolocation client")?;
                Ok(Box::new(provider))
            }
        }
    }

    /// Open the record database, or `None` when saving is disabled or the database cannot be opened.
    pub fn storage(&self) -> Option<Arc<SignLensStorage>> {
        if !self.config.storage.save_records {
            return None;
        }
        self.open_storage()
            .inspect_err(|e| warn!("Records will not be saved: {e:#}"))
            .ok()
    }

    pub fn open_storage(&self) -> Result<Arc<SignLensStorage>> {
        let path = self.config.db_path()?;
        let storage = SignLensStorage::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Ok(Arc::new(storage))
    }
}
