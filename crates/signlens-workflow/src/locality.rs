//! Locality lookup. Never fails; every failure becomes a fallback label.

use std::time::Duration;

use tracing::{info, warn};

use signlens_media::{CredentialSource, GeoProvider, LocalityResolver};
use signlens_types::{GeoContext, Locality};

/// Turn a geolocation result into a [`Locality`].
///
/// * no position: [`Locality::Unavailable`]
/// * resolver error, blank answer or timeout: [`Locality::Unknown`]
pub async fn resolve_locality(
    geo: &GeoContext,
    resolver: &dyn LocalityResolver,
    credentials: &dyn CredentialSource,
    timeout: Duration,
) -> Locality {
    let (latitude, longitude) = match geo {
        GeoContext::Position {
            latitude,
            longitude,
        } => (*latitude, *longitude),
        GeoContext::Failed(e) => {
            warn!(error = %e, "Geolocation failed");
            return Locality::Unavailable;
        }
    };

    let lookup = resolver.resolve_locality(latitude, longitude, credentials);
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(name)) => {
            let name = name.trim();
            if name.is_empty() {
                warn!(latitude, longitude, "Locality resolver returned an empty name");
                Locality::Unknown
            } else {
                info!(locality = name, "Locality resolved");
                Locality::Resolved(name.to_string())
            }
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Locality lookup failed");
            Locality::Unknown
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Locality lookup timed out");
            Locality::Unknown
        }
    }
}

/// Query the device position once and resolve it.
pub async fn locate(
    geo: &dyn GeoProvider,
    resolver: &dyn LocalityResolver,
    credentials: &dyn CredentialSource,
    timeout: Duration,
) -> (GeoContext, Locality) {
    let position = geo.current_position().await;
    let locality = resolve_locality(&position, resolver, credentials, timeout).await;
    (position, locality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use signlens_media::{DeniedGeoProvider, StaticCredentials, StaticGeoProvider};
    use signlens_types::{AnalysisError, LocationError};

    enum Answer {
        Name(&'static str),
        Fail,
        Hang,
    }

    struct FakeResolver(Answer);

    #[async_trait]
    impl LocalityResolver for FakeResolver {
        async fn resolve_locality(
            &self,
            _latitude: f64,
            _longitude: f64,
            _credentials: &dyn CredentialSource,
        ) -> Result<String, AnalysisError> {
            match self.0 {
                Answer::Name(name) => Ok(name.to_string()),
                Answer::Fail => Err(AnalysisError::NetworkFailure("offline".into())),
                Answer::Hang => std::future::pending().await,
            }
        }
    }

    fn creds() -> StaticCredentials {
        StaticCredentials("test-key".into())
    }

    fn pune() -> GeoContext {
        GeoContext::Position {
            latitude: 18.52,
            longitude: 73.85,
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_resolved_name_is_trimmed() {
        let resolver = FakeResolver(Answer::Name("  Pune, Maharashtra\n"));
        let locality = resolve_locality(&pune(), &resolver, &creds(), TIMEOUT).await;
        assert_eq!(locality, Locality::Resolved("Pune, Maharashtra".into()));
        assert_eq!(locality.hint("India"), "Pune, Maharashtra");
    }

    #[tokio::test]
    async fn test_failing_resolver_falls_back() {
        let resolver = FakeResolver(Answer::Fail);
        let locality = resolve_locality(&pune(), &resolver, &creds(), TIMEOUT).await;
        assert_eq!(locality, Locality::Unknown);
        assert_eq!(locality.label(), "Unknown Location");
        assert_eq!(locality.hint("India"), "India");
    }

    #[tokio::test]
    async fn test_blank_answer_falls_back() {
        let resolver = FakeResolver(Answer::Name("   "));
        let locality = resolve_locality(&pune(), &resolver, &creds(), TIMEOUT).await;
        assert_eq!(locality, Locality::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_resolver_times_out() {
        let resolver = FakeResolver(Answer::Hang);
        let locality = resolve_locality(&pune(), &resolver, &creds(), TIMEOUT).await;
        assert_eq!(locality, Locality::Unknown);
    }

    #[tokio::test]
    async fn test_no_position_is_unavailable() {
        let resolver = FakeResolver(Answer::Name("never asked"));
        let geo = GeoContext::Failed(LocationError::PermissionDenied);
        let locality = resolve_locality(&geo, &resolver, &creds(), TIMEOUT).await;
        assert_eq!(locality, Locality::Unavailable);
        assert_eq!(locality.label(), "Location Unavailable");
    }

    #[tokio::test]
    async fn test_locate_with_providers() {
        let resolver = FakeResolver(Answer::Name("Kochi, Kerala"));
        let (geo, locality) =
            locate(&StaticGeoProvider::new(9.93, 76.26), &resolver, &creds(), TIMEOUT).await;
        assert_eq!(geo.coordinates(), Some((9.93, 76.26)));
        assert_eq!(locality, Locality::Resolved("Kochi, Kerala".into()));

        let (geo, locality) = locate(&DeniedGeoProvider, &resolver, &creds(), TIMEOUT).await;
        assert!(geo.coordinates().is_none());
        assert_eq!(locality, Locality::Unavailable);
    }
}
