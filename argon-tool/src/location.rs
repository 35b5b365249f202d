use std::future::Future;
use std::time::Duration;

use argon_core::GeoPoint;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::LocationConfig;

const IP_LOOKUP_URL: &str = "http://ip-api.com/json?fields=status,message,lat,lon";

/// Best-effort source of the user's location.
pub trait LocationProvider {
    fn locate(&self) -> impl Future<Output = Option<GeoPoint>> + Send;
}

/// Approximate location of the public IP address.
pub struct IpLocator {
    http: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IpLookup {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl IpLocator {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            url: IP_LOOKUP_URL.to_string(),
        })
    }

    async fn lookup(&self) -> Result<Option<GeoPoint>, reqwest::Error> {
        let reply: IpLookup = self.http.get(&self.url).send().await?.json().await?;
        if reply.status != "success" {
            warn!(message = ?reply.message, "IP geolocation refused");
            return Ok(None);
        }
        Ok(point_from(reply.lat, reply.lon))
    }
}

impl LocationProvider for IpLocator {
    async fn locate(&self) -> Option<GeoPoint> {
        match self.lookup().await {
            Ok(point) => point,
            Err(e) => {
                warn!(error = %e, "IP geolocation failed");
                None
            }
        }
    }
}

/// Where the session's location comes from.
pub enum Locator {
    Fixed(Option<GeoPoint>),
    Ip(IpLocator),
}

impl LocationProvider for Locator {
    async fn locate(&self) -> Option<GeoPoint> {
        match self {
            Locator::Fixed(point) => *point,
            Locator::Ip(locator) => locator.locate().await,
        }
    }
}

impl Locator {
    /// Picks the location source: an explicit coordinate wins over lookup.
    pub fn resolve(cli_location: Option<GeoPoint>, cli_geolocate: bool, config: &LocationConfig) -> Self {
        if let Some(point) = cli_location.or_else(|| config.fixed()) {
            return Locator::Fixed(Some(point));
        }
        if cli_geolocate || config.geolocate {
            match IpLocator::new() {
                Ok(locator) => return Locator::Ip(locator),
                Err(e) => warn!(error = %e, "Cannot build geolocation client"),
            }
        }
        debug!("No location source configured");
        Locator::Fixed(None)
    }
}

/// Runs `provider` in the background; the receiver yields its answer.
pub fn spawn_lookup<P>(provider: P) -> oneshot::Receiver<Option<GeoPoint>>
where
    P: LocationProvider + Send + Sync + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let point = provider.locate().await;
        let _ = tx.send(point);
    });
    rx
}

fn point_from(latitude: Option<f64>, longitude: Option<f64>) -> Option<GeoPoint> {
    Some(GeoPoint {
        latitude: latitude?,
        longitude: longitude?,
    })
}

/// Parses `LAT,LON` in decimal degrees.
pub fn parse_location(s: &str) -> Result<GeoPoint, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got {:?}", s))?;
    let latitude: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude: {:?}", lat.trim()))?;
    let longitude: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude: {:?}", lon.trim()))?;

    if !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("latitude out of range: {}", latitude));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("longitude out of range: {}", longitude));
    }
    Ok(GeoPoint {
        latitude,
        longitude,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_coordinates() {
        assert_eq!(
            parse_location("48.8566, 2.3522").unwrap(),
            GeoPoint {
                latitude: 48.8566,
                longitude: 2.3522
            }
        );
        assert!(parse_location("48.8566").is_err());
        assert!(parse_location("north,2").is_err());
        assert!(parse_location("91,0").is_err());
        assert!(parse_location("0,-181").is_err());
    }

    #[test]
    fn explicit_location_wins() {
        let config = LocationConfig {
            latitude: Some(1.0),
            longitude: Some(2.0),
            geolocate: true,
        };
        let cli = GeoPoint {
            latitude: 3.0,
            longitude: 4.0,
        };
        assert!(matches!(
            Locator::resolve(Some(cli), true, &config),
            Locator::Fixed(Some(p)) if p == cli
        ));
        assert!(matches!(
            Locator::resolve(None, false, &config),
            Locator::Fixed(Some(p)) if p.latitude == 1.0
        ));
        assert!(matches!(
            Locator::resolve(None, false, &LocationConfig::default()),
            Locator::Fixed(None)
        ));
    }

    #[test]
    fn lookup_reply_needs_both_coordinates() {
        assert!(point_from(Some(1.0), None).is_none());
        assert!(point_from(Some(1.0), Some(2.0)).is_some());
    }

    #[tokio::test]
    async fn fixed_lookup_resolves_in_background() {
        let point = GeoPoint {
            latitude: 10.0,
            longitude: 20.0,
        };
        let rx = spawn_lookup(Locator::Fixed(Some(point)));
        assert_eq!(rx.await.unwrap(), Some(point));
    }
}
