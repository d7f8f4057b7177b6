use futures::{stream::FuturesUnordered, FutureExt, StreamExt};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    config::MapConfig,
    fetch::{with_timeout, AssetFetcher, FetchError},
    layers::{LayerConfigurator, LayerSetup, MapEngine, PartnerRegistration, RegistrationError},
    location::LngLat,
    marker::{MarkerError, MarkerSession},
    partner::group_by_partner,
    popup::{ClickEvent, Popup, PopupBuilder},
    station::{StationFeature, Stations},
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not fetch stations: {0}")]
    Fetch(#[from] FetchError),
    #[error("could not parse stations: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

enum PartnerOutcome {
    Registered(Result<PartnerRegistration, RegistrationError>),
    Failed(MarkerError),
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub stations_read: usize,
    pub stations_dropped: usize,
    /// Partners in the order they first appear in the feed. The other fields
    /// follow the same order, whatever order the engine saw.
    pub partners: Vec<String>,
    pub failed: IndexMap<String, MarkerError>,
    pub setup: LayerSetup,
}

/// Loads stations, composites a marker per partner and registers everything
/// with a map engine
pub struct StationMap<F> {
    fetcher: F,
    config: MapConfig,
    session: MarkerSession<F>,
    features: Vec<StationFeature>,
}

impl<F: AssetFetcher + Clone + 'static> StationMap<F> {
    pub fn new(fetcher: F, config: MapConfig) -> Self {
        let session = MarkerSession::new(fetcher.clone(), &config);
        StationMap {
            fetcher,
            config,
            session,
            features: Vec::new(),
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Features placed on the map by the last load
    pub fn features(&self) -> &[StationFeature] {
        &self.features
    }

    /// Fetches the stations feed and loads it
    pub async fn load<E: MapEngine>(&mut self, engine: &mut E) -> Result<LoadReport, PipelineError> {
        let url = &self.config.stations_url;
        let timeout = self.config.asset_timeout();
        let raw_data = with_timeout(&self.fetcher, url, timeout, self.fetcher.fetch_text(url)).await?;
        let stations = Stations::from_raw_data(&raw_data)?;
        self.load_stations(&stations, engine).await
    }

    pub async fn load_stations<E: MapEngine>(
        &mut self,
        stations: &Stations,
        engine: &mut E,
    ) -> Result<LoadReport, PipelineError> {
        let features = stations.normalize();
        let groups = group_by_partner(&features);
        let partners: Vec<&str> = groups.partners().collect();

        // The base marker is loaded once, before any partner is composited
        if let Err(e) = self.session.ready().await {
            warn!(url = %self.config.marker_url, error = %e, "base marker failed to load");
        }

        let configurator = LayerConfigurator::new(&self.config);
        let mut outcomes: IndexMap<&str, Option<PartnerOutcome>> =
            partners.iter().map(|&partner| (partner, None)).collect();

        // Each partner is registered as soon as its marker is ready, so a slow
        // partner never holds back the others
        let mut pending: FuturesUnordered<_> = partners
            .iter()
            .map(|&partner| {
                self.session
                    .composite(partner)
                    .map(move |result| (partner, result))
            })
            .collect();

        while let Some((partner, result)) = pending.next().await {
            let outcome = match result {
                Ok(marker) => {
                    let group = groups.get(partner).unwrap_or_default();
                    PartnerOutcome::Registered(configurator.register(engine, partner, group, &marker))
                }
                Err(e) => {
                    warn!(partner, error = %e, "marker composition failed");
                    PartnerOutcome::Failed(e)
                }
            };
            outcomes.insert(partner, Some(outcome));
        }
        drop(pending);

        let mut setup = LayerSetup::default();
        let mut failed = IndexMap::new();
        let mut registered = Vec::new();
        for (partner, outcome) in outcomes {
            match outcome {
                Some(PartnerOutcome::Registered(Ok(registration))) => {
                    registered.push(partner);
                    setup.record(registration);
                }
                Some(PartnerOutcome::Registered(Err(e))) => {
                    warn!(partner, error = %e, "skipping partner, registration failed");
                    setup.skipped.insert(partner.to_string(), e);
                }
                Some(PartnerOutcome::Failed(e)) => {
                    failed.insert(partner.to_string(), e);
                }
                None => {}
            }
        }

        configurator.finish(engine, &features, registered, &mut setup)?;

        let report = LoadReport {
            stations_read: stations.stations.len(),
            stations_dropped: stations.stations.len() - features.len(),
            partners: partners.iter().map(|p| p.to_string()).collect(),
            failed,
            setup,
        };

        info!(
            stations = features.len(),
            dropped = report.stations_dropped,
            partners = report.partners.len(),
            failed = report.failed.len(),
            "station map loaded"
        );

        self.features = features;
        Ok(report)
    }

    pub fn popup(&self, event: &ClickEvent, reference: Option<LngLat>) -> Option<Popup> {
        PopupBuilder::new(&self.config).build(event, reference)
    }
}
