//! Service wiring shared by the CLI and the HTTP server

use std::sync::Arc;

use tracing::info;

use crate::cache::RouteCache;
use crate::companion::{CompanionSettings, TravelCompanion};
use crate::config::CompanionConfig;
use crate::offline::{LocalOfflineGate, OfflineGate};
use crate::oracles::{
    ChatCompletionsClient, ConversationOracle, PlaceLookupOracle, PlacesClient, RoutingOracle,
};
use crate::routing::{GraphHopperClient, RoutingOracleAdapter};
use crate::verifier::RecommendationVerifier;
use crate::waypoints::WaypointSequencer;
use crate::Result;

pub struct App {
    pub companion: TravelCompanion,
    pub routing: Arc<RoutingOracleAdapter>,
    pub sequencer: WaypointSequencer,
    pub gate: Arc<LocalOfflineGate>,
}

impl App {
    /// Builds the HTTP oracle clients from the configuration. Fails with a
    /// configuration error when an API key is missing.
    pub fn from_config(config: &CompanionConfig) -> Result<Self> {
        let chat: Arc<dyn ConversationOracle> =
            Arc::new(ChatCompletionsClient::new(&config.chat)?);
        let places: Arc<dyn PlaceLookupOracle> = Arc::new(PlacesClient::new(&config.places)?);
        let router: Arc<dyn RoutingOracle> = Arc::new(GraphHopperClient::new(&config.routing)?);

        let directory = config.cache.directory();
        info!("Opening route cache at {}", directory.display());
        let cache = RouteCache::open(&directory, config.cache.precision)?;
        let gate = Arc::new(LocalOfflineGate::new(cache, config.cache.route_ttl()));

        Ok(Self::assemble(
            chat,
            places,
            router,
            gate,
            &CompanionSettings::from_config(config),
            config.routing.timeout(),
        ))
    }

    pub fn assemble(
        chat: Arc<dyn ConversationOracle>,
        places: Arc<dyn PlaceLookupOracle>,
        router: Arc<dyn RoutingOracle>,
        gate: Arc<LocalOfflineGate>,
        settings: &CompanionSettings,
        routing_timeout: std::time::Duration,
    ) -> Self {
        let shared_gate: Arc<dyn OfflineGate> = gate.clone();
        let routing = Arc::new(RoutingOracleAdapter::new(
            router,
            shared_gate.clone(),
            routing_timeout,
        ));
        let verifier = RecommendationVerifier::new(
            places,
            chat.clone(),
            routing.clone(),
            settings.verifier.clone(),
        );
        let companion = TravelCompanion::new(
            chat,
            shared_gate,
            verifier,
            settings.history_limit,
            settings.chat_timeout,
        );

        Self {
            companion,
            sequencer: WaypointSequencer::new(routing.clone()),
            routing,
            gate,
        }
    }
}
