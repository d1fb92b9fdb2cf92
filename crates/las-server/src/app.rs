//! Process composition: builds the collaborators and runs the long-lived
//! tasks under one shutdown token.

use crate::config::{AppConfig, HedgeMode};
use crate::error::{AppError, AppResult};
use las_api::AppState;
use las_channel::{ChannelLedger, HttpPeerConnector, LndRestLedger, PeerConnector};
use las_engine::{
    ContractService, InvoiceDesk, PriceUpdater, RebalanceEngine, RebalanceExchange,
    SettlementCorrelator,
};
use las_feed::{BitmexFeed, PriceFeed, PriceTable};
use las_hedge::{HedgeController, HedgeVenue, PaperVenue};
use las_store::{ContractLocks, ContractRegistry, Ledger, PaymentLog, SledLedger};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Buffered ticks between the feed and the price updater.
const PRICE_CHANNEL_CAPACITY: usize = 256;

/// External collaborators the application is built on.
pub struct Components {
    pub storage: Arc<dyn Ledger>,
    pub channel: Arc<dyn ChannelLedger>,
    pub peers: Arc<dyn PeerConnector>,
    pub venue: Arc<dyn HedgeVenue>,
    pub feed: Arc<dyn PriceFeed>,
}

impl Components {
    /// Production collaborators described by `config`.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let data_path = config.storage.data_path();
        info!(path = %data_path.display(), "Opening storage");
        let storage = Arc::new(SledLedger::open(&data_path)?);

        let lnd = config.lnd_config();
        if lnd.macaroon_hex.is_none() {
            warn!("LND_MACAROON_HEX not set, node calls are unauthenticated");
        }
        let channel = Arc::new(LndRestLedger::new(lnd)?);
        let peers = Arc::new(HttpPeerConnector::new(
            config.peer.scheme.clone(),
            config.external.call_timeout(),
        )?);
        let venue: Arc<dyn HedgeVenue> = match config.hedge.mode {
            HedgeMode::Paper => Arc::new(PaperVenue::new()),
        };
        let feed = Arc::new(BitmexFeed::new(config.feed_config()));

        Ok(Self {
            storage,
            channel,
            peers,
            venue,
            feed,
        })
    }
}

pub struct Application {
    config: AppConfig,
    registry: ContractRegistry,
    feed: Arc<dyn PriceFeed>,
    engine: Arc<RebalanceEngine>,
    correlator: Arc<SettlementCorrelator>,
    updater: Arc<PriceUpdater>,
    service: Arc<ContractService>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let components = Components::from_config(&config)?;
        Self::with_components(config, components)
    }

    pub fn with_components(config: AppConfig, components: Components) -> AppResult<Self> {
        config.validate()?;
        let call_timeout = config.external.call_timeout();

        let registry = ContractRegistry::new(components.storage.clone());
        let payments = PaymentLog::new(components.storage);
        let locks = ContractLocks::new();
        let prices = Arc::new(PriceTable::new(
            config.assets.reference.clone(),
            config.assets.cross_rates.clone(),
        )?);
        info!(
            reference = %config.assets.reference,
            assets = ?prices.supported_assets(),
            "Price table configured"
        );

        let hedge = Arc::new(HedgeController::new(
            components.venue,
            prices.clone(),
            call_timeout,
        ));
        let desk = Arc::new(InvoiceDesk::new(
            components.channel.clone(),
            payments,
            call_timeout,
        ));
        let engine = Arc::new(RebalanceEngine::new(
            registry.clone(),
            prices.clone(),
            hedge.clone(),
            RebalanceExchange::new(desk.clone(), components.peers),
            locks.clone(),
            config.rebalance.staleness_timeout(),
        ));
        let correlator = Arc::new(SettlementCorrelator::new(
            registry.clone(),
            hedge.clone(),
            locks.clone(),
            components.channel,
            config.reconnect.clone(),
        ));
        let updater = Arc::new(PriceUpdater::new(prices.clone(), engine.clone()));
        let service = Arc::new(ContractService::new(
            registry.clone(),
            prices,
            hedge,
            desk,
            engine.clone(),
            locks,
            config.server.percent_margin,
        ));

        Ok(Self {
            config,
            registry,
            feed: components.feed,
            engine,
            correlator,
            updater,
            service,
        })
    }

    pub fn service(&self) -> Arc<ContractService> {
        self.service.clone()
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            token.cancel();
        });
        self.run_until(shutdown).await
    }

    /// Run every task until `shutdown` is cancelled, then flush storage.
    ///
    /// A task that gives up (settlement stream, price feed or API server)
    /// cancels `shutdown` and its error is returned.
    pub async fn run_until(self, shutdown: CancellationToken) -> AppResult<()> {
        info!(open_contracts = self.registry.count()?, "Starting application");
        let mut tasks: JoinSet<AppResult<()>> = JoinSet::new();

        let correlator = self.correlator.clone();
        let token = shutdown.clone();
        tasks.spawn(async move {
            let result = correlator.run(token.clone()).await;
            cancel_on_error(result.map_err(AppError::from), &token)
        });

        let (tick_tx, tick_rx) = mpsc::channel(PRICE_CHANNEL_CAPACITY);
        let feed = self.feed.clone();
        let token = shutdown.clone();
        tasks.spawn(async move {
            let result = feed.run(tick_tx, token.clone()).await;
            cancel_on_error(result.map_err(AppError::from), &token)
        });

        let updater = self.updater.clone();
        let token = shutdown.clone();
        tasks.spawn(async move {
            updater.run(tick_rx, token).await;
            Ok(())
        });

        match self.config.rebalance.sweep_interval() {
            Some(interval) => {
                let engine = self.engine.clone();
                let token = shutdown.clone();
                tasks.spawn(async move {
                    engine.run_periodic(interval, token).await;
                    Ok(())
                });
            }
            None => info!("Periodic sweep disabled"),
        }

        if self.config.api.enabled {
            let state = AppState::new(self.service.clone());
            let api_config = self.config.api.clone();
            let token = shutdown.clone();
            tasks.spawn(async move {
                let result = las_api::run_server(state, api_config, token.clone()).await;
                cancel_on_error(result.map_err(AppError::from), &token)
            });
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Task failed, shutting down");
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "Task panicked, shutting down");
                    shutdown.cancel();
                }
            }
        }

        info!(pending_write_backs = self.engine.pending_write_backs(), "Shutting down");
        self.registry.flush()?;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn cancel_on_error(result: AppResult<()>, shutdown: &CancellationToken) -> AppResult<()> {
    if result.is_err() {
        shutdown.cancel();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_from_config_opens_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().join("db").display().to_string();

        let components = Components::from_config(&config).unwrap();
        let registry = ContractRegistry::new(components.storage);

        assert_eq!(registry.count().unwrap(), 0);
        assert!(dir.path().join("db").exists());
    }

    #[test]
    fn test_cancel_on_error() {
        let token = CancellationToken::new();
        assert!(cancel_on_error(Ok(()), &token).is_ok());
        assert!(!token.is_cancelled());

        let failed = cancel_on_error(Err(AppError::Config("x".to_string())), &token);
        assert!(failed.is_err());
        assert!(token.is_cancelled());
    }
}
