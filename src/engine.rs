//! Top-level wiring: owns the Store and all in-memory state, and exposes the
//! two entry points a transport integration drives — one message at a time
//! in from the bus, one `get_values` request at a time in from RPC.

use crate::config::GroupConfig;
use crate::error::EngineError;
use crate::ingestor::{self, GroupRuntime};
use crate::query::{self, GetValuesRequest, GetValuesResponse, QueryError};
use crate::rate_gate::{Clock, RateGate, SystemClock};
use crate::registry::Registry;
use crate::retention::RetentionCounters;
use crate::store::Store;
use crate::transport::{MessageBus, RpcRegistrar};

pub struct Engine {
    store: Store,
    registry: Registry,
    rate_gate: RateGate,
    counters: RetentionCounters,
    groups: Vec<GroupRuntime>,
    clock: Box<dyn Clock + Send + Sync>,
}

impl Engine {
    /// Open the database, load the Identifier Registry and Retention
    /// Counters from it, and resolve every configured group to an id,
    /// creating rows for groups seen for the first time.
    pub fn open(database_path: &str, groups: Vec<GroupConfig>) -> Result<Self, EngineError> {
        let store = Store::open(database_path)?;
        let counters = RetentionCounters::load(&store)?;
        let group_names: Vec<String> = groups.iter().map(|g| g.name.clone()).collect();
        let (registry, group_ids) = Registry::load(&store, &group_names)?;

        let groups = groups
            .into_iter()
            .map(|config| {
                let id = group_ids[&config.name];
                GroupRuntime { config, id }
            })
            .collect();

        Ok(Self {
            store,
            registry,
            rate_gate: RateGate::new(),
            counters,
            groups,
            clock: Box::new(SystemClock),
        })
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Second-phase initialization: subscribe every configured group's
    /// patterns on the bus and register the `get_values` RPC method. Kept
    /// separate from `open` so construction never depends on a transport
    /// being ready yet.
    pub fn start(&self, bus: &mut dyn MessageBus, rpc: &mut dyn RpcRegistrar) -> anyhow::Result<()> {
        for group in &self.groups {
            for pattern in &group.config.patterns {
                bus.subscribe(pattern)?;
            }
        }
        rpc.register("db_logger", "history", "get_values");
        Ok(())
    }

    /// Handle one incoming bus message.
    pub fn on_message(&mut self, topic: &str, payload: &str) -> Result<(), EngineError> {
        ingestor::ingest(
            &self.store,
            &self.groups,
            &mut self.registry,
            &mut self.rate_gate,
            &mut self.counters,
            self.clock.as_ref(),
            topic,
            payload,
        )
    }

    /// Handle one `history/get_values` RPC request.
    pub fn handle_get_values(&mut self, request: &GetValuesRequest) -> Result<GetValuesResponse, QueryError> {
        query::handle_get_values(&self.store, &mut self.registry, request)
    }
}
