//! Session context tying the ledger, registry and connections together.

use crate::connection::{Connection, Connections};
use crate::message::MessageHandle;
use crate::record_types::RecordTypeRegistry;
use crate::records::{LedgerConfig, Record, RecordLedger};
use crate::source::RecordSource;
use crate::subscriptions::SubscriptionHandle;
use crate::views::FilteredLedgerView;
use std::sync::Arc;
use tracing::info;

/// Session configuration.
#[derive(Clone, Debug)]
pub struct SnoopConfig {
    /// Keep at most this many records (oldest evicted first).
    pub record_limit: Option<usize>,

    /// Populate the registry with the built-in starter types.
    pub starter_types: bool,

    /// Buffer size for channel subscriptions opened through the context.
    pub channel_buffer_size: usize,
}

impl Default for SnoopConfig {
    fn default() -> Self {
        Self {
            record_limit: None,
            starter_types: true,
            channel_buffer_size: 1024,
        }
    }
}

/// Owns everything one snooping session shares.
///
/// Components that need the ledger or registry are handed them from
/// here rather than reaching for process-wide instances.
pub struct SnoopContext {
    config: SnoopConfig,
    ledger: Arc<RecordLedger>,
    registry: Arc<RecordTypeRegistry>,
    connections: Arc<Connections>,
}

impl SnoopContext {
    pub fn new(config: SnoopConfig) -> Self {
        let ledger = Arc::new(RecordLedger::with_config(LedgerConfig {
            record_limit: config.record_limit,
        }));
        let registry = if config.starter_types {
            RecordTypeRegistry::with_starter_types()
        } else {
            RecordTypeRegistry::new()
        };
        info!(
            record_limit = ?config.record_limit,
            types = registry.len(),
            "created snoop context"
        );
        Self {
            config,
            ledger,
            registry,
            connections: Arc::new(Connections::new()),
        }
    }

    pub fn config(&self) -> &SnoopConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<RecordLedger> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<RecordTypeRegistry> {
        &self.registry
    }

    pub fn connections(&self) -> &Arc<Connections> {
        &self.connections
    }

    /// A new filtered view over the session ledger.
    pub fn filtered_view(&self, auto_selected_only: bool) -> Arc<FilteredLedgerView> {
        FilteredLedgerView::new(
            Arc::clone(&self.ledger) as Arc<dyn RecordSource>,
            Arc::clone(&self.registry),
            auto_selected_only,
        )
    }

    /// Channel subscription to the ledger using the configured buffer size.
    pub fn subscribe_ledger(&self) -> SubscriptionHandle {
        self.ledger.subscribe_channel(self.config.channel_buffer_size)
    }

    /// Record a message from `connection`. Returns `None` if the
    /// connection is not started.
    pub fn deliver(
        &self,
        connection: &Arc<Connection>,
        message: Arc<dyn MessageHandle>,
    ) -> Option<Record> {
        connection.deliver(&self.ledger, message, None)
    }
}

impl Default for SnoopContext {
    fn default() -> Self {
        Self::new(SnoopConfig::default())
    }
}
