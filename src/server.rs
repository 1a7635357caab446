//! Reusable CPO Client API runtime.
//!
//! Provides [`CpoClientRuntime`], which turns an [`AppConfig`] and a business
//! handler into a ready [`CpoClientApi`]: it declares the four operations,
//! wires the default console/disk sinks, the optional server-push stream and
//! network sink, and any extra sinks, then freezes the dispatcher.
//!
//! The HTTP transport is not part of this crate; it holds a clone of
//! [`CpoClientRuntime::api`] and calls into it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::events::{
    create_event_bus, Direction, EventDispatcher, EventDispatcherBuilder, EventSubscriber, OperationHandle,
    SharedEventBus, ALL_TAG,
};
use crate::application::{
    AuditSink, AuditTransport, CpoClientApi, CpoOperations, OperationPipeline, RemoteAuthorizationHandler,
};
use crate::config::AppConfig;
use crate::domain::ConfigurationError;
use crate::infrastructure::sinks::{default_sinks, NetworkSink, NetworkSinkStats, ServerPushSink};

const BOTH_DIRECTIONS: [Direction; 2] = [Direction::Request, Direction::Response];

const PUSH_SINK_LABEL: &str = "push";
const NETWORK_SINK_LABEL: &str = "network";

/// How long [`CpoClientRuntime::shutdown`] waits for the network sink to drain.
const NETWORK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ── Options ────────────────────────────────────────────────────────

/// A sink supplied by the embedding application.
pub struct ExtraSink {
    pub label: String,
    /// Operation names to attach to; empty means every operation.
    pub operations: Vec<String>,
    /// `None` attaches to both directions.
    pub direction: Option<Direction>,
    pub tags: Vec<String>,
    pub sink: Arc<dyn AuditSink>,
}

impl ExtraSink {
    /// Attach `sink` to every operation and direction with the `all` tag.
    pub fn everywhere(label: impl Into<String>, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            label: label.into(),
            operations: Vec::new(),
            direction: None,
            tags: vec![ALL_TAG.to_string()],
            sink,
        }
    }

    fn applies_to(&self, operation: &str) -> bool {
        self.operations.is_empty() || self.operations.iter().any(|op| op == operation)
    }

    fn directions(&self) -> Vec<Direction> {
        match self.direction {
            Some(direction) => vec![direction],
            None => BOTH_DIRECTIONS.to_vec(),
        }
    }
}

/// Options for starting the CPO Client API runtime.
pub struct RuntimeOptions {
    pub config: AppConfig,
    pub handler: Arc<dyn RemoteAuthorizationHandler>,
    /// Enables the network sink when set.
    pub network_transport: Option<Arc<dyn AuditTransport>>,
    pub extra_sinks: Vec<ExtraSink>,
}

impl RuntimeOptions {
    pub fn new(config: AppConfig, handler: Arc<dyn RemoteAuthorizationHandler>) -> Self {
        Self {
            config,
            handler,
            network_transport: None,
            extra_sinks: Vec::new(),
        }
    }
}

// ── CpoClientRuntime ───────────────────────────────────────────────

pub struct CpoClientRuntime {
    api: CpoClientApi,
    dispatcher: Arc<EventDispatcher>,
    event_bus: Option<SharedEventBus>,
    network: Option<(Arc<NetworkSinkStats>, JoinHandle<()>)>,
    config: AppConfig,
}

impl CpoClientRuntime {
    /// Build the dispatcher and the API from `opts`.
    ///
    /// Nothing here awaits. With a network transport it spawns the delivery
    /// worker, so it must then be called inside a tokio runtime.
    pub fn start(opts: RuntimeOptions) -> Result<Self, ConfigurationError> {
        let RuntimeOptions {
            config,
            handler,
            network_transport,
            extra_sinks,
        } = opts;
        let audit = &config.audit;

        info!(context = %audit.context, log_dir = %audit.log_dir.display(), "Starting CPO Client API runtime");

        let mut builder = EventDispatcher::builder();
        let operations = CpoOperations::register(&mut builder)?;

        let defaults = default_sinks(audit)?;

        let event_bus = audit.push.enabled.then(|| create_event_bus(audit.push.capacity));
        let push_sink: Option<Arc<dyn AuditSink>> = event_bus
            .as_ref()
            .map(|bus| Arc::new(ServerPushSink::new(bus.clone())) as Arc<dyn AuditSink>);

        let mut network = None;
        let mut network_sink: Option<Arc<dyn AuditSink>> = None;
        if let Some(transport) = network_transport {
            let (sink, worker) = NetworkSink::spawn(transport, &audit.network);
            network = Some((sink.stats(), worker));
            network_sink = Some(Arc::new(sink));
        }

        let wiring = SinkWiring {
            config: &config,
            defaults: &defaults,
            push: push_sink.as_ref(),
            network: network_sink.as_ref(),
            extras: &extra_sinks,
        };
        wiring.attach(&mut builder, &operations.remote_start)?;
        wiring.attach(&mut builder, &operations.remote_stop)?;
        wiring.attach(&mut builder, &operations.reservation_start)?;
        wiring.attach(&mut builder, &operations.reservation_stop)?;

        let dispatcher = Arc::new(builder.build());
        let pipeline = Arc::new(OperationPipeline::new(dispatcher.clone(), audit.handler_timeout()));
        let api = CpoClientApi::new(pipeline, handler, operations);

        info!(
            handler_timeout_ms = audit.handler_timeout_ms,
            push = event_bus.is_some(),
            network = network.is_some(),
            "CPO Client API runtime ready"
        );

        Ok(Self {
            api,
            dispatcher,
            event_bus,
            network,
            config,
        })
    }

    /// The API facade; clone it into the transport.
    pub fn api(&self) -> &CpoClientApi {
        &self.api
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Subscribe to the server-push stream, if enabled.
    pub fn subscribe(&self) -> Option<EventSubscriber> {
        self.event_bus.as_ref().map(|bus| bus.subscribe())
    }

    pub fn event_bus(&self) -> Option<&SharedEventBus> {
        self.event_bus.as_ref()
    }

    pub fn network_stats(&self) -> Option<Arc<NetworkSinkStats>> {
        self.network.as_ref().map(|(stats, _)| stats.clone())
    }

    /// Drop the API and give the network sink time to drain.
    ///
    /// Clones of the API still held elsewhere keep the network queue open;
    /// the drain is then cut off after a bounded wait.
    pub async fn shutdown(self) {
        let Self {
            api,
            dispatcher,
            network,
            ..
        } = self;
        drop(api);
        drop(dispatcher);

        if let Some((stats, worker)) = network {
            match tokio::time::timeout(NETWORK_DRAIN_TIMEOUT, worker).await {
                Ok(_) => info!(
                    delivered = stats.delivered(),
                    dropped = stats.dropped_overflow() + stats.dropped_delivery(),
                    "Network audit sink drained"
                ),
                Err(_) => warn!("Network audit sink did not drain in time"),
            }
        }
        info!("CPO Client API runtime stopped");
    }
}

struct SinkWiring<'a> {
    config: &'a AppConfig,
    defaults: &'a [(&'static str, Arc<dyn AuditSink>)],
    push: Option<&'a Arc<dyn AuditSink>>,
    network: Option<&'a Arc<dyn AuditSink>>,
    extras: &'a [ExtraSink],
}

impl SinkWiring<'_> {
    fn attach<Req, Res>(
        &self,
        builder: &mut EventDispatcherBuilder,
        handle: &OperationHandle<Req, Res>,
    ) -> Result<(), ConfigurationError> {
        let name = handle.name();

        if self.config.audit.wants_default_sinks(name) {
            for (label, sink) in self.defaults {
                for direction in BOTH_DIRECTIONS {
                    builder.add_shared_sink(handle, direction, *label, [ALL_TAG], sink.clone())?;
                }
            }
        } else {
            debug!(operation = name, "No default sinks for operation");
        }

        let shared = [(PUSH_SINK_LABEL, self.push), (NETWORK_SINK_LABEL, self.network)];
        for (label, sink) in shared {
            if let Some(sink) = sink {
                for direction in BOTH_DIRECTIONS {
                    builder.add_shared_sink(handle, direction, label, [ALL_TAG], sink.clone())?;
                }
            }
        }

        for extra in self.extras.iter().filter(|e| e.applies_to(name)) {
            for direction in extra.directions() {
                builder.add_shared_sink(
                    handle,
                    direction,
                    extra.label.as_str(),
                    extra.tags.iter().map(String::as_str),
                    extra.sink.clone(),
                )?;
            }
        }
        Ok(())
    }
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup. A subscriber installed earlier (by the
/// embedding application or a test harness) is left in place.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let installed = match config.logging.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    };
    if installed.is_err() {
        debug!("Tracing subscriber already installed");
    }
}
