use std::thread;

use tracing::info;
use uuid::Uuid;

use caixa_core::{ConsumeReport, MessageBox};

use crate::config::RouteConfig;
use crate::connector::Connector;
use crate::error::{ConnectorError, TransportError};
use crate::registry::ConnectorRegistry;
use crate::sink_runner::SinkRunner;
use crate::source_runner::SourceRunner;

/// Result of one transport run.
#[derive(Debug)]
pub struct TransportSummary {
    /// Ids of every message the source debatched, in row order.
    pub message_ids: Vec<Uuid>,
    /// Per-destination totals, in route order.
    pub sinks: Vec<(String, ConsumeReport)>,
}

/// Execute a route once: set up destination structures, debatch the source,
/// register the full fan-out, then drain every destination concurrently.
///
/// All initialization (connector resolution from the registry, schema
/// propagation, subscription registration) happens here up front, so no runner
/// carries process-wide setup state of its own.
pub fn run_route(
    mbox: &MessageBox,
    route: &RouteConfig,
    registry: &ConnectorRegistry,
) -> Result<TransportSummary, TransportError> {
    let mut source = registry.resolve(&route.source)?;
    let mut destinations: Vec<(String, Box<dyn Connector>)> = route
        .destinations
        .iter()
        .map(|decl| Ok((decl.name.clone(), registry.resolve(decl)?)))
        .collect::<Result<_, ConnectorError>>()?;

    // Propagate the source's shape to every destination before any record moves.
    let schema = source.get_schema()?;
    for (_, connector) in &mut destinations {
        connector.ensure_destination_structure(&schema)?;
    }

    let producer = SourceRunner::new(route.source.name.as_str(), route.batch_size);
    let message_ids = producer.run(mbox, &route.interface, source.as_mut())?;

    // Register every destination's claim before any of them consumes, so
    // garbage collection is gated on the whole fan-out.
    for id in &message_ids {
        for (name, _) in &destinations {
            mbox.subscriptions()
                .subscribe(id, &route.interface, name)?;
        }
    }

    let poll_interval = route.poll_interval();
    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = destinations
            .into_iter()
            .map(|(name, connector)| {
                let mut runner =
                    SinkRunner::new(name.clone(), route.interface.as_str(), connector);
                let handle = scope.spawn(move || runner.drain(mbox, poll_interval));
                (name, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(name, handle)| (name, handle.join()))
            .collect::<Vec<_>>()
    });

    let mut sinks = Vec::with_capacity(outcomes.len());
    for (subscriber, joined) in outcomes {
        match joined {
            Ok(Ok(report)) => sinks.push((subscriber, report)),
            Ok(Err(source)) => return Err(TransportError::Sink { subscriber, source }),
            Err(_) => return Err(TransportError::SinkPanicked { subscriber }),
        }
    }

    info!(
        interface = %route.interface,
        messages = message_ids.len(),
        destinations = sinks.len(),
        "transport run complete"
    );
    Ok(TransportSummary { message_ids, sinks })
}
