//! Concurrent fan-out with positional join.

use mesh_telemetry::GATEWAY_AGGREGATES;
use parking_lot::Mutex;
use pm_02_rpc_client::RpcClient;
use shared_types::{
    AggregatedResult, ConfigurationError, EndpointProvider, Request, RpcError, ServiceIdentity,
    TimedResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use crate::{GatewayConfig, GatewayError, ServiceFailure};

/// Outcome of one sub-call in settled mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOutcome {
    pub service: String,
    pub result: Result<TimedResult, RpcError>,
}

impl ServiceOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Slots of one fan-out, indexed by request position.
struct FanOut {
    slots: Vec<Option<Result<TimedResult, RpcError>>>,
    deadline_hit: bool,
}

/// Fans calls out to backend services and joins the answers.
///
/// One `RpcClient` is kept per service identity. Identities passed at
/// construction are resolved eagerly; others are resolved on first use and
/// cached.
pub struct GatewayAggregator {
    services: Vec<ServiceIdentity>,
    provider: Arc<dyn EndpointProvider>,
    config: GatewayConfig,
    clients: Mutex<HashMap<ServiceIdentity, Arc<RpcClient>>>,
}

impl GatewayAggregator {
    /// Resolve every identity and build its client. Fails on the first
    /// configuration problem, before any network activity.
    pub fn new(
        services: Vec<ServiceIdentity>,
        provider: Arc<dyn EndpointProvider>,
        config: GatewayConfig,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let mut names = HashSet::with_capacity(services.len());
        let mut clients = HashMap::with_capacity(services.len());
        for identity in &services {
            if !names.insert(identity.name.as_str()) {
                return Err(ConfigurationError::Invalid(format!(
                    "service {} configured more than once",
                    identity.name
                ))
                .into());
            }
            let endpoint = provider.endpoint_for(identity)?;
            info!(service = %identity.name, endpoint = %endpoint, "Registered backend service");
            clients.insert(
                identity.clone(),
                Arc::new(RpcClient::new(&identity.name, endpoint, config.client.clone())),
            );
        }

        Ok(Self {
            services,
            provider,
            config,
            clients: Mutex::new(clients),
        })
    }

    /// Identities registered at construction, in configured order.
    pub fn services(&self) -> &[ServiceIdentity] {
        &self.services
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Registered identity named `name`.
    pub fn identity(&self, name: &str) -> Option<&ServiceIdentity> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Client for a registered service.
    pub fn client(&self, name: &str) -> Option<Arc<RpcClient>> {
        let identity = self.identity(name)?;
        self.clients.lock().get(identity).cloned()
    }

    /// Ping every service in `services`; see [`call_all`](Self::call_all).
    pub async fn ping_all(&self, services: &[ServiceIdentity]) -> Result<AggregatedResult, GatewayError> {
        self.call_all(services, Request::ping()).await
    }

    /// Ping every registered service.
    pub async fn ping_all_registered(&self) -> Result<AggregatedResult, GatewayError> {
        self.ping_all(&self.services).await
    }

    /// Ping registered services by name.
    pub async fn ping_all_named<S: AsRef<str>>(&self, names: &[S]) -> Result<AggregatedResult, GatewayError> {
        let services = self.identities_named(names)?;
        self.ping_all(&services).await
    }

    /// Ping a single registered service.
    pub async fn ping_one(&self, name: &str) -> Result<TimedResult, GatewayError> {
        let identity = self
            .identity(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownService(name.to_string()))?;

        let mut entries = self.ping_all(&[identity]).await?.into_entries();
        match entries.pop() {
            Some((_, result)) => Ok(result),
            None => Err(GatewayError::UnknownService(name.to_string())),
        }
    }

    /// Send `request` to every service at once and wait for all of them.
    ///
    /// Entry `i` of the result belongs to `services[i]`. Any failed sub-call
    /// fails the aggregate with every failure listed. An empty input returns
    /// an empty result without touching the network.
    pub async fn call_all(
        &self,
        services: &[ServiceIdentity],
        request: Request,
    ) -> Result<AggregatedResult, GatewayError> {
        let started = Instant::now();
        let fan_out = self.fan_out(services, request).await?;

        let result = if fan_out.deadline_hit {
            Err(GatewayError::AggregateTimeout {
                pending: pending_names(services, &fan_out.slots),
                deadline_ms: self.deadline_ms(),
            })
        } else {
            assemble(services, fan_out.slots)
        };

        match &result {
            Ok(aggregate) => {
                GATEWAY_AGGREGATES.with_label_values(&["complete"]).inc();
                debug!(
                    services = aggregate.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Aggregate complete"
                );
            }
            Err(e) => {
                GATEWAY_AGGREGATES.with_label_values(&[e.outcome_label()]).inc();
                warn!(
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Aggregate failed"
                );
            }
        }
        result
    }

    /// Like `ping_all`, but reports each service's own outcome instead of
    /// failing the aggregate. Sub-calls still pending at the deadline are
    /// reported as timed out.
    pub async fn ping_all_settled(
        &self,
        services: &[ServiceIdentity],
    ) -> Result<Vec<ServiceOutcome>, GatewayError> {
        let fan_out = self.fan_out(services, Request::ping()).await?;
        let deadline_ms = self.deadline_ms();

        let outcomes: Vec<ServiceOutcome> = services
            .iter()
            .zip(fan_out.slots)
            .map(|(identity, slot)| ServiceOutcome {
                service: identity.name.clone(),
                result: slot.unwrap_or_else(|| {
                    Err(RpcError::Timeout {
                        endpoint: identity.to_string(),
                        timeout_ms: deadline_ms,
                    })
                }),
            })
            .collect();

        if !outcomes.is_empty() {
            GATEWAY_AGGREGATES.with_label_values(&["settled"]).inc();
        }
        Ok(outcomes)
    }

    /// Settled ping of registered services by name.
    pub async fn ping_all_named_settled<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<ServiceOutcome>, GatewayError> {
        let services = self.identities_named(names)?;
        self.ping_all_settled(&services).await
    }

    fn identities_named<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ServiceIdentity>, GatewayError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref().trim();
                self.identity(name)
                    .cloned()
                    .ok_or_else(|| GatewayError::UnknownService(name.to_string()))
            })
            .collect()
    }

    /// Cached client for `identity`, resolving it on first use.
    fn client_for(&self, identity: &ServiceIdentity) -> Result<Arc<RpcClient>, ConfigurationError> {
        if let Some(client) = self.clients.lock().get(identity) {
            return Ok(Arc::clone(client));
        }

        let endpoint = self.provider.endpoint_for(identity)?;
        debug!(service = %identity.name, endpoint = %endpoint, "Resolved service on demand");
        let client = Arc::new(RpcClient::new(&identity.name, endpoint, self.config.client.clone()));

        let mut clients = self.clients.lock();
        Ok(Arc::clone(clients.entry(identity.clone()).or_insert(client)))
    }

    /// Issue every sub-call concurrently and collect outcomes by index.
    async fn fan_out(&self, services: &[ServiceIdentity], request: Request) -> Result<FanOut, GatewayError> {
        let mut seen = HashSet::with_capacity(services.len());
        if let Some(duplicate) = services.iter().find(|s| !seen.insert(s.name.as_str())) {
            return Err(GatewayError::DuplicateService(duplicate.name.clone()));
        }

        if services.is_empty() {
            return Ok(FanOut {
                slots: Vec::new(),
                deadline_hit: false,
            });
        }

        // Resolve everything first so a configuration error never leaves
        // calls in flight.
        let clients = services
            .iter()
            .map(|identity| self.client_for(identity))
            .collect::<Result<Vec<_>, _>>()?;

        let call_timeout = self.config.call_timeout;
        let mut calls = JoinSet::new();
        for (index, client) in clients.into_iter().enumerate() {
            let request = request.clone();
            calls.spawn(
                async move { (index, client.call(request, call_timeout).await) }.in_current_span(),
            );
        }

        let mut slots: Vec<Option<Result<TimedResult, RpcError>>> = vec![None; services.len()];
        let join = async {
            while let Some(joined) = calls.join_next().await {
                match joined {
                    Ok((index, outcome)) => slots[index] = Some(outcome),
                    Err(e) => warn!(error = %e, "Sub-call task did not complete"),
                }
            }
        };

        let deadline_hit = match self.config.aggregate_deadline {
            Some(deadline) => tokio::time::timeout(deadline, join).await.is_err(),
            None => {
                join.await;
                false
            }
        };

        if deadline_hit {
            // Cancelling the tasks drops their connections.
            calls.abort_all();
        } else {
            for (identity, slot) in services.iter().zip(slots.iter_mut()) {
                if slot.is_none() {
                    *slot = Some(Err(RpcError::Transport {
                        endpoint: identity.to_string(),
                        reason: "call task ended without a result".into(),
                    }));
                }
            }
        }

        Ok(FanOut { slots, deadline_hit })
    }

    fn deadline_ms(&self) -> u64 {
        self.config
            .aggregate_deadline
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for GatewayAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayAggregator")
            .field("services", &self.service_names())
            .field("config", &self.config)
            .finish()
    }
}

/// Strict join: every slot must hold a result.
fn assemble(
    services: &[ServiceIdentity],
    slots: Vec<Option<Result<TimedResult, RpcError>>>,
) -> Result<AggregatedResult, GatewayError> {
    let mut entries = Vec::with_capacity(services.len());
    let mut failures = Vec::new();

    for (identity, slot) in services.iter().zip(slots) {
        match slot {
            Some(Ok(result)) => entries.push((identity.name.clone(), result)),
            Some(Err(error)) => failures.push(ServiceFailure {
                service: identity.name.clone(),
                error,
            }),
            None => failures.push(ServiceFailure {
                service: identity.name.clone(),
                error: RpcError::Transport {
                    endpoint: identity.to_string(),
                    reason: "no result".into(),
                },
            }),
        }
    }

    if failures.is_empty() {
        Ok(AggregatedResult::from_entries(entries))
    } else {
        Err(GatewayError::PartialFailure {
            failures,
            succeeded: entries.into_iter().map(|(name, _)| name).collect(),
        })
    }
}

fn pending_names(
    services: &[ServiceIdentity],
    slots: &[Option<Result<TimedResult, RpcError>>],
) -> Vec<String> {
    services
        .iter()
        .zip(slots)
        .filter(|(_, slot)| slot.is_none())
        .map(|(identity, _)| identity.name.clone())
        .collect()
}
