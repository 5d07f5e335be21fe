//! Query execution with bounded retry
//!
//! A read resolves its candidates from the snapshot current at the time of
//! the call and tries them in order. Transient failures (network, timeout)
//! move on to the next candidate until `max_attempts` have been made.
//! Anything else is returned at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::connection::ConnectionManager;
use super::errors::{ClientError, ClientResult};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::routing::{resolve, ReadPolicy, RoutingError};
use crate::topology::{Endpoint, Replica, SharedTopology};
use crate::transport::{Document, Namespace, Query, TransportError};

/// Documents returned by a read and where they came from
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub documents: Vec<Document>,
    pub served_by: Endpoint,
    pub region: Option<String>,
    /// Attempts made, the successful one included
    pub attempts: usize,
}

/// Runs reads and writes against the members the topology allows
pub struct QueryExecutor {
    topology: Arc<SharedTopology>,
    connections: Arc<ConnectionManager>,
    metrics: Arc<MetricsRegistry>,
    max_attempts: usize,
    attempt_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(
        topology: Arc<SharedTopology>,
        connections: Arc<ConnectionManager>,
        metrics: Arc<MetricsRegistry>,
        max_attempts: usize,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            topology,
            connections,
            metrics,
            max_attempts: max_attempts.max(1),
            attempt_timeout,
        }
    }

    /// Execute a read under `policy`.
    pub async fn execute(
        &self,
        policy: &ReadPolicy,
        namespace: &Namespace,
        query: &Query,
    ) -> ClientResult<ReadOutcome> {
        match self.execute_read(policy, namespace, query).await {
            Ok(outcome) => {
                self.metrics.increment_reads_executed();
                log_event_with_fields(
                    Event::ReadComplete,
                    &[
                        ("policy", &policy.to_string()),
                        ("namespace", &namespace.to_string()),
                        ("endpoint", &outcome.served_by.to_string()),
                        ("region", outcome.region.as_deref().unwrap_or("")),
                        ("documents", &outcome.documents.len().to_string()),
                        ("attempts", &outcome.attempts.to_string()),
                    ],
                );
                Ok(outcome)
            }
            Err(e) => {
                self.metrics.increment_reads_failed();
                log_event_with_fields(
                    Event::ReadFailed,
                    &[
                        ("policy", &policy.to_string()),
                        ("namespace", &namespace.to_string()),
                        ("error", &e.to_string()),
                    ],
                );
                Err(e)
            }
        }
    }

    async fn execute_read(
        &self,
        policy: &ReadPolicy,
        namespace: &Namespace,
        query: &Query,
    ) -> ClientResult<ReadOutcome> {
        query
            .validate()
            .map_err(|reason| ClientError::MalformedQuery { reason })?;

        let snapshot = self.topology.load();
        let candidates = resolve(policy, &snapshot)?;
        let budget = candidates.len().min(self.max_attempts);

        let mut attempts = 0;
        let mut last_error: Option<ClientError> = None;

        for replica in candidates.iter().take(budget) {
            attempts += 1;
            match self.attempt_find(replica, namespace, query).await {
                Ok(documents) => {
                    return Ok(ReadOutcome {
                        documents,
                        served_by: replica.endpoint.clone(),
                        region: replica.region.clone(),
                        attempts,
                    });
                }
                Err(e) if e.is_transient() => {
                    if attempts < budget {
                        self.metrics.increment_read_retries();
                        log_event_with_fields(
                            Event::ReadRetry,
                            &[
                                ("policy", &policy.to_string()),
                                ("endpoint", &replica.endpoint.to_string()),
                                ("attempt", &attempts.to_string()),
                                ("error", &e.to_string()),
                            ],
                        );
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ClientError::AllCandidatesFailed {
            policy: policy.to_string(),
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("no healthy replica in topology generation {}", snapshot.generation())),
        })
    }

    async fn attempt_find(
        &self,
        replica: &Replica,
        namespace: &Namespace,
        query: &Query,
    ) -> ClientResult<Vec<Document>> {
        let endpoint = &replica.endpoint;
        let attempt = async {
            let mut conn = self.connections.checkout(endpoint).await?;
            let documents = conn
                .connection()
                .find(namespace, query)
                .await
                .map_err(|e| ClientError::from_transport(endpoint, e))?;
            self.connections.checkin(conn);
            Ok::<_, ClientError>(documents)
        };

        match timeout(self.attempt_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::from_transport(
                endpoint,
                TransportError::Timeout(self.attempt_timeout),
            )),
        }
    }

    /// Write one document to the primary. Writes are never retried.
    pub async fn insert(&self, namespace: &Namespace, document: Document) -> ClientResult<Endpoint> {
        let snapshot = self.topology.load();
        let endpoint = match resolve(&ReadPolicy::Primary, &snapshot)?.into_iter().next() {
            Some(primary) => primary.endpoint,
            None => {
                return Err(RoutingError::NoPrimaryAvailable {
                    policy: ReadPolicy::Primary.to_string(),
                }
                .into())
            }
        };

        let attempt = async {
            let mut conn = self.connections.checkout(&endpoint).await?;
            conn.connection()
                .insert(namespace, document)
                .await
                .map_err(|e| ClientError::from_transport(&endpoint, e))?;
            self.connections.checkin(conn);
            Ok::<_, ClientError>(())
        };

        match timeout(self.attempt_timeout, attempt).await {
            Ok(Ok(())) => {
                self.metrics.increment_documents_inserted();
                Ok(endpoint)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ClientError::from_transport(
                &endpoint,
                TransportError::Timeout(self.attempt_timeout),
            )),
        }
    }
}
