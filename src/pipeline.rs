// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Demo Pipeline
//!
//! Runs the access-control scenario as an ordered list of named steps:
//!
//! ```text
//! Init → IdentitiesReady → WhitelistsCreated → AgentsAuthorized →
//! DataEncrypted → Uploaded → Retrieved → AuthorizedDecryptSucceeds →
//! UnauthorizedDecryptFails → CrossAgentDecryptSucceeds → Done
//! ```
//!
//! The owner creates one whitelist per agent, adds each agent to its own
//! whitelist and encrypts each agent's data under it. The combined
//! ciphertext is stored as one blob and read back. The first agent then
//! decrypts its data, fails to decrypt the second agent's data, and the
//! second agent decrypts its own.
//!
//! ## Partial Failure
//!
//! Nothing is rolled back. A failing step is reported and the pipeline moves
//! on; steps whose inputs were never produced are reported as skipped.
//! Work inside a step is per agent, so one agent's failure does not block
//! another's.
//!
//! ## Shutdown
//!
//! The cancellation token is checked between steps. Once cancelled, every
//! remaining step is reported as skipped.

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::authorization::SessionAuthorizationBuilder;
use crate::chain::TxBuilder;
use crate::config::DemoConfig;
use crate::gateway::{EncryptionGateway, GatewayError, PolicyTuple};
use crate::identity::Identity;
use crate::payload::{preview, read_json_payload, CombinedPayload};
use crate::registry::{PolicyRegistry, WhitelistHandle};
use crate::state::DemoServices;
use crate::storage::{BlobId, BlobStorageClient};

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemoStep {
    Init,
    IdentitiesReady,
    WhitelistsCreated,
    AgentsAuthorized,
    DataEncrypted,
    Uploaded,
    Retrieved,
    AuthorizedDecryptSucceeds,
    UnauthorizedDecryptFails,
    CrossAgentDecryptSucceeds,
    Done,
}

impl DemoStep {
    pub const ALL: [DemoStep; 11] = [
        DemoStep::Init,
        DemoStep::IdentitiesReady,
        DemoStep::WhitelistsCreated,
        DemoStep::AgentsAuthorized,
        DemoStep::DataEncrypted,
        DemoStep::Uploaded,
        DemoStep::Retrieved,
        DemoStep::AuthorizedDecryptSucceeds,
        DemoStep::UnauthorizedDecryptFails,
        DemoStep::CrossAgentDecryptSucceeds,
        DemoStep::Done,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DemoStep::Init => "init",
            DemoStep::IdentitiesReady => "identities_ready",
            DemoStep::WhitelistsCreated => "whitelists_created",
            DemoStep::AgentsAuthorized => "agents_authorized",
            DemoStep::DataEncrypted => "data_encrypted",
            DemoStep::Uploaded => "uploaded",
            DemoStep::Retrieved => "retrieved",
            DemoStep::AuthorizedDecryptSucceeds => "authorized_decrypt_succeeds",
            DemoStep::UnauthorizedDecryptFails => "unauthorized_decrypt_fails",
            DemoStep::CrossAgentDecryptSucceeds => "cross_agent_decrypt_succeeds",
            DemoStep::Done => "done",
        }
    }
}

impl fmt::Display for DemoStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    /// The step asserted a failure and the failure happened.
    ExpectedFailure,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: DemoStep,
    pub status: StepStatus,
    pub detail: String,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct DemoReport {
    pub run_id: Uuid,
    pub steps: Vec<StepReport>,
}

impl DemoReport {
    pub fn status_of(&self, step: DemoStep) -> Option<StepStatus> {
        self.steps
            .iter()
            .find(|report| report.step == step)
            .map(|report| report.status)
    }

    /// Every step either completed or failed as expected.
    pub fn succeeded(&self) -> bool {
        self.steps.len() == DemoStep::ALL.len()
            && self.steps.iter().all(|report| {
                matches!(
                    report.status,
                    StepStatus::Completed | StepStatus::ExpectedFailure
                )
            })
    }
}

/// Per-agent progress through the pipeline.
struct AgentRun {
    identity: Identity,
    input_path: std::path::PathBuf,
    whitelist: Option<WhitelistHandle>,
    plaintext: Option<Vec<u8>>,
}

impl AgentRun {
    fn label(&self) -> &str {
        self.identity.label()
    }
}

/// State threaded through the steps.
#[derive(Default)]
struct RunState {
    owner: Option<Identity>,
    agents: Vec<AgentRun>,
    combined: CombinedPayload,
    blob_id: Option<BlobId>,
    retrieved: Option<CombinedPayload>,
}

enum StepOutcome {
    Completed(String),
    ExpectedFailure(String),
    Failed(String),
    Skipped(String),
}

impl StepOutcome {
    fn into_report(self, step: DemoStep) -> StepReport {
        let (status, detail) = match self {
            StepOutcome::Completed(d) => (StepStatus::Completed, d),
            StepOutcome::ExpectedFailure(d) => (StepStatus::ExpectedFailure, d),
            StepOutcome::Failed(d) => (StepStatus::Failed, d),
            StepOutcome::Skipped(d) => (StepStatus::Skipped, d),
        };
        StepReport {
            step,
            status,
            detail,
        }
    }

    /// Summarize per-agent results: any failure fails the step.
    fn from_agents(done: Vec<String>, failed: Vec<String>) -> Self {
        match (done.is_empty(), failed.is_empty()) {
            (_, true) => StepOutcome::Completed(done.join(", ")),
            (true, false) => StepOutcome::Failed(failed.join("; ")),
            (false, false) => StepOutcome::Failed(format!(
                "{}; succeeded for {}",
                failed.join("; "),
                done.join(", ")
            )),
        }
    }
}

/// Runs the scenario against a set of services.
pub struct Orchestrator {
    config: DemoConfig,
    registry: PolicyRegistry,
    gateway: EncryptionGateway,
    sessions: SessionAuthorizationBuilder,
    storage: BlobStorageClient,
}

impl Orchestrator {
    pub fn new(config: DemoConfig, services: DemoServices) -> Result<Self, GatewayError> {
        let tx = TxBuilder::new(services.ledger, config.confirmation.poll_policy());
        let gateway = EncryptionGateway::new(
            services.key_servers,
            &services.allowlist,
            config.verify_key_servers,
        )?;

        Ok(Self {
            registry: PolicyRegistry::new(tx.clone(), config.package_id, &config.module_name),
            sessions: SessionAuthorizationBuilder::new(
                tx,
                config.ttl_minutes,
                config.broadcast_probe,
            ),
            storage: BlobStorageClient::new(
                services.blob_store,
                config.retry_ceiling,
                config.storage_epochs,
            ),
            gateway,
            config,
        })
    }

    /// Run every step in order until done or cancelled.
    pub async fn run(&self, cancel: CancellationToken) -> DemoReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("demo", %run_id);

        let steps = async {
            let mut state = RunState::default();
            let mut reports = Vec::with_capacity(DemoStep::ALL.len());

            for step in DemoStep::ALL {
                let outcome = if cancel.is_cancelled() {
                    StepOutcome::Skipped("run cancelled".to_string())
                } else {
                    self.execute(step, &mut state, &reports).await
                };
                let report = outcome.into_report(step);
                log_report(&report);
                reports.push(report);
            }
            reports
        }
        .instrument(span)
        .await;

        DemoReport { run_id, steps }
    }

    async fn execute(
        &self,
        step: DemoStep,
        state: &mut RunState,
        prior: &[StepReport],
    ) -> StepOutcome {
        match step {
            DemoStep::Init => self.init(),
            DemoStep::IdentitiesReady => self.load_identities(state),
            DemoStep::WhitelistsCreated => self.create_whitelists(state).await,
            DemoStep::AgentsAuthorized => self.authorize_agents(state).await,
            DemoStep::DataEncrypted => self.encrypt_payloads(state),
            DemoStep::Uploaded => self.upload(state).await,
            DemoStep::Retrieved => self.retrieve(state).await,
            DemoStep::AuthorizedDecryptSucceeds => self.decrypt_own(state, 0).await,
            DemoStep::UnauthorizedDecryptFails => self.decrypt_foreign(state).await,
            DemoStep::CrossAgentDecryptSucceeds => self.decrypt_own(state, 1).await,
            DemoStep::Done => summarize(prior),
        }
    }

    fn init(&self) -> StepOutcome {
        StepOutcome::Completed(format!(
            "network {}, package {}, {} key server(s), threshold {}",
            self.config.network,
            self.config.package_id,
            self.gateway.server_count(),
            self.config.threshold
        ))
    }

    fn load_identities(&self, state: &mut RunState) -> StepOutcome {
        let owner = match Identity::from_base64_secret("owner", &self.config.owner_key) {
            Ok(owner) => owner,
            Err(e) => return StepOutcome::Failed(format!("owner key: {e}")),
        };
        tracing::info!(address = %owner.address(), "Owner identity loaded");

        let mut failed = Vec::new();
        for agent in &self.config.agents {
            match Identity::from_base64_secret(&agent.label, &agent.secret_key) {
                Ok(identity) => {
                    tracing::info!(
                        agent = %agent.label,
                        address = %identity.address(),
                        "Agent identity loaded"
                    );
                    state.agents.push(AgentRun {
                        identity,
                        input_path: agent.input_path.clone(),
                        whitelist: None,
                        plaintext: None,
                    });
                }
                Err(e) => failed.push(format!("{}: {e}", agent.label)),
            }
        }
        state.owner = Some(owner);

        if failed.is_empty() {
            StepOutcome::Completed(format!("owner and {} agent(s)", state.agents.len()))
        } else {
            StepOutcome::Failed(failed.join("; "))
        }
    }

    async fn create_whitelists(&self, state: &mut RunState) -> StepOutcome {
        let Some(owner) = state.owner.as_ref() else {
            return StepOutcome::Skipped("no owner identity".to_string());
        };
        if state.agents.is_empty() {
            return StepOutcome::Skipped("no agent identities".to_string());
        }

        let (mut done, mut failed) = (Vec::new(), Vec::new());
        for agent in &mut state.agents {
            match self.registry.create_whitelist(owner).await {
                Ok(handle) => {
                    done.push(format!("{} → {}", agent.label(), handle.whitelist_id));
                    agent.whitelist = Some(handle);
                }
                Err(e) => {
                    tracing::error!(agent = %agent.label(), error = %e, "Whitelist creation failed");
                    failed.push(format!("{}: {e}", agent.label()));
                }
            }
        }
        StepOutcome::from_agents(done, failed)
    }

    async fn authorize_agents(&self, state: &mut RunState) -> StepOutcome {
        let Some(owner) = state.owner.as_ref() else {
            return StepOutcome::Skipped("no owner identity".to_string());
        };

        let (mut done, mut failed) = (Vec::new(), Vec::new());
        for agent in &state.agents {
            let Some(handle) = agent.whitelist.as_ref() else {
                continue;
            };
            match self
                .registry
                .add_address(owner, handle, agent.identity.address())
                .await
            {
                Ok(()) => done.push(agent.label().to_string()),
                Err(e) => {
                    tracing::error!(agent = %agent.label(), error = %e, "Adding agent failed");
                    failed.push(format!("{}: {e}", agent.label()));
                }
            }
        }

        if done.is_empty() && failed.is_empty() {
            return StepOutcome::Skipped("no whitelists".to_string());
        }
        StepOutcome::from_agents(done, failed)
    }

    fn encrypt_payloads(&self, state: &mut RunState) -> StepOutcome {
        let (mut done, mut failed) = (Vec::new(), Vec::new());
        for agent in &mut state.agents {
            let Some(handle) = agent.whitelist.as_ref() else {
                continue;
            };

            let plaintext = match read_json_payload(&agent.input_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(agent = %agent.label(), error = %e, "Reading payload failed");
                    failed.push(format!("{}: {e}", agent.label()));
                    continue;
                }
            };
            tracing::info!(agent = %agent.label(), size = plaintext.len(), "Payload read");

            let policy = PolicyTuple::for_whitelist(self.config.package_id, handle.whitelist_id);
            match self
                .gateway
                .encrypt(&plaintext, &policy, self.config.threshold)
            {
                Ok(encrypted) => {
                    tracing::info!(
                        agent = %agent.label(),
                        size = encrypted.ciphertext.len(),
                        "Payload encrypted"
                    );
                    state
                        .combined
                        .insert(agent.label(), encrypted.ciphertext);
                    agent.plaintext = Some(plaintext);
                    done.push(agent.label().to_string());
                }
                Err(e) => {
                    tracing::error!(agent = %agent.label(), error = %e, "Encryption failed");
                    failed.push(format!("{}: {e}", agent.label()));
                }
            }
        }

        if done.is_empty() && failed.is_empty() {
            return StepOutcome::Skipped("no whitelists".to_string());
        }
        StepOutcome::from_agents(done, failed)
    }

    async fn upload(&self, state: &mut RunState) -> StepOutcome {
        let Some(owner) = state.owner.as_ref() else {
            return StepOutcome::Skipped("no owner identity".to_string());
        };
        if state.combined.labels().next().is_none() {
            return StepOutcome::Skipped("nothing was encrypted".to_string());
        }

        let data = match state.combined.to_bytes() {
            Ok(data) => data,
            Err(e) => return StepOutcome::Failed(e.to_string()),
        };
        tracing::info!(size = data.len(), "Combined payload ready");

        match self.storage.upload(&data, owner).await {
            Ok(receipt) => {
                let detail = format!(
                    "blob {} after {} attempt(s)",
                    receipt.blob_id, receipt.attempts
                );
                state.blob_id = Some(receipt.blob_id);
                StepOutcome::Completed(detail)
            }
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }

    async fn retrieve(&self, state: &mut RunState) -> StepOutcome {
        let Some(blob_id) = state.blob_id.as_ref() else {
            return StepOutcome::Skipped("no blob id".to_string());
        };

        let data = match self.storage.download(blob_id).await {
            Ok(data) => data,
            Err(e) => return StepOutcome::Failed(e.to_string()),
        };
        match CombinedPayload::from_bytes(&data) {
            Ok(combined) => {
                let labels: Vec<&str> = combined.labels().collect();
                let detail = format!("{} bytes, entries: {}", data.len(), labels.join(", "));
                state.retrieved = Some(combined);
                StepOutcome::Completed(detail)
            }
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }

    /// Agent `index` decrypts its own retrieved entry.
    async fn decrypt_own(&self, state: &RunState, index: usize) -> StepOutcome {
        let Some(agent) = state.agents.get(index) else {
            return StepOutcome::Skipped(format!("no agent #{index}"));
        };
        let (Some(handle), Some(expected)) = (agent.whitelist.as_ref(), agent.plaintext.as_ref())
        else {
            return StepOutcome::Skipped(format!("{} has no encrypted data", agent.label()));
        };
        let Some(ciphertext) = retrieved_entry(state, agent.label()) else {
            return StepOutcome::Skipped(format!("{} entry was not retrieved", agent.label()));
        };

        match self.decrypt_as(agent, handle, ciphertext).await {
            Ok(plaintext) if plaintext == *expected => {
                tracing::info!(
                    agent = %agent.label(),
                    size = plaintext.len(),
                    preview = %preview(&plaintext),
                    "Decrypted"
                );
                StepOutcome::Completed(format!(
                    "{} decrypted {} bytes",
                    agent.label(),
                    plaintext.len()
                ))
            }
            Ok(_) => StepOutcome::Failed(format!(
                "{} decrypted data that differs from the original",
                agent.label()
            )),
            Err(e) => StepOutcome::Failed(format!("{}: {e}", agent.label())),
        }
    }

    /// The first agent tries the second agent's entry and must be refused.
    async fn decrypt_foreign(&self, state: &RunState) -> StepOutcome {
        let (Some(intruder), Some(victim)) = (state.agents.first(), state.agents.get(1)) else {
            return StepOutcome::Skipped("fewer than two agents".to_string());
        };
        let Some(handle) = victim.whitelist.as_ref() else {
            return StepOutcome::Skipped(format!("{} has no whitelist", victim.label()));
        };
        let Some(ciphertext) = retrieved_entry(state, victim.label()) else {
            return StepOutcome::Skipped(format!("{} entry was not retrieved", victim.label()));
        };

        match self.decrypt_as(intruder, handle, ciphertext).await {
            Err(GatewayError::Unauthorized(reason)) => StepOutcome::ExpectedFailure(format!(
                "{} cannot decrypt {} data: {reason}",
                intruder.label(),
                victim.label()
            )),
            Ok(plaintext) => StepOutcome::Failed(format!(
                "unexpected success: {} decrypted {} data ({} bytes)",
                intruder.label(),
                victim.label(),
                plaintext.len()
            )),
            Err(e) => StepOutcome::Failed(format!(
                "{} failed for a reason other than authorization: {e}",
                intruder.label()
            )),
        }
    }

    async fn decrypt_as(
        &self,
        agent: &AgentRun,
        handle: &WhitelistHandle,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, GatewayError> {
        let policy = PolicyTuple::for_whitelist(self.config.package_id, handle.whitelist_id);
        let auth = self
            .sessions
            .build(
                &agent.identity,
                self.config.package_id,
                self.registry.module(),
                &policy.id,
                handle.whitelist_id,
            )
            .await?;

        self.gateway
            .decrypt(ciphertext, &auth.credential, &auth.tx_bytes)
            .await
    }
}

fn summarize(prior: &[StepReport]) -> StepOutcome {
    let count = |status: StepStatus| prior.iter().filter(|r| r.status == status).count();
    StepOutcome::Completed(format!(
        "scenario finished: {} failed, {} skipped",
        count(StepStatus::Failed),
        count(StepStatus::Skipped)
    ))
}

fn retrieved_entry<'a>(state: &'a RunState, label: &str) -> Option<&'a [u8]> {
    state
        .retrieved
        .as_ref()
        .and_then(|combined| combined.get(label).ok())
}

fn log_report(report: &StepReport) {
    let step = report.step;
    let detail = report.detail.as_str();
    match report.status {
        StepStatus::Completed => tracing::info!(%step, detail, "Step completed"),
        StepStatus::ExpectedFailure => {
            tracing::info!(%step, detail, "Step failed as expected")
        }
        StepStatus::Failed => tracing::error!(%step, detail, "Step failed"),
        StepStatus::Skipped => tracing::warn!(%step, detail, "Step skipped"),
    }
}
