// crates/proposal-gate-core/src/runtime/lifecycle.rs
// ============================================================================
// Module: Proposal Lifecycle Controller
// Description: Create, confirm, reject, read, and expire agent proposals.
// Purpose: Gate tenant mutations behind trust tiers and at-most-once execution.
// Dependencies: crate::{core, interfaces, runtime::registry}, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`ProposalController`] owns the proposal state machine:
//!
//! ```text
//! PENDING -> CONFIRMED -> EXECUTED
//!                      -> FAILED
//! PENDING -> REJECTED
//! PENDING -> EXPIRED
//! ```
//!
//! Create validates the payload against its tool schema before anything is
//! stored. Confirm evaluates, in order: tenant-scoped lookup, expiry, status,
//! executor presence, payload validation, the `PENDING -> CONFIRMED` claim,
//! then execution. The claim is a compare-and-set on the stored status, so
//! concurrent confirms execute a proposal at most once. Executors run with no
//! controller-held lock; they take their own document locks.
//!
//! Decisions and outcomes are written to the [`AuditLog`]; an audit write
//! failure is surfaced to the caller after the status change is durable, so
//! a retried confirm replays the recorded outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Instant;

use serde_json::Value;
use thiserror::Error;

use crate::core::ApprovalMode;
use crate::core::AuditLogEntry;
use crate::core::Clock;
use crate::core::Proposal;
use crate::core::ProposalFilter;
use crate::core::ProposalId;
use crate::core::ProposalStatus;
use crate::core::SessionId;
use crate::core::StatusTransition;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::ToolName;
use crate::core::TrustPolicyError;
use crate::core::TrustTierPolicy;
use crate::core::summarize_value;
use crate::core::truncate_summary;
use crate::interfaces::AuditLog;
use crate::interfaces::ExecutionError;
use crate::interfaces::ProposalStore;
use crate::interfaces::StoreError;
use crate::runtime::registry::ExecutorRegistry;
use crate::runtime::registry::PayloadValidationError;
use crate::runtime::registry::PayloadValidatorRegistry;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default proposal time-to-live (30 minutes).
pub const DEFAULT_PROPOSAL_TTL_MS: u64 = 30 * 60 * 1000;
/// Default number of proposals returned by a listing.
pub const DEFAULT_LIST_LIMIT: usize = 20;
/// Hard ceiling on proposals returned by a listing.
pub const MAX_LIST_LIMIT: usize = 50;
/// Default number of proposals expired per sweep.
pub const DEFAULT_EXPIRY_BATCH: usize = 500;
/// Maximum characters of a proposal operation summary.
pub const MAX_OPERATION_CHARS: usize = 500;
/// Output summary recorded when a confirmed tool has no executor.
const NOT_EXECUTABLE_SUMMARY: &str = "confirmed; no executor registered";
/// Attempts at the post-execution status transition.
const FINISH_ATTEMPTS: usize = 3;
/// Output summary recorded when an outcome could not be persisted.
const UNRECORDED_OUTCOME_SUMMARY: &str = "executor finished; outcome not recorded";

/// Lifecycle controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalControllerConfig {
    /// Proposal time-to-live in milliseconds.
    pub proposal_ttl_ms: u64,
    /// Listing size when the caller does not ask for one.
    pub default_list_limit: usize,
    /// Largest listing size a caller may ask for.
    pub max_list_limit: usize,
    /// Proposals expired per sweep.
    pub expiry_batch: usize,
}

impl Default for ProposalControllerConfig {
    fn default() -> Self {
        Self {
            proposal_ttl_ms: DEFAULT_PROPOSAL_TTL_MS,
            default_list_limit: DEFAULT_LIST_LIMIT,
            max_list_limit: MAX_LIST_LIMIT,
            expiry_batch: DEFAULT_EXPIRY_BATCH,
        }
    }
}

// ============================================================================
// SECTION: Requests and Outcomes
// ============================================================================

/// Request to create a proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateProposalRequest {
    /// Owning tenant, taken from verified auth context.
    pub tenant_id: TenantId,
    /// Session the proposal was raised in.
    pub session_id: SessionId,
    /// Tool that will perform the mutation.
    pub tool_name: ToolName,
    /// Human-readable summary.
    pub operation: String,
    /// Tool arguments.
    pub payload: Value,
    /// Snapshot of the intended effect.
    pub preview: Value,
}

/// Result of creating a proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOutcome {
    /// Proposal as persisted after creation (and auto-execution, if any).
    pub proposal: Proposal,
    /// Auto-execution outcome for proposals that need no approval.
    pub execution: Option<Result<ConfirmOutcome, ControllerError>>,
}

/// Successful confirm outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// The executor ran (or had already run) and succeeded.
    Executed {
        /// Proposal projection after execution.
        proposal: Proposal,
        /// Executor result document.
        result: Value,
        /// True when this call replayed an earlier execution.
        replayed: bool,
    },
    /// The proposal is confirmed but its tool has no executor yet.
    NotExecutable {
        /// Proposal projection.
        proposal: Proposal,
    },
    /// A concurrent confirm claimed the proposal and is executing it.
    InFlight {
        /// Proposal projection.
        proposal: Proposal,
    },
}

impl ConfirmOutcome {
    /// Returns the proposal projection carried by the outcome.
    #[must_use]
    pub const fn proposal(&self) -> &Proposal {
        match self {
            Self::Executed {
                proposal, ..
            }
            | Self::NotExecutable {
                proposal,
            }
            | Self::InFlight {
                proposal,
            } => proposal,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Lifecycle controller errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    /// No proposal with this identifier exists for the caller's tenant.
    #[error("proposal not found: {0}")]
    NotFound(ProposalId),
    /// The proposal is in a status that does not allow the action.
    #[error("proposal {proposal_id} is {status}")]
    Conflict {
        /// Proposal identifier.
        proposal_id: ProposalId,
        /// Current status.
        status: ProposalStatus,
    },
    /// The proposal expired before it was decided.
    #[error("proposal expired: {0}")]
    Expired(ProposalId),
    /// The payload failed its tool schema.
    #[error(transparent)]
    Validation(#[from] PayloadValidationError),
    /// The executor failed; the proposal is now `FAILED`.
    #[error(
        "execution failed for proposal {}: {}",
        .proposal.proposal_id,
        .error.public_message()
    )]
    ExecutionFailed {
        /// Proposal projection after the failure.
        proposal: Box<Proposal>,
        /// Executor error.
        error: ExecutionError,
    },
    /// The request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The trust policy is inconsistent.
    #[error(transparent)]
    Policy(#[from] TrustPolicyError),
    /// Storage failed.
    #[error("store error: {0}")]
    Store(String),
    /// A storage lock was not acquired within its bound.
    #[error("lock wait timed out: {0}")]
    LockTimeout(String),
}

impl From<StoreError> for ControllerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout(message) => Self::LockTimeout(message),
            other => Self::Store(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Controller
// ============================================================================

/// Proposal lifecycle controller.
pub struct ProposalController<S, A, C> {
    /// Proposal persistence.
    store: S,
    /// Business audit log.
    audit: A,
    /// Time source.
    clock: C,
    /// Trust tier policy.
    policy: TrustTierPolicy,
    /// Payload validators.
    validators: PayloadValidatorRegistry,
    /// Tool executors.
    executors: ExecutorRegistry,
    /// Controller configuration.
    config: ProposalControllerConfig,
}

impl<S, A, C> ProposalController<S, A, C>
where
    S: ProposalStore,
    A: AuditLog,
    C: Clock,
{
    /// Creates a controller from injected collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Policy`] when the trust policy is
    /// inconsistent, or [`ControllerError::InvalidRequest`] when the
    /// configuration is out of range.
    pub fn new(
        store: S,
        audit: A,
        clock: C,
        policy: TrustTierPolicy,
        validators: PayloadValidatorRegistry,
        executors: ExecutorRegistry,
        config: ProposalControllerConfig,
    ) -> Result<Self, ControllerError> {
        policy.verify()?;
        if config.proposal_ttl_ms == 0 {
            return Err(ControllerError::InvalidRequest(
                "proposal ttl must be greater than zero".to_string(),
            ));
        }
        if config.max_list_limit == 0
            || config.default_list_limit == 0
            || config.default_list_limit > config.max_list_limit
        {
            return Err(ControllerError::InvalidRequest(
                "list limits must satisfy 0 < default <= max".to_string(),
            ));
        }
        Ok(Self {
            store,
            audit,
            clock,
            policy,
            validators,
            executors,
            config,
        })
    }

    /// Returns the trust tier policy.
    #[must_use]
    pub const fn policy(&self) -> &TrustTierPolicy {
        &self.policy
    }

    /// Returns the executor registry.
    #[must_use]
    pub const fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    /// Returns the proposal store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the audit log.
    #[must_use]
    pub const fn audit_log(&self) -> &A {
        &self.audit
    }

    /// Persists a new `PENDING` proposal. Proposals that need no approval
    /// are confirmed automatically and the execution outcome is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Validation`] when the payload violates its
    /// tool schema, and other [`ControllerError`]s when the request is
    /// invalid or the proposal cannot be stored. Nothing is stored on error.
    /// Auto-execution errors are reported in [`CreateOutcome::execution`]
    /// instead.
    pub fn create(&self, request: CreateProposalRequest) -> Result<CreateOutcome, ControllerError> {
        let operation = request.operation.trim();
        if operation.is_empty() {
            return Err(ControllerError::InvalidRequest("operation must not be empty".to_string()));
        }
        self.validators.validate(request.tool_name, &request.payload)?;
        let now = self.clock.now();
        let trust_tier = self.policy.tier_for(request.tool_name);
        let requires_approval = trust_tier.requires_approval();
        let proposal = Proposal {
            proposal_id: ProposalId::generate(),
            tenant_id: request.tenant_id,
            session_id: request.session_id,
            tool_name: request.tool_name,
            operation: bounded_operation(operation),
            trust_tier,
            requires_approval,
            payload: request.payload,
            preview: request.preview,
            status: ProposalStatus::Pending,
            created_at: now,
            expires_at: expiry_for(now, &self.config),
            confirmed_at: None,
            executed_at: None,
            result: None,
            error: None,
        };
        self.store.insert(&proposal)?;
        if requires_approval {
            return Ok(CreateOutcome {
                proposal,
                execution: None,
            });
        }
        let execution =
            self.confirm_as(&proposal.tenant_id, &proposal.proposal_id, ApprovalMode::Automatic);
        let proposal = match &execution {
            Ok(outcome) => outcome.proposal().clone(),
            Err(ControllerError::ExecutionFailed {
                proposal, ..
            }) => (**proposal).clone(),
            Err(_) => {
                self.store.get(&proposal.tenant_id, &proposal.proposal_id)?.unwrap_or(proposal)
            }
        };
        Ok(CreateOutcome {
            proposal,
            execution: Some(execution),
        })
    }

    /// Confirms a proposal on behalf of a human operator.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotFound`], [`ControllerError::Expired`],
    /// [`ControllerError::Conflict`], [`ControllerError::Validation`], or
    /// [`ControllerError::ExecutionFailed`] per the lifecycle rules.
    pub fn confirm(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<ConfirmOutcome, ControllerError> {
        self.confirm_as(tenant_id, proposal_id, ApprovalMode::Explicit)
    }

    /// Rejects a pending proposal. No executor runs.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotFound`], [`ControllerError::Expired`],
    /// or [`ControllerError::Conflict`] when the proposal is not pending.
    pub fn reject(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Proposal, ControllerError> {
        let proposal = self.load(tenant_id, proposal_id)?;
        let proposal = self.settle_expiry(proposal)?;
        if proposal.status != ProposalStatus::Pending {
            return Err(conflict(&proposal));
        }
        let transition = StatusTransition::new(
            ProposalStatus::Pending,
            ProposalStatus::Rejected,
            self.clock.now(),
        );
        let Some(rejected) = self.store.transition(tenant_id, proposal_id, &transition)? else {
            let current = self.load(tenant_id, proposal_id)?;
            return Err(match current.status {
                ProposalStatus::Expired => ControllerError::Expired(current.proposal_id),
                _ => conflict(&current),
            });
        };
        self.record(&rejected, ApprovalMode::Explicit, 0, true, "rejected".to_string(), None)?;
        Ok(rejected)
    }

    /// Returns one proposal owned by `tenant_id`, expiring it first when its
    /// deadline passed.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotFound`] when the proposal does not exist
    /// for the tenant.
    pub fn get(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Proposal, ControllerError> {
        let proposal = self.load(tenant_id, proposal_id)?;
        match self.settle_expiry(proposal) {
            Ok(proposal) => Ok(proposal),
            Err(ControllerError::Expired(_)) => self.load(tenant_id, proposal_id),
            Err(err) => Err(err),
        }
    }

    /// Lists proposals owned by `tenant_id`, newest first. `limit` is clamped
    /// to the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] when listing fails.
    pub fn list(
        &self,
        tenant_id: &TenantId,
        filter: &ProposalFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Proposal>, ControllerError> {
        let limit = limit
            .unwrap_or(self.config.default_list_limit)
            .clamp(1, self.config.max_list_limit);
        self.store.expire_pending(Some(tenant_id), self.clock.now(), self.config.expiry_batch)?;
        Ok(self.store.list(tenant_id, filter, limit)?)
    }

    /// Expires pending proposals past their deadline across all tenants.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] when the sweep fails.
    pub fn expire_stale(&self) -> Result<usize, ControllerError> {
        Ok(self.store.expire_pending(None, self.clock.now(), self.config.expiry_batch)?)
    }

    // ------------------------------------------------------------------------
    // Confirm pipeline
    // ------------------------------------------------------------------------

    /// Confirm pipeline shared by explicit and automatic approval.
    fn confirm_as(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
        approval_mode: ApprovalMode,
    ) -> Result<ConfirmOutcome, ControllerError> {
        let proposal = self.load(tenant_id, proposal_id)?;
        let proposal = self.settle_expiry(proposal)?;
        if proposal.status != ProposalStatus::Pending {
            return self.project(proposal);
        }

        let Some(executor) = self.executors.get(proposal.tool_name) else {
            let claimed = match self.claim(&proposal)? {
                Claim::Won(claimed) => claimed,
                Claim::Lost(current) => return self.project(current),
            };
            self.record(
                &claimed,
                approval_mode,
                0,
                true,
                NOT_EXECUTABLE_SUMMARY.to_string(),
                None,
            )?;
            return Ok(ConfirmOutcome::NotExecutable {
                proposal: claimed,
            });
        };

        let validated = self.validators.validate(proposal.tool_name, &proposal.payload)?;
        let claimed = match self.claim(&proposal)? {
            Claim::Won(claimed) => claimed,
            Claim::Lost(current) => return self.project(current),
        };

        let started = Instant::now();
        let execution = executor.execute(tenant_id, &validated);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let finished_at = self.clock.now();

        match execution {
            Ok(result) => {
                let transition = StatusTransition::executed(result.clone(), finished_at);
                let executed = self.finish(&claimed, &transition, approval_mode)?;
                self.record(
                    &executed,
                    approval_mode,
                    duration_ms,
                    true,
                    summarize_value(&result),
                    None,
                )?;
                Ok(ConfirmOutcome::Executed {
                    proposal: executed,
                    result,
                    replayed: false,
                })
            }
            Err(error) => {
                let message = truncate_summary(&error.public_message());
                let transition = StatusTransition::failed(message.clone(), finished_at);
                let failed = self.finish(&claimed, &transition, approval_mode)?;
                self.record(
                    &failed,
                    approval_mode,
                    duration_ms,
                    false,
                    message.clone(),
                    Some(message),
                )?;
                Err(ControllerError::ExecutionFailed {
                    proposal: Box::new(failed),
                    error,
                })
            }
        }
    }

    /// Projects a non-pending proposal into a confirm outcome without
    /// executing anything.
    fn project(&self, proposal: Proposal) -> Result<ConfirmOutcome, ControllerError> {
        match proposal.status {
            ProposalStatus::Executed => {
                let result = proposal.result.clone().unwrap_or(Value::Null);
                Ok(ConfirmOutcome::Executed {
                    proposal,
                    result,
                    replayed: true,
                })
            }
            ProposalStatus::Confirmed => {
                if self.executors.get(proposal.tool_name).is_some() {
                    Ok(ConfirmOutcome::InFlight {
                        proposal,
                    })
                } else {
                    Ok(ConfirmOutcome::NotExecutable {
                        proposal,
                    })
                }
            }
            ProposalStatus::Expired => Err(ControllerError::Expired(proposal.proposal_id)),
            ProposalStatus::Pending | ProposalStatus::Rejected | ProposalStatus::Failed => {
                Err(conflict(&proposal))
            }
        }
    }

    /// Attempts the `PENDING -> CONFIRMED` compare-and-set.
    fn claim(&self, proposal: &Proposal) -> Result<Claim, ControllerError> {
        let transition = StatusTransition::new(
            ProposalStatus::Pending,
            ProposalStatus::Confirmed,
            self.clock.now(),
        );
        match self.store.transition(&proposal.tenant_id, &proposal.proposal_id, &transition)? {
            Some(claimed) => Ok(Claim::Won(claimed)),
            None => Ok(Claim::Lost(self.load(&proposal.tenant_id, &proposal.proposal_id)?)),
        }
    }

    /// Applies the post-execution transition of a claimed proposal.
    ///
    /// Store failures are retried up to [`FINISH_ATTEMPTS`] times. When the
    /// outcome still cannot be persisted, a failed audit entry is written on
    /// a best-effort basis so the `CONFIRMED` proposal can be reconciled.
    fn finish(
        &self,
        claimed: &Proposal,
        transition: &StatusTransition,
        approval_mode: ApprovalMode,
    ) -> Result<Proposal, ControllerError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.store.transition(&claimed.tenant_id, &claimed.proposal_id, transition) {
                Ok(Some(finished)) => return Ok(finished),
                Ok(None) => {
                    return Err(ControllerError::Store(format!(
                        "proposal {} left CONFIRMED while executing",
                        claimed.proposal_id
                    )));
                }
                Err(_) if attempts < FINISH_ATTEMPTS => {}
                Err(err) => {
                    let _ = self.record(
                        claimed,
                        approval_mode,
                        0,
                        false,
                        UNRECORDED_OUTCOME_SUMMARY.to_string(),
                        Some(format!("intended status {} not recorded", transition.to)),
                    );
                    return Err(err.into());
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Loads a tenant-scoped proposal or reports it as not found.
    fn load(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Proposal, ControllerError> {
        self.store
            .get(tenant_id, proposal_id)?
            .ok_or_else(|| ControllerError::NotFound(proposal_id.clone()))
    }

    /// Applies lazy expiry. Returns [`ControllerError::Expired`] for expired
    /// proposals and the current projection otherwise.
    fn settle_expiry(&self, proposal: Proposal) -> Result<Proposal, ControllerError> {
        match proposal.status {
            ProposalStatus::Expired => Err(ControllerError::Expired(proposal.proposal_id)),
            ProposalStatus::Pending => {
                let now = self.clock.now();
                if !proposal.is_past_expiry(now) {
                    return Ok(proposal);
                }
                let transition =
                    StatusTransition::new(ProposalStatus::Pending, ProposalStatus::Expired, now);
                if self
                    .store
                    .transition(&proposal.tenant_id, &proposal.proposal_id, &transition)?
                    .is_some()
                {
                    return Err(ControllerError::Expired(proposal.proposal_id));
                }
                let current = self.load(&proposal.tenant_id, &proposal.proposal_id)?;
                match current.status {
                    ProposalStatus::Expired | ProposalStatus::Pending => {
                        Err(ControllerError::Expired(current.proposal_id))
                    }
                    _ => Ok(current),
                }
            }
            _ => Ok(proposal),
        }
    }

    /// Appends the audit entry for a decision or outcome.
    fn record(
        &self,
        proposal: &Proposal,
        approval_mode: ApprovalMode,
        duration_ms: u64,
        success: bool,
        output_summary: String,
        error_message: Option<String>,
    ) -> Result<(), ControllerError> {
        let input = format!("{}: {}", proposal.operation, proposal.payload);
        let entry = AuditLogEntry {
            tenant_id: proposal.tenant_id.clone(),
            session_id: proposal.session_id.clone(),
            tool_name: proposal.tool_name,
            proposal_id: proposal.proposal_id.clone(),
            input_summary: truncate_summary(&input),
            output_summary: truncate_summary(&output_summary),
            trust_tier: proposal.trust_tier,
            approval_mode,
            duration_ms,
            success,
            error_message,
            recorded_at: self.clock.now(),
        };
        self.audit.append(&entry)?;
        Ok(())
    }
}

/// Outcome of the confirm claim.
enum Claim {
    /// This caller moved the proposal to `CONFIRMED`.
    Won(Proposal),
    /// Another caller moved it first; carries the current projection.
    Lost(Proposal),
}

/// Builds the conflict error for a proposal's current status.
fn conflict(proposal: &Proposal) -> ControllerError {
    ControllerError::Conflict {
        proposal_id: proposal.proposal_id.clone(),
        status: proposal.status,
    }
}

/// Truncates an operation summary to [`MAX_OPERATION_CHARS`].
fn bounded_operation(operation: &str) -> String {
    operation.chars().take(MAX_OPERATION_CHARS).collect()
}

/// Returns the instant a proposal created at `created_at` expires.
#[must_use]
pub fn expiry_for(created_at: Timestamp, config: &ProposalControllerConfig) -> Timestamp {
    created_at.saturating_add_millis(config.proposal_ttl_ms)
}
