//! Ward approval coordinator
//!
//! Drives one ward transaction from initiation to a terminal status. The
//! same type runs on the ward device and on the guardian device; which
//! operations succeed depends on the address in the local key store.
//!
//! Every status change is one conditional store update filtered on the
//! status it expects to replace. Combined with the per-request
//! `SubmissionGuard` this gives at-most-once submission per request.

use super::guard::SubmissionGuard;
use super::request::{columns, ApprovalRequest};
use super::state::{transition, ApprovalEvent, ApprovalStatus};
use crate::audit::AuditLog;
use crate::chain::{ChainClient, InvokeRequest, TxStatus};
use crate::config::ApprovalSettings;
use crate::executor::WardExecutor;
use crate::felt::Felt;
use crate::intent::{CallSet, TransactionIntent, TxOutcome};
use crate::signature::{assemble, ResourceBounds, SignaturePair};
use crate::store::{ApprovalStore, Filter, OrderBy};
use crate::tokens::TokenRegistry;
use crate::wallet::{compute_invoke_v3_hash, InvokeHashParams, KeyStore, PresignedSigner};
use crate::{Error, ErrorKind, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Which side of a ward relationship this device is acting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Ward,
    Guardian,
}

impl DeviceRole {
    /// The status in which a request waits on this role.
    pub fn pending_status(&self) -> ApprovalStatus {
        match self {
            DeviceRole::Ward => ApprovalStatus::PendingWardSig,
            DeviceRole::Guardian => ApprovalStatus::PendingGuardian,
        }
    }

    pub fn address_column(&self) -> &'static str {
        match self {
            DeviceRole::Ward => columns::WARD_ADDRESS,
            DeviceRole::Guardian => columns::GUARDIAN_ADDRESS,
        }
    }

    fn address_of(&self, request: &ApprovalRequest) -> Felt {
        match self {
            DeviceRole::Ward => request.ward_address,
            DeviceRole::Guardian => request.guardian_address,
        }
    }
}

impl std::fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRole::Ward => f.write_str("ward"),
            DeviceRole::Guardian => f.write_str("guardian"),
        }
    }
}

fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn signature_json(sig: Option<&SignaturePair>) -> Result<Value> {
    Ok(match sig {
        Some(sig) => Value::String(sig.to_json()?),
        None => Value::Null,
    })
}

/// Live requests waiting on `role` at `address`. Rebuild per query; the
/// expiry predicate is relative to now.
pub(crate) fn pending_filter(role: DeviceRole, address: &Felt) -> Filter {
    Filter::new()
        .eq(role.address_column(), address.to_hex())
        .eq(columns::STATUS, role.pending_status())
        .gt(columns::EXPIRES_AT, timestamp_now())
}

pub(crate) fn newest_first() -> OrderBy {
    OrderBy::desc(columns::CREATED_AT)
}

/// Typed rows, skipping any that do not parse.
pub(crate) fn parse_requests(rows: Vec<Value>) -> Vec<ApprovalRequest> {
    rows.into_iter()
        .filter_map(|row| match ApprovalRequest::from_record(row) {
            Ok(request) => Some(request),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed approval request");
                None
            }
        })
        .collect()
}

pub struct WardApprovalCoordinator {
    store: Arc<dyn ApprovalStore>,
    chain: Arc<dyn ChainClient>,
    keys: Arc<dyn KeyStore>,
    tokens: TokenRegistry,
    settings: ApprovalSettings,
    guard: SubmissionGuard,
    audit: Option<Arc<AuditLog>>,
}

impl WardApprovalCoordinator {
    pub fn new(
        store: Arc<dyn ApprovalStore>,
        chain: Arc<dyn ChainClient>,
        keys: Arc<dyn KeyStore>,
        settings: ApprovalSettings,
    ) -> Self {
        Self {
            store,
            chain,
            keys,
            tokens: TokenRegistry::new(),
            settings,
            guard: SubmissionGuard::new(),
            audit: None,
        }
    }

    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_tokens(mut self, tokens: TokenRegistry) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn settings(&self) -> &ApprovalSettings {
        &self.settings
    }

    fn table(&self) -> &str {
        &self.settings.table
    }

    /// Create a request for a ward-initiated transaction.
    pub async fn initiate_ward_transaction(
        &self,
        intent: &TransactionIntent,
        calls: CallSet,
    ) -> Result<ApprovalRequest> {
        let ward_address = self.keys.account_address();
        let policy = self.chain.ward_policy(&ward_address).await?;
        let needs = policy.evaluate(intent, &self.tokens)?;

        let status = transition(ApprovalStatus::Created, ApprovalEvent::Recorded)?;
        let now = Utc::now();
        let draft = ApprovalRequest {
            id: String::new(),
            ward_address,
            guardian_address: needs.guardian_address,
            action: intent.action,
            token: intent.token.clone(),
            amount: intent.amount.clone(),
            recipient: intent.recipient.clone(),
            calls_json: calls.to_json()?,
            status,
            nonce: None,
            resource_bounds_json: None,
            tx_hash: None,
            ward_sig_json: None,
            ward_2fa_sig_json: None,
            guardian_sig_json: None,
            guardian_2fa_sig_json: None,
            needs_guardian: needs.needs_guardian,
            needs_ward_2fa: needs.needs_ward_2fa,
            needs_guardian_2fa: needs.needs_guardian_2fa,
            final_tx_hash: None,
            error_message: None,
            created_at: now,
            expires_at: now + self.settings.request_ttl(),
            responded_at: None,
        };

        let rows = self
            .store
            .insert(self.table(), draft.to_insert_record()?)
            .await?;
        let record = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::Network("Store returned no row for insert".to_string()))?;
        let request = ApprovalRequest::from_record(record)?;

        tracing::info!(
            request_id = %request.id,
            ward = %request.ward_address,
            guardian = %request.guardian_address,
            action = %request.action,
            needs_guardian = request.needs_guardian,
            needs_ward_2fa = request.needs_ward_2fa,
            needs_guardian_2fa = request.needs_guardian_2fa,
            "Ward approval request created"
        );
        self.audit_transition(
            &request.id,
            ApprovalStatus::Created,
            status,
            ApprovalEvent::Recorded,
            None,
        )
        .await;
        Ok(request)
    }

    /// Sign as the ward. Finalizes directly when no guardian is needed,
    /// otherwise hands the request to the guardian.
    pub async fn approve_as_ward(&self, request_id: &str) -> Result<ApprovalRequest> {
        let _lock = self.guard.lock(request_id).await;
        let request = self.load_actionable(request_id, DeviceRole::Ward).await?;
        let calls = request.call_set()?;

        let (nonce, bounds, tx_hash) = match request.bound_transaction()? {
            Some(bound) => {
                tracing::debug!(request_id = %request.id, tx_hash = %bound.2, "Reusing bound transaction");
                bound
            }
            None => self.bind_transaction(&request, &calls).await?,
        };

        let (ward_sig, ward_second) = self
            .sign_with_device_keys(&tx_hash, request.needs_ward_2fa)
            .await?;

        let mut patch = Map::new();
        patch.insert("nonce".into(), Value::String(nonce.to_hex()));
        patch.insert("resource_bounds_json".into(), Value::String(bounds.to_json()?));
        patch.insert("tx_hash".into(), Value::String(tx_hash.to_hex()));
        patch.insert("ward_sig_json".into(), signature_json(Some(&ward_sig))?);
        patch.insert("ward_2fa_sig_json".into(), signature_json(ward_second.as_ref())?);

        let from = ApprovalStatus::PendingWardSig;
        let event = ApprovalEvent::WardSigned {
            needs_guardian: request.needs_guardian,
        };
        let to = transition(from, event)?;

        if request.needs_guardian {
            patch.insert("status".into(), json!(to));
            let updated = self
                .conditional_update(&request, from, Value::Object(patch))
                .await?;
            tracing::info!(request_id = %updated.id, tx_hash = %tx_hash, "Ward signed; awaiting guardian");
            self.audit_transition(&updated.id, from, to, event, None).await;
            return Ok(updated);
        }

        // Bind hash and signatures first (status unchanged) so a crash after
        // submission leaves enough on record to recognise the transaction.
        let bind_filter = {
            let base = Filter::new()
                .eq(columns::ID, &request.id)
                .eq(columns::STATUS, from);
            match request.tx_hash {
                Some(existing) => base.eq(columns::TX_HASH, existing.to_hex()),
                None => base.is_null(columns::TX_HASH),
            }
        };
        let bound = self
            .store
            .update(self.table(), &bind_filter, Value::Object(patch))
            .await?
            .into_iter()
            .next()
            .map(ApprovalRequest::from_record)
            .transpose()?;
        let Some(bound) = bound else {
            return Err(self.not_actionable(&request.id).await);
        };

        let signature = assemble(&bound, None, None)?;
        let final_hash = self.submit_and_confirm(&bound, signature).await?;

        let updated = self
            .conditional_update(
                &bound,
                from,
                json!({
                    "status": to,
                    "final_tx_hash": final_hash.to_hex(),
                    "responded_at": timestamp_now(),
                    "error_message": Value::Null,
                }),
            )
            .await?;
        tracing::info!(request_id = %updated.id, tx_hash = %final_hash, "Ward transaction approved");
        self.audit_transition(&updated.id, from, to, event, Some(final_hash))
            .await;
        Ok(updated)
    }

    /// Sign the stored transaction hash as the guardian and submit.
    ///
    /// The hash is taken from the request as the ward device computed it.
    pub async fn approve_as_guardian(&self, request_id: &str) -> Result<ApprovalRequest> {
        let _lock = self.guard.lock(request_id).await;
        let request = self
            .load_actionable(request_id, DeviceRole::Guardian)
            .await?;
        let (_, _, tx_hash) = request.bound_transaction()?.ok_or_else(|| {
            Error::InvalidArgument(format!("request {} has no bound transaction", request.id))
        })?;

        let (guardian_sig, guardian_second) = self
            .sign_with_device_keys(&tx_hash, request.needs_guardian_2fa)
            .await?;
        let signature = assemble(&request, Some(&guardian_sig), guardian_second.as_ref())?;
        let final_hash = self.submit_and_confirm(&request, signature).await?;

        let from = ApprovalStatus::PendingGuardian;
        let event = ApprovalEvent::GuardianSigned;
        let to = transition(from, event)?;
        let updated = self
            .conditional_update(
                &request,
                from,
                json!({
                    "status": to,
                    "guardian_sig_json": signature_json(Some(&guardian_sig))?,
                    "guardian_2fa_sig_json": signature_json(guardian_second.as_ref())?,
                    "final_tx_hash": final_hash.to_hex(),
                    "responded_at": timestamp_now(),
                    "error_message": Value::Null,
                }),
            )
            .await?;
        tracing::info!(request_id = %updated.id, tx_hash = %final_hash, "Guardian approved ward transaction");
        self.audit_transition(&updated.id, from, to, event, Some(final_hash))
            .await;
        Ok(updated)
    }

    /// Terminal rejection by whichever party the request is waiting on.
    pub async fn reject_request(&self, request_id: &str) -> Result<ApprovalRequest> {
        let _lock = self.guard.lock(request_id).await;
        let request = self.load(request_id).await?;
        self.ensure_live(&request).await?;

        let local = self.keys.account_address();
        let role = [DeviceRole::Ward, DeviceRole::Guardian]
            .into_iter()
            .find(|role| role.pending_status() == request.status && role.address_of(&request) == local);
        let Some(role) = role else {
            if local != request.ward_address && local != request.guardian_address {
                return Err(Error::Config(format!(
                    "This device is not a party to request {}",
                    request.id
                )));
            }
            return Err(Error::NotActionable {
                id: request.id,
                status: request.status,
            });
        };

        let from = request.status;
        let to = transition(from, ApprovalEvent::Rejected)?;
        let updated = self
            .conditional_update(
                &request,
                from,
                json!({ "status": to, "responded_at": timestamp_now() }),
            )
            .await?;
        tracing::info!(request_id = %updated.id, role = %role, "Ward request rejected");
        self.audit_transition(&updated.id, from, to, ApprovalEvent::Rejected, None)
            .await;
        Ok(updated)
    }

    /// Live requests waiting on `role` at `address`, newest first.
    pub async fn pending_for(&self, role: DeviceRole, address: &Felt) -> Result<Vec<ApprovalRequest>> {
        self.select_requests(&pending_filter(role, address)).await
    }

    /// Every request a ward has made, newest first.
    pub async fn history_for_ward(&self, ward_address: &Felt) -> Result<Vec<ApprovalRequest>> {
        let filter = Filter::new().eq(columns::WARD_ADDRESS, ward_address.to_hex());
        self.select_requests(&filter).await
    }

    /// Poll a request until it reaches a terminal status.
    pub async fn wait_for_resolution(&self, request_id: &str) -> Result<Felt> {
        loop {
            let request = self.load(request_id).await?;
            match request.status {
                ApprovalStatus::Approved => {
                    return request.final_tx_hash.ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "request {} approved without a final hash",
                            request.id
                        ))
                    });
                }
                ApprovalStatus::Rejected => {
                    return Err(Error::UserCancelled(format!(
                        "Request {} was rejected",
                        request.id
                    )));
                }
                ApprovalStatus::Expired => {
                    return Err(Error::Expired {
                        request_id: request.id,
                    });
                }
                _ => self.ensure_live(&request).await?,
            }
            tokio::time::sleep(self.settings.poll_interval()).await;
        }
    }

    pub async fn load(&self, request_id: &str) -> Result<ApprovalRequest> {
        let filter = Filter::new().eq(columns::ID, request_id);
        let record = self
            .store
            .select(self.table(), &filter, None)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown approval request {}", request_id)))?;
        ApprovalRequest::from_record(record)
    }

    async fn select_requests(&self, filter: &Filter) -> Result<Vec<ApprovalRequest>> {
        let rows = self
            .store
            .select(self.table(), filter, Some(&newest_first()))
            .await?;
        Ok(parse_requests(rows))
    }

    pub(crate) fn store(&self) -> Arc<dyn ApprovalStore> {
        self.store.clone()
    }

    /// Reload and check the request is live, addressed to this device as
    /// `role`, and waiting on that role.
    async fn load_actionable(&self, request_id: &str, role: DeviceRole) -> Result<ApprovalRequest> {
        let request = self.load(request_id).await?;
        if role.address_of(&request) != self.keys.account_address() {
            return Err(Error::Config(format!(
                "This device is not the {} for request {}",
                role, request.id
            )));
        }
        self.ensure_live(&request).await?;
        if request.status != role.pending_status() {
            return Err(Error::NotActionable {
                id: request.id,
                status: request.status,
            });
        }
        Ok(request)
    }

    /// Mark an out-of-date request expired and fail with `Expired`.
    async fn ensure_live(&self, request: &ApprovalRequest) -> Result<()> {
        if request.status.is_terminal() || !request.is_expired_at(Utc::now()) {
            return Ok(());
        }
        let from = request.status;
        let to = transition(from, ApprovalEvent::Expired)?;
        let filter = Filter::new()
            .eq(columns::ID, &request.id)
            .eq(columns::STATUS, from);
        match self.store.update(self.table(), &filter, json!({ "status": to })).await {
            Ok(rows) if !rows.is_empty() => {
                tracing::info!(request_id = %request.id, "Approval request expired");
                self.audit_transition(&request.id, from, to, ApprovalEvent::Expired, None)
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(request_id = %request.id, error = %e, "Failed to mark request expired");
            }
        }
        Err(Error::Expired {
            request_id: request.id.clone(),
        })
    }

    /// Fetch nonce, chain id and gas prices and compute the hash to sign.
    async fn bind_transaction(
        &self,
        request: &ApprovalRequest,
        calls: &CallSet,
    ) -> Result<(Felt, ResourceBounds, Felt)> {
        let nonce = self.chain.get_nonce(&request.ward_address).await?;
        let chain_id = self.chain.chain_id().await?;
        let prices = self.chain.block_gas_prices().await?;
        let bounds = ResourceBounds::from_gas_prices(
            &prices,
            &self.settings.gas_allowance,
            self.settings.price_margin_percent,
        );
        let calldata = calls.execute_calldata();
        let tx_hash = compute_invoke_v3_hash(&InvokeHashParams {
            sender_address: request.ward_address,
            calldata: &calldata,
            chain_id,
            nonce,
            resource_bounds: &bounds,
        })?;
        tracing::debug!(request_id = %request.id, nonce = %nonce, tx_hash = %tx_hash, "Computed transaction hash");
        Ok((nonce, bounds, tx_hash))
    }

    async fn sign_with_device_keys(
        &self,
        tx_hash: &Felt,
        needs_second: bool,
    ) -> Result<(SignaturePair, Option<SignaturePair>)> {
        let primary = self.keys.primary().sign_hash(tx_hash).await?;
        let second = if needs_second {
            let key = self.keys.secondary().ok_or_else(|| {
                Error::Config("Second-factor key is not available on this device".to_string())
            })?;
            Some(key.sign_hash(tx_hash).await?)
        } else {
            None
        };
        Ok((primary, second))
    }

    /// Broadcast the bound transaction and wait for its receipt.
    ///
    /// A hash the chain already knows is never broadcast again; a retry after
    /// a lost store write or an interrupted wait picks up the existing
    /// transaction instead. On failure the error is recorded on the request
    /// and the status is left alone. Network failures surface as such so the
    /// caller can retry; everything else is a chain rejection.
    async fn submit_and_confirm(
        &self,
        request: &ApprovalRequest,
        signature: crate::signature::AssembledSignature,
    ) -> Result<Felt> {
        let (nonce, bounds, tx_hash) = request.bound_transaction()?.ok_or_else(|| {
            Error::InvalidArgument(format!("request {} has no bound transaction", request.id))
        })?;

        let outcome = async {
            match self.chain.transaction_status(&tx_hash).await? {
                TxStatus::Executed(receipt) => {
                    tracing::info!(request_id = %request.id, tx_hash = %tx_hash, "Bound transaction already executed; not resubmitting");
                    receipt.into_result()
                }
                TxStatus::Received => {
                    tracing::info!(request_id = %request.id, tx_hash = %tx_hash, "Bound transaction already received; waiting");
                    self.chain.wait_for_transaction(&tx_hash).await?.into_result()
                }
                TxStatus::NotFound => {
                    let invoke = InvokeRequest::new(request.ward_address, request.call_set()?)
                        .pinned(nonce, bounds);
                    let signer = PresignedSigner::new(tx_hash, signature);
                    let submitted = self.chain.submit_invoke(invoke, &signer).await?;
                    self.chain
                        .wait_for_transaction(&submitted)
                        .await?
                        .into_result()
                }
            }
        }
        .await;

        match outcome {
            Ok(hash) => Ok(hash),
            Err(e) => {
                let message = match &e {
                    Error::ChainRejection(reason) => reason.clone(),
                    other => other.to_string(),
                };
                tracing::warn!(request_id = %request.id, error = %message, "Submission failed");
                let filter = Filter::new()
                    .eq(columns::ID, &request.id)
                    .eq(columns::STATUS, request.status);
                if let Err(write_err) = self
                    .store
                    .update(self.table(), &filter, json!({ "error_message": message }))
                    .await
                {
                    tracing::warn!(request_id = %request.id, error = %write_err, "Failed to record submission error");
                }
                if let Some(audit) = &self.audit {
                    audit
                        .record_submission_failure(&request.id, request.status, &message)
                        .await;
                }
                match e.kind() {
                    ErrorKind::Network | ErrorKind::ChainRejection => Err(e),
                    _ => Err(Error::ChainRejection(message)),
                }
            }
        }
    }

    async fn conditional_update(
        &self,
        request: &ApprovalRequest,
        expected: ApprovalStatus,
        patch: Value,
    ) -> Result<ApprovalRequest> {
        let filter = Filter::new()
            .eq(columns::ID, &request.id)
            .eq(columns::STATUS, expected);
        match self.store.update(self.table(), &filter, patch).await?.into_iter().next() {
            Some(row) => ApprovalRequest::from_record(row),
            None => Err(self.not_actionable(&request.id).await),
        }
    }

    async fn not_actionable(&self, request_id: &str) -> Error {
        match self.load(request_id).await {
            Ok(current) => Error::NotActionable {
                id: current.id,
                status: current.status,
            },
            Err(e) => e,
        }
    }

    async fn audit_transition(
        &self,
        request_id: &str,
        from: ApprovalStatus,
        to: ApprovalStatus,
        event: ApprovalEvent,
        tx_hash: Option<Felt>,
    ) {
        if let Some(audit) = &self.audit {
            audit
                .record_transition(request_id, from, to, event, tx_hash)
                .await;
        }
    }
}

#[async_trait]
impl WardExecutor for WardApprovalCoordinator {
    /// Create the request, sign it as the ward on this device and wait for
    /// the guardian when one is needed.
    async fn execute_ward(&self, intent: &TransactionIntent, calls: CallSet) -> Result<TxOutcome> {
        let request = self.initiate_ward_transaction(intent, calls).await?;
        let signed = self.approve_as_ward(&request.id).await?;
        let tx_hash = match signed.final_tx_hash {
            Some(hash) => hash,
            None => self.wait_for_resolution(&signed.id).await?,
        };
        Ok(TxOutcome { tx_hash })
    }
}
