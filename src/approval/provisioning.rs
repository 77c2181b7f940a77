//! Ward account provisioning
//!
//! Deploy the ward account, wait for the deployment to land, then register
//! the ward/guardian relationship in the store. A local checkpoint is
//! written after every step so an interrupted run ("partial ward") resumes
//! where it stopped instead of deploying a second account.

use crate::chain::ChainClient;
use crate::felt::Felt;
use crate::store::{ApprovalStore, Filter};
use crate::{Error, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_RELATIONSHIPS_TABLE: &str = "ward_relationships";

/// Parameters for deploying a ward account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardDeployment {
    pub guardian_address: Felt,
    /// Public key of the ward's primary signing key.
    pub public_key: Felt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedWard {
    pub address: Felt,
    pub tx_hash: Felt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStep {
    Deploying,
    AwaitingDeployment,
    Registering,
    Complete,
}

/// Checkpoint of an in-progress provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialWard {
    pub guardian_address: Felt,
    pub ward_public_key: Felt,
    #[serde(default)]
    pub ward_address: Option<Felt>,
    #[serde(default)]
    pub deploy_tx_hash: Option<Felt>,
    pub step: ProvisioningStep,
}

impl PartialWard {
    fn new(deployment: &WardDeployment) -> Self {
        Self {
            guardian_address: deployment.guardian_address,
            ward_public_key: deployment.public_key,
            ward_address: None,
            deploy_tx_hash: None,
            step: ProvisioningStep::Deploying,
        }
    }

    fn deployment(&self) -> WardDeployment {
        WardDeployment {
            guardian_address: self.guardian_address,
            public_key: self.ward_public_key,
        }
    }
}

pub struct WardProvisioner {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn ApprovalStore>,
    checkpoint_path: PathBuf,
    relationships_table: String,
}

impl WardProvisioner {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn ApprovalStore>,
        checkpoint_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            chain,
            store,
            checkpoint_path: checkpoint_path.into(),
            relationships_table: DEFAULT_RELATIONSHIPS_TABLE.to_string(),
        }
    }

    pub fn with_relationships_table(mut self, table: impl Into<String>) -> Self {
        self.relationships_table = table.into();
        self
    }

    /// An unfinished run left on this device, if any.
    pub fn detect_partial(&self) -> Result<Option<PartialWard>> {
        Ok(load_checkpoint(&self.checkpoint_path)?
            .filter(|cp| cp.step != ProvisioningStep::Complete))
    }

    /// Provision a ward, resuming a matching unfinished run.
    pub async fn provision(&self, deployment: WardDeployment) -> Result<Felt> {
        let checkpoint = match self.detect_partial()? {
            Some(partial) if partial.deployment() == deployment => {
                tracing::info!(step = ?partial.step, "Resuming partial ward");
                partial
            }
            Some(partial) => {
                return Err(Error::Config(format!(
                    "An unfinished ward for guardian {} exists; resume it first",
                    partial.guardian_address
                )));
            }
            None => {
                let fresh = PartialWard::new(&deployment);
                save_checkpoint(&self.checkpoint_path, &fresh)?;
                fresh
            }
        };
        self.run(checkpoint).await
    }

    /// Finish an interrupted run.
    pub async fn resume(&self) -> Result<Felt> {
        let partial = self
            .detect_partial()?
            .ok_or_else(|| Error::Config("No partial ward to resume".to_string()))?;
        self.run(partial).await
    }

    async fn run(&self, mut cp: PartialWard) -> Result<Felt> {
        loop {
            match cp.step {
                ProvisioningStep::Deploying => {
                    if cp.ward_address.is_none() {
                        let deployed = self.chain.deploy_ward(&cp.deployment()).await?;
                        tracing::info!(address = %deployed.address, tx_hash = %deployed.tx_hash, "Ward deployment submitted");
                        cp.ward_address = Some(deployed.address);
                        cp.deploy_tx_hash = Some(deployed.tx_hash);
                    }
                    cp.step = ProvisioningStep::AwaitingDeployment;
                }
                ProvisioningStep::AwaitingDeployment => {
                    let address = self.ward_address(&cp)?;
                    if !self.chain.is_deployed(&address).await? {
                        let tx_hash = cp.deploy_tx_hash.ok_or_else(|| {
                            Error::InvalidArgument("checkpoint has no deployment hash".to_string())
                        })?;
                        self.chain.wait_for_transaction(&tx_hash).await?.into_result()?;
                    }
                    cp.step = ProvisioningStep::Registering;
                }
                ProvisioningStep::Registering => {
                    let address = self.ward_address(&cp)?;
                    self.register(address, cp.guardian_address).await?;
                    cp.step = ProvisioningStep::Complete;
                }
                ProvisioningStep::Complete => {
                    let address = self.ward_address(&cp)?;
                    tracing::info!(address = %address, guardian = %cp.guardian_address, "Ward provisioned");
                    return Ok(address);
                }
            }
            save_checkpoint(&self.checkpoint_path, &cp)?;
        }
    }

    fn ward_address(&self, cp: &PartialWard) -> Result<Felt> {
        cp.ward_address
            .ok_or_else(|| Error::InvalidArgument("checkpoint has no ward address".to_string()))
    }

    async fn register(&self, ward: Felt, guardian: Felt) -> Result<()> {
        let filter = Filter::new()
            .eq("ward_address", ward.to_hex())
            .eq("guardian_address", guardian.to_hex());
        let existing = self
            .store
            .select(&self.relationships_table, &filter, None)
            .await?;
        if !existing.is_empty() {
            tracing::debug!(ward = %ward, "Relationship already registered");
            return Ok(());
        }
        self.store
            .insert(
                &self.relationships_table,
                json!({
                    "ward_address": ward.to_hex(),
                    "guardian_address": guardian.to_hex(),
                    "status": "active",
                    "created_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                }),
            )
            .await?;
        Ok(())
    }
}

fn load_checkpoint(path: &Path) -> Result<Option<PartialWard>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write via a temporary file so a crash never leaves a torn checkpoint.
fn save_checkpoint(path: &Path, checkpoint: &PartialWard) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(checkpoint)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
