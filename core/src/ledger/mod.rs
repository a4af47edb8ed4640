//! Ledger client: reads and signed writes against the complaint registry.
//!
//! RULES:
//!   - Writes come from one pre-funded operational signer. The complaint
//!     owner is a call argument, never the transaction sender.
//!   - Reads fail soft: connectivity loss is logged and answered with
//!     absent / empty / false, never surfaced as a data error.
//!   - Nonce assignment, signing and broadcast happen under one lock so
//!     concurrent submissions get strictly increasing nonces.
//!
//! Submission tries each `SubmitStrategy` in `SubmitStrategy::ORDER` and
//! stops at the first one that is mined successfully. All strategies of one
//! submission share a single receipt deadline. Status updates are a single
//! `updateComplaintStatus` write through the same pipeline.

pub mod abi;
pub mod address;
pub mod hash;
pub mod rpc;
pub mod tx;

use crate::{
    clock::{format_timestamp, from_unix_seconds},
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
};
use abi::Token;
use address::ChainAddress;
use rpc::{CallRequest, JsonRpcTransport, RpcTransport, TransactionReceipt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tx::{LegacyTransaction, Signer};
use uuid::Uuid;

const WEI_PER_ETH: f64 = 1e18;

/// The registry entry as returned by `getComplaint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainComplaint {
    pub owner: ChainAddress,
    pub digest: String,
    pub department: String,
    pub status: String,
    /// Block timestamp of the submission, unix seconds.
    pub timestamp: u64,
}

impl OnChainComplaint {
    pub fn formatted_date(&self) -> String {
        from_unix_seconds(self.timestamp)
            .map(|ts| format_timestamp(&ts))
            .unwrap_or_default()
    }

    /// Unknown references come back zeroed from registries that do not revert.
    fn is_empty(&self) -> bool {
        self.owner == ChainAddress::ZERO && self.timestamp == 0
    }
}

/// Ordered write strategies. The legacy registry predates per-user
/// ownership and has no owner parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStrategy {
    ForUser,
    Legacy,
}

impl SubmitStrategy {
    pub const ORDER: [SubmitStrategy; 2] = [SubmitStrategy::ForUser, SubmitStrategy::Legacy];

    pub fn signature(&self) -> &'static str {
        match self {
            Self::ForUser => abi::SUBMIT_FOR_USER,
            Self::Legacy => abi::SUBMIT_LEGACY,
        }
    }

    /// Only the primary call is estimated; the fallback goes straight to
    /// the configured ceiling.
    pub fn estimates_gas(&self) -> bool {
        matches!(self, Self::ForUser)
    }

    pub fn encode(&self, anchor: &ComplaintAnchor<'_>, owner: ChainAddress) -> Vec<u8> {
        let mut args = vec![
            Token::Str(anchor.reference_no.to_string()),
            Token::Str(anchor.digest.to_string()),
            Token::Str(anchor.department.to_string()),
            Token::Str(anchor.status.to_string()),
        ];
        if *self == Self::ForUser {
            args.push(Token::Address(owner));
        }
        abi::encode_call(self.signature(), &args)
    }
}

/// Arguments of one registry write.
#[derive(Debug, Clone, Copy)]
pub struct ComplaintAnchor<'a> {
    pub reference_no: &'a str,
    pub digest: &'a str,
    pub department: &'a str,
    pub status: &'a str,
    pub owner: &'a str,
}

/// A fully encoded registry write and how to price it.
#[derive(Debug, Clone)]
struct WritePlan {
    function: &'static str,
    /// Set for complaint submissions; status updates have no fallback.
    strategy: Option<SubmitStrategy>,
    data: Vec<u8>,
    estimate_gas: bool,
}

impl WritePlan {
    fn submission(strategy: SubmitStrategy, anchor: &ComplaintAnchor<'_>, owner: ChainAddress) -> Self {
        Self {
            function: strategy.signature(),
            strategy: Some(strategy),
            data: strategy.encode(anchor, owner),
            estimate_gas: strategy.estimates_gas(),
        }
    }

    fn status_update(reference_no: &str, status: &str) -> Self {
        Self {
            function: abi::UPDATE_STATUS,
            strategy: None,
            data: abi::encode_call(
                abi::UPDATE_STATUS,
                &[Token::Str(reference_no.to_string()), Token::Str(status.to_string())],
            ),
            estimate_gas: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerLinks {
    pub transaction: String,
    pub contract: String,
}

/// Typed result of a registry write. Exactly one of `tx_hash` / `error`
/// is set; `strategy` is only set for complaint submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub success: bool,
    pub strategy: Option<SubmitStrategy>,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub gas_limit: Option<u64>,
    pub gas_used: Option<u64>,
    pub cost_eth: Option<f64>,
    pub network: Option<String>,
    pub explorer: Option<ExplorerLinks>,
    pub error: Option<String>,
}

impl SubmissionReceipt {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            strategy: None,
            tx_hash: None,
            block_number: None,
            gas_limit: None,
            gas_used: None,
            cost_eth: None,
            network: None,
            explorer: None,
            error: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub connected: bool,
    pub contract_bound: bool,
    pub chain_id: Option<u64>,
    pub latest_block: Option<u64>,
    pub network_name: String,
    pub is_testnet: bool,
    pub explorer_url: String,
    pub contract_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub tx_hash: String,
    pub block_number: u64,
    pub confirmations: u64,
    pub gas_used: u64,
    pub gas_price: u128,
    pub cost_eth: f64,
    pub status: String,
    pub timestamp: Option<u64>,
    pub explorer_url: String,
    pub from_address: String,
    pub to_address: Option<String>,
}

/// What the reconciliation engine needs from a ledger.
pub trait ComplaintLedger: Send + Sync {
    fn is_available(&self) -> bool;
    fn submit(&self, anchor: &ComplaintAnchor<'_>) -> SubmissionReceipt;
    /// Moves an anchored complaint to a new lifecycle status.
    fn update_status(&self, reference_no: &str, status: &str) -> SubmissionReceipt;
    fn read_by_id(&self, reference_no: &str) -> Option<OnChainComplaint>;
    fn read_by_owner(&self, owner: &str) -> Vec<String>;
    fn verify_ownership(&self, reference_no: &str, owner: &str) -> bool;
}

impl<L: ComplaintLedger + ?Sized> ComplaintLedger for Arc<L> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }
    fn submit(&self, anchor: &ComplaintAnchor<'_>) -> SubmissionReceipt {
        (**self).submit(anchor)
    }
    fn update_status(&self, reference_no: &str, status: &str) -> SubmissionReceipt {
        (**self).update_status(reference_no, status)
    }
    fn read_by_id(&self, reference_no: &str) -> Option<OnChainComplaint> {
        (**self).read_by_id(reference_no)
    }
    fn read_by_owner(&self, owner: &str) -> Vec<String> {
        (**self).read_by_owner(owner)
    }
    fn verify_ownership(&self, reference_no: &str, owner: &str) -> bool {
        (**self).verify_ownership(reference_no, owner)
    }
}

pub fn network_name(chain_id: u64) -> String {
    match chain_id {
        1 => "Ethereum Mainnet".into(),
        11155111 => "Sepolia Testnet".into(),
        5 => "Goerli Testnet".into(),
        137 => "Polygon Mainnet".into(),
        80001 => "Mumbai Testnet".into(),
        other => format!("Unknown Network (Chain ID: {other})"),
    }
}

fn wei_to_eth(wei: u128) -> f64 {
    wei as f64 / WEI_PER_ETH
}

/// Applies the fee margin over a gas estimate, rounding down.
pub fn apply_fee_margin(estimate: u64, margin: f64) -> u64 {
    (estimate as f64 * margin) as u64
}

#[derive(Debug, Clone, Default)]
struct ConnectionState {
    connected: bool,
    contract_bound: bool,
    chain_id: Option<u64>,
    latest_block: Option<u64>,
}

pub struct LedgerClient<T: RpcTransport> {
    transport: T,
    config: LedgerConfig,
    contract: Option<ChainAddress>,
    signer: Option<Signer>,
    state: RwLock<ConnectionState>,
    /// Next nonce to use; `None` forces a resync from the node.
    nonce: Mutex<Option<u64>>,
}

impl LedgerClient<JsonRpcTransport> {
    /// Client over HTTP JSON-RPC at `config.rpc_url`.
    pub fn from_config(config: LedgerConfig, signer_key: Option<&str>) -> Self {
        let transport = JsonRpcTransport::new(
            &config.rpc_url,
            config.connect_timeout_ms,
            config.request_timeout_ms,
        );
        Self::connect(config, signer_key, transport)
    }
}

impl<T: RpcTransport> LedgerClient<T> {
    /// Builds the client and checks the node once. Never fails: an
    /// unreachable node or unbound contract leaves the client unavailable.
    pub fn connect(config: LedgerConfig, signer_key: Option<&str>, transport: T) -> Self {
        let contract = match config.contract_address.as_deref() {
            Some(raw) => match ChainAddress::parse(raw) {
                Ok(addr) => Some(addr),
                Err(e) => {
                    log::warn!("Contract address rejected: {e}");
                    None
                }
            },
            None => {
                log::warn!("No contract address configured; ledger writes disabled");
                None
            }
        };
        let signer = match signer_key {
            Some(key) => match Signer::from_hex_key(key) {
                Ok(s) => {
                    log::info!("Ledger signer {}", s.address());
                    Some(s)
                }
                Err(e) => {
                    log::warn!("Signer key rejected: {e}");
                    None
                }
            },
            None => None,
        };

        let client = Self {
            transport,
            config,
            contract,
            signer,
            state: RwLock::new(ConnectionState::default()),
            nonce: Mutex::new(None),
        };
        client.refresh();
        client
    }

    /// Re-checks connectivity and the contract binding.
    pub fn refresh(&self) -> bool {
        let mut next = ConnectionState::default();
        match self.transport.chain_id().and_then(|id| Ok((id, self.transport.block_number()?))) {
            Ok((chain_id, block)) => {
                next.connected = true;
                next.chain_id = Some(chain_id);
                next.latest_block = Some(block);
            }
            Err(e) => log::warn!("Ledger node unreachable at {}: {e}", self.config.rpc_url),
        }
        if next.connected {
            if let Some(contract) = &self.contract {
                match self.transport.code_at(contract) {
                    Ok(code) if !code.is_empty() => next.contract_bound = true,
                    Ok(_) => log::warn!("No contract code at {contract}"),
                    Err(e) => log::warn!("Contract binding check failed: {e}"),
                }
            }
        }
        if next.connected && next.contract_bound {
            log::info!(
                "Connected to {} (block {})",
                network_name(next.chain_id.unwrap_or_default()),
                next.latest_block.unwrap_or_default()
            );
        }
        let available = next.connected && next.contract_bound;
        *self.state.write().unwrap_or_else(|p| p.into_inner()) = next;
        available
    }

    fn state(&self) -> ConnectionState {
        self.state.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn mark_disconnected(&self, err: &LedgerError) {
        if err.is_connectivity() {
            self.state.write().unwrap_or_else(|p| p.into_inner()).connected = false;
        }
    }

    pub fn signer_address(&self) -> Option<ChainAddress> {
        self.signer.as_ref().map(Signer::address)
    }

    pub fn network_info(&self) -> NetworkInfo {
        let state = self.state();
        NetworkInfo {
            connected: state.connected,
            contract_bound: state.contract_bound,
            chain_id: state.chain_id,
            latest_block: state.latest_block,
            network_name: state
                .chain_id
                .map(network_name)
                .unwrap_or_else(|| "Unknown Network".into()),
            is_testnet: self.config.is_testnet(),
            explorer_url: self.config.explorer_url(),
            contract_address: self.contract.map(|c| c.to_checksum()),
        }
    }

    fn explorer_links(&self, tx_hash: &str) -> Option<ExplorerLinks> {
        let contract = self.contract?;
        let base = self.config.explorer_url();
        Some(ExplorerLinks {
            transaction: format!("{base}/tx/{tx_hash}"),
            contract: format!("{base}/address/{contract}"),
        })
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Checks shared by every registry write: binding, signer, a fresh
    /// connectivity check and the balance floor.
    fn prepare_write(&self) -> LedgerResult<(ChainAddress, &Signer, u64)> {
        let contract = self
            .contract
            .ok_or_else(|| LedgerError::Connectivity("no contract bound".into()))?;
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| LedgerError::Connectivity("no signer configured".into()))?;

        if !self.refresh() {
            return Err(LedgerError::Connectivity("Blockchain not available".into()));
        }
        let chain_id = self
            .state()
            .chain_id
            .ok_or_else(|| LedgerError::Connectivity("chain id unknown".into()))?;

        let balance = self.transport.balance(&signer.address())?;
        if balance < u128::from(self.config.min_balance_wei) {
            return Err(LedgerError::InsufficientFunds {
                balance_eth: wei_to_eth(balance),
            });
        }
        Ok((contract, signer, chain_id))
    }

    /// One confirmation budget per logical write, shared by its fallbacks.
    fn receipt_deadline(&self) -> Instant {
        Instant::now() + Duration::from_secs(self.config.receipt_timeout_secs)
    }

    fn try_submit(
        &self,
        anchor: &ComplaintAnchor<'_>,
        attempt_id: Uuid,
    ) -> LedgerResult<SubmissionReceipt> {
        if anchor.reference_no.trim().is_empty() {
            return Err(LedgerError::InvalidInput("reference number is empty".into()));
        }
        let owner = ChainAddress::parse(anchor.owner)?;
        let (contract, signer, chain_id) = self.prepare_write()?;
        let deadline = self.receipt_deadline();

        let mut last_err = None;
        for strategy in SubmitStrategy::ORDER {
            let plan = WritePlan::submission(strategy, anchor, owner);
            match self.execute(&plan, contract, signer, chain_id, deadline) {
                Ok(receipt) => {
                    log::info!(
                        "[{attempt_id}] {} anchored via {strategy:?} in block {}",
                        anchor.reference_no,
                        receipt.block_number.unwrap_or_default()
                    );
                    return Ok(receipt);
                }
                Err(e) => {
                    log::warn!("[{attempt_id}] {strategy:?} submission failed: {e}");
                    self.mark_disconnected(&e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| LedgerError::Connectivity("no strategy attempted".into())))
    }

    fn try_update_status(
        &self,
        reference_no: &str,
        status: &str,
        attempt_id: Uuid,
    ) -> LedgerResult<SubmissionReceipt> {
        let (reference_no, status) = (reference_no.trim(), status.trim());
        if reference_no.is_empty() {
            return Err(LedgerError::InvalidInput("reference number is empty".into()));
        }
        if status.is_empty() {
            return Err(LedgerError::InvalidInput("status is empty".into()));
        }
        let (contract, signer, chain_id) = self.prepare_write()?;

        let plan = WritePlan::status_update(reference_no, status);
        let receipt = self
            .execute(&plan, contract, signer, chain_id, self.receipt_deadline())
            .inspect_err(|e| self.mark_disconnected(e))?;
        log::info!(
            "[{attempt_id}] {reference_no} moved to '{status}' in block {}",
            receipt.block_number.unwrap_or_default()
        );
        Ok(receipt)
    }

    /// Estimate (or ceiling) → nonce → sign → broadcast → receipt.
    fn execute(
        &self,
        plan: &WritePlan,
        contract: ChainAddress,
        signer: &Signer,
        chain_id: u64,
        deadline: Instant,
    ) -> LedgerResult<SubmissionReceipt> {
        let gas_limit = if plan.estimate_gas {
            let call = CallRequest {
                from: Some(signer.address()),
                to: contract,
                data: plan.data.clone(),
            };
            match self.transport.estimate_gas(&call) {
                Ok(estimate) => apply_fee_margin(estimate, self.config.fee_margin),
                Err(e) => {
                    let e = LedgerError::EstimationFailure(e.to_string());
                    log::warn!("{}: {e}; using gas ceiling {}", plan.function, self.config.gas_limit);
                    self.config.gas_limit
                }
            }
        } else {
            self.config.gas_limit
        };
        let gas_price = self.config.gas_price_wei();
        log::debug!(
            "{}: gas_limit={gas_limit} gas_price={gas_price} max_cost={:.6} ETH",
            plan.function,
            wei_to_eth(u128::from(gas_limit) * gas_price)
        );

        let tx_hash = self.broadcast(signer, |nonce| LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to: contract,
            value: 0,
            data: plan.data.clone(),
            chain_id,
        })?;
        log::info!("Transaction sent: {tx_hash}");

        let receipt = self.wait_for_receipt(&tx_hash, deadline)?;
        if !receipt.succeeded {
            return Err(LedgerError::Reverted(receipt.tx_hash));
        }
        let price = receipt.effective_gas_price.unwrap_or(gas_price);
        Ok(SubmissionReceipt {
            success: true,
            strategy: plan.strategy,
            explorer: self.explorer_links(&receipt.tx_hash),
            tx_hash: Some(receipt.tx_hash),
            block_number: Some(receipt.block_number),
            gas_limit: Some(gas_limit),
            gas_used: Some(receipt.gas_used),
            cost_eth: Some(wei_to_eth(u128::from(receipt.gas_used) * price)),
            network: self.state().chain_id.map(network_name),
            error: None,
        })
    }

    /// Fetch nonce → build → sign → broadcast, serialized per signer.
    fn broadcast(
        &self,
        signer: &Signer,
        build: impl FnOnce(u64) -> LegacyTransaction,
    ) -> LedgerResult<String> {
        let mut next = self.nonce.lock().unwrap_or_else(|p| p.into_inner());
        let node_nonce = self.transport.pending_nonce(&signer.address())?;
        let nonce = next.map_or(node_nonce, |local| local.max(node_nonce));
        log::debug!("Using nonce {nonce} for {}", signer.address());

        let signed = build(nonce).sign(signer)?;
        match self.transport.send_raw_transaction(&signed.raw) {
            Ok(hash) => {
                *next = Some(nonce + 1);
                Ok(hash)
            }
            Err(e) => {
                *next = None;
                Err(e)
            }
        }
    }

    /// Polls for the receipt until mined or `deadline` passes. Abandoning
    /// the wait does not withdraw the transaction.
    fn wait_for_receipt(
        &self,
        tx_hash: &str,
        deadline: Instant,
    ) -> LedgerResult<TransactionReceipt> {
        let poll = Duration::from_millis(self.config.receipt_poll_ms);
        loop {
            if let Some(receipt) = self.transport.transaction_receipt(tx_hash)? {
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(LedgerError::ReceiptTimeout {
                    tx_hash: tx_hash.to_string(),
                    timeout_secs: self.config.receipt_timeout_secs,
                });
            }
            std::thread::sleep(poll);
        }
    }

    // ── Reads ──────────────────────────────────────────────────────

    fn read_call(&self, what: &str, data: Vec<u8>) -> Option<Vec<u8>> {
        let Some(contract) = self.contract else {
            log::warn!("{what}: blockchain not connected");
            return None;
        };
        let call = CallRequest {
            from: None,
            to: contract,
            data,
        };
        match self.transport.call(&call) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("{what} failed: {e}");
                self.mark_disconnected(&e);
                None
            }
        }
    }

    pub fn transaction_details(&self, tx_hash: &str) -> Option<TransactionDetails> {
        let lookup = || -> LedgerResult<Option<TransactionDetails>> {
            let Some(info) = self.transport.transaction(tx_hash)? else {
                return Ok(None);
            };
            let Some(receipt) = self.transport.transaction_receipt(tx_hash)? else {
                return Ok(None);
            };
            let current = self.transport.block_number()?;
            let hash = if tx_hash.starts_with("0x") {
                tx_hash.to_string()
            } else {
                format!("0x{tx_hash}")
            };
            Ok(Some(TransactionDetails {
                block_number: receipt.block_number,
                confirmations: current.saturating_sub(receipt.block_number),
                gas_used: receipt.gas_used,
                gas_price: info.gas_price,
                cost_eth: wei_to_eth(u128::from(receipt.gas_used) * info.gas_price),
                status: if receipt.succeeded { "Success" } else { "Failed" }.into(),
                timestamp: self.transport.block_timestamp(receipt.block_number)?,
                explorer_url: format!("{}/tx/{hash}", self.config.explorer_url()),
                from_address: info.from,
                to_address: info.to,
                tx_hash: hash,
            }))
        };
        match lookup() {
            Ok(details) => details,
            Err(e) => {
                log::warn!("Transaction details for {tx_hash} unavailable: {e}");
                self.mark_disconnected(&e);
                None
            }
        }
    }
}

impl<T: RpcTransport> ComplaintLedger for LedgerClient<T> {
    fn is_available(&self) -> bool {
        let state = self.state();
        state.connected && state.contract_bound
    }

    fn submit(&self, anchor: &ComplaintAnchor<'_>) -> SubmissionReceipt {
        let attempt_id = Uuid::new_v4();
        match self.try_submit(anchor, attempt_id) {
            Ok(receipt) => receipt,
            Err(e) => {
                log::error!("[{attempt_id}] Ledger submission of {} failed: {e}", anchor.reference_no);
                SubmissionReceipt::failed(e.to_string())
            }
        }
    }

    fn update_status(&self, reference_no: &str, status: &str) -> SubmissionReceipt {
        let attempt_id = Uuid::new_v4();
        match self.try_update_status(reference_no, status, attempt_id) {
            Ok(receipt) => receipt,
            Err(e) => {
                log::error!("[{attempt_id}] Status update of {reference_no} failed: {e}");
                SubmissionReceipt::failed(e.to_string())
            }
        }
    }

    fn read_by_id(&self, reference_no: &str) -> Option<OnChainComplaint> {
        let data = abi::encode_call(abi::GET_COMPLAINT, &[Token::Str(reference_no.to_string())]);
        let bytes = self.read_call("getComplaint", data)?;
        match abi::decode_complaint(&bytes) {
            Ok(c) if c.is_empty() => None,
            Ok(c) => Some(c),
            Err(e) => {
                log::warn!("getComplaint({reference_no}) returned malformed data: {e}");
                None
            }
        }
    }

    fn read_by_owner(&self, owner: &str) -> Vec<String> {
        let Ok(owner) = ChainAddress::parse(owner) else {
            log::warn!("getUserComplaints: invalid address '{owner}'");
            return Vec::new();
        };
        let data = abi::encode_call(abi::GET_USER_COMPLAINTS, &[Token::Address(owner)]);
        let Some(bytes) = self.read_call("getUserComplaints", data) else {
            return Vec::new();
        };
        match abi::decode_string_array(&bytes) {
            Ok(refs) => {
                log::debug!("Ledger reports {} complaints for {owner}", refs.len());
                refs
            }
            Err(e) => {
                log::warn!("getUserComplaints({owner}) returned malformed data: {e}");
                Vec::new()
            }
        }
    }

    fn verify_ownership(&self, reference_no: &str, owner: &str) -> bool {
        let Ok(owner) = ChainAddress::parse(owner) else {
            return false;
        };
        let data = abi::encode_call(
            abi::VERIFY_OWNERSHIP,
            &[Token::Str(reference_no.to_string()), Token::Address(owner)],
        );
        self.read_call("verifyComplaintOwnership", data)
            .and_then(|bytes| abi::decode_bool(&bytes).ok())
            .unwrap_or(false)
    }
}
