//! Relayed withdrawal coordinator.
//!
//! One withdrawal runs proof generation, relayer submission and job polling
//! in a background task, with every transition persisted before it is
//! announced. Polling is unbounded: a relayed transaction can idle in the
//! mempool for hours, and giving up locally would strand a job that later
//! mines. Transport errors during polling are retried silently; only the
//! relayer's own verdict ends a job.
//!
//! The spent flag on the backing note is the one write that must not happen
//! blindly: it is applied only while the host vault is unlocked and the
//! active network still matches the withdrawal. Anything else risks writing
//! through to the wrong network's state.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex as StateMutex;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use web3::signing::keccak256;
use web3::types::{TransactionReceipt, H256, U256};

use crate::chain::{apply_gas_lower_cap, ChainRpc, GasPriceSource};
use crate::config::{chain_profile, parse_address, pool_instance, EngineConfig, Pair};
use crate::error::{ClientError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::fees::{calculate_fee_and_total, FeeQuote, TokenQuote};
use crate::notes::{DepositNote, NoteVault};
use crate::prover::ProofGenerator;
use crate::relayer::{
    normalize_relayer_error, RelayerApi, RelayerJob, RelayerJobStatus, RelayerStatus,
    WithdrawalSubmission,
};
use crate::wallet::{NoteSecrets, WalletContext};
use crate::withdraw::queue::WithdrawalQueue;
use crate::withdraw::record::{PendingWithdrawal, WithdrawalStatus};

/// Contract methods recognized when labeling a mined transaction.
const KNOWN_METHOD_SIGNATURES: &[&str] = &[
    "withdraw(bytes,bytes32,bytes32,address,address,uint256,uint256)",
    "deposit(bytes32)",
];

/// A request to withdraw one denomination through a relayer.
#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub chain_id: u64,
    pub pair: Pair,
    /// Recipient address, 0x-prefixed hex.
    pub to_address: String,
    pub relayer_url: String,
    /// Specific note to spend. `None` picks one at random among the
    /// spendable notes of the pair.
    pub note_id: Option<String>,
    /// Total fee the user accepted, in the pair's smallest unit.
    pub fee: U256,
}

/// One relayer job poll: either keep waiting or stop with a verdict.
enum PollOutcome {
    Pending,
    Terminal(RelayerJob),
}

/// Cheap to clone; background tasks run on their own clone while the
/// active-poll registry stays shared.
#[derive(Clone)]
pub struct WithdrawalCoordinator {
    config: EngineConfig,
    queue: Arc<WithdrawalQueue>,
    vault: NoteVault,
    bus: EventBus,
    chain: Arc<dyn ChainRpc>,
    relayer: Arc<dyn RelayerApi>,
    gas: Arc<dyn GasPriceSource>,
    prover: Arc<dyn ProofGenerator>,
    secrets: Arc<dyn NoteSecrets>,
    wallet: Arc<dyn WalletContext>,
    /// Pending ids with a live driver or poller task, so repeated
    /// reconciliation passes never double-poll a job.
    active: Arc<StateMutex<HashSet<String>>>,
}

impl WithdrawalCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        queue: Arc<WithdrawalQueue>,
        vault: NoteVault,
        bus: EventBus,
        chain: Arc<dyn ChainRpc>,
        relayer: Arc<dyn RelayerApi>,
        gas: Arc<dyn GasPriceSource>,
        prover: Arc<dyn ProofGenerator>,
        secrets: Arc<dyn NoteSecrets>,
        wallet: Arc<dyn WalletContext>,
    ) -> Self {
        Self {
            config,
            queue,
            vault,
            bus,
            chain,
            relayer,
            gas,
            prover,
            secrets,
            wallet,
            active: Arc::new(StateMutex::new(HashSet::new())),
        }
    }

    /// Quote the relayer fee for withdrawing one denomination of `pair`.
    pub async fn quote_fee(&self, chain_id: u64, pair: &Pair, relayer_url: &str) -> Result<FeeQuote> {
        let status = self.relayer.status(relayer_url).await?;
        check_relayer(chain_id, &status)?;

        let profile = chain_profile(chain_id);
        let mut levels = self.gas.get_gas_price_levels(chain_id).await?;
        if let Some(cap) = profile.gas_lower_cap_gwei {
            levels = apply_gas_lower_cap(levels, cap)?;
        }

        let pool = pool_instance(chain_id, pair)?;
        let token = if pool.native {
            None
        } else {
            Some(TokenQuote {
                decimals: Some(pool.decimals),
                price_wei: status.token_price_wei(&pair.currency),
            })
        };

        calculate_fee_and_total(profile, pair, status.service_fee_percent, &levels, token.as_ref())
    }

    /// Start a relayed withdrawal and return its pending id.
    ///
    /// The record is persisted as `UNSUBMITTED` before this returns; proof
    /// generation and everything after run in a background task whose
    /// progress surfaces through the event bus and the stored record.
    pub async fn withdraw(&self, request: WithdrawRequest) -> Result<String> {
        parse_address(&request.to_address)?;
        pool_instance(request.chain_id, &request.pair)?;

        let status = self.relayer.status(&request.relayer_url).await?;
        check_relayer(request.chain_id, &status)?;

        let note = self.select_note(&request)?;
        let record = PendingWithdrawal::new(
            request.chain_id,
            request.pair.clone(),
            note.id.clone(),
            request.to_address.clone(),
            request.relayer_url.clone(),
            Some(request.fee.to_string()),
        );
        self.queue.insert(&record).await?;
        info!("withdrawal {} created for pair {}", record.pending_id, record.pair);

        let this = self.clone();
        let pending_id = record.pending_id.clone();
        let reward_account = status.reward_account;
        self.active.lock().insert(record.pending_id.clone());
        tokio::spawn(async move {
            this.drive(record, note, reward_account).await;
        });
        Ok(pending_id)
    }

    /// Resume polling an accepted job, e.g. after a restart. A job already
    /// being polled is left alone.
    pub fn resume_polling(&self, record: &PendingWithdrawal) {
        let job_id = match &record.job_id {
            Some(id) => id.clone(),
            None => return,
        };
        if !self.active.lock().insert(record.pending_id.clone()) {
            debug!("withdrawal {} is already being polled", record.pending_id);
            return;
        }
        info!("resuming poll of withdrawal {} (job {})", record.pending_id, job_id);

        let this = self.clone();
        let record = record.clone();
        tokio::spawn(async move {
            this.poll_to_terminal(&record, &job_id).await;
            this.active.lock().remove(&record.pending_id);
        });
    }

    fn select_note(&self, request: &WithdrawRequest) -> Result<DepositNote> {
        if let Some(note_id) = &request.note_id {
            let note = self
                .vault
                .get_note(request.chain_id, note_id)?
                .ok_or_else(|| ClientError::NotFound {
                    entity: "deposit note",
                    id: note_id.clone(),
                })?;
            if !note.is_spendable() {
                return Err(ClientError::NoteNotWithdrawable(note.id, note.status));
            }
            if note.pair != request.pair {
                warn!("note {} belongs to pair {}, not {}", note.id, note.pair, request.pair);
                return Err(ClientError::NoSpendableNote);
            }
            return Ok(note);
        }

        let spendable = self.vault.get_spendable(request.chain_id, &request.pair)?;
        pick_note(&spendable).ok_or(ClientError::NoSpendableNote)
    }

    async fn drive(self, record: PendingWithdrawal, note: DepositNote, reward_account: String) {
        match self.submit(&record, &note, &reward_account).await {
            Ok(job_id) => self.poll_to_terminal(&record, &job_id).await,
            Err(e) => {
                warn!("withdrawal {} failed before acceptance: {}", record.pending_id, e);
                let detail = e.to_string();
                // a proof failure never reached the relayer; surface the
                // prover's report as the record's progress detail too
                let status_message = match e {
                    ClientError::Proof(_) => Some(detail.clone()),
                    _ => None,
                };
                self.record_failure(
                    &record,
                    WithdrawalStatus::Failed,
                    normalize_relayer_error(&detail),
                    status_message,
                )
                .await;
            }
        }
        self.active.lock().remove(&record.pending_id);
    }

    /// Prove, submit and persist the acceptance. Any error here leaves the
    /// record `UNSUBMITTED` for the caller to mark failed.
    async fn submit(
        &self,
        record: &PendingWithdrawal,
        note: &DepositNote,
        reward_account: &str,
    ) -> Result<String> {
        let parsed = self.secrets.reveal_note(note).await?;
        let fee = record.fee.as_deref().unwrap_or("0");
        let bundle = self
            .prover
            .generate_proof(&record.pair, &parsed, &record.to_address, reward_account, fee)
            .await?;

        let pool = pool_instance(record.chain_id, &record.pair)?;
        let submission = WithdrawalSubmission {
            contract: pool.address.to_string(),
            proof: bundle.proof,
            args: bundle.args,
        };
        let job_id = self
            .relayer
            .submit_withdrawal(&record.relayer_url, &self.config.withdraw_method, &submission)
            .await?;

        let accepted_job = job_id.clone();
        let updated = self
            .queue
            .transition(record.chain_id, &record.pending_id, move |r| {
                r.status = WithdrawalStatus::Pending;
                r.job_id = Some(accepted_job);
            })
            .await?;
        self.bus.emit(EngineEvent::WithdrawalStateChange {
            chain_id: record.chain_id,
            pending_id: record.pending_id.clone(),
            status: updated.status,
        });
        Ok(job_id)
    }

    async fn poll_to_terminal(&self, record: &PendingWithdrawal, job_id: &str) {
        loop {
            match self.poll_job_once(&record.relayer_url, job_id).await {
                PollOutcome::Terminal(job) => {
                    self.finalize(record, job).await;
                    return;
                }
                PollOutcome::Pending => {
                    tokio::time::sleep(self.config.job_poll_interval).await;
                }
            }
        }
    }

    async fn poll_job_once(&self, relayer_url: &str, job_id: &str) -> PollOutcome {
        match self.relayer.job(relayer_url, job_id).await {
            Ok(job) if job.status.is_terminal() => PollOutcome::Terminal(job),
            Ok(job) => {
                debug!("job {} still {:?}", job_id, job.status);
                PollOutcome::Pending
            }
            Err(e) => {
                warn!("job {} poll failed, will retry: {}", job_id, e);
                PollOutcome::Pending
            }
        }
    }

    async fn finalize(&self, record: &PendingWithdrawal, job: RelayerJob) {
        if job.status.is_success() {
            self.finalize_success(record, job).await;
        } else {
            let raw = job
                .failed_reason
                .as_deref()
                .unwrap_or("relayer reported failure without detail");
            let status = match job.status {
                RelayerJobStatus::Rejected => WithdrawalStatus::Rejected,
                _ => WithdrawalStatus::Failed,
            };
            self.record_failure(record, status, normalize_relayer_error(raw), None)
                .await;
        }
    }

    async fn finalize_success(&self, record: &PendingWithdrawal, job: RelayerJob) {
        let status = match job.status {
            RelayerJobStatus::Confirmed => WithdrawalStatus::Confirmed,
            _ => WithdrawalStatus::Mined,
        };

        let hash = job.tx_hash.as_deref().and_then(parse_tx_hash);
        let status_message = match hash {
            Some(hash) => self.describe_transaction(hash).await,
            None => None,
        };
        let receipt = match hash {
            Some(hash) => self.await_receipt(hash).await,
            None => None,
        };

        let tx_hash = job.tx_hash;
        let outcome = self
            .queue
            .transition(record.chain_id, &record.pending_id, move |r| {
                r.status = status;
                r.transaction_hash = tx_hash;
                r.transaction_receipt = receipt;
                r.status_message = status_message;
            })
            .await;

        match outcome {
            Ok(updated) => {
                info!("withdrawal {} reached {:?}", record.pending_id, updated.status);
                self.bus.emit(EngineEvent::WithdrawalStateChange {
                    chain_id: record.chain_id,
                    pending_id: record.pending_id.clone(),
                    status: updated.status,
                });
                self.mark_note_spent(record);
            }
            // the record stays PENDING; reconciliation re-polls the job at
            // next boot and lands here again
            Err(e) => error!(
                "withdrawal {} succeeded on chain but could not be recorded: {}",
                record.pending_id, e
            ),
        }
    }

    /// Persist a failure terminal. `status_message` carries extra detail
    /// for failures the relayer never saw, such as the prover's report.
    async fn record_failure(
        &self,
        record: &PendingWithdrawal,
        status: WithdrawalStatus,
        message: String,
        status_message: Option<String>,
    ) {
        let outcome = self
            .queue
            .transition(record.chain_id, &record.pending_id, move |r| {
                r.status = status;
                r.err_message = Some(message);
                if status_message.is_some() {
                    r.status_message = status_message;
                }
            })
            .await;

        match outcome {
            Ok(updated) => {
                self.bus.emit(EngineEvent::WithdrawalStateChange {
                    chain_id: record.chain_id,
                    pending_id: record.pending_id.clone(),
                    status: updated.status,
                });
            }
            Err(e) => error!("failed to record withdrawal {} failure: {}", record.pending_id, e),
        }
    }

    /// Flip the backing note's spent flag, if it is safe to write.
    fn mark_note_spent(&self, record: &PendingWithdrawal) {
        if !self.wallet.is_unlocked() {
            warn!(
                "vault locked; note {} stays unspent until reconciliation",
                record.deposit_id
            );
            return;
        }
        if self.wallet.active_chain_id() != record.chain_id {
            warn!(
                "active network is no longer chain {}; note {} stays unspent",
                record.chain_id, record.deposit_id
            );
            return;
        }
        if let Err(e) = self
            .vault
            .set_spent(record.chain_id, std::slice::from_ref(&record.deposit_id))
        {
            error!("failed to mark note {} spent: {}", record.deposit_id, e);
        }
    }

    /// Best-effort label for the mined transaction's contract method.
    async fn describe_transaction(&self, hash: H256) -> Option<String> {
        match self.chain.get_transaction(hash).await {
            Ok(Some(tx)) => resolve_method_name(&tx.input.0),
            Ok(None) => None,
            Err(e) => {
                warn!("transaction lookup failed during enrichment: {}", e);
                None
            }
        }
    }

    /// Best-effort receipt fetch with a bounded wait.
    async fn await_receipt(&self, hash: H256) -> Option<TransactionReceipt> {
        match self
            .chain
            .wait_for_transaction(hash, self.config.receipt_confirmations, self.config.receipt_timeout)
            .await
        {
            Ok(Some(receipt)) => Some(receipt),
            Ok(None) => {
                warn!("receipt wait timed out for 0x{}", hex::encode(hash.as_bytes()));
                None
            }
            Err(e) => {
                warn!("receipt wait failed: {}", e);
                None
            }
        }
    }
}

fn check_relayer(chain_id: u64, status: &RelayerStatus) -> Result<()> {
    if !status.is_healthy() {
        let detail = status
            .health
            .as_ref()
            .and_then(|h| h.error.clone())
            .unwrap_or_else(|| "relayer reports itself unhealthy".to_string());
        return Err(ClientError::Relayer(detail));
    }
    if status.net_id != chain_id {
        return Err(ClientError::RelayerNetworkMismatch {
            relayer: status.net_id,
            expected: chain_id,
        });
    }
    Ok(())
}

/// Uniform random pick backed by the OS entropy source. Unlinkability of a
/// withdrawal partly rests on this choice being unpredictable.
fn pick_note(notes: &[DepositNote]) -> Option<DepositNote> {
    notes.choose(&mut OsRng).cloned()
}

fn parse_tx_hash(raw: &str) -> Option<H256> {
    let bytes = hex::decode(raw.trim_start_matches("0x")).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    Some(H256::from_slice(&bytes))
}

/// Method name for a transaction input's 4-byte selector, or the raw
/// selector hex when it is not one of ours.
fn resolve_method_name(input: &[u8]) -> Option<String> {
    if input.len() < 4 {
        return None;
    }
    let selector = &input[0..4];
    for &signature in KNOWN_METHOD_SIGNATURES {
        if keccak256(signature.as_bytes())[0..4] == *selector {
            let name = signature.split('(').next().unwrap_or(signature);
            return Some(name.to_string());
        }
    }
    Some(format!("0x{}", hex::encode(selector)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{gwei, GasPrice, GasPriceLevels};
    use crate::notes::{derive_note_id, NoteStatus};
    use crate::prover::{ParsedNote, ProofBundle};
    use crate::relayer::RelayerHealth;
    use crate::store::{DBConfig, DatabaseManager};
    use crate::wallet::DerivedNote;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use web3::types::{Filter, Log, Transaction};

    const CHAIN: u64 = 1;
    const RELAYER_URL: &str = "https://relayer.example";
    const RECIPIENT: &str = "0x00000000000000000000000000000000000000aa";
    const TX_HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    fn healthy_status(net_id: u64) -> RelayerStatus {
        RelayerStatus {
            reward_account: "0x0000000000000000000000000000000000000123".into(),
            net_id,
            service_fee_percent: 0.5,
            eth_prices: HashMap::new(),
            health: None,
            version: None,
        }
    }

    fn job(status: RelayerJobStatus) -> RelayerJob {
        RelayerJob {
            status,
            tx_hash: Some(TX_HASH.into()),
            failed_reason: None,
        }
    }

    struct ScriptedRelayer {
        status: RelayerStatus,
        submit_results: Mutex<VecDeque<Result<String>>>,
        jobs: Mutex<VecDeque<Result<RelayerJob>>>,
    }

    impl ScriptedRelayer {
        fn healthy(net_id: u64) -> Self {
            Self {
                status: healthy_status(net_id),
                submit_results: Mutex::new(VecDeque::new()),
                jobs: Mutex::new(VecDeque::new()),
            }
        }

        fn with_jobs(self, jobs: Vec<Result<RelayerJob>>) -> Self {
            *self.jobs.lock() = jobs.into();
            self
        }

        fn with_submit(self, results: Vec<Result<String>>) -> Self {
            *self.submit_results.lock() = results.into();
            self
        }
    }

    #[async_trait]
    impl RelayerApi for ScriptedRelayer {
        async fn status(&self, _relayer_url: &str) -> Result<RelayerStatus> {
            Ok(self.status.clone())
        }

        async fn submit_withdrawal(
            &self,
            _relayer_url: &str,
            _method: &str,
            _submission: &WithdrawalSubmission,
        ) -> Result<String> {
            match self.submit_results.lock().pop_front() {
                Some(result) => result,
                None => Ok("job-1".into()),
            }
        }

        async fn job(&self, _relayer_url: &str, _job_id: &str) -> Result<RelayerJob> {
            match self.jobs.lock().pop_front() {
                Some(result) => result,
                None => Ok(job(RelayerJobStatus::Queued)),
            }
        }
    }

    struct NullChain;

    #[async_trait]
    impl ChainRpc for NullChain {
        async fn block_number(&self) -> Result<u64> {
            Ok(0)
        }
        async fn get_logs(&self, _filter: Filter) -> Result<Vec<Log>> {
            Ok(Vec::new())
        }
        async fn get_transaction(&self, _hash: H256) -> Result<Option<Transaction>> {
            Ok(None)
        }
        async fn get_transaction_receipt(&self, _hash: H256) -> Result<Option<TransactionReceipt>> {
            Ok(None)
        }
        async fn wait_for_transaction(
            &self,
            _hash: H256,
            _confirmations: u64,
            _timeout: Duration,
        ) -> Result<Option<TransactionReceipt>> {
            Ok(None)
        }
    }

    struct StaticGas;

    #[async_trait]
    impl GasPriceSource for StaticGas {
        async fn get_gas_price_levels(&self, _chain_id: u64) -> Result<GasPriceLevels> {
            Ok(GasPriceLevels {
                slow: GasPrice::Legacy { gas_price: gwei(40) },
                average: GasPrice::Legacy { gas_price: gwei(70) },
                fast: GasPrice::Legacy { gas_price: gwei(100) },
            })
        }
    }

    struct ExtremeGas;

    #[async_trait]
    impl GasPriceSource for ExtremeGas {
        async fn get_gas_price_levels(&self, _chain_id: u64) -> Result<GasPriceLevels> {
            Ok(GasPriceLevels {
                slow: GasPrice::Legacy { gas_price: gwei(40) },
                average: GasPrice::Legacy { gas_price: gwei(70) },
                fast: GasPrice::Legacy { gas_price: U256::MAX },
            })
        }
    }

    struct StaticProver {
        fail: bool,
    }

    #[async_trait]
    impl ProofGenerator for StaticProver {
        async fn generate_proof(
            &self,
            _pair: &Pair,
            _note: &ParsedNote,
            _recipient: &str,
            _reward_account: &str,
            _fee: &str,
        ) -> Result<ProofBundle> {
            if self.fail {
                return Err(ClientError::Proof("witness generation failed".into()));
            }
            Ok(ProofBundle {
                proof: "0xdead".into(),
                args: vec!["0x01".into(), "0x02".into()],
            })
        }
    }

    struct StaticSecrets;

    #[async_trait]
    impl NoteSecrets for StaticSecrets {
        async fn derive_note(&self, _chain_id: u64, _pair: &Pair, index: u64) -> Result<DerivedNote> {
            Ok(DerivedNote {
                nullifier_hex: format!("0x{:064x}", index),
                commitment_hex: format!("0x{:064x}", index + 1),
                deposit_address: RECIPIENT.into(),
            })
        }

        async fn reveal_note(&self, note: &DepositNote) -> Result<ParsedNote> {
            Ok(ParsedNote {
                currency: note.pair.currency.clone(),
                amount: note.pair.amount.clone(),
                chain_id: note.chain_id,
                preimage_hex: "0xfeed".into(),
            })
        }
    }

    struct TestWallet {
        unlocked: AtomicBool,
        chain: AtomicU64,
    }

    impl WalletContext for TestWallet {
        fn is_unlocked(&self) -> bool {
            self.unlocked.load(Ordering::SeqCst)
        }
        fn active_chain_id(&self) -> u64 {
            self.chain.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        coordinator: Arc<WithdrawalCoordinator>,
        queue: Arc<WithdrawalQueue>,
        vault: NoteVault,
        wallet: Arc<TestWallet>,
    }

    fn harness(relayer: ScriptedRelayer, prover: StaticProver) -> Harness {
        harness_with_gas(relayer, prover, Arc::new(StaticGas))
    }

    fn harness_with_gas(
        relayer: ScriptedRelayer,
        prover: StaticProver,
        gas: Arc<dyn GasPriceSource>,
    ) -> Harness {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempdir().unwrap();
        let db = DatabaseManager::open(DBConfig {
            db_path: dir.path().join("db").to_string_lossy().to_string(),
            ..Default::default()
        })
        .unwrap();
        let bus = EventBus::default();
        let vault = NoteVault::new(db.clone(), bus.clone());
        let queue = Arc::new(WithdrawalQueue::new(db));
        let wallet = Arc::new(TestWallet {
            unlocked: AtomicBool::new(true),
            chain: AtomicU64::new(CHAIN),
        });

        let config = EngineConfig {
            job_poll_interval: Duration::from_millis(5),
            receipt_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let coordinator = Arc::new(WithdrawalCoordinator::new(
            config,
            Arc::clone(&queue),
            vault.clone(),
            bus,
            Arc::new(NullChain),
            Arc::new(relayer),
            gas,
            Arc::new(prover),
            Arc::new(StaticSecrets),
            wallet.clone(),
        ));
        Harness {
            _dir: dir,
            coordinator,
            queue,
            vault,
            wallet,
        }
    }

    fn confirmed_note(pair: &Pair, index: u64) -> DepositNote {
        let commitment = format!("0x{:064x}", index + 100);
        DepositNote {
            id: derive_note_id(CHAIN, pair, &commitment),
            nullifier_hex: format!("0x{:064x}", index),
            commitment_hex: commitment,
            pair: pair.clone(),
            deposit_index: index,
            deposit_address: RECIPIENT.into(),
            timestamp: 0,
            spent: false,
            status: NoteStatus::Confirmed,
            chain_id: CHAIN,
        }
    }

    fn request(pair: &Pair) -> WithdrawRequest {
        WithdrawRequest {
            chain_id: CHAIN,
            pair: pair.clone(),
            to_address: RECIPIENT.into(),
            relayer_url: RELAYER_URL.into(),
            note_id: None,
            fee: U256::from(1_000u64),
        }
    }

    async fn await_terminal(queue: &WithdrawalQueue, pending_id: &str) -> PendingWithdrawal {
        for _ in 0..400 {
            let record = queue.get(CHAIN, pending_id).unwrap();
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("withdrawal never reached a terminal state");
    }

    #[tokio::test]
    async fn happy_path_confirms_and_marks_note_spent() {
        let pair = Pair::new("eth", "0.1");
        let relayer = ScriptedRelayer::healthy(CHAIN).with_jobs(vec![
            Ok(job(RelayerJobStatus::Queued)),
            Ok(job(RelayerJobStatus::Sent)),
            Ok(job(RelayerJobStatus::Confirmed)),
        ]);
        let h = harness(relayer, StaticProver { fail: false });
        let note = confirmed_note(&pair, 0);
        h.vault.add_deposits(CHAIN, vec![note.clone()]).unwrap();

        let pending_id = h.coordinator.withdraw(request(&pair)).await.unwrap();
        let record = await_terminal(&h.queue, &pending_id).await;

        assert_eq!(record.status, WithdrawalStatus::Confirmed);
        assert_eq!(record.transaction_hash.as_deref(), Some(TX_HASH));
        assert!(record.job_id.is_some());
        assert!(record.err_message.is_none());

        let stored = h.vault.get_note(CHAIN, &note.id).unwrap().unwrap();
        assert!(stored.spent);
    }

    #[tokio::test]
    async fn network_change_leaves_note_unspent() {
        let pair = Pair::new("eth", "0.1");
        let relayer = ScriptedRelayer::healthy(CHAIN)
            .with_jobs(vec![Ok(job(RelayerJobStatus::Confirmed))]);
        let h = harness(relayer, StaticProver { fail: false });
        let note = confirmed_note(&pair, 0);
        h.vault.add_deposits(CHAIN, vec![note.clone()]).unwrap();

        let pending_id = h.coordinator.withdraw(request(&pair)).await.unwrap();
        // host switches networks while the job is in flight
        h.wallet.chain.store(137, Ordering::SeqCst);

        let record = await_terminal(&h.queue, &pending_id).await;
        assert_eq!(record.status, WithdrawalStatus::Confirmed);

        let stored = h.vault.get_note(CHAIN, &note.id).unwrap().unwrap();
        assert!(!stored.spent);
    }

    #[tokio::test]
    async fn locked_vault_leaves_note_unspent() {
        let pair = Pair::new("eth", "0.1");
        let relayer = ScriptedRelayer::healthy(CHAIN)
            .with_jobs(vec![Ok(job(RelayerJobStatus::Mined))]);
        let h = harness(relayer, StaticProver { fail: false });
        let note = confirmed_note(&pair, 0);
        h.vault.add_deposits(CHAIN, vec![note.clone()]).unwrap();

        let pending_id = h.coordinator.withdraw(request(&pair)).await.unwrap();
        h.wallet.unlocked.store(false, Ordering::SeqCst);

        let record = await_terminal(&h.queue, &pending_id).await;
        assert_eq!(record.status, WithdrawalStatus::Mined);

        let stored = h.vault.get_note(CHAIN, &note.id).unwrap().unwrap();
        assert!(!stored.spent);
    }

    #[tokio::test]
    async fn proof_failure_ends_in_failed_without_submission() {
        let pair = Pair::new("eth", "0.1");
        let h = harness(ScriptedRelayer::healthy(CHAIN), StaticProver { fail: true });
        let note = confirmed_note(&pair, 0);
        h.vault.add_deposits(CHAIN, vec![note.clone()]).unwrap();

        let pending_id = h.coordinator.withdraw(request(&pair)).await.unwrap();
        let record = await_terminal(&h.queue, &pending_id).await;

        assert_eq!(record.status, WithdrawalStatus::Failed);
        assert!(record.job_id.is_none());
        assert!(record
            .err_message
            .as_deref()
            .unwrap()
            .contains("witness generation failed"));
        // the prover's report doubles as the record's progress detail
        assert!(record
            .status_message
            .as_deref()
            .unwrap()
            .contains("witness generation failed"));

        let stored = h.vault.get_note(CHAIN, &note.id).unwrap().unwrap();
        assert!(!stored.spent);
    }

    #[tokio::test]
    async fn relayer_rejection_is_normalized() {
        let pair = Pair::new("eth", "0.1");
        let relayer = ScriptedRelayer::healthy(CHAIN).with_submit(vec![Err(
            ClientError::Relayer("err: insufficient funds for gas * price + value".into()),
        )]);
        let h = harness(relayer, StaticProver { fail: false });
        h.vault
            .add_deposits(CHAIN, vec![confirmed_note(&pair, 0)])
            .unwrap();

        let pending_id = h.coordinator.withdraw(request(&pair)).await.unwrap();
        let record = await_terminal(&h.queue, &pending_id).await;

        assert_eq!(record.status, WithdrawalStatus::Failed);
        assert!(record.err_message.as_deref().unwrap().contains("cannot cover gas"));
    }

    #[tokio::test]
    async fn polling_outlives_transport_errors() {
        let pair = Pair::new("eth", "0.1");
        let relayer = ScriptedRelayer::healthy(CHAIN).with_jobs(vec![
            Err(ClientError::Transport("connection reset".into())),
            Err(ClientError::Transport("connection reset".into())),
            Ok(job(RelayerJobStatus::Mined)),
        ]);
        let h = harness(relayer, StaticProver { fail: false });
        let note = confirmed_note(&pair, 0);
        h.vault.add_deposits(CHAIN, vec![note.clone()]).unwrap();

        let pending_id = h.coordinator.withdraw(request(&pair)).await.unwrap();
        let record = await_terminal(&h.queue, &pending_id).await;

        assert_eq!(record.status, WithdrawalStatus::Mined);
        let stored = h.vault.get_note(CHAIN, &note.id).unwrap().unwrap();
        assert!(stored.spent);
    }

    #[tokio::test]
    async fn rejected_job_maps_to_rejected() {
        let pair = Pair::new("eth", "0.1");
        let mut rejected = job(RelayerJobStatus::Rejected);
        rejected.failed_reason = Some("Proof is invalid".into());
        let relayer = ScriptedRelayer::healthy(CHAIN).with_jobs(vec![Ok(rejected)]);
        let h = harness(relayer, StaticProver { fail: false });
        let note = confirmed_note(&pair, 0);
        h.vault.add_deposits(CHAIN, vec![note.clone()]).unwrap();

        let pending_id = h.coordinator.withdraw(request(&pair)).await.unwrap();
        let record = await_terminal(&h.queue, &pending_id).await;

        assert_eq!(record.status, WithdrawalStatus::Rejected);
        assert_eq!(record.err_message.as_deref(), Some("Proof is invalid"));
        // relayer verdicts land in err_message only
        assert!(record.status_message.is_none());
        let stored = h.vault.get_note(CHAIN, &note.id).unwrap().unwrap();
        assert!(!stored.spent);
    }

    #[tokio::test]
    async fn withdraw_without_spendable_notes_fails() {
        let pair = Pair::new("eth", "0.1");
        let h = harness(ScriptedRelayer::healthy(CHAIN), StaticProver { fail: false });

        let err = h.coordinator.withdraw(request(&pair)).await.unwrap_err();
        assert!(matches!(err, ClientError::NoSpendableNote));
    }

    #[tokio::test]
    async fn pinned_note_must_be_spendable() {
        let pair = Pair::new("eth", "0.1");
        let h = harness(ScriptedRelayer::healthy(CHAIN), StaticProver { fail: false });
        let mut note = confirmed_note(&pair, 0);
        note.spent = true;
        h.vault.add_deposits(CHAIN, vec![note.clone()]).unwrap();

        let mut req = request(&pair);
        req.note_id = Some(note.id.clone());
        let err = h.coordinator.withdraw(req).await.unwrap_err();
        assert!(matches!(err, ClientError::NoteNotWithdrawable(_, _)));
    }

    #[tokio::test]
    async fn quote_rejects_network_mismatch() {
        let pair = Pair::new("eth", "0.1");
        let h = harness(ScriptedRelayer::healthy(137), StaticProver { fail: false });

        let err = h.coordinator.quote_fee(CHAIN, &pair, RELAYER_URL).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::RelayerNetworkMismatch { relayer: 137, expected: CHAIN }
        ));
    }

    #[tokio::test]
    async fn quote_rejects_unhealthy_relayer() {
        let pair = Pair::new("eth", "0.1");
        let mut relayer = ScriptedRelayer::healthy(CHAIN);
        relayer.status.health = Some(RelayerHealth {
            status: "false".into(),
            error: Some("relayer wallet empty".into()),
        });
        let h = harness(relayer, StaticProver { fail: false });

        let err = h.coordinator.quote_fee(CHAIN, &pair, RELAYER_URL).await.unwrap_err();
        match err {
            ClientError::Relayer(message) => assert!(message.contains("wallet empty")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn quote_prices_native_pair() {
        let pair = Pair::new("eth", "0.1");
        let h = harness(ScriptedRelayer::healthy(CHAIN), StaticProver { fail: false });

        let quote = h.coordinator.quote_fee(CHAIN, &pair, RELAYER_URL).await.unwrap();
        // fast tier 100 gwei bumped by 5% on a legacy chain
        assert_eq!(quote.gas_cost, gwei(105) * U256::from(550_000u64));
        assert_eq!(quote.total, U256::exp10(17));
        assert_eq!(quote.fee_percent, U256::from(5u64) * U256::exp10(14));
    }

    #[tokio::test]
    async fn quote_rejects_unscalable_fee_percent() {
        let pair = Pair::new("eth", "0.1");
        let mut relayer = ScriptedRelayer::healthy(CHAIN);
        // finite and non-negative, but renders with 80 fractional places
        relayer.status.service_fee_percent = 1e-80;
        let h = harness(relayer, StaticProver { fail: false });

        let err = h.coordinator.quote_fee(CHAIN, &pair, RELAYER_URL).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidFeePercent(_)));
    }

    #[tokio::test]
    async fn quote_rejects_overflowing_gas_quote() {
        let pair = Pair::new("eth", "0.1");
        let h = harness_with_gas(
            ScriptedRelayer::healthy(CHAIN),
            StaticProver { fail: false },
            Arc::new(ExtremeGas),
        );

        let err = h.coordinator.quote_fee(CHAIN, &pair, RELAYER_URL).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidAmount(_, _)));
    }

    #[test]
    fn note_selection_hits_every_index() {
        let pair = Pair::new("eth", "0.1");
        let notes: Vec<DepositNote> = (0..3).map(|i| confirmed_note(&pair, i)).collect();

        let mut seen = HashSet::new();
        for _ in 0..300 {
            seen.insert(pick_note(&notes).unwrap().deposit_index);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn method_names_resolve_from_selectors() {
        let selector = &keccak256(KNOWN_METHOD_SIGNATURES[0].as_bytes())[0..4];
        let mut input = selector.to_vec();
        input.extend_from_slice(&[0u8; 32]);
        assert_eq!(resolve_method_name(&input).as_deref(), Some("withdraw"));

        assert_eq!(
            resolve_method_name(&[0xde, 0xad, 0xbe, 0xef]).as_deref(),
            Some("0xdeadbeef")
        );
        assert_eq!(resolve_method_name(&[0x01]), None);
    }
}
