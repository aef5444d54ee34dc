//! Engine assembly.
//!
//! The engine owns the database, the event bus and the three coordinators,
//! and wires them to the collaborators the host wallet provides. Opening is
//! passive; nothing talks to the network until [`PrivacyPoolEngine::start`]
//! runs the boot reconciliation and the host begins issuing calls.

use std::sync::Arc;

use log::info;
use tokio::sync::broadcast;

use crate::chain::{ChainRpc, GasPriceSource};
use crate::config::EngineConfig;
use crate::deposit::DepositCoordinator;
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::ledger::EventLedger;
use crate::notes::NoteVault;
use crate::prover::ProofGenerator;
use crate::reconcile::ReconciliationScheduler;
use crate::relayer::RelayerApi;
use crate::store::DatabaseManager;
use crate::wallet::{NoteSecrets, TransactionRecords, WalletContext};
use crate::withdraw::{WithdrawalCoordinator, WithdrawalQueue};

/// Host-provided collaborators. The engine never holds keys, never sends
/// transactions and never decides what the active network is; all of that
/// comes through these seams.
pub struct Collaborators {
    pub chain: Arc<dyn ChainRpc>,
    pub relayer: Arc<dyn RelayerApi>,
    pub gas: Arc<dyn GasPriceSource>,
    pub prover: Arc<dyn ProofGenerator>,
    pub secrets: Arc<dyn NoteSecrets>,
    pub wallet: Arc<dyn WalletContext>,
    pub records: Arc<dyn TransactionRecords>,
}

pub struct PrivacyPoolEngine {
    db: DatabaseManager,
    bus: EventBus,
    vault: NoteVault,
    ledger: Arc<EventLedger>,
    queue: Arc<WithdrawalQueue>,
    deposits: DepositCoordinator,
    withdrawals: Arc<WithdrawalCoordinator>,
    reconciler: ReconciliationScheduler,
}

impl PrivacyPoolEngine {
    /// Open the database and assemble the engine.
    pub fn open(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        let db = DatabaseManager::open(config.db.clone())?;
        let bus = EventBus::new(config.event_bus_capacity);

        let vault = NoteVault::new(db.clone(), bus.clone());
        let queue = Arc::new(WithdrawalQueue::new(db.clone()));
        let ledger = Arc::new(EventLedger::new(
            db.clone(),
            Arc::clone(&collaborators.chain),
        ));

        let withdrawals = Arc::new(WithdrawalCoordinator::new(
            config,
            Arc::clone(&queue),
            vault.clone(),
            bus.clone(),
            Arc::clone(&collaborators.chain),
            Arc::clone(&collaborators.relayer),
            Arc::clone(&collaborators.gas),
            Arc::clone(&collaborators.prover),
            Arc::clone(&collaborators.secrets),
            Arc::clone(&collaborators.wallet),
        ));
        let deposits = DepositCoordinator::new(
            vault.clone(),
            Arc::clone(&ledger),
            Arc::clone(&collaborators.secrets),
            Arc::clone(&collaborators.records),
            bus.clone(),
        );
        let reconciler = ReconciliationScheduler::new(
            db.clone(),
            Arc::clone(&queue),
            Arc::clone(&withdrawals),
            bus.clone(),
        );

        Ok(Self {
            db,
            bus,
            vault,
            ledger,
            queue,
            deposits,
            withdrawals,
            reconciler,
        })
    }

    /// Run the boot reconciliation. Call once after `open`.
    pub async fn start(&self) -> Result<()> {
        info!("starting pool client engine");
        self.reconciler.on_startup().await
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    pub fn vault(&self) -> &NoteVault {
        &self.vault
    }

    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    pub fn deposits(&self) -> &DepositCoordinator {
        &self.deposits
    }

    pub fn withdrawals(&self) -> &Arc<WithdrawalCoordinator> {
        &self.withdrawals
    }

    pub fn withdrawal_queue(&self) -> &WithdrawalQueue {
        &self.queue
    }

    pub fn reconciler(&self) -> &ReconciliationScheduler {
        &self.reconciler
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{gwei, GasPrice, GasPriceLevels};
    use crate::config::Pair;
    use crate::error::ClientError;
    use crate::notes::NoteStatus;
    use crate::prover::{ParsedNote, ProofBundle};
    use crate::relayer::{RelayerJob, RelayerStatus, WithdrawalSubmission};
    use crate::store::DBConfig;
    use crate::wallet::{DerivedNote, TransactionVerdict};
    use crate::withdraw::{PendingWithdrawal, WithdrawalStatus};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::tempdir;
    use web3::types::{Filter, Log, Transaction, TransactionReceipt, H256};

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

    struct OfflineRelayer;

    #[async_trait]
    impl crate::relayer::RelayerApi for OfflineRelayer {
        async fn status(&self, _relayer_url: &str) -> Result<RelayerStatus> {
            Err(ClientError::Transport("offline".into()))
        }
        async fn submit_withdrawal(
            &self,
            _relayer_url: &str,
            _method: &str,
            _submission: &WithdrawalSubmission,
        ) -> Result<String> {
            Err(ClientError::Transport("offline".into()))
        }
        async fn job(&self, _relayer_url: &str, _job_id: &str) -> Result<RelayerJob> {
            Err(ClientError::Transport("offline".into()))
        }
    }

    struct StaticGas;

    #[async_trait]
    impl GasPriceSource for StaticGas {
        async fn get_gas_price_levels(&self, _chain_id: u64) -> Result<GasPriceLevels> {
            Ok(GasPriceLevels {
                slow: GasPrice::Legacy { gas_price: gwei(1) },
                average: GasPrice::Legacy { gas_price: gwei(2) },
                fast: GasPrice::Legacy { gas_price: gwei(3) },
            })
        }
    }

    struct NoProver;

    #[async_trait]
    impl ProofGenerator for NoProver {
        async fn generate_proof(
            &self,
            _pair: &Pair,
            _note: &ParsedNote,
            _recipient: &str,
            _reward_account: &str,
            _fee: &str,
        ) -> Result<ProofBundle> {
            Err(ClientError::Proof("unavailable".into()))
        }
    }

    struct SeedSecrets;

    #[async_trait]
    impl NoteSecrets for SeedSecrets {
        async fn derive_note(&self, _chain_id: u64, _pair: &Pair, index: u64) -> Result<DerivedNote> {
            Ok(DerivedNote {
                nullifier_hex: format!("0x{:064x}", index * 2 + 1),
                commitment_hex: format!("0x{:064x}", index * 2 + 2),
                deposit_address: "0x0000000000000000000000000000000000000001".into(),
            })
        }
        async fn reveal_note(&self, note: &crate::notes::DepositNote) -> Result<ParsedNote> {
            Ok(ParsedNote {
                currency: note.pair.currency.clone(),
                amount: note.pair.amount.clone(),
                chain_id: note.chain_id,
                preimage_hex: "0xfeed".into(),
            })
        }
    }

    struct OpenWallet;

    impl WalletContext for OpenWallet {
        fn is_unlocked(&self) -> bool {
            true
        }
        fn active_chain_id(&self) -> u64 {
            1
        }
    }

    struct NoRecords;

    impl TransactionRecords for NoRecords {
        fn deposit_verdict(&self, _chain_id: u64, _deposit_id: &str) -> Option<TransactionVerdict> {
            None
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            chain: Arc::new(NullChain),
            relayer: Arc::new(OfflineRelayer),
            gas: Arc::new(StaticGas),
            prover: Arc::new(NoProver),
            secrets: Arc::new(SeedSecrets),
            wallet: Arc::new(OpenWallet),
            records: Arc::new(NoRecords),
        }
    }

    fn open_engine() -> (tempfile::TempDir, PrivacyPoolEngine) {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            db: DBConfig {
                db_path: dir.path().join("db").to_string_lossy().to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = PrivacyPoolEngine::open(config, collaborators()).unwrap();
        (dir, engine)
    }

    #[tokio::test]
    async fn start_repairs_interrupted_withdrawals() {
        let (_dir, engine) = open_engine();
        let record = PendingWithdrawal::new(
            1,
            Pair::new("eth", "0.1"),
            "note-1".into(),
            "0x00000000000000000000000000000000000000aa".into(),
            "https://relayer.example".into(),
            None,
        );
        engine.withdrawal_queue().insert(&record).await.unwrap();

        engine.start().await.unwrap();

        let repaired = engine.withdrawal_queue().get(1, &record.pending_id).unwrap();
        assert_eq!(repaired.status, WithdrawalStatus::Failed);
    }

    #[tokio::test]
    async fn components_share_one_store_and_bus() {
        let (_dir, engine) = open_engine();
        let pair = Pair::new("eth", "0.1");
        let mut events = engine.subscribe();

        let note = engine.deposits().create_deposit(1, &pair).await.unwrap();
        assert_eq!(note.status, NoteStatus::Pending);

        // the vault sees what the deposit coordinator wrote
        let stored = engine.vault().get_note(1, &note.id).unwrap().unwrap();
        assert_eq!(stored.deposit_index, 0);

        match events.try_recv() {
            Ok(EngineEvent::DepositsChanged { chain_id }) => assert_eq!(chain_id, 1),
            other => panic!("expected a deposits change, got {:?}", other),
        }
    }
}
