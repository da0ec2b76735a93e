//! Mock collaborators shared by the consensus tests: an in-memory
//! transaction pool and storage, a hub-routed message service that
//! connects several in-process replicas, and a no-op execution engine.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use quill_consensus::{
    CommitData, ConsensusError, Execution, MsgService, Resources, Storage, TxPool, TxPoolStatus,
    TxStatus,
};
use quill_crypto::{Hash, PrivateKey, PublicKey, Signer};
use quill_types::{
    Batch, BatchVote, Block, BlockCommit, QuorumCert, Transaction, TxCommit, ValidatorRegistry,
    Vote,
};
use tokio::sync::mpsc;

/// Route test logs through `RUST_LOG` when debugging a failure.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn keypairs(n: usize) -> Vec<PrivateKey> {
    (0..n)
        .map(|i| PrivateKey::from_seed(&[i as u8 + 1; 32]))
        .collect()
}

/// All keys are voters; the first `workers` keys are workers.
pub fn registry(keys: &[PrivateKey], workers: usize) -> Arc<ValidatorRegistry> {
    let voters: Vec<PublicKey> = keys.iter().map(|k| k.public_key()).collect();
    let workers = voters[..workers].to_vec();
    Arc::new(ValidatorRegistry::new(voters, workers))
}

pub fn tx(key: &PrivateKey, nonce: u64) -> Transaction {
    Transaction::new(nonce, format!("payload {nonce}").into_bytes(), 0, key)
}

#[derive(Default)]
struct PoolInner {
    queue: VecDeque<Transaction>,
    store: HashMap<Hash, Transaction>,
    pending: HashSet<Hash>,
    committed: HashSet<Hash>,
}

/// In-memory transaction pool.
#[derive(Default)]
pub struct MockTxPool {
    inner: Mutex<PoolInner>,
}

impl MockTxPool {
    pub fn seed_queue(&self, txs: Vec<Transaction>) {
        let mut inner = self.inner.lock();
        for tx in txs {
            inner.store.insert(*tx.hash(), tx.clone());
            inner.queue.push_back(tx);
        }
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.lock().store.contains_key(hash)
    }

    pub fn queued(&self) -> Vec<Hash> {
        self.inner.lock().queue.iter().map(|t| *t.hash()).collect()
    }
}

#[async_trait]
impl TxPool for MockTxPool {
    async fn submit_tx(&self, tx: Transaction) -> quill_consensus::Result<()> {
        self.seed_queue(vec![tx]);
        Ok(())
    }

    async fn pop_txs_from_queue(&self, max: usize) -> Vec<Transaction> {
        let mut inner = self.inner.lock();
        let n = inner.queue.len().min(max);
        inner.queue.drain(..n).collect()
    }

    async fn set_txs_pending(&self, hashes: &[Hash]) {
        let mut inner = self.inner.lock();
        for hash in hashes {
            inner.pending.insert(*hash);
        }
    }

    async fn get_txs_to_execute(
        &self,
        hashes: &[Hash],
    ) -> quill_consensus::Result<(Vec<Transaction>, Vec<Hash>)> {
        let inner = self.inner.lock();
        let mut txs = Vec::new();
        let mut old = Vec::new();
        for hash in hashes {
            if inner.committed.contains(hash) {
                old.push(*hash);
            } else if let Some(tx) = inner.store.get(hash) {
                txs.push(tx.clone());
            } else {
                return Err(ConsensusError::TxPool(format!(
                    "missing tx {}",
                    hex::encode(&hash[..8])
                )));
            }
        }
        Ok((txs, old))
    }

    async fn remove_txs(&self, hashes: &[Hash]) {
        let mut inner = self.inner.lock();
        for hash in hashes {
            inner.store.remove(hash);
            inner.pending.remove(hash);
            inner.committed.insert(*hash);
        }
        inner.queue.retain(|tx| !hashes.contains(tx.hash()));
    }

    async fn put_txs_to_queue(&self, hashes: &[Hash]) {
        let mut inner = self.inner.lock();
        for hash in hashes {
            if inner.committed.contains(hash) {
                continue;
            }
            if inner.queue.iter().any(|t| t.hash() == hash) {
                continue;
            }
            if let Some(tx) = inner.store.get(hash).cloned() {
                inner.queue.push_back(tx);
            }
        }
    }

    async fn sync_txs(&self, _peer: &PublicKey, _hashes: &[Hash]) -> quill_consensus::Result<()> {
        Ok(())
    }

    async fn store_txs(&self, txs: &[Transaction], pending: bool) -> quill_consensus::Result<()> {
        let mut inner = self.inner.lock();
        for tx in txs {
            inner.store.insert(*tx.hash(), tx.clone());
            if pending {
                inner.pending.insert(*tx.hash());
            }
        }
        Ok(())
    }

    async fn get_tx(&self, hash: &Hash) -> Option<Transaction> {
        self.inner.lock().store.get(hash).cloned()
    }

    async fn get_tx_status(&self, hash: &Hash) -> TxStatus {
        let inner = self.inner.lock();
        if inner.committed.contains(hash) {
            TxStatus::Committed
        } else if inner.pending.contains(hash) {
            TxStatus::Pending
        } else if inner.store.contains_key(hash) {
            TxStatus::Queued
        } else {
            TxStatus::NotFound
        }
    }

    fn status(&self) -> TxPoolStatus {
        let inner = self.inner.lock();
        TxPoolStatus {
            total: inner.store.len(),
            pending: inner.pending.len(),
            queue: inner.queue.len(),
        }
    }
}

#[derive(Default)]
struct StorageInner {
    blocks_by_hash: HashMap<Hash, Block>,
    blocks_by_height: HashMap<u64, Block>,
    last: Option<(Block, Option<QuorumCert>)>,
    txs: HashSet<Hash>,
    commits: Vec<CommitData>,
}

/// In-memory committed-prefix storage.
#[derive(Default)]
pub struct MockStorage {
    inner: Mutex<StorageInner>,
}

impl MockStorage {
    pub fn commit_count(&self) -> usize {
        self.inner.lock().commits.len()
    }

    pub fn committed_height(&self) -> u64 {
        self.inner
            .lock()
            .last
            .as_ref()
            .map(|(b, _)| b.height())
            .unwrap_or(0)
    }

    pub fn committed_tx_hashes(&self) -> HashSet<Hash> {
        self.inner.lock().txs.clone()
    }

    pub fn last_commit(&self) -> Option<CommitData> {
        self.inner.lock().commits.last().cloned()
    }

    pub fn block_at_height(&self, height: u64) -> Option<Block> {
        self.inner.lock().blocks_by_height.get(&height).cloned()
    }

    /// Mark a transaction as already committed by an earlier block.
    pub fn seed_committed_tx(&self, hash: Hash) {
        self.inner.lock().txs.insert(hash);
    }

    /// Pre-load a committed pair, as after a crash-restart.
    pub fn seed_committed(&self, block: Block, qc: QuorumCert) {
        let mut inner = self.inner.lock();
        inner.blocks_by_hash.insert(*block.hash(), block.clone());
        inner.blocks_by_height.insert(block.height(), block.clone());
        inner.last = Some((block, Some(qc)));
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn merkle_root(&self) -> Hash {
        Hash::default()
    }

    async fn commit(&self, data: CommitData) -> quill_consensus::Result<()> {
        let mut inner = self.inner.lock();
        let block = data.block.as_ref().clone();
        inner.blocks_by_hash.insert(*block.hash(), block.clone());
        inner.blocks_by_height.insert(block.height(), block.clone());
        for tx in &data.transactions {
            inner.txs.insert(*tx.hash());
        }
        let newer = inner
            .last
            .as_ref()
            .map(|(b, _)| block.height() >= b.height())
            .unwrap_or(true);
        if newer {
            inner.last = Some((block, data.quorum_cert.clone()));
        }
        inner.commits.push(data);
        Ok(())
    }

    async fn block(&self, hash: &Hash) -> Option<Block> {
        self.inner.lock().blocks_by_hash.get(hash).cloned()
    }

    async fn last_block(&self) -> Option<Block> {
        self.inner.lock().last.as_ref().map(|(b, _)| b.clone())
    }

    async fn last_qc(&self) -> Option<QuorumCert> {
        self.inner
            .lock()
            .last
            .as_ref()
            .and_then(|(_, qc)| qc.clone())
    }

    async fn block_height(&self) -> u64 {
        self.committed_height()
    }

    async fn has_tx(&self, hash: &Hash) -> bool {
        self.inner.lock().txs.contains(hash)
    }
}

/// A message recorded on its way out of one replica.
#[derive(Debug, Clone)]
pub enum SentMessage {
    Proposal(Block),
    Batch(Batch),
    NewView(QuorumCert),
    Vote(PublicKey, Vote),
    BatchVote(PublicKey, BatchVote),
    CertifiedBatch(PublicKey, Batch),
    DirectNewView(PublicKey, QuorumCert),
}

#[derive(Default)]
struct NodeSubs {
    proposals: Vec<mpsc::Sender<Block>>,
    batches: Vec<mpsc::Sender<Batch>>,
    votes: Vec<mpsc::Sender<Vote>>,
    batch_votes: Vec<mpsc::Sender<BatchVote>>,
    new_views: Vec<mpsc::Sender<QuorumCert>>,
}

#[derive(Default)]
struct HubInner {
    nodes: HashMap<PublicKey, NodeSubs>,
    blocks_by_hash: HashMap<Hash, Block>,
    blocks_by_height: HashMap<u64, Block>,
}

/// Routes messages between the in-process replicas of one test.
#[derive(Default)]
pub struct MockHub {
    inner: Mutex<HubInner>,
}

impl MockHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The transport endpoint for one replica.
    pub fn service(self: &Arc<Self>, node: PublicKey) -> Arc<MockMsgService> {
        self.inner.lock().nodes.entry(node).or_default();
        Arc::new(MockMsgService {
            hub: self.clone(),
            node,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn register_block(&self, block: &Block) {
        let mut inner = self.inner.lock();
        inner.blocks_by_hash.insert(*block.hash(), block.clone());
        inner.blocks_by_height.insert(block.height(), block.clone());
    }
}

/// One replica's view of the transport: broadcasts fan out to every
/// other replica on the hub, sends go to one, and every outbound
/// message is recorded for assertions.
pub struct MockMsgService {
    hub: Arc<MockHub>,
    node: PublicKey,
    pub sent: Mutex<Vec<SentMessage>>,
}

impl MockMsgService {
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_votes(&self) -> Vec<Vote> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                SentMessage::Vote(_, vote) => Some(vote.clone()),
                _ => None,
            })
            .collect()
    }
}

impl MockMsgService {
    fn fan_out<T: Clone>(
        &self,
        pick: impl Fn(&NodeSubs) -> &Vec<mpsc::Sender<T>>,
        message: T,
    ) {
        let inner = self.hub.inner.lock();
        for (node, subs) in inner.nodes.iter() {
            if *node == self.node {
                continue;
            }
            for sender in pick(subs) {
                let _ = sender.try_send(message.clone());
            }
        }
    }

    fn deliver<T: Clone>(
        &self,
        to: &PublicKey,
        pick: impl Fn(&NodeSubs) -> &Vec<mpsc::Sender<T>>,
        message: T,
    ) {
        let inner = self.hub.inner.lock();
        if let Some(subs) = inner.nodes.get(to) {
            for sender in pick(subs) {
                let _ = sender.try_send(message.clone());
            }
        }
    }

    fn subscribe<T>(
        &self,
        buffer: usize,
        pick: impl Fn(&mut NodeSubs) -> &mut Vec<mpsc::Sender<T>>,
    ) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(buffer.max(64));
        let mut inner = self.hub.inner.lock();
        pick(inner.nodes.entry(self.node).or_default()).push(tx);
        rx
    }
}

#[async_trait]
impl MsgService for MockMsgService {
    fn broadcast_proposal(&self, block: Arc<Block>) -> quill_consensus::Result<()> {
        self.hub.register_block(&block);
        self.sent
            .lock()
            .push(SentMessage::Proposal(block.as_ref().clone()));
        self.fan_out(|s| &s.proposals, block.as_ref().clone());
        Ok(())
    }

    fn broadcast_batch(&self, batch: Batch) -> quill_consensus::Result<()> {
        self.sent.lock().push(SentMessage::Batch(batch.clone()));
        self.fan_out(|s| &s.batches, batch);
        Ok(())
    }

    fn broadcast_new_view(&self, qc: QuorumCert) -> quill_consensus::Result<()> {
        self.sent.lock().push(SentMessage::NewView(qc.clone()));
        self.fan_out(|s| &s.new_views, qc);
        Ok(())
    }

    fn send_batch(&self, to: &PublicKey, batch: Batch) -> quill_consensus::Result<()> {
        self.sent
            .lock()
            .push(SentMessage::CertifiedBatch(*to, batch.clone()));
        self.deliver(to, |s| &s.batches, batch);
        Ok(())
    }

    fn send_vote(&self, to: &PublicKey, vote: Vote) -> quill_consensus::Result<()> {
        self.sent.lock().push(SentMessage::Vote(*to, vote.clone()));
        self.deliver(to, |s| &s.votes, vote);
        Ok(())
    }

    fn send_batch_vote(&self, to: &PublicKey, vote: BatchVote) -> quill_consensus::Result<()> {
        self.sent
            .lock()
            .push(SentMessage::BatchVote(*to, vote.clone()));
        self.deliver(to, |s| &s.batch_votes, vote);
        Ok(())
    }

    fn send_new_view(&self, to: &PublicKey, qc: QuorumCert) -> quill_consensus::Result<()> {
        self.sent
            .lock()
            .push(SentMessage::DirectNewView(*to, qc.clone()));
        self.deliver(to, |s| &s.new_views, qc);
        Ok(())
    }

    async fn request_block(
        &self,
        _from: &PublicKey,
        hash: &Hash,
    ) -> quill_consensus::Result<Block> {
        self.hub
            .inner
            .lock()
            .blocks_by_hash
            .get(hash)
            .cloned()
            .ok_or_else(|| ConsensusError::Transport("block not found".into()))
    }

    async fn request_block_by_height(
        &self,
        _from: &PublicKey,
        height: u64,
    ) -> quill_consensus::Result<Block> {
        self.hub
            .inner
            .lock()
            .blocks_by_height
            .get(&height)
            .cloned()
            .ok_or_else(|| ConsensusError::Transport("block not found".into()))
    }

    fn subscribe_proposal(&self, buffer: usize) -> mpsc::Receiver<Block> {
        self.subscribe(buffer, |s| &mut s.proposals)
    }

    fn subscribe_batch(&self, buffer: usize) -> mpsc::Receiver<Batch> {
        self.subscribe(buffer, |s| &mut s.batches)
    }

    fn subscribe_vote(&self, buffer: usize) -> mpsc::Receiver<Vote> {
        self.subscribe(buffer, |s| &mut s.votes)
    }

    fn subscribe_batch_vote(&self, buffer: usize) -> mpsc::Receiver<BatchVote> {
        self.subscribe(buffer, |s| &mut s.batch_votes)
    }

    fn subscribe_new_view(&self, buffer: usize) -> mpsc::Receiver<QuorumCert> {
        self.subscribe(buffer, |s| &mut s.new_views)
    }
}

/// Execution engine that acknowledges every transaction.
pub struct MockExecution;

impl Execution for MockExecution {
    fn execute(&self, block: &Block, txs: &[Transaction]) -> (BlockCommit, Vec<TxCommit>) {
        let block_commit = BlockCommit::new(*block.hash(), *block.merkle_root());
        let tx_commits = txs
            .iter()
            .map(|tx| TxCommit::new(*tx.hash(), *block.hash(), block.height(), 0.0))
            .collect();
        (block_commit, tx_commits)
    }

    fn simulate(&self, block: &Block) -> (BlockCommit, Vec<TxCommit>) {
        (BlockCommit::new(*block.hash(), *block.merkle_root()), Vec::new())
    }
}

/// One replica's collaborators, with handles kept for assertions.
pub struct TestNode {
    pub resources: Resources,
    pub tx_pool: Arc<MockTxPool>,
    pub storage: Arc<MockStorage>,
    pub msg_svc: Arc<MockMsgService>,
}

/// Build a replica's resources over the shared hub.
pub fn test_node(
    hub: &Arc<MockHub>,
    keys: &[PrivateKey],
    workers: usize,
    me: usize,
) -> TestNode {
    let validators = registry(keys, workers);
    let signer: Arc<dyn Signer> = Arc::new(keys[me].clone());
    let tx_pool = Arc::new(MockTxPool::default());
    let storage = Arc::new(MockStorage::default());
    let msg_svc = hub.service(keys[me].public_key());
    let resources = Resources {
        signer,
        validators,
        storage: storage.clone(),
        msg_svc: msg_svc.clone(),
        tx_pool: tx_pool.clone(),
        execution: Arc::new(MockExecution),
    };
    TestNode {
        resources,
        tx_pool,
        storage,
        msg_svc,
    }
}

/// Build a quorum certificate over `hash` signed by `keys`.
pub fn quorum_cert_over(hash: Hash, keys: &[PrivateKey]) -> QuorumCert {
    let votes: Vec<Vote> = keys.iter().map(|k| Vote::new(hash, k)).collect();
    QuorumCert::build(hash, &votes)
}
