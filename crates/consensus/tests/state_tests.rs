//! In-memory pool behaviour, orphan-fork queries and role checks.

mod common;

use std::sync::Arc;

use quill_consensus::ChainState;
use quill_crypto::PrivateKey;
use quill_types::Block;

use common::{keypairs, quorum_cert_over, registry};

fn chain_state(keys: &[PrivateKey], me: usize) -> Arc<ChainState> {
    Arc::new(ChainState::new(registry(keys, 2), keys[me].public_key()))
}

fn block_on(parent: &Arc<Block>, keys: &[PrivateKey], timestamp: i64) -> Arc<Block> {
    let qc = quorum_cert_over(*parent.hash(), &keys[..3]);
    Arc::new(
        Block::builder()
            .height(parent.height() + 1)
            .parent_hash(*parent.hash())
            .quorum_cert(qc)
            .timestamp(timestamp)
            .sign(&keys[0]),
    )
}

#[test]
fn pool_insert_lookup_delete() {
    let keys = keypairs(4);
    let state = chain_state(&keys, 0);
    let genesis = Arc::new(Block::builder().height(0).timestamp(0).sign(&keys[0]));

    state.set_block(genesis.clone());
    assert_eq!(state.block_pool_size(), 1);
    assert_eq!(
        state.block(genesis.hash()).unwrap().hash(),
        genesis.hash()
    );

    let qc = quorum_cert_over(*genesis.hash(), &keys[..3]);
    state.set_qc(qc.clone());
    assert_eq!(state.qc_pool_size(), 1);
    assert_eq!(state.qc(genesis.hash()).unwrap(), qc);

    state.delete_qc(genesis.hash());
    assert!(state.qc(genesis.hash()).is_none());

    state.delete_block(genesis.hash());
    assert!(state.block(genesis.hash()).is_none());
}

#[test]
fn committed_tail_serves_lookups() {
    let keys = keypairs(4);
    let state = chain_state(&keys, 0);
    let genesis = Arc::new(Block::builder().height(0).timestamp(0).sign(&keys[0]));

    state.set_committed_block(genesis.clone());
    assert!(state.block(genesis.hash()).is_some());

    state.delete_committed(genesis.hash());
    assert!(state.block(genesis.hash()).is_none());
}

#[test]
fn orphaned_forks_are_found_below_the_committed_block() {
    let keys = keypairs(4);
    let state = chain_state(&keys, 0);

    let genesis = Arc::new(Block::builder().height(0).timestamp(0).sign(&keys[0]));
    let b1 = block_on(&genesis, &keys, 1);
    let b2 = block_on(&b1, &keys, 2);
    let fork2 = block_on(&b1, &keys, 92);
    let fork3 = block_on(&fork2, &keys, 93);

    for block in [&genesis, &b1, &b2, &fork2, &fork3] {
        state.set_block((*block).clone());
    }

    let orphans = state.uncommitted_older_blocks(&b2);
    let hashes: Vec<_> = orphans.iter().map(|b| *b.hash()).collect();

    // the fork at b2's height is orphaned; ancestors are not, and the
    // fork's child above b2 is out of range
    assert!(hashes.contains(fork2.hash()));
    assert!(!hashes.contains(b1.hash()));
    assert!(!hashes.contains(genesis.hash()));
    assert!(!hashes.contains(b2.hash()));
    assert!(!hashes.contains(fork3.hash()));
    assert_eq!(orphans.len(), 1);
}

#[test]
fn older_blocks_by_height() {
    let keys = keypairs(4);
    let state = chain_state(&keys, 0);

    let genesis = Arc::new(Block::builder().height(0).timestamp(0).sign(&keys[0]));
    let b1 = block_on(&genesis, &keys, 1);
    let b2 = block_on(&b1, &keys, 2);
    for block in [&genesis, &b1, &b2] {
        state.set_block((*block).clone());
    }

    let older: Vec<u64> = state.older_blocks(1).iter().map(|b| b.height()).collect();
    assert_eq!(older.len(), 2);
    assert!(older.contains(&0) && older.contains(&1));
}

#[test]
fn roles_and_leader_tracking() {
    let keys = keypairs(4);

    let worker = chain_state(&keys, 0);
    assert!(worker.is_this_node_worker());
    assert!(worker.is_this_node_voter());
    assert!(worker.is_this_node_leader());

    worker.set_leader_index(1);
    assert_eq!(worker.leader_index(), 1);
    assert!(!worker.is_this_node_leader());
    assert!(worker.is_leader(&keys[1].public_key()));

    // a voter-only replica never leads
    let voter = chain_state(&keys, 3);
    assert!(!voter.is_this_node_worker());
    assert!(voter.is_this_node_voter());
    assert!(!voter.is_this_node_leader());
}

#[test]
fn committed_tx_counter() {
    let keys = keypairs(4);
    let state = chain_state(&keys, 0);
    assert_eq!(state.committed_tx_count(), 0);
    state.add_committed_tx_count(3);
    state.add_committed_tx_count(2);
    assert_eq!(state.committed_tx_count(), 5);
}
