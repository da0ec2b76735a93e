//! The batch layer: voter-side caching and vote queues, worker-side
//! signature aggregation, certificate sealing and the ready queue.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use quill_consensus::{LeaderState, VoterState};
use quill_crypto::{PrivateKey, Signer};
use quill_types::{Batch, Transaction, ValidatorStore};

use common::{keypairs, registry, tx};

fn batch_of(key: &PrivateKey, nonces: std::ops::Range<u64>, timestamp: i64) -> Batch {
    let txs: Vec<Transaction> = nonces.map(|n| tx(key, n)).collect();
    Batch::new(txs, timestamp, key)
}

#[test]
fn voter_state_dedupes_and_limits_votes() {
    let keys = keypairs(4);
    let voter = VoterState::new(2);

    let a = batch_of(&keys[0], 0..2, 1);
    let b = batch_of(&keys[0], 2..4, 2);
    let c = batch_of(&keys[0], 4..6, 3);

    assert!(voter.add_batch(a.clone(), 0));
    assert!(!voter.add_batch(a.clone(), 0), "duplicate batch re-queued");
    assert!(voter.add_batch(b.clone(), 0));
    assert!(voter.add_batch(c.clone(), 0));
    assert_eq!(voter.batch_count(), 3);

    // drains in observation order, two per vote
    assert_eq!(voter.pop_votes(0), vec![*a.hash(), *b.hash()]);
    assert_eq!(voter.pop_votes(0), vec![*c.hash()]);
    assert!(voter.pop_votes(0).is_empty());

    assert!(voter.batch(a.hash()).is_some());
    let committed: HashSet<_> = [*a.hash(), *b.hash()].into_iter().collect();
    voter.remove_batches(&committed);
    assert_eq!(voter.batch_count(), 1);
    assert!(voter.batch(a.hash()).is_none());
}

#[test]
fn leader_state_seals_at_exact_voter_majority() {
    let keys = keypairs(4);
    let validators = registry(&keys, 2);
    assert_eq!(validators.majority_voter_count(), 3);

    let leader = LeaderState::new(3, 2, Duration::from_secs(60));
    let batch = batch_of(&keys[0], 0..2, 1);
    leader.register_batch(batch.clone());
    assert_eq!(leader.accumulating_count(), 1);

    let sig = |i: usize| keys[i].sign(batch.hash());

    assert!(leader.add_signature(batch.hash(), sig(0)).is_none());
    assert!(leader.add_signature(batch.hash(), sig(0)).is_none(), "duplicate voter counted");
    assert!(leader.add_signature(batch.hash(), sig(1)).is_none());

    let certified = leader.add_signature(batch.hash(), sig(2)).expect("sealed at majority");
    assert_eq!(certified.hash(), batch.hash());
    let header = certified.header();
    assert!(header.validate(validators.as_ref()).is_ok());

    assert_eq!(leader.accumulating_count(), 0);
    assert_eq!(leader.ready_count(), 1);

    // signatures for a consumed accumulator are dropped
    assert!(leader.add_signature(batch.hash(), sig(3)).is_none());
}

#[test]
fn ready_queue_drains_in_block_sized_chunks() {
    let keys = keypairs(4);
    let leader = LeaderState::new(1, 1, Duration::from_secs(60));

    let a = batch_of(&keys[0], 0..1, 1);
    let b = batch_of(&keys[0], 1..2, 2);
    leader.register_batch(a.clone());
    leader.register_batch(b.clone());
    leader.add_signature(a.hash(), keys[1].sign(a.hash()));
    leader.add_signature(b.hash(), keys[1].sign(b.hash()));
    assert_eq!(leader.ready_count(), 2);

    assert_eq!(leader.pop_ready_headers().len(), 1);
    assert_eq!(leader.pop_ready_headers().len(), 1);
    assert!(leader.pop_ready_headers().is_empty());
}

#[test]
fn each_batch_enters_the_ready_queue_once() {
    let keys = keypairs(4);
    let leader = LeaderState::new(1, 4, Duration::from_secs(60));

    let batch = batch_of(&keys[0], 0..1, 1);
    leader.register_batch(batch.clone());
    let certified = leader
        .add_signature(batch.hash(), keys[1].sign(batch.hash()))
        .unwrap();

    // a certified copy arriving over the wire must not re-queue it
    leader.enqueue_ready(certified.header());
    assert_eq!(leader.ready_count(), 1);

    assert_eq!(leader.pop_ready_headers().len(), 1);
    leader.enqueue_ready(certified.header());
    assert_eq!(leader.ready_count(), 0);
}

#[test]
fn batches_missing_their_vote_window_are_dropped() {
    let keys = keypairs(4);
    let leader = LeaderState::new(3, 2, Duration::ZERO);

    let a = batch_of(&keys[0], 0..2, 1);
    let b = batch_of(&keys[0], 2..4, 2);

    assert!(leader.register_batch(a.clone()).is_empty());
    std::thread::sleep(Duration::from_millis(5));
    let dropped = leader.register_batch(b.clone());
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].hash(), a.hash());

    // votes for the dropped batch are ignored
    assert!(leader
        .add_signature(a.hash(), keys[1].sign(a.hash()))
        .is_none());
}
