//! End-to-end runs of the harness against in-memory ledgers.

use loadgen_spammer::router::outcome_router;
use loadgen_spammer::testing::MockLedger;
use loadgen_spammer::{
    Account, AccountPool, AmountPolicy, ConfirmationTracker, Harness, HarnessConfig, SenderLoop,
    ShardClients, TransferWorkload, TxStatus,
};
use loadgen_types::{KeyPair, ShardId};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("loadgen_spammer=debug"))
        .with_test_writer()
        .try_init();
}

fn key_file(keys: &[&KeyPair]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for key in keys {
        writeln!(file, "{}", key.to_hex()).unwrap();
    }
    file
}

fn single_shard(ledger: &MockLedger) -> ShardClients<MockLedger> {
    let mut clients = ShardClients::new();
    clients.insert(ledger.shard(), ledger.clone());
    clients
}

#[tokio::test(start_paused = true)]
async fn test_single_key_throughput_only() {
    init_tracing();
    let key = KeyPair::from_seed(&[7; 32]);
    let file = key_file(&[&key]);

    let ledger = MockLedger::new("shard0", ShardId(0));
    ledger.set_balance(key.address(), 100);
    ledger.set_nonce(key.address(), 0);

    let config = HarnessConfig::new(vec!["mock".into()])
        .with_num_shards(1)
        .with_key_file(file.path())
        .with_target_tps(1)
        .with_throughput_only(true)
        .with_seed(1);

    let harness = Harness::bootstrap(config, single_shard(&ledger))
        .await
        .unwrap();
    assert_eq!(harness.pool().len(), 1);

    // The limiter holds the second send until t = 1s.
    let report = harness
        .run_for(Duration::from_millis(500))
        .await
        .unwrap();

    assert_eq!(report.sender.submitted, 1);
    assert_eq!(report.pool_balance, 99);
    assert!(report.tracker.is_none());

    let sent = ledger.submitted();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].transfer.from, key.address());
    assert_eq!(sent[0].transfer.nonce, 0);
    assert_eq!(sent[0].transfer.amount, 100_000_000);
    assert!(sent[0].verify());
}

#[tokio::test(start_paused = true)]
async fn test_empty_key_file_runs_without_sending() {
    let file = key_file(&[]);
    let ledger = MockLedger::new("shard0", ShardId(0));

    let config = HarnessConfig::new(vec!["mock".into()])
        .with_num_shards(1)
        .with_key_file(file.path())
        .with_seed(1);

    let harness = Harness::bootstrap(config, single_shard(&ledger))
        .await
        .unwrap();
    assert!(harness.pool().is_empty());

    let report = harness.run_for(Duration::from_secs(3)).await.unwrap();
    assert_eq!(report.sender.submitted, 0);
    assert!(report.sender.passes >= 1);
    assert_eq!(ledger.submit_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_recipient_lifecycle() {
    init_tracing();
    let ledger = MockLedger::new("shard0", ShardId(0));
    ledger.set_default_status(Some(TxStatus::Block));
    let clients = single_shard(&ledger);

    let parent = Account::funded(KeyPair::from_seed(&[3; 32]), 1, 100, 0);
    let parent_address = parent.address;
    let pool = AccountPool::from_accounts(vec![parent]);

    let (router_tx, router_rx) = outcome_router(16);
    let tracker = ConfirmationTracker::new(pool.clone(), clients.clone(), router_rx);
    let cancel = CancellationToken::new();
    let tracker_handle = tokio::spawn(tracker.run(cancel.clone()));

    let workload = TransferWorkload::new(1).with_policy(AmountPolicy::Minimal);
    let mut sender = SenderLoop::new(
        pool.clone(),
        clients,
        workload,
        10,
        ChaCha8Rng::seed_from_u64(5),
    )
    .with_router(router_tx);

    assert_eq!(sender.run_pass(&cancel).await, 1);
    let child_address = ledger.submitted()[0].transfer.to;
    assert_eq!(pool.len(), 1);
    assert!(pool.contains(&parent_address));
    assert_eq!(pool.total_balance(), 99);

    // Included at the first poll (30s), re-admitted once 120s have passed.
    tokio::time::sleep(Duration::from_secs(140)).await;
    assert!(!pool.contains(&child_address));

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(pool.contains(&child_address));
    let child = pool
        .snapshot()
        .into_iter()
        .find(|a| a.address == child_address)
        .unwrap();
    assert_eq!(child.balance(), 1);
    assert_eq!(child.nonce(), 0);
    assert_eq!(child.shard, ShardId(0));
    assert!(child.packed());
    assert!(child.pending_tx().is_none());

    cancel.cancel();
    let report = tracker_handle.await.unwrap();
    assert_eq!(report.received, 1);
    assert_eq!(report.included, 1);
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.latency.samples(), 1);
    // Enqueued at t = 0, first seen in a block by the poll at t = 30s.
    let p50 = report.latency.p50_latency().as_secs_f64();
    assert!((p50 - 30.0).abs() <= 0.03, "p50 was {p50}s");
    assert!(report.latency.max_latency() >= Duration::from_secs(29));
}

#[tokio::test(start_paused = true)]
async fn test_transfers_stay_on_sender_shard() {
    let num_shards = 2;
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let key0 = KeyPair::generate_on_shard(ShardId(0), num_shards, &mut rng).unwrap();
    let key1 = KeyPair::generate_on_shard(ShardId(1), num_shards, &mut rng).unwrap();
    let file = key_file(&[&key0, &key1]);

    let ledger0 = MockLedger::new("shard0", ShardId(0));
    let ledger1 = MockLedger::new("shard1", ShardId(1));
    ledger0.set_balance(key0.address(), 10);
    ledger1.set_balance(key1.address(), 10);

    // Endpoint order does not matter: shards come from node info.
    let clients = ShardClients::discover(vec![ledger1.clone(), ledger0.clone()], num_shards)
        .await
        .unwrap();

    let config = HarnessConfig::new(vec!["shard0".into(), "shard1".into()])
        .with_num_shards(num_shards)
        .with_key_file(file.path())
        .with_target_tps(100)
        .with_throughput_only(true)
        .with_seed(3);

    let harness = Harness::bootstrap(config, clients).await.unwrap();
    assert_eq!(harness.pool().len(), 2);

    let report = harness.run_for(Duration::from_secs(2)).await.unwrap();
    assert_eq!(report.sender.accepted, 20);

    for (ledger, key, shard) in [(&ledger0, &key0, ShardId(0)), (&ledger1, &key1, ShardId(1))] {
        let sent = ledger.submitted();
        assert_eq!(sent.len(), 10);
        assert!(sent.iter().all(|t| t.transfer.from == key.address()));
        assert!(sent.iter().all(|t| t.transfer.to.shard(num_shards) == shard));
        let nonces: Vec<u64> = sent.iter().map(|t| t.transfer.nonce).collect();
        assert_eq!(nonces, (0..10).collect::<Vec<_>>());
    }
}
