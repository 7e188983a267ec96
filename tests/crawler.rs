mod common;

use common::*;
use dht_harvester::prelude::*;
use dht_harvester::{DiskBloom, RoutingTableStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn options_in(dir: &Path) -> CrawlerOptions {
    CrawlerOptions {
        bloom_path: dir.join("bloom.bin"),
        bloom_bits: 1 << 12,
        bloom_hashes: 5,
        routing_table_path: dir.join("routing.json"),
        metadata_timeout: Duration::from_secs(5),
        hot_seeds: vec![id(999)],
        ..CrawlerOptions::default()
    }
}

#[tokio::test]
async fn restores_routing_table_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());
    let saved = vec![routing_node(1), routing_node(2)];
    RoutingTableStore::new(&options.routing_table_path)
        .save_nodes(&saved)
        .unwrap();

    let engine = Arc::new(FakeEngine::default());
    let crawler = Crawler::start(
        options,
        engine.clone(),
        Arc::new(ScriptedFetcher::new()),
        Arc::new(MemorySink::new()),
    )
    .await
    .unwrap();

    assert_eq!(engine.added(), saved);
    assert_eq!(crawler.routing_table_size(), 2);
    crawler.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_persists_filter_and_routing_table() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());
    let engine = Arc::new(FakeEngine::with_nodes(vec![
        routing_node(7),
        routing_node(8),
        routing_node(9),
    ]));
    let sink = Arc::new(MemorySink::new());

    let crawler = Crawler::start(
        options.clone(),
        engine.clone(),
        Arc::new(ScriptedFetcher::new()),
        sink.clone(),
    )
    .await
    .unwrap();

    let events = crawler.events();
    events.send(discovered(1)).await.unwrap();
    events.send(discovered(2)).await.unwrap();
    wait_until(|| crawler.stats().saved == 2).await;

    crawler.shutdown().await.unwrap();

    let bloom = DiskBloom::open(&options.bloom_path, 1, 1);
    assert_eq!(bloom.number_of_bits(), 1 << 12);
    assert_eq!(bloom.number_of_hash_functions(), 5);
    assert!(bloom.test(&id(1)));
    assert!(bloom.test(&id(2)));

    let restored = RoutingTableStore::new(&options.routing_table_path).load();
    assert_eq!(restored, engine.nodes());
    assert_eq!(sink.records().len(), 2);
}

#[tokio::test]
async fn processed_identifiers_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());

    let first_fetcher = Arc::new(ScriptedFetcher::new());
    let crawler = Crawler::start(
        options.clone(),
        Arc::new(FakeEngine::default()),
        first_fetcher.clone(),
        Arc::new(MemorySink::new()),
    )
    .await
    .unwrap();
    crawler.events().send(discovered(42)).await.unwrap();
    wait_until(|| crawler.stats().saved == 1).await;
    crawler.shutdown().await.unwrap();

    let second_fetcher = Arc::new(ScriptedFetcher::new());
    let crawler = Crawler::start(
        options,
        Arc::new(FakeEngine::default()),
        second_fetcher.clone(),
        Arc::new(MemorySink::new()),
    )
    .await
    .unwrap();
    crawler.events().send(discovered(42)).await.unwrap();
    wait_until(|| crawler.stats().received == 1).await;

    assert_eq!(crawler.stats().rejected_seen, 1);
    assert!(second_fetcher.calls().is_empty());
    crawler.shutdown().await.unwrap();
}

#[tokio::test]
async fn corrupt_state_files_fall_back_to_fresh_state() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_in(dir.path());
    std::fs::write(&options.bloom_path, b"garbage").unwrap();
    std::fs::write(&options.routing_table_path, b"{not json").unwrap();

    let engine = Arc::new(FakeEngine::default());
    let crawler = Crawler::start(
        options.clone(),
        engine.clone(),
        Arc::new(ScriptedFetcher::new()),
        Arc::new(MemorySink::new()),
    )
    .await
    .unwrap();

    assert!(engine.added().is_empty());
    // 损坏的布隆过滤器文件在启动时就被覆盖
    let raw = std::fs::read(&options.bloom_path).unwrap();
    assert_eq!(raw.len(), 8 + (1 << 12) / 32 * 4);

    crawler.shutdown().await.unwrap();
}
