//! Reconstruct -> cluster over a recorded session.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use pretty_assertions::assert_eq;

use e2e_tests::{event_at, TestHarness};
use mesh_threads::Reconstructor;
use mesh_topics::{excluded_path, Clusterer};
use mesh_types::{ClusterSettings, ReconstructSettings, Thread};

const THEMES: [[&str; 2]; 4] = [
    [
        "gaussian splat training converged",
        "splat densification looks gaussian",
    ],
    [
        "unity importer material mapping",
        "importer crashes on unity prefab",
    ],
    [
        "token budget exceeded today",
        "reduce token spend budget",
    ],
    [
        "camera calibration lens distortion",
        "lens calibration camera rig",
    ],
];

/// Twenty threads with k=4: every thread ends up in exactly one
/// superthread or in the excluded list.
#[tokio::test]
async fn test_twenty_threads_four_topics() {
    let harness = TestHarness::start_direct_only().await;
    let mut client = harness.ingest_client().await;

    let mut offset = 0;
    for n in 0..20 {
        let correlation = format!("thread-{n:02}");
        let payloads: [&str; 2] = if n >= 18 {
            // Nothing survives cleaning
            ["ok", "42"]
        } else {
            THEMES[n % 4]
        };
        for (i, payload) in payloads.iter().enumerate() {
            // Numbers keep payloads distinct and never survive cleaning
            let payload = format!("{payload} {n}");
            let event = event_at("agent", "work", &payload, offset + i as i64 * 10)
                .with_correlation_id(correlation.clone());
            client.ingest(&event).await.unwrap();
        }
        offset += 60;
    }

    let dir = harness.shutdown().await;
    let threads_path = dir.path().join("threads.jsonl");
    let report = Reconstructor::new(ReconstructSettings::default())
        .unwrap()
        .run(&dir.path().join("current_session.jsonl"), &threads_path)
        .unwrap();
    assert_eq!(report.threads_emitted, 20);

    let output = dir.path().join("superthreads.json");
    let settings = ClusterSettings {
        k: 4,
        ..Default::default()
    };
    let cluster = Clusterer::new(settings).unwrap().run(&threads_path, &output).unwrap();

    assert_eq!(cluster.threads_in, 20);
    assert_eq!(cluster.clustered + cluster.excluded.len(), 20);
    assert_eq!(cluster.excluded, vec!["ctx:thread-18", "ctx:thread-19"]);

    let map: BTreeMap<String, Vec<Thread>> =
        serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
    assert!(map.len() <= 4);
    assert!(map.keys().all(|name| name.starts_with("Topic ")));

    let mut seen = BTreeSet::new();
    for members in map.values() {
        for thread in members {
            assert!(seen.insert(thread.thread_id.clone()), "thread assigned twice");
        }
    }
    let excluded: Vec<String> =
        serde_json::from_slice(&fs::read(excluded_path(&output)).unwrap()).unwrap();
    for id in &excluded {
        assert!(seen.insert(id.clone()), "excluded thread also clustered");
    }
    assert_eq!(seen.len(), 20);
}

/// Clustering reads thread output only and can be rerun with another k.
#[tokio::test]
async fn test_recluster_with_different_k() {
    let harness = TestHarness::start_direct_only().await;
    let mut client = harness.ingest_client().await;
    for n in 0..8 {
        for (i, payload) in THEMES[n % 2].iter().enumerate() {
            let payload = format!("{payload} {n}");
            let event = event_at("agent", "work", &payload, (n * 60 + i * 10) as i64)
                .with_correlation_id(format!("t{n}"));
            client.ingest(&event).await.unwrap();
        }
    }
    let dir = harness.shutdown().await;

    let threads_path = dir.path().join("threads.jsonl");
    Reconstructor::new(ReconstructSettings::default())
        .unwrap()
        .run(&dir.path().join("current_session.jsonl"), &threads_path)
        .unwrap();
    let before = fs::read(&threads_path).unwrap();

    for k in [1, 2] {
        let output = dir.path().join(format!("k{k}.json"));
        let report = Clusterer::new(ClusterSettings {
            k,
            ..Default::default()
        })
        .unwrap()
        .run(&threads_path, &output)
        .unwrap();
        assert_eq!(report.clustered, 8);
        assert!(report.topics <= k);
    }

    assert_eq!(fs::read(&threads_path).unwrap(), before);
}
