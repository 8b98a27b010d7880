//! Memory store throughput.
//!
//!   remember_with_archival ........ one remember into a full buffer
//!   search_top5_from_500 .......... keyword search across both tiers
//!   search_typed_from_500 ......... empty query filtered by type
//!   recall_5 ...................... newest-first short-term read
//!   save_load_roundtrip_200 ....... JSON document round trip

use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use scholar_core::config::{MemoryConfig, RetrievalConfig};
use scholar_core::{AgentId, LocationInfo, LocationKey, LocationMap, MemoryDraft, MemoryStore, MemoryType, SimTime};

const PLACES: [&str; 4] = ["classroom", "library", "cafeteria", "playground"];
const TOPICS: [&str; 3] = ["algebra", "geometry", "calculus"];

fn campus() -> Arc<LocationMap> {
    let map = LocationMap::new(PLACES.iter().map(|key| {
        (
            LocationKey::from(*key),
            LocationInfo {
                social: true,
                ..LocationInfo::default()
            },
        )
    }))
    .expect("campus map");
    Arc::new(map)
}

fn draft(i: usize) -> MemoryDraft {
    let tag = match i % 3 {
        0 => MemoryType::Learning,
        1 => MemoryType::Conversation,
        _ => MemoryType::Event,
    };
    let topic = TOPICS[i % TOPICS.len()];
    #[allow(clippy::cast_precision_loss)]
    let importance = (i % 10) as f32 / 10.0;
    MemoryDraft::new(
        format!("Event {i}: talked about {topic} with student_{}", i % 7),
        PLACES[i % PLACES.len()],
        tag,
    )
    .with_importance(importance)
    .with_related([AgentId::new(format!("student_{}", i % 7))])
}

fn filled_store(n: usize) -> MemoryStore {
    let mut store = MemoryStore::new(
        AgentId::from("bench"),
        campus(),
        &MemoryConfig::default(),
        &RetrievalConfig::default(),
    );
    for i in 0..n {
        let tick = u32::try_from(i / 5).expect("small");
        let period = u32::try_from(i % 5).expect("small");
        store.advance_clock(SimTime::new(tick + 1, period, 5));
        store.remember(draft(i)).expect("remember");
    }
    store
}

fn bench_remember(c: &mut Criterion) {
    let mut store = filled_store(20);
    let mut i = 20;
    c.bench_function("remember_with_archival", |b| {
        b.iter(|| {
            i += 1;
            black_box(store.remember(draft(i)).expect("remember"));
        });
    });
}

fn bench_search(c: &mut Criterion) {
    let mut store = filled_store(500);
    c.bench_function("search_top5_from_500", |b| {
        b.iter(|| black_box(store.search(black_box("calculus homework"), None, Some(5))));
    });
    c.bench_function("search_typed_from_500", |b| {
        b.iter(|| black_box(store.search("", Some(MemoryType::Learning), Some(5))));
    });
    c.bench_function("recall_5", |b| {
        b.iter(|| black_box(store.recall(5)));
    });
}

fn bench_persistence(c: &mut Criterion) {
    let dir = std::env::temp_dir().join(format!("scholar-bench-{}", std::process::id()));
    let path = dir.join("bench.json");
    let store = filled_store(200);
    c.bench_function("save_load_roundtrip_200", |b| {
        b.iter_batched(
            || store.clone(),
            |store| {
                store.save(&path).expect("save");
                let loaded = MemoryStore::load(
                    &path,
                    AgentId::from("bench"),
                    campus(),
                    &MemoryConfig::default(),
                    &RetrievalConfig::default(),
                )
                .expect("load");
                black_box(loaded.is_loaded())
            },
            BatchSize::SmallInput,
        );
    });
    let _ = std::fs::remove_dir_all(dir);
}

criterion_group!(benches, bench_remember, bench_search, bench_persistence);
criterion_main!(benches);
