//! 内存存储上的完整读写示例：
//! 执行命令产生事件 → 保存 → 另一工作单元加载重建。
//!
//! 运行：`cargo run -p es-persist --example tally_roundtrip`
use es_persist::aggregate::{Aggregate, SnapshotAggregateFactory};
use es_persist::conflict::NullConflictDetector;
use es_persist::repository::EventStoreRepository;
use es_persist::store_inmemory::InMemoryEventStore;
use es_persist::stream::EventMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tally {
    id: String,
    version: usize,
    total: i64,
    #[serde(skip)]
    pending: Vec<Value>,
}

impl Tally {
    fn add(&mut self, by: i64) {
        self.version += 1;
        self.total += by;
        self.pending.push(json!({ "by": by }));
    }
}

impl Aggregate for Tally {
    const TYPE: &'static str = "tally";

    fn new(stream_id: &str) -> Self {
        Self {
            id: stream_id.to_string(),
            ..Default::default()
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> usize {
        self.version
    }

    fn apply(&mut self, event: &EventMessage) {
        if event.version() <= self.version {
            return;
        }
        self.total += event.payload()["by"].as_i64().unwrap_or(0);
        self.version = event.version();
    }

    fn uncommitted_events(&self) -> Vec<Value> {
        self.pending.clone()
    }

    fn clear_uncommitted_events(&mut self) {
        self.pending.clear();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryEventStore::new());

    // 工作单元一：执行命令并保存
    let mut unit1 = EventStoreRepository::new(
        Arc::clone(&store),
        SnapshotAggregateFactory,
        NullConflictDetector,
    );
    let mut tally = Tally::new("tally-1");
    tally.add(3);
    tally.add(4);
    unit1.save(&mut tally, Uuid::new_v4()).await?;
    println!("saved: version={} total={}", tally.version(), tally.total);

    // 工作单元二：按事件流重建
    let mut unit2 = EventStoreRepository::new(
        Arc::clone(&store),
        SnapshotAggregateFactory,
        NullConflictDetector,
    );
    let loaded: Tally = unit2
        .load("tally-1", 0)
        .await?
        .expect("stream has committed events");
    println!("loaded: version={} total={}", loaded.version(), loaded.total);

    Ok(())
}
