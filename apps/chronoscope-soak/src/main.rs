//! Chronoscope soak harness.
//!
//! Drives every domain adapter from its own thread against the global
//! profiler, logs alerts as they fire and prints a summary at the end.
//!
//! Usage: `chronoscope-soak [ITERATIONS]` (default 10000). Logging honors
//! `RUST_LOG`; profiler settings honor `CHRONOSCOPE_*`.

use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chronoscope_profiler::domains::{
    CoroutineOperation, LogLevel, LogPayload, LogScope, MessageOperation, PoolOperation,
    RecordStore, POOL,
};
use chronoscope_profiler::{
    profile_duration, profile_scope, CoroutineProfiler, CounterProvider, DomainAdapter,
    DomainMetricsProvider, EntityId, LoggingProfiler, MessageBusProfiler, PoolProfiler, Profiler,
    ProfilerConfig, SerializationProfiler, Tag,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_ITERATIONS: usize = 10_000;
const POOL_CAPACITY: usize = 64;

struct Domains {
    pools: PoolProfiler,
    buses: MessageBusProfiler,
    serializers: SerializationProfiler,
    coroutines: CoroutineProfiler,
    logging: LoggingProfiler,
}

impl Domains {
    fn new(profiler: &Arc<Profiler>, provider: Arc<dyn DomainMetricsProvider>) -> Self {
        let pools = DomainAdapter::new(POOL, Arc::clone(profiler)).with_provider(provider);
        Self {
            pools: PoolProfiler::from_adapter(pools),
            buses: MessageBusProfiler::new(Arc::clone(profiler)),
            serializers: SerializationProfiler::new(Arc::clone(profiler)),
            coroutines: CoroutineProfiler::new(Arc::clone(profiler)),
            logging: LoggingProfiler::new(Arc::clone(profiler)),
        }
    }
}

/// Burn a little CPU so sessions have a measurable duration.
fn work(units: u64) -> u64 {
    let mut acc = 0u64;
    for x in 0..units * 50 {
        acc = black_box(acc.wrapping_mul(31).wrapping_add(x));
    }
    acc
}

fn run_pool(pools: &PoolProfiler, iterations: usize) {
    let pool = EntityId(1);
    let mut active = 0usize;
    for i in 0..iterations {
        if active < POOL_CAPACITY && i % 3 != 2 {
            let _scope = pools.begin_acquire_scope(pool, "bullets", active, POOL_CAPACITY - active);
            active += 1;
            work(2);
        } else if active > 0 {
            let _scope = pools.begin_release_scope(pool, "bullets", active, POOL_CAPACITY - active);
            active -= 1;
            work(1);
        }
        if i % 1000 == 999 {
            pools.profile_pool_action(PoolOperation::Clear, pool, "bullets", || work(20));
            active = 0;
        }
    }
}

struct PlayerMoved;
struct ChunkLoaded;

fn run_buses(buses: &MessageBusProfiler, iterations: usize) {
    let bus = EntityId(10);
    for i in 0..iterations {
        if i % 4 == 0 {
            buses.profile_publish::<ChunkLoaded, _>(bus, 2, || work(8));
        } else {
            let _scope = buses.begin_publish_scope::<PlayerMoved>(bus, 5);
            for _ in 0..5 {
                let _deliver = buses.begin_deliver_scope::<PlayerMoved>(bus);
                work(1);
            }
        }
    }
    let subscribe = MessageOperation::Subscribe;
    drop(buses.begin_message_scope(subscribe, bus, "PlayerMoved", 6));
}

fn run_serializers(serializers: &SerializationProfiler, iterations: usize) {
    let serializer = EntityId(20);
    for i in 0..iterations {
        let format = if i % 2 == 0 { Some("json") } else { None };
        let encode = || {
            work(4);
            Ok::<_, String>(vec![0u8; 32 + i % 480])
        };
        if let Ok(bytes) = serializers.profile_serialize(serializer, format, encode) {
            let _scope = serializers.begin_deserialize_scope(serializer, format, bytes.len());
            work(3);
        }
    }
}

fn run_coroutines(coroutines: &CoroutineProfiler, iterations: usize) {
    let names = ["spawn_wave", "pathfind", "autosave"];
    for i in 0..iterations {
        let id = EntityId(100 + (i % 16) as u64);
        let name = names[i % names.len()];
        let running = 16 - i % 16;
        if i % 16 == 0 {
            let start = CoroutineOperation::Start;
            let _scope = coroutines.begin_coroutine_scope(start, id, Some(name), running);
            work(2);
        }
        let _scope = coroutines.begin_resume_scope(id, Some(name), running);
        work(if name == "pathfind" { 6 } else { 2 });
    }
}

fn run_logging(logging: &LoggingProfiler, iterations: usize) {
    let sink = EntityId(200);
    let store = RecordStore::new();
    let frame = LogScope::root("frame");
    let physics = frame.child("physics");
    for i in 0..iterations {
        let (target, level, scope) = match i % 10 {
            0 => ("physics", LogLevel::Warn, &physics),
            _ => ("frame", LogLevel::Debug, &frame),
        };
        logging.profile_write(sink, target, level, Some(scope), || {
            let payload = LogPayload::message(format!("tick {i}")).with_scope(scope.clone());
            let captured = store.capture(sink, level, payload);
            black_box(captured.record());
        });
        if i % 500 == 499 {
            let _scope = logging.begin_flush_scope(sink, 500);
            work(10);
        }
    }
    if store.live() != 0 {
        warn!("{} log payloads were not released", store.live());
    }
}

fn parse_iterations() -> anyhow::Result<usize> {
    let Some(arg) = std::env::args().nth(1) else {
        return Ok(DEFAULT_ITERATIONS);
    };
    arg.parse()
        .with_context(|| format!("invalid iteration count '{arg}'"))
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let iterations = parse_iterations()?;
    let config = ProfilerConfig::from_env().context("loading config")?;
    let profiler = chronoscope_profiler::init(config);

    let alerts = Arc::new(AtomicUsize::new(0));
    let alert_count = Arc::clone(&alerts);
    profiler.subscribe_alerts(move |alert| {
        if alert_count.fetch_add(1, Ordering::Relaxed) < 10 {
            warn!(
                "Alert {}: {:.3} exceeded {:.3}",
                alert.key, alert.value, alert.threshold
            );
        }
        Ok(())
    });

    let provider: Arc<dyn DomainMetricsProvider> = Arc::new(CounterProvider::new());
    let domains = Domains::new(&profiler, provider);
    domains.pools.register_alert(EntityId(1), "active", 48.0);
    domains
        .coroutines
        .register_operation_alert("Resume", Some("pathfind"), 0.5);
    profiler.register_metric_alert(Tag::new("Serialization", "Serialize.json"), 1.0);

    info!("Soaking {} iterations per domain", iterations);
    let started = Instant::now();
    {
        profile_scope!("Soak", "Run");
        crossbeam::thread::scope(|s| {
            s.spawn(|_| run_pool(&domains.pools, iterations));
            s.spawn(|_| run_buses(&domains.buses, iterations));
            s.spawn(|_| run_serializers(&domains.serializers, iterations));
            s.spawn(|_| run_coroutines(&domains.coroutines, iterations));
            s.spawn(|_| run_logging(&domains.logging, iterations));
        })
        .map_err(|_| anyhow::anyhow!("a soak worker panicked"))?;
    }
    let elapsed = started.elapsed();
    profile_duration!(Tag::new("Soak", "Wall"), elapsed);

    for (tag, snapshot) in profiler.all_metrics() {
        info!(
            "{:<40} n={:<7} avg={:>8.4}ms max={:>8.4}ms p95={:>8.4}ms",
            tag,
            snapshot.count,
            snapshot.avg_ms(),
            snapshot.max_ms(),
            snapshot.p95.unwrap_or(Duration::ZERO).as_secs_f64() * 1000.0
        );
    }
    let pool = domains.pools.metrics(EntityId(1));
    info!(
        "Pool 'bullets': {} operations, provider view {:?}",
        pool.engine.operations.len(),
        pool.domain
    );
    let cache = profiler.cache_stats();
    info!(
        "Finished in {:.2?}: {} alerts, entity cache {} hits / {} misses",
        elapsed,
        alerts.load(Ordering::Relaxed),
        cache.hits,
        cache.misses
    );

    chronoscope_profiler::shutdown();
    Ok(())
}
