use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use tracing::info;
use tracing_subscriber::EnvFilter;

use limit_dispatcher::config::DispatcherConfig;
use limit_dispatcher::local::LocalCounterStore;
use limit_dispatcher::{
    CounterStore, Dispatcher, DispatcherOptions, GlobalWindowMode, KeyPrefix, Precedence,
    RejectionKind, RouteLimit,
};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Store {
    Local,
    Redis,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum WindowMode {
    PerClient,
    Shared,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ClientDist {
    /// Every request comes from one client.
    Hot,
    /// Requests spread evenly over `--clients`.
    Uniform,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "limit-dispatcher-stress",
    about = "Load test / benchmark harness for limit-dispatcher"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Store::Local)]
    store: Store,

    /// Load dispatcher settings from a YAML file instead of the flags below.
    #[arg(long)]
    config: Option<String>,

    #[arg(long, value_enum, default_value_t = WindowMode::PerClient)]
    window_mode: WindowMode,

    #[arg(long, value_enum, default_value_t = ClientDist::Uniform)]
    client_dist: ClientDist,

    #[arg(long, default_value_t = 8)]
    tasks: usize,

    #[arg(long, default_value_t = 10)]
    duration_s: u64,

    #[arg(long, default_value_t = 1000)]
    clients: usize,

    #[arg(long, default_value_t = 4)]
    routes: usize,

    #[arg(long, default_value_t = 60)]
    global_window_s: u64,

    #[arg(long, default_value_t = 1000)]
    global_limit: i64,

    #[arg(long, default_value_t = 10)]
    route_window_s: u64,

    #[arg(long, default_value_t = 100)]
    route_limit: i64,

    #[arg(long, default_value_t = 100)]
    sample_every: u64,

    #[arg(long, default_value = "redis://127.0.0.1:16379/")]
    redis_url: String,

    #[arg(long, default_value_t = 4)]
    redis_connections: usize,

    #[arg(long, default_value = "stress")]
    redis_prefix: String,
}

#[derive(Default)]
struct Counts {
    allowed: AtomicU64,
    rejected_global: AtomicU64,
    rejected_route: AtomicU64,
    errors: AtomicU64,
}

fn build_options(args: &Args, config: Option<&DispatcherConfig>) -> DispatcherOptions {
    if let Some(config) = config {
        return config.to_options().unwrap();
    }

    let mut options =
        DispatcherOptions::new(Duration::from_secs(args.global_window_s), args.global_limit)
            .unwrap();
    options.prefix = Some(KeyPrefix::try_from(args.redis_prefix.clone()).unwrap());
    options.window_mode = match args.window_mode {
        WindowMode::PerClient => GlobalWindowMode::PerClient,
        WindowMode::Shared => GlobalWindowMode::Shared,
    };
    options.precedence = Precedence::GlobalFirst;
    options
}

async fn build_store(args: &Args, config: Option<&DispatcherConfig>) -> Arc<dyn CounterStore> {
    match args.store {
        Store::Local => Arc::new(LocalCounterStore::new()),
        #[cfg(feature = "redis-tokio")]
        Store::Redis => {
            use limit_dispatcher::redis::RedisCounterStore;

            // A redis section in the config file wins over the command line.
            if let Some(redis_config) = config.and_then(|config| config.redis.as_ref()) {
                return Arc::new(RedisCounterStore::from_config(redis_config).await.unwrap());
            }

            let client = redis::Client::open(args.redis_url.as_str()).unwrap();
            Arc::new(
                RedisCounterStore::from_client(client, args.redis_connections)
                    .await
                    .unwrap(),
            )
        }
        #[cfg(not(feature = "redis-tokio"))]
        Store::Redis => {
            let _ = config;
            panic!("built without the redis-tokio feature")
        }
    }
}

fn build_routes(args: &Args) -> Vec<RouteLimit> {
    (0..args.routes.max(1))
        .map(|i| {
            RouteLimit::new(
                "GET",
                format!("/route/{i}"),
                args.route_limit,
                Duration::from_secs(args.route_window_s),
            )
            .unwrap()
        })
        .collect()
}

fn build_clients(args: &Args) -> Vec<String> {
    let n = match args.client_dist {
        ClientDist::Hot => 1,
        ClientDist::Uniform => args.clients.max(1),
    };
    (0..n)
        .map(|i| format!("10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff))
        .collect()
}

fn print_results(args: &Args, elapsed: Duration, hist: &Histogram<u64>, counts: &Counts) {
    let allowed = counts.allowed.load(Ordering::Relaxed);
    let rejected_global = counts.rejected_global.load(Ordering::Relaxed);
    let rejected_route = counts.rejected_route.load(Ordering::Relaxed);
    let errors = counts.errors.load(Ordering::Relaxed);
    let ops = allowed + rejected_global + rejected_route + errors;

    println!(
        "store={:?} window_mode={:?} client_dist={:?}",
        args.store, args.window_mode, args.client_dist
    );
    println!(
        "tasks={} duration_s={} clients={} routes={}",
        args.tasks, args.duration_s, args.clients, args.routes
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops as f64 / elapsed.as_secs_f64()
    );
    println!(
        "allowed={allowed} rejected_global={rejected_global} rejected_route={rejected_route} errors={errors}"
    );
    if !hist.is_empty() {
        println!(
            "lat_us p50={} p95={} p99={} p999={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no latency samples collected");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = args
        .config
        .as_ref()
        .map(|path| DispatcherConfig::from_file(path).unwrap());

    let store = build_store(&args, config.as_ref()).await;
    let dispatcher = Arc::new(
        Dispatcher::with_options(build_options(&args, config.as_ref()), store)
            .await
            .unwrap(),
    );
    info!(
        store = ?args.store,
        window_mode = ?dispatcher.window_mode(),
        global_limit = *dispatcher.global_limit(),
        "Dispatcher ready"
    );

    let routes = Arc::new(build_routes(&args));
    let clients = Arc::new(build_clients(&args));
    let counts = Arc::new(Counts::default());

    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration_s);

    let mut join = Vec::with_capacity(args.tasks);
    for t in 0..args.tasks {
        let dispatcher = Arc::clone(&dispatcher);
        let routes = Arc::clone(&routes);
        let clients = Arc::clone(&clients);
        let counts = Arc::clone(&counts);
        let sample_every = args.sample_every.max(1);

        join.push(tokio::spawn(async move {
            let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
            let mut i = 0_u64;
            let mut seed = (t as u64 + 1) * 0xD134_2543_DE82_EF95;

            while Instant::now() < deadline {
                // xorshift
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;

                let client = &clients[(seed as usize) % clients.len()];
                let route = &routes[((seed >> 32) as usize) % routes.len()];

                let sampled = i % sample_every == 0;
                let op_started = Instant::now();
                let result = dispatcher.check_now(client, route).await;
                if sampled {
                    let _ = hist.record(op_started.elapsed().as_micros() as u64);
                }

                match result {
                    Ok(decision) => match decision.rejection() {
                        None => counts.allowed.fetch_add(1, Ordering::Relaxed),
                        Some(r) if r.kind == RejectionKind::GlobalLimitExceeded => {
                            counts.rejected_global.fetch_add(1, Ordering::Relaxed)
                        }
                        Some(_) => counts.rejected_route.fetch_add(1, Ordering::Relaxed),
                    },
                    Err(_) => counts.errors.fetch_add(1, Ordering::Relaxed),
                };

                i += 1;
            }

            hist
        }));
    }

    let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for handle in join {
        let task_hist = handle.await.unwrap();
        hist.add(task_hist).unwrap();
    }

    print_results(&args, started.elapsed(), &hist, &counts);
}
