use chrono::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use stream_cache::{
    Cache, CacheOptions, CacheRegistry, DistributedLock, FetchTracker, LockOptions,
    SingleFlightOptions,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // One registry per process; every component borrows it.
    let registry = Arc::new(CacheRegistry::new(CacheOptions::default()).await?);

    println!("=== Typed cache ===");
    let cache: Cache<Vec<String>> = registry.cache("search-results");
    cache
        .set(
            "query:show",
            &vec!["result-a".to_string(), "result-b".to_string()],
            Duration::minutes(10),
        )
        .await;
    println!("cached: {:?}", cache.get("query:show").await);
    println!("stats: {:?}", cache.stats().await);

    println!("\n=== Compute-once lock ===");
    let lock = Arc::new(DistributedLock::new(
        registry.instance("locks"),
        LockOptions::default(),
    ));
    let executions = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for _ in 0..5 {
        let lock = lock.clone();
        let executions = executions.clone();
        handles.push(tokio::spawn(async move {
            lock.with_lock("expensive-job", || async move {
                executions.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                "expensive answer".to_string()
            })
            .await
        }));
    }
    for handle in handles {
        println!("caller got: {:?}", handle.await??);
    }
    println!("closure ran {} time(s)", executions.load(Ordering::SeqCst));

    println!("\n=== Single-flight tracker ===");
    let tracker = Arc::new(FetchTracker::new(SingleFlightOptions::default()));
    let fetches = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for _ in 0..5 {
        let tracker = tracker.clone();
        let fetches = fetches.clone();
        handles.push(tokio::spawn(async move {
            tracker
                .fetch("torrent:abc", || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    Ok::<_, String>("torrent payload".to_string())
                })
                .await
        }));
    }
    for handle in handles {
        println!("caller got: {:?}", handle.await??);
    }
    println!("fetch ran {} time(s)", fetches.load(Ordering::SeqCst));
    println!("tracker stats: {:?}", tracker.stats());

    Ok(())
}
