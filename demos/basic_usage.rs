use std::time::Duration;
use suspense_store::{FetchStore, Lookup, StoreConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // Simulated backend: slow for every path, fails for "/broken"
    let store = FetchStore::builder(|path: String, cancel| async move {
        tokio::select! {
            _ = cancel.cancelled() => return Err(format!("fetch of {} cancelled", path)),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
        if path == "/broken" {
            return Err(format!("backend failed for {}", path));
        }
        Ok(format!("value of {}", path))
    })
    .config(StoreConfig::named("demo"))
    .build()?;

    // Warm an entry before anyone asks for it
    store.prefetch("/entry/data".to_string());

    match store.get("/entry/data".to_string()) {
        Lookup::Ready(value) => println!("Immediately ready: {}", value),
        Lookup::Pending(suspension) => {
            println!("Not ready yet, suspending");
            println!("Resumed with: {:?}", suspension.await);
        }
        Lookup::Failed(error) => println!("Failed: {}", error),
    }

    // Settled entries are served without another fetch
    println!("Second read: {:?}", store.get("/entry/data".to_string()));

    // Errors are replayed until the entry is evicted
    println!("Broken: {:?}", store.fetch("/broken".to_string()).await);
    println!("Broken again: {:?}", store.get("/broken".to_string()));
    store.evict(&"/broken".to_string());
    println!("After evict: {:?}", store.get("/broken".to_string()));

    // Abort is cooperative; this fetch honours the token
    let slow = store.get("/slow".to_string());
    store.abort(&"/slow".to_string());
    println!("Aborted: {:?}", slow.resolve().await);

    println!("Store stats: {:?}", store.stats());

    Ok(())
}
