//! Crawl coordinator and worker pool.
//!
//! The coordinator seeds the frontier, spawns the workers (each with its own
//! catalog connection), watches progress, and drives the drain-based
//! termination protocol. Workers take one URL at a time through fetch,
//! extraction, tokenization, and persistence; any per-URL failure is logged
//! and the URL marked processed so the run keeps moving.

use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::frontier::{Frontier, FrontierItem};
use crate::store::{Store, StoreError};
use crate::{html, tokenizer};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Pause between fetches on one worker; trivial politeness.
const INTER_FETCH_DELAY: Duration = Duration::from_millis(100);
/// Cadence of the coordinator's progress check.
const MONITOR_INTERVAL: Duration = Duration::from_secs(5);
/// Grace period before trusting an empty queue, covering workers that have
/// dequeued but not yet enqueued children.
const DRAIN_GRACE: Duration = Duration::from_secs(2);
/// URLs longer than this are never crawled.
const MAX_URL_LEN: usize = 500;

/// Path extensions that never contain indexable HTML.
const SKIP_EXTENSIONS: &[&str] = &[
    "css", "js", "jpg", "jpeg", "png", "gif", "pdf", "zip", "rar", "exe", "dmg", "mp3", "mp4",
    "avi",
];

type DynError = Box<dyn Error + Send + Sync>;

/// Shared observational counters; may lag store truth while writes are in
/// flight.
#[derive(Default)]
pub struct CrawlCounters {
    pages_crawled: AtomicU64,
    pages_indexed: AtomicU64,
    words_indexed: AtomicU64,
}

/// Final figures of a finished crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    /// Pages fetched with an HTML payload.
    pub pages_crawled: u64,
    /// Pages whose postings were written.
    pub pages_indexed: u64,
    /// Total word occurrences written across all pages.
    pub words_indexed: u64,
    /// URLs marked processed, successfully or not.
    pub urls_processed: u64,
}

/// Decides whether a URL is worth fetching at all: http/https only, bounded
/// length, and a path extension that is not on the asset skip list.
pub fn should_crawl(url: &str) -> bool {
    if url.len() > MAX_URL_LEN {
        return false;
    }
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    match path_extension(parsed.path()) {
        Some(ext) => !SKIP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => true,
    }
}

fn path_extension(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

/// Runs a full crawl to completion and reports the final statistics.
///
/// Startup failures (missing seed URL, unreachable catalog) propagate;
/// everything after the workers start is handled in-run. SIGINT/SIGTERM
/// stop the frontier, after which the workers drain and join.
pub async fn run(config: &Config) -> Result<CrawlStats, DynError> {
    let seed = config.start_url()?.to_string();
    let max_depth = config.crawl_depth();
    let worker_count = config.crawl_threads();

    let frontier = Arc::new(Frontier::new());
    let fetcher = Arc::new(Fetcher::new(config)?);
    let counters = Arc::new(CrawlCounters::default());

    frontier.enqueue(&seed, 0);
    tracing::info!(seed = %seed, max_depth, worker_count, "starting crawl");

    let mut workers = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let store = Store::connect(config).await?;
        let frontier = Arc::clone(&frontier);
        let fetcher = Arc::clone(&fetcher);
        let counters = Arc::clone(&counters);
        workers.push(tokio::spawn(async move {
            worker_loop(worker_id, frontier, fetcher, store, counters, max_depth).await;
        }));
    }

    let signal_watcher = {
        let frontier = Arc::clone(&frontier);
        tokio::spawn(async move {
            if shutdown_signal().await {
                tracing::info!("shutdown signal received, stopping frontier");
                frontier.stop();
            }
        })
    };

    monitor(&frontier, &counters).await;
    frontier.stop();

    for worker in workers {
        let _ = worker.await;
    }
    signal_watcher.abort();

    let stats = CrawlStats {
        pages_crawled: counters.pages_crawled.load(Ordering::Relaxed),
        pages_indexed: counters.pages_indexed.load(Ordering::Relaxed),
        words_indexed: counters.words_indexed.load(Ordering::Relaxed),
        urls_processed: frontier.processed_count() as u64,
    };
    tracing::info!(
        pages_crawled = stats.pages_crawled,
        pages_indexed = stats.pages_indexed,
        words_indexed = stats.words_indexed,
        urls_processed = stats.urls_processed,
        "crawl finished"
    );
    Ok(stats)
}

/// Waits for SIGINT or SIGTERM; returns false only if no handler could be
/// installed.
async fn shutdown_signal() -> bool {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => return tokio::signal::ctrl_c().await.is_ok(),
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.is_ok(),
            _ = term.recv() => true,
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.is_ok()
    }
}

/// Polls the frontier until it drains (or a stop is requested), logging
/// progress each round.
async fn monitor(frontier: &Frontier, counters: &CrawlCounters) {
    loop {
        tokio::time::sleep(MONITOR_INTERVAL).await;
        if frontier.is_stopped() {
            return;
        }

        let pending = frontier.pending_count();
        tracing::info!(
            pages_crawled = counters.pages_crawled.load(Ordering::Relaxed),
            pages_indexed = counters.pages_indexed.load(Ordering::Relaxed),
            words_indexed = counters.words_indexed.load(Ordering::Relaxed),
            urls_pending = pending,
            urls_processed = frontier.processed_count(),
            "crawl progress"
        );

        if pending == 0 {
            tokio::time::sleep(DRAIN_GRACE).await;
            if frontier.is_empty() {
                tracing::info!("frontier drained, stopping crawl");
                return;
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    frontier: Arc<Frontier>,
    fetcher: Arc<Fetcher>,
    mut store: Store,
    counters: Arc<CrawlCounters>,
    max_depth: u32,
) {
    // Re-check the stop flag per iteration: on an external stop the backlog
    // is abandoned instead of drained, so workers return promptly.
    while !frontier.is_stopped() {
        let Some(item) = frontier.dequeue().await else {
            break;
        };
        if frontier.is_processed(&item.url) {
            continue;
        }

        if let Err(err) = process_item(
            &item,
            &frontier,
            &fetcher,
            &mut store,
            &counters,
            max_depth,
        )
        .await
        {
            tracing::warn!(worker_id, url = %item.url, error = %err, "page dropped");
        }
        frontier.mark_processed(&item.url);
        tokio::time::sleep(INTER_FETCH_DELAY).await;
    }
    tracing::debug!(worker_id, "worker stopped");
}

/// Handles one dequeued URL end to end. Returning `Err` only signals that
/// the page was dropped; the caller still marks it processed.
async fn process_item(
    item: &FrontierItem,
    frontier: &Frontier,
    fetcher: &Fetcher,
    store: &mut Store,
    counters: &CrawlCounters,
    max_depth: u32,
) -> Result<(), StoreError> {
    if item.depth > max_depth || !should_crawl(&item.url) {
        return Ok(());
    }

    tracing::debug!(url = %item.url, depth = item.depth, "fetching");
    let response = fetcher.get(&item.url).await;
    if !response.success {
        if let Some(message) = &response.error_message {
            tracing::warn!(url = %item.url, error = %message, "fetch failed");
        }
        return Ok(());
    }
    if !response.content_type.contains("text/html") {
        tracing::debug!(url = %item.url, content_type = %response.content_type, "skipping non-HTML content");
        return Ok(());
    }

    counters.pages_crawled.fetch_add(1, Ordering::Relaxed);

    let page = html::decode_body(&response.body);
    let title = html::extract_title(&page);
    let content = html::extract_text(&page);

    // Index errors are reported only after the page's links have been
    // queued, so one bad write does not prune the reachable graph.
    let indexed = index_page(store, counters, &item.url, &title, &content).await;

    if item.depth < max_depth {
        let mut queued = 0usize;
        for link in html::extract_links(&page, &item.url) {
            if should_crawl(&link) && frontier.enqueue(&link, item.depth + 1) {
                queued += 1;
            }
        }
        if queued > 0 {
            tracing::debug!(url = %item.url, queued, "queued outbound links");
        }
    }

    indexed
}

/// Persists one page: the document row, then a posting per distinct word.
///
/// A URL whose document row already exists is left alone entirely, so
/// posting frequencies are written exactly once per document.
async fn index_page(
    store: &mut Store,
    counters: &CrawlCounters,
    url: &str,
    title: &str,
    content: &str,
) -> Result<(), StoreError> {
    let (document_id, created) = store.insert_document(url, title, content).await?;
    if !created {
        tracing::debug!(url, document_id, "document already indexed");
        return Ok(());
    }

    let frequencies = tokenizer::index(content);
    let mut total_words = 0u64;
    for (word, frequency) in &frequencies {
        let word_id = store.get_or_create_word(word).await?;
        store.add_posting(document_id, word_id, *frequency).await?;
        total_words += *frequency as u64;
    }

    counters.pages_indexed.fetch_add(1, Ordering::Relaxed);
    counters.words_indexed.fetch_add(total_words, Ordering::Relaxed);
    tracing::info!(
        url,
        document_id,
        unique_words = frequencies.len(),
        total_words,
        "indexed page"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_http_and_https_pages() {
        assert!(should_crawl("http://example.com"));
        assert!(should_crawl("https://example.com/articles/rust"));
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(!should_crawl("ftp://example.com/file"));
        assert!(!should_crawl("mailto:someone@example.com"));
        assert!(!should_crawl("not a url"));
    }

    #[test]
    fn rejects_asset_extensions_on_the_path() {
        assert!(!should_crawl("http://example.com/style.css"));
        assert!(!should_crawl("http://example.com/images/photo.JPG"));
        assert!(!should_crawl("http://example.com/media/clip.mp4"));
    }

    #[test]
    fn extension_matching_looks_only_at_the_final_suffix() {
        // A page that merely mentions an asset extension is still HTML.
        assert!(should_crawl("http://example.com/page.css.html"));
        assert!(should_crawl("http://example.com/about.cssish"));
        // Query strings are not part of the path extension.
        assert!(should_crawl("http://example.com/view?file=demo.css"));
    }

    #[test]
    fn rejects_overlong_urls() {
        let url = format!("http://example.com/{}", "a".repeat(500));
        assert!(!should_crawl(&url));
    }

    #[test]
    fn path_extension_picks_the_last_segment_suffix() {
        assert_eq!(path_extension("/a/b/page.html"), Some("html"));
        assert_eq!(path_extension("/a/b.c/page"), None);
        assert_eq!(path_extension("/"), None);
        assert_eq!(path_extension("/archive.tar.gz"), Some("gz"));
    }
}
