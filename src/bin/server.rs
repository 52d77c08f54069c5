use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::{Form, Json, Router};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use webindex::{Config, SearchResult, Searcher, Store};

/// Results returned per query, mirroring the crawler-side product limit.
const RESULT_LIMIT: i64 = 10;

#[derive(Parser, Debug)]
#[command(
    name = "server",
    about = "Query server answering conjunctive searches over the crawl catalog"
)]
struct ServerCli {
    /// Path to the configuration file
    #[arg(default_value = "config/config.ini")]
    config: PathBuf,
}

#[derive(Clone)]
struct AppState {
    searcher: Arc<Searcher>,
}

#[derive(Debug, Deserialize)]
struct SearchForm {
    query: String,
}

#[derive(Debug, Deserialize)]
struct ApiSearchParams {
    q: String,
    #[serde(default = "default_limit")]
    k: i64,
}

fn default_limit() -> i64 {
    RESULT_LIMIT
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = ServerCli::parse();
    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &ServerCli) -> Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;

    let store = Store::connect(&config)
        .await
        .context("failed to connect to the catalog")?;
    let state = AppState {
        searcher: Arc::new(Searcher::new(store)),
    };

    let app = Router::new()
        .route("/", get(index_page).post(search_page))
        .route("/api/search", get(api_search))
        .route("/healthz", get(healthz))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "search server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown signal received");
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn index_page(State(state): State<AppState>) -> Html<String> {
    let stats = state.searcher.catalog_stats().await.ok();
    Html(render_search_form(stats))
}

async fn search_page(
    State(state): State<AppState>,
    Form(form): Form<SearchForm>,
) -> Html<String> {
    let query = form.query.trim();
    if query.is_empty() {
        return Html(render_error_page("Empty search query"));
    }
    match state.searcher.search(query, RESULT_LIMIT).await {
        Ok(results) => Html(render_results_page(query, &results)),
        Err(err) => {
            tracing::error!(error = %err, "search failed");
            Html(render_error_page("Search is temporarily unavailable"))
        }
    }
}

async fn api_search(
    State(state): State<AppState>,
    Query(params): Query<ApiSearchParams>,
) -> Result<Json<Vec<SearchResult>>, StatusCode> {
    let limit = params.k.clamp(1, 100);
    match state.searcher.search(&params.q, limit).await {
        Ok(results) => Ok(Json(results)),
        Err(err) => {
            tracing::error!(error = %err, "search failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Minimal HTML escaping for text interpolated into the result pages.
fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn page_shell(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"UTF-8\">\n\
         <title>{title}</title>\n\
         <style>\n\
         body {{ font-family: sans-serif; max-width: 800px; margin: 40px auto; padding: 0 20px; }}\n\
         form {{ margin: 20px 0; }}\n\
         input[type=text] {{ width: 400px; padding: 8px; }}\n\
         .result {{ margin-bottom: 16px; }}\n\
         .result .score {{ color: #666; font-size: 0.9em; }}\n\
         .hint {{ color: #666; font-size: 0.9em; }}\n\
         </style>\n\
         </head>\n\
         <body>\n{body}\n</body>\n\
         </html>\n"
    )
}

fn render_form_fragment(query: &str) -> String {
    format!(
        "<form method=\"post\" action=\"/\">\n\
         <input type=\"text\" name=\"query\" value=\"{}\" maxlength=\"100\" required>\n\
         <input type=\"submit\" value=\"Search\">\n\
         </form>\n\
         <p class=\"hint\">Enter up to 4 words; results must contain all of them.</p>",
        escape_html(query)
    )
}

fn render_search_form(stats: Option<(i64, i64)>) -> String {
    let stats_line = match stats {
        Some((documents, words)) => {
            format!("<p class=\"hint\">{documents} documents, {words} words indexed.</p>")
        }
        None => String::new(),
    };
    let body = format!(
        "<h1>Search</h1>\n{}{stats_line}",
        render_form_fragment("")
    );
    page_shell("Search", &body)
}

fn render_results_page(query: &str, results: &[SearchResult]) -> String {
    let mut body = format!(
        "<h1>Search</h1>\n{}\n<p>{} result(s) for <strong>{}</strong></p>\n",
        render_form_fragment(query),
        results.len(),
        escape_html(query)
    );
    for result in results {
        let url = escape_html(&result.url);
        let title = if result.title.is_empty() {
            url.clone()
        } else {
            escape_html(&result.title)
        };
        body.push_str(&format!(
            "<div class=\"result\">\n\
             <a href=\"{url}\">{title}</a><br>\n\
             <span class=\"score\">{url} &middot; score {}</span>\n\
             </div>\n",
            result.score
        ));
    }
    page_shell(&format!("Search Results - {}", escape_html(query)), &body)
}

fn render_error_page(message: &str) -> String {
    let body = format!(
        "<h1>Search</h1>\n{}\n<p><strong>{}</strong></p>",
        render_form_fragment(""),
        escape_html(message)
    );
    page_shell("Search", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_neutralizes_markup() {
        assert_eq!(
            escape_html("<b>\"q\" & 'r'</b>"),
            "&lt;b&gt;&quot;q&quot; &amp; &#39;r&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn results_page_lists_every_hit_in_order() {
        let results = vec![
            SearchResult {
                document_id: 1,
                url: "http://a.test/one".into(),
                title: "First".into(),
                score: 4,
            },
            SearchResult {
                document_id: 2,
                url: "http://b.test/two".into(),
                title: String::new(),
                score: 3,
            },
        ];
        let page = render_results_page("cat dog", &results);
        assert!(page.contains("2 result(s)"));
        assert!(page.contains("First"));
        assert!(page.contains("score 4"));
        // An untitled document falls back to its URL.
        assert!(page.contains("http://b.test/two</a>"));
        let first = page.find("http://a.test/one").expect("first hit");
        let second = page.find("http://b.test/two").expect("second hit");
        assert!(first < second);
    }

    #[test]
    fn queries_are_escaped_into_the_form_value() {
        let page = render_results_page("<script>", &[]);
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn error_page_carries_the_message() {
        let page = render_error_page("Empty search query");
        assert!(page.contains("Empty search query"));
    }
}
