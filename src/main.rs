//! # SLiM Language Server (slimlsp)
//!
//! A Language Server Protocol implementation for SLiM simulation scripts and
//! plain Eidos files. Analysis is approximate and parser-free; see the
//! `slimlsp` library for the tracking engine and the diagnostic rules.
//!
//! ## Key Features
//! - Diagnostics from ten independent rules, debounced per edit
//! - Hover with signatures and inferred classes
//! - Completion of members, functions, tracked definitions and callbacks
//! - A `--diagnose` batch mode for running the rules from the command line
//!
//! ## Architecture
//! The server uses the Tower LSP framework. Open documents live in a
//! concurrent map; analysis results are memoized per document version in a
//! shared LRU cache, so hover, completion and diagnostics for the same
//! version share one tracking pass.

use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use slimlsp::rules::Pipeline;
use slimlsp::{Analyzer, DocumentCache, Documentation, DocumentationProvider};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tower_lsp::{async_trait, jsonrpc::Result, lsp_types::*, Client};
use tower_lsp::{LanguageServer, LspService, Server};
use tracing::{error, info, trace, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod cursor;
mod document;
mod lsp_completion;
mod lsp_diagnostics;
mod lsp_hover;
mod performance;

use document::{ConfigChanges, Configuration, DocumentData};

const DEFAULT_PORT: u16 = 9257;

const COMMAND_SET_DIAGNOSTICS: &str = "setDiagnostics";
const COMMAND_ENABLE_BENCHMARKING: &str = "slim.server.enableBenchmarking";
const COMMAND_BENCHMARK_REPORT: &str = "slim.server.getBenchmarkReport";
const COMMAND_CACHE_STATS: &str = "slim.server.cacheStats";

#[derive(Clone)]
pub(crate) struct Backend {
    pub(crate) client: Client,
    pub(crate) documents: Arc<DashMap<Url, DocumentData>>,
    pub(crate) config: Arc<RwLock<Configuration>>,
    docs: Arc<parking_lot::RwLock<Arc<dyn DocumentationProvider>>>,
    analyzer: Arc<parking_lot::RwLock<Arc<Analyzer>>>,
    pub(crate) cache: Arc<DocumentCache<Url>>,
    pub(crate) perf_tracker: Arc<performance::PerformanceTracker>,
}

fn load_docs(path: Option<&Path>) -> slimlsp::Result<Documentation> {
    match path {
        Some(dir) => Documentation::load_dir(dir),
        None => Documentation::builtin(),
    }
}

fn build_analyzer(docs: Arc<dyn DocumentationProvider>, config: &Configuration) -> Analyzer {
    Analyzer::new(docs)
        .with_pipeline(Pipeline::standard().with_disabled(config.disabled_rules.iter().cloned()))
        .with_constant_lookahead(config.constant_lookahead_lines)
}

#[async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(options) = params.initialization_options {
            let changes = self.config.write().await.update(&options);
            self.apply_config_changes(changes).await;
        }

        let summary = {
            let docs = self.docs.read();
            format!(
                "SLiM LSP init: functions={} classes={} callbacks={} rules={}",
                docs.functions(None).len(),
                docs.classes(None).len(),
                docs.callbacks(None).len(),
                Pipeline::standard().rule_names().len(),
            )
        };
        info!("{summary}");
        self.client.log_message(MessageType::INFO, summary).await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: [
                        COMMAND_SET_DIAGNOSTICS,
                        COMMAND_ENABLE_BENCHMARKING,
                        COMMAND_BENCHMARK_REPORT,
                        COMMAND_CACHE_STATS,
                    ]
                    .map(str::to_string)
                    .to_vec(),
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![".".to_string()]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "slimlsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        let config = self.config.read().await.clone();
        info!(?config, "client initialized");
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        match params.command.as_str() {
            COMMAND_SET_DIAGNOSTICS => {
                if let Some(enabled) = params.arguments.first().and_then(Value::as_bool) {
                    self.config.write().await.enabled = enabled;
                    info!(enabled, "diagnostics toggled");
                    // run_diagnostics clears them when disabled
                    for uri in self.open_documents() {
                        self.run_diagnostics(&uri).await;
                    }
                }
            }
            COMMAND_ENABLE_BENCHMARKING => {
                if let Some(enabled) = params.arguments.first().and_then(Value::as_bool) {
                    self.perf_tracker.set_enabled(enabled);
                    let message = if enabled {
                        "SLiM LSP benchmarking enabled. Collecting performance data..."
                    } else {
                        "SLiM LSP benchmarking disabled."
                    };
                    self.client.show_message(MessageType::INFO, message).await;
                }
            }
            COMMAND_BENCHMARK_REPORT => {
                let report = self.perf_tracker.generate_report(self.cache.stats());
                self.client.log_message(MessageType::INFO, report.clone()).await;
                return Ok(Some(Value::String(report)));
            }
            COMMAND_CACHE_STATS => {
                let stats = self.cache.stats();
                return Ok(Some(json!({
                    "hits": stats.hits,
                    "misses": stats.misses,
                    "evictions": stats.evictions,
                    "entries": stats.entries,
                    "capacity": stats.capacity,
                    "hitRate": stats.hit_rate(),
                })));
            }
            other => warn!(command = other, "unknown command"),
        }
        Ok(None)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let item = params.text_document;
        self.documents.insert(
            item.uri.clone(),
            DocumentData::new(&item.uri, item.text, item.version),
        );
        self.run_diagnostics(&item.uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        // full sync: the last change holds the whole text
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        self.documents
            .insert(uri.clone(), DocumentData::new(&uri, change.text, version));

        let delay = Duration::from_millis(self.config.read().await.debounce_ms);
        let backend = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = backend.documents.get(&uri).map(|d| d.version);
            if current != Some(version) {
                backend
                    .perf_tracker
                    .increment("lsp.server.diagnostics.superseded", 1);
                trace!(%uri, version, ?current, "skipping superseded diagnostics run");
                return;
            }
            backend.run_diagnostics(&uri).await;
        });
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.remove(&uri);
        self.cache.delete(&uri);
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let changes = self.config.write().await.update(&params.settings);
        info!(?changes, "configuration received");
        self.client
            .log_message(MessageType::INFO, format!("SLiM LSP configuration updated: {changes:?}"))
            .await;
        self.apply_config_changes(changes).await;

        for uri in self.open_documents() {
            self.run_diagnostics(&uri).await;
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        lsp_completion::handle_completion(self, params).await
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        lsp_hover::handle_hover(self, params).await
    }
}

impl Backend {
    fn new(client: Client, docs: Documentation, config: Configuration) -> Self {
        let docs: Arc<dyn DocumentationProvider> = Arc::new(docs);
        let analyzer = build_analyzer(docs.clone(), &config);
        Backend {
            client,
            documents: Arc::new(DashMap::new()),
            cache: Arc::new(DocumentCache::new(config.cache_capacity)),
            config: Arc::new(RwLock::new(config)),
            docs: Arc::new(parking_lot::RwLock::new(docs)),
            analyzer: Arc::new(parking_lot::RwLock::new(Arc::new(analyzer))),
            perf_tracker: Arc::new(performance::PerformanceTracker::new()),
        }
    }

    /// The analyzer for the current configuration.
    pub(crate) fn analyzer(&self) -> Arc<Analyzer> {
        self.analyzer.read().clone()
    }

    fn open_documents(&self) -> Vec<Url> {
        self.documents.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn apply_config_changes(&self, changes: ConfigChanges) {
        if !changes.any() {
            return;
        }
        let config = self.config.read().await.clone();
        if changes.cache_capacity {
            self.cache.set_capacity(config.cache_capacity);
        }

        if changes.docs {
            match load_docs(config.docs_path.as_deref()) {
                Ok(docs) => {
                    *self.docs.write() = Arc::new(docs);
                }
                Err(err) => {
                    warn!(%err, "keeping the current documentation");
                    self.client
                        .show_message(
                            MessageType::WARNING,
                            format!("SLiM LSP: {err}; keeping the current documentation"),
                        )
                        .await;
                }
            }
        }

        if changes.docs || changes.analysis {
            let docs = self.docs.read().clone();
            let analyzer = Arc::new(build_analyzer(docs, &config));
            *self.analyzer.write() = analyzer;
            // cached results were computed under the old settings
            self.cache.clear();
        }
    }

    async fn run_diagnostics(&self, uri: &Url) {
        lsp_diagnostics::run_diagnostics(self, uri).await
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("SLIMLSP_LOG").unwrap_or_else(|_| EnvFilter::new("slimlsp=info"));
    // stdout carries the protocol stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn invalid_input(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.into())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    use clap::Parser as _;
    init_logging();
    let cli = cli::Cli::parse();

    let docs = load_docs(cli.docs.as_deref()).map_err(|err| {
        error!(%err, "could not load documentation");
        invalid_input(err.to_string())
    })?;

    // Diagnostic runner mode: analyse each file, print the results to stdout
    // and exit.
    if !cli.diagnose.is_empty() {
        let analyzer = Analyzer::new(Arc::new(docs));
        for path in &cli.diagnose {
            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) => {
                    warn!(path = %path.display(), %err, "could not read file");
                    continue;
                }
            };
            let diagnostics = lsp_diagnostics::diagnose_text(&analyzer, path, &text, cli.mode);
            println!("{}", lsp_diagnostics::render_report(path, &diagnostics));
        }
        return Ok(());
    }

    let config = Configuration {
        docs_path: cli.docs.clone(),
        ..Configuration::default()
    };
    let (service, socket) = LspService::new(|client| Backend::new(client, docs, config));

    if !cli.listen && cli.host.is_none() {
        Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
            .serve(service)
            .await;
    } else if cli.listen {
        let host = cli
            .host
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse::<Ipv4Addr>()
            .map_err(|err| invalid_input(format!("could not parse IP address: {err}")))?;
        let port = cli.port.unwrap_or(DEFAULT_PORT);

        let listener = TcpListener::bind((host, port)).await?;
        info!(%host, port, "waiting for a client");
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "client connected");

        let (input, output) = tokio::io::split(stream);
        Server::new(input, output, socket).serve(service).await;
    } else {
        let host = cli.host.ok_or_else(|| invalid_input("no host given"))?;
        let port = cli.port.ok_or_else(|| invalid_input("--port is required with --host"))?;

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        let (input, output) = tokio::io::split(stream);
        Server::new(input, output, socket).serve(service).await;
    }
    Ok(())
}
