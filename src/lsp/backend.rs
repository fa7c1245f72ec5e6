use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::config::Config;
use crate::diagnostics::to_diagnostics_with_source;
use crate::lsp::document::{DocumentState, base_dir_for, is_skipped};
use crate::validator::{ValidatorOptions, validate_document};

/// The LSP backend: open documents plus the client to publish to
pub struct Backend {
    pub client: Client,
    pub documents: Arc<Mutex<HashMap<Url, DocumentState>>>,
    pub config: Config,
}

impl Backend {
    pub fn new(client: Client, config: Config) -> Self {
        Self {
            client,
            documents: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Validate the stored text of `uri` off the async runtime and publish
    /// the result, unless a newer version arrived meanwhile.
    async fn validate_and_publish(&self, uri: Url, version: i32) {
        if is_skipped(&uri, &self.config.validation) {
            log::debug!("Skipping {}", uri);
            return;
        }

        let docs = self.documents.lock().await;
        let content = match docs.get(&uri) {
            Some(state) => state.content.clone(),
            None => return,
        };
        drop(docs);

        let options = ValidatorOptions::default()
            .with_base_dir(base_dir_for(&uri, &self.config.validation))
            .with_warnings(self.config.validation.report_warnings);
        let source = self.config.server.diagnostic_source.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let report = validate_document(&content, &options);
            to_diagnostics_with_source(&report, &content, &source)
        })
        .await;
        let diagnostics = match joined {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                log::error!("Validation of {} failed: {}", uri, e);
                self.client
                    .log_message(MessageType::ERROR, format!("Validation of {} failed: {}", uri, e))
                    .await;
                return;
            }
        };

        let docs = self.documents.lock().await;
        let current = docs.get(&uri).map(|state| state.version);
        drop(docs);
        if current != Some(version) {
            log::debug!(
                "Dropping diagnostics for {} version {} (current {:?})",
                uri,
                version,
                current
            );
            return;
        }

        log::debug!("Publishing {} diagnostics for {}", diagnostics.len(), uri);
        self.client
            .publish_diagnostics(uri, diagnostics, Some(version))
            .await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(
        &self,
        _: InitializeParams,
    ) -> tower_lsp::jsonrpc::Result<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "xsd-ls".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("xsd-ls initialized");
        self.client
            .log_message(MessageType::INFO, "xsd-ls initialized")
            .await;
    }

    async fn shutdown(&self) -> tower_lsp::jsonrpc::Result<()> {
        log::info!("xsd-ls shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        let mut docs = self.documents.lock().await;
        docs.insert(
            uri.clone(),
            DocumentState::new(params.text_document.text, version),
        );
        drop(docs); // Release the lock before validating

        self.validate_and_publish(uri, version).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        // Full sync: the last change carries the whole text
        if let Some(change) = params.content_changes.into_iter().last() {
            let mut docs = self.documents.lock().await;
            docs.insert(uri.clone(), DocumentState::new(change.text, version));
            drop(docs);

            self.validate_and_publish(uri, version).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.lock().await.remove(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }
}
