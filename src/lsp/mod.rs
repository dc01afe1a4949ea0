//! The ABL language server: completion, document symbols and syntax-check
//! diagnostics over the LSP wire.
//!
//! Every request reparses the document with the tolerant scanner; there is
//! no persistent symbol table. All provider operations follow the
//! swallow-all contract: they degrade to an empty response, never a
//! protocol error.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use crate::cancel::CancelFlag;
use crate::check::{
    rebuild_diagnostics, ActiveDocument, CheckMessage, DiagnosticCollection, SyntaxCheck,
};
use crate::config::OpenEdgeConfig;
use crate::parser::{parse_document, ParseItem, ParseItemKind};

#[derive(Debug, Clone)]
struct DocumentData {
    content: String,
    #[allow(dead_code)]
    version: i32,
}

/// The two severity channels plus the set of files touched by the previous
/// publish cycle, so stale diagnostics can be withdrawn on the next one.
struct DiagnosticState {
    errors: DiagnosticCollection,
    warnings: DiagnosticCollection,
    published: HashSet<String>,
}

pub struct AblLanguageServer {
    client: Client,
    documents: Arc<RwLock<HashMap<String, DocumentData>>>,
    diagnostics: Arc<RwLock<DiagnosticState>>,
    config: Arc<RwLock<OpenEdgeConfig>>,
    checker: Option<Arc<dyn SyntaxCheck>>,
}

impl AblLanguageServer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            documents: Arc::new(RwLock::new(HashMap::new())),
            diagnostics: Arc::new(RwLock::new(DiagnosticState {
                errors: DiagnosticCollection::new("abl-error"),
                warnings: DiagnosticCollection::new("abl-warning"),
                published: HashSet::new(),
            })),
            config: Arc::new(RwLock::new(OpenEdgeConfig::default())),
            checker: None,
        }
    }

    /// Attach the external syntax-check collaborator. Without one, saves
    /// simply do not produce diagnostics.
    pub fn with_checker(mut self, checker: Arc<dyn SyntaxCheck>) -> Self {
        self.checker = Some(checker);
        self
    }

    async fn run_syntax_check(&self, uri: &Uri) {
        let Some(checker) = self.checker.clone() else {
            return;
        };
        let Ok(path) = uri.to_file_path() else {
            return;
        };

        let config = self.config.read().await.clone();
        match checker.check(&path, &config).await {
            Ok(messages) => {
                let content = {
                    let docs = self.documents.read().await;
                    docs.get(uri.as_str()).map(|d| d.content.clone())
                };
                let active = content.as_deref().map(|text| ActiveDocument {
                    uri: uri.to_string(),
                    text,
                });
                self.publish_check_results(&messages, active.as_ref()).await;
            }
            Err(e) => {
                self.client
                    .show_message(MessageType::ERROR, format!("Syntax check failed: {}", e))
                    .await;
            }
        }
    }

    /// Rebuild both severity channels from a checker run and push the
    /// result to the editor. Files published in the previous cycle but
    /// absent from this one get an explicit empty publish, so the clear
    /// covers the whole workspace, not just the files the run touched.
    async fn publish_check_results(
        &self,
        messages: &[CheckMessage],
        active: Option<&ActiveDocument<'_>>,
    ) {
        let unlocated;
        let per_file;
        let withdrawn;

        {
            let mut state = self.diagnostics.write().await;
            let state = &mut *state;
            unlocated = rebuild_diagnostics(
                messages,
                active,
                &mut state.errors,
                &mut state.warnings,
            );
            per_file = merge_channels(&state.errors, &state.warnings);

            let previous = std::mem::take(&mut state.published);
            withdrawn = withdrawn_files(previous, &per_file);
            state.published = per_file.keys().cloned().collect();
        }

        for uri in withdrawn {
            if let Ok(parsed) = Uri::from_str(&uri) {
                self.client.publish_diagnostics(parsed, Vec::new(), None).await;
            }
        }
        for (uri, diags) in per_file {
            if let Ok(parsed) = Uri::from_str(&uri) {
                self.client.publish_diagnostics(parsed, diags, None).await;
            }
        }
        for message in unlocated {
            self.client.show_message(MessageType::ERROR, message).await;
        }
    }
}

/// Merge the two severity channels into one per-file publish list, errors
/// before warnings, insertion order preserved within each channel.
fn merge_channels(
    errors: &DiagnosticCollection,
    warnings: &DiagnosticCollection,
) -> HashMap<String, Vec<Diagnostic>> {
    let mut per_file: HashMap<String, Vec<Diagnostic>> = HashMap::new();
    for (uri, diags) in errors.iter().chain(warnings.iter()) {
        per_file
            .entry(uri.clone())
            .or_default()
            .extend(diags.iter().cloned());
    }
    per_file
}

/// Files the previous cycle published that have nothing in this one. Each
/// gets an explicit empty publish, so a run clears the whole workspace and
/// stale diagnostics from untouched files disappear.
fn withdrawn_files(
    previous: HashSet<String>,
    current: &HashMap<String, Vec<Diagnostic>>,
) -> Vec<String> {
    previous
        .into_iter()
        .filter(|uri| !current.contains_key(uri))
        .collect()
}

/// Workspace root announced by the client: the first workspace folder,
/// falling back to the older root URI field.
fn workspace_root(
    folders: Option<&[WorkspaceFolder]>,
    root_uri: Option<&Uri>,
) -> Option<PathBuf> {
    folders
        .and_then(|folders| folders.first())
        .and_then(|folder| folder.uri.to_file_path().ok())
        .or_else(|| root_uri.and_then(|uri| uri.to_file_path().ok()))
}

/// True iff the single character immediately before the cursor is the
/// member-access dot. Purely lexical; a cursor at column 0 can never be a
/// member access.
pub fn is_member_access(line: &str, character: usize) -> bool {
    character > 0 && line.chars().nth(character - 1) == Some('.')
}

/// Kinds that remain visible after a member-access dot.
const MEMBER_ACCESS_KINDS: [ParseItemKind; 6] = [
    ParseItemKind::Constructor,
    ParseItemKind::Interface,
    ParseItemKind::Method,
    ParseItemKind::Namespace,
    ParseItemKind::Object,
    ParseItemKind::Property,
];

/// Fixed symbol-kind → completion-kind table. Anything without an entry
/// falls back to `Text`, so a candidate can always be classified.
pub fn completion_kind(kind: ParseItemKind) -> CompletionItemKind {
    match kind {
        ParseItemKind::Class => CompletionItemKind::CLASS,
        ParseItemKind::Constructor => CompletionItemKind::CONSTRUCTOR,
        ParseItemKind::Method => CompletionItemKind::METHOD,
        ParseItemKind::Enum => CompletionItemKind::ENUM,
        ParseItemKind::EnumMember => CompletionItemKind::ENUM_MEMBER,
        ParseItemKind::Function => CompletionItemKind::FUNCTION,
        ParseItemKind::Interface => CompletionItemKind::INTERFACE,
        ParseItemKind::Object => CompletionItemKind::VARIABLE,
        ParseItemKind::Event => CompletionItemKind::EVENT,
        ParseItemKind::TypeParameter => CompletionItemKind::TYPE_PARAMETER,
        ParseItemKind::Property => CompletionItemKind::PROPERTY,
        ParseItemKind::File => CompletionItemKind::FILE,
        ParseItemKind::Variable => CompletionItemKind::VARIABLE,
        _ => CompletionItemKind::TEXT,
    }
}

fn symbol_kind(kind: ParseItemKind) -> SymbolKind {
    match kind {
        ParseItemKind::Class => SymbolKind::CLASS,
        ParseItemKind::Constructor => SymbolKind::CONSTRUCTOR,
        ParseItemKind::Method => SymbolKind::METHOD,
        ParseItemKind::Enum => SymbolKind::ENUM,
        ParseItemKind::EnumMember => SymbolKind::ENUM_MEMBER,
        ParseItemKind::Function => SymbolKind::FUNCTION,
        ParseItemKind::Interface => SymbolKind::INTERFACE,
        ParseItemKind::Namespace => SymbolKind::NAMESPACE,
        ParseItemKind::Object => SymbolKind::OBJECT,
        ParseItemKind::Property => SymbolKind::PROPERTY,
        ParseItemKind::Variable => SymbolKind::VARIABLE,
        ParseItemKind::File => SymbolKind::FILE,
        ParseItemKind::Event => SymbolKind::EVENT,
        ParseItemKind::TypeParameter => SymbolKind::TYPE_PARAMETER,
    }
}

fn retained(item: &ParseItem, member_access: bool) -> bool {
    !member_access || MEMBER_ACCESS_KINDS.contains(&item.kind)
}

/// Completion candidates for a cursor position: classify the context from
/// the current line, reparse, filter, map. Source order, no deduplication,
/// no ranking; prefix filtering is the editor's job.
pub fn completion_candidates(
    text: &str,
    position: Position,
    cancel: &CancelFlag,
) -> Vec<CompletionItem> {
    let member_access = text
        .lines()
        .nth(position.line as usize)
        .map(|line| is_member_access(line, position.character as usize))
        .unwrap_or(false);

    parse_document(text, cancel)
        .into_iter()
        .filter(|item| retained(item, member_access))
        .map(|item| CompletionItem {
            label: item.name,
            kind: Some(completion_kind(item.kind)),
            ..Default::default()
        })
        .collect()
}

/// Flat outline of a document: one `SymbolInformation` per recovered
/// symbol, spanning the whole declaration line plus its terminator.
pub fn document_symbols(uri: &Uri, text: &str, cancel: &CancelFlag) -> Vec<SymbolInformation> {
    parse_document(text, cancel)
        .into_iter()
        .map(|item| {
            let line = item.line;
            #[allow(deprecated)]
            SymbolInformation {
                name: item.name,
                kind: symbol_kind(item.kind),
                tags: None,
                deprecated: None,
                location: Location {
                    uri: uri.clone(),
                    range: Range {
                        start: Position { line, character: 0 },
                        end: Position {
                            line: line + 1,
                            character: 0,
                        },
                    },
                },
                container_name: None,
            }
        })
        .collect()
}

impl LanguageServer for AblLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        #[allow(deprecated)]
        let InitializeParams {
            workspace_folders,
            root_uri,
            ..
        } = params;

        let root = workspace_root(workspace_folders.as_deref(), root_uri.as_ref())
            .or_else(|| std::env::current_dir().ok());
        if let Some(root) = root {
            match OpenEdgeConfig::load_or_default(&root) {
                Ok(config) => *self.config.write().await = config,
                Err(e) => {
                    // A missing file is fine; a broken one deserves a warning
                    // rather than silently running with defaults.
                    self.client
                        .show_message(
                            MessageType::WARNING,
                            format!("Ignoring invalid .openedge.json: {}", e),
                        )
                        .await;
                }
            }
        }

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "abl-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![".".to_string()]),
                    all_commit_characters: None,
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                    completion_item: None,
                }),
                document_symbol_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "ABL language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri.to_string();
        let mut docs = self.documents.write().await;
        docs.insert(
            uri,
            DocumentData {
                content: params.text_document.text,
                version: params.text_document.version,
            },
        );
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // Full sync: the last change carries the complete document text.
        if let Some(change) = params.content_changes.into_iter().last() {
            let uri = params.text_document.uri.to_string();
            let mut docs = self.documents.write().await;
            docs.insert(
                uri,
                DocumentData {
                    content: change.text,
                    version: params.text_document.version,
                },
            );
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.run_syntax_check(&params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let mut docs = self.documents.write().await;
        docs.remove(params.text_document.uri.as_str());
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri.to_string();
        let position = params.text_document_position.position;

        let docs = self.documents.read().await;
        let Some(doc) = docs.get(&uri) else {
            return Ok(None);
        };

        let items = completion_candidates(&doc.content, position, &CancelFlag::new());
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;

        let docs = self.documents.read().await;
        let Some(doc) = docs.get(uri.as_str()) else {
            return Ok(None);
        };

        let symbols = document_symbols(&uri, &doc.content, &CancelFlag::new());
        Ok(Some(DocumentSymbolResponse::Flat(symbols)))
    }
}

pub async fn run_server() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(AblLanguageServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
