//! Dictionary acquisition over the LSP connection.

use async_trait::async_trait;
use tower_lsp::lsp_types::request::Request;
use tower_lsp::Client;
use tracing::debug;

use crate::proofread::{DictionaryProvider, DictionaryRequest, DictionaryResponse, ProofreadError};

/// `proofsp/getDictionary`, sent from server to client.
#[derive(Debug)]
pub enum GetDictionary {}

impl Request for GetDictionary {
    type Params = DictionaryRequest;
    type Result = DictionaryResponse;
    const METHOD: &'static str = "proofsp/getDictionary";
}

/// Asks the editor for dictionaries when none are configured on disk.
#[derive(Debug, Clone)]
pub struct ClientDictionaryProvider {
    client: Client,
}

impl ClientDictionaryProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DictionaryProvider for ClientDictionaryProvider {
    async fn fetch(&self, request: DictionaryRequest) -> Result<DictionaryResponse, ProofreadError> {
        debug!(?request, "requesting dictionary from client");
        self.client
            .send_request::<GetDictionary>(request)
            .await
            .map_err(|e| ProofreadError::Channel(e.to_string()))
    }
}
