//! Receipt extraction provider.
//!
//! Serves `extract_receipt_info`: reads the referenced receipt file and
//! asks the configured extractor to pull out structured fields. A receipt
//! that exists but cannot be understood is a negative verdict (`success:
//! false` in the result), not a provider fault; faults are reserved for
//! the extractor backend itself failing.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::context::CallerContext;
use crate::error::Error;
use crate::model::{parse_amount, ExtractedReceipt};
use crate::protocol::{Capability, CapabilityRequest, Provider, ProviderCard};

/// What the extractor made of the receipt contents.
#[derive(Debug, Clone)]
pub enum ExtractionVerdict {
    Extracted(ExtractedReceipt),
    Unreadable(String),
}

/// Backend that turns raw receipt bytes into structured fields.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract(&self, receipt_path: &str, contents: &[u8])
        -> Result<ExtractionVerdict, Error>;
}

/// Extractor for locally stored receipts in JSON form, as produced by the
/// scanning frontend. Anything that does not parse is unreadable.
pub struct LocalJsonExtractor;

#[async_trait]
impl VisionExtractor for LocalJsonExtractor {
    async fn extract(
        &self,
        receipt_path: &str,
        contents: &[u8],
    ) -> Result<ExtractionVerdict, Error> {
        let parsed: Value = match serde_json::from_slice(contents) {
            Ok(v) => v,
            Err(e) => {
                return Ok(ExtractionVerdict::Unreadable(format!(
                    "{receipt_path} is not a readable receipt: {e}"
                )))
            }
        };

        let Some(amount) = parsed.get("amount").and_then(parse_amount) else {
            return Ok(ExtractionVerdict::Unreadable(format!(
                "{receipt_path} has no recognizable amount"
            )));
        };

        let str_field = |key: &str| {
            parsed
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(ExtractionVerdict::Extracted(ExtractedReceipt {
            vendor: str_field("vendor"),
            amount,
            date: parsed
                .get("date")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
            category: str_field("category"),
            description: str_field("description"),
        }))
    }
}

pub struct ExtractionProvider {
    extractor: Arc<dyn VisionExtractor>,
}

impl ExtractionProvider {
    pub const ID: &'static str = "receipt_extraction";

    pub fn new(extractor: Arc<dyn VisionExtractor>) -> Self {
        Self { extractor }
    }

    async fn extract_receipt_info(
        &self,
        request: &CapabilityRequest,
    ) -> Result<Value, Error> {
        let receipt_path = request.require_str("receipt_path").map_err(Error::from)?;

        if !Path::new(receipt_path).exists() {
            info!(receipt_path, "Receipt file not found");
            return Ok(json!({
                "success": false,
                "error": format!("Receipt file not found: {receipt_path}"),
            }));
        }
        let contents = match tokio::fs::read(receipt_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok(json!({
                    "success": false,
                    "error": format!("Could not read receipt file {receipt_path}: {e}"),
                }))
            }
        };
        if contents.is_empty() {
            return Ok(json!({
                "success": false,
                "error": format!("Receipt file is empty: {receipt_path}"),
            }));
        }

        match self.extractor.extract(receipt_path, &contents).await? {
            ExtractionVerdict::Extracted(receipt) => {
                debug!(receipt_path, vendor = %receipt.vendor, "Extracted receipt fields");
                Ok(json!({
                    "success": true,
                    "receipt": receipt,
                }))
            }
            ExtractionVerdict::Unreadable(detail) => Ok(json!({
                "success": false,
                "error": detail,
            })),
        }
    }
}

#[async_trait]
impl Provider for ExtractionProvider {
    fn card(&self) -> ProviderCard {
        ProviderCard {
            provider_id: Self::ID.to_string(),
            name: "Receipt Extraction".to_string(),
            description: "Extracts structured fields from scanned receipt documents".to_string(),
            version: "1.0.0".to_string(),
            capabilities: vec![Capability::new(
                "extract_receipt_info",
                "Extract vendor, amount, date and category from a receipt file",
                json!({
                    "type": "object",
                    "properties": {
                        "receipt_path": { "type": "string" }
                    },
                    "required": ["receipt_path"]
                }),
                json!({
                    "type": "object",
                    "properties": {
                        "success": { "type": "boolean" },
                        "receipt": { "type": "object" },
                        "error": { "type": "string" }
                    }
                }),
            )],
            metadata: json!({}),
        }
    }

    async fn handle(
        &self,
        request: CapabilityRequest,
        _ctx: &CallerContext,
    ) -> Result<Value, Error> {
        match request.capability.as_str() {
            "extract_receipt_info" => self.extract_receipt_info(&request).await,
            other => Err(crate::error::ProtocolError::UnknownCapability(other.to_string()).into()),
        }
    }
}
