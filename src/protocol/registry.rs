//! Provider cards and the capability registry.
//!
//! A provider advertises itself with a card: identity, version, and the
//! list of capabilities it serves, each with JSON schemas for input and
//! output. The registry maps provider ids to cards and answers
//! capability-based discovery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

/// One callable capability advertised by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

impl Capability {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        output_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            output_schema,
        }
    }
}

/// Self-description a provider publishes on registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCard {
    pub provider_id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub metadata: Value,
}

impl ProviderCard {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == capability)
    }
}

/// In-process registry of provider cards.
#[derive(Default)]
pub struct ProviderRegistry {
    cards: RwLock<HashMap<String, ProviderCard>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a card. Re-registering the same provider id replaces the
    /// previous card.
    pub async fn register(&self, card: ProviderCard) {
        info!(
            provider_id = %card.provider_id,
            capabilities = card.capabilities.len(),
            "Registered provider"
        );
        self.cards
            .write()
            .await
            .insert(card.provider_id.clone(), card);
    }

    pub async fn get(&self, provider_id: &str) -> Option<ProviderCard> {
        self.cards.read().await.get(provider_id).cloned()
    }

    pub async fn list(&self) -> Vec<ProviderCard> {
        let mut all: Vec<ProviderCard> = self.cards.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        all
    }

    /// All providers advertising `capability` by exact name.
    pub async fn find_by_capability(&self, capability: &str) -> Vec<ProviderCard> {
        let mut found: Vec<ProviderCard> = self
            .cards
            .read()
            .await
            .values()
            .filter(|card| card.has_capability(capability))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        found
    }

    /// Capability name to provider ids, for the discovery endpoint.
    pub async fn capability_map(&self) -> HashMap<String, Vec<String>> {
        let cards = self.cards.read().await;
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for card in cards.values() {
            for cap in &card.capabilities {
                map.entry(cap.name.clone())
                    .or_default()
                    .push(card.provider_id.clone());
            }
        }
        for providers in map.values_mut() {
            providers.sort();
        }
        map
    }
}
