//! Runtime configuration, loaded from environment variables.

use std::collections::HashMap;

use crate::error::CoreResult;
use crate::ledger::{BudgetPeriod, Prices};

/// Bot configuration: operators, allow-list, budgets and feature flags.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Administrator identity ids; bypass approval and budget checks
    pub admin_ids: Vec<String>,
    /// Explicit allow-list; `*` admits everyone. Identities outside it are
    /// metered into the guest pool.
    pub allowed_ids: Vec<String>,
    /// Per-identity budget limits in USD
    pub user_budgets: HashMap<String, f64>,
    /// Budget applied to identities outside the allow-list
    pub guest_budget: f64,
    /// Window over which cost counts toward the limit
    pub budget_period: BudgetPeriod,
    pub enable_image_generation: bool,
    pub enable_tts_generation: bool,
    pub enable_vision: bool,
    pub enable_transcription: bool,
    /// Unit prices used by the ledger
    pub prices: Prices,
    /// Data directory for the file store
    pub data_dir: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            admin_ids: Vec::new(),
            allowed_ids: Vec::new(),
            user_budgets: HashMap::new(),
            guest_budget: 100.0,
            budget_period: BudgetPeriod::Monthly,
            enable_image_generation: true,
            enable_tts_generation: true,
            enable_vision: true,
            enable_transcription: true,
            prices: Prices::default(),
            data_dir: "data".to_string(),
        }
    }
}

fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "-")
        .collect()
}

fn parse_bool(raw: &str) -> bool {
    raw.trim().to_lowercase() != "false"
}

impl RelayConfig {
    /// Load configuration from environment variables.
    ///
    /// `RELAY_USER_BUDGETS` pairs positionally with `RELAY_ALLOWED_IDS`,
    /// matching the original deployment convention; a shorter budget list
    /// leaves the remaining allow-listed identities unrestricted.
    pub fn from_env() -> CoreResult<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("RELAY_ADMIN_IDS") {
            config.admin_ids = parse_id_list(&raw);
        }
        if let Ok(raw) = std::env::var("RELAY_ALLOWED_IDS") {
            config.allowed_ids = parse_id_list(&raw);
        }
        if let Ok(raw) = std::env::var("RELAY_USER_BUDGETS") {
            let budgets: Vec<f64> = raw
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            for (id, budget) in config.allowed_ids.iter().zip(budgets) {
                config.user_budgets.insert(id.clone(), budget);
            }
        }
        if let Ok(raw) = std::env::var("RELAY_GUEST_BUDGET") {
            if let Ok(value) = raw.parse() {
                config.guest_budget = value;
            }
        }
        if let Ok(raw) = std::env::var("RELAY_BUDGET_PERIOD") {
            config.budget_period = raw.parse()?;
        }
        if let Ok(raw) = std::env::var("RELAY_ENABLE_IMAGE_GENERATION") {
            config.enable_image_generation = parse_bool(&raw);
        }
        if let Ok(raw) = std::env::var("RELAY_ENABLE_TTS_GENERATION") {
            config.enable_tts_generation = parse_bool(&raw);
        }
        if let Ok(raw) = std::env::var("RELAY_ENABLE_VISION") {
            config.enable_vision = parse_bool(&raw);
        }
        if let Ok(raw) = std::env::var("RELAY_ENABLE_TRANSCRIPTION") {
            config.enable_transcription = parse_bool(&raw);
        }
        if let Ok(raw) = std::env::var("RELAY_TOKEN_PRICE") {
            if let Ok(value) = raw.parse() {
                config.prices.token_price = value;
            }
        }
        if let Ok(raw) = std::env::var("RELAY_VISION_TOKEN_PRICE") {
            if let Ok(value) = raw.parse() {
                config.prices.vision_token_price = value;
            }
        }
        if let Ok(raw) = std::env::var("RELAY_IMAGE_PRICES") {
            let tiers: Vec<f64> = raw
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if !tiers.is_empty() {
                config.prices.image_prices = tiers;
            }
        }
        if let Ok(raw) = std::env::var("RELAY_TTS_PRICE") {
            if let Ok(value) = raw.parse() {
                config.prices.tts_price = value;
            }
        }
        if let Ok(raw) = std::env::var("RELAY_TRANSCRIPTION_PRICE") {
            if let Ok(value) = raw.parse() {
                config.prices.transcription_price = value;
            }
        }
        if let Ok(raw) = std::env::var("RELAY_DATA_DIR") {
            config.data_dir = raw;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert!(config.admin_ids.is_empty());
        assert_eq!(config.budget_period, BudgetPeriod::Monthly);
        assert!(config.enable_image_generation);
    }

    #[test]
    fn test_id_list_parsing() {
        assert_eq!(parse_id_list("1, 2,3"), vec!["1", "2", "3"]);
        assert!(parse_id_list("-").is_empty());
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_bool_parsing() {
        assert!(parse_bool("true"));
        assert!(parse_bool("anything"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(" FALSE "));
    }
}
