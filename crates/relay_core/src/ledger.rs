//! Usage ledger - period-bucketed consumption metering.
//!
//! Every completed operation posts its quantity and cost here. Metering is
//! best-effort: a failed write is logged and never blocks delivery of the
//! already-generated content.

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::store::UsageStore;
use crate::types::{UsageAmount, UsageBucket, UsageHistory, GUEST_IDENTITY};

/// Window over which accumulated cost counts toward a budget limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetPeriod {
    /// Resets at local midnight
    Daily,
    /// Resets on the first day of the calendar month
    Monthly,
    /// Rolling window over the last N days, today inclusive
    RollingDays(u32),
}

impl FromStr for BudgetPeriod {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "monthly" => Ok(Self::Monthly),
            other => {
                if let Some(days) = other.strip_prefix("rolling-") {
                    let days: u32 = days.parse().map_err(|_| {
                        CoreError::InvalidConfig(format!("bad rolling window: {}", other))
                    })?;
                    if days == 0 {
                        return Err(CoreError::InvalidConfig(
                            "rolling window must be at least one day".to_string(),
                        ));
                    }
                    Ok(Self::RollingDays(days))
                } else {
                    Err(CoreError::InvalidConfig(format!(
                        "unknown budget period: {}",
                        other
                    )))
                }
            }
        }
    }
}

/// Unit prices in USD, mirroring the provider's price list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prices {
    /// Per 1000 chat tokens
    pub token_price: f64,
    /// Per 1000 vision tokens
    pub vision_token_price: f64,
    /// Per image, indexed by resolution tier (256 / 512 / 1024)
    pub image_prices: Vec<f64>,
    /// Per 1000 synthesized characters
    pub tts_price: f64,
    /// Per transcribed minute
    pub transcription_price: f64,
}

impl Default for Prices {
    fn default() -> Self {
        Self {
            token_price: 0.002,
            vision_token_price: 0.01,
            image_prices: vec![0.016, 0.018, 0.02],
            tts_price: 0.015,
            transcription_price: 0.006,
        }
    }
}

impl Prices {
    /// Cost of one metered amount.
    pub fn cost_of(&self, usage: &UsageAmount) -> f64 {
        match usage {
            UsageAmount::ChatTokens(n) => (*n as f64 / 1000.0) * self.token_price,
            UsageAmount::Image(size) => self
                .image_prices
                .get(size.tier())
                .copied()
                .unwrap_or_else(|| self.image_prices.last().copied().unwrap_or(0.0)),
            UsageAmount::VisionTokens(n) => (*n as f64 / 1000.0) * self.vision_token_price,
            UsageAmount::TtsChars(n) => (*n as f64 / 1000.0) * self.tts_price,
            UsageAmount::TranscriptionSeconds(s) => (s / 60.0) * self.transcription_price,
        }
    }
}

/// Totals returned after posting usage.
#[derive(Debug, Clone)]
pub struct UsageTotals {
    pub today: UsageBucket,
    pub month: UsageBucket,
}

/// Per-identity usage summary for the stats command.
#[derive(Debug, Clone)]
pub struct UsageReport {
    pub identity_id: String,
    pub today: UsageBucket,
    pub month: UsageBucket,
    /// `f64::INFINITY` for unrestricted identities
    pub remaining_budget: f64,
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

fn apply_usage(history: &mut UsageHistory, usage: &UsageAmount, cost: f64, date: NaiveDate) {
    for bucket in [
        history.days.entry(day_key(date)).or_default(),
        history.months.entry(month_key(date)).or_default(),
    ] {
        match usage {
            UsageAmount::ChatTokens(n) => bucket.tokens += n,
            UsageAmount::Image(_) => bucket.images += 1,
            UsageAmount::VisionTokens(n) => bucket.vision_tokens += n,
            UsageAmount::TtsChars(n) => bucket.tts_chars += n,
            UsageAmount::TranscriptionSeconds(s) => bucket.transcription_seconds += s,
        }
        bucket.cost += cost;
    }
}

/// Period-bucketed usage accounting with budget limits.
///
/// Shared across all concurrent request tasks; per-identity updates go
/// through [`UsageStore::update`], which applies them atomically. Updates
/// for different identities proceed fully in parallel.
pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    prices: Prices,
    period: BudgetPeriod,
    /// Explicit per-identity budget limits
    budgets: HashMap<String, f64>,
    /// Budget applied to identities outside the allow-list
    guest_budget: f64,
    /// Explicit allow-list; `*` admits everyone
    allowed: Vec<String>,
}

impl UsageLedger {
    pub fn new(
        store: Arc<dyn UsageStore>,
        prices: Prices,
        period: BudgetPeriod,
        budgets: HashMap<String, f64>,
        guest_budget: f64,
        allowed: Vec<String>,
    ) -> Self {
        Self {
            store,
            prices,
            period,
            budgets,
            guest_budget,
            allowed,
        }
    }

    /// Build a ledger from the runtime configuration.
    pub fn from_config(store: Arc<dyn UsageStore>, config: &crate::config::RelayConfig) -> Self {
        Self::new(
            store,
            config.prices.clone(),
            config.budget_period,
            config.user_budgets.clone(),
            config.guest_budget,
            config.allowed_ids.clone(),
        )
    }

    /// Whether the identity appears on the explicit allow-list.
    pub fn is_allowlisted(&self, identity_id: &str) -> bool {
        self.allowed
            .iter()
            .any(|a| a == "*" || a == identity_id)
    }

    /// Record completed usage for an identity and return its new totals.
    ///
    /// Usage by identities outside the allow-list is additionally posted to
    /// the guest pool; a failed guest post is logged and otherwise ignored.
    pub fn record(&self, identity_id: &str, usage: UsageAmount) -> CoreResult<UsageTotals> {
        let totals = self.post(identity_id, &usage)?;
        if !self.is_allowlisted(identity_id) && identity_id != GUEST_IDENTITY {
            if let Err(e) = self.post(GUEST_IDENTITY, &usage) {
                warn!(identity = identity_id, error = %e, "guest pool usage write failed");
            }
        }
        Ok(totals)
    }

    /// Record usage, logging instead of propagating a persistence failure.
    ///
    /// This is the entry point for the request path: the reply has already
    /// been delivered, so metering must not fail the task.
    pub fn record_best_effort(&self, identity_id: &str, usage: UsageAmount) {
        if let Err(e) = self.record(identity_id, usage) {
            warn!(
                identity = identity_id,
                kind = usage.kind(),
                error = %e,
                "usage write failed; continuing without metering"
            );
        }
    }

    fn post(&self, identity_id: &str, usage: &UsageAmount) -> CoreResult<UsageTotals> {
        let cost = self.prices.cost_of(usage);
        let today = Local::now().date_naive();
        let history = self.store.update(identity_id, &mut |history| {
            apply_usage(history, usage, cost, today);
        })?;
        Ok(Self::totals_at(&history, today))
    }

    fn totals_at(history: &UsageHistory, date: NaiveDate) -> UsageTotals {
        UsageTotals {
            today: history.days.get(&day_key(date)).cloned().unwrap_or_default(),
            month: history
                .months
                .get(&month_key(date))
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Budget limit for the identity, or `None` when unrestricted.
    fn limit_for(&self, identity_id: &str) -> Option<f64> {
        if let Some(limit) = self.budgets.get(identity_id) {
            Some(*limit)
        } else if self.is_allowlisted(identity_id) {
            // Allow-listed without an explicit limit means unrestricted
            None
        } else {
            Some(self.guest_budget)
        }
    }

    /// Cost accumulated within the configured budget period.
    fn spent_in_period(&self, history: &UsageHistory, today: NaiveDate) -> f64 {
        match self.period {
            BudgetPeriod::Daily => history
                .days
                .get(&day_key(today))
                .map(|b| b.cost)
                .unwrap_or(0.0),
            BudgetPeriod::Monthly => history
                .months
                .get(&month_key(today))
                .map(|b| b.cost)
                .unwrap_or(0.0),
            BudgetPeriod::RollingDays(n) => {
                let start = today - chrono::Days::new(u64::from(n.saturating_sub(1)));
                history
                    .days
                    .iter()
                    .filter_map(|(key, bucket)| {
                        let date = NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()?;
                        (date >= start && date <= today).then_some(bucket.cost)
                    })
                    .sum()
            }
        }
    }

    /// Budget left for the identity in the current period.
    ///
    /// Returns `f64::INFINITY` for unrestricted identities. This is a pure
    /// read; it does not reserve anything.
    pub fn remaining_budget(&self, identity_id: &str) -> CoreResult<f64> {
        let Some(limit) = self.limit_for(identity_id) else {
            return Ok(f64::INFINITY);
        };
        let today = Local::now().date_naive();
        let spent = match self.store.load(identity_id)? {
            Some(history) => self.spent_in_period(&history, today),
            None => 0.0,
        };
        Ok(limit - spent)
    }

    /// Usage summary for the stats command.
    pub fn report(&self, identity_id: &str) -> CoreResult<UsageReport> {
        let today = Local::now().date_naive();
        let history = self
            .store
            .load(identity_id)?
            .unwrap_or_else(|| UsageHistory::new(identity_id));
        let totals = Self::totals_at(&history, today);
        Ok(UsageReport {
            identity_id: identity_id.to_string(),
            today: totals.today,
            month: totals.month,
            remaining_budget: self.remaining_budget(identity_id)?,
        })
    }
}
