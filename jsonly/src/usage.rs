//! Usage metering and the subscription plan catalog.
//!
//! Every successful extraction writes one row to the `documentAnalyses`
//! collection. The usage report aggregates those rows: lifetime pages,
//! pages in the current UTC calendar month, pages remaining on the user's
//! plan, and a zero-filled daily series for the last 14 days. Metered plans
//! are gated before the backend is contacted; Basic is pay-as-you-go and
//! never gated.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::store::{DocumentStore, USERS_COLLECTION};
use crate::types::DocumentValue;

pub const DOCUMENT_ANALYSES_COLLECTION: &str = "documentAnalyses";

/// Days covered by the usage report's daily series, today inclusive.
const DAILY_SERIES_DAYS: i64 = 14;

/// Analyses returned for display in the usage report.
const RECENT_LIMIT: usize = 5;

/// Subscription tiers. The allowance is pages per calendar month; an
/// allowance of 0 means pay-as-you-go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Basic,
    Pro,
    Business,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Basic, Plan::Pro, Plan::Business];

    pub fn name(&self) -> &'static str {
        match self {
            Plan::Basic => "Basic",
            Plan::Pro => "Pro",
            Plan::Business => "Business",
        }
    }

    /// Monthly page allowance; 0 means pay-as-you-go.
    pub fn monthly_pages(&self) -> u32 {
        match self {
            Plan::Basic => 0,
            Plan::Pro => 1000,
            Plan::Business => 10000,
        }
    }

    pub fn price(&self) -> f64 {
        match self {
            Plan::Basic => 1.95,
            Plan::Pro => 9.95,
            Plan::Business => 49.95,
        }
    }

    pub fn price_unit(&self) -> &'static str {
        match self {
            Plan::Basic => "per 100 pages",
            Plan::Pro | Plan::Business => "per month",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Plan::Basic => "Perfect for occasional document analysis",
            Plan::Pro => "Ideal for regular document processing",
            Plan::Business => "Best for high-volume processing",
        }
    }

    pub fn features(&self) -> [&'static str; 3] {
        match self {
            Plan::Basic => ["Pay as you go", "Basic document analysis", "Email support"],
            Plan::Pro => ["1000 pages per month", "Advanced document analysis", "Priority support"],
            Plan::Business => ["10000 pages per month", "Enterprise-grade analysis", "24/7 dedicated support"],
        }
    }

    /// Whether the plan enforces its monthly allowance.
    pub fn is_metered(&self) -> bool {
        self.monthly_pages() > 0
    }

    /// The plan stored in a user document, Basic when absent or unknown.
    pub fn from_document(document: &DocumentValue) -> Plan {
        document
            .get("plan")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One usage-metering row: a single successful extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    pub user_id: String,
    pub document_name: String,
    pub run_at: DateTime<Utc>,
    pub nb_pages: u32,
}

/// Pages analyzed on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub pages: u64,
}

/// Aggregated usage for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub plan: Plan,
    pub total_pages: u64,
    /// Pages with `runAt` on or after the first of the current month, UTC.
    pub pages_this_month: u64,
    /// Allowance minus month usage, floored at zero; zero for pay-as-you-go.
    pub pages_remaining: u64,
    /// Last 14 days, today inclusive, ascending by date, zero-filled.
    pub daily_series: Vec<DailyUsage>,
    /// Most recent analyses, newest first.
    pub recent: Vec<DocumentAnalysis>,
}

/// Records analyses and aggregates them into usage reports and quota checks.
#[derive(Clone)]
pub struct UsageService {
    store: Arc<dyn DocumentStore>,
}

impl UsageService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Record one analysis row after a successful extraction.
    pub async fn record_analysis(&self, uid: &str, document_name: &str, nb_pages: u32) -> Result<()> {
        let analysis = DocumentAnalysis {
            user_id: uid.to_string(),
            document_name: document_name.to_string(),
            run_at: Utc::now(),
            nb_pages,
        };
        let document = DocumentValue::try_from(serde_json::to_value(&analysis)?)?;
        self.store.add(DOCUMENT_ANALYSES_COLLECTION, document).await?;
        debug!("Recorded analysis of {} ({} pages) for {}", document_name, nb_pages, uid);
        Ok(())
    }

    /// The user's plan, Basic when the user document or field is missing.
    pub async fn plan_for(&self, uid: &str) -> Result<Plan> {
        let document = self.store.get(USERS_COLLECTION, uid).await?;
        Ok(document.as_ref().map(Plan::from_document).unwrap_or_default())
    }

    /// Aggregate the user's analyses into a report.
    pub async fn report(&self, uid: &str) -> Result<UsageReport> {
        let plan = self.plan_for(uid).await?;
        let analyses = self.load_analyses(uid).await?;
        Ok(build_report(plan, analyses, Utc::now()))
    }

    /// Reject uploads on a metered plan with no pages left this month.
    pub async fn check_quota(&self, uid: &str) -> Result<()> {
        let plan = self.plan_for(uid).await?;
        if !plan.is_metered() {
            return Ok(());
        }

        let used = self.pages_this_month(uid).await?;
        let limit = plan.monthly_pages();
        if used >= u64::from(limit) {
            return Err(Error::QuotaExceeded { used, limit });
        }
        Ok(())
    }

    /// Pages used since the first of the current month, UTC.
    pub async fn pages_this_month(&self, uid: &str) -> Result<u64> {
        let now = Utc::now();
        Ok(self
            .load_analyses(uid)
            .await?
            .iter()
            .filter(|analysis| in_month(analysis.run_at, now))
            .map(|analysis| u64::from(analysis.nb_pages))
            .sum())
    }

    async fn load_analyses(&self, uid: &str) -> Result<Vec<DocumentAnalysis>> {
        let rows = self
            .store
            .query_eq(DOCUMENT_ANALYSES_COLLECTION, "userId", &Value::String(uid.to_string()))
            .await?;
        rows.into_iter()
            .map(|(_, document)| serde_json::from_value(document.into()).map_err(Error::from))
            .collect()
    }
}

fn in_month(run_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    run_at.year() == now.year() && run_at.month() == now.month()
}

fn build_report(plan: Plan, mut analyses: Vec<DocumentAnalysis>, now: DateTime<Utc>) -> UsageReport {
    let total_pages = analyses.iter().map(|a| u64::from(a.nb_pages)).sum();
    let pages_this_month = analyses
        .iter()
        .filter(|a| in_month(a.run_at, now))
        .map(|a| u64::from(a.nb_pages))
        .sum();
    let pages_remaining = if plan.is_metered() {
        u64::from(plan.monthly_pages()).saturating_sub(pages_this_month)
    } else {
        0
    };

    let today = now.date_naive();
    let oldest = today - chrono::Duration::days(DAILY_SERIES_DAYS - 1);
    let mut daily_series: Vec<DailyUsage> = (0..DAILY_SERIES_DAYS)
        .rev()
        .map(|days_ago| DailyUsage {
            date: today - chrono::Duration::days(days_ago),
            pages: 0,
        })
        .collect();
    for analysis in &analyses {
        let date = analysis.run_at.date_naive();
        if date < oldest {
            continue;
        }
        // date > today (clock skew in stored rows) falls off the end and is
        // ignored rather than widening the series
        let index = (date - oldest).num_days() as usize;
        if let Some(bucket) = daily_series.get_mut(index) {
            bucket.pages += u64::from(analysis.nb_pages);
        }
    }

    analyses.sort_by(|a, b| b.run_at.cmp(&a.run_at));
    analyses.truncate(RECENT_LIMIT);

    UsageReport {
        plan,
        total_pages,
        pages_this_month,
        pages_remaining,
        daily_series,
        recent: analyses,
    }
}
