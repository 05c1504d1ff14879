//! Reference assembly of the full adjudication pipeline.
//!
//! `Runtime` wires the production components (HD screening, TOML rules,
//! the four validators, the HITL reviewer, the hash-chained trace) to the
//! mock collaborators, and keeps handles to the shared stores so callers
//! can seed declarations, inspect history, or reload rules.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use tracing::info;

use preauth_contracts::{
    claim::ClinicalRequest,
    error::PreauthResult,
    result::AdjudicationResult,
};
use preauth_core::{
    traits::{ClinicalReasoner, HdRecordStore, PolicyRetriever, RuleEngine},
    Clock, Orchestrator, OrchestratorParts, OrchestratorSettings, SystemClock,
};
use preauth_review::HitlReviewer;
use preauth_rules::{EngineConfig, NoUtilization, RuleSet, TomlRuleEngine, UtilizationSource};
use preauth_screening::{ConditionTable, HealthDeclarationValidator, InMemoryHdStore};
use preauth_trace::InMemoryTraceWriter;
use preauth_validate::{standard_validators, HistoryStore, ProviderStatsStore, RequestSchemaValidator};

use crate::collaborators::{GuidelineReasoner, KeywordPolicyRetriever};
use crate::mock_data::demo_hd_records;

// ── Configuration ────────────────────────────────────────────────────────────

pub const DEFAULT_CONFIG: &str = include_str!("../config/adjudication.toml");

/// The bundled reference configuration.
pub fn default_config() -> PreauthResult<EngineConfig> {
    EngineConfig::from_toml_str(DEFAULT_CONFIG)
}

// ── Arc-wrapped adapters ─────────────────────────────────────────────────────

struct SharedRules(Arc<TomlRuleEngine>);

impl RuleEngine for SharedRules {
    fn evaluate(&self, request: &ClinicalRequest) -> PreauthResult<preauth_contracts::rules::RuleOutcome> {
        self.0.evaluate(request)
    }
}

struct SharedClock(Arc<dyn Clock>);

impl Clock for SharedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.now()
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct RuntimeBuilder {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    retriever: Box<dyn PolicyRetriever>,
    reasoner: Box<dyn ClinicalReasoner>,
    utilization: Box<dyn UtilizationSource>,
    seed_demo_records: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            retriever: Box::new(KeywordPolicyRetriever::default()),
            reasoner: Box::new(GuidelineReasoner::default()),
            utilization: Box::new(NoUtilization),
            seed_demo_records: false,
        }
    }
}

impl RuntimeBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn retriever(mut self, retriever: impl PolicyRetriever + 'static) -> Self {
        self.retriever = Box::new(retriever);
        self
    }

    pub fn reasoner(mut self, reasoner: impl ClinicalReasoner + 'static) -> Self {
        self.reasoner = Box::new(reasoner);
        self
    }

    pub fn utilization(mut self, source: impl UtilizationSource + 'static) -> Self {
        self.utilization = Box::new(source);
        self
    }

    /// Load the demo members' declarations into the HD store on build.
    pub fn seed_demo_records(mut self) -> Self {
        self.seed_demo_records = true;
        self
    }

    /// Assemble the pipeline.
    ///
    /// # Errors
    ///
    /// `ConfigError` when the configuration fails its range checks or the
    /// intake schema does not compile; `StoreError` if seeding fails.
    pub fn build(self) -> PreauthResult<Runtime> {
        let config = self.config;
        config.check()?;

        let table = if config.hd_conditions.is_empty() {
            ConditionTable::builtin()
        } else {
            ConditionTable::new(config.hd_conditions.clone())
        };

        let hd_store = Arc::new(InMemoryHdStore::new());
        if self.seed_demo_records {
            for record in demo_hd_records() {
                let member = record.member_id.clone();
                hd_store.add_record(&member, record)?;
            }
        }

        let rules = Arc::new(TomlRuleEngine::new(config.ruleset.clone()).with_utilization(self.utilization));
        let history = Arc::new(HistoryStore::new());
        let providers = Arc::new(ProviderStatsStore::new());
        let trace = InMemoryTraceWriter::new();

        let store: Arc<dyn HdRecordStore> = hd_store.clone();
        let parts = OrchestratorParts {
            screen: Box::new(HealthDeclarationValidator::new(table, store, config.screening.clone())),
            rules: Box::new(SharedRules(Arc::clone(&rules))),
            retriever: self.retriever,
            reasoner: self.reasoner,
            validators: standard_validators(
                config.necessity.clone(),
                (Arc::clone(&history), config.history.clone()),
                config.financial.clone(),
                (Arc::clone(&providers), config.fraud.clone()),
            ),
            reviewer: Box::new(HitlReviewer::new(config.review.clone())),
            trace: Box::new(trace.clone()),
            clock: Box::new(SharedClock(Arc::clone(&self.clock))),
        };
        let settings = OrchestratorSettings {
            retrieval: config.retrieval.clone(),
            blend: config.blend.clone(),
            orchestrator: config.orchestrator.clone(),
            screening: config.screening.clone(),
        };

        info!(
            ruleset = %config.ruleset.version,
            members_seeded = hd_store.member_count()?,
            "reference runtime ready"
        );

        Ok(Runtime {
            orchestrator: Orchestrator::new(parts, settings),
            intake: RequestSchemaValidator::new()?,
            rules,
            clock: self.clock,
            hd_store,
            history,
            providers,
            trace,
        })
    }
}

// ── Runtime ──────────────────────────────────────────────────────────────────

/// A fully assembled engine plus handles to its shared state.
pub struct Runtime {
    orchestrator: Orchestrator,
    intake: RequestSchemaValidator,
    rules: Arc<TomlRuleEngine>,
    clock: Arc<dyn Clock>,
    hd_store: Arc<InMemoryHdStore>,
    history: Arc<HistoryStore>,
    providers: Arc<ProviderStatsStore>,
    trace: InMemoryTraceWriter,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// The bundled configuration with the demo members seeded.
    pub fn reference() -> PreauthResult<Self> {
        Self::builder().config(default_config()?).seed_demo_records().build()
    }

    pub fn adjudicate(
        &self,
        request: &ClinicalRequest,
        policy_start: Option<NaiveDate>,
    ) -> PreauthResult<AdjudicationResult> {
        self.orchestrator.adjudicate(request, policy_start)
    }

    /// Intake-validate a raw JSON document, then adjudicate it.
    pub fn adjudicate_value(&self, raw: &Value, policy_start: Option<NaiveDate>) -> PreauthResult<AdjudicationResult> {
        let request = self.intake.parse(raw)?;
        self.adjudicate(&request, policy_start)
    }

    pub fn adjudicate_json(&self, raw: &str, policy_start: Option<NaiveDate>) -> PreauthResult<AdjudicationResult> {
        let request = self.intake.parse_str(raw)?;
        self.adjudicate(&request, policy_start)
    }

    /// Today according to the runtime clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// The policy start date `days` before today.
    pub fn policy_start_days_ago(&self, days: i64) -> NaiveDate {
        self.today() - Duration::days(days)
    }

    /// Swap in a new rule set; returns the version it replaced.
    pub fn reload_rules(&self, rules: RuleSet) -> PreauthResult<String> {
        self.rules.reload(rules)
    }

    pub fn rules(&self) -> &Arc<TomlRuleEngine> {
        &self.rules
    }

    pub fn hd_store(&self) -> &Arc<InMemoryHdStore> {
        &self.hd_store
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn providers(&self) -> &Arc<ProviderStatsStore> {
        &self.providers
    }

    pub fn trace_writer(&self) -> &InMemoryTraceWriter {
        &self.trace
    }

    /// Recompute the result's hash chain.
    pub fn verify_trace(&self, result: &AdjudicationResult) -> bool {
        preauth_trace::verify_trace(&result.trace)
    }
}
