//! In-memory fakes for the repository, chat gateway, analysis agent and
//! embedding backend, plus webhook fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use incidentd::agent::{
    AnalysisClient, AnalysisResponse, IncidentSummaryRequest, IncidentSummaryResponse,
};
use incidentd::config::{FlapConfig, RefireThreadPolicy};
use incidentd::correlator::IncidentCorrelator;
use incidentd::embedding::Embedder;
use incidentd::error::{Error, Result};
use incidentd::flapping::FlappingDetector;
use incidentd::models::{
    AlertRecord, AlertStatus, AlertmanagerWebhook, EmbeddingMatch, FlapWindow, IncidentRecord,
    WebhookAlert,
};
use incidentd::pipeline::AlertPipeline;
use incidentd::repository::{AlertStore, EmbeddingStore, IncidentStore};
use incidentd::resolution::ResolutionOrchestrator;
use incidentd::slack::ChatGateway;

// =============================================================================
// Fixtures
// =============================================================================

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("timestamp fixture")
}

/// The zero timestamp Alertmanager puts on firing deliveries.
pub fn zero_time() -> DateTime<Utc> {
    ts("0001-01-01T00:00:00Z")
}

pub fn alert(fp: &str, status: &str, severity: &str) -> WebhookAlert {
    let mut labels = HashMap::new();
    labels.insert("alertname".to_string(), format!("Alert-{fp}"));
    labels.insert("severity".to_string(), severity.to_string());
    labels.insert("namespace".to_string(), "default".to_string());

    let mut annotations = HashMap::new();
    annotations.insert("description".to_string(), format!("{fp} misbehaving"));

    WebhookAlert {
        status: status.to_string(),
        labels,
        annotations,
        starts_at: ts("2025-01-01T00:00:00Z"),
        ends_at: zero_time(),
        generator_url: "http://prometheus/graph".to_string(),
        fingerprint: fp.to_string(),
    }
}

pub fn firing(fp: &str, severity: &str, starts_at: DateTime<Utc>) -> WebhookAlert {
    let mut a = alert(fp, "firing", severity);
    a.starts_at = starts_at;
    a
}

pub fn resolved(fp: &str, severity: &str, ends_at: DateTime<Utc>) -> WebhookAlert {
    let mut a = alert(fp, "resolved", severity);
    a.ends_at = ends_at;
    a
}

pub fn webhook(alerts: Vec<WebhookAlert>) -> AlertmanagerWebhook {
    let status = alerts
        .first()
        .map_or_else(|| "firing".to_string(), |a| a.status.clone());
    AlertmanagerWebhook {
        version: "4".to_string(),
        group_key: "{}:{}".to_string(),
        truncated_alerts: 0,
        status,
        receiver: "incidentd".to_string(),
        group_labels: HashMap::new(),
        common_labels: HashMap::new(),
        common_annotations: HashMap::new(),
        external_url: "http://alertmanager:9093".to_string(),
        alerts,
    }
}

// =============================================================================
// MemoryStore: AlertStore + IncidentStore + EmbeddingStore
// =============================================================================

#[derive(Debug, Clone)]
pub struct Transition {
    pub alert_id: String,
    pub from_status: String,
    pub to_status: String,
    pub transitioned_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub id: i64,
    pub incident_id: String,
    pub incident_summary: String,
    pub model: String,
    pub vector: Vec<f32>,
}

#[derive(Default)]
pub struct MemoryStore {
    pub alerts: Mutex<HashMap<String, AlertRecord>>,
    pub incidents: Mutex<Vec<IncidentRecord>>,
    pub transitions: Mutex<Vec<Transition>>,
    pub embeddings: Mutex<Vec<StoredEmbedding>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn alert(&self, alert_id: &str) -> Option<AlertRecord> {
        self.alerts.lock().unwrap().get(alert_id).cloned()
    }

    pub fn incident(&self, incident_id: &str) -> Option<IncidentRecord> {
        self.incidents
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.incident_id == incident_id)
            .cloned()
    }

    pub fn incident_count(&self) -> usize {
        self.incidents.lock().unwrap().len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.lock().unwrap().len()
    }

    pub fn embedding_count(&self) -> usize {
        self.embeddings.lock().unwrap().len()
    }

    fn severity_rank(severity: &str) -> i32 {
        match severity {
            "TBD" => 0,
            "info" => 1,
            "warning" => 2,
            "critical" => 3,
            _ => 0,
        }
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn save_alert(&self, alert: &WebhookAlert, incident_id: Option<&str>) -> Result<()> {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.get_mut(&alert.fingerprint) {
            Some(existing) => {
                existing.status = alert.status.clone();
                if existing.incident_id.is_none() {
                    existing.incident_id = incident_id.map(String::from);
                }
            }
            None => {
                alerts.insert(
                    alert.fingerprint.clone(),
                    AlertRecord {
                        alert_id: alert.fingerprint.clone(),
                        incident_id: incident_id.map(String::from),
                        alarm_title: alert.alert_name().to_string(),
                        severity: alert.severity_label().to_string(),
                        status: alert.status.clone(),
                        fired_at: Some(alert.starts_at),
                        resolved_at: None,
                        analysis_summary: String::new(),
                        analysis_detail: String::new(),
                        thread_ref: String::new(),
                        labels: serde_json::to_value(&alert.labels).unwrap(),
                        annotations: serde_json::to_value(&alert.annotations).unwrap(),
                        is_flapping: false,
                        flap_cycle_count: 0,
                        flap_window_start: None,
                        is_enabled: true,
                    },
                );
            }
        }
        Ok(())
    }

    async fn alert_status(&self, alert_id: &str) -> Result<Option<AlertStatus>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .get(alert_id)
            .and_then(|a| a.status.parse().ok()))
    }

    async fn get_alert(&self, alert_id: &str) -> Result<Option<AlertRecord>> {
        Ok(self.alert(alert_id))
    }

    async fn update_alert_resolved(
        &self,
        alert_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(a) = self.alerts.lock().unwrap().get_mut(alert_id) {
            a.status = "resolved".to_string();
            a.resolved_at = Some(resolved_at);
        }
        Ok(())
    }

    async fn is_alert_already_resolved(
        &self,
        alert_id: &str,
        ends_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .get(alert_id)
            .and_then(|a| a.resolved_at)
            .is_some_and(|stored| stored >= ends_at))
    }

    async fn update_alert_thread_ref(&self, alert_id: &str, thread_ref: &str) -> Result<()> {
        if let Some(a) = self.alerts.lock().unwrap().get_mut(alert_id) {
            a.thread_ref = thread_ref.to_string();
        }
        Ok(())
    }

    async fn alert_thread_ref(&self, alert_id: &str) -> Result<Option<String>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .get(alert_id)
            .map(|a| a.thread_ref.clone())
            .filter(|t| !t.is_empty()))
    }

    async fn update_alert_analysis(
        &self,
        alert_id: &str,
        summary: &str,
        detail: &str,
    ) -> Result<()> {
        if let Some(a) = self.alerts.lock().unwrap().get_mut(alert_id) {
            a.analysis_summary = summary.to_string();
            a.analysis_detail = detail.to_string();
        }
        Ok(())
    }

    async fn record_state_transition(
        &self,
        alert_id: &str,
        from: AlertStatus,
        to: AlertStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.transitions.lock().unwrap().push(Transition {
            alert_id: alert_id.to_string(),
            from_status: from.as_str().to_string(),
            to_status: to.as_str().to_string(),
            transitioned_at: at,
        });
        Ok(())
    }

    async fn is_alert_flapping(&self, alert_id: &str) -> Result<bool> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .get(alert_id)
            .is_some_and(|a| a.is_flapping))
    }

    async fn count_flapping_cycles(&self, alert_id: &str, window: Duration) -> Result<FlapWindow> {
        let now = Utc::now();
        let fresh = FlapWindow {
            cycle_count: 1,
            window_start: now,
            opened: true,
        };

        let start = match self
            .alerts
            .lock()
            .unwrap()
            .get(alert_id)
            .and_then(|a| a.flap_window_start)
        {
            None => return Ok(fresh),
            Some(start) if start < now - window => return Ok(fresh),
            Some(start) => start,
        };

        let cycle_count = self
            .transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                t.alert_id == alert_id
                    && t.to_status == "resolved"
                    && t.transitioned_at >= start
            })
            .count() as i64;

        Ok(FlapWindow {
            cycle_count,
            window_start: start,
            opened: false,
        })
    }

    async fn open_flap_window(&self, alert_id: &str, window_start: DateTime<Utc>) -> Result<()> {
        if let Some(a) = self.alerts.lock().unwrap().get_mut(alert_id) {
            a.flap_window_start = Some(window_start);
            a.flap_cycle_count = 1;
        }
        Ok(())
    }

    async fn mark_alert_flapping(
        &self,
        alert_id: &str,
        cycle_count: i64,
        window_start: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(a) = self.alerts.lock().unwrap().get_mut(alert_id) {
            a.is_flapping = true;
            a.flap_cycle_count = cycle_count as i32;
            a.flap_window_start = Some(window_start);
        }
        Ok(())
    }

    async fn clear_alert_flapping(&self, alert_id: &str) -> Result<()> {
        if let Some(a) = self.alerts.lock().unwrap().get_mut(alert_id) {
            a.is_flapping = false;
            a.flap_cycle_count = 0;
            a.flap_window_start = None;
        }
        Ok(())
    }

    async fn update_flap_cycle_count(&self, alert_id: &str, cycle_count: i64) -> Result<()> {
        if let Some(a) = self.alerts.lock().unwrap().get_mut(alert_id) {
            a.flap_cycle_count = cycle_count as i32;
        }
        Ok(())
    }

    async fn has_transitions_since(&self, alert_id: &str, since: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .transitions
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.alert_id == alert_id && t.transitioned_at > since))
    }

    async fn alerts_with_analysis_by_incident(
        &self,
        incident_id: &str,
    ) -> Result<Vec<AlertRecord>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.is_enabled && a.incident_id.as_deref() == Some(incident_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn get_firing_incident(&self) -> Result<Option<IncidentRecord>> {
        Ok(self
            .incidents
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.status == "firing" && i.is_enabled)
            .cloned())
    }

    async fn get_incident(&self, incident_id: &str) -> Result<Option<IncidentRecord>> {
        Ok(self.incident(incident_id))
    }

    async fn create_incident(
        &self,
        title: &str,
        severity: &str,
        fired_at: DateTime<Utc>,
    ) -> Result<String> {
        let mut incidents = self.incidents.lock().unwrap();
        // Mirrors the partial unique index on firing incidents.
        if incidents.iter().any(|i| i.status == "firing" && i.is_enabled) {
            return Err(Error::Conflict(
                "another firing incident already exists".to_string(),
            ));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let incident_id = format!("INC-{n:08x}");
        incidents.push(IncidentRecord {
            incident_id: incident_id.clone(),
            title: title.to_string(),
            severity: severity.to_string(),
            status: "firing".to_string(),
            fired_at,
            resolved_at: None,
            analysis_summary: String::new(),
            analysis_detail: String::new(),
            resolved_by: None,
            is_enabled: true,
        });
        Ok(incident_id)
    }

    async fn update_incident_severity(
        &self,
        incident_id: &str,
        severity: incidentd::models::Severity,
    ) -> Result<()> {
        let mut incidents = self.incidents.lock().unwrap();
        if let Some(i) = incidents.iter_mut().find(|i| i.incident_id == incident_id) {
            if Self::severity_rank(severity.as_str()) > Self::severity_rank(&i.severity) {
                i.severity = severity.as_str().to_string();
            }
        }
        Ok(())
    }

    async fn resolve_incident(&self, incident_id: &str, resolved_by: &str) -> Result<()> {
        let mut incidents = self.incidents.lock().unwrap();
        let Some(i) = incidents.iter_mut().find(|i| i.incident_id == incident_id) else {
            return Err(Error::NotFound(format!("incident {incident_id}")));
        };
        if i.status != "firing" {
            return Err(Error::Conflict(format!(
                "incident {incident_id} is not firing"
            )));
        }
        i.status = "resolved".to_string();
        i.resolved_at = Some(Utc::now());
        i.resolved_by = Some(resolved_by.to_string());
        Ok(())
    }

    async fn update_incident_analysis(
        &self,
        incident_id: &str,
        title: &str,
        summary: &str,
        detail: &str,
    ) -> Result<()> {
        let mut incidents = self.incidents.lock().unwrap();
        if let Some(i) = incidents.iter_mut().find(|i| i.incident_id == incident_id) {
            if !title.is_empty() {
                i.title = title.to_string();
            }
            i.analysis_summary = summary.to_string();
            i.analysis_detail = detail.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    async fn insert_embedding(
        &self,
        incident_id: &str,
        summary: &str,
        model: &str,
        vector: &[f32],
    ) -> Result<i64> {
        let mut embeddings = self.embeddings.lock().unwrap();
        let id = embeddings.len() as i64 + 1;
        embeddings.push(StoredEmbedding {
            id,
            incident_id: incident_id.to_string(),
            incident_summary: summary.to_string(),
            model: model.to_string(),
            vector: vector.to_vec(),
        });
        Ok(id)
    }

    async fn search_embeddings(&self, vector: &[f32], limit: i64) -> Result<Vec<EmbeddingMatch>> {
        let mut hits: Vec<EmbeddingMatch> = self
            .embeddings
            .lock()
            .unwrap()
            .iter()
            .map(|e| EmbeddingMatch {
                incident_id: e.incident_id.clone(),
                incident_summary: e.incident_summary.clone(),
                similarity: cosine(&e.vector, vector),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit as usize);
        Ok(hits)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let na: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

// =============================================================================
// FakeChat
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ChatPost {
    Alert {
        alert_id: String,
        status: String,
        thread_ref: Option<String>,
        ts: String,
    },
    Thread {
        thread_ref: String,
        text: String,
    },
    FlappingDetected {
        alert_id: String,
        cycle_count: i64,
    },
}

#[derive(Default)]
pub struct FakeChat {
    pub posts: Mutex<Vec<ChatPost>>,
    thread_map: Mutex<HashMap<String, String>>,
    next_ts: AtomicI64,
    pub fail_posts: AtomicBool,
    reply_policy: AtomicBool,
}

impl FakeChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_policy(policy: RefireThreadPolicy) -> Arc<Self> {
        let chat = Self::default();
        chat.reply_policy
            .store(policy == RefireThreadPolicy::Reply, Ordering::SeqCst);
        Arc::new(chat)
    }

    pub fn posts(&self) -> Vec<ChatPost> {
        self.posts.lock().unwrap().clone()
    }

    pub fn alert_posts(&self) -> Vec<ChatPost> {
        self.posts()
            .into_iter()
            .filter(|p| matches!(p, ChatPost::Alert { .. }))
            .collect()
    }

    pub fn thread_posts(&self) -> Vec<ChatPost> {
        self.posts()
            .into_iter()
            .filter(|p| matches!(p, ChatPost::Thread { .. }))
            .collect()
    }

    pub fn flapping_posts(&self) -> Vec<ChatPost> {
        self.posts()
            .into_iter()
            .filter(|p| matches!(p, ChatPost::FlappingDetected { .. }))
            .collect()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_posts.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(Error::Chat("provider error: channel_not_found".to_string()));
        }
        Ok(())
    }

    fn alloc_ts(&self) -> String {
        let n = self.next_ts.fetch_add(1, Ordering::SeqCst);
        format!("1700000000.{n:06}")
    }
}

#[async_trait]
impl ChatGateway for FakeChat {
    async fn post_alert(
        &self,
        alert: &WebhookAlert,
        status: AlertStatus,
        _incident_id: Option<&str>,
    ) -> Result<String> {
        self.check_available()?;

        // Mirrors the gateway's thread decision: resolved replies into the
        // known thread, a re-fire only does so under the reply policy.
        let firing_reply = status == AlertStatus::Firing
            && self.reply_policy.load(Ordering::SeqCst)
            && self.load_thread_ref(&alert.fingerprint).is_some();
        let thread_ref = match status {
            AlertStatus::Resolved => self.load_thread_ref(&alert.fingerprint),
            AlertStatus::Firing if firing_reply => self.load_thread_ref(&alert.fingerprint),
            AlertStatus::Firing => None,
        };
        let ts = self.alloc_ts();

        self.posts.lock().unwrap().push(ChatPost::Alert {
            alert_id: alert.fingerprint.clone(),
            status: status.as_str().to_string(),
            thread_ref,
            ts: ts.clone(),
        });

        match status {
            AlertStatus::Firing if !firing_reply => {
                self.store_thread_ref(&alert.fingerprint, &ts);
            }
            AlertStatus::Firing => {}
            AlertStatus::Resolved => self.clear_thread_ref(&alert.fingerprint),
        }
        Ok(ts)
    }

    async fn post_to_thread(&self, thread_ref: &str, text: &str) -> Result<()> {
        self.check_available()?;
        self.posts.lock().unwrap().push(ChatPost::Thread {
            thread_ref: thread_ref.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn post_flapping_detected(
        &self,
        alert: &WebhookAlert,
        _incident_id: Option<&str>,
        cycle_count: i64,
    ) -> Result<()> {
        self.check_available()?;
        self.posts.lock().unwrap().push(ChatPost::FlappingDetected {
            alert_id: alert.fingerprint.clone(),
            cycle_count,
        });
        Ok(())
    }

    fn store_thread_ref(&self, alert_id: &str, thread_ref: &str) {
        self.thread_map
            .lock()
            .unwrap()
            .insert(alert_id.to_string(), thread_ref.to_string());
    }

    fn load_thread_ref(&self, alert_id: &str) -> Option<String> {
        self.thread_map.lock().unwrap().get(alert_id).cloned()
    }

    fn clear_thread_ref(&self, alert_id: &str) {
        self.thread_map.lock().unwrap().remove(alert_id);
    }
}

// =============================================================================
// FakeAgent / FakeEmbedder
// =============================================================================

#[derive(Default)]
pub struct FakeAgent {
    pub analyze_calls: Mutex<Vec<String>>,
    pub summarize_calls: Mutex<Vec<IncidentSummaryRequest>>,
}

impl FakeAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn analyze_count(&self) -> usize {
        self.analyze_calls.lock().unwrap().len()
    }

    pub fn summarize_count(&self) -> usize {
        self.summarize_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AnalysisClient for FakeAgent {
    async fn analyze(
        &self,
        alert: &WebhookAlert,
        thread_ref: &str,
        _incident_id: Option<&str>,
    ) -> Result<AnalysisResponse> {
        self.analyze_calls
            .lock()
            .unwrap()
            .push(alert.fingerprint.clone());
        Ok(AnalysisResponse {
            status: "success".to_string(),
            thread_ts: thread_ref.to_string(),
            analysis: format!("Root cause analysis for {}", alert.fingerprint),
            analysis_summary: format!("{} summary", alert.fingerprint),
            analysis_detail: format!("{} detail", alert.fingerprint),
            context: None,
        })
    }

    async fn summarize(&self, request: &IncidentSummaryRequest) -> Result<IncidentSummaryResponse> {
        self.summarize_calls.lock().unwrap().push(request.clone());
        Ok(IncidentSummaryResponse {
            status: "success".to_string(),
            title: "Pod crash cascade".to_string(),
            summary: format!("{} alerts correlated", request.alerts.len()),
            detail: "Cascading crash loop traced to a bad rollout".to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeEmbedder {
    pub embed_calls: Mutex<Vec<String>>,
}

impl FakeEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<(Vec<f32>, String)> {
        self.embed_calls.lock().unwrap().push(text.to_string());
        // Deterministic toy vector keyed on text length.
        let n = (text.len() % 7) as f32;
        Ok((vec![1.0, n, 0.5], "fake-embedding-001".to_string()))
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chat: Arc<FakeChat>,
    pub agent: Arc<FakeAgent>,
    pub embedder: Arc<FakeEmbedder>,
    pub pipeline: AlertPipeline,
    pub resolution: ResolutionOrchestrator,
}

impl Harness {
    pub fn new(flap: FlapConfig) -> Self {
        Self::with_policy(flap, RefireThreadPolicy::NewRoot)
    }

    pub fn with_policy(flap: FlapConfig, policy: RefireThreadPolicy) -> Self {
        Self::with_store(MemoryStore::new(), flap, policy)
    }

    /// Rebuild the service around an existing store, as a process restart
    /// would: fresh chat gateway (empty thread map), same database.
    pub fn with_store(
        store: Arc<MemoryStore>,
        flap: FlapConfig,
        policy: RefireThreadPolicy,
    ) -> Self {
        let chat = FakeChat::with_policy(policy);
        let agent = FakeAgent::new();
        let embedder = FakeEmbedder::new();

        let alerts: Arc<dyn AlertStore> = store.clone();
        let incidents: Arc<dyn IncidentStore> = store.clone();
        let embeddings: Arc<dyn EmbeddingStore> = store.clone();
        let chat_dyn: Arc<dyn ChatGateway> = chat.clone();
        let agent_dyn: Arc<dyn AnalysisClient> = agent.clone();
        let embedder_dyn: Arc<dyn Embedder> = embedder.clone();

        let correlator = Arc::new(IncidentCorrelator::new(incidents.clone()));
        let flapping = Arc::new(FlappingDetector::new(alerts.clone(), chat_dyn.clone(), flap));

        let pipeline = AlertPipeline::new(
            alerts.clone(),
            chat_dyn,
            agent_dyn.clone(),
            correlator,
            flapping,
            policy,
        );
        let resolution =
            ResolutionOrchestrator::new(alerts, incidents, embeddings, agent_dyn, embedder_dyn);

        Self {
            store,
            chat,
            agent,
            embedder,
            pipeline,
            resolution,
        }
    }

    /// Let detached tasks (analysis, clearance) run.
    pub async fn settle(&self) {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
