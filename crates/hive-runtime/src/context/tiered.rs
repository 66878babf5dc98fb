//! Built-in tiered context manager.
//!
//! Lookups go L1 (per-agent hot entry, TTL-bound) → L2 (shared warm ring,
//! FIFO-evicted) → compute. Entries are keyed by a fingerprint of the parts of
//! the base context that affect enrichment, so a changed agent state always
//! misses.

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use hive_config::ContextConfig;
use hive_core::{AgentId, Result};

use super::{
    AgentProfile, BootstrapOutcome, CacheTier, ContextBootstrapper, ContextEnrichment,
    ContextManager, ContextService, ContextStats, EnrichmentRequest, TemporalContext,
    ThoughtContext,
};

/// Deepest enrichment level this manager knows how to compute.
const MAX_LEVEL: u8 = 3;

/// Memories folded into the summary.
const SUMMARY_MEMORIES: usize = 3;

struct HotEntry {
    fingerprint: u64,
    stored_at: Instant,
    enrichment: ContextEnrichment,
}

pub struct TieredContextManager {
    profiles: DashMap<AgentId, AgentProfile>,
    l1: DashMap<AgentId, HotEntry>,
    l2: Mutex<VecDeque<(AgentId, u64, ContextEnrichment)>>,
    l1_ttl: Duration,
    l2_capacity: usize,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
}

impl TieredContextManager {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            profiles: DashMap::new(),
            l1: DashMap::new(),
            l2: Mutex::new(VecDeque::new()),
            l1_ttl: Duration::from_millis(config.l1_ttl_ms),
            l2_capacity: config.l2_capacity,
            l1_hits: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn fingerprint(base: &ThoughtContext, request: &EnrichmentRequest) -> u64 {
        let mut hasher = DefaultHasher::new();
        request.hash(&mut hasher);
        base.state.status.hash(&mut hasher);
        base.state.extensions.hash(&mut hasher);
        if let Some(ref emotion) = base.state.emotion {
            emotion.current.hash(&mut hasher);
            emotion.intensity.to_bits().hash(&mut hasher);
        }
        for memory in &base.memories {
            memory.id.hash(&mut hasher);
        }
        base.events.len().hash(&mut hasher);
        base.environment.active_agents.hash(&mut hasher);
        base.environment.autonomous_agents.hash(&mut hasher);
        hasher.finish()
    }

    fn lookup_l1(&self, agent_id: &str, fingerprint: u64) -> Option<ContextEnrichment> {
        let entry = self.l1.get(agent_id)?;
        if entry.fingerprint == fingerprint && entry.stored_at.elapsed() < self.l1_ttl {
            Some(entry.enrichment.clone())
        } else {
            None
        }
    }

    fn lookup_l2(&self, agent_id: &str, fingerprint: u64) -> Option<ContextEnrichment> {
        self.l2
            .lock()
            .iter()
            .find(|(id, fp, _)| id == agent_id && *fp == fingerprint)
            .map(|(_, _, enrichment)| enrichment.clone())
    }

    fn store(&self, agent_id: &str, fingerprint: u64, enrichment: &ContextEnrichment) {
        self.l1.insert(
            agent_id.to_string(),
            HotEntry {
                fingerprint,
                stored_at: Instant::now(),
                enrichment: enrichment.clone(),
            },
        );

        if self.l2_capacity == 0 {
            return;
        }
        let mut l2 = self.l2.lock();
        l2.retain(|(id, fp, _)| !(id == agent_id && *fp == fingerprint));
        while l2.len() >= self.l2_capacity {
            l2.pop_front();
        }
        l2.push_back((agent_id.to_string(), fingerprint, enrichment.clone()));
    }

    fn compute(&self, base: &ThoughtContext, request: &EnrichmentRequest) -> ContextEnrichment {
        let max_depth = request.max_depth.min(MAX_LEVEL);
        let mut enrichment = ContextEnrichment {
            memory_summary: None,
            emotional_tone: None,
            temporal: None,
            environment: None,
            depth: 0,
            tier: CacheTier::Computed,
        };

        // Level 1: what the agent remembers.
        if max_depth >= 1 {
            if request.include_memory {
                enrichment.memory_summary = memory_summary(base);
            }
            enrichment.depth = 1;
        }

        // Level 2: how the agent feels and when it is.
        if max_depth >= 2 {
            if request.include_emotional {
                enrichment.emotional_tone = base.state.emotion.as_ref().map(|emotion| {
                    format!("{} {}", intensity_word(emotion.intensity), emotion.current)
                });
            }
            if request.include_temporal {
                enrichment.temporal = Some(temporal_context(base));
            }
            enrichment.depth = 2;
        }

        // Level 3: where the agent is.
        if max_depth >= 3 {
            if request.include_environment {
                let traits = self
                    .profiles
                    .get(&base.agent_id)
                    .map(|p| p.traits.clone())
                    .unwrap_or_default();
                enrichment.environment = Some(serde_json::json!({
                    "active_agents": base.environment.active_agents,
                    "autonomous_agents": base.environment.autonomous_agents,
                    "extensions": base.state.extensions,
                    "portal": base.state.portal,
                    "traits": traits,
                    "pending_events": base.events.len(),
                }));
            }
            enrichment.depth = 3;
        }

        enrichment
    }
}

fn memory_summary(base: &ThoughtContext) -> Option<String> {
    if base.memories.is_empty() {
        return None;
    }
    let mut memories: Vec<_> = base.memories.iter().collect();
    memories.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    let summary = memories
        .iter()
        .take(SUMMARY_MEMORIES)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Some(summary)
}

fn intensity_word(intensity: f32) -> &'static str {
    if intensity >= 0.7 {
        "strongly"
    } else if intensity >= 0.3 {
        "moderately"
    } else {
        "mildly"
    }
}

/// Time-dependent, so never served from cache: recomputed against each base.
fn temporal_context(base: &ThoughtContext) -> TemporalContext {
    TemporalContext {
        time_of_day: time_of_day(base.timestamp).to_string(),
        seconds_since_activity: (base.timestamp - base.state.last_activity)
            .num_seconds()
            .max(0),
    }
}

fn time_of_day(at: DateTime<Utc>) -> &'static str {
    match at.hour() {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=21 => "evening",
        _ => "night",
    }
}

#[async_trait]
impl ContextManager for TieredContextManager {
    async fn enrich(
        &self,
        base: &ThoughtContext,
        request: &EnrichmentRequest,
    ) -> Result<ThoughtContext> {
        let fingerprint = Self::fingerprint(base, request);

        let enrichment = if let Some(mut hit) = self.lookup_l1(&base.agent_id, fingerprint) {
            self.l1_hits.fetch_add(1, Ordering::Relaxed);
            hit.tier = CacheTier::L1;
            hit
        } else if let Some(mut hit) = self.lookup_l2(&base.agent_id, fingerprint) {
            self.l2_hits.fetch_add(1, Ordering::Relaxed);
            // Promote back into the hot tier.
            self.l1.insert(
                base.agent_id.clone(),
                HotEntry {
                    fingerprint,
                    stored_at: Instant::now(),
                    enrichment: hit.clone(),
                },
            );
            hit.tier = CacheTier::L2;
            hit
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            let computed = self.compute(base, request);
            self.store(&base.agent_id, fingerprint, &computed);
            computed
        };

        let mut enrichment = enrichment;
        if enrichment.tier != CacheTier::Computed && enrichment.temporal.is_some() {
            enrichment.temporal = Some(temporal_context(base));
        }

        let mut context = base.clone();
        context.enrichment = Some(enrichment);
        Ok(context)
    }

    async fn register_agent(&self, profile: AgentProfile) -> Result<()> {
        debug!(agent_id = %profile.id, "registering agent with context manager");
        self.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn unregister_agent(&self, agent_id: &str) -> Result<()> {
        self.profiles.remove(agent_id);
        self.l1.remove(agent_id);
        self.l2.lock().retain(|(id, _, _)| id != agent_id);
        Ok(())
    }

    fn stats(&self) -> ContextStats {
        ContextStats {
            registered_agents: self.profiles.len(),
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            l2_entries: self.l2.lock().len(),
        }
    }
}

#[async_trait]
impl ContextService for TieredContextManager {
    async fn shutdown(&self) -> Result<()> {
        self.l1.clear();
        self.l2.lock().clear();
        self.profiles.clear();
        info!("tiered context service stopped");
        Ok(())
    }
}

/// Bootstraps a [`TieredContextManager`] in-process.
pub struct InMemoryContextBootstrapper {
    config: ContextConfig,
    manager: Mutex<Option<Arc<TieredContextManager>>>,
}

impl InMemoryContextBootstrapper {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            manager: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ContextBootstrapper for InMemoryContextBootstrapper {
    async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        let manager = Arc::new(TieredContextManager::new(&self.config));
        *self.manager.lock() = Some(Arc::clone(&manager));
        info!(
            l1_ttl_ms = self.config.l1_ttl_ms,
            l2_capacity = self.config.l2_capacity,
            "tiered context system bootstrapped"
        );
        Ok(BootstrapOutcome {
            success: true,
            context_manager: Some(manager.clone()),
            runtime_adapter: Some(manager),
            error: None,
        })
    }

    async fn shutdown(&self) -> Result<()> {
        self.manager.lock().take();
        Ok(())
    }
}
