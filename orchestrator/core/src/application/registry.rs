// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Concurrent directory of live agents.
//!
//! The registry is the only structure shared between the orchestrator and
//! presentation. Every membership change is announced on the [`EventBus`] as
//! a [`RegistryEvent`], so observers never poll agent internals.

use crate::application::agent::Agent;
use crate::domain::agent::{AgentId, TickOutcome};
use crate::domain::events::RegistryEvent;
use crate::domain::runtime::RuntimeError;
use crate::infrastructure::event_bus::EventBus;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

pub struct AgentRegistry {
    agents: DashMap<AgentId, Arc<Agent>>,
    bus: EventBus,
}

impl AgentRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            agents: DashMap::new(),
            bus,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn add(&self, agent: Agent) -> Arc<Agent> {
        let agent = Arc::new(agent);
        self.agents.insert(agent.id(), agent.clone());
        debug!(agent = %agent.name(), id = %agent.id(), "Agent registered");
        self.bus.publish_registry_event(RegistryEvent::Added {
            agent_id: agent.id(),
            name: agent.name().to_string(),
            role: agent.role(),
        });
        agent
    }

    pub fn get(&self, id: AgentId) -> Option<Arc<Agent>> {
        self.agents.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    /// Unregister and shut down the agent (process and reader).
    pub async fn remove(&self, id: AgentId) -> Option<Arc<Agent>> {
        let (_, agent) = self.agents.remove(&id)?;
        agent.shutdown().await;
        debug!(agent = %agent.name(), id = %id, "Agent removed");
        self.bus.publish_registry_event(RegistryEvent::Removed {
            agent_id: id,
            name: agent.name().to_string(),
        });
        Some(agent)
    }

    /// Stop the agent's process but keep it registered.
    pub async fn stop(&self, id: AgentId) -> Result<(), RuntimeError> {
        let agent = self
            .get(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        agent.stop().await;
        self.bus.publish_registry_event(RegistryEvent::Stopped {
            agent_id: id,
            name: agent.name().to_string(),
        });
        Ok(())
    }

    /// Remove every agent, announcing each removal.
    pub async fn clear(&self) {
        let ids: Vec<AgentId> = self.agents.iter().map(|entry| *entry.key()).collect();
        join_all(ids.into_iter().map(|id| self.remove(id))).await;
    }

    /// Snapshot of registered agents, ordered by name.
    pub fn list(&self) -> Vec<Arc<Agent>> {
        let mut agents: Vec<Arc<Agent>> = self.agents.iter().map(|e| e.value().clone()).collect();
        agents.sort_by(|a, b| a.name().cmp(b.name()));
        agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Run one liveness check on every agent concurrently.
    pub async fn tick_all(&self) -> Vec<(AgentId, Result<TickOutcome, RuntimeError>)> {
        let agents = self.list();
        join_all(agents.iter().map(|agent| async move { (agent.id(), agent.tick().await) })).await
    }
}
