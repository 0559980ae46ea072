//! Concurrent likes on one post by distinct actors.

use async_trait::async_trait;
use catalog::Entity;
use common::{ActorId, EntityId};
use store::StoreClient;

use crate::{
    Anomaly, AnomalyDetector, Result, Scenario, ScenarioEnv, StepOutcome, WorkerContext, Workload,
};

/// Every worker is a distinct actor toggling its like on one shared post.
///
/// Each toggle is a membership write plus a counter delta with nothing tying
/// the two together. Once all workers stop, the counter is compared with the
/// membership rows.
#[derive(Debug, Clone)]
pub struct LikeRaceWorkload {
    post: Entity,
    toggles: usize,
}

impl LikeRaceWorkload {
    /// Each worker likes the post once.
    pub fn new() -> Self {
        Self {
            post: Entity::post(ActorId::new(), "Name0", "category0", "likeable post"),
            toggles: 1,
        }
    }

    /// Alternates like and unlike `toggles` times per worker, starting with a
    /// like.
    pub fn with_toggles(mut self, toggles: usize) -> Self {
        self.toggles = toggles;
        self
    }

    pub fn post_id(&self) -> EntityId {
        self.post.id
    }
}

impl Default for LikeRaceWorkload {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> Workload<S> for LikeRaceWorkload
where
    S: StoreClient + Clone + 'static,
{
    type Scenario = LikeRaceScenario;

    fn name(&self) -> &'static str {
        "like-race"
    }

    async fn prepare(&self, env: &ScenarioEnv<S>) -> Result<()> {
        env.coordinator()
            .create(&self.post, env.policy().write)
            .await?;
        Ok(())
    }

    fn scenario(&self, _worker_id: usize) -> LikeRaceScenario {
        LikeRaceScenario {
            post_id: self.post.id,
            remaining: self.toggles,
            liked: false,
        }
    }

    async fn verify(&self, env: &ScenarioEnv<S>, _workers: usize) -> Result<Vec<Anomaly>> {
        let policy = env.policy();
        let value = env
            .counters()
            .current_value(self.post.id, policy.counter)
            .await?;
        let members = env
            .counters()
            .membership_count(self.post.id, policy.read)
            .await?;
        tracing::info!(post_id = %self.post.id, value, members, "like race settled");
        Ok(AnomalyDetector::new()
            .check_counter_drift(self.post.id, value, members)
            .into_iter()
            .collect())
    }
}

pub struct LikeRaceScenario {
    post_id: EntityId,
    remaining: usize,
    liked: bool,
}

#[async_trait]
impl<S> Scenario<S> for LikeRaceScenario
where
    S: StoreClient + Clone + 'static,
{
    async fn step(&mut self, ctx: &mut WorkerContext<S>) -> Result<StepOutcome> {
        if self.remaining == 0 {
            return Ok(StepOutcome::Completed);
        }

        let consistency = ctx.policy().counter;
        let change = if self.liked {
            ctx.counters()
                .decrement(ctx.actor(), self.post_id, consistency)
                .await?
        } else {
            ctx.counters()
                .increment(ctx.actor(), self.post_id, consistency)
                .await?
        };
        tracing::trace!(worker_id = ctx.worker_id(), ?change, "like toggled");
        self.liked = !self.liked;
        self.remaining -= 1;

        if self.remaining == 0 {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::Continue)
        }
    }
}
