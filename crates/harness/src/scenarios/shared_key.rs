//! Many workers comment on one shared post.

use async_trait::async_trait;
use catalog::Entity;
use common::{ActorId, EntityId};
use store::StoreClient;

use crate::{
    Anomaly, AnomalyDetector, Result, Scenario, ScenarioEnv, StepOutcome, WorkerContext, Workload,
};

/// Every worker writes comments to the same post partition.
///
/// Workers check their own `comments_by_author` partition after each write.
/// Once all workers stop, the shared `comments_by_post` partition must hold
/// every comment of every worker; a lost or partial fan-out into it shows up as
/// a count mismatch. The check assumes workers ran to completion.
#[derive(Debug, Clone)]
pub struct SharedKeyWorkload {
    post: Entity,
    comments_per_worker: usize,
}

impl SharedKeyWorkload {
    pub fn new(comments_per_worker: usize) -> Self {
        Self {
            post: Entity::post(ActorId::new(), "Name0", "category0", "shared post"),
            comments_per_worker,
        }
    }

    pub fn post_id(&self) -> EntityId {
        self.post.id
    }
}

impl Default for SharedKeyWorkload {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl<S> Workload<S> for SharedKeyWorkload
where
    S: StoreClient + Clone + 'static,
{
    type Scenario = SharedKeyScenario;

    fn name(&self) -> &'static str {
        "shared-key"
    }

    async fn prepare(&self, env: &ScenarioEnv<S>) -> Result<()> {
        env.coordinator()
            .create(&self.post, env.policy().write)
            .await?;
        Ok(())
    }

    fn scenario(&self, worker_id: usize) -> SharedKeyScenario {
        SharedKeyScenario {
            post_id: self.post.id,
            author_name: format!("Name{worker_id}"),
            remaining: self.comments_per_worker,
            written: 0,
        }
    }

    async fn verify(&self, env: &ScenarioEnv<S>, workers: usize) -> Result<Vec<Anomaly>> {
        let key = env.view_key("comments_by_post", self.post.id)?;
        let observed = env
            .coordinator()
            .read_view(&key, env.policy().read, None)?
            .count()
            .await?;
        let expected = workers * self.comments_per_worker;
        Ok(AnomalyDetector::new()
            .check_count_match(self.post.id, expected, observed)
            .into_iter()
            .collect())
    }
}

pub struct SharedKeyScenario {
    post_id: EntityId,
    author_name: String,
    remaining: usize,
    written: usize,
}

#[async_trait]
impl<S> Scenario<S> for SharedKeyScenario
where
    S: StoreClient + Clone + 'static,
{
    async fn step(&mut self, ctx: &mut WorkerContext<S>) -> Result<StepOutcome> {
        if self.remaining == 0 {
            return Ok(StepOutcome::Completed);
        }

        let policy = ctx.policy();
        let comment = Entity::comment(
            self.post_id,
            ctx.actor(),
            self.author_name.as_str(),
            format!("comment{}", self.written),
        );
        ctx.coordinator().create(&comment, policy.write).await?;
        self.written += 1;
        self.remaining -= 1;

        let key = ctx.env().view_key("comments_by_author", ctx.actor())?;
        let observed = ctx
            .coordinator()
            .read_view(&key, policy.read, None)?
            .count()
            .await?;
        ctx.record(ctx.detector().check_count_match(comment.id, self.written, observed));

        if self.remaining == 0 {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::Continue)
        }
    }
}
