//! Create a post, delete it, then look for it.

use async_trait::async_trait;
use catalog::{Entity, EntityKind};
use coordinator::CoordinatorError;
use store::StoreClient;

use crate::{Result, Scenario, StepOutcome, WorkerContext, Workload};

/// Each round creates a post, deletes it and immediately reads every view of
/// the post group. A view still returning the post after a fully applied
/// delete is a visible deletion.
#[derive(Debug, Clone)]
pub struct CreateDeleteWorkload {
    rounds: usize,
}

impl CreateDeleteWorkload {
    pub fn new(rounds: usize) -> Self {
        Self { rounds }
    }
}

impl Default for CreateDeleteWorkload {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl<S> Workload<S> for CreateDeleteWorkload
where
    S: StoreClient + Clone + 'static,
{
    type Scenario = CreateDeleteScenario;

    fn name(&self) -> &'static str {
        "create-delete"
    }

    fn scenario(&self, worker_id: usize) -> CreateDeleteScenario {
        CreateDeleteScenario {
            author_name: format!("Name{worker_id}"),
            remaining: self.rounds,
        }
    }
}

pub struct CreateDeleteScenario {
    author_name: String,
    remaining: usize,
}

#[async_trait]
impl<S> Scenario<S> for CreateDeleteScenario
where
    S: StoreClient + Clone + 'static,
{
    async fn step(&mut self, ctx: &mut WorkerContext<S>) -> Result<StepOutcome> {
        if self.remaining == 0 {
            return Ok(StepOutcome::Completed);
        }
        self.remaining -= 1;

        let policy = ctx.policy();
        let post = Entity::post(
            ctx.actor(),
            self.author_name.as_str(),
            "category1",
            "short-lived",
        );
        ctx.coordinator().create(&post, policy.write).await?;

        match ctx
            .coordinator()
            .delete(EntityKind::Post, post.id, policy.write)
            .await
        {
            Ok(outcome) if outcome.is_applied() => {
                let keys = ctx
                    .env()
                    .catalog()
                    .views_for(EntityKind::Post)?
                    .iter()
                    .map(|view| view.view_key(&post))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                for key in keys {
                    let observed = ctx
                        .coordinator()
                        .read_view(&key, policy.read, None)?
                        .fetch()
                        .await?;
                    ctx.record(ctx.detector().check_deletion_visible(post.id, &observed));
                }
            }
            // Views that refused the delete are expected to still show the post.
            Ok(_) => {}
            // The worker's own create was not visible through the locator view.
            Err(CoordinatorError::NotFound { .. }) => {
                ctx.record(ctx.detector().check_count_match(post.id, 1, 0));
            }
            Err(e) => return Err(e.into()),
        }

        if self.remaining == 0 {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::Continue)
        }
    }
}
