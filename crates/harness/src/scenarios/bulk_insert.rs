//! One author creates posts and reads them back after every insert.

use async_trait::async_trait;
use catalog::Entity;
use store::StoreClient;

use crate::{Result, Scenario, StepOutcome, WorkerContext, Workload};

/// Each worker is an author creating `posts` posts in sequence.
///
/// After the i-th insert the author's `posts_by_author` partition must hold
/// exactly i rows; anything else is a count mismatch.
#[derive(Debug, Clone)]
pub struct BulkInsertWorkload {
    posts: usize,
}

impl BulkInsertWorkload {
    pub fn new(posts: usize) -> Self {
        Self { posts }
    }
}

impl Default for BulkInsertWorkload {
    fn default() -> Self {
        Self::new(20)
    }
}

#[async_trait]
impl<S> Workload<S> for BulkInsertWorkload
where
    S: StoreClient + Clone + 'static,
{
    type Scenario = BulkInsertScenario;

    fn name(&self) -> &'static str {
        "bulk-insert"
    }

    fn scenario(&self, worker_id: usize) -> BulkInsertScenario {
        BulkInsertScenario {
            author_name: format!("Name{worker_id}"),
            posts: self.posts,
            created: 0,
        }
    }
}

pub struct BulkInsertScenario {
    author_name: String,
    posts: usize,
    created: usize,
}

#[async_trait]
impl<S> Scenario<S> for BulkInsertScenario
where
    S: StoreClient + Clone + 'static,
{
    async fn step(&mut self, ctx: &mut WorkerContext<S>) -> Result<StepOutcome> {
        if self.created >= self.posts {
            return Ok(StepOutcome::Completed);
        }

        let policy = ctx.policy();
        let post = Entity::post(
            ctx.actor(),
            self.author_name.as_str(),
            format!("category{}", self.created % 3),
            format!("abc{}", self.created),
        );
        ctx.coordinator().create(&post, policy.write).await?;
        self.created += 1;

        let key = ctx.env().view_key("posts_by_author", ctx.actor())?;
        let observed = ctx
            .coordinator()
            .read_view(&key, policy.read, None)?
            .count()
            .await?;
        ctx.record(ctx.detector().check_count_match(post.id, self.created, observed));

        if self.created >= self.posts {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::Continue)
        }
    }
}
