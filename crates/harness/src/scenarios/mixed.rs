//! Unbounded randomized mix of every operation.

use std::time::Duration;

use async_trait::async_trait;
use catalog::{Entity, EntityKind};
use common::EntityId;
use coordinator::CoordinatorError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use store::StoreClient;

use crate::{Result, Scenario, StepOutcome, WorkerContext, Workload};

/// Posts are spread over this many shared category partitions.
const CATEGORIES: usize = 3;

/// Newest posts of a category considered when picking a shared target.
const CANDIDATES: usize = 10;

/// Each worker adds, edits and removes its own posts and comments, and
/// comments on, likes and unlikes any worker's posts, pausing between
/// operations.
///
/// Shared targets are read from the `posts_by_category` partitions, so workers
/// contend on the same comment partitions and like counters. Own posts and
/// comments are read back from the worker's `*_by_author` partitions; nothing
/// is remembered in process between steps.
///
/// Unbounded unless [`with_max_steps`](Self::with_max_steps) is set; meant for
/// [`run_for_duration`](crate::ScenarioRunner::run_for_duration).
#[derive(Debug, Clone)]
pub struct MixedWorkload {
    think_time: Duration,
    max_steps: Option<usize>,
    seed: Option<u64>,
}

impl MixedWorkload {
    pub fn new() -> Self {
        Self {
            think_time: Duration::from_millis(100),
            max_steps: None,
            seed: None,
        }
    }

    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Seeds every worker's action choice; worker `n` uses `seed + n`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for MixedWorkload {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> Workload<S> for MixedWorkload
where
    S: StoreClient + Clone + 'static,
{
    type Scenario = MixedScenario;

    fn name(&self) -> &'static str {
        "mixed"
    }

    fn scenario(&self, worker_id: usize) -> MixedScenario {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker_id as u64)),
            None => StdRng::from_entropy(),
        };
        MixedScenario {
            rng,
            author_name: format!("Name{worker_id}"),
            think_time: self.think_time,
            max_steps: self.max_steps,
            steps: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    AddPost,
    EditPost,
    RemovePost,
    AddComment,
    RemoveComment,
    Like,
    Unlike,
}

impl Action {
    const ALL: [Action; 7] = [
        Action::AddPost,
        Action::EditPost,
        Action::RemovePost,
        Action::AddComment,
        Action::RemoveComment,
        Action::Like,
        Action::Unlike,
    ];
}

pub struct MixedScenario {
    rng: StdRng,
    author_name: String,
    think_time: Duration,
    max_steps: Option<usize>,
    steps: usize,
}

impl MixedScenario {
    fn random_category(&mut self) -> String {
        format!("category{}", self.rng.gen_range(0..CATEGORIES))
    }

    /// Newest posts of a random category, written by any worker.
    async fn shared_posts<S>(&mut self, ctx: &WorkerContext<S>) -> Result<Vec<Entity>>
    where
        S: StoreClient + Clone + 'static,
    {
        let category = self.random_category();
        read_partition(ctx, "posts_by_category", category, Some(CANDIDATES)).await
    }

    async fn add_post<S>(&mut self, ctx: &mut WorkerContext<S>) -> Result<()>
    where
        S: StoreClient + Clone + 'static,
    {
        let policy = ctx.policy();
        let category = self.random_category();
        let post = Entity::post(
            ctx.actor(),
            self.author_name.as_str(),
            category,
            format!("abc{}", self.steps),
        );
        ctx.coordinator().create(&post, policy.write).await?;

        let locator = ctx.env().view_key("posts_by_id", post.id)?;
        let found = ctx
            .coordinator()
            .read_one(&locator, post.id, policy.read)
            .await?;
        ctx.record(ctx.detector().check_count_match(post.id, 1, usize::from(found.is_some())));
        Ok(())
    }

    async fn edit_post<S>(&mut self, ctx: &mut WorkerContext<S>) -> Result<bool>
    where
        S: StoreClient + Clone + 'static,
    {
        let own = read_partition(ctx, "posts_by_author", ctx.actor().to_string(), None).await?;
        let Some(post_id) = own.choose(&mut self.rng).map(|p| p.id) else {
            return Ok(false);
        };

        let policy = ctx.policy();
        let content = format!("edited{}", self.steps);
        let outcome = match ctx
            .coordinator()
            .edit(EntityKind::Post, post_id, &content, policy.write)
            .await
        {
            Ok(outcome) => outcome,
            Err(CoordinatorError::NotFound { .. }) => {
                ctx.record(ctx.detector().check_count_match(post_id, 1, 0));
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        };
        if !outcome.is_applied() {
            return Ok(true);
        }

        let key = ctx.env().view_key("posts_by_author", ctx.actor())?;
        let edited = ctx
            .coordinator()
            .read_one(&key, post_id, policy.read)
            .await?
            .is_some_and(|post| post.content == content);
        ctx.record(ctx.detector().check_count_match(post_id, 1, usize::from(edited)));
        Ok(true)
    }

    async fn remove_own<S>(
        &mut self,
        ctx: &mut WorkerContext<S>,
        kind: EntityKind,
        view: &str,
    ) -> Result<bool>
    where
        S: StoreClient + Clone + 'static,
    {
        let own = read_partition(ctx, view, ctx.actor().to_string(), None).await?;
        let Some(entity_id) = own.choose(&mut self.rng).map(|e| e.id) else {
            return Ok(false);
        };
        remove(ctx, kind, entity_id, view).await?;
        Ok(true)
    }

    async fn add_comment<S>(&mut self, ctx: &mut WorkerContext<S>) -> Result<bool>
    where
        S: StoreClient + Clone + 'static,
    {
        let shared = self.shared_posts(ctx).await?;
        let Some(post_id) = shared.choose(&mut self.rng).map(|p| p.id) else {
            return Ok(false);
        };

        let policy = ctx.policy();
        let comment = Entity::comment(
            post_id,
            ctx.actor(),
            self.author_name.as_str(),
            format!("comment{}", self.steps),
        );
        ctx.coordinator().create(&comment, policy.write).await?;

        let key = ctx.env().view_key("comments_by_post", post_id)?;
        let found = ctx
            .coordinator()
            .read_one(&key, comment.id, policy.read)
            .await?;
        ctx.record(ctx.detector().check_count_match(comment.id, 1, usize::from(found.is_some())));
        Ok(true)
    }

    async fn like<S>(&mut self, ctx: &mut WorkerContext<S>) -> Result<bool>
    where
        S: StoreClient + Clone + 'static,
    {
        let shared = self.shared_posts(ctx).await?;
        let Some(post_id) = shared.choose(&mut self.rng).map(|p| p.id) else {
            return Ok(false);
        };
        ctx.counters()
            .increment(ctx.actor(), post_id, ctx.policy().counter)
            .await?;
        check_drift(ctx, post_id).await?;
        Ok(true)
    }

    /// Unlikes one of the sampled shared posts this worker has liked.
    async fn unlike<S>(&mut self, ctx: &mut WorkerContext<S>) -> Result<bool>
    where
        S: StoreClient + Clone + 'static,
    {
        let mut shared = self.shared_posts(ctx).await?;
        shared.shuffle(&mut self.rng);

        let policy = ctx.policy();
        for post in shared {
            if ctx
                .counters()
                .has_membership(ctx.actor(), post.id, policy.read)
                .await?
            {
                ctx.counters()
                    .decrement(ctx.actor(), post.id, policy.counter)
                    .await?;
                check_drift(ctx, post.id).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl<S> Scenario<S> for MixedScenario
where
    S: StoreClient + Clone + 'static,
{
    async fn step(&mut self, ctx: &mut WorkerContext<S>) -> Result<StepOutcome> {
        if let Some(max_steps) = self.max_steps
            && self.steps >= max_steps
        {
            return Ok(StepOutcome::Completed);
        }

        let action = Action::ALL[self.rng.gen_range(0..Action::ALL.len())];
        tracing::trace!(worker_id = ctx.worker_id(), ?action, "mixed step");
        let acted = match action {
            Action::AddPost => {
                self.add_post(ctx).await?;
                true
            }
            Action::EditPost => self.edit_post(ctx).await?,
            Action::RemovePost => {
                self.remove_own(ctx, EntityKind::Post, "posts_by_author")
                    .await?
            }
            Action::AddComment => self.add_comment(ctx).await?,
            Action::RemoveComment => {
                self.remove_own(ctx, EntityKind::Comment, "comments_by_author")
                    .await?
            }
            Action::Like => self.like(ctx).await?,
            Action::Unlike => self.unlike(ctx).await?,
        };
        // Nothing to act on yet.
        if !acted {
            self.add_post(ctx).await?;
        }
        self.steps += 1;

        ctx.pause(self.think_time).await;
        Ok(StepOutcome::Continue)
    }
}

async fn read_partition<S>(
    ctx: &WorkerContext<S>,
    view: &str,
    partition: String,
    limit: Option<usize>,
) -> Result<Vec<Entity>>
where
    S: StoreClient + Clone + 'static,
{
    let key = ctx.env().view_key(view, partition)?;
    Ok(ctx
        .coordinator()
        .read_view(&key, ctx.policy().read, limit)?
        .fetch()
        .await?)
}

/// Deletes an entity and checks that `view` no longer shows it.
async fn remove<S>(
    ctx: &mut WorkerContext<S>,
    kind: EntityKind,
    entity_id: EntityId,
    view: &str,
) -> Result<()>
where
    S: StoreClient + Clone + 'static,
{
    let policy = ctx.policy();
    let outcome = match ctx
        .coordinator()
        .delete(kind, entity_id, policy.write)
        .await
    {
        Ok(outcome) => outcome,
        Err(CoordinatorError::NotFound { .. }) => {
            ctx.record(ctx.detector().check_count_match(entity_id, 1, 0));
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if !outcome.is_applied() {
        return Ok(());
    }

    let observed = read_partition(ctx, view, ctx.actor().to_string(), None).await?;
    ctx.record(ctx.detector().check_deletion_visible(entity_id, &observed));
    Ok(())
}

/// Compares a shared like counter with its memberships. Other workers may be
/// between their membership write and their delta, which shows up as drift.
async fn check_drift<S>(ctx: &WorkerContext<S>, post_id: EntityId) -> Result<()>
where
    S: StoreClient + Clone + 'static,
{
    let policy = ctx.policy();
    let value = ctx
        .counters()
        .current_value(post_id, policy.counter)
        .await?;
    let members = ctx
        .counters()
        .membership_count(post_id, policy.read)
        .await?;
    ctx.record(ctx.detector().check_counter_drift(post_id, value, members));
    Ok(())
}
