use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::bail;
use crate::error::{ErrorKind, FeedError, FeedResult};
use crate::registry::RangeRegistry;
use crate::source::ChangeFeedSource;
use crate::store::backend::CheckpointBackend;
use crate::types::{
    COMPLETION_MARKER, COMPLETION_MARKER_TOKEN, Checkpoint, RangeId, ResumeToken, TargetId,
};

/// Initialization state of a target's checkpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TargetState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    /// Checkpoint rows exist but initialization never completed. Terminal.
    Corrupt,
}

#[derive(Debug, Default)]
struct TargetCheckpoints {
    state: TargetState,
    tokens: BTreeMap<RangeId, Option<ResumeToken>>,
}

#[derive(Debug, Default)]
struct Inner {
    targets: HashMap<TargetId, TargetCheckpoints>,
}

/// Crash consistent bookkeeping of every range's resume token.
///
/// A target is initialized by writing one checkpoint per range and then the completion marker,
/// so the presence of the marker proves every range row was durably written. Tokens are read
/// from memory and written through to the backend before memory is updated.
///
/// Each range's token is only ever written by the worker owning that range.
#[derive(Debug, Clone)]
pub struct CheckpointStore<B> {
    backend: B,
    inner: Arc<RwLock<Inner>>,
}

impl<B> CheckpointStore<B>
where
    B: CheckpointBackend,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Loads the checkpoints of `target`, creating them for a target seen for the first time.
    ///
    /// Fails with [`ErrorKind::CorruptCheckpoints`] when rows exist without the completion
    /// marker. In that case nothing is written and the target stays corrupt for the run.
    pub async fn initialize<S>(
        &self,
        target: &TargetId,
        registry: &RangeRegistry<S>,
    ) -> FeedResult<()>
    where
        S: ChangeFeedSource,
    {
        let previous_state = {
            let mut inner = self.inner.write().await;
            let checkpoints = inner.targets.entry(target.clone()).or_default();
            match checkpoints.state {
                TargetState::Corrupt => {
                    bail!(
                        ErrorKind::CorruptCheckpoints,
                        "Checkpoints of the target were found corrupt",
                        format!("target '{target}'")
                    );
                }
                TargetState::Initializing => {
                    bail!(
                        ErrorKind::InvalidState,
                        "Checkpoints of the target are already being initialized",
                        format!("target '{target}'")
                    );
                }
                state @ (TargetState::Uninitialized | TargetState::Ready) => {
                    checkpoints.state = TargetState::Initializing;
                    state
                }
            }
        };

        let result = self.load_or_create(target, registry).await;

        let mut inner = self.inner.write().await;
        let checkpoints = inner.targets.entry(target.clone()).or_default();
        match result {
            Ok(tokens) => {
                info!(%target, ranges = tokens.len(), "checkpoints are ready");
                checkpoints.tokens = tokens;
                checkpoints.state = TargetState::Ready;

                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::CorruptCheckpoints => {
                error!(%target, error = %err, "checkpoints are corrupt");
                checkpoints.tokens.clear();
                checkpoints.state = TargetState::Corrupt;

                Err(err)
            }
            Err(err) => {
                checkpoints.state = previous_state;

                Err(err)
            }
        }
    }

    async fn load_or_create<S>(
        &self,
        target: &TargetId,
        registry: &RangeRegistry<S>,
    ) -> FeedResult<BTreeMap<RangeId, Option<ResumeToken>>>
    where
        S: ChangeFeedSource,
    {
        let rows = self.backend.read_all(target).await?;

        if rows.is_empty() {
            return self.create(target, registry).await;
        }

        let mut marker_found = false;
        let mut tokens = BTreeMap::new();
        for (range, token) in rows {
            if range.as_str() == COMPLETION_MARKER {
                marker_found = true;
            } else {
                tokens.insert(range, token);
            }
        }

        if !marker_found {
            bail!(
                ErrorKind::CorruptCheckpoints,
                "Checkpoints exist without a completion marker",
                format!(
                    "target '{target}' has {} checkpoint rows but a previous initialization was interrupted",
                    tokens.len()
                )
            );
        }

        if tokens.is_empty() {
            bail!(
                ErrorKind::CorruptCheckpoints,
                "Completion marker exists without range checkpoints",
                format!("target '{target}'")
            );
        }

        debug!(%target, ranges = tokens.len(), "loaded existing checkpoints");

        Ok(tokens)
    }

    async fn create<S>(
        &self,
        target: &TargetId,
        registry: &RangeRegistry<S>,
    ) -> FeedResult<BTreeMap<RangeId, Option<ResumeToken>>>
    where
        S: ChangeFeedSource,
    {
        let ranges = registry.discover(target).await?;

        let mut tokens = BTreeMap::new();
        for range in ranges {
            self.backend.upsert(target, &range, None).await?;
            tokens.insert(range, None);
        }

        // Written last, its presence proves every range row above is durable.
        let marker = RangeId::new(COMPLETION_MARKER);
        let marker_token = ResumeToken::new(COMPLETION_MARKER_TOKEN);
        self.backend
            .upsert(target, &marker, Some(&marker_token))
            .await?;

        info!(%target, ranges = tokens.len(), "created checkpoints for a new target");

        Ok(tokens)
    }

    /// Returns the checkpoint of a range of a ready target.
    ///
    /// A null or missing token yields [`Checkpoint::StartOfStream`].
    pub async fn get_token(&self, target: &TargetId, range: &RangeId) -> FeedResult<Checkpoint> {
        let inner = self.inner.read().await;
        let checkpoints = ready_checkpoints(&inner, target)?;

        Ok(checkpoints.tokens.get(range).cloned().flatten().into())
    }

    /// Durably stores `token` for a range, then updates the in-memory view.
    ///
    /// Must only be called by the worker owning the range, after the page that produced the token
    /// was fully drained.
    pub async fn set_token(
        &self,
        target: &TargetId,
        range: &RangeId,
        token: ResumeToken,
    ) -> FeedResult<()> {
        {
            let inner = self.inner.read().await;
            let checkpoints = ready_checkpoints(&inner, target)?;
            if !checkpoints.tokens.contains_key(range) {
                bail!(
                    ErrorKind::InvalidState,
                    "Range has no checkpoint",
                    format!("target '{target}', range '{range}'")
                );
            }
        }

        self.backend.upsert(target, range, Some(&token)).await?;

        let mut inner = self.inner.write().await;
        if let Some(checkpoints) = inner.targets.get_mut(target) {
            checkpoints.tokens.insert(range.clone(), Some(token));
        }

        Ok(())
    }

    /// Returns the ranges of a ready target, ordered by range id.
    pub async fn ranges(&self, target: &TargetId) -> FeedResult<Vec<RangeId>> {
        let inner = self.inner.read().await;
        let checkpoints = ready_checkpoints(&inner, target)?;

        Ok(checkpoints.tokens.keys().cloned().collect())
    }

    /// Returns a snapshot of the tokens of a ready target.
    pub async fn checkpoints(
        &self,
        target: &TargetId,
    ) -> FeedResult<BTreeMap<RangeId, Option<ResumeToken>>> {
        let inner = self.inner.read().await;
        let checkpoints = ready_checkpoints(&inner, target)?;

        Ok(checkpoints.tokens.clone())
    }

    pub async fn target_state(&self, target: &TargetId) -> TargetState {
        let inner = self.inner.read().await;
        inner
            .targets
            .get(target)
            .map(|checkpoints| checkpoints.state)
            .unwrap_or_default()
    }
}

fn ready_checkpoints<'a>(
    inner: &'a Inner,
    target: &TargetId,
) -> Result<&'a TargetCheckpoints, FeedError> {
    match inner.targets.get(target) {
        Some(checkpoints) if checkpoints.state == TargetState::Ready => Ok(checkpoints),
        Some(checkpoints) => {
            bail!(
                ErrorKind::InvalidState,
                "Checkpoints of the target are not ready",
                format!("target '{target}' is {:?}", checkpoints.state)
            );
        }
        None => {
            bail!(
                ErrorKind::InvalidState,
                "Checkpoints of the target were never initialized",
                format!("target '{target}'")
            );
        }
    }
}
