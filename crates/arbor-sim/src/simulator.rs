//! Drives one seeded run: random store operations against a
//! [`MemoryBackend`] that rejects writes at a configured rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Context, Result, bail};
use arbor_core::config::ArborConfig;
use arbor_core::error::StoreError;
use arbor_core::model::{
    Category, CategoryId, CategoryKind, Content, ContentId, Domain, OwnerScope,
};
use arbor_core::order::Position;
use arbor_core::persist::MemoryBackend;
use arbor_core::store::{CategoryStore, ContentDraft, Snapshot, StoreEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::Receiver;

use crate::oracle::{self, InvariantViolation};
use crate::rng::DeterministicRng;

/// Scope every simulated forest lives in.
pub const SIM_SCOPE: OwnerScope = OwnerScope::new(1, Domain::Note);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Operations issued per run.
    pub steps: usize,
    pub initial_categories: usize,
    pub initial_contents: usize,
    /// Chance (percent, 0-100) that an operation has one of its writes
    /// rejected.
    pub fault_percent: u8,
    #[serde(default)]
    pub arbor: ArborConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            steps: 200,
            initial_categories: 12,
            initial_contents: 24,
            fault_percent: 10,
            arbor: ArborConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if a parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            bail!("steps must be > 0");
        }
        if self.fault_percent > 100 {
            bail!("fault_percent must be <= 100");
        }
        self.arbor.validate()
    }
}

/// An operation the simulator issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SimOp {
    MoveCategory {
        moving: CategoryId,
        target: CategoryId,
        position: Position,
    },
    MoveContent {
        moving: ContentId,
        target: ContentId,
        position: Position,
    },
    Recategorize {
        content: ContentId,
        category: CategoryId,
    },
    CreateCategory {
        parent: Option<CategoryId>,
        name: String,
    },
    CreateContent {
        category: CategoryId,
        title: String,
    },
    RenameCategory {
        id: CategoryId,
        name: String,
    },
    DeactivateCategory {
        id: CategoryId,
    },
    DeactivateContent {
        id: ContentId,
    },
    DeleteCategory {
        id: CategoryId,
    },
    DeleteContent {
        id: ContentId,
    },
    Reload,
}

/// How the store answered one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    /// Persistence failed and the optimistic change was undone.
    RolledBack { error: String },
    /// Rejected before any state change, with its error code.
    Rejected { code: String },
    /// Anything else; always an invariant violation in a sequential run.
    Failed { error: String },
}

impl StepOutcome {
    fn from_result(result: Result<(), StoreError>) -> Self {
        match result {
            Ok(()) => Self::Applied,
            Err(err) if err.is_local() => Self::Rejected {
                code: err.code().code().to_string(),
            },
            Err(err @ StoreError::PersistenceFailure(_)) => Self::RolledBack {
                error: err.to_string(),
            },
            Err(err) => Self::Failed {
                error: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: usize,
    pub op: SimOp,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEntry>,
    pub violations: Vec<InvariantViolation>,
    pub faults_injected: usize,
    pub final_categories: usize,
    pub final_contents: usize,
}

impl SimulationResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    #[must_use]
    pub fn rolled_back(&self) -> usize {
        self.trace
            .iter()
            .filter(|e| matches!(e.outcome, StepOutcome::RolledBack { .. }))
            .count()
    }
}

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    backend: Arc<MemoryBackend>,
    armed: Arc<AtomicBool>,
    faults: Arc<AtomicUsize>,
}

impl Simulator {
    /// A simulator with a seeded backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = DeterministicRng::new(config.seed);
        let (categories, contents) = seed_records(&config, &mut rng);
        tracing::debug!(
            seed = config.seed,
            categories = categories.len(),
            contents = contents.len(),
            "seeded simulation backend"
        );
        Ok(Self {
            backend: Arc::new(MemoryBackend::seeded(SIM_SCOPE, categories, contents)),
            rng,
            config,
            armed: Arc::new(AtomicBool::new(false)),
            faults: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Run every step on a single-threaded runtime, then reload with faults
    /// disabled and compare.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot start or a load fails.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("build simulation runtime")?;
        runtime.block_on(self.drive())
    }

    async fn drive(&mut self) -> Result<SimulationResult> {
        self.install_faults();
        let store = CategoryStore::new(
            Arc::clone(&self.backend),
            SIM_SCOPE,
            self.config.arbor.clone(),
        );
        store.load(SIM_SCOPE).await.context("initial load")?;
        let mut events = store.subscribe();

        let mut trace = Vec::with_capacity(self.config.steps);
        let mut violations = Vec::new();
        for step in 0..self.config.steps {
            let before = store.snapshot();
            let writes_before = self.backend.writes();
            let op = self.next_op(step, &before);

            self.armed.store(true, Ordering::SeqCst);
            let outcome = StepOutcome::from_result(execute(&store, &op).await);
            self.armed.store(false, Ordering::SeqCst);

            let after = store.snapshot();
            violations.extend(oracle::check_step(
                step,
                &outcome,
                &before,
                &after,
                (writes_before, self.backend.writes()),
                drain_rollbacks(&mut events),
            ));
            violations.extend(oracle::check_forest(step, after.forest()));
            violations.extend(oracle::check_mirror(
                step,
                &after,
                &self.backend.categories(&SIM_SCOPE),
                &self.backend.contents(&SIM_SCOPE),
            ));
            tracing::trace!(step, ?op, ?outcome, "simulated step");
            trace.push(TraceEntry { step, op, outcome });
        }

        self.backend.clear_fault_hook();
        let settled = store.snapshot();
        store.load(SIM_SCOPE).await.context("final reload")?;
        let reloaded = store.snapshot();
        violations.extend(oracle::check_convergence(&settled, &reloaded));

        let result = SimulationResult {
            seed: self.config.seed,
            trace,
            violations,
            faults_injected: self.faults.load(Ordering::SeqCst),
            final_categories: reloaded.forest().len(),
            final_contents: reloaded.contents().len(),
        };
        tracing::debug!(
            seed = result.seed,
            faults = result.faults_injected,
            rolled_back = result.rolled_back(),
            violations = result.violations.len(),
            "simulation finished"
        );
        Ok(result)
    }

    /// Reject at most one write per armed operation, so the compensating
    /// writes of a partial failure always land.
    fn install_faults(&self) {
        let mut rng = self.rng.fork(0xFA17);
        let percent = self.config.fault_percent;
        let armed = Arc::clone(&self.armed);
        let faults = Arc::clone(&self.faults);
        self.backend.set_fault_hook(move |op| {
            if !armed.load(Ordering::SeqCst) || !rng.hit_rate_percent(percent) {
                return false;
            }
            armed.store(false, Ordering::SeqCst);
            faults.fetch_add(1, Ordering::SeqCst);
            tracing::trace!(?op, "injecting write fault");
            true
        });
    }

    fn next_op(&mut self, step: usize, snapshot: &Snapshot) -> SimOp {
        let categories: Vec<CategoryId> = snapshot.forest().categories().map(|c| c.id).collect();
        let contents: Vec<&Content> = categories
            .iter()
            .flat_map(|id| snapshot.contents().list(*id))
            .collect();
        let roll = self.rng.next_bounded(100);
        let op = match roll {
            0..=29 => self.category_move(&categories),
            30..=47 => self.content_move(snapshot, &contents),
            48..=55 => self.recategorize(&categories, &contents),
            56..=65 => Some(self.create_category(step, &categories)),
            66..=75 => self.rng.pick(&categories).map(|category| SimOp::CreateContent {
                category,
                title: format!("item-{step}"),
            }),
            76..=82 => self.rename(step, &categories),
            83..=86 if categories.len() > 4 => self
                .rng
                .pick(&categories)
                .map(|id| SimOp::DeactivateCategory { id }),
            87..=90 => self
                .pick_content(&contents)
                .map(|id| SimOp::DeactivateContent { id }),
            91..=93 => self
                .pick_content(&contents)
                .map(|id| SimOp::DeleteContent { id }),
            94..=96 => self
                .rng
                .pick(&categories)
                .map(|id| SimOp::DeleteCategory { id }),
            _ => None,
        };
        op.unwrap_or(SimOp::Reload)
    }

    fn position(&mut self) -> Position {
        match self.rng.next_bounded(3) {
            0 => Position::Before,
            1 => Position::After,
            _ => Position::Inside,
        }
    }

    fn category_move(&mut self, categories: &[CategoryId]) -> Option<SimOp> {
        Some(SimOp::MoveCategory {
            moving: self.rng.pick(categories)?,
            target: self.rng.pick(categories)?,
            position: self.position(),
        })
    }

    fn pick_content(&mut self, contents: &[&Content]) -> Option<ContentId> {
        let ids: Vec<ContentId> = contents.iter().map(|c| c.id).collect();
        self.rng.pick(&ids)
    }

    /// Mostly a sibling of the moving item; sometimes any item, to exercise
    /// the cross-category rejection.
    fn content_move(&mut self, snapshot: &Snapshot, contents: &[&Content]) -> Option<SimOp> {
        let moving = self.pick_content(contents)?;
        let target = if self.rng.hit_rate_percent(80) {
            let category = snapshot.contents().get(moving)?.category_id;
            let siblings: Vec<ContentId> = snapshot
                .contents()
                .list(category)
                .iter()
                .map(|c| c.id)
                .collect();
            self.rng.pick(&siblings)?
        } else {
            self.pick_content(contents)?
        };
        let position = if self.rng.hit_rate_percent(50) {
            Position::Before
        } else {
            Position::After
        };
        Some(SimOp::MoveContent {
            moving,
            target,
            position,
        })
    }

    fn recategorize(&mut self, categories: &[CategoryId], contents: &[&Content]) -> Option<SimOp> {
        Some(SimOp::Recategorize {
            content: self.pick_content(contents)?,
            category: self.rng.pick(categories)?,
        })
    }

    fn create_category(&mut self, step: usize, categories: &[CategoryId]) -> SimOp {
        let parent = if self.rng.hit_rate_percent(30) {
            None
        } else {
            self.rng.pick(categories)
        };
        SimOp::CreateCategory {
            parent,
            name: format!("cat-{step}"),
        }
    }

    fn rename(&mut self, step: usize, categories: &[CategoryId]) -> Option<SimOp> {
        let id = self.rng.pick(categories)?;
        let name = if self.rng.hit_rate_percent(10) {
            "   ".to_string()
        } else {
            format!("renamed-{step}")
        };
        Some(SimOp::RenameCategory { id, name })
    }
}

async fn execute(store: &CategoryStore<MemoryBackend>, op: &SimOp) -> Result<(), StoreError> {
    match op {
        SimOp::MoveCategory {
            moving,
            target,
            position,
        } => store.move_category(*moving, *target, *position).await.map(drop),
        SimOp::MoveContent {
            moving,
            target,
            position,
        } => store.move_content(*moving, *target, *position).await.map(drop),
        SimOp::Recategorize { content, category } => store
            .recategorize_content(*content, *category)
            .await
            .map(drop),
        SimOp::CreateCategory { parent, name } => store
            .create_category(*parent, name, CategoryKind::Note)
            .await
            .map(drop),
        SimOp::CreateContent { category, title } => store
            .create_content(*category, ContentDraft::new(title.as_str()))
            .await
            .map(drop),
        SimOp::RenameCategory { id, name } => store.rename_category(*id, name).await,
        SimOp::DeactivateCategory { id } => store.deactivate_category(*id).await.map(drop),
        SimOp::DeactivateContent { id } => store.deactivate_content(*id).await,
        SimOp::DeleteCategory { id } => store.delete_category(*id).await,
        SimOp::DeleteContent { id } => store.delete_content(*id).await,
        SimOp::Reload => store.load(SIM_SCOPE).await.map(drop),
    }
}

fn drain_rollbacks(events: &mut Receiver<StoreEvent>) -> usize {
    let mut rollbacks = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, StoreEvent::RolledBack { .. }) {
            rollbacks += 1;
        }
    }
    rollbacks
}

/// Random forest where every parent is an earlier category, plus content
/// spread over it. Orders are drawn from a narrow range so ties and tight
/// gaps show up early.
fn seed_records(config: &SimulationConfig, rng: &mut DeterministicRng) -> (Vec<Category>, Vec<Content>) {
    let step = config.arbor.ordering.step;
    let mut categories: Vec<Category> = Vec::with_capacity(config.initial_categories);
    for i in 1..=config.initial_categories {
        let id = to_id(i);
        let order = i64::try_from(rng.next_bounded(6)).unwrap_or(0) * step / 2;
        let category = Category::new(id, SIM_SCOPE.owner_id, format!("seed-{id}"), order);
        let parent = if i == 1 || rng.hit_rate_percent(30) {
            None
        } else {
            rng.pick(&categories.iter().map(|c| c.id).collect::<Vec<_>>())
        };
        categories.push(match parent {
            Some(parent) => category.with_parent(parent),
            None => category,
        });
    }

    let category_ids: Vec<CategoryId> = categories.iter().map(|c| c.id).collect();
    let contents = (1..=config.initial_contents)
        .filter_map(|j| {
            let category = rng.pick(&category_ids)?;
            let id = 10_000 + to_id(j);
            let order = i64::try_from(rng.next_bounded(4)).unwrap_or(0) * step;
            Some(Content::new(id, category, SIM_SCOPE.owner_id, format!("seed-{id}"), order))
        })
        .collect();

    (categories, contents)
}

fn to_id(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{SimOp, SimulationConfig, Simulator, StepOutcome, seed_records};
    use crate::rng::DeterministicRng;
    use arbor_core::error::{OrderError, StoreError};
    use arbor_core::model::EntityRef;
    use arbor_core::tree::build_forest;

    #[test]
    fn seed_records_form_an_acyclic_forest() {
        let config = SimulationConfig::default();
        let (categories, contents) = seed_records(&config, &mut DeterministicRng::new(3));
        let forest = build_forest(&categories);
        assert_eq!(forest.len(), config.initial_categories);
        assert!(forest.excluded().is_empty());
        assert_eq!(contents.len(), config.initial_contents);
        assert!(contents.iter().all(|c| forest.contains(c.category_id)));
    }

    #[test]
    fn outcome_classifies_store_errors() {
        let local = StoreError::from(OrderError::NotFound(EntityRef::Category(4)));
        assert_eq!(
            StepOutcome::from_result(Err(local)),
            StepOutcome::Rejected {
                code: "E2002".into()
            }
        );
        let conflict = StoreError::Conflict {
            entity: EntityRef::Category(4),
            current: 2,
            rejected: None,
        };
        assert!(matches!(
            StepOutcome::from_result(Err(conflict)),
            StepOutcome::Failed { .. }
        ));
    }

    #[test]
    fn fault_free_run_applies_and_passes() {
        let mut sim = Simulator::new(SimulationConfig {
            seed: 11,
            steps: 120,
            fault_percent: 0,
            ..SimulationConfig::default()
        })
        .unwrap();
        let result = sim.run().unwrap();
        assert!(result.passed(), "{:?}", result.violations);
        assert_eq!(result.faults_injected, 0);
        assert_eq!(result.rolled_back(), 0);
        assert!(result.trace.iter().any(|e| e.outcome == StepOutcome::Applied));
    }

    #[test]
    fn faulty_run_rolls_back_and_passes() {
        let mut sim = Simulator::new(SimulationConfig {
            seed: 5,
            steps: 200,
            fault_percent: 40,
            ..SimulationConfig::default()
        })
        .unwrap();
        let result = sim.run().unwrap();
        assert!(result.passed(), "{:?}", result.violations);
        assert!(result.faults_injected > 0);
        assert_eq!(result.rolled_back(), result.faults_injected);
    }

    #[test]
    fn same_seed_replays_identically() {
        let config = SimulationConfig {
            seed: 21,
            steps: 80,
            ..SimulationConfig::default()
        };
        let first = Simulator::new(config.clone()).unwrap().run().unwrap();
        let second = Simulator::new(config).unwrap().run().unwrap();
        assert_eq!(first.trace, second.trace);
        assert!(first.trace.iter().any(|e| matches!(e.op, SimOp::MoveCategory { .. })));
    }
}
