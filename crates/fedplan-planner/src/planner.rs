//! Planning entry point.
//!
//! assemble → greedy join ordering → phase 1 (deep) → phase 2 (shallow) →
//! phase 3 (deep) → equivalence cleaning → acyclicity check.

use fedplan_core::config::FederationConfig;
use fedplan_core::context::QueryContext;
use fedplan_core::dag::{OpArena, OpKind, Plan};
use fedplan_core::endpoint::{EndpointCatalog, LeafBinding};
use fedplan_core::error::{Error, Result};

use crate::clean::{DefaultEquivCleaner, EquivCleaner, OpComparator, StructuralComparator};
use crate::cost::{CardinalityHints, CostEstimator, HeuristicCostEstimator};
use crate::join_order::greedy_join_order;
use crate::phased::{run_phase, PassKind};
use crate::prepare::assemble;
use crate::steps::{default_phase1, default_phase2, default_phase3, PlannerStep, StepContext};

pub struct Planner {
    catalog: EndpointCatalog,
    config: FederationConfig,
    estimator: Box<dyn CostEstimator>,
    phase1: Vec<Box<dyn PlannerStep>>,
    phase2: Vec<Box<dyn PlannerStep>>,
    phase3: Vec<Box<dyn PlannerStep>>,
    cleaner: Box<dyn EquivCleaner>,
    comparator: Box<dyn OpComparator>,
}

impl Planner {
    /// Planner with the default steps, heuristic estimator, and cleaner.
    pub fn new(catalog: EndpointCatalog, config: FederationConfig) -> Self {
        PlannerBuilder::new(catalog).config(config).build()
    }

    pub fn builder(catalog: EndpointCatalog) -> PlannerBuilder {
        PlannerBuilder::new(catalog)
    }

    pub fn catalog(&self) -> &EndpointCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn plan(&self, bindings: &[LeafBinding], ctx: &mut QueryContext) -> Result<Plan> {
        if bindings.is_empty() {
            return Err(Error::Plan("no leaf bindings to plan".into()));
        }
        let mut arena = OpArena::new();
        let assembly = assemble(&mut arena, bindings, &self.catalog)?;
        let mut locked = assembly.locked;
        tracing::debug!(
            bindings = bindings.len(),
            units = assembly.units.len(),
            locked = locked.len(),
            "assembled plan units"
        );

        let order = greedy_join_order(
            &mut arena,
            &assembly.units,
            self.estimator.as_ref(),
            self.config.warn_on_cartesian,
        )?;

        let mut cx = StepContext {
            catalog: &self.catalog,
            estimator: self.estimator.as_ref(),
            query: &mut *ctx,
        };
        let mut root = order.root;
        for (kind, steps) in [
            (PassKind::Deep, &self.phase1),
            (PassKind::Shallow, &self.phase2),
            (PassKind::Deep, &self.phase3),
        ] {
            root = run_phase(&mut arena, root, kind, steps, &mut locked, &mut cx)?;
        }

        if self.config.clean_equivalents {
            root = self
                .cleaner
                .clean(&mut arena, root, self.comparator.as_ref(), &locked)?;
        }
        arena.check_acyclic(root)?;

        let plan = Plan {
            arena,
            root,
            locked,
        };
        ctx.set("planner.merges", order.merges);
        ctx.set("planner.cartesians", plan.count_kind(OpKind::Cartesian));
        ctx.set("planner.leaves", plan.leaves().len());
        tracing::debug!(plan = %plan.render(), "planning done");
        Ok(plan)
    }
}

pub struct PlannerBuilder {
    catalog: EndpointCatalog,
    config: FederationConfig,
    hints: CardinalityHints,
    estimator: Option<Box<dyn CostEstimator>>,
    phase1: Vec<Box<dyn PlannerStep>>,
    phase2: Vec<Box<dyn PlannerStep>>,
    phase3: Vec<Box<dyn PlannerStep>>,
    cleaner: Option<Box<dyn EquivCleaner>>,
    comparator: Box<dyn OpComparator>,
}

impl PlannerBuilder {
    pub fn new(catalog: EndpointCatalog) -> Self {
        Self {
            catalog,
            config: FederationConfig::default(),
            hints: CardinalityHints::default(),
            estimator: None,
            phase1: default_phase1(),
            phase2: default_phase2(),
            phase3: default_phase3(),
            cleaner: None,
            comparator: Box::new(StructuralComparator),
        }
    }

    pub fn config(mut self, config: FederationConfig) -> Self {
        self.config = config;
        self
    }

    /// Row hints for the default heuristic estimator.
    pub fn hints(mut self, hints: CardinalityHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn estimator(mut self, estimator: impl CostEstimator + 'static) -> Self {
        self.estimator = Some(Box::new(estimator));
        self
    }

    pub fn phase1(mut self, steps: Vec<Box<dyn PlannerStep>>) -> Self {
        self.phase1 = steps;
        self
    }

    pub fn phase2(mut self, steps: Vec<Box<dyn PlannerStep>>) -> Self {
        self.phase2 = steps;
        self
    }

    pub fn phase3(mut self, steps: Vec<Box<dyn PlannerStep>>) -> Self {
        self.phase3 = steps;
        self
    }

    pub fn cleaner(mut self, cleaner: impl EquivCleaner + 'static) -> Self {
        self.cleaner = Some(Box::new(cleaner));
        self
    }

    pub fn comparator(mut self, comparator: impl OpComparator + 'static) -> Self {
        self.comparator = Box::new(comparator);
        self
    }

    pub fn build(self) -> Planner {
        let estimator: Box<dyn CostEstimator> = match self.estimator {
            Some(estimator) => estimator,
            None => Box::new(
                HeuristicCostEstimator::new(self.config.default_leaf_cardinality)
                    .with_hints(self.hints),
            ),
        };
        let cleaner: Box<dyn EquivCleaner> = match self.cleaner {
            Some(cleaner) => cleaner,
            None => Box::new(DefaultEquivCleaner),
        };
        Planner {
            catalog: self.catalog,
            config: self.config,
            estimator,
            phase1: self.phase1,
            phase2: self.phase2,
            phase3: self.phase3,
            cleaner,
            comparator: self.comparator,
        }
    }
}
