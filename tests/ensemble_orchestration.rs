use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use nbeats_ensemble::data::{
    Dataset, DatasetLoader, FeatureTable, LoaderFactory, Series, SeriesMask, SeriesTable, WindowLoader,
    WindowLoaderFactory, WindowSpec,
};
use nbeats_ensemble::grid::{FrequencyGroup, GroupSpec, HyperparameterGrid};
use nbeats_ensemble::ml::{
    LossFunction, ModelConfig, ModelFactory, PredictionBatch, SeasonalNaiveFactory, SeasonalNaiveTrainer, Trainer,
    TrainingSummary,
};
use nbeats_ensemble::orchestrator::{EnsembleOrchestrator, FailurePolicy, OrchestratorOptions};
use nbeats_ensemble::system::ResourceGuard;
use nbeats_ensemble::{EnsembleError, Result};

/// Datasets held in memory, keyed by group name
struct InMemoryLoader {
    datasets: HashMap<String, Dataset>,
    loads: Rc<Cell<usize>>,
}

impl InMemoryLoader {
    fn new(groups: &[&str]) -> Self {
        let datasets = groups
            .iter()
            .map(|group| (group.to_string(), dataset(&["S1", "S2"], 40)))
            .collect();
        Self {
            datasets,
            loads: Rc::new(Cell::new(0)),
        }
    }
}

impl DatasetLoader for InMemoryLoader {
    fn load(&self, group_name: &str) -> Result<Dataset> {
        self.loads.set(self.loads.get() + 1);
        self.datasets
            .get(group_name)
            .cloned()
            .ok_or_else(|| EnsembleError::dataset_load(group_name, "no such dataset"))
    }
}

fn dataset(ids: &[&str], len: usize) -> Dataset {
    let series = ids
        .iter()
        .enumerate()
        .map(|(i, id)| Series::new(*id, (0..len).map(|t| (t + i * 100) as f64).collect()))
        .collect();
    Dataset {
        series: SeriesTable::new(series),
        exogenous: None,
        statics: None,
    }
}

/// Wraps the in-memory window factory and counts builds
struct CountingLoaderFactory {
    builds: Rc<Cell<usize>>,
}

impl LoaderFactory for CountingLoaderFactory {
    fn build(
        &self,
        series: &SeriesTable,
        statics: Option<&FeatureTable>,
        mask: &SeriesMask,
        spec: &WindowSpec,
    ) -> Result<WindowLoader> {
        self.builds.set(self.builds.get() + 1);
        WindowLoaderFactory::new().build(series, statics, mask, spec)
    }
}

#[derive(Debug)]
struct StubModel {
    loss: LossFunction,
    horizon: usize,
}

/// Records every configuration it instantiates
#[derive(Default)]
struct RecordingFactory {
    configs: Rc<RefCell<Vec<ModelConfig>>>,
}

impl ModelFactory for RecordingFactory {
    type Model = StubModel;

    fn instantiate(&self, config: &ModelConfig) -> Result<StubModel> {
        self.configs.borrow_mut().push(config.clone());
        Ok(StubModel {
            loss: config.loss_train,
            horizon: config.n_time_out,
        })
    }
}

/// Forecasts a constant that depends on the training loss: MAPE 10, SMAPE 20, MASE 30
#[derive(Default)]
struct ConstantTrainer {
    fail_on: Option<LossFunction>,
}

impl Trainer<StubModel> for ConstantTrainer {
    fn fit(
        &self,
        model: &mut StubModel,
        _train_loader: &WindowLoader,
        _val_loader: &WindowLoader,
        steps: usize,
        _validation_interval: usize,
    ) -> Result<TrainingSummary> {
        if Some(model.loss) == self.fail_on {
            return Err(EnsembleError::training(0, "loss diverged"));
        }
        Ok(TrainingSummary {
            steps,
            ..TrainingSummary::default()
        })
    }

    fn predict(&self, model: &StubModel, loader: &WindowLoader) -> Result<Vec<PredictionBatch>> {
        let level = match model.loss {
            LossFunction::Mape => 10.0,
            LossFunction::Smape => 20.0,
            LossFunction::Mase => 30.0,
            _ => 0.0,
        };
        Ok(vec![PredictionBatch {
            index: 0,
            values: vec![vec![level; model.horizon]; loader.len()],
        }])
    }
}

struct RejectModel(&'static str);

impl ResourceGuard for RejectModel {
    fn check_before_model(&self, model_label: &str) -> anyhow::Result<()> {
        if model_label == self.0 {
            anyhow::bail!("not enough memory for {}", model_label);
        }
        Ok(())
    }
}

fn yearly_spec(losses: &[&str]) -> GroupSpec {
    let mut spec = GroupSpec::m4(FrequencyGroup::yearly(), &[2, 3]);
    spec.ensemble_grid = HyperparameterGrid::new()
        .with("loss_train", losses.iter().copied())
        .with("n_steps", [5])
        .with("random_seed", [0]);
    spec
}

fn options(policy: FailurePolicy) -> OrchestratorOptions {
    OrchestratorOptions {
        val_freq_steps: 2,
        failure_policy: policy,
    }
}

#[test]
fn test_full_ensemble_takes_median_per_series() {
    let factory = RecordingFactory::default();
    let configs = factory.configs.clone();
    let orchestrator = EnsembleOrchestrator::new(
        InMemoryLoader::new(&["Yearly"]),
        WindowLoaderFactory::new(),
        factory,
        ConstantTrainer::default(),
        options(FailurePolicy::AbortGroup),
    );

    let report = orchestrator.fit(&[yearly_spec(&["MAPE", "SMAPE", "MASE"])]);
    let results = report.results();
    let ensemble = results.get("Yearly").expect("Yearly should complete");

    assert_eq!(configs.borrow().len(), 6, "2 lookbacks x 3 losses");
    assert_eq!(ensemble.n_members, 6);
    assert_eq!(ensemble.rows.len(), 2);
    for row in &ensemble.rows {
        assert_eq!(row.values, vec![20.0; 6]);
    }
}

#[test]
fn test_members_are_labelled_in_training_order() {
    let factory = RecordingFactory::default();
    let configs = factory.configs.clone();
    let orchestrator = EnsembleOrchestrator::new(
        InMemoryLoader::new(&["Yearly"]),
        WindowLoaderFactory::new(),
        factory,
        ConstantTrainer::default(),
        OrchestratorOptions::default(),
    );

    let fit = orchestrator.fit_group(&yearly_spec(&["MAPE", "SMAPE"])).unwrap();
    let labels: Vec<&str> = fit.members.iter().map(|m| m.model.as_str()).collect();
    assert_eq!(labels, vec!["m_1", "m_2", "m_3", "m_4"]);
    assert_eq!(fit.members[3].version, "loss-SMAPE_lbl-3__rs-0");

    // architecture rows are the outer loop, ensemble rows the inner one
    let inputs: Vec<(usize, LossFunction)> = configs.borrow().iter().map(|c| (c.n_time_in, c.loss_train)).collect();
    assert_eq!(
        inputs,
        vec![
            (12, LossFunction::Mape),
            (12, LossFunction::Smape),
            (18, LossFunction::Mape),
            (18, LossFunction::Smape),
        ]
    );

    // even member count: mean of the two middle values
    assert_eq!(fit.ensemble.get("S1"), Some(&[15.0; 6][..]));
}

#[test]
fn test_empty_candidate_list_fails_before_any_work() {
    let datasets = InMemoryLoader::new(&["Yearly"]);
    let loads = datasets.loads.clone();
    let factory = RecordingFactory::default();
    let configs = factory.configs.clone();
    let orchestrator = EnsembleOrchestrator::new(
        datasets,
        WindowLoaderFactory::new(),
        factory,
        ConstantTrainer::default(),
        OrchestratorOptions::default(),
    );

    let mut spec = yearly_spec(&["MAPE"]);
    spec.ensemble_grid.insert("random_seed", Vec::<u64>::new());

    let report = orchestrator.fit(&[spec]);
    assert!(matches!(report.error("Yearly"), Some(EnsembleError::InvalidGrid { .. })));
    assert_eq!(loads.get(), 0, "dataset must not be loaded");
    assert!(configs.borrow().is_empty(), "no model may be instantiated");
}

#[test]
fn test_dataset_failure_does_not_stop_other_groups() {
    let orchestrator = EnsembleOrchestrator::new(
        InMemoryLoader::new(&["Quarterly"]),
        WindowLoaderFactory::new(),
        RecordingFactory::default(),
        ConstantTrainer::default(),
        OrchestratorOptions::default(),
    );

    let mut quarterly = GroupSpec::m4(FrequencyGroup::quarterly(), &[2]);
    quarterly.ensemble_grid = yearly_spec(&["MASE"]).ensemble_grid;

    let report = orchestrator.fit(&[yearly_spec(&["MAPE"]), quarterly]);
    assert!(matches!(report.error("Yearly"), Some(EnsembleError::DatasetLoad { .. })));
    assert_eq!(report.succeeded(), 1);

    let results = report.results();
    let ensemble = results.get("Quarterly").expect("Quarterly should complete");
    assert_eq!(ensemble.horizon, 8);
    assert_eq!(ensemble.get("S2"), Some(&[30.0; 8][..]));
}

#[test]
fn test_training_failure_aborts_group_by_default() {
    let orchestrator = EnsembleOrchestrator::new(
        InMemoryLoader::new(&["Yearly"]),
        WindowLoaderFactory::new(),
        RecordingFactory::default(),
        ConstantTrainer {
            fail_on: Some(LossFunction::Smape),
        },
        OrchestratorOptions::default(),
    );

    let report = orchestrator.fit(&[yearly_spec(&["MAPE", "SMAPE", "MASE"])]);
    match report.error("Yearly") {
        Some(EnsembleError::TrainingFailure { model_index, .. }) => assert_eq!(*model_index, 2),
        other => panic!("expected training failure, got {other:?}"),
    }
    assert!(report.results().is_empty());
}

#[test]
fn test_skip_member_policy_aggregates_survivors() {
    let orchestrator = EnsembleOrchestrator::new(
        InMemoryLoader::new(&["Yearly"]),
        WindowLoaderFactory::new(),
        RecordingFactory::default(),
        ConstantTrainer {
            fail_on: Some(LossFunction::Smape),
        },
        options(FailurePolicy::SkipMember),
    );

    let fit = orchestrator.fit_group(&yearly_spec(&["MAPE", "SMAPE", "MASE"])).unwrap();
    assert_eq!(fit.planned_models, 6);
    assert_eq!(fit.members.len(), 4);

    let skipped: Vec<&str> = fit.failures.iter().map(|f| f.model.as_str()).collect();
    assert_eq!(skipped, vec!["m_2", "m_5"]);

    // survivors keep their original labels
    let labels: Vec<&str> = fit.members.iter().map(|m| m.model.as_str()).collect();
    assert_eq!(labels, vec!["m_1", "m_3", "m_4", "m_6"]);
    assert_eq!(fit.ensemble.get("S1"), Some(&[20.0; 6][..]));
}

#[test]
fn test_all_members_failing_fails_the_group() {
    let orchestrator = EnsembleOrchestrator::new(
        InMemoryLoader::new(&["Yearly"]),
        WindowLoaderFactory::new(),
        RecordingFactory::default(),
        ConstantTrainer {
            fail_on: Some(LossFunction::Mape),
        },
        options(FailurePolicy::SkipMember),
    );

    let err = orchestrator.fit_group(&yearly_spec(&["MAPE"])).unwrap_err();
    assert!(matches!(err, EnsembleError::Aggregation { .. }));
}

#[test]
fn test_resource_guard_rejection_is_a_member_failure() {
    let factory = RecordingFactory::default();
    let configs = factory.configs.clone();
    let orchestrator = EnsembleOrchestrator::new(
        InMemoryLoader::new(&["Yearly"]),
        WindowLoaderFactory::new(),
        factory,
        ConstantTrainer::default(),
        options(FailurePolicy::SkipMember),
    )
    .with_guard(Box::new(RejectModel("m_3")));

    let fit = orchestrator.fit_group(&yearly_spec(&["MAPE", "SMAPE"])).unwrap();
    assert_eq!(fit.failures.len(), 1);
    assert_eq!(fit.failures[0].model, "m_3");
    assert!(fit.failures[0].reason.contains("not enough memory"));
    assert_eq!(configs.borrow().len(), 3, "rejected member is never instantiated");
}

#[test]
fn test_loaders_are_built_once_per_architecture_row() {
    let builds = Rc::new(Cell::new(0));
    let orchestrator = EnsembleOrchestrator::new(
        InMemoryLoader::new(&["Yearly"]),
        CountingLoaderFactory { builds: builds.clone() },
        RecordingFactory::default(),
        ConstantTrainer::default(),
        OrchestratorOptions::default(),
    );

    orchestrator.fit_group(&yearly_spec(&["MAPE", "SMAPE", "MASE"])).unwrap();
    // one train and one evaluation loader for each of the two lookbacks
    assert_eq!(builds.get(), 4);
}

#[test]
fn test_loader_settings_in_ensemble_grid_trigger_rebuilds() {
    let builds = Rc::new(Cell::new(0));
    let orchestrator = EnsembleOrchestrator::new(
        InMemoryLoader::new(&["Yearly"]),
        CountingLoaderFactory { builds: builds.clone() },
        RecordingFactory::default(),
        ConstantTrainer::default(),
        OrchestratorOptions::default(),
    );

    let mut spec = yearly_spec(&["MAPE"]);
    spec.ensemble_grid = HyperparameterGrid::new()
        .with("loss_train", ["MAPE"])
        .with("n_steps", [5])
        .with("batch_size", [8, 16])
        .with("random_seed", [0, 1]);

    let fit = orchestrator.fit_group(&spec).unwrap();
    assert_eq!(fit.members.len(), 8);
    // per lookback: members alternate seeds within a batch size, so two loader pairs each
    assert_eq!(builds.get(), 2 * 2 * 2);
}

#[test]
fn test_seasonal_naive_collaborators_end_to_end() {
    let orchestrator = EnsembleOrchestrator::new(
        InMemoryLoader::new(&["Quarterly"]),
        WindowLoaderFactory::new(),
        SeasonalNaiveFactory,
        SeasonalNaiveTrainer,
        OrchestratorOptions::default(),
    );

    let mut spec = GroupSpec::m4(FrequencyGroup::quarterly(), &[2]);
    spec.ensemble_grid = HyperparameterGrid::new()
        .with("loss_train", ["MAPE", "SMAPE"])
        .with("n_steps", [3])
        .with("random_seed", [0, 1]);
    spec.architecture_grid.insert("batch_size", [4]);

    let fit = orchestrator.fit_group(&spec).unwrap();
    assert_eq!(fit.members.len(), 4);

    // S1 is 0..40; the forecast target is the last 8 points and the input ends at 31
    let forecast = fit.ensemble.get("S1").unwrap();
    assert_eq!(forecast, &[28.0, 29.0, 30.0, 31.0, 28.0, 29.0, 30.0, 31.0][..]);
}
