use std::hint::black_box;

use chrono::NaiveDate;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use ndarray::Array2;
use quantfolio::market::InvestmentUniverse;
use quantfolio::market::ReturnsMatrix;
use quantfolio::optimization::ConstraintType;
use quantfolio::optimization::ModelParameters;
use quantfolio::optimization::ObjectiveType;
use quantfolio::optimization::OptimizationProblem;
use quantfolio::strategy::HierarchicalRiskParity;
use quantfolio::strategy::PortfolioSelectionModel;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;

const T: usize = 252;

fn universe(n: usize) -> InvestmentUniverse {
  let mut rng = StdRng::seed_from_u64(7);
  let normal = Normal::new(0.0004, 0.015).unwrap();
  let values = Array2::from_shape_fn((T, n), |_| normal.sample(&mut rng));
  let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
  let returns = ReturnsMatrix::new(
    (0..T).map(|i| start + chrono::Duration::days(i as i64)).collect(),
    (0..n).map(|i| format!("S{i:03}")).collect(),
    values,
  )
  .unwrap();
  InvestmentUniverse::from_returns("bench", returns).unwrap()
}

fn bench_models(c: &mut Criterion) {
  let mut group = c.benchmark_group("Models");
  group.sample_size(20);

  for n in [10, 50] {
    let u = universe(n);
    for objective in ObjectiveType::ALL {
      let params = ModelParameters::new(objective).with_constraint(ConstraintType::NoShortSelling);
      group.bench_with_input(BenchmarkId::new(objective.description(), n), &u, |b, u| {
        b.iter(|| {
          let mut problem = OptimizationProblem::new(params.clone(), u).unwrap();
          black_box(problem.solve().unwrap())
        })
      });
    }
  }

  group.finish();
}

fn bench_hrp(c: &mut Criterion) {
  let mut group = c.benchmark_group("HRP");

  for n in [10, 50, 200] {
    let u = universe(n);
    group.bench_with_input(BenchmarkId::from_parameter(n), &u, |b, u| {
      b.iter(|| black_box(HierarchicalRiskParity::new().compute_optimal_portfolio(u).unwrap()))
    });
  }

  group.finish();
}

criterion_group!(benches, bench_models, bench_hrp);
criterion_main!(benches);
