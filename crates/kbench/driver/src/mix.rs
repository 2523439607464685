//! Random workload mix for a scheduling tick

use kbench_types::{Benchmark, ReplicaRange, RpsRange};
use rand::Rng;

use crate::config::DriverConfig;

/// One experiment cycle the scheduler wants to run
#[derive(Debug, Clone, PartialEq)]
pub struct CyclePlan {
    pub benchmark: Benchmark,
    pub rps: u32,
    pub duration_secs: u64,
    pub replicas: u32,
}

/// Each benchmark independently with probability `p`. Both the empty and
/// the full set can come out.
pub fn choose_subset<'a, R: Rng + ?Sized>(
    benchmarks: &'a [Benchmark],
    p: f64,
    rng: &mut R,
) -> Vec<&'a Benchmark> {
    let p = p.clamp(0.0, 1.0);
    benchmarks.iter().filter(|_| rng.gen_bool(p)).collect()
}

pub fn draw_rps<R: Rng + ?Sized>(range: RpsRange, rng: &mut R) -> u32 {
    rng.gen_range(range.min..=range.max.max(range.min))
}

pub fn draw_replicas<R: Rng + ?Sized>(range: ReplicaRange, rng: &mut R) -> u32 {
    rng.gen_range(range.min.max(1)..=range.max.max(range.min).max(1))
}

pub fn draw_duration<R: Rng + ?Sized>(config: &DriverConfig, rng: &mut R) -> u64 {
    let min = config.min_invocation_secs;
    rng.gen_range(min..=config.max_invocation_secs.max(min))
}

/// Draw this tick's cycles.
pub fn plan_tick<R: Rng + ?Sized>(
    benchmarks: &[Benchmark],
    config: &DriverConfig,
    rng: &mut R,
) -> Vec<CyclePlan> {
    choose_subset(benchmarks, config.inclusion_probability, rng)
        .into_iter()
        .map(|benchmark| CyclePlan {
            rps: draw_rps(benchmark.rps_range, rng),
            duration_secs: draw_duration(config, rng),
            replicas: draw_replicas(benchmark.replicas, rng),
            benchmark: benchmark.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbench_types::Sla;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn benchmark(name: &str, rps: RpsRange, replicas: ReplicaRange) -> Benchmark {
        Benchmark {
            name: name.into(),
            functions: vec![name.into()],
            entry_point: name.into(),
            sla: Sla {
                p50_us: 1.0,
                p90_us: 2.0,
            },
            rps_range: rps,
            replicas,
            current_replicas: 1,
        }
    }

    #[test]
    fn test_empty_and_full_subsets_occur() {
        let benchmarks: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| benchmark(n, RpsRange::fixed(1), ReplicaRange::default()))
            .collect();
        let mut rng = StdRng::seed_from_u64(7);

        let sizes: Vec<usize> = (0..500)
            .map(|_| choose_subset(&benchmarks, 0.5, &mut rng).len())
            .collect();
        assert!(sizes.contains(&0));
        assert!(sizes.contains(&3));
    }

    #[test]
    fn test_probability_extremes() {
        let benchmarks = vec![benchmark("a", RpsRange::fixed(1), ReplicaRange::default())];
        let mut rng = StdRng::seed_from_u64(1);
        assert!(choose_subset(&benchmarks, 0.0, &mut rng).is_empty());
        assert_eq!(choose_subset(&benchmarks, 1.0, &mut rng).len(), 1);
    }

    proptest! {
        #[test]
        fn draws_stay_in_range(
            seed in any::<u64>(),
            rps_min in 1u32..500,
            rps_span in 0u32..500,
            rep_min in 1u32..8,
            rep_span in 0u32..8,
        ) {
            let rps = RpsRange { min: rps_min, max: rps_min + rps_span };
            let replicas = ReplicaRange { min: rep_min, max: rep_min + rep_span };
            let config = DriverConfig {
                inclusion_probability: 1.0,
                min_invocation_secs: 5,
                max_invocation_secs: 20,
                ..DriverConfig::default()
            };
            let benchmarks = vec![benchmark("fib", rps, replicas)];
            let mut rng = StdRng::seed_from_u64(seed);

            let plans = plan_tick(&benchmarks, &config, &mut rng);
            prop_assert_eq!(plans.len(), 1);
            let plan = &plans[0];
            prop_assert!(plan.rps >= rps.min && plan.rps <= rps.max);
            prop_assert!(plan.replicas >= replicas.min && plan.replicas <= replicas.max);
            prop_assert!((5..=20).contains(&plan.duration_secs));
        }
    }
}
