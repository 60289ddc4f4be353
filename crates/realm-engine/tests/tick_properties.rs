//! Tick accounting under arbitrary frame-time sequences.

use std::time::Duration;

use proptest::prelude::*;
use realm_engine::tick::{TickConfig, TickLoop};

fn expected_ticks(config: &TickConfig, deltas: &[Duration]) -> u64 {
    let clamped: u128 = deltas
        .iter()
        .map(|d| (*d).min(config.max_frame_time()).as_nanos())
        .sum();
    (clamped / config.fixed_dt.as_nanos()) as u64
}

#[test]
fn ten_forty_two_hundred_at_sixty_hertz() {
    let config = TickConfig::default();
    let deltas = [10, 40, 200].map(Duration::from_millis);
    let mut tick_loop = TickLoop::new(config);
    let mut seen = Vec::new();
    for d in deltas {
        tick_loop.advance(d, |t| seen.push(t.tick_count));
    }

    let expected = expected_ticks(&config, &deltas);
    assert_eq!(tick_loop.tick_count(), expected);
    assert_eq!(seen, (0..expected).collect::<Vec<_>>());
    assert_eq!(tick_loop.total_time(), config.fixed_dt * expected as u32);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn tick_count_is_floor_of_clamped_sum(
        dt_us in 1_000u64..50_000,
        deltas_us in prop::collection::vec(0u64..1_000_000, 0..40),
    ) {
        let config = TickConfig {
            fixed_dt: Duration::from_micros(dt_us),
            ..TickConfig::default()
        };
        let deltas: Vec<Duration> = deltas_us.iter().copied().map(Duration::from_micros).collect();

        let mut tick_loop = TickLoop::new(config);
        let mut last_total = Duration::ZERO;
        for d in &deltas {
            let ran = tick_loop.advance(*d, |t| {
                assert_eq!(t.delta_time, config.fixed_dt);
                assert!(t.total_time > last_total);
                last_total = t.total_time;
            });
            prop_assert!(ran <= config.max_catch_up_ticks);
            prop_assert!(tick_loop.accumulated() < config.fixed_dt);
        }

        let expected = expected_ticks(&config, &deltas);
        prop_assert_eq!(tick_loop.tick_count(), expected);
        prop_assert_eq!(
            tick_loop.total_time().as_nanos(),
            config.fixed_dt.as_nanos() * u128::from(expected)
        );
    }
}
