// Alarm state machine: edge-triggered fire, cooldown, re-arm

use fleetwatch::models::Metrics;
use fleetwatch::watcher::*;

fn m(connected: u64, blocked: u64) -> Metrics {
    Metrics {
        connected,
        blocked,
        ops: 0,
    }
}

#[test]
fn breach_is_strictly_above_threshold() {
    let cfg = AlarmConfig::default();
    assert!(!cfg.is_breach(&m(1000, 2)));
    assert!(cfg.is_breach(&m(1001, 0)));
    assert!(cfg.is_breach(&m(0, 3)));
}

#[test]
fn fires_once_then_cools() {
    let cfg = AlarmConfig::default();
    let mut state = AlarmState::default();
    assert!(state.evaluate(&cfg, &m(1500, 0)).fire);
    assert_eq!(state.phase(), AlarmPhase::Cooling);
    for _ in 0..cfg.cooldown_ticks {
        assert!(!state.evaluate(&cfg, &m(1500, 10)).fire);
        assert_eq!(state.phase(), AlarmPhase::Cooling);
    }
}

#[test]
fn rearms_after_cooldown_without_firing_that_tick() {
    let cfg = AlarmConfig::default();
    let mut state = AlarmState::default();
    state.evaluate(&cfg, &m(1500, 0));
    for tick in 1..=cfg.cooldown_ticks + 1 {
        let decision = state.evaluate(&cfg, &m(5000, 50));
        assert!(!decision.fire, "fired during cooldown at tick {}", tick);
    }
    assert!(state.is_armed());
    assert_eq!(state.cooling_elapsed(), 0);
    assert!(state.evaluate(&cfg, &m(5000, 50)).fire);
}

#[test]
fn cooldown_remaining_counts_down_while_cooling() {
    let cfg = AlarmConfig::default();
    let mut state = AlarmState::default();
    assert_eq!(state.cooldown_remaining(&cfg), 0);
    state.evaluate(&cfg, &m(2000, 0));
    let mut last = state.cooldown_remaining(&cfg);
    assert_eq!(last, cfg.cooldown_ticks + 1);
    while !state.is_armed() {
        state.evaluate(&cfg, &m(0, 0));
        let now = state.cooldown_remaining(&cfg);
        assert!(now < last || state.is_armed());
        last = now;
    }
}

#[test]
fn quiet_endpoint_never_fires() {
    let cfg = AlarmConfig::default();
    let mut state = AlarmState::default();
    for _ in 0..500 {
        assert!(!state.evaluate(&cfg, &m(999, 2)).fire);
    }
    assert!(state.is_armed());
}

#[test]
fn endpoints_have_independent_states() {
    let mut watcher = ThresholdWatcher::new(AlarmConfig::default(), 2);
    assert!(watcher.evaluate(0, &m(1500, 0)).fire);
    assert!(watcher.evaluate(1, &m(1500, 0)).fire);
    assert!(!watcher.evaluate(0, &m(1500, 0)).fire);
    assert!(!watcher.state(0).unwrap().is_armed());
    assert!(!watcher.evaluate(7, &m(1500, 0)).fire);
}

#[test]
fn custom_cooldown_is_honoured() {
    let cfg = AlarmConfig {
        cooldown_ticks: 2,
        ..AlarmConfig::default()
    };
    let mut state = AlarmState::default();
    let fires: Vec<bool> = (0..8)
        .map(|_| state.evaluate(&cfg, &m(1500, 0)).fire)
        .collect();
    // fire, 3 cooling ticks, fire, ...
    assert_eq!(fires, vec![true, false, false, false, true, false, false, false]);
}
