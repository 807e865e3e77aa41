use alien_changer::{
    ChangerConfig, ChangerState, MonitorData, SimulationChanger, SimulationMonitor,
};
use alien_core::SimulationParameters;
use proptest::prelude::*;

/// Telemetry source whose next sample is set by the test.
#[derive(Default)]
struct ScriptedMonitor {
    outstanding: usize,
    max_outstanding: usize,
    requests: usize,
    next: Option<MonitorData>,
}

impl ScriptedMonitor {
    fn provide(&mut self, active_clusters: u64) {
        self.next = Some(MonitorData {
            num_clusters_with_tokens: active_clusters,
            num_clusters: active_clusters * 2,
            ..MonitorData::default()
        });
    }
}

impl SimulationMonitor for ScriptedMonitor {
    fn require_data(&mut self) {
        self.requests += 1;
        self.outstanding += 1;
        self.max_outstanding = self.max_outstanding.max(self.outstanding);
    }

    fn retrieve_data(&mut self) -> Option<MonitorData> {
        let sample = self.next.take();
        if sample.is_some() {
            self.outstanding = self.outstanding.saturating_sub(1);
        }
        sample
    }
}

fn feed(changer: &mut SimulationChanger, monitor: &mut ScriptedMonitor, active_clusters: u64) {
    for _ in 0..changer.config().timesteps_for_monitor {
        changer.notify_next_timestep(monitor);
    }
    assert!(changer.is_data_required());
    monitor.provide(active_clusters);
    changer.on_monitor_data_available(monitor);
}

#[test]
fn population_crash_escalates_to_emergency_retreat() {
    let config = ChangerConfig {
        rng_seed: Some(0x5EED),
        ..ChangerConfig::default()
    };
    let mut changer = SimulationChanger::with_linear_calculator(config).expect("valid config");
    let mut monitor = ScriptedMonitor::default();
    let p0 = SimulationParameters {
        cell_max_force: 0.6,
        radiation_prob: 0.05,
        ..SimulationParameters::default()
    };
    assert_eq!(changer.state(), ChangerState::Deactivated);

    changer.activate(p0.clone());
    const N: u64 = 200;
    for _ in 0..400 {
        feed(&mut changer, &mut monitor, N);
    }
    assert_eq!(changer.state(), ChangerState::FindEpochTarget);
    assert_eq!(changer.reference_count(), Some(N));

    let crashed = N / 5;
    let mut visited = vec![changer.state()];
    for _ in 0..5 {
        feed(&mut changer, &mut monitor, crashed);
        visited.push(changer.state());
    }
    assert!(visited.contains(&ChangerState::Retreat), "{visited:?}");
    assert!(visited.contains(&ChangerState::EmergencyRetreat), "{visited:?}");
    assert_eq!(changer.state(), ChangerState::EmergencyRetreat);
    assert_eq!(changer.parameters(), &p0);
    assert_eq!(monitor.max_outstanding, 1);
}

#[derive(Debug, Clone)]
enum Event {
    Timesteps(u16),
    Deliver(u8),
    Lose,
    Deactivate,
    Activate,
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        4 => (1_u16..60).prop_map(Event::Timesteps),
        3 => any::<u8>().prop_map(Event::Deliver),
        1 => Just(Event::Lose),
        1 => Just(Event::Deactivate),
        1 => Just(Event::Activate),
    ]
}

proptest! {
    #[test]
    fn never_more_than_one_outstanding_request(events in prop::collection::vec(event(), 1..200)) {
        let config = ChangerConfig {
            timesteps_for_monitor: 7,
            init_duration: 3,
            step_duration: 2,
            retreat_duration: 3,
            rng_seed: Some(1),
            ..ChangerConfig::default()
        };
        let mut changer = SimulationChanger::with_linear_calculator(config).expect("valid config");
        let mut monitor = ScriptedMonitor::default();
        changer.activate(SimulationParameters::default());

        for event in events {
            match event {
                Event::Timesteps(count) => {
                    for _ in 0..count {
                        changer.notify_next_timestep(&mut monitor);
                    }
                }
                Event::Deliver(active) => {
                    if monitor.outstanding > 0 {
                        monitor.provide(u64::from(active));
                    }
                    changer.on_monitor_data_available(&mut monitor);
                }
                Event::Lose => {
                    changer.on_monitor_data_available(&mut monitor);
                }
                Event::Deactivate => changer.deactivate(),
                Event::Activate => changer.activate(SimulationParameters::default()),
            }
            prop_assert!(monitor.outstanding <= 1);
            prop_assert_eq!(changer.is_data_required(), monitor.outstanding == 1);
        }
        prop_assert!(monitor.max_outstanding <= 1);
    }
}
