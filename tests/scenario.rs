use competition_runner::milestones::format_performance;
use competition_runner::scenario::{Metric, ScenarioConfig, ScenarioKind, TimeoutPolicy};

#[test]
fn competition_scenario_parses() {
    let config = ScenarioConfig::parse(
        "type: competition\n\
         world:\n\
         \x20 file: worlds/robot_programming.wbt\n\
         \x20 max-duration: 120\n\
         \x20 metric: ranking\n\
         \x20 higher-is-better: 'true'\n\
         \x20 cpus: 1\n",
    )
    .unwrap();

    assert_eq!(config.kind, ScenarioKind::Competition);
    assert_eq!(config.world.metric, Metric::Ranking);
    assert_eq!(config.world.max_duration, 120.0);
    assert!(config.world.higher_is_better);
    assert_eq!(config.world.cpus, Some(1));
}

#[test]
fn benchmark_scenario_uses_defaults() {
    let config = ScenarioConfig::parse(
        "type: benchmark\n\
         world:\n\
         \x20 file: worlds/maze.wbt\n\
         \x20 max-duration: 60\n\
         \x20 metric: percent\n",
    )
    .unwrap();

    assert_eq!(config.kind, ScenarioKind::Benchmark);
    assert!(config.world.higher_is_better);
    assert_eq!(config.world.cpus, None);
}

#[test]
fn quoted_and_bare_booleans_both_parse() {
    for (value, expected) in [("true", true), ("'True'", true), ("false", false), ("'no'", false)] {
        let text = format!(
            "type: benchmark\n\
             world:\n\
             \x20 file: worlds/maze.wbt\n\
             \x20 max-duration: 60\n\
             \x20 metric: distance\n\
             \x20 higher-is-better: {value}\n"
        );
        let config = ScenarioConfig::parse(&text).unwrap();
        assert_eq!(config.world.higher_is_better, expected, "for {value}");
    }
}

#[test]
fn timeout_policy_defaults_follow_the_metric() {
    let survival = ScenarioConfig::parse(
        "type: benchmark\n\
         world:\n\
         \x20 file: worlds/maze.wbt\n\
         \x20 max-duration: 60\n\
         \x20 metric: time\n",
    )
    .unwrap();
    assert_eq!(survival.world.timeout_policy(), TimeoutPolicy::ScoreCeiling);

    let race = ScenarioConfig::parse(
        "type: benchmark\n\
         world:\n\
         \x20 file: worlds/maze.wbt\n\
         \x20 max-duration: 60\n\
         \x20 metric: time-speed\n",
    )
    .unwrap();
    assert_eq!(race.world.timeout_policy(), TimeoutPolicy::Fail);

    let overridden = ScenarioConfig::parse(
        "type: benchmark\n\
         world:\n\
         \x20 file: worlds/maze.wbt\n\
         \x20 max-duration: 60\n\
         \x20 metric: time-speed\n\
         \x20 on-timeout: score-ceiling\n",
    )
    .unwrap();
    assert_eq!(overridden.world.timeout_policy(), TimeoutPolicy::ScoreCeiling);
}

#[test]
fn missing_type_discriminator_is_an_error() {
    let result = ScenarioConfig::parse(
        "world:\n\
         \x20 file: worlds/maze.wbt\n\
         \x20 max-duration: 60\n\
         \x20 metric: percent\n",
    );
    assert!(result.is_err());
}

#[test]
fn performance_values_render_per_metric() {
    assert!(format_performance(61.25, Metric::Time).starts_with("61.25:01.01.25:"));
    assert!(format_performance(0.756, Metric::Percent).starts_with("0.756:75.6%:"));
    assert!(format_performance(1.5, Metric::Distance).starts_with("1.5:1.500 m.:"));
    assert!(format_performance(0.0, Metric::Percent).starts_with("0:failure:"));
}
