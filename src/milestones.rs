//! Protocol milestones scraped from the simulator's output stream.
//!
//! The simulator announces its progress through free-text log lines; the whole
//! orchestration protocol hangs on a handful of literal substrings. That wire
//! contract is inherited from the simulator's log format and cannot be changed
//! here, so every sentinel literal and every substring test lives in this
//! module and nowhere else.

use tracing::warn;

use crate::multiplexer::ProcessRole;
use crate::scenario::Metric;

/// Emitted when the simulator pauses and waits for an extern controller.
pub const WAITING_FOR_CONNECTION: &str = "waiting for connection";
/// Prefix of the line carrying the final performance value.
pub const PERFORMANCE_PREFIX: &str = "performance_line:";
/// Emitted by the supervisor when the wall-clock duration limit is reached.
pub const CONTROLLER_TIMEOUT: &str = "Controller timeout";

/// A recognized event in the simulator's log stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Milestone {
    /// The simulator is ready for the given controller and waits for it to connect.
    WaitingForConnection(ProcessRole),
    /// The given controller established its connection.
    Connected(ProcessRole),
    /// The simulator reported the final performance value.
    Performance(f64),
    /// The simulator's internal watchdog stopped the run.
    ControllerTimeout,
}

/// Scans one simulator line for a milestone.
///
/// Substring tests are case-sensitive. Lines from controller processes must
/// never be fed here: milestone detection is simulator-sourced only, which is
/// what keeps a malicious controller from faking a performance report.
pub fn parse_simulator_line(line: &str) -> Option<Milestone> {
    if let Some(payload) = line.split(PERFORMANCE_PREFIX).nth(1) {
        // benchmark runs emit `value:formatted:date`, competition runs a bare
        // number; the first `:`-field is the value either way
        let value = payload.split(':').next().unwrap_or_default().trim();
        return match value.parse::<f64>() {
            Ok(value) => Some(Milestone::Performance(value)),
            Err(_) => {
                warn!("unparsable performance payload: {payload:?}");
                None
            }
        };
    }
    if line.contains(CONTROLLER_TIMEOUT) {
        return Some(Milestone::ControllerTimeout);
    }
    if line.contains(WAITING_FOR_CONNECTION) {
        return Some(Milestone::WaitingForConnection(role_tag(line)));
    }
    if line.contains("opponent connected") {
        return Some(Milestone::Connected(ProcessRole::Opponent));
    }
    if line.contains("participant connected") {
        return Some(Milestone::Connected(ProcessRole::Participant));
    }
    None
}

/// One-sided scenarios do not tag the waiting line with a role name.
fn role_tag(line: &str) -> ProcessRole {
    if line.contains("opponent") {
        ProcessRole::Opponent
    } else {
        ProcessRole::Participant
    }
}

/// Renders a performance value as the `value:formatted:date` triple recorded
/// next to benchmark animations.
pub fn format_performance(value: f64, metric: Metric) -> String {
    let date = crate::utc_today();
    format!("{value}:{}:{date}", performance_string(value, metric))
}

fn performance_string(value: f64, metric: Metric) -> String {
    if value == 0.0 {
        return "failure".to_string();
    }
    match metric {
        Metric::Time | Metric::TimeSpeed => time_convert(value),
        Metric::Percent => format!("{}%", (value * 10_000.0).round() / 100.0),
        Metric::Distance => format!("{value:.3} m."),
        Metric::Ranking => value.to_string(),
    }
}

/// `MM.SS.CC` rendering of a duration in seconds.
fn time_convert(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor();
    let remainder = seconds - minutes * 60.0;
    let whole_seconds = remainder.floor();
    let centis = ((remainder - whole_seconds) * 100.0).floor();
    format!("{minutes:02.0}.{whole_seconds:02.0}.{centis:02.0}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn performance_line_takes_first_field() {
        let line = "INFO: performance_line:42.5:00.42.50:2024-01-01";
        assert_eq!(
            parse_simulator_line(line),
            Some(Milestone::Performance(42.5))
        );
    }

    #[test]
    fn waiting_line_is_role_tagged() {
        assert_eq!(
            parse_simulator_line("opponent controller: waiting for connection"),
            Some(Milestone::WaitingForConnection(ProcessRole::Opponent))
        );
        assert_eq!(
            parse_simulator_line("INFO: robot waiting for connection on port 1234"),
            Some(Milestone::WaitingForConnection(ProcessRole::Participant))
        );
    }

    #[test]
    fn time_format_is_zero_padded() {
        assert_eq!(time_convert(61.25), "01.01.25");
        assert_eq!(time_convert(9.0), "00.09.00");
    }
}
