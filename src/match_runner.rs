//! One match, from image builds to verdict.
//!
//! [`MatchProgress`] is the pure state machine: it consumes tagged output
//! lines and tells the caller when to start a controller and when the match
//! is over. [`run_match`] is the orchestration around it: patch the world,
//! build the images, spawn the containers, pump the multiplexed output
//! through the state machine and shut everything down.
//!
//! Only simulator lines advance the state machine. Controller output is
//! printed but never parsed, so a controller echoing a performance sentinel
//! cannot score itself.

use std::fmt;
use std::path::Path;
use std::process::Child;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::configuration::Configuration;
use crate::docker;
use crate::milestones::{self, Milestone};
use crate::multiplexer::{LineMultiplexer, ProcessRole, StreamEvent};
use crate::participant::Participant;
use crate::resources;
use crate::scenario::WorldConfig;
use crate::storage::{AnimatorDeployment, TMP_ANIMATION_DIRECTORY};
use crate::world::WorldPatch;

/// How long the consumer waits for output before re-checking child liveness.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Slack on top of `max-duration` before the simulator is declared hung.
const SIMULATOR_SLACK: Duration = Duration::from_secs(60);
/// How long the simulator gets to flush its recording after SIGINT.
const FLUSH_DEADLINE: Duration = Duration::from_secs(10);

/// Terminal outcome of one match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchVerdict {
    /// The simulator reported a performance value.
    Scored(f64),
    /// The simulator's duration watchdog stopped the run.
    TimedOut,
    /// The opponent's side never took part; the participant wins by forfeit.
    ForfeitWin,
    /// The match could not be evaluated.
    Failed(MatchFailure),
}

/// Why a match produced no usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFailure {
    /// The simulator container exited with a nonzero status.
    SimulatorExit(i32),
    /// The simulator stopped responding and had to be killed.
    SimulatorHang,
    /// The simulator never asked for the participant's controller.
    ParticipantNeverStarted,
    /// The participant's controller was started but never connected.
    ParticipantNeverConnected,
    /// The run ended without a performance report or a timeout.
    NoPerformanceReported,
}

impl fmt::Display for MatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchFailure::SimulatorExit(code) => {
                write!(f, "the simulator exited with status {code}")
            }
            MatchFailure::SimulatorHang => {
                write!(f, "the simulator stopped responding and was killed")
            }
            MatchFailure::ParticipantNeverStarted => {
                write!(f, "the simulator never requested the participant controller")
            }
            MatchFailure::ParticipantNeverConnected => {
                write!(f, "the participant controller started but never connected")
            }
            MatchFailure::NoPerformanceReported => {
                write!(f, "the run ended without reporting a performance value")
            }
        }
    }
}

/// Instruction handed back to the orchestration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchAction {
    /// Launch the given controller container now.
    StartController(ProcessRole),
    /// The match is over; begin the shutdown sequence.
    Stop,
}

#[derive(Debug, Clone, Copy, Default)]
struct ControllerState {
    started: bool,
    connected: bool,
}

/// Match state machine over the simulator's output lines.
#[derive(Debug)]
pub struct MatchProgress {
    two_sided: bool,
    participant: ControllerState,
    opponent: ControllerState,
    performance: Option<f64>,
    timed_out: bool,
    hung: bool,
}

impl MatchProgress {
    /// New state machine; `two_sided` matches expect an opponent controller.
    pub fn new(two_sided: bool) -> MatchProgress {
        MatchProgress {
            two_sided,
            participant: ControllerState::default(),
            opponent: ControllerState::default(),
            performance: None,
            timed_out: false,
            hung: false,
        }
    }

    /// Feeds one output line; non-simulator lines are ignored.
    pub fn on_line(&mut self, role: ProcessRole, line: &str) -> Option<MatchAction> {
        if role != ProcessRole::Simulator {
            return None;
        }
        match milestones::parse_simulator_line(line)? {
            Milestone::WaitingForConnection(controller) => {
                let state = self.state_mut(controller);
                if state.started {
                    return None;
                }
                state.started = true;
                Some(MatchAction::StartController(controller))
            }
            Milestone::Connected(controller) => {
                self.state_mut(controller).connected = true;
                None
            }
            Milestone::Performance(value) => {
                // a report implies the participant ran, even in one-sided
                // scenarios that never echo a connection line
                self.participant.started = true;
                self.participant.connected = true;
                self.performance = Some(value);
                Some(MatchAction::Stop)
            }
            Milestone::ControllerTimeout => {
                self.timed_out = true;
                Some(MatchAction::Stop)
            }
        }
    }

    /// Marks the run as killed by the orchestration's own deadline.
    ///
    /// Distinct from the simulator's `Controller timeout`: a hang means the
    /// watchdog itself never fired, so no score can be trusted.
    pub fn mark_hung(&mut self) {
        self.hung = true;
    }

    /// Produces the verdict once all processes are down.
    ///
    /// `exit_code` is the simulator's, when it exited by itself; `None` when
    /// the orchestration killed it. Checks run in blame order: simulator
    /// first, then the opponent's side, then the participant's.
    pub fn finalize(&self, exit_code: Option<i32>) -> MatchVerdict {
        if let Some(code) = exit_code {
            if code != 0 {
                return MatchVerdict::Failed(MatchFailure::SimulatorExit(code));
            }
        }
        if self.hung {
            return MatchVerdict::Failed(MatchFailure::SimulatorHang);
        }
        if self.two_sided && (!self.opponent.started || !self.opponent.connected) {
            return MatchVerdict::ForfeitWin;
        }
        if !self.participant.started {
            return MatchVerdict::Failed(MatchFailure::ParticipantNeverStarted);
        }
        if self.two_sided && !self.participant.connected {
            return MatchVerdict::Failed(MatchFailure::ParticipantNeverConnected);
        }
        if self.timed_out {
            return MatchVerdict::TimedOut;
        }
        match self.performance {
            Some(value) => MatchVerdict::Scored(value),
            None => MatchVerdict::Failed(MatchFailure::NoPerformanceReported),
        }
    }

    fn state_mut(&mut self, role: ProcessRole) -> &mut ControllerState {
        match role {
            ProcessRole::Opponent => &mut self.opponent,
            _ => &mut self.participant,
        }
    }
}

/// Everything a match needs, borrowed from the driver.
#[derive(Debug)]
pub struct MatchSetup<'a> {
    /// Runner behavior flags.
    pub configuration: &'a Configuration,
    /// World parameters of the scenario.
    pub world: &'a WorldConfig,
    /// Controller name the world references by default.
    pub default_controller: &'a str,
    /// The submission under evaluation.
    pub participant: &'a Participant,
    /// The ladder or friendly opponent, for two-sided matches.
    pub opponent: Option<&'a Participant>,
}

/// Runs one complete match and returns its verdict.
///
/// Infrastructure problems (recorder build, participant image build,
/// simulator spawn) are errors; a broken opponent image is a forfeit win,
/// and everything the controllers do wrong at runtime surfaces through the
/// verdict instead.
#[instrument(skip_all, fields(participant = %setup.participant.id))]
pub fn run_match(setup: &MatchSetup<'_>) -> anyhow::Result<MatchVerdict> {
    std::fs::create_dir_all(TMP_ANIMATION_DIRECTORY)
        .with_context(|| format!("cannot create {TMP_ANIMATION_DIRECTORY}"))?;
    let _animator = AnimatorDeployment::deploy()?;
    let _world_patch =
        WorldPatch::apply(setup.world, setup.default_controller, &setup.participant.id)?;

    let verbose = setup.configuration.verbose;
    let controller_args = [("DEFAULT_CONTROLLER", setup.default_controller.to_string())];
    docker::build_image(
        docker::RECORDER_IMAGE,
        Path::new("Dockerfile"),
        Path::new("."),
        &[("WORLD_PATH", setup.world.file.display().to_string())],
        verbose,
    )?;
    docker::build_image(
        docker::PARTICIPANT_IMAGE,
        &setup.participant.dockerfile(),
        &setup.participant.controller_dir,
        &controller_args,
        verbose,
    )
    .context("could not build the participant controller image")?;
    if let Some(opponent) = setup.opponent {
        if let Err(e) = docker::build_image(
            docker::OPPONENT_IMAGE,
            &opponent.dockerfile(),
            &opponent.controller_dir,
            &controller_args,
            verbose,
        ) {
            warn!("opponent image build failed, forfeit: {e:#}");
            return Ok(MatchVerdict::ForfeitWin);
        }
    }

    let allocation = resources::allocate_cpus(resources::detect_host_cores(), setup.world.cpus);
    let memory_limit = resources::controller_memory_limit_mb();
    let gpu = setup
        .configuration
        .gpu
        .unwrap_or_else(resources::gpu_available);

    let mut simulator = docker::run_simulator(
        &allocation.simulator,
        gpu,
        Path::new(TMP_ANIMATION_DIRECTORY),
    )?;
    let multiplexer = LineMultiplexer::new();
    if let Some(stdout) = simulator.stdout.take() {
        multiplexer.attach(ProcessRole::Simulator, stdout);
    }

    let mut progress = MatchProgress::new(setup.opponent.is_some());
    let mut controllers: Vec<Child> = vec![];
    let deadline =
        Instant::now() + Duration::from_secs_f64(setup.world.max_duration) + SIMULATOR_SLACK;
    let mut exit_code = None;

    loop {
        if Instant::now() >= deadline {
            warn!("simulator exceeded its deadline, stopping the match");
            progress.mark_hung();
            break;
        }
        let Some(event) = multiplexer.poll(POLL_INTERVAL) else {
            if let Some(status) = simulator.try_wait().context("failed to wait for simulator")? {
                exit_code = status.code();
                break;
            }
            continue;
        };
        match event {
            StreamEvent::Line(role, line) => {
                if verbose {
                    println!("[{role}] {line}");
                }
                match progress.on_line(role, &line) {
                    Some(MatchAction::StartController(controller)) => {
                        debug!("starting {controller} controller");
                        let (image, cpuset) = match controller {
                            ProcessRole::Opponent => {
                                (docker::OPPONENT_IMAGE, allocation.opponent.as_str())
                            }
                            _ => (docker::PARTICIPANT_IMAGE, allocation.participant.as_str()),
                        };
                        match docker::run_controller(image, cpuset, memory_limit, gpu) {
                            Ok(mut child) => {
                                if let Some(stdout) = child.stdout.take() {
                                    multiplexer.attach(controller, stdout);
                                }
                                controllers.push(child);
                            }
                            Err(e) => warn!("could not start {controller} controller: {e:#}"),
                        }
                    }
                    Some(MatchAction::Stop) => break,
                    None => {}
                }
            }
            StreamEvent::Eof(ProcessRole::Simulator) => {
                if let Ok(Some(status)) = simulator.try_wait() {
                    exit_code = status.code();
                }
                break;
            }
            StreamEvent::Eof(role) => debug!("{role} controller stream closed"),
        }
    }

    if exit_code.is_none() {
        exit_code = stop_simulator(&mut simulator);
    }
    for image in [docker::PARTICIPANT_IMAGE, docker::OPPONENT_IMAGE] {
        if let Some(container) = docker::container_id(image) {
            docker::kill_container(&container);
        }
    }
    for mut controller in controllers {
        let _ = controller.kill();
        let _ = controller.wait();
    }

    let verdict = progress.finalize(exit_code);
    info!(?verdict, "match finished");
    Ok(verdict)
}

/// Interrupts the simulator so it flushes the recording, then reaps it.
///
/// Returns the exit code when the simulator shut down by itself within the
/// flush deadline, `None` when it had to be killed.
fn stop_simulator(simulator: &mut Child) -> Option<i32> {
    if let Some(container) = docker::container_id(docker::RECORDER_IMAGE) {
        docker::interrupt_in_container(&container, "webots-bin");
    }
    let deadline = Instant::now() + FLUSH_DEADLINE;
    while Instant::now() < deadline {
        match simulator.try_wait() {
            Ok(Some(status)) => return status.code(),
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(_) => break,
        }
    }
    warn!("simulator did not stop after SIGINT, killing it");
    let _ = simulator.kill();
    let _ = simulator.wait();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIM: ProcessRole = ProcessRole::Simulator;

    #[test]
    fn one_sided_run_scores() {
        let mut progress = MatchProgress::new(false);
        assert_eq!(
            progress.on_line(SIM, "INFO: robot waiting for connection on port 1234"),
            Some(MatchAction::StartController(ProcessRole::Participant))
        );
        // repeated waiting lines must not relaunch the controller
        assert_eq!(
            progress.on_line(SIM, "INFO: robot waiting for connection on port 1234"),
            None
        );
        assert_eq!(
            progress.on_line(SIM, "performance_line:12.5"),
            Some(MatchAction::Stop)
        );
        assert_eq!(progress.finalize(Some(0)), MatchVerdict::Scored(12.5));
    }

    #[test]
    fn controller_output_cannot_fake_a_score() {
        let mut progress = MatchProgress::new(false);
        let _ = progress.on_line(SIM, "robot waiting for connection");
        assert_eq!(
            progress.on_line(ProcessRole::Participant, "performance_line:9999"),
            None
        );
        assert_eq!(
            progress.finalize(Some(0)),
            MatchVerdict::Failed(MatchFailure::NoPerformanceReported)
        );
    }

    #[test]
    fn absent_opponent_is_a_forfeit_even_on_clean_exit() {
        let mut progress = MatchProgress::new(true);
        let _ = progress.on_line(SIM, "participant: waiting for connection");
        let _ = progress.on_line(SIM, "participant connected");
        assert_eq!(progress.finalize(Some(0)), MatchVerdict::ForfeitWin);
    }

    #[test]
    fn two_sided_win_is_scored() {
        let mut progress = MatchProgress::new(true);
        assert_eq!(
            progress.on_line(SIM, "participant: waiting for connection"),
            Some(MatchAction::StartController(ProcessRole::Participant))
        );
        assert_eq!(
            progress.on_line(SIM, "opponent: waiting for connection"),
            Some(MatchAction::StartController(ProcessRole::Opponent))
        );
        let _ = progress.on_line(SIM, "participant connected");
        let _ = progress.on_line(SIM, "opponent connected");
        assert_eq!(
            progress.on_line(SIM, "performance_line:1"),
            Some(MatchAction::Stop)
        );
        assert_eq!(progress.finalize(Some(0)), MatchVerdict::Scored(1.0));
    }

    #[test]
    fn watchdog_timeout_is_reported() {
        let mut progress = MatchProgress::new(false);
        let _ = progress.on_line(SIM, "robot waiting for connection");
        assert_eq!(
            progress.on_line(SIM, "WARNING: Controller timeout"),
            Some(MatchAction::Stop)
        );
        assert_eq!(progress.finalize(None), MatchVerdict::TimedOut);
    }

    #[test]
    fn a_hung_simulator_is_a_failure_not_a_timeout() {
        let mut progress = MatchProgress::new(false);
        let _ = progress.on_line(SIM, "robot waiting for connection");
        progress.mark_hung();
        // the watchdog never fired; the ceiling score must not apply
        assert_eq!(
            progress.finalize(None),
            MatchVerdict::Failed(MatchFailure::SimulatorHang)
        );
    }

    #[test]
    fn simulator_crash_outranks_everything() {
        let mut progress = MatchProgress::new(true);
        let _ = progress.on_line(SIM, "performance_line:1");
        assert_eq!(
            progress.finalize(Some(137)),
            MatchVerdict::Failed(MatchFailure::SimulatorExit(137))
        );
    }

    #[test]
    fn silent_participant_is_a_failure() {
        let progress = MatchProgress::new(false);
        assert_eq!(
            progress.finalize(Some(0)),
            MatchVerdict::Failed(MatchFailure::ParticipantNeverStarted)
        );
    }
}
