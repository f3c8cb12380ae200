//! Thin wrappers over the `docker` command line.
//!
//! Image builds block and stream their output; container runs hand back the
//! spawned `docker run` child so the caller can multiplex its stdout.

use std::io::BufRead;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use anyhow::{bail, Context};
use tracing::{info, instrument, warn};

/// Image tag of the simulator/recorder container.
pub const RECORDER_IMAGE: &str = "recorder-webots";
/// Image tag of the participant's controller container.
pub const PARTICIPANT_IMAGE: &str = "controller-participant";
/// Image tag of the opponent's controller container.
pub const OPPONENT_IMAGE: &str = "controller-opponent";

/// Host:container publish of the simulator's extern-controller port.
///
/// Controller containers reach the simulator through the host side of this
/// mapping; without it nothing can connect.
pub const SIMULATOR_PORT: &str = "3005:1234";

/// Builds `tag` from `dockerfile`, streaming build output to stdout.
#[instrument(skip(build_args, verbose))]
pub fn build_image(
    tag: &str,
    dockerfile: &Path,
    context_dir: &Path,
    build_args: &[(&str, String)],
    verbose: bool,
) -> anyhow::Result<()> {
    let mut command = Command::new("docker");
    command
        .args(build_command_args(tag, dockerfile, context_dir, build_args))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().context("could not launch command 'docker'")?;
    stream_child_output(&mut child, verbose);
    let status = child.wait().context("failed to wait for docker build")?;
    if !status.success() {
        bail!("docker build of image '{tag}' failed");
    }
    info!("built image {tag}");
    Ok(())
}

fn build_command_args(
    tag: &str,
    dockerfile: &Path,
    context_dir: &Path,
    build_args: &[(&str, String)],
) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "-t".to_string(),
        tag.to_string(),
        "-f".to_string(),
        dockerfile.display().to_string(),
    ];
    for (key, value) in build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(context_dir.display().to_string());
    args
}

/// Prints a child's stdout and stderr line by line until both close.
fn stream_child_output(child: &mut Child, verbose: bool) {
    let stderr = child.stderr.take().map(std::io::BufReader::new);
    let printer = std::thread::spawn(move || {
        if let Some(stderr) = stderr {
            for line in stderr.lines().map_while(Result::ok) {
                if verbose {
                    println!("{line}");
                }
            }
        }
    });
    if let Some(stdout) = child.stdout.take() {
        for line in std::io::BufReader::new(stdout)
            .lines()
            .map_while(Result::ok)
        {
            if verbose {
                println!("{line}");
            }
        }
    }
    let _ = printer.join();
}

/// Starts the simulator container with its stdout piped.
///
/// The animation output directory is bind-mounted so the recorded files land
/// in `tmp/animation` on the host, and the extern-controller port is
/// published for the controller containers.
pub fn run_simulator(cpuset: &str, gpu: bool, animation_mount: &Path) -> anyhow::Result<Child> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let mount = format!(
        "type=bind,source={},target=/usr/local/webots-project/{}",
        cwd.join(animation_mount).display(),
        animation_mount.display()
    );

    Command::new("docker")
        .args(simulator_run_args(cpuset, gpu, &mount))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("could not launch command 'docker'")
}

fn simulator_run_args(cpuset: &str, gpu: bool, mount: &str) -> Vec<String> {
    let mut args: Vec<String> = ["run", "-t", "--rm", "--init", "--mount"]
        .map(str::to_string)
        .to_vec();
    args.push(mount.to_string());
    args.extend(["-p".to_string(), SIMULATOR_PORT.to_string()]);
    args.extend(["--env".to_string(), "CI=true".to_string()]);
    args.extend(["--cpuset-cpus".to_string(), cpuset.to_string()]);
    if gpu {
        args.push("--gpus=all".to_string());
    }
    args.push(RECORDER_IMAGE.to_string());
    args
}

/// Starts a controller container with its stdout piped.
pub fn run_controller(
    image: &str,
    cpuset: &str,
    memory_limit_mb: usize,
    gpu: bool,
) -> anyhow::Result<Child> {
    let mut command = Command::new("docker");
    command
        .args(["run", "--rm"])
        .args(["--cpuset-cpus", cpuset])
        .args(["--memory", &format!("{memory_limit_mb}m")]);
    if gpu {
        command.arg("--gpus=all");
    }
    command
        .arg(image)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    command.spawn().context("could not launch command 'docker'")
}

/// Id of the running container spawned from `image`, if any.
pub fn container_id(image: &str) -> Option<String> {
    let output = Command::new("docker")
        .args(["ps", "-f", &format!("ancestor={image}"), "-q"])
        .output()
        .ok()?;
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!id.is_empty()).then_some(id)
}

/// Sends SIGINT to `process_name` inside a container.
///
/// The simulator flushes its animation files on SIGINT; a plain kill would
/// lose them.
pub fn interrupt_in_container(container: &str, process_name: &str) {
    let status = Command::new("docker")
        .args(["exec", container, "pkill", "-SIGINT", process_name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if !matches!(status, Ok(s) if s.success()) {
        warn!("could not interrupt {process_name} in container {container}");
    }
}

/// Forcibly terminates a container.
pub fn kill_container(container: &str) {
    let status = Command::new("docker")
        .args(["kill", container])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if !matches!(status, Ok(s) if s.success()) {
        warn!("could not kill container {container}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_arguments_carry_every_build_arg() {
        let args = build_command_args(
            RECORDER_IMAGE,
            Path::new("Dockerfile"),
            Path::new("."),
            &[("WORLD_PATH", "worlds/maze.wbt".to_string())],
        );
        let flat = args.join(" ");
        assert!(flat.contains("--build-arg WORLD_PATH=worlds/maze.wbt"));
        assert!(flat.starts_with("build -t recorder-webots -f Dockerfile"));
        assert_eq!(args.last().map(String::as_str), Some("."));
    }

    #[test]
    fn simulator_publishes_the_controller_port() {
        let args = simulator_run_args("0,1", false, "type=bind,source=/x,target=/y");
        let flat = args.join(" ");
        assert!(flat.contains("-p 3005:1234"));
        assert!(flat.contains("--env CI=true"));
        assert!(!flat.contains("--gpus"));

        let with_gpu = simulator_run_args("0", true, "m");
        assert!(with_gpu.contains(&"--gpus=all".to_string()));
    }
}
