//! Playback process handle
//!
//! Audio is played (or spoken, for the system voice) by an external process.
//! Stopping sends a termination request first and escalates to a kill if the
//! process outlives the grace period.

use crate::platform::Platform;
use crate::speech::BackendTier;
use crate::{AnkiTtsError, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// How long a stopped process gets to exit on its own
pub const STOP_GRACE: Duration = Duration::from_secs(2);

const EXIT_POLL: Duration = Duration::from_millis(20);

/// The single live playback process of a dispatcher
#[derive(Debug)]
pub struct Playback {
    child: Child,
    tier: BackendTier,
    /// Kept alive until the player is done with it
    _audio: Option<NamedTempFile>,
}

impl Playback {
    pub fn spawn(mut command: Command, tier: BackendTier, audio: Option<NamedTempFile>) -> Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = command.spawn().map_err(|e| {
            AnkiTtsError::PlaybackSpawn(format!("{}: {}", command.get_program().to_string_lossy(), e))
        })?;
        debug!("{} playback started (pid {})", tier, child.id());

        Ok(Self {
            child,
            tier,
            _audio: audio,
        })
    }

    pub fn tier(&self) -> BackendTier {
        self.tier
    }

    /// Non-blocking check whether the process is gone
    pub fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("{} playback exited: {}", self.tier, status);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to poll playback process: {}", e);
                true
            }
        }
    }

    /// Stop the process: graceful request, bounded wait, then kill
    pub fn terminate(mut self, grace: Duration) {
        if self.has_exited() {
            return;
        }

        request_termination(&mut self.child);

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.has_exited() {
                return;
            }
            thread::sleep(EXIT_POLL);
        }

        warn!("{} playback ignored termination for {:?}, killing", self.tier, grace);
        self.kill();
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!("Failed to kill playback process: {}", e);
        }
        // Reap to avoid a zombie
        let _ = self.child.wait();
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        if !self.has_exited() {
            self.kill();
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(child.id() as i32);
    if let Err(e) = kill(pid, Signal::SIGTERM) {
        debug!("SIGTERM to {} failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Failed to stop playback process: {}", e);
    }
}

/// Build the command that plays an audio file on `platform`
pub fn player_command(path: &Path, platform: Platform) -> Option<Command> {
    match platform {
        Platform::MacOs => {
            let mut cmd = Command::new("afplay");
            cmd.arg(path);
            Some(cmd)
        }
        Platform::Linux | Platform::Wsl => {
            if find_in_path("mpv").is_none() && find_in_path("ffplay").is_some() {
                return Some(ffplay(path));
            }
            let mut cmd = Command::new("mpv");
            cmd.arg("--no-terminal").arg("--").arg(path);
            Some(cmd)
        }
        Platform::Windows => Some(ffplay(path)),
        Platform::Other => None,
    }
}

fn ffplay(path: &Path) -> Command {
    let mut cmd = Command::new("ffplay");
    cmd.args(["-nodisp", "-autoexit", "-loglevel", "quiet"]).arg(path);
    cmd
}

/// Locate an executable on PATH
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_command_per_platform() {
        let path = Path::new("/tmp/speech.mp3");

        let mac = player_command(path, Platform::MacOs).expect("macOS has afplay");
        assert_eq!(mac.get_program(), "afplay");

        let windows = player_command(path, Platform::Windows).expect("Windows uses ffplay");
        assert_eq!(windows.get_program(), "ffplay");
        assert!(windows.get_args().any(|arg| arg == "-autoexit"));

        assert!(player_command(path, Platform::Other).is_none());
    }

    #[test]
    fn test_spawn_failure() {
        let cmd = Command::new("definitely-not-a-real-player-binary");
        let result = Playback::spawn(cmd, BackendTier::SystemVoice, None);
        assert!(matches!(result, Err(AnkiTtsError::PlaybackSpawn(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_long_running() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let playback = Playback::spawn(cmd, BackendTier::SystemVoice, None).expect("sleep spawns");

        let started = Instant::now();
        playback.terminate(STOP_GRACE);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_has_exited() {
        let playback = Playback::spawn(Command::new("true"), BackendTier::SystemVoice, None);
        let mut playback = playback.expect("true spawns");

        let deadline = Instant::now() + Duration::from_secs(5);
        while !playback.has_exited() {
            assert!(Instant::now() < deadline, "process never exited");
            thread::sleep(EXIT_POLL);
        }
        assert_eq!(playback.tier(), BackendTier::SystemVoice);
    }
}
