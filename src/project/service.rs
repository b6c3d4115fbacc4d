//! Background services required by a project's benchmarks

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use super::{ServiceSpec, TemplateContext};
use crate::process::{self, CommandSpec};
use crate::{Error, Result};

const CONNECT_POLL: Duration = Duration::from_millis(50);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);

/// A running service, stopped when dropped.
#[derive(Debug)]
pub struct ServiceGuard {
    child: Child,
    port: u16,
}

impl ServiceGuard {
    /// Start the service and wait until its port accepts connections.
    ///
    /// # Errors
    ///
    /// [`Error::BuildSystem`] if the port is already taken, the program
    /// cannot start, exits early, or never opens the port. Any of these
    /// means the build under this flag set is unusable.
    pub fn start(project: &str, spec: &ServiceSpec, ctx: &TemplateContext) -> Result<Self> {
        let command = CommandSpec::new(ctx.expand(&spec.program)).args(ctx.expand_args(&spec.args));
        let fail = |status: String| Error::BuildSystem {
            project: project.to_string(),
            command: command.to_string(),
            status,
            stdout: String::new(),
            stderr: String::new(),
        };

        if port_open(spec.port) {
            return Err(fail(format!(
                "port {} already in use before service start",
                spec.port
            )));
        }

        let child = command
            .spawn_detached()
            .map_err(|e| fail(format!("spawn failed: {e}")))?;
        let mut guard = Self {
            child,
            port: spec.port,
        };

        let deadline = Instant::now() + Duration::from_secs(spec.startup_timeout_secs);
        loop {
            if let Ok(Some(status)) = guard.child.try_wait() {
                return Err(fail(format!("exited during startup ({status})")));
            }
            if port_open(spec.port) {
                tracing::debug!(project, port = spec.port, "service ready");
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(fail(format!(
                    "port {} not ready after {}s",
                    spec.port, spec.startup_timeout_secs
                )));
            }
            thread::sleep(CONNECT_POLL);
        }
    }

    /// Port the service listens on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    fn stop(&mut self) {
        process::kill_group(&mut self.child);
        let _ = self.child.wait();
    }
}

impl Drop for ServiceGuard {
    fn drop(&mut self) {
        self.stop();
        tracing::debug!(port = self.port, "service stopped");
    }
}

fn port_open(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok()
}
